use chunkdupe::duplicates::{
    DuplicateFinder, FinderConfig, GroupSchedule, GroupState, SchedulerConfig, Verdict,
};
use chunkdupe::scanner::{FileRecord, MediaType};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn create_media_file(dir: &Path, name: &str, content: &[u8]) -> FileRecord {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    FileRecord::new(path, content.len() as u64, MediaType::Video)
}

fn patterned(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

fn config(budget: u64, ceiling: usize, floor: u64) -> FinderConfig {
    FinderConfig::default().with_scheduler(
        SchedulerConfig::default()
            .with_memory_budget(budget)
            .with_parallelism_ceiling(ceiling)
            .with_min_chunk_floor(floor),
    )
}

#[test]
fn test_files_differing_only_in_the_last_bytes() {
    let dir = tempdir().unwrap();
    let first = patterned(5000, 1);
    let mut second = first.clone();
    for byte in &mut second[4990..] {
        *byte ^= 0xff;
    }
    let a = create_media_file(dir.path(), "a.mkv", &first);
    let b = create_media_file(dir.path(), "b.mkv", &second);

    // Budget 4000 over two files: two threads, 2000-byte chunks, three rounds
    let finder = DuplicateFinder::new(config(4000, 2, 1));
    let report = finder
        .find_duplicates_from_files(vec![a.clone(), b.clone()])
        .unwrap();

    assert_eq!(report.verdict(&a.path), Some(&Verdict::Unique { bytes_read: 5000 }));
    assert_eq!(report.verdict(&b.path), Some(&Verdict::Unique { bytes_read: 5000 }));
    assert!(report.clusters.is_empty());

    let group = &report.groups[0];
    assert_eq!(
        group.schedule,
        GroupSchedule {
            threads: 2,
            chunk_size: 2000
        }
    );
    assert_eq!(group.chunks_planned, 3);
    assert_eq!(group.rounds, 3);
    assert_eq!(group.state, GroupState::Resolved);
    assert_eq!(group.bytes_needed, 5000);

    // Each byte of each file read exactly once
    assert_eq!(report.summary.bytes_read, 10_000);
    assert_eq!(finder.hasher().stats().bytes_read(), 10_000);
    assert_eq!(finder.hasher().stats().chunks_hashed(), 6);
    assert!(report.summary.peak_in_flight <= 4000);
}

#[test]
fn test_mixed_sizes_scenario() {
    let dir = tempdir().unwrap();
    let shared = patterned(3000, 7);
    let mut different = shared.clone();
    different[10] ^= 0x55;

    let a = create_media_file(dir.path(), "a.mov", &shared);
    let b = create_media_file(dir.path(), "b.mov", &shared);
    let c = create_media_file(dir.path(), "c.mov", &different);
    let d = create_media_file(dir.path(), "d.mov", &patterned(7000, 3));

    // Three files share a size: three threads of 2000-byte chunks
    let finder = DuplicateFinder::new(config(6000, 16, 1));
    let report = finder
        .find_duplicates_from_files(vec![a.clone(), b.clone(), c.clone(), d.clone()])
        .unwrap();

    assert_eq!(report.verdict(&d.path), Some(&Verdict::Unique { bytes_read: 0 }));
    assert_eq!(report.verdict(&c.path), Some(&Verdict::Unique { bytes_read: 2000 }));
    match report.verdict(&a.path).unwrap() {
        Verdict::Duplicate {
            others, bytes_read, ..
        } => {
            assert_eq!(others, &vec![b.path.clone()]);
            assert_eq!(*bytes_read, 3000);
        }
        other => panic!("Expected duplicate, got {other:?}"),
    }

    assert_eq!(report.groups.len(), 1);
    let group = &report.groups[0];
    assert_eq!(group.size, 3000);
    assert_eq!(group.schedule.threads, 3);
    assert_eq!(group.schedule.chunk_size, 2000);
    assert_eq!(group.rounds, 2);
    assert_eq!(group.state, GroupState::Exhausted);

    assert_eq!(report.summary.eliminated_by_size, 1);
    assert_eq!(report.summary.bytes_read, 2000 + 3000 + 3000);
    assert_eq!(report.summary.full_read_bytes, 9000);
    assert_eq!(report.bytes_needed_by_size()[&3000], 3000);
    assert_eq!(report.bytes_needed_by_size()[&7000], 0);
}

#[test]
fn test_early_divergence_reads_one_chunk() {
    let dir = tempdir().unwrap();
    let records: Vec<FileRecord> = (0..4)
        .map(|i| create_media_file(dir.path(), &format!("{i}.mp4"), &patterned(10_000, i)))
        .collect();

    let finder = DuplicateFinder::new(config(4000, 4, 1));
    let report = finder.find_duplicates_from_files(records.clone()).unwrap();

    for record in &records {
        assert_eq!(
            report.verdict(&record.path),
            Some(&Verdict::Unique { bytes_read: 1000 })
        );
    }
    assert_eq!(report.groups[0].rounds, 1);
    assert_eq!(report.summary.bytes_read, 4000);
    assert!(report.summary.read_savings_percentage() > 89.0);
}

#[test]
fn test_chunk_floor_limits_threads() {
    let dir = tempdir().unwrap();
    let content = patterned(1500, 9);
    let records: Vec<FileRecord> = (0..3)
        .map(|i| create_media_file(dir.path(), &format!("{i}.avi"), &content))
        .collect();

    // 1000 / 3 is below the 600-byte floor, so only one 600-byte read fits
    let finder = DuplicateFinder::new(config(1000, 16, 600));
    let report = finder.find_duplicates_from_files(records).unwrap();

    let group = &report.groups[0];
    assert_eq!(group.schedule.chunk_size, 600);
    assert_eq!(group.schedule.threads, 1);
    assert!(group.schedule.peak_memory() <= 1000);
    assert!(report.summary.peak_in_flight <= 1000);
    assert_eq!(group.chunks_planned, 3);
    assert_eq!(report.clusters.len(), 1);
    assert_eq!(report.clusters[0].len(), 3);
}

#[test]
fn test_file_ending_on_chunk_boundary() {
    let dir = tempdir().unwrap();
    let content = patterned(2000, 4);
    let a = create_media_file(dir.path(), "a.flac", &content);
    let b = create_media_file(dir.path(), "b.flac", &content);

    let finder = DuplicateFinder::new(config(2000, 2, 1));
    let report = finder.find_duplicates_from_files(vec![a, b]).unwrap();

    assert_eq!(report.groups[0].chunks_planned, 2);
    assert_eq!(report.groups[0].rounds, 2);
    assert_eq!(report.clusters.len(), 1);
    assert_eq!(finder.hasher().stats().chunks_hashed(), 4);
    assert_eq!(finder.hasher().stats().bytes_read(), 4000);
}

#[test]
fn test_schedule_recomputed_per_group() {
    let dir = tempdir().unwrap();
    let mut records = Vec::new();
    for i in 0..4 {
        records.push(create_media_file(
            dir.path(),
            &format!("four{i}.jpg"),
            &patterned(800, i),
        ));
    }
    for i in 0..2 {
        records.push(create_media_file(
            dir.path(),
            &format!("two{i}.jpg"),
            &patterned(600, 40 + i),
        ));
    }

    let finder = DuplicateFinder::new(config(800, 16, 1));
    let report = finder.find_duplicates_from_files(records).unwrap();

    assert_eq!(report.groups.len(), 2);
    let by_size = |size: u64| report.groups.iter().find(|g| g.size == size).unwrap();
    assert_eq!(by_size(800).schedule, GroupSchedule { threads: 4, chunk_size: 200 });
    assert_eq!(by_size(600).schedule, GroupSchedule { threads: 2, chunk_size: 400 });
}

#[test]
fn test_three_identical_one_late_divergent() {
    let dir = tempdir().unwrap();
    let base = patterned(4000, 11);
    let mut late = base.clone();
    late[3500] ^= 1;

    let records = vec![
        create_media_file(dir.path(), "x1.mkv", &base),
        create_media_file(dir.path(), "x2.mkv", &base),
        create_media_file(dir.path(), "x3.mkv", &base),
        create_media_file(dir.path(), "y.mkv", &late),
    ];

    let finder = DuplicateFinder::new(config(4000, 4, 1));
    let report = finder.find_duplicates_from_files(records).unwrap();

    assert_eq!(
        report.verdict(&dir.path().join("y.mkv")),
        Some(&Verdict::Unique { bytes_read: 4000 })
    );
    assert_eq!(report.clusters.len(), 1);
    assert_eq!(report.clusters[0].len(), 3);
    assert_eq!(report.summary.duplicate_files, 2);
    assert_eq!(report.summary.reclaimable_space, 8000);
}

#[test]
fn test_large_chunks_stay_within_budget() {
    const MIB: u64 = 1024 * 1024;
    let dir = tempdir().unwrap();
    let records: Vec<FileRecord> = (0..12u8)
        .map(|i| {
            let mut content = vec![0u8; (16 * MIB) as usize];
            content[(16 * MIB - 1) as usize] = i;
            create_media_file(dir.path(), &format!("reel_{i:02}.mkv"), &content)
        })
        .collect();

    // 4 workers × 16 MiB chunks fill the budget exactly
    for _ in 0..3 {
        let report = DuplicateFinder::new(config(64 * MIB, 4, 16 * MIB))
            .find_duplicates_from_files(records.clone())
            .unwrap();

        assert_eq!(
            report.groups[0].schedule,
            GroupSchedule {
                threads: 4,
                chunk_size: 16 * MIB
            }
        );
        assert!(report.summary.peak_in_flight <= 64 * MIB);
        assert_eq!(report.unique().count(), 12);
        for record in &records {
            assert_eq!(
                report.verdict(&record.path),
                Some(&Verdict::Unique {
                    bytes_read: 16 * MIB
                })
            );
        }
    }
}
