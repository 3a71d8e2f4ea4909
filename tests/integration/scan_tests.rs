use chunkdupe::duplicates::{DuplicateFinder, FinderConfig, Verdict};
use chunkdupe::scanner::{MediaType, WalkerConfig};
use std::fs::{self, File};
use std::io::Write;
use tempfile::tempdir;

fn small_chunks() -> FinderConfig {
    FinderConfig::default()
        .with_memory_budget(4096)
        .with_parallelism_ceiling(4)
        .with_min_chunk_floor(16)
}

#[test]
fn test_scan_empty_directory() {
    let dir = tempdir().unwrap();
    let finder = DuplicateFinder::with_defaults();

    let report = finder
        .find_duplicates_in_paths(&[dir.path().to_path_buf()], None)
        .unwrap();

    assert!(report.verdicts.is_empty());
    assert!(report.clusters.is_empty());
    assert_eq!(report.summary.total_files, 0);
    assert!(!report.summary.interrupted);
}

#[test]
fn test_scan_unique_sizes_read_nothing() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.mp3"), b"short").unwrap();
    fs::write(dir.path().join("b.mp3"), b"a little longer").unwrap();
    fs::write(dir.path().join("c.mp3"), b"the longest of the three").unwrap();

    let finder = DuplicateFinder::new(small_chunks());
    let report = finder
        .find_duplicates_in_paths(&[dir.path().to_path_buf()], None)
        .unwrap();

    assert_eq!(report.summary.total_files, 3);
    assert_eq!(report.summary.eliminated_by_size, 3);
    assert_eq!(report.unique().count(), 3);
    for entry in report.verdicts.values() {
        assert_eq!(entry.verdict, Verdict::Unique { bytes_read: 0 });
    }
    assert_eq!(report.summary.bytes_read, 0);
    assert_eq!(finder.hasher().stats().chunks_hashed(), 0);
    assert!(report.groups.is_empty());
}

#[test]
fn test_scan_duplicate_files() {
    let dir = tempdir().unwrap();
    File::create(dir.path().join("a.mkv"))
        .unwrap()
        .write_all(b"duplicate")
        .unwrap();
    File::create(dir.path().join("b.mkv"))
        .unwrap()
        .write_all(b"duplicate")
        .unwrap();
    File::create(dir.path().join("c.mkv"))
        .unwrap()
        .write_all(b"different")
        .unwrap();

    let finder = DuplicateFinder::new(small_chunks());
    let report = finder
        .find_duplicates_in_paths(&[dir.path().to_path_buf()], None)
        .unwrap();

    assert_eq!(report.clusters.len(), 1);
    assert_eq!(report.clusters[0].len(), 2);
    assert_eq!(report.clusters[0].size, 9);
    assert_eq!(report.summary.duplicate_files, 1);
    assert_eq!(report.summary.reclaimable_space, 9);

    let c = dir.path().join("c.mkv");
    assert_eq!(report.verdict(&c), Some(&Verdict::Unique { bytes_read: 9 }));
    match report.verdict(&dir.path().join("a.mkv")).unwrap() {
        Verdict::Duplicate { others, .. } => assert_eq!(others, &vec![dir.path().join("b.mkv")]),
        other => panic!("Expected duplicate, got {other:?}"),
    }
}

#[test]
fn test_scan_nested_directories() {
    let dir = tempdir().unwrap();
    let sub = dir.path().join("2019").join("summer");
    fs::create_dir_all(&sub).unwrap();

    fs::write(dir.path().join("beach.jpg"), b"pixels").unwrap();
    fs::write(sub.join("beach copy.jpg"), b"pixels").unwrap();

    let finder = DuplicateFinder::new(small_chunks());
    let report = finder
        .find_duplicates_in_paths(&[dir.path().to_path_buf()], None)
        .unwrap();

    assert_eq!(report.clusters.len(), 1);
    assert!(report.has_duplicates());
}

#[test]
fn test_scan_ignores_non_media_files() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("notes.txt"), b"same bytes").unwrap();
    fs::write(dir.path().join("copy.txt"), b"same bytes").unwrap();
    fs::write(dir.path().join("song.flac"), b"same bytes").unwrap();

    let finder = DuplicateFinder::new(small_chunks());
    let report = finder
        .find_duplicates_in_paths(&[dir.path().to_path_buf()], None)
        .unwrap();

    assert_eq!(report.summary.total_files, 1);
    assert!(report.clusters.is_empty());
}

#[test]
fn test_scan_media_type_filter() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.mp4"), b"same").unwrap();
    fs::write(dir.path().join("b.mp4"), b"same").unwrap();
    fs::write(dir.path().join("a.png"), b"same").unwrap();

    let config = small_chunks().with_walker_config(WalkerConfig {
        media_types: vec![MediaType::Photo],
        ..WalkerConfig::default()
    });
    let report = DuplicateFinder::new(config)
        .find_duplicates_in_paths(&[dir.path().to_path_buf()], None)
        .unwrap();

    assert_eq!(report.summary.total_files, 1);
    assert_eq!(
        report.verdicts.values().next().unwrap().record.media_type,
        MediaType::Photo
    );
}

#[test]
fn test_scan_min_size_filter() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("tiny1.wav"), b"ab").unwrap();
    fs::write(dir.path().join("tiny2.wav"), b"ab").unwrap();
    fs::write(dir.path().join("big.wav"), vec![7u8; 100]).unwrap();

    let config = small_chunks().with_walker_config(WalkerConfig {
        min_size: Some(10),
        ..WalkerConfig::default()
    });
    let report = DuplicateFinder::new(config)
        .find_duplicates_in_paths(&[dir.path().to_path_buf()], None)
        .unwrap();

    assert_eq!(report.summary.total_files, 1);
    assert!(report.clusters.is_empty());
}

#[test]
fn test_scan_root_must_be_directory() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("movie.mkv");
    fs::write(&file, b"x").unwrap();

    let finder = DuplicateFinder::with_defaults();
    let result = finder.find_duplicates_in_paths(&[file], None);
    assert!(matches!(
        result,
        Err(chunkdupe::duplicates::FinderError::NotADirectory(_))
    ));

    let missing = dir.path().join("missing");
    let result = finder.find_duplicates_in_paths(&[missing], None);
    assert!(matches!(
        result,
        Err(chunkdupe::duplicates::FinderError::PathNotFound(_))
    ));
}

#[cfg(target_os = "linux")]
#[test]
fn test_scan_normalization_variants_are_separate_files() {
    let dir = tempdir().unwrap();
    let composed = dir.path().join("café.mkv");
    let decomposed = dir.path().join("cafe\u{0301}.mkv");
    fs::write(&composed, b"same film").unwrap();
    fs::write(&decomposed, b"same film").unwrap();

    let report = DuplicateFinder::new(small_chunks())
        .find_duplicates_in_paths(&[dir.path().to_path_buf()], None)
        .unwrap();

    assert_eq!(report.summary.total_files, 2);
    assert_eq!(report.verdicts.len(), 2);
    assert_eq!(report.clusters.len(), 1);
    assert!(report.verdict(&composed).unwrap().is_duplicate());
    assert!(report.verdict(&decomposed).unwrap().is_duplicate());
}

#[cfg(target_os = "linux")]
#[test]
fn test_scan_non_utf8_names_are_separate_files() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let dir = tempdir().unwrap();
    let first = dir.path().join(OsStr::from_bytes(b"\xff.mkv"));
    let second = dir.path().join(OsStr::from_bytes(b"\xfe.mkv"));
    fs::write(&first, b"same film").unwrap();
    fs::write(&second, b"same film").unwrap();

    let report = DuplicateFinder::new(small_chunks())
        .find_duplicates_in_paths(&[dir.path().to_path_buf()], None)
        .unwrap();

    assert_eq!(report.verdicts.len(), 2);
    assert_eq!(report.clusters.len(), 1);
    assert_eq!(report.clusters[0].files.len(), 2);
}
