use chunkdupe::duplicates::{DuplicateFinder, FinderConfig, Verdict};
use std::fs;
use tempfile::tempdir;

fn small_config() -> FinderConfig {
    FinderConfig::default()
        .with_memory_budget(2048)
        .with_parallelism_ceiling(4)
        .with_min_chunk_floor(16)
}

#[test]
fn test_duplicates_across_sources() {
    let dir1 = tempdir().unwrap();
    let dir2 = tempdir().unwrap();
    fs::write(dir1.path().join("clip.mp4"), b"same clip bytes").unwrap();
    fs::write(dir2.path().join("clip (1).mp4"), b"same clip bytes").unwrap();

    let finder = DuplicateFinder::new(small_config());
    let report = finder
        .find_duplicates_in_paths(&[dir1.path().to_path_buf(), dir2.path().to_path_buf()], None)
        .unwrap();

    assert_eq!(report.clusters.len(), 1);
    assert_eq!(report.summary.total_files, 2);
}

#[test]
fn test_same_source_twice_registers_files_once() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.mp3"), b"tune").unwrap();
    fs::write(dir.path().join("b.mp3"), b"tune").unwrap();

    let finder = DuplicateFinder::new(small_config());
    let report = finder
        .find_duplicates_in_paths(&[dir.path().to_path_buf(), dir.path().to_path_buf()], None)
        .unwrap();

    assert_eq!(report.summary.total_files, 2);
    assert_eq!(report.clusters.len(), 1);
    assert_eq!(report.clusters[0].len(), 2);
}

#[test]
fn test_size_limited_target_merge() {
    let source = tempdir().unwrap();
    let target = tempdir().unwrap();
    fs::write(source.path().join("new.jpg"), b"photo bytes").unwrap();
    fs::write(target.path().join("archived.jpg"), b"photo bytes").unwrap();
    fs::write(target.path().join("other.jpg"), b"an unrelated, longer photo").unwrap();

    let finder = DuplicateFinder::new(small_config());
    let report = finder
        .find_duplicates_in_paths(&[source.path().to_path_buf()], Some(target.path()))
        .unwrap();

    // Only the target file sharing a source size is imported
    assert_eq!(report.summary.total_files, 2);
    assert!(report.verdict(&target.path().join("other.jpg")).is_none());
    assert_eq!(report.clusters.len(), 1);
    assert!(report
        .verdict(&source.path().join("new.jpg"))
        .unwrap()
        .is_duplicate());
}

#[test]
fn test_unlimited_target_merge() {
    let source = tempdir().unwrap();
    let target = tempdir().unwrap();
    fs::write(source.path().join("new.jpg"), b"photo bytes").unwrap();
    fs::write(target.path().join("archived.jpg"), b"photo bytes").unwrap();
    fs::write(target.path().join("other.jpg"), b"an unrelated, longer photo").unwrap();

    let finder = DuplicateFinder::new(small_config().with_size_limited_merge(false));
    let report = finder
        .find_duplicates_in_paths(&[source.path().to_path_buf()], Some(target.path()))
        .unwrap();

    assert_eq!(report.summary.total_files, 3);
    assert_eq!(
        report.verdict(&target.path().join("other.jpg")),
        Some(&Verdict::Unique { bytes_read: 0 })
    );
}

#[test]
fn test_missing_target_is_rejected_before_scanning() {
    let source = tempdir().unwrap();
    let missing = source.path().join("not-mounted");

    let result = DuplicateFinder::new(small_config())
        .find_duplicates_in_paths(&[source.path().to_path_buf()], Some(&missing));
    assert!(matches!(
        result,
        Err(chunkdupe::duplicates::FinderError::PathNotFound(path)) if path == missing
    ));
}
