use crate::{clear_env, ENV_MUTEX};
use chunkdupe::cli::Cli;
use chunkdupe::error::ExitCode;
use clap::Parser;
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

/// A media tree with one duplicate pair and one file of a unique size.
fn media_tree() -> TempDir {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.mkv"), vec![1u8; 3000]).unwrap();
    fs::write(dir.path().join("b.mkv"), vec![1u8; 3000]).unwrap();
    fs::write(dir.path().join("c.mkv"), vec![2u8; 1234]).unwrap();
    dir
}

fn run(args: &[&str], config_dir: &Path) -> ExitCode {
    let config_path = config_dir.join("config.toml");
    fs::write(&config_path, "").unwrap();

    let mut argv = vec!["chunkdupe", "-q", "--no-color"];
    argv.extend_from_slice(args);
    argv.extend_from_slice(&[
        "--config",
        config_path.to_str().unwrap(),
        "--memory-budget",
        "2KiB",
        "--min-chunk",
        "256",
    ]);
    chunkdupe::run_app(Cli::try_parse_from(argv).unwrap()).unwrap()
}

#[test]
fn test_run_app_json_report() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let media = media_tree();
    let out = tempdir().unwrap();
    let report_path = out.path().join("report.json");

    let code = run(
        &[
            "scan",
            media.path().to_str().unwrap(),
            "--output",
            "json",
            "--output-file",
            report_path.to_str().unwrap(),
        ],
        out.path(),
    );
    assert_eq!(code, ExitCode::Success);

    let parsed: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    let verdicts = parsed["verdicts"].as_array().unwrap();
    assert_eq!(verdicts.len(), 3);
    assert_eq!(verdicts[0]["verdict"], "duplicate");
    assert_eq!(verdicts[0]["bytes_read"], 3000);
    assert_eq!(verdicts[2]["verdict"], "unique");
    assert_eq!(verdicts[2]["bytes_read"], 0);
    assert_eq!(parsed["clusters"].as_array().unwrap().len(), 1);
    assert_eq!(parsed["bytes_needed_by_size"]["3000"], 3000);
    assert_eq!(parsed["bytes_needed_by_size"]["1234"], 0);
    assert_eq!(parsed["summary"]["exit_code"], 0);
}

#[test]
fn test_run_app_csv_report() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let media = media_tree();
    let out = tempdir().unwrap();
    let report_path = out.path().join("report.csv");

    let code = run(
        &[
            "scan",
            media.path().to_str().unwrap(),
            "--output",
            "csv",
            "--output-file",
            report_path.to_str().unwrap(),
        ],
        out.path(),
    );
    assert_eq!(code, ExitCode::Success);

    let csv = fs::read_to_string(&report_path).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "path,size,verdict,bytes_read,cluster_id,detail");
    assert!(lines[1].ends_with(&format!(
        ",3000,duplicate,3000,0,{}",
        media.path().join("b.mkv").display()
    )));
    assert!(lines[3].ends_with(",1234,unique,0,,"));
}

#[test]
fn test_run_app_no_duplicates_exit_code() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let media = tempdir().unwrap();
    fs::write(media.path().join("a.mkv"), vec![1u8; 100]).unwrap();
    fs::write(media.path().join("b.mkv"), vec![2u8; 100]).unwrap();
    let out = tempdir().unwrap();

    let code = run(
        &[
            "scan",
            media.path().to_str().unwrap(),
            "--output-file",
            out.path().join("report.txt").to_str().unwrap(),
        ],
        out.path(),
    );
    assert_eq!(code, ExitCode::NoDuplicates);

    let text = fs::read_to_string(out.path().join("report.txt")).unwrap();
    assert!(text.contains("No duplicates found."));
}

#[test]
fn test_run_app_errors_on_missing_source() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let out = tempdir().unwrap();
    let config_path = out.path().join("config.toml");
    fs::write(&config_path, "").unwrap();
    let missing = out.path().join("missing");

    let cli = Cli::try_parse_from([
        "chunkdupe",
        "-q",
        "scan",
        missing.to_str().unwrap(),
        "--config",
        config_path.to_str().unwrap(),
    ])
    .unwrap();
    let err = chunkdupe::run_app(cli).unwrap_err();
    assert!(format!("{err:#}").contains("Path not found"));
}

#[test]
fn test_run_app_rejects_zero_parallelism() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let media = media_tree();
    let out = tempdir().unwrap();
    let config_path = out.path().join("config.toml");
    fs::write(&config_path, "parallelism_ceiling = 0\n").unwrap();

    let cli = Cli::try_parse_from([
        "chunkdupe",
        "-q",
        "scan",
        media.path().to_str().unwrap(),
        "--config",
        config_path.to_str().unwrap(),
    ])
    .unwrap();
    let err = chunkdupe::run_app(cli).unwrap_err();
    assert!(format!("{err:#}").contains("parallelism_ceiling"));
}
