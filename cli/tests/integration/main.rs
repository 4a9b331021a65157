use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

fn test_input() -> Vec<u8> {
    let mut input = Vec::new();
    for i in 0..4096u32 {
        input.extend(format!("line {i}: the quick brown fox jumps over the lazy dog\n").as_bytes());
    }
    input
}

fn test_cycle(extra_compress_args: &[&str]) {
    let dir = TempDir::new().unwrap();
    let input_path = dir.path().join("input.txt");
    let compressed_path = dir.path().join("input.txt.zst");
    let output_path = dir.path().join("output.txt");
    let input = test_input();
    fs::write(&input_path, &input).unwrap();

    cargo_bin_cmd!("flowzstd")
        .arg("compress")
        .arg(&input_path)
        .args(extra_compress_args)
        .assert()
        .success();

    cargo_bin_cmd!("flowzstd")
        .arg("decompress")
        .arg(&compressed_path)
        .arg("--output-file")
        .arg(&output_path)
        .assert()
        .success();

    assert_eq!(input, fs::read(&output_path).unwrap());

    let compressed = fs::metadata(&compressed_path).unwrap().len();
    assert!(compressed < input.len() as u64);
}

#[test]
fn cycle_default() {
    test_cycle(&[]);
}

#[test]
fn cycle_max_quality() {
    test_cycle(&["--quality", "maximum"]);
}

#[test]
fn cycle_framed() {
    test_cycle(&["--frame-size", "10K"]);
}

#[test]
fn cycle_stdin_to_stdout() {
    let input = test_input();

    let compressed = cargo_bin_cmd!("flowzstd")
        .arg("compress")
        .arg("--stdout")
        .write_stdin(input.clone())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let output = cargo_bin_cmd!("flowzstd")
        .arg("decompress")
        .arg("--stdout")
        .write_stdin(compressed)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    assert_eq!(input, output);
}

#[test]
fn list_reports_every_frame() {
    let dir = TempDir::new().unwrap();
    let input_path = dir.path().join("input.txt");
    let compressed_path = dir.path().join("input.txt.zst");
    fs::write(&input_path, test_input()).unwrap();

    cargo_bin_cmd!("flowzstd")
        .arg("compress")
        .arg(&input_path)
        .arg("--frame-size")
        .arg("64K")
        .assert()
        .success();

    let stdout = cargo_bin_cmd!("flowzstd")
        .arg("list")
        .arg(&compressed_path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let listing = String::from_utf8(stdout).unwrap();

    // > 192KiB of input cut every 64KiB gives at least three frames.
    let frames = listing.lines().filter(|l| l.contains("frame")).count();
    assert!(frames >= 3, "unexpected listing: {listing}");
}

#[test]
fn refuses_to_overwrite_without_force() {
    let dir = TempDir::new().unwrap();
    let input_path = dir.path().join("input.txt");
    let compressed_path = dir.path().join("input.txt.zst");
    fs::write(&input_path, b"data").unwrap();
    fs::write(&compressed_path, b"already here").unwrap();

    cargo_bin_cmd!("flowzstd")
        .arg("compress")
        .arg(&input_path)
        .assert()
        .failure();

    cargo_bin_cmd!("flowzstd")
        .arg("compress")
        .arg("--force")
        .arg(&input_path)
        .assert()
        .success();
}

#[test]
fn rejects_window_log_out_of_range() {
    cargo_bin_cmd!("flowzstd")
        .arg("decompress")
        .arg("--stdout")
        .arg("--window-log-max")
        .arg("42")
        .write_stdin(b"\x28\xb5\x2f\xfd".to_vec())
        .assert()
        .failure();
}
