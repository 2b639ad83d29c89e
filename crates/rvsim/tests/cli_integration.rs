//! Integration tests for the rvsim CLI.

#![allow(clippy::pedantic, clippy::nursery)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn rvsim(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rvsim"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run rvsim")
}

/// `auipc t0, 1; addi t1, x0, value; sd t1, 0(t0); j .`
fn write_program(dir: &Path, value: u32) -> PathBuf {
    let words = [0x0000_1297_u32, 0x0000_0313 | (value << 20), 0x0062_B023, 0x0000_006F];
    let path = dir.join("program.bin");
    let bytes: Vec<u8> = words.iter().flat_map(|word| word.to_le_bytes()).collect();
    fs::write(&path, bytes).unwrap();
    path
}

#[test]
fn completed_program_writes_its_signature() {
    let temp_dir = tempfile::tempdir().unwrap();
    let image = write_program(temp_dir.path(), 1);
    let signature = temp_dir.path().join("signature.txt");

    let output = rvsim(&[
        image.to_str().unwrap(),
        "-T",
        signature.to_str().unwrap(),
        "--signature-start",
        "0x80000000",
        "--signature-end",
        "0x80000008",
    ]);

    assert!(output.status.success(), "{output:?}");
    assert_eq!(
        fs::read_to_string(signature).unwrap(),
        "00001297\n00100313\n"
    );
}

#[test]
fn non_zero_exit_code_fails_the_process() {
    let temp_dir = tempfile::tempdir().unwrap();
    let image = write_program(temp_dir.path(), 7);

    let output = rvsim(&[image.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn instruction_limit_fails_the_process() {
    let temp_dir = tempfile::tempdir().unwrap();
    let image = temp_dir.path().join("spin.bin");
    fs::write(&image, 0x0000_006F_u32.to_le_bytes()).unwrap();

    let output = rvsim(&[image.to_str().unwrap(), "--inst-limit", "100"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn tandem_run_of_a_passing_program_succeeds() {
    let temp_dir = tempfile::tempdir().unwrap();
    let image = write_program(temp_dir.path(), 1);

    let output = rvsim(&[image.to_str().unwrap(), "--tandem"]);
    assert!(output.status.success(), "{output:?}");
}

#[test]
fn report_arch_prints_the_isa() {
    let output = rvsim(&["--report-arch"]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "RV64");
}

#[test]
fn missing_image_is_an_error() {
    let output = rvsim(&[]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no program image"));
}

#[test]
fn unknown_trace_category_is_an_error() {
    let output = rvsim(&["--trace=cache"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown trace category 'cache'"));
}

#[test]
fn help_exits_successfully() {
    let output = rvsim(&["--help"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("--rvfi-dii"));
}
