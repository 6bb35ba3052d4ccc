use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;

fn nib() -> Command {
    Command::cargo_bin("nib").unwrap()
}

#[test]
fn runs_without_arguments() {
    nib().assert().success();
}

#[test]
fn runs_sum() {
    nib()
        .arg("run")
        .arg("tests/files/sum.asm")
        .arg("--minimal")
        .assert()
        .success()
        .stdout(contains("Halted"))
        .stdout(contains("reached halt region"))
        .stdout(contains("R1  :    200"))
        .stdout(contains("Z: 0   N: 0   P: 1   C: 1   V: 0"));
}

#[test]
fn runs_file_without_subcommand() {
    nib()
        .arg("tests/files/countdown.asm")
        .assert()
        .success()
        .stdout(contains("R2  :     15"));
}

#[test]
fn expectations_pass() {
    nib()
        .args(["run", "tests/files/sum.asm", "--minimal"])
        .args(["--expect", "R1=200, R2=-100, IO=0xFFF8"])
        .assert()
        .success()
        .stdout(contains("all registers match"));
}

#[test]
fn expectations_fail() {
    nib()
        .args(["run", "tests/files/countdown.asm", "--minimal"])
        .args(["--expect", "R1=0,R2=16"])
        .assert()
        .failure()
        .stdout(contains("R2 does not match: expected 16 (0x0010), found 15 (0x000F)"))
        .stdout(contains("R1 does not match").not());
}

#[test]
fn rejects_bad_expectation() {
    nib()
        .args(["run", "tests/files/sum.asm", "--expect", "R99=1"])
        .assert()
        .failure()
        .stderr(contains("Unknown register `R99`"));
}

#[test]
fn budget_runs_out() {
    nib()
        .args(["run", "tests/files/spin.asm", "--minimal", "--budget", "0x10"])
        .assert()
        .success()
        .stdout(contains("instruction budget exhausted"));
}

#[test]
fn budget_from_environment() {
    nib()
        .args(["run", "tests/files/spin.asm", "--minimal"])
        .env("NIB_BUDGET", "25")
        .assert()
        .success()
        .stdout(contains("instruction budget exhausted"));
}

#[test]
fn fault_fails_run() {
    nib()
        .args(["run", "tests/files/unaligned.asm", "--minimal"])
        .assert()
        .failure()
        .stdout(contains("Fault"))
        .stderr(contains("Word access at odd address 0x0001"));
}

#[test]
fn reports_assembly_errors() {
    nib()
        .args(["check", "tests/files/bad_register.asm"])
        .assert()
        .failure()
        .stderr(contains("asm::unknown_register"));

    nib()
        .args(["check", "tests/files/sum.asm"])
        .assert()
        .success()
        .stdout(contains("no errors found!"));
}

#[test]
fn compiles_and_runs_image() {
    let dest = std::env::temp_dir().join(format!("nib-sum-{}.bin", std::process::id()));
    nib()
        .arg("compile")
        .arg("tests/files/sum.asm")
        .arg(&dest)
        .assert()
        .success();

    let image = std::fs::read_to_string(&dest).unwrap();
    assert!(image.lines().all(|line| line.len() == 16));

    nib()
        .arg("run")
        .arg(&dest)
        .args(["--minimal", "--expect", "R1=200"])
        .assert()
        .success()
        .stdout(contains("Reading"))
        .stdout(contains("Assembling").not());

    nib()
        .arg("disassemble")
        .arg(&dest)
        .assert()
        .success()
        .stdout(contains("ADD R1, R2"))
        .stdout(contains("SW R1, #8"));

    std::fs::remove_file(&dest).unwrap();
}

#[test]
fn disassembles_image() {
    nib()
        .args(["disassemble", "tests/files/mixed.bin"])
        .assert()
        .success()
        .stdout(contains(
            "ADD R1, #5\nMV R1, R2\nError: Invalid code length of 4. Expected 16 bits.\nRET\n",
        ));
}

#[test]
fn rejects_unknown_extension() {
    nib()
        .args(["run", "Cargo.toml"])
        .assert()
        .failure()
        .stderr(contains("unknown extension"));
}

#[test]
fn comment_lines_with_digits() {
    nib()
        .args(["run", "tests/files/comments.asm", "--minimal", "--expect", "R1=7"])
        .assert()
        .success()
        .stdout(contains("Assembling"));
}
