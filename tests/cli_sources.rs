use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn sources_lists_every_registered_adapter() {
    let mut cmd = Command::cargo_bin("novelbind").expect("binary built");
    cmd.arg("sources")
        .assert()
        .success()
        .stdout(predicate::str::contains("readnovelfull"))
        .stdout(predicate::str::contains("readernovel"))
        .stdout(predicate::str::contains("lightnovelworld"))
        .stdout(predicate::str::contains("wattpad"));
}

#[test]
fn build_rejects_urls_no_adapter_matches() {
    let temp = tempfile::TempDir::new().expect("tempdir");
    let mut cmd = Command::cargo_bin("novelbind").expect("binary built");
    cmd.args([
        "build",
        "https://unknown.example.test/novel",
        "--output",
        temp.path().to_str().expect("utf-8 path"),
        "--yes",
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("no source adapter matches"));

    // Selection fails before any output is laid down.
    assert_eq!(std::fs::read_dir(temp.path()).expect("read dir").count(), 0);
}

#[test]
fn build_requires_a_url() {
    let mut cmd = Command::cargo_bin("novelbind").expect("binary built");
    cmd.arg("build").assert().failure();
}
