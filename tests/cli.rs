use std::fs;
use std::path::Path;
use std::process::Command;

fn xp4rel(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_xp4rel"))
        .args(args)
        .output()
        .unwrap_or_else(|error| panic!("failed to run xp4rel: {}", error))
}

fn xp4rel_in(dir: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_xp4rel"))
        .current_dir(dir)
        .args(args)
        .output()
        .unwrap_or_else(|error| panic!("failed to run xp4rel: {}", error))
}

#[test]
fn xp4rel_help_lists_commands() {
    let output = xp4rel(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("stdout is UTF-8");
    for command in ["build", "diff", "list", "extract", "compact"] {
        assert!(stdout.contains(command), "missing {}", command);
    }
}

#[test]
fn xp4rel_build_then_list() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    fs::write(src.path().join("a.txt"), b"hello").unwrap();
    let archive = out.path().join("data.xp4");
    let archive = archive.to_str().unwrap();

    let output = xp4rel(&["-q", "build", archive, "-t", src.path().to_str().unwrap()]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8(output.stdout).unwrap().trim(), "A /a.txt");

    let output = xp4rel(&["list", archive, "--json"]);
    assert!(output.status.success());
    let listing: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(listing[0]["files"][0]["name"], "/a.txt");
    assert_eq!(listing[0]["files"][0]["state"], "added");
    assert_eq!(listing[0]["files"][0]["size"], 5);

    fs::write(src.path().join("b.txt"), b"world").unwrap();
    let output = xp4rel(&["-q", "diff", archive, "--json"]);
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["changes"][0]["path"], "/b.txt");
    assert_eq!(report["summary"]["added"], 1);
    assert_eq!(report["volumes"].as_array().unwrap().len(), 0);
}

#[test]
fn xp4rel_reports_errors_with_exit_code() {
    let out = tempfile::tempdir().unwrap();
    let bogus = out.path().join("bogus.xp4");
    fs::write(&bogus, b"not an archive at all").unwrap();
    let output = xp4rel(&["list", bogus.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not an XP4 archive"), "{}", stderr);
}

#[test]
fn xp4rel_records_absolute_target_dir() {
    let work = tempfile::tempdir().unwrap();
    let elsewhere = tempfile::tempdir().unwrap();
    fs::create_dir(work.path().join("content")).unwrap();
    fs::write(work.path().join("content").join("a.txt"), b"hello").unwrap();

    let output = xp4rel_in(
        work.path(),
        &["-q", "build", "data.xp4", "-t", "content", "--json"],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let content = work.path().join("content").canonicalize().unwrap();
    assert_eq!(report["target_dir"], content.to_str().unwrap());

    let archive = work.path().join("data.xp4");
    let output = xp4rel_in(
        elsewhere.path(),
        &["-q", "diff", archive.to_str().unwrap(), "--json"],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["target_dir"], content.to_str().unwrap());
    assert_eq!(report["changes"].as_array().unwrap().len(), 0);
    assert_eq!(report["summary"]["unchanged"], 1);
}
