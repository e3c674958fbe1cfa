mod helpers;

use anyhow::Result;
use assert_cmd::prelude::*;
use helpers::proc_tree::ProcTree;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

fn statsnap_bin() -> Result<Command> {
    Ok(Command::cargo_bin("statsnap")?)
}

fn config_for(tree: &ProcTree) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, "[procfs]")?;
    writeln!(file, "proc_root = {:?}", tree.proc_root().display().to_string())?;
    writeln!(file, "passwd_path = {:?}", tree.passwd_path().display().to_string())?;
    Ok(file)
}

#[test]
fn test_invalid_pid_selector_fails() -> Result<()> {
    let mut cmd = statsnap_bin()?;
    cmd.arg("--pid").arg("abc");

    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("invalid pid selector 'abc'"));

    Ok(())
}

#[test]
fn test_zero_interval_fails() -> Result<()> {
    let mut cmd = statsnap_bin()?;
    cmd.arg("--interval-ms").arg("0");

    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("interval_ms must be greater than zero"));

    Ok(())
}

#[test]
fn test_missing_config_file_fails() -> Result<()> {
    let mut cmd = statsnap_bin()?;
    cmd.arg("--config").arg("/tmp/this/file/does/not/exist.toml");

    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("Configuration file not found"));

    Ok(())
}

#[cfg(target_os = "linux")]
#[test]
fn test_prints_report_from_fixture_tree() -> Result<()> {
    let tree = ProcTree::new();
    tree.write_stat(100, 0, 50, 1_000);
    tree.write_meminfo(8 * 1024 * 1024, 2 * 1024 * 1024);
    tree.write_diskstats(&[("sda", 100)]);
    tree.add_process(1, "init", 0, 10, 10, 168_000_000, Some(12 * 1024));
    let config = config_for(&tree)?;

    let mut cmd = statsnap_bin()?;
    cmd.arg("--config")
        .arg(config.path())
        .arg("--interval-ms")
        .arg("50")
        .arg("--warmup-ticks")
        .arg("1")
        .arg("--pretty");

    cmd.assert()
        .success()
        .stdout(predicates::str::contains("\"memory_usage\": \"75.0%\""))
        .stdout(predicates::str::contains("\"memory_total\": \"8.00GB\""))
        .stdout(predicates::str::contains("\"issue_detected\": []"))
        .stdout(predicates::str::contains("\"generated_at\""));

    Ok(())
}

#[test]
fn test_unknown_rank_dimension_fails() -> Result<()> {
    let mut cmd = statsnap_bin()?;
    cmd.arg("--rank").arg("disk");

    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("unknown ranking dimension 'disk'"));

    Ok(())
}

#[cfg(target_os = "linux")]
#[test]
fn test_prints_single_ranking_from_fixture_tree() -> Result<()> {
    let tree = ProcTree::new();
    tree.write_stat(100, 0, 50, 1_000);
    tree.write_meminfo(8 * 1024 * 1024, 2 * 1024 * 1024);
    tree.write_diskstats(&[("sda", 100)]);
    tree.add_process(1, "init", 0, 10, 10, 168_000_000, Some(12 * 1024));
    let config = config_for(&tree)?;

    let mut cmd = statsnap_bin()?;
    cmd.arg("--config")
        .arg(config.path())
        .arg("--interval-ms")
        .arg("50")
        .arg("--warmup-ticks")
        .arg("2")
        .arg("--rank")
        .arg("cpu");

    cmd.assert()
        .success()
        .stdout(predicates::str::starts_with("[{\"pid\":1,\"name\":\"init\""))
        .stdout(predicates::str::contains("vm_stat").not());

    Ok(())
}
