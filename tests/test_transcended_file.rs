use std::fs;
use std::path::PathBuf;

use clusterflow::{
    domain::transcended_file::{StagingPolicy, TranscendedFile, Transfer, TransferOptions, TransferSet},
    error::{Error, Result},
};
use tempfile::TempDir;

fn failing_operation(path: &std::path::Path) -> Result<()> {
    fs::write(path, "partial")?;
    Err(Error::CompileIntegrity("forced failure".to_string()))
}

#[test]
fn test_cleanup_runs_when_operation_fails() {
    let store = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let remote = store.path().join("result.txt");

    let mut local = PathBuf::new();
    let outcome = (|| -> Result<()> {
        let guard = TranscendedFile::to_remote(&remote, TransferOptions::with_scratch_root(scratch.path()))?.enter()?;
        local = guard.local_path().to_path_buf();
        failing_operation(guard.local_path())?;
        guard.finish()
    })();

    assert!(outcome.is_err());
    assert!(!local.as_os_str().is_empty());
    assert!(!local.exists());
    assert!(!remote.exists());
    assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[test]
fn test_stage_in_and_out_round_trip() {
    let store = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let remote = store.path().join("counter.txt");
    fs::write(&remote, "1").unwrap();

    let options = TransferOptions::with_scratch_root(scratch.path());
    let guard = TranscendedFile::new(&remote, Transfer::From { return_file: true }, options).unwrap().enter().unwrap();
    let local = guard.local_path().to_path_buf();
    assert_ne!(local, remote);
    assert_eq!(fs::read_to_string(&local).unwrap(), "1");

    fs::write(&local, "2").unwrap();
    guard.finish().unwrap();

    assert_eq!(fs::read_to_string(&remote).unwrap(), "2");
    assert!(!local.exists());
}

#[test]
fn test_read_only_input_is_not_written_back() {
    let store = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let remote = store.path().join("input.txt");
    fs::write(&remote, "original").unwrap();

    let guard = TranscendedFile::from_remote(&remote, TransferOptions::with_scratch_root(scratch.path())).unwrap().enter().unwrap();
    fs::write(guard.local_path(), "changed").unwrap();
    guard.finish().unwrap();

    assert_eq!(fs::read_to_string(&remote).unwrap(), "original");
}

#[test]
fn test_strict_policy_fails_on_missing_source() {
    let store = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let missing = store.path().join("missing.txt");

    let options = TransferOptions::with_scratch_root(scratch.path()).with_policy(StagingPolicy::Strict);
    let result = TranscendedFile::from_remote(&missing, options).unwrap().enter();

    assert!(matches!(result, Err(Error::Staging(path)) if path == missing));
    assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[test]
fn test_lenient_policy_skips_missing_output() {
    let store = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let remote = store.path().join("never_written.txt");

    let guard = TranscendedFile::to_remote(&remote, TransferOptions::with_scratch_root(scratch.path())).unwrap().enter().unwrap();
    guard.finish().unwrap();

    assert!(!remote.exists());
}

#[test]
fn test_transfer_set_releases_every_member() {
    let store = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let input = store.path().join("in.txt");
    fs::write(&input, "in").unwrap();
    let output = store.path().join("out.txt");

    let options = TransferOptions::with_scratch_root(scratch.path());
    let files = vec![
        TranscendedFile::from_remote(&input, options.clone()).unwrap(),
        TranscendedFile::to_remote(&output, options).unwrap(),
    ];
    let set = TransferSet::enter(files).unwrap();
    assert_eq!(set.len(), 2);

    let locals: Vec<PathBuf> = set.local_paths().map(|path| path.to_path_buf()).collect();
    let content = fs::read_to_string(&locals[0]).unwrap();
    fs::write(&locals[1], content.to_uppercase()).unwrap();
    set.finish().unwrap();

    assert_eq!(fs::read_to_string(&output).unwrap(), "IN");
    assert!(locals.iter().all(|local| !local.exists()));
}

#[test]
fn test_dropped_transfer_set_publishes_nothing() {
    let store = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let output = store.path().join("out.txt");

    let options = TransferOptions::with_scratch_root(scratch.path());
    let set = TransferSet::enter(vec![TranscendedFile::to_remote(&output, options).unwrap()]).unwrap();
    let local = set.local_paths().next().unwrap().to_path_buf();
    fs::write(&local, "partial").unwrap();
    drop(set);

    assert!(!local.exists());
    assert!(!output.exists());
}

#[test]
fn test_failed_enter_releases_earlier_members() {
    let store = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let present = store.path().join("present.txt");
    fs::write(&present, "data").unwrap();

    let options = TransferOptions::with_scratch_root(scratch.path()).with_policy(StagingPolicy::Strict);
    let files = vec![
        TranscendedFile::from_remote(&present, options.clone()).unwrap(),
        TranscendedFile::from_remote(store.path().join("absent.txt"), options).unwrap(),
    ];

    assert!(matches!(TransferSet::enter(files), Err(Error::Staging(_))));
    assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
}
