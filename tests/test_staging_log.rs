use log::Level;
use logtest::Logger;

use clusterflow::domain::transcended_file::{TranscendedFile, TransferOptions};
use tempfile::TempDir;

// Only test in this binary: the captured logger is process wide.
#[test]
fn test_lenient_staging_logs_missing_files() {
    let mut logger = Logger::start();

    let store = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let missing_input = store.path().join("missing_input.txt");
    let missing_output = store.path().join("missing_output.txt");
    let options = TransferOptions::with_scratch_root(scratch.path());

    let guard = TranscendedFile::from_remote(&missing_input, options.clone()).unwrap().enter().unwrap();
    guard.finish().unwrap();
    let guard = TranscendedFile::to_remote(&missing_output, options).unwrap().enter().unwrap();
    guard.finish().unwrap();

    let mut errors = Vec::new();
    while let Some(record) = logger.pop() {
        if record.level() == Level::Error {
            errors.push(record.args().to_string());
        }
    }

    assert_eq!(errors.len(), 2);
    assert!(errors.iter().any(|message| message.contains("missing_input.txt")));
    assert!(errors.iter().all(|message| message.contains("does not exist")));
    assert!(!missing_output.exists());
}
