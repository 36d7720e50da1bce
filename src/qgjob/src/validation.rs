//! Client-side checks run before anything is sent to the server.

use qgjob_core::types::Priority;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Priority must be between 1 and 5")]
    Priority,
    #[error("Test file not found: {0}")]
    TestFileMissing(String),
    #[error("Invalid test file type. Must be .js, .ts, .spec.js, or .spec.ts: {0}")]
    TestFileType(String),
}

pub fn validate_priority(value: i64) -> Result<Priority, ValidationError> {
    Priority::new(value).map_err(|_| ValidationError::Priority)
}

/// Resolve `test_path` against `cwd`, check it is a JavaScript or TypeScript
/// file and return the absolute path.
pub fn validate_test_file(test_path: &str, cwd: &Path) -> Result<PathBuf, ValidationError> {
    let path = Path::new(test_path);
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };

    if !path.is_file() {
        return Err(ValidationError::TestFileMissing(test_path.to_string()));
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some("js") | Some("ts") => Ok(path),
        _ => Err(ValidationError::TestFileType(test_path.to_string())),
    }
}
