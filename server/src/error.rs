use std::fmt;
use std::path::PathBuf;

/// Failure talking to the durable document store.
///
/// None of these are fatal: a failed load degrades to an empty document and a
/// failed save is retried by the next scheduled flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    Read { path: PathBuf, reason: String },
    Parse { path: PathBuf, reason: String },
    Serialize { reason: String },
    Write { path: PathBuf, reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Read { path, reason } => {
                write!(f, "read stats document {} failed: {}", path.display(), reason)
            }
            StoreError::Parse { path, reason } => {
                write!(f, "parse stats document {} failed: {}", path.display(), reason)
            }
            StoreError::Serialize { reason } => {
                write!(f, "serialize stats document failed: {}", reason)
            }
            StoreError::Write { path, reason } => {
                write!(f, "write stats document {} failed: {}", path.display(), reason)
            }
        }
    }
}

impl std::error::Error for StoreError {}
