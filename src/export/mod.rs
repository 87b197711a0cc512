// Export module
// Per-track artifact layout on disk

pub mod storage;

pub use storage::{calculate_sha256, store_file, store_json, track_dir, StorageError, StorageResult, StoredArtifact};
