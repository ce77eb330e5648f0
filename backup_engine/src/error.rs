//! Operation errors of the backup engines.

use backup_types::meta::MetaError;
use blob_store::BlobStoreError;
use data_engine::EngineError;
use snafu::Snafu;
use std::time::Duration;

/// Why a backup, restore or catalog operation stopped.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[allow(missing_docs)]
pub enum Error {
    #[snafu(display("invalid request: {}", reason))]
    InvalidInput { reason: String },

    #[snafu(display("backup does not exist: {}", name))]
    BackupNotFound { name: String },

    #[snafu(display("backup {} is missing its {} meta", name, level))]
    IncompleteBackup { name: String, level: &'static str },

    #[snafu(display("Binlog file not exist: {}", path))]
    MissingSourceBlob { path: String },

    #[snafu(display("binlog path is not under the configured storage root: {}", path))]
    PathNotUnderRoot { path: String },

    #[snafu(display("load target collection already exists in the cluster: {}", target))]
    TargetCollectionExists { target: String },

    #[snafu(display("blob store operation failed: {}", source))]
    Store { source: BlobStoreError },

    #[snafu(display("data engine request failed: {}", source))]
    Engine { source: EngineError },

    #[snafu(display("backup meta codec failed: {}", source))]
    Meta { source: MetaError },

    #[snafu(display(
        "bulk ingest task {} did not reach a terminal state within {:?}",
        task_id,
        timeout
    ))]
    BulkloadTimeout { task_id: i64, timeout: Duration },

    #[snafu(display("bulk ingest task {} failed: {}", task_id, reason))]
    BulkloadFailed { task_id: i64, reason: String },

    #[snafu(display("operation cancelled"))]
    Cancelled,
}

/// Result alias for engine operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
