//! Backup and restore engines for a distributed vector database.
//!
//! [`BackupService`] exposes the five operations of the backup surface:
//! snapshotting selected collections into an object-storage namespace
//! ([`BackupService::create_backup`]), cataloguing and deleting existing
//! backups, and rebuilding collections from a backup through the cluster's
//! bulk-ingest path ([`BackupService::load_backup`]).
//!
//! The service talks to the world through two adapters: a
//! [`blob_store::BlobStore`] for the object storage holding binlogs and
//! backup metadata, and a [`data_engine::DataEngineClient`] for the live
//! cluster.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    clippy::explicit_iter_loop,
    clippy::future_not_send,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

mod catalog;
mod config;
mod error;
pub mod paths;
mod restore;
mod service;
mod snapshot;

pub use config::{
    BackupConfig, BACKUP_ROW_BASED, DEFAULT_BACKUP_PREFIX, DEFAULT_BULKLOAD_POLL_INTERVAL,
    DEFAULT_BULKLOAD_TIMEOUT, DEFAULT_COPY_CONCURRENCY, DEFAULT_ROOT_PATH,
};
pub use error::{Error, Result};
pub use restore::{CollectionLoadTask, LoadTaskState};
pub use service::{
    BackupService, CreateBackupRequest, CreateBackupResponse, DeleteBackupRequest,
    DeleteBackupResponse, GetBackupRequest, GetBackupResponse, ListBackupsRequest,
    ListBackupsResponse, LoadBackupRequest, LoadBackupResponse, RequestStatus, StatusCode,
};
