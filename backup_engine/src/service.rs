//! The five-operation backup surface.
//!
//! [`BackupService`] serializes the mutating operations (`create_backup`,
//! `load_backup`) behind one process-wide mutex; the catalog reads run
//! without it and observe only backups whose root meta blob was written.

use crate::{
    catalog,
    config::BackupConfig,
    error::{Error, InvalidInputSnafu},
    restore::{CollectionLoadTask, RestoreRun},
    snapshot::SnapshotRun,
};
use backup_types::BackupInfo;
use blob_store::BlobStore;
use data_engine::{DataEngineClient, EngineErrorKind};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Coarse outcome of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// The operation completed.
    Success,
    /// The data engine or the blob store was unreachable.
    ConnectFailed,
    /// Anything else; see the reason.
    UnexpectedError,
}

/// Outcome of an operation plus a human-readable reason on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestStatus {
    /// Coarse outcome.
    pub status_code: StatusCode,
    /// Human-readable failure reason; empty on success.
    pub reason: String,
}

impl RequestStatus {
    /// A successful status with no reason.
    pub fn success() -> Self {
        Self {
            status_code: StatusCode::Success,
            reason: String::new(),
        }
    }

    /// Classify an engine error into a wire status.
    pub fn from_error(error: &Error) -> Self {
        let status_code = match error {
            Error::Engine { source } if source.kind() == EngineErrorKind::Connect => {
                StatusCode::ConnectFailed
            }
            _ => StatusCode::UnexpectedError,
        };
        Self {
            status_code,
            reason: error.to_string(),
        }
    }

    /// Did the operation complete?
    pub fn is_success(&self) -> bool {
        self.status_code == StatusCode::Success
    }
}

/// Arguments of `CreateBackup`.
#[derive(Debug, Clone, Default)]
pub struct CreateBackupRequest {
    /// Requested backup name; empty for an engine-assigned one.
    pub backup_name: String,
    /// Collections to capture; empty for all.
    pub collection_names: Vec<String>,
}

/// Result of `CreateBackup`.
#[derive(Debug, Clone)]
pub struct CreateBackupResponse {
    /// Outcome.
    pub status: RequestStatus,
    /// The completed backup on success.
    pub backup_info: Option<BackupInfo>,
}

/// Arguments of `GetBackup`.
#[derive(Debug, Clone, Default)]
pub struct GetBackupRequest {
    /// Name of the backup to read.
    pub backup_name: String,
}

/// Result of `GetBackup`.
#[derive(Debug, Clone)]
pub struct GetBackupResponse {
    /// Outcome.
    pub status: RequestStatus,
    /// The backup, when readable.
    pub backup_info: Option<BackupInfo>,
}

/// Arguments of `ListBackups`.
#[derive(Debug, Clone, Default)]
pub struct ListBackupsRequest {
    /// Keep only backups containing a collection of this name.
    pub collection_name: Option<String>,
}

/// Result of `ListBackups`.
#[derive(Debug, Clone)]
pub struct ListBackupsResponse {
    /// Outcome of the listing itself.
    pub status: RequestStatus,
    /// Every readable backup.
    pub backup_infos: Vec<BackupInfo>,
    /// Names of backups that exist but could not be read.
    pub fail_backups: Vec<String>,
}

/// Arguments of `DeleteBackup`.
#[derive(Debug, Clone, Default)]
pub struct DeleteBackupRequest {
    /// Name of the backup to delete.
    pub backup_name: String,
}

/// Result of `DeleteBackup`.
#[derive(Debug, Clone)]
pub struct DeleteBackupResponse {
    /// Outcome.
    pub status: RequestStatus,
}

/// Arguments of `LoadBackup`.
#[derive(Debug, Clone, Default)]
pub struct LoadBackupRequest {
    /// Name of the backup to restore from.
    pub backup_name: String,
    /// Collections to restore; empty for all in the backup.
    pub collection_names: Vec<String>,
    /// Per-collection target names; wins over the suffix.
    pub collection_renames: HashMap<String, String>,
    /// Suffix appended to collection names without an explicit rename.
    pub collection_suffix: String,
}

/// Result of `LoadBackup`.
#[derive(Debug, Clone)]
pub struct LoadBackupResponse {
    /// Outcome.
    pub status: RequestStatus,
    /// The backup that was restored from.
    pub backup_info: Option<BackupInfo>,
    /// Per-collection progress, in plan order.
    pub collection_load_tasks: Vec<CollectionLoadTask>,
}

/// Entry point to backup, restore and catalog operations.
#[derive(Debug)]
pub struct BackupService {
    store: Arc<dyn BlobStore>,
    engine: Arc<dyn DataEngineClient>,
    config: BackupConfig,
    token: CancellationToken,
    /// Serializes the mutating operations; at most one snapshot or restore
    /// is in flight per process.
    op_lock: Mutex<()>,
}

impl BackupService {
    /// Create a service over the given adapters.
    pub fn new(
        store: Arc<dyn BlobStore>,
        engine: Arc<dyn DataEngineClient>,
        config: BackupConfig,
    ) -> Self {
        Self::with_cancellation(store, engine, config, CancellationToken::new())
    }

    /// Like [`Self::new`], with an ambient cancellation token checked
    /// between I/O calls of the mutating operations.
    pub fn with_cancellation(
        store: Arc<dyn BlobStore>,
        engine: Arc<dyn DataEngineClient>,
        config: BackupConfig,
        token: CancellationToken,
    ) -> Self {
        Self {
            store,
            engine,
            config,
            token,
            op_lock: Mutex::new(()),
        }
    }

    /// Snapshot the requested collections into a new backup.
    pub async fn create_backup(&self, request: CreateBackupRequest) -> CreateBackupResponse {
        let _guard = self.op_lock.lock().await;
        info!(
            backup = request.backup_name.as_str(),
            collections = request.collection_names.len(),
            "create backup"
        );
        let run = SnapshotRun {
            store: self.store.as_ref(),
            engine: self.engine.as_ref(),
            config: &self.config,
            token: &self.token,
        };
        match run.run(&request).await {
            Ok(backup) => CreateBackupResponse {
                status: RequestStatus::success(),
                backup_info: Some(backup),
            },
            Err(e) => {
                warn!(backup = request.backup_name.as_str(), error = %e, "create backup failed");
                CreateBackupResponse {
                    status: RequestStatus::from_error(&e),
                    backup_info: None,
                }
            }
        }
    }

    /// Read one backup from its meta blobs.
    pub async fn get_backup(&self, request: GetBackupRequest) -> GetBackupResponse {
        let result = self.read_backup(&request.backup_name).await;
        match result {
            Ok(backup) => GetBackupResponse {
                status: RequestStatus::success(),
                backup_info: Some(backup),
            },
            Err(e) => GetBackupResponse {
                status: RequestStatus::from_error(&e),
                backup_info: None,
            },
        }
    }

    /// List every readable backup under the backup root.
    pub async fn list_backups(&self, request: ListBackupsRequest) -> ListBackupsResponse {
        let result = catalog::list_backups(
            self.store.as_ref(),
            &self.config.backup_root(),
            request.collection_name.as_deref(),
        )
        .await;
        match result {
            Ok((backup_infos, fail_backups)) => ListBackupsResponse {
                status: RequestStatus::success(),
                backup_infos,
                fail_backups,
            },
            Err(e) => ListBackupsResponse {
                status: RequestStatus::from_error(&e),
                backup_infos: vec![],
                fail_backups: vec![],
            },
        }
    }

    /// Remove every object under one backup's prefix.
    pub async fn delete_backup(&self, request: DeleteBackupRequest) -> DeleteBackupResponse {
        let result = async {
            require_name(&request.backup_name)?;
            catalog::delete_backup(
                self.store.as_ref(),
                &self.config.backup_root(),
                &request.backup_name,
            )
            .await
        }
        .await;
        match result {
            Ok(()) => {
                info!(backup = request.backup_name.as_str(), "backup deleted");
                DeleteBackupResponse {
                    status: RequestStatus::success(),
                }
            }
            Err(e) => DeleteBackupResponse {
                status: RequestStatus::from_error(&e),
            },
        }
    }

    /// Restore collections from a backup into the live cluster.
    pub async fn load_backup(&self, request: LoadBackupRequest) -> LoadBackupResponse {
        let _guard = self.op_lock.lock().await;
        info!(
            backup = request.backup_name.as_str(),
            collections = request.collection_names.len(),
            "load backup"
        );
        let run = RestoreRun {
            store: self.store.as_ref(),
            engine: self.engine.as_ref(),
            config: &self.config,
            token: &self.token,
        };
        let planned = async {
            require_name(&request.backup_name)?;
            run.run(&request).await
        }
        .await;
        match planned {
            Ok(outcome) => LoadBackupResponse {
                status: match &outcome.error {
                    None => RequestStatus::success(),
                    Some(e) => RequestStatus::from_error(e),
                },
                backup_info: Some(outcome.backup),
                collection_load_tasks: outcome.tasks,
            },
            Err(e) => {
                warn!(backup = request.backup_name.as_str(), error = %e, "load backup failed");
                LoadBackupResponse {
                    status: RequestStatus::from_error(&e),
                    backup_info: None,
                    collection_load_tasks: vec![],
                }
            }
        }
    }

    async fn read_backup(&self, name: &str) -> Result<BackupInfo, Error> {
        require_name(name)?;
        catalog::get_backup(self.store.as_ref(), &self.config.backup_root(), name).await
    }
}

fn require_name(name: &str) -> Result<(), Error> {
    if name.is_empty() {
        InvalidInputSnafu {
            reason: "backup name is required",
        }
        .fail()
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_engine::EngineError;

    #[test]
    fn connect_errors_map_to_connect_failed() {
        let status = RequestStatus::from_error(&Error::Engine {
            source: EngineError::connect("cluster unreachable"),
        });
        assert_eq!(status.status_code, StatusCode::ConnectFailed);

        let status = RequestStatus::from_error(&Error::Engine {
            source: EngineError::request("bad request"),
        });
        assert_eq!(status.status_code, StatusCode::UnexpectedError);
    }

    #[test]
    fn other_errors_map_to_unexpected() {
        let status = RequestStatus::from_error(&Error::BackupNotFound { name: "b".into() });
        assert_eq!(status.status_code, StatusCode::UnexpectedError);
        assert_eq!(status.reason, "backup does not exist: b");
    }
}
