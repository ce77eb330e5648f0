//! The restore engine behind `LoadBackup`.
//!
//! Restore is planned up front: every target collection name is computed and
//! checked against the live cluster before anything is created, so a
//! conflicting request leaves the cluster untouched. Execution then runs one
//! collection at a time, creating schema and partitions and driving one bulk
//! ingest per partition to a terminal state.

use crate::{
    catalog,
    config::{BackupConfig, BACKUP_ROW_BASED},
    error::{
        BulkloadFailedSnafu, BulkloadTimeoutSnafu, CancelledSnafu, EngineSnafu, Error, Result,
        StoreSnafu, TargetCollectionExistsSnafu,
    },
    paths,
    service::LoadBackupRequest,
};
use backup_types::{BackupInfo, CollectionBackupInfo};
use blob_store::BlobStore;
use data_engine::{BulkloadState, DataEngineClient};
use snafu::{ensure, ResultExt};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Progress of restoring one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadTaskState {
    /// Planned, not started.
    Initial,
    /// Schema, partitions or bulk ingest in flight.
    Executing,
    /// The collection was fully loaded.
    Success,
    /// The restore stopped on this collection.
    Fail,
}

/// One planned or executed per-collection restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionLoadTask {
    /// Collection name inside the backup.
    pub source_collection: String,
    /// Collection name created in the target cluster.
    pub target_collection: String,
    /// Task progress.
    pub state: LoadTaskState,
    /// Failure detail when `state` is [`LoadTaskState::Fail`].
    pub error_message: Option<String>,
}

pub(crate) struct RestoreOutcome {
    pub(crate) backup: BackupInfo,
    pub(crate) tasks: Vec<CollectionLoadTask>,
    /// Set when execution stopped early; planning failures surface as a
    /// plain `Err` instead.
    pub(crate) error: Option<Error>,
}

pub(crate) struct RestoreRun<'a> {
    pub(crate) store: &'a dyn BlobStore,
    pub(crate) engine: &'a dyn DataEngineClient,
    pub(crate) config: &'a BackupConfig,
    pub(crate) token: &'a CancellationToken,
}

impl RestoreRun<'_> {
    pub(crate) async fn run(&self, request: &LoadBackupRequest) -> Result<RestoreOutcome> {
        if !request.collection_suffix.is_empty() {
            paths::validate_rename_suffix(&request.collection_suffix)?;
        }
        let backup_root = self.config.backup_root();
        let backup = catalog::get_backup(self.store, &backup_root, &request.backup_name).await?;

        // plan: which collections, under which target names
        let selected: Vec<&CollectionBackupInfo> = if request.collection_names.is_empty() {
            backup.collections.iter().collect()
        } else {
            backup
                .collections
                .iter()
                .filter(|c| {
                    request
                        .collection_names
                        .iter()
                        .any(|requested| requested == &c.collection_name)
                })
                .collect()
        };
        let mut plan = Vec::with_capacity(selected.len());
        for collection in selected {
            let target = match request.collection_renames.get(&collection.collection_name) {
                Some(renamed) => renamed.clone(),
                None if !request.collection_suffix.is_empty() => {
                    format!("{}{}", collection.collection_name, request.collection_suffix)
                }
                None => collection.collection_name.clone(),
            };
            plan.push((collection, target));
        }

        // admission: no target may exist; abort before creating anything
        for (_, target) in &plan {
            self.ensure_active()?;
            let exists = self
                .engine
                .has_collection(target)
                .await
                .context(EngineSnafu)?;
            ensure!(
                !exists,
                TargetCollectionExistsSnafu {
                    target: target.clone(),
                }
            );
        }

        let mut tasks: Vec<CollectionLoadTask> = plan
            .iter()
            .map(|(collection, target)| CollectionLoadTask {
                source_collection: collection.collection_name.clone(),
                target_collection: target.clone(),
                state: LoadTaskState::Initial,
                error_message: None,
            })
            .collect();

        let mut error = None;
        for (i, (collection, target)) in plan.iter().enumerate() {
            tasks[i].state = LoadTaskState::Executing;
            match self
                .restore_collection(&backup_root, &backup.name, collection, target)
                .await
            {
                Ok(()) => {
                    info!(
                        collection = collection.collection_name.as_str(),
                        load_target = target.as_str(),
                        "collection restored"
                    );
                    tasks[i].state = LoadTaskState::Success;
                }
                Err(e) => {
                    warn!(
                        collection = collection.collection_name.as_str(),
                        load_target = target.as_str(),
                        error = %e,
                        "restore task failed"
                    );
                    tasks[i].state = LoadTaskState::Fail;
                    tasks[i].error_message = Some(e.to_string());
                    error = Some(e);
                    break;
                }
            }
        }

        Ok(RestoreOutcome {
            backup,
            tasks,
            error,
        })
    }

    async fn restore_collection(
        &self,
        backup_root: &str,
        backup_name: &str,
        collection: &CollectionBackupInfo,
        target: &str,
    ) -> Result<()> {
        let mut schema = collection.schema.clone();
        schema.name = target.to_string();
        self.engine
            .create_collection(&schema, collection.shards_num, collection.consistency_level)
            .await
            .context(EngineSnafu)?;

        for partition in &collection.partitions {
            self.ensure_active()?;
            let present = self
                .engine
                .has_partition(target, &partition.partition_name)
                .await
                .context(EngineSnafu)?;
            if !present {
                self.engine
                    .create_partition(target, &partition.partition_name)
                    .await
                    .context(EngineSnafu)?;
            }

            // file arguments come from the backup layout, keyed by the
            // original collection and partition ids
            let insert_dir = paths::partition_log_dir(
                backup_root,
                backup_name,
                paths::INSERT_LOG_DIR,
                collection.collection_id,
                partition.partition_id,
            );
            let delta_dir = paths::partition_log_dir(
                backup_root,
                backup_name,
                paths::DELTA_LOG_DIR,
                collection.collection_id,
                partition.partition_id,
            );
            let has_deltas = !self
                .store
                .list_with_prefix(&delta_dir, true)
                .await
                .context(StoreSnafu)?
                .is_empty();
            let files = if has_deltas {
                vec![insert_dir, delta_dir]
            } else {
                vec![insert_dir, String::new()]
            };

            let task_ids = self
                .engine
                .bulkload(
                    target,
                    &partition.partition_name,
                    BACKUP_ROW_BASED,
                    &files,
                    &[
                        ("end_ts", collection.backup_timestamp.to_string()),
                        ("backup", "true".to_string()),
                    ],
                )
                .await
                .context(EngineSnafu)?;
            debug!(
                collection = target,
                partition = partition.partition_name.as_str(),
                tasks = task_ids.len(),
                "bulk ingest submitted"
            );
            for task_id in task_ids {
                self.poll_bulkload(task_id).await?;
            }
        }
        Ok(())
    }

    /// Poll one bulk-ingest task to a terminal state within the configured
    /// deadline.
    async fn poll_bulkload(&self, task_id: i64) -> Result<()> {
        let started = Instant::now();
        loop {
            self.ensure_active()?;
            let status = self
                .engine
                .bulkload_state(task_id)
                .await
                .context(EngineSnafu)?;
            match status.state {
                BulkloadState::Completed => return Ok(()),
                BulkloadState::Failed => {
                    return BulkloadFailedSnafu {
                        task_id,
                        reason: status.reason,
                    }
                    .fail();
                }
                BulkloadState::Pending | BulkloadState::Running => {}
            }
            ensure!(
                started.elapsed() < self.config.bulkload_timeout,
                BulkloadTimeoutSnafu {
                    task_id,
                    timeout: self.config.bulkload_timeout,
                }
            );
            tokio::time::sleep(self.config.bulkload_poll_interval).await;
        }
    }

    fn ensure_active(&self) -> Result<()> {
        ensure!(!self.token.is_cancelled(), CancelledSnafu);
        Ok(())
    }
}
