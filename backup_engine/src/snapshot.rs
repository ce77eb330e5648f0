//! The snapshot engine behind `CreateBackup`.
//!
//! A snapshot binds a logical backup point to a set of sealed segments and
//! captures their binlogs: collection metadata is collected first, a flush
//! seals the snapshot point, the persisted segment layout is enumerated, and
//! every referenced insert and delta log is copied under the backup's own
//! prefix. The four meta blobs are written last, root header at the very
//! end; a backup without its root blob is invisible to readers.

use crate::{
    config::BackupConfig,
    error::{
        CancelledSnafu, EngineSnafu, InvalidInputSnafu, MetaSnafu, MissingSourceBlobSnafu, Result,
        StoreSnafu,
    },
    paths,
    service::CreateBackupRequest,
};
use backup_types::{
    compose_ts, meta, BackupInfo, BackupStatus, Binlog, CollectionBackupInfo, FieldBinlog,
    PartitionBackupInfo, SegmentBackupInfo,
};
use blob_store::BlobStore;
use chrono::Utc;
use data_engine::{DataEngineClient, SegmentInfo};
use futures::{stream, StreamExt};
use snafu::{ensure, ResultExt};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub(crate) struct SnapshotRun<'a> {
    pub(crate) store: &'a dyn BlobStore,
    pub(crate) engine: &'a dyn DataEngineClient,
    pub(crate) config: &'a BackupConfig,
    pub(crate) token: &'a CancellationToken,
}

impl SnapshotRun<'_> {
    pub(crate) async fn run(&self, request: &CreateBackupRequest) -> Result<BackupInfo> {
        let backup_root = self.config.backup_root();
        let mut name = request.backup_name.clone();

        // admission
        if !name.is_empty() {
            paths::validate_backup_name(&name)?;
            let root_meta = paths::meta_path(&backup_root, &name, paths::BACKUP_META_FILE);
            let taken = self.store.exist(&root_meta).await.context(StoreSnafu)?;
            ensure!(
                !taken,
                InvalidInputSnafu {
                    reason: format!("backup already exists with the name: {}", name),
                }
            );
        }

        // choose the collection set
        let collection_names: Vec<String> = if request.collection_names.is_empty() {
            self.engine
                .list_collections()
                .await
                .context(EngineSnafu)?
                .into_iter()
                .map(|c| c.name)
                .collect()
        } else {
            for requested in &request.collection_names {
                let known = self
                    .engine
                    .has_collection(requested)
                    .await
                    .context(EngineSnafu)?;
                ensure!(
                    known,
                    InvalidInputSnafu {
                        reason: format!("request backup collection does not exist: {}", requested),
                    }
                );
            }
            request.collection_names.clone()
        };

        let mut collections = Vec::with_capacity(collection_names.len());
        for collection_name in &collection_names {
            self.ensure_active()?;
            collections.push(self.snapshot_collection(collection_name).await?);
        }

        if name.is_empty() {
            name = format!("backup_{}", Utc::now().timestamp());
        }

        self.copy_binlogs(&backup_root, &name, &collections).await?;

        let backup = BackupInfo {
            id: String::new(),
            name,
            backup_timestamp: Utc::now().timestamp() as u64,
            status: BackupStatus::Success,
            error_message: None,
            collections,
        };
        self.write_meta(&backup_root, &backup).await?;
        info!(
            backup = backup.name.as_str(),
            collections = backup.collections.len(),
            "backup complete"
        );
        Ok(backup)
    }

    /// Collect the full state of one collection: schema and partitions, then
    /// a flush to seal the snapshot point, then the layout of every segment
    /// the seal covered.
    async fn snapshot_collection(&self, name: &str) -> Result<CollectionBackupInfo> {
        // listing results are incomplete; always re-describe
        let description = self
            .engine
            .describe_collection(name)
            .await
            .context(EngineSnafu)?;
        let partitions = self
            .engine
            .show_partitions(name)
            .await
            .context(EngineSnafu)?;

        let flush = self.engine.flush(name).await.context(EngineSnafu)?;
        let snapshot_set: HashSet<i64> = flush
            .new_sealed
            .iter()
            .chain(flush.already_sealed.iter())
            .copied()
            .collect();
        let backup_timestamp = compose_ts(flush.seal_time * 1000, 0);
        debug!(
            collection = name,
            sealed = snapshot_set.len(),
            seal_time = flush.seal_time,
            "snapshot point sealed"
        );

        let mut partition_infos: Vec<PartitionBackupInfo> = partitions
            .iter()
            .map(|p| PartitionBackupInfo {
                partition_id: p.id,
                partition_name: p.name.clone(),
                collection_id: description.id,
                size: 0,
                segments: vec![],
            })
            .collect();
        let partition_idx: HashMap<i64, usize> = partition_infos
            .iter()
            .enumerate()
            .map(|(i, p)| (p.partition_id, i))
            .collect();

        let reported = self
            .engine
            .get_persistent_segments(name)
            .await
            .context(EngineSnafu)?;
        for segment in reported {
            if !snapshot_set.contains(&segment.id) {
                // the segment was created after the seal; directory listings
                // alone never admit a segment
                debug!(
                    collection = name,
                    segment_id = segment.id,
                    "segment postdates the snapshot point, skipped"
                );
                continue;
            }
            self.ensure_active()?;
            let info = self.collect_segment(&segment).await?;
            match partition_idx.get(&segment.partition_id) {
                Some(&i) => partition_infos[i].segments.push(info),
                None => warn!(
                    collection = name,
                    segment_id = segment.id,
                    partition_id = segment.partition_id,
                    "segment references an unknown partition, skipped"
                ),
            }
        }

        for partition in &mut partition_infos {
            partition.size = partition.segments.iter().map(|s| s.size).sum();
        }
        let size = partition_infos.iter().map(|p| p.size).sum();

        Ok(CollectionBackupInfo {
            collection_id: description.id,
            collection_name: description.name,
            db_name: String::new(),
            schema: description.schema,
            shards_num: description.shards_num,
            consistency_level: description.consistency_level,
            backup_timestamp,
            size,
            partitions: partition_infos,
        })
    }

    async fn collect_segment(&self, segment: &SegmentInfo) -> Result<SegmentBackupInfo> {
        let root = self.config.root_path.as_str();
        let binlogs = self
            .list_field_binlogs(root, paths::INSERT_LOG_DIR, segment)
            .await?;
        if binlogs.is_empty() {
            warn!(
                segment_id = segment.id,
                collection_id = segment.collection_id,
                "segment reports no insert binlogs"
            );
        }
        let deltalogs = self
            .list_field_binlogs(root, paths::DELTA_LOG_DIR, segment)
            .await?;
        let statslogs = self
            .list_field_binlogs(root, paths::STATS_LOG_DIR, segment)
            .await?;

        let mut info = SegmentBackupInfo {
            segment_id: segment.id,
            collection_id: segment.collection_id,
            partition_id: segment.partition_id,
            num_of_rows: segment.num_rows,
            size: 0,
            binlogs,
            deltalogs,
            statslogs,
        };
        info.size = info.logged_bytes();
        Ok(info)
    }

    /// One [`FieldBinlog`] per field directory under the segment, records in
    /// store-returned order.
    async fn list_field_binlogs(
        &self,
        root: &str,
        log_dir: &str,
        segment: &SegmentInfo,
    ) -> Result<Vec<FieldBinlog>> {
        let prefix = paths::segment_log_dir(
            root,
            log_dir,
            segment.collection_id,
            segment.partition_id,
            segment.id,
        );
        let entries = self
            .store
            .list_with_prefix(&prefix, true)
            .await
            .context(StoreSnafu)?;

        let mut fields: BTreeMap<i64, Vec<Binlog>> = BTreeMap::new();
        for entry in entries {
            let relative = match entry.path.strip_prefix(&prefix) {
                Some(relative) => relative,
                None => continue,
            };
            let field_id: i64 = match relative.split('/').next().and_then(|s| s.parse().ok()) {
                Some(field_id) => field_id,
                None => {
                    warn!(path = entry.path.as_str(), "unexpected log path layout, skipped");
                    continue;
                }
            };
            fields.entry(field_id).or_default().push(Binlog {
                log_path: entry.path,
                log_size: entry.size,
            });
        }
        Ok(fields
            .into_iter()
            .map(|(field_id, binlogs)| FieldBinlog { field_id, binlogs })
            .collect())
    }

    /// Copy every referenced insert and delta log under the backup prefix
    /// with bounded fan-out. Stats logs are re-discovered at restore time and
    /// not copied. All copies complete before any meta is written.
    async fn copy_binlogs(
        &self,
        backup_root: &str,
        name: &str,
        collections: &[CollectionBackupInfo],
    ) -> Result<()> {
        let mut jobs = Vec::new();
        for collection in collections {
            for partition in &collection.partitions {
                for segment in &partition.segments {
                    for field in segment.binlogs.iter().chain(segment.deltalogs.iter()) {
                        for binlog in &field.binlogs {
                            let dst = paths::rewrite_to_backup(
                                &self.config.root_path,
                                backup_root,
                                name,
                                &binlog.log_path,
                            )?;
                            jobs.push((binlog.log_path.clone(), dst));
                        }
                    }
                }
            }
        }
        self.ensure_active()?;
        debug!(backup = name, files = jobs.len(), "copying binlogs");

        let store = self.store;
        let mut copies = stream::iter(jobs)
            .map(|(src, dst)| async move {
                if !store.exist(&src).await.context(StoreSnafu)? {
                    return MissingSourceBlobSnafu { path: src }.fail();
                }
                store.copy(&src, &dst).await.context(StoreSnafu)
            })
            .buffer_unordered(self.config.copy_concurrency.max(1));
        while let Some(copy) = copies.next().await {
            copy?;
        }
        Ok(())
    }

    /// Serialize and write the four meta blobs, root header last.
    async fn write_meta(&self, backup_root: &str, backup: &BackupInfo) -> Result<()> {
        let blobs = meta::serialize(backup).context(MetaSnafu)?;
        let name = backup.name.as_str();
        for (file, blob) in [
            (paths::COLLECTION_META_FILE, blobs.collections),
            (paths::PARTITION_META_FILE, blobs.partitions),
            (paths::SEGMENT_META_FILE, blobs.segments),
            (paths::BACKUP_META_FILE, blobs.backup),
        ] {
            self.store
                .write(&paths::meta_path(backup_root, name, file), blob)
                .await
                .context(StoreSnafu)?;
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<()> {
        ensure!(!self.token.is_cancelled(), CancelledSnafu);
        Ok(())
    }
}
