//! Reading, listing and deleting backups by their well-known layout.

use crate::{
    error::{BackupNotFoundSnafu, Error, IncompleteBackupSnafu, MetaSnafu, Result, StoreSnafu},
    paths,
};
use backup_types::{meta, BackupInfo};
use blob_store::{BlobStore, BlobStoreErrorKind};
use bytes::Bytes;
use snafu::ResultExt;
use tracing::warn;

/// Read one backup from its four meta blobs.
///
/// A backup whose root header blob is absent does not exist from the
/// catalog's perspective, whatever else is already in the bucket.
pub(crate) async fn get_backup(
    store: &dyn BlobStore,
    backup_root: &str,
    name: &str,
) -> Result<BackupInfo> {
    let root = match store
        .read(&paths::meta_path(backup_root, name, paths::BACKUP_META_FILE))
        .await
    {
        Ok(blob) => blob,
        Err(e) if e.kind() == BlobStoreErrorKind::NotFound => {
            return BackupNotFoundSnafu { name }.fail();
        }
        Err(e) => return Err(Error::Store { source: e }),
    };

    let collections = read_level(store, backup_root, name, paths::COLLECTION_META_FILE, "collection").await?;
    let partitions = read_level(store, backup_root, name, paths::PARTITION_META_FILE, "partition").await?;
    let segments = read_level(store, backup_root, name, paths::SEGMENT_META_FILE, "segment").await?;

    meta::deserialize(&root, &collections, &partitions, &segments).context(MetaSnafu)
}

async fn read_level(
    store: &dyn BlobStore,
    backup_root: &str,
    name: &str,
    file: &str,
    level: &'static str,
) -> Result<Bytes> {
    match store.read(&paths::meta_path(backup_root, name, file)).await {
        Ok(blob) => Ok(blob),
        Err(e) if e.kind() == BlobStoreErrorKind::NotFound => {
            IncompleteBackupSnafu { name, level }.fail()
        }
        Err(e) => Err(Error::Store { source: e }),
    }
}

/// List all readable backups under the backup root.
///
/// Backups without a root header blob are invisible. Backups that have one
/// but cannot be read are returned by name in the second list; they never
/// fail the listing as a whole.
pub(crate) async fn list_backups(
    store: &dyn BlobStore,
    backup_root: &str,
    collection_name: Option<&str>,
) -> Result<(Vec<BackupInfo>, Vec<String>)> {
    let prefix = format!("{}/", backup_root);
    let entries = store
        .list_with_prefix(&prefix, false)
        .await
        .context(StoreSnafu)?;

    let mut backups = Vec::new();
    let mut fail_backups = Vec::new();
    for entry in entries {
        let name = match dir_name(&entry.path) {
            Some(name) => name,
            None => continue,
        };
        match get_backup(store, backup_root, &name).await {
            Ok(backup) => {
                let retain = match collection_name {
                    Some(filter) => backup
                        .collections
                        .iter()
                        .any(|c| c.collection_name == filter),
                    None => true,
                };
                if retain {
                    backups.push(backup);
                }
            }
            Err(Error::BackupNotFound { .. }) => {}
            Err(e) => {
                warn!(backup = name.as_str(), error = %e, "skipping unreadable backup");
                fail_backups.push(name);
            }
        }
    }
    Ok((backups, fail_backups))
}

/// Delete every object under one backup's prefix.
pub(crate) async fn delete_backup(
    store: &dyn BlobStore,
    backup_root: &str,
    name: &str,
) -> Result<()> {
    store
        .remove_with_prefix(&paths::backup_dir(backup_root, name))
        .await
        .context(StoreSnafu)
}

/// Last path segment of a directory entry; `None` for plain objects.
fn dir_name(path: &str) -> Option<String> {
    let trimmed = path.strip_suffix('/')?;
    trimmed.rsplit('/').next().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_name_extracts_the_last_segment() {
        assert_eq!(dir_name("files/backup/b1/").as_deref(), Some("b1"));
        assert_eq!(dir_name("files/backup/stray_object"), None);
    }
}
