//! [`BlobStore`] implementation over [`object_store::DynObjectStore`].

use crate::{BlobStore, BlobStoreError, ObjectEntry};
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::{path::Path, DynObjectStore};
use std::sync::Arc;
use tracing::debug;

/// Production blob store: one handle for the live data bucket, one for the
/// backup target bucket, and a routing prefix deciding which handle a logical
/// path addresses.
///
/// Copies read through the client, which makes cross-bucket copies and
/// same-bucket copies uniform.
#[derive(Debug)]
pub struct ObjectBlobStore {
    live: Arc<DynObjectStore>,
    backup: Arc<DynObjectStore>,
    backup_prefix: String,
}

impl ObjectBlobStore {
    /// Route paths under `backup_prefix` to `backup`, everything else to
    /// `live`.
    pub fn new(
        live: Arc<DynObjectStore>,
        backup: Arc<DynObjectStore>,
        backup_prefix: impl Into<String>,
    ) -> Self {
        Self {
            live,
            backup,
            backup_prefix: backup_prefix.into(),
        }
    }

    /// Both live data and backups share one bucket.
    pub fn single(store: Arc<DynObjectStore>) -> Self {
        Self {
            live: Arc::clone(&store),
            backup: store,
            backup_prefix: String::new(),
        }
    }

    fn route(&self, path: &str) -> &Arc<DynObjectStore> {
        let prefix = self.backup_prefix.as_str();
        if !prefix.is_empty()
            && path.starts_with(prefix)
            && matches!(path.as_bytes().get(prefix.len()), None | Some(b'/'))
        {
            &self.backup
        } else {
            &self.live
        }
    }

    fn object_path(path: &str) -> Result<Path, BlobStoreError> {
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() || trimmed.starts_with('/') || trimmed.contains("//") {
            return Err(BlobStoreError::unknown(format!(
                "invalid object path: {:?}",
                path
            )));
        }
        Ok(Path::from(trimmed))
    }
}

#[async_trait]
impl BlobStore for ObjectBlobStore {
    async fn exist(&self, path: &str) -> Result<bool, BlobStoreError> {
        let location = Self::object_path(path)?;
        match self.route(path).head(&location).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, path: &str) -> Result<Bytes, BlobStoreError> {
        let location = Self::object_path(path)?;
        let result = self.route(path).get(&location).await?;
        Ok(result.bytes().await?)
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<(), BlobStoreError> {
        let location = Self::object_path(path)?;
        self.route(path).put(&location, data).await?;
        Ok(())
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<(), BlobStoreError> {
        let src_location = Self::object_path(src)?;
        let dst_location = Self::object_path(dst)?;
        let data = self.route(src).get(&src_location).await?.bytes().await?;
        self.route(dst).put(&dst_location, data).await?;
        Ok(())
    }

    async fn list_with_prefix(
        &self,
        prefix: &str,
        recursive: bool,
    ) -> Result<Vec<ObjectEntry>, BlobStoreError> {
        let location = Self::object_path(prefix)?;
        let store = self.route(prefix);

        if recursive {
            let objects: Vec<_> = store.list(Some(&location)).await?.try_collect().await?;
            return Ok(objects
                .into_iter()
                .map(|m| ObjectEntry {
                    path: m.location.as_ref().to_string(),
                    size: m.size as i64,
                })
                .collect());
        }

        let listing = store.list_with_delimiter(Some(&location)).await?;
        let mut entries: Vec<ObjectEntry> = listing
            .common_prefixes
            .iter()
            .map(|p| ObjectEntry {
                path: format!("{}/", p.as_ref()),
                size: 0,
            })
            .collect();
        entries.extend(listing.objects.iter().map(|m| ObjectEntry {
            path: m.location.as_ref().to_string(),
            size: m.size as i64,
        }));
        Ok(entries)
    }

    async fn remove_with_prefix(&self, prefix: &str) -> Result<(), BlobStoreError> {
        let store = self.route(prefix);
        let entries = self.list_with_prefix(prefix, true).await?;
        debug!(prefix, objects = entries.len(), "bulk removing objects");
        for entry in entries {
            let location = Self::object_path(&entry.path)?;
            match store.delete(&location).await {
                Ok(()) | Err(object_store::Error::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BlobStoreErrorKind;
    use object_store::memory::InMemory;

    fn single_store() -> ObjectBlobStore {
        ObjectBlobStore::single(Arc::new(InMemory::new()))
    }

    #[tokio::test]
    async fn write_read_overwrite() {
        let store = single_store();

        store
            .write("files/a/1", Bytes::from_static(b"one"))
            .await
            .unwrap();
        assert_eq!(store.read("files/a/1").await.unwrap(), Bytes::from("one"));

        // overwrite semantics
        store
            .write("files/a/1", Bytes::from_static(b"two"))
            .await
            .unwrap();
        assert_eq!(store.read("files/a/1").await.unwrap(), Bytes::from("two"));
    }

    #[tokio::test]
    async fn exist_and_missing_read() {
        let store = single_store();

        assert!(!store.exist("files/missing").await.unwrap());
        store
            .write("files/here", Bytes::from_static(b"x"))
            .await
            .unwrap();
        assert!(store.exist("files/here").await.unwrap());

        let err = store.read("files/missing").await.unwrap_err();
        assert_eq!(err.kind(), BlobStoreErrorKind::NotFound);
    }

    #[tokio::test]
    async fn copy_within_one_store() {
        let store = single_store();
        store
            .write("files/src", Bytes::from_static(b"payload"))
            .await
            .unwrap();

        store.copy("files/src", "backup/b1/dst").await.unwrap();
        assert_eq!(
            store.read("backup/b1/dst").await.unwrap(),
            Bytes::from("payload")
        );
        // source untouched
        assert!(store.exist("files/src").await.unwrap());
    }

    #[tokio::test]
    async fn copy_missing_source_is_not_found() {
        let store = single_store();
        let err = store.copy("files/nope", "backup/dst").await.unwrap_err();
        assert_eq!(err.kind(), BlobStoreErrorKind::NotFound);
    }

    #[tokio::test]
    async fn listing_recursive_and_delimited() {
        let store = single_store();
        for path in [
            "files/insert_log/1/10/101/100/1",
            "files/insert_log/1/10/101/100/2",
            "files/insert_log/1/10/101/101/1",
            "files/insert_log/1/10/102/100/1",
        ] {
            store.write(path, Bytes::from_static(b"log")).await.unwrap();
        }

        let all = store
            .list_with_prefix("files/insert_log/1/10/101/", true)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|e| e.size == 3));

        let top = store
            .list_with_prefix("files/insert_log/1/10/", false)
            .await
            .unwrap();
        let mut dirs: Vec<_> = top.iter().map(|e| e.path.as_str()).collect();
        dirs.sort_unstable();
        assert_eq!(
            dirs,
            vec!["files/insert_log/1/10/101/", "files/insert_log/1/10/102/"]
        );
    }

    #[tokio::test]
    async fn remove_with_prefix_leaves_siblings() {
        let store = single_store();
        store
            .write("backup/b1/meta/backup_meta.json", Bytes::from_static(b"{}"))
            .await
            .unwrap();
        store
            .write("backup/b1/binlogs/insert_log/1/10/101/100/1", Bytes::from_static(b"x"))
            .await
            .unwrap();
        store
            .write("backup/b2/meta/backup_meta.json", Bytes::from_static(b"{}"))
            .await
            .unwrap();

        store.remove_with_prefix("backup/b1/").await.unwrap();

        assert!(store.list_with_prefix("backup/b1/", true).await.unwrap().is_empty());
        assert!(store.exist("backup/b2/meta/backup_meta.json").await.unwrap());
    }

    #[tokio::test]
    async fn routes_backup_prefix_to_backup_bucket() {
        let live: Arc<DynObjectStore> = Arc::new(InMemory::new());
        let backup: Arc<DynObjectStore> = Arc::new(InMemory::new());
        let store = ObjectBlobStore::new(Arc::clone(&live), Arc::clone(&backup), "files/backup");

        store
            .write("files/insert_log/1/10/101/100/1", Bytes::from_static(b"live"))
            .await
            .unwrap();
        store
            .copy(
                "files/insert_log/1/10/101/100/1",
                "files/backup/b1/binlogs/insert_log/1/10/101/100/1",
            )
            .await
            .unwrap();

        // the copy landed in the backup bucket, not the live one
        let in_backup: Vec<_> = backup.list(None).await.unwrap().try_collect().await.unwrap();
        assert_eq!(in_backup.len(), 1);
        let in_live: Vec<_> = live.list(None).await.unwrap().try_collect().await.unwrap();
        assert_eq!(in_live.len(), 1);

        assert!(store
            .exist("files/backup/b1/binlogs/insert_log/1/10/101/100/1")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn rejects_double_slash() {
        let store = single_store();
        let err = store
            .write("files//a", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), BlobStoreErrorKind::Unknown);
    }
}
