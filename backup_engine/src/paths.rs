//! Name policy and the canonical backup layout.
//!
//! Everything under a backup lives at well-known paths:
//!
//! ```text
//! <backup_root>/<name>/meta/backup_meta.json
//! <backup_root>/<name>/meta/collection_meta.json
//! <backup_root>/<name>/meta/partition_meta.json
//! <backup_root>/<name>/meta/segment_meta.json
//! <backup_root>/<name>/binlogs/insert_log/<coll_id>/<part_id>/<seg_id>/<field_id>/<record>
//! <backup_root>/<name>/binlogs/delta_log/<coll_id>/<part_id>/<seg_id>/<field_id>/<record>
//! ```
//!
//! The restore side re-derives the per-partition directories from this layout
//! instead of trusting the paths recorded in the segment meta.

use crate::error::{Error, InvalidInputSnafu, PathNotUnderRootSnafu, Result};
use snafu::ensure;

/// Directory under a backup holding the four meta blobs.
pub const META_DIR: &str = "meta";

/// Root header blob file name.
pub const BACKUP_META_FILE: &str = "backup_meta.json";
/// Collection level blob file name.
pub const COLLECTION_META_FILE: &str = "collection_meta.json";
/// Partition level blob file name.
pub const PARTITION_META_FILE: &str = "partition_meta.json";
/// Segment level blob file name.
pub const SEGMENT_META_FILE: &str = "segment_meta.json";

/// Directory under a backup holding the copied binlogs.
pub const BINLOG_DIR: &str = "binlogs";
/// Insert binlog directory name, shared with the live layout.
pub const INSERT_LOG_DIR: &str = "insert_log";
/// Delete binlog directory name, shared with the live layout.
pub const DELTA_LOG_DIR: &str = "delta_log";
/// Statistics log directory name, shared with the live layout.
pub const STATS_LOG_DIR: &str = "stats_log";

/// Longest accepted backup name.
pub const MAX_BACKUP_NAME_LEN: usize = 255;
/// Longest accepted collection rename suffix.
pub const MAX_RENAME_SUFFIX_LEN: usize = 64;

/// Check a backup name: a letter, then letters, digits, `_` or `-`.
pub fn validate_backup_name(name: &str) -> Result<()> {
    ensure!(
        !name.is_empty(),
        InvalidInputSnafu {
            reason: "backup name must not be empty",
        }
    );
    ensure!(
        name.len() <= MAX_BACKUP_NAME_LEN,
        InvalidInputSnafu {
            reason: format!("backup name exceeds {} characters", MAX_BACKUP_NAME_LEN),
        }
    );
    let mut chars = name.chars();
    let first = chars.next().expect("name is non-empty");
    ensure!(
        first.is_ascii_alphabetic(),
        InvalidInputSnafu {
            reason: format!("backup name must start with a letter: {}", name),
        }
    );
    for c in chars {
        ensure!(
            c.is_ascii_alphanumeric() || c == '_' || c == '-',
            InvalidInputSnafu {
                reason: format!("invalid character {:?} in backup name {}", c, name),
            }
        );
    }
    Ok(())
}

/// Check a collection rename suffix: letters, digits or `_`.
pub fn validate_rename_suffix(suffix: &str) -> Result<()> {
    ensure!(
        !suffix.is_empty(),
        InvalidInputSnafu {
            reason: "collection suffix must not be empty",
        }
    );
    ensure!(
        suffix.len() <= MAX_RENAME_SUFFIX_LEN,
        InvalidInputSnafu {
            reason: format!(
                "collection suffix exceeds {} characters",
                MAX_RENAME_SUFFIX_LEN
            ),
        }
    );
    for c in suffix.chars() {
        ensure!(
            c.is_ascii_alphanumeric() || c == '_',
            InvalidInputSnafu {
                reason: format!("invalid character {:?} in collection suffix {}", c, suffix),
            }
        );
    }
    Ok(())
}

/// Directory of one backup, with a trailing slash.
pub fn backup_dir(backup_root: &str, name: &str) -> String {
    format!("{}/{}/", backup_root, name)
}

/// Path of one of the four meta blobs of a backup.
pub fn meta_path(backup_root: &str, name: &str, file: &str) -> String {
    format!("{}/{}/{}/{}", backup_root, name, META_DIR, file)
}

/// Per-partition log directory inside a backup, with a trailing slash.
pub fn partition_log_dir(
    backup_root: &str,
    name: &str,
    log_dir: &str,
    collection_id: i64,
    partition_id: i64,
) -> String {
    format!(
        "{}/{}/{}/{}/{}/{}/",
        backup_root, name, BINLOG_DIR, log_dir, collection_id, partition_id
    )
}

/// Per-segment log directory on the live side, with a trailing slash.
pub fn segment_log_dir(
    root_path: &str,
    log_dir: &str,
    collection_id: i64,
    partition_id: i64,
    segment_id: i64,
) -> String {
    format!(
        "{}/{}/{}/{}/{}/",
        root_path, log_dir, collection_id, partition_id, segment_id
    )
}

/// Rewrite a live binlog path into its destination under a backup.
///
/// Fails when the path is not under the configured live root, which means
/// either a misconfigured root or a path from a foreign deployment.
pub fn rewrite_to_backup(
    root_path: &str,
    backup_root: &str,
    name: &str,
    log_path: &str,
) -> Result<String, Error> {
    let live_prefix = format!("{}/", root_path);
    match log_path.strip_prefix(&live_prefix) {
        Some(relative) if !relative.is_empty() => Ok(format!(
            "{}/{}/{}/{}",
            backup_root, name, BINLOG_DIR, relative
        )),
        _ => PathNotUnderRootSnafu { path: log_path }.fail(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn backup_name_policy() {
        validate_backup_name("b1").unwrap();
        validate_backup_name("Backup-2022_07").unwrap();
        validate_backup_name(&format!("b{}", "x".repeat(254))).unwrap();

        assert_matches!(validate_backup_name(""), Err(Error::InvalidInput { .. }));
        assert_matches!(validate_backup_name("1b"), Err(Error::InvalidInput { .. }));
        assert_matches!(validate_backup_name("_b"), Err(Error::InvalidInput { .. }));
        assert_matches!(validate_backup_name("b 1"), Err(Error::InvalidInput { .. }));
        assert_matches!(validate_backup_name("b/1"), Err(Error::InvalidInput { .. }));
        assert_matches!(
            validate_backup_name(&format!("b{}", "x".repeat(255))),
            Err(Error::InvalidInput { .. })
        );
    }

    #[test]
    fn rename_suffix_policy() {
        validate_rename_suffix("_r").unwrap();
        validate_rename_suffix("restored2").unwrap();
        validate_rename_suffix(&"s".repeat(64)).unwrap();

        assert_matches!(validate_rename_suffix(""), Err(Error::InvalidInput { .. }));
        assert_matches!(
            validate_rename_suffix("-r"),
            Err(Error::InvalidInput { .. })
        );
        assert_matches!(
            validate_rename_suffix(&"s".repeat(65)),
            Err(Error::InvalidInput { .. })
        );
    }

    #[test]
    fn layout_paths() {
        assert_eq!(
            meta_path("files/backup", "b1", BACKUP_META_FILE),
            "files/backup/b1/meta/backup_meta.json"
        );
        assert_eq!(
            partition_log_dir("files/backup", "b1", INSERT_LOG_DIR, 1, 10),
            "files/backup/b1/binlogs/insert_log/1/10/"
        );
        assert_eq!(
            segment_log_dir("files", DELTA_LOG_DIR, 1, 10, 101),
            "files/delta_log/1/10/101/"
        );
    }

    #[test]
    fn rewrite_replaces_the_live_root() {
        let dst = rewrite_to_backup(
            "files",
            "files/backup",
            "b1",
            "files/insert_log/1/10/101/100/1",
        )
        .unwrap();
        assert_eq!(dst, "files/backup/b1/binlogs/insert_log/1/10/101/100/1");
    }

    #[test]
    fn rewrite_rejects_foreign_roots() {
        assert_matches!(
            rewrite_to_backup("files", "files/backup", "b1", "other/insert_log/1/10/101"),
            Err(Error::PathNotUnderRoot { .. })
        );
        assert_matches!(
            rewrite_to_backup("files", "files/backup", "b1", "files/"),
            Err(Error::PathNotUnderRoot { .. })
        );
    }
}
