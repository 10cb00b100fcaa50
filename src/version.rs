//! Content hashing and structural diffing between snapshots

use crate::snapshot::{FileRecord, Snapshot};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Hash/size/timestamp metadata describing a snapshot's content state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    /// SHA-256 hex digest of the serialized snapshot
    pub hash: String,
    /// Creation time in Unix milliseconds
    pub timestamp: i64,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    /// Mirrors `hash`; this is the field comparisons read
    pub checksum: String,
}

/// Coarse comparison of a local tree against a stored version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub is_equal: bool,
    pub is_newer: bool,
    /// Absolute delta in milliseconds
    pub time_diff: u64,
    pub formatted_diff: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

/// One changed path between two snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Difference {
    pub path: String,
    pub kind: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_old: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_new: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalChanges {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
}

impl TotalChanges {
    pub fn total(&self) -> usize {
        self.added + self.modified + self.deleted
    }
}

/// Per-path comparison of a local snapshot against a stored one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedComparison {
    pub is_equal: bool,
    pub is_newer: bool,
    pub time_diff: u64,
    pub formatted_diff: String,
    pub differences: Vec<Difference>,
    pub total_changes: TotalChanges,
}

impl DetailedComparison {
    /// Carry the timing fields over from a coarse comparison
    pub fn with_timing(mut self, coarse: &Comparison) -> Self {
        self.is_newer = coarse.is_newer;
        self.time_diff = coarse.time_diff;
        self.formatted_diff = coarse.formatted_diff.clone();
        self
    }

    /// One-line summary for terminal output
    pub fn summary(&self) -> String {
        if self.is_equal {
            return "no changes".to_string();
        }
        format!(
            "{} added, {} modified, {} deleted",
            self.total_changes.added, self.total_changes.modified, self.total_changes.deleted
        )
    }
}

/// SHA-256 hex digest of `bytes`
pub fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Serialize a JSON value with object keys sorted at every level
pub fn canonical_json(value: &Value) -> String {
    canonicalize(value).to_string()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::new();
            for (key, inner) in entries {
                sorted.insert(key.clone(), canonicalize(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Digest of a record's canonical serialized form
pub fn record_checksum(record: &FileRecord) -> Result<String> {
    let value = serde_json::to_value(record)?;
    Ok(digest_hex(canonical_json(&value).as_bytes()))
}

/// Render a millisecond delta in the largest unit that yields at least one
pub fn format_duration(ms: u64) -> String {
    const UNITS: [(u64, &str); 4] = [
        (86_400_000, "day"),
        (3_600_000, "hour"),
        (60_000, "minute"),
        (1_000, "second"),
    ];

    for (unit_ms, name) in UNITS {
        let count = ms / unit_ms;
        if count >= 1 {
            let plural = if count == 1 { "" } else { "s" };
            return format!("{count} {name}{plural}");
        }
    }
    "0 seconds".to_string()
}

/// Computes version metadata and differences between snapshots
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionManager;

impl VersionManager {
    pub fn new() -> Self {
        Self
    }

    /// Describe serialized snapshot bytes
    pub fn create_version_info(&self, bytes: &[u8]) -> VersionInfo {
        let now = Utc::now();
        let digest = digest_hex(bytes);
        VersionInfo {
            hash: digest.clone(),
            timestamp: now.timestamp_millis(),
            size: bytes.len() as u64,
            created_at: now,
            modified_at: now,
            checksum: digest,
        }
    }

    /// Compare local snapshot bytes created now against a stored version
    pub fn compare_versions(&self, local_bytes: &[u8], remote: &VersionInfo) -> Comparison {
        self.compare_versions_at(local_bytes, remote, Utc::now())
    }

    /// Same as [`VersionManager::compare_versions`] with an explicit local creation time
    pub fn compare_versions_at(
        &self,
        local_bytes: &[u8],
        remote: &VersionInfo,
        local_created: DateTime<Utc>,
    ) -> Comparison {
        let local_ms = local_created.timestamp_millis();
        let time_diff = local_ms.abs_diff(remote.timestamp);
        Comparison {
            is_equal: digest_hex(local_bytes) == remote.checksum,
            is_newer: local_ms > remote.timestamp,
            time_diff,
            formatted_diff: format_duration(time_diff),
        }
    }

    /// Diff two snapshots path by path
    pub fn compare_detailed(&self, local: &Snapshot, remote: &Snapshot) -> Result<DetailedComparison> {
        let mut differences = Vec::new();
        let mut totals = TotalChanges::default();

        for (path, local_record) in local.iter() {
            match remote.get(path) {
                None => {
                    totals.added += 1;
                    differences.push(Difference {
                        path: path.clone(),
                        kind: ChangeKind::Added,
                        old_checksum: None,
                        new_checksum: Some(record_checksum(local_record)?),
                        size_old: None,
                        size_new: Some(local_record.size()),
                    });
                }
                Some(remote_record) => {
                    let new_checksum = record_checksum(local_record)?;
                    let old_checksum = record_checksum(remote_record)?;
                    if new_checksum != old_checksum {
                        totals.modified += 1;
                        differences.push(Difference {
                            path: path.clone(),
                            kind: ChangeKind::Modified,
                            old_checksum: Some(old_checksum),
                            new_checksum: Some(new_checksum),
                            size_old: Some(remote_record.size()),
                            size_new: Some(local_record.size()),
                        });
                    }
                }
            }
        }

        for (path, remote_record) in remote.iter() {
            if !local.contains(path) {
                totals.deleted += 1;
                differences.push(Difference {
                    path: path.clone(),
                    kind: ChangeKind::Deleted,
                    old_checksum: Some(record_checksum(remote_record)?),
                    new_checksum: None,
                    size_old: Some(remote_record.size()),
                    size_new: None,
                });
            }
        }

        debug!(
            added = totals.added,
            modified = totals.modified,
            deleted = totals.deleted,
            "compared snapshots"
        );

        Ok(DetailedComparison {
            is_equal: differences.is_empty(),
            is_newer: false,
            time_diff: 0,
            formatted_diff: format_duration(0),
            differences,
            total_changes: totals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::Path;

    fn text(path: &str, body: &str) -> (String, FileRecord) {
        (
            path.to_string(),
            FileRecord::from_content(Path::new(path), body.as_bytes().to_vec()),
        )
    }

    #[test]
    fn test_version_info_is_deterministic() {
        let manager = VersionManager::new();
        let first = manager.create_version_info(b"{\"a.txt\":1}");
        let second = manager.create_version_info(b"{\"a.txt\":1}");
        let changed = manager.create_version_info(b"{\"a.txt\":2}");

        assert_eq!(first.hash, second.hash);
        assert_eq!(first.hash, first.checksum);
        assert_eq!(first.size, 11);
        assert_ne!(first.hash, changed.hash);
    }

    #[test]
    fn test_compare_versions() {
        let manager = VersionManager::new();
        let remote = manager.create_version_info(b"payload");
        let later = remote.created_at + Duration::minutes(5);

        let same = manager.compare_versions_at(b"payload", &remote, later);
        assert!(same.is_equal);
        assert!(same.is_newer);
        assert_eq!(same.time_diff, 300_000);
        assert_eq!(same.formatted_diff, "5 minutes");

        let earlier = remote.created_at - Duration::seconds(1);
        let other = manager.compare_versions_at(b"changed", &remote, earlier);
        assert!(!other.is_equal);
        assert!(!other.is_newer);
        assert_eq!(other.formatted_diff, "1 second");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0 seconds");
        assert_eq!(format_duration(999), "0 seconds");
        assert_eq!(format_duration(45_000), "45 seconds");
        assert_eq!(format_duration(3_600_000), "1 hour");
        assert_eq!(format_duration(3 * 86_400_000 + 5), "3 days");
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let a = json!({"b": 1, "a": {"z": true, "y": [ {"d": 1, "c": 2} ]}});
        let b = json!({"a": {"y": [ {"c": 2, "d": 1} ], "z": true}, "b": 1});
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(canonical_json(&json!({"b": 1, "a": 2})), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn test_identical_snapshots_are_equal() -> Result<()> {
        let snapshot: Snapshot = [text("a.txt", "hello")].into_iter().collect();
        let result = VersionManager::new().compare_detailed(&snapshot, &snapshot.clone())?;
        assert!(result.is_equal);
        assert!(result.differences.is_empty());
        assert_eq!(result.total_changes, TotalChanges::default());
        Ok(())
    }

    #[test]
    fn test_detailed_diff_kinds() -> Result<()> {
        let remote: Snapshot = [text("a.txt", "hello"), text("gone.txt", "bye"), text("same.md", "x")]
            .into_iter()
            .collect();
        let local: Snapshot = [text("a.txt", "world!"), text("new.txt", "hi"), text("same.md", "x")]
            .into_iter()
            .collect();

        let result = VersionManager::new().compare_detailed(&local, &remote)?;
        assert!(!result.is_equal);
        assert_eq!(
            result.total_changes,
            TotalChanges {
                added: 1,
                modified: 1,
                deleted: 1
            }
        );

        let kinds: Vec<_> = result
            .differences
            .iter()
            .map(|d| (d.path.as_str(), d.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("a.txt", ChangeKind::Modified),
                ("new.txt", ChangeKind::Added),
                ("gone.txt", ChangeKind::Deleted),
            ]
        );

        let modified = &result.differences[0];
        assert_eq!(modified.size_old, Some(5));
        assert_eq!(modified.size_new, Some(6));
        assert!(modified.old_checksum.is_some() && modified.new_checksum.is_some());

        let deleted = &result.differences[2];
        assert_eq!(deleted.new_checksum, None);
        assert_eq!(deleted.size_new, None);
        Ok(())
    }

    #[test]
    fn test_with_timing() -> Result<()> {
        let snapshot: Snapshot = [text("a.txt", "hello")].into_iter().collect();
        let coarse = Comparison {
            is_equal: true,
            is_newer: true,
            time_diff: 7_200_000,
            formatted_diff: "2 hours".to_string(),
        };
        let result = VersionManager::new()
            .compare_detailed(&snapshot, &snapshot)?
            .with_timing(&coarse);
        assert!(result.is_newer);
        assert_eq!(result.formatted_diff, "2 hours");
        assert_eq!(result.summary(), "no changes");
        Ok(())
    }
}
