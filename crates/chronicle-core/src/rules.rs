//! Persistence for always-allow permission rules.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use thiserror::Error;

use crate::policy_engine::PermissionRule;

#[derive(Debug, Error)]
pub enum RuleStoreError {
    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse rules file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize rules for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl RuleStoreError {
    fn io(operation: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Backing storage for the rule list. Writes replace the whole list.
pub trait RuleStore {
    fn load(&self) -> Result<Vec<PermissionRule>, RuleStoreError>;
    fn save(&mut self, rules: &[PermissionRule]) -> Result<(), RuleStoreError>;
}

/// Rules kept as a JSON array `[{"kind": .., "pathPrefix": ..}]` on disk.
#[derive(Debug, Clone)]
pub struct JsonRuleStore {
    path: PathBuf,
}

impl JsonRuleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RuleStore for JsonRuleStore {
    fn load(&self) -> Result<Vec<PermissionRule>, RuleStoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let bytes = std::fs::read(&self.path)
            .map_err(|source| RuleStoreError::io("reading rules", &self.path, source))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&bytes).map_err(|source| RuleStoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&mut self, rules: &[PermissionRule]) -> Result<(), RuleStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|source| RuleStoreError::io("creating rules directory", parent, source))?;
        }
        let encoded =
            serde_json::to_vec_pretty(rules).map_err(|source| RuleStoreError::Serialize {
                path: self.path.clone(),
                source,
            })?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, encoded)
            .map_err(|source| RuleStoreError::io("writing rules", &tmp, source))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|source| RuleStoreError::io("replacing rules", &self.path, source))?;
        tracing::debug!(path = %self.path.display(), count = rules.len(), "saved permission rules");
        Ok(())
    }
}

/// In-memory store. Clones share the same list, which lets a caller observe
/// what a policy wrote after handing it a boxed clone.
#[derive(Debug, Clone, Default)]
pub struct MemoryRuleStore {
    rules: Arc<Mutex<Vec<PermissionRule>>>,
}

impl MemoryRuleStore {
    pub fn with_rules(rules: Vec<PermissionRule>) -> Self {
        Self {
            rules: Arc::new(Mutex::new(rules)),
        }
    }

    pub fn snapshot(&self) -> Vec<PermissionRule> {
        self.rules
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl RuleStore for MemoryRuleStore {
    fn load(&self) -> Result<Vec<PermissionRule>, RuleStoreError> {
        Ok(self.snapshot())
    }

    fn save(&mut self, rules: &[PermissionRule]) -> Result<(), RuleStoreError> {
        *self
            .rules
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = rules.to_vec();
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;
    use crate::policy_engine::PermissionKind;
    use crate::policy_engine::PermissionPolicy;

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempdir().expect("tmpdir");
        let store = JsonRuleStore::new(dir.path().join("rules.json"));
        assert!(store.load().expect("load").is_empty());
    }

    #[test]
    fn json_store_round_trips_through_policy() {
        let dir = tempdir().expect("tmpdir");
        let path = dir.path().join("nested").join("rules.json");
        {
            let mut policy =
                PermissionPolicy::open(Box::new(JsonRuleStore::new(&path))).expect("open");
            policy
                .add_rule(PermissionKind::Shell, "/home/project/")
                .expect("add");
            policy.add_rule(PermissionKind::Write, "/tmp").expect("add");
        }

        let raw = std::fs::read_to_string(&path).expect("read");
        assert!(raw.contains("\"pathPrefix\": \"/home/project\""));

        let reopened = PermissionPolicy::open(Box::new(JsonRuleStore::new(&path))).expect("open");
        assert_eq!(
            reopened.rules(),
            &[
                PermissionRule::new(PermissionKind::Shell, "/home/project"),
                PermissionRule::new(PermissionKind::Write, "/tmp"),
            ]
        );
    }

    #[test]
    fn duplicates_in_file_collapse_on_load() {
        let dir = tempdir().expect("tmpdir");
        let path = dir.path().join("rules.json");
        std::fs::write(
            &path,
            r#"[{"kind":"read","pathPrefix":"/a/"},{"kind":"read","pathPrefix":"/a"}]"#,
        )
        .expect("write");
        let policy = PermissionPolicy::open(Box::new(JsonRuleStore::new(&path))).expect("open");
        assert_eq!(policy.rules().len(), 1);
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempdir().expect("tmpdir");
        let path = dir.path().join("rules.json");
        std::fs::write(&path, "{not json").expect("write");
        let err = JsonRuleStore::new(&path).load().expect_err("parse error");
        assert!(matches!(err, RuleStoreError::Parse { .. }));
    }
}
