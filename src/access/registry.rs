// src/access/registry.rs
//
// Reference registry: vehicle entries cached in RAM from a YAML file, access
// decisions appended to a JSONL log. Lookups never touch the disk so the frame
// loop is not held up by storage.

use crate::error::{RegistryError, RegistryResult};
use crate::interface::Registry;
use crate::types::{AccessDecision, RegistryEntry};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const HISTORY_CAPACITY: usize = 1000;

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    vehicles: Vec<RegistryEntry>,
}

pub struct MemoryRegistry {
    path: Option<PathBuf>,
    entries: Vec<RegistryEntry>,
    access_log: Option<File>,
    history: VecDeque<AccessDecision>,
}

impl MemoryRegistry {
    /// Load entries from `path` (an empty registry if the file does not exist
    /// yet) and open `access_log_path` for appending.
    pub fn open(path: impl AsRef<Path>, access_log_path: Option<&Path>) -> RegistryResult<Self> {
        let path = path.as_ref();
        let entries = if path.exists() {
            let contents = fs::read_to_string(path)?;
            let file: RegistryFile = serde_yaml::from_str(&contents)?;
            file.vehicles
        } else {
            warn!(
                "📦 Registry file {} not found, starting empty",
                path.display()
            );
            Vec::new()
        };
        validate_entries(&entries)?;

        let access_log = match access_log_path {
            Some(log_path) => Some(open_append(log_path)?),
            None => None,
        };

        let active = entries.iter().filter(|e| e.active).count();
        info!(
            "📦 {} vehicle(s) loaded from {} ({} active)",
            entries.len(),
            path.display(),
            active
        );

        Ok(Self {
            path: Some(path.to_path_buf()),
            entries,
            access_log,
            history: VecDeque::with_capacity(64),
        })
    }

    /// Registry with no backing files
    pub fn in_memory(entries: Vec<RegistryEntry>) -> Self {
        Self {
            path: None,
            entries,
            access_log: None,
            history: VecDeque::with_capacity(64),
        }
    }

    /// Register a vehicle. An id of 0 is replaced with the next free id.
    pub fn add_entry(&mut self, mut entry: RegistryEntry) -> RegistryResult<u32> {
        if self
            .entries
            .iter()
            .any(|e| e.active && e.code == entry.code)
        {
            return Err(RegistryError::Malformed(format!(
                "active entry for {} already exists",
                entry.code
            )));
        }
        if entry.id == 0 {
            entry.id = self.entries.iter().map(|e| e.id).max().unwrap_or(0) + 1;
        }
        if entry.registered_at.is_none() {
            entry.registered_at = Some(Utc::now());
        }
        let id = entry.id;
        info!("💾 Vehicle registered: {} (id {})", entry.code, id);
        self.entries.push(entry);
        self.persist()?;
        Ok(id)
    }

    /// Soft delete: the entry stays on file but is no longer matched.
    pub fn deactivate(&mut self, code: &str) -> RegistryResult<bool> {
        let mut changed = false;
        for entry in self.entries.iter_mut().filter(|e| e.code == code && e.active) {
            entry.active = false;
            changed = true;
        }
        if changed {
            info!("❌ Vehicle deactivated: {}", code);
            self.persist()?;
        }
        Ok(changed)
    }

    pub fn all_entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    /// Most recent decisions first
    pub fn history(&self, limit: usize) -> Vec<AccessDecision> {
        self.history.iter().rev().take(limit).cloned().collect()
    }

    fn persist(&self) -> RegistryResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = RegistryFile {
            vehicles: self.entries.clone(),
        };
        fs::write(path, serde_yaml::to_string(&file)?)?;
        Ok(())
    }
}

impl Registry for MemoryRegistry {
    fn find_exact(&self, code: &str) -> RegistryResult<Option<RegistryEntry>> {
        Ok(self
            .entries
            .iter()
            .find(|e| e.active && e.code == code)
            .cloned())
    }

    fn find_all_active(&self) -> RegistryResult<Vec<RegistryEntry>> {
        Ok(self.entries.iter().filter(|e| e.active).cloned().collect())
    }

    fn log_decision(&mut self, decision: &AccessDecision) -> RegistryResult<()> {
        if self.history.len() >= HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(decision.clone());

        if let Some(file) = self.access_log.as_mut() {
            let line = serde_json::to_string(decision)?;
            writeln!(file, "{}", line)
                .and_then(|_| file.flush())
                .map_err(|e| RegistryError::WriteFailed(e.to_string()))?;
        }
        Ok(())
    }

    fn release(&mut self) -> RegistryResult<()> {
        if let Some(mut file) = self.access_log.take() {
            file.flush()
                .map_err(|e| RegistryError::WriteFailed(e.to_string()))?;
        }
        Ok(())
    }
}

fn open_append(path: &Path) -> RegistryResult<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

fn validate_entries(entries: &[RegistryEntry]) -> RegistryResult<()> {
    for (i, a) in entries.iter().enumerate() {
        if a.code.trim().is_empty() {
            return Err(RegistryError::Malformed(format!("entry {} has no code", a.id)));
        }
        if entries[..i].iter().any(|b| b.id == a.id) {
            return Err(RegistryError::Malformed(format!("duplicate id {}", a.id)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DecisionReason;

    fn entry(id: u32, code: &str, active: bool) -> RegistryEntry {
        RegistryEntry {
            id,
            code: code.to_string(),
            owner: "Carlos".to_string(),
            model: "Civic".to_string(),
            color: "Silver".to_string(),
            active,
            registered_at: None,
        }
    }

    fn decision(code: &str) -> AccessDecision {
        AccessDecision {
            code: code.to_string(),
            authorized: false,
            info: "unknown".to_string(),
            reason: DecisionReason::Unregistered,
            match_confidence: 0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_inactive_entries_are_invisible() {
        let reg = MemoryRegistry::in_memory(vec![
            entry(1, "POX4G21", true),
            entry(2, "ABC1D23", false),
        ]);
        assert!(reg.find_exact("POX4G21").unwrap().is_some());
        assert!(reg.find_exact("ABC1D23").unwrap().is_none());
        assert_eq!(reg.find_all_active().unwrap().len(), 1);
    }

    #[test]
    fn test_open_yaml_and_persist_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.yaml");
        fs::write(
            &path,
            "vehicles:\n  - id: 1\n    code: POX4G21\n    owner: Carlos\n    model: Civic\n",
        )
        .unwrap();

        let mut reg = MemoryRegistry::open(&path, None).unwrap();
        assert_eq!(reg.find_exact("POX4G21").unwrap().unwrap().info(), "Carlos - Civic");

        let id = reg.add_entry(entry(0, "ABC1D23", true)).unwrap();
        assert_eq!(id, 2);
        assert!(reg.deactivate("POX4G21").unwrap());
        assert!(!reg.deactivate("POX4G21").unwrap());

        let reopened = MemoryRegistry::open(&path, None).unwrap();
        assert!(reopened.find_exact("POX4G21").unwrap().is_none());
        assert!(reopened.find_exact("ABC1D23").unwrap().is_some());
        assert_eq!(reopened.all_entries().len(), 2);
    }

    #[test]
    fn test_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let reg = MemoryRegistry::open(dir.path().join("nope.yaml"), None).unwrap();
        assert!(reg.find_all_active().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_active_code_rejected() {
        let mut reg = MemoryRegistry::in_memory(vec![entry(1, "POX4G21", true)]);
        assert!(reg.add_entry(entry(0, "POX4G21", true)).is_err());
    }

    #[test]
    fn test_malformed_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.yaml");
        fs::write(
            &path,
            "vehicles:\n  - id: 1\n    code: A\n    owner: X\n  - id: 1\n    code: B\n    owner: Y\n",
        )
        .unwrap();
        assert!(matches!(
            MemoryRegistry::open(&path, None),
            Err(RegistryError::Malformed(_))
        ));
    }

    #[test]
    fn test_decisions_logged_as_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("logs").join("access.jsonl");
        let mut reg =
            MemoryRegistry::open(dir.path().join("registry.yaml"), Some(log.as_path())).unwrap();

        reg.log_decision(&decision("XYZ9Q99")).unwrap();
        reg.log_decision(&decision("POX4G21")).unwrap();
        reg.release().unwrap();

        let contents = fs::read_to_string(&log).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: AccessDecision = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.code, "XYZ9Q99");

        let history = reg.history(10);
        assert_eq!(history[0].code, "POX4G21", "newest first");
        assert_eq!(reg.history(1).len(), 1);
    }
}
