// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The indexed trace folder.
//!
//! `index.json` at the root of the trace directory maps sets of event names to
//! the sub-folder holding traces that contain those events:
//!
//! ```json
//! [{"events": ["eReq", "eResp"], "folder": "req_resp"}]
//! ```

use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::DistillError;
use crate::hint::Hint;

pub const INDEX_FILE: &str = "index.json";

#[derive(Debug, Deserialize)]
struct IndexEntry {
    events: BTreeSet<String>,
    folder: PathBuf,
}

/// Trace folders by the set of events they were collected for.
#[derive(Debug, Clone, Default)]
pub struct TraceIndex {
    root: PathBuf,
    entries: Vec<(BTreeSet<String>, PathBuf)>,
}

impl TraceIndex {
    pub fn load(root: &Path) -> Result<Self, DistillError> {
        let path = root.join(INDEX_FILE);
        let contents = fs::read_to_string(&path).map_err(DistillError::io(&path))?;
        let entries: Vec<IndexEntry> = serde_json::from_str(&contents)?;
        Ok(Self {
            root: root.to_path_buf(),
            entries: entries.into_iter().map(|e| (e.events, e.folder)).collect(),
        })
    }

    pub fn get(&self, events: &BTreeSet<String>) -> Option<PathBuf> {
        self.entries
            .iter()
            .find(|(es, _)| es == events)
            .map(|(_, folder)| self.root.join(folder))
    }

    /// The folder for a hint: keyed by its quantified events and its
    /// configuration event.
    pub fn folder_for(&self, hint: &Hint) -> Option<PathBuf> {
        let mut key: BTreeSet<String> = hint.events().iter().cloned().collect();
        key.extend(hint.config_event.iter().cloned());
        self.get(&key)
    }
}

/// The trace files directly inside `folder`, sorted by name.
pub fn trace_files(folder: &Path) -> Result<Vec<PathBuf>, DistillError> {
    let mut files = vec![];
    for entry in WalkDir::new(folder).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|err| {
            let path = err.path().unwrap_or(folder).to_path_buf();
            DistillError::Io {
                path,
                err: err.into(),
            }
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(INDEX_FILE),
            r#"[{"events": ["eResp", "eReq"], "folder": "rr"},
                {"events": ["eReq", "eConfig"], "folder": "rc"}]"#,
        )
        .unwrap();
        fs::create_dir(dir.path().join("rr")).unwrap();
        fs::create_dir(dir.path().join("rr/nested")).unwrap();
        fs::write(dir.path().join("rr/1.json"), "[]").unwrap();
        fs::write(dir.path().join("rr/0.json"), "[]").unwrap();

        let index = TraceIndex::load(dir.path()).unwrap();
        let h = Hint::new("h", vec!["eReq".to_string(), "eResp".to_string()], 1, None).unwrap();
        let folder = index.folder_for(&h).unwrap();
        assert_eq!(folder, dir.path().join("rr"));
        let files = trace_files(&folder).unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("rr/0.json"), dir.path().join("rr/1.json")]
        );

        let mut h = Hint::new("h", vec!["eReq".to_string()], 0, None).unwrap();
        assert!(index.folder_for(&h).is_none());
        h.config_event = Some("eConfig".to_string());
        assert_eq!(index.folder_for(&h), Some(dir.path().join("rc")));
    }

    #[test]
    fn test_missing_index() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            TraceIndex::load(dir.path()),
            Err(DistillError::Io { .. })
        ));
    }
}
