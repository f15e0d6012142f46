// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The files a session reads and writes: miner results, the header index used
//! for replay, invariant logs and listings.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use expr::printer::conjunction;
use solver::hashmap::HashSet;

use crate::error::DistillError;
use crate::hint::Hint;
use crate::rank::ranked;
use crate::store::DistillerStore;

/// One candidate reported by the miner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinedCandidate {
    pub guards: Vec<String>,
    pub filters: Vec<String>,
    /// Extra properties found by the miner's own pruning step.
    pub properties: Vec<String>,
}

/// Split a `∧`-separated conjunction into its trimmed, non-empty parts.
pub fn split_conjunction(line: &str) -> Vec<String> {
    line.split('∧')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Read a result file: groups of three lines (guards, filters, properties)
/// followed by a line with the number of groups.
pub fn parse_results(path: &Path) -> Result<Vec<MinedCandidate>, DistillError> {
    let contents = fs::read_to_string(path).map_err(DistillError::io(path))?;
    let malformed = |msg: String| DistillError::MalformedResults {
        path: path.to_path_buf(),
        msg,
    };
    let mut lines: Vec<&str> = contents.lines().collect();
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    let Some((count, body)) = lines.split_last() else {
        return Err(malformed("missing candidate count".to_string()));
    };
    let count: usize = count
        .trim()
        .parse()
        .map_err(|_| malformed(format!("bad candidate count `{count}`")))?;
    if body.len() != 3 * count {
        return Err(malformed(format!(
            "{count} candidates announced but {} lines found",
            body.len()
        )));
    }
    Ok(body
        .chunks(3)
        .map(|group| MinedCandidate {
            guards: split_conjunction(group[0]),
            filters: split_conjunction(group[1]),
            properties: split_conjunction(group[2]),
        })
        .collect())
}

/// The record of one explored hint, enough to rebuild it for replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRecord {
    /// (variable, event) pairs in order
    pub quantified: Vec<(String, String)>,
    pub config: Option<String>,
    pub existentials: usize,
    pub term_depth: usize,
    pub user: bool,
}

const HEADER_LINES: usize = 5;

impl HeaderRecord {
    pub fn from_hint(hint: &Hint) -> Self {
        Self {
            quantified: hint.vars().into_iter().map(|v| (v.name, v.event)).collect(),
            config: hint.config_event.clone(),
            existentials: hint.existentials(),
            term_depth: hint.term_depth.unwrap_or(0),
            user: hint.user,
        }
    }

    pub fn to_hint(&self, name: &str) -> Result<Hint, DistillError> {
        let events = self.quantified.iter().map(|(_, e)| e.clone()).collect();
        let mut hint = Hint::new(name, events, self.existentials, self.config.clone())?;
        hint.term_depth = Some(self.term_depth);
        hint.user = self.user;
        Ok(hint)
    }

    fn write_to(&self, out: &mut impl Write) -> std::io::Result<()> {
        let quantified: Vec<String> = self
            .quantified
            .iter()
            .map(|(v, e)| format!("{v}:{e}"))
            .collect();
        writeln!(out, "{}", quantified.join(" "))?;
        writeln!(out, "{}", self.config.as_deref().unwrap_or(""))?;
        writeln!(out, "{}", self.existentials)?;
        writeln!(out, "{}", self.term_depth)?;
        writeln!(out, "{}", self.user)
    }

    fn parse(lines: &[&str]) -> Result<Self, String> {
        let quantified = lines[0]
            .split_whitespace()
            .map(|pair| {
                pair.split_once(':')
                    .map(|(v, e)| (v.to_string(), e.to_string()))
                    .ok_or_else(|| format!("bad quantified event `{pair}`"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let config = match lines[1].trim() {
            "" => None,
            c => Some(c.to_string()),
        };
        let number = |s: &str| {
            s.trim()
                .parse::<usize>()
                .map_err(|_| format!("bad number `{s}`"))
        };
        let user = lines[4]
            .trim()
            .parse::<bool>()
            .map_err(|_| format!("bad user flag `{}`", lines[4]))?;
        Ok(Self {
            quantified,
            config,
            existentials: number(lines[2])?,
            term_depth: number(lines[3])?,
            user,
        })
    }
}

/// Append one record to the header index.
pub fn append_header(path: &Path, record: &HeaderRecord) -> Result<(), DistillError> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(DistillError::io(path))?;
    record.write_to(&mut file).map_err(DistillError::io(path))
}

/// Read the header index. A missing index is an empty one.
pub fn read_header_index(path: &Path) -> Result<Vec<HeaderRecord>, DistillError> {
    if !path.exists() {
        return Ok(vec![]);
    }
    let contents = fs::read_to_string(path).map_err(DistillError::io(path))?;
    let lines: Vec<&str> = contents.lines().collect();
    let malformed = |msg: String| DistillError::MalformedHeaderIndex {
        path: path.to_path_buf(),
        msg,
    };
    if lines.len() % HEADER_LINES != 0 {
        return Err(malformed(format!(
            "{} lines is not a whole number of records",
            lines.len()
        )));
    }
    lines
        .chunks(HEADER_LINES)
        .map(|chunk| HeaderRecord::parse(chunk).map_err(malformed))
        .collect()
}

/// Move `path` aside to `<stem>_<n>.<ext>`, numbering by how many files with
/// the same stem are already in its directory.
pub fn rotate_file(path: &Path) -> Result<(), DistillError> {
    if !path.exists() {
        return Ok(());
    }
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("txt")
        .to_string();
    let count = fs::read_dir(dir)
        .map_err(DistillError::io(dir))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(&stem))
        .count();
    let target = dir.join(format!("{stem}_{}.{ext}", count - 1));
    fs::rename(path, &target).map_err(DistillError::io(path))
}

fn append_line(path: &Path, line: &str) -> Result<(), DistillError> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(DistillError::io(path))?;
    writeln!(file, "{line}").map_err(DistillError::io(path))
}

/// Append-only logs of the invariants each miner run produced: the
/// distilled ones, and the properties the miner's pruning stepped back from.
#[derive(Debug)]
pub struct InvariantLog {
    distilled: PathBuf,
    stepback: PathBuf,
    learned: HashSet<String>,
}

impl InvariantLog {
    pub fn new(distilled: PathBuf, stepback: PathBuf) -> Self {
        Self {
            distilled,
            stepback,
            learned: HashSet::default(),
        }
    }

    /// Move the logs of a previous session aside.
    pub fn rotate(&self) -> Result<(), DistillError> {
        rotate_file(&self.distilled)?;
        rotate_file(&self.stepback)
    }

    /// Number of distinct invariants logged this session.
    pub fn learned(&self) -> usize {
        self.learned.len()
    }

    fn log(&mut self, path: PathBuf, header: &str, filters: &str, extra: &[String]) -> Result<(), DistillError> {
        if extra.is_empty() && filters.is_empty() {
            return Ok(());
        }
        let extra = conjunction(extra);
        let sep = if !filters.is_empty() && !extra.is_empty() {
            " ∧ "
        } else {
            ""
        };
        let inv = format!("{header}{sep}{extra}");
        if self.learned.insert(inv.clone()) {
            append_line(&path, &inv)?;
        }
        Ok(())
    }

    /// Log one miner candidate with the properties kept and stepped back.
    pub fn write_invs(
        &mut self,
        hint: &Hint,
        guards: &str,
        filters: &str,
        keep: &[String],
        stepback: &[String],
    ) -> Result<(), DistillError> {
        let header = hint.invariant_header(guards, filters);
        self.log(self.distilled.clone(), &header, filters, keep)?;
        self.log(self.stepback.clone(), &header, filters, stepback)
    }
}

/// Write every surviving invariant, best first, without duplicates. Returns
/// the number of lines written.
pub fn write_record_to(store: &DistillerStore, path: &Path) -> Result<usize, DistillError> {
    let mut written = HashSet::default();
    let mut out = String::new();
    for r in ranked(store) {
        if r.filters.is_empty() {
            continue;
        }
        let line = r.to_string();
        if written.insert(line.clone()) {
            out.push_str(&line);
            out.push('\n');
        }
    }
    fs::write(path, out).map_err(DistillError::io(path))?;
    Ok(written.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Preds, Record};
    use expr::program::Program;

    #[test]
    fn test_parse_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.txt");
        fs::write(
            &path,
            "e0.x > 0 ∧ e0.y > 0\ne0.id == e1.id\n\n\ne0.x > 1\ne0.x < e1.id ∧ \n2\n",
        )
        .unwrap();
        let candidates = parse_results(&path).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].guards, vec!["e0.x > 0", "e0.y > 0"]);
        assert!(candidates[0].properties.is_empty());
        assert!(candidates[1].guards.is_empty());
        assert_eq!(candidates[1].properties, vec!["e0.x < e1.id"]);

        fs::write(&path, "a\nb\nc\n2\n").unwrap();
        assert!(matches!(
            parse_results(&path),
            Err(DistillError::MalformedResults { .. })
        ));
        fs::write(&path, "").unwrap();
        assert!(matches!(
            parse_results(&path),
            Err(DistillError::MalformedResults { .. })
        ));
        fs::write(&path, "0\n").unwrap();
        assert!(parse_results(&path).unwrap().is_empty());
    }

    #[test]
    fn test_header_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("headers.txt");
        assert!(read_header_index(&path).unwrap().is_empty());

        let mut a = Hint::new("a", vec!["eReq".to_string(), "eResp".to_string()], 1, None).unwrap();
        a.term_depth = Some(1);
        let mut b = Hint::new("b", vec!["eReq".to_string()], 0, Some("eConfig".to_string())).unwrap();
        b.user = true;
        append_header(&path, &HeaderRecord::from_hint(&a)).unwrap();
        append_header(&path, &HeaderRecord::from_hint(&b)).unwrap();
        insta::assert_snapshot!(fs::read_to_string(&path).unwrap().trim_end(), @r###"
        e0:eReq e1:eResp

        1
        1
        false
        e0:eReq
        eConfig
        0
        0
        true
        "###);

        let records = read_header_index(&path).unwrap();
        assert_eq!(records.len(), 2);
        let replayed = records[0].to_hint("replay_0").unwrap();
        assert_eq!(replayed, a);
        assert_eq!(replayed.term_depth, Some(1));
        assert!(records[1].to_hint("replay_1").unwrap().user);

        fs::write(&path, "e0:eReq\n\n0\n").unwrap();
        assert!(matches!(
            read_header_index(&path),
            Err(DistillError::MalformedHeaderIndex { .. })
        ));
        fs::write(&path, "e0:eReq\n\nmany\n0\nfalse\n").unwrap();
        assert!(matches!(
            read_header_index(&path),
            Err(DistillError::MalformedHeaderIndex { .. })
        ));
    }

    #[test]
    fn test_invariant_log() {
        let dir = tempfile::tempdir().unwrap();
        let distilled = dir.path().join("distilled_invs.txt");
        let stepback = dir.path().join("stepback_invs.txt");
        fs::write(&distilled, "old\n").unwrap();

        let mut log = InvariantLog::new(distilled.clone(), stepback.clone());
        log.rotate().unwrap();
        assert!(dir.path().join("distilled_invs_0.txt").exists());
        assert!(!distilled.exists());

        let h = Hint::new("h", vec!["eReq".to_string()], 0, None).unwrap();
        let keep = vec!["e0.x > 1".to_string()];
        log.write_invs(&h, "e0.y > 0", "e0.x > 0", &keep, &[]).unwrap();
        log.write_invs(&h, "e0.y > 0", "e0.x > 0", &keep, &[]).unwrap();
        insta::assert_snapshot!(fs::read_to_string(&distilled).unwrap().trim_end(), @r###"
        ∀e0: eReq :: e0.y > 0 -> e0.x > 0 ∧ e0.x > 1
        "###);
        assert_eq!(
            fs::read_to_string(&stepback).unwrap(),
            "∀e0: eReq :: e0.y > 0 -> e0.x > 0\n"
        );
        assert_eq!(log.learned(), 2);

        fs::write(&distilled, "again\n").unwrap();
        log.rotate().unwrap();
        assert!(dir.path().join("distilled_invs_1.txt").exists());
        assert!(dir.path().join("stepback_invs_0.txt").exists());
    }

    #[test]
    fn test_write_record_to() {
        let p = Program::from_json(
            r#"{"events": [{"name": "eReq", "payload": {"named": [["x", "int"]]}}]}"#,
        )
        .unwrap();
        let h = Hint::new("h", vec!["eReq".to_string()], 0, None).unwrap();
        let filters: Preds = [h.parse(&p, "e0.x > 0").unwrap()].into_iter().collect();
        let mut store = DistillerStore::new();
        store.push(Record::new(h.clone(), Preds::new(), filters.clone()));
        store.push(Record::new(h.clone(), Preds::new(), filters));
        store.push(Record::new(h.clone(), Preds::new(), Preds::new()));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invariants.txt");
        assert_eq!(write_record_to(&store, &path).unwrap(), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "∀e0: eReq :: e0.x > 0\n");
    }
}
