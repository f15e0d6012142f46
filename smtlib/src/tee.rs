// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Dumps of the input a solver received since its last reset, written when a
//! query fails or comes back unknown.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use crate::sexp::Sexp;

/// The SMT-LIB text sent to one solver process.
#[derive(Debug)]
pub struct Tee {
    dir: PathBuf,
    lines: Vec<String>,
}

impl Tee {
    #[allow(missing_docs)]
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            lines: vec![],
        }
    }

    /// Start over after a solver reset.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Record one command. An empty comment becomes a blank line.
    pub fn append(&mut self, s: &Sexp) {
        let line = match s {
            Sexp::Comment(c) if c.is_empty() => String::new(),
            Sexp::Comment(c) => format!(";; {c}"),
            _ => s.to_string(),
        };
        self.lines.push(line);
    }

    /// Write the recorded input to `query-<hash>.smt2` in the dump directory,
    /// so identical inputs share a file. Returns the file name.
    pub fn save(&self) -> io::Result<PathBuf> {
        let contents = self.lines.join("\n");
        let name = PathBuf::from(format!("query-{:08x}.smt2", fxhash::hash32(&contents)));
        fs::write(self.dir.join(&name), contents)?;
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::Tee;
    use crate::sexp::{app, atom_s, Sexp};

    #[test]
    fn test_save() {
        let dir = tempfile::tempdir().unwrap();
        let mut tee = Tee::new(dir.path());
        tee.append(&Sexp::Comment("z3 -in".to_string()));
        tee.append(&Sexp::Comment(String::new()));
        tee.append(&app("assert", [app("not", [atom_s("index(e0)")])]));
        let name = tee.save().unwrap();
        let contents = std::fs::read_to_string(dir.path().join(&name)).unwrap();
        assert_eq!(contents, ";; z3 -in\n\n(assert (not |index(e0)|))");
        // same input, same file
        assert_eq!(tee.save().unwrap(), name);

        tee.clear();
        tee.append(&app("check-sat", []));
        let other = tee.save().unwrap();
        assert_ne!(other, name);
        assert_eq!(std::fs::read_to_string(dir.path().join(other)).unwrap(), "(check-sat)");
    }
}
