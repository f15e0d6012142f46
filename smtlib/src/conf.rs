// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Construct launch and option configurations for Z3 and CVC5.

/// The full invocation of a solver binary.
#[derive(Debug, Clone)]
pub struct SolverCmd {
    /// Binary to launch
    pub cmd: String,
    /// Arguments to pass
    pub args: Vec<String>,
    /// SMT options to send on startup
    pub options: Vec<(String, String)>,
    /// Logic declared with `(set-logic ..)` on startup
    pub logic: String,
}

impl SolverCmd {
    fn new(cmd: &str) -> Self {
        Self {
            cmd: cmd.to_string(),
            args: vec![],
            options: vec![],
            // enums are datatypes, access paths are integers, reals or strings
            logic: "ALL".to_string(),
        }
    }

    fn args<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args
            .extend(args.into_iter().map(|s| s.as_ref().to_string()));
    }

    /// Set an option.
    pub fn option<S: AsRef<str>>(&mut self, name: &str, val: S) {
        self.options
            .push((name.to_string(), val.as_ref().to_string()));
    }

    /// Build the command line string, for printing purposes.
    pub fn cmdline(&self) -> String {
        let args: Vec<_> = self
            .args
            .iter()
            .map(|a| {
                if a.contains(' ') {
                    format!("\"{a}\"")
                } else {
                    a.clone()
                }
            })
            .collect();
        format!("{} {}", &self.cmd, args.join(" "))
    }
}

/// Builder for creating a Z3 [`SolverCmd`].
#[derive(Debug, Clone)]
pub struct Z3Conf(SolverCmd);

impl Z3Conf {
    /// Create a Z3Conf with some default options. Uses `cmd` as the path to Z3.
    pub fn new(cmd: &str) -> Self {
        let mut cmd = SolverCmd::new(cmd);
        cmd.args(["-in", "-smt2"]);
        let mut conf = Self(cmd);
        conf.timeout_ms(Some(30000));
        conf
    }

    /// Set the SMT timeout option
    pub fn timeout_ms(&mut self, ms: Option<usize>) {
        // this is the default Z3 timeout
        let ms = ms.unwrap_or(4294967295);
        self.0.option("timeout", format!("{ms}"));
    }

    /// Get access to the raw options of the solver.
    pub fn options(&mut self) -> &mut SolverCmd {
        &mut self.0
    }

    /// Get the final command to run the solver.
    pub fn done(self) -> SolverCmd {
        self.0
    }
}

/// Builder for a CVC5 [`SolverCmd`].
#[derive(Debug, Clone)]
pub struct CvcConf {
    cmd: SolverCmd,
}

impl CvcConf {
    /// Create a new CVC5 builder with some default options.
    pub fn new_cvc5(cmd: &str) -> Self {
        let mut cmd = SolverCmd::new(cmd);
        cmd.args(vec!["-q", "--lang", "smt2"]);
        cmd.option("interactive", "false");
        cmd.option("incremental", "true");
        cmd.option("seed", "1");
        Self { cmd }
    }

    /// Set a per-query time limit. None sets no time limit.
    pub fn timeout_ms(&mut self, ms: Option<usize>) {
        let ms = ms.unwrap_or(0);
        self.cmd.option("tlimit-per", format!("{ms}"));
    }

    /// Get access to the raw options of the solver.
    pub fn options(&mut self) -> &mut SolverCmd {
        &mut self.cmd
    }

    /// Get the final command to run the solver.
    pub fn done(self) -> SolverCmd {
        self.cmd
    }
}

#[cfg(test)]
mod tests {
    use super::{CvcConf, Z3Conf};

    #[test]
    fn test_cmdline() {
        let mut z3 = Z3Conf::new("z3");
        z3.timeout_ms(Some(500));
        let cmd = z3.done();
        assert_eq!(cmd.cmdline(), "z3 -in -smt2");
        assert_eq!(
            cmd.options.last(),
            Some(&("timeout".to_string(), "500".to_string()))
        );
        let cvc = CvcConf::new_cvc5("/opt/my solvers/cvc5").done();
        assert_eq!(cvc.cmdline(), "/opt/my solvers/cvc5 -q --lang smt2");
        assert_eq!(cvc.logic, "ALL");
    }
}
