// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Manage a running SMT process.
//!
//! This is a low-level generic API for SMT-LIB solvers; the solver-specific
//! parts are captured by the [`SolverCmd`] passed to launch the solver.
//!
//! The process is long-lived: callers scope their assertions with
//! [`SmtProc::push`]/[`SmtProc::pop`] and periodically [`SmtProc::reset`] it,
//! which clears every declaration and assertion and replays the startup
//! options.

use crate::conf::SolverCmd;
use crate::sexp;
use crate::tee::Tee;
use std::{
    ffi::{OsStr, OsString},
    io::{self, BufRead, BufReader, Write},
    path::{Path, PathBuf},
    process::{Child, ChildStdin, ChildStdout, Command, Stdio},
};
use thiserror::Error;

use super::sexp::{app, atom_i, atom_s, Sexp};

/// SmtProc wraps an instance of a solver process.
#[derive(Debug)]
pub struct SmtProc {
    cmd: SolverCmd,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    tee: Option<Tee>,
}

/// SatResp is a solver's response to a `(check-sat)` or similar command.
///
/// For unknown it also returns the reason the solver provides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SatResp {
    /// The query is satisfiable.
    Sat,
    /// The query is unsatisfiable (and thus negated assertions are valid).
    Unsat,
    /// Unknown whether the query is sat or unsat. The reason is the one given
    /// by (get-info :reason-unknown).
    ///
    /// This can happen due to a timeout or limitations of quantifier instantiation
    /// heuristics, for example.
    Unknown(String),
}

#[derive(Error, Debug)]
/// An error from trying to call the solver
pub enum SolverError {
    /// I/O went wrong
    #[error("some I/O went wrong: {0}")]
    Io(#[from] io::Error),
    /// Solver returned an `(error ...)` response
    #[error("solver returned an error:\n{0}")]
    UnexpectedClose(String),
    /// Solver output could not be understood
    #[error("could not parse solver response:\n{0}")]
    BadResponse(String),
}

type Result<T> = std::result::Result<T, SolverError>;

impl Drop for SmtProc {
    fn drop(&mut self) {
        self.kill();
    }
}

impl SmtProc {
    /// Create a new SMT process by running a solver.
    ///
    /// The optional `tee` argument is a directory where the SMT input is saved
    /// for debugging purposes whenever the solver answers unknown or fails.
    pub fn new(cmd: SolverCmd, tee: Option<&Path>) -> Result<Self> {
        let mut child = Command::new(OsStr::new(&cmd.cmd))
            .args(cmd.args.iter().map(OsString::from))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;
        let tee = tee.map(|path| {
            let mut f = Tee::new(path);
            f.append(&Sexp::Comment(cmd.cmdline()));
            f
        });
        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, BufReader::new(stdout)),
            _ => {
                _ = child.kill();
                return Err(SolverError::Io(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "solver pipes unavailable",
                )));
            }
        };
        let mut proc = Self {
            cmd,
            child,
            stdin,
            stdout,
            tee,
        };
        proc.preamble()?;
        Ok(proc)
    }

    /// Options and logic sent on startup and after every reset.
    fn preamble(&mut self) -> Result<()> {
        let cmd = self.cmd.clone();
        for (option, val) in &cmd.options {
            self.send(&app(
                "set-option",
                [atom_s(format!(":{option}")), atom_s(val)],
            ))?;
        }
        self.send(&app("set-logic", [atom_s(&cmd.logic)]))
    }

    /// Low-level API to send the solver a command as an s-expression. This
    /// should only be used for commands that do not require a response.
    pub fn send(&mut self, data: &Sexp) -> Result<()> {
        writeln!(self.stdin, "{data}")?;
        if let Some(f) = &mut self.tee {
            f.append(data);
        }
        Ok(())
    }

    /// Open a new assertion scope.
    pub fn push(&mut self) -> Result<()> {
        self.send(&app("push", [atom_i(1)]))
    }

    /// Discard the innermost assertion scope.
    pub fn pop(&mut self) -> Result<()> {
        self.send(&app("pop", [atom_i(1)]))
    }

    /// Clear all declarations and assertions, then replay the startup options
    /// and logic.
    pub fn reset(&mut self) -> Result<()> {
        self.send(&app("reset", []))?;
        if let Some(tee) = &mut self.tee {
            tee.clear();
            tee.append(&Sexp::Comment(self.cmd.cmdline()));
        }
        self.preamble()
    }

    /// Low-level API to send the solver a command that expects a response,
    /// which is parsed as a single s-expression.
    fn send_with_reply(&mut self, data: &Sexp) -> Result<Sexp> {
        self.send(data)?;
        let resp = self.get_response()?;
        sexp::parse(&resp).map_err(|_| SolverError::BadResponse(resp))
    }

    /// A marker for determining end of solver response.
    const DONE: &'static str = "<<DONE>>";

    /// Low-level mechanism to get a response. Note that this needs to be issued
    /// after each query that returns a response, since it sends a marker and
    /// waits for the solver to reach that marker.
    fn get_response(&mut self) -> Result<String> {
        writeln!(self.stdin, r#"(echo "{}")"#, Self::DONE)?;
        self.stdin.flush()?;
        // buf accumulates the entire response, which is read line-by-line
        // looking for the DONE marker.
        let mut buf = String::new();
        loop {
            let last_end = buf.len();
            // n is the number of bytes read (that is, the length of this line
            // including the newline)
            let n = self.stdout.read_line(&mut buf)?;
            if n == 0 {
                return Err(SolverError::UnexpectedClose(Self::parse_error(&buf)));
            }
            // last line, without the newline
            let last_line = buf[last_end..last_end + n].trim_end();
            // Z3 doesn't put quotes and CVC does (quotes do follow SMT-LIB)
            if last_line == Self::DONE || last_line == format!("\"{}\"", Self::DONE) {
                return Ok(buf[..last_end].trim_end().to_string());
            }
        }
    }

    fn kill(&mut self) {
        _ = writeln!(self.stdin, "(exit)");
        _ = self.stdin.flush();
        _ = self.child.kill();
        _ = self.child.wait();
    }

    /// Get some attribute using the SMT get-info command.
    pub fn get_info(&mut self, attribute: &str) -> Result<Sexp> {
        let resp = self.send_with_reply(&app("get-info", [atom_s(attribute)]))?;
        match resp.list() {
            Some([key, val]) if key == &atom_s(attribute) => Ok(val.clone()),
            _ => Err(SolverError::BadResponse(resp.to_string())),
        }
    }

    /// Parse an error message returned as an s-expression. Falls back to the
    /// raw response when there is no `(error ..)` in it.
    fn parse_error(resp: &str) -> String {
        // Z3 returns check-sat errors as:
        // (error "error msg")
        // sat
        //
        // Thus we parse the result as a sequence of sexps and look for the
        // error sexp.
        let sexps = sexp::parse_many(resp).unwrap_or_default();
        sexps
            .iter()
            .filter_map(|s| {
                s.app().and_then(|(head, args)| {
                    if head == "error" && args.len() == 1 {
                        args[0].atom_s()
                    } else {
                        None
                    }
                })
            })
            .next()
            .unwrap_or(resp)
            .to_string()
    }

    fn parse_sat(&mut self, resp: &str) -> Result<SatResp> {
        match resp {
            "unsat" => Ok(SatResp::Unsat),
            "sat" => Ok(SatResp::Sat),
            "unknown" => {
                let reason = self.get_info(":reason-unknown")?;
                Ok(SatResp::Unknown(reason.to_string()))
            }
            _ => Err(SolverError::UnexpectedClose(Self::parse_error(resp))),
        }
    }

    /// Send the solver `(check-sat)`. For unknown gets a reason.
    pub fn check_sat(&mut self) -> Result<SatResp> {
        self.send(&app("check-sat", []))?;
        let resp = self.get_response()?;
        let resp = self.parse_sat(&resp);
        match &resp {
            Ok(SatResp::Unknown(_)) | Err(_) => {
                if let Some(name) = self.save_tee() {
                    log::warn!("saved solver input to {}", name.display());
                }
            }
            _ => {}
        }
        resp
    }

    // =============
    // Tee support
    // =============

    /// Save the current tee file, if there is one. Returns the name of the
    /// created file (or None if there is no tee'd output setup).
    pub fn save_tee(&self) -> Option<PathBuf> {
        self.tee.as_ref().and_then(|tee| match tee.save() {
            Ok(name) => Some(name),
            Err(err) => {
                // report this error but this isn't fatal
                log::warn!("failed to save tee: {err}");
                None
            }
        })
    }

    /// Add a comment to the tee'd file.
    ///
    /// The comment is passed as a closure, which is not evaluated if there is
    /// no tee'd smt2 file.
    pub fn comment_with<F>(&mut self, comment: F)
    where
        F: FnOnce() -> String,
    {
        if let Some(f) = &mut self.tee {
            let comment = comment();
            f.append(&Sexp::Comment(String::new()));
            f.append(&Sexp::Comment(comment));
        }
    }
}
