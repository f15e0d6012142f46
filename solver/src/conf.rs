// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Holds the configuration need to launch the SMT bridge.

use std::path::PathBuf;

use expr::program::Program;
use smtlib::conf::{SolverCmd, Z3Conf};
use smtlib::path::solver_path;

use crate::bridge::SmtBridge;
use crate::sexp::BridgeError;

/// Queries answered before the solver's assertion stack is reset.
pub const DEFAULT_RESET_INTERVAL: usize = 1000;

/// Wrapper around the configuration needed to launch a solver.
#[derive(Debug, Clone)]
pub struct BridgeConf {
    /// How to launch the solver process.
    pub solver: SolverCmd,
    /// Reset the solver after this many queries.
    pub reset_interval: usize,
    /// The optional directory to tee SMT input to.
    pub tee: Option<PathBuf>,
}

impl BridgeConf {
    /// A configuration for the given solver command, with default reset
    /// interval and no tee.
    pub fn new(solver: SolverCmd) -> Self {
        Self {
            solver,
            reset_interval: DEFAULT_RESET_INTERVAL,
            tee: None,
        }
    }

    /// Launch a bridge over `program`.
    pub fn launch<'a>(&self, program: &'a Program) -> Result<SmtBridge<'a>, BridgeError> {
        SmtBridge::new(program, self.clone())
    }
}

impl Default for BridgeConf {
    fn default() -> Self {
        Self::new(Z3Conf::new(&solver_path("z3")).done())
    }
}
