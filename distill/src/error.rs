// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Errors of the distillation pipeline.

use std::path::PathBuf;
use thiserror::Error;

use expr::ParseError;

/// A failure of the distillation run. Everything here is fatal for the run;
/// recoverable conditions (unparsable filters, solver fallbacks, miner
/// failures on a single hint) are logged and never surface as errors.
#[derive(Error, Debug)]
pub enum DistillError {
    /// A guard produced by our own generator does not parse.
    #[error("generated guard `{text}` does not parse: {err}")]
    GuardParse { text: String, err: ParseError },
    /// A result file written by the miner is malformed.
    #[error("malformed result file {}: {msg}", path.display())]
    MalformedResults { path: PathBuf, msg: String },
    /// The header index written by a previous run is malformed.
    #[error("malformed header index {}: {msg}", path.display())]
    MalformedHeaderIndex { path: PathBuf, msg: String },
    /// A hint refers to something the program does not declare.
    #[error("invalid hint {hint}: {msg}")]
    InvalidHint { hint: String, msg: String },
    #[error("I/O error on {}: {err}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// The miner could not be started at all.
    #[error("could not launch miner `{cmd}`: {err}")]
    Miner {
        cmd: String,
        #[source]
        err: std::io::Error,
    },
}

impl DistillError {
    /// Attach a path to an I/O error.
    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |err| DistillError::Io { path, err }
    }
}
