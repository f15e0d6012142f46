// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Locating solver binaries.

use std::env;

/// The command that runs solver `bin`: the value of `<BIN>_BIN` (e.g.
/// `Z3_BIN`) when set, otherwise `bin` itself, found through `$PATH`.
pub fn solver_path(bin: &str) -> String {
    let var = format!("{}_BIN", bin.to_uppercase());
    env::var(var).unwrap_or_else(|_| bin.to_string())
}
