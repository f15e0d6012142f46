// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! SMT bridge: decides implications between sets of expressions with an SMT
//! solver, as an oracle for candidate distillation.

// configure clippy
#![allow(clippy::needless_return)]
#![allow(clippy::large_enum_variant)]
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::type_complexity)]
// documentation-related lints (only checked when running rustdoc)
#![warn(missing_docs)]
#![allow(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod bridge;
pub mod conf;
pub mod hashmap;
pub mod sexp;

pub use bridge::SmtBridge;
pub use conf::BridgeConf;
pub use sexp::BridgeError;
pub use smtlib::path::solver_path;
