// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Specification distillation
//!
//! Drives an external invariant miner over a space of hints, reduces the mined
//! candidates to a small non-redundant set with a fixpoint of subsumption and
//! resolution rules, and turns the survivors into runtime monitors.

#![allow(missing_docs)]
// configure clippy
#![allow(clippy::needless_return)]
#![allow(clippy::large_enum_variant)]
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::type_complexity)]
#![allow(clippy::new_without_default)]
#![deny(clippy::uninlined_format_args)]
#![allow(clippy::len_without_is_empty)]
// documentation-related lints (only checked when running rustdoc)
#![allow(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod codegen;
pub mod config;
pub mod controller;
pub mod distiller;
pub mod error;
pub mod explore;
pub mod files;
pub mod hint;
pub mod miner;
pub mod monitor;
pub mod oracle;
pub mod rank;
pub mod store;
pub mod traces;

pub use config::DistillConfig;
pub use controller::Driver;
pub use error::DistillError;
pub use hint::{Hint, QuantifierHeader};
pub use monitor::{MonitorDef, MonitorError};
pub use store::DistillerStore;
