// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Expressions over quantified events: the program model they range over, the
//! typed expression tree, its canonical textual form, and an evaluator.

// configure clippy
#![allow(clippy::needless_return)]
#![allow(clippy::large_enum_variant)]
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::type_complexity)]
#![deny(clippy::uninlined_format_args)]
// documentation-related lints (only checked when running rustdoc)
#![warn(missing_docs)]
#![allow(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod parser;
pub mod printer;
pub mod program;
pub mod scope;
pub mod semantics;
pub mod syntax;
pub mod types;

pub use parser::{parse, ParseError};
pub use scope::Scope;
pub use syntax::Expr;
