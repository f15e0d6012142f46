// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Read-only model of the source program: declared events and their payloads,
//! enumerations, pure predicates/functions, state machines, and user hints.
//!
//! The model is produced by the language front-end and loaded from JSON.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::Type;

/// A declared event and the shape of its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDecl {
    #[allow(missing_docs)]
    pub name: String,
    /// [`Type::Null`] when the event carries no payload.
    #[serde(default)]
    pub payload: Type,
}

/// A declared enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDecl {
    #[allow(missing_docs)]
    pub name: String,
    /// Elements in declaration order.
    pub elements: Vec<String>,
}

/// A pure function or predicate declared by the program, usable in
/// expressions by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDecl {
    #[allow(missing_docs)]
    pub name: String,
    #[allow(missing_docs)]
    pub params: Vec<Type>,
    #[allow(missing_docs)]
    pub ret: Type,
}

impl FunctionDecl {
    /// A boolean-valued function, which the generator may use as a predicate.
    pub fn is_predicate(&self) -> bool {
        self.ret == Type::Bool
    }
}

/// What a function body does, as far as invariant discovery cares.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSummary {
    /// Events this function may send.
    #[serde(default)]
    pub sends: Vec<String>,
    /// States (of the same machine) this function may move to.
    #[serde(default)]
    pub next_states: Vec<String>,
}

/// How a state reacts to an event.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerAction {
    Do(FunctionSummary),
    Goto {
        target: String,
        #[serde(default)]
        function: Option<FunctionSummary>,
    },
    Ignore,
    Defer,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handler {
    pub event: String,
    pub action: HandlerAction,
}

impl Handler {
    /// Handlers that actually consume the event (as opposed to ignoring or
    /// deferring it).
    pub fn consumes(&self) -> bool {
        matches!(
            self.action,
            HandlerAction::Do(_) | HandlerAction::Goto { .. }
        )
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub name: String,
    #[serde(default)]
    pub entry: Option<FunctionSummary>,
    #[serde(default)]
    pub exit: Option<FunctionSummary>,
    #[serde(default)]
    pub handlers: Vec<Handler>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub name: String,
    /// Specification machines (monitors) are not explored for hints.
    #[serde(default)]
    pub is_spec: bool,
    pub states: Vec<State>,
}

impl Machine {
    /// Look up a state of this machine by name.
    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.iter().find(|s| s.name == name)
    }
}

/// A hint supplied by the operator in the program text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HintDecl {
    #[allow(missing_docs)]
    pub name: String,
    /// Event names, universals first.
    pub quantified: Vec<String>,
    /// How many of the trailing quantified events are existential.
    #[serde(default)]
    pub existentials: usize,
    #[serde(default)]
    pub config_event: Option<String>,
    #[serde(default)]
    pub guard_predicates: Vec<String>,
    #[serde(default)]
    pub filter_predicates: Vec<String>,
    #[serde(default)]
    pub term_depth: Option<usize>,
    #[serde(default)]
    pub exact: bool,
}

/// The program model.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub enums: Vec<EnumDecl>,
    #[serde(default)]
    pub events: Vec<EventDecl>,
    #[serde(default)]
    pub functions: Vec<FunctionDecl>,
    #[serde(default)]
    pub machines: Vec<Machine>,
    #[serde(default)]
    pub hints: Vec<HintDecl>,
}

impl Program {
    /// Parse a program model from its JSON form.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Read a program model from a JSON file.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&contents)?)
    }

    #[allow(missing_docs)]
    pub fn event(&self, name: &str) -> Option<&EventDecl> {
        self.events.iter().find(|e| e.name == name)
    }

    #[allow(missing_docs)]
    pub fn function(&self, name: &str) -> Option<&FunctionDecl> {
        self.functions.iter().find(|f| f.name == name)
    }

    #[allow(missing_docs)]
    pub fn enum_decl(&self, name: &str) -> Option<&EnumDecl> {
        self.enums.iter().find(|e| e.name == name)
    }

    /// The enumeration declaring `element`. Element names are assumed to be
    /// unique across enumerations; the first declaration wins otherwise.
    pub fn enum_of_element(&self, element: &str) -> Option<&EnumDecl> {
        self.enums
            .iter()
            .find(|e| e.elements.iter().any(|x| x == element))
    }

    #[allow(missing_docs)]
    pub fn hint(&self, name: &str) -> Option<&HintDecl> {
        self.hints.iter().find(|h| h.name == name)
    }
}
