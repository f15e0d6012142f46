// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The names an expression may refer to.

use crate::program::Program;
use crate::types::Type;

/// The quantified event variables and plain variables in scope for parsing,
/// together with the program they range over.
#[derive(Debug, Clone)]
pub struct Scope<'a> {
    program: &'a Program,
    events: Vec<(String, String)>,
    vars: Vec<(String, Type)>,
}

impl<'a> Scope<'a> {
    /// An empty scope over `program`.
    pub fn new(program: &'a Program) -> Self {
        Self {
            program,
            events: vec![],
            vars: vec![],
        }
    }

    /// Bind a quantified event variable `name` to the event type `event`.
    pub fn with_event(mut self, name: &str, event: &str) -> Self {
        self.events.push((name.to_string(), event.to_string()));
        self
    }

    /// Bind a plain variable.
    pub fn with_var(mut self, name: &str, ty: Type) -> Self {
        self.vars.push((name.to_string(), ty));
        self
    }

    #[allow(missing_docs)]
    pub fn program(&self) -> &'a Program {
        self.program
    }

    /// The event type bound to the event variable `name`.
    pub fn event(&self, name: &str) -> Option<&str> {
        self.events
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, e)| e.as_str())
    }

    /// The type of the plain variable `name`.
    pub fn var(&self, name: &str) -> Option<&Type> {
        self.vars.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    /// Event variables in binding order.
    pub fn events(&self) -> &[(String, String)] {
        &self.events
    }

    /// Plain variables in binding order.
    pub fn vars(&self) -> &[(String, Type)] {
        &self.vars
    }

    /// The payload type of the event bound to `name`.
    pub fn payload(&self, name: &str) -> Option<&'a Type> {
        let event = self.event(name)?;
        self.program.event(event).map(|e| &e.payload)
    }
}
