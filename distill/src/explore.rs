// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Structural discovery of hints from the program's state machines.
//!
//! Pairs of events that the control flow puts next to each other are likely
//! to be related by an invariant:
//! - an event received by a handler and an event the handler sends,
//! - two instances of an event a handler sends,
//! - an event sent on the way to a state and an event that state handles,
//! - an event received on the way to a state and an event its entry sends.
//!
//! Every pair is proposed once as a forall-only hint and once with the second
//! event existentially quantified.

use expr::program::{FunctionSummary, HandlerAction, Machine, Program, State};
use expr::types::Type;
use solver::hashmap::HashSet;

use crate::hint::Hint;

struct Proposals<'a> {
    program: &'a Program,
    seen: HashSet<Vec<String>>,
    hints: Vec<Hint>,
}

impl<'a> Proposals<'a> {
    fn add(&mut self, name: String, events: [&str; 2]) {
        let empty = events.iter().any(|e| {
            self.program
                .event(e)
                .map_or(true, |decl| decl.payload == Type::Null)
        });
        if empty {
            log::warn!("skipping ae_{name} due to empty payload(s)");
            return;
        }
        let events: Vec<String> = events.iter().map(|e| e.to_string()).collect();
        if !self.seen.insert(events.clone()) {
            return;
        }
        for (existentials, suffix) in [(0, ""), (1, "_exists")] {
            let name = format!("ae_{name}{suffix}");
            match Hint::new(&name, events.clone(), existentials, None) {
                Ok(hint) => self.hints.push(hint),
                Err(err) => log::warn!("{err}"),
            }
        }
    }

    fn function(
        &mut self,
        machine: &Machine,
        state: &State,
        f: &FunctionSummary,
        trigger: Option<&str>,
    ) {
        for next in f.next_states.iter().filter_map(|n| machine.state(n)) {
            for handler in next.handlers.iter().filter(|h| h.consumes()) {
                for send in &f.sends {
                    self.add(
                        format!(
                            "{}_{}_send_{send}_then_monitor_{}",
                            machine.name, state.name, handler.event
                        ),
                        [send, &handler.event],
                    );
                }
            }
            if let (Some(trigger), Some(entry)) = (trigger, &next.entry) {
                for send in &entry.sends {
                    self.add(
                        format!(
                            "{}_{}_recved_{trigger}_send_{send}",
                            machine.name, next.name
                        ),
                        [send, trigger],
                    );
                }
            }
        }
    }

    fn machine(&mut self, machine: &Machine) {
        for state in &machine.states {
            for f in state.entry.iter().chain(state.exit.iter()) {
                self.function(machine, state, f, None);
            }
            for handler in &state.handlers {
                // a goto behaves like its function followed by a move to the target
                let f = match &handler.action {
                    HandlerAction::Do(f) => f.clone(),
                    HandlerAction::Goto { target, function } => {
                        let mut f = function.clone().unwrap_or_default();
                        f.next_states.push(target.clone());
                        f
                    }
                    HandlerAction::Ignore | HandlerAction::Defer => continue,
                };
                let event = &handler.event;
                for send in &f.sends {
                    self.add(
                        format!("{}_{}_recv_{event}_send_{send}", machine.name, state.name),
                        [send, event],
                    );
                    self.add(
                        format!("{}_{}_send_{send}_send_{send}", machine.name, state.name),
                        [send, send],
                    );
                }
                self.function(machine, state, &f, Some(event));
            }
        }
    }
}

/// Hints proposed by the control flow of every non-specification machine, in
/// discovery order.
pub fn propose_hints(program: &Program) -> Vec<Hint> {
    let mut proposals = Proposals {
        program,
        seen: HashSet::default(),
        hints: vec![],
    };
    for machine in program.machines.iter().filter(|m| !m.is_spec) {
        proposals.machine(machine);
    }
    log::info!("proposed {} hints", proposals.hints.len());
    proposals.hints
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn program() -> Program {
        let id = r#"{"named": [["id", "int"]]}"#;
        Program::from_json(&format!(
            r#"{{
            "events": [
                {{"name": "eReq", "payload": {id}}},
                {{"name": "eResp", "payload": {id}}},
                {{"name": "eAck", "payload": {id}}},
                {{"name": "eFin", "payload": {id}}},
                {{"name": "eReset", "payload": {id}}},
                {{"name": "eTick"}}
            ],
            "machines": [
                {{"name": "Client", "states": [
                    {{"name": "Init", "entry": {{"sends": ["eReq"], "next_states": ["Wait"]}}}},
                    {{"name": "Wait", "handlers": [
                        {{"event": "eResp", "action": {{"do": {{"sends": ["eAck"], "next_states": ["Done"]}}}}}},
                        {{"event": "eTick", "action": {{"do": {{"sends": ["eReq"]}}}}}},
                        {{"event": "eFin", "action": "ignore"}}
                    ]}},
                    {{"name": "Done", "entry": {{"sends": ["eFin"]}}, "handlers": [
                        {{"event": "eReset", "action": {{"goto": {{"target": "Init"}}}}}}
                    ]}}
                ]}},
                {{"name": "Server", "states": [
                    {{"name": "S", "handlers": [
                        {{"event": "eReq", "action": {{"do": {{"sends": ["eAck"]}}}}}}
                    ]}}
                ]}},
                {{"name": "Safety", "is_spec": true, "states": [
                    {{"name": "S", "handlers": [
                        {{"event": "eFin", "action": {{"do": {{"sends": ["eReset"]}}}}}}
                    ]}}
                ]}}
            ]
        }}"#
        ))
        .unwrap()
    }

    #[test]
    fn test_propose_hints() {
        let hints = propose_hints(&program());
        let names: Vec<&str> = hints
            .iter()
            .filter(|h| h.existentials() == 0)
            .map(|h| h.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "ae_Client_Init_send_eReq_then_monitor_eResp",
                "ae_Client_Wait_recv_eResp_send_eAck",
                "ae_Client_Wait_send_eAck_send_eAck",
                "ae_Client_Wait_send_eAck_then_monitor_eReset",
                "ae_Client_Done_recved_eResp_send_eFin",
                "ae_Client_Wait_send_eReq_send_eReq",
                "ae_Client_Init_recved_eReset_send_eReq",
                "ae_Server_S_recv_eReq_send_eAck",
            ]
        );
        assert_eq!(hints.len(), 2 * names.len());
        let exists = &hints[1];
        assert_eq!(exists.name, "ae_Client_Init_send_eReq_then_monitor_eResp_exists");
        assert_eq!(exists.header().to_string(), "∀eReq ∃eResp");
        assert!(hints.iter().all(|h| !h.user));
    }
}
