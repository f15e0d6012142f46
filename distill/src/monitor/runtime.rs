// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Running monitors over recorded event traces.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use expr::semantics::{holds, Env, EvalError, NativeFn, Value};
use expr::syntax::{Expr, NUM_EXISTS_VAR};

use crate::error::DistillError;
use crate::hint::EventVar;
use crate::monitor::{MonitorDef, MonitorError};

/// One observed event of a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

/// Read a trace: a JSON array of events.
pub fn load_trace(path: &Path) -> Result<Vec<TraceEvent>, DistillError> {
    let contents = fs::read_to_string(path).map_err(DistillError::io(path))?;
    Ok(serde_json::from_str(&contents)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Waiting for the configuration event
    Init,
    /// No unmet existential obligations
    Cold,
    /// Some obligation waits for a witness
    Hot,
}

/// A running monitor.
#[derive(Debug)]
pub struct Monitor<'d> {
    def: &'d MonitorDef,
    state: MonitorState,
    env: Env,
    event_counter: usize,
    /// (payload, arrival index) per event type
    history: BTreeMap<String, Vec<(Value, usize)>>,
    /// History positions of the universal variables still waiting for a
    /// witness
    pending: BTreeSet<Vec<usize>>,
}

impl<'d> Monitor<'d> {
    pub fn new(def: &'d MonitorDef) -> Self {
        let state = if def.hint.config_event.is_some() {
            MonitorState::Init
        } else {
            MonitorState::Cold
        };
        Self {
            def,
            state,
            env: Env::new(),
            event_counter: 0,
            history: def.events().into_iter().map(|e| (e, vec![])).collect(),
            pending: BTreeSet::new(),
        }
    }

    /// Provide the implementation of a program-declared function.
    pub fn define(&mut self, name: &str, f: NativeFn) {
        self.env.define(name, f);
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn eval_error(&self, err: EvalError) -> MonitorError {
        MonitorError::Eval {
            monitor: self.def.name.clone(),
            invariant: self.def.invariant.clone(),
            err,
        }
    }

    fn all_hold(
        &mut self,
        preds: &[Expr],
        vars: &[EventVar],
        positions: &[usize],
    ) -> Result<bool, MonitorError> {
        self.env.clear_events();
        for (v, &i) in vars.iter().zip(positions) {
            let (payload, index) = &self.history[&v.event][i];
            self.env.bind_event(&v.name, payload.clone(), *index);
        }
        for p in preds {
            match holds(p, &self.env) {
                Ok(true) => {}
                Ok(false) => return Ok(false),
                Err(err) => return Err(self.eval_error(err)),
            }
        }
        Ok(true)
    }

    fn positions(&self, vars: &[EventVar]) -> Vec<Vec<usize>> {
        if vars.is_empty() {
            return vec![vec![]];
        }
        vars.iter()
            .map(|v| 0..self.history[&v.event].len())
            .multi_cartesian_product()
            .collect()
    }

    /// Whether the universal positions `forall` have a witness among the
    /// histories of the existential variables.
    fn witnessed(&mut self, forall: &[usize]) -> Result<bool, MonitorError> {
        let def = self.def;
        let vars = def.hint.vars();
        let exists = def.hint.exists_vars();
        let mut n_exists = 0;
        for witness in self.positions(&exists) {
            let positions: Vec<usize> = forall.iter().chain(witness.iter()).copied().collect();
            if !self.all_hold(&def.filters, &vars, &positions)? {
                continue;
            }
            n_exists += 1;
            self.env.bind_var(NUM_EXISTS_VAR, Value::Int(n_exists));
            if self.all_hold(&def.meta_filters, &vars, &positions)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn on_forall(&mut self, event: &str) -> Result<(), MonitorError> {
        let def = self.def;
        let forall = def.hint.forall_vars();
        let newest = self.history[event].len() - 1;
        // every combination that uses the newest event in some position
        let mut combos = BTreeSet::new();
        for (current, _) in forall.iter().enumerate().filter(|(_, v)| v.event == event) {
            let others: Vec<EventVar> = forall
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != current)
                .map(|(_, v)| v.clone())
                .collect();
            for mut positions in self.positions(&others) {
                positions.insert(current, newest);
                combos.insert(positions);
            }
        }
        for positions in combos {
            if !self.all_hold(&def.guards, &forall, &positions)? {
                continue;
            }
            if def.hint.existentials() == 0 {
                if !self.all_hold(&def.filters, &forall, &positions)? {
                    return Err(MonitorError::Violation {
                        monitor: def.name.clone(),
                        event: event.to_string(),
                        index: self.event_counter - 1,
                        invariant: def.invariant.clone(),
                    });
                }
            } else if !self.witnessed(&positions)? {
                self.pending.insert(positions);
            }
        }
        Ok(())
    }

    fn on_exists(&mut self) -> Result<(), MonitorError> {
        let mut resolved = vec![];
        for combo in self.pending.clone() {
            if self.witnessed(&combo)? {
                resolved.push(combo);
            }
        }
        for combo in resolved {
            self.pending.remove(&combo);
        }
        Ok(())
    }

    /// Feed one event to the monitor. Events the monitor does not observe
    /// are ignored.
    pub fn observe(&mut self, event: &str, payload: &Value) -> Result<(), MonitorError> {
        let def = self.def;
        if self.state == MonitorState::Init {
            if def.hint.config_event.as_deref() == Some(event) {
                for (name, _) in &def.config_fields {
                    let value = match payload {
                        Value::Record(fields) => fields.get(name).cloned(),
                        _ => None,
                    };
                    let value = value
                        .ok_or_else(|| self.eval_error(EvalError::UnknownField(name.clone())))?;
                    self.env.bind_var(name, value);
                }
                self.state = MonitorState::Cold;
            } else {
                log::debug!("{}: ignoring {event} before configuration", def.name);
            }
            return Ok(());
        }
        let Some(hist) = self.history.get_mut(event) else {
            return Ok(());
        };
        hist.push((payload.clone(), self.event_counter));
        self.event_counter += 1;
        let existential = def.hint.existentials() > 0;
        if existential && def.hint.exists_events().iter().any(|e| e == event) {
            self.on_exists()?;
        }
        self.on_forall(event)?;
        if existential {
            self.state = if self.pending.is_empty() {
                MonitorState::Cold
            } else {
                MonitorState::Hot
            };
        }
        Ok(())
    }

    /// End the run. A monitor left hot has unmet obligations.
    pub fn finish(&self) -> Result<(), MonitorError> {
        if self.state == MonitorState::Hot {
            return Err(MonitorError::Liveness {
                monitor: self.def.name.clone(),
                pending: self.pending.len(),
                invariant: self.def.invariant.clone(),
            });
        }
        Ok(())
    }
}

/// Run every monitor over `trace`, collecting the violations.
pub fn check_trace(defs: &[MonitorDef], trace: &[TraceEvent]) -> Vec<MonitorError> {
    let mut errors = vec![];
    for def in defs {
        let mut monitor = Monitor::new(def);
        let result = trace
            .iter()
            .try_for_each(|e| monitor.observe(&e.event, &e.payload))
            .and_then(|()| monitor.finish());
        if let Err(err) = result {
            log::warn!("{err}");
            errors.push(err);
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hint::Hint;
    use crate::monitor::synthesize;
    use crate::monitor::tests::{program, record, reqresp};
    use serde_json::json;

    fn value(v: serde_json::Value) -> Value {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_hot_and_cold() {
        let p = program();
        let def = synthesize(&p, &record(&p, reqresp(1), &["e0.id > 0"], &["e0.id == e1.id"]), 0);
        let mut m = Monitor::new(&def);
        assert_eq!(m.state(), MonitorState::Cold);
        // guard does not hold, no obligation
        m.observe("eReq", &value(json!({"id": 0}))).unwrap();
        assert_eq!(m.state(), MonitorState::Cold);
        m.observe("eReq", &value(json!({"id": 1}))).unwrap();
        assert_eq!(m.state(), MonitorState::Hot);
        m.observe("eResp", &value(json!({"id": 2}))).unwrap();
        assert_eq!(m.state(), MonitorState::Hot);
        assert!(matches!(m.finish(), Err(MonitorError::Liveness { pending: 1, .. })));
        m.observe("eResp", &value(json!({"id": 1}))).unwrap();
        assert_eq!(m.state(), MonitorState::Cold);
        m.finish().unwrap();
        // an earlier witness counts too
        m.observe("eReq", &value(json!({"id": 2}))).unwrap();
        assert_eq!(m.state(), MonitorState::Cold);
    }

    #[test]
    fn test_meta_filters() {
        let p = program();
        let def = synthesize(
            &p,
            &record(&p, reqresp(1), &[], &["e0.id == e1.id", "_num_e_exists_ >= 2"]),
            0,
        );
        let mut m = Monitor::new(&def);
        m.observe("eReq", &value(json!({"id": 1}))).unwrap();
        m.observe("eResp", &value(json!({"id": 1}))).unwrap();
        assert_eq!(m.state(), MonitorState::Hot);
        m.observe("eResp", &value(json!({"id": 1}))).unwrap();
        assert_eq!(m.state(), MonitorState::Cold);
    }

    #[test]
    fn test_forall_violation() {
        let p = program();
        let h = Hint::new("bounded", vec!["eReq".to_string()], 0, Some("eConfig".to_string())).unwrap();
        let def = synthesize(&p, &record(&p, h, &[], &["e0.id < limit"]), 0);
        let mut m = Monitor::new(&def);
        assert_eq!(m.state(), MonitorState::Init);
        // ignored before configuration
        m.observe("eReq", &value(json!({"id": 100}))).unwrap();
        m.observe("eConfig", &value(json!({"limit": 10}))).unwrap();
        assert_eq!(m.state(), MonitorState::Cold);
        m.observe("eReq", &value(json!({"id": 3}))).unwrap();
        let err = m.observe("eReq", &value(json!({"id": 10}))).unwrap_err();
        assert_eq!(
            err,
            MonitorError::Violation {
                monitor: "bounded_0".to_string(),
                event: "eReq".to_string(),
                index: 1,
                invariant: "[eConfig] ∀e0: eReq :: e0.id < limit".to_string(),
            }
        );
    }

    #[test]
    fn test_same_type_universals() {
        let p = program();
        let h = Hint::new("ordered", vec!["eReq".to_string(), "eReq".to_string()], 0, None).unwrap();
        let def = synthesize(&p, &record(&p, h, &["index(e0) < index(e1)"], &["e0.id < e1.id"]), 0);
        let mut m = Monitor::new(&def);
        m.observe("eReq", &value(json!({"id": 5}))).unwrap();
        // the newest event binds e1 here, not e0
        let err = m.observe("eReq", &value(json!({"id": 3}))).unwrap_err();
        assert!(matches!(err, MonitorError::Violation { index: 1, .. }));

        let mut m = Monitor::new(&def);
        for id in [1, 2, 3] {
            m.observe("eReq", &value(json!({ "id": id }))).unwrap();
        }
        m.finish().unwrap();
    }

    #[test]
    fn test_check_trace() {
        let p = program();
        let defs = vec![
            synthesize(&p, &record(&p, reqresp(0), &[], &["index(e0) < index(e1)"]), 0),
            synthesize(&p, &record(&p, reqresp(1), &[], &["e0.id == e1.id"]), 1),
        ];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.json");
        fs::write(
            &path,
            r#"[{"event": "eResp", "payload": {"id": 1}},
                {"event": "eReq", "payload": {"id": 2}},
                {"event": "eTick"}]"#,
        )
        .unwrap();
        let trace = load_trace(&path).unwrap();
        assert_eq!(trace[2].payload, Value::Null);
        let errors = check_trace(&defs, &trace);
        assert_eq!(errors.len(), 2);
        assert!(matches!(&errors[0], MonitorError::Violation { index: 1, .. }));
        assert!(matches!(&errors[1], MonitorError::Liveness { pending: 1, .. }));
    }
}
