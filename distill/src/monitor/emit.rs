// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Rendering monitors as P specification machines.

use itertools::Itertools;
use std::fs;
use std::path::Path;

use expr::syntax::{Expr, UOp, INDEX_FN, NUM_EXISTS_VAR, SIZE_FN};
use expr::types::Type;

use crate::error::DistillError;
use crate::hint::EventVar;
use crate::monitor::MonitorDef;

/// An expression in P syntax, with quantified events bound to their payloads
/// and `index(e)` to the `e_idx` parameter.
pub fn to_p(e: &Expr) -> String {
    match e {
        Expr::Bool(b) => format!("{b}"),
        Expr::Int(i) => format!("{i}"),
        Expr::Float(x) => format!("{:?}", x.0),
        Expr::Str(s) => format!("\"{s}\""),
        Expr::EnumElem { elem, .. } => elem.clone(),
        Expr::Event { name, .. } | Expr::Var { name, .. } => name.clone(),
        Expr::Field { base, field, .. } => match **base {
            Expr::Event { .. } if field == "payload" => to_p(base),
            _ => format!("{}.{field}", to_p(base)),
        },
        Expr::TupleIndex { base, index, .. } => format!("{}[{index}]", to_p(base)),
        Expr::Call { func, args, .. } if func == INDEX_FN && args.len() == 1 => {
            format!("{}_idx", to_p(&args[0]))
        }
        Expr::Call { func, args, .. } if func == SIZE_FN && args.len() == 1 => {
            format!("sizeof({})", to_p(&args[0]))
        }
        Expr::Call { func, args, .. } => format!("{func}({})", args.iter().map(to_p).join(", ")),
        Expr::Unary(op, e) => {
            let op = match op {
                UOp::Not => "!",
                UOp::Neg => "-",
            };
            format!("{op}({})", to_p(e))
        }
        Expr::Binary(op, lhs, rhs) => format!("({} {} {})", to_p(lhs), op.symbol(), to_p(rhs)),
    }
}

/// A payload type in P syntax.
pub fn p_type(t: &Type) -> String {
    match t {
        Type::Tuple(ts) => format!("({})", ts.iter().map(p_type).join(", ")),
        Type::Named(fields) => format!(
            "({})",
            fields
                .iter()
                .map(|(n, t)| format!("{n}: {}", p_type(t)))
                .join(", ")
        ),
        Type::Seq(t) => format!("seq[{}]", p_type(t)),
        Type::Set(t) => format!("set[{}]", p_type(t)),
        Type::Map(k, v) => format!("map[{}, {}]", p_type(k), p_type(v)),
        t => t.to_string(),
    }
}

fn hist(event: &str) -> String {
    format!("Hist_{event}")
}

fn counter(v: &EventVar) -> String {
    format!("Counter_{}", v.name)
}

/// Lines indented by brace nesting.
#[derive(Default)]
struct Lines {
    out: String,
    depth: usize,
}

impl Lines {
    fn line(&mut self, s: impl AsRef<str>) {
        let s = s.as_ref();
        if s.starts_with('}') {
            self.depth = self.depth.saturating_sub(1);
        }
        if !s.is_empty() {
            self.out.push_str(&"    ".repeat(self.depth));
            self.out.push_str(s);
        }
        self.out.push('\n');
        if s.ends_with('{') {
            self.depth += 1;
        }
    }
}

struct Emitter<'d> {
    def: &'d MonitorDef,
    lines: Lines,
}

impl<'d> Emitter<'d> {
    fn line(&mut self, s: impl AsRef<str>) {
        self.lines.line(s)
    }

    fn hist_item_type(&self, event: &str) -> String {
        format!("(payload: {}, idx: int)", p_type(&self.def.payload(event)))
    }

    fn pending_type(&self) -> String {
        let fields = self
            .def
            .hint
            .forall_vars()
            .iter()
            .map(|v| format!("{}: int", counter(v)))
            .join(", ");
        format!("({fields})")
    }

    fn params(&self, vars: &[EventVar]) -> String {
        vars.iter()
            .map(|v| format!("{}: {}", v.name, p_type(&self.def.payload(&v.event))))
            .chain(vars.iter().map(|v| format!("{}_idx: int", v.name)))
            .join(", ")
    }

    fn conjunction(preds: &[Expr]) -> String {
        if preds.is_empty() {
            "true".to_string()
        } else {
            preds.iter().map(to_p).join(" && ")
        }
    }

    /// `checkX` over history positions, forwarding payloads and arrival
    /// indices to `checkXImpl`.
    fn check(&mut self, name: &str, vars: &[EventVar], meta: bool, preds: &[Expr]) {
        let num = if meta {
            format!("{NUM_EXISTS_VAR}: int, ")
        } else {
            String::new()
        };
        let forward = if meta {
            format!("{NUM_EXISTS_VAR}, ")
        } else {
            String::new()
        };
        self.line(format!("fun {name}Impl({num}{}): bool {{", self.params(vars)));
        self.line(format!("return {};", Self::conjunction(preds)));
        self.line("}");
        let idx = vars.iter().map(|v| format!("{}_idx: int", v.name)).join(", ");
        let args = vars
            .iter()
            .map(|v| format!("{}[{}_idx].payload", hist(&v.event), v.name))
            .chain(
                vars.iter()
                    .map(|v| format!("{}[{}_idx].idx", hist(&v.event), v.name)),
            )
            .join(", ");
        self.line(format!("fun {name}({num}{idx}): bool {{"));
        self.line(format!("return {name}Impl({forward}{args});"));
        self.line("}");
    }

    /// Search the histories of the existential variables for a witness of
    /// the universal positions `forall`.
    fn witness_search(&mut self, forall: &[String], on_found: &[&str]) {
        let exists = self.def.hint.exists_vars();
        self.line("exists = false;");
        self.line("n_exists = 0;");
        for v in &exists {
            self.line(format!("{} = 0;", counter(v)));
            self.line(format!(
                "while ({} < sizeof({}) && !exists) {{",
                counter(v),
                hist(&v.event)
            ));
        }
        let args = forall
            .iter()
            .cloned()
            .chain(exists.iter().map(counter))
            .join(", ");
        self.line(format!("if (checkFilters({args})) {{"));
        self.line("n_exists = n_exists + 1;");
        self.line(format!("if (checkMetaFilters(n_exists, {args})) {{"));
        self.line("exists = true;");
        for s in on_found {
            self.line(*s);
        }
        self.line("break;");
        self.line("}");
        self.line("}");
        for v in exists.iter().rev() {
            self.line(format!("{c} = {c} + 1;", c = counter(v)));
            self.line("}");
        }
    }

    /// Check every universal combination that binds the newest `event`. Each
    /// variable of that type takes the newest event in turn. Variables of the
    /// same type before it skip the newest event, so no combination is
    /// visited twice.
    fn forall_part(&mut self, event: &str) {
        let forall = self.def.hint.forall_vars();
        for (i, current) in forall.iter().enumerate() {
            if current.event == event {
                self.forall_binding(&forall, i);
            }
        }
    }

    fn forall_binding(&mut self, forall: &[EventVar], current: usize) {
        let def = self.def;
        let hint = &def.hint;
        let event = &forall[current].event;
        self.line(format!("{} = sizeof({}) - 1;", counter(&forall[current]), hist(event)));
        let others: Vec<(usize, &EventVar)> =
            forall.iter().enumerate().filter(|(i, _)| *i != current).collect();
        for (i, v) in &others {
            let bound = if *i < current && &v.event == event {
                format!("sizeof({}) - 1", hist(&v.event))
            } else {
                format!("sizeof({})", hist(&v.event))
            };
            self.line(format!("{} = 0;", counter(v)));
            self.line(format!("while ({} < {bound}) {{", counter(v)));
        }
        let counters: Vec<String> = forall.iter().map(counter).collect();
        self.line(format!("if (checkGuards({})) {{", counters.join(", ")));
        if hint.existentials() > 0 {
            self.witness_search(&counters, &[]);
            self.line("if (!exists) {");
            let combo = forall
                .iter()
                .map(|v| format!("{c}={c}", c = counter(v)))
                .join(", ");
            self.line(format!("Pending += (({combo},));"));
            self.line("}");
        } else {
            self.line(format!("assert checkFilters({});", counters.join(", ")));
        }
        self.line("}");
        for (_, v) in others.iter().rev() {
            self.line(format!("{c} = {c} + 1;", c = counter(v)));
            self.line("}");
        }
    }

    fn exists_part(&mut self) {
        let pending = self.pending_type();
        let forall: Vec<String> = self
            .def
            .hint
            .forall_vars()
            .iter()
            .map(|v| format!("combo.{}", counter(v)))
            .collect();
        self.line(format!("resolved = default(set[{pending}]);"));
        self.line("foreach (combo in Pending) {");
        self.witness_search(&forall, &["resolved += (combo);"]);
        self.line("}");
        self.line("foreach (combo in resolved) {");
        self.line("Pending -= (combo);");
        self.line("}");
    }

    fn handler(&mut self, event: &str, hot: bool) {
        let def = self.def;
        let hint = &def.hint;
        let existential = hint.existentials() > 0;
        let is_forall = hint.forall_events().iter().any(|e| e == event);
        let is_exists = hint.exists_events().iter().any(|e| e == event);
        let payload = def.payload(event);
        if payload == Type::Null {
            self.line(format!("on {event} do {{"));
        } else {
            self.line(format!("on {event} do (payload: {}) {{", p_type(&payload)));
        }
        for v in hint.vars() {
            self.line(format!("var {}: int;", counter(&v)));
        }
        if existential {
            self.line("var exists: bool;");
            self.line("var n_exists: int;");
        }
        if existential && is_exists {
            let pending = self.pending_type();
            self.line(format!("var resolved: set[{pending}];"));
            self.line(format!("var combo: {pending};"));
        }
        let value = if payload == Type::Null { "null" } else { "payload" };
        self.line(format!(
            "{h} += (sizeof({h}), (payload={value}, idx=event_counter));",
            h = hist(event)
        ));
        self.line("event_counter = event_counter + 1;");
        if existential && is_exists {
            self.exists_part();
        }
        if is_forall {
            self.forall_part(event);
        }
        if existential {
            if hot {
                self.line("if (sizeof(Pending) == 0) {");
                self.line("goto Serving_Cold;");
            } else {
                self.line("if (sizeof(Pending) > 0) {");
                self.line("goto Serving_Hot;");
            }
            self.line("}");
        }
        self.line("}");
    }

    fn emit(mut self) -> String {
        let def = self.def;
        let hint = &def.hint;
        let events = def.events();
        self.line(format!("// Monitor for spec: {}", def.invariant));
        let observed = hint
            .config_event
            .iter()
            .chain(events.iter())
            .join(", ");
        self.line(format!("spec {} observes {observed} {{", def.name));

        let forall = hint.forall_vars();
        let all = hint.vars();
        self.check("checkGuards", &forall, false, &def.guards);
        self.check("checkFilters", &all, false, &def.filters);
        self.check("checkMetaFilters", &all, true, &def.meta_filters);
        self.line("");

        for (name, ty) in &def.config_fields {
            self.line(format!("var {name}: {};", p_type(ty)));
        }
        self.line("var event_counter: int;");
        for e in &events {
            self.line(format!("var {}: seq[{}];", hist(e), self.hist_item_type(e)));
        }
        let pending = self.pending_type();
        self.line(format!("var Pending: set[{pending}];"));

        self.line("start state Init {");
        self.line("entry {");
        for (name, ty) in &def.config_fields {
            self.line(format!("{name} = default({});", p_type(ty)));
        }
        self.line("event_counter = 0;");
        for e in &events {
            self.line(format!("{} = default(seq[{}]);", hist(e), self.hist_item_type(e)));
        }
        self.line(format!("Pending = default(set[{pending}]);"));
        if hint.config_event.is_none() {
            self.line("goto Serving_Cold;");
        }
        self.line("}");
        if let Some(config) = &hint.config_event {
            self.line(format!(
                "on {config} do (payload: {}) {{",
                p_type(&def.payload(config))
            ));
            for (name, _) in &def.config_fields {
                self.line(format!("{name} = payload.{name};"));
            }
            self.line("goto Serving_Cold;");
            self.line("}");
        }
        self.line("}");

        self.line("cold state Serving_Cold {");
        for e in &events {
            self.handler(e, false);
        }
        self.line("}");
        if hint.existentials() > 0 {
            self.line("hot state Serving_Hot {");
            for e in &events {
                self.handler(e, true);
            }
            self.line("}");
        }
        self.line(format!("}} // {}", def.name));
        self.lines.out
    }
}

/// The P text of one monitor.
pub fn render(def: &MonitorDef) -> String {
    Emitter {
        def,
        lines: Lines::default(),
    }
    .emit()
}

/// Write all monitors to one file.
pub fn write_monitors(defs: &[MonitorDef], path: &Path) -> Result<(), DistillError> {
    let text = defs.iter().map(render).join("\n");
    fs::write(path, text).map_err(DistillError::io(path))
}
