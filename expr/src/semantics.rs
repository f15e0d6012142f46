// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Evaluation of expressions over concrete events.
//!
//! Payloads use a JSON-like [`Value`]. Enumeration elements and machine ids are
//! strings, tuples and sets are lists, named tuples are records. Integer
//! division and modulus follow SMT-LIB (Euclidean) semantics so that runtime
//! checks agree with what the solver proved.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::syntax::{BinOp, Expr, UOp, INDEX_FN, SIZE_FN};
use crate::types::Type;

/// A runtime value.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Record(BTreeMap<String, Value>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Record(_) => "record",
        }
    }
}

/// Reasons evaluation fails. A failing guard or filter is a bug in the
/// predicate or a payload that does not match the declared types.
#[allow(missing_docs)]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("`{0}` is not bound")]
    Unbound(String),
    #[error("no field `{0}` in value")]
    UnknownField(String),
    #[error("no implementation for function `{0}`")]
    UnknownFunction(String),
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
}

/// Native implementation of a program-declared function.
pub type NativeFn = fn(&[Value]) -> Result<Value, EvalError>;

/// A concrete event bound to a quantified variable.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBinding {
    /// The event's payload
    pub payload: Value,
    /// Global arrival index of the event in the run
    pub index: usize,
}

/// Bindings for everything an expression can mention.
#[derive(Debug, Clone, Default)]
pub struct Env {
    events: BTreeMap<String, EventBinding>,
    vars: BTreeMap<String, Value>,
    functions: BTreeMap<String, NativeFn>,
}

impl Env {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the event variable `name`.
    pub fn bind_event(&mut self, name: &str, payload: Value, index: usize) {
        self.events
            .insert(name.to_string(), EventBinding { payload, index });
    }

    /// Bind a plain variable.
    pub fn bind_var(&mut self, name: &str, value: Value) {
        self.vars.insert(name.to_string(), value);
    }

    /// Provide an implementation for a declared function.
    pub fn define(&mut self, name: &str, f: NativeFn) {
        self.functions.insert(name.to_string(), f);
    }

    /// Remove all event bindings, keeping variables and functions.
    pub fn clear_events(&mut self) {
        self.events.clear();
    }
}

fn as_bool(v: Value) -> Result<bool, EvalError> {
    match v {
        Value::Bool(b) => Ok(b),
        v => Err(EvalError::TypeMismatch {
            expected: "bool",
            found: v.kind(),
        }),
    }
}

fn field(base: Value, name: &str) -> Result<Value, EvalError> {
    match base {
        Value::Record(mut fields) => fields
            .remove(name)
            .ok_or_else(|| EvalError::UnknownField(name.to_string())),
        _ => Err(EvalError::UnknownField(name.to_string())),
    }
}

fn int_op(op: BinOp, x: i64, y: i64) -> Result<Value, EvalError> {
    let checked = |r: Option<i64>| r.map(Value::Int).ok_or(EvalError::Overflow);
    match op {
        BinOp::Add => checked(x.checked_add(y)),
        BinOp::Sub => checked(x.checked_sub(y)),
        BinOp::Mul => checked(x.checked_mul(y)),
        BinOp::Div | BinOp::Mod if y == 0 => Err(EvalError::DivisionByZero),
        BinOp::Div => checked(x.checked_div_euclid(y)),
        BinOp::Mod => checked(x.checked_rem_euclid(y)),
        BinOp::Lt => Ok(Value::Bool(x < y)),
        BinOp::Le => Ok(Value::Bool(x <= y)),
        BinOp::Gt => Ok(Value::Bool(x > y)),
        BinOp::Ge => Ok(Value::Bool(x >= y)),
        _ => Err(EvalError::TypeMismatch {
            expected: "bool",
            found: "int",
        }),
    }
}

fn float_op(op: BinOp, x: f64, y: f64) -> Result<Value, EvalError> {
    Ok(match op {
        BinOp::Add => Value::Float(x + y),
        BinOp::Sub => Value::Float(x - y),
        BinOp::Mul => Value::Float(x * y),
        BinOp::Div if y == 0.0 => return Err(EvalError::DivisionByZero),
        BinOp::Div => Value::Float(x / y),
        BinOp::Lt => Value::Bool(x < y),
        BinOp::Le => Value::Bool(x <= y),
        BinOp::Gt => Value::Bool(x > y),
        BinOp::Ge => Value::Bool(x >= y),
        _ => {
            return Err(EvalError::TypeMismatch {
                expected: "int",
                found: "float",
            })
        }
    })
}

/// Evaluate `e` in `env`.
pub fn eval(e: &Expr, env: &Env) -> Result<Value, EvalError> {
    match e {
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Int(i) => Ok(Value::Int(*i)),
        Expr::Float(f) => Ok(Value::Float(f.0)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::EnumElem { elem, .. } => Ok(Value::Str(elem.clone())),
        Expr::Event { name, .. } => env
            .events
            .get(name)
            .map(|b| b.payload.clone())
            .ok_or_else(|| EvalError::Unbound(name.clone())),
        Expr::Var { name, .. } => env
            .vars
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::Unbound(name.clone())),
        Expr::Field { base, field: f, .. } => {
            let v = eval(base, env)?;
            // `e.payload` on a quantified event is the payload itself
            if matches!(**base, Expr::Event { .. }) && f == "payload" {
                return Ok(v);
            }
            field(v, f)
        }
        Expr::TupleIndex { base, index, .. } => match (base.ty(), eval(base, env)?) {
            (Type::Named(fields), v) => match fields.get(*index) {
                Some((name, _)) => field(v, name),
                None => Err(EvalError::UnknownField(index.to_string())),
            },
            (_, Value::List(mut items)) if *index < items.len() => Ok(items.swap_remove(*index)),
            _ => Err(EvalError::UnknownField(index.to_string())),
        },
        Expr::Call { func, args, .. } if func == INDEX_FN => match args.as_slice() {
            [Expr::Event { name, .. }] => env
                .events
                .get(name)
                .map(|b| Value::Int(b.index as i64))
                .ok_or_else(|| EvalError::Unbound(name.clone())),
            _ => Err(EvalError::Unbound(INDEX_FN.to_string())),
        },
        Expr::Call { func, args, .. } if func == SIZE_FN => {
            let v = match args.as_slice() {
                [a] => eval(a, env)?,
                _ => return Err(EvalError::Unbound(SIZE_FN.to_string())),
            };
            let n = match &v {
                Value::List(items) => items.len(),
                Value::Record(fields) => fields.len(),
                Value::Str(s) => s.chars().count(),
                v => {
                    return Err(EvalError::TypeMismatch {
                        expected: "collection",
                        found: v.kind(),
                    })
                }
            };
            Ok(Value::Int(n as i64))
        }
        Expr::Call { func, args, .. } => {
            let f = env
                .functions
                .get(func)
                .ok_or_else(|| EvalError::UnknownFunction(func.clone()))?;
            let args = args
                .iter()
                .map(|a| eval(a, env))
                .collect::<Result<Vec<_>, _>>()?;
            f(&args)
        }
        Expr::Unary(UOp::Not, e) => Ok(Value::Bool(!as_bool(eval(e, env)?)?)),
        Expr::Unary(UOp::Neg, e) => match eval(e, env)? {
            Value::Int(i) => i.checked_neg().map(Value::Int).ok_or(EvalError::Overflow),
            Value::Float(x) => Ok(Value::Float(-x)),
            v => Err(EvalError::TypeMismatch {
                expected: "number",
                found: v.kind(),
            }),
        },
        Expr::Binary(BinOp::And, lhs, rhs) => {
            Ok(Value::Bool(as_bool(eval(lhs, env)?)? && as_bool(eval(rhs, env)?)?))
        }
        Expr::Binary(BinOp::Or, lhs, rhs) => {
            Ok(Value::Bool(as_bool(eval(lhs, env)?)? || as_bool(eval(rhs, env)?)?))
        }
        Expr::Binary(op @ (BinOp::Eq | BinOp::Neq), lhs, rhs) => {
            let same = eval(lhs, env)? == eval(rhs, env)?;
            Ok(Value::Bool(if *op == BinOp::Eq { same } else { !same }))
        }
        Expr::Binary(op, lhs, rhs) => match (eval(lhs, env)?, eval(rhs, env)?) {
            (Value::Int(x), Value::Int(y)) => int_op(*op, x, y),
            (Value::Float(x), Value::Float(y)) => float_op(*op, x, y),
            (x, y) => Err(EvalError::TypeMismatch {
                expected: x.kind(),
                found: y.kind(),
            }),
        },
    }
}

/// Evaluate a boolean expression.
pub fn holds(e: &Expr, env: &Env) -> Result<bool, EvalError> {
    as_bool(eval(e, env)?)
}
