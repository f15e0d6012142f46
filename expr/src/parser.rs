// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Parser for guard/filter/term expressions.
//!
//! Parsing happens in two steps: the peg grammar produces an untyped tree,
//! which is then resolved against a [`Scope`] (event variables, plain
//! variables, enumerations and declared functions) and type checked.

use codespan_reporting::diagnostic::{Diagnostic, Label};
use peg::{error::ParseError as PegError, str::LineCol};
use thiserror::Error;

use crate::scope::Scope;
use crate::syntax::{BinOp, Expr, Float, UOp, INDEX_FN, SIZE_FN};
use crate::types::Type;

/// Reasons an expression text is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[allow(missing_docs)]
    #[error("syntax error: {0}")]
    Syntax(#[from] PegError<LineCol>),
    #[allow(missing_docs)]
    #[error("undeclared predicate or function `{0}`")]
    UndeclaredFunction(String),
    /// The name is neither a quantified event of the hint, a variable in scope,
    /// nor an enumeration element.
    #[error("`{0}` is not bound in this context")]
    Unbound(String),
    #[allow(missing_docs)]
    #[error("no field `{field}` in {ty}")]
    UnknownField { field: String, ty: Type },
    #[allow(missing_docs)]
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
}

/// Untyped syntax tree produced by the grammar.
#[derive(Debug, Clone, PartialEq)]
enum Raw {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Field(Box<Raw>, String),
    TupleIndex(Box<Raw>, usize),
    Call(String, Vec<Raw>),
    Unary(UOp, Box<Raw>),
    Binary(BinOp, Box<Raw>, Box<Raw>),
}

fn bin(op: BinOp, x: Raw, y: Raw) -> Raw {
    Raw::Binary(op, Box::new(x), Box::new(y))
}

peg::parser! {

grammar parser() for str {
    rule ident_start() = ['a'..='z' | 'A'..='Z' | '_']
    rule ident_char() = ident_start() / ['0'..='9']
    pub(super) rule ident() -> String
    = s:$(quiet!{ident_start() ident_char()*} / expected!("identifier"))
    { s.to_string() }

    rule _ = quiet!{ [' ' | '\t' | '\n' | '\r']* }

    rule float() -> f64
    = n:$(['0'..='9']+ "." ['0'..='9']+) {? n.parse().or(Err("float")) }

    rule int() -> i64
    = n:$(['0'..='9']+) {? n.parse().or(Err("integer")) }

    rule tuple_index() -> usize
    = n:$(['0'..='9']+) {? n.parse().or(Err("tuple index")) }

    rule string() -> String
    = "\"" s:$([^'"']*) "\"" { s.to_string() }

    pub(super) rule expr() -> Raw = precedence!{
        x:(@) _ "||" _ y:@ { bin(BinOp::Or, x, y) }
        --
        x:(@) _ "&&" _ y:@ { bin(BinOp::And, x, y) }
        --
        x:(@) _ "==" _ y:@ { bin(BinOp::Eq, x, y) }
        x:(@) _ "!=" _ y:@ { bin(BinOp::Neq, x, y) }
        --
        x:(@) _ "<=" _ y:@ { bin(BinOp::Le, x, y) }
        x:(@) _ ">=" _ y:@ { bin(BinOp::Ge, x, y) }
        x:(@) _ "<" _ y:@ { bin(BinOp::Lt, x, y) }
        x:(@) _ ">" _ y:@ { bin(BinOp::Gt, x, y) }
        --
        x:(@) _ "+" _ y:@ { bin(BinOp::Add, x, y) }
        x:(@) _ "-" _ y:@ { bin(BinOp::Sub, x, y) }
        --
        x:(@) _ "*" _ y:@ { bin(BinOp::Mul, x, y) }
        x:(@) _ "/" _ y:@ { bin(BinOp::Div, x, y) }
        x:(@) _ "%" _ y:@ { bin(BinOp::Mod, x, y) }
        --
        "!" _ x:@ { Raw::Unary(UOp::Not, Box::new(x)) }
        "-" _ x:@ { Raw::Unary(UOp::Neg, Box::new(x)) }
        --
        x:(@) "." i:tuple_index() { Raw::TupleIndex(Box::new(x), i) }
        x:(@) "." f:ident() { Raw::Field(Box::new(x), f) }
        --
        f:float() { Raw::Float(f) }
        i:int() { Raw::Int(i) }
        s:string() { Raw::Str(s) }
        // no space is allowed between a function name and its arguments
        f:ident() "(" _ args:(expr() ** (_ "," _)) _ ")" { Raw::Call(f, args) }
        s:ident() { match s.as_str() {
            "true" => Raw::Bool(true),
            "false" => Raw::Bool(false),
            _ => Raw::Ident(s),
        } }
        "(" _ e:expr() _ ")" { e }
    }

    pub(super) rule full_expr() -> Raw = _ e:expr() _ { e }
}
}

fn mismatch<T>(msg: String) -> Result<T, ParseError> {
    Err(ParseError::TypeMismatch(msg))
}

fn resolve(raw: &Raw, scope: &Scope) -> Result<Expr, ParseError> {
    let program = scope.program();
    match raw {
        Raw::Bool(b) => Ok(Expr::Bool(*b)),
        Raw::Int(i) => Ok(Expr::Int(*i)),
        Raw::Float(f) => Ok(Expr::Float(Float(*f))),
        Raw::Str(s) => Ok(Expr::Str(s.clone())),
        Raw::Ident(name) => {
            if let Some(event) = scope.event(name) {
                Ok(Expr::event(name, event))
            } else if let Some(ty) = scope.var(name) {
                Ok(Expr::Var {
                    name: name.clone(),
                    ty: ty.clone(),
                })
            } else if let Some(decl) = program.enum_of_element(name) {
                Ok(Expr::EnumElem {
                    enum_name: decl.name.clone(),
                    elem: name.clone(),
                })
            } else {
                Err(ParseError::Unbound(name.clone()))
            }
        }
        Raw::Field(base, field) => {
            let base = resolve(base, scope)?;
            let ty = match base.ty() {
                Type::Event(event) => {
                    let payload = program
                        .event(&event)
                        .map(|e| e.payload.clone())
                        .ok_or_else(|| ParseError::Unbound(event.clone()))?;
                    if field == "payload" {
                        payload
                    } else {
                        payload
                            .field(field)
                            .cloned()
                            .ok_or_else(|| ParseError::UnknownField {
                                field: field.clone(),
                                ty: payload.clone(),
                            })?
                    }
                }
                ty => ty.field(field).cloned().ok_or(ParseError::UnknownField {
                    field: field.clone(),
                    ty: ty.clone(),
                })?,
            };
            Ok(Expr::field(base, field, ty))
        }
        Raw::TupleIndex(base, index) => {
            let mut base = resolve(base, scope)?;
            // positional access on an event goes through its payload
            if let Type::Event(event) = base.ty() {
                let payload = program
                    .event(&event)
                    .map(|e| e.payload.clone())
                    .ok_or_else(|| ParseError::Unbound(event.clone()))?;
                base = Expr::field(base, "payload", payload);
            }
            let ty = match base.ty() {
                Type::Tuple(ts) if *index < ts.len() => ts[*index].clone(),
                Type::Named(fields) if *index < fields.len() => fields[*index].1.clone(),
                ty => {
                    return Err(ParseError::UnknownField {
                        field: index.to_string(),
                        ty,
                    })
                }
            };
            Ok(Expr::TupleIndex {
                base: Box::new(base),
                index: *index,
                ty,
            })
        }
        Raw::Call(func, args) => {
            let args = args
                .iter()
                .map(|a| resolve(a, scope))
                .collect::<Result<Vec<_>, _>>()?;
            let ty = match func.as_str() {
                INDEX_FN => match args.as_slice() {
                    [Expr::Event { .. }] => Type::Int,
                    _ => return mismatch(format!("{INDEX_FN} expects a quantified event")),
                },
                SIZE_FN => match args.as_slice() {
                    [a] if a.ty().is_sized() => Type::Int,
                    _ => return mismatch(format!("{SIZE_FN} expects a collection")),
                },
                _ => {
                    let decl = program
                        .function(func)
                        .ok_or_else(|| ParseError::UndeclaredFunction(func.clone()))?;
                    if decl.params.len() != args.len() {
                        return mismatch(format!(
                            "{func} expects {} arguments, got {}",
                            decl.params.len(),
                            args.len()
                        ));
                    }
                    for (param, arg) in decl.params.iter().zip(&args) {
                        if &arg.ty() != param {
                            return mismatch(format!(
                                "argument of {func} has type {}, expected {param}",
                                arg.ty()
                            ));
                        }
                    }
                    decl.ret.clone()
                }
            };
            Ok(Expr::Call {
                func: func.clone(),
                args,
                ty,
            })
        }
        Raw::Unary(op, e) => {
            let e = resolve(e, scope)?;
            let ty = e.ty();
            match op {
                UOp::Not if ty != Type::Bool => mismatch(format!("cannot negate {ty}")),
                UOp::Neg if !ty.is_numeric() => mismatch(format!("cannot negate {ty}")),
                _ => Ok(Expr::Unary(*op, Box::new(e))),
            }
        }
        Raw::Binary(op, lhs, rhs) => {
            let lhs = resolve(lhs, scope)?;
            let rhs = resolve(rhs, scope)?;
            let (lt, rt) = (lhs.ty(), rhs.ty());
            let ok = match op {
                BinOp::Mod => lt == Type::Int && rt == Type::Int,
                BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => lt.is_numeric() && lt == rt,
                BinOp::And | BinOp::Or => lt == Type::Bool && rt == Type::Bool,
                BinOp::Eq | BinOp::Neq => lt == rt && !matches!(lt, Type::Event(_)),
                BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => lt.is_numeric() && lt == rt,
            };
            if !ok {
                return mismatch(format!(
                    "`{}` applied to {lt} and {rt}",
                    op.symbol()
                ));
            }
            Ok(Expr::binary(*op, lhs, rhs))
        }
    }
}

/// Parse and type check an expression in `scope`.
pub fn parse(s: &str, scope: &Scope) -> Result<Expr, ParseError> {
    let raw = parser::full_expr(s)?;
    resolve(&raw, scope)
}

/// Convert an opaque FileId and syntax error to a readable `Diagnostic`
pub fn parse_error_diagnostic<FileId>(
    file_id: FileId,
    e: &PegError<LineCol>,
) -> Diagnostic<FileId> {
    Diagnostic::error()
        .with_message("could not parse expression")
        .with_labels(vec![Label::primary(
            file_id,
            e.location.offset..e.location.offset + 1,
        )
        .with_message(format!("expected {}", e.expected))])
}

#[cfg(test)]
mod tests {
    use super::{parse, parser, ParseError, Raw};
    use crate::program::Program;
    use crate::scope::Scope;
    use crate::syntax::{BinOp, Expr, UOp};
    use crate::types::Type;

    fn program() -> Program {
        Program::from_json(
            r#"{
            "enums": [{"name": "Status", "elements": ["OK", "ERR"]}],
            "events": [
                {"name": "eReq", "payload": {"named": [["id", "int"], ["amount", "float"], ["who", "machine"]]}},
                {"name": "eResp", "payload": {"named": [["id", "int"], ["status", {"enum": "Status"}], ["pair", {"tuple": ["int", "bool"]}]]}},
                {"name": "eTick", "payload": "int"}
            ],
            "functions": [{"name": "valid", "params": ["int"], "ret": "bool"}]
        }"#,
        )
        .unwrap()
    }

    fn raw(s: &str) -> Raw {
        parser::full_expr(s).expect("test expression should parse")
    }

    #[test]
    fn test_ident() {
        assert_eq!(&parser::ident("e0").unwrap(), "e0");
        assert_eq!(&parser::ident("_num_e_exists_").unwrap(), "_num_e_exists_");
        assert!(parser::ident("1up").is_err());
    }

    #[test]
    fn test_precedence() {
        assert_eq!(raw("a || b && c"), raw("a || (b && c)"));
        assert_eq!(raw("a + b * c < d"), raw("(a + (b * c)) < d"));
        assert_eq!(raw("a - b - c"), raw("(a - b) - c"));
        assert_eq!(raw("!a == b"), raw("(!a) == b"));
        assert_eq!(raw("a <= b"), raw("(a <= b)"));
        assert_eq!(raw("-3"), Raw::Unary(UOp::Neg, Box::new(Raw::Int(3))));
        assert!(parser::full_expr("a <").is_err());
    }

    #[test]
    fn test_resolve() {
        let p = program();
        let scope = Scope::new(&p)
            .with_event("e0", "eReq")
            .with_event("e1", "eResp");
        let e = parse("e0.id == e1.id", &scope).unwrap();
        assert_eq!(
            e,
            Expr::binary(
                BinOp::Eq,
                Expr::field(Expr::event("e0", "eReq"), "id", Type::Int),
                Expr::field(Expr::event("e1", "eResp"), "id", Type::Int),
            )
        );
        assert_eq!(
            parse("e1.status == OK", &scope).unwrap().ty(),
            Type::Bool
        );
        assert_eq!(
            parse("e1.pair.1", &scope).unwrap().ty(),
            Type::Bool
        );
        assert_eq!(
            parse("index(e0) < index(e1)", &scope).unwrap().ty(),
            Type::Bool
        );
        assert!(parse("valid(e0.id) && e0.amount > 1.5", &scope).is_ok());
    }

    #[test]
    fn test_payload_access() {
        let p = program();
        let scope = Scope::new(&p)
            .with_event("e0", "eTick")
            .with_event("e1", "eResp");
        assert_eq!(parse("e0.payload + 1", &scope).unwrap().ty(), Type::Int);
        assert_eq!(
            parse("e1.0 == 2", &scope).unwrap(),
            parse("e1.payload.0 == 2", &scope).unwrap()
        );
    }

    #[test]
    fn test_rejections() {
        let p = program();
        let scope = Scope::new(&p).with_event("e0", "eReq");
        assert_eq!(
            parse("e1.id == 0", &scope),
            Err(ParseError::Unbound("e1".to_string()))
        );
        assert_eq!(
            parse("bogus(e0.id)", &scope),
            Err(ParseError::UndeclaredFunction("bogus".to_string()))
        );
        assert!(matches!(
            parse("e0.nope == 0", &scope),
            Err(ParseError::UnknownField { .. })
        ));
        // comparing a machine to an enum
        assert!(matches!(
            parse("e0.who == OK", &scope),
            Err(ParseError::TypeMismatch(_))
        ));
        assert!(matches!(
            parse("e0.id == \"ok\"", &scope),
            Err(ParseError::TypeMismatch(_))
        ));
        assert!(matches!(parse("e0.id <", &scope), Err(ParseError::Syntax(_))));
    }
}
