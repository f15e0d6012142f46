// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Payload and expression types.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The type of an event payload, a payload field, or an expression.
#[derive(PartialEq, Eq, Clone, Debug, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Type {
    /// No payload
    #[default]
    Null,
    #[allow(missing_docs)]
    Bool,
    #[allow(missing_docs)]
    Int,
    #[allow(missing_docs)]
    Float,
    #[allow(missing_docs)]
    String,
    /// A machine reference, compared by its unique name
    Machine,
    /// A declared enumeration, by name
    Enum(std::string::String),
    /// Positional tuple
    Tuple(Vec<Type>),
    /// Named tuple, fields in declaration order
    Named(Vec<(std::string::String, Type)>),
    #[allow(missing_docs)]
    Seq(Box<Type>),
    #[allow(missing_docs)]
    Set(Box<Type>),
    #[allow(missing_docs)]
    Map(Box<Type>, Box<Type>),
    /// The type of a quantified event variable; the payload is reached through
    /// field access.
    Event(std::string::String),
}

impl Type {
    /// Integer or float.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    /// Types whose values are single, directly comparable scalars. These are the
    /// leaves the term generator stops at.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Type::Bool | Type::Int | Type::Float | Type::String | Type::Machine | Type::Enum(_)
        )
    }

    /// Types that support `size(..)`.
    pub fn is_sized(&self) -> bool {
        matches!(
            self,
            Type::Seq(_) | Type::Set(_) | Type::Map(_, _) | Type::String
        )
    }

    /// Look up a named field.
    pub fn field(&self, name: &str) -> Option<&Type> {
        match self {
            Type::Named(fields) => fields.iter().find(|(f, _)| f == name).map(|(_, t)| t),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Null => write!(f, "null"),
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::String => write!(f, "string"),
            Type::Machine => write!(f, "machine"),
            Type::Enum(name) => write!(f, "{name}"),
            Type::Tuple(ts) => write!(f, "({},)", ts.iter().join(", ")),
            Type::Named(fields) => write!(
                f,
                "({})",
                fields.iter().map(|(n, t)| format!("{n}: {t}")).join(", ")
            ),
            Type::Seq(t) => write!(f, "seq[{t}]"),
            Type::Set(t) => write!(f, "set[{t}]"),
            Type::Map(k, v) => write!(f, "map[{k}, {v}]"),
            Type::Event(e) => write!(f, "event {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Type;

    #[test]
    fn test_deserialize() {
        let t: Type =
            serde_json::from_str(r#"{"named": [["id", "int"], ["status", {"enum": "Status"}]]}"#)
                .unwrap();
        assert_eq!(
            t,
            Type::Named(vec![
                ("id".to_string(), Type::Int),
                ("status".to_string(), Type::Enum("Status".to_string())),
            ])
        );
        assert_eq!(t.field("status"), Some(&Type::Enum("Status".to_string())));
        assert_eq!(t.to_string(), "(id: int, status: Status)");
    }

    #[test]
    fn test_scalar() {
        assert!(Type::Machine.is_scalar());
        assert!(!Type::Seq(Box::new(Type::Int)).is_scalar());
        assert!(Type::Seq(Box::new(Type::Int)).is_sized());
    }
}
