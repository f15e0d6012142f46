// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! S-expressions: the commands sent to the solver and the responses read
//! back.
//!
//! Comments are part of the grammar so that annotated query dumps parse.

use peg::str::LineCol;
use serde::Serialize;
use std::fmt;

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, PartialOrd, Ord)]
pub enum Atom {
    I(usize),
    /// A decimal numeral such as `0.5`, never quoted.
    Dec(String),
    S(String),
    /// An SMT-LIB string literal, printed in double quotes.
    Str(String),
}

/// An s-expression which also tracks comments.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, PartialOrd, Ord)]
pub enum Sexp {
    Atom(Atom),
    Comment(String),
    List(Vec<Sexp>),
}

/// Construct an sexp atom from a string.
pub fn atom_s<S: AsRef<str>>(s: S) -> Sexp {
    Sexp::Atom(Atom::S(s.as_ref().to_string()))
}

/// Construct an sexp atom from an integer.
pub fn atom_i(i: usize) -> Sexp {
    Sexp::Atom(Atom::I(i))
}

/// Construct a decimal numeral from its digits, as in `2.0`.
pub fn atom_dec<S: AsRef<str>>(s: S) -> Sexp {
    Sexp::Atom(Atom::Dec(s.as_ref().to_string()))
}

/// Construct an SMT-LIB string literal.
pub fn string_lit<S: AsRef<str>>(s: S) -> Sexp {
    Sexp::Atom(Atom::Str(s.as_ref().to_string()))
}

/// Construct an sexp list from an iteratable.
pub fn sexp_l<I>(i: I) -> Sexp
where
    I: IntoIterator,
    I::IntoIter: Iterator<Item = Sexp>,
{
    Sexp::List(i.into_iter().collect())
}

/// Construct an sexp list with a string atom as its "head" element, followed by
/// an iterable of remaining arguments.
pub fn app<I>(head: &str, args: I) -> Sexp
where
    I: IntoIterator,
    I::IntoIter: Iterator<Item = Sexp>,
{
    let mut ss = vec![atom_s(head)];
    ss.extend(args.into_iter());
    Sexp::List(ss)
}

/// A symbol that can be printed without `|..|` quoting.
fn is_simple_symbol(s: &str) -> bool {
    let special = "~!@$%^&*_-+=<>.?/:";
    !s.is_empty()
        && !s.starts_with(|c: char| c.is_ascii_digit())
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || special.contains(c))
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::I(i) => write!(f, "{i}"),
            Atom::Dec(d) => write!(f, "{d}"),
            Atom::S(s) => {
                if is_simple_symbol(s) {
                    write!(f, "{s}")
                } else if s.contains('|') {
                    write!(f, "\"{s}\"")
                } else {
                    write!(f, "|{s}|")
                }
            }
            Atom::Str(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
        }
    }
}

impl fmt::Display for Sexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sexp::Atom(s) => write!(f, "{s}"),
            Sexp::Comment(s) => write!(f, ";{s}"),
            Sexp::List(ss) => {
                write!(f, "(")?;
                for (i, s) in ss.iter().enumerate() {
                    let last = i == ss.len() - 1;
                    let this_comment = matches!(s, Sexp::Comment(_));
                    let next_comment = !last && matches!(ss[i + 1], Sexp::Comment(_));
                    let space = if last || this_comment || next_comment {
                        ""
                    } else {
                        " "
                    };
                    if this_comment {
                        write!(f, "\n{s}\n{space}")?;
                    } else {
                        write!(f, "{s}{space}")?;
                    }
                }
                write!(f, ")")?;
                Ok(())
            }
        }
    }
}

impl Sexp {
    /// Return the inner elements if self is a Sexp::List
    pub fn list(&self) -> Option<&[Sexp]> {
        if let Sexp::List(ss) = self {
            Some(ss)
        } else {
            None
        }
    }

    /// Return the inner string if self is a string atom.
    pub fn atom_s(&self) -> Option<&str> {
        if let Sexp::Atom(Atom::S(s)) = self {
            Some(s)
        } else {
            None
        }
    }

    /// Return the head and tail if self is of the form `(head rest..)`.
    pub fn app(&self) -> Option<(&str, &[Sexp])> {
        self.list().and_then(|ss| {
            if !ss.is_empty() {
                if let Some(head) = ss[0].atom_s() {
                    return Some((head, &ss[1..]));
                }
            }
            None
        })
    }
}

peg::parser! {
grammar parser() for str {
  rule ident_start() = ['a'..='z' | 'A'..='Z' | '_' | '\'' | '<' | '>' | ':' | '=' | '$' | '@' | '+' | '-' | '*']
  rule ident_char() = ident_start() / ['0'..='9' | '!' | '#' | '%' | '-' | '.']
  rule ident() = quiet! { ident_start() ident_char()* } / expected!("atom")

  rule whitespace() = [' ' | '\t' | '\n' | '\r']
  rule _ = whitespace()*

  rule quoted_atom() -> Atom
  = "\"" s:$([^'"']*) "\"" { Atom::S(s.to_string()) }

  rule pipe_quoted_atom() -> Atom
  = "|" s:$([^'|']*) "|" { Atom::S(s.to_string()) }

  rule unquoted_atom() -> Atom
  = s:$(ident()) { Atom::S(s.to_string()) }

  rule dec_atom() -> Atom
  = d:$(['0'..='9']+ "." ['0'..='9']+) { Atom::Dec(d.to_string()) }

  rule int_atom() -> Atom
  = i:$(['0'..='9']+) {? i.parse().map(Atom::I).or(Err("integer")) }

  rule atom() -> Sexp
  = s:(quoted_atom() /
       pipe_quoted_atom() /
       unquoted_atom() /
       dec_atom() /
       int_atom()) { Sexp::Atom(s) }

  rule comment() -> Sexp
  = ";" s:$(([^'\n']*)) ['\n'] { Sexp::Comment(s.to_string()) }

  rule list() -> Sexp
  = "(" _ ss:(sexp() ** _) _ ")" { Sexp::List(ss) }

  rule sexp() -> Sexp
  = atom() / comment() / list()

  /// Parse an sexp but be tolerant to whitespace around it.
  pub(super) rule sexp_whitespace() -> Sexp
  = _ s:sexp() _ { s }

  /// Parse a sequence of sexps.
  pub(super) rule sexps() -> Vec<Sexp>
  = _ ss:(sexp() ** _) _ { ss }
}
}

/// Parse an sexp.
///
/// Allows whitespace before or after.
pub fn parse(s: &str) -> Result<Sexp, peg::error::ParseError<LineCol>> {
    parser::sexp_whitespace(s)
}

/// Parse a sequence of sexps, separated by whitespace.
pub fn parse_many(s: &str) -> Result<Vec<Sexp>, peg::error::ParseError<LineCol>> {
    parser::sexps(s)
}

#[cfg(test)]
mod tests {
    use super::parse;
    use super::{app, atom_dec, atom_i, atom_s, sexp_l, string_lit};

    #[test]
    fn test_parsing() {
        assert_eq!(
            parse("(foo  a (bar () 1))"),
            Ok(app(
                "foo",
                [atom_s("a"), app("bar", [sexp_l([]), atom_i(1)])]
            ))
        );
    }

    #[test]
    fn test_printing() {
        let e = parse(
            r#"(hello a b c (there
            ; here's a comment
            (friend)))
            "#,
        )
        .unwrap();
        insta::assert_snapshot!(e, @r#"
        (hello a b c (there
        ; here's a comment
        (friend)))
        "#);
    }

    #[test]
    fn test_symbol_quoting() {
        let consts = app(
            "and",
            [
                atom_s("e0.payload.id"),
                atom_s("index(e0)"),
                atom_s("e1.pair.1"),
                string_lit("say \"hi\""),
            ],
        );
        insta::assert_display_snapshot!(consts, @r#"(and e0.payload.id |index(e0)| e1.pair.1 "say ""hi""")"#);

        // numerals are never quoted, even though they start with a digit
        let ratio = app("/", [atom_dec("2.0"), atom_dec("0.5")]);
        insta::assert_display_snapshot!(ratio, @"(/ 2.0 0.5)");
        assert_eq!(parse("(/ 2.0 0.5)").unwrap(), ratio);
    }

    #[test]
    fn test_roundtrip_parsing() {
        let mut es = vec![];
        for s in [
            r#"  "hello there" "#,
            r#"|"hello"|"#,
            r#"|also has a space|"#,
            r#"(declare-datatypes ((Status 0)) (((OK) (ERR))))"#,
            "(:reason-unknown \"timeout\")",
        ] {
            let e = parse(s).unwrap_or_else(|_| panic!("`{s}` did not parse"));
            es.push(e.clone());
            assert_eq!(
                parse(&e.to_string()).unwrap(),
                e,
                "`{s}` does not roundtrip",
            );
        }
        insta::assert_snapshot!(&es[0], @"|hello there|");
        insta::assert_snapshot!(&es[1], @r#"|"hello"|"#);
        insta::assert_snapshot!(&es[2], @"|also has a space|");
        insta::assert_snapshot!(&es[4], @"(:reason-unknown timeout)");
    }
}
