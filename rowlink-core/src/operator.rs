//! Mapping of filter predicates to their wire tokens.
//!
//! `encode` is the single place where operator/value compatibility is
//! checked; an incompatible pairing is rejected rather than dropped.

use std::fmt;

use crate::error::Error;
use crate::value::{render_list, FilterValue, Scalar};

/// Characters that must be quoted inside a parenthesized `in` list.
const IN_RESERVED: &[char] = &[',', '(', ')'];
/// Characters that must be quoted inside a braced array literal.
const ARRAY_RESERVED: &[char] = &[',', '{', '}', ' '];
/// Characters that must be quoted when a scalar appears inside a logic group.
const GROUP_RESERVED: &[char] = &[',', '(', ')'];

/// Full-text search flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextSearch {
    /// `to_tsquery`
    Fts,
    /// `plainto_tsquery`
    Plain,
    /// `phraseto_tsquery`
    Phrase,
    /// `websearch_to_tsquery`
    Websearch,
}

impl TextSearch {
    pub fn wire_name(self) -> &'static str {
        match self {
            TextSearch::Fts => "fts",
            TextSearch::Plain => "plfts",
            TextSearch::Phrase => "phfts",
            TextSearch::Websearch => "wfts",
        }
    }
}

/// The fixed operator set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Equality (`eq`).
    Eq,
    /// Inequality (`neq`).
    Neq,
    /// Greater than (`gt`).
    Gt,
    /// Greater than or equal (`gte`).
    Gte,
    /// Less than (`lt`).
    Lt,
    /// Less than or equal (`lte`).
    Lte,
    /// Case-sensitive pattern match with `%` and `_` wildcards (`like`).
    Like,
    /// Case-insensitive pattern match (`ilike`).
    Ilike,
    /// Membership in a non-empty list (`in`).
    In,
    /// Null or boolean test (`is`).
    Is,
    /// Array or range contains the operand (`cs`).
    Contains,
    /// Array or range is contained by the operand (`cd`).
    ContainedBy,
    /// Arrays or ranges share an element (`ov`).
    Overlaps,
    /// Full-text search, optionally with a language config (`fts(english)`).
    TextSearch {
        kind: TextSearch,
        config: Option<String>,
    },
}

impl Operator {
    pub fn text_search(kind: TextSearch) -> Self {
        Operator::TextSearch { kind, config: None }
    }

    pub fn wire_name(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Like => "like",
            Operator::Ilike => "ilike",
            Operator::In => "in",
            Operator::Is => "is",
            Operator::Contains => "cs",
            Operator::ContainedBy => "cd",
            Operator::Overlaps => "ov",
            Operator::TextSearch { kind, .. } => kind.wire_name(),
        }
    }

    /// Parses an operator name such as `"gte"`, `"not.in"` or `"fts(english)"`.
    ///
    /// Returns the operator and whether it was prefixed with `not.`.
    pub fn parse(raw: &str) -> Result<(Operator, bool), Error> {
        let raw = raw.trim();
        let (negated, name) = match raw.strip_prefix("not.") {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let (base, config) = match name.split_once('(') {
            Some((base, rest)) => {
                let config = rest.strip_suffix(')').ok_or_else(|| {
                    Error::invalid_argument(format!("unterminated operator config in '{raw}'"))
                })?;
                (base, Some(config.to_string()))
            }
            None => (name, None),
        };
        let op = match base {
            "eq" => Operator::Eq,
            "neq" => Operator::Neq,
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            "like" => Operator::Like,
            "ilike" => Operator::Ilike,
            "in" => Operator::In,
            "is" => Operator::Is,
            "cs" => Operator::Contains,
            "cd" => Operator::ContainedBy,
            "ov" => Operator::Overlaps,
            "fts" => Operator::TextSearch { kind: TextSearch::Fts, config: None },
            "plfts" => Operator::TextSearch { kind: TextSearch::Plain, config: None },
            "phfts" => Operator::TextSearch { kind: TextSearch::Phrase, config: None },
            "wfts" => Operator::TextSearch { kind: TextSearch::Websearch, config: None },
            other => {
                return Err(Error::invalid_argument(format!("unknown operator '{other}'")));
            }
        };
        let op = match (op, config) {
            (Operator::TextSearch { kind, .. }, config) => Operator::TextSearch { kind, config },
            (_, Some(_)) => {
                return Err(Error::invalid_argument(format!(
                    "operator '{base}' does not take a configuration"
                )));
            }
            (op, None) => op,
        };
        Ok((op, negated))
    }
}

/// An encoded `operator.value` pair, optionally negated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireToken {
    negated: bool,
    operator: String,
    value: String,
    /// Set when `value` is a single free-text scalar that may need quoting in a group.
    quotable: bool,
}

impl WireToken {
    pub fn negated(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Form used inside `or=(...)`/`and=(...)` groups, where bare commas
    /// and parentheses in free text must be quoted.
    pub fn grouped(&self) -> String {
        let value = if self.quotable {
            Scalar::Text(self.value.clone()).render_quoted(GROUP_RESERVED)
        } else {
            self.value.clone()
        };
        self.compose(&value)
    }

    fn compose(&self, value: &str) -> String {
        if self.negated {
            format!("not.{}.{}", self.operator, value)
        } else {
            format!("{}.{}", self.operator, value)
        }
    }
}

impl fmt::Display for WireToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.compose(&self.value))
    }
}

/// Encodes an operator/value pair, validating the value shape.
pub fn encode(operator: &Operator, value: &FilterValue) -> Result<WireToken, Error> {
    let name = operator.wire_name();
    let (rendered, quotable) = match operator {
        Operator::Eq | Operator::Neq => {
            let scalar = expect_scalar(name, value)?;
            if scalar.is_null() {
                return Err(Error::invalid_argument(format!(
                    "'{name}' cannot compare against null; use an `is` filter"
                )));
            }
            (scalar.render(), matches!(scalar, Scalar::Text(_)))
        }
        Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
            let scalar = expect_scalar(name, value)?;
            match scalar {
                Scalar::Null | Scalar::Bool(_) => {
                    return Err(Error::invalid_argument(format!(
                        "'{name}' requires an ordered value, got {}",
                        scalar.render()
                    )));
                }
                Scalar::Text(s) => (s.clone(), true),
                other => (other.render(), false),
            }
        }
        Operator::Like | Operator::Ilike => match expect_scalar(name, value)? {
            Scalar::Text(pattern) => (pattern.clone(), true),
            other => {
                return Err(Error::invalid_argument(format!(
                    "'{name}' requires a string pattern, got {}",
                    other.render()
                )));
            }
        },
        Operator::In => {
            let items = expect_list(name, value)?;
            if items.is_empty() {
                return Err(Error::invalid_argument("'in' requires a non-empty list"));
            }
            (render_list(items, '(', ')', IN_RESERVED), false)
        }
        Operator::Is => match expect_scalar(name, value)? {
            Scalar::Null => ("null".to_string(), false),
            Scalar::Bool(b) => (b.to_string(), false),
            other => {
                return Err(Error::invalid_argument(format!(
                    "'is' accepts null or a boolean, got {}",
                    other.render()
                )));
            }
        },
        Operator::Contains | Operator::ContainedBy | Operator::Overlaps => {
            let items = expect_list(name, value)?;
            (render_list(items, '{', '}', ARRAY_RESERVED), false)
        }
        Operator::TextSearch { .. } => match expect_scalar(name, value)? {
            Scalar::Text(query) if !query.trim().is_empty() => (query.clone(), true),
            other => {
                return Err(Error::invalid_argument(format!(
                    "'{name}' requires a non-empty search string, got {}",
                    other.render()
                )));
            }
        },
    };

    let operator = match operator {
        Operator::TextSearch {
            config: Some(config),
            ..
        } => format!("{name}({config})"),
        _ => name.to_string(),
    };

    Ok(WireToken {
        negated: false,
        operator,
        value: rendered,
        quotable,
    })
}

fn expect_scalar<'a>(name: &str, value: &'a FilterValue) -> Result<&'a Scalar, Error> {
    match value {
        FilterValue::Scalar(s) => Ok(s),
        FilterValue::List(_) => Err(Error::invalid_argument(format!(
            "'{name}' takes a single value, not a list"
        ))),
    }
}

fn expect_list<'a>(name: &str, value: &'a FilterValue) -> Result<&'a [Scalar], Error> {
    match value {
        FilterValue::List(items) => Ok(items),
        FilterValue::Scalar(_) => Err(Error::invalid_argument(format!(
            "'{name}' takes a list of values"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn in_rejects_empty_list() {
        let err = encode(&Operator::In, &FilterValue::List(vec![])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn in_keeps_input_order() {
        let token = encode(&Operator::In, &vec![1, 2, 3].into()).unwrap();
        assert_eq!(token.to_string(), "in.(1,2,3)");
        let token = encode(&Operator::In, &vec![3, 1, 2].into()).unwrap();
        assert_eq!(token.value(), "(3,1,2)");
    }

    #[test]
    fn in_quotes_reserved_strings() {
        let token = encode(&Operator::In, &vec!["a,b", "c"].into()).unwrap();
        assert_eq!(token.to_string(), "in.(\"a,b\",c)");
    }

    #[test]
    fn scalar_operators_reject_lists() {
        for op in [Operator::Eq, Operator::Gt, Operator::Like, Operator::Is] {
            let err = encode(&op, &vec![1].into()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{op:?}");
        }
    }

    #[test]
    fn eq_with_null_is_rejected() {
        let err = encode(&Operator::Eq, &None::<i32>.into()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn ordered_comparisons() {
        assert_eq!(encode(&Operator::Gte, &18.into()).unwrap().to_string(), "gte.18");
        assert_eq!(
            encode(&Operator::Lt, &"2024-01-01".into()).unwrap().to_string(),
            "lt.2024-01-01"
        );
        assert!(encode(&Operator::Lt, &true.into()).is_err());
    }

    #[test]
    fn like_needs_string() {
        assert_eq!(
            encode(&Operator::Ilike, &"%ann%".into()).unwrap().to_string(),
            "ilike.%ann%"
        );
        assert!(encode(&Operator::Like, &5.into()).is_err());
    }

    #[test]
    fn null_tests() {
        assert_eq!(encode(&Operator::Is, &None::<bool>.into()).unwrap().to_string(), "is.null");
        assert_eq!(
            encode(&Operator::Is, &None::<bool>.into()).unwrap().negated().to_string(),
            "not.is.null"
        );
        assert_eq!(encode(&Operator::Is, &true.into()).unwrap().to_string(), "is.true");
        assert!(encode(&Operator::Is, &"x".into()).is_err());
    }

    #[test]
    fn array_operators_use_braces() {
        assert_eq!(
            encode(&Operator::Contains, &vec!["a", "b"].into()).unwrap().to_string(),
            "cs.{a,b}"
        );
        assert_eq!(
            encode(&Operator::Overlaps, &vec!["x y"].into()).unwrap().to_string(),
            "ov.{\"x y\"}"
        );
        assert_eq!(
            encode(&Operator::ContainedBy, &FilterValue::List(vec![])).unwrap().to_string(),
            "cd.{}"
        );
        assert!(encode(&Operator::Contains, &"a".into()).is_err());
    }

    #[test]
    fn text_search_with_config() {
        let op = Operator::TextSearch {
            kind: TextSearch::Websearch,
            config: Some("english".into()),
        };
        assert_eq!(
            encode(&op, &"fat cat".into()).unwrap().to_string(),
            "wfts(english).fat cat"
        );
        assert_eq!(
            encode(&Operator::text_search(TextSearch::Phrase), &"a b".into())
                .unwrap()
                .to_string(),
            "phfts.a b"
        );
        assert!(encode(&Operator::text_search(TextSearch::Fts), &"  ".into()).is_err());
    }

    #[test]
    fn grouped_form_quotes_commas() {
        let token = encode(&Operator::Eq, &"Smith, Ann".into()).unwrap();
        assert_eq!(token.to_string(), "eq.Smith, Ann");
        assert_eq!(token.grouped(), "eq.\"Smith, Ann\"");
    }

    #[test]
    fn parse_operator_names() {
        assert_eq!(Operator::parse("gte").unwrap(), (Operator::Gte, false));
        assert_eq!(Operator::parse("not.in").unwrap(), (Operator::In, true));
        assert_eq!(
            Operator::parse("fts(french)").unwrap(),
            (
                Operator::TextSearch {
                    kind: TextSearch::Fts,
                    config: Some("french".into())
                },
                false
            )
        );
        assert!(Operator::parse("between").is_err());
        assert!(Operator::parse("eq(english)").is_err());
    }
}
