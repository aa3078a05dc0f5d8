//! Predicate evaluation and ordering over JSON rows.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::wire::{parse_list, Cond, OrderTerm};

pub(crate) type Row = Map<String, Value>;

pub(crate) fn matches(row: &Row, cond: &Cond) -> Result<bool, String> {
    match cond {
        Cond::Leaf {
            column,
            negated,
            op,
            value,
        } => {
            let cell = row.get(column).unwrap_or(&Value::Null);
            Ok(leaf(cell, op, value)? != *negated)
        }
        Cond::Group {
            any,
            negated,
            children,
        } => {
            let mut result = !*any;
            for child in children {
                let hit = matches(row, child)?;
                if *any && hit {
                    result = true;
                    break;
                }
                if !*any && !hit {
                    result = false;
                    break;
                }
            }
            Ok(result != *negated)
        }
    }
}

pub(crate) fn matches_all(row: &Row, conds: &[Cond]) -> Result<bool, String> {
    for cond in conds {
        if !matches(row, cond)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn leaf(cell: &Value, op: &str, value: &str) -> Result<bool, String> {
    let op_name = op.split('(').next().unwrap_or(op);
    Ok(match op_name {
        "eq" => compare(cell, value) == Some(Ordering::Equal),
        "neq" => matches!(compare(cell, value), Some(o) if o != Ordering::Equal),
        "gt" => compare(cell, value) == Some(Ordering::Greater),
        "gte" => matches!(compare(cell, value), Some(Ordering::Greater | Ordering::Equal)),
        "lt" => compare(cell, value) == Some(Ordering::Less),
        "lte" => matches!(compare(cell, value), Some(Ordering::Less | Ordering::Equal)),
        "like" => cell.as_str().is_some_and(|s| like(s, value, false)),
        "ilike" => cell.as_str().is_some_and(|s| like(s, value, true)),
        "in" => {
            let items = parse_list(value, '(', ')').ok_or_else(|| format!("malformed list '{value}'"))?;
            items
                .iter()
                .any(|item| compare(cell, item) == Some(Ordering::Equal))
        }
        "is" => match value {
            "null" => cell.is_null(),
            "true" => cell == &Value::Bool(true),
            "false" => cell == &Value::Bool(false),
            other => return Err(format!("invalid 'is' value '{other}'")),
        },
        "cs" | "cd" | "ov" => {
            let wanted = parse_list(value, '{', '}').ok_or_else(|| format!("malformed array '{value}'"))?;
            let have: Vec<String> = match cell {
                Value::Array(items) => items.iter().map(text_of).collect(),
                _ => return Ok(false),
            };
            match op_name {
                "cs" => wanted.iter().all(|w| have.contains(w)),
                "cd" => have.iter().all(|h| wanted.contains(h)),
                _ => wanted.iter().any(|w| have.contains(w)),
            }
        }
        "fts" | "plfts" | "phfts" | "wfts" => {
            let Some(text) = cell.as_str() else {
                return Ok(false);
            };
            let text = text.to_lowercase();
            value
                .split(|c: char| c.is_whitespace() || c == '&' || c == '|')
                .map(|w| w.trim_matches(|c: char| c == '\'' || c == '"').to_lowercase())
                .filter(|w| !w.is_empty())
                .all(|w| text.contains(&w))
        }
        other => return Err(format!("unknown operator '{other}'")),
    })
}

/// Compares a stored value with its wire text. `None` when incomparable,
/// which includes any comparison against null.
fn compare(cell: &Value, text: &str) -> Option<Ordering> {
    match cell {
        Value::Null => None,
        Value::Number(n) => n.as_f64()?.partial_cmp(&text.parse::<f64>().ok()?),
        Value::Bool(b) => Some(b.cmp(&text.parse::<bool>().ok()?)),
        Value::String(s) => Some(s.as_str().cmp(text)),
        other => Some(other.to_string().as_str().cmp(text)),
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// SQL `LIKE` with `%`/`*` for any run and `_` for one character.
fn like(text: &str, pattern: &str, case_insensitive: bool) -> bool {
    let (text, pattern) = if case_insensitive {
        (text.to_lowercase(), pattern.to_lowercase())
    } else {
        (text.to_string(), pattern.to_string())
    };
    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    // dp[j]: pattern[..i] matches text[..j]
    let mut dp = vec![false; t.len() + 1];
    dp[0] = true;
    for &pc in &p {
        let mut next = vec![false; t.len() + 1];
        match pc {
            '%' | '*' => {
                let mut seen = false;
                for j in 0..=t.len() {
                    seen |= dp[j];
                    next[j] = seen;
                }
            }
            _ => {
                for j in 1..=t.len() {
                    next[j] = dp[j - 1] && (pc == '_' || pc == t[j - 1]);
                }
            }
        }
        dp = next;
    }
    dp[t.len()]
}

/// Orders rows by the given terms; stable.
pub(crate) fn sort_rows(rows: &mut [&Row], terms: &[OrderTerm]) {
    if terms.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for term in terms {
            let ord = compare_cells(
                a.get(&term.column).unwrap_or(&Value::Null),
                b.get(&term.column).unwrap_or(&Value::Null),
                term,
            );
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn compare_cells(a: &Value, b: &Value, term: &OrderTerm) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => {
            return if term.nulls_first {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (false, true) => {
            return if term.nulls_first {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        _ => {}
    }
    let ord = match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (x, y) => x.to_string().cmp(&y.to_string()),
    };
    if term.desc {
        ord.reverse()
    } else {
        ord
    }
}
