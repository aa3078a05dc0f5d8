//! Parsing of the query grammar on the server side of the fake.

/// One entry of a `select` parameter.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Projection {
    Star,
    Column {
        key: String,
        column: String,
        cast: Option<String>,
    },
    Embed(Embed),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Embed {
    /// Output key: the alias if present, else the resource name.
    pub key: String,
    pub name: String,
    pub hint: Option<String>,
    pub inner: bool,
    pub items: Vec<Projection>,
}

/// A predicate as received on the wire.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Cond {
    Leaf {
        column: String,
        negated: bool,
        op: String,
        value: String,
    },
    Group {
        any: bool,
        negated: bool,
        children: Vec<Cond>,
    },
}

impl Cond {
    pub fn columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Cond::Leaf { column, .. } => out.push(column),
            Cond::Group { children, .. } => children.iter().for_each(|c| c.columns(out)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OrderTerm {
    pub column: String,
    pub desc: bool,
    pub nulls_first: bool,
}

pub(crate) fn parse_select(raw: &str) -> Result<Vec<Projection>, String> {
    split_top(raw)
        .into_iter()
        .map(|item| parse_projection(item.trim()))
        .collect()
}

fn parse_projection(item: &str) -> Result<Projection, String> {
    if item == "*" {
        return Ok(Projection::Star);
    }
    if let Some(open) = item.find('(') {
        let body = item[open..]
            .strip_prefix('(')
            .and_then(|b| b.strip_suffix(')'))
            .ok_or_else(|| format!("unbalanced embed '{item}'"))?;
        let head = &item[..open];
        let (alias, rest) = match head.split_once(':') {
            Some((alias, rest)) => (Some(alias), rest),
            None => (None, head),
        };
        let mut parts = rest.split('!');
        let name = parts.next().unwrap_or_default().to_string();
        let mut hint = None;
        let mut inner = false;
        for part in parts {
            match part {
                "inner" => inner = true,
                "left" => {}
                other => hint = Some(other.to_string()),
            }
        }
        return Ok(Projection::Embed(Embed {
            key: alias.map(str::to_string).unwrap_or_else(|| name.clone()),
            name,
            hint,
            inner,
            items: parse_select(body)?,
        }));
    }

    let (head, cast) = match item.split_once("::") {
        Some((head, cast)) => (head, Some(cast.to_string())),
        None => (item, None),
    };
    let (key, column) = match head.split_once(':') {
        Some((alias, column)) => (alias, column),
        None => (head, head),
    };
    if column.is_empty() {
        return Err(format!("empty column in select item '{item}'"));
    }
    Ok(Projection::Column {
        key: key.to_string(),
        column: column.to_string(),
        cast,
    })
}

/// Parses `[not.]op.value` for `column`.
pub(crate) fn parse_leaf(column: &str, raw: &str, unquote_value: bool) -> Result<Cond, String> {
    let (negated, rest) = match raw.strip_prefix("not.") {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let (op, value) = rest
        .split_once('.')
        .ok_or_else(|| format!("malformed filter '{column}={raw}'"))?;
    Ok(Cond::Leaf {
        column: column.to_string(),
        negated,
        op: op.to_string(),
        value: if unquote_value {
            unquote(value)
        } else {
            value.to_string()
        },
    })
}

/// Parses a `(a.eq.1,or(b.gt.2,c.lt.3))` group body.
pub(crate) fn parse_group(any: bool, negated: bool, body: &str) -> Result<Cond, String> {
    let inner = body
        .strip_prefix('(')
        .and_then(|b| b.strip_suffix(')'))
        .ok_or_else(|| format!("malformed logic tree '{body}'"))?;
    let children = split_top(inner)
        .into_iter()
        .map(|part| parse_element(part.trim()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Cond::Group {
        any,
        negated,
        children,
    })
}

fn parse_element(part: &str) -> Result<Cond, String> {
    for (prefix, any, negated) in [
        ("not.or(", true, true),
        ("not.and(", false, true),
        ("or(", true, false),
        ("and(", false, false),
    ] {
        if part.starts_with(prefix) {
            return parse_group(any, negated, &part[prefix.len() - 1..]);
        }
    }
    let (column, rest) = part
        .split_once('.')
        .ok_or_else(|| format!("malformed group element '{part}'"))?;
    parse_leaf(column, rest, true)
}

pub(crate) fn parse_order(raw: &str) -> Result<Vec<OrderTerm>, String> {
    raw.split(',')
        .map(|term| {
            let mut parts = term.trim().split('.');
            let column = parts.next().unwrap_or_default().to_string();
            let mut desc = false;
            let mut nulls_first = None;
            for part in parts {
                match part {
                    "asc" => desc = false,
                    "desc" => desc = true,
                    "nullsfirst" => nulls_first = Some(true),
                    "nullslast" => nulls_first = Some(false),
                    other => return Err(format!("unknown order modifier '{other}'")),
                }
            }
            if column.is_empty() {
                return Err(format!("malformed order term '{term}'"));
            }
            Ok(OrderTerm {
                column,
                desc,
                // Postgres default: nulls sort as the largest value.
                nulls_first: nulls_first.unwrap_or(desc),
            })
        })
        .collect()
}

/// Items of `(a,b)` or `{a,b}`, unquoted.
pub(crate) fn parse_list(raw: &str, open: char, close: char) -> Option<Vec<String>> {
    let inner = raw.strip_prefix(open)?.strip_suffix(close)?;
    if inner.is_empty() {
        return Some(Vec::new());
    }
    Some(
        split_top(inner)
            .into_iter()
            .map(|item| unquote(item.trim()))
            .collect(),
    )
}

/// Splits on commas outside parentheses, braces and double quotes.
fn split_top(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in raw.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            '(' | '{' if !quoted => depth += 1,
            ')' | '}' if !quoted => depth = depth.saturating_sub(1),
            ',' if !quoted && depth == 0 => {
                parts.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&raw[start..]);
    parts
}

fn unquote(raw: &str) -> String {
    let Some(inner) = raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) else {
        return raw.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
