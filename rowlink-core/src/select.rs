//! Column specifications and the `select` parameter.
//!
//! Items are placed either at the top level or inside the embedded block of
//! the declared relation their dotted path names. Expressions themselves are
//! passed through untouched; only aliases and placement are interpreted.

use std::collections::HashSet;

use crate::error::Error;
use crate::relation::{is_identifier, RelationSpec};

/// One parsed column specification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SelectItem {
    pub expression: String,
    pub alias: Option<String>,
    /// Relation keys leading to the resource this column belongs to.
    pub relation_path: Vec<String>,
}

impl SelectItem {
    pub fn column(expression: &str) -> Self {
        Self {
            expression: expression.to_string(),
            alias: None,
            relation_path: Vec::new(),
        }
    }

    /// Parses `expr`, `expr AS alias`, `alias:expr`, and dotted `rel.column` paths.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::invalid_argument("empty select item"));
        }

        let (expression, alias) = match split_as_keyword(raw) {
            Some((expr, alias)) => (expr, Some(alias)),
            None => match split_alias_colon(raw) {
                Some((alias, expr)) => (expr, Some(alias)),
                None => (raw, None),
            },
        };

        if expression.is_empty() {
            return Err(Error::invalid_argument(format!("missing expression in '{raw}'")));
        }
        if let Some(alias) = alias {
            if !is_identifier(alias) {
                return Err(Error::invalid_argument(format!("invalid alias '{alias}' in '{raw}'")));
            }
        }

        let (relation_path, expression) = split_relation_path(expression);
        Ok(Self {
            expression,
            alias: alias.map(str::to_string),
            relation_path,
        })
    }

    /// Key this item produces in each returned row.
    ///
    /// The alias when present; otherwise the column with any cast removed,
    /// or the last key of a JSON path. `None` for `*` and computed
    /// expressions, whose names the server decides.
    pub fn output_name(&self) -> Option<&str> {
        if let Some(alias) = &self.alias {
            return Some(alias.as_str());
        }
        let base = match self.expression.find("::") {
            Some(at) => &self.expression[..at],
            None => self.expression.as_str(),
        };
        let base = base.rsplit("->").next().unwrap_or(base);
        let base = base.trim_start_matches('>').trim_matches(|c: char| c == '\'' || c == '"');
        is_identifier(base).then_some(base)
    }

    /// `alias:expression` or `expression`.
    pub fn render(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{alias}:{}", self.expression),
            None => self.expression.clone(),
        }
    }
}

/// Finds the last ` AS ` keyword (any casing) outside parentheses and quotes.
fn split_as_keyword(raw: &str) -> Option<(&str, &str)> {
    let bytes = raw.as_bytes();
    let mut depth = 0i32;
    let mut in_quotes = false;
    let mut found = None;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b'(' if !in_quotes => depth += 1,
            b')' if !in_quotes => depth -= 1,
            _ if depth == 0 && !in_quotes && b.is_ascii_whitespace() => {
                let rest = &bytes[i + 1..];
                if rest.len() > 3
                    && rest[..2].eq_ignore_ascii_case(b"as")
                    && rest[2].is_ascii_whitespace()
                {
                    found = Some(i);
                }
            }
            _ => {}
        }
    }
    let at = found?;
    let expr = raw[..at].trim();
    let alias = raw[at + 1 + 2..].trim();
    if alias.is_empty() {
        return None;
    }
    Some((expr, alias))
}

/// Splits `alias:expr` on a single colon at depth zero, ignoring `::` casts.
fn split_alias_colon(raw: &str) -> Option<(&str, &str)> {
    let bytes = raw.as_bytes();
    let mut depth = 0i32;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth -= 1,
            b':' if depth == 0 => {
                if bytes.get(i + 1) == Some(&b':') {
                    i += 2;
                    continue;
                }
                return Some((raw[..i].trim(), raw[i + 1..].trim()));
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// `posts.comments.body::text` -> (`[posts, comments]`, `body::text`).
///
/// Expressions containing parentheses or JSON arrows are never split.
fn split_relation_path(expression: &str) -> (Vec<String>, String) {
    if expression.contains('(') || expression.contains("->") {
        return (Vec::new(), expression.to_string());
    }
    let (base, cast) = match expression.find("::") {
        Some(at) => expression.split_at(at),
        None => (expression, ""),
    };
    let mut segments: Vec<&str> = base.split('.').collect();
    if segments.len() < 2 || segments.iter().any(|s| s.trim().is_empty()) {
        return (Vec::new(), expression.to_string());
    }
    let column = segments.pop().unwrap_or_default();
    (
        segments.into_iter().map(str::to_string).collect(),
        format!("{column}{cast}"),
    )
}

/// Builds the `select` parameter from items and declared relations.
///
/// Returns `None` when nothing was selected, meaning "all columns".
pub(crate) fn compile_select(
    items: &[SelectItem],
    relations: &[RelationSpec],
) -> Result<Option<String>, Error> {
    if items.is_empty() && relations.is_empty() {
        return Ok(None);
    }

    let mut root = Level {
        relation: None,
        items: Vec::new(),
        children: relations.iter().map(Level::from_relation).collect(),
    };
    for item in items {
        root.place(item, &item.relation_path)?;
    }

    let mut rendered = root.render()?;
    if items.iter().all(|i| !i.relation_path.is_empty()) {
        // Only relations were requested: keep the root's own columns.
        rendered.insert(0, "*".to_string());
    }
    Ok(Some(rendered.join(",")))
}

struct Level<'a> {
    relation: Option<&'a RelationSpec>,
    items: Vec<SelectItem>,
    children: Vec<Level<'a>>,
}

impl<'a> Level<'a> {
    fn from_relation(relation: &'a RelationSpec) -> Self {
        Level {
            relation: Some(relation),
            items: relation
                .columns
                .iter()
                .map(|c| SelectItem::column(c))
                .collect(),
            children: relation.children.iter().map(Level::from_relation).collect(),
        }
    }

    fn place(&mut self, item: &SelectItem, path: &[String]) -> Result<(), Error> {
        let Some((head, rest)) = path.split_first() else {
            self.items.push(SelectItem {
                relation_path: Vec::new(),
                ..item.clone()
            });
            return Ok(());
        };
        let child = self
            .children
            .iter_mut()
            .find(|c| c.relation.is_some_and(|r| r.key() == head.as_str()))
            .ok_or_else(|| Error::UndeclaredRelation(item.relation_path.join(".")))?;
        child.place(item, rest)
    }

    fn render(&self) -> Result<Vec<String>, Error> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(self.items.len() + self.children.len());
        for item in &self.items {
            if let Some(name) = item.output_name() {
                if !seen.insert(name) {
                    return Err(Error::DuplicateAlias(name.to_string()));
                }
            }
            out.push(item.render());
        }
        for child in &self.children {
            let Some(relation) = child.relation else {
                continue;
            };
            if !seen.insert(relation.key()) {
                return Err(Error::DuplicateAlias(relation.key().to_string()));
            }
            let mut inner = child.render()?;
            if child.items.is_empty() {
                inner.insert(0, "*".to_string());
            }
            out.push(format!("{}({})", relation.head(), inner.join(",")));
        }
        Ok(out)
    }
}
