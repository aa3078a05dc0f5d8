//! Declared relations and their expansion into embedded-resource syntax.
//!
//! A relation's filters, order and limits are not rendered inside the
//! `select` parameter. They are hoisted to ordinary parameters keyed by the
//! fully-qualified dotted path (`posts.comments.created_at=gt.…`).

use crate::error::Error;
use crate::filter::{render_param, FilterNode, Filterable};
use crate::order::{render_order, Direction, OrderSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JoinHint {
    Inner,
    #[default]
    Left,
}

/// An embedded resource declaration.
#[derive(Debug, Clone)]
pub struct RelationSpec {
    pub name: String,
    pub alias: Option<String>,
    pub join: JoinHint,
    /// Foreign key or column used to disambiguate the relationship.
    pub fk_hint: Option<String>,
    pub columns: Vec<String>,
    pub filters: Vec<FilterNode>,
    pub order: Vec<OrderSpec>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub children: Vec<RelationSpec>,
    deferred: Option<Error>,
}

impl RelationSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            alias: None,
            join: JoinHint::Left,
            fk_hint: None,
            columns: Vec::new(),
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            children: Vec::new(),
            deferred: None,
        }
    }

    /// Parses `[alias:]name[!fk_hint][!inner|!left]`.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let raw = raw.trim();
        let (alias, rest) = match raw.split_once(':') {
            Some((alias, rest)) => (Some(alias.trim()), rest.trim()),
            None => (None, raw),
        };
        let mut parts = rest.split('!');
        let name = parts.next().unwrap_or_default().trim();
        if !is_identifier(name) {
            return Err(Error::invalid_argument(format!("invalid relation name '{raw}'")));
        }
        let mut spec = RelationSpec::new(name);
        if let Some(alias) = alias {
            if !is_identifier(alias) {
                return Err(Error::invalid_argument(format!("invalid relation alias '{raw}'")));
            }
            spec.alias = Some(alias.to_string());
        }
        for hint in parts {
            let hint = hint.trim();
            if hint.eq_ignore_ascii_case("inner") {
                spec.join = JoinHint::Inner;
            } else if hint.eq_ignore_ascii_case("left") {
                spec.join = JoinHint::Left;
            } else if is_identifier(hint) && spec.fk_hint.is_none() {
                spec.fk_hint = Some(hint.to_string());
            } else {
                return Err(Error::invalid_argument(format!(
                    "unexpected relation hint '{hint}' in '{raw}'"
                )));
            }
        }
        Ok(spec)
    }

    pub fn inner(mut self) -> Self {
        self.join = JoinHint::Inner;
        self
    }

    pub fn left(mut self) -> Self {
        self.join = JoinHint::Left;
        self
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    pub fn via(mut self, fk_hint: &str) -> Self {
        self.fk_hint = Some(fk_hint.to_string());
        self
    }

    /// Columns selected from the embedded resource.
    pub fn select<S: AsRef<str>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns
            .extend(columns.into_iter().map(|c| c.as_ref().to_string()));
        self
    }

    pub fn order(mut self, column: &str, direction: Direction) -> Self {
        self.order.push(OrderSpec::new(column, direction));
        self
    }

    pub fn order_by(mut self, spec: OrderSpec) -> Self {
        self.order.push(spec);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with(mut self, child: RelationSpec) -> Self {
        self.children.push(child);
        self
    }

    /// The name this relation's rows appear under in the result.
    pub fn key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// `[alias:]name[!fk][!inner]`, without the column block.
    pub(crate) fn head(&self) -> String {
        let mut out = String::new();
        if let Some(alias) = &self.alias {
            out.push_str(alias);
            out.push(':');
        }
        out.push_str(&self.name);
        if let Some(hint) = &self.fk_hint {
            out.push('!');
            out.push_str(hint);
        }
        if self.join == JoinHint::Inner {
            out.push_str("!inner");
        }
        out
    }

    pub(crate) fn check(&self) -> Result<(), Error> {
        if let Some(err) = &self.deferred {
            return Err(err.clone());
        }
        self.children.iter().try_for_each(RelationSpec::check)
    }
}

impl Filterable for RelationSpec {
    fn push_filter(mut self, node: FilterNode) -> Self {
        self.filters.push(node);
        self
    }

    fn reject(mut self, error: Error) -> Self {
        self.deferred.get_or_insert(error);
        self
    }
}

/// Hoists nested filters, order and limits of every relation (depth-first)
/// into top-level parameters.
pub(crate) fn hoist(relations: &[RelationSpec], params: &mut Vec<(String, String)>) -> Result<(), Error> {
    for relation in relations {
        hoist_one(relation, "", params)?;
    }
    Ok(())
}

fn hoist_one(relation: &RelationSpec, parent: &str, params: &mut Vec<(String, String)>) -> Result<(), Error> {
    let path = format!("{parent}{}.", relation.key());
    for node in &relation.filters {
        render_param(node, &path, params)?;
    }
    if let Some(order) = render_order(&relation.order) {
        params.push((format!("{path}order"), order));
    }
    if let Some(limit) = relation.limit {
        params.push((format!("{path}limit"), limit.to_string()));
    }
    if let Some(offset) = relation.offset {
        params.push((format!("{path}offset"), offset.to_string()));
    }
    for child in &relation.children {
        hoist_one(child, &path, params)?;
    }
    Ok(())
}

/// Names of every embedded resource, depth-first.
pub(crate) fn resource_names(relations: &[RelationSpec], out: &mut Vec<String>) {
    for relation in relations {
        if !out.contains(&relation.name) {
            out.push(relation.name.clone());
        }
        resource_names(&relation.children, out);
    }
}

pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}
