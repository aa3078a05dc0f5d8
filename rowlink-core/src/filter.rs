use crate::error::Error;
use crate::operator::{encode, Operator, TextSearch};
use crate::value::FilterValue;

/// A single `column operator value` predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub column: String,
    pub operator: Operator,
    pub value: FilterValue,
}

/// A predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    Leaf(Leaf),
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
    Not(Box<FilterNode>),
}

impl FilterNode {
    pub fn leaf(column: &str, operator: Operator, value: impl Into<FilterValue>) -> Self {
        FilterNode::Leaf(Leaf {
            column: column.to_string(),
            operator,
            value: value.into(),
        })
    }

    pub fn and(nodes: impl IntoIterator<Item = FilterNode>) -> Self {
        FilterNode::And(nodes.into_iter().collect())
    }

    pub fn or(nodes: impl IntoIterator<Item = FilterNode>) -> Self {
        FilterNode::Or(nodes.into_iter().collect())
    }

    pub fn negate(self) -> Self {
        FilterNode::Not(Box::new(self))
    }
}

// Free constructors, mostly used to build `or`/`and` groups:
// `.or([eq("status", "new"), gt("priority", 3)])`.

pub fn eq(column: &str, value: impl Into<FilterValue>) -> FilterNode {
    FilterNode::leaf(column, Operator::Eq, value)
}

pub fn neq(column: &str, value: impl Into<FilterValue>) -> FilterNode {
    FilterNode::leaf(column, Operator::Neq, value)
}

pub fn gt(column: &str, value: impl Into<FilterValue>) -> FilterNode {
    FilterNode::leaf(column, Operator::Gt, value)
}

pub fn gte(column: &str, value: impl Into<FilterValue>) -> FilterNode {
    FilterNode::leaf(column, Operator::Gte, value)
}

pub fn lt(column: &str, value: impl Into<FilterValue>) -> FilterNode {
    FilterNode::leaf(column, Operator::Lt, value)
}

pub fn lte(column: &str, value: impl Into<FilterValue>) -> FilterNode {
    FilterNode::leaf(column, Operator::Lte, value)
}

pub fn like(column: &str, pattern: &str) -> FilterNode {
    FilterNode::leaf(column, Operator::Like, pattern)
}

pub fn ilike(column: &str, pattern: &str) -> FilterNode {
    FilterNode::leaf(column, Operator::Ilike, pattern)
}

pub fn in_(column: &str, values: impl Into<FilterValue>) -> FilterNode {
    FilterNode::leaf(column, Operator::In, values)
}

pub fn is_null(column: &str) -> FilterNode {
    FilterNode::leaf(column, Operator::Is, FilterValue::Scalar(crate::Scalar::Null))
}

pub fn not_null(column: &str) -> FilterNode {
    is_null(column).negate()
}

pub fn contains(column: &str, values: impl Into<FilterValue>) -> FilterNode {
    FilterNode::leaf(column, Operator::Contains, values)
}

pub fn contained_by(column: &str, values: impl Into<FilterValue>) -> FilterNode {
    FilterNode::leaf(column, Operator::ContainedBy, values)
}

pub fn overlaps(column: &str, values: impl Into<FilterValue>) -> FilterNode {
    FilterNode::leaf(column, Operator::Overlaps, values)
}

pub fn text_search(column: &str, query: &str, kind: TextSearch, config: Option<&str>) -> FilterNode {
    FilterNode::leaf(
        column,
        Operator::TextSearch {
            kind,
            config: config.map(str::to_string),
        },
        query,
    )
}

/// Renders a node as one or more top-level query parameters.
///
/// `prefix` is the dotted relation path (`"posts."`, `"posts.comments."`)
/// for filters hoisted out of an embedded resource, or `""` at the root.
pub(crate) fn render_param(
    node: &FilterNode,
    prefix: &str,
    params: &mut Vec<(String, String)>,
) -> Result<(), Error> {
    match node {
        FilterNode::Leaf(leaf) => {
            let token = encode(&leaf.operator, &leaf.value)?;
            params.push((format!("{prefix}{}", leaf.column), token.to_string()));
        }
        FilterNode::And(children) => {
            params.push((format!("{prefix}and"), render_group_body(children, "and")?));
        }
        FilterNode::Or(children) => {
            params.push((format!("{prefix}or"), render_group_body(children, "or")?));
        }
        FilterNode::Not(inner) => match inner.as_ref() {
            FilterNode::Not(twice) => render_param(twice, prefix, params)?,
            FilterNode::Leaf(leaf) => {
                let token = encode(&leaf.operator, &leaf.value)?.negated();
                params.push((format!("{prefix}{}", leaf.column), token.to_string()));
            }
            FilterNode::And(children) => {
                params.push((format!("{prefix}not.and"), render_group_body(children, "and")?));
            }
            FilterNode::Or(children) => {
                params.push((format!("{prefix}not.or"), render_group_body(children, "or")?));
            }
        },
    }
    Ok(())
}

fn render_group_body(children: &[FilterNode], name: &str) -> Result<String, Error> {
    if children.is_empty() {
        return Err(Error::invalid_argument(format!("empty '{name}' group")));
    }
    let parts = children
        .iter()
        .map(render_grouped)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("({})", parts.join(",")))
}

/// Renders a node in the nested `column.op.value` / `and(...)` form used inside groups.
fn render_grouped(node: &FilterNode) -> Result<String, Error> {
    match node {
        FilterNode::Leaf(leaf) => {
            let token = encode(&leaf.operator, &leaf.value)?;
            Ok(format!("{}.{}", leaf.column, token.grouped()))
        }
        FilterNode::And(children) => Ok(format!("and{}", render_group_body(children, "and")?)),
        FilterNode::Or(children) => Ok(format!("or{}", render_group_body(children, "or")?)),
        FilterNode::Not(inner) => match inner.as_ref() {
            FilterNode::Not(twice) => render_grouped(twice),
            FilterNode::Leaf(leaf) => {
                let token = encode(&leaf.operator, &leaf.value)?.negated();
                Ok(format!("{}.{}", leaf.column, token.grouped()))
            }
            FilterNode::And(children) => {
                Ok(format!("not.and{}", render_group_body(children, "and")?))
            }
            FilterNode::Or(children) => Ok(format!("not.or{}", render_group_body(children, "or")?)),
        },
    }
}

/// Filter methods shared by read builders, write builders and relations.
///
/// Implementors only provide [`push_filter`](Filterable::push_filter) and
/// [`reject`](Filterable::reject); every predicate is validated when the
/// owner is compiled.
pub trait Filterable: Sized {
    fn push_filter(self, node: FilterNode) -> Self;

    /// Records an input error to be reported at compile time.
    fn reject(self, error: Error) -> Self;

    fn eq(self, column: &str, value: impl Into<FilterValue>) -> Self {
        self.push_filter(eq(column, value))
    }

    fn neq(self, column: &str, value: impl Into<FilterValue>) -> Self {
        self.push_filter(neq(column, value))
    }

    fn gt(self, column: &str, value: impl Into<FilterValue>) -> Self {
        self.push_filter(gt(column, value))
    }

    fn gte(self, column: &str, value: impl Into<FilterValue>) -> Self {
        self.push_filter(gte(column, value))
    }

    fn lt(self, column: &str, value: impl Into<FilterValue>) -> Self {
        self.push_filter(lt(column, value))
    }

    fn lte(self, column: &str, value: impl Into<FilterValue>) -> Self {
        self.push_filter(lte(column, value))
    }

    fn like(self, column: &str, pattern: &str) -> Self {
        self.push_filter(like(column, pattern))
    }

    fn ilike(self, column: &str, pattern: &str) -> Self {
        self.push_filter(ilike(column, pattern))
    }

    fn in_(self, column: &str, values: impl Into<FilterValue>) -> Self {
        self.push_filter(in_(column, values))
    }

    fn is_null(self, column: &str) -> Self {
        self.push_filter(is_null(column))
    }

    fn not_null(self, column: &str) -> Self {
        self.push_filter(not_null(column))
    }

    /// `is.true` / `is.false`.
    fn is(self, column: &str, value: bool) -> Self {
        self.push_filter(FilterNode::leaf(column, Operator::Is, value))
    }

    fn contains(self, column: &str, values: impl Into<FilterValue>) -> Self {
        self.push_filter(contains(column, values))
    }

    fn contained_by(self, column: &str, values: impl Into<FilterValue>) -> Self {
        self.push_filter(contained_by(column, values))
    }

    fn overlaps(self, column: &str, values: impl Into<FilterValue>) -> Self {
        self.push_filter(overlaps(column, values))
    }

    fn text_search(self, column: &str, query: &str, kind: TextSearch, config: Option<&str>) -> Self {
        self.push_filter(text_search(column, query, kind, config))
    }

    /// Negated predicate: `column=not.<op>.<value>`.
    fn not(self, column: &str, operator: Operator, value: impl Into<FilterValue>) -> Self {
        self.push_filter(FilterNode::leaf(column, operator, value).negate())
    }

    fn or(self, nodes: impl IntoIterator<Item = FilterNode>) -> Self {
        self.push_filter(FilterNode::or(nodes))
    }

    fn and(self, nodes: impl IntoIterator<Item = FilterNode>) -> Self {
        self.push_filter(FilterNode::and(nodes))
    }

    /// Filter with an operator given by name, e.g. `filter("age", "not.gte", 18)`.
    fn filter(self, column: &str, operator: &str, value: impl Into<FilterValue>) -> Self {
        match Operator::parse(operator) {
            Ok((op, false)) => self.push_filter(FilterNode::leaf(column, op, value)),
            Ok((op, true)) => self.push_filter(FilterNode::leaf(column, op, value).negate()),
            Err(err) => self.reject(err),
        }
    }

    /// One equality filter per pair, in iteration order.
    fn match_all<K, V, I>(self, pairs: I) -> Self
    where
        K: AsRef<str>,
        V: Into<FilterValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        pairs
            .into_iter()
            .fold(self, |acc, (k, v)| acc.push_filter(eq(k.as_ref(), v)))
    }
}
