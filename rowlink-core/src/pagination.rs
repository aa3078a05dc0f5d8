use serde::Serialize;

use crate::error::Error;
use crate::filter::{self, FilterNode};
use crate::order::{Direction, OrderSpec};
use crate::value::Scalar;

/// The active pagination strategy of a query. At most one is set.
#[derive(Debug, Clone, PartialEq)]
pub enum PaginationSpec {
    /// 1-based page number and page size.
    PageSize { page: u64, size: u64 },
    OffsetLimit { offset: u64, limit: Option<u64> },
    /// Zero-based, inclusive on both ends.
    Range { start: u64, end: u64 },
    /// Keyset pagination: rows strictly after `value` in `direction`.
    Cursor {
        column: String,
        value: Scalar,
        direction: Direction,
        limit: Option<u64>,
        tiebreaker: Option<(String, Scalar)>,
    },
}

impl PaginationSpec {
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            PaginationSpec::PageSize { page, .. } if *page < 1 => Err(Error::invalid_argument(
                format!("page numbers start at 1, got {page}"),
            )),
            PaginationSpec::Range { start, end } if end < start => Err(Error::invalid_argument(
                format!("range end {end} is before start {start}"),
            )),
            PaginationSpec::Cursor { value, .. } if value.is_null() => Err(
                Error::invalid_argument("cursor value cannot be null"),
            ),
            _ => Ok(()),
        }
    }

    /// Page/size is sugar for offset/limit; everything else is returned as is.
    pub fn normalized(&self) -> PaginationSpec {
        match self {
            PaginationSpec::PageSize { page, size } => PaginationSpec::OffsetLimit {
                offset: page.saturating_sub(1).saturating_mul(*size),
                limit: Some(*size),
            },
            other => other.clone(),
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            PaginationSpec::PageSize { .. } => "page",
            PaginationSpec::OffsetLimit { .. } => "offset/limit",
            PaginationSpec::Range { .. } => "range",
            PaginationSpec::Cursor { .. } => "cursor",
        }
    }
}

/// Wire form of a pagination strategy.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct RenderedPagination {
    pub filter: Option<FilterNode>,
    pub extra_order: Vec<OrderSpec>,
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

/// Renders pagination, checking the cursor against the requested order.
pub(crate) fn render_pagination(
    spec: &PaginationSpec,
    order: &[OrderSpec],
) -> Result<RenderedPagination, Error> {
    spec.validate()?;
    let mut out = RenderedPagination::default();
    match spec.normalized() {
        PaginationSpec::OffsetLimit { offset, limit } => {
            if let Some(limit) = limit {
                out.params.push(("limit".into(), limit.to_string()));
            }
            if offset > 0 {
                out.params.push(("offset".into(), offset.to_string()));
            }
        }
        PaginationSpec::Range { start, end } => {
            out.headers.push(("Range-Unit".into(), "items".into()));
            out.headers.push(("Range".into(), format!("{start}-{end}")));
        }
        PaginationSpec::Cursor {
            column,
            value,
            direction,
            limit,
            tiebreaker,
        } => {
            let ordered = order.iter().find(|o| o.column == column).ok_or_else(|| {
                Error::invalid_argument(format!(
                    "cursor pagination on '{column}' requires an order on that column"
                ))
            })?;
            if ordered.direction != direction {
                return Err(Error::invalid_argument(format!(
                    "cursor direction on '{column}' disagrees with its order direction"
                )));
            }
            let after = |col: &str, v: Scalar, dir: Direction| match dir {
                Direction::Asc => filter::gt(col, v),
                Direction::Desc => filter::lt(col, v),
            };
            out.filter = Some(match tiebreaker {
                None => after(&column, value, direction),
                Some((tie_column, tie_value)) => {
                    // The tie comparison follows the tiebreaker's own order.
                    let tie_direction = match order.iter().find(|o| o.column == tie_column) {
                        Some(tie_order) => tie_order.direction,
                        None => {
                            out.extra_order.push(OrderSpec::new(&tie_column, direction));
                            direction
                        }
                    };
                    FilterNode::or([
                        after(&column, value.clone(), direction),
                        FilterNode::and([
                            filter::eq(&column, value),
                            after(&tie_column, tie_value, tie_direction),
                        ]),
                    ])
                }
            });
            if let Some(limit) = limit {
                out.params.push(("limit".into(), limit.to_string()));
            }
        }
        PaginationSpec::PageSize { .. } => {
            return Err(Error::InvalidState("page pagination was not normalized".to_string()));
        }
    }
    Ok(out)
}

/// A page of rows with pagination metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: u64,
    pub size: u64,
    pub total_elements: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, page: u64, size: u64, total_elements: u64) -> Self {
        let total_pages = if size == 0 {
            0
        } else {
            total_elements.div_ceil(size)
        };
        Self {
            content,
            page,
            size,
            total_elements,
            total_pages,
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}
