/// Sort direction of one order key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    /// Ascending (`asc`, default).
    #[default]
    Asc,
    /// Descending (`desc`).
    Desc,
}

impl Direction {
    pub fn wire_name(self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }
}

/// Placement of nulls within an order key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nulls {
    /// Nulls before all values (`nullsfirst`).
    First,
    /// Nulls after all values (`nullslast`).
    Last,
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderSpec {
    pub column: String,
    pub direction: Direction,
    pub nulls: Option<Nulls>,
}

impl OrderSpec {
    pub fn new(column: &str, direction: Direction) -> Self {
        Self {
            column: column.to_string(),
            direction,
            nulls: None,
        }
    }

    pub fn asc(column: &str) -> Self {
        Self::new(column, Direction::Asc)
    }

    pub fn desc(column: &str) -> Self {
        Self::new(column, Direction::Desc)
    }

    pub fn nulls_first(mut self) -> Self {
        self.nulls = Some(Nulls::First);
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls = Some(Nulls::Last);
        self
    }

    /// `column.dir[.nullsfirst|.nullslast]`
    pub fn render(&self) -> String {
        let mut out = format!("{}.{}", self.column, self.direction.wire_name());
        match self.nulls {
            Some(Nulls::First) => out.push_str(".nullsfirst"),
            Some(Nulls::Last) => out.push_str(".nullslast"),
            None => {}
        }
        out
    }
}

/// Comma-joined order list, preserving call order.
pub(crate) fn render_order(order: &[OrderSpec]) -> Option<String> {
    if order.is_empty() {
        return None;
    }
    Some(
        order
            .iter()
            .map(OrderSpec::render)
            .collect::<Vec<_>>()
            .join(","),
    )
}
