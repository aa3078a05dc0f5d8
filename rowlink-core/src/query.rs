use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::compiled::{CompiledQuery, Method, ResponseMode};
use crate::envelope::Envelope;
use crate::error::Error;
use crate::executor::{CachePolicy, ExecOptions, Executor};
use crate::filter::{render_param, FilterNode, Filterable};
use crate::mutation::{MutationBuilder, WriteKind};
use crate::order::{render_order, Direction, OrderSpec};
use crate::pagination::{render_pagination, Page, PaginationSpec};
use crate::relation::{hoist, is_identifier, resource_names, RelationSpec};
use crate::select::{compile_select, SelectItem};
use crate::value::Scalar;

/// Row-count strategy requested through the `Prefer` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CountStrategy {
    Exact,
    Planned,
    Estimated,
}

impl CountStrategy {
    pub fn wire_name(self) -> &'static str {
        match self {
            CountStrategy::Exact => "exact",
            CountStrategy::Planned => "planned",
            CountStrategy::Estimated => "estimated",
        }
    }
}

/// Everything a read query accumulates before compilation.
#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
    pub table: String,
    pub schema: Option<String>,
    pub select: Vec<SelectItem>,
    pub filters: Vec<FilterNode>,
    pub order: Vec<OrderSpec>,
    pub pagination: Option<PaginationSpec>,
    pub relations: Vec<RelationSpec>,
    pub count: Option<CountStrategy>,
    pub head: bool,
}

/// A fluent, immutable builder for read queries.
///
/// Every chain method consumes the builder and returns a new one, so a
/// partially built query can be cloned and reused as a template. Nothing
/// is sent until one of the execute-family methods is awaited.
///
/// # Example
///
/// ```ignore
/// let users = client
///     .from("users")
///     .select(["id", "name AS fullName"])
///     .relations(["posts!inner"])
///     .gte("age", 18)
///     .order("created_at", Direction::Desc)
///     .limit(10)
///     .execute::<User>()
///     .await?;
/// ```
#[derive(Clone)]
pub struct QueryBuilder {
    spec: QuerySpec,
    executor: Option<Arc<dyn Executor>>,
    options: ExecOptions,
    deferred: Option<Error>,
}

impl fmt::Debug for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("spec", &self.spec)
            .field("bound", &self.executor.is_some())
            .field("options", &self.options)
            .field("deferred", &self.deferred)
            .finish()
    }
}

impl QueryBuilder {
    /// An unbound builder. It can be compiled but not executed.
    pub fn new(table: &str) -> Self {
        Self {
            spec: QuerySpec {
                table: table.to_string(),
                ..QuerySpec::default()
            },
            executor: None,
            options: ExecOptions::default(),
            deferred: None,
        }
    }

    /// A builder whose execute-family methods run on `executor`.
    pub fn with_executor(table: &str, executor: Arc<dyn Executor>) -> Self {
        let mut builder = Self::new(table);
        builder.executor = Some(executor);
        builder
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    /// Columns to return. Accepts `col`, `expr AS alias`, `alias:expr` and
    /// dotted `relation.col` paths. Repeated calls append.
    pub fn select<S: AsRef<str>>(mut self, items: impl IntoIterator<Item = S>) -> Self {
        for raw in items {
            match SelectItem::parse(raw.as_ref()) {
                Ok(item) => self.spec.select.push(item),
                Err(err) => return self.reject(err),
            }
        }
        self
    }

    /// Declares embedded resources: `posts`, `posts!inner`, `author:users!author_id`.
    pub fn relations<S: AsRef<str>>(mut self, relations: impl IntoIterator<Item = S>) -> Self {
        for raw in relations {
            match RelationSpec::parse(raw.as_ref()) {
                Ok(spec) => self.spec.relations.push(spec),
                Err(err) => return self.reject(err),
            }
        }
        self
    }

    /// Declares a fully configured embedded resource.
    pub fn relation(mut self, relation: RelationSpec) -> Self {
        self.spec.relations.push(relation);
        self
    }

    /// Adds a sort key. The first call is the primary key.
    pub fn order(self, column: &str, direction: Direction) -> Self {
        self.order_by(OrderSpec::new(column, direction))
    }

    pub fn order_by(mut self, spec: OrderSpec) -> Self {
        self.spec.order.push(spec);
        self
    }

    pub fn limit(self, limit: u64) -> Self {
        let next = match &self.spec.pagination {
            None => PaginationSpec::OffsetLimit {
                offset: 0,
                limit: Some(limit),
            },
            Some(PaginationSpec::OffsetLimit { offset, .. }) => PaginationSpec::OffsetLimit {
                offset: *offset,
                limit: Some(limit),
            },
            Some(PaginationSpec::Cursor { .. }) => {
                let mut cursor = self.spec.pagination.clone();
                if let Some(PaginationSpec::Cursor { limit: l, .. }) = cursor.as_mut() {
                    *l = Some(limit);
                }
                return self.replace_pagination(cursor);
            }
            Some(other) => {
                let existing = other.name();
                return self.conflict("limit", existing);
            }
        };
        self.replace_pagination(Some(next))
    }

    pub fn offset(self, offset: u64) -> Self {
        let next = match &self.spec.pagination {
            None => PaginationSpec::OffsetLimit {
                offset,
                limit: None,
            },
            Some(PaginationSpec::OffsetLimit { limit, .. }) => PaginationSpec::OffsetLimit {
                offset,
                limit: *limit,
            },
            Some(other) => {
                let existing = other.name();
                return self.conflict("offset", existing);
            }
        };
        self.replace_pagination(Some(next))
    }

    /// 1-based page of `size` rows.
    pub fn page(self, page: u64, size: u64) -> Self {
        match &self.spec.pagination {
            None | Some(PaginationSpec::PageSize { .. }) => {
                self.replace_pagination(Some(PaginationSpec::PageSize { page, size }))
            }
            Some(other) => {
                let existing = other.name();
                self.conflict("page", existing)
            }
        }
    }

    /// Zero-based inclusive row range, sent as a `Range` header.
    pub fn range(self, start: u64, end: u64) -> Self {
        match &self.spec.pagination {
            None | Some(PaginationSpec::Range { .. }) => {
                self.replace_pagination(Some(PaginationSpec::Range { start, end }))
            }
            Some(other) => {
                let existing = other.name();
                self.conflict("range", existing)
            }
        }
    }

    /// Keyset pagination: rows strictly after `value` on `column`, walking
    /// in `direction`. The query must also be ordered by `column` in the
    /// same direction.
    pub fn cursor(self, column: &str, value: impl Into<Scalar>, direction: Direction) -> Self {
        let limit = match &self.spec.pagination {
            None => None,
            Some(PaginationSpec::OffsetLimit { offset: 0, limit }) => *limit,
            Some(PaginationSpec::Cursor { limit, .. }) => *limit,
            Some(other) => {
                let existing = other.name();
                return self.conflict("cursor", existing);
            }
        };
        self.replace_pagination(Some(PaginationSpec::Cursor {
            column: column.to_string(),
            value: value.into(),
            direction,
            limit,
            tiebreaker: None,
        }))
    }

    /// Secondary cursor key for non-unique cursor columns; typically the
    /// primary key value of the last row seen.
    pub fn tiebreaker(mut self, column: &str, value: impl Into<Scalar>) -> Self {
        match self.spec.pagination.as_mut() {
            Some(PaginationSpec::Cursor { tiebreaker, .. }) => {
                *tiebreaker = Some((column.to_string(), value.into()));
                self
            }
            _ => self.reject(Error::invalid_argument(
                "tiebreaker requires cursor pagination",
            )),
        }
    }

    pub fn count(mut self, strategy: CountStrategy) -> Self {
        self.spec.count = Some(strategy);
        self
    }

    /// Count-only request: no rows are transferred. Implies an exact count
    /// unless a strategy was chosen.
    pub fn head(mut self) -> Self {
        self.spec.head = true;
        self.spec.count.get_or_insert(CountStrategy::Exact);
        self
    }

    pub fn schema(mut self, schema: &str) -> Self {
        self.spec.schema = Some(schema.to_string());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Cancels the dispatch when `token` fires. A cancelled dispatch is
    /// never written to the cache.
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.options.cancel = Some(token);
        self
    }

    pub fn no_cache(mut self) -> Self {
        self.options.cache = CachePolicy::Bypass;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.options.cache = CachePolicy::Ttl(ttl);
        self
    }

    fn replace_pagination(mut self, next: Option<PaginationSpec>) -> Self {
        self.spec.pagination = next;
        self
    }

    fn conflict(self, requested: &str, existing: &str) -> Self {
        self.reject(Error::invalid_argument(format!(
            "cannot combine {requested} pagination with {existing} pagination"
        )))
    }

    /// Compiles the query as a many-row read (or a count-only read after
    /// [`head`](Self::head)).
    pub fn compile(&self) -> Result<CompiledQuery, Error> {
        let mode = if self.spec.head {
            ResponseMode::CountOnly
        } else {
            ResponseMode::Many
        };
        self.compile_as(mode)
    }

    pub fn compile_as(&self, mode: ResponseMode) -> Result<CompiledQuery, Error> {
        if let Some(err) = &self.deferred {
            return Err(err.clone());
        }
        let spec = &self.spec;
        if !is_identifier(&spec.table) {
            return Err(Error::invalid_argument(format!(
                "invalid table name '{}'",
                spec.table
            )));
        }
        if spec.head && mode != ResponseMode::CountOnly {
            return Err(Error::InvalidState(format!(
                "a head-only query cannot be executed in {} mode",
                mode.as_str()
            )));
        }
        for relation in &spec.relations {
            relation.check()?;
        }

        let mut params = Vec::new();
        let mut headers = Vec::new();

        if let Some(select) = compile_select(&spec.select, &spec.relations)? {
            params.push(("select".to_string(), select));
        }
        for node in &spec.filters {
            render_param(node, "", &mut params)?;
        }

        let mut order = spec.order.clone();
        let pagination = match &spec.pagination {
            Some(p) => Some(render_pagination(p, &spec.order)?),
            None => None,
        };
        if let Some(rendered) = &pagination {
            if let Some(node) = &rendered.filter {
                render_param(node, "", &mut params)?;
            }
            order.extend(rendered.extra_order.iter().cloned());
        }

        hoist(&spec.relations, &mut params)?;

        if let Some(order) = render_order(&order) {
            params.push(("order".to_string(), order));
        }
        if let Some(rendered) = pagination {
            params.extend(rendered.params);
            headers.extend(rendered.headers);
        }

        if let Some(schema) = &spec.schema {
            headers.push(("Accept-Profile".to_string(), schema.clone()));
        }
        if let Some(count) = spec.count {
            headers.push(("Prefer".to_string(), format!("count={}", count.wire_name())));
        }

        let mut tables = vec![spec.table.clone()];
        resource_names(&spec.relations, &mut tables);

        Ok(CompiledQuery {
            table: spec.table.clone(),
            schema: spec.schema.clone(),
            method: if mode == ResponseMode::CountOnly {
                Method::Head
            } else {
                Method::Get
            },
            mode,
            params,
            headers,
            body: None,
            tables,
        })
    }

    fn executor(&self) -> Result<Arc<dyn Executor>, Error> {
        self.executor.clone().ok_or_else(|| {
            Error::InvalidState("query builder is not bound to a client".to_string())
        })
    }

    async fn run(self, mode: ResponseMode) -> Result<Envelope<serde_json::Value>, Error> {
        let executor = self.executor()?;
        let query = self.compile_as(mode)?;
        Ok(executor.execute(query, self.options).await)
    }

    /// Executes in many-row mode (or count-only mode after `head()`).
    ///
    /// `Err` carries compile-time errors only; everything that happens after
    /// the query was compiled is reported in the envelope.
    pub async fn execute<R: DeserializeOwned>(self) -> Result<Envelope<Vec<R>>, Error> {
        let mode = if self.spec.head {
            ResponseMode::CountOnly
        } else {
            ResponseMode::Many
        };
        let envelope = self.run(mode).await?;
        Ok(envelope.and_then(decode::<Vec<R>>))
    }

    /// Expects exactly one row: zero rows is `NotFound`, more than one is
    /// `MultipleRowsFound`.
    pub async fn single<R: DeserializeOwned>(self) -> Result<Envelope<R>, Error> {
        let envelope = self.run(ResponseMode::Single).await?;
        Ok(envelope.and_then(decode::<R>))
    }

    /// Expects zero or one row. Zero rows yields `data: None` without error.
    pub async fn maybe_single<R: DeserializeOwned>(self) -> Result<Envelope<R>, Error> {
        let envelope = self.run(ResponseMode::MaybeSingle).await?;
        Ok(envelope.and_then(decode::<R>))
    }

    /// Executes a `page(page, size)` query with an exact count and wraps the
    /// rows in a [`Page`].
    pub async fn execute_with_pagination<R: DeserializeOwned>(
        mut self,
    ) -> Result<Envelope<Page<R>>, Error> {
        let Some(PaginationSpec::PageSize { page, size }) = self.spec.pagination else {
            return Err(Error::InvalidState(
                "execute_with_pagination requires page(page, size)".to_string(),
            ));
        };
        if self.spec.head {
            return Err(Error::InvalidState(
                "execute_with_pagination cannot run a head-only query".to_string(),
            ));
        }
        self.spec.count = Some(CountStrategy::Exact);
        let envelope = self.run(ResponseMode::Many).await?;
        let count = envelope.count;
        Ok(envelope.and_then(|value| {
            let rows = decode::<Vec<R>>(value)?;
            let total = count.unwrap_or(rows.len() as u64);
            Ok(Page::new(rows, page, size, total))
        }))
    }

    /// Starts an insert of one object or an array of objects.
    pub fn insert<T: Serialize>(self, rows: T) -> MutationBuilder {
        self.into_mutation(WriteKind::Insert, Some(serde_json::to_value(rows)))
    }

    /// Starts an update applying `patch` to every row matching the filters.
    pub fn update<T: Serialize>(self, patch: T) -> MutationBuilder {
        self.into_mutation(WriteKind::Update, Some(serde_json::to_value(patch)))
    }

    /// Starts an insert that merges rows conflicting on the primary key
    /// (or the columns given to `on_conflict`).
    pub fn upsert<T: Serialize>(self, rows: T) -> MutationBuilder {
        self.into_mutation(
            WriteKind::Upsert {
                on_conflict: Vec::new(),
                ignore_duplicates: false,
            },
            Some(serde_json::to_value(rows)),
        )
    }

    pub fn delete(self) -> MutationBuilder {
        self.into_mutation(WriteKind::Delete, None)
    }

    fn into_mutation(
        self,
        kind: WriteKind,
        body: Option<Result<serde_json::Value, serde_json::Error>>,
    ) -> MutationBuilder {
        let mut builder = MutationBuilder::new(&self.spec.table, kind);
        builder.schema = self.spec.schema;
        builder.executor = self.executor;
        builder.options = ExecOptions {
            cache: CachePolicy::Bypass,
            ..self.options
        };
        if let Some(err) = self.deferred {
            builder = builder.reject(err);
        }
        if matches!(builder.kind, WriteKind::Update | WriteKind::Delete) {
            builder.filters = self.spec.filters;
        } else if !self.spec.filters.is_empty() {
            let name = builder.kind.name();
            builder = builder.reject(Error::invalid_argument(format!("{name} does not take filters")));
        }
        match body {
            Some(Ok(value)) => builder.body(value),
            Some(Err(err)) => builder.reject(Error::invalid_argument(format!(
                "cannot serialize request body: {err}"
            ))),
            None => builder,
        }
    }
}

impl Filterable for QueryBuilder {
    fn push_filter(mut self, node: FilterNode) -> Self {
        self.spec.filters.push(node);
        self
    }

    fn reject(mut self, error: Error) -> Self {
        self.deferred.get_or_insert(error);
        self
    }
}

pub(crate) fn decode<R: DeserializeOwned>(value: serde_json::Value) -> Result<R, Error> {
    serde_json::from_value(value).map_err(|e| Error::Decode(e.to_string()))
}
