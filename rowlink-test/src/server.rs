use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::{Path, RawQuery, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use bytes::Bytes;
use rowlink_client::{Client, ClientConfig};
use serde_json::{json, Map, Value};

use crate::eval::{matches_all, sort_rows, Row};
use crate::transport::RouterTransport;
use crate::wire::{parse_group, parse_leaf, parse_order, parse_select, Cond, Embed, OrderTerm, Projection};

/// An in-memory REST-over-SQL endpoint exposed as an axum [`Router`].
///
/// Serves `/{table}` with the subset of the query grammar the compiler
/// emits: projections with aliases and embedded resources (`!inner`,
/// foreign-key hints), leaf filters and logic trees, hoisted filters and
/// limits on embedded resources, ordering, `limit`/`offset` or a `Range`
/// header, `Prefer: count=...`, `HEAD`, and writes with
/// `Prefer: return=representation` and upsert resolution.
///
/// ```ignore
/// let server = FakeServer::new()
///     .table("users", json!([{"id": 1, "name": "Ada"}]))
///     .table("posts", json!([{"id": 10, "user_id": 1, "title": "Hello"}]))
///     .foreign_key("posts", "user_id", "users");
/// let (client, transport) = server.connect();
/// ```
#[derive(Clone, Default)]
pub struct FakeServer {
    store: Arc<Mutex<Store>>,
    bearer: Option<String>,
    schemas: Vec<String>,
    latency: Duration,
}

#[derive(Default)]
struct Store {
    tables: BTreeMap<String, Table>,
    foreign_keys: Vec<ForeignKey>,
}

#[derive(Default)]
struct Table {
    columns: BTreeSet<String>,
    rows: Vec<Row>,
}

#[derive(Debug, Clone)]
struct ForeignKey {
    table: String,
    column: String,
    references: String,
    referenced_column: String,
}

#[derive(Clone, Copy)]
enum Link<'a> {
    /// Child rows point at the parent.
    ToMany(&'a ForeignKey),
    /// The parent points at one child row.
    ToOne(&'a ForeignKey),
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or replaces) a table from a JSON array of objects.
    ///
    /// # Panics
    ///
    /// If `rows` is not an array of objects.
    pub fn table(self, name: &str, rows: Value) -> Self {
        let rows: Vec<Row> = match rows {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(row) => row,
                    other => panic!("table '{name}': row is not an object: {other}"),
                })
                .collect(),
            other => panic!("table '{name}': expected an array of rows, got {other}"),
        };
        let columns = rows.iter().flat_map(|r| r.keys().cloned()).collect();
        self.lock().tables.insert(name.to_string(), Table { columns, rows });
        self
    }

    /// Declares `table.column` as referencing `references.id`.
    pub fn foreign_key(self, table: &str, column: &str, references: &str) -> Self {
        self.lock().foreign_keys.push(ForeignKey {
            table: table.to_string(),
            column: column.to_string(),
            references: references.to_string(),
            referenced_column: "id".to_string(),
        });
        self
    }

    /// Rejects requests without `Authorization: Bearer <token>`.
    pub fn require_bearer(mut self, token: &str) -> Self {
        self.bearer = Some(token.to_string());
        self
    }

    /// Restricts `Accept-Profile`/`Content-Profile` to these schemas.
    pub fn schemas(mut self, schemas: &[&str]) -> Self {
        self.schemas = schemas.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Delays every response.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/{table}", any(handle))
            .with_state(self.clone())
    }

    /// Current rows of `table`, in storage order.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.rows.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    /// Appends a row behind the client's back, e.g. to observe stale cache reads.
    pub fn insert_row(&self, table: &str, row: Value) {
        if let (Some(t), Value::Object(row)) = (self.lock().tables.get_mut(table), row) {
            t.columns.extend(row.keys().cloned());
            t.rows.push(row);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn process(
        &self,
        table: &str,
        method: &Method,
        query: &str,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> Result<Response, Rejection> {
        self.authorize(headers)?;
        let profile = if matches!(*method, Method::GET | Method::HEAD) {
            "accept-profile"
        } else {
            "content-profile"
        };
        if let Some(schema) = headers.get(profile).and_then(|v| v.to_str().ok()) {
            if !self.schemas.is_empty() && !self.schemas.iter().any(|s| s == schema) {
                return Err(Rejection::new(
                    StatusCode::NOT_ACCEPTABLE,
                    "PGRST106",
                    format!("The schema must be one of the following: {}", self.schemas.join(", ")),
                ));
            }
        }

        let params = Params::parse(query, headers)?;
        let mut store = self.lock();
        if !store.tables.contains_key(table) {
            return Err(Rejection::new(
                StatusCode::NOT_FOUND,
                "42P01",
                format!("relation \"public.{table}\" does not exist"),
            ));
        }
        match *method {
            Method::GET => store.read(table, &params, false),
            Method::HEAD => store.read(table, &params, true),
            Method::POST => store.insert(table, &params, body),
            Method::PATCH => store.update(table, &params, body),
            Method::DELETE => store.delete(table, &params),
            _ => Err(Rejection::new(
                StatusCode::METHOD_NOT_ALLOWED,
                "PGRST117",
                format!("Unsupported HTTP method: {method}"),
            )),
        }
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), Rejection> {
        let Some(token) = &self.bearer else {
            return Ok(());
        };
        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        match presented {
            Some(p) if p == token => Ok(()),
            Some(_) => Err(Rejection::new(StatusCode::UNAUTHORIZED, "PGRST301", "JWT invalid")),
            None => Err(Rejection::new(
                StatusCode::UNAUTHORIZED,
                "PGRST302",
                "Anonymous access is disabled",
            )),
        }
    }
}

/// Base URL used by [`FakeServer::connect`].
pub const FAKE_URL: &str = "http://rowlink.test";

impl FakeServer {
    /// A client wired to this server in-process, plus its transport for
    /// inspecting requests.
    pub fn connect(&self) -> (Client, Arc<RouterTransport>) {
        self.connect_with(ClientConfig::new(FAKE_URL))
    }

    /// Like [`connect`](Self::connect) with caller-supplied settings. The URL
    /// must have no path, since the router serves `/{table}`.
    pub fn connect_with(&self, config: ClientConfig) -> (Client, Arc<RouterTransport>) {
        let transport = Arc::new(RouterTransport::new(self.router()));
        let client = Client::builder(config)
            .shared_transport(transport.clone())
            .build()
            .expect("fake server client config");
        (client, transport)
    }
}

async fn handle(
    State(server): State<FakeServer>,
    Path(table): Path<String>,
    method: Method,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !server.latency.is_zero() {
        tokio::time::sleep(server.latency).await;
    }
    server
        .process(&table, &method, query.as_deref().unwrap_or(""), &headers, &body)
        .unwrap_or_else(IntoResponse::into_response)
}

/// Error body in the `{code, message, details, hint}` shape.
struct Rejection {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<String>,
}

impl Rejection {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "PGRST100", message)
    }

    fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let body = json!({
            "code": self.code,
            "message": self.message,
            "details": self.details,
            "hint": null,
        });
        (self.status, Json(body)).into_response()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Merge,
    Ignore,
}

/// Request parameters grouped by embedded-resource path (`""` is the root).
#[derive(Default)]
struct Params {
    select: Option<Vec<Projection>>,
    filters: HashMap<String, Vec<Cond>>,
    order: HashMap<String, Vec<OrderTerm>>,
    limit: HashMap<String, usize>,
    offset: HashMap<String, usize>,
    on_conflict: Option<Vec<String>>,
    range: Option<(usize, usize)>,
    count: bool,
    representation: bool,
    resolution: Option<Resolution>,
}

impl Params {
    fn parse(query: &str, headers: &HeaderMap) -> Result<Self, Rejection> {
        let mut params = Params::default();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "select" => {
                    params.select = Some(parse_select(&value).map_err(Rejection::bad_request)?);
                    continue;
                }
                "on_conflict" => {
                    params.on_conflict = Some(value.split(',').map(|c| c.trim().to_string()).collect());
                    continue;
                }
                "columns" => continue,
                _ => {}
            }
            let (path, name) = split_key(&key);
            let path = path.to_string();
            match name {
                "order" => {
                    let terms = parse_order(&value).map_err(Rejection::bad_request)?;
                    params.order.entry(path).or_default().extend(terms);
                }
                "limit" | "offset" => {
                    let n: usize = value
                        .parse()
                        .map_err(|_| Rejection::bad_request(format!("invalid {name} '{value}'")))?;
                    let slot = if name == "limit" {
                        &mut params.limit
                    } else {
                        &mut params.offset
                    };
                    slot.insert(path, n);
                }
                "or" | "and" | "not.or" | "not.and" => {
                    let cond = parse_group(name.ends_with("or"), name.starts_with("not."), &value)
                        .map_err(Rejection::bad_request)?;
                    params.filters.entry(path).or_default().push(cond);
                }
                column => {
                    let cond = parse_leaf(column, &value, false).map_err(Rejection::bad_request)?;
                    params.filters.entry(path).or_default().push(cond);
                }
            }
        }

        if let Some(range) = headers.get(header::RANGE).and_then(|v| v.to_str().ok()) {
            let parsed: Option<(usize, usize)> = range
                .split_once('-')
                .and_then(|(a, b)| Some((a.trim().parse().ok()?, b.trim().parse().ok()?)));
            match parsed {
                Some((start, end)) if end >= start => params.range = Some((start, end)),
                _ => {
                    return Err(Rejection::new(
                        StatusCode::RANGE_NOT_SATISFIABLE,
                        "PGRST103",
                        format!("Requested range not satisfiable: {range}"),
                    ))
                }
            }
        }

        for prefer in headers.get_all("prefer") {
            let Ok(prefer) = prefer.to_str() else { continue };
            for token in prefer.split(',').map(str::trim) {
                match token {
                    "count=exact" | "count=planned" | "count=estimated" => params.count = true,
                    "return=representation" => params.representation = true,
                    "resolution=merge-duplicates" => params.resolution = Some(Resolution::Merge),
                    "resolution=ignore-duplicates" => params.resolution = Some(Resolution::Ignore),
                    _ => {}
                }
            }
        }
        Ok(params)
    }

    fn filters(&self, path: &str) -> &[Cond] {
        self.filters.get(path).map(Vec::as_slice).unwrap_or_default()
    }

    fn order(&self, path: &str) -> &[OrderTerm] {
        self.order.get(path).map(Vec::as_slice).unwrap_or_default()
    }

    /// `(offset, limit)` for a path; the root also honors the `Range` header.
    fn window(&self, path: &str) -> (usize, Option<usize>) {
        let offset = self.offset.get(path).copied();
        let limit = self.limit.get(path).copied();
        match (path, self.range) {
            ("", Some((start, end))) if offset.is_none() && limit.is_none() => {
                (start, Some(end - start + 1))
            }
            _ => (offset.unwrap_or(0), limit),
        }
    }
}

/// `posts.comments.title` -> (`posts.comments`, `title`); `not.or` stays whole.
fn split_key(key: &str) -> (&str, &str) {
    for suffix in ["not.or", "not.and"] {
        if key == suffix {
            return ("", key);
        }
        if let Some(path) = key.strip_suffix(suffix).and_then(|p| p.strip_suffix('.')) {
            return (path, suffix);
        }
    }
    key.rsplit_once('.').unwrap_or(("", key))
}

fn child_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn paginate<T>(items: Vec<T>, (offset, limit): (usize, Option<usize>)) -> Vec<T> {
    items
        .into_iter()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

impl Store {
    fn table(&self, name: &str) -> Result<&Table, Rejection> {
        self.tables.get(name).ok_or_else(|| {
            Rejection::new(
                StatusCode::NOT_FOUND,
                "42P01",
                format!("relation \"public.{name}\" does not exist"),
            )
        })
    }

    fn read(&self, table: &str, params: &Params, head: bool) -> Result<Response, Rejection> {
        let t = self.table(table)?;
        let matched = self.filtered(table, t.rows.iter(), params)?;
        let rows = self.project_all(table, &matched, params, "")?;
        let total = rows.len();
        let window = params.window("");
        let offset = window.0;
        let page = paginate(rows, window);

        let range = if page.is_empty() {
            "*".to_string()
        } else {
            format!("{}-{}", offset, offset + page.len() - 1)
        };
        let total = if params.count {
            total.to_string()
        } else {
            "*".to_string()
        };
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&format!("{range}/{total}")) {
            headers.insert(header::CONTENT_RANGE, value);
        }
        if head {
            return Ok((StatusCode::OK, headers).into_response());
        }
        Ok((StatusCode::OK, headers, Json(Value::Array(page))).into_response())
    }

    /// Root rows passing the root filters, in the requested order.
    fn filtered<'a>(
        &self,
        table: &str,
        rows: impl Iterator<Item = &'a Row>,
        params: &Params,
    ) -> Result<Vec<&'a Row>, Rejection> {
        let conds = params.filters("");
        self.check_columns(table, conds, params.order(""))?;
        let mut matched = Vec::new();
        for row in rows {
            if matches_all(row, conds).map_err(Rejection::bad_request)? {
                matched.push(row);
            }
        }
        sort_rows(&mut matched, params.order(""));
        Ok(matched)
    }

    fn check_columns(&self, table: &str, conds: &[Cond], order: &[OrderTerm]) -> Result<(), Rejection> {
        let t = self.table(table)?;
        if t.columns.is_empty() {
            return Ok(());
        }
        let mut columns = Vec::new();
        conds.iter().for_each(|c| c.columns(&mut columns));
        columns.extend(order.iter().map(|o| o.column.as_str()));
        match columns.into_iter().find(|c| !t.columns.contains(*c)) {
            Some(missing) => Err(unknown_column(table, missing)),
            None => Ok(()),
        }
    }

    fn project_all(
        &self,
        table: &str,
        rows: &[&Row],
        params: &Params,
        path: &str,
    ) -> Result<Vec<Value>, Rejection> {
        let star = [Projection::Star];
        let items = params.select.as_deref().unwrap_or(&star);
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(projected) = self.project(table, row, items, params, path)? {
                out.push(projected);
            }
        }
        Ok(out)
    }

    /// Projects one row; `None` when an `!inner` embed came back empty.
    fn project(
        &self,
        table: &str,
        row: &Row,
        items: &[Projection],
        params: &Params,
        path: &str,
    ) -> Result<Option<Value>, Rejection> {
        let t = self.table(table)?;
        let mut out = Map::new();
        for item in items {
            match item {
                Projection::Star => {
                    for (k, v) in row {
                        out.insert(k.clone(), v.clone());
                    }
                }
                Projection::Column { key, column, cast } => {
                    if !t.columns.is_empty() && !t.columns.contains(column) {
                        return Err(unknown_column(table, column));
                    }
                    let value = row.get(column).cloned().unwrap_or(Value::Null);
                    let value = match (cast.as_deref(), value) {
                        (Some("text"), Value::Null) => Value::Null,
                        (Some("text"), Value::String(s)) => Value::String(s),
                        (Some("text"), other) => Value::String(other.to_string()),
                        (_, other) => other,
                    };
                    out.insert(key.clone(), value);
                }
                Projection::Embed(embed) => {
                    let path = child_path(path, &embed.key);
                    let value = self.embed(table, row, embed, params, &path)?;
                    let empty = match &value {
                        Value::Null => true,
                        Value::Array(items) => items.is_empty(),
                        _ => false,
                    };
                    if embed.inner && empty {
                        return Ok(None);
                    }
                    out.insert(embed.key.clone(), value);
                }
            }
        }
        Ok(Some(Value::Object(out)))
    }

    fn embed(
        &self,
        parent: &str,
        row: &Row,
        embed: &Embed,
        params: &Params,
        path: &str,
    ) -> Result<Value, Rejection> {
        let link = self.link(parent, embed)?;
        let child = self.table(&embed.name)?;
        let mut linked: Vec<&Row> = child
            .rows
            .iter()
            .filter(|c| match link {
                Link::ToMany(fk) => {
                    c.get(&fk.column).is_some_and(|v| Some(v) == row.get(&fk.referenced_column))
                }
                Link::ToOne(fk) => {
                    row.get(&fk.column).is_some_and(|v| Some(v) == c.get(&fk.referenced_column))
                }
            })
            .collect();

        let conds = params.filters(path);
        self.check_columns(&embed.name, conds, params.order(path))?;
        let mut kept = Vec::with_capacity(linked.len());
        for c in linked.drain(..) {
            if matches_all(c, conds).map_err(Rejection::bad_request)? {
                kept.push(c);
            }
        }
        sort_rows(&mut kept, params.order(path));
        let kept = paginate(kept, params.window(path));

        let mut projected = Vec::with_capacity(kept.len());
        for c in kept {
            if let Some(v) = self.project(&embed.name, c, &embed.items, params, path)? {
                projected.push(v);
            }
        }
        Ok(match link {
            Link::ToMany(_) => Value::Array(projected),
            Link::ToOne(_) => projected.into_iter().next().unwrap_or(Value::Null),
        })
    }

    fn link(&self, parent: &str, embed: &Embed) -> Result<Link<'_>, Rejection> {
        let hinted = |fk: &&ForeignKey| embed.hint.as_deref().map_or(true, |h| h == fk.column);
        let candidates: Vec<Link<'_>> = self
            .foreign_keys
            .iter()
            .filter(hinted)
            .filter_map(|fk| {
                if fk.table == embed.name && fk.references == parent {
                    Some(Link::ToMany(fk))
                } else if fk.table == parent && fk.references == embed.name {
                    Some(Link::ToOne(fk))
                } else {
                    None
                }
            })
            .collect();
        let count = candidates.len();
        match candidates.into_iter().next() {
            Some(link) if count == 1 => Ok(link),
            Some(_) => Err(Rejection::new(
                StatusCode::MULTIPLE_CHOICES,
                "PGRST201",
                format!(
                    "Could not embed because more than one relationship was found for '{parent}' and '{}'",
                    embed.name
                ),
            )),
            None => Err(Rejection::new(
                StatusCode::BAD_REQUEST,
                "PGRST200",
                format!(
                    "Could not find a relationship between '{parent}' and '{}' in the schema cache",
                    embed.name
                ),
            )),
        }
    }

    fn insert(&mut self, table: &str, params: &Params, body: &Bytes) -> Result<Response, Rejection> {
        let incoming = match parse_body(body)? {
            Value::Object(row) => vec![row],
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(row) => Ok(row),
                    _ => Err(invalid_body("All array elements must be objects")),
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => return Err(invalid_body("Expected an object or an array of objects")),
        };
        let conflict = params
            .on_conflict
            .clone()
            .unwrap_or_else(|| vec!["id".to_string()]);

        let t = self
            .tables
            .get_mut(table)
            .ok_or_else(|| Rejection::bad_request(format!("unknown table {table}")))?;
        for row in &incoming {
            check_payload_columns(table, t, row)?;
        }

        let mut staged = t.rows.clone();
        let mut affected = Vec::new();
        for mut row in incoming {
            if !row.contains_key("id") && t.columns.contains("id") {
                let next = staged
                    .iter()
                    .filter_map(|r| r.get("id").and_then(Value::as_i64))
                    .max()
                    .unwrap_or(0)
                    + 1;
                row.insert("id".to_string(), json!(next));
            }
            let existing = staged.iter().position(|r| {
                conflict
                    .iter()
                    .all(|c| r.get(c).is_some_and(|v| !v.is_null() && Some(v) == row.get(c)))
            });
            match (existing, params.resolution) {
                (Some(i), Some(Resolution::Merge)) => {
                    staged[i].extend(row);
                    affected.push(staged[i].clone());
                }
                (Some(_), Some(Resolution::Ignore)) => {}
                (Some(_), None) => {
                    let key = conflict.join(", ");
                    let values = conflict
                        .iter()
                        .map(|c| row.get(c).map(|v| v.to_string()).unwrap_or_default())
                        .collect::<Vec<_>>()
                        .join(", ");
                    return Err(Rejection::new(
                        StatusCode::CONFLICT,
                        "23505",
                        format!("duplicate key value violates unique constraint \"{table}_pkey\""),
                    )
                    .with_details(format!("Key ({key})=({values}) already exists.")));
                }
                (None, _) => {
                    staged.push(row.clone());
                    affected.push(row);
                }
            }
        }
        t.rows = staged;
        self.write_response(table, StatusCode::CREATED, affected, params)
    }

    fn update(&mut self, table: &str, params: &Params, body: &Bytes) -> Result<Response, Rejection> {
        let Value::Object(patch) = parse_body(body)? else {
            return Err(invalid_body("Expected a single object"));
        };
        self.check_columns(table, params.filters(""), &[])?;
        let conds = params.filters("");
        let t = self
            .tables
            .get_mut(table)
            .ok_or_else(|| Rejection::bad_request(format!("unknown table {table}")))?;
        check_payload_columns(table, t, &patch)?;

        let mut affected = Vec::new();
        for row in t.rows.iter_mut() {
            if matches_all(row, conds).map_err(Rejection::bad_request)? {
                row.extend(patch.clone());
                affected.push(row.clone());
            }
        }
        self.write_response(table, StatusCode::OK, affected, params)
    }

    fn delete(&mut self, table: &str, params: &Params) -> Result<Response, Rejection> {
        self.check_columns(table, params.filters(""), &[])?;
        let conds = params.filters("");
        let t = self
            .tables
            .get_mut(table)
            .ok_or_else(|| Rejection::bad_request(format!("unknown table {table}")))?;

        let mut kept = Vec::with_capacity(t.rows.len());
        let mut affected = Vec::new();
        for row in t.rows.drain(..) {
            if matches_all(&row, conds).map_err(Rejection::bad_request)? {
                affected.push(row);
            } else {
                kept.push(row);
            }
        }
        t.rows = kept;
        self.write_response(table, StatusCode::OK, affected, params)
    }

    fn write_response(
        &self,
        table: &str,
        status: StatusCode,
        affected: Vec<Row>,
        params: &Params,
    ) -> Result<Response, Rejection> {
        if !params.representation {
            let status = if status == StatusCode::CREATED {
                status
            } else {
                StatusCode::NO_CONTENT
            };
            return Ok(status.into_response());
        }
        let refs: Vec<&Row> = affected.iter().collect();
        let rows = self.project_all(table, &refs, params, "")?;
        Ok((status, Json(Value::Array(rows))).into_response())
    }
}

fn parse_body(body: &Bytes) -> Result<Value, Rejection> {
    serde_json::from_slice(body).map_err(|e| invalid_body(format!("Empty or invalid json: {e}")))
}

fn invalid_body(message: impl Into<String>) -> Rejection {
    Rejection::new(StatusCode::BAD_REQUEST, "PGRST102", message)
}

fn check_payload_columns(table: &str, t: &Table, row: &Row) -> Result<(), Rejection> {
    if t.columns.is_empty() {
        return Ok(());
    }
    match row.keys().find(|k| !t.columns.contains(*k)) {
        Some(k) => Err(Rejection::new(
            StatusCode::BAD_REQUEST,
            "PGRST204",
            format!("Could not find the '{k}' column of '{table}' in the schema cache"),
        )),
        None => Ok(()),
    }
}

fn unknown_column(table: &str, column: &str) -> Rejection {
    Rejection::new(
        StatusCode::BAD_REQUEST,
        "42703",
        format!("column {table}.{column} does not exist"),
    )
}
