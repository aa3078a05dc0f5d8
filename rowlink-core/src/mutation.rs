use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::compiled::{CompiledQuery, Method, ResponseMode};
use crate::envelope::Envelope;
use crate::error::Error;
use crate::executor::{CachePolicy, ExecOptions, Executor};
use crate::filter::{render_param, FilterNode, Filterable};
use crate::query::decode;
use crate::relation::is_identifier;
use crate::select::{compile_select, SelectItem};

/// The kind of write a [`MutationBuilder`] performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteKind {
    Insert,
    Update,
    Upsert {
        on_conflict: Vec<String>,
        ignore_duplicates: bool,
    },
    Delete,
}

impl WriteKind {
    pub fn method(&self) -> Method {
        match self {
            WriteKind::Insert | WriteKind::Upsert { .. } => Method::Post,
            WriteKind::Update => Method::Patch,
            WriteKind::Delete => Method::Delete,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WriteKind::Insert => "insert",
            WriteKind::Update => "update",
            WriteKind::Upsert { .. } => "upsert",
            WriteKind::Delete => "delete",
        }
    }
}

/// Builder for insert, update, upsert and delete requests.
///
/// Writes are never served from or stored in the cache. A successful write
/// invalidates every cached read of the table before the call returns.
#[derive(Clone)]
pub struct MutationBuilder {
    pub(crate) table: String,
    pub(crate) schema: Option<String>,
    pub(crate) kind: WriteKind,
    pub(crate) body: Option<serde_json::Value>,
    pub(crate) filters: Vec<FilterNode>,
    pub(crate) returning: Option<Vec<SelectItem>>,
    pub(crate) executor: Option<Arc<dyn Executor>>,
    pub(crate) options: ExecOptions,
    deferred: Option<Error>,
}

impl fmt::Debug for MutationBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationBuilder")
            .field("table", &self.table)
            .field("kind", &self.kind)
            .field("filters", &self.filters)
            .field("returning", &self.returning)
            .field("bound", &self.executor.is_some())
            .finish()
    }
}

impl MutationBuilder {
    pub fn new(table: &str, kind: WriteKind) -> Self {
        Self {
            table: table.to_string(),
            schema: None,
            kind,
            body: None,
            filters: Vec::new(),
            returning: None,
            executor: None,
            options: ExecOptions {
                cache: CachePolicy::Bypass,
                ..ExecOptions::default()
            },
            deferred: None,
        }
    }

    pub(crate) fn body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn kind(&self) -> &WriteKind {
        &self.kind
    }

    /// Asks the server to return the written rows, limited to `columns`
    /// (`["*"]` for every column).
    pub fn returning<S: AsRef<str>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        let mut items = Vec::new();
        for raw in columns {
            match SelectItem::parse(raw.as_ref()) {
                Ok(item) => items.push(item),
                Err(err) => return self.reject(err),
            }
        }
        self.returning = Some(items);
        self
    }

    /// Conflict target columns for an upsert.
    pub fn on_conflict<S: AsRef<str>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        match &mut self.kind {
            WriteKind::Upsert { on_conflict, .. } => {
                on_conflict.extend(columns.into_iter().map(|c| c.as_ref().to_string()));
                self
            }
            other => {
                let name = other.name();
                self.reject(Error::invalid_argument(format!(
                    "on_conflict is only valid for upsert, not {name}"
                )))
            }
        }
    }

    /// Skips conflicting rows instead of merging them.
    pub fn ignore_duplicates(mut self) -> Self {
        match &mut self.kind {
            WriteKind::Upsert {
                ignore_duplicates, ..
            } => {
                *ignore_duplicates = true;
                self
            }
            other => {
                let name = other.name();
                self.reject(Error::invalid_argument(format!(
                    "ignore_duplicates is only valid for upsert, not {name}"
                )))
            }
        }
    }

    pub fn schema(mut self, schema: &str) -> Self {
        self.schema = Some(schema.to_string());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.options.cancel = Some(token);
        self
    }

    pub fn compile(&self) -> Result<CompiledQuery, Error> {
        if let Some(err) = &self.deferred {
            return Err(err.clone());
        }
        if !is_identifier(&self.table) {
            return Err(Error::invalid_argument(format!(
                "invalid table name '{}'",
                self.table
            )));
        }

        let body = match (&self.kind, &self.body) {
            (WriteKind::Delete, _) => None,
            (_, Some(value @ serde_json::Value::Object(_))) => Some(value),
            (_, Some(serde_json::Value::Array(rows))) if !rows.is_empty() => {
                if !rows.iter().all(serde_json::Value::is_object) {
                    return Err(Error::invalid_argument(format!(
                        "{} rows must be JSON objects",
                        self.kind.name()
                    )));
                }
                self.body.as_ref()
            }
            (WriteKind::Update, _) => {
                return Err(Error::invalid_argument(
                    "update requires a JSON object patch",
                ));
            }
            _ => {
                return Err(Error::invalid_argument(format!(
                    "{} requires a JSON object or a non-empty array of objects",
                    self.kind.name()
                )));
            }
        };
        if self.kind == WriteKind::Update && body.is_some_and(|b| !b.is_object()) {
            return Err(Error::invalid_argument("update requires a JSON object patch"));
        }

        let mut params = Vec::new();
        if let Some(items) = &self.returning {
            if let Some(select) = compile_select(items, &[])? {
                params.push(("select".to_string(), select));
            }
        }
        for node in &self.filters {
            render_param(node, "", &mut params)?;
        }

        let mut prefer = vec![if self.returning.is_some() {
            "return=representation"
        } else {
            "return=minimal"
        }];
        if let WriteKind::Upsert {
            on_conflict,
            ignore_duplicates,
        } = &self.kind
        {
            prefer.push(if *ignore_duplicates {
                "resolution=ignore-duplicates"
            } else {
                "resolution=merge-duplicates"
            });
            if !on_conflict.is_empty() {
                params.push(("on_conflict".to_string(), on_conflict.join(",")));
            }
        }

        let mut headers = vec![("Prefer".to_string(), prefer.join(","))];
        if let Some(schema) = &self.schema {
            headers.push(("Content-Profile".to_string(), schema.clone()));
        }

        let body = match body {
            Some(value) => {
                headers.push(("Content-Type".to_string(), "application/json".to_string()));
                let bytes = serde_json::to_vec(value)
                    .map_err(|e| Error::invalid_argument(format!("cannot encode body: {e}")))?;
                Some(Bytes::from(bytes))
            }
            None => None,
        };

        Ok(CompiledQuery {
            table: self.table.clone(),
            schema: self.schema.clone(),
            method: self.kind.method(),
            mode: ResponseMode::Many,
            params,
            headers,
            body,
            tables: vec![self.table.clone()],
        })
    }

    /// Runs the write and returns the envelope. `Err` carries compile-time
    /// errors only.
    ///
    /// Rows are present only when [`returning`](Self::returning) was set.
    pub async fn execute<R: DeserializeOwned>(self) -> Result<Envelope<Vec<R>>, Error> {
        let executor = self.executor.clone().ok_or_else(|| {
            Error::InvalidState("mutation builder is not bound to a client".to_string())
        })?;
        let query = self.compile()?;
        let envelope = executor.execute(query, self.options).await;
        Ok(envelope.and_then(decode::<Vec<R>>))
    }

    /// Runs the write and propagates any failure as `Err`, compile-time or
    /// runtime alike. Returns no rows unless `returning` was set.
    pub async fn try_execute<R: DeserializeOwned>(self) -> Result<Vec<R>, Error> {
        let envelope = self.execute::<R>().await?;
        Ok(envelope.into_result()?.unwrap_or_default())
    }
}

impl Filterable for MutationBuilder {
    fn push_filter(mut self, node: FilterNode) -> Self {
        self.filters.push(node);
        self
    }

    fn reject(mut self, error: Error) -> Self {
        self.deferred.get_or_insert(error);
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::QueryBuilder;

    #[test]
    fn insert_with_returning() {
        let q = QueryBuilder::new("users")
            .insert(json!({"name": "Ann"}))
            .returning(["id", "name"])
            .compile()
            .unwrap();
        assert_eq!(q.method, Method::Post);
        assert_eq!(q.param("select"), Some("id,name"));
        assert_eq!(q.header("Prefer"), Some("return=representation"));
        assert_eq!(q.body.as_deref(), Some(br#"{"name":"Ann"}"#.as_slice()));
    }

    #[test]
    fn update_needs_object_and_carries_filters() {
        let q = QueryBuilder::new("users")
            .schema("api")
            .update(json!({"active": false}))
            .eq("id", 7)
            .compile()
            .unwrap();
        assert_eq!(q.method, Method::Patch);
        assert_eq!(q.param("id"), Some("eq.7"));
        assert_eq!(q.header("Prefer"), Some("return=minimal"));
        assert_eq!(q.header("Content-Profile"), Some("api"));

        let err = QueryBuilder::new("users")
            .update(json!([{"active": false}]))
            .compile()
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
    }

    #[test]
    fn upsert_conflict_target_and_resolution() {
        let q = QueryBuilder::new("users")
            .upsert(json!([{"email": "a@b.c", "name": "A"}]))
            .on_conflict(["email"])
            .ignore_duplicates()
            .compile()
            .unwrap();
        assert_eq!(q.param("on_conflict"), Some("email"));
        assert_eq!(
            q.header("Prefer"),
            Some("return=minimal,resolution=ignore-duplicates")
        );
    }

    #[test]
    fn delete_has_no_body() {
        let q = QueryBuilder::new("users")
            .delete()
            .in_("id", vec![1, 2])
            .compile()
            .unwrap();
        assert_eq!(q.method, Method::Delete);
        assert!(q.body.is_none());
        assert_eq!(q.param("id"), Some("in.(1,2)"));
    }

    #[test]
    fn rejects_scalar_bodies_and_misplaced_options() {
        assert!(QueryBuilder::new("users").insert(json!(3)).compile().is_err());
        assert!(QueryBuilder::new("users")
            .insert(json!([]))
            .compile()
            .is_err());
        assert!(QueryBuilder::new("users")
            .insert(json!({"a": 1}))
            .on_conflict(["a"])
            .compile()
            .is_err());
    }

    #[tokio::test]
    async fn unbound_try_execute_fails() {
        let err = QueryBuilder::new("users")
            .delete()
            .eq("id", 1)
            .try_execute::<serde_json::Value>()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidState);
    }
}
