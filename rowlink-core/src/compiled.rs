use std::fmt;

use bytes::Bytes;

/// HTTP method a compiled query is sent with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    pub fn is_write(self) -> bool {
        matches!(self, Method::Post | Method::Patch | Method::Delete)
    }
}

/// How the dispatcher shapes the returned rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseMode {
    /// The row sequence as returned, possibly empty.
    Many,
    /// Exactly one row, else `NotFound` / `MultipleRowsFound`.
    Single,
    /// Zero or one row, else `MultipleRowsFound`.
    MaybeSingle,
    /// No row payload; only the count.
    CountOnly,
}

impl ResponseMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseMode::Many => "many",
            ResponseMode::Single => "single",
            ResponseMode::MaybeSingle => "maybe_single",
            ResponseMode::CountOnly => "count",
        }
    }
}

/// The canonical output of compilation: the literal wire request and the
/// basis of the cache key.
///
/// Parameters and headers keep the order they were produced in, so
/// compiling the same builder twice yields identical values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompiledQuery {
    pub table: String,
    pub schema: Option<String>,
    pub method: Method,
    pub mode: ResponseMode,
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    /// The root table followed by every embedded resource name.
    pub tables: Vec<String>,
}

impl CompiledQuery {
    /// Request path relative to the REST root, e.g. `/users`.
    pub fn path(&self) -> String {
        format!("/{}", self.table)
    }

    /// Percent-encoded query string without the leading `?`.
    pub fn query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.params.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .finish()
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_write(&self) -> bool {
        self.method.is_write()
    }

    /// Deterministic signature of everything that affects a read's result.
    ///
    /// `schema.table|mode|METHOD|query|header=value;...`
    pub fn canonical(&self) -> String {
        let mut out = String::with_capacity(64 + self.params.len() * 16);
        if let Some(schema) = &self.schema {
            out.push_str(schema);
            out.push('.');
        }
        out.push_str(&self.table);
        out.push('|');
        out.push_str(self.mode.as_str());
        out.push('|');
        out.push_str(self.method.as_str());
        out.push('|');
        out.push_str(&self.query_string());
        out.push('|');
        for (name, value) in &self.headers {
            out.push_str(&name.to_ascii_lowercase());
            out.push('=');
            out.push_str(value);
            out.push(';');
        }
        out
    }
}

impl fmt::Display for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method.as_str(), self.path())?;
        if !self.params.is_empty() {
            write!(f, "?{}", self.query_string())?;
        }
        Ok(())
    }
}
