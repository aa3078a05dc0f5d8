use std::fmt::Write as _;

/// A single filter operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// The right-hand side of a filter: a scalar or a sequence of scalars.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Scalar(Scalar),
    List(Vec<Scalar>),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Wire text of the scalar without any quoting.
    pub fn render(&self) -> String {
        match self {
            Scalar::Null => "null".to_string(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(x) if x.is_infinite() => {
                if x.is_sign_positive() { "Infinity" } else { "-Infinity" }.to_string()
            }
            Scalar::Float(x) => x.to_string(),
            Scalar::Text(s) => s.clone(),
        }
    }

    /// Wire text quoted when it contains any of `reserved` or surrounding whitespace.
    pub(crate) fn render_quoted(&self, reserved: &[char]) -> String {
        match self {
            Scalar::Text(s) => quote_if_needed(s, reserved),
            other => other.render(),
        }
    }
}

/// Wraps `s` in double quotes, escaping `"` and `\`, when it would otherwise
/// break the surrounding grouping syntax.
pub(crate) fn quote_if_needed(s: &str, reserved: &[char]) -> String {
    let needs_quotes = s.is_empty()
        || s.chars().any(|c| reserved.contains(&c) || c == '"' || c == '\\')
        || s.trim() != s;
    if !needs_quotes {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Renders a list as `open item,item close` with per-item quoting.
pub(crate) fn render_list(items: &[Scalar], open: char, close: char, reserved: &[char]) -> String {
    let mut out = String::new();
    out.push(open);
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "{}", item.render_quoted(reserved));
    }
    out.push(close);
    out
}

macro_rules! scalar_from {
    ($($ty:ty => $variant:ident $(as $cast:ty)?),* $(,)?) => {
        $(
            impl From<$ty> for Scalar {
                fn from(v: $ty) -> Self {
                    Scalar::$variant(v $(as $cast)?)
                }
            }

            impl From<$ty> for FilterValue {
                fn from(v: $ty) -> Self {
                    FilterValue::Scalar(Scalar::from(v))
                }
            }
        )*
    };
}

scalar_from! {
    bool => Bool,
    i8 => Int as i64,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int,
    u8 => Int as i64,
    u16 => Int as i64,
    u32 => Int as i64,
    f32 => Float as f64,
    f64 => Float,
    String => Text,
}

impl From<u64> for Scalar {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(i) => Scalar::Int(i),
            Err(_) => Scalar::Text(v.to_string()),
        }
    }
}

impl From<u64> for FilterValue {
    fn from(v: u64) -> Self {
        FilterValue::Scalar(Scalar::from(v))
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::Scalar(Scalar::from(v))
    }
}

impl From<&String> for Scalar {
    fn from(v: &String) -> Self {
        Scalar::Text(v.clone())
    }
}

impl From<&String> for FilterValue {
    fn from(v: &String) -> Self {
        FilterValue::Scalar(Scalar::from(v))
    }
}

impl From<Scalar> for FilterValue {
    fn from(v: Scalar) -> Self {
        FilterValue::Scalar(v)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(v: Option<T>) -> Self {
        v.map_or(Scalar::Null, Into::into)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for FilterValue {
    fn from(v: Option<T>) -> Self {
        FilterValue::Scalar(Scalar::from(v))
    }
}

impl<T: Into<Scalar>> From<Vec<T>> for FilterValue {
    fn from(v: Vec<T>) -> Self {
        FilterValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Scalar>, const N: usize> From<[T; N]> for FilterValue {
    fn from(v: [T; N]) -> Self {
        FilterValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Scalar> + Clone> From<&[T]> for FilterValue {
    fn from(v: &[T]) -> Self {
        FilterValue::List(v.iter().cloned().map(Into::into).collect())
    }
}
