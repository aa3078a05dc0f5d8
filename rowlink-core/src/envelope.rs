use crate::error::Error;

/// Uniform result of one executed request.
///
/// Exactly one of `data`/`error` describes the outcome: a failed request
/// never carries rows, and `data: None` with no error means the server
/// legitimately returned nothing (a count-only request, a `maybe_single`
/// miss, or a write with minimal return).
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    pub data: Option<T>,
    pub count: Option<u64>,
    pub status: u16,
    pub error: Option<Error>,
}

impl<T> Envelope<T> {
    pub fn success(data: Option<T>, count: Option<u64>, status: u16) -> Self {
        Self {
            data,
            count,
            status,
            error: None,
        }
    }

    pub fn failure(error: Error, status: u16) -> Self {
        Self {
            data: None,
            count: None,
            status,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope {
            data: self.data.map(f),
            count: self.count,
            status: self.status,
            error: self.error,
        }
    }

    /// Maps the payload with a fallible conversion; a failure replaces the
    /// payload with the returned error.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Result<U, Error>) -> Envelope<U> {
        match self.data {
            Some(data) if self.error.is_none() => match f(data) {
                Ok(mapped) => Envelope::success(Some(mapped), self.count, self.status),
                Err(err) => Envelope::failure(err, self.status),
            },
            _ => Envelope {
                data: None,
                count: self.count,
                status: self.status,
                error: self.error,
            },
        }
    }

    pub fn into_result(self) -> Result<Option<T>, Error> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.data),
        }
    }
}
