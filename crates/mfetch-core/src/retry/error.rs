//! Error of a single fetch attempt against one mirror.

/// Error returned by one ranged GET. Classified before deciding whether to
/// back off, rotate, or give up.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    /// Curl reported an error (timeout, connection reset, DNS, TLS...).
    #[error("{0}")]
    Curl(#[from] curl::Error),
    /// Response status other than 200/206/416.
    #[error("HTTP {0}")]
    Http(u32),
    /// 416 for the requested offset; the temp file no longer matches the origin.
    #[error("range not satisfiable at offset {offset}")]
    RangeNotSatisfiable { offset: u64 },
    /// 206 whose Content-Range does not start at the requested offset.
    #[error("origin answered from byte {got} for a request at offset {requested}")]
    RangeMismatch { requested: u64, got: u64 },
    /// Body ended before the advertised total was reached.
    #[error("partial transfer: expected {expected} bytes, got {received}")]
    PartialTransfer { expected: u64, received: u64 },
    /// Local disk write failed (disk full, permission denied). Not retried.
    #[error("storage: {0}")]
    Storage(#[source] std::io::Error),
}
