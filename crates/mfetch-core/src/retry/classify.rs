//! Classify HTTP status and curl errors into retry policy error kinds.

use super::error::AttemptError;
use super::policy::ErrorKind;

/// Classify an HTTP status code for retry decisions.
pub fn classify_http_status(code: u32) -> ErrorKind {
    match code {
        408 | 429 => ErrorKind::Throttled,
        500..=599 => ErrorKind::Http5xx(code as u16),
        _ => ErrorKind::Permanent,
    }
}

/// Classify a curl error for retry decisions.
pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    if e.is_operation_timedout() {
        return ErrorKind::Timeout;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_partial_file()
    {
        return ErrorKind::Connection;
    }
    ErrorKind::Permanent
}

/// Classify an attempt error into an ErrorKind.
pub fn classify(e: &AttemptError) -> ErrorKind {
    match e {
        AttemptError::Curl(ce) => classify_curl_error(ce),
        AttemptError::Http(code) => classify_http_status(*code),
        AttemptError::RangeNotSatisfiable { .. } | AttemptError::PartialTransfer { .. } => {
            ErrorKind::Connection
        }
        AttemptError::RangeMismatch { .. } => ErrorKind::Permanent,
        AttemptError::Storage(_) => ErrorKind::Local,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_429_throttled() {
        assert_eq!(classify_http_status(429), ErrorKind::Throttled);
    }

    #[test]
    fn http_5xx_retryable() {
        assert!(matches!(classify_http_status(500), ErrorKind::Http5xx(500)));
        assert!(matches!(classify_http_status(503), ErrorKind::Http5xx(503)));
        assert!(classify_http_status(502).is_transient());
    }

    #[test]
    fn http_4xx_permanent() {
        assert_eq!(classify_http_status(404), ErrorKind::Permanent);
        assert_eq!(classify_http_status(403), ErrorKind::Permanent);
        assert!(!classify_http_status(401).is_transient());
    }

    #[test]
    fn attempt_errors() {
        assert_eq!(
            classify(&AttemptError::PartialTransfer { expected: 10, received: 3 }),
            ErrorKind::Connection
        );
        assert_eq!(
            classify(&AttemptError::RangeMismatch { requested: 10, got: 0 }),
            ErrorKind::Permanent
        );
        assert_eq!(
            classify(&AttemptError::Storage(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full"
            ))),
            ErrorKind::Local
        );
    }
}
