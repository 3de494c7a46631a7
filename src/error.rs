use reqwest::StatusCode;
use thiserror::Error;

/// The failures surfaced by a fetch.  Every variant is raised with the underlying connection
/// already closed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URL has no scheme or no hostname.  Raised before any network activity.
    #[error("Could not get scheme and hostname from URL: {url}")]
    UrlParsing { url: String },

    /// The server answered with a failure status.  No data was yielded.
    #[error("{message}")]
    Http { status: StatusCode, message: String },

    /// The server stopped sending data for longer than the socket timeout.  Some chunks may
    /// already have been yielded.
    #[error("slow retrieval: {message}")]
    SlowRetrieval { message: String },

    /// A transport failure outside the categories above (refused connection, TLS, reset).
    #[error(transparent)]
    Network(#[from] reqwest::Error),

    /// An I/O failure while reading the response body.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// The HTTP status code, if this error was caused by a failure response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            FetchError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether an outer retry layer could reasonably try this request again (possibly against
    /// another mirror).  This crate never retries on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::UrlParsing { .. } => false,
            FetchError::Http { status, .. } => !status.is_client_error(),
            FetchError::SlowRetrieval { .. } | FetchError::Network(_) | FetchError::Io(_) => true,
        }
    }

    pub(crate) fn url_parsing(url: &str) -> Self {
        FetchError::UrlParsing {
            url: url.to_owned(),
        }
    }

    pub(crate) fn slow_retrieval(url: &str, timeout: std::time::Duration) -> Self {
        FetchError::SlowRetrieval {
            message: format!("no data received from {} within {:?}", url, timeout),
        }
    }
}

/// Translate an error from reqwest into the fetch taxonomy.  Status errors carry their code,
/// timeouts are slow retrievals, and anything else is passed through as a network error.
pub(crate) fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if let Some(status) = err.status() {
        return FetchError::Http {
            status,
            message: err.to_string(),
        };
    }
    if err.is_timeout() {
        return FetchError::SlowRetrieval {
            message: err.to_string(),
        };
    }
    FetchError::Network(err)
}

/// Translate an I/O error raised while reading a body.  The body reader wraps reqwest errors in
/// `std::io::Error`, so unwrap those first.
pub(crate) fn map_io_error(err: std::io::Error) -> FetchError {
    if err.kind() == std::io::ErrorKind::TimedOut {
        return FetchError::SlowRetrieval {
            message: err.to_string(),
        };
    }
    match err.downcast::<reqwest::Error>() {
        Ok(reqerr) => map_reqwest_error(reqerr),
        Err(err) => FetchError::Io(err),
    }
}

/// True if this read error means the server closed the connection before sending the whole
/// body (hyper reports `IncompleteBody` as an `UnexpectedEof` I/O error, wrapped in reqwest and
/// hyper errors).
pub(crate) fn is_truncated_body(err: &std::io::Error) -> bool {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        return true;
    }
    let mut source = err
        .get_ref()
        .map(|inner| inner as &(dyn std::error::Error + 'static));
    while let Some(cause) = source {
        if let Some(ioerr) = cause.downcast_ref::<std::io::Error>() {
            if ioerr.kind() == std::io::ErrorKind::UnexpectedEof {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

#[cfg(test)]
mod test {
    use super::*;
    use httptest::{matchers::*, responders::*, Expectation, Server};
    use std::io;
    use std::time::Duration;

    #[tokio::test]
    async fn status_error_maps_to_http() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/")).respond_with(status_code(418)),
        );
        let err = reqwest::Client::new()
            .get(server.url_str("/"))
            .send()
            .await
            .unwrap()
            .error_for_status()
            .err()
            .unwrap();
        let err = map_reqwest_error(err);
        assert_eq!(err.status(), Some(StatusCode::IM_A_TEAPOT));
        assert!(!err.is_retryable());
    }

    #[test]
    fn timed_out_io_is_slow_retrieval() {
        let err = map_io_error(io::Error::new(io::ErrorKind::TimedOut, "stalled"));
        assert!(matches!(err, FetchError::SlowRetrieval { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn other_io_passes_through() {
        let err = map_io_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(matches!(err, FetchError::Io(_)));
        assert_eq!(err.status(), None);
    }

    #[test]
    fn truncated_body_detected_through_wrappers() {
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "IncompleteBody");
        let wrapped = io::Error::new(io::ErrorKind::Other, eof);
        assert!(is_truncated_body(&wrapped));
        assert!(is_truncated_body(&io::Error::from(io::ErrorKind::UnexpectedEof)));
        assert!(!is_truncated_body(&io::Error::from(io::ErrorKind::ConnectionReset)));
    }

    #[test]
    fn url_parsing_message_names_url() {
        let err = FetchError::url_parsing("not-a-url");
        assert_eq!(
            err.to_string(),
            "Could not get scheme and hostname from URL: not-a-url"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn slow_retrieval_message() {
        let err = FetchError::slow_retrieval("http://example.com/x", Duration::from_secs(4));
        assert_eq!(
            err.to_string(),
            "slow retrieval: no data received from http://example.com/x within 4s"
        );
    }
}
