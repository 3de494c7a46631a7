use crate::config::FetcherConfig;
use crate::error::FetchError;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, USER_AGENT};
use reqwest::Url;
use slog::{debug, o, Logger};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::{Arc, Mutex};

/// A (scheme, hostname) pair.  Connections and any per-connection state are never shared
/// between different endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    scheme: String,
    hostname: String,
}

impl Endpoint {
    pub fn new<S: Into<String>, H: Into<String>>(scheme: S, hostname: H) -> Self {
        Self {
            scheme: scheme.into(),
            hostname: hostname.into(),
        }
    }

    /// Parse a URL and determine its endpoint.  Fails with [`FetchError::UrlParsing`] if the URL
    /// does not parse or lacks a scheme or hostname.
    pub fn parse(url: &str) -> Result<(Url, Self), FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::url_parsing(url))?;
        let hostname = match parsed.host_str() {
            Some(h) if !h.is_empty() => h.to_owned(),
            _ => return Err(FetchError::url_parsing(url)),
        };
        let endpoint = Self::new(parsed.scheme(), hostname);
        Ok((parsed, endpoint))
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// The pool key, `scheme+hostname`.
    pub fn key(&self) -> String {
        format!("{}+{}", self.scheme, self.hostname)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// A connection-pooled HTTP client dedicated to one endpoint, with the fetcher's fixed headers.
pub struct Session {
    endpoint: Endpoint,
    headers: HeaderMap,
    client: reqwest::Client,
    pub(crate) logger: Logger,
}

impl Session {
    fn new(
        endpoint: Endpoint,
        config: &FetcherConfig,
        logger: &Logger,
    ) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        // byte accounting must see the body exactly as sent
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        let user_agent = HeaderValue::from_str(&config.user_agent())
            .map_err(|e| FetchError::Io(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
        headers.insert(USER_AGENT, user_agent);

        let client = reqwest::Client::builder()
            .default_headers(headers.clone())
            .no_gzip()
            .connect_timeout(config.socket_timeout)
            .build()?;

        let logger = logger.new(o!("endpoint" => endpoint.key()));
        Ok(Self {
            endpoint,
            headers,
            client,
            logger,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The headers attached to every request made through this session.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint)
            .field("headers", &self.headers)
            .finish()
    }
}

/// A SessionPool maps each endpoint to its own [`Session`], creating sessions on first use.
/// Sessions live as long as the pool; there is no eviction.
pub(crate) struct SessionPool {
    config: FetcherConfig,
    logger: Logger,
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionPool {
    pub(crate) fn new(config: FetcherConfig, logger: Logger) -> Self {
        Self {
            config,
            logger,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Get the session for this endpoint, creating it if this endpoint has not been seen before.
    pub(crate) fn get_or_create(&self, endpoint: &Endpoint) -> Result<Arc<Session>, FetchError> {
        let key = endpoint.key();
        let mut sessions = self.sessions.lock().unwrap();

        if let Some(session) = sessions.get(&key) {
            debug!(self.logger, "Reusing session {}", key);
            return Ok(session.clone());
        }

        let session = Arc::new(Session::new(endpoint.clone(), &self.config, &self.logger)?);
        sessions.insert(key.clone(), session.clone());
        debug!(self.logger, "Made new session {}", key);
        Ok(session)
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}
