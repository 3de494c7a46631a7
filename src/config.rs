use crate::fetcher::HttpFetcher;
use anyhow::{bail, Context, Result};
use reqwest::header::HeaderValue;
use slog::{o, Discard, Logger};
use std::time::Duration;

/// Default bound on connection establishment and on the gap between received bytes.
pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(4);

/// Default upper bound on the number of bytes requested by a single read.
pub const DEFAULT_CHUNK_SIZE: usize = 400_000;

/// Settings for an [`HttpFetcher`](crate::HttpFetcher).  These are fixed once the fetcher is
/// built.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Bounds the wait for each individual body read; a steady trickle of data never trips it,
    /// however long the whole transfer takes.  It also bounds the request phase, but there it
    /// applies as a single deadline covering connection establishment, any redirects, and the
    /// arrival of the complete response headers.
    pub socket_timeout: Duration,

    /// Maximum number of bytes requested per read, and so the maximum size of a yielded chunk.
    pub chunk_size: usize,

    /// Optional pause before each read, to pace the consumer's loop.
    pub sleep_before_round: Option<Duration>,

    /// The `product/version` prefix of the `User-Agent` header.
    pub user_agent_product: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            socket_timeout: DEFAULT_SOCKET_TIMEOUT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            sleep_before_round: None,
            user_agent_product: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"))
                .to_owned(),
        }
    }
}

impl FetcherConfig {
    /// The full `User-Agent` header value: this crate's product token followed by that of the
    /// HTTP library.
    pub(crate) fn user_agent(&self) -> String {
        format!("{} reqwest", self.user_agent_product)
    }

    fn validate(&self) -> Result<()> {
        if self.socket_timeout.is_zero() {
            bail!("socket_timeout must be non-zero");
        }
        if self.chunk_size == 0 {
            bail!("chunk_size must be at least one byte");
        }
        if self.user_agent_product.is_empty() {
            bail!("user_agent_product must not be empty");
        }
        HeaderValue::from_str(&self.user_agent())
            .context("user_agent_product is not a valid header value")?;
        Ok(())
    }
}

/// FetcherBuilder implements the builder pattern for building an [`HttpFetcher`].
#[derive(Clone)]
pub struct FetcherBuilder {
    config: FetcherConfig,
    logger: Logger,
}

impl Default for FetcherBuilder {
    fn default() -> Self {
        Self {
            config: FetcherConfig::default(),
            logger: Logger::root(Discard, o!()),
        }
    }
}

impl FetcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the socket timeout.  The default is 4 seconds.  See
    /// [`FetcherConfig::socket_timeout`] for how it applies before and after the headers arrive.
    pub fn socket_timeout(mut self, timeout: Duration) -> Self {
        self.config.socket_timeout = timeout;
        self
    }

    /// Set the maximum number of bytes read in one round.  The default is 400,000.
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.config.chunk_size = chunk_size;
        self
    }

    /// Sleep for the given duration before each read.  Disabled by default.
    pub fn sleep_before_round(mut self, pause: Duration) -> Self {
        self.config.sleep_before_round = Some(pause);
        self
    }

    /// Replace the `product/version` token at the front of the `User-Agent` header.
    pub fn user_agent_product<S: Into<String>>(mut self, product: S) -> Self {
        self.config.user_agent_product = product.into();
        self
    }

    /// Log to the given logger rather than discarding log output.
    pub fn logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Build the resulting fetcher, consuming the builder
    pub fn build(self) -> Result<HttpFetcher> {
        self.config.validate()?;
        Ok(HttpFetcher::new(self.config, self.logger))
    }
}

impl From<FetcherConfig> for FetcherBuilder {
    fn from(config: FetcherConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }
}
