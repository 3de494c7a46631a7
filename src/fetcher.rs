use crate::chunks::ChunkStream;
use crate::config::{FetcherBuilder, FetcherConfig};
use crate::download::{download_to_file, download_to_vec};
use crate::error::{map_reqwest_error, FetchError};
use crate::session::{Endpoint, Session, SessionPool};
use anyhow::Result;
use async_trait::async_trait;
use slog::{warn, Logger};
use std::sync::Arc;
use tokio::fs::File;
use tokio::time::timeout;

/// A Fetcher retrieves remote resources as bounded streams of chunks.
///
/// Implementations must perform no retries and must never yield more than `required_length`
/// bytes for a single fetch.  Retrying, mirror selection, and verification of the downloaded
/// bytes are the caller's business.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Open `url` and return a stream of its contents, limited to `required_length` bytes.
    ///
    /// Fails before any data is produced with [`FetchError::UrlParsing`] for a URL without a
    /// scheme or hostname, or [`FetchError::Http`] for a failure status.  The returned stream may
    /// fail later with [`FetchError::SlowRetrieval`].
    async fn fetch(&self, url: &str, required_length: u64) -> Result<ChunkStream, FetchError>;

    /// Download at most `max_length` bytes of `url` into memory.  Errors can be downcast to
    /// [`FetchError`].
    async fn download_bytes(&self, url: &str, max_length: u64) -> Result<Vec<u8>> {
        download_to_vec(self, url, max_length).await
    }

    /// Download at most `max_length` bytes of `url` into an anonymous temporary file, returned
    /// positioned at its start.  The file is removed when closed.
    async fn download_file(&self, url: &str, max_length: u64) -> Result<File> {
        let file = File::from_std(tempfile::tempfile()?);
        download_to_file(self, url, max_length, file).await
    }
}

/// The HTTP(S) [`Fetcher`].
///
/// Each (scheme, hostname) pair gets its own [`Session`], created on first use and kept for the
/// life of the fetcher, so connections are reused per endpoint but never shared across
/// endpoints.  Sessions are safe to use from concurrent fetches.
pub struct HttpFetcher {
    config: FetcherConfig,
    logger: Logger,
    sessions: SessionPool,
}

impl HttpFetcher {
    /// Create a new fetcher (public interface is via
    /// [`FetcherBuilder::build`](crate::FetcherBuilder::build))
    pub(crate) fn new(config: FetcherConfig, logger: Logger) -> Self {
        let sessions = SessionPool::new(config.clone(), logger.clone());
        Self {
            config,
            logger,
            sessions,
        }
    }

    pub fn builder() -> FetcherBuilder {
        FetcherBuilder::new()
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// The session that fetches of `url` use.  If no session exists for the URL's endpoint yet,
    /// one is created and added to the pool, just as a fetch would.
    pub fn session_for(&self, url: &str) -> Result<Arc<Session>, FetchError> {
        let (_, endpoint) = Endpoint::parse(url)?;
        self.sessions.get_or_create(&endpoint)
    }

    /// Number of distinct endpoints contacted so far.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, required_length: u64) -> Result<ChunkStream, FetchError> {
        let (parsed, endpoint) = Endpoint::parse(url)?;
        let session = self.sessions.get_or_create(&endpoint)?;
        let socket_timeout = self.config.socket_timeout;

        // one deadline for connect, redirects and headers; the body is read as the caller pulls
        // chunks, with the timeout applied per read
        let response = match timeout(socket_timeout, session.client().get(parsed).send()).await {
            Ok(res) => res.map_err(map_reqwest_error)?,
            Err(_) => {
                warn!(self.logger, "No response from {} within {:?}", url, socket_timeout);
                return Err(FetchError::slow_retrieval(url, socket_timeout));
            }
        };

        // a failed response is dropped here, closing its connection
        let response = response.error_for_status().map_err(|err| {
            let err = map_reqwest_error(err);
            warn!(self.logger, "Fetch of {} failed: {}", url, err);
            err
        })?;

        Ok(ChunkStream::from_response(
            url,
            response,
            required_length,
            &self.config,
            session.logger.clone(),
        ))
    }
}
