use crate::config::FetcherConfig;
use crate::error::{is_truncated_body, map_io_error, FetchError};
use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use slog::{debug, warn, Logger};
use std::cmp::min;
use std::fmt;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;
use tokio_util::io::StreamReader;

type Body = Pin<Box<dyn AsyncRead + Send>>;

/// A single-pass sequence of chunks read from one open response body.
///
/// The total size of all chunks never exceeds the required length given to
/// [`Fetcher::fetch`](crate::Fetcher::fetch).  Each round reads at most `chunk_size` bytes, and
/// every individual read must make progress within the socket timeout or the stream fails with
/// [`FetchError::SlowRetrieval`].
///
/// The underlying connection is released exactly once: when the required length is reached,
/// when the server closes the body, when an error occurs, or when the stream is dropped.  A
/// finished stream yields no further chunks.
pub struct ChunkStream {
    url: String,
    body: Option<Body>,
    bytes_received: u64,
    required_length: u64,
    chunk_size: usize,
    socket_timeout: Duration,
    sleep_before_round: Option<Duration>,
    logger: Logger,
}

impl ChunkStream {
    /// Build a stream over any body reader.  [`HttpFetcher`](crate::HttpFetcher) uses this for
    /// response bodies; other [`Fetcher`](crate::Fetcher) implementations can use it to get the
    /// same bounds over a different transport.
    pub fn new<R: AsyncRead + Send + 'static>(
        url: &str,
        body: R,
        required_length: u64,
        config: &FetcherConfig,
        logger: Logger,
    ) -> Self {
        Self {
            url: url.to_owned(),
            body: Some(Box::pin(body)),
            bytes_received: 0,
            required_length,
            chunk_size: config.chunk_size,
            socket_timeout: config.socket_timeout,
            sleep_before_round: config.sleep_before_round,
            logger,
        }
    }

    /// Wrap the body of a successful response.  Nothing is read until the first call to
    /// [`next_chunk`](Self::next_chunk).
    pub(crate) fn from_response(
        url: &str,
        response: reqwest::Response,
        required_length: u64,
        config: &FetcherConfig,
        logger: Logger,
    ) -> Self {
        let body = response
            .bytes_stream()
            // convert the Result::Err type to std::io::Error
            .map(|r| r.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)));
        Self::new(url, StreamReader::new(body), required_length, config, logger)
    }

    /// Number of bytes yielded so far.
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub fn required_length(&self) -> u64 {
        self.required_length
    }

    /// True once the connection has been released; no further chunks will be produced.
    pub fn is_finished(&self) -> bool {
        self.body.is_none()
    }

    /// Read the next chunk.  Returns `Ok(None)` when the required length has been reached or the
    /// server has closed the body, whichever comes first.  An early close is not an error here;
    /// judging a short download is up to the caller.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, FetchError> {
        if self.body.is_none() {
            return Ok(None);
        }
        if self.bytes_received >= self.required_length {
            self.finish();
            return Ok(None);
        }

        if let Some(pause) = self.sleep_before_round {
            tokio::time::sleep(pause).await;
        }

        let read_amount = min(
            self.chunk_size as u64,
            self.required_length - self.bytes_received,
        ) as usize;
        let mut buf = vec![0u8; read_amount];

        let (filled, eof) = match self.fill(&mut buf).await {
            Ok(res) => res,
            Err(err) => {
                warn!(self.logger, "Download of {} failed: {}", self.url, err;
                      "bytes_received" => self.bytes_received);
                self.release();
                return Err(err);
            }
        };

        if filled == 0 {
            self.finish();
            return Ok(None);
        }

        buf.truncate(filled);
        self.bytes_received += filled as u64;
        // never read past the required length, even if the server has more to send
        if eof || self.bytes_received >= self.required_length {
            self.finish();
        }
        Ok(Some(Bytes::from(buf)))
    }

    /// Convert into a [`Stream`] of chunks.  The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, FetchError>> + Send {
        stream::try_unfold(self, |mut chunks| async move {
            let next = chunks.next_chunk().await?;
            Ok::<_, FetchError>(next.map(|chunk| (chunk, chunks)))
        })
    }

    /// Read into `buf` until it is full or the body ends, applying the socket timeout to each
    /// individual read.  Returns the number of bytes read and whether the body has ended.  A body
    /// cut short of its `Content-Length` counts as ended, not as a failure.
    async fn fill(&mut self, buf: &mut [u8]) -> Result<(usize, bool), FetchError> {
        let body = match self.body.as_mut() {
            Some(body) => body,
            None => return Ok((0, true)),
        };
        let mut filled = 0;
        while filled < buf.len() {
            let n = match timeout(self.socket_timeout, body.read(&mut buf[filled..])).await {
                Ok(Ok(n)) => n,
                Ok(Err(err)) if is_truncated_body(&err) => {
                    debug!(self.logger, "Server closed {} early: {}", self.url, err);
                    return Ok((filled, true));
                }
                Ok(Err(err)) => return Err(map_io_error(err)),
                Err(_) => return Err(FetchError::slow_retrieval(&self.url, self.socket_timeout)),
            };
            if n == 0 {
                return Ok((filled, true));
            }
            filled += n;
        }
        Ok((filled, false))
    }

    fn finish(&mut self) {
        if self.body.is_some() {
            debug!(
                self.logger,
                "Downloaded {} out of {} bytes", self.bytes_received, self.required_length
            );
        }
        self.release();
    }

    fn release(&mut self) {
        if let Some(body) = self.body.take() {
            drop(body);
            debug!(self.logger, "Closed connection for {}", self.url);
        }
    }
}

impl fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkStream")
            .field("url", &self.url)
            .field("bytes_received", &self.bytes_received)
            .field("required_length", &self.required_length)
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl Drop for ChunkStream {
    fn drop(&mut self) {
        self.release();
    }
}
