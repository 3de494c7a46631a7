/*! A bounded, defensive HTTP(S) fetcher for update clients.

This crate retrieves remote files whose expected maximum length is known in advance, such as the
metadata and target files of a software-update repository.  It guards against two kinds of
misbehaving server:

* one that sends more data than expected, by never reading more than the required length; and
* one that sends data very slowly or not at all (a slow-retrieval attack), by failing any single
  read that makes no progress within the socket timeout.

It does not retry, cache, or verify anything.  Choosing mirrors, retrying, and checking hashes or
signatures over the downloaded bytes are left to the caller.

## Fetching

Build an [`HttpFetcher`] with [`FetcherBuilder`], then call [`Fetcher::fetch`] to get a
[`ChunkStream`].  Chunks are read from the network only as they are requested, either with
[`ChunkStream::next_chunk`] or through [`ChunkStream::into_stream`].  Dropping the stream at any
point closes the connection.

Connections are pooled per (scheme, hostname) endpoint: every endpoint gets its own
[`Session`], kept for the life of the fetcher, and no state is shared between endpoints.

## Convenience Functions

Most uses of this crate can utilize one of the following convenience functions:

* [download_to_buf] -- download data to a fixed-size buffer;
* [download_to_vec] -- download data to a dynamically allocated buffer;
* [download_to_file] -- download data to a [tokio::fs::File]; or
* [download_to_writer] -- download data to any [tokio::io::AsyncWrite].

These return [`anyhow::Error`], which can be downcast to [`FetchError`] for failures of the fetch
itself.

## Errors

[`Fetcher::fetch`] fails with [`FetchError::UrlParsing`] for a URL lacking a scheme or hostname,
and with [`FetchError::Http`] for a failure status.  A stream fails mid-way with
[`FetchError::SlowRetrieval`] when the server stalls.  In every case the connection has been
closed by the time the error is returned.
 */
mod chunks;
mod config;
mod download;
mod error;
mod fetcher;
mod session;

#[cfg(test)]
mod test_helpers;

pub use chunks::ChunkStream;
pub use config::{FetcherBuilder, FetcherConfig, DEFAULT_CHUNK_SIZE, DEFAULT_SOCKET_TIMEOUT};
pub use download::{download_to_buf, download_to_file, download_to_vec, download_to_writer};
pub use error::FetchError;
pub use fetcher::{Fetcher, HttpFetcher};
pub use session::{Endpoint, Session};
