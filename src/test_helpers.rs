//! Utilities for testing fetches
use slog::{o, Drain, Logger};
use std::cmp::min;
use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWriteExt, ReadBuf};
use tokio::net::TcpListener;
use tokio::time::Sleep;

/// Create a Logger for use in tests
pub(crate) fn test_logger() -> Logger {
    let decorator = slog_term::PlainSyncDecorator::new(slog_term::TestStdoutWriter);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();

    Logger::root(drain, o!())
}

/// One scripted behaviour of a [`FakeBody`].
pub(crate) enum Step {
    /// Make these bytes available, across as many reads as the reader needs.
    Data(Vec<u8>),
    /// Wait this long before continuing with the next step.
    Delay(Duration),
    /// Never produce anything again.
    Stall,
    /// Fail the next read.
    Fail(io::ErrorKind),
}

/// Observes a [`FakeBody`] after it has been moved into a stream.
#[derive(Clone, Default)]
pub(crate) struct BodyProbe {
    reads: Arc<AtomicUsize>,
    drops: Arc<AtomicUsize>,
    unread: Arc<AtomicUsize>,
}

impl BodyProbe {
    /// Number of times the body was polled for data.
    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of times the body was dropped, i.e., the connection released.
    pub(crate) fn drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }

    /// Bytes still waiting to be read when the body was dropped.
    pub(crate) fn unread(&self) -> usize {
        self.unread.load(Ordering::SeqCst)
    }
}

/// A response body that follows a script of [`Step`]s, ending in EOF.
pub(crate) struct FakeBody {
    steps: VecDeque<Step>,
    sleep: Option<Pin<Box<Sleep>>>,
    probe: BodyProbe,
}

impl FakeBody {
    pub(crate) fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
            sleep: None,
            probe: BodyProbe::default(),
        }
    }

    pub(crate) fn probe(&self) -> BodyProbe {
        self.probe.clone()
    }
}

impl AsyncRead for FakeBody {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.probe.reads.fetch_add(1, Ordering::SeqCst);
        loop {
            match this.steps.front_mut() {
                None => return Poll::Ready(Ok(())),
                Some(Step::Stall) => return Poll::Pending,
                Some(Step::Delay(delay)) => {
                    let delay = *delay;
                    let sleep = this
                        .sleep
                        .get_or_insert_with(|| Box::pin(tokio::time::sleep(delay)));
                    ready!(sleep.as_mut().poll(cx));
                    this.sleep = None;
                    this.steps.pop_front();
                }
                Some(Step::Fail(kind)) => {
                    let kind = *kind;
                    this.steps.pop_front();
                    return Poll::Ready(Err(io::Error::new(kind, "injected failure")));
                }
                Some(Step::Data(data)) => {
                    let n = min(buf.remaining(), data.len());
                    buf.put_slice(&data[..n]);
                    data.drain(..n);
                    if data.is_empty() {
                        this.steps.pop_front();
                    }
                    return Poll::Ready(Ok(()));
                }
            }
        }
    }
}

impl Drop for FakeBody {
    fn drop(&mut self) {
        let unread = self
            .steps
            .iter()
            .map(|step| match step {
                Step::Data(data) => data.len(),
                _ => 0,
            })
            .sum();
        self.probe.unread.store(unread, Ordering::SeqCst);
        self.probe.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// A bare-bones HTTP server that answers a single request with a 200 response announcing
/// `content_length` bytes, sends `sent` of them, and then holds the connection open without
/// sending anything more until `hold` has passed.  Returns the URL to fetch.
pub(crate) async fn stalling_server(
    content_length: usize,
    sent: &'static [u8],
    hold: Duration,
) -> String {
    partial_body_server(content_length, sent, Some(hold)).await
}

/// Like [`stalling_server`], but closes the connection right after sending `sent`, leaving the
/// body shorter than its `Content-Length`.
pub(crate) async fn truncating_server(content_length: usize, sent: &'static [u8]) -> String {
    partial_body_server(content_length, sent, None).await
}

async fn partial_body_server(
    content_length: usize,
    sent: &'static [u8],
    hold: Option<Duration>,
) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        // the request is small; read enough of it that the client is not blocked writing
        let mut req = [0u8; 4096];
        let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut req).await;
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\n\r\n",
            content_length
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(sent).await.unwrap();
        socket.flush().await.unwrap();
        match hold {
            Some(hold) => tokio::time::sleep(hold).await,
            None => {
                let _ = socket.shutdown().await;
            }
        }
    });
    format!("http://{}/data", addr)
}
