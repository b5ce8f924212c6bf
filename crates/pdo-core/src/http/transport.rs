//! Chunked stream transport: POST `{base}/stream/{subject}` with a JSON payload.
//!
//! The transfer runs on a blocking thread. Once the response headers are
//! in, `open` resolves: 2xx hands back a reader fed by the write callback,
//! anything else fails establishment with the status. Cancelling the
//! reader sets an abort flag that the write and progress callbacks check.

use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use url::Url;

use super::Endpoint;
use crate::error::TransportError;
use crate::stream::{ChunkReader, StreamTransport};

/// Body chunks buffered between the curl thread and the reader.
const CHUNK_QUEUE: usize = 64;

type ChunkResult = Result<Bytes, TransportError>;

#[derive(Debug, Clone)]
pub struct CurlTransport {
    endpoint: Endpoint,
    connect_timeout: Duration,
}

impl CurlTransport {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl StreamTransport for CurlTransport {
    async fn open(
        &self,
        subject: &str,
        payload: &serde_json::Value,
    ) -> Result<Box<dyn ChunkReader>, TransportError> {
        let url = self.endpoint.url_for(&["stream", subject]);
        let body = serde_json::to_vec(payload)
            .map_err(|e| TransportError::Request(format!("encode payload: {}", e)))?;

        let (ready_tx, ready_rx) = oneshot::channel();
        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_QUEUE);
        let abort = Arc::new(AtomicBool::new(false));
        let transfer = Transfer {
            url,
            body,
            connect_timeout: self.connect_timeout,
            abort: Arc::clone(&abort),
        };
        tokio::task::spawn_blocking(move || transfer.run(ready_tx, chunk_tx));

        match ready_rx.await {
            Ok(Ok(())) => Ok(Box::new(CurlChunkReader { rx: chunk_rx, abort })),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TransportError::Connect(
                "transfer ended before a response".into(),
            )),
        }
    }
}

struct CurlChunkReader {
    rx: mpsc::Receiver<ChunkResult>,
    abort: Arc<AtomicBool>,
}

#[async_trait]
impl ChunkReader for CurlChunkReader {
    async fn read_chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        match self.rx.recv().await {
            Some(Ok(bytes)) => Ok(Some(bytes)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    fn cancel(&mut self) {
        self.abort.store(true, Ordering::Relaxed);
        self.rx.close();
    }
}

impl Drop for CurlChunkReader {
    fn drop(&mut self) {
        self.abort.store(true, Ordering::Relaxed);
    }
}

struct Transfer {
    url: Url,
    body: Vec<u8>,
    connect_timeout: Duration,
    abort: Arc<AtomicBool>,
}

impl Transfer {
    /// Blocking: perform the request, report establishment on `ready`, stream the body to `chunks`.
    fn run(self, ready: oneshot::Sender<Result<(), TransportError>>, chunks: mpsc::Sender<ChunkResult>) {
        let ready = RefCell::new(Some(ready));
        let signal = |result: Result<(), TransportError>| {
            if let Some(tx) = ready.borrow_mut().take() {
                let _ = tx.send(result);
            }
        };

        let mut easy = curl::easy::Easy::new();
        if let Err(e) = self.configure(&mut easy) {
            signal(Err(TransportError::Curl(e)));
            return;
        }

        let status = Cell::new(0u32);
        let rejected = Cell::new(false);
        let abort = &self.abort;

        let performed = {
            let mut transfer = easy.transfer();
            let setup = transfer
                .header_function(|line| {
                    let line = String::from_utf8_lossy(line);
                    if line.starts_with("HTTP/") {
                        let code = line
                            .split_whitespace()
                            .nth(1)
                            .and_then(|c| c.parse().ok())
                            .unwrap_or(0);
                        status.set(code);
                    } else if line.trim().is_empty() {
                        // End of one header block; 1xx blocks precede the real response.
                        match status.get() {
                            100..=199 => {}
                            200..=299 => signal(Ok(())),
                            code => {
                                rejected.set(true);
                                signal(Err(TransportError::Http(code)));
                            }
                        }
                    }
                    true
                })
                .and_then(|_| {
                    transfer.write_function(|data| {
                        if rejected.get() || abort.load(Ordering::Relaxed) {
                            return Ok(0);
                        }
                        match chunks.blocking_send(Ok(Bytes::copy_from_slice(data))) {
                            Ok(()) => Ok(data.len()),
                            Err(_) => Ok(0),
                        }
                    })
                })
                .and_then(|_| transfer.progress_function(|_, _, _, _| !abort.load(Ordering::Relaxed)));
            match setup {
                Ok(()) => transfer.perform(),
                Err(e) => Err(e),
            }
        };

        let unsignalled = ready.borrow().is_some();
        match performed {
            Ok(()) if unsignalled => {
                // Completed without a usable header block.
                signal(Err(TransportError::Connect(format!(
                    "no response status (last {})",
                    status.get()
                ))));
            }
            Ok(()) => {}
            Err(e) if unsignalled => signal(Err(TransportError::Curl(e))),
            Err(_) if rejected.get() || abort.load(Ordering::Relaxed) => {}
            Err(e) => {
                tracing::debug!(url = %self.url, "stream transfer failed: {}", e);
                let _ = chunks.blocking_send(Err(TransportError::Read(e.to_string())));
            }
        }
    }

    fn configure(&self, easy: &mut curl::easy::Easy) -> Result<(), curl::Error> {
        easy.url(self.url.as_str())?;
        easy.post(true)?;
        easy.post_fields_copy(&self.body)?;
        easy.connect_timeout(self.connect_timeout)?;
        easy.progress(true)?;
        let mut list = curl::easy::List::new();
        list.append("Content-Type: application/json")?;
        list.append("Accept: text/event-stream")?;
        list.append("Expect:")?;
        easy.http_headers(list)?;
        Ok(())
    }
}
