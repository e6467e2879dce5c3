//! HTTP transport backed by reqwest
//!
//! File parts are streamed rather than buffered: path sources are read from
//! disk chunk by chunk while the body is being written, memory sources are
//! sliced without copying. Every chunk pulled by the HTTP client is counted
//! and reported as a `Progress` event.

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use super::{
    transfer_channel, MultipartField, ResponseBody, TransferHandle, TransferRequest,
    TransferSender, TransportAdapter, TransportError,
};
use crate::config::ResponseType;
use crate::validation::FileSource;

/// Default size of the chunks a part is streamed in
const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

type ChunkStream = BoxStream<'static, std::io::Result<Bytes>>;

/// [`TransportAdapter`] that performs real multipart uploads
///
/// Requires a running tokio runtime; the request runs on a spawned task.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    chunk_size: usize,
}

impl ReqwestTransport {
    /// Creates a transport with a default client
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, TransportError> {
        Ok(Self::with_client(Client::builder().build()?))
    }

    /// Creates a transport whose requests give up after `timeout`
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self::with_client(Client::builder().timeout(timeout).build()?))
    }

    /// Wraps an existing client
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self {
            client,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Sets the streaming chunk size; smaller chunks mean finer progress
    #[must_use]
    pub const fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = if chunk_size == 0 { 1 } else { chunk_size };
        self
    }

    fn build(
        &self,
        request: &TransferRequest,
        progress: &ProgressCounter,
    ) -> Result<reqwest::Request, TransportError> {
        let mut form = Form::new();
        for field in &request.fields {
            form = form.part(field.field_name.clone(), self.part(field, progress)?);
        }

        let mut builder = self
            .client
            .request(request.method.into(), request.url.clone())
            .query(&request.query_pairs());
        for (name, value) in request.header_pairs() {
            builder = builder.header(name, value);
        }

        Ok(builder.multipart(form).build()?)
    }

    fn part(
        &self,
        field: &MultipartField,
        progress: &ProgressCounter,
    ) -> Result<Part, TransportError> {
        let chunks = match &field.source {
            FileSource::Memory(data) => memory_chunks(data.clone(), self.chunk_size),
            FileSource::Path(path) => {
                let chunk_size = self.chunk_size;
                stream::once(tokio::fs::File::open(path.clone()))
                    .map_ok(move |file| ReaderStream::with_capacity(file, chunk_size))
                    .try_flatten()
                    .boxed()
            }
        };

        let counter = progress.clone();
        let counted = chunks.inspect_ok(move |chunk| counter.advance(chunk.len()));

        Part::stream_with_length(Body::wrap_stream(counted), field.size_bytes)
            .file_name(field.file_name.clone())
            .mime_str(&field.content_type)
            .map_err(|e| {
                TransportError::InvalidRequest(format!(
                    "content type {:?} of {}: {e}",
                    field.content_type, field.file_name
                ))
            })
    }
}

impl TransportAdapter for ReqwestTransport {
    fn send(&self, request: TransferRequest) -> Result<TransferHandle, TransportError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::Runtime(e.to_string()))?;

        let (sender, handle) = transfer_channel();
        let progress = ProgressCounter::new(sender.clone(), request.total_bytes());
        let http_request = self.build(&request, &progress)?;

        debug!(
            method = %request.method,
            url = %request.url,
            files = request.fields.len(),
            total_bytes = request.total_bytes(),
            "Starting upload"
        );

        let client = self.client.clone();
        let response_type = request.response_type;
        runtime.spawn(async move {
            let token = sender.token().clone();
            let finished = token
                .run_until_cancelled(execute(client, http_request, response_type, &sender))
                .await;
            if finished.is_none() {
                debug!("Upload request dropped after cancellation");
            }
        });

        Ok(handle)
    }
}

async fn execute(
    client: Client,
    request: reqwest::Request,
    response_type: Option<ResponseType>,
    sender: &TransferSender,
) {
    let response = match client.execute(request).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "Upload request failed");
            let _ = sender.error(e.to_string());
            return;
        }
    };

    let status_code = response.status().as_u16();
    let raw = match response.bytes().await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(status_code, error = %e, "Failed to read upload response");
            let _ = sender.error(format!("failed to read response body: {e}"));
            return;
        }
    };

    match ResponseBody::decode(raw, response_type) {
        Ok(body) => {
            debug!(status_code, "Upload response received");
            let _ = sender.complete(status_code, body);
        }
        Err(detail) => {
            warn!(status_code, %detail, "Upload response could not be decoded");
            let _ = sender.error(detail);
        }
    }
}

fn memory_chunks(data: Bytes, chunk_size: usize) -> ChunkStream {
    let chunks: Vec<std::io::Result<Bytes>> = (0..data.len())
        .step_by(chunk_size)
        .map(|start| Ok(data.slice(start..data.len().min(start + chunk_size))))
        .collect();
    stream::iter(chunks).boxed()
}

/// Running byte count shared by every part of one request
#[derive(Debug, Clone)]
struct ProgressCounter {
    sent: Arc<AtomicU64>,
    total: u64,
    sender: TransferSender,
}

impl ProgressCounter {
    fn new(sender: TransferSender, total: u64) -> Self {
        Self {
            sent: Arc::new(AtomicU64::new(0)),
            total,
            sender,
        }
    }

    fn advance(&self, bytes: usize) {
        let bytes = bytes as u64;
        let loaded = self.sent.fetch_add(bytes, Ordering::Relaxed) + bytes;
        let _ = self.sender.progress(loaded, self.total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransferEvent;

    #[tokio::test]
    async fn test_memory_chunks_cover_data() {
        let data = Bytes::from_static(b"abcdefghij");
        let chunks: Vec<Bytes> = memory_chunks(data, 4).try_collect().await.unwrap();
        assert_eq!(
            chunks,
            vec![
                Bytes::from_static(b"abcd"),
                Bytes::from_static(b"efgh"),
                Bytes::from_static(b"ij"),
            ]
        );
    }

    #[tokio::test]
    async fn test_memory_chunks_empty() {
        let chunks: Vec<Bytes> = memory_chunks(Bytes::new(), 4).try_collect().await.unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn test_progress_counter_accumulates() {
        let (sender, mut handle) = transfer_channel();
        let counter = ProgressCounter::new(sender, 10);
        counter.advance(4);
        counter.clone().advance(6);

        assert_eq!(
            handle.next_event().await,
            Some(TransferEvent::Progress { loaded: 4, total: 10 })
        );
        assert_eq!(
            handle.next_event().await,
            Some(TransferEvent::Progress { loaded: 10, total: 10 })
        );
    }

    #[test]
    fn test_send_without_runtime_fails() {
        let transport = ReqwestTransport::new().unwrap();
        let request = TransferRequest {
            url: reqwest::Url::parse("http://127.0.0.1:9/upload").unwrap(),
            method: crate::config::HttpMethod::Post,
            headers: std::collections::BTreeMap::new(),
            query_params: std::collections::BTreeMap::new(),
            fields: vec![],
            response_type: None,
        };
        assert!(matches!(
            transport.send(request),
            Err(TransportError::Runtime(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_content_type_is_rejected_before_sending() {
        let transport = ReqwestTransport::new().unwrap();
        let request = TransferRequest {
            url: reqwest::Url::parse("http://127.0.0.1:9/upload").unwrap(),
            method: crate::config::HttpMethod::Post,
            headers: std::collections::BTreeMap::new(),
            query_params: std::collections::BTreeMap::new(),
            fields: vec![MultipartField {
                field_name: "file0".into(),
                file_name: "a.txt".into(),
                content_type: "not a mime".into(),
                size_bytes: 1,
                source: FileSource::Memory(Bytes::from_static(b"a")),
            }],
            response_type: None,
        };
        assert!(matches!(
            transport.send(request),
            Err(TransportError::InvalidRequest(_))
        ));
    }
}
