//! Network boundary
//!
//! A [`TransportAdapter`] takes a fully described [`TransferRequest`] and
//! returns a [`TransferHandle`] immediately. The request runs elsewhere (for
//! [`ReqwestTransport`], on a spawned tokio task) and reports back through the
//! handle as a sequence of [`TransferEvent`]s: any number of `Progress`
//! events followed by exactly one terminal `Complete` or `TransportError`.
//!
//! Cancelling a handle stops event delivery at once and tells the transport
//! to drop the request. It is idempotent and never fails.
//!
//! # Examples
//!
//! A transport that answers every request with `201 Created`:
//!
//! ```rust
//! use file_uploader::transport::{
//!     transfer_channel, ResponseBody, TransferEvent, TransferHandle, TransferRequest,
//!     TransportAdapter, TransportError,
//! };
//!
//! struct AlwaysCreated;
//!
//! impl TransportAdapter for AlwaysCreated {
//!     fn send(&self, request: TransferRequest) -> Result<TransferHandle, TransportError> {
//!         let (sender, handle) = transfer_channel();
//!         let total = request.total_bytes();
//!         let _ = sender.progress(total, total);
//!         let _ = sender.complete(201, ResponseBody::Empty);
//!         Ok(handle)
//!     }
//! }
//! ```

mod cancellation;
mod http;

pub use self::cancellation::CancellationToken;
pub use self::http::ReqwestTransport;

use bytes::Bytes;
use reqwest::Url;
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::{HttpMethod, ParamValue, ResponseType};
use crate::validation::FileSource;

/// Errors raised before a request could be handed to the network
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport needs a tokio runtime and none is running
    #[error("No async runtime available: {0}")]
    Runtime(String),

    /// The request cannot be expressed on the wire
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The HTTP client refused to build the request
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// One file part of the multipart body
#[derive(Debug, Clone)]
pub struct MultipartField {
    /// Form field name (caption or default name)
    pub field_name: String,
    /// File name sent in the part's content disposition
    pub file_name: String,
    /// Part content type
    pub content_type: String,
    /// Declared length of the part
    pub size_bytes: u64,
    /// Where to read the bytes from
    pub source: FileSource,
}

/// Everything a transport needs to perform one upload
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Endpoint
    pub url: Url,
    /// Request method
    pub method: HttpMethod,
    /// Request headers; lists become repeated headers
    pub headers: BTreeMap<String, ParamValue>,
    /// Query parameters; lists become repeated parameters
    pub query_params: BTreeMap<String, ParamValue>,
    /// File parts in batch order
    pub fields: Vec<MultipartField>,
    /// Response decoding
    pub response_type: Option<ResponseType>,
}

impl TransferRequest {
    /// Sum of the declared part sizes; the denominator for progress
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.fields.iter().map(|field| field.size_bytes).sum()
    }

    /// Field names in body order
    #[must_use]
    pub fn field_names(&self) -> Vec<&str> {
        self.fields
            .iter()
            .map(|field| field.field_name.as_str())
            .collect()
    }

    /// Query parameters flattened into repeated pairs
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&str, &str)> {
        flatten_pairs(&self.query_params)
    }

    /// Headers flattened into repeated pairs
    #[must_use]
    pub fn header_pairs(&self) -> Vec<(&str, &str)> {
        flatten_pairs(&self.headers)
    }
}

fn flatten_pairs(map: &BTreeMap<String, ParamValue>) -> Vec<(&str, &str)> {
    map.iter()
        .flat_map(|(name, value)| {
            value
                .values()
                .iter()
                .map(move |item| (name.as_str(), item.as_str()))
        })
        .collect()
}

/// Decoded response payload
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// The endpoint sent no body
    Empty,
    /// JSON document
    Json(serde_json::Value),
    /// UTF-8 text
    Text(String),
    /// Raw bytes
    Binary(Bytes),
}

impl ResponseBody {
    /// Decodes a raw body according to the configured response type
    ///
    /// Without a configured type the body is parsed as JSON when possible and
    /// kept as text otherwise.
    ///
    /// # Errors
    ///
    /// Returns a description when the body does not match an explicitly
    /// requested JSON or text type.
    pub fn decode(raw: Bytes, response_type: Option<ResponseType>) -> Result<Self, String> {
        if raw.is_empty() {
            return Ok(Self::Empty);
        }

        match response_type {
            Some(ResponseType::Json) => serde_json::from_slice(&raw)
                .map(Self::Json)
                .map_err(|e| format!("response is not valid JSON: {e}")),
            Some(ResponseType::Text) => String::from_utf8(raw.to_vec())
                .map(Self::Text)
                .map_err(|e| format!("response is not valid UTF-8: {e}")),
            Some(ResponseType::Blob | ResponseType::ArrayBuffer) => Ok(Self::Binary(raw)),
            None => Ok(serde_json::from_slice(&raw).map_or_else(
                |_| Self::Text(String::from_utf8_lossy(&raw).into_owned()),
                Self::Json,
            )),
        }
    }
}

/// Something the transport reports about a running request
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    /// Bytes of the body handed to the network so far
    Progress {
        /// Bytes sent
        loaded: u64,
        /// Bytes to send
        total: u64,
    },

    /// The endpoint answered; any status code
    Complete {
        /// HTTP status
        status_code: u16,
        /// Decoded body
        body: ResponseBody,
    },

    /// The request failed below HTTP (connection, TLS, body read, ...)
    TransportError {
        /// Human-readable cause
        detail: String,
    },
}

impl TransferEvent {
    /// Whether no further events follow this one
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}

/// Creates a connected sender/handle pair sharing one cancellation token
#[must_use]
pub fn transfer_channel() -> (TransferSender, TransferHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    let token = CancellationToken::new();
    (
        TransferSender {
            tx,
            token: token.clone(),
        },
        TransferHandle {
            rx,
            token,
            finished: false,
        },
    )
}

/// Transport-side end of a transfer
#[derive(Debug, Clone)]
pub struct TransferSender {
    tx: mpsc::UnboundedSender<TransferEvent>,
    token: CancellationToken,
}

impl TransferSender {
    /// Delivers an event; false once cancelled or the handle is gone
    #[must_use = "false means the transfer was cancelled"]
    pub fn send(&self, event: TransferEvent) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        self.tx.send(event).is_ok()
    }

    /// Delivers a progress event
    #[must_use = "false means the transfer was cancelled"]
    pub fn progress(&self, loaded: u64, total: u64) -> bool {
        self.send(TransferEvent::Progress { loaded, total })
    }

    /// Delivers the response
    #[must_use = "false means the transfer was cancelled"]
    pub fn complete(&self, status_code: u16, body: ResponseBody) -> bool {
        self.send(TransferEvent::Complete { status_code, body })
    }

    /// Delivers a transport failure
    #[must_use = "false means the transfer was cancelled"]
    pub fn error(&self, detail: impl Into<String>) -> bool {
        self.send(TransferEvent::TransportError {
            detail: detail.into(),
        })
    }

    /// Whether the handle side cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether nobody listens any more (cancelled, or handle dropped)
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled() || self.tx.is_closed()
    }

    /// Token the transport should watch to abandon the request
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Consumer end of a transfer, owned by the controller
///
/// Dropping a handle discards its events but does not cancel the request.
#[derive(Debug)]
pub struct TransferHandle {
    rx: mpsc::UnboundedReceiver<TransferEvent>,
    token: CancellationToken,
    finished: bool,
}

impl TransferHandle {
    /// Waits for the next event
    ///
    /// Returns `None` after a terminal event, after cancellation, or when the
    /// transport went away without a terminal event.
    pub async fn next_event(&mut self) -> Option<TransferEvent> {
        if self.finished || self.token.is_cancelled() {
            return None;
        }

        let event = tokio::select! {
            biased;
            () = self.token.cancelled() => None,
            event = self.rx.recv() => event,
        };
        self.observe(event)
    }

    fn observe(&mut self, event: Option<TransferEvent>) -> Option<TransferEvent> {
        if event.as_ref().is_none_or(TransferEvent::is_terminal) {
            self.finished = true;
        }
        event
    }

    /// Stops event delivery and asks the transport to drop the request
    ///
    /// Safe to call repeatedly and after completion.
    pub fn cancel(&self) {
        let _ = self.token.cancel();
    }

    /// Whether [`cancel`](Self::cancel) was called
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A clone of the token, for cancelling from outside the event loop
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Sends one multipart upload and streams its events back
///
/// Implementations must return without waiting for the request to finish.
#[cfg_attr(test, mockall::automock)]
pub trait TransportAdapter: Send + Sync {
    /// Starts the request described by `request`
    ///
    /// # Errors
    ///
    /// Returns an error when the request cannot be started at all; failures
    /// after that point arrive as [`TransferEvent::TransportError`].
    fn send(&self, request: TransferRequest) -> Result<TransferHandle, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_by_response_type() {
        let json = Bytes::from_static(br#"{"id":7}"#);
        assert_eq!(
            ResponseBody::decode(json.clone(), Some(ResponseType::Json)).unwrap(),
            ResponseBody::Json(serde_json::json!({"id": 7}))
        );
        assert_eq!(
            ResponseBody::decode(json.clone(), Some(ResponseType::Text)).unwrap(),
            ResponseBody::Text(r#"{"id":7}"#.into())
        );
        assert_eq!(
            ResponseBody::decode(json.clone(), Some(ResponseType::Blob)).unwrap(),
            ResponseBody::Binary(json)
        );
        assert!(ResponseBody::decode(Bytes::from_static(b"<html>"), Some(ResponseType::Json)).is_err());
    }

    #[test]
    fn test_decode_without_type_falls_back_to_text() {
        assert_eq!(
            ResponseBody::decode(Bytes::from_static(b"[1,2]"), None).unwrap(),
            ResponseBody::Json(serde_json::json!([1, 2]))
        );
        assert_eq!(
            ResponseBody::decode(Bytes::from_static(b"stored"), None).unwrap(),
            ResponseBody::Text("stored".into())
        );
        assert_eq!(
            ResponseBody::decode(Bytes::new(), Some(ResponseType::Json)).unwrap(),
            ResponseBody::Empty
        );
    }

    #[tokio::test]
    async fn test_handle_stops_after_terminal_event() {
        let (sender, mut handle) = transfer_channel();
        assert!(sender.progress(1, 2));
        assert!(sender.complete(200, ResponseBody::Empty));
        assert!(sender.progress(2, 2));

        assert_eq!(
            handle.next_event().await,
            Some(TransferEvent::Progress { loaded: 1, total: 2 })
        );
        assert!(matches!(
            handle.next_event().await,
            Some(TransferEvent::Complete { status_code: 200, .. })
        ));
        assert_eq!(handle.next_event().await, None);
        // the queued progress after the terminal event is never delivered
        assert_eq!(handle.next_event().await, None);
    }

    #[tokio::test]
    async fn test_cancel_stops_delivery() {
        let (sender, mut handle) = transfer_channel();
        assert!(sender.progress(1, 4));

        handle.cancel();
        handle.cancel();
        assert!(sender.is_cancelled());
        assert!(!sender.progress(2, 4));
        assert_eq!(handle.next_event().await, None);
    }

    #[tokio::test]
    async fn test_dropped_sender_ends_stream() {
        let (sender, mut handle) = transfer_channel();
        drop(sender);
        assert_eq!(handle.next_event().await, None);
        assert!(!handle.is_cancelled());
    }

    #[test]
    fn test_dropped_handle_closes_sender() {
        let (sender, handle) = transfer_channel();
        drop(handle);
        assert!(sender.is_closed());
        assert!(!sender.error("gone"));
    }

    #[test]
    fn test_request_pairs() {
        let mut query_params = BTreeMap::new();
        query_params.insert(
            "tag".to_string(),
            ParamValue::Many(vec!["a".into(), "b".into()]),
        );
        query_params.insert("folder".to_string(), ParamValue::from("inbox"));
        let request = TransferRequest {
            url: Url::parse("http://localhost/upload").unwrap(),
            method: HttpMethod::Post,
            headers: BTreeMap::new(),
            query_params,
            fields: vec![],
            response_type: None,
        };
        assert_eq!(
            request.query_pairs(),
            vec![("folder", "inbox"), ("tag", "a"), ("tag", "b")]
        );
        assert_eq!(request.total_bytes(), 0);
    }
}
