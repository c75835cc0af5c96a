//! HTTP transport implementation.
//!
//! The HTTP client itself sits behind [`HttpClient`] so any library can be
//! plugged in. Request and response bodies are CBOR, except the bundle,
//! which is served as raw ciphertext.

use crate::transport::{Transport, TransportError, TransportResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;
use vaultlog_protocol::{
    BatchDeleteRequest, BatchWriteRequest, DeleteRequest, EncryptedSnapshot, SequenceNo,
    TransactionLogResponse, WriteRequest,
};

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Query.
    Get,
    /// Mutation.
    Post,
}

/// An outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request method.
    pub method: Method,
    /// Absolute URL, query string included.
    pub url: String,
    /// Body, for POST requests.
    pub body: Option<Vec<u8>>,
}

/// A received response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a 200 response.
    pub fn ok(body: Vec<u8>) -> Self {
        Self { status: 200, body }
    }

    /// Creates a response with a text body.
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: message.into().into_bytes(),
        }
    }
}

/// HTTP client abstraction.
///
/// An `Err` means no response was received at all; non-success statuses
/// come back as `Ok`.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

/// HTTP-based transport.
pub struct HttpTransport<C: HttpClient> {
    /// Base URL of the server (e.g., "https://db.example.com").
    base_url: String,
    client: C,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    async fn execute(&self, method: Method, path: &str, body: Option<Vec<u8>>) -> TransportResult<Vec<u8>> {
        let url = format!("{}{}", self.base_url, path);
        debug!(?method, %url, "sending request");

        let response = self
            .client
            .send(HttpRequest { method, url, body })
            .await
            .map_err(|e| {
                *self.last_error.write() = Some(e.clone());
                TransportError::network(e)
            })?;

        match response.status {
            200..=299 => {
                *self.last_error.write() = None;
                Ok(response.body)
            }
            status => {
                let message = String::from_utf8_lossy(&response.body).into_owned();
                *self.last_error.write() = Some(message.clone());
                if status == 401 {
                    Err(TransportError::unauthorized(message))
                } else {
                    Err(TransportError::status(status, message))
                }
            }
        }
    }

    async fn post(&self, path: &str, body: Vec<u8>) -> TransportResult<()> {
        self.execute(Method::Post, path, Some(body)).await.map(|_| ())
    }
}

fn encode_err(e: impl ToString) -> TransportError {
    TransportError::Codec(format!("failed to encode request: {}", e.to_string()))
}

#[async_trait]
impl<C: HttpClient> Transport for HttpTransport<C> {
    async fn query_transaction_log(
        &self,
        starting_seq_no: SequenceNo,
    ) -> TransportResult<TransactionLogResponse> {
        let path = format!("/db/query/tx-log?startingSeqNo={starting_seq_no}");
        let body = self.execute(Method::Get, &path, None).await?;
        TransactionLogResponse::decode(&body)
            .map_err(|e| TransportError::Codec(format!("failed to decode response: {e}")))
    }

    async fn query_encrypted_db_state(
        &self,
        bundle_seq_no: SequenceNo,
    ) -> TransportResult<EncryptedSnapshot> {
        let path = format!("/db/query/db-state?bundleSeqNo={bundle_seq_no}");
        let body = self.execute(Method::Get, &path, None).await?;
        Ok(EncryptedSnapshot::new(body))
    }

    async fn insert(&self, request: WriteRequest) -> TransportResult<()> {
        self.post("/db/insert", request.encode().map_err(encode_err)?).await
    }

    async fn update(&self, request: WriteRequest) -> TransportResult<()> {
        self.post("/db/update", request.encode().map_err(encode_err)?).await
    }

    async fn delete(&self, request: DeleteRequest) -> TransportResult<()> {
        self.post("/db/delete", request.encode().map_err(encode_err)?).await
    }

    async fn batch_insert(&self, request: BatchWriteRequest) -> TransportResult<()> {
        self.post("/db/batch-insert", request.encode().map_err(encode_err)?).await
    }

    async fn batch_update(&self, request: BatchWriteRequest) -> TransportResult<()> {
        self.post("/db/batch-update", request.encode().map_err(encode_err)?).await
    }

    async fn batch_delete(&self, request: BatchDeleteRequest) -> TransportResult<()> {
        self.post("/db/batch-delete", request.encode().map_err(encode_err)?).await
    }
}

/// An HTTP client that routes requests straight to another [`Transport`].
///
/// Useful for exercising [`HttpTransport`] without a network.
pub struct LoopbackClient<T: Transport> {
    server: T,
}

impl<T: Transport> LoopbackClient<T> {
    /// Creates a client that serves every request from `server`.
    pub fn new(server: T) -> Self {
        Self { server }
    }

    async fn route(&self, request: HttpRequest) -> TransportResult<Vec<u8>> {
        let path = request
            .url
            .find("/db/")
            .map(|i| &request.url[i..])
            .unwrap_or(&request.url);
        let (route, query) = path.split_once('?').unwrap_or((path, ""));
        let body = request.body.unwrap_or_default();
        let decode_err = |e: vaultlog_protocol::ProtocolError| TransportError::status(400, e.to_string());

        match (request.method, route) {
            (Method::Get, "/db/query/tx-log") => {
                let start = query_param(query, "startingSeqNo")?;
                let response = self.server.query_transaction_log(start).await?;
                response.encode().map_err(encode_err)
            }
            (Method::Get, "/db/query/db-state") => {
                let seq = query_param(query, "bundleSeqNo")?;
                Ok(self.server.query_encrypted_db_state(seq).await?.into_bytes())
            }
            (Method::Post, "/db/insert") => {
                let req = WriteRequest::decode(&body).map_err(decode_err)?;
                self.server.insert(req).await.map(|_| Vec::new())
            }
            (Method::Post, "/db/update") => {
                let req = WriteRequest::decode(&body).map_err(decode_err)?;
                self.server.update(req).await.map(|_| Vec::new())
            }
            (Method::Post, "/db/delete") => {
                let req = DeleteRequest::decode(&body).map_err(decode_err)?;
                self.server.delete(req).await.map(|_| Vec::new())
            }
            (Method::Post, "/db/batch-insert") => {
                let req = BatchWriteRequest::decode(&body).map_err(decode_err)?;
                self.server.batch_insert(req).await.map(|_| Vec::new())
            }
            (Method::Post, "/db/batch-update") => {
                let req = BatchWriteRequest::decode(&body).map_err(decode_err)?;
                self.server.batch_update(req).await.map(|_| Vec::new())
            }
            (Method::Post, "/db/batch-delete") => {
                let req = BatchDeleteRequest::decode(&body).map_err(decode_err)?;
                self.server.batch_delete(req).await.map(|_| Vec::new())
            }
            _ => Err(TransportError::status(404, format!("no route for {route}"))),
        }
    }
}

fn query_param(query: &str, name: &str) -> TransportResult<SequenceNo> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .and_then(|(_, value)| value.parse().ok())
        .ok_or_else(|| TransportError::status(400, format!("missing or invalid {name}")))
}

#[async_trait]
impl<T: Transport> HttpClient for LoopbackClient<T> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        match self.route(request).await {
            Ok(body) => Ok(HttpResponse::ok(body)),
            Err(TransportError::Unauthorized(message)) => Ok(HttpResponse::with_status(401, message)),
            Err(TransportError::Status { status, message }) => {
                Ok(HttpResponse::with_status(status, message))
            }
            Err(TransportError::Codec(message)) => Ok(HttpResponse::with_status(400, message)),
            Err(TransportError::Network(message)) => Err(message),
        }
    }
}
