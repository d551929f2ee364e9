//! Query server over stdio.
//!
//! Each request line is handled on its own task so slow embeddings do not
//! hold up other callers; responses are funnelled through a single writer and
//! may therefore arrive out of request order. At most `max_in_flight`
//! requests run at once; further lines are not read until one finishes.

pub mod protocol;


use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, error, info, warn};

use crate::engine::{QueryEngine, RetrievalError};
use protocol::{
    AnswerParams, AnswerResult, JSONRPC_VERSION, JsonRpcError, JsonRpcErrorResponse,
    JsonRpcRequest, JsonRpcResponse, ReloadResult, RequestId,
};

const DEFAULT_MAX_IN_FLIGHT: usize = 64;

pub struct QaServer {
    engine: Arc<QueryEngine>,
    artifacts_dir: PathBuf,
    default_k: usize,
    max_in_flight: usize,
}

impl QaServer {
    #[inline]
    pub fn new(engine: Arc<QueryEngine>, artifacts_dir: PathBuf, default_k: usize) -> Self {
        Self {
            engine,
            artifacts_dir,
            default_k: default_k.max(1),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    /// Limit how many requests are handled concurrently
    #[inline]
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    #[inline]
    pub fn engine(&self) -> &Arc<QueryEngine> {
        &self.engine
    }

    /// Serve requests from stdin until EOF, writing responses to stdout
    #[inline]
    pub async fn serve_stdio(self: Arc<Self>) -> Result<()> {
        info!("Starting query server on stdio");
        self.serve(BufReader::new(io::stdin()), io::stdout()).await
    }

    /// Serve line-delimited requests from `reader` until EOF
    #[inline]
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        // Every in-flight request sends at most one response, so neither side grows past the cap
        let (tx, mut rx) = mpsc::channel::<String>(self.max_in_flight);
        let in_flight = Arc::new(Semaphore::new(self.max_in_flight));

        let writer_task = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                writer.write_all(message.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
            Ok::<(), std::io::Error>(())
        });

        let mut lines = reader.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let Ok(permit) = Arc::clone(&in_flight).acquire_owned().await else {
                        error!("Request limiter closed");
                        break;
                    };
                    let server = Arc::clone(&self);
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        if let Some(response) = server.handle_line(&line).await {
                            if tx.send(response).await.is_err() {
                                warn!("Response dropped: writer has stopped");
                            }
                        }
                        drop(permit);
                    });
                }
                Ok(None) => {
                    info!("EOF reached, closing connection");
                    break;
                }
                Err(e) => {
                    error!("Error reading request stream: {}", e);
                    break;
                }
            }
        }

        // The writer drains until every in-flight request has dropped its sender
        drop(tx);
        writer_task
            .await
            .context("Response writer panicked")?
            .context("Failed to write response")?;

        info!("Query server stopped");
        Ok(())
    }

    /// Handle one request line, returning the serialized response if one is due
    #[inline]
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let raw: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                debug!("Failed to parse JSON: {}", e);
                return encode(&JsonRpcErrorResponse::new(JsonRpcError::parse_error(), None));
            }
        };

        let request: JsonRpcRequest = match serde_json::from_value(raw.clone()) {
            Ok(request) => request,
            Err(e) => {
                debug!("Invalid request: {}", e);
                let id = raw
                    .get("id")
                    .and_then(|id| serde_json::from_value(id.clone()).ok());
                return encode(&JsonRpcErrorResponse::new(
                    JsonRpcError::invalid_request(),
                    id,
                ));
            }
        };

        if request.jsonrpc != JSONRPC_VERSION {
            return encode(&JsonRpcErrorResponse::new(
                JsonRpcError::invalid_request(),
                request.id,
            ));
        }

        let id = request.id.clone();
        let outcome = self.dispatch(request).await;

        // Notifications get no reply, even on error
        let id: RequestId = id?;
        match outcome {
            Ok(result) => encode(&JsonRpcResponse::new(result, id)),
            Err(error) => encode(&JsonRpcErrorResponse::new(error, Some(id))),
        }
    }

    async fn dispatch(&self, request: JsonRpcRequest) -> Result<Value, JsonRpcError> {
        debug!("Handling method {}", request.method);
        match request.method.as_str() {
            "answer" => self.handle_answer(request.params).await,
            "reload" => self.handle_reload().await,
            "status" => self.handle_status(),
            "ping" => Ok(json!({})),
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }

    async fn handle_answer(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: AnswerParams = params
            .ok_or_else(|| JsonRpcError::invalid_params(Some("Missing params".to_string())))
            .and_then(|p| {
                serde_json::from_value(p)
                    .map_err(|e| JsonRpcError::invalid_params(Some(e.to_string())))
            })?;
        let k = params.k.unwrap_or(self.default_k);

        let engine = Arc::clone(&self.engine);
        let results = tokio::task::spawn_blocking(move || engine.answer(&params.query, k))
            .await
            .map_err(|e| JsonRpcError::internal_error(Some(e.to_string())))?
            .map_err(|e| retrieval_error(&e))?;

        to_value(&AnswerResult { results })
    }

    async fn handle_reload(&self) -> Result<Value, JsonRpcError> {
        let engine = Arc::clone(&self.engine);
        let dir = self.artifacts_dir.clone();
        let triple = tokio::task::spawn_blocking(move || engine.reload(&dir))
            .await
            .map_err(|e| JsonRpcError::internal_error(Some(e.to_string())))?
            .map_err(|e| retrieval_error(&e))?;

        to_value(&ReloadResult {
            state: self.engine.state(),
            records: triple.len(),
            dimension: triple.dimension(),
        })
    }

    fn handle_status(&self) -> Result<Value, JsonRpcError> {
        let mut status = to_value(&self.engine.status())?;
        if let Some(object) = status.as_object_mut() {
            object.insert(
                "artifacts_dir".to_string(),
                json!(self.artifacts_dir.display().to_string()),
            );
        }
        Ok(status)
    }
}

fn retrieval_error(error: &RetrievalError) -> JsonRpcError {
    warn!("Request failed: {}", error);
    JsonRpcError::from(error)
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(Some(e.to_string())))
}

fn encode<T: serde::Serialize>(message: &T) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(json) => Some(json),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            None
        }
    }
}
