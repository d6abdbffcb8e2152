// File: src/core/service.rs
use async_trait::async_trait;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::core::types::FilterOperator;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Stream closed before completion")]
    StreamClosed,
}

/// A filter condition with every variable reference already substituted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryCondition {
    pub field: String,
    pub operator: FilterOperator,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValuesRequest {
    pub stream: String,
    pub stream_type: String,
    pub fields: Vec<String>,
    pub start_time: i64,
    pub end_time: i64,
    pub size: usize,
    /// Rendered WHERE clause, e.g. `region='us'`.
    pub filter_query: Option<String>,
    pub conditions: Vec<QueryCondition>,
    pub keyword: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub key: Option<String>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValuesResponse {
    pub field: String,
    pub values: Vec<FieldValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Batch(Vec<FieldValuesResponse>),
    Complete,
    Error(FetchError),
}

/// Search backend returning distinct values of a field.
#[async_trait]
pub trait FieldValuesService: Send + Sync {
    async fn fetch_values(&self, request: FieldValuesRequest) -> Result<Vec<FieldValuesResponse>, FetchError>;

    /// Incremental variant: partial batches followed by `Complete`. A channel
    /// that closes before `Complete` fails the fetch with `StreamClosed`.
    async fn stream_values(
        &self,
        request: FieldValuesRequest,
        trace_id: String,
    ) -> Result<mpsc::UnboundedReceiver<StreamEvent>, FetchError> {
        let _ = trace_id;
        let (tx, rx) = mpsc::unbounded_channel();
        match self.fetch_values(request).await {
            Ok(batch) => {
                let _ = tx.send(StreamEvent::Batch(batch));
                let _ = tx.send(StreamEvent::Complete);
            }
            Err(e) => {
                let _ = tx.send(StreamEvent::Error(e));
            }
        }
        Ok(rx)
    }

    /// Client-initiated cancellation of a stream by trace id.
    async fn cancel(&self, trace_id: &str) {
        let _ = trace_id;
    }
}
