#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use dashvars::core::service::{
    FetchError, FieldValue, FieldValuesRequest, FieldValuesResponse, FieldValuesService, StreamEvent,
};
use dashvars::{ChangePropagationEngine, EngineConfig, EngineContext, TimeRange, VariableDefinition};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

type Handler = Box<dyn Fn(&FieldValuesRequest) -> Result<Vec<&'static str>, FetchError> + Send + Sync>;

/// How a mock stream ends after its batches.
#[derive(Debug, Clone)]
pub enum StreamEnd {
    Complete,
    Close,
    Error(FetchError),
}

// Mock backend answering every request through a closure. Streams send one
// key per batch, all queued before the receiver is returned.
pub struct MockService {
    handler: Handler,
    requests: Mutex<Vec<FieldValuesRequest>>,
    stream_end: StreamEnd,
}

impl MockService {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&FieldValuesRequest) -> Result<Vec<&'static str>, FetchError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
            stream_end: StreamEnd::Complete,
        }
    }

    pub fn ending(mut self, end: StreamEnd) -> Self {
        self.stream_end = end;
        self
    }

    pub fn requests(&self) -> Vec<FieldValuesRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_for(&self, field: &str) -> Vec<FieldValuesRequest> {
        self.requests().into_iter().filter(|r| r.fields[0] == field).collect()
    }
}

#[async_trait]
impl FieldValuesService for MockService {
    async fn fetch_values(&self, request: FieldValuesRequest) -> Result<Vec<FieldValuesResponse>, FetchError> {
        self.requests.lock().unwrap().push(request.clone());
        let keys = (self.handler)(&request)?;
        Ok(vec![response(&request.fields[0], &keys)])
    }

    async fn stream_values(
        &self,
        request: FieldValuesRequest,
        _trace_id: String,
    ) -> Result<mpsc::UnboundedReceiver<StreamEvent>, FetchError> {
        self.requests.lock().unwrap().push(request.clone());
        let keys = (self.handler)(&request)?;
        let (tx, rx) = mpsc::unbounded_channel();
        for key in keys {
            tx.send(StreamEvent::Batch(vec![response(&request.fields[0], &[key])])).unwrap();
        }
        match &self.stream_end {
            StreamEnd::Complete => tx.send(StreamEvent::Complete).unwrap(),
            StreamEnd::Error(err) => tx.send(StreamEvent::Error(err.clone())).unwrap(),
            StreamEnd::Close => {}
        }
        Ok(rx)
    }
}

fn response(field: &str, keys: &[&str]) -> FieldValuesResponse {
    FieldValuesResponse {
        field: field.to_string(),
        values: keys.iter()
            .map(|k| FieldValue { key: Some(k.to_string()), count: 1 })
            .collect(),
    }
}

pub fn definitions(json: serde_json::Value) -> Vec<VariableDefinition> {
    serde_json::from_value(json).expect("valid definitions")
}

pub fn range() -> TimeRange {
    TimeRange::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap(),
    )
}

pub fn engine(service: Arc<dyn FieldValuesService>, defs: Vec<VariableDefinition>) -> ChangePropagationEngine {
    engine_with(service, EngineConfig::default(), defs)
}

pub fn engine_with(
    service: Arc<dyn FieldValuesService>,
    config: EngineConfig,
    defs: Vec<VariableDefinition>,
) -> ChangePropagationEngine {
    ChangePropagationEngine::new(EngineContext::new(service, config), defs)
}

pub fn query_var(name: &str, field: &str, filters: &[(&str, &str)]) -> serde_json::Value {
    let filter: Vec<serde_json::Value> = filters.iter()
        .map(|(field, value)| serde_json::json!({"name": field, "operator": "=", "value": value}))
        .collect();
    serde_json::json!({
        "name": name,
        "type": "query_values",
        "query_data": {"stream": "logs", "field": field, "filter": filter}
    })
}
