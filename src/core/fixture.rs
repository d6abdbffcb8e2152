// File: src/core/fixture.rs
// In-memory field-values backend over JSON rows, used by the CLI and tests.
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::service::*;
use crate::core::types::FilterOperator;

type Row = HashMap<String, String>;

#[derive(Debug, Default)]
struct FixtureLog {
    requests: Vec<FieldValuesRequest>,
    cancelled: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FixtureService {
    streams: Arc<HashMap<String, Vec<Row>>>,
    batch_size: usize,
    log: Arc<Mutex<FixtureLog>>,
}

impl FixtureService {
    pub fn new(streams: HashMap<String, Vec<Row>>, batch_size: usize) -> Self {
        Self {
            streams: Arc::new(streams),
            batch_size: batch_size.max(1),
            log: Arc::new(Mutex::new(FixtureLog::default())),
        }
    }

    /// Rows as `{"stream": [{"field": value, ...}, ...]}`; non-string values are stringified.
    pub fn from_json(value: &serde_json::Value, batch_size: usize) -> Result<Self, String> {
        let object = value.as_object()
            .ok_or_else(|| "Fixture must be an object of stream name -> rows".to_string())?;

        let mut streams = HashMap::new();
        for (stream, rows) in object {
            let rows = rows.as_array()
                .ok_or_else(|| format!("Fixture stream '{}' must be an array", stream))?;

            let mut parsed = Vec::with_capacity(rows.len());
            for row in rows {
                let fields = row.as_object()
                    .ok_or_else(|| format!("Fixture row in '{}' must be an object", stream))?;
                let row: Row = fields.iter()
                    .map(|(k, v)| {
                        let text = match v {
                            serde_json::Value::String(s) => s.clone(),
                            serde_json::Value::Null => String::new(),
                            other => other.to_string(),
                        };
                        (k.clone(), text)
                    })
                    .collect();
                parsed.push(row);
            }
            streams.insert(stream.clone(), parsed);
        }

        Ok(Self::new(streams, batch_size))
    }

    pub fn requests(&self) -> Vec<FieldValuesRequest> {
        self.log.lock().map(|log| log.requests.clone()).unwrap_or_default()
    }

    pub fn cancelled_traces(&self) -> Vec<String> {
        self.log.lock().map(|log| log.cancelled.clone()).unwrap_or_default()
    }

    fn record(&self, request: &FieldValuesRequest) {
        if let Ok(mut log) = self.log.lock() {
            log.requests.push(request.clone());
        }
    }

    fn is_cancelled(&self, trace_id: &str) -> bool {
        self.log.lock().map(|log| log.cancelled.iter().any(|t| t == trace_id)).unwrap_or(false)
    }

    fn distinct_values(&self, request: &FieldValuesRequest) -> Result<Vec<FieldValuesResponse>, FetchError> {
        let rows = self.streams.get(&request.stream)
            .ok_or_else(|| FetchError::Backend(format!("Stream '{}' not found", request.stream)))?;

        let keyword = request.keyword.as_ref().map(|k| k.to_lowercase());
        let mut responses = Vec::new();

        for field in &request.fields {
            let mut counts: Vec<(Option<String>, u64)> = Vec::new();

            for row in rows.iter().filter(|row| request.conditions.iter().all(|c| matches(row, c))) {
                let key = row.get(field).cloned();
                if let (Some(keyword), Some(key)) = (&keyword, &key) {
                    if !key.to_lowercase().contains(keyword.as_str()) {
                        continue;
                    }
                }
                match counts.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, count)) => *count += 1,
                    None => counts.push((key, 1)),
                }
            }

            counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            counts.truncate(request.size);

            responses.push(FieldValuesResponse {
                field: field.clone(),
                values: counts.into_iter().map(|(key, count)| FieldValue { key, count }).collect(),
            });
        }

        Ok(responses)
    }
}

fn compare(left: &str, right: &str) -> Ordering {
    match (left.parse::<f64>(), right.parse::<f64>()) {
        (Ok(l), Ok(r)) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
        _ => left.cmp(right),
    }
}

fn matches(row: &Row, condition: &QueryCondition) -> bool {
    let actual = row.get(&condition.field).map(String::as_str);
    let first = condition.values.first().map(String::as_str).unwrap_or("");
    let contained = actual.map_or(false, |a| condition.values.iter().any(|v| v == a));

    match condition.operator {
        FilterOperator::Eq | FilterOperator::In => contained,
        FilterOperator::NotEq | FilterOperator::NotIn => !contained,
        FilterOperator::Lt => actual.map_or(false, |a| compare(a, first) == Ordering::Less),
        FilterOperator::Gt => actual.map_or(false, |a| compare(a, first) == Ordering::Greater),
        FilterOperator::LtEq => actual.map_or(false, |a| compare(a, first) != Ordering::Greater),
        FilterOperator::GtEq => actual.map_or(false, |a| compare(a, first) != Ordering::Less),
        FilterOperator::StrMatch => actual.map_or(false, |a| a.contains(first)),
        FilterOperator::StrMatchIgnoreCase => {
            actual.map_or(false, |a| a.to_lowercase().contains(&first.to_lowercase()))
        }
    }
}

#[async_trait]
impl FieldValuesService for FixtureService {
    async fn fetch_values(&self, request: FieldValuesRequest) -> Result<Vec<FieldValuesResponse>, FetchError> {
        self.record(&request);
        self.distinct_values(&request)
    }

    async fn stream_values(
        &self,
        request: FieldValuesRequest,
        trace_id: String,
    ) -> Result<mpsc::UnboundedReceiver<StreamEvent>, FetchError> {
        self.record(&request);
        let responses = self.distinct_values(&request)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let service = self.clone();
        let batch_size = self.batch_size;

        tokio::spawn(async move {
            for response in responses {
                for chunk in response.values.chunks(batch_size) {
                    tokio::task::yield_now().await;
                    if service.is_cancelled(&trace_id) {
                        debug!(target: "dashvars::fixture", trace_id = %trace_id, "stream cancelled");
                        return;
                    }
                    let batch = vec![FieldValuesResponse {
                        field: response.field.clone(),
                        values: chunk.to_vec(),
                    }];
                    if tx.send(StreamEvent::Batch(batch)).is_err() {
                        return;
                    }
                }
            }
            let _ = tx.send(StreamEvent::Complete);
        });

        Ok(rx)
    }

    async fn cancel(&self, trace_id: &str) {
        if let Ok(mut log) = self.log.lock() {
            log.cancelled.push(trace_id.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service() -> FixtureService {
        let rows = json!({
            "logs": [
                {"region": "us", "host": "web-1", "code": 200},
                {"region": "us", "host": "web-2", "code": 500},
                {"region": "us", "host": "web-1", "code": 404},
                {"region": "eu", "host": "db-1", "code": 200},
                {"region": "eu"}
            ]
        });
        FixtureService::from_json(&rows, 1).unwrap()
    }

    fn request(conditions: Vec<QueryCondition>) -> FieldValuesRequest {
        FieldValuesRequest {
            stream: "logs".into(),
            stream_type: "logs".into(),
            fields: vec!["host".into()],
            start_time: 0,
            end_time: 1,
            size: 10,
            filter_query: None,
            conditions,
            keyword: None,
        }
    }

    #[tokio::test]
    async fn test_distinct_values_with_conditions() {
        let svc = service();
        let result = svc.fetch_values(request(vec![QueryCondition {
            field: "region".into(),
            operator: FilterOperator::Eq,
            values: vec!["us".into()],
        }])).await.unwrap();

        let keys: Vec<Option<String>> = result[0].values.iter().map(|v| v.key.clone()).collect();
        assert_eq!(keys, vec![Some("web-1".into()), Some("web-2".into())]);
        assert_eq!(result[0].values[0].count, 2);

        let result = svc.fetch_values(request(vec![QueryCondition {
            field: "code".into(),
            operator: FilterOperator::GtEq,
            values: vec!["404".into()],
        }])).await.unwrap();
        assert_eq!(result[0].values.len(), 2);
        assert_eq!(svc.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_stream_fails() {
        let svc = service();
        let mut req = request(vec![]);
        req.stream = "metrics".into();
        assert!(matches!(svc.fetch_values(req).await, Err(FetchError::Backend(_))));
    }

    #[tokio::test]
    async fn test_stream_batches() {
        let svc = service();
        let mut rx = svc.stream_values(request(vec![]), "t1".into()).await.unwrap();

        let mut batches = 0;
        let mut completed = false;
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Batch(b) => {
                    assert_eq!(b[0].values.len(), 1);
                    batches += 1;
                }
                StreamEvent::Complete => completed = true,
                StreamEvent::Error(e) => panic!("unexpected error {}", e),
            }
        }
        // web-1, web-2, db-1 and the row without a host
        assert_eq!(batches, 4);
        assert!(completed);
    }
}
