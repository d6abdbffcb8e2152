mod common;

use common::*;
use dashvars::{EngineConfig, EventKind, FetchError, FetchMode, FixtureService, InitialValues, LoadState, VariableValue};
use serde_json::json;
use std::sync::Arc;

fn stream_config() -> EngineConfig {
    EngineConfig {
        fetch_mode: FetchMode::Stream,
        ..EngineConfig::default()
    }
}

fn hosts() -> FixtureService {
    let rows = json!({
        "logs": [
            {"region": "us", "host": "web-1", "pod": "a"},
            {"region": "us", "host": "web-1", "pod": "b"},
            {"region": "us", "host": "web-2", "pod": "c"},
            {"region": "eu", "host": "db-1", "pod": "d"}
        ]
    });
    FixtureService::from_json(&rows, 1).unwrap()
}

#[tokio::test]
async fn test_late_batch_restores_previous_selection() {
    let service = Arc::new(hosts());
    let defs = definitions(json!([
        query_var("host", "host", &[]),
        query_var("pod", "pod", &[("host", "$host")])
    ]));
    let mut engine = engine_with(service.clone(), stream_config(), defs);

    // web-2 only arrives in the last batch
    let initial = InitialValues::from_query_string("var-host=web-2");
    engine.load(Some(range()), &initial).await.unwrap();
    engine.settle().await.unwrap();

    let host = engine.record("host").unwrap();
    assert_eq!(host.value, VariableValue::Str("web-2".into()));
    assert_eq!(host.state, LoadState::Resolved);
    assert_eq!(host.options.len(), 3);
    assert_eq!(engine.history().count("host", EventKind::BatchMerged), 3);

    assert_eq!(engine.record("pod").unwrap().value, VariableValue::Str("c".into()));
    let pod_requests: Vec<_> = service.requests().into_iter().filter(|r| r.fields[0] == "pod").collect();
    assert_eq!(pod_requests.last().unwrap().filter_query.as_deref(), Some("host='web-2'"));
    assert_eq!(engine.in_flight(), 0);
}

#[tokio::test]
async fn test_superseded_stream_cancelled_by_trace() {
    let service = Arc::new(hosts());
    let defs = definitions(json!([
        {"name": "region", "type": "custom",
         "options": [{"label": "US", "value": "us"}, {"label": "EU", "value": "eu"}]},
        query_var("host", "host", &[("region", "$region")])
    ]));
    let mut engine = engine_with(service.clone(), stream_config(), defs);
    engine.load(Some(range()), &InitialValues::new()).await.unwrap();
    engine.settle().await.unwrap();
    assert!(service.cancelled_traces().is_empty());

    engine.set_value("region", VariableValue::Str("eu".into())).await.unwrap();
    let result = engine.set_value("region", VariableValue::Str("us".into())).await.unwrap();
    assert_eq!(result.cancelled_fetches, 1);
    assert_eq!(service.cancelled_traces().len(), 1);

    engine.settle().await.unwrap();
    assert_eq!(engine.record("host").unwrap().value, VariableValue::Str("web-1".into()));
    assert!(!engine.is_variables_loading());
}

#[tokio::test]
async fn test_search_replaces_options_only() {
    let service = Arc::new(hosts());
    let defs = definitions(json!([
        {"name": "region", "type": "custom",
         "options": [{"label": "US", "value": "us"}, {"label": "EU", "value": "eu"}]},
        query_var("host", "host", &[("region", "$region")])
    ]));
    let mut engine = engine(service.clone(), defs);
    engine.load(Some(range()), &InitialValues::new()).await.unwrap();
    engine.settle().await.unwrap();
    assert_eq!(engine.record("host").unwrap().options.len(), 2);

    assert!(engine.search("host", "2").await.unwrap());
    engine.settle().await.unwrap();

    let host = engine.record("host").unwrap();
    assert_eq!(host.value, VariableValue::Str("web-1".into()));
    assert_eq!(host.options.len(), 1);
    assert_eq!(host.options[0].value, "web-2");
    let last = service.requests().pop().unwrap();
    assert_eq!(last.keyword.as_deref(), Some("2"));
    assert_eq!(last.filter_query.as_deref(), Some("region='us'"));

    // custom variables have nothing to search
    assert!(!engine.search("region", "u").await.unwrap());
}

#[tokio::test]
async fn test_open_dropdown_fetches_only_when_missing() {
    let service = Arc::new(hosts());
    let defs = definitions(json!([query_var("host", "host", &[])]));
    let mut engine = engine(service.clone(), defs);
    engine.load(Some(range()), &InitialValues::new()).await.unwrap();
    engine.settle().await.unwrap();

    assert!(!engine.open_dropdown("host").await.unwrap());
    assert_eq!(service.requests().len(), 1);

    engine.search("host", "nothing-matches").await.unwrap();
    engine.settle().await.unwrap();
    assert!(engine.record("host").unwrap().options.is_empty());

    assert!(engine.open_dropdown("host").await.unwrap());
    assert_eq!(engine.record("host").unwrap().state, LoadState::Loading);
    engine.settle().await.unwrap();

    let host = engine.record("host").unwrap();
    assert_eq!(host.options.len(), 3);
    assert_eq!(host.value, VariableValue::Str("web-1".into()));
    assert_eq!(service.requests().len(), 3);
}

#[tokio::test]
async fn test_empty_parent_blocks_dropdown_and_search() {
    let service = Arc::new(MockService::new(|r| match r.fields[0].as_str() {
        "region" => Ok(vec![]),
        _ => Ok(vec!["web-1", "db-1"]),
    }));
    let defs = definitions(json!([
        query_var("region", "region", &[]),
        query_var("host", "host", &[("region", "$region")])
    ]));
    let mut engine = engine(service.clone(), defs);
    engine.load(Some(range()), &InitialValues::new()).await.unwrap();
    engine.settle().await.unwrap();

    let host = engine.record("host").unwrap();
    assert_eq!(host.state, LoadState::Resolved);
    assert_eq!(host.value, VariableValue::Null);

    assert!(!engine.open_dropdown("host").await.unwrap());
    assert!(!engine.search("host", "db").await.unwrap());
    engine.settle().await.unwrap();

    assert!(service.requests_for("host").is_empty());
    let host = engine.record("host").unwrap();
    assert_eq!(host.value, VariableValue::Null);
    assert!(host.options.is_empty());
}

#[tokio::test]
async fn test_stream_closed_before_complete_fails() {
    let service = Arc::new(MockService::new(|_| Ok(vec!["partial"])).ending(StreamEnd::Close));
    let defs = definitions(json!([query_var("host", "host", &[])]));
    let mut engine = engine_with(service, stream_config(), defs);
    engine.load(Some(range()), &InitialValues::new()).await.unwrap();
    engine.settle().await.unwrap();

    let host = engine.record("host").unwrap();
    assert_eq!(host.state, LoadState::Resolved);
    assert_eq!(host.value, VariableValue::Null);
    assert!(host.options.is_empty());
    assert_eq!(engine.history().count("host", EventKind::BatchMerged), 1);
    assert_eq!(engine.history().count("host", EventKind::Failed), 1);
    assert_eq!(engine.in_flight(), 0);
}

#[tokio::test]
async fn test_stream_error_resets_dependents() {
    let service = Arc::new(
        MockService::new(|_| Ok(vec!["web-1"])).ending(StreamEnd::Error(FetchError::Backend("boom".into()))),
    );
    let defs = definitions(json!([
        query_var("host", "host", &[]),
        query_var("pod", "pod", &[("host", "$host")])
    ]));
    let mut engine = engine_with(service, stream_config(), defs);
    engine.load(Some(range()), &InitialValues::new()).await.unwrap();
    engine.settle().await.unwrap();

    assert_eq!(engine.record("host").unwrap().value, VariableValue::Null);
    let failure = engine.history()
        .for_variable("host")
        .find(|e| e.kind == EventKind::Failed)
        .and_then(|e| e.detail.clone())
        .unwrap();
    assert!(failure.contains("boom"));

    // the provisional web-1 started pod; the failure leaves it without data
    let pod = engine.record("pod").unwrap();
    assert_eq!(pod.state, LoadState::Resolved);
    assert_eq!(pod.value, VariableValue::Null);
    assert!(!engine.is_variables_loading());
}

#[tokio::test]
async fn test_late_batch_keeps_grandchild_selection() {
    let service = Arc::new(MockService::new(|r| {
        Ok(match (r.fields[0].as_str(), r.filter_query.as_deref()) {
            ("region", _) => vec!["us", "eu"],
            ("host", Some("region='eu'")) => vec!["db-1"],
            ("host", _) => vec!["web-1"],
            ("pod", Some("host='db-1'")) => vec!["d", "e"],
            _ => vec!["a", "b"],
        })
    }));
    let defs = definitions(json!([
        query_var("region", "region", &[]),
        query_var("host", "host", &[("region", "$region")]),
        query_var("pod", "pod", &[("host", "$host")])
    ]));
    let mut engine = engine_with(service.clone(), stream_config(), defs);

    // eu arrives after host already started from us
    let initial = InitialValues::from_query_string("var-region=eu&var-pod=e");
    engine.load(Some(range()), &initial).await.unwrap();
    engine.settle().await.unwrap();

    assert_eq!(engine.record("region").unwrap().value, VariableValue::Str("eu".into()));
    assert_eq!(engine.record("host").unwrap().value, VariableValue::Str("db-1".into()));
    assert_eq!(engine.record("pod").unwrap().value, VariableValue::Str("e".into()));
    assert_eq!(engine.history().count("host", EventKind::Cancelled), 1);
    let pod_requests = service.requests_for("pod");
    assert_eq!(pod_requests.last().unwrap().filter_query.as_deref(), Some("host='db-1'"));
}
