// crates/live-node-broker/tests/dispatcher.rs
// ============================================================================
// Module: Dispatcher Tests
// Description: End-to-end request handling over the in-memory broker.
// Purpose: Validate routing, correlation, acknowledgement, and drop rules.
// ============================================================================

//! ## Overview
//! Requests are either handed to [`Dispatcher::handle`] directly or sent
//! through a running [`LiveNode`]. The object store is a scratch directory
//! holding `alice/db1` with one table, `t1`.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use live_node_broker::BrokerTransport;
use live_node_broker::LiveNode;
use live_node_broker::MemoryDelivery;
use live_node_broker::NodeAuditEvent;
use live_node_broker::PipelineState;
use live_node_broker::QueueKind;
use live_node_config::WorkerConfig;
use live_node_core::DatabaseKey;
use serde_json::json;
use tokio::sync::watch;

use crate::common::CREATE_QUEUE;
use crate::common::Fixture;
use crate::common::NODE;
use crate::common::body;
use crate::common::request;

/// Starts a node over the fixture and returns its shutdown switch and task.
fn start(
    fixture: &Fixture,
    workers: WorkerConfig,
) -> (watch::Sender<bool>, tokio::task::JoinHandle<Result<(), live_node_broker::BrokerError>>) {
    let node = LiveNode::new(
        Arc::clone(&fixture.dispatcher),
        Arc::clone(&fixture.broker) as Arc<dyn BrokerTransport>,
        CREATE_QUEUE,
        workers,
    );
    let (shutdown, signal) = watch::channel(false);
    let task = tokio::spawn(async move { node.run(signal).await });
    (shutdown, task)
}

// ============================================================================
// SECTION: Running Node
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn create_then_tables_round_trip() {
    let fixture = Fixture::new();
    let (shutdown, task) = start(&fixture, WorkerConfig::default());

    let create_tag = fixture
        .broker
        .send(
            CREATE_QUEUE,
            MemoryDelivery::new("corr-create", "reply-create", request("create", "alice", "db1", "")),
        )
        .unwrap();
    let created = fixture.reply().await;
    assert_eq!(created.routing_key, "reply-create");
    assert_eq!(created.correlation_id.as_deref(), Some("corr-create"));
    assert_eq!(body(&created), json!({"node": NODE, "result": "success", "error": ""}));

    let tables_tag = fixture
        .broker
        .send(NODE, MemoryDelivery::new("corr-tables", "reply-tables", request("tables", "alice", "db1", "")))
        .unwrap();
    let tables = fixture.reply().await;
    assert_eq!(tables.correlation_id.as_deref(), Some("corr-tables"));
    assert_eq!(body(&tables), json!({"node": NODE, "tables": ["t1"], "error": ""}));

    shutdown.send(true).unwrap();
    task.await.unwrap().unwrap();
    let acked = fixture.broker.acked();
    assert!(acked.contains(&create_tag));
    assert!(acked.contains(&tables_tag));
    assert_eq!(acked.len(), 2);
}

/// Materializes `alice/db1` directly through the dispatcher.
async fn materialize_fixture(fixture: &Fixture) {
    let (_, setup) = fixture
        .broker
        .inbound(MemoryDelivery::new("setup", "reply-setup", request("create", "alice", "db1", "")));
    fixture.dispatcher.handle(QueueKind::Create, setup).await;
    fixture.reply().await;
}

/// Sends 100 `tables` requests and checks replies map one-to-one onto them.
async fn assert_bijective_correlation(query_pool_size: usize) {
    let fixture = Fixture::new();
    materialize_fixture(&fixture).await;

    let workers = WorkerConfig {
        create_pool_size: 1,
        query_pool_size,
    };
    let (shutdown, task) = start(&fixture, workers);
    let mut expected = HashMap::new();
    for index in 0 .. 100 {
        let correlation_id = format!("corr-{index}");
        let reply_to = format!("reply-{index}");
        fixture
            .broker
            .send(
                NODE,
                MemoryDelivery::new(&correlation_id, &reply_to, request("tables", "alice", "db1", "")),
            )
            .unwrap();
        expected.insert(correlation_id, reply_to);
    }

    let mut seen = HashSet::new();
    for _ in 0 .. 100 {
        let reply = fixture.reply().await;
        let correlation_id = reply.correlation_id.clone().unwrap();
        assert_eq!(expected.get(&correlation_id), Some(&reply.routing_key));
        assert_eq!(body(&reply)["tables"], json!(["t1"]));
        assert!(seen.insert(correlation_id), "duplicate reply");
    }
    assert_eq!(seen.len(), expected.len());

    shutdown.send(true).unwrap();
    task.await.unwrap().unwrap();
    assert_eq!(fixture.broker.acked().len(), 101);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hundred_requests_have_bijective_correlation() {
    assert_bijective_correlation(1).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hundred_requests_have_bijective_correlation_with_concurrent_workers() {
    assert_bijective_correlation(8).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deletes_and_queries_on_one_key_stay_well_formed() {
    let fixture = Fixture::new();
    materialize_fixture(&fixture).await;

    let workers = WorkerConfig {
        create_pool_size: 1,
        query_pool_size: 8,
    };
    let (shutdown, task) = start(&fixture, workers);
    let mut expected = HashMap::new();
    for index in 0 .. 60 {
        let operation = match index % 6 {
            0 => "delete",
            3 => "create",
            _ => "query",
        };
        let correlation_id = format!("corr-{index}");
        let reply_to = format!("reply-{index}");
        fixture
            .broker
            .send(
                NODE,
                MemoryDelivery::new(
                    &correlation_id,
                    &reply_to,
                    request(operation, "alice", "db1", "SELECT count(*) FROM t1"),
                ),
            )
            .unwrap();
        expected.insert(correlation_id, (reply_to, operation));
    }

    let mut seen = HashSet::new();
    for _ in 0 .. 60 {
        let reply = fixture.reply().await;
        let correlation_id = reply.correlation_id.clone().unwrap();
        let (reply_to, operation) = expected.get(&correlation_id).unwrap();
        assert_eq!(&reply.routing_key, reply_to);
        assert!(seen.insert(correlation_id), "duplicate reply");
        let value = body(&reply);
        assert_eq!(value["node"], NODE);
        match *operation {
            "create" => assert_eq!(value["result"], "success", "{value}"),
            "query" if value["error"] == "" => {
                assert_eq!(
                    value["results"]["rows"][0][0],
                    json!({"type": "integer", "value": 2}),
                    "{value}"
                );
            }
            "delete" if value["error"] == "" => assert!(value.get("error_code").is_none()),
            _ => assert_eq!(value["error_code"], "not_found", "{value}"),
        }
    }
    assert_eq!(seen.len(), expected.len());

    shutdown.send(true).unwrap();
    task.await.unwrap().unwrap();
    assert_eq!(fixture.broker.acked().len(), 61);
    let live = fixture.live_path(&DatabaseKey::new("alice", "db1").unwrap());
    if live.exists() {
        assert!(rusqlite::Connection::open(&live).is_ok());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn node_declares_queues_and_sets_prefetch_from_pool_sizes() {
    let fixture = Fixture::new();
    let workers = WorkerConfig {
        create_pool_size: 2,
        query_pool_size: 8,
    };
    let (shutdown, task) = start(&fixture, workers);
    fixture
        .broker
        .send(NODE, MemoryDelivery::new("c", "r", request("tables", "alice", "missing", "")))
        .unwrap();
    fixture.reply().await;
    shutdown.send(true).unwrap();
    task.await.unwrap().unwrap();

    let declarations = fixture.broker.declarations();
    assert_eq!(declarations.len(), 2);
    assert_eq!(declarations[0].name, CREATE_QUEUE);
    assert!(declarations[0].durable);
    assert_eq!(declarations[1].name, NODE);
    assert!(!declarations[1].durable);
    let consumers = fixture.broker.consumers();
    assert!(consumers.contains(&(CREATE_QUEUE.to_string(), 2)));
    assert!(consumers.contains(&(NODE.to_string(), 8)));
}

#[tokio::test]
async fn declaration_failure_stops_startup() {
    let fixture = Fixture::new();
    fixture.broker.set_declare_failure(true);
    let (_shutdown, task) = start(&fixture, WorkerConfig::default());
    let result = task.await.unwrap();
    assert!(matches!(result, Err(live_node_broker::BrokerError::Declare { .. })));
    assert!(fixture.broker.consumers().is_empty());
}

// ============================================================================
// SECTION: Direct Dispatch
// ============================================================================

#[tokio::test]
async fn unknown_operation_is_acked_without_reply() {
    let fixture = Fixture::new();
    let (tag, message) = fixture
        .broker
        .inbound(MemoryDelivery::new("corr-1", "reply-1", request("rowdata", "alice", "db1", "")));

    let outcome = fixture.dispatcher.handle(QueueKind::Query, message).await;

    assert_eq!(outcome.state, PipelineState::Dropped);
    assert_eq!(outcome.reached, PipelineState::Decoded);
    assert_eq!(fixture.broker.acked(), vec![tag]);
    let waited = tokio::time::timeout(Duration::from_millis(100), fixture.broker.next_reply()).await;
    assert!(waited.is_err(), "no reply expected");
    assert!(
        fixture.audit.events().iter().any(|event| matches!(event, NodeAuditEvent::Dropped(_)))
    );
}

#[tokio::test]
async fn undecodable_request_with_reply_destination_gets_decode_error() {
    let fixture = Fixture::new();
    let (tag, message) =
        fixture.broker.inbound(MemoryDelivery::new("corr-1", "reply-1", b"{not json".to_vec()));

    let outcome = fixture.dispatcher.handle(QueueKind::Query, message).await;

    assert_eq!(outcome.state, PipelineState::Responded);
    assert_eq!(outcome.reached, PipelineState::Received);
    assert_eq!(outcome.error_kind, Some("decode_error"));
    let reply = fixture.reply().await;
    assert_eq!(reply.correlation_id.as_deref(), Some("corr-1"));
    let value = body(&reply);
    assert_eq!(value["error_code"], "decode_error");
    assert_eq!(value["node"], NODE);
    assert!(!value["error"].as_str().unwrap().is_empty());
    assert_eq!(fixture.broker.acked(), vec![tag]);
}

#[tokio::test]
async fn undecodable_create_request_reports_failure_result() {
    let fixture = Fixture::new();
    let (tag, message) =
        fixture.broker.inbound(MemoryDelivery::new("corr-2", "reply-2", b"[1, 2]".to_vec()));

    let outcome = fixture.dispatcher.handle(QueueKind::Create, message).await;

    assert_eq!(outcome.state, PipelineState::Responded);
    assert_eq!(outcome.error_kind, Some("decode_error"));
    let reply = fixture.reply().await;
    assert_eq!(reply.correlation_id.as_deref(), Some("corr-2"));
    let value = body(&reply);
    assert_eq!(value["result"], "failure");
    assert_eq!(value["error_code"], "decode_error");
    assert!(!value["error"].as_str().unwrap().is_empty());
    assert_eq!(fixture.broker.acked(), vec![tag]);
}

#[tokio::test]
async fn undecodable_request_without_reply_destination_is_dropped() {
    let fixture = Fixture::new();
    let delivery = MemoryDelivery {
        correlation_id: None,
        reply_to: None,
        body: b"\xff\xfe".to_vec(),
    };
    let (tag, message) = fixture.broker.inbound(delivery);

    let outcome = fixture.dispatcher.handle(QueueKind::Create, message).await;

    assert_eq!(outcome.state, PipelineState::Dropped);
    assert_eq!(outcome.reached, PipelineState::Received);
    assert_eq!(fixture.broker.acked(), vec![tag]);
}

#[tokio::test]
async fn create_of_missing_object_reports_failure_result() {
    let fixture = Fixture::new();
    let (_, message) = fixture
        .broker
        .inbound(MemoryDelivery::new("c", "r", request("create", "alice", "absent", "")));

    let outcome = fixture.dispatcher.handle(QueueKind::Create, message).await;

    assert_eq!(outcome.reached, PipelineState::Materializing);
    let value = body(&fixture.reply().await);
    assert_eq!(value["result"], "failure");
    assert_eq!(value["error_code"], "materialization_failed");
    assert!(!fixture.live_path(&DatabaseKey::new("alice", "absent").unwrap()).exists());
}

#[tokio::test]
async fn create_queue_ignores_operation_label() {
    let fixture = Fixture::new();
    let (_, message) = fixture
        .broker
        .inbound(MemoryDelivery::new("c", "r", request("tables", "alice", "db1", "")));

    fixture.dispatcher.handle(QueueKind::Create, message).await;

    assert_eq!(body(&fixture.reply().await)["result"], "success");
    assert!(fixture.live_path(&DatabaseKey::new("alice", "db1").unwrap()).exists());
}

#[tokio::test]
async fn query_on_unmaterialized_database_is_not_found() {
    let fixture = Fixture::new();
    let (_, message) = fixture
        .broker
        .inbound(MemoryDelivery::new("c", "r", request("query", "alice", "db1", "SELECT 1")));

    let outcome = fixture.dispatcher.handle(QueueKind::Query, message).await;

    assert_eq!(outcome.error_kind, Some("not_found"));
    let value = body(&fixture.reply().await);
    assert_eq!(value["error_code"], "not_found");
    assert!(value.get("results").is_none());
}

#[tokio::test]
async fn traversal_key_is_rejected_before_touching_disk() {
    let fixture = Fixture::new();
    let (_, message) = fixture
        .broker
        .inbound(MemoryDelivery::new("c", "r", request("delete", "..", "db1", "")));

    let outcome = fixture.dispatcher.handle(QueueKind::Query, message).await;

    assert_eq!(outcome.error_kind, Some("decode_error"));
    assert_eq!(body(&fixture.reply().await)["error_code"], "decode_error");
}

#[tokio::test]
async fn publish_failure_is_logged_and_delivery_still_acked() {
    let fixture = Fixture::new();
    fixture.broker.set_publish_failure(true);
    let (tag, message) = fixture
        .broker
        .inbound(MemoryDelivery::new("c", "r", request("tables", "alice", "db1", "")));

    let outcome = fixture.dispatcher.handle(QueueKind::Query, message).await;

    assert_eq!(outcome.state, PipelineState::Responded);
    assert_eq!(fixture.broker.acked(), vec![tag]);
    assert!(
        fixture
            .audit
            .events()
            .iter()
            .any(|event| matches!(event, NodeAuditEvent::BrokerFailure(_)))
    );
}

#[tokio::test]
async fn query_operations_round_trip_through_dispatcher() {
    let fixture = Fixture::new();
    let (_, create) = fixture
        .broker
        .inbound(MemoryDelivery::new("c0", "r", request("create", "alice", "db1", "")));
    fixture.dispatcher.handle(QueueKind::Query, create).await;
    assert_eq!(body(&fixture.reply().await)["result"], "success");

    let cases = [
        ("columns", "t1"),
        ("execute", "UPDATE t1 SET label = 'changed' WHERE id = 1"),
        ("query", "SELECT label FROM t1 ORDER BY id"),
        ("size", ""),
        ("delete", ""),
    ];
    let mut replies = Vec::new();
    for (operation, query) in cases {
        let (_, message) = fixture
            .broker
            .inbound(MemoryDelivery::new(operation, "r", request(operation, "alice", "db1", query)));
        fixture.dispatcher.handle(QueueKind::Query, message).await;
        replies.push(body(&fixture.reply().await));
    }

    assert_eq!(replies[0]["pk_columns"], json!(["id"]));
    assert_eq!(replies[0]["columns"][1]["name"], "label");
    assert_eq!(replies[1]["rows_changed"], 1);
    assert_eq!(replies[2]["results"]["columns"], json!(["label"]));
    assert_eq!(replies[2]["results"]["rows"][0][0], json!({"type": "text", "value": "changed"}));
    assert!(replies[3]["size"].as_u64().unwrap() > 0);
    assert_eq!(replies[4], json!({"node": NODE, "error": ""}));
    assert!(!fixture.live_path(&DatabaseKey::new("alice", "db1").unwrap()).exists());
}

#[tokio::test]
async fn audit_records_query_length_but_not_text() {
    let fixture = Fixture::new();
    let (_, create) = fixture
        .broker
        .inbound(MemoryDelivery::new("c0", "r", request("create", "alice", "db1", "")));
    fixture.dispatcher.handle(QueueKind::Create, create).await;
    fixture.reply().await;
    let sql = "SELECT 'confidential-marker'";
    let (_, message) =
        fixture.broker.inbound(MemoryDelivery::new("c1", "r", request("query", "alice", "db1", sql)));

    fixture.dispatcher.handle(QueueKind::Query, message).await;
    fixture.reply().await;

    let events = fixture.audit.events();
    let logged = serde_json::to_string(&events).unwrap();
    assert!(!logged.contains("confidential-marker"));
    let request_event = events
        .iter()
        .rev()
        .find_map(|event| match event {
            NodeAuditEvent::Request(request) => Some(request.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(request_event.query_bytes, sql.len());
    assert_eq!(request_event.requesting_user, "bob");
    assert_eq!(request_event.operation, "query");
}
