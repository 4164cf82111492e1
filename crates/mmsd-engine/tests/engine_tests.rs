// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the transaction engine.
//!
//! Each test builds an isolated TestHarness with a temp SQLite store, a
//! mock bearer and a scripted MMSC. Tests are independent and
//! order-insensitive.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use mmsd_config::model::MmsdConfig;
use mmsd_core::{
    AdapterType, BearerError, Direction, HealthStatus, Message, MessageEvent, MessageFilter,
    MessageId, MmsdError, PluginAdapter, StorageAdapter, TransactionState, TransferError,
};
use mmsd_engine::{Attachment, BearerController, Engine, SendRequest};
use mmsd_pdu::content_type::MULTIPART_RELATED;
use mmsd_pdu::{MmsStatus, ResponseStatus, TimeValue};
use mmsd_storage::SqliteStore;
use mmsd_test_utils::{MockBearer, MockMmsc, TestHarness, pdus};

const LOCATION: &str = "http://mmsc.example/x1";

/// Polls `condition` until it holds or five seconds pass.
async fn eventually(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

fn retrieved_body() -> Vec<u8> {
    pdus::retrieve_conf_bytes(pdus::retrieve_conf("msg-in-1", pdus::text_and_image()))
}

fn text_request() -> SendRequest {
    SendRequest::to("+1 555 222 4444")
        .with_attachment(Attachment::new("text/plain", b"see you at eight".to_vec()))
}

fn assert_bearer_idle(h: &TestHarness) {
    assert_eq!(h.engine.bearer().holders(), 0, "leases left behind");
    assert_eq!(
        h.bearer.activations(),
        h.bearer.deactivations(),
        "every activation should be matched by a deactivation"
    );
}

// ---- Inbound retrieval ----

#[tokio::test]
async fn test_inbound_notification_is_retrieved_and_acknowledged() {
    let h = TestHarness::builder().build().await.unwrap();

    let id = h.deliver("x1", LOCATION, retrieved_body()).await.unwrap();
    assert_eq!(h.wait(&id).await, TransactionState::Completed);

    let msg = h.message(&id).await;
    assert_eq!(msg.direction, Direction::Inbound);
    assert_eq!(msg.parts.len(), 2);
    assert!(msg.parts[0].content_type.starts_with("text/plain"));
    assert_eq!(msg.parts[1].filename.as_deref(), Some("beach.jpg"));
    assert_eq!(msg.headers.message_id.as_deref(), Some("msg-in-1"));
    assert_eq!(msg.headers.subject.as_deref(), Some("Holiday pictures"));
    assert_eq!(msg.retry.attempts, 1);
    assert!(!msg.read);

    assert_eq!(h.mmsc.gets(), vec![LOCATION.to_string()]);
    let acks = h.mmsc.notify_resps();
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].transaction_id, "x1");
    assert_eq!(acks[0].status, MmsStatus::Retrieved);
    assert_eq!(acks[0].report_allowed, Some(false));
    assert!(h.mmsc.delivery_inds().is_empty());

    assert_eq!(
        h.states(&id),
        vec![
            TransactionState::BearerWait,
            TransactionState::Transferring,
            TransactionState::Decoding,
            TransactionState::Completed,
        ]
    );
    assert!(h.events().contains(&MessageEvent::Received { id: id.clone() }));
    h.assert_valid_transitions();
    assert_bearer_idle(&h);
}

#[tokio::test]
async fn test_exchanges_use_the_bearer_settings() {
    let h = TestHarness::builder().build().await.unwrap();
    let id = h.deliver("x1", LOCATION, retrieved_body()).await.unwrap();
    h.wait(&id).await;

    let requests = h.mmsc.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.bearer == *h.bearer.settings()));
    // The acknowledgement goes to the MMSC the bearer announced.
    assert_eq!(requests[1].url, mmsd_test_utils::mock_bearer::MOCK_MMSC);
}

#[tokio::test]
async fn test_duplicate_notification_is_ignored() {
    let h = TestHarness::builder().build().await.unwrap();

    let first = h.deliver("dup1", LOCATION, retrieved_body()).await;
    let second = h.deliver("dup1", LOCATION, retrieved_body()).await;
    assert!(first.is_some());
    assert!(second.is_none());

    h.wait(&first.unwrap()).await;
    let all = h.engine.list_messages(&MessageFilter::default()).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(h.mmsc.gets().len(), 1);
}

#[tokio::test]
async fn test_notification_without_location_is_dropped() {
    let h = TestHarness::builder().build().await.unwrap();

    let push = pdus::notification_push(pdus::notification("n1", ""));
    assert_eq!(h.engine.handle_push(&push).await.unwrap(), None);
    assert!(
        h.engine
            .list_messages(&MessageFilter::default())
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_garbage_push_is_a_codec_error() {
    let h = TestHarness::builder().build().await.unwrap();
    let err = h.engine.handle_push(&[0x01, 0x06, 0x00]).await.unwrap_err();
    assert!(matches!(err, MmsdError::Codec(_)), "got {err:?}");
}

#[tokio::test]
async fn test_missing_content_fails_without_retry() {
    let h = TestHarness::builder().build().await.unwrap();

    let push = pdus::notification_push(pdus::notification("gone1", "http://mmsc.example/gone"));
    let id = h.engine.handle_push(&push).await.unwrap().unwrap();
    assert_eq!(h.wait(&id).await, TransactionState::Failed);

    let msg = h.message(&id).await;
    assert_eq!(msg.retry.attempts, 1);
    assert!(msg.failure.unwrap().contains("404"));
    assert_eq!(h.mmsc.gets().len(), 1);
    assert!(
        h.events()
            .iter()
            .any(|e| matches!(e, MessageEvent::ReceiveFailed { id: failed, .. } if *failed == id))
    );
    assert_bearer_idle(&h);
}

#[tokio::test]
async fn test_timeout_is_retried() {
    let h = TestHarness::builder().build().await.unwrap();
    h.mmsc.fail_next_get(TransferError::Timeout);

    let id = h.deliver("slow1", LOCATION, retrieved_body()).await.unwrap();
    assert_eq!(h.wait(&id).await, TransactionState::Completed);
    assert_eq!(h.mmsc.gets().len(), 2);
    assert_eq!(h.message(&id).await.retry.attempts, 2);
    h.assert_valid_transitions();
}

#[tokio::test]
async fn test_slow_mmsc_hits_exchange_timeout_and_is_retried() {
    let h = TestHarness::builder()
        .with_config(|c| c.transfer.timeout_secs = 1)
        .build()
        .await
        .unwrap();
    h.mmsc.set_delay(Duration::from_secs(5));

    let id = h.deliver("slow2", LOCATION, retrieved_body()).await.unwrap();
    eventually("the first GET", || h.mmsc.gets().len() == 1).await;
    h.mmsc.set_delay(Duration::ZERO);

    assert_eq!(h.wait(&id).await, TransactionState::Completed);
    assert_eq!(h.mmsc.gets().len(), 2);
    assert_eq!(h.message(&id).await.retry.attempts, 2);
    h.assert_valid_transitions();
}

#[tokio::test]
async fn test_expires_while_backing_off() {
    let h = TestHarness::builder()
        .with_config(|c| {
            c.engine.max_attempts = 10;
            c.engine.initial_backoff_secs = 60;
            c.engine.max_backoff_secs = 60;
        })
        .build()
        .await
        .unwrap();
    h.mmsc.publish(LOCATION, retrieved_body());
    h.mmsc.fail_next_get(TransferError::Timeout);
    let mut notification = pdus::notification("exp2", LOCATION);
    notification.expiry = TimeValue::Relative(2);

    let id = h
        .engine
        .handle_push(&pdus::notification_push(notification))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(h.wait(&id).await, TransactionState::Expired);
    assert_eq!(
        h.states(&id),
        vec![
            TransactionState::BearerWait,
            TransactionState::Transferring,
            TransactionState::BearerWait,
            TransactionState::Expired,
        ]
    );
    let msg = h.message(&id).await;
    assert_eq!(msg.retry.attempts, 1);
    assert_eq!(h.mmsc.gets().len(), 1);
    h.assert_valid_transitions();
}

#[tokio::test]
async fn test_finished_messages_leave_no_locks_behind() {
    let h = TestHarness::builder().build().await.unwrap();
    let mut ids = Vec::new();
    for n in 0..5 {
        let location = format!("http://mmsc.example/lock{n}");
        ids.push(
            h.deliver(&format!("lock{n}"), &location, retrieved_body())
                .await
                .unwrap(),
        );
    }
    for id in &ids {
        assert_eq!(h.wait(id).await, TransactionState::Completed);
    }
    h.engine.mark_read(&ids[0]).await.unwrap();

    eventually("drivers to finish", || h.engine.active_drivers() == 0).await;
    assert_eq!(h.engine.locked_messages(), 0);
}

#[tokio::test]
async fn test_bearer_failure_is_retried() {
    let h = TestHarness::builder().build().await.unwrap();
    h.bearer.fail_next(BearerError::NoCoverage);

    let id = h.deliver("cov1", LOCATION, retrieved_body()).await.unwrap();
    assert_eq!(h.wait(&id).await, TransactionState::Completed);
    assert_eq!(h.bearer.activations(), 2);
    assert_eq!(
        h.states(&id),
        vec![
            TransactionState::BearerWait,
            TransactionState::BearerWait,
            TransactionState::BearerWait,
            TransactionState::Transferring,
            TransactionState::Decoding,
            TransactionState::Completed,
        ]
    );
    h.assert_valid_transitions();
}

#[tokio::test]
async fn test_undecodable_content_is_rejected_as_unrecognised() {
    let h = TestHarness::builder().build().await.unwrap();

    let id = h.deliver("bad1", LOCATION, vec![0x8C, 0x84, 0x98]).await.unwrap();
    assert_eq!(h.wait(&id).await, TransactionState::Failed);

    let acks = h.mmsc.notify_resps();
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].status, MmsStatus::Unrecognised);
    assert!(h.message(&id).await.failure.unwrap().contains("Retrieve-Conf"));
}

#[tokio::test]
async fn test_retrieve_status_error_fails_message() {
    let h = TestHarness::builder().build().await.unwrap();
    let mut conf = pdus::retrieve_conf("msg-x", Vec::new());
    conf.retrieve_status = Some(ResponseStatus::ERROR_PERMANENT_MESSAGE_NOT_FOUND);

    let id = h
        .deliver("st1", LOCATION, pdus::retrieve_conf_bytes(conf))
        .await
        .unwrap();
    assert_eq!(h.wait(&id).await, TransactionState::Failed);
    assert!(
        h.message(&id)
            .await
            .failure
            .unwrap()
            .contains("Error-permanent-message-not-found")
    );
}

#[tokio::test]
async fn test_delivery_report_is_sent_when_requested_and_enabled() {
    let h = TestHarness::builder()
        .with_config(|c| c.engine.send_delivery_reports = true)
        .build()
        .await
        .unwrap();
    h.mmsc.publish(LOCATION, retrieved_body());
    let mut notification = pdus::notification("dr1", LOCATION);
    notification.delivery_report = Some(true);

    let id = h
        .engine
        .handle_push(&pdus::notification_push(notification))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(h.wait(&id).await, TransactionState::Completed);
    assert_eq!(h.mmsc.notify_resps()[0].report_allowed, Some(true));

    eventually("delivery report", || !h.mmsc.delivery_inds().is_empty()).await;
    let reports = h.mmsc.delivery_inds();
    assert_eq!(reports[0].message_id, "msg-in-1");
    assert_eq!(reports[0].status, MmsStatus::Retrieved);
}

async fn deliver_with_flags(h: &TestHarness, tid: &str, on_notification: bool, on_conf: bool) {
    let mut conf = pdus::retrieve_conf("msg-in-1", pdus::text_and_image());
    conf.delivery_report = Some(on_conf);
    h.mmsc.publish(LOCATION, pdus::retrieve_conf_bytes(conf));
    let mut notification = pdus::notification(tid, LOCATION);
    notification.delivery_report = Some(on_notification);

    let id = h
        .engine
        .handle_push(&pdus::notification_push(notification))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(h.wait(&id).await, TransactionState::Completed);
}

#[tokio::test]
async fn test_delivery_report_follows_notification_flag() {
    let h = TestHarness::builder()
        .with_config(|c| c.engine.send_delivery_reports = true)
        .build()
        .await
        .unwrap();
    deliver_with_flags(&h, "dr2", true, false).await;

    eventually("delivery report", || h.mmsc.delivery_inds().len() == 1).await;
    assert_eq!(h.mmsc.delivery_inds()[0].message_id, "msg-in-1");
}

#[tokio::test]
async fn test_retrieve_conf_flag_does_not_request_delivery_report() {
    let h = TestHarness::builder()
        .with_config(|c| c.engine.send_delivery_reports = true)
        .build()
        .await
        .unwrap();
    deliver_with_flags(&h, "dr3", false, true).await;

    eventually("the lease to be returned", || h.engine.bearer().holders() == 0).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(h.mmsc.delivery_inds().is_empty());
    assert_eq!(h.mmsc.notify_resps().len(), 1);
}

#[tokio::test]
async fn test_delivery_report_without_modem_number_uses_retrieved_recipient() {
    let h = TestHarness::builder()
        .with_config(|c| {
            c.engine.send_delivery_reports = true;
            c.carrier.modem_number = None;
        })
        .build()
        .await
        .unwrap();
    deliver_with_flags(&h, "dr4", true, false).await;

    eventually("delivery report", || h.mmsc.delivery_inds().len() == 1).await;
    let report = &h.mmsc.delivery_inds()[0];
    assert_eq!(report.to.len(), 1);
    assert_eq!(report.to[0].text, "+15552223333/TYPE=PLMN");
}

#[tokio::test]
async fn test_expired_notification_is_never_fetched() {
    let h = TestHarness::builder().build().await.unwrap();
    h.mmsc.publish(LOCATION, retrieved_body());
    let mut notification = pdus::notification("old1", LOCATION);
    notification.expiry = TimeValue::Absolute(1_000_000);

    let id = h
        .engine
        .handle_push(&pdus::notification_push(notification))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(h.wait(&id).await, TransactionState::Expired);
    assert!(h.mmsc.gets().is_empty());
    assert!(h.events().contains(&MessageEvent::Expired { id }));
    assert_eq!(h.bearer.activations(), 0);
}

// ---- Outbound submission ----

#[tokio::test]
async fn test_send_completes_and_records_message_id() {
    let h = TestHarness::builder().build().await.unwrap();

    let id = h.engine.send_message(text_request()).await.unwrap();
    assert_eq!(id.as_str().len(), 16);
    assert_eq!(h.wait(&id).await, TransactionState::Completed);

    let msg = h.message(&id).await;
    assert_eq!(msg.direction, Direction::Outbound);
    assert_eq!(msg.headers.message_id, Some(format!("msg-{id}")));
    assert_eq!(msg.headers.to, vec!["+15552224444/TYPE=PLMN".to_string()]);
    assert!(msg.confirmation.is_some());

    let sent = h.mmsc.send_reqs();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].transaction_id, id.as_str());
    assert_eq!(sent[0].from.address(), Some("+15552223333/TYPE=PLMN"));
    assert_eq!(sent[0].parts.len(), 1);

    assert_eq!(
        h.states(&id),
        vec![
            TransactionState::BearerWait,
            TransactionState::Transferring,
            TransactionState::AwaitingAck,
            TransactionState::Completed,
        ]
    );
    assert!(h.events().contains(&MessageEvent::SendCompleted { id }));
    assert_bearer_idle(&h);
}

#[tokio::test]
async fn test_transient_failures_then_ok_take_four_posts() {
    let h = TestHarness::builder().build().await.unwrap();
    for _ in 0..3 {
        h.mmsc
            .script_send_status(ResponseStatus::ERROR_TRANSIENT_NETWORK_PROBLEM);
    }

    let id = h.engine.send_message(text_request()).await.unwrap();
    assert_eq!(h.wait(&id).await, TransactionState::Completed);
    assert_eq!(h.mmsc.send_reqs().len(), 4);

    let msg = h.message(&id).await;
    assert_eq!(msg.retry.attempts, 4);
    assert!(msg.failure.is_none());
    h.assert_valid_transitions();
    assert_bearer_idle(&h);
}

#[tokio::test]
async fn test_exhausted_retries_fail_within_budget() {
    let h = TestHarness::builder()
        .with_config(|c| c.engine.max_attempts = 3)
        .build()
        .await
        .unwrap();
    for _ in 0..5 {
        h.mmsc.script_send(Err(TransferError::Status(503)));
    }

    let id = h.engine.send_message(text_request()).await.unwrap();
    assert_eq!(h.wait(&id).await, TransactionState::Failed);

    let msg = h.message(&id).await;
    assert_eq!(msg.retry.attempts, 3);
    assert!(msg.retry.attempts <= msg.retry.max_attempts);
    assert!(msg.failure.unwrap().contains("gave up after 3 attempts"));
    assert_eq!(h.mmsc.send_reqs().len(), 3);
    h.assert_valid_transitions();
}

#[tokio::test]
async fn test_permanent_rejection_is_not_retried() {
    let h = TestHarness::builder().build().await.unwrap();
    h.mmsc
        .script_send_status(ResponseStatus::ERROR_PERMANENT_SERVICE_DENIED);

    let id = h.engine.send_message(text_request()).await.unwrap();
    assert_eq!(h.wait(&id).await, TransactionState::Failed);
    assert_eq!(h.mmsc.send_reqs().len(), 1);

    let failure = h.message(&id).await.failure.unwrap();
    assert!(failure.contains("Error-permanent-service-denied"), "{failure}");
    assert!(h.events().iter().any(
        |e| matches!(e, MessageEvent::SendFailed { id: failed, reason } if *failed == id && *reason == failure)
    ));
}

#[tokio::test]
async fn test_retry_message_restarts_a_failed_send() {
    let h = TestHarness::builder().build().await.unwrap();
    h.mmsc
        .script_send_status(ResponseStatus::ERROR_PERMANENT_FAILURE);

    let id = h.engine.send_message(text_request()).await.unwrap();
    assert_eq!(h.wait(&id).await, TransactionState::Failed);

    h.engine.retry_message(&id).await.unwrap();
    assert_eq!(h.wait(&id).await, TransactionState::Completed);
    assert_eq!(h.mmsc.send_reqs().len(), 2);
    assert_eq!(h.message(&id).await.retry.attempts, 1);
    h.assert_valid_transitions();

    let err = h.engine.retry_message(&id).await.unwrap_err();
    assert!(matches!(err, MmsdError::InvalidTransition { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_smil_send_is_multipart_related() {
    let h = TestHarness::builder().build().await.unwrap();
    let mut request = text_request()
        .with_attachment(Attachment::new("image/png", vec![0x89, 0x50]).with_filename("dot.png"));
    request.smil = Some("<smil><body/></smil>".to_string());
    request.subject = Some("Dinner".to_string());

    let id = h.engine.send_message(request).await.unwrap();
    h.wait(&id).await;

    let sent = h.mmsc.send_reqs();
    assert_eq!(sent[0].content_type.media_type, MULTIPART_RELATED);
    assert_eq!(sent[0].parts.len(), 3);
    assert_eq!(sent[0].parts[0].content_id.as_deref(), Some("<smil>"));
    assert_eq!(sent[0].subject.as_ref().map(|s| s.text.as_str()), Some("Dinner"));
    assert_eq!(h.message(&id).await.parts.len(), 3);
}

#[tokio::test]
async fn test_invalid_send_requests_are_refused() {
    let h = TestHarness::builder()
        .with_config(|c| c.service.max_attachments = 1)
        .build()
        .await
        .unwrap();

    let no_recipient = SendRequest::default();
    assert!(matches!(
        h.engine.send_message(no_recipient).await,
        Err(MmsdError::InvalidRequest(_))
    ));

    let too_many = text_request().with_attachment(Attachment::new("text/plain", vec![1]));
    assert!(matches!(
        h.engine.send_message(too_many).await,
        Err(MmsdError::InvalidRequest(_))
    ));

    assert!(
        h.engine
            .list_messages(&MessageFilter::default())
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_delivery_report_updates_sent_message() {
    let h = TestHarness::builder().build().await.unwrap();
    let id = h.engine.send_message(text_request()).await.unwrap();
    h.wait(&id).await;

    let push = pdus::delivery_push(&format!("msg-{id}"), MmsStatus::Retrieved);
    assert_eq!(h.engine.handle_push(&push).await.unwrap(), None);

    let msg = h.message(&id).await;
    assert_eq!(msg.delivery_status.as_deref(), Some("retrieved"));
    assert!(h.events().contains(&MessageEvent::DeliveryReport {
        id,
        status: "retrieved".to_string(),
    }));
}

// ---- Concurrency and bearer sharing ----

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_messages_share_the_bearer() {
    let h = TestHarness::builder().build().await.unwrap();

    let mut ids = Vec::new();
    for n in 0..4 {
        ids.push(h.engine.send_message(text_request()).await.unwrap());
        let location = format!("http://mmsc.example/c{n}");
        ids.push(
            h.deliver(&format!("c{n}"), &location, retrieved_body())
                .await
                .unwrap(),
        );
    }
    for id in &ids {
        assert_eq!(h.wait(id).await, TransactionState::Completed);
    }

    assert_eq!(h.mmsc.send_reqs().len(), 4);
    assert_eq!(h.mmsc.gets().len(), 4);
    h.assert_valid_transitions();
    eventually("drivers to exit", || h.engine.active_drivers() == 0).await;
    assert_bearer_idle(&h);
}

// ---- Client operations ----

#[tokio::test]
async fn test_mark_read_and_list_filters() {
    let h = TestHarness::builder().build().await.unwrap();
    let inbound = h.deliver("r1", LOCATION, retrieved_body()).await.unwrap();
    let outbound = h.engine.send_message(text_request()).await.unwrap();
    h.wait(&inbound).await;
    h.wait(&outbound).await;

    let unread = MessageFilter {
        read: Some(false),
        ..MessageFilter::default()
    };
    let listed = h.engine.list_messages(&unread).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, inbound);

    h.engine.mark_read(&inbound).await.unwrap();
    assert!(h.engine.list_messages(&unread).await.unwrap().is_empty());

    let outgoing = MessageFilter {
        direction: Some(Direction::Outbound),
        ..MessageFilter::default()
    };
    let listed = h.engine.list_messages(&outgoing).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, outbound);

    let missing = MessageId::from("nope");
    assert!(matches!(
        h.engine.mark_read(&missing).await,
        Err(MmsdError::NotFound { .. })
    ));
    assert!(matches!(
        h.engine.wait_for_terminal(&missing).await,
        Err(MmsdError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_delete_cancels_in_flight_transfer() {
    let h = TestHarness::builder().build().await.unwrap();
    h.mmsc.set_delay(Duration::from_secs(30));

    let id = h.deliver("del1", LOCATION, retrieved_body()).await.unwrap();
    eventually("the GET to start", || h.mmsc.gets().len() == 1).await;

    h.engine.delete_message(&id).await.unwrap();
    assert!(matches!(
        h.engine.get_message(&id).await,
        Err(MmsdError::NotFound { .. })
    ));
    assert!(h.events().contains(&MessageEvent::Removed { id: id.clone() }));

    eventually("the driver to stop", || h.engine.active_drivers() == 0).await;
    eventually("the lease to be returned", || h.engine.bearer().holders() == 0).await;
    assert!(matches!(
        h.engine.delete_message(&id).await,
        Err(MmsdError::NotFound { .. })
    ));
}

// ---- Recovery ----

fn seeded(id: &str, direction: Direction, state: TransactionState) -> Message {
    let mut msg = Message::new(MessageId::from(id), direction, 5, Utc::now());
    msg.state = state;
    msg.retry.attempts = 1;
    msg
}

#[tokio::test]
async fn test_awaiting_ack_resumes_without_second_post() {
    let mut msg = seeded("resume1", Direction::Outbound, TransactionState::AwaitingAck);
    msg.raw_pdu = Some(vec![0x8C, 0x80]);
    msg.confirmation = Some(pdus::send_conf(ResponseStatus::OK, Some("msg-resumed")));

    let h = TestHarness::builder().with_message(msg).build().await.unwrap();
    let id = MessageId::from("resume1");
    assert_eq!(h.wait(&id).await, TransactionState::Completed);

    assert!(h.mmsc.requests().is_empty(), "nothing should be re-sent");
    assert_eq!(
        h.message(&id).await.headers.message_id.as_deref(),
        Some("msg-resumed")
    );
}

#[tokio::test]
async fn test_decoding_resumes_from_stored_bytes() {
    let mut msg = seeded("resume2", Direction::Inbound, TransactionState::Decoding);
    msg.headers.content_location = Some(LOCATION.to_string());
    msg.raw_pdu = Some(retrieved_body());

    let h = TestHarness::builder().with_message(msg).build().await.unwrap();
    let id = MessageId::from("resume2");
    assert_eq!(h.wait(&id).await, TransactionState::Completed);

    assert!(h.mmsc.gets().is_empty());
    assert_eq!(h.mmsc.notify_resps().len(), 1);
    assert_eq!(h.message(&id).await.parts.len(), 2);
}

#[tokio::test]
async fn test_interrupted_transfer_is_retried() {
    let mut msg = seeded("resume3", Direction::Inbound, TransactionState::Transferring);
    msg.headers.content_location = Some(LOCATION.to_string());

    let h = TestHarness::builder()
        .with_message(msg)
        .stopped()
        .build()
        .await
        .unwrap();
    h.mmsc.publish(LOCATION, retrieved_body());
    h.engine.start().await.unwrap();

    let id = MessageId::from("resume3");
    assert_eq!(h.wait(&id).await, TransactionState::Completed);
    assert_eq!(h.mmsc.gets().len(), 1);
    assert_eq!(h.message(&id).await.retry.attempts, 2);
    h.assert_valid_transitions();
}

#[tokio::test]
async fn test_restart_keeps_finished_messages() {
    let mut h = TestHarness::builder().build().await.unwrap();
    let id = h.deliver("keep1", LOCATION, retrieved_body()).await.unwrap();
    h.wait(&id).await;

    h.restart().await.unwrap();
    assert_eq!(h.message(&id).await.state, TransactionState::Completed);
    assert_eq!(h.engine.active_drivers(), 0);
    assert_eq!(h.mmsc.gets().len(), 1);
}

#[tokio::test]
async fn test_retention_sweep_removes_old_terminal_messages() {
    let mut old = seeded("old", Direction::Inbound, TransactionState::Completed);
    old.updated_at = Utc::now() - chrono::Duration::days(40);
    let recent = seeded("recent", Direction::Inbound, TransactionState::Completed);
    let mut stuck = seeded("stuck", Direction::Inbound, TransactionState::BearerWait);
    stuck.updated_at = Utc::now() - chrono::Duration::days(40);

    let h = TestHarness::builder()
        .with_config(|c| c.storage.retention_days = Some(30))
        .with_message(old)
        .with_message(recent)
        .with_message(stuck)
        .stopped()
        .build()
        .await
        .unwrap();

    assert_eq!(h.engine.sweep_retention().await.unwrap(), 1);
    let left: Vec<String> = h
        .engine
        .list_messages(&MessageFilter::default())
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.id.0)
        .collect();
    assert_eq!(left, vec!["recent".to_string(), "stuck".to_string()]);
    assert!(h.events().contains(&MessageEvent::Removed {
        id: MessageId::from("old")
    }));
}

// ---- Shutdown and fatal errors ----

#[tokio::test]
async fn test_shutdown_stops_engine() {
    let h = TestHarness::builder().build().await.unwrap();
    h.engine.shutdown().await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), h.engine.stopped())
        .await
        .expect("engine should report stopped");
    assert!(h.engine.fatal_error().is_none());
}

/// Store whose writes start failing on demand.
struct BrokenStore {
    inner: SqliteStore,
    broken: AtomicBool,
}

#[async_trait]
impl PluginAdapter for BrokenStore {
    fn name(&self) -> &str {
        "broken"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, MmsdError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MmsdError> {
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for BrokenStore {
    async fn initialize(&self) -> Result<(), MmsdError> {
        self.inner.initialize().await
    }

    async fn close(&self) -> Result<(), MmsdError> {
        self.inner.close().await
    }

    async fn create(&self, msg: &Message) -> Result<(), MmsdError> {
        self.inner.create(msg).await
    }

    async fn put(&self, msg: &Message) -> Result<(), MmsdError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(MmsdError::Storage {
                source: "disk full".into(),
            });
        }
        self.inner.put(msg).await
    }

    async fn get(&self, id: &MessageId) -> Result<Option<Message>, MmsdError> {
        self.inner.get(id).await
    }

    async fn list(&self, filter: &MessageFilter) -> Result<Vec<Message>, MmsdError> {
        self.inner.list(filter).await
    }

    async fn delete(&self, id: &MessageId) -> Result<bool, MmsdError> {
        self.inner.delete(id).await
    }
}

#[tokio::test]
async fn test_store_failure_is_fatal() {
    let store = Arc::new(BrokenStore {
        inner: SqliteStore::in_memory(),
        broken: AtomicBool::new(true),
    });
    store.initialize().await.unwrap();
    let config = MmsdConfig::default();
    let bearer = BearerController::from_config(Arc::new(MockBearer::new()), &config.bearer);
    let mmsc = Arc::new(MockMmsc::new());
    let engine = Engine::new(&config, store.clone(), bearer, mmsc);
    engine.start().await.unwrap();

    let push = pdus::notification_push(pdus::notification("f1", LOCATION));
    engine.handle_push(&push).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), engine.stopped())
        .await
        .expect("a store failure should stop the engine");
    assert!(engine.fatal_error().unwrap().contains("disk full"));
}
