use fake::Fake;
use lib::{
    enrollments::{
        external::ExternalSystemClient,
        log::EnrollmentLog,
        record::EnrollmentRecord,
        syncer::EnrollmentSyncer,
    },
    skylearn::{
        client::SkyLearnClient,
        models::{Identifier, Subscription, Transaction},
    },
    telemetry::StatsD,
};
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use std::path::Path;
use tempfile::tempdir;
use wiremock::{
    matchers::{body_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::utils::read_log;

// Nothing listens on port 1
const UNREACHABLE: &str = "http://127.0.0.1:1";

fn unused_api() -> SkyLearnClient {
    SkyLearnClient::new(UNREACHABLE, &SecretString::new("key".to_string())).unwrap()
}

fn transaction(id: &str, course_id: Option<u64>) -> Transaction {
    let user_id: u64 = (1..10_000).fake();
    serde_json::from_value(json!({
        "id": id,
        "user_id": user_id,
        "course_id": course_id,
        "amount": 19.5,
        "currency": "GBP",
        "created_at": "2024-05-01T10:00:00",
        "status": "paid",
    }))
    .unwrap()
}

fn subscription(plan_id: &str) -> Subscription {
    serde_json::from_value(json!({
        "id": "sub_1",
        "user_id": 31,
        "plan_id": plan_id,
        "created_at": "2024-03-01T09:00:00",
        "status": "active",
    }))
    .unwrap()
}

fn syncer<'a>(
    api: &'a SkyLearnClient,
    statsd: &'a StatsD,
    log_file: &Path,
    external: Option<&str>,
) -> EnrollmentSyncer<'a> {
    EnrollmentSyncer::new(
        api,
        statsd,
        EnrollmentLog::new(log_file),
        external.map(|url| ExternalSystemClient::new(url).unwrap()),
    )
}

#[tokio::test]
async fn transaction_from_the_billing_api_is_logged() {
    let dir = tempdir().unwrap();
    let log_file = dir.path().join("enrollment_sync.log");
    let (api, statsd) = (unused_api(), StatsD::nop());
    let mut syncer = syncer(&api, &statsd, &log_file, None);
    let tx: Transaction = serde_json::from_value(json!({
        "id": "t1",
        "user_id": 7,
        "course_id": 101,
        "amount": 49.99,
        "currency": "USD",
    }))
    .unwrap();

    assert!(syncer.process_transaction(&tx).await.unwrap());

    let entries = read_log(&log_file);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["action"], "enrollment_processed");
    assert_eq!(entries[0]["data"]["user_id"], 7);
    assert_eq!(entries[0]["data"]["course_id"], 101);
    assert_eq!(entries[0]["data"]["source"], "skylearn_billing_pro");
    assert!(syncer.has_processed(&Identifier::from("t1")));
}

#[tokio::test]
async fn transaction_is_only_processed_once_per_run() {
    let dir = tempdir().unwrap();
    let log_file = dir.path().join("enrollment_sync.log");
    let (api, statsd) = (unused_api(), StatsD::nop());
    let mut syncer = syncer(&api, &statsd, &log_file, None);
    let tx = transaction("t-dup", Some(104));

    assert!(syncer.process_transaction(&tx).await.unwrap());
    assert!(!syncer.process_transaction(&tx).await.unwrap());
    assert!(!syncer.process_transaction(&tx.clone()).await.unwrap());

    assert_eq!(read_log(&log_file).len(), 1);
}

#[tokio::test]
async fn transaction_without_course_is_skipped() {
    let dir = tempdir().unwrap();
    let log_file = dir.path().join("enrollment_sync.log");
    let (api, statsd) = (unused_api(), StatsD::nop());
    let mut syncer = syncer(&api, &statsd, &log_file, None);

    assert!(!syncer
        .process_transaction(&transaction("t-none", None))
        .await
        .unwrap());
    assert!(!syncer
        .process_transaction(&transaction("t-zero", Some(0)))
        .await
        .unwrap());

    assert!(read_log(&log_file).is_empty());
    // Skipped transactions aren't remembered
    assert!(!syncer.has_processed(&Identifier::from("t-none")));
}

#[tokio::test]
async fn failed_log_write_leaves_transaction_unprocessed() {
    let dir = tempdir().unwrap();
    let (api, statsd) = (unused_api(), StatsD::nop());
    let mut syncer = syncer(&api, &statsd, dir.path(), None);
    let tx = transaction("t-io", Some(101));

    assert!(syncer.process_transaction(&tx).await.is_err());
    assert!(!syncer.has_processed(&tx.id));
}

#[tokio::test]
async fn subscription_plans_map_to_courses() {
    let dir = tempdir().unwrap();
    let log_file = dir.path().join("enrollment_sync.log");
    let (api, statsd) = (unused_api(), StatsD::nop());
    let syncer = syncer(&api, &statsd, &log_file, None);

    for (plan_id, expected) in [
        ("basic_plan", 2),
        ("premium_plan", 4),
        ("enterprise_plan", 6),
        ("student_plan", 0),
    ] {
        let written = syncer
            .process_subscription(&subscription(plan_id))
            .await
            .unwrap();
        assert_eq!(written, expected, "plan {}", plan_id);
    }

    let entries = read_log(&log_file);
    assert_eq!(entries.len(), 12);
    let basic_courses: Vec<u64> = entries[..2]
        .iter()
        .map(|entry| entry["data"]["course_id"].as_u64().unwrap())
        .collect();
    assert_eq!(basic_courses, vec![101, 102]);
    assert_eq!(entries[11]["data"]["plan_id"], "enterprise_plan");
    assert_eq!(entries[11]["data"]["course_id"], 106);
}

#[tokio::test]
async fn subscriptions_are_not_deduplicated() {
    let dir = tempdir().unwrap();
    let log_file = dir.path().join("enrollment_sync.log");
    let (api, statsd) = (unused_api(), StatsD::nop());
    let syncer = syncer(&api, &statsd, &log_file, None);
    let sub = subscription("basic_plan");

    syncer.process_subscription(&sub).await.unwrap();
    syncer.process_subscription(&sub).await.unwrap();

    assert_eq!(read_log(&log_file).len(), 4);
}

#[tokio::test]
async fn forwarded_record_matches_logged_record() {
    let dir = tempdir().unwrap();
    let log_file = dir.path().join("enrollment_sync.log");
    let tx = transaction("t-forward", Some(102));
    let expected = EnrollmentRecord::from_transaction(&tx).unwrap();
    let mock_lms = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/enrollments"))
        .and(body_json(&expected))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_lms)
        .await;
    let (api, statsd) = (unused_api(), StatsD::nop());
    let mut syncer = syncer(&api, &statsd, &log_file, Some(mock_lms.uri().as_str()));

    assert!(syncer.process_transaction(&tx).await.unwrap());

    let entries = read_log(&log_file);
    assert_eq!(entries[0]["data"], serde_json::to_value(&expected).unwrap());
}

#[tokio::test]
async fn unreachable_external_system_does_not_block_local_log() {
    let dir = tempdir().unwrap();
    let log_file = dir.path().join("enrollment_sync.log");
    let (api, statsd) = (unused_api(), StatsD::nop());
    let mut syncer = syncer(&api, &statsd, &log_file, Some(UNREACHABLE));
    let tx = transaction("t-offline", Some(103));
    let record = EnrollmentRecord::from_transaction(&tx).unwrap();

    assert!(!syncer.sync_to_external_system(&record).await);
    assert!(syncer.process_transaction(&tx).await.unwrap());
    assert_eq!(
        syncer
            .process_subscription(&subscription("premium_plan"))
            .await
            .unwrap(),
        4
    );

    assert_eq!(read_log(&log_file).len(), 5);
}

#[tokio::test]
async fn nothing_is_forwarded_without_an_external_system() {
    let dir = tempdir().unwrap();
    let log_file = dir.path().join("enrollment_sync.log");
    let (api, statsd) = (unused_api(), StatsD::nop());
    let syncer = syncer(&api, &statsd, &log_file, None);
    let record = EnrollmentRecord::from_transaction(&transaction("t-local", Some(101))).unwrap();

    assert!(!syncer.sync_to_external_system(&record).await);
    syncer.log_enrollment(&record).unwrap();
    assert_eq!(read_log(&log_file).len(), 1);
}

#[tokio::test]
async fn sync_recent_enrollments_error_aborts_the_batch() {
    let dir = tempdir().unwrap();
    let log_file = dir.path().join("enrollment_sync.log");
    let (api, statsd) = (unused_api(), StatsD::nop());
    let mut syncer = syncer(&api, &statsd, &log_file, None);

    assert!(syncer.sync_recent_enrollments(24).await.is_err());
    assert!(syncer.sync_subscription_enrollments().await.is_err());
    assert!(read_log(&log_file).is_empty());
}
