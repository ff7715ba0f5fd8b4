//! End-to-end tests for the record store.
//!
//! These run the public API the way an embedding service would:
//! - short real TTLs crossing their deadline on the wall clock
//! - grant revocation cascading across namespaces
//! - the every-Nth-upsert purge cadence at its default threshold
//! - the consume audit trail
//! - the background purge sweeper

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use emberkv::{
    IndexField, Payload, PurgeSweeper, RecordStore, StorageEngine, StoreConfig, CONSUMED_KEY,
    DEFAULT_PURGE_THRESHOLD,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn init_tracing() {
    // Ignore the error when a previous test already installed a subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn payload(value: Value) -> Payload {
    value.as_object().cloned().expect("test payload is an object")
}

/// Seeds a record that is already past its deadline, without touching the
/// purge cadence counter.
fn seed_expired(engine: &StorageEngine, namespace: &str, id: &str) {
    let expired = Some(Utc::now() - ChronoDuration::seconds(5));
    engine
        .upsert(namespace, id, &payload(json!({ "seeded": true })), expired)
        .expect("seeding an expired record");
}

// =============================================================================
// TTL Expiry on the Wall Clock
// =============================================================================

#[tokio::test]
async fn test_one_second_ttl_expires_for_reads_but_stays_stored() -> anyhow::Result<()> {
    init_tracing();

    let engine = Arc::new(StorageEngine::new());
    let codes = RecordStore::new(Arc::clone(&engine), "device_code");

    let body = payload(json!({ "uid": "u-1", "userCode": "WXYZ-1234" }));
    codes.upsert("code-1", body.clone(), 1).await?;

    // Fresh: visible through every lookup path
    assert_eq!(codes.find("code-1").await?, Some(body.clone()));
    assert_eq!(codes.find_by_uid("u-1").await?, Some(body.clone()));
    assert_eq!(codes.find_by_user_code("WXYZ-1234").await?, Some(body));

    sleep(Duration::from_millis(1100)).await;

    // Past the deadline: every lookup path reports absence
    assert_eq!(codes.find("code-1").await?, None);
    assert_eq!(codes.find_by_uid("u-1").await?, None);
    assert_eq!(codes.find_by_user_code("WXYZ-1234").await?, None);

    // Reads do not delete: the row is still there until a purge runs
    let listed = codes.get_all().await?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, "code-1");

    assert_eq!(codes.purge_expired().await?, 1);
    assert!(codes.get_all().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_zero_ttl_survives_indefinitely() {
    init_tracing();

    let engine = Arc::new(StorageEngine::new());
    let grants = RecordStore::new(Arc::clone(&engine), "grant");

    grants
        .upsert("grant-1", payload(json!({ "uid": "u-1" })), 0)
        .await
        .expect("upsert without TTL");

    sleep(Duration::from_millis(50)).await;

    assert!(grants.find("grant-1").await.unwrap().is_some());
    assert_eq!(grants.purge_expired().await.unwrap(), 0);
    assert!(grants.find("grant-1").await.unwrap().is_some());
}

// =============================================================================
// Grant Revocation Across Namespaces
// =============================================================================

#[tokio::test]
async fn test_revocation_cascades_across_namespaces() {
    init_tracing();

    let engine = Arc::new(StorageEngine::new());
    let tokens = RecordStore::new(Arc::clone(&engine), "access_token");
    let refreshes = RecordStore::new(Arc::clone(&engine), "refresh_token");

    // Grant g-1 backs one access token and one refresh token; g-2 backs one
    tokens
        .upsert("at-1", payload(json!({ "grantId": "g-1" })), 0)
        .await
        .unwrap();
    refreshes
        .upsert("rt-1", payload(json!({ "grantId": "g-1" })), 0)
        .await
        .unwrap();
    tokens
        .upsert("at-2", payload(json!({ "grantId": "g-2" })), 0)
        .await
        .unwrap();

    // Revoking through either handle reaches both namespaces
    let removed = tokens
        .revoke_by_grant_id("g-1")
        .await
        .expect("revoking grant g-1");
    assert_eq!(removed, 2);

    assert_eq!(tokens.find("at-1").await.unwrap(), None);
    assert_eq!(refreshes.find("rt-1").await.unwrap(), None);
    assert!(tokens.find("at-2").await.unwrap().is_some());

    // The revoked ids are gone from the tables, not merely hidden
    assert!(tokens.get_all().await.unwrap().iter().all(|r| r.id != "at-1"));
    assert!(refreshes.get_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_revocation_reaches_expired_records() {
    init_tracing();

    let engine = Arc::new(StorageEngine::new());
    let tokens = RecordStore::new(Arc::clone(&engine), "access_token");

    // An expired token still tied to the grant
    let expired = Some(Utc::now() - ChronoDuration::seconds(5));
    engine
        .upsert(
            "access_token",
            "at-old",
            &payload(json!({ "grantId": "g-1" })),
            expired,
        )
        .unwrap();
    tokens
        .upsert("at-new", payload(json!({ "grantId": "g-1" })), 0)
        .await
        .unwrap();

    assert_eq!(tokens.revoke_by_grant_id("g-1").await.unwrap(), 2);
    assert_eq!(engine.len(), 0);
}

// =============================================================================
// Purge Cadence
// =============================================================================

#[tokio::test]
async fn test_default_cadence_sweeps_on_the_tenth_upsert() {
    init_tracing();

    let engine = Arc::new(StorageEngine::new());
    let sessions = RecordStore::new(Arc::clone(&engine), "session");

    seed_expired(&engine, "session", "dead");

    // Nine upserts: the dead record is invisible but still stored
    for n in 0..(DEFAULT_PURGE_THRESHOLD - 1) {
        sessions
            .upsert(&format!("sess-{}", n), payload(json!({ "n": n })), 0)
            .await
            .expect("upsert below the cadence threshold");
    }
    assert_eq!(sessions.find("dead").await.unwrap(), None);
    assert_eq!(engine.len(), DEFAULT_PURGE_THRESHOLD); // 9 live + 1 dead

    // The tenth upsert sweeps before writing
    sessions
        .upsert("sess-final", payload(json!({ "n": 9 })), 0)
        .await
        .expect("upsert crossing the cadence threshold");

    assert_eq!(engine.len(), DEFAULT_PURGE_THRESHOLD); // 10 live, dead swept
    assert!(sessions
        .get_all()
        .await
        .unwrap()
        .iter()
        .all(|r| r.id != "dead"));
}

#[tokio::test]
async fn test_cadence_counts_upserts_from_every_handle() {
    init_tracing();

    let engine = Arc::new(StorageEngine::with_config(
        StoreConfig::new().with_purge_threshold(4),
    ));
    let sessions = RecordStore::new(Arc::clone(&engine), "session");
    let tokens = RecordStore::new(Arc::clone(&engine), "token");

    seed_expired(&engine, "session", "dead");

    // The counter is engine-wide, so writes through different handles add up
    sessions
        .upsert("s-1", payload(json!({})), 0)
        .await
        .unwrap();
    tokens.upsert("t-1", payload(json!({})), 0).await.unwrap();
    sessions
        .upsert("s-2", payload(json!({})), 0)
        .await
        .unwrap();
    assert_eq!(engine.len(), 4); // dead still present

    tokens.upsert("t-2", payload(json!({})), 0).await.unwrap();
    assert_eq!(engine.len(), 4); // dead swept on the fourth write
    assert!(sessions
        .get_all()
        .await
        .unwrap()
        .iter()
        .all(|r| r.id != "dead"));
}

// =============================================================================
// Consume Audit Trail
// =============================================================================

#[tokio::test]
async fn test_consume_stamps_a_parsable_timestamp() -> anyhow::Result<()> {
    init_tracing();

    let engine = Arc::new(StorageEngine::new());
    let codes = RecordStore::new(Arc::clone(&engine), "device_code");

    codes
        .upsert("code-1", payload(json!({ "userCode": "WXYZ-1234" })), 60)
        .await?;

    let before = codes.get_all().await?.remove(0);
    codes.consume("code-1").await?;
    let after = codes.get_all().await?.remove(0);

    // The marker parses and sits close to now
    let marker = after
        .payload
        .get(CONSUMED_KEY)
        .and_then(Value::as_str)
        .expect("consumed marker is a string");
    let stamped = DateTime::parse_from_rfc3339(marker)?.with_timezone(&Utc);
    assert!((Utc::now() - stamped).num_seconds().abs() < 5);

    // Everything else about the record is untouched
    assert_eq!(after.payload.get("userCode"), Some(&json!("WXYZ-1234")));
    assert_eq!(after.expires_at, before.expires_at);
    assert_eq!(after.updated_at, before.updated_at);

    // Consuming twice refreshes the marker rather than failing
    codes.consume("code-1").await?;
    Ok(())
}

// =============================================================================
// Listing and Replacement
// =============================================================================

#[tokio::test]
async fn test_get_all_orders_newest_first() {
    init_tracing();

    let engine = Arc::new(StorageEngine::new());
    let sessions = RecordStore::new(Arc::clone(&engine), "session");

    for id in ["a", "b", "c"] {
        sessions
            .upsert(id, payload(json!({ "id": id })), 0)
            .await
            .unwrap();
        sleep(Duration::from_millis(5)).await;
    }
    // Touch "a" so it jumps to the front
    sessions
        .upsert("a", payload(json!({ "id": "a2" })), 0)
        .await
        .unwrap();

    let ids: Vec<String> = sessions
        .get_all()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec!["a", "c", "b"]);
}

#[tokio::test]
async fn test_replacement_moves_the_id_between_namespaces() {
    init_tracing();

    let engine = Arc::new(StorageEngine::new());
    let sessions = RecordStore::new(Arc::clone(&engine), "session");
    let tokens = RecordStore::new(Arc::clone(&engine), "token");

    sessions
        .upsert("shared-id", payload(json!({ "uid": "u-1" })), 0)
        .await
        .unwrap();
    tokens
        .upsert("shared-id", payload(json!({ "uid": "u-2" })), 0)
        .await
        .unwrap();

    // One record, now owned by the token namespace, with the new payload
    assert_eq!(engine.len(), 1);
    assert!(sessions.get_all().await.unwrap().is_empty());
    assert_eq!(tokens.get_all().await.unwrap()[0].id, "shared-id");

    // The index dropped the replaced record's terms
    assert_eq!(
        engine.find_by_field(IndexField::Uid, "u-1").unwrap(),
        None
    );
    assert!(engine
        .find_by_field(IndexField::Uid, "u-2")
        .unwrap()
        .is_some());
}

// =============================================================================
// Background Sweeper
// =============================================================================

#[tokio::test]
async fn test_background_sweeper_reclaims_without_writes() {
    init_tracing();

    let engine = Arc::new(StorageEngine::new());
    let sessions = RecordStore::new(Arc::clone(&engine), "session");

    seed_expired(&engine, "session", "dead-1");
    seed_expired(&engine, "session", "dead-2");
    sessions
        .upsert("live", payload(json!({})), 0)
        .await
        .unwrap();

    let sweeper = PurgeSweeper::start(Arc::clone(&engine), Duration::from_millis(20));

    // No further writes; the sweeper alone reclaims the expired rows
    sleep(Duration::from_millis(200)).await;
    assert_eq!(engine.len(), 1);
    assert!(sessions.find("live").await.unwrap().is_some());

    sweeper.stop();
}
