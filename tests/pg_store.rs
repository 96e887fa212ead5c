use chrono::Utc;
use key_http::keys::{
    KeyAuditEvent, KeyAuditEventType, KeyDraft, KeyIdScheme, KeyStatus, KeyStore, PgKeyStore,
    RevokeOutcome, StoreError,
};
use serde_json::json;
use sqlx::PgPool;

fn ids() -> KeyIdScheme {
    KeyIdScheme::new("https://keys.test", "/keys")
}

fn draft(owner: &str, pem: &str) -> KeyDraft {
    KeyDraft {
        owner: owner.to_string(),
        label: "Signing Key 1".to_string(),
        public_key_pem: pem.to_string(),
        private_key_pem: None,
        created_at: Utc::now(),
    }
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn insert_sequences_per_owner_and_rejects_duplicates(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let store = PgKeyStore::new(pool.clone());

    let first = store.insert(draft("u1", "PEM1"), &ids()).await.unwrap();
    let second = store.insert(draft("u1", "PEM2"), &ids()).await.unwrap();
    let other = store.insert(draft("u2", "PEM1"), &ids()).await.unwrap();
    assert_eq!(first.sequence, 1);
    assert_eq!(second.sequence, 2);
    assert_eq!(other.sequence, 1);
    assert_eq!(first.id, ids().mint("u1", 1));

    let err = store.insert(draft("u1", "PEM1"), &ids()).await.unwrap_err();
    assert!(matches!(err, StoreError::Duplicate));

    let listed = store.list_by_owner("u1").await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(store.list_by_owner("nobody").await.unwrap().is_empty());
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn revoke_keeps_first_timestamp(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let store = PgKeyStore::new(pool.clone());
    let record = store.insert(draft("u1", "PEM1"), &ids()).await.unwrap();

    let RevokeOutcome::Revoked(revoked) =
        store.revoke(&record.id, Utc::now()).await.unwrap().unwrap()
    else {
        panic!("expected the first revoke to transition");
    };
    assert_eq!(revoked.status, KeyStatus::Disabled);
    let RevokeOutcome::AlreadyDisabled(again) =
        store.revoke(&record.id, Utc::now()).await.unwrap().unwrap()
    else {
        panic!("expected the second revoke to be a no-op");
    };
    assert_eq!(again.status, KeyStatus::Disabled);
    assert_eq!(again.revoked, revoked.revoked);

    let renamed = store
        .update_label(&record.id, "Renamed", Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(renamed.label, "Renamed");
    assert!(store.revoke("missing", Utc::now()).await.unwrap().is_none());
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn concurrent_revokes_transition_once(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let store = PgKeyStore::new(pool.clone());
    let record = store.insert(draft("u1", "PEM1"), &ids()).await.unwrap();

    let (a, b) = tokio::join!(
        store.revoke(&record.id, Utc::now()),
        store.revoke(&record.id, Utc::now())
    );
    let transitions = [a.unwrap().unwrap(), b.unwrap().unwrap()]
        .iter()
        .filter(|outcome| matches!(outcome, RevokeOutcome::Revoked(_)))
        .count();
    assert_eq!(transitions, 1);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn audit_events_round_trip(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let store = PgKeyStore::new(pool.clone());
    let record = store.insert(draft("u1", "PEM1"), &ids()).await.unwrap();

    let event = KeyAuditEvent::new(
        &record.id,
        &record.owner,
        Some("u1"),
        KeyAuditEventType::Added,
        json!({ "sequence": 1 }),
        Utc::now(),
    );
    store.append_event(&event).await.unwrap();

    let events = store.events_for(&record.id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, KeyAuditEventType::Added);
    assert_eq!(events[0].actor.as_deref(), Some("u1"));

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM public_key_events WHERE key_id = $1")
            .bind(&record.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(count, 1);
}
