#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use axum::{Router, body::Body, http::Request, routing::post};
use chrono::Utc;
use http_body_util::BodyExt;
use notifier::{
    config::DeliveryConfig,
    dispatcher::Dispatcher,
    handlers::emit::emit_handler,
    signer,
    state::AppState,
    types::{
        EmitResponse, Event, EventPayload,
        event::{ClientCreated, PaymentSucceeded, StepCompleted},
    },
};
use sqlx::{
    Connection, SqliteConnection, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::fs;
use tempfile::NamedTempFile;
use tokio::sync::Notify;
use tower::ServiceExt;
use uuid::Uuid;

struct TestDb {
    pool: SqlitePool,
    _db_file: NamedTempFile,
}

async fn setup_db() -> TestDb {
    let db_file = NamedTempFile::new().expect("create temp sqlite file");
    let options = SqliteConnectOptions::new()
        .filename(db_file.path())
        .create_if_missing(true)
        .busy_timeout(std::time::Duration::from_millis(500));

    let mut conn = SqliteConnection::connect_with(&options)
        .await
        .expect("connect sqlite for migrations");
    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(&mut conn)
        .await
        .expect("enable foreign keys");
    run_migrations(&mut conn).await.expect("run migrations");
    conn.close().await.expect("close migration conn");

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .after_connect(|conn, _| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON;")
                    .execute(conn)
                    .await?;
                Ok(())
            })
        })
        .connect_with(options)
        .await
        .expect("connect sqlite");

    TestDb {
        pool,
        _db_file: db_file,
    }
}

async fn run_migrations(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    let mut entries: Vec<_> = fs::read_dir("migrations")
        .map_err(sqlx::Error::Io)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|ext| ext.to_str()) == Some("sql"))
        .collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let contents = fs::read_to_string(entry.path()).map_err(sqlx::Error::Io)?;
        for stmt in contents.split(';') {
            let stmt = stmt.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&mut *conn).await?;
            }
        }
    }
    Ok(())
}

async fn seed_endpoint(
    pool: &SqlitePool,
    owner_id: Uuid,
    event_types: &[&str],
    active: bool,
) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO endpoints (id, owner_id, url, secret, event_types, active, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(owner_id.to_string())
    .bind("https://receiver.example.com/hooks")
    .bind("whsec_test")
    .bind(serde_json::to_string(event_types).unwrap())
    .bind(i64::from(active))
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .expect("insert endpoint");
    id
}

fn dispatcher_for(pool: &SqlitePool) -> Dispatcher {
    Dispatcher::new(pool.clone(), Arc::new(Notify::new()))
}

fn client_created_event(owner_id: Uuid) -> Event {
    Event {
        owner_id,
        occurred_at: Utc::now(),
        payload: EventPayload::ClientCreated(ClientCreated {
            client_id: Uuid::new_v4(),
            name: "Acme Co".to_string(),
            email: Some("ops@acme.example".to_string()),
        }),
    }
}

async fn count_deliveries(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM deliveries")
        .fetch_one(pool)
        .await
        .expect("count deliveries")
}

#[tokio::test]
async fn no_matching_endpoint_creates_no_deliveries() {
    let db = setup_db().await;
    let pool = db.pool;
    let owner_id = Uuid::new_v4();

    // Wrong owner, inactive, unsubscribed type, and empty subscription set:
    // none of these should receive anything.
    seed_endpoint(&pool, Uuid::new_v4(), &["client.created"], true).await;
    seed_endpoint(&pool, owner_id, &["client.created"], false).await;
    seed_endpoint(&pool, owner_id, &["payment.succeeded"], true).await;
    seed_endpoint(&pool, owner_id, &[], true).await;

    let dispatcher = dispatcher_for(&pool);
    let ids = dispatcher
        .emit(&client_created_event(owner_id))
        .await
        .expect("emit");

    assert!(ids.is_empty());
    assert_eq!(count_deliveries(&pool).await, 0);
}

#[tokio::test]
async fn fanout_creates_one_pending_delivery_per_matching_endpoint() {
    let db = setup_db().await;
    let pool = db.pool;
    let owner_id = Uuid::new_v4();

    let matching_a = seed_endpoint(&pool, owner_id, &["client.created"], true).await;
    let matching_b =
        seed_endpoint(&pool, owner_id, &["client.created", "client.archived"], true).await;
    let _other_type = seed_endpoint(&pool, owner_id, &["kit.completed"], true).await;

    let dispatcher = dispatcher_for(&pool);
    let ids = dispatcher
        .emit(&client_created_event(owner_id))
        .await
        .expect("emit");

    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);

    let rows: Vec<(String, String, String, i64, Option<String>)> = sqlx::query_as(
        "SELECT id, endpoint_id, status, attempt_count, next_attempt_at FROM deliveries",
    )
    .fetch_all(&pool)
    .await
    .expect("fetch deliveries");

    assert_eq!(rows.len(), 2);
    let endpoint_ids: Vec<String> = rows.iter().map(|row| row.1.clone()).collect();
    assert!(endpoint_ids.contains(&matching_a.to_string()));
    assert!(endpoint_ids.contains(&matching_b.to_string()));
    for (_, _, status, attempt_count, next_attempt_at) in &rows {
        assert_eq!(status, "pending");
        assert_eq!(*attempt_count, 0);
        assert!(next_attempt_at.is_some(), "due immediately");
    }
}

#[tokio::test]
async fn payload_snapshot_carries_delivery_id_and_owner() {
    let db = setup_db().await;
    let pool = db.pool;
    let owner_id = Uuid::new_v4();
    seed_endpoint(&pool, owner_id, &["payment.succeeded"], true).await;

    let event = Event {
        owner_id,
        occurred_at: Utc::now(),
        payload: EventPayload::PaymentSucceeded(PaymentSucceeded {
            payment_id: Uuid::new_v4(),
            amount_cents: 12_500,
            currency: "usd".to_string(),
        }),
    };

    let dispatcher = dispatcher_for(&pool);
    let ids = dispatcher.emit(&event).await.expect("emit");
    assert_eq!(ids.len(), 1);

    let (event_type, payload): (String, String) =
        sqlx::query_as("SELECT event_type, payload FROM deliveries WHERE id = ?")
            .bind(ids[0].to_string())
            .fetch_one(&pool)
            .await
            .expect("fetch delivery");

    assert_eq!(event_type, "payment.succeeded");

    let envelope: serde_json::Value = serde_json::from_str(&payload).expect("payload is JSON");
    assert_eq!(envelope["id"], ids[0].to_string());
    assert_eq!(envelope["type"], "payment.succeeded");
    assert_eq!(envelope["data"]["amount_cents"], 12_500);
    assert_eq!(envelope["ownerId"], owner_id.to_string());
    assert!(envelope["timestamp"].is_string());

    // The stored bytes are what gets signed and sent.
    let signature = signer::sign(payload.as_bytes(), b"whsec_test");
    assert!(signer::verify(payload.as_bytes(), &signature, b"whsec_test"));
}

#[tokio::test]
async fn each_fanout_row_gets_its_own_snapshot() {
    let db = setup_db().await;
    let pool = db.pool;
    let owner_id = Uuid::new_v4();
    seed_endpoint(&pool, owner_id, &["step.completed"], true).await;
    seed_endpoint(&pool, owner_id, &["step.completed"], true).await;

    let event = Event {
        owner_id,
        occurred_at: Utc::now(),
        payload: EventPayload::StepCompleted(StepCompleted {
            kit_id: Uuid::new_v4(),
            step_id: Uuid::new_v4(),
            title: "Upload documents".to_string(),
        }),
    };

    let dispatcher = dispatcher_for(&pool);
    let ids = dispatcher.emit(&event).await.expect("emit");
    assert_eq!(ids.len(), 2);

    for id in &ids {
        let payload: String = sqlx::query_scalar("SELECT payload FROM deliveries WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&pool)
            .await
            .expect("fetch payload");
        let envelope: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(envelope["id"], id.to_string(), "snapshot id matches its row");
    }
}

#[tokio::test]
async fn emit_handler_accepts_flattened_payload() {
    let db = setup_db().await;
    let pool = db.pool;
    let owner_id = Uuid::new_v4();
    seed_endpoint(&pool, owner_id, &["client.archived"], true).await;

    let state = AppState {
        pool: pool.clone(),
        config: DeliveryConfig::default(),
        dispatcher: dispatcher_for(&pool),
        operator_api_token: None,
    };
    let app = Router::new()
        .route("/internal/events", post(emit_handler))
        .with_state(state);

    let body = serde_json::json!({
        "owner_id": owner_id,
        "type": "client.archived",
        "data": { "client_id": Uuid::new_v4() },
    });

    let request = Request::builder()
        .method("POST")
        .uri("/internal/events")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let parsed: EmitResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(parsed.delivery_ids.len(), 1);
    assert_eq!(count_deliveries(&pool).await, 1);
}
