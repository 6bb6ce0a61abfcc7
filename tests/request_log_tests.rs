mod common;

use std::time::Duration;

use chrono::Utc;
use ironplate::auth::Claims;
use ironplate::models::{Log, LogEntry};
use ironplate::request_log::{
    OverflowPolicy, RequestLogError, RequestLogger, entry_for, redact_body, request_line,
};
use ironplate::router::{AppState, RequestContext, Response};
use ironplate::routes;
use serde_json::{Value, json};

fn sample_entry(url: &str) -> LogEntry {
    LogEntry {
        user_id: None,
        method: "GET".to_string(),
        url: url.to_string(),
        request_body: String::new(),
        response_body: String::new(),
        request_headers: "{}".to_string(),
        response_headers: "{}".to_string(),
        status_code: 200,
        created_at: Utc::now(),
    }
}

#[test]
fn test_redact_body() {
    let body = json!({
        "email": "ann@x.com",
        "password": "secret1",
        "nested": {"Password": "x", "items": [{"token": "abc"}]}
    })
    .to_string();
    let redacted: Value = serde_json::from_str(&redact_body(&body)).unwrap();
    assert_eq!(redacted["email"], "ann@x.com");
    assert_eq!(redacted["password"], "[REDACTED]");
    assert_eq!(redacted["nested"]["Password"], "[REDACTED]");
    assert_eq!(redacted["nested"]["items"][0]["token"], "[REDACTED]");

    assert_eq!(redact_body("plain text"), "plain text");
    assert_eq!(redact_body(""), "");
}

#[test]
fn test_entry_for_redacts_headers_and_keeps_user() {
    let mut ctx = RequestContext::new("GET", "/api/profile")
        .with_header("Authorization", "Bearer abc")
        .with_header("User-Agent", "curl");
    ctx.query = Some("verbose=1".to_string());
    ctx.claims = Some(Claims {
        id: 3,
        email: "ann@x.com".to_string(),
        exp: 0,
    });
    let response = Response::ok("fine").with_header("X-Trace", "t1");

    let entry = entry_for(&ctx, &response);
    assert_eq!(entry.user_id, Some(3));
    assert_eq!(entry.method, "GET");
    assert_eq!(entry.url, "/api/profile?verbose=1");
    assert_eq!(entry.status_code, 200);
    assert_eq!(entry.response_body, "fine");

    let headers: Value = serde_json::from_str(&entry.request_headers).unwrap();
    assert_eq!(headers["authorization"], "[REDACTED]");
    assert_eq!(headers["user-agent"], "curl");
    let headers: Value = serde_json::from_str(&entry.response_headers).unwrap();
    assert_eq!(headers["x-trace"], "t1");
}

#[test]
fn test_request_line_format() {
    let mut ctx = RequestContext::new("POST", "/api/auth/login").with_header("User-Agent", "curl/8");
    ctx.query = Some("x=1".to_string());
    ctx.remote_addr = Some("10.0.0.7:51234".parse().unwrap());
    assert_eq!(
        request_line(&ctx, 401, Duration::from_millis(3)),
        "[HTTP] POST /api/auth/login - 401 - 10.0.0.7 - curl/8 - 3ms"
    );

    let ctx = RequestContext::new("GET", "/");
    assert_eq!(
        request_line(&ctx, 200, Duration::from_micros(250)),
        "[HTTP] GET / - 200 - - - - - 250µs"
    );
}

#[tokio::test]
async fn test_requests_are_persisted() {
    let db = common::migrated_db().await;
    let (logger, worker) = RequestLogger::spawn(db.clone(), 100, OverflowPolicy::Block);
    let state = AppState::new(db.clone(), common::settings()).with_request_logger(logger);
    let router = routes::build(state);

    let resp = router
        .handle(common::post_json(
            "/api/auth/register",
            json!({"name": "Ann", "email": "ann@x.com", "password": "secret1"}),
        ))
        .await;
    assert_eq!(resp.status_code, 201);
    let resp = router.handle(RequestContext::new("GET", "/api/profile")).await;
    assert_eq!(resp.status_code, 401);

    drop(router);
    assert_eq!(worker.shutdown().await, 2);

    let logs = Log::recent(&db, 10).await.unwrap();
    assert_eq!(logs.len(), 2);

    let profile = &logs[0];
    assert_eq!(profile.method, "GET");
    assert_eq!(profile.url, "/api/profile");
    assert_eq!(profile.status_code, 401);
    assert_eq!(profile.user_id, None);

    let register = &logs[1];
    assert_eq!(register.status_code, 201);
    assert!(register.request_body.contains("[REDACTED]"));
    assert!(!register.request_body.contains("secret1"));
    assert!(register.response_body.contains("ann@x.com"));
}

#[tokio::test]
async fn test_reject_policy_counts_overflow() {
    let db = common::migrated_db().await;
    let (logger, worker) = RequestLogger::spawn(db.clone(), 1, OverflowPolicy::Reject);
    assert_eq!(logger.policy(), OverflowPolicy::Reject);

    // The consumer cannot run until this task yields.
    assert_eq!(logger.log(sample_entry("/first")).await, Ok(()));
    assert_eq!(
        logger.log(sample_entry("/second")).await,
        Err(RequestLogError::Full)
    );
    assert_eq!(logger.rejected(), 1);

    drop(logger);
    assert_eq!(worker.shutdown().await, 1);
    let logs = Log::recent(&db, 10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].url, "/first");
}

#[tokio::test]
async fn test_block_policy_waits_for_room() {
    let db = common::migrated_db().await;
    let (logger, worker) = RequestLogger::spawn(db.clone(), 1, OverflowPolicy::Block);

    // The consumer cannot run until this task yields.
    assert_eq!(logger.log(sample_entry("/first")).await, Ok(()));
    let mut second = Box::pin(logger.log(sample_entry("/second")));
    assert!(futures::poll!(second.as_mut()).is_pending());
    assert_eq!(second.await, Ok(()));
    assert_eq!(logger.rejected(), 0);

    drop(logger);
    assert_eq!(worker.shutdown().await, 2);
    let logs = Log::recent(&db, 10).await.unwrap();
    assert_eq!(logs.len(), 2);
}

#[tokio::test]
async fn test_insert_failures_are_swallowed() {
    // No `logs` table: every insert fails, the consumer keeps going.
    let db = common::memory_db().await;
    let (logger, worker) = RequestLogger::spawn(db, 4, OverflowPolicy::Block);
    logger.log(sample_entry("/a")).await.unwrap();
    logger.log(sample_entry("/b")).await.unwrap();
    drop(logger);
    assert_eq!(worker.shutdown().await, 0);
}

#[test]
fn test_overflow_policy_parsing() {
    assert_eq!("block".parse::<OverflowPolicy>(), Ok(OverflowPolicy::Block));
    assert_eq!(" Reject ".parse::<OverflowPolicy>(), Ok(OverflowPolicy::Reject));
    assert!("drop".parse::<OverflowPolicy>().is_err());
    assert_eq!(OverflowPolicy::default(), OverflowPolicy::Block);
}
