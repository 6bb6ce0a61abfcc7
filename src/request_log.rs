//! Request logging.
//!
//! Every request is written to the application log once it completes. When a
//! [`RequestLogger`] is installed, the request/response pair is also queued
//! on a bounded channel and persisted to the `logs` table by a single
//! background consumer. Insert failures are logged and dropped; they never
//! reach the request that produced the entry.
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, warn};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::models::{Log, LogEntry};
use crate::orm::Db;
use crate::router::{RequestContext, Response};

pub const DEFAULT_CAPACITY: usize = 100;

const REDACTED: &str = "[REDACTED]";
const SENSITIVE_FIELDS: &[&str] = &["password", "token"];
const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie"];

/// What producers do when the queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Wait for the consumer to free a slot.
    #[default]
    Block,
    /// Drop the new entry and count it.
    Reject,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(OverflowPolicy::Block),
            "reject" => Ok(OverflowPolicy::Reject),
            other => Err(format!("unknown overflow policy `{other}`")),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestLogError {
    #[error("request log queue is full")]
    Full,
    #[error("request log consumer has stopped")]
    Closed,
}

/// Producer side of the request log queue. Cheap to clone.
#[derive(Clone, Debug)]
pub struct RequestLogger {
    tx: mpsc::Sender<LogEntry>,
    policy: OverflowPolicy,
    rejected: Arc<AtomicU64>,
}

/// Handle on the consumer task.
#[derive(Debug)]
pub struct RequestLogWorker {
    handle: JoinHandle<u64>,
}

impl RequestLogger {
    /// Start the consumer and return the producer handle with its worker.
    pub fn spawn(
        db: Arc<Db>,
        capacity: usize,
        policy: OverflowPolicy,
    ) -> (RequestLogger, RequestLogWorker) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(consume(db, rx));
        let logger = RequestLogger {
            tx,
            policy,
            rejected: Arc::new(AtomicU64::new(0)),
        };
        (logger, RequestLogWorker { handle })
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Entries dropped because the queue was full.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub async fn log(&self, entry: LogEntry) -> Result<(), RequestLogError> {
        match self.policy {
            OverflowPolicy::Block => self
                .tx
                .send(entry)
                .await
                .map_err(|_| RequestLogError::Closed),
            OverflowPolicy::Reject => match self.tx.try_send(entry) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => {
                    self.rejected.fetch_add(1, Ordering::Relaxed);
                    Err(RequestLogError::Full)
                }
                Err(TrySendError::Closed(_)) => Err(RequestLogError::Closed),
            },
        }
    }
}

impl RequestLogWorker {
    /// Wait for the consumer to drain the queue. The queue closes once every
    /// [`RequestLogger`] clone has been dropped. Returns the rows written.
    pub async fn shutdown(self) -> u64 {
        match self.handle.await {
            Ok(written) => written,
            Err(e) => {
                error!("Request log consumer failed: {}", e);
                0
            }
        }
    }
}

async fn consume(db: Arc<Db>, mut rx: mpsc::Receiver<LogEntry>) -> u64 {
    info!("🚀 Starting asynchronous logger...");
    let mut written = 0;
    while let Some(entry) = rx.recv().await {
        debug!("Processing log entry: {} {}", entry.method, entry.url);
        match Log::insert(&db, &entry).await {
            Ok(id) => {
                written += 1;
                debug!("Inserted log entry #{}: {} {}", id, entry.method, entry.url);
            }
            Err(e) => error!("Failed to insert log entry: {}", e),
        }
    }
    info!("Asynchronous logger stopped after {} entries", written);
    written
}

/// `[HTTP] METHOD PATH - STATUS - IP - USER_AGENT - DURATION`
pub fn request_line(ctx: &RequestContext, status: u16, duration: Duration) -> String {
    let ip = ctx
        .remote_addr
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "-".to_string());
    let user_agent = ctx.header("user-agent").unwrap_or("-");
    format!(
        "[HTTP] {} {} - {} - {} - {} - {:?}",
        ctx.method, ctx.path, status, ip, user_agent, duration
    )
}

/// Write the one-line summary of a finished request.
pub fn log_request(ctx: &RequestContext, status: u16, duration: Duration) {
    let message = request_line(ctx, status, duration);
    if status >= 400 {
        error!("{}", message);
    } else {
        info!("{}", message);
    }
}

/// Build the persisted form of an exchange, with credentials redacted.
pub fn entry_for(ctx: &RequestContext, response: &Response) -> LogEntry {
    LogEntry {
        user_id: ctx.claims.as_ref().map(|c| c.id),
        method: ctx.method.clone(),
        url: ctx.url(),
        request_body: redact_body(&ctx.body),
        response_body: redact_body(&response.body),
        request_headers: headers_json(&ctx.headers),
        response_headers: headers_json(&response.headers),
        status_code: i32::from(response.status_code),
        created_at: Utc::now(),
    }
}

/// Replace credential fields of a JSON body. Non-JSON bodies pass through.
pub fn redact_body(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(mut value) => {
            redact_value(&mut value);
            value.to_string()
        }
        Err(_) => body.to_string(),
    }
}

fn redact_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                if SENSITIVE_FIELDS.contains(&key.to_ascii_lowercase().as_str()) {
                    *field = Value::String(REDACTED.to_string());
                } else {
                    redact_value(field);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_value),
        _ => {}
    }
}

fn headers_json(headers: &HashMap<String, String>) -> String {
    let sorted: BTreeMap<String, &str> = headers
        .iter()
        .map(|(name, value)| {
            let name = name.to_ascii_lowercase();
            let value = if SENSITIVE_HEADERS.contains(&name.as_str()) {
                REDACTED
            } else {
                value.as_str()
            };
            (name, value)
        })
        .collect();
    serde_json::to_string(&sorted).unwrap_or_else(|e| {
        warn!("Failed to serialize headers: {}", e);
        String::new()
    })
}
