//! Emits random log events into a local ClickHouse table.
//!
//! Expects a table like:
//!
//! ```sql
//! CREATE TABLE logging.logs (
//!     timestamp  DateTime64(9, 'UTC'),
//!     hostname   String,
//!     namespace  String,
//!     service    String,
//!     level      LowCardinality(String),
//!     message    String,
//!     attributes Map(String, String),
//!     uid        String,
//!     request_id String
//! ) ENGINE = MergeTree ORDER BY timestamp;
//! ```

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, info_span, warn, Instrument};

use clickhouse_log_sink::clickhouse::{ClickHouseClient, ClickHouseConfig};
use clickhouse_log_sink::config::HandlerOptions;
use clickhouse_log_sink::init::init_tracing;

const SERVICES: [&str; 5] = ["Auth", "Message", "Media", "Billing", "Notification"];
const EVENTS: [&str; 6] = [
    "LoginAttempt",
    "FileUpload",
    "SendMessage",
    "Subscribe",
    "Logout",
    "PaymentProcessed",
];

fn random_token() -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..16)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client = ClickHouseClient::new(ClickHouseConfig {
        database: "logging".to_string(),
        ..ClickHouseConfig::from_env()
    });

    if let Err(e) = client.validate_schema("logging.logs").await {
        eprintln!("clickhouse is not ready ({}), exiting", e);
        return Ok(());
    }

    let handler = HandlerOptions::new("Dummy-Namespace", "demo", "logging.logs", Arc::new(client))
        .with_add_source(true)
        .build()?;
    init_tracing(handler)?;

    loop {
        let (service, event, uid, token, latency) = {
            let mut rng = rand::thread_rng();
            (
                *SERVICES.choose(&mut rng).unwrap_or(&"Auth"),
                *EVENTS.choose(&mut rng).unwrap_or(&"Logout"),
                rng.gen_range(0..10_000),
                random_token(),
                rng.gen_range(1..500),
            )
        };

        let span = info_span!("request", request_id = %token, service);
        async {
            match latency % 4 {
                0 => debug!(event, uid, latency_ms = latency, "event processed"),
                1 => info!(event, uid, latency_ms = latency, "event processed"),
                2 => warn!(event, uid, latency_ms = latency, "slow event"),
                _ => error!(event, uid, "event failed"),
            }
        }
        .instrument(span)
        .await;

        sleep(Duration::from_millis(100)).await;
    }
}
