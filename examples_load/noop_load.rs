use std::sync::Arc;
use std::time::Instant;
use tracing::error;

use clickhouse_log_sink::config::HandlerOptions;
use clickhouse_log_sink::init::{init_tracing_with_config, LayerConfig};
use clickhouse_log_sink::noop_db::NoopDatabase;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let handler = HandlerOptions::new("load", "noop-load", "logs", Arc::new(NoopDatabase))
        .build()?;

    let layer_config = LayerConfig {
        enable_stdout: false,
        span_groups: false,
    };
    let pending = init_tracing_with_config(handler, layer_config)?;

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, uid = i % 100, "noop load test error");
    }

    let elapsed = start.elapsed();
    println!("noop database: handled {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    pending.wait().await;
    println!("all inserts finished after {:?}", start.elapsed());
    Ok(())
}
