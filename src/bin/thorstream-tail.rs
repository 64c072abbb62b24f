//! Print messages from one topic partition, one payload per line.
//!
//! Configured from the environment: THORSTREAM_ADDR, THORSTREAM_TOPIC,
//! THORSTREAM_PARTITION, THORSTREAM_OFFSET, THORSTREAM_MAX_FETCH_SIZE,
//! THORSTREAM_POLL_MS. Set THORSTREAM_MAX_MESSAGES to exit after that many.

use std::io::Write;
use thorstream_client::{ClientConfig, Consumer};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("thorstream_client=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::from_env()?;
    let limit = std::env::var("THORSTREAM_MAX_MESSAGES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok());

    tracing::info!(
        addr = %config.addr(),
        topic = %config.topic,
        partition = config.partition,
        offset = config.offset,
        "tailing"
    );
    let mut consumer = Consumer::connect(&config)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut seen = 0usize;
    for message in consumer.poll() {
        let message = message?;
        if !message.is_valid() {
            tracing::warn!(checksum = message.checksum(), "skipping message with bad checksum");
            continue;
        }
        writeln!(out, "{}", message)?;
        out.flush()?;
        seen += 1;
        if limit.is_some_and(|n| seen >= n) {
            break;
        }
    }
    Ok(())
}
