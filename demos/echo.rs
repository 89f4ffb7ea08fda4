//! Echo server and client in one process.
//!
//! This example demonstrates:
//! - Serving an endpoint whose registrations apply to every accepted socket
//! - Validating event payloads with a JSON validator
//! - Operations with an inline config
//! - Endpoint-wide notifications
//!
//! # Running
//!
//! ```text
//! RUST_LOG=eventwire=debug,echo=info cargo run --example echo
//! ```

use std::time::Duration;

use bytes::Bytes;
use eventwire::validate::JsonValidator;
use eventwire::{Connection, Endpoint, NotificationKind};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Payload of the `echo` event.
#[derive(Deserialize, Serialize, Debug)]
struct EchoInput {
    message: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let server = Endpoint::new();
    server.event_with(
        "echo",
        JsonValidator::<EchoInput>::new(),
        |input: EchoInput, conn: &Connection, _: &JsonValidator<EchoInput>| {
            if let Err(e) = conn.emit("echoed", input.message) {
                tracing::warn!("reply failed: {}", e);
            }
        },
    )?;
    server.operation("store", |payload, config, conn| {
        tracing::info!(id = conn.id(), config, bytes = payload.len(), "store");
    })?;
    server.on(NotificationKind::ParsingFailed, |n| {
        tracing::warn!(id = n.connection().id(), "rejected payload");
    });

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("ws://{}/echo", listener.local_addr()?);
    let serving = server.clone();
    tokio::spawn(async move {
        if let Err(e) = serving.serve(listener).await {
            tracing::error!("server stopped: {}", e);
        }
    });
    tracing::info!("listening on {}", url);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = Endpoint::new();
    client.event("echoed", move |payload: Bytes, _| {
        let _ = tx.send(payload);
    })?;

    let conn = client.connect(&url).await?;
    conn.emit(
        "echo",
        eventwire::Payload::json(&EchoInput {
            message: "hello".to_string(),
        })?,
    )?;
    conn.emit("echo", "not json")?;
    conn.emit_operation("store", "key=a", Bytes::from_static(b"\x00\x01\x02"))?;

    match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
        Ok(Some(reply)) => tracing::info!("echoed: {}", String::from_utf8_lossy(&reply)),
        _ => tracing::warn!("no reply"),
    }

    conn.close(1000, "done")?;
    Ok(())
}
