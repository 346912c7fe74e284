//! Output sinks.
//!
//! Records leave the engine as text lines in the proxy's ingestion
//! format: `name value timestamp source="…" "tag"="value" …`. The
//! `ProxySink` streams them over a plain TCP connection, connecting
//! lazily and dropping the connection on any write error so the next
//! write reconnects. `DryRunSink` logs the lines instead.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info};

use cloudpull_core::OutputRecord;

/// Where finished records go.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn write(&self, record: &OutputRecord) -> anyhow::Result<()>;

    /// Flush and release any underlying resources.
    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Escape a value for a double-quoted line-protocol field. Backslashes
/// and quotes are escaped, newlines become `\n` so one record stays one
/// line, and other control characters are dropped.
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

/// Render one record as an ingestion line (without the trailing newline).
/// Blank-valued tags are skipped; tag order is the record's (sorted) order.
pub fn format_line(record: &OutputRecord) -> String {
    let mut line = format!(
        "{} {} {} source=\"{}\"",
        record.name,
        record.value,
        record.timestamp,
        quote(&record.source)
    );
    for (key, value) in &record.tags {
        if value.trim().is_empty() {
            continue;
        }
        let _ = write!(line, " \"{}\"=\"{}\"", quote(key), quote(value));
    }
    line
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Streams lines to the proxy over TCP.
pub struct ProxySink {
    host: String,
    port: u16,
    conn: Mutex<Option<TcpStream>>,
    sent: AtomicU64,
}

impl ProxySink {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            conn: Mutex::new(None),
            sent: AtomicU64::new(0),
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    async fn connect(&self) -> anyhow::Result<TcpStream> {
        let addr = format!("{}:{}", self.host, self.port);
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
            .await
            .map_err(|_| anyhow::anyhow!("connect to {addr} timed out"))??;
        debug!(%addr, "proxy connection established");
        Ok(stream)
    }
}

#[async_trait]
impl OutputSink for ProxySink {
    async fn write(&self, record: &OutputRecord) -> anyhow::Result<()> {
        let line = format_line(record);
        let mut conn = self.conn.lock().await;
        let mut stream = match conn.take() {
            Some(stream) => stream,
            None => self.connect().await?,
        };

        let result = async {
            stream.write_all(line.as_bytes()).await?;
            stream.write_all(b"\n").await?;
            Ok::<_, std::io::Error>(())
        }
        .await;

        match result {
            Ok(()) => {
                *conn = Some(stream);
                self.sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            // The broken connection is dropped; the next write reconnects.
            Err(e) => Err(anyhow::anyhow!("proxy write failed: {e}")),
        }
    }

    async fn close(&self) -> anyhow::Result<()> {
        let mut conn = self.conn.lock().await;
        if let Some(mut stream) = conn.take() {
            stream.shutdown().await?;
        }
        info!(sent = self.sent(), "proxy sink closed");
        Ok(())
    }
}

/// Logs would-be output instead of sending it.
pub struct DryRunSink {
    sent: AtomicU64,
}

impl DryRunSink {
    pub fn new() -> Self {
        Self {
            sent: AtomicU64::new(0),
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

impl Default for DryRunSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OutputSink for DryRunSink {
    async fn write(&self, record: &OutputRecord) -> anyhow::Result<()> {
        info!(line = %format_line(record), "dry-run output");
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Collects records in memory. Test support.
pub struct CollectingSink {
    records: Mutex<Vec<OutputRecord>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    pub async fn records(&self) -> Vec<OutputRecord> {
        self.records.lock().await.clone()
    }
}

impl Default for CollectingSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OutputSink for CollectingSink {
    async fn write(&self, record: &OutputRecord) -> anyhow::Result<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}
