//! In-memory [`FrameSink`] for unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::connection::FrameSink;

#[derive(Default)]
struct Log {
    texts: Mutex<Vec<String>>,
    closes: Mutex<Vec<(u16, String)>>,
    pings: Mutex<usize>,
    fail: AtomicBool,
}

/// Shared view of everything written to a [`RecordingSink`].
#[derive(Clone, Default)]
pub(crate) struct SinkLog(Arc<Log>);

impl SinkLog {
    pub(crate) fn texts(&self) -> Vec<String> {
        self.0.texts.lock().unwrap().clone()
    }

    pub(crate) fn json(&self) -> Vec<serde_json::Value> {
        self.texts()
            .iter()
            .map(|t| serde_json::from_str(t).unwrap())
            .collect()
    }

    pub(crate) fn closes(&self) -> Vec<(u16, String)> {
        self.0.closes.lock().unwrap().clone()
    }

    pub(crate) fn pings(&self) -> usize {
        *self.0.pings.lock().unwrap()
    }

    /// Make every following write fail.
    pub(crate) fn fail_writes(&self) {
        self.0.fail.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.0.fail.load(Ordering::SeqCst) {
            anyhow::bail!("broken pipe");
        }
        Ok(())
    }
}

pub(crate) struct RecordingSink {
    log: SinkLog,
}

impl RecordingSink {
    pub(crate) fn new() -> (Self, SinkLog) {
        let log = SinkLog::default();
        (Self { log: log.clone() }, log)
    }
}

#[async_trait]
impl FrameSink for RecordingSink {
    async fn send_text(&mut self, text: String) -> anyhow::Result<()> {
        self.log.check()?;
        self.log.0.texts.lock().unwrap().push(text);
        Ok(())
    }

    async fn send_ping(&mut self) -> anyhow::Result<()> {
        self.log.check()?;
        *self.log.0.pings.lock().unwrap() += 1;
        Ok(())
    }

    async fn close(&mut self, code: u16, reason: String) -> anyhow::Result<()> {
        self.log.check()?;
        self.log.0.closes.lock().unwrap().push((code, reason));
        Ok(())
    }
}

/// Sink whose writes never complete, like a peer that stopped reading.
pub(crate) struct StalledSink;

#[async_trait]
impl FrameSink for StalledSink {
    async fn send_text(&mut self, _text: String) -> anyhow::Result<()> {
        std::future::pending().await
    }

    async fn send_ping(&mut self) -> anyhow::Result<()> {
        std::future::pending().await
    }

    async fn close(&mut self, _code: u16, _reason: String) -> anyhow::Result<()> {
        std::future::pending().await
    }
}
