//! DeviceReader capability: the only interface the collection engine needs
//! from the controller-protocol layer. Vendor specifics stay behind these
//! traits so the engine can run against a simulator or a scripted fake.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::errors::TrendError;
use crate::models::TagValue;

/// Connects to a controller endpoint and hands out sessions.
#[async_trait]
pub trait DeviceReader: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Box<dyn DeviceSession>, TrendError>;
}

/// One open connection to a controller. Reads return exactly one value per
/// requested tag, in request order.
#[async_trait]
pub trait DeviceSession: Send {
    async fn read(&mut self, tags: &[String]) -> Result<Vec<TagValue>, TrendError>;

    /// Release the connection. Best effort; errors are not surfaced.
    async fn close(&mut self);
}

// ---------------------------------------------------------------------------
// SimDeviceReader — deterministic simulation for running without hardware
// ---------------------------------------------------------------------------

/// Simulation reader used when no vendor protocol layer is wired in. Each
/// session produces a deterministic per-tag ramp so trend files are stable
/// and inspectable.
pub struct SimDeviceReader;

#[async_trait]
impl DeviceReader for SimDeviceReader {
    async fn connect(&self, address: &str) -> Result<Box<dyn DeviceSession>, TrendError> {
        if address.trim().is_empty() {
            return Err(TrendError::Connect("empty address".to_string()));
        }
        tracing::debug!("sim session opened for {}", address);
        Ok(Box::new(SimSession { cycle: 0 }))
    }
}

struct SimSession {
    cycle: u64,
}

#[async_trait]
impl DeviceSession for SimSession {
    async fn read(&mut self, tags: &[String]) -> Result<Vec<TagValue>, TrendError> {
        let cycle = self.cycle;
        self.cycle += 1;
        Ok(tags
            .iter()
            .map(|tag| {
                // Stable per-tag offset so columns are distinguishable.
                let offset: u64 = tag.bytes().map(u64::from).sum::<u64>() % 100;
                TagValue::Real(offset as f64 + cycle as f64 / 10.0)
            })
            .collect())
    }

    async fn close(&mut self) {
        tracing::debug!("sim session closed");
    }
}

// ---------------------------------------------------------------------------
// ScriptedReader — deterministic fake for tests
// ---------------------------------------------------------------------------

/// One scripted poll outcome.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Values(Vec<TagValue>),
    Fail(String),
}

/// A reader whose sessions replay a fixed script of poll outcomes, for
/// exercising the engine without a controller. Sessions created from the
/// same reader share the script, and the reader counts connects and reads
/// so tests can assert on them.
pub struct ScriptedReader {
    script: Arc<Mutex<VecDeque<ScriptStep>>>,
    connect_error: Option<String>,
    connects: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
}

impl ScriptedReader {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            script: Arc::new(Mutex::new(steps.into())),
            connect_error: None,
            connects: Arc::new(AtomicUsize::new(0)),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A reader returning `[i, i * 10]` on cycle `i`, forever.
    pub fn counting() -> Self {
        Self::new(Vec::new())
    }

    /// A reader whose `connect` always fails.
    pub fn with_connect_error(message: &str) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            connect_error: Some(message.to_string()),
            connects: Arc::new(AtomicUsize::new(0)),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceReader for ScriptedReader {
    async fn connect(&self, _address: &str) -> Result<Box<dyn DeviceSession>, TrendError> {
        if let Some(ref message) = self.connect_error {
            return Err(TrendError::Connect(message.clone()));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            script: Arc::clone(&self.script),
            reads: Arc::clone(&self.reads),
            fallback_cycle: 0,
        }))
    }
}

struct ScriptedSession {
    script: Arc<Mutex<VecDeque<ScriptStep>>>,
    reads: Arc<AtomicUsize>,
    fallback_cycle: i64,
}

#[async_trait]
impl DeviceSession for ScriptedSession {
    async fn read(&mut self, tags: &[String]) -> Result<Vec<TagValue>, TrendError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let step = {
            let mut script = self.script.lock().unwrap_or_else(|p| p.into_inner());
            script.pop_front()
        };
        match step {
            Some(ScriptStep::Values(values)) => Ok(values),
            Some(ScriptStep::Fail(message)) => Err(TrendError::Read(message)),
            None => {
                // Script exhausted: fall back to the counting pattern.
                let cycle = self.fallback_cycle;
                self.fallback_cycle += 1;
                Ok(tags
                    .iter()
                    .enumerate()
                    .map(|(col, _)| TagValue::Int(cycle * 10_i64.pow(col as u32)))
                    .collect())
            }
        }
    }

    async fn close(&mut self) {}
}
