use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use uuid::Uuid;

use crate::device::DeviceReader;
use crate::engine::buffer::SampleBuffer;
use crate::engine::SampleTap;
use crate::models::{Sample, SampleEvent, TrendParams, TrendState};
use crate::storage::TrendLogStore;

/// Everything a collection worker needs for one run. Built by the registry
/// at start time; the worker owns it for the job's lifetime.
pub struct JobContext {
    pub job_id: Uuid,
    pub params: TrendParams,
    pub rel_path: PathBuf,
    pub reader: Arc<dyn DeviceReader>,
    pub log_store: Arc<dyn TrendLogStore>,
    pub tap: Arc<SampleTap>,
    /// Consecutive failed polls tolerated before the job fails.
    pub read_retry_limit: u32,
}

/// Terminal result of a collection run, reported back to the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub state: TrendState,
    pub failure: Option<String>,
}

impl JobOutcome {
    fn completed() -> Self {
        Self {
            state: TrendState::Completed,
            failure: None,
        }
    }

    fn stopped() -> Self {
        Self {
            state: TrendState::Stopped,
            failure: None,
        }
    }

    fn failed(message: String) -> Self {
        Self {
            state: TrendState::Failed,
            failure: Some(message),
        }
    }
}

async fn flush(ctx: &JobContext, buffer: &mut SampleBuffer) -> anyhow::Result<()> {
    let rows = buffer.drain_all();
    if rows.is_empty() {
        return Ok(());
    }
    let count = rows.len();
    ctx.log_store.append_rows(&ctx.rel_path, &rows).await?;
    tracing::debug!(
        "Trend {}: flushed {} rows to {}",
        ctx.job_id,
        count,
        ctx.rel_path.display()
    );
    Ok(())
}

/// Run one collection job to a terminal state.
///
/// The loop polls once per cycle, buffers the row, flushes whenever the
/// buffer reaches the threshold, and waits out the cycle interval. The stop
/// signal is honored at the top of each cycle and interrupts the wait, so a
/// stop request never blocks on a sleeping job. Failed polls are retried on
/// the next cycle without consuming a sequence index; only when
/// `read_retry_limit` consecutive polls fail does the job fail.
pub async fn run_collection(ctx: JobContext, mut stop_rx: watch::Receiver<bool>) -> JobOutcome {
    let tags = &ctx.params.tag_list;

    let mut session = match ctx.reader.connect(&ctx.params.address).await {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(
                "Trend {}: connect to {} failed: {}",
                ctx.job_id,
                ctx.params.address,
                e
            );
            return JobOutcome::failed(e.to_string());
        }
    };

    let mut columns = Vec::with_capacity(tags.len() + 2);
    columns.push("Index".to_string());
    columns.push("DateTime".to_string());
    columns.extend(tags.iter().cloned());

    if let Err(e) = ctx.log_store.ensure_header(&ctx.rel_path, &columns).await {
        session.close().await;
        return JobOutcome::failed(e.to_string());
    }

    let interval = ctx.params.cycle_interval();
    let mut buffer = SampleBuffer::new();
    let mut sequence_index: u64 = 0;
    let mut consecutive_failures: u32 = 0;
    let mut stopped = false;

    while sequence_index < ctx.params.cycle_count {
        if *stop_rx.borrow() {
            stopped = true;
            break;
        }

        match session.read(tags).await {
            Ok(values) => {
                consecutive_failures = 0;
                let sample = Sample {
                    sequence_index,
                    timestamp: Utc::now(),
                    values,
                };
                ctx.tap.push(SampleEvent {
                    job_id: ctx.job_id,
                    device_identifier: ctx.params.device_identifier.clone(),
                    sample: sample.clone(),
                });
                buffer.push(sample);
                sequence_index += 1;

                if buffer.len() >= ctx.params.buffer_threshold {
                    if let Err(e) = flush(&ctx, &mut buffer).await {
                        session.close().await;
                        return JobOutcome::failed(e.to_string());
                    }
                }
            }
            Err(e) => {
                consecutive_failures += 1;
                tracing::warn!(
                    "Trend {}: poll failed ({}/{}): {}",
                    ctx.job_id,
                    consecutive_failures,
                    ctx.read_retry_limit,
                    e
                );
                if consecutive_failures >= ctx.read_retry_limit {
                    // Keep whatever made it into the buffer before giving up.
                    if let Err(flush_err) = flush(&ctx, &mut buffer).await {
                        tracing::error!(
                            "Trend {}: final flush after read failure also failed: {}",
                            ctx.job_id,
                            flush_err
                        );
                    }
                    session.close().await;
                    return JobOutcome::failed(e.to_string());
                }
            }
        }

        if sequence_index >= ctx.params.cycle_count {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    stopped = true;
                    break;
                }
            }
        }
    }

    // The trailing partial buffer is flushed on both completion and stop, so
    // every collected row reaches the file.
    if let Err(e) = flush(&ctx, &mut buffer).await {
        session.close().await;
        return JobOutcome::failed(e.to_string());
    }

    session.close().await;

    if stopped {
        tracing::info!(
            "Trend {}: stopped after {} cycles",
            ctx.job_id,
            sequence_index
        );
        JobOutcome::stopped()
    } else {
        tracing::info!(
            "Trend {}: completed {} cycles",
            ctx.job_id,
            sequence_index
        );
        JobOutcome::completed()
    }
}
