//! Active expiry. Lazy expiry alone keeps reads correct; this task only reclaims
//! memory held by expired keys nobody touches again.

use super::Keyspace;
use super::entry::now_millis;
use crate::config::SharedConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Passes over one shard within a cycle before moving on, even if it keeps
/// finding expired keys.
const MAX_PASSES_PER_SHARD: usize = 16;

/// When more than this fraction of a sample was expired, sample the shard again.
const REPEAT_THRESHOLD: f64 = 0.25;

/// Handle to the running reaper. Dropping it stops the task.
#[derive(Debug)]
pub struct Reaper {
    shutdown_tx: watch::Sender<bool>,
}

impl Reaper {
    pub fn start(keyspace: Arc<Keyspace>, config: SharedConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(reaper_loop(keyspace, config, shutdown_rx));
        info!("expiration reaper started");
        Reaper { shutdown_tx }
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// `(hz, sample)` from the live config. `hz == 0` means paused.
fn settings(config: &SharedConfig) -> (u64, usize) {
    let c = config.read().unwrap_or_else(|e| e.into_inner());
    (c.hz, c.reaper_sample)
}

async fn reaper_loop(
    keyspace: Arc<Keyspace>,
    config: SharedConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let (hz, sample) = settings(&config);
        let period = if hz == 0 {
            Duration::from_millis(1000)
        } else {
            Duration::from_millis((1000 / hz).max(1))
        };
        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    debug!("expiration reaper shutting down");
                    return;
                }
            }
        }
        if hz == 0 {
            continue;
        }
        let expired = run_cycle(&keyspace, sample).await;
        if expired > 0 {
            debug!(expired, "reaper removed expired keys");
        }
    }
}

/// One sweep over every shard. Each shard is locked only for one sample at a
/// time and the task yields between samples, so foreground commands wait at
/// most one sample's worth of work.
pub async fn run_cycle(keyspace: &Keyspace, sample: usize) -> usize {
    let mut total = 0;
    for id in 0..keyspace.shard_count() {
        for _ in 0..MAX_PASSES_PER_SHARD {
            let (sampled, expired) = {
                let mut shard = keyspace.lock_shard(id).await;
                if shard.volatile_len() == 0 {
                    break;
                }
                shard.expire_sample(sample, now_millis())
            };
            total += expired;
            tokio::task::yield_now().await;
            if sampled == 0 || (expired as f64) <= sampled as f64 * REPEAT_THRESHOLD {
                break;
            }
        }
    }
    keyspace.record_active_expiry(total);
    total
}
