//! Background redistribution.
//!
//! A pure liveness mechanism: on a fixed-interval tick it freshly recomputes
//! the pending set and resends any pair whose backoff window elapsed. It
//! retries indefinitely and guarantees no ordering; the receiving side's
//! exactly-once application absorbs the duplicates.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use weir_core::{Key, PartitionId};

use crate::backoff::{max_cycles, should_resend};
use crate::error::DistributionError;
use crate::record::RemoteCommand;
use crate::state::DistributionState;
use crate::transport::InterPartitionSender;

/// Redistribution timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedistributionConfig {
    /// Tick interval
    pub interval: Duration,

    /// Maximum backoff between resends of one pair
    pub max_backoff: Duration,
}

impl Default for RedistributionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_backoff: Duration::from_secs(300),
        }
    }
}

impl RedistributionConfig {
    /// The flat-cap threshold in ticks, clamped to at least 1.
    pub fn max_cycles(&self) -> u32 {
        max_cycles(self.max_backoff, self.interval)
    }
}

/// Origin-side background resender.
pub struct Redistributor {
    state: DistributionState,
    config: RedistributionConfig,
    attempts: HashMap<(Key, PartitionId), u32>,
}

impl Redistributor {
    /// A redistributor over this partition's distribution state.
    pub fn new(state: DistributionState, config: RedistributionConfig) -> Self {
        Self {
            state,
            config,
            attempts: HashMap::new(),
        }
    }

    /// One tick: recompute the pending set, advance attempt counters, and
    /// return the commands whose backoff window elapsed.
    ///
    /// Attempt counters are dropped the instant a pair leaves the pending
    /// set.
    pub fn tick(&mut self) -> Result<Vec<(PartitionId, RemoteCommand)>, DistributionError> {
        let pending = self.state.all_pending()?;
        self.attempts
            .retain(|pair, _| pending.contains(pair));

        let threshold = self.config.max_cycles();
        let mut resends = Vec::new();

        for (key, partition) in pending {
            let attempts = self.attempts.entry((key, partition)).or_insert(0);
            *attempts += 1;

            if !should_resend(*attempts, threshold) {
                continue;
            }

            let Some(dist) = self.state.distribution(key)? else {
                continue;
            };
            trace!(%key, %partition, attempts = *attempts, "resending pending distribution");
            resends.push((
                partition,
                RemoteCommand {
                    value_type: dist.command.value_type.clone(),
                    intent: dist.command.intent.clone(),
                    key,
                    payload: dist.command.payload.clone(),
                },
            ));
        }

        if !resends.is_empty() {
            debug!(count = resends.len(), "redistribution tick resent commands");
        }
        Ok(resends)
    }

    /// Run the tick loop forever on the given sender.
    pub async fn run(mut self, sender: Arc<dyn InterPartitionSender>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.tick() {
                Ok(resends) => {
                    // Fire-and-forget fan-out; no send outcome feeds back
                    // into the record stream.
                    futures::future::join_all(
                        resends
                            .into_iter()
                            .map(|(partition, command)| sender.send(partition, command)),
                    )
                    .await;
                }
                Err(err) => {
                    // Liveness over everything: log and keep ticking.
                    tracing::warn!(error = %err, "redistribution tick failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use weir_core::MemoryStateStore;

    use crate::record::DistributedCommand;
    use crate::state::StoredDistribution;

    fn setup() -> (DistributionState, Redistributor) {
        let state = DistributionState::new(Arc::new(MemoryStateStore::new()));
        let redistributor = Redistributor::new(
            state.clone(),
            RedistributionConfig {
                interval: Duration::from_secs(10),
                max_backoff: Duration::from_secs(40),
            },
        );
        (state, redistributor)
    }

    fn store_pending(state: &DistributionState, key: Key, partition: PartitionId) {
        state
            .put_distribution(&StoredDistribution {
                key,
                command: DistributedCommand {
                    value_type: "DEPLOYMENT".to_string(),
                    intent: "CREATE".to_string(),
                    payload: json!({}),
                },
                follow_up: None,
                parked: false,
                awaiting_continuation: false,
            })
            .unwrap();
        state.add_pending(key, partition).unwrap();
    }

    #[test]
    fn test_resend_pattern_follows_backoff() {
        let (state, mut redistributor) = setup();
        let key = Key::new(PartitionId(1), 1);
        store_pending(&state, key, PartitionId(2));

        // max_backoff / interval = 4 cycles: ticks 0,1,3,7 then every 4th.
        let mut resend_ticks = Vec::new();
        for tick in 0..20 {
            if !redistributor.tick().unwrap().is_empty() {
                resend_ticks.push(tick);
            }
        }
        assert_eq!(resend_ticks, vec![0, 1, 3, 7, 11, 15, 19]);
    }

    #[test]
    fn test_counters_drop_when_pair_is_acknowledged() {
        let (state, mut redistributor) = setup();
        let key = Key::new(PartitionId(1), 1);
        store_pending(&state, key, PartitionId(2));

        for _ in 0..5 {
            redistributor.tick().unwrap();
        }
        assert_eq!(redistributor.attempts.len(), 1);

        state.remove_pending(key, PartitionId(2)).unwrap();
        assert!(redistributor.tick().unwrap().is_empty());
        assert!(redistributor.attempts.is_empty(), "counter must be discarded");

        // If the pair ever came back it would start from a fresh counter.
        state.add_pending(key, PartitionId(2)).unwrap();
        assert_eq!(redistributor.tick().unwrap().len(), 1);
    }

    #[test]
    fn test_retries_never_stop() {
        let (state, mut redistributor) = setup();
        let key = Key::new(PartitionId(1), 1);
        store_pending(&state, key, PartitionId(2));

        let mut resends = 0;
        for _ in 0..400 {
            resends += redistributor.tick().unwrap().len();
        }
        // Flat cap of 4 ticks: roughly a quarter of all ticks resend, and
        // they keep coming for as long as the pair is pending.
        assert!(resends >= 99, "got only {} resends", resends);
    }
}
