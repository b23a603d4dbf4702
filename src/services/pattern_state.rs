use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use crate::models::status::{InstrumentStatus, ZonesSnapshot};

#[derive(Debug)]
pub struct PatternStateInner {
    /// Latest status per instrument id
    pub instruments: RwLock<BTreeMap<String, InstrumentStatus>>,
    pub broadcaster: broadcast::Sender<ZonesSnapshot>,
}

pub type SharedPatternState = Arc<PatternStateInner>;

impl PatternStateInner {
    pub fn new(capacity: usize) -> SharedPatternState {
        let (broadcaster, _receiver) = broadcast::channel(capacity);
        Arc::new(Self {
            instruments: RwLock::new(BTreeMap::new()),
            broadcaster,
        })
    }

    /// Replace one instrument's status and broadcast the full snapshot
    pub async fn publish(&self, status: InstrumentStatus) {
        let snapshot = {
            let mut instruments = self.instruments.write().await;
            instruments.insert(status.instrument.clone(), status);
            ZonesSnapshot {
                as_of_ms: chrono::Utc::now().timestamp_millis() as u64,
                instruments: instruments.values().cloned().collect(),
            }
        };
        // No subscribers is fine
        let _ = self.broadcaster.send(snapshot);
    }

    pub async fn snapshot(&self) -> ZonesSnapshot {
        ZonesSnapshot {
            as_of_ms: chrono::Utc::now().timestamp_millis() as u64,
            instruments: self.instruments.read().await.values().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(id: &str) -> InstrumentStatus {
        InstrumentStatus {
            instrument: id.to_string(),
            ticker: id.to_string(),
            label: String::new(),
            interval: "1m".to_string(),
            detectors: Vec::new(),
            last_error: None,
            updated_at_ms: 0,
            summary: format!("{id}: looking"),
        }
    }

    #[tokio::test]
    async fn publish_replaces_and_broadcasts_sorted_snapshot() {
        let state = PatternStateInner::new(8);
        let mut rx = state.broadcaster.subscribe();

        state.publish(status("SOL")).await;
        state.publish(status("BTC")).await;
        state.publish(status("SOL")).await;

        let mut last = None;
        while let Ok(snapshot) = rx.try_recv() {
            last = Some(snapshot);
        }
        let ids: Vec<String> = last
            .unwrap()
            .instruments
            .into_iter()
            .map(|s| s.instrument)
            .collect();
        assert_eq!(ids, vec!["BTC", "SOL"]);
        assert_eq!(state.snapshot().await.instruments.len(), 2);
    }
}
