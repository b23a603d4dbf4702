use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::business_logic::accumulation::{AccumulationZone, BreakoutDirection};
use crate::business_logic::fvg::FvgType;
use crate::business_logic::registry::DetectorResult;
use crate::models::zone::{DetectorKind, Zone, ZoneStatus, ZoneType};
use crate::services::dedup_store::{AlertRecord, DedupStore};

/// Default age after which alert records are pruned
pub const ALERT_TTL_SECS: i64 = 4 * 60 * 60;

/// What happened, for the notifier to render
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationKind {
    BreakoutConfirmed {
        direction: BreakoutDirection,
        impulse_ratio: Option<f64>,
    },
    ZoneActivated {
        zone_type: Option<ZoneType>,
        impulse_ratio: f64,
    },
    GapOpened {
        fvg_type: FvgType,
        gap_pct: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationRequest {
    pub instrument: String,
    pub detector: DetectorKind,
    pub zone: Zone,
    pub kind: NotificationKind,
    pub fired_at: DateTime<Utc>,
}

/// Single-zone state machine: `Looking -> Active -> Confirmed -> Looking`
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleState {
    Looking,
    Active { zone_start: i64 },
    /// Held for exactly one more tick, then back to `Looking`
    Confirmed { zone: Box<AccumulationZone> },
}

/// What a cycle publishes plus the alerts it raised
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub published: DetectorResult,
    pub notifications: Vec<NotificationRequest>,
}

/// Turns detector output for one instrument and detector into at-most-once notifications.
pub struct AlertLifecycle {
    instrument: String,
    detector: DetectorKind,
    store: Box<dyn DedupStore>,
    ttl_secs: i64,
    state: LifecycleState,
    /// Zone starts reported active last cycle (multi-zone detectors)
    active_starts: BTreeSet<i64>,
}

impl AlertLifecycle {
    pub fn new(
        instrument: impl Into<String>,
        detector: DetectorKind,
        store: Box<dyn DedupStore>,
        ttl_secs: i64,
    ) -> Self {
        // Multi-zone records are only kept while their zone is live, so the stored
        // starts are the live set as of the last run
        let active_starts = if detector.is_multi_zone() {
            store.snapshot().values().map(|r| r.zone_start).collect()
        } else {
            BTreeSet::new()
        };

        Self {
            instrument: instrument.into(),
            detector,
            store,
            ttl_secs,
            state: LifecycleState::Looking,
            active_starts,
        }
    }

    pub fn detector(&self) -> DetectorKind {
        self.detector
    }

    pub fn process(&mut self, result: DetectorResult, now: DateTime<Utc>) -> CycleOutcome {
        self.prune(now);
        if self.detector.is_multi_zone() {
            self.process_multi(result, now)
        } else {
            self.process_single(result, now)
        }
    }

    fn single_key(&self) -> String {
        format!("{}:{}", self.instrument, self.detector)
    }

    fn zone_key(&self, start: i64) -> String {
        format!("{}:{}:{}", self.instrument, self.detector, start)
    }

    fn process_single(&mut self, result: DetectorResult, now: DateTime<Utc>) -> CycleOutcome {
        if let LifecycleState::Confirmed { zone } = &self.state {
            let held = zone.clone();
            tracing::debug!(
                "[{}] holding confirmed {} zone for one more cycle",
                self.instrument,
                self.detector
            );
            return self.process_hold_tick(held, result, now);
        }

        let mut notifications = Vec::new();
        match &result {
            DetectorResult::Zone(zone) if zone.zone.status == ZoneStatus::Confirmed => {
                if matches!(self.state, LifecycleState::Active { .. }) {
                    if let Some(notification) = self.fire_breakout(zone, now) {
                        notifications.push(notification);
                    }
                    self.state = LifecycleState::Confirmed { zone: zone.clone() };
                } else {
                    tracing::debug!(
                        "[{}] {} confirmation without an active box, not alerting",
                        self.instrument,
                        self.detector
                    );
                    self.state = LifecycleState::Looking;
                }
            }
            DetectorResult::Zone(zone) => {
                if !matches!(self.state, LifecycleState::Active { .. }) {
                    tracing::info!(
                        "[{}] {} box active {:.5}-{:.5}",
                        self.instrument,
                        self.detector,
                        zone.zone.bottom,
                        zone.zone.top
                    );
                }
                self.state = LifecycleState::Active {
                    zone_start: zone.zone.start,
                };
            }
            _ => self.state = LifecycleState::Looking,
        }

        CycleOutcome {
            published: result,
            notifications,
        }
    }

    /// Publish the held zone. A breakout of a different box in the same cycle still
    /// alerts and becomes the next held zone.
    fn process_hold_tick(
        &mut self,
        held: Box<AccumulationZone>,
        result: DetectorResult,
        now: DateTime<Utc>,
    ) -> CycleOutcome {
        let mut notifications = Vec::new();
        self.state = match result {
            DetectorResult::Zone(zone)
                if zone.zone.status == ZoneStatus::Confirmed
                    && zone.zone.start != held.zone.start =>
            {
                match self.fire_breakout(&zone, now) {
                    Some(notification) => {
                        notifications.push(notification);
                        LifecycleState::Confirmed { zone }
                    }
                    None => LifecycleState::Looking,
                }
            }
            DetectorResult::Zone(zone) if zone.zone.status == ZoneStatus::Active => {
                LifecycleState::Active {
                    zone_start: zone.zone.start,
                }
            }
            _ => LifecycleState::Looking,
        };

        CycleOutcome {
            published: DetectorResult::Zone(held),
            notifications,
        }
    }

    fn fire_breakout(
        &mut self,
        zone: &AccumulationZone,
        now: DateTime<Utc>,
    ) -> Option<NotificationRequest> {
        let key = self.single_key();
        if self
            .store
            .get(&key)
            .is_some_and(|r| r.zone_start == zone.zone.start)
        {
            tracing::debug!(
                "[{}] breakout for zone {} already alerted",
                self.instrument,
                zone.zone.start
            );
            return None;
        }

        let breakout = zone.breakout.as_ref()?;
        self.record(&key, zone.zone.start, now);
        Some(NotificationRequest {
            instrument: self.instrument.clone(),
            detector: self.detector,
            zone: zone.zone.clone(),
            kind: NotificationKind::BreakoutConfirmed {
                direction: breakout.direction,
                impulse_ratio: breakout.impulse_ratio,
            },
            fired_at: now,
        })
    }

    fn process_multi(&mut self, result: DetectorResult, now: DateTime<Utc>) -> CycleOutcome {
        let zones: Vec<(Zone, NotificationKind)> = match &result {
            DetectorResult::SupplyDemand(scan) => scan
                .zones
                .iter()
                .map(|z| {
                    let kind = NotificationKind::ZoneActivated {
                        zone_type: z.zone.zone_type,
                        impulse_ratio: z.impulse_ratio,
                    };
                    (z.zone.clone(), kind)
                })
                .collect(),
            DetectorResult::Fvg(scan) => scan
                .fvgs
                .iter()
                .map(|g| {
                    let kind = NotificationKind::GapOpened {
                        fvg_type: g.fvg_type,
                        gap_pct: g.gap_pct,
                    };
                    (g.zone.clone(), kind)
                })
                .collect(),
            // Sentinels say nothing about which zones are still live
            _ => {
                return CycleOutcome {
                    published: result,
                    notifications: Vec::new(),
                }
            }
        };

        let mut notifications = Vec::new();
        let mut current = BTreeSet::new();
        for (zone, kind) in zones {
            current.insert(zone.start);
            let key = self.zone_key(zone.start);
            if self.store.get(&key).is_some() {
                continue;
            }
            self.record(&key, zone.start, now);
            notifications.push(NotificationRequest {
                instrument: self.instrument.clone(),
                detector: self.detector,
                zone,
                kind,
                fired_at: now,
            });
        }

        let dropped: Vec<i64> = self.active_starts.difference(&current).copied().collect();
        for start in dropped {
            let key = self.zone_key(start);
            match self.store.remove(&key) {
                Ok(true) => tracing::debug!("[{}] zone {} invalidated", self.instrument, key),
                Ok(false) => {}
                Err(e) => tracing::warn!("[{}] failed to clear {}: {}", self.instrument, key, e),
            }
        }
        self.active_starts = current;

        CycleOutcome {
            published: result,
            notifications,
        }
    }

    fn record(&mut self, key: &str, zone_start: i64, now: DateTime<Utc>) {
        let record = AlertRecord {
            zone_start,
            fired_at: now.timestamp(),
        };
        if let Err(e) = self.store.set(key, record) {
            tracing::warn!("[{}] failed to persist alert {}: {}", self.instrument, key, e);
        }
    }

    /// Drop records older than the TTL. Zones still reported active are kept.
    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now.timestamp() - self.ttl_secs;
        let records = self.store.snapshot();
        let kept: std::collections::BTreeMap<_, _> = records
            .iter()
            .filter(|(_, r)| r.fired_at >= cutoff || self.active_starts.contains(&r.zone_start))
            .map(|(k, r)| (k.clone(), *r))
            .collect();

        if kept.len() == records.len() {
            return;
        }
        tracing::debug!(
            "[{}] pruning {} stale {} alert record(s)",
            self.instrument,
            records.len() - kept.len(),
            self.detector
        );
        if let Err(e) = self.store.atomic_replace(kept) {
            tracing::warn!("[{}] failed to prune alert records: {}", self.instrument, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::business_logic::accumulation::{BoxMetrics, Breakout, Tier};
    use crate::business_logic::fvg::{FairValueGap, FvgScan};
    use crate::business_logic::session::Session;
    use crate::business_logic::supply_demand::{BiasInfo, SupplyDemandScan, SupplyDemandZone};
    use crate::models::candle::Candle;
    use crate::models::zone::ScanStatus;
    use crate::services::dedup_store::{JsonFileStore, MemoryStore};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 6, 14, 0, 0).unwrap()
    }

    fn accumulation_zone(start: i64, status: ZoneStatus) -> DetectorResult {
        let breakout = (status == ZoneStatus::Confirmed).then(|| Breakout {
            direction: BreakoutDirection::Up,
            body: 0.3,
            impulse_ratio: Some(3.0),
            candle: Candle {
                time: start + 2400,
                open: 101.7,
                high: 102.02,
                low: 101.68,
                close: 102.0,
            },
        });
        DetectorResult::Zone(Box::new(AccumulationZone {
            zone: Zone::new(100.05, 99.95, start, start + 2340, status),
            session: Session::NewYork,
            metrics: BoxMetrics {
                tier: Tier::Found,
                range_pct: 0.001,
                slope: 0.0,
                adx: Some(0.0),
                choppiness: 1.0,
                avg_body: 0.1,
            },
            breakout,
            secondary_zone: None,
        }))
    }

    fn demand_scan(starts: &[i64]) -> DetectorResult {
        DetectorResult::SupplyDemand(SupplyDemandScan {
            bias: BiasInfo::misaligned("test"),
            zones: starts
                .iter()
                .map(|s| SupplyDemandZone {
                    zone: Zone::new(100.3, 99.7, *s, s + 600, ZoneStatus::Active)
                        .with_type(ZoneType::Demand),
                    session: Session::London,
                    impulse_ratio: 2.5,
                })
                .collect(),
        })
    }

    fn accumulation(store: Box<dyn DedupStore>) -> AlertLifecycle {
        AlertLifecycle::new("US30", DetectorKind::Accumulation, store, ALERT_TTL_SECS)
    }

    #[test]
    fn test_confirmed_breakout_fires_once_and_holds_one_cycle() {
        let mut lifecycle = accumulation(Box::new(MemoryStore::new()));
        let start = 1_000;

        let out = lifecycle.process(accumulation_zone(start, ZoneStatus::Active), t0());
        assert!(out.notifications.is_empty());
        assert_eq!(lifecycle.state, LifecycleState::Active { zone_start: start });

        let out = lifecycle.process(accumulation_zone(start, ZoneStatus::Confirmed), t0());
        assert_eq!(out.notifications.len(), 1);
        assert!(matches!(
            out.notifications[0].kind,
            NotificationKind::BreakoutConfirmed {
                direction: BreakoutDirection::Up,
                ..
            }
        ));
        assert!(matches!(lifecycle.state, LifecycleState::Confirmed { .. }));

        // Next tick still publishes the confirmed box, whatever the detector says now
        let out = lifecycle.process(DetectorResult::sentinel(ScanStatus::Looking), t0());
        assert!(out.notifications.is_empty());
        assert_eq!(out.published, accumulation_zone(start, ZoneStatus::Confirmed));
        assert_eq!(lifecycle.state, LifecycleState::Looking);

        let out = lifecycle.process(DetectorResult::sentinel(ScanStatus::Looking), t0());
        assert_eq!(out.published, DetectorResult::sentinel(ScanStatus::Looking));
    }

    /// Drive a lifecycle through an active cycle and then its confirmation
    fn confirm(lifecycle: &mut AlertLifecycle, start: i64, now: DateTime<Utc>) -> CycleOutcome {
        lifecycle.process(accumulation_zone(start, ZoneStatus::Active), now);
        lifecycle.process(accumulation_zone(start, ZoneStatus::Confirmed), now)
    }

    #[test]
    fn test_replayed_confirmation_fires_once() {
        let mut lifecycle = accumulation(Box::new(MemoryStore::new()));
        let confirmed = accumulation_zone(1_000, ZoneStatus::Confirmed);
        lifecycle.process(accumulation_zone(1_000, ZoneStatus::Active), t0());

        let mut fired = 0;
        for i in 0..4 {
            let now = t0() + Duration::seconds(30 * i);
            fired += lifecycle.process(confirmed.clone(), now).notifications.len();
        }
        assert_eq!(fired, 1);
    }

    #[test]
    fn test_confirmation_without_active_box_is_silent() {
        let mut lifecycle = accumulation(Box::new(MemoryStore::new()));
        let out = lifecycle.process(accumulation_zone(1_000, ZoneStatus::Confirmed), t0());
        assert!(out.notifications.is_empty());
        assert_eq!(lifecycle.state, LifecycleState::Looking);

        // Once the box is seen active, its confirmation alerts
        let out = confirm(&mut lifecycle, 1_000, t0());
        assert_eq!(out.notifications.len(), 1);
    }

    #[test]
    fn test_restart_does_not_refire() {
        let dir = tempfile::tempdir().unwrap();

        let store = JsonFileStore::open(dir.path(), "US30", DetectorKind::Accumulation);
        let mut first = accumulation(Box::new(store));
        assert_eq!(confirm(&mut first, 1_000, t0()).notifications.len(), 1);

        let store = JsonFileStore::open(dir.path(), "US30", DetectorKind::Accumulation);
        let mut second = accumulation(Box::new(store));
        let out = confirm(&mut second, 1_000, t0() + Duration::seconds(30));
        assert!(out.notifications.is_empty());
    }

    #[test]
    fn test_new_zone_start_fires_again() {
        let mut lifecycle = accumulation(Box::new(MemoryStore::new()));
        confirm(&mut lifecycle, 1_000, t0());
        lifecycle.process(DetectorResult::sentinel(ScanStatus::Looking), t0());

        let out = confirm(&mut lifecycle, 5_000, t0());
        assert_eq!(out.notifications.len(), 1);
    }

    #[test]
    fn test_other_breakout_during_hold_still_alerts() {
        let mut lifecycle = accumulation(Box::new(MemoryStore::new()));
        assert_eq!(confirm(&mut lifecycle, 1_000, t0()).notifications.len(), 1);

        let out = lifecycle.process(accumulation_zone(5_000, ZoneStatus::Confirmed), t0());
        assert_eq!(out.published, accumulation_zone(1_000, ZoneStatus::Confirmed));
        assert_eq!(out.notifications.len(), 1);
        assert_eq!(out.notifications[0].zone.start, 5_000);

        // The new breakout is held next
        let out = lifecycle.process(DetectorResult::sentinel(ScanStatus::Looking), t0());
        assert_eq!(out.published, accumulation_zone(5_000, ZoneStatus::Confirmed));
        assert!(out.notifications.is_empty());
    }

    #[test]
    fn test_active_box_during_hold_arms_next_confirmation() {
        let mut lifecycle = accumulation(Box::new(MemoryStore::new()));
        confirm(&mut lifecycle, 1_000, t0());

        lifecycle.process(accumulation_zone(5_000, ZoneStatus::Active), t0());
        assert_eq!(lifecycle.state, LifecycleState::Active { zone_start: 5_000 });
        let out = lifecycle.process(accumulation_zone(5_000, ZoneStatus::Confirmed), t0());
        assert_eq!(out.notifications.len(), 1);
    }

    #[test]
    fn test_stale_records_are_pruned() {
        let mut store = MemoryStore::new();
        let fired_at = (t0() - Duration::hours(5)).timestamp();
        store
            .set(
                "US30:accumulation",
                AlertRecord {
                    zone_start: 1_000,
                    fired_at,
                },
            )
            .unwrap();

        let mut lifecycle = accumulation(Box::new(store));
        // Older than the TTL, so the same zone may alert again
        let out = confirm(&mut lifecycle, 1_000, t0());
        assert_eq!(out.notifications.len(), 1);
    }

    #[test]
    fn test_multi_zone_fires_per_start_and_rearms_after_invalidation() {
        let mut lifecycle = AlertLifecycle::new(
            "EURUSD",
            DetectorKind::SupplyDemand,
            Box::new(MemoryStore::new()),
            ALERT_TTL_SECS,
        );

        let out = lifecycle.process(demand_scan(&[100, 200]), t0());
        assert_eq!(out.notifications.len(), 2);

        let out = lifecycle.process(demand_scan(&[100, 200]), t0());
        assert!(out.notifications.is_empty());

        // A sentinel leaves the live set alone
        let out = lifecycle.process(DetectorResult::sentinel(ScanStatus::InsufficientData), t0());
        assert!(out.notifications.is_empty());
        let out = lifecycle.process(demand_scan(&[100, 200]), t0());
        assert!(out.notifications.is_empty());

        // Zone 100 invalidated, then the same zone shows up again
        lifecycle.process(demand_scan(&[200]), t0());
        let out = lifecycle.process(demand_scan(&[100, 200]), t0());
        assert_eq!(out.notifications.len(), 1);
        assert_eq!(out.notifications[0].zone.start, 100);
        assert!(matches!(
            out.notifications[0].kind,
            NotificationKind::ZoneActivated {
                zone_type: Some(ZoneType::Demand),
                ..
            }
        ));
    }

    #[test]
    fn test_live_zone_is_not_pruned() {
        let mut lifecycle = AlertLifecycle::new(
            "EURUSD",
            DetectorKind::SupplyDemand,
            Box::new(MemoryStore::new()),
            ALERT_TTL_SECS,
        );
        lifecycle.process(demand_scan(&[100]), t0());
        let out = lifecycle.process(demand_scan(&[100]), t0() + Duration::hours(6));
        assert!(out.notifications.is_empty());
    }

    #[test]
    fn test_zone_invalidated_across_restart_rearms() {
        let dir = tempfile::tempdir().unwrap();
        let open = || {
            AlertLifecycle::new(
                "EURUSD",
                DetectorKind::SupplyDemand,
                Box::new(JsonFileStore::open(dir.path(), "EURUSD", DetectorKind::SupplyDemand)),
                ALERT_TTL_SECS,
            )
        };

        let mut first = open();
        assert_eq!(first.process(demand_scan(&[100, 200]), t0()).notifications.len(), 2);
        drop(first);

        // Zone 100 is gone on the first cycle after the restart
        let mut second = open();
        assert!(second.process(demand_scan(&[200]), t0()).notifications.is_empty());
        let out = second.process(demand_scan(&[100, 200]), t0());
        assert_eq!(out.notifications.len(), 1);
        assert_eq!(out.notifications[0].zone.start, 100);
    }

    #[test]
    fn test_fvg_gap_notification() {
        let gap = FairValueGap {
            zone: Zone::new(100.2, 100.0, 60, 120, ZoneStatus::Active),
            fvg_type: FvgType::Bullish,
            gap_pct: 0.002,
            body_ratio: 0.7,
            impulse: Candle {
                time: 60,
                open: 99.95,
                high: 100.4,
                low: 99.9,
                close: 100.3,
            },
        };
        let scan = DetectorResult::Fvg(FvgScan {
            has_fvg: true,
            fvgs: vec![gap],
            total: 1,
            found: 1,
            bullish: 1,
            bearish: 0,
        });
        let mut lifecycle = AlertLifecycle::new(
            "BTC",
            DetectorKind::Fvg,
            Box::new(MemoryStore::new()),
            ALERT_TTL_SECS,
        );

        let out = lifecycle.process(scan.clone(), t0());
        assert_eq!(out.notifications.len(), 1);
        assert_eq!(
            out.notifications[0].kind,
            NotificationKind::GapOpened {
                fvg_type: FvgType::Bullish,
                gap_pct: 0.002
            }
        );
        assert!(lifecycle.process(scan, t0()).notifications.is_empty());
    }
}
