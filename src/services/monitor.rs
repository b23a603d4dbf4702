use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::business_logic::accumulation::BreakoutDirection;
use crate::business_logic::config::InstrumentConfig;
use crate::business_logic::lifecycle::{AlertLifecycle, NotificationRequest};
use crate::business_logic::registry::{DetectionContext, DetectorRegistry, DetectorResult};
use crate::business_logic::supply_demand::{Bias, BiasInput};
use crate::errors::ProviderError;
use crate::models::candle::CandleSeries;
use crate::models::status::{DetectorStatus, InstrumentStatus};
use crate::models::zone::DetectorKind;
use crate::services::dedup_store::DedupStore;
use crate::services::notifier::format_range;
use crate::services::pattern_state::SharedPatternState;
use crate::services::provider::CandleProvider;

/// Process-wide advisory lock held only for the duration of a provider fetch
pub type FetchGate = Arc<Mutex<()>>;

/// Polling loop for one instrument; the only writer of that instrument's lifecycle state
pub struct InstrumentMonitor {
    config: InstrumentConfig,
    registry: DetectorRegistry,
    lifecycles: Vec<AlertLifecycle>,
    provider: Arc<dyn CandleProvider>,
    fetch_gate: FetchGate,
    shared_state: SharedPatternState,
    notifications: mpsc::Sender<NotificationRequest>,
}

impl InstrumentMonitor {
    pub fn new(
        config: InstrumentConfig,
        provider: Arc<dyn CandleProvider>,
        fetch_gate: FetchGate,
        shared_state: SharedPatternState,
        notifications: mpsc::Sender<NotificationRequest>,
        ttl_secs: i64,
        mut open_store: impl FnMut(&str, DetectorKind) -> Box<dyn DedupStore>,
    ) -> Self {
        let registry = DetectorRegistry::new(config.id.clone(), &config.detectors);
        let lifecycles = registry
            .kinds()
            .into_iter()
            .map(|kind| {
                AlertLifecycle::new(
                    config.id.clone(),
                    kind,
                    open_store(&config.id, kind),
                    ttl_secs,
                )
            })
            .collect();

        Self {
            config,
            registry,
            lifecycles,
            provider,
            fetch_gate,
            shared_state,
            notifications,
        }
    }

    /// Poll forever
    pub async fn run(mut self, poll_interval: Duration) {
        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            "[{}] monitoring {} on {} every {}s ({})",
            self.config.id,
            self.config.ticker,
            self.config.interval,
            poll_interval.as_secs(),
            self.registry
                .kinds()
                .iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        loop {
            ticker.tick().await;
            if let Err(e) = self.run_cycle(Utc::now()).await {
                tracing::error!("[{}] cycle failed: {:#}", self.config.id, e);
            }
        }
    }

    /// Fetch, detect, run lifecycles, publish. Detection itself never fails; only the
    /// main candle fetch can abort a cycle.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> anyhow::Result<()> {
        let series = match self.fetch_series().await {
            Ok(series) => series,
            Err(e) => {
                let message = e.to_string();
                self.publish(Vec::new(), Some(message), now).await;
                return Err(e).context(format!("failed to fetch candles for {}", self.config.ticker));
            }
        };

        let bias = self.fetch_bias().await;
        let ctx = DetectionContext {
            series: &series,
            bias: bias.as_ref(),
            now,
        };
        let results = self.registry.run(&ctx);

        let mut published = Vec::with_capacity(results.len());
        for (kind, result) in results {
            let Some(lifecycle) = self.lifecycles.iter_mut().find(|l| l.detector() == kind) else {
                continue;
            };
            let outcome = lifecycle.process(result, now);
            // The record is already stored, so wait for room rather than drop the alert
            for notification in outcome.notifications {
                if let Err(e) = self.notifications.send(notification).await {
                    tracing::error!("[{}] dropped {} notification: {}", self.config.id, kind, e);
                }
            }
            published.push((kind, outcome.published));
        }

        self.publish(published, None, now).await;
        Ok(())
    }

    async fn fetch_series(&self) -> Result<CandleSeries, ProviderError> {
        let _gate = self.fetch_gate.lock().await;
        self.provider
            .get_candles(&self.config.ticker, &self.config.interval, &self.config.period)
            .await
    }

    async fn fetch_bias(&self) -> Option<BiasInput> {
        let bias_config = self.registry.bias_config()?;

        let daily = {
            let _gate = self.fetch_gate.lock().await;
            self.provider
                .get_bias_candles(
                    &self.config.ticker,
                    &bias_config.daily_period,
                    &bias_config.daily_interval,
                )
                .await
        };
        let weekly = {
            let _gate = self.fetch_gate.lock().await;
            self.provider
                .get_bias_candles(
                    &self.config.ticker,
                    &bias_config.weekly_period,
                    &bias_config.weekly_interval,
                )
                .await
        };

        Some(match (daily, weekly) {
            (Ok(daily), Ok(weekly)) => BiasInput::Candles { daily, weekly },
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!("[{}] bias fetch failed: {}", self.config.id, e);
                BiasInput::Unavailable(format!("bias fetch failed: {e}"))
            }
        })
    }

    async fn publish(
        &self,
        results: Vec<(DetectorKind, DetectorResult)>,
        last_error: Option<String>,
        now: DateTime<Utc>,
    ) {
        let summary = build_summary(&self.config.id, &results, last_error.as_deref());
        let status = InstrumentStatus {
            instrument: self.config.id.clone(),
            ticker: self.config.ticker.clone(),
            label: self.config.label.clone(),
            interval: self.config.interval.clone(),
            detectors: results
                .iter()
                .map(|(kind, result)| DetectorStatus::new(*kind, result))
                .collect(),
            last_error,
            updated_at_ms: now.timestamp_millis() as u64,
            summary,
        };
        self.shared_state.publish(status).await;
    }
}

fn build_summary(
    instrument: &str,
    results: &[(DetectorKind, DetectorResult)],
    last_error: Option<&str>,
) -> String {
    if let Some(error) = last_error {
        return format!("{instrument}: no data this cycle ({error}).");
    }
    if results.is_empty() {
        return format!("{instrument}: no detectors enabled.");
    }

    let parts: Vec<String> = results
        .iter()
        .map(|(kind, result)| describe(*kind, result))
        .collect();
    format!("{instrument}: {}.", parts.join("; "))
}

fn describe(kind: DetectorKind, result: &DetectorResult) -> String {
    match result {
        DetectorResult::Sentinel { status } => format!("{kind} {}", status.as_str()),
        DetectorResult::Zone(zone) => {
            let bounds = format_range(zone.zone.bottom, zone.zone.top);
            match zone.breakout.as_ref().map(|b| b.direction) {
                Some(BreakoutDirection::Up) => format!("{kind} breakout up from {bounds}"),
                Some(BreakoutDirection::Down) => format!("{kind} breakout down from {bounds}"),
                None => format!("{kind} box active {bounds}"),
            }
        }
        DetectorResult::SupplyDemand(scan) => match scan.bias.bias {
            Bias::Misaligned => format!("{kind} bias misaligned"),
            _ if scan.zones.is_empty() => format!("{kind} looking"),
            _ => format!("{kind} {} live zone(s)", scan.zones.len()),
        },
        DetectorResult::Fvg(scan) if scan.has_fvg => format!(
            "{kind} {} open gap(s), {} bullish, {} bearish",
            scan.found, scan.bullish, scan.bearish
        ),
        DetectorResult::Fvg(_) => format!("{kind} looking"),
    }
}
