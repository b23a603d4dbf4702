use std::time::Duration;

use tokio::sync::mpsc;

use crate::business_logic::accumulation::BreakoutDirection;
use crate::business_logic::fvg::FvgType;
use crate::business_logic::lifecycle::{NotificationKind, NotificationRequest};
use crate::models::zone::ZoneType;

/// Upper bound on one webhook delivery, so a stalled endpoint cannot back up the channel
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Single consumer of every instrument's notifications
pub struct AlertDispatcher {
    receiver: mpsc::Receiver<NotificationRequest>,
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl AlertDispatcher {
    pub fn new(
        receiver: mpsc::Receiver<NotificationRequest>,
        webhook_url: Option<String>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(WEBHOOK_TIMEOUT).build()?;
        Ok(Self {
            receiver,
            client,
            webhook_url,
        })
    }

    /// Drain the channel until every sender is gone. Returns the number dispatched.
    pub async fn run(mut self) -> usize {
        let mut dispatched = 0;
        while let Some(notification) = self.receiver.recv().await {
            self.dispatch(&notification).await;
            dispatched += 1;
        }
        tracing::info!("Alert dispatcher stopped after {} notification(s)", dispatched);
        dispatched
    }

    async fn dispatch(&self, notification: &NotificationRequest) {
        tracing::warn!("{}", render(notification));

        let Some(url) = &self.webhook_url else {
            return;
        };
        let sent = self
            .client
            .post(url)
            .json(notification)
            .send()
            .await
            .and_then(|response| response.error_for_status());
        if let Err(e) = sent {
            tracing::error!(
                "Webhook delivery failed for {} {}: {}",
                notification.instrument,
                notification.detector,
                e
            );
        }
    }
}

/// One-line alert text
pub fn render(notification: &NotificationRequest) -> String {
    let instrument = &notification.instrument;
    let zone = &notification.zone;
    let bounds = format_range(zone.bottom, zone.top);

    match &notification.kind {
        NotificationKind::BreakoutConfirmed {
            direction,
            impulse_ratio,
        } => {
            let dir = match direction {
                BreakoutDirection::Up => "up",
                BreakoutDirection::Down => "down",
            };
            match impulse_ratio {
                Some(ratio) => format!(
                    "CONFIRMED: {instrument} broke {dir} out of accumulation box {bounds} ({ratio:.1}x avg body)"
                ),
                None => format!("CONFIRMED: {instrument} broke {dir} out of accumulation box {bounds}"),
            }
        }
        NotificationKind::ZoneActivated {
            zone_type,
            impulse_ratio,
        } => {
            let side = match zone_type {
                Some(ZoneType::Supply) => "supply",
                _ => "demand",
            };
            format!("ZONE: new {side} zone on {instrument} at {bounds} ({impulse_ratio:.1}x impulse)")
        }
        NotificationKind::GapOpened { fvg_type, gap_pct } => {
            let side = match fvg_type {
                FvgType::Bullish => "bullish",
                FvgType::Bearish => "bearish",
            };
            format!(
                "FVG: {side} gap on {instrument} at {bounds} ({:.3}% of price)",
                gap_pct * 100.0
            )
        }
    }
}

/// `low-high` with one precision for both ends, picked from the larger magnitude
pub fn format_range(low: f64, high: f64) -> String {
    let precision = if low.abs().max(high.abs()) >= 100.0 { 2 } else { 5 };
    format!("{low:.precision$}-{high:.precision$}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::zone::{DetectorKind, Zone, ZoneStatus};
    use chrono::Utc;

    fn notification(kind: NotificationKind) -> NotificationRequest {
        NotificationRequest {
            instrument: "BTC".to_string(),
            detector: DetectorKind::Accumulation,
            zone: Zone::new(100.05, 99.95, 0, 60, ZoneStatus::Confirmed),
            kind,
            fired_at: Utc::now(),
        }
    }

    #[test]
    fn render_breakout() {
        let text = render(&notification(NotificationKind::BreakoutConfirmed {
            direction: BreakoutDirection::Up,
            impulse_ratio: Some(3.0),
        }));
        assert_eq!(
            text,
            "CONFIRMED: BTC broke up out of accumulation box 99.95-100.05 (3.0x avg body)"
        );
    }

    #[test]
    fn range_uses_one_precision() {
        assert_eq!(format_range(99.95, 100.05), "99.95-100.05");
        assert_eq!(format_range(1.08512, 1.08734), "1.08512-1.08734");
        assert_eq!(format_range(0.5, 99.0), "0.50000-99.00000");
    }

    #[test]
    fn render_gap_and_zone() {
        let text = render(&notification(NotificationKind::GapOpened {
            fvg_type: FvgType::Bearish,
            gap_pct: 0.002,
        }));
        assert!(text.starts_with("FVG: bearish gap on BTC"));
        assert!(text.ends_with("(0.200% of price)"));

        let text = render(&notification(NotificationKind::ZoneActivated {
            zone_type: Some(ZoneType::Supply),
            impulse_ratio: 2.5,
        }));
        assert!(text.contains("new supply zone"));
        assert!(text.ends_with("(2.5x impulse)"));
    }

    #[test]
    fn notification_serializes_with_kind_tag() {
        let json = serde_json::to_value(notification(NotificationKind::GapOpened {
            fvg_type: FvgType::Bullish,
            gap_pct: 0.002,
        }))
        .unwrap();
        assert_eq!(json["detector"], "accumulation");
        assert_eq!(json["kind"]["type"], "gap_opened");
        assert_eq!(json["zone"]["top"], 100.05);
    }

    #[tokio::test]
    async fn dispatcher_drains_until_senders_drop() {
        let (tx, rx) = mpsc::channel(4);
        let dispatcher = AlertDispatcher::new(rx, None).unwrap();
        let handle = tokio::spawn(dispatcher.run());

        for _ in 0..3 {
            tx.send(notification(NotificationKind::BreakoutConfirmed {
                direction: BreakoutDirection::Down,
                impulse_ratio: None,
            }))
            .await
            .unwrap();
        }
        drop(tx);

        assert_eq!(handle.await.unwrap(), 3);
    }
}
