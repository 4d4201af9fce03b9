//! Background refresh.
//!
//! One tokio task per registered KPI recomputes it for the rolling dashboard
//! window each time its TTL elapses, so dashboard reads stay warm.

use crate::core::config::RefreshConfig;
use crate::core::{Result, TimeWindow, Timestamp};
use crate::engine::analytics::AnalyticsEngine;
use crate::kpi::KpiParams;
use chrono::{Duration, TimeZone, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Window of `days` whole UTC days ending at the next midnight after `now`.
///
/// Aligned to days so every request made on the same day shares a cache key.
pub fn refresh_window(now: Timestamp, days: u32) -> Result<TimeWindow> {
    let midnight = Utc.from_utc_datetime(&now.date_naive().and_time(chrono::NaiveTime::MIN));
    let end = midnight + Duration::days(1);
    TimeWindow::trailing(end, Duration::days(i64::from(days)))
}

/// Periodic recomputation of every registered KPI.
pub struct RefreshScheduler {
    tasks: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
}

impl RefreshScheduler {
    /// Spawn one refresh task per KPI. Must be called within a tokio runtime.
    ///
    /// Returns `None` without spawning anything when refresh is disabled.
    pub fn start(engine: AnalyticsEngine, config: &RefreshConfig) -> Option<Self> {
        if !config.enabled {
            tracing::info!("background refresh disabled");
            return None;
        }
        let (shutdown, _) = watch::channel(false);
        let window_days = config.window_days;

        let tasks = engine
            .registry()
            .iter()
            .map(|definition| {
                let engine = engine.clone();
                let kpi_id = definition.id.clone();
                let period = definition.ttl;
                let mut stop = shutdown.subscribe();

                tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                    loop {
                        tokio::select! {
                            _ = ticker.tick() => {}
                            _ = stop.changed() => break,
                        }

                        let params = match refresh_window(engine.now(), window_days) {
                            Ok(window) => KpiParams::new(window),
                            Err(e) => {
                                tracing::error!(kpi = %kpi_id, error = %e, "invalid refresh window");
                                break;
                            }
                        };
                        match engine.refresh(&kpi_id, &params).await {
                            Ok(snapshot) => {
                                tracing::debug!(kpi = %kpi_id, value = snapshot.value, "KPI refreshed")
                            }
                            Err(e) => tracing::warn!(kpi = %kpi_id, error = %e, "KPI refresh failed"),
                        }
                    }
                    tracing::debug!(kpi = %kpi_id, "refresh task stopped");
                })
            })
            .collect::<Vec<_>>();

        tracing::info!(tasks = tasks.len(), window_days, "refresh scheduler started");
        Some(Self { tasks, shutdown })
    }

    /// Number of refresh tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Stop all timers and wait for the tasks to exit.
    ///
    /// A refresh already computing finishes before its task exits.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "refresh task ended abnormally");
            }
        }
        tracing::info!("refresh scheduler stopped");
    }
}
