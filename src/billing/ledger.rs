//! Append-bounded cost ledger with a daily spend gate.
//!
//! Every metered operation is recorded at its fixed unit cost. Two pieces
//! of state are persisted after each record, under two string keys:
//! - `cost_tracking`: the recent entry log, bounded to 1000 entries with
//!   FIFO eviction of the oldest
//! - `cost_stats`: the running aggregate, never reduced by log eviction
//!
//! Persistence degrades silently: a failed write drops the record with a
//! warning, a failed read reports safe defaults, and the daily gate fails
//! open so a storage hiccup cannot disable a paid feature. The flip side
//! is that the cap is not crash-safe: a wedged store under-triggers it.

use crate::clock::{Clock, SystemClock};
use crate::storage::KeyValueStore;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use super::pricing::OperationKind;

/// Storage key for the recent entry log.
const COST_LOG_KEY: &str = "cost_tracking";
/// Storage key for the running aggregate.
const COST_STATS_KEY: &str = "cost_stats";
/// Bound on the recent log; the oldest entries are evicted beyond this.
const MAX_LOG_ENTRIES: usize = 1000;
/// Fraction of the daily cap at which a warning is logged.
const CAP_WARN_FRACTION: f64 = 0.8;

/// Default daily spend cap in USD.
pub const DEFAULT_DAILY_LIMIT_USD: f64 = 10.0;

/// One metered operation, immutable once logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostEntry {
    /// Unique, monotonically orderable id (zero-padded epoch millis plus a
    /// process-local sequence number).
    pub id: String,
    /// ISO-8601 instant of the operation.
    pub timestamp: String,
    /// What kind of operation was metered.
    pub operation_kind: OperationKind,
    /// Cost in USD.
    pub cost: f64,
    /// Opaque caller-supplied context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Running aggregate over every entry ever logged.
///
/// Log eviction does not reduce these totals: the log is a bounded
/// recent-history view, the stats are the durable aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CostStats {
    pub total_cost: f64,
    /// Count of operations per kind.
    pub operation_counts: HashMap<String, u64>,
    /// Spend per kind, in USD.
    pub operation_costs: HashMap<String, f64>,
    /// Spend bucketed by UTC calendar day (`YYYY-MM-DD`).
    pub daily_costs: HashMap<String, f64>,
    /// When tracking last started from zero.
    pub last_reset: String,
}

impl Default for CostStats {
    fn default() -> Self {
        Self {
            total_cost: 0.0,
            operation_counts: HashMap::new(),
            operation_costs: HashMap::new(),
            daily_costs: HashMap::new(),
            last_reset: String::new(),
        }
    }
}

/// Display-formatted cost aggregate, ready for the usage screen.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub total: String,
    pub ai_measurement: String,
    pub ai_validation: String,
    pub other: String,
    pub today_cost: String,
    pub average_daily_cost: String,
}

/// Cost ledger over a pluggable string-keyed store.
///
/// The ledger is read-through: every accessor reflects the persisted
/// state, so several ledger instances over the same store agree.
pub struct CostLedger {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    seq: AtomicU64,
}

impl CostLedger {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    /// Ledger on an injected clock (tests: day rollover).
    pub fn with_clock(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            seq: AtomicU64::new(0),
        }
    }

    /// Record one metered operation at its fixed unit cost. Never fails:
    /// a storage error drops the record with a warning instead of
    /// surfacing to the caller.
    pub async fn log_cost(&self, kind: OperationKind, metadata: Option<serde_json::Value>) {
        let now_ms = self.clock.now_ms();
        let cost = kind.unit_cost_usd();
        let entry = CostEntry {
            id: self.next_id(now_ms),
            timestamp: iso_instant(now_ms),
            operation_kind: kind,
            cost,
            metadata,
        };

        let mut log = self.read_log().await;
        log.push(entry);
        if log.len() > MAX_LOG_ENTRIES {
            let excess = log.len() - MAX_LOG_ENTRIES;
            log.drain(..excess);
        }

        let day = day_key(now_ms);
        let mut stats = self.read_stats().await;
        stats.total_cost += cost;
        *stats
            .operation_counts
            .entry(kind.as_str().to_string())
            .or_insert(0) += 1;
        *stats
            .operation_costs
            .entry(kind.as_str().to_string())
            .or_insert(0.0) += cost;
        *stats.daily_costs.entry(day.clone()).or_insert(0.0) += cost;
        if stats.last_reset.is_empty() {
            stats.last_reset = iso_instant(now_ms);
        }

        if let Err(e) = self.persist(&log, &stats).await {
            warn!(error = %e, operation = kind.as_str(), "cost persistence failed, record dropped");
            return;
        }

        info!(operation = kind.as_str(), cost_usd = cost, "cost recorded");

        let today_total = stats.daily_costs.get(&day).copied().unwrap_or(0.0);
        if today_total >= DEFAULT_DAILY_LIMIT_USD * CAP_WARN_FRACTION {
            warn!(
                today_usd = today_total,
                cap_usd = DEFAULT_DAILY_LIMIT_USD,
                "approaching daily spend cap"
            );
        }
    }

    /// Running aggregate; safe defaults on read failure.
    pub async fn cost_stats(&self) -> CostStats {
        self.read_stats().await
    }

    /// Up to `limit` entries, most recent first.
    pub async fn recent_costs(&self, limit: usize) -> Vec<CostEntry> {
        let mut log = self.read_log().await;
        log.reverse();
        log.truncate(limit);
        log
    }

    /// Today's aggregated spend (UTC calendar day).
    pub async fn today_cost(&self) -> f64 {
        let stats = self.read_stats().await;
        stats
            .daily_costs
            .get(&day_key(self.clock.now_ms()))
            .copied()
            .unwrap_or(0.0)
    }

    /// Hard gate consulted before metered calls. Fails open: a read error
    /// reports the cap as not reached, so a storage hiccup cannot disable
    /// a paid feature.
    pub async fn is_daily_limit_reached(&self, limit_usd: f64) -> bool {
        self.today_cost().await >= limit_usd
    }

    /// Clear both persisted keys.
    pub async fn reset(&self) {
        for key in [COST_LOG_KEY, COST_STATS_KEY] {
            if let Err(e) = self.store.remove(key).await {
                warn!(key, error = %e, "cost reset failed");
            }
        }
    }

    /// Display-formatted aggregate for the usage screen.
    pub async fn cost_breakdown(&self) -> CostBreakdown {
        let stats = self.read_stats().await;
        let per_kind = |kind: OperationKind| {
            stats
                .operation_costs
                .get(kind.as_str())
                .copied()
                .unwrap_or(0.0)
        };

        let measurement = per_kind(OperationKind::AiRoomMeasurement);
        let validation = per_kind(OperationKind::AiPhotoValidation);
        let other = (stats.total_cost - measurement - validation).max(0.0);
        let today = stats
            .daily_costs
            .get(&day_key(self.clock.now_ms()))
            .copied()
            .unwrap_or(0.0);
        let tracked_days = stats.daily_costs.len().max(1);
        let average_daily = stats.total_cost / tracked_days as f64;

        CostBreakdown {
            total: usd(stats.total_cost),
            ai_measurement: usd(measurement),
            ai_validation: usd(validation),
            other: usd(other),
            today_cost: usd(today),
            average_daily_cost: usd(average_daily),
        }
    }

    /// Serialize the recent log as CSV. This is a support/diagnostics
    /// export, not the persisted format.
    pub async fn export_csv(&self) -> String {
        let log = self.read_log().await;
        let mut writer = csv::Writer::from_writer(Vec::new());
        let _ = writer.write_record(["Timestamp", "Operation", "Cost (USD)", "Metadata"]);
        for entry in &log {
            let cost = format!("{:.4}", entry.cost);
            let metadata = entry
                .metadata
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_default();
            let _ = writer.write_record([
                entry.timestamp.as_str(),
                entry.operation_kind.as_str(),
                cost.as_str(),
                metadata.as_str(),
            ]);
        }
        writer
            .into_inner()
            .ok()
            .and_then(|buf| String::from_utf8(buf).ok())
            .unwrap_or_default()
    }

    fn next_id(&self, now_ms: u64) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{now_ms:013}-{seq:06}")
    }

    async fn read_log(&self) -> Vec<CostEntry> {
        match self.store.get(COST_LOG_KEY).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "cost log unreadable, starting fresh");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "cost log read failed");
                Vec::new()
            }
        }
    }

    async fn read_stats(&self) -> CostStats {
        match self.store.get(COST_STATS_KEY).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "cost stats unreadable, starting fresh");
                CostStats::default()
            }),
            Ok(None) => CostStats::default(),
            Err(e) => {
                warn!(error = %e, "cost stats read failed");
                CostStats::default()
            }
        }
    }

    async fn persist(&self, log: &[CostEntry], stats: &CostStats) -> anyhow::Result<()> {
        let log_json = serde_json::to_string(log)?;
        let stats_json = serde_json::to_string(stats)?;
        self.store.set(COST_LOG_KEY, &log_json).await?;
        self.store.set(COST_STATS_KEY, &stats_json).await?;
        Ok(())
    }
}

/// Format as a display dollar amount.
fn usd(value: f64) -> String {
    format!("${value:.2}")
}

/// ISO-8601 instant for an epoch-milliseconds timestamp.
fn iso_instant(ms: u64) -> String {
    Utc.timestamp_millis_opt(i64::try_from(ms).unwrap_or(0))
        .single()
        .map(|t| t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
        .unwrap_or_default()
}

/// UTC calendar-day bucket key (`YYYY-MM-DD`).
fn day_key(ms: u64) -> String {
    Utc.timestamp_millis_opt(i64::try_from(ms).unwrap_or(0))
        .single()
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}
