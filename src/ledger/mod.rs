//! Cost ledger: persists per-call usage, computes rolling spend, and exposes
//! the budget mode transitions the Router consults before dispatch.
//!
//! Backed by SQLite via `rusqlite` with the `bundled` feature, behind a
//! single `Mutex<Connection>` writer; reads are served from cached in-memory
//! counters so `budget_state()` never touches disk.

mod schema;

use crate::config::BudgetConfig;
use crate::error::{AtlasError, Result};
use crate::generator::GenerationUsage;
use crate::router::{Category, Tier};
use chrono::{DateTime, Datelike, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, warn};

/// Budget mode derived from spend relative to the configured caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetMode {
    Normal,
    Thrifty,
    LocalOnly,
}

impl BudgetMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetMode::Normal => "normal",
            BudgetMode::Thrifty => "thrifty",
            BudgetMode::LocalOnly => "local_only",
        }
    }
}

/// Current spend snapshot and derived mode.
#[derive(Debug, Clone, Copy)]
pub struct BudgetState {
    pub monthly_spend_usd: f64,
    pub daily_spend_usd: f64,
    pub mode: BudgetMode,
}

/// An append-only usage record. Never mutated once written.
#[derive(Debug, Clone)]
pub struct UsageRecord {
    pub utterance_id: u64,
    pub tier: Tier,
    pub category: Category,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

impl UsageRecord {
    pub fn from_generation(
        utterance_id: u64,
        tier: Tier,
        category: Category,
        usage: GenerationUsage,
    ) -> Self {
        Self {
            utterance_id,
            tier,
            category,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost_usd: usage.cost_usd,
        }
    }
}

struct Counters {
    month_spend_cents: i64,
    day_spend_cents: i64,
    degraded: bool,
}

/// Single-writer cost ledger.
pub struct CostLedger {
    conn: Mutex<Connection>,
    config: BudgetConfig,
    counters: Mutex<Counters>,
}

impl CostLedger {
    pub fn open(path: impl AsRef<Path>, config: BudgetConfig) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| AtlasError::Ledger(format!("failed to open ledger db: {e}")))?;
        schema::apply_schema(&conn)
            .map_err(|e| AtlasError::Ledger(format!("failed to apply ledger schema: {e}")))?;

        let period_key = Self::period_key_for(Utc::now(), &config);
        let (month_cents, day_cents) = load_counters(&conn, &period_key)
            .map_err(|e| AtlasError::Ledger(format!("failed to load ledger counters: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
            config,
            counters: Mutex::new(Counters {
                month_spend_cents: month_cents,
                day_spend_cents: day_cents,
                degraded: false,
            }),
        })
    }

    /// In-memory ledger for tests and dry runs; never persists to disk.
    pub fn open_in_memory(config: BudgetConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AtlasError::Ledger(format!("failed to open in-memory ledger: {e}")))?;
        schema::apply_schema(&conn)
            .map_err(|e| AtlasError::Ledger(format!("failed to apply ledger schema: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
            config,
            counters: Mutex::new(Counters {
                month_spend_cents: 0,
                day_spend_cents: 0,
                degraded: false,
            }),
        })
    }

    /// Append a usage record. Idempotent: recording the same `utterance_id`
    /// twice has the same effect as recording it once.
    ///
    /// If the underlying store fails, the ledger falls into a degraded mode:
    /// spend is still tracked in memory (so budget gating stays accurate) and
    /// subsequent [`budget_state`](Self::budget_state) calls report
    /// [`BudgetMode::Thrifty`] until a future write succeeds.
    pub fn record(&self, record: UsageRecord) -> Result<()> {
        let period_key = Self::period_key_for(Utc::now(), &self.config);
        let cost_cents = (record.cost_usd * 100.0).round() as i64;

        let write_result: rusqlite::Result<i64> = (|| {
            let conn = self.conn.lock().expect("ledger connection lock poisoned");
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO usage \
                 (utterance_id, tier, category, input_tokens, output_tokens, cost_usd, t_committed_wall, period_key) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.utterance_id as i64,
                    record.tier.as_str(),
                    record.category.as_str(),
                    record.input_tokens as i64,
                    record.output_tokens as i64,
                    record.cost_usd,
                    Utc::now().timestamp(),
                    period_key,
                ],
            )?;

            if inserted > 0 {
                conn.execute(
                    "INSERT INTO counters (period_key, day_spend_cents, month_spend_cents) \
                     VALUES (?1, ?2, ?2) \
                     ON CONFLICT(period_key) DO UPDATE SET \
                       day_spend_cents = day_spend_cents + ?2, \
                       month_spend_cents = month_spend_cents + ?2",
                    params![period_key, cost_cents],
                )?;
            }
            Ok(inserted as i64)
        })();

        let mut counters = self.counters.lock().expect("counters lock poisoned");
        match write_result {
            Ok(inserted) if inserted > 0 => {
                counters.month_spend_cents += cost_cents;
                counters.day_spend_cents += cost_cents;
                counters.degraded = false;
                info!(
                    utterance_id = record.utterance_id,
                    tier = record.tier.as_str(),
                    cost_usd = record.cost_usd,
                    "ledger recorded usage"
                );
            }
            Ok(_) => {
                // Already recorded for this utterance_id — idempotent no-op.
            }
            Err(e) => {
                warn!(error = %e, "ledger write failed — entering degraded mode");
                counters.month_spend_cents += cost_cents;
                counters.day_spend_cents += cost_cents;
                counters.degraded = true;
            }
        }
        Ok(())
    }

    pub fn budget_state(&self) -> BudgetState {
        let counters = self.counters.lock().expect("counters lock poisoned");
        let monthly_spend_usd = counters.month_spend_cents as f64 / 100.0;
        let daily_spend_usd = counters.day_spend_cents as f64 / 100.0;

        let mode = if counters.degraded {
            warn!("ledger degraded — treating budget as thrifty");
            BudgetMode::Thrifty
        } else if self.config.monthly_cap_usd <= 0.0 {
            BudgetMode::Normal
        } else {
            let fraction = monthly_spend_usd / self.config.monthly_cap_usd;
            if fraction >= self.config.hard_fraction {
                BudgetMode::LocalOnly
            } else if fraction >= self.config.soft_fraction {
                BudgetMode::Thrifty
            } else {
                BudgetMode::Normal
            }
        };

        BudgetState {
            monthly_spend_usd,
            daily_spend_usd,
            mode,
        }
    }

    fn period_key_for(now: DateTime<Utc>, _config: &BudgetConfig) -> String {
        format!("{:04}-{:02}", now.year(), now.month())
    }
}

fn load_counters(conn: &Connection, period_key: &str) -> rusqlite::Result<(i64, i64)> {
    conn.query_row(
        "SELECT month_spend_cents, day_spend_cents FROM counters WHERE period_key = ?1",
        params![period_key],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
    .map(|opt| opt.unwrap_or((0, 0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BudgetConfig {
        BudgetConfig {
            monthly_cap_usd: 10.0,
            daily_cap_usd: 2.0,
            soft_fraction: 0.8,
            hard_fraction: 1.0,
            timezone: "UTC".into(),
            period_reset: "monthly".into(),
        }
    }

    fn record(utterance_id: u64, cost_usd: f64) -> UsageRecord {
        UsageRecord {
            utterance_id,
            tier: Tier::Fast,
            category: Category::Advice,
            input_tokens: 100,
            output_tokens: 200,
            cost_usd,
        }
    }

    #[test]
    fn starts_in_normal_mode() {
        let ledger = CostLedger::open_in_memory(config()).unwrap();
        assert_eq!(ledger.budget_state().mode, BudgetMode::Normal);
    }

    #[test]
    fn recording_usage_moves_to_thrifty_at_soft_fraction() {
        let ledger = CostLedger::open_in_memory(config()).unwrap();
        ledger.record(record(1, 8.5)).unwrap();
        assert_eq!(ledger.budget_state().mode, BudgetMode::Thrifty);
    }

    #[test]
    fn recording_usage_moves_to_local_only_at_hard_fraction() {
        let ledger = CostLedger::open_in_memory(config()).unwrap();
        ledger.record(record(1, 10.5)).unwrap();
        assert_eq!(ledger.budget_state().mode, BudgetMode::LocalOnly);
    }

    #[test]
    fn duplicate_utterance_id_is_idempotent() {
        let ledger = CostLedger::open_in_memory(config()).unwrap();
        ledger.record(record(1, 1.0)).unwrap();
        ledger.record(record(1, 1.0)).unwrap();
        let state = ledger.budget_state();
        assert!((state.monthly_spend_usd - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_cap_never_restricts() {
        let mut cfg = config();
        cfg.monthly_cap_usd = 0.0;
        let ledger = CostLedger::open_in_memory(cfg).unwrap();
        ledger.record(record(1, 500.0)).unwrap();
        assert_eq!(ledger.budget_state().mode, BudgetMode::Normal);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ledger.sqlite3");

        {
            let ledger = CostLedger::open(&path, config()).unwrap();
            ledger.record(record(1, 9.0)).unwrap();
        }

        let reopened = CostLedger::open(&path, config()).unwrap();
        assert_eq!(reopened.budget_state().mode, BudgetMode::Thrifty);
    }
}
