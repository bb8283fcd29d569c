use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Datelike, Local, NaiveDate};
use redb::{Database, ReadableTable, TableDefinition};
use serde::Serialize;

/// Quota table: `"day:YYYY-MM-DD"` / `"week:YYYY-Www"` → used count.
const QUOTA_TABLE: TableDefinition<&str, u64> = TableDefinition::new("quota");

/// Snapshot of both quota counters with their calendar keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaCounters {
    pub day_used: u32,
    pub day_limit: u32,
    pub week_used: u32,
    pub week_limit: u32,
    pub day_key: String,
    pub week_key: String,
}

/// Outcome of one atomic consume attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub counters: QuotaCounters,
    /// Which scope blocked the attempt, when not allowed ("day" or "week").
    pub blocked_by: Option<&'static str>,
}

/// Durable day/week send counters keyed by the local calendar.
///
/// `try_consume` reads, checks, and increments both counters inside a single
/// write transaction, so racing callers cannot over-consume.  Rollover is
/// implicit: a new day or ISO week produces a new key whose counter starts
/// at zero; old rows are retained.
pub struct QuotaStore {
    db: Database,
    path: PathBuf,
    day_limit: u32,
    week_limit: u32,
}

pub(crate) fn day_key(date: NaiveDate) -> String {
    format!("day:{}", date.format("%Y-%m-%d"))
}

pub(crate) fn week_key(date: NaiveDate) -> String {
    let iso = date.iso_week();
    format!("week:{}-W{:02}", iso.year(), iso.week())
}

impl QuotaStore {
    pub fn open(path: impl AsRef<Path>, day_limit: u32, week_limit: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(&path)
            .with_context(|| format!("opening quota store at {}", path.display()))?;

        {
            let tx = db.begin_write()?;
            tx.open_table(QUOTA_TABLE)?;
            tx.commit()?;
        }

        Ok(Self {
            db,
            path,
            day_limit,
            week_limit,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current counters without consuming.
    pub fn snapshot(&self) -> Result<QuotaCounters> {
        self.snapshot_on(Local::now().date_naive())
    }

    pub fn snapshot_on(&self, today: NaiveDate) -> Result<QuotaCounters> {
        let day = day_key(today);
        let week = week_key(today);
        let tx = self.db.begin_read()?;
        let table = tx.open_table(QUOTA_TABLE)?;
        let day_used = table.get(day.as_str())?.map(|v| v.value()).unwrap_or(0);
        let week_used = table.get(week.as_str())?.map(|v| v.value()).unwrap_or(0);
        Ok(self.counters(day, week, day_used, week_used))
    }

    /// Atomically consume one send from both scopes if neither limit is
    /// reached.  Returns the post-consume counters on success and the
    /// untouched counters on refusal.
    pub fn try_consume(&self) -> Result<QuotaDecision> {
        self.try_consume_on(Local::now().date_naive())
    }

    pub fn try_consume_on(&self, today: NaiveDate) -> Result<QuotaDecision> {
        let day = day_key(today);
        let week = week_key(today);

        let tx = self.db.begin_write()?;
        let decision = {
            let mut table = tx.open_table(QUOTA_TABLE)?;
            let day_used = table.get(day.as_str())?.map(|v| v.value()).unwrap_or(0);
            let week_used = table.get(week.as_str())?.map(|v| v.value()).unwrap_or(0);

            let blocked_by = if day_used >= u64::from(self.day_limit) {
                Some("day")
            } else if week_used >= u64::from(self.week_limit) {
                Some("week")
            } else {
                None
            };

            if blocked_by.is_none() {
                table.insert(day.as_str(), day_used + 1)?;
                table.insert(week.as_str(), week_used + 1)?;
                QuotaDecision {
                    allowed: true,
                    counters: self.counters(day, week, day_used + 1, week_used + 1),
                    blocked_by: None,
                }
            } else {
                QuotaDecision {
                    allowed: false,
                    counters: self.counters(day, week, day_used, week_used),
                    blocked_by,
                }
            }
        };
        tx.commit()?;

        Ok(decision)
    }

    /// Return one reserved send to both scopes.  Used when a send was
    /// reserved via `try_consume` but never verified (stop signal, failed
    /// submit), so counters only reflect messages that actually went out.
    pub fn release(&self) -> Result<()> {
        self.release_on(Local::now().date_naive())
    }

    pub fn release_on(&self, today: NaiveDate) -> Result<()> {
        let day = day_key(today);
        let week = week_key(today);

        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(QUOTA_TABLE)?;
            for key in [day.as_str(), week.as_str()] {
                let used = table.get(key)?.map(|v| v.value()).unwrap_or(0);
                table.insert(key, used.saturating_sub(1))?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn counters(
        &self,
        day_key: String,
        week_key: String,
        day_used: u64,
        week_used: u64,
    ) -> QuotaCounters {
        QuotaCounters {
            day_used: day_used.min(u64::from(u32::MAX)) as u32,
            day_limit: self.day_limit,
            week_used: week_used.min(u64::from(u32::MAX)) as u32,
            week_limit: self.week_limit,
            day_key: day_key.trim_start_matches("day:").to_string(),
            week_key: week_key.trim_start_matches("week:").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn store(day: u32, week: u32) -> (tempfile::TempDir, QuotaStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = QuotaStore::open(dir.path().join("quota.redb"), day, week).unwrap();
        (dir, store)
    }

    #[test]
    fn keys_follow_local_calendar_formats() {
        assert_eq!(day_key(date(2026, 3, 9)), "day:2026-03-09");
        assert_eq!(week_key(date(2026, 3, 9)), "week:2026-W11");
        // ISO week years differ from calendar years at the boundary.
        assert_eq!(week_key(date(2026, 1, 1)), "week:2026-W01");
        assert_eq!(week_key(date(2027, 1, 1)), "week:2026-W53");
    }

    #[test]
    fn consume_increments_both_scopes() {
        let (_dir, store) = store(2, 10);
        let today = date(2026, 3, 9);

        let first = store.try_consume_on(today).unwrap();
        assert!(first.allowed);
        assert_eq!(first.counters.day_used, 1);
        assert_eq!(first.counters.week_used, 1);

        let snap = store.snapshot_on(today).unwrap();
        assert_eq!(snap.day_used, 1);
        assert_eq!(snap.day_key, "2026-03-09");
    }

    #[test]
    fn day_limit_blocks_without_touching_counters() {
        let (_dir, store) = store(1, 10);
        let today = date(2026, 3, 9);

        assert!(store.try_consume_on(today).unwrap().allowed);
        let blocked = store.try_consume_on(today).unwrap();
        assert!(!blocked.allowed);
        assert_eq!(blocked.blocked_by, Some("day"));
        assert_eq!(blocked.counters.day_used, 1);
        assert_eq!(store.snapshot_on(today).unwrap().week_used, 1);
    }

    #[test]
    fn week_limit_blocks_across_days() {
        let (_dir, store) = store(10, 2);
        // Monday and Tuesday of the same ISO week.
        assert!(store.try_consume_on(date(2026, 3, 9)).unwrap().allowed);
        assert!(store.try_consume_on(date(2026, 3, 10)).unwrap().allowed);

        let blocked = store.try_consume_on(date(2026, 3, 11)).unwrap();
        assert!(!blocked.allowed);
        assert_eq!(blocked.blocked_by, Some("week"));
        // Day counter for Wednesday is fresh but the week is spent.
        assert_eq!(blocked.counters.day_used, 0);
        assert_eq!(blocked.counters.week_used, 2);
    }

    #[test]
    fn day_rollover_resets_day_scope_only() {
        let (_dir, store) = store(1, 10);
        assert!(store.try_consume_on(date(2026, 3, 9)).unwrap().allowed);
        assert!(!store.try_consume_on(date(2026, 3, 9)).unwrap().allowed);

        let next_day = store.try_consume_on(date(2026, 3, 10)).unwrap();
        assert!(next_day.allowed);
        assert_eq!(next_day.counters.day_used, 1);
        assert_eq!(next_day.counters.week_used, 2);
    }

    #[test]
    fn week_rollover_resets_week_scope() {
        let (_dir, store) = store(10, 1);
        assert!(store.try_consume_on(date(2026, 3, 13)).unwrap().allowed);
        assert!(!store.try_consume_on(date(2026, 3, 14)).unwrap().allowed);
        // Next Monday starts a new ISO week.
        assert!(store.try_consume_on(date(2026, 3, 16)).unwrap().allowed);
    }

    #[test]
    fn release_returns_a_reservation() {
        let (_dir, store) = store(1, 1);
        let today = date(2026, 3, 9);

        assert!(store.try_consume_on(today).unwrap().allowed);
        assert!(!store.try_consume_on(today).unwrap().allowed);

        store.release_on(today).unwrap();
        let snap = store.snapshot_on(today).unwrap();
        assert_eq!(snap.day_used, 0);
        assert_eq!(snap.week_used, 0);
        assert!(store.try_consume_on(today).unwrap().allowed);
    }

    #[test]
    fn release_on_empty_counters_floors_at_zero() {
        let (_dir, store) = store(5, 5);
        let today = date(2026, 3, 9);
        store.release_on(today).unwrap();
        assert_eq!(store.snapshot_on(today).unwrap().day_used, 0);
    }

    #[test]
    fn counters_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quota.redb");
        let today = date(2026, 3, 9);
        {
            let store = QuotaStore::open(&path, 5, 20).unwrap();
            store.try_consume_on(today).unwrap();
        }
        let store = QuotaStore::open(&path, 5, 20).unwrap();
        assert_eq!(store.snapshot_on(today).unwrap().day_used, 1);
    }
}
