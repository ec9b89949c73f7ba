//! Daily archival engine for Sama Wi-Fi POS.
//!
//! Produces exactly one [`DailyReport`] per business day: on explicit
//! operator request, automatically when the business day rolls over, and as
//! catch-up for days that ended while the app was not running.
//!
//! De-duplication hangs off a single persisted marker — the last business
//! day the engine has fully processed. The minute poll and the startup
//! catch-up both walk the same marker, so neither can archive a day the
//! other already handled. The marker only advances past a day once that
//! day's (possibly skipped) save attempt has completed; a crash mid-catch-up
//! resumes from the first unprocessed day on the next start.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::clock;
use crate::models::{DailyReport, DailySummary, PaymentStatus};
use crate::store::{AppState, Store};

/// How often the rollover poll runs. The check is cheap; the interval only
/// bounds how late after midnight the automatic archive lands.
pub const ROLLOVER_POLL_SECS: u64 = 60;

/// How a report save was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Rollover or catch-up. Skips empty days, overwrites silently.
    Automatic,
    /// Operator-initiated. Overwriting an existing report needs an explicit
    /// confirmation from the operator.
    Manual { confirmed: bool },
}

/// Outcome of a save request.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved(DailyReport),
    /// Automatic save on a day with no activity — deliberately not archived.
    SkippedEmpty,
    /// A report for this day already exists; the operator must confirm the
    /// overwrite.
    NeedsConfirmation,
}

// ---------------------------------------------------------------------------
// Summary computation
// ---------------------------------------------------------------------------

/// Aggregate one business day from the ledger collections.
///
/// Membership is decided by [`clock::date_key`] of each record's creation
/// instant — never by a raw UTC date prefix. Revenue counts paid client
/// sessions plus every voucher sale; unpaid and borrowed sessions are
/// tracked but not yet money in the drawer.
pub fn compute_summary(state: &AppState, date_key: &str) -> DailySummary {
    if date_key.trim().is_empty() {
        // An empty key never matches anything, even records whose own
        // timestamps fail to parse.
        return DailySummary::default();
    }

    let clients: Vec<_> = state
        .clients
        .iter()
        .filter(|c| clock::date_key(&c.date) == date_key)
        .collect();
    let vouchers: Vec<_> = state
        .vouchers
        .iter()
        .filter(|v| clock::date_key(&v.date) == date_key)
        .collect();

    let client_revenue: i64 = clients
        .iter()
        .filter(|c| c.status == PaymentStatus::Paid)
        .map(|c| c.amount)
        .sum();
    let voucher_revenue: i64 = vouchers.iter().map(|v| v.amount).sum();

    let expenses: i64 = state
        .expenses
        .iter()
        .filter(|e| clock::date_key(&e.date) == date_key)
        .map(|e| e.amount)
        .sum();

    let revenue = client_revenue + voucher_revenue;
    DailySummary {
        total_clients: (clients.len() + vouchers.len()) as i64,
        revenue,
        expenses,
        net_profit: revenue - expenses,
    }
}

// ---------------------------------------------------------------------------
// Report persistence
// ---------------------------------------------------------------------------

/// Compute and persist the report for one business day.
///
/// At most one report exists per date key: saving again replaces it, never
/// duplicates. Automatic saves skip days with zero activity so quiet days
/// leave no noise entries.
pub fn save_report(
    state: &mut AppState,
    store: &Arc<Store>,
    date_key: &str,
    recorder: &str,
    mode: SaveMode,
) -> Result<SaveOutcome, String> {
    let summary = compute_summary(state, date_key);

    if mode == SaveMode::Automatic && summary.is_empty() {
        debug!(date = date_key, "no activity, skipping automatic archive");
        return Ok(SaveOutcome::SkippedEmpty);
    }

    let existing = state
        .daily_reports
        .iter()
        .position(|r| r.date == date_key);

    if existing.is_some() {
        if let SaveMode::Manual { confirmed: false } = mode {
            return Ok(SaveOutcome::NeedsConfirmation);
        }
    }

    let report = DailyReport {
        date: date_key.to_string(),
        saved_by: recorder.to_string(),
        summary,
    };

    let previous = match existing {
        Some(idx) => Some(std::mem::replace(&mut state.daily_reports[idx], report.clone())),
        None => {
            state.daily_reports.push(report.clone());
            None
        }
    };

    if let Err(e) = store.persist_state(state) {
        // Roll the collection back so memory and disk stay in step.
        match (existing, previous) {
            (Some(idx), Some(old)) => state.daily_reports[idx] = old,
            _ => {
                state.daily_reports.pop();
            }
        }
        return Err(e);
    }
    Store::queue_push(store, state.cloud_document(recorder));

    info!(
        date = date_key,
        revenue = report.summary.revenue,
        net_profit = report.summary.net_profit,
        automatic = mode == SaveMode::Automatic,
        "daily report archived"
    );
    Ok(SaveOutcome::Saved(report))
}

// ---------------------------------------------------------------------------
// Rollover & catch-up
// ---------------------------------------------------------------------------

/// Advance the archival marker to `today_key`, archiving every business day
/// that ended since the marker was last moved.
///
/// Covers both triggers with one mechanism: the minute poll (marker is
/// usually yesterday, one day to archive) and startup catch-up (marker may
/// be many days back; each missed day is attempted in chronological order).
/// On the first run ever the marker is initialized to today and nothing is
/// archived.
///
/// Returns the number of days whose save attempt completed. Errors abort
/// the walk *without* advancing the marker past the failed day, so the next
/// check retries it.
pub fn run_rollover_check(
    state: &mut AppState,
    store: &Arc<Store>,
    today_key: &str,
) -> Result<usize, String> {
    let Some(marker) = store.last_business_day() else {
        store.set_last_business_day(today_key)?;
        info!(today = today_key, "first run, archival marker initialized");
        return Ok(0);
    };

    if marker == today_key {
        return Ok(0);
    }

    let pending = clock::day_keys_range(&marker, today_key);
    if pending.is_empty() {
        // Marker is ahead of today (device clock moved backwards) or
        // malformed. Re-anchor on today rather than archiving garbage.
        warn!(
            marker = %marker,
            today = today_key,
            "archival marker is not behind today, re-anchoring"
        );
        store.set_last_business_day(today_key)?;
        return Ok(0);
    }

    info!(
        from = %marker,
        to = today_key,
        days = pending.len(),
        "business day rolled over, archiving"
    );

    let recorder = store.employee_name();
    let mut processed = 0;
    for day in &pending {
        save_report(state, store, day, &recorder, SaveMode::Automatic)?;
        processed += 1;

        // Only move past a day once its save attempt has completed.
        let next = clock::next_day_key(day).unwrap_or_else(|| today_key.to_string());
        store.set_last_business_day(&next)?;
    }

    store.set_last_business_day(today_key)?;
    Ok(processed)
}

/// Start the recurring rollover poll.
///
/// The poll is suspension-safe: it never assumes a tick per minute, it only
/// compares today's key against the marker, so a laptop waking from a
/// week-long sleep catches up on the first tick. Failures are logged and
/// retried on the next tick — automatic archival never takes the process
/// down.
pub fn start_rollover_loop(
    state: Arc<Mutex<AppState>>,
    store: Arc<Store>,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!("Rollover loop started (interval: {interval_secs}s)");
        loop {
            tokio::time::sleep(Duration::from_secs(interval_secs)).await;

            let today = clock::today_key();
            let Ok(mut guard) = state.lock() else {
                warn!("state lock poisoned; skipping rollover check");
                continue;
            };
            if let Err(e) = run_rollover_check(&mut guard, &store, &today) {
                error!(error = %e, "rollover check failed, will retry next tick");
            }
        }
    })
}

// ===========================================================================
// Tests
// ===========================================================================
