//! Sama Wi-Fi POS - backend core
//!
//! Offline-first point-of-sale and bookkeeping engine for a small Wi-Fi
//! voucher shop: client sessions, voucher sales against finite stock, cash
//! expenses, one archived report per business day, a single-slot undo
//! buffer, and optional best-effort cloud mirroring. A UI shell embeds
//! [`App`] and calls its methods from interaction handlers; two background
//! loops (minute rollover poll, periodic cloud pull) cover everything that
//! has to happen without the operator touching anything.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod archive;
pub mod auth;
pub mod clock;
pub mod cloud;
pub mod db;
pub mod ledger;
pub mod models;
pub mod report;
pub mod store;
pub mod undo;

use archive::{SaveMode, SaveOutcome};
use ledger::{NewClient, NewExpense, NewVoucher};
use models::{ClientSession, DailySummary, Expense, RecordKind, VoucherSale, VoucherType};
use store::{AppState, Store};
use undo::UndoBuffer;

/// Seconds between cloud pull cycles.
const MIRROR_PULL_SECS: u64 = 300;

/// Initialize structured logging (console + daily rolling file).
///
/// Call once from the embedding shell before [`App::bootstrap`].
pub fn init_logging(log_dir: &Path) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sama_pos=debug"));

    std::fs::create_dir_all(log_dir).ok();
    let file_appender = tracing_appender::rolling::daily(log_dir, "sama-pos");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    // Keep the guard alive for the lifetime of the app — dropping it flushes
    // logs. We leak it intentionally since the app runs until process exit.
    std::mem::forget(_guard);
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

/// The running application: loaded state, durable store, undo buffer, and
/// the auth gate. One instance per process; a UI shell keeps it in managed
/// state and calls the operation methods below.
pub struct App {
    state: Arc<Mutex<AppState>>,
    store: Arc<Store>,
    undo: Mutex<UndoBuffer>,
    auth: auth::AuthState,
}

impl App {
    /// Open the database under `data_dir`, load state, seed credentials,
    /// and run the startup catch-up for any business days that ended while
    /// the app was not running.
    pub fn bootstrap(data_dir: &Path) -> Result<App> {
        let db_state = db::init(data_dir).map_err(|e| anyhow!(e))?;
        Self::bootstrap_with_db(db_state)
    }

    /// Bootstrap against an in-memory database (ephemeral runs and tests).
    pub fn bootstrap_in_memory() -> Result<App> {
        let db_state = db::init_in_memory().map_err(|e| anyhow!(e))?;
        Self::bootstrap_with_db(db_state)
    }

    fn bootstrap_with_db(db_state: db::DbState) -> Result<App> {
        info!(
            "Starting Sama POS v{} (built {})",
            env!("CARGO_PKG_VERSION"),
            env!("BUILD_TIMESTAMP"),
        );

        // The mirror is chosen from persisted settings before the store is
        // built: an HTTP mirror when sync is enabled and configured, the
        // no-op mirror otherwise.
        let mirror = build_mirror(&db_state);
        let store = Arc::new(Store::new(db_state, mirror));

        auth::ensure_defaults(&store).map_err(|e| anyhow!(e))?;

        let mut state = store.load_state().map_err(|e| anyhow!(e))?;

        // Startup catch-up: archive days missed while the app was off.
        // Failures are logged, never fatal — the minute poll retries.
        let today = clock::today_key();
        if let Err(e) = archive::run_rollover_check(&mut state, &store, &today) {
            warn!(error = %e, "startup catch-up failed, will retry on poll");
        }

        Ok(App {
            state: Arc::new(Mutex::new(state)),
            store,
            undo: Mutex::new(UndoBuffer::new()),
            auth: auth::AuthState::new(),
        })
    }

    /// Start the rollover poll and the cloud pull loop. Requires a running
    /// tokio runtime.
    pub fn start_background_tasks(&self) -> Vec<tokio::task::JoinHandle<()>> {
        vec![
            archive::start_rollover_loop(
                self.state.clone(),
                self.store.clone(),
                archive::ROLLOVER_POLL_SECS,
            ),
            cloud::start_mirror_loop(self.state.clone(), self.store.clone(), MIRROR_PULL_SECS),
        ]
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, AppState>, String> {
        self.state.lock().map_err(|e| e.to_string())
    }

    fn lock_undo(&self) -> Result<std::sync::MutexGuard<'_, UndoBuffer>, String> {
        self.undo.lock().map_err(|e| e.to_string())
    }

    // -- Ledger -------------------------------------------------------------

    pub fn add_client(&self, input: NewClient) -> Result<ClientSession, String> {
        let mut state = self.lock_state()?;
        let mut undo_buf = self.lock_undo()?;
        ledger::add_client(&mut state, &self.store, &mut undo_buf, input).map_err(|e| e.to_string())
    }

    /// Sell a voucher. Returns the sale and the tier's remaining stock.
    pub fn sell_voucher(&self, input: NewVoucher) -> Result<(VoucherSale, i64), String> {
        let mut state = self.lock_state()?;
        let mut undo_buf = self.lock_undo()?;
        ledger::add_voucher(&mut state, &self.store, &mut undo_buf, input)
            .map_err(|e| e.to_string())
    }

    pub fn record_expense(&self, input: NewExpense) -> Result<Expense, String> {
        let mut state = self.lock_state()?;
        let mut undo_buf = self.lock_undo()?;
        ledger::add_expense(&mut state, &self.store, &mut undo_buf, input)
            .map_err(|e| e.to_string())
    }

    pub fn restock_voucher(&self, tier: VoucherType, count: i64) -> Result<i64, String> {
        let mut state = self.lock_state()?;
        ledger::restock_voucher(&mut state, &self.store, tier, count).map_err(|e| e.to_string())
    }

    pub fn edit_record(&self, id: &str, kind: RecordKind, patch: &Value) -> Result<(), String> {
        let mut state = self.lock_state()?;
        ledger::edit_record(&mut state, &self.store, id, kind, patch).map_err(|e| e.to_string())
    }

    pub fn delete_record(&self, id: &str, kind: RecordKind) -> Result<(), String> {
        let mut state = self.lock_state()?;
        let mut undo_buf = self.lock_undo()?;
        ledger::delete_record(&mut state, &self.store, &mut undo_buf, id, kind)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    /// Reverse the most recent add or delete, if still inside the undo
    /// window. Returns the kind reversed, or `None` when there was nothing
    /// pending.
    pub fn undo_last(&self) -> Result<Option<RecordKind>, String> {
        let mut state = self.lock_state()?;
        let mut undo_buf = self.lock_undo()?;
        ledger::undo(&mut state, &self.store, &mut undo_buf).map_err(|e| e.to_string())
    }

    // -- Archival -----------------------------------------------------------

    /// Today's running totals for the dashboard header.
    pub fn today_summary(&self) -> Result<DailySummary, String> {
        let state = self.lock_state()?;
        Ok(archive::compute_summary(&state, &clock::today_key()))
    }

    /// Archive today on operator request. Pass `confirmed: true` after the
    /// operator approves replacing an existing report.
    pub fn save_daily_report(&self, confirmed: bool) -> Result<SaveOutcome, String> {
        let mut state = self.lock_state()?;
        let recorder = self.store.employee_name();
        archive::save_report(
            &mut state,
            &self.store,
            &clock::today_key(),
            &recorder,
            SaveMode::Manual { confirmed },
        )
    }

    // -- Reports & export ---------------------------------------------------

    pub fn transactions_for_date(&self, date_key: &str, search: &str) -> Result<Vec<Value>, String> {
        let state = self.lock_state()?;
        Ok(report::transactions_for_date(&state, date_key, search))
    }

    pub fn period_summary(&self, period: report::Period) -> Result<report::PeriodSummary, String> {
        let state = self.lock_state()?;
        Ok(report::period_summary(&state, period))
    }

    pub fn report_series(&self, days: usize) -> Result<Value, String> {
        let state = self.lock_state()?;
        Ok(report::report_series(&state, days))
    }

    pub fn daily_report_html(&self, date_key: &str) -> Result<String, String> {
        let state = self.lock_state()?;
        let found = state.report_for(date_key).cloned();
        match found {
            Some(archived) => Ok(report::render_daily_report_html(&state, &archived)),
            None => Err(format!("Report not found: {date_key}")),
        }
    }

    pub fn period_report_html(&self, period: report::Period) -> Result<String, String> {
        let state = self.lock_state()?;
        Ok(report::render_period_report_html(&state, period))
    }

    pub fn export_csv(&self) -> Result<String, String> {
        let state = self.lock_state()?;
        Ok(report::export_csv(&state))
    }

    pub fn backup_document(&self) -> Result<Value, String> {
        let state = self.lock_state()?;
        Ok(report::backup_document(&state, &self.store.employee_name()))
    }

    pub fn stock_overview(&self) -> Result<Value, String> {
        let state = self.lock_state()?;
        Ok(report::stock_overview(&state))
    }

    // -- Auth & settings ----------------------------------------------------

    pub fn login(&self, username: &str, password: &str) -> Result<Value, String> {
        auth::login(&self.store, &self.auth, username, password)
    }

    pub fn logout(&self) {
        auth::logout(&self.auth);
    }

    pub fn current_session(&self) -> Option<Value> {
        auth::current_session(&self.auth)
    }

    pub fn update_security(
        &self,
        new_username: &str,
        current_password: &str,
        new_password: Option<&str>,
    ) -> Result<(), String> {
        auth::update_security(&self.store, new_username, current_password, new_password)
    }

    pub fn recover_password(&self, recovery_key: &str, new_password: &str) -> Result<(), String> {
        auth::recover_password(&self.store, recovery_key, new_password)
    }

    pub fn recovery_key(&self) -> Option<String> {
        auth::recovery_key(&self.store)
    }

    pub fn employee_name(&self) -> String {
        self.store.employee_name()
    }

    pub fn set_employee_name(&self, name: &str) -> Result<(), String> {
        self.store.set_employee_name(name)
    }

    pub fn cloud_enabled(&self) -> bool {
        self.store.cloud_enabled()
    }

    pub fn set_cloud_enabled(&self, enabled: bool) -> Result<(), String> {
        self.store.set_cloud_enabled(enabled)
    }
}

/// Pick the mirror implementation from persisted cloud settings.
fn build_mirror(db_state: &db::DbState) -> Arc<dyn cloud::CloudMirror> {
    let (enabled, endpoint, api_key) = match db_state.conn.lock() {
        Ok(conn) => (
            db::get_setting(&conn, "cloud", "enabled").as_deref() == Some("true"),
            db::get_setting(&conn, "cloud", "endpoint").unwrap_or_default(),
            db::get_setting(&conn, "cloud", "api_key").unwrap_or_default(),
        ),
        Err(_) => (false, String::new(), String::new()),
    };

    if !enabled {
        return Arc::new(cloud::NoopMirror);
    }

    match cloud::HttpMirror::new(&endpoint, &api_key) {
        Ok(mirror) => {
            info!("Cloud sync active");
            Arc::new(mirror)
        }
        Err(e) => {
            warn!(error = %e, "cloud sync enabled but misconfigured, running local-only");
            Arc::new(cloud::NoopMirror)
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use models::{DurationCode, PaymentStatus};

    fn test_app() -> App {
        App::bootstrap_in_memory().expect("bootstrap")
    }

    fn client_input(name: &str) -> NewClient {
        NewClient {
            name: name.into(),
            phone_type: "Android".into(),
            duration: DurationCode::OneHour,
            amount: 500,
            status: PaymentStatus::Paid,
            notes: String::new(),
        }
    }

    #[test]
    fn bootstrap_initializes_the_archival_marker() {
        let app = test_app();
        // First run: marker set to today, nothing archived.
        assert_eq!(
            app.store.last_business_day().as_deref(),
            Some(clock::today_key().as_str())
        );
        let state = app.lock_state().expect("state");
        assert!(state.daily_reports.is_empty());
    }

    #[test]
    fn full_sale_day_flow() {
        let app = test_app();

        app.restock_voucher(VoucherType::Day, 2).expect("restock");
        app.add_client(client_input("Deng")).expect("client");
        let (_, remaining) = app
            .sell_voucher(NewVoucher {
                voucher_type: VoucherType::Day,
                amount: Some(1500),
                username: "wifi-1".into(),
                password: "p4ss".into(),
                client_name: None,
            })
            .expect("sale");
        assert_eq!(remaining, 1);

        app.record_expense(NewExpense {
            category: models::ExpenseCategory::Lunch,
            reason: "staff lunch".into(),
            amount: 300,
            person_name: String::new(),
        })
        .expect("expense");

        let summary = app.today_summary().expect("summary");
        assert_eq!(summary.revenue, 2000);
        assert_eq!(summary.expenses, 300);
        assert_eq!(summary.net_profit, 1700);
        assert_eq!(summary.total_clients, 2);

        // Archive today, then render the printable document.
        let outcome = app.save_daily_report(false).expect("archive");
        assert!(matches!(outcome, SaveOutcome::Saved(_)));
        let html = app
            .daily_report_html(&clock::today_key())
            .expect("printable report");
        assert!(html.contains("DAILY ARCHIVE SUMMARY"));

        // Undo the most recent mutation (the expense).
        let undone = app.undo_last().expect("undo");
        assert_eq!(undone, Some(RecordKind::Expense));
        assert_eq!(app.today_summary().expect("summary").expenses, 0);
    }

    #[test]
    fn csv_export_covers_the_ledger() {
        let app = test_app();
        app.add_client(client_input("Achol")).expect("client");
        let csv = app.export_csv().expect("csv");
        assert!(csv.contains("Achol"));
    }

    #[test]
    fn cloud_toggle_round_trips() {
        let app = test_app();
        assert!(!app.cloud_enabled());
        app.set_cloud_enabled(true).expect("toggle");
        assert!(app.cloud_enabled());
    }

    #[tokio::test]
    async fn background_tasks_spawn_inside_a_runtime() {
        let app = test_app();
        let handles = app.start_background_tasks();
        assert_eq!(handles.len(), 2);
        for handle in handles {
            handle.abort();
        }
    }
}
