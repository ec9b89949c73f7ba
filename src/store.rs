//! Persistent store for Sama Wi-Fi POS.
//!
//! Owns every durable record: the three ledger collections, voucher stock,
//! archived daily reports, and scalar settings (employee name, credentials,
//! cloud config, the archival day marker). Collections are held in memory in
//! an [`AppState`] loaded once at bootstrap and written back as whole JSON
//! documents on every mutation — the same documents the legacy web client
//! kept in localStorage, so existing databases and cloud copies load
//! unchanged.
//!
//! Cloud mirroring is an optional injected collaborator: after a successful
//! local write the caller may queue a whole-state push, which runs on a
//! spawned task and never blocks or fails a local operation.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cloud::CloudMirror;
use crate::db::{self, DbState};
use crate::models::{ClientSession, DailyReport, Expense, VoucherSale, VoucherStock};
use crate::clock;

// Document keys under the `state` settings category.
const KEY_CLIENTS: &str = "clients";
const KEY_VOUCHERS: &str = "vouchers";
const KEY_STOCK: &str = "voucher_stock";
const KEY_EXPENSES: &str = "expenses";
const KEY_REPORTS: &str = "daily_reports";

/// Default recorder name until the operator sets one.
pub const DEFAULT_EMPLOYEE: &str = "Admin";

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// The process-wide working copy of every ledger collection.
///
/// Invariant: `clients`, `vouchers`, and `expenses` are ordered newest-first.
/// All mutation goes through the ledger under a single lock; the store only
/// serializes what it is given.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AppState {
    pub clients: Vec<ClientSession>,
    pub vouchers: Vec<VoucherSale>,
    pub expenses: Vec<Expense>,
    pub voucher_stock: VoucherStock,
    pub daily_reports: Vec<DailyReport>,
}

impl AppState {
    pub fn report_for(&self, date_key: &str) -> Option<&DailyReport> {
        self.daily_reports.iter().find(|r| r.date == date_key)
    }

    /// Full state document pushed to the cloud mirror. Field names match the
    /// legacy `syncAllToCloud` payload.
    pub fn cloud_document(&self, employee_name: &str) -> Value {
        serde_json::json!({
            "clients": self.clients,
            "vouchers": self.vouchers,
            "voucherStock": self.voucher_stock,
            "expenses": self.expenses,
            "reports": self.daily_reports,
            "employeeName": employee_name,
            "lastUpdated": clock::now_rfc3339(),
            "updatedBy": employee_name,
        })
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Durable store: SQLite documents locally, plus an optional cloud mirror.
pub struct Store {
    db: DbState,
    mirror: Arc<dyn CloudMirror>,
}

impl Store {
    pub fn new(db: DbState, mirror: Arc<dyn CloudMirror>) -> Self {
        Self { db, mirror }
    }

    pub fn mirror(&self) -> Arc<dyn CloudMirror> {
        self.mirror.clone()
    }

    // -- State documents ----------------------------------------------------

    /// Load the working state from the local database. Absent documents load
    /// as empty collections (first run); a collection that fails to parse is
    /// logged and skipped rather than aborting startup.
    pub fn load_state(&self) -> Result<AppState, String> {
        let conn = self.db.conn.lock().map_err(|e| e.to_string())?;

        let state = AppState {
            clients: load_collection(&conn, KEY_CLIENTS),
            vouchers: load_collection(&conn, KEY_VOUCHERS),
            expenses: load_collection(&conn, KEY_EXPENSES),
            voucher_stock: db::read_document(&conn, KEY_STOCK)
                .and_then(|v| match serde_json::from_value(v) {
                    Ok(stock) => Some(stock),
                    Err(e) => {
                        warn!(error = %e, "voucher stock document failed to parse");
                        None
                    }
                })
                .unwrap_or_default(),
            daily_reports: load_collection(&conn, KEY_REPORTS),
        };

        info!(
            clients = state.clients.len(),
            vouchers = state.vouchers.len(),
            expenses = state.expenses.len(),
            reports = state.daily_reports.len(),
            "State loaded"
        );
        Ok(state)
    }

    /// Write every state document in one transaction.
    ///
    /// A failed write leaves the database untouched; callers treat the error
    /// as fatal to the operation and roll back their in-memory change.
    pub fn persist_state(&self, state: &AppState) -> Result<(), String> {
        let conn = self.db.conn.lock().map_err(|e| e.to_string())?;

        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| format!("begin transaction: {e}"))?;

        let result = (|| -> Result<(), String> {
            db::write_document(&conn, KEY_CLIENTS, &to_value(&state.clients)?)?;
            db::write_document(&conn, KEY_VOUCHERS, &to_value(&state.vouchers)?)?;
            db::write_document(&conn, KEY_STOCK, &to_value(&state.voucher_stock)?)?;
            db::write_document(&conn, KEY_EXPENSES, &to_value(&state.expenses)?)?;
            db::write_document(&conn, KEY_REPORTS, &to_value(&state.daily_reports)?)?;
            Ok(())
        })();

        match result {
            Ok(()) => conn
                .execute_batch("COMMIT")
                .map_err(|e| format!("commit: {e}")),
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    // -- Cloud mirroring ----------------------------------------------------

    /// Queue a best-effort push of the full state document to the cloud
    /// mirror. Never blocks and never fails the calling operation: outside
    /// an async runtime (or with the mirror disabled) this is a no-op.
    pub fn queue_push(store: &Arc<Store>, doc: Value) {
        if !store.cloud_enabled() {
            return;
        }
        let store = store.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    match store.mirror.push(&doc).await {
                        Ok(()) => {
                            store.note_push_success();
                            debug!("cloud push complete");
                        }
                        Err(e) => warn!(error = %e, "cloud push failed (will retry on next save)"),
                    }
                });
            }
            Err(_) => debug!("no async runtime; skipping cloud push"),
        }
    }

    fn note_push_success(&self) {
        if let Ok(conn) = self.db.conn.lock() {
            let now = clock::now_rfc3339();
            for key in [KEY_CLIENTS, KEY_VOUCHERS, KEY_STOCK, KEY_EXPENSES, KEY_REPORTS] {
                db::mark_synced(&conn, "state", key, &now);
            }
        }
    }

    /// Apply a pulled cloud document over local state (last writer wins,
    /// field-presence granularity like the legacy `loadFromCloud`), then
    /// persist. Returns `true` when anything changed.
    pub fn apply_cloud_document(&self, state: &mut AppState, doc: &Value) -> Result<bool, String> {
        let mut incoming = state.clone();

        if let Some(clients) = doc.get("clients") {
            incoming.clients = from_value_or_keep(clients, &state.clients, "clients");
        }
        if let Some(vouchers) = doc.get("vouchers") {
            incoming.vouchers = from_value_or_keep(vouchers, &state.vouchers, "vouchers");
        }
        if let Some(stock) = doc.get("voucherStock") {
            incoming.voucher_stock =
                from_value_or_keep(stock, &state.voucher_stock, "voucherStock");
        }
        if let Some(expenses) = doc.get("expenses") {
            incoming.expenses = from_value_or_keep(expenses, &state.expenses, "expenses");
        }
        if let Some(reports) = doc.get("reports") {
            incoming.daily_reports = from_value_or_keep(reports, &state.daily_reports, "reports");
        }

        if let Some(name) = doc.get("employeeName").and_then(Value::as_str) {
            self.set_employee_name(name)?;
        }

        if incoming == *state {
            return Ok(false);
        }

        self.persist_state(&incoming)?;
        *state = incoming;
        info!("Cloud document applied over local state");
        Ok(true)
    }

    // -- Scalar settings ----------------------------------------------------

    pub fn employee_name(&self) -> String {
        self.get_setting("system", "employee_name")
            .unwrap_or_else(|| DEFAULT_EMPLOYEE.to_string())
    }

    pub fn set_employee_name(&self, name: &str) -> Result<(), String> {
        self.set_setting("system", "employee_name", name.trim())
    }

    /// The archival marker: the last business day the engine has fully
    /// processed. `None` before the very first run.
    pub fn last_business_day(&self) -> Option<String> {
        self.get_setting("system", "last_business_day")
            .filter(|v| !v.trim().is_empty())
    }

    pub fn set_last_business_day(&self, date_key: &str) -> Result<(), String> {
        self.set_setting("system", "last_business_day", date_key)
    }

    pub fn cloud_enabled(&self) -> bool {
        self.get_setting("cloud", "enabled").as_deref() == Some("true")
    }

    pub fn set_cloud_enabled(&self, enabled: bool) -> Result<(), String> {
        self.set_setting("cloud", "enabled", if enabled { "true" } else { "false" })
    }

    /// System credentials and recovery material, category `auth`.
    pub fn get_credential(&self, key: &str) -> Option<String> {
        self.get_setting("auth", key)
    }

    pub fn set_credential(&self, key: &str, value: &str) -> Result<(), String> {
        self.set_setting("auth", key, value)
    }

    fn get_setting(&self, category: &str, key: &str) -> Option<String> {
        let conn = self.db.conn.lock().ok()?;
        db::get_setting(&conn, category, key)
    }

    fn set_setting(&self, category: &str, key: &str, value: &str) -> Result<(), String> {
        let conn = self.db.conn.lock().map_err(|e| e.to_string())?;
        db::set_setting(&conn, category, key, value)
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| format!("serialize state: {e}"))
}

fn load_collection<T: DeserializeOwned>(conn: &rusqlite::Connection, key: &str) -> Vec<T> {
    match db::read_document(conn, key) {
        None => Vec::new(),
        Some(doc) => match serde_json::from_value(doc) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(key, error = %e, "state document failed to parse, starting empty");
                Vec::new()
            }
        },
    }
}

fn from_value_or_keep<T: DeserializeOwned + Clone>(raw: &Value, keep: &T, field: &str) -> T {
    match serde_json::from_value(raw.clone()) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(field, error = %e, "cloud field failed to parse, keeping local copy");
            keep.clone()
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
