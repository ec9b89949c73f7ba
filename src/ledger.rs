//! Transaction ledger for Sama Wi-Fi POS.
//!
//! All mutation of the three collections (client sessions, voucher sales,
//! expenses) and the voucher stock goes through here. Every operation runs
//! against the in-memory [`AppState`] under the caller's lock, writes
//! through to the store, and rolls the in-memory change back if the local
//! write fails — the database and the working copy never diverge. There is
//! no suspension point between a stock delta and its collection delta, so a
//! reader can never observe one without the other.
//!
//! Adds and deletes arm the undo buffer; edits do not.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::clock;
use crate::models::{
    next_record_id, ClientSession, DurationCode, Expense, ExpenseCategory, LedgerRecord,
    PaymentStatus, RecordKind, VoucherSale, VoucherType, CASH_SALE_CLIENT,
};
use crate::store::{AppState, Store};
use crate::undo::{UndoAction, UndoBuffer};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Ledger failure taxonomy. Validation and not-found failures leave state
/// untouched and are retryable; a persistence failure aborts the operation
/// after the in-memory change has been rolled back.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Out of stock for {tier} vouchers. Restock this type in Settings.")]
    OutOfStock { tier: &'static str },
    #[error("Record not found: {id}")]
    NotFound { id: String },
    #[error("{0}")]
    Validation(String),
    #[error("Save failed: {0}")]
    Persistence(String),
}

fn validation(msg: impl Into<String>) -> LedgerError {
    LedgerError::Validation(msg.into())
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Form input for a new client session.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClient {
    pub name: String,
    pub phone_type: String,
    pub duration: DurationCode,
    pub amount: i64,
    pub status: PaymentStatus,
    #[serde(default)]
    pub notes: String,
}

/// Form input for a voucher sale. `amount` defaults to the tier's catalog
/// price when the operator leaves it blank.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVoucher {
    pub voucher_type: VoucherType,
    #[serde(default)]
    pub amount: Option<i64>,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub client_name: Option<String>,
}

/// Form input for a cash expense.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExpense {
    pub category: ExpenseCategory,
    pub reason: String,
    pub amount: i64,
    #[serde(default)]
    pub person_name: String,
}

// ---------------------------------------------------------------------------
// Persistence helper
// ---------------------------------------------------------------------------

/// Write the mutated state through to the store; on failure run `rollback`
/// against the in-memory copy and surface a persistence error. On success
/// a best-effort cloud push is queued.
fn persist_or_rollback(
    state: &mut AppState,
    store: &Arc<Store>,
    rollback: impl FnOnce(&mut AppState),
) -> Result<(), LedgerError> {
    match store.persist_state(state) {
        Ok(()) => {
            Store::queue_push(store, state.cloud_document(&store.employee_name()));
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "local write failed, rolling back in-memory change");
            rollback(state);
            Err(LedgerError::Persistence(e))
        }
    }
}

// ---------------------------------------------------------------------------
// Adds
// ---------------------------------------------------------------------------

/// Record a new client session at the head of the collection.
pub fn add_client(
    state: &mut AppState,
    store: &Arc<Store>,
    undo: &mut UndoBuffer,
    input: NewClient,
) -> Result<ClientSession, LedgerError> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(validation("Client name is required"));
    }
    if input.amount < 0 {
        return Err(validation("Amount cannot be negative"));
    }

    let session = ClientSession {
        id: next_record_id(),
        name: name.to_string(),
        phone_type: input.phone_type.trim().to_string(),
        duration: input.duration,
        amount: input.amount,
        status: input.status,
        notes: input.notes,
        date: clock::now_rfc3339(),
        added_by: store.employee_name(),
    };

    state.clients.insert(0, session.clone());
    persist_or_rollback(state, store, |s| {
        s.clients.remove(0);
    })?;

    undo.arm(UndoAction::Added(LedgerRecord::Client(session.clone())));
    info!(id = %session.id, name = %session.name, "client session added");
    Ok(session)
}

/// Sell a voucher: one unit of stock and the sale record move together.
///
/// Returns the sale and the remaining stock for the tier so the operator
/// sees how many are left.
pub fn add_voucher(
    state: &mut AppState,
    store: &Arc<Store>,
    undo: &mut UndoBuffer,
    input: NewVoucher,
) -> Result<(VoucherSale, i64), LedgerError> {
    let tier = input.voucher_type;
    let amount = input.amount.unwrap_or_else(|| tier.catalog_price());
    if amount <= 0 {
        return Err(validation("Voucher amount must be a positive whole number"));
    }
    let username = input.username.trim();
    let password = input.password.trim();
    if username.is_empty() || password.is_empty() {
        return Err(validation("Voucher credentials are required"));
    }

    if state.voucher_stock.get(tier) <= 0 {
        return Err(LedgerError::OutOfStock {
            tier: tier.as_str(),
        });
    }

    let sale = VoucherSale {
        id: next_record_id(),
        voucher_type: tier,
        amount,
        username: username.to_string(),
        password: password.to_string(),
        client_name: input
            .client_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| CASH_SALE_CLIENT.to_string()),
        date: clock::now_rfc3339(),
        added_by: store.employee_name(),
    };

    // Stock delta and collection delta together, no suspension point.
    *state.voucher_stock.get_mut(tier) -= 1;
    state.vouchers.insert(0, sale.clone());

    persist_or_rollback(state, store, |s| {
        s.vouchers.remove(0);
        *s.voucher_stock.get_mut(tier) += 1;
    })?;

    let remaining = state.voucher_stock.get(tier);
    undo.arm(UndoAction::Added(LedgerRecord::Voucher(sale.clone())));
    info!(id = %sale.id, tier = tier.as_str(), remaining, "voucher sold");
    Ok((sale, remaining))
}

/// Record a cash expense.
pub fn add_expense(
    state: &mut AppState,
    store: &Arc<Store>,
    undo: &mut UndoBuffer,
    input: NewExpense,
) -> Result<Expense, LedgerError> {
    let reason = input.reason.trim();
    if reason.is_empty() {
        return Err(validation("Expense description is required"));
    }
    if input.amount < 0 {
        return Err(validation("Amount cannot be negative"));
    }

    let expense = Expense {
        id: next_record_id(),
        category: input.category,
        reason: reason.to_string(),
        amount: input.amount,
        person_name: input.person_name.trim().to_string(),
        date: clock::now_rfc3339(),
        added_by: store.employee_name(),
    };

    state.expenses.insert(0, expense.clone());
    persist_or_rollback(state, store, |s| {
        s.expenses.remove(0);
    })?;

    undo.arm(UndoAction::Added(LedgerRecord::Expense(expense.clone())));
    info!(id = %expense.id, category = ?expense.category, "expense recorded");
    Ok(expense)
}

/// Add `count` units of stock to a tier. Not undoable — restocks are not
/// ledger records.
pub fn restock_voucher(
    state: &mut AppState,
    store: &Arc<Store>,
    tier: VoucherType,
    count: i64,
) -> Result<i64, LedgerError> {
    if count <= 0 {
        return Err(validation("Restock count must be a positive whole number"));
    }

    *state.voucher_stock.get_mut(tier) += count;
    persist_or_rollback(state, store, |s| {
        *s.voucher_stock.get_mut(tier) -= count;
    })?;

    let total = state.voucher_stock.get(tier);
    info!(tier = tier.as_str(), count, total, "voucher stock replenished");
    Ok(total)
}

// ---------------------------------------------------------------------------
// Edit / delete
// ---------------------------------------------------------------------------

fn find_client(state: &AppState, id: &str) -> Option<usize> {
    state.clients.iter().position(|c| c.id == id.trim())
}

fn find_voucher(state: &AppState, id: &str) -> Option<usize> {
    state.vouchers.iter().position(|v| v.id == id.trim())
}

fn find_expense(state: &AppState, id: &str) -> Option<usize> {
    state.expenses.iter().position(|e| e.id == id.trim())
}

/// Patch a record in place. Absent patch fields are untouched and the
/// identifier never changes. A missing identifier is an error, never a
/// silent no-op. Edits do not arm the undo buffer.
pub fn edit_record(
    state: &mut AppState,
    store: &Arc<Store>,
    id: &str,
    kind: RecordKind,
    patch: &Value,
) -> Result<(), LedgerError> {
    match kind {
        RecordKind::Client => {
            let idx = find_client(state, id).ok_or_else(|| LedgerError::NotFound {
                id: id.to_string(),
            })?;
            let before = state.clients[idx].clone();
            state.clients[idx]
                .apply_patch(patch)
                .map_err(LedgerError::Validation)?;
            persist_or_rollback(state, store, move |s| {
                s.clients[idx] = before;
            })?;
        }
        RecordKind::Voucher => {
            let idx = find_voucher(state, id).ok_or_else(|| LedgerError::NotFound {
                id: id.to_string(),
            })?;
            let before = state.vouchers[idx].clone();
            state.vouchers[idx]
                .apply_patch(patch)
                .map_err(LedgerError::Validation)?;
            persist_or_rollback(state, store, move |s| {
                s.vouchers[idx] = before;
            })?;
        }
        RecordKind::Expense => {
            let idx = find_expense(state, id).ok_or_else(|| LedgerError::NotFound {
                id: id.to_string(),
            })?;
            let before = state.expenses[idx].clone();
            state.expenses[idx]
                .apply_patch(patch)
                .map_err(LedgerError::Validation)?;
            persist_or_rollback(state, store, move |s| {
                s.expenses[idx] = before;
            })?;
        }
    }

    info!(id, kind = kind.as_str(), "record updated");
    Ok(())
}

/// Remove a record. Deleting a voucher sale restores its unit of stock in
/// the same step. The removed record lands in the undo buffer.
pub fn delete_record(
    state: &mut AppState,
    store: &Arc<Store>,
    undo: &mut UndoBuffer,
    id: &str,
    kind: RecordKind,
) -> Result<LedgerRecord, LedgerError> {
    let removed = match kind {
        RecordKind::Client => {
            let idx = find_client(state, id).ok_or_else(|| LedgerError::NotFound {
                id: id.to_string(),
            })?;
            let record = state.clients.remove(idx);
            persist_or_rollback(state, store, {
                let record = record.clone();
                move |s| s.clients.insert(idx, record)
            })?;
            LedgerRecord::Client(record)
        }
        RecordKind::Voucher => {
            let idx = find_voucher(state, id).ok_or_else(|| LedgerError::NotFound {
                id: id.to_string(),
            })?;
            let record = state.vouchers.remove(idx);
            let tier = record.voucher_type;
            // Removing the sale puts its unit back on the shelf.
            *state.voucher_stock.get_mut(tier) += 1;
            persist_or_rollback(state, store, {
                let record = record.clone();
                move |s| {
                    *s.voucher_stock.get_mut(tier) -= 1;
                    s.vouchers.insert(idx, record);
                }
            })?;
            LedgerRecord::Voucher(record)
        }
        RecordKind::Expense => {
            let idx = find_expense(state, id).ok_or_else(|| LedgerError::NotFound {
                id: id.to_string(),
            })?;
            let record = state.expenses.remove(idx);
            persist_or_rollback(state, store, {
                let record = record.clone();
                move |s| s.expenses.insert(idx, record)
            })?;
            LedgerRecord::Expense(record)
        }
    };

    undo.arm(UndoAction::Deleted(removed.clone()));
    info!(id, kind = kind.as_str(), "record deleted");
    Ok(removed)
}

// ---------------------------------------------------------------------------
// Undo
// ---------------------------------------------------------------------------

/// Reverse the most recent add or delete, if one is still pending.
///
/// Undoing an add removes the record by full equality — not just by id — so
/// an identical-looking record added later is never the one removed.
/// Undoing a delete re-inserts the snapshot at the head of its collection
/// and re-applies a voucher sale's stock effect, which can legally leave a
/// tier negative after an interim restock.
///
/// Returns the kind that was reversed, or `None` when the buffer was idle
/// (or the window had elapsed).
pub fn undo(
    state: &mut AppState,
    store: &Arc<Store>,
    undo: &mut UndoBuffer,
) -> Result<Option<RecordKind>, LedgerError> {
    let Some(action) = undo.take() else {
        return Ok(None);
    };

    match action {
        UndoAction::Added(record) => match record {
            LedgerRecord::Client(session) => {
                let Some(idx) = state.clients.iter().position(|c| *c == session) else {
                    warn!(id = %session.id, "undo target no longer present, nothing to do");
                    return Ok(None);
                };
                state.clients.remove(idx);
                persist_or_rollback(state, store, move |s| {
                    s.clients.insert(idx, session);
                })?;
                info!("undid client add");
                Ok(Some(RecordKind::Client))
            }
            LedgerRecord::Voucher(sale) => {
                let Some(idx) = state.vouchers.iter().position(|v| *v == sale) else {
                    warn!(id = %sale.id, "undo target no longer present, nothing to do");
                    return Ok(None);
                };
                let tier = sale.voucher_type;
                state.vouchers.remove(idx);
                *state.voucher_stock.get_mut(tier) += 1;
                persist_or_rollback(state, store, move |s| {
                    *s.voucher_stock.get_mut(tier) -= 1;
                    s.vouchers.insert(idx, sale);
                })?;
                info!("undid voucher sale");
                Ok(Some(RecordKind::Voucher))
            }
            LedgerRecord::Expense(expense) => {
                let Some(idx) = state.expenses.iter().position(|e| *e == expense) else {
                    warn!(id = %expense.id, "undo target no longer present, nothing to do");
                    return Ok(None);
                };
                state.expenses.remove(idx);
                persist_or_rollback(state, store, move |s| {
                    s.expenses.insert(idx, expense);
                })?;
                info!("undid expense add");
                Ok(Some(RecordKind::Expense))
            }
        },
        UndoAction::Deleted(record) => {
            let kind = record.kind();
            match record {
                LedgerRecord::Client(session) => {
                    state.clients.insert(0, session);
                    persist_or_rollback(state, store, |s| {
                        s.clients.remove(0);
                    })?;
                }
                LedgerRecord::Voucher(sale) => {
                    let tier = sale.voucher_type;
                    state.vouchers.insert(0, sale);
                    // The restored sale takes its unit back off the shelf.
                    *state.voucher_stock.get_mut(tier) -= 1;
                    persist_or_rollback(state, store, move |s| {
                        *s.voucher_stock.get_mut(tier) += 1;
                        s.vouchers.remove(0);
                    })?;
                }
                LedgerRecord::Expense(expense) => {
                    state.expenses.insert(0, expense);
                    persist_or_rollback(state, store, |s| {
                        s.expenses.remove(0);
                    })?;
                }
            }
            info!(kind = kind.as_str(), "undid delete");
            Ok(Some(kind))
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::NoopMirror;
    use crate::db;

    fn setup() -> (AppState, Arc<Store>, UndoBuffer) {
        let store = Arc::new(Store::new(
            db::init_in_memory().expect("in-memory db"),
            Arc::new(NoopMirror),
        ));
        (AppState::default(), store, UndoBuffer::new())
    }

    fn client_input(name: &str, amount: i64, status: PaymentStatus) -> NewClient {
        NewClient {
            name: name.into(),
            phone_type: "Android".into(),
            duration: DurationCode::OneHour,
            amount,
            status,
            notes: String::new(),
        }
    }

    fn voucher_input(tier: VoucherType) -> NewVoucher {
        NewVoucher {
            voucher_type: tier,
            amount: None,
            username: "wifi-101".into(),
            password: "p4ss".into(),
            client_name: None,
        }
    }

    #[test]
    fn consecutive_sales_drain_stock_then_fail() {
        let (mut state, store, mut undo_buf) = setup();
        let initial = 3;
        *state.voucher_stock.get_mut(VoucherType::Day) = initial;

        for k in 1..=initial {
            let (_, remaining) =
                add_voucher(&mut state, &store, &mut undo_buf, voucher_input(VoucherType::Day))
                    .expect("sale within stock");
            assert_eq!(remaining, initial - k);
        }

        let err = add_voucher(&mut state, &store, &mut undo_buf, voucher_input(VoucherType::Day))
            .expect_err("sale past stock");
        assert!(matches!(err, LedgerError::OutOfStock { tier: "day" }));
        assert_eq!(state.voucher_stock.get(VoucherType::Day), 0);
        assert_eq!(state.vouchers.len(), initial as usize);
    }

    #[test]
    fn sale_uses_catalog_price_by_default() {
        let (mut state, store, mut undo_buf) = setup();
        *state.voucher_stock.get_mut(VoucherType::Week) = 1;

        let (sale, _) =
            add_voucher(&mut state, &store, &mut undo_buf, voucher_input(VoucherType::Week))
                .expect("sale");
        assert_eq!(sale.amount, VoucherType::Week.catalog_price());
        assert_eq!(sale.client_name, CASH_SALE_CLIENT);
    }

    #[test]
    fn collections_are_newest_first() {
        let (mut state, store, mut undo_buf) = setup();
        add_client(
            &mut state,
            &store,
            &mut undo_buf,
            client_input("First", 500, PaymentStatus::Paid),
        )
        .expect("first");
        add_client(
            &mut state,
            &store,
            &mut undo_buf,
            client_input("Second", 500, PaymentStatus::Paid),
        )
        .expect("second");

        assert_eq!(state.clients[0].name, "Second");
        assert_eq!(state.clients[1].name, "First");
    }

    #[test]
    fn undo_after_add_client_removes_exactly_that_client() {
        let (mut state, store, mut undo_buf) = setup();
        add_client(
            &mut state,
            &store,
            &mut undo_buf,
            client_input("Deng", 500, PaymentStatus::Paid),
        )
        .expect("older add");
        let added = add_client(
            &mut state,
            &store,
            &mut undo_buf,
            client_input("Deng", 500, PaymentStatus::Paid),
        )
        .expect("newer add");

        let undone = undo(&mut state, &store, &mut undo_buf).expect("undo runs");
        assert_eq!(undone, Some(RecordKind::Client));
        assert_eq!(state.clients.len(), 1);
        // The identical-looking older record survives; the armed one is gone.
        assert_ne!(state.clients[0].id, added.id);
    }

    #[test]
    fn undo_after_voucher_sale_restores_stock() {
        let (mut state, store, mut undo_buf) = setup();
        *state.voucher_stock.get_mut(VoucherType::OneHour) = 5;

        add_voucher(
            &mut state,
            &store,
            &mut undo_buf,
            voucher_input(VoucherType::OneHour),
        )
        .expect("sale");
        assert_eq!(state.voucher_stock.get(VoucherType::OneHour), 4);

        undo(&mut state, &store, &mut undo_buf).expect("undo runs");
        assert_eq!(state.voucher_stock.get(VoucherType::OneHour), 5);
        assert!(state.vouchers.is_empty());
    }

    #[test]
    fn undo_after_delete_restores_exact_record_at_head() {
        let (mut state, store, mut undo_buf) = setup();
        add_client(
            &mut state,
            &store,
            &mut undo_buf,
            client_input("Achol", 1500, PaymentStatus::Borrowed),
        )
        .expect("add older");
        let target = add_client(
            &mut state,
            &store,
            &mut undo_buf,
            client_input("Deng", 500, PaymentStatus::Paid),
        )
        .expect("add target");

        // Delete the older record (index 1), then undo.
        let older_id = state.clients[1].id.clone();
        let snapshot = state.clients[1].clone();
        delete_record(&mut state, &store, &mut undo_buf, &older_id, RecordKind::Client)
            .expect("delete");
        assert_eq!(state.clients.len(), 1);

        let undone = undo(&mut state, &store, &mut undo_buf).expect("undo runs");
        assert_eq!(undone, Some(RecordKind::Client));
        // Byte-identical snapshot, re-inserted at the head.
        assert_eq!(state.clients[0], snapshot);
        assert_eq!(state.clients[1].id, target.id);
    }

    #[test]
    fn deleting_a_voucher_restores_stock_and_undo_reapplies_it() {
        let (mut state, store, mut undo_buf) = setup();
        *state.voucher_stock.get_mut(VoucherType::Day) = 1;

        let (sale, remaining) = add_voucher(
            &mut state,
            &store,
            &mut undo_buf,
            voucher_input(VoucherType::Day),
        )
        .expect("sale");
        assert_eq!(remaining, 0);

        delete_record(&mut state, &store, &mut undo_buf, &sale.id, RecordKind::Voucher)
            .expect("delete");
        assert_eq!(state.voucher_stock.get(VoucherType::Day), 1);

        // Restock in the interim, then undo the delete: the sale comes back
        // and the −1 re-applies on top of the new count.
        restock_voucher(&mut state, &store, VoucherType::Day, 5).expect("restock");
        undo(&mut state, &store, &mut undo_buf).expect("undo runs");
        assert_eq!(state.voucher_stock.get(VoucherType::Day), 5);
        assert_eq!(state.vouchers[0], sale);
    }

    #[test]
    fn undo_on_idle_buffer_is_a_noop() {
        let (mut state, store, mut undo_buf) = setup();
        let undone = undo(&mut state, &store, &mut undo_buf).expect("undo runs");
        assert_eq!(undone, None);
    }

    #[test]
    fn edits_do_not_arm_the_undo_buffer() {
        let (mut state, store, mut undo_buf) = setup();
        let added = add_client(
            &mut state,
            &store,
            &mut undo_buf,
            client_input("Deng", 500, PaymentStatus::Unpaid),
        )
        .expect("add");
        undo_buf.clear();

        edit_record(
            &mut state,
            &store,
            &added.id,
            RecordKind::Client,
            &serde_json::json!({ "status": "paid" }),
        )
        .expect("edit");

        assert_eq!(state.clients[0].status, PaymentStatus::Paid);
        assert!(!undo_buf.is_armed(), "edit must not be undoable");
    }

    #[test]
    fn edit_of_missing_id_is_not_found() {
        let (mut state, store, _) = setup();
        let err = edit_record(
            &mut state,
            &store,
            "999",
            RecordKind::Client,
            &serde_json::json!({ "name": "ghost" }),
        )
        .expect_err("missing id");
        assert!(matches!(err, LedgerError::NotFound { .. }));
    }

    #[test]
    fn edit_preserves_id_and_creation_date() {
        let (mut state, store, mut undo_buf) = setup();
        let added = add_client(
            &mut state,
            &store,
            &mut undo_buf,
            client_input("Deng", 500, PaymentStatus::Paid),
        )
        .expect("add");

        edit_record(
            &mut state,
            &store,
            &added.id,
            RecordKind::Client,
            &serde_json::json!({ "name": "Deng Majok", "amount": 800 }),
        )
        .expect("edit");

        assert_eq!(state.clients[0].id, added.id);
        assert_eq!(state.clients[0].date, added.date);
        assert_eq!(state.clients[0].name, "Deng Majok");
    }

    #[test]
    fn delete_of_missing_id_is_not_found() {
        let (mut state, store, mut undo_buf) = setup();
        let err = delete_record(&mut state, &store, &mut undo_buf, "999", RecordKind::Expense)
            .expect_err("missing id");
        assert!(matches!(err, LedgerError::NotFound { .. }));
        assert!(!undo_buf.is_armed());
    }

    #[test]
    fn out_of_stock_sale_leaves_no_trace() {
        let (mut state, store, mut undo_buf) = setup();
        let err = add_voucher(
            &mut state,
            &store,
            &mut undo_buf,
            voucher_input(VoucherType::Month),
        )
        .expect_err("no stock");
        assert!(matches!(err, LedgerError::OutOfStock { .. }));
        assert!(state.vouchers.is_empty());
        assert!(!undo_buf.is_armed());

        // Nothing was persisted either.
        let reloaded = store.load_state().expect("reload");
        assert!(reloaded.vouchers.is_empty());
    }

    #[test]
    fn restock_rejects_non_positive_counts() {
        let (mut state, store, _) = setup();
        assert!(restock_voucher(&mut state, &store, VoucherType::Day, 0).is_err());
        assert!(restock_voucher(&mut state, &store, VoucherType::Day, -4).is_err());
        assert_eq!(
            restock_voucher(&mut state, &store, VoucherType::Day, 10).expect("restock"),
            10
        );
    }

    #[test]
    fn mutations_write_through_to_the_store() {
        let (mut state, store, mut undo_buf) = setup();
        *state.voucher_stock.get_mut(VoucherType::TwoHours) = 2;
        add_voucher(
            &mut state,
            &store,
            &mut undo_buf,
            voucher_input(VoucherType::TwoHours),
        )
        .expect("sale");

        let reloaded = store.load_state().expect("reload");
        assert_eq!(reloaded.vouchers.len(), 1);
        assert_eq!(reloaded.voucher_stock.get(VoucherType::TwoHours), 1);
    }
}
