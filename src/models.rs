//! Typed records for the Sama Wi-Fi ledger.
//!
//! The legacy web client stored these as loose JSON objects in browser
//! storage; the field names here (camelCase, `phoneType`, `addedBy`, ...)
//! are kept wire-compatible so existing local databases and cloud documents
//! load unchanged. Identifiers are canonical strings end-to-end — legacy
//! records carry `Date.now()` numbers, which the deserializer tolerates.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Last identifier issued by this process (epoch milliseconds).
static LAST_RECORD_ID: AtomicI64 = AtomicI64::new(0);

/// Issue a new record identifier.
///
/// Timestamp-derived like the legacy client's `Date.now()`, but guaranteed
/// strictly monotonic in-process so two records created in the same
/// millisecond never collide.
pub fn next_record_id() -> String {
    let now_ms = Utc::now().timestamp_millis();
    let mut prev = LAST_RECORD_ID.load(Ordering::Relaxed);
    loop {
        let candidate = now_ms.max(prev + 1);
        match LAST_RECORD_ID.compare_exchange_weak(
            prev,
            candidate,
            Ordering::SeqCst,
            Ordering::Relaxed,
        ) {
            Ok(_) => return candidate.to_string(),
            Err(actual) => prev = actual,
        }
    }
}

/// Accept both `"1712345"` and `1712345` for identifier fields.
fn flexible_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Session duration sold to a walk-in client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurationCode {
    #[serde(rename = "1hour")]
    OneHour,
    #[serde(rename = "2hours")]
    TwoHours,
    #[serde(rename = "daily")]
    Daily,
    #[serde(rename = "weekly")]
    Weekly,
    #[serde(rename = "monthly")]
    Monthly,
    #[serde(rename = "custom")]
    Custom,
}

/// Payment state of a client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    Borrowed,
}

/// Prepaid voucher tier. Each tier has a finite stock counter and a fixed
/// catalog price in SSP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoucherType {
    #[serde(rename = "1hr")]
    OneHour,
    #[serde(rename = "2hr")]
    TwoHours,
    #[serde(rename = "day")]
    Day,
    #[serde(rename = "week")]
    Week,
    #[serde(rename = "month")]
    Month,
}

impl VoucherType {
    pub const ALL: [VoucherType; 5] = [
        VoucherType::OneHour,
        VoucherType::TwoHours,
        VoucherType::Day,
        VoucherType::Week,
        VoucherType::Month,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VoucherType::OneHour => "1hr",
            VoucherType::TwoHours => "2hr",
            VoucherType::Day => "day",
            VoucherType::Week => "week",
            VoucherType::Month => "month",
        }
    }

    /// Human label used on receipts and printed reports.
    pub fn label(&self) -> &'static str {
        match self {
            VoucherType::OneHour => "1 Hour",
            VoucherType::TwoHours => "2 Hour",
            VoucherType::Day => "Full Day",
            VoucherType::Week => "Weekly",
            VoucherType::Month => "Monthly",
        }
    }

    /// Fixed catalog price (SSP).
    pub fn catalog_price(&self) -> i64 {
        match self {
            VoucherType::OneHour => 500,
            VoucherType::TwoHours => 800,
            VoucherType::Day => 1_500,
            VoucherType::Week => 7_000,
            VoucherType::Month => 20_000,
        }
    }

    pub fn parse(raw: &str) -> Option<VoucherType> {
        VoucherType::ALL
            .into_iter()
            .find(|t| t.as_str() == raw.trim())
    }
}

/// Cash expense category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseCategory {
    Lunch,
    Tea,
    Maintenance,
    Transport,
    Salary,
    Other,
}

/// Which ledger collection a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Client,
    Voucher,
    Expense,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Client => "client",
            RecordKind::Voucher => "voucher",
            RecordKind::Expense => "expense",
        }
    }

    pub fn parse(raw: &str) -> Option<RecordKind> {
        match raw.trim() {
            "client" => Some(RecordKind::Client),
            "voucher" => Some(RecordKind::Voucher),
            "expense" => Some(RecordKind::Expense),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger records
// ---------------------------------------------------------------------------

/// A walk-in client session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSession {
    #[serde(deserialize_with = "flexible_id")]
    pub id: String,
    pub name: String,
    pub phone_type: String,
    pub duration: DurationCode,
    pub amount: i64,
    pub status: PaymentStatus,
    #[serde(default)]
    pub notes: String,
    /// RFC3339 creation instant.
    pub date: String,
    pub added_by: String,
}

/// Placeholder buyer name for anonymous cash voucher sales.
pub const CASH_SALE_CLIENT: &str = "Voucher Sale";

/// A prepaid voucher sale. The credential pair is what the buyer types into
/// the hotspot portal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherSale {
    #[serde(deserialize_with = "flexible_id")]
    pub id: String,
    pub voucher_type: VoucherType,
    pub amount: i64,
    pub username: String,
    pub password: String,
    #[serde(default = "default_cash_sale_client")]
    pub client_name: String,
    pub date: String,
    pub added_by: String,
}

fn default_cash_sale_client() -> String {
    CASH_SALE_CLIENT.to_string()
}

/// A cash expense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    #[serde(deserialize_with = "flexible_id")]
    pub id: String,
    pub category: ExpenseCategory,
    pub reason: String,
    pub amount: i64,
    #[serde(default)]
    pub person_name: String,
    pub date: String,
    pub added_by: String,
}

/// Tagged snapshot of any ledger record. Stored in the undo buffer and used
/// for the combined transaction feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LedgerRecord {
    Client(ClientSession),
    Voucher(VoucherSale),
    Expense(Expense),
}

impl LedgerRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            LedgerRecord::Client(_) => RecordKind::Client,
            LedgerRecord::Voucher(_) => RecordKind::Voucher,
            LedgerRecord::Expense(_) => RecordKind::Expense,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            LedgerRecord::Client(c) => &c.id,
            LedgerRecord::Voucher(v) => &v.id,
            LedgerRecord::Expense(e) => &e.id,
        }
    }

    pub fn date(&self) -> &str {
        match self {
            LedgerRecord::Client(c) => &c.date,
            LedgerRecord::Voucher(v) => &v.date,
            LedgerRecord::Expense(e) => &e.date,
        }
    }

    pub fn amount(&self) -> i64 {
        match self {
            LedgerRecord::Client(c) => c.amount,
            LedgerRecord::Voucher(v) => v.amount,
            LedgerRecord::Expense(e) => e.amount,
        }
    }
}

// ---------------------------------------------------------------------------
// Voucher stock
// ---------------------------------------------------------------------------

/// Per-tier voucher stock counters.
///
/// Counts are signed: undoing a voucher deletion re-applies the sale's −1
/// after the tier may have been restocked, which can legally leave a tier
/// negative until the next restock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherStock {
    #[serde(rename = "1hr", default)]
    pub one_hour: i64,
    #[serde(rename = "2hr", default)]
    pub two_hours: i64,
    #[serde(default)]
    pub day: i64,
    #[serde(default)]
    pub week: i64,
    #[serde(default)]
    pub month: i64,
}

impl VoucherStock {
    pub fn get(&self, tier: VoucherType) -> i64 {
        match tier {
            VoucherType::OneHour => self.one_hour,
            VoucherType::TwoHours => self.two_hours,
            VoucherType::Day => self.day,
            VoucherType::Week => self.week,
            VoucherType::Month => self.month,
        }
    }

    pub fn get_mut(&mut self, tier: VoucherType) -> &mut i64 {
        match tier {
            VoucherType::OneHour => &mut self.one_hour,
            VoucherType::TwoHours => &mut self.two_hours,
            VoucherType::Day => &mut self.day,
            VoucherType::Week => &mut self.week,
            VoucherType::Month => &mut self.month,
        }
    }

    pub fn total(&self) -> i64 {
        VoucherType::ALL.into_iter().map(|t| self.get(t)).sum()
    }
}

// ---------------------------------------------------------------------------
// Daily reports
// ---------------------------------------------------------------------------

/// Aggregated financials for one business day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
    /// Client sessions + voucher sales for the day.
    pub total_clients: i64,
    /// Paid client amounts + all voucher amounts.
    pub revenue: i64,
    pub expenses: i64,
    pub net_profit: i64,
}

impl DailySummary {
    /// A day with no sessions, no sales, and no expenses.
    pub fn is_empty(&self) -> bool {
        self.total_clients == 0 && self.revenue == 0 && self.expenses == 0
    }
}

/// Archived snapshot of one business day, keyed by `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyReport {
    pub date: String,
    pub saved_by: String,
    pub summary: DailySummary,
}

// ---------------------------------------------------------------------------
// Edit patches
// ---------------------------------------------------------------------------

fn patch_str(patch: &Value, key: &str) -> Option<String> {
    patch.get(key).and_then(Value::as_str).map(str::to_string)
}

fn patch_amount(patch: &Value, key: &str) -> Result<Option<i64>, String> {
    match patch.get(key) {
        None => Ok(None),
        Some(v) => match v.as_i64() {
            Some(n) if n >= 0 => Ok(Some(n)),
            _ => Err(format!("Invalid amount in patch: {v}")),
        },
    }
}

fn patch_enum<T: serde::de::DeserializeOwned>(
    patch: &Value,
    key: &str,
) -> Result<Option<T>, String> {
    match patch.get(key) {
        None => Ok(None),
        Some(v) => serde_json::from_value::<T>(v.clone())
            .map(Some)
            .map_err(|_| format!("Invalid {key} in patch: {v}")),
    }
}

impl ClientSession {
    /// Apply an edit patch. Absent fields are untouched; the creation date
    /// only changes when the patch carries an explicit `date`.
    pub fn apply_patch(&mut self, patch: &Value) -> Result<(), String> {
        if let Some(duration) = patch_enum::<DurationCode>(patch, "duration")? {
            self.duration = duration;
        }
        if let Some(status) = patch_enum::<PaymentStatus>(patch, "status")? {
            self.status = status;
        }
        if let Some(amount) = patch_amount(patch, "amount")? {
            self.amount = amount;
        }
        if let Some(name) = patch_str(patch, "name") {
            self.name = name;
        }
        if let Some(phone_type) = patch_str(patch, "phoneType") {
            self.phone_type = phone_type;
        }
        if let Some(notes) = patch_str(patch, "notes") {
            self.notes = notes;
        }
        if let Some(date) = patch_str(patch, "date") {
            self.date = date;
        }
        Ok(())
    }
}

impl VoucherSale {
    /// Apply an edit patch. Changing the tier does not touch stock — stock
    /// moves only on sale, restock, delete-undo, and add-undo.
    pub fn apply_patch(&mut self, patch: &Value) -> Result<(), String> {
        if let Some(tier) = patch_enum::<VoucherType>(patch, "voucherType")? {
            self.voucher_type = tier;
        }
        if let Some(amount) = patch_amount(patch, "amount")? {
            self.amount = amount;
        }
        if let Some(client_name) = patch_str(patch, "clientName") {
            self.client_name = client_name;
        }
        if let Some(username) = patch_str(patch, "username") {
            self.username = username;
        }
        if let Some(password) = patch_str(patch, "password") {
            self.password = password;
        }
        if let Some(date) = patch_str(patch, "date") {
            self.date = date;
        }
        Ok(())
    }
}

impl Expense {
    pub fn apply_patch(&mut self, patch: &Value) -> Result<(), String> {
        if let Some(category) = patch_enum::<ExpenseCategory>(patch, "category")? {
            self.category = category;
        }
        if let Some(amount) = patch_amount(patch, "amount")? {
            self.amount = amount;
        }
        if let Some(reason) = patch_str(patch, "reason") {
            self.reason = reason;
        }
        if let Some(person_name) = patch_str(patch, "personName") {
            self.person_name = person_name;
        }
        if let Some(date) = patch_str(patch, "date") {
            self.date = date;
        }
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
