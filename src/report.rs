//! Report and print-document formatter.
//!
//! Pure projections over read-only state snapshots: the combined
//! transaction feed, period performance summaries, chart series, printable
//! HTML documents, CSV export, and the full JSON backup. Nothing in here
//! mutates state or touches the store.

use serde::Serialize;
use serde_json::Value;

use crate::clock;
use crate::models::{DailyReport, PaymentStatus, VoucherType};
use crate::store::AppState;

// ---------------------------------------------------------------------------
// Transaction feed
// ---------------------------------------------------------------------------

/// Combined client/voucher/expense feed for one business day, newest-first.
///
/// `search` filters case-insensitively across names, expense reasons,
/// voucher tier/username, and notes — the same fields the history screen
/// searches.
pub fn transactions_for_date(state: &AppState, date_key: &str, search: &str) -> Vec<Value> {
    let needle = search.trim().to_lowercase();

    let mut combined: Vec<Value> = Vec::new();

    for c in state
        .clients
        .iter()
        .filter(|c| clock::date_key(&c.date) == date_key)
    {
        let haystack = format!("{} {}", c.name, c.notes).to_lowercase();
        if needle.is_empty() || haystack.contains(&needle) {
            if let Ok(v) = serde_json::to_value(c) {
                combined.push(with_type_tag(v, "client"));
            }
        }
    }
    for s in state
        .vouchers
        .iter()
        .filter(|v| clock::date_key(&v.date) == date_key)
    {
        let haystack = format!(
            "{} {} {}",
            s.client_name,
            s.voucher_type.as_str(),
            s.username
        )
        .to_lowercase();
        if needle.is_empty() || haystack.contains(&needle) {
            if let Ok(v) = serde_json::to_value(s) {
                combined.push(with_type_tag(v, "voucher"));
            }
        }
    }
    for e in state
        .expenses
        .iter()
        .filter(|e| clock::date_key(&e.date) == date_key)
    {
        let haystack = format!("{:?} {}", e.category, e.reason).to_lowercase();
        if needle.is_empty() || haystack.contains(&needle) {
            if let Ok(v) = serde_json::to_value(e) {
                combined.push(with_type_tag(v, "expense"));
            }
        }
    }

    // Newest first across the three collections.
    combined.sort_by(|a, b| {
        let date_a = a.get("date").and_then(Value::as_str).unwrap_or("");
        let date_b = b.get("date").and_then(Value::as_str).unwrap_or("");
        date_b.cmp(date_a)
    });
    combined
}

fn with_type_tag(mut value: Value, tag: &str) -> Value {
    if let Some(obj) = value.as_object_mut() {
        obj.insert("type".to_string(), Value::String(tag.to_string()));
    }
    value
}

// ---------------------------------------------------------------------------
// Period summaries
// ---------------------------------------------------------------------------

/// Reporting window for the performance audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Today,
    Weekly,
    Monthly,
}

impl Period {
    pub fn label(&self) -> &'static str {
        match self {
            Period::Today => "DAILY",
            Period::Weekly => "WEEKLY",
            Period::Monthly => "MONTHLY",
        }
    }

    /// Inclusive start of the window, in the business timezone.
    fn start(&self) -> chrono::DateTime<chrono::FixedOffset> {
        let now = clock::now();
        match self {
            Period::Today => now
                .with_time(chrono::NaiveTime::MIN)
                .single()
                .unwrap_or(now),
            Period::Weekly => now - chrono::Duration::days(7),
            Period::Monthly => now - chrono::Duration::days(30),
        }
    }
}

/// Aggregated figures for a reporting window.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSummary {
    pub period: String,
    pub from: String,
    pub to: String,
    pub sessions: i64,
    pub voucher_sales: i64,
    pub remaining_stock: i64,
    pub revenue: i64,
    pub expenses: i64,
    pub net_profit: i64,
    pub borrowed: i64,
    pub unpaid: i64,
}

/// Aggregate everything from the window's start until now.
pub fn period_summary(state: &AppState, period: Period) -> PeriodSummary {
    let start = period.start();
    let in_window = |date: &str| {
        chrono::DateTime::parse_from_rfc3339(date)
            .map(|d| d >= start)
            .unwrap_or(false)
    };

    let clients: Vec<_> = state.clients.iter().filter(|c| in_window(&c.date)).collect();
    let vouchers: Vec<_> = state.vouchers.iter().filter(|v| in_window(&v.date)).collect();

    let revenue: i64 = clients
        .iter()
        .filter(|c| c.status == PaymentStatus::Paid)
        .map(|c| c.amount)
        .sum::<i64>()
        + vouchers.iter().map(|v| v.amount).sum::<i64>();
    let expenses: i64 = state
        .expenses
        .iter()
        .filter(|e| in_window(&e.date))
        .map(|e| e.amount)
        .sum();

    PeriodSummary {
        period: period.label().to_string(),
        from: start.to_rfc3339(),
        to: clock::now_rfc3339(),
        sessions: clients.len() as i64,
        voucher_sales: vouchers.len() as i64,
        remaining_stock: state.voucher_stock.total(),
        revenue,
        expenses,
        net_profit: revenue - expenses,
        borrowed: clients
            .iter()
            .filter(|c| c.status == PaymentStatus::Borrowed)
            .count() as i64,
        unpaid: clients
            .iter()
            .filter(|c| c.status == PaymentStatus::Unpaid)
            .count() as i64,
    }
}

/// Chart series over the last `n` archived reports, oldest first.
pub fn report_series(state: &AppState, n: usize) -> Value {
    let mut sorted: Vec<&DailyReport> = state.daily_reports.iter().collect();
    sorted.sort_by(|a, b| a.date.cmp(&b.date));
    let tail = sorted.len().saturating_sub(n);
    let window = &sorted[tail..];

    serde_json::json!({
        "labels": window.iter().map(|r| r.date.clone()).collect::<Vec<_>>(),
        "revenue": window.iter().map(|r| r.summary.revenue).collect::<Vec<_>>(),
        "expenses": window.iter().map(|r| r.summary.expenses).collect::<Vec<_>>(),
    })
}

// ---------------------------------------------------------------------------
// Printable documents
// ---------------------------------------------------------------------------

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn time_of(date: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(date)
        .map(|d| d.with_timezone(&clock::business_tz()).format("%H:%M").to_string())
        .unwrap_or_else(|_| "--:--".to_string())
}

fn stat_card(label: &str, value: &str) -> String {
    format!(
        "<div class=\"card\"><div class=\"label\">{}</div><div class=\"value\">{}</div></div>",
        escape_html(label),
        escape_html(value)
    )
}

const DOC_STYLE: &str = r#"
  body { margin: 0; padding: 24px; background: #fff; color: #0f172a; font-family: sans-serif; font-size: 13px; }
  h1 { margin: 0 0 2px 0; font-size: 22px; }
  h2 { margin: 28px 0 8px 0; font-size: 14px; border-left: 4px solid #6366f1; padding-left: 8px; }
  .meta { color: #64748b; white-space: pre-line; margin-bottom: 18px; }
  .cards { display: grid; grid-template-columns: repeat(3, 1fr); gap: 10px; }
  .card { border: 1px solid #e2e8f0; border-radius: 8px; padding: 12px; text-align: center; }
  .card .label { color: #64748b; font-size: 10px; text-transform: uppercase; font-weight: 700; }
  .card .value { font-size: 18px; font-weight: 800; margin-top: 4px; }
  table { width: 100%; border-collapse: collapse; }
  th { text-align: left; font-size: 10px; color: #64748b; text-transform: uppercase; padding: 6px; border-bottom: 1px solid #e2e8f0; }
  td { padding: 6px; font-size: 11px; border-bottom: 1px solid #f1f5f9; }
  td.amount, th.amount { text-align: right; font-weight: 700; }
"#;

fn wrap_document(title: &str, subtitle: &str, meta: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8"/>
<title>{title}</title>
<style>{DOC_STYLE}</style>
</head>
<body>
<h1>SAMA WI-FI</h1>
<div class="meta">{subtitle}
{meta}</div>
{body}
</body>
</html>"#,
        title = escape_html(title),
        subtitle = escape_html(subtitle),
        meta = escape_html(meta),
        body = body,
    )
}

/// Render the printable archive document for one daily report.
///
/// The summary figures come from the archived snapshot; the per-record
/// tables are re-read from the ledger so the operator can audit line items.
pub fn render_daily_report_html(state: &AppState, report: &DailyReport) -> String {
    let day = report.date.as_str();
    let clients: Vec<_> = state
        .clients
        .iter()
        .filter(|c| clock::date_key(&c.date) == day)
        .collect();
    let vouchers: Vec<_> = state
        .vouchers
        .iter()
        .filter(|v| clock::date_key(&v.date) == day)
        .collect();
    let expenses: Vec<_> = state
        .expenses
        .iter()
        .filter(|e| clock::date_key(&e.date) == day)
        .collect();

    let borrowed = clients
        .iter()
        .filter(|c| c.status == PaymentStatus::Borrowed)
        .count();
    let unpaid = clients
        .iter()
        .filter(|c| c.status == PaymentStatus::Unpaid)
        .count();

    let mut body = String::from("<div class=\"cards\">");
    body.push_str(&stat_card("Total items", &report.summary.total_clients.to_string()));
    body.push_str(&stat_card("Revenue", &format!("{} SSP", report.summary.revenue)));
    body.push_str(&stat_card("Expenses", &format!("{} SSP", report.summary.expenses)));
    body.push_str(&stat_card("Net profit", &format!("{} SSP", report.summary.net_profit)));
    body.push_str(&stat_card("Borrowed", &borrowed.to_string()));
    body.push_str(&stat_card("Unpaid", &unpaid.to_string()));
    body.push_str("</div>");

    if !clients.is_empty() {
        body.push_str("<h2>CLIENT SESSIONS</h2><table><tr><th>Time</th><th>Name</th><th>Phone</th><th>Status</th><th class=\"amount\">Amount</th></tr>");
        for c in &clients {
            body.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{:?}</td><td class=\"amount\">{}</td></tr>",
                time_of(&c.date),
                escape_html(&c.name),
                escape_html(&c.phone_type),
                c.status,
                c.amount,
            ));
        }
        body.push_str("</table>");
    }

    if !vouchers.is_empty() {
        body.push_str("<h2>VOUCHER SALES</h2><table><tr><th>Time</th><th>Type</th><th>User/Pass</th><th class=\"amount\">Amount</th></tr>");
        for v in &vouchers {
            body.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}/{}</td><td class=\"amount\">{}</td></tr>",
                time_of(&v.date),
                v.voucher_type.label(),
                escape_html(&v.username),
                escape_html(&v.password),
                v.amount,
            ));
        }
        body.push_str("</table>");
    }

    if !expenses.is_empty() {
        body.push_str("<h2>EXPENSES</h2><table><tr><th>Time</th><th>Category</th><th>Reason</th><th class=\"amount\">Amount</th></tr>");
        for e in &expenses {
            body.push_str(&format!(
                "<tr><td>{}</td><td>{:?}</td><td>{}</td><td class=\"amount\">{}</td></tr>",
                time_of(&e.date),
                e.category,
                escape_html(&e.reason),
                e.amount,
            ));
        }
        body.push_str("</table>");
    }

    let meta = format!(
        "Report date: {}\nAuthorized by: {}\nDocument ID: ARCH-{}",
        report.date,
        report.saved_by,
        report.date.replace('-', ""),
    );
    wrap_document(
        &format!("Daily Report - {}", report.date),
        "DAILY ARCHIVE SUMMARY",
        &meta,
        &body,
    )
}

/// Render the printable period performance audit.
pub fn render_period_report_html(state: &AppState, period: Period) -> String {
    let summary = period_summary(state, period);

    let mut body = String::from("<div class=\"cards\">");
    body.push_str(&stat_card("Sessions", &summary.sessions.to_string()));
    body.push_str(&stat_card("Voucher sales", &summary.voucher_sales.to_string()));
    body.push_str(&stat_card("Remaining stock", &summary.remaining_stock.to_string()));
    body.push_str(&stat_card("Revenue", &format!("{} SSP", summary.revenue)));
    body.push_str(&stat_card("Expenses", &format!("{} SSP", summary.expenses)));
    body.push_str(&stat_card("Net profit", &format!("{} SSP", summary.net_profit)));
    body.push_str(&stat_card("Borrowed", &summary.borrowed.to_string()));
    body.push_str(&stat_card("Unpaid", &summary.unpaid.to_string()));
    body.push_str("</div>");

    let meta = format!(
        "Audit period: {} to {}\nDocument ID: AUD-{}",
        &summary.from[..10.min(summary.from.len())],
        &summary.to[..10.min(summary.to.len())],
        clock::today_key().replace('-', ""),
    );
    wrap_document(
        &format!("Business Report - {}", summary.period),
        &format!("{} PERFORMANCE AUDIT", summary.period),
        &meta,
        &body,
    )
}

// ---------------------------------------------------------------------------
// Export & backup
// ---------------------------------------------------------------------------

fn csv_quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Every transaction as CSV, one row per record.
pub fn export_csv(state: &AppState) -> String {
    let mut csv = String::from("Type,Date,Name/Category,Detail,Amount,Status,AddedBy\n");

    for c in &state.clients {
        csv.push_str(&format!(
            "Client,{},{},{},{},{:?},{}\n",
            c.date,
            csv_quote(&c.name),
            csv_quote(&c.phone_type),
            c.amount,
            c.status,
            c.added_by,
        ));
    }
    for v in &state.vouchers {
        csv.push_str(&format!(
            "Voucher,{},{},{},{},Paid,{}\n",
            v.date,
            csv_quote(v.voucher_type.as_str()),
            csv_quote(&v.username),
            v.amount,
            v.added_by,
        ));
    }
    for e in &state.expenses {
        csv.push_str(&format!(
            "Expense,{},{},{},{},Paid,{}\n",
            e.date,
            csv_quote(&format!("{:?}", e.category)),
            csv_quote(&e.reason),
            e.amount,
            e.added_by,
        ));
    }
    csv
}

/// Full portable backup of everything the store owns (minus credentials).
pub fn backup_document(state: &AppState, employee_name: &str) -> Value {
    serde_json::json!({
        "clients": state.clients,
        "vouchers": state.vouchers,
        "voucherStock": state.voucher_stock,
        "expenses": state.expenses,
        "dailyReports": state.daily_reports,
        "employeeName": employee_name,
        "backupDate": clock::now_rfc3339(),
    })
}

/// Total units on the shelf across every tier (settings screen widget).
pub fn stock_overview(state: &AppState) -> Value {
    serde_json::json!({
        "byTier": VoucherType::ALL
            .iter()
            .map(|t| (t.as_str(), state.voucher_stock.get(*t)))
            .collect::<std::collections::BTreeMap<_, _>>(),
        "total": state.voucher_stock.total(),
    })
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ClientSession, DailySummary, DurationCode, Expense, ExpenseCategory, VoucherSale,
    };

    fn client(day: &str, hour: u8, name: &str, status: PaymentStatus) -> ClientSession {
        ClientSession {
            id: crate::models::next_record_id(),
            name: name.into(),
            phone_type: "Android".into(),
            duration: DurationCode::OneHour,
            amount: 500,
            status,
            notes: "window seat".into(),
            date: format!("{day}T{hour:02}:00:00+02:00"),
            added_by: "Admin".into(),
        }
    }

    fn voucher(day: &str, username: &str) -> VoucherSale {
        VoucherSale {
            id: crate::models::next_record_id(),
            voucher_type: VoucherType::Day,
            amount: 1500,
            username: username.into(),
            password: "p4ss".into(),
            client_name: "Voucher Sale".into(),
            date: format!("{day}T10:00:00+02:00"),
            added_by: "Admin".into(),
        }
    }

    fn sample_state() -> AppState {
        let mut state = AppState::default();
        state.clients.push(client("2026-03-14", 9, "Deng", PaymentStatus::Paid));
        state.clients.push(client("2026-03-14", 15, "Achol", PaymentStatus::Borrowed));
        state.clients.push(client("2026-03-13", 11, "Majok", PaymentStatus::Paid));
        state.vouchers.push(voucher("2026-03-14", "wifi-800"));
        state.expenses.push(Expense {
            id: crate::models::next_record_id(),
            category: ExpenseCategory::Transport,
            reason: "fuel run".into(),
            amount: 700,
            person_name: String::new(),
            date: "2026-03-14T17:00:00+02:00".into(),
            added_by: "Admin".into(),
        });
        state
    }

    #[test]
    fn feed_filters_by_day_and_sorts_newest_first() {
        let state = sample_state();
        let feed = transactions_for_date(&state, "2026-03-14", "");
        assert_eq!(feed.len(), 4);
        // 17:00 expense first, 09:00 client last.
        assert_eq!(feed[0].get("type").and_then(Value::as_str), Some("expense"));
        assert_eq!(
            feed.last().and_then(|v| v.get("name")).and_then(Value::as_str),
            Some("Deng")
        );
    }

    #[test]
    fn feed_search_matches_across_fields() {
        let state = sample_state();
        let by_name = transactions_for_date(&state, "2026-03-14", "achol");
        assert_eq!(by_name.len(), 1);

        let by_username = transactions_for_date(&state, "2026-03-14", "wifi-800");
        assert_eq!(by_username.len(), 1);
        assert_eq!(
            by_username[0].get("type").and_then(Value::as_str),
            Some("voucher")
        );

        let by_reason = transactions_for_date(&state, "2026-03-14", "fuel");
        assert_eq!(by_reason.len(), 1);
    }

    #[test]
    fn period_summary_counts_the_window() {
        // Build records relative to now so the window test is stable.
        let today = clock::today_key();
        let mut state = AppState::default();
        state.clients.push(client(&today, 9, "Deng", PaymentStatus::Paid));
        state.clients.push(client(&today, 10, "Achol", PaymentStatus::Unpaid));
        state.vouchers.push(voucher(&today, "wifi-1"));

        let summary = period_summary(&state, Period::Weekly);
        assert_eq!(summary.sessions, 2);
        assert_eq!(summary.voucher_sales, 1);
        assert_eq!(summary.revenue, 500 + 1500);
        assert_eq!(summary.unpaid, 1);
        assert_eq!(summary.period, "WEEKLY");
    }

    #[test]
    fn report_series_takes_the_last_n_sorted() {
        let mut state = AppState::default();
        for (date, revenue) in [
            ("2026-03-12", 100),
            ("2026-03-10", 300),
            ("2026-03-11", 200),
        ] {
            state.daily_reports.push(DailyReport {
                date: date.into(),
                saved_by: "Admin".into(),
                summary: DailySummary {
                    total_clients: 1,
                    revenue,
                    expenses: 0,
                    net_profit: revenue,
                },
            });
        }

        let series = report_series(&state, 2);
        assert_eq!(
            series.get("labels").and_then(Value::as_array).map(|a| a.len()),
            Some(2)
        );
        assert_eq!(
            series["labels"][0].as_str(),
            Some("2026-03-11"),
            "oldest of the last two first"
        );
        assert_eq!(series["revenue"][1].as_i64(), Some(100));
    }

    #[test]
    fn daily_report_html_contains_sections_and_escapes() {
        let mut state = sample_state();
        state.clients[0].name = "Deng <script>".into();
        let report = DailyReport {
            date: "2026-03-14".into(),
            saved_by: "Admin".into(),
            summary: crate::archive::compute_summary(&state, "2026-03-14"),
        };

        let html = render_daily_report_html(&state, &report);
        assert!(html.contains("DAILY ARCHIVE SUMMARY"));
        assert!(html.contains("CLIENT SESSIONS"));
        assert!(html.contains("VOUCHER SALES"));
        assert!(html.contains("EXPENSES"));
        assert!(html.contains("ARCH-20260314"));
        assert!(html.contains("Deng &lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn csv_export_has_one_row_per_record_plus_header() {
        let state = sample_state();
        let csv = export_csv(&state);
        let lines: Vec<&str> = csv.trim_end().lines().collect();
        assert_eq!(lines.len(), 1 + 3 + 1 + 1);
        assert!(lines[0].starts_with("Type,Date"));
        assert!(csv.contains("\"fuel run\""));
    }

    #[test]
    fn backup_document_carries_every_collection() {
        let state = sample_state();
        let backup = backup_document(&state, "Admin");
        assert_eq!(
            backup.get("clients").and_then(Value::as_array).map(|a| a.len()),
            Some(3)
        );
        assert!(backup.get("voucherStock").is_some());
        assert!(backup.get("backupDate").is_some());
        assert!(backup.get("password").is_none());
    }
}
