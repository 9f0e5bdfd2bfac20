use std::collections::HashMap;
use std::fmt;

use crate::analysis::AnalysisKind;
use crate::record::{Reservation, ReservationStatus, Transaction, TransactionKind};

/// Rendering options passed to a [`LocalMetrics`] implementation.
#[derive(Debug, Clone)]
pub struct MetricsContext {
    /// Which sections to include in the narrative.
    pub kind: AnalysisKind,
    /// Symbol appended to monetary amounts.
    pub currency: String,
}

impl MetricsContext {
    pub fn new(kind: AnalysisKind) -> Self {
        Self {
            kind,
            currency: "€".to_owned(),
        }
    }

    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }
}

/// Deterministic, network-free narrator used while the remote analysis
/// service is unavailable.
///
/// Implementations must never fail and must describe zero activity for empty
/// inputs. The returned string is HTML and is passed through the content
/// sanitizer before display.
pub trait LocalMetrics: Send + Sync + fmt::Debug {
    fn narrate(
        &self,
        transactions: &[Transaction],
        reservations: &[Reservation],
        ctx: &MetricsContext,
    ) -> String;
}

/// Default [`LocalMetrics`] implementation summarizing key indicators.
#[derive(Debug, Clone, Copy, Default)]
pub struct KpiNarrator;

impl LocalMetrics for KpiNarrator {
    fn narrate(
        &self,
        transactions: &[Transaction],
        reservations: &[Reservation],
        ctx: &MetricsContext,
    ) -> String {
        let include_financial = matches!(ctx.kind, AnalysisKind::Financial | AnalysisKind::Combined);
        let include_reservations =
            matches!(ctx.kind, AnalysisKind::Reservation | AnalysisKind::Combined);

        let has_activity = (include_financial && !transactions.is_empty())
            || (include_reservations && !reservations.is_empty());

        let mut out = String::from("<h3>Local summary</h3>");
        if !has_activity {
            out.push_str("<p>No activity recorded for this period.</p>");
            return out;
        }

        if include_financial {
            financial_section(&mut out, transactions, &ctx.currency);
        }
        if include_reservations {
            reservation_section(&mut out, reservations, &ctx.currency);
        }
        out
    }
}

fn financial_section(out: &mut String, transactions: &[Transaction], currency: &str) {
    if transactions.is_empty() {
        out.push_str("<p>No transactions recorded.</p>");
        return;
    }

    let mut income = 0.0_f64;
    let mut expenses = 0.0_f64;
    let mut by_category: HashMap<&str, f64> = HashMap::new();
    for tx in transactions {
        match tx.kind {
            TransactionKind::Income => income += tx.amount,
            TransactionKind::Expense => {
                expenses += tx.amount;
                let category = tx.category.as_deref().unwrap_or("uncategorized");
                *by_category.entry(category).or_default() += tx.amount;
            }
        }
    }

    // Ties break alphabetically so the narrative is stable.
    let top_expense = by_category
        .into_iter()
        .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(a.0)));

    out.push_str(&format!(
        "<h4>Finances</h4><ul>\
         <li>Income: {}</li>\
         <li>Expenses: {}</li>\
         <li>Net result: {}</li>",
        money(income, currency),
        money(expenses, currency),
        money(income - expenses, currency),
    ));
    if let Some((category, amount)) = top_expense {
        out.push_str(&format!(
            "<li>Largest expense category: {} ({})</li>",
            escape_html(category),
            money(amount, currency),
        ));
    }
    out.push_str("</ul>");
}

#[allow(clippy::cast_precision_loss)]
fn reservation_section(out: &mut String, reservations: &[Reservation], currency: &str) {
    if reservations.is_empty() {
        out.push_str("<p>No reservations recorded.</p>");
        return;
    }

    let count = |status: ReservationStatus| {
        reservations.iter().filter(|r| r.status == status).count()
    };

    let active: Vec<&Reservation> = reservations
        .iter()
        .filter(|r| r.status != ReservationStatus::Cancelled)
        .collect();
    let nights: i64 = active.iter().map(|r| r.nights()).sum();
    let revenue: f64 = active.iter().map(|r| r.total_price).sum();

    out.push_str(&format!(
        "<h4>Reservations</h4><ul>\
         <li>Total: {}</li>\
         <li>Confirmed: {}, pending: {}, completed: {}, cancelled: {}</li>\
         <li>Booked nights: {nights}</li>",
        reservations.len(),
        count(ReservationStatus::Confirmed),
        count(ReservationStatus::Pending),
        count(ReservationStatus::Completed),
        count(ReservationStatus::Cancelled),
    ));
    if nights > 0 {
        out.push_str(&format!(
            "<li>Average nightly rate: {}</li>\
             <li>Average stay: {:.1} nights</li>",
            money(revenue / nights as f64, currency),
            nights as f64 / active.len() as f64,
        ));
    }
    out.push_str("</ul>");
}

fn money(amount: f64, currency: &str) -> String {
    format!("{amount:.2} {}", escape_html(currency))
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
    }

    fn tx(kind: TransactionKind, amount: f64, category: Option<&str>) -> Transaction {
        Transaction {
            id: format!("t-{amount}"),
            kind,
            amount,
            date: day(1),
            category: category.map(str::to_owned),
            description: None,
        }
    }

    fn res(status: ReservationStatus, nights: u32, price: f64) -> Reservation {
        Reservation {
            id: format!("r-{nights}"),
            client_name: "Ana".into(),
            property: None,
            check_in: day(1),
            check_out: day(1 + nights),
            total_price: price,
            status,
        }
    }

    #[test]
    fn empty_input_describes_zero_activity() {
        let text = KpiNarrator.narrate(&[], &[], &MetricsContext::new(AnalysisKind::Combined));
        assert!(text.contains("No activity recorded"));
    }

    #[test]
    fn financial_totals() {
        let txs = vec![
            tx(TransactionKind::Income, 1000.0, None),
            tx(TransactionKind::Expense, 150.0, Some("cleaning")),
            tx(TransactionKind::Expense, 250.0, Some("repairs")),
        ];
        let text = KpiNarrator.narrate(&txs, &[], &MetricsContext::new(AnalysisKind::Financial));
        assert!(text.contains("Income: 1000.00 €"));
        assert!(text.contains("Expenses: 400.00 €"));
        assert!(text.contains("Net result: 600.00 €"));
        assert!(text.contains("Largest expense category: repairs (250.00 €)"));
        assert!(!text.contains("Reservations"));
    }

    #[test]
    fn reservation_indicators_skip_cancelled() {
        let rs = vec![
            res(ReservationStatus::Confirmed, 4, 400.0),
            res(ReservationStatus::Completed, 2, 300.0),
            res(ReservationStatus::Cancelled, 10, 999.0),
        ];
        let text = KpiNarrator.narrate(
            &[],
            &rs,
            &MetricsContext::new(AnalysisKind::Reservation).with_currency("$"),
        );
        assert!(text.contains("Total: 3"));
        assert!(text.contains("cancelled: 1"));
        assert!(text.contains("Booked nights: 6"));
        // 700 / 6 nights
        assert!(text.contains("Average nightly rate: 116.67 $"));
        assert!(text.contains("Average stay: 3.0 nights"));
    }

    #[test]
    fn kind_selects_sections() {
        let txs = vec![tx(TransactionKind::Income, 10.0, None)];
        let text = KpiNarrator.narrate(&txs, &[], &MetricsContext::new(AnalysisKind::Reservation));
        assert!(text.contains("No activity recorded"));
    }

    #[test]
    fn user_text_is_escaped() {
        let txs = vec![tx(
            TransactionKind::Expense,
            5.0,
            Some("<script>alert(1)</script>"),
        )];
        let text = KpiNarrator.narrate(&txs, &[], &MetricsContext::new(AnalysisKind::Financial));
        assert!(!text.contains("<script"));
        assert!(text.contains("&lt;script&gt;"));
    }

    #[test]
    fn deterministic_output() {
        let txs = vec![
            tx(TransactionKind::Expense, 50.0, Some("b")),
            tx(TransactionKind::Expense, 50.0, Some("a")),
        ];
        let ctx = MetricsContext::new(AnalysisKind::Financial);
        let first = KpiNarrator.narrate(&txs, &[], &ctx);
        for _ in 0..10 {
            assert_eq!(KpiNarrator.narrate(&txs, &[], &ctx), first);
        }
        assert!(first.contains("Largest expense category: a"));
    }
}
