use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{PayloadError, json_type_name};

/// Direction of a financial transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

/// A single income or expense entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: f64,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Lifecycle status of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

/// A booking of a rental property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: String,
    pub client_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub total_price: f64,
    pub status: ReservationStatus,
}

impl Reservation {
    /// Number of booked nights. A checkout on or before check-in counts as zero.
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days().max(0)
    }
}

/// The business records submitted for analysis.
///
/// The orchestration layer treats the payload as opaque beyond "non-empty in
/// aggregate"; the records are forwarded to the remote service and to the
/// local metrics narrator unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPayload {
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub reservations: Vec<Reservation>,
}

impl AnalysisPayload {
    pub fn new(transactions: Vec<Transaction>, reservations: Vec<Reservation>) -> Self {
        Self {
            transactions,
            reservations,
        }
    }

    /// Returns `true` when both collections are empty.
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty() && self.reservations.is_empty()
    }

    /// Total number of records across both collections.
    pub fn len(&self) -> usize {
        self.transactions.len() + self.reservations.len()
    }

    /// Decode an untyped document into a payload.
    ///
    /// Missing or `null` collections are treated as empty. A collection that
    /// is present with any other non-list shape is rejected before the
    /// individual records are decoded.
    pub fn from_value(value: serde_json::Value) -> Result<Self, PayloadError> {
        let serde_json::Value::Object(map) = &value else {
            return Err(PayloadError::NotAnObject(json_type_name(&value)));
        };

        for field in ["transactions", "reservations"] {
            match map.get(field) {
                None | Some(serde_json::Value::Null | serde_json::Value::Array(_)) => {}
                Some(other) => {
                    return Err(PayloadError::NotAList {
                        field,
                        found: json_type_name(other),
                    });
                }
            }
        }

        let mut map = map.clone();
        map.retain(|_, v| !v.is_null());
        Ok(serde_json::from_value(serde_json::Value::Object(map))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn transaction_wire_format() {
        let tx: Transaction = serde_json::from_value(json!({
            "id": "t1",
            "type": "income",
            "amount": 1200.0,
            "date": "2026-03-01",
            "category": "rent"
        }))
        .unwrap();
        assert_eq!(tx.kind, TransactionKind::Income);
        assert_eq!(tx.date, date("2026-03-01"));
        assert_eq!(tx.category.as_deref(), Some("rent"));
        assert!(tx.description.is_none());

        let back = serde_json::to_value(&tx).unwrap();
        assert_eq!(back["type"], "income");
        assert!(back.get("description").is_none());
    }

    #[test]
    fn reservation_camel_case_fields() {
        let r: Reservation = serde_json::from_value(json!({
            "id": "r1",
            "clientName": "Ana",
            "checkIn": "2026-07-01",
            "checkOut": "2026-07-05",
            "totalPrice": 480.0,
            "status": "confirmed"
        }))
        .unwrap();
        assert_eq!(r.client_name, "Ana");
        assert_eq!(r.status, ReservationStatus::Confirmed);
        assert_eq!(r.nights(), 4);
    }

    #[test]
    fn reversed_dates_count_zero_nights() {
        let r = Reservation {
            id: "r1".into(),
            client_name: "Ana".into(),
            property: None,
            check_in: date("2026-07-05"),
            check_out: date("2026-07-01"),
            total_price: 0.0,
            status: ReservationStatus::Pending,
        };
        assert_eq!(r.nights(), 0);
    }

    // -- from_value ------------------------------------------------------------

    #[test]
    fn empty_object_is_empty_payload() {
        let payload = AnalysisPayload::from_value(json!({})).unwrap();
        assert!(payload.is_empty());
        assert_eq!(payload.len(), 0);
    }

    #[test]
    fn null_collections_are_empty() {
        let payload =
            AnalysisPayload::from_value(json!({"transactions": null, "reservations": []}))
                .unwrap();
        assert!(payload.is_empty());
    }

    #[test]
    fn non_list_collection_rejected() {
        let err = AnalysisPayload::from_value(json!({"transactions": "lots"})).unwrap_err();
        assert!(matches!(
            err,
            PayloadError::NotAList {
                field: "transactions",
                found: "string"
            }
        ));
    }

    #[test]
    fn non_object_rejected() {
        let err = AnalysisPayload::from_value(json!([1, 2])).unwrap_err();
        assert!(matches!(err, PayloadError::NotAnObject("array")));
    }

    #[test]
    fn malformed_record_rejected() {
        let err = AnalysisPayload::from_value(json!({
            "transactions": [{"id": "t1", "type": "gift"}]
        }))
        .unwrap_err();
        assert!(matches!(err, PayloadError::Malformed(_)));
    }

    #[test]
    fn full_payload_decodes() {
        let payload = AnalysisPayload::from_value(json!({
            "transactions": [
                {"id": "t1", "type": "income", "amount": 100.0, "date": "2026-01-10"}
            ],
            "reservations": [{
                "id": "r1", "clientName": "Bo", "checkIn": "2026-01-10",
                "checkOut": "2026-01-12", "totalPrice": 200.0, "status": "pending"
            }]
        }))
        .unwrap();
        assert_eq!(payload.len(), 2);
        assert!(!payload.is_empty());
    }
}
