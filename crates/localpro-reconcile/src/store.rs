//! Field layout of the four payment-bearing domain stores.
//!
//! Bookings, supply orders, finance transactions and subscription payments
//! keep their payment state under different field names and vocabularies.
//! [`TargetStore`] describes those layouts declaratively so every substrate
//! (PostgreSQL JSONB, in-memory documents) filters and writes the same paths.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::repository::StatusPatch;
use crate::status::{Gateway, SettledStatus};

/// Dotted document path, one element per nesting level.
pub type FieldPath = &'static [&'static str];

/// Status value shared by every store for records awaiting settlement.
pub const PENDING: &str = "pending";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStore {
    Booking,
    SupplyOrder,
    Transaction,
    SubscriptionPayment,
}

/// One field write produced by a settled status.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldAssignment {
    pub path: FieldPath,
    pub value: Value,
}

impl FieldAssignment {
    fn new(path: FieldPath, value: impl Into<Value>) -> Self {
        Self {
            path,
            value: value.into(),
        }
    }
}

impl TargetStore {
    pub const ALL: [TargetStore; 4] = [
        TargetStore::Booking,
        TargetStore::SupplyOrder,
        TargetStore::Transaction,
        TargetStore::SubscriptionPayment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TargetStore::Booking => "booking",
            TargetStore::SupplyOrder => "supply_order",
            TargetStore::Transaction => "transaction",
            TargetStore::SubscriptionPayment => "subscription_payment",
        }
    }

    /// Collection (table) name.
    pub fn collection(self) -> &'static str {
        match self {
            TargetStore::Booking => "bookings",
            TargetStore::SupplyOrder => "orders",
            TargetStore::Transaction => "transactions",
            TargetStore::SubscriptionPayment => "payments",
        }
    }

    pub fn method_path(self) -> FieldPath {
        match self {
            TargetStore::Booking => &["payment", "method"],
            TargetStore::SupplyOrder
            | TargetStore::Transaction
            | TargetStore::SubscriptionPayment => &["paymentMethod"],
        }
    }

    pub fn status_path(self) -> FieldPath {
        match self {
            TargetStore::Booking | TargetStore::SupplyOrder => &["payment", "status"],
            TargetStore::Transaction | TargetStore::SubscriptionPayment => &["status"],
        }
    }

    pub fn correlation_path(self, gateway: Gateway) -> FieldPath {
        match (self, gateway) {
            (TargetStore::Booking | TargetStore::SupplyOrder, Gateway::PayPal) => {
                &["payment", "paypalOrderId"]
            }
            (TargetStore::Booking | TargetStore::SupplyOrder, Gateway::PayMongo) => {
                &["payment", "paymongoIntentId"]
            }
            (TargetStore::Transaction | TargetStore::SubscriptionPayment, Gateway::PayPal) => {
                &["paymentDetails", "paypalOrderId"]
            }
            (TargetStore::Transaction | TargetStore::SubscriptionPayment, Gateway::PayMongo) => {
                &["paymentDetails", "paymongoIntentId"]
            }
        }
    }

    fn settlement_path(self, gateway: Gateway) -> FieldPath {
        match (self, gateway) {
            (TargetStore::Booking | TargetStore::SupplyOrder, Gateway::PayPal) => {
                &["payment", "paypalTransactionId"]
            }
            (TargetStore::Booking | TargetStore::SupplyOrder, Gateway::PayMongo) => {
                &["payment", "paymongoChargeId"]
            }
            (TargetStore::Transaction | TargetStore::SubscriptionPayment, Gateway::PayPal) => {
                &["paymentDetails", "paypalCaptureId"]
            }
            (TargetStore::Transaction | TargetStore::SubscriptionPayment, Gateway::PayMongo) => {
                &["paymentDetails", "paymongoChargeId"]
            }
        }
    }

    fn gateway_status_path(self) -> FieldPath {
        match self {
            TargetStore::Booking | TargetStore::SupplyOrder => &["payment", "gatewayStatus"],
            TargetStore::Transaction | TargetStore::SubscriptionPayment => {
                &["paymentDetails", "gatewayStatus"]
            }
        }
    }

    /// Stored value for a settled status in this store's vocabulary.
    pub fn status_value(self, status: SettledStatus) -> &'static str {
        match (self, status) {
            (TargetStore::Booking | TargetStore::SupplyOrder, SettledStatus::Completed) => "paid",
            (_, SettledStatus::Completed) => "completed",
            (_, SettledStatus::Failed) => "failed",
            (_, SettledStatus::Cancelled) => "cancelled",
        }
    }

    /// Field writes applying `patch` to a pending record of this store.
    pub fn assignments(self, gateway: Gateway, patch: &StatusPatch) -> Vec<FieldAssignment> {
        let mut writes = vec![
            FieldAssignment::new(self.status_path(), self.status_value(patch.status)),
            FieldAssignment::new(self.gateway_status_path(), patch.raw_status.as_str()),
        ];

        if let Some(settlement_id) = &patch.settlement_id {
            writes.push(FieldAssignment::new(
                self.settlement_path(gateway),
                settlement_id.as_str(),
            ));
        }

        let completed = patch.status == SettledStatus::Completed;
        match self {
            TargetStore::Booking if completed => {
                writes.push(FieldAssignment::new(
                    &["payment", "paidAt"],
                    timestamp(patch.settled_at()),
                ));
            }
            TargetStore::SupplyOrder if completed => {
                writes.push(FieldAssignment::new(
                    &["payment", "paidAt"],
                    timestamp(patch.settled_at()),
                ));
                writes.push(FieldAssignment::new(&["status"], "confirmed"));
            }
            TargetStore::Transaction if completed => {
                writes.push(FieldAssignment::new(
                    &["completedAt"],
                    timestamp(patch.settled_at()),
                ));
            }
            TargetStore::SubscriptionPayment => {
                writes.push(FieldAssignment::new(
                    &["processedAt"],
                    timestamp(patch.processed_at),
                ));
            }
            _ => {}
        }

        writes.push(FieldAssignment::new(
            &["updatedAt"],
            timestamp(patch.processed_at),
        ));
        writes
    }
}

impl fmt::Display for TargetStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn timestamp(at: OffsetDateTime) -> Value {
    Value::String(at.format(&Rfc3339).unwrap_or_default())
}

/// JSON pointer form of a field path (`/payment/status`).
pub fn pointer(path: FieldPath) -> String {
    path.iter().fold(String::new(), |mut acc, segment| {
        acc.push('/');
        acc.push_str(segment);
        acc
    })
}

/// String value at `path`, if present and non-empty.
pub fn read_str<'a>(document: &'a Value, path: FieldPath) -> Option<&'a str> {
    document
        .pointer(&pointer(path))
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
}

/// Write `value` at `path`, creating intermediate objects.
///
/// Returns `false` when an intermediate segment exists but is not an object.
pub fn write_path(document: &mut Value, path: FieldPath, value: Value) -> bool {
    let Some((last, parents)) = path.split_last() else {
        return false;
    };

    let mut current = document;
    for segment in parents {
        let Some(object) = current.as_object_mut() else {
            return false;
        };
        current = object
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
    }

    match current.as_object_mut() {
        Some(object) => {
            object.insert(last.to_string(), value);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    fn patch(status: SettledStatus) -> StatusPatch {
        StatusPatch {
            status,
            raw_status: "COMPLETED".into(),
            settlement_id: Some("CAPTURE123".into()),
            settled_at: Some(datetime!(2024-05-01 10:15 UTC)),
            processed_at: datetime!(2024-05-01 11:00 UTC),
        }
    }

    fn find<'a>(writes: &'a [FieldAssignment], path: FieldPath) -> Option<&'a Value> {
        writes.iter().find(|w| w.path == path).map(|w| &w.value)
    }

    #[test]
    fn test_booking_completed_assignments() {
        let writes = TargetStore::Booking.assignments(Gateway::PayPal, &patch(SettledStatus::Completed));

        assert_eq!(find(&writes, &["payment", "status"]), Some(&json!("paid")));
        assert_eq!(
            find(&writes, &["payment", "paypalTransactionId"]),
            Some(&json!("CAPTURE123"))
        );
        assert_eq!(
            find(&writes, &["payment", "paidAt"]),
            Some(&json!("2024-05-01T10:15:00Z"))
        );
        assert!(find(&writes, &["status"]).is_none());
    }

    #[test]
    fn test_supply_order_confirms_on_completion() {
        let writes =
            TargetStore::SupplyOrder.assignments(Gateway::PayPal, &patch(SettledStatus::Completed));
        assert_eq!(find(&writes, &["status"]), Some(&json!("confirmed")));

        let writes =
            TargetStore::SupplyOrder.assignments(Gateway::PayPal, &patch(SettledStatus::Failed));
        assert_eq!(find(&writes, &["payment", "status"]), Some(&json!("failed")));
        assert!(find(&writes, &["status"]).is_none());
        assert!(find(&writes, &["payment", "paidAt"]).is_none());
    }

    #[test]
    fn test_subscription_payment_always_processed() {
        let writes = TargetStore::SubscriptionPayment
            .assignments(Gateway::PayMongo, &patch(SettledStatus::Cancelled));

        assert_eq!(find(&writes, &["status"]), Some(&json!("cancelled")));
        assert_eq!(
            find(&writes, &["paymentDetails", "paymongoChargeId"]),
            Some(&json!("CAPTURE123"))
        );
        assert_eq!(
            find(&writes, &["processedAt"]),
            Some(&json!("2024-05-01T11:00:00Z"))
        );
    }

    #[test]
    fn test_transaction_vocabulary() {
        assert_eq!(
            TargetStore::Transaction.status_value(SettledStatus::Completed),
            "completed"
        );
        assert_eq!(
            TargetStore::Booking.status_value(SettledStatus::Completed),
            "paid"
        );
        assert_eq!(
            TargetStore::Transaction.correlation_path(Gateway::PayMongo),
            &["paymentDetails", "paymongoIntentId"]
        );
    }

    #[test]
    fn test_write_and_read_paths() {
        let mut doc = json!({ "payment": { "status": "pending" } });
        assert!(write_path(&mut doc, &["payment", "status"], json!("paid")));
        assert!(write_path(&mut doc, &["paymentDetails", "gatewayStatus"], json!("x")));
        assert_eq!(read_str(&doc, &["payment", "status"]), Some("paid"));
        assert_eq!(read_str(&doc, &["paymentDetails", "gatewayStatus"]), Some("x"));

        let mut scalar = json!({ "payment": "cash" });
        assert!(!write_path(&mut scalar, &["payment", "status"], json!("paid")));
        assert_eq!(pointer(&["payment", "status"]), "/payment/status");
    }
}
