//! Status vocabularies.
//!
//! Each gateway reports payment state in its own vocabulary. Raw values are
//! parsed into a per-provider enum and translated to [`CanonicalStatus`] by
//! an exhaustive match, so adding a provider variant forces the mapping to
//! be revisited. Values the parser does not know land in `Unrecognized` and
//! map to [`CanonicalStatus::Pending`], which makes the engine leave the
//! record alone instead of guessing a terminal state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Payment gateway whose records are reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gateway {
    PayPal,
    PayMongo,
}

impl Gateway {
    pub const ALL: [Gateway; 2] = [Gateway::PayPal, Gateway::PayMongo];

    /// Value stored in the domain stores' payment method field.
    pub fn as_str(self) -> &'static str {
        match self {
            Gateway::PayPal => "paypal",
            Gateway::PayMongo => "paymongo",
        }
    }
}

impl fmt::Display for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gateway {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paypal" => Ok(Gateway::PayPal),
            "paymongo" => Ok(Gateway::PayMongo),
            other => Err(format!("unknown gateway: {other}")),
        }
    }
}

/// Normalized payment status shared by every store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    /// Set by the refund flow; never produced here.
    Refunded,
}

impl CanonicalStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, CanonicalStatus::Pending)
    }

    /// The status this engine may write, if any.
    pub fn settled(self) -> Option<SettledStatus> {
        match self {
            CanonicalStatus::Completed => Some(SettledStatus::Completed),
            CanonicalStatus::Failed => Some(SettledStatus::Failed),
            CanonicalStatus::Cancelled => Some(SettledStatus::Cancelled),
            CanonicalStatus::Pending | CanonicalStatus::Refunded => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CanonicalStatus::Pending => "pending",
            CanonicalStatus::Completed => "completed",
            CanonicalStatus::Failed => "failed",
            CanonicalStatus::Cancelled => "cancelled",
            CanonicalStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for CanonicalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal statuses reachable from `pending` through reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettledStatus {
    Completed,
    Failed,
    Cancelled,
}

impl From<SettledStatus> for CanonicalStatus {
    fn from(status: SettledStatus) -> Self {
        match status {
            SettledStatus::Completed => CanonicalStatus::Completed,
            SettledStatus::Failed => CanonicalStatus::Failed,
            SettledStatus::Cancelled => CanonicalStatus::Cancelled,
        }
    }
}

/// PayPal order status (`/v2/checkout/orders`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayPalOrderStatus {
    Created,
    Saved,
    Approved,
    PayerActionRequired,
    Completed,
    Voided,
    Cancelled,
    Unrecognized(String),
}

impl PayPalOrderStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CREATED" => Self::Created,
            "SAVED" => Self::Saved,
            "APPROVED" => Self::Approved,
            "PAYER_ACTION_REQUIRED" => Self::PayerActionRequired,
            "COMPLETED" => Self::Completed,
            "VOIDED" => Self::Voided,
            "CANCELLED" | "CANCELED" => Self::Cancelled,
            _ => Self::Unrecognized(raw.to_string()),
        }
    }

    pub fn canonical(&self) -> CanonicalStatus {
        match self {
            Self::Completed => CanonicalStatus::Completed,
            Self::Voided => CanonicalStatus::Failed,
            Self::Cancelled => CanonicalStatus::Cancelled,
            Self::Created | Self::Saved | Self::Approved | Self::PayerActionRequired => {
                CanonicalStatus::Pending
            }
            Self::Unrecognized(raw) => {
                warn!(gateway = "paypal", raw_status = %raw, "Unrecognized PayPal order status");
                CanonicalStatus::Pending
            }
        }
    }
}

/// PayMongo payment intent status (`/v1/payment_intents`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayMongoIntentStatus {
    Succeeded,
    Processing,
    AwaitingPaymentMethod,
    AwaitingNextAction,
    Cancelled,
    Failed,
    PaymentFailed,
    Unrecognized(String),
}

impl PayMongoIntentStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "succeeded" => Self::Succeeded,
            "processing" => Self::Processing,
            "awaiting_payment_method" => Self::AwaitingPaymentMethod,
            "awaiting_next_action" => Self::AwaitingNextAction,
            "cancelled" => Self::Cancelled,
            "failed" => Self::Failed,
            "payment_failed" => Self::PaymentFailed,
            _ => Self::Unrecognized(raw.to_string()),
        }
    }

    pub fn canonical(&self) -> CanonicalStatus {
        match self {
            Self::Succeeded => CanonicalStatus::Completed,
            Self::Processing | Self::AwaitingPaymentMethod | Self::AwaitingNextAction => {
                CanonicalStatus::Pending
            }
            Self::Cancelled => CanonicalStatus::Cancelled,
            Self::Failed | Self::PaymentFailed => CanonicalStatus::Failed,
            Self::Unrecognized(raw) => {
                warn!(gateway = "paymongo", raw_status = %raw, "Unrecognized PayMongo intent status");
                CanonicalStatus::Pending
            }
        }
    }
}

/// Translate a raw provider status into the canonical vocabulary.
pub fn map_status(gateway: Gateway, raw: &str) -> CanonicalStatus {
    match gateway {
        Gateway::PayPal => PayPalOrderStatus::parse(raw).canonical(),
        Gateway::PayMongo => PayMongoIntentStatus::parse(raw).canonical(),
    }
}
