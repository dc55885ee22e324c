pub mod paymongo;
pub mod paypal;

use async_trait::async_trait;
use reqwest::{Response, StatusCode, Url};
use serde::Serialize;
use time::OffsetDateTime;

use crate::error::GatewayError;
use crate::status::{CanonicalStatus, Gateway, map_status};

/// Payment state as reported by a provider, before mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderPayment {
    pub raw_status: String,
    /// Capture (PayPal) or charge (PayMongo) id, when the provider reports one.
    pub settlement_id: Option<String>,
    pub settled_at: Option<OffsetDateTime>,
}

impl ProviderPayment {
    pub fn new(raw_status: impl Into<String>) -> Self {
        Self {
            raw_status: raw_status.into(),
            settlement_id: None,
            settled_at: None,
        }
    }

    pub fn with_settlement(
        mut self,
        settlement_id: impl Into<String>,
        settled_at: Option<OffsetDateTime>,
    ) -> Self {
        self.settlement_id = Some(settlement_id.into());
        self.settled_at = settled_at;
        self
    }
}

/// Provider status resolved for one correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatusResult {
    pub gateway: Gateway,
    pub correlation_id: String,
    pub raw_status: String,
    pub status: CanonicalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement_id: Option<String>,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub settled_at: Option<OffsetDateTime>,
}

impl GatewayStatusResult {
    pub fn from_provider(gateway: Gateway, correlation_id: &str, payment: ProviderPayment) -> Self {
        let status = map_status(gateway, &payment.raw_status);
        Self {
            gateway,
            correlation_id: correlation_id.to_string(),
            raw_status: payment.raw_status,
            status,
            settlement_id: payment.settlement_id,
            settled_at: payment.settled_at,
        }
    }
}

/// Resolves a correlation id to the provider's current payment status.
///
/// Implementations report every failure as a [`GatewayError`] value. The
/// engine does not retry within a run unless configured to; the next
/// scheduled run picks up whatever is still pending.
#[async_trait]
pub trait GatewayStatusFetcher: Send + Sync {
    fn gateway(&self) -> Gateway;

    async fn fetch_status(&self, correlation_id: &str) -> Result<ProviderPayment, GatewayError>;
}

/// Parse a configured API base URL.
pub(crate) fn parse_base_url(raw: &str) -> Result<Url, GatewayError> {
    let url = Url::parse(raw.trim_end_matches('/'))
        .map_err(|e| GatewayError::InvalidRequest(format!("invalid base URL '{raw}': {e}")))?;
    if url.cannot_be_a_base() {
        return Err(GatewayError::InvalidRequest(format!(
            "'{raw}' cannot be used as a base URL"
        )));
    }
    Ok(url)
}

/// Append `segments` to `base`, each one percent-encoded as a single path
/// segment. Correlation ids are store data, so `/`, `?` and `#` inside one
/// never change which resource is addressed.
pub(crate) fn resource_url(base: &Url, segments: &[&str]) -> Result<Url, GatewayError> {
    if let Some(bad) = segments.iter().find(|s| matches!(**s, "" | "." | "..")) {
        return Err(GatewayError::InvalidRequest(format!(
            "'{bad}' is not a valid resource id"
        )));
    }

    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| GatewayError::InvalidRequest(format!("'{base}' cannot be a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Turn a non-success response into a typed error.
pub(crate) async fn error_for_response(
    gateway: Gateway,
    correlation_id: &str,
    response: Response,
) -> GatewayError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            GatewayError::Unauthorized(format!("{gateway} rejected credentials: {body}"))
        }
        StatusCode::NOT_FOUND => GatewayError::NotFound(correlation_id.to_string()),
        StatusCode::TOO_MANY_REQUESTS => GatewayError::RateLimited(gateway),
        _ => GatewayError::Api {
            status: status.as_u16(),
            body,
        },
    }
}

pub use paymongo::PayMongoClient;
pub use paypal::PayPalClient;
