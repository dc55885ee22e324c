use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::Mutex;
use tracing::debug;

use super::{
    GatewayStatusFetcher, ProviderPayment, error_for_response, parse_base_url, resource_url,
};
use crate::config::PayPalConfig;
use crate::error::GatewayError;
use crate::status::Gateway;

/// Tokens are refreshed this long before PayPal says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Order resource from `GET /v2/checkout/orders/{id}`, reduced to what
/// reconciliation reads.
#[derive(Debug, Clone, Deserialize)]
pub struct PayPalOrder {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub purchase_units: Vec<PurchaseUnit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseUnit {
    #[serde(default)]
    pub payments: Option<PurchaseUnitPayments>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PurchaseUnitPayments {
    #[serde(default)]
    pub captures: Vec<Capture>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Capture {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub create_time: Option<String>,
}

impl PayPalOrder {
    pub fn first_capture(&self) -> Option<&Capture> {
        self.purchase_units
            .iter()
            .filter_map(|unit| unit.payments.as_ref())
            .flat_map(|payments| payments.captures.iter())
            .next()
    }

    pub fn into_provider_payment(self) -> ProviderPayment {
        let settlement = self.first_capture().map(|capture| {
            let captured_at = capture
                .create_time
                .as_deref()
                .and_then(|raw| OffsetDateTime::parse(raw, &Rfc3339).ok());
            (capture.id.clone(), captured_at)
        });

        let payment = ProviderPayment::new(self.status);
        match settlement {
            Some((id, at)) => payment.with_settlement(id, at),
            None => payment,
        }
    }
}

/// PayPal REST client using OAuth2 client credentials.
pub struct PayPalClient {
    http_client: Client,
    base_url: Url,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<AccessToken>>,
}

impl PayPalClient {
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: parse_base_url(&base_url.into())?,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token: Mutex::new(None),
        })
    }

    /// Build a client from configuration; `None` when credentials are absent.
    pub fn from_config(config: &PayPalConfig) -> Result<Option<Self>, GatewayError> {
        let Some((client_id, client_secret)) = config.credentials() else {
            return Ok(None);
        };
        Self::new(
            config.api_base_url(),
            client_id,
            client_secret,
            config.request_timeout(),
        )
        .map(Some)
    }

    async fn access_token(&self) -> Result<String, GatewayError> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref()
            && token.expires_at > Instant::now() + TOKEN_EXPIRY_MARGIN
        {
            return Ok(token.value.clone());
        }

        let url = resource_url(&self.base_url, &["v1", "oauth2", "token"])?;
        let response = self
            .http_client
            .post(url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    GatewayError::Unauthorized(format!("PayPal token request rejected: {body}"))
                }
                StatusCode::TOO_MANY_REQUESTS => GatewayError::RateLimited(Gateway::PayPal),
                _ => GatewayError::Api {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        let token: TokenResponse = response.json().await?;
        debug!(expires_in = token.expires_in, "Obtained PayPal access token");

        let value = token.access_token.clone();
        // An expiry past what Instant can represent is not cached.
        *cached = Instant::now()
            .checked_add(Duration::from_secs(token.expires_in))
            .map(|expires_at| AccessToken {
                value: token.access_token,
                expires_at,
            });
        Ok(value)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    pub async fn get_order(&self, order_id: &str) -> Result<PayPalOrder, GatewayError> {
        let token = self.access_token().await?;
        let url = resource_url(&self.base_url, &["v2", "checkout", "orders", order_id])?;

        let response = self
            .http_client
            .get(url)
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            if response.status() == StatusCode::UNAUTHORIZED {
                self.invalidate_token().await;
            }
            return Err(error_for_response(Gateway::PayPal, order_id, response).await);
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl GatewayStatusFetcher for PayPalClient {
    fn gateway(&self) -> Gateway {
        Gateway::PayPal
    }

    async fn fetch_status(&self, correlation_id: &str) -> Result<ProviderPayment, GatewayError> {
        let order = self.get_order(correlation_id).await?;
        Ok(order.into_provider_payment())
    }
}
