use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use time::OffsetDateTime;

use super::{
    GatewayStatusFetcher, ProviderPayment, error_for_response, parse_base_url, resource_url,
};
use crate::config::PayMongoConfig;
use crate::error::GatewayError;
use crate::status::Gateway;

#[derive(Debug, Deserialize)]
struct IntentEnvelope {
    data: PaymentIntent,
}

/// Payment intent from `GET /v1/payment_intents/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub attributes: IntentAttributes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntentAttributes {
    pub status: String,
    #[serde(default)]
    pub charges: Option<ChargeList>,
    #[serde(default)]
    pub payments: Vec<IntentPayment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChargeList {
    #[serde(default)]
    pub data: Vec<Charge>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Charge {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntentPayment {
    pub id: String,
    #[serde(default)]
    pub attributes: Option<IntentPaymentAttributes>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntentPaymentAttributes {
    /// Unix seconds
    #[serde(default)]
    pub paid_at: Option<i64>,
}

impl PaymentIntent {
    pub fn into_provider_payment(self) -> ProviderPayment {
        let IntentAttributes {
            status,
            charges,
            payments,
        } = self.attributes;

        let paid_at = payments
            .first()
            .and_then(|p| p.attributes.as_ref())
            .and_then(|a| a.paid_at)
            .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok());

        let charge_id = charges
            .and_then(|list| list.data.into_iter().next())
            .map(|charge| charge.id)
            .or_else(|| payments.into_iter().next().map(|p| p.id));

        let payment = ProviderPayment::new(status);
        match charge_id {
            Some(id) => payment.with_settlement(id, paid_at),
            None => payment,
        }
    }
}

/// PayMongo REST client authenticated with the account secret key.
pub struct PayMongoClient {
    http_client: Client,
    base_url: Url,
    secret_key: String,
}

impl PayMongoClient {
    pub fn new(
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: parse_base_url(&base_url.into())?,
            secret_key: secret_key.into(),
        })
    }

    /// Build a client from configuration; `None` when the secret key is absent.
    pub fn from_config(config: &PayMongoConfig) -> Result<Option<Self>, GatewayError> {
        let Some(secret_key) = config.secret_key() else {
            return Ok(None);
        };
        Self::new(config.api_base_url(), secret_key, config.request_timeout()).map(Some)
    }

    pub async fn get_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError> {
        let url = resource_url(&self.base_url, &["v1", "payment_intents", intent_id])?;

        let response = self
            .http_client
            .get(url)
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_response(Gateway::PayMongo, intent_id, response).await);
        }

        let envelope: IntentEnvelope = response.json().await?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl GatewayStatusFetcher for PayMongoClient {
    fn gateway(&self) -> Gateway {
        Gateway::PayMongo
    }

    async fn fetch_status(&self, correlation_id: &str) -> Result<ProviderPayment, GatewayError> {
        let intent = self.get_payment_intent(correlation_id).await?;
        Ok(intent.into_provider_payment())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> PayMongoClient {
        PayMongoClient::new(server.uri(), "sk_test_123", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_charge_preferred_over_payment() {
        let intent: PaymentIntent = serde_json::from_value(json!({
            "id": "pi_1",
            "attributes": {
                "status": "succeeded",
                "charges": { "data": [{ "id": "ch_1" }] },
                "payments": [{ "id": "pay_1", "attributes": { "paid_at": 1714558500 } }]
            }
        }))
        .unwrap();

        let payment = intent.into_provider_payment();
        assert_eq!(payment.settlement_id.as_deref(), Some("ch_1"));
        assert_eq!(
            payment.settled_at.map(|t| t.unix_timestamp()),
            Some(1_714_558_500)
        );
    }

    #[test]
    fn test_payment_fallback_when_no_charges() {
        let intent: PaymentIntent = serde_json::from_value(json!({
            "id": "pi_2",
            "attributes": {
                "status": "succeeded",
                "payments": [{ "id": "pay_2" }]
            }
        }))
        .unwrap();

        let payment = intent.into_provider_payment();
        assert_eq!(payment.settlement_id.as_deref(), Some("pay_2"));
        assert!(payment.settled_at.is_none());
    }

    #[test]
    fn test_from_config_without_secret() {
        assert!(
            PayMongoClient::from_config(&PayMongoConfig::default())
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_fetch_succeeded_intent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/payment_intents/pi_123"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "id": "pi_123",
                    "type": "payment_intent",
                    "attributes": {
                        "status": "succeeded",
                        "charges": { "data": [{ "id": "ch_123" }] }
                    }
                }
            })))
            .mount(&server)
            .await;

        let payment = client(&server).fetch_status("pi_123").await.unwrap();
        assert_eq!(payment.raw_status, "succeeded");
        assert_eq!(payment.settlement_id.as_deref(), Some("ch_123"));
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/payment_intents/pi_404"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client(&server).fetch_status("pi_404").await.unwrap_err();
        assert!(matches!(err, GatewayError::Unauthorized(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_intent_id_is_a_single_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/payment_intents/pi_other"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "id": "pi_other", "attributes": { "status": "succeeded" } }
            })))
            .expect(0)
            .mount(&server)
            .await;

        let client = client(&server);
        let err = client.fetch_status("pi_1/../pi_other").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));

        let err = client.fetch_status("pi_other?x=1").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }
}
