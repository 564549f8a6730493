use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::{Error, Gateway, Payment, Preference, PreferenceRequest};

pub const API_URL: &str = "https://api.mercadopago.com";

const TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct MercadoPago {
    client: Client,
    base_url: String,
    access_token: String,
}

impl MercadoPago {
    pub fn new(access_token: impl Into<String>) -> Result<Self, Error> {
        Self::with_base_url(API_URL, access_token)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, Error> {
        let client = Client::builder().timeout(TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn read<T: DeserializeOwned>(response: Response) -> Result<T, Error> {
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!("Mercado Pago answered {status}: {body}");

        return Err(Error::Rejected {
            status: status.as_u16(),
            body,
        });
    }

    Ok(response.json().await?)
}

#[async_trait]
impl Gateway for MercadoPago {
    async fn create_preference(
        &self,
        preference: &PreferenceRequest,
        idempotency_key: &str,
    ) -> Result<Preference, Error> {
        debug!(
            "Creating preference for {} with {} items",
            preference.external_reference,
            preference.items.len()
        );

        let response = self
            .client
            .post(self.url("/checkout/preferences"))
            .bearer_auth(&self.access_token)
            .header("X-Idempotency-Key", idempotency_key)
            .json(preference)
            .send()
            .await?;

        read(response).await
    }

    async fn get_payment(&self, payment_id: &str) -> Result<Payment, Error> {
        let response = self
            .client
            .get(self.url(&format!("/v1/payments/{payment_id}")))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        read(response).await
    }
}
