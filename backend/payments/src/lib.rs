//! # Mercado Pago
//!
//! Thin client for the two Mercado Pago endpoints the storefront needs.
//!
//! ## Checkout Pro flow
//! - Backend builds a preference (items, payer, back URLs, external reference)
//! - Mercado Pago answers with an `init_point`, the hosted checkout URL
//! - Frontend redirects the buyer to the `init_point`
//! - Buyer pays, Mercado Pago redirects back to one of the back URLs
//! - Independently, Mercado Pago posts a notification to our webhook with the payment id
//! - Backend fetches the payment and updates the order named by `external_reference`
//!
//! ## Notes
//! - Preferences are created with an idempotency key so a retried checkout click
//!   does not create two preferences
//! - Notifications carry no payment data, only the id, so the payment is always re-read
//! - Signed notifications can be checked with [`signature::verify`]
use async_trait::async_trait;
use thiserror::Error;

pub mod models;
pub mod remote;
pub mod signature;

pub use models::{BackUrls, Payer, Payment, Preference, PreferenceItem, PreferenceRequest, Shipments};
pub use remote::MercadoPago;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Mercado Pago request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Mercado Pago rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Payment gateway seen by the storefront.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn create_preference(
        &self,
        preference: &PreferenceRequest,
        idempotency_key: &str,
    ) -> Result<Preference, Error>;

    async fn get_payment(&self, payment_id: &str) -> Result<Payment, Error>;
}
