//! Donation payments through a third-party processor speaking a
//! form-encoded `payment_intents` API.

use church_core::content::validate::{FieldError, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::PaymentConfig;

/// Smallest accepted donation, in minor units.
pub const MIN_DONATION: i64 = 100;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment processor unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("payment processor answered {status}: {message}")]
    Processor { status: u16, message: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationRequest {
    /// Minor units (cents).
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub donor_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub fund: Option<String>,
}

impl DonationRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();
        if self.amount < MIN_DONATION {
            errors.push(field_error("amount", format!("amount must be at least {MIN_DONATION}")));
        }
        if let Some(currency) = &self.currency {
            if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
                errors.push(field_error("currency", "currency must be a three-letter code"));
            }
        }
        if let Some(email) = &self.email {
            let valid = email
                .split_once('@')
                .is_some_and(|(user, domain)| !user.is_empty() && domain.contains('.'));
            if !valid {
                errors.push(field_error("email", "email is not valid"));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError(errors))
        }
    }
}

fn field_error(field: &str, message: impl Into<String>) -> FieldError {
    FieldError {
        field: field.to_string(),
        message: message.into(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub id: String,
    pub status: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default, alias = "client_secret", skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PaymentClient {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
    currency: String,
}

impl PaymentClient {
    /// `None` when no secret key is configured.
    pub fn from_config(config: &PaymentConfig) -> Option<Self> {
        let secret_key = config.secret_key.clone()?;
        Some(Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            secret_key,
            currency: config.currency.clone(),
        })
    }

    pub async fn create_intent(&self, donation: &DonationRequest) -> Result<PaymentIntent, PaymentError> {
        let currency = donation
            .currency
            .as_deref()
            .unwrap_or(&self.currency)
            .to_ascii_lowercase();
        let mut form = vec![
            ("amount", donation.amount.to_string()),
            ("currency", currency),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ];
        if let Some(email) = &donation.email {
            form.push(("receipt_email", email.clone()));
        }
        if let Some(name) = &donation.donor_name {
            form.push(("metadata[donor_name]", name.clone()));
        }
        if let Some(fund) = &donation.fund {
            form.push(("metadata[fund]", fund.clone()));
        }

        let response = self
            .client
            .post(format!("{}/payment_intents", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await?;
        Self::read_intent(response).await
    }

    pub async fn retrieve_intent(&self, id: &str) -> Result<PaymentIntent, PaymentError> {
        let response = self
            .client
            .get(format!("{}/payment_intents/{id}", self.api_base))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        Self::read_intent(response).await
    }

    async fn read_intent(response: reqwest::Response) -> Result<PaymentIntent, PaymentError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let message = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|body| body.pointer("/error/message").and_then(Value::as_str).map(String::from))
            .unwrap_or_else(|| status.to_string());
        Err(PaymentError::Processor {
            status: status.as_u16(),
            message,
        })
    }
}
