use async_trait::async_trait;

use super::ServiceError;

/// Decides whether a payment confirmation presented for a checkout is acceptable.
#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    async fn verify(
        &self,
        checkout_id: &str,
        status_token: &str,
        payment_details: Option<&serde_json::Value>,
    ) -> Result<(), ServiceError>;
}

pub const PAID_TOKEN: &str = "paid";

/// Trusts the caller's claim that the payment went through. Nothing is checked
/// against a payment provider.
#[derive(Debug, Default, Clone)]
pub struct CallerAssertedPayment;

#[async_trait]
impl PaymentVerifier for CallerAssertedPayment {
    async fn verify(
        &self,
        checkout_id: &str,
        status_token: &str,
        _payment_details: Option<&serde_json::Value>,
    ) -> Result<(), ServiceError> {
        if status_token != PAID_TOKEN {
            return Err(ServiceError::validation("Invalid payment status"));
        }

        tracing::warn!(
            checkout_id = %checkout_id,
            "Accepting caller-asserted payment confirmation without gateway verification"
        );
        Ok(())
    }
}
