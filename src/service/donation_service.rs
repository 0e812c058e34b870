use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::{
    domain::{Donation, DonorDetails, NewDonation, User},
    error::{AppError, Result},
    payments::{
        signature, CreateOrder, CreatePlan, GatewayOrder, GatewayPlan, Notes, PaymentGateway,
        PlanPeriod,
    },
    repository::DonationRepository,
};

const PAYMENT_METHOD: &str = "razorpay";

/// Converts a major-unit amount to the gateway's minor units.
pub fn to_minor_units(amount: i64) -> Result<i64> {
    amount
        .checked_mul(100)
        .ok_or_else(|| AppError::Validation(format!("Amount {} is too large", amount)))
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OrderInput {
    /// Major currency units.
    #[validate(range(min = 1, message = "Amount must be at least 1"))]
    pub amount: i64,
    pub currency: Option<String>,
    pub donor_name: Option<String>,
    #[validate(email(message = "Invalid donor email"))]
    pub donor_email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyPaymentInput {
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub payment_id: String,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub donor: DonorDetails,
}

#[derive(Debug, Clone, Serialize)]
pub struct DonationHistory {
    pub donations: Vec<Donation>,
    pub total_donations: usize,
    /// Minor units.
    pub total_amount: i64,
}

impl DonationHistory {
    /// Ledger read; needs no gateway.
    pub async fn load(donations: &dyn DonationRepository, user: &User) -> Result<Self> {
        let donations = donations.find_by_user(user.id).await?;
        Ok(Self {
            total_donations: donations.len(),
            total_amount: donations.iter().map(|d| d.amount).sum(),
            donations,
        })
    }
}

pub struct DonationService {
    gateway: Arc<dyn PaymentGateway>,
    donations: Arc<dyn DonationRepository>,
    key_secret: String,
    currency: String,
}

impl DonationService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        donations: Arc<dyn DonationRepository>,
        key_secret: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            donations,
            key_secret: key_secret.into(),
            currency: currency.into(),
        }
    }

    pub async fn create_order(&self, input: OrderInput) -> Result<GatewayOrder> {
        input
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;
        let amount = to_minor_units(input.amount)?;

        let mut notes = Notes::new();
        notes.insert(
            "donor_name".to_string(),
            input
                .donor_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "Anonymous".to_string()),
        );
        notes.insert("donor_email".to_string(), input.donor_email.unwrap_or_default());

        let order = self
            .gateway
            .create_order(CreateOrder {
                amount,
                currency: input.currency.unwrap_or_else(|| self.currency.clone()),
                receipt: format!("receipt_{}", Utc::now().timestamp_millis()),
                notes,
            })
            .await?;

        tracing::info!("Created order {} for {} minor units", order.id, order.amount);
        Ok(order)
    }

    pub async fn create_plan(&self, amount: i64, interval: Option<&str>) -> Result<GatewayPlan> {
        if amount < 1 {
            return Err(AppError::Validation("Amount must be at least 1".to_string()));
        }
        let minor_amount = to_minor_units(amount)?;

        let period = match interval {
            None => PlanPeriod::Monthly,
            Some(s) => PlanPeriod::from_str(s).ok_or_else(|| {
                AppError::Validation(format!(
                    "Invalid interval '{}'; expected daily, weekly, monthly or yearly",
                    s
                ))
            })?,
        };

        let mut notes = Notes::new();
        notes.insert("purpose".to_string(), "Monthly Donation".to_string());

        let plan = self
            .gateway
            .create_plan(CreatePlan {
                period,
                interval: 1,
                amount: minor_amount,
                currency: self.currency.clone(),
                item_name: format!("Monthly Donation ₹{}", amount),
                description: "Recurring donation".to_string(),
                notes,
            })
            .await?;

        tracing::info!("Created plan {} ({})", plan.id, plan.period);
        Ok(plan)
    }

    /// Checks the checkout signature and records the donation. Verifying the
    /// same payment twice returns the row recorded the first time.
    pub async fn verify_payment(&self, user: Option<&User>, input: VerifyPaymentInput) -> Result<Donation> {
        if input.order_id.is_empty() || input.payment_id.is_empty() || input.signature.is_empty() {
            return Err(AppError::Validation(
                "order_id, payment_id and signature are required".to_string(),
            ));
        }

        if !signature::verify_payment_signature(
            &self.key_secret,
            &input.order_id,
            &input.payment_id,
            &input.signature,
        ) {
            tracing::warn!("Signature mismatch for payment {}", input.payment_id);
            return Err(AppError::Verification);
        }

        if let Some(existing) = self.donations.find_by_payment_id(&input.payment_id).await? {
            return Ok(existing);
        }

        let order = self.gateway.fetch_order(&input.order_id).await?;
        let donor = input.donor;

        let donation = self
            .donations
            .create(NewDonation {
                user_id: user.map(|u| u.id),
                gateway_order_id: input.order_id,
                gateway_payment_id: input.payment_id,
                amount: order.amount,
                currency: order.currency,
                donor_name: donor
                    .name
                    .filter(|n| !n.trim().is_empty())
                    .or_else(|| user.map(|u| u.display_name.clone()))
                    .unwrap_or_else(|| "Anonymous".to_string()),
                donor_email: donor.email.or_else(|| user.map(|u| u.email.clone())),
                donor_phone: donor.phone,
                payment_method: PAYMENT_METHOD.to_string(),
            })
            .await?;

        tracing::info!("Recorded donation {} ({})", donation.id, donation.gateway_payment_id);
        Ok(donation)
    }

}
