//! Subscription reconciliation between the local ledger and the gateway.
//!
//! The gateway owns subscription state; local rows are a cache that is
//! overwritten whenever fresh gateway data is seen. Creation has to cope with
//! the gateway occasionally rejecting an immediate start as "in the past",
//! which is retried with explicit start times a few minutes out.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    domain::{
        LifecycleAction, NewSubscription, NewSubscriptionPayment, Subscription,
        SubscriptionPaymentRecord, SubscriptionState, SubscriptionStatus, User,
    },
    error::{AppError, Result},
    payments::{
        webhook::{WebhookEvent, WebhookKind},
        CreateCustomer, CreateSubscription, GatewayCustomer, GatewayError, GatewaySubscription,
        Notes, PaymentGateway,
    },
    repository::SubscriptionRepository,
};

/// Ten years of monthly charges.
pub const DEFAULT_TOTAL_COUNT: i64 = 120;

/// Start offsets for each creation attempt; `None` means start immediately.
const START_OFFSETS_MINUTES: [Option<i64>; 3] = [None, Some(5), Some(10)];

const EXPIRE_AFTER_DAYS: i64 = 365 * 10;

/// Page size for gateway list calls, which have no server-side filters.
const GATEWAY_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSubscriptionInput {
    #[validate(length(min = 1, message = "Plan ID is required"))]
    pub plan_id: String,
    /// Minor currency units per cycle.
    #[validate(range(min = 100, message = "Amount must be at least 1.00"))]
    pub amount: i64,
    #[validate(length(min = 1, message = "Customer name is required"))]
    pub customer_name: String,
    #[validate(email(message = "A valid customer email is required"))]
    pub customer_email: String,
    pub customer_phone: Option<String>,
    #[validate(range(min = 1, max = 1200, message = "Total count must be between 1 and 1200"))]
    pub total_count: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerLookup {
    Id(String),
    Email(String),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SyncOutcome {
    Inserted,
    Updated,
    Error { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncEntry {
    pub subscription_id: String,
    #[serde(flatten)]
    pub outcome: SyncOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub customer: GatewayCustomer,
    pub entries: Vec<SyncEntry>,
}

impl SyncReport {
    pub fn failures(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, SyncOutcome::Error { .. }))
            .count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionHistory {
    pub subscriptions: Vec<Subscription>,
    pub payments: Vec<SubscriptionPaymentRecord>,
    pub active_subscriptions: usize,
    /// Minor units across active-like subscriptions.
    pub total_monthly_amount: i64,
    pub total_subscription_payments: i64,
}

impl SubscriptionHistory {
    /// Dashboard aggregates from the local ledger; needs no gateway.
    pub async fn load(subscriptions: &dyn SubscriptionRepository, user: &User) -> Result<Self> {
        let subscriptions_list = subscriptions.find_by_user(user.id).await?;
        let payments = subscriptions.list_payments_for_user(user.id).await?;

        let active: Vec<&Subscription> = subscriptions_list
            .iter()
            .filter(|s| s.status.is_active_like())
            .collect();

        Ok(Self {
            active_subscriptions: active.len(),
            total_monthly_amount: active.iter().map(|s| s.amount).sum(),
            total_subscription_payments: payments.iter().map(|p| p.payment.amount).sum(),
            subscriptions: subscriptions_list,
            payments,
        })
    }
}

/// Builds the gateway-owned state from a gateway subscription object.
/// Unknown statuses are rejected rather than written.
pub fn state_from_gateway(remote: &GatewaySubscription, fallback_total: i64) -> Result<SubscriptionState> {
    let status = SubscriptionStatus::from_str(&remote.status).ok_or_else(|| {
        AppError::Gateway(format!(
            "Subscription {} reported unrecognized status '{}'",
            remote.id, remote.status
        ))
    })?;

    let total_count = remote_total(remote).unwrap_or(fallback_total);
    let state = SubscriptionState::new(
        status,
        remote.current_start,
        remote.current_end,
        remote.charge_at,
        total_count,
        remote.paid_count,
    );

    if let Some(remaining) = remote.remaining_count {
        if remaining != state.remaining_count {
            tracing::debug!(
                "Gateway remaining_count {} for {} differs from derived {}",
                remaining,
                remote.id,
                state.remaining_count
            );
        }
    }

    Ok(state)
}

fn remote_total(remote: &GatewaySubscription) -> Option<i64> {
    remote
        .total_count
        .or_else(|| remote.remaining_count.map(|r| r + remote.paid_count))
}

pub struct SubscriptionService {
    gateway: Arc<dyn PaymentGateway>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    currency: String,
}

impl SubscriptionService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            subscriptions,
            currency: currency.into(),
        }
    }

    /// Customer id on file for this user and email, without touching the gateway.
    pub async fn known_customer_id(&self, user: &User, email: &str) -> Result<Option<String>> {
        self.subscriptions.find_customer_id(user.id, email).await
    }

    /// Returns a gateway customer id usable for a new subscription, reusing
    /// a previously seen customer when it still exists upstream and clearing
    /// out its stuck subscriptions first.
    pub async fn resolve_customer(
        &self,
        user: &User,
        name: &str,
        email: &str,
        phone: Option<&str>,
    ) -> Result<String> {
        if let Some(customer_id) = self.subscriptions.find_customer_id(user.id, email).await? {
            match self.gateway.fetch_customer(&customer_id).await {
                Ok(customer) => {
                    tracing::info!("Reusing gateway customer {} for user {}", customer.id, user.id);
                    self.cleanup_stale_subscriptions(&customer.id).await?;
                    return Ok(customer.id);
                }
                Err(e) => {
                    tracing::warn!(
                        "Known customer {} could not be fetched ({}); creating a new one",
                        customer_id,
                        e
                    );
                }
            }
        }

        let mut notes = Notes::new();
        notes.insert("purpose".to_string(), "Monthly Donation Subscriber".to_string());
        notes.insert("user_id".to_string(), user.id.to_string());

        let customer = self
            .gateway
            .create_customer(CreateCustomer {
                name: name.to_string(),
                email: email.to_string(),
                phone: phone.map(str::to_string),
                notes,
            })
            .await?;

        tracing::info!("Created gateway customer {} for user {}", customer.id, user.id);
        Ok(customer.id)
    }

    /// Cancels upstream and removes locally every `created`/`halted`
    /// subscription of the customer. Returns the cleaned gateway ids.
    async fn cleanup_stale_subscriptions(&self, customer_id: &str) -> Result<Vec<String>> {
        let all = self.gateway.list_subscriptions(GATEWAY_PAGE_SIZE).await?;
        let mut cleaned = Vec::new();

        for sub in all
            .iter()
            .filter(|s| s.customer_id.as_deref() == Some(customer_id))
        {
            let stale = SubscriptionStatus::from_str(&sub.status)
                .map(|s| s.is_stale())
                .unwrap_or(false);
            if !stale {
                continue;
            }

            match self.gateway.cancel_subscription(&sub.id, false).await {
                Ok(_) => {
                    // Not transactional with the cancel; a leftover row is
                    // corrected by the next reconciliation.
                    self.subscriptions.delete_by_gateway_id(&sub.id).await?;
                    tracing::info!("Cleaned up stale subscription {} ({})", sub.id, sub.status);
                    cleaned.push(sub.id.clone());
                }
                Err(e) => {
                    tracing::warn!("Failed to cancel stale subscription {}: {}", sub.id, e);
                }
            }
        }

        Ok(cleaned)
    }

    pub async fn create_subscription(
        &self,
        user: &User,
        input: CreateSubscriptionInput,
    ) -> Result<Subscription> {
        input
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let total_count = input.total_count.unwrap_or(DEFAULT_TOTAL_COUNT);
        let customer_id = self
            .resolve_customer(
                user,
                &input.customer_name,
                &input.customer_email,
                input.customer_phone.as_deref(),
            )
            .await?;

        let mut notes = Notes::new();
        notes.insert("subscriber_name".to_string(), input.customer_name.clone());
        notes.insert("subscriber_email".to_string(), input.customer_email.clone());
        notes.insert("purpose".to_string(), "Monthly Recurring Donation".to_string());

        let remote = self
            .create_with_timing_retry(&input.plan_id, &customer_id, total_count, notes)
            .await?;

        let status = SubscriptionStatus::from_str(&remote.status).ok_or_else(|| {
            AppError::Gateway(format!(
                "Created subscription {} has unrecognized status '{}'",
                remote.id, remote.status
            ))
        })?;

        let new = NewSubscription {
            user_id: Some(user.id),
            gateway_subscription_id: remote.id.clone(),
            gateway_plan_id: input.plan_id,
            gateway_customer_id: customer_id,
            amount: input.amount,
            currency: self.currency.clone(),
            subscriber_name: input.customer_name,
            subscriber_email: input.customer_email,
            subscriber_phone: input.customer_phone,
            state: SubscriptionState::new(
                status,
                remote.current_start,
                remote.current_end,
                remote.charge_at,
                total_count,
                0,
            ),
            short_url: remote.short_url.clone(),
        };

        // The gateway subscription exists at this point; a failed insert is
        // surfaced but not compensated upstream.
        self.subscriptions.create(new).await.map_err(|e| {
            tracing::error!(
                "Gateway subscription {} created but local insert failed: {}",
                remote.id,
                e
            );
            e
        })
    }

    async fn create_with_timing_retry(
        &self,
        plan_id: &str,
        customer_id: &str,
        total_count: i64,
        notes: Notes,
    ) -> Result<GatewaySubscription> {
        let mut last_timing_error = None;

        for (attempt, offset) in START_OFFSETS_MINUTES.iter().enumerate() {
            let now = Utc::now();
            let request = CreateSubscription {
                plan_id: plan_id.to_string(),
                customer_id: customer_id.to_string(),
                total_count,
                quantity: 1,
                expire_by: (now + Duration::days(EXPIRE_AFTER_DAYS)).timestamp(),
                start_at: offset.map(|m| (now + Duration::minutes(m)).timestamp()),
                notes: notes.clone(),
            };

            match self.gateway.create_subscription(request).await {
                Ok(subscription) => {
                    tracing::info!(
                        "Created gateway subscription {} on attempt {}",
                        subscription.id,
                        attempt + 1
                    );
                    return Ok(subscription);
                }
                Err(GatewayError::Timing(msg)) => {
                    tracing::warn!("Subscription attempt {} rejected start time: {}", attempt + 1, msg);
                    last_timing_error = Some(msg);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::Timing(format!(
            "Subscription creation failed after {} attempts: {}",
            START_OFFSETS_MINUTES.len(),
            last_timing_error.unwrap_or_default()
        )))
    }

    async fn owned_subscription(&self, user: &User, gateway_id: &str) -> Result<Subscription> {
        match self.subscriptions.find_by_gateway_id(gateway_id).await? {
            Some(sub) if sub.user_id == Some(user.id) => Ok(sub),
            _ => Err(AppError::NotOwner(format!(
                "user {} does not own subscription {}",
                user.id, gateway_id
            ))),
        }
    }

    /// Overwrites the gateway-owned fields of `local`. Writes nothing when
    /// the state is unchanged.
    async fn apply_remote(&self, local: &Subscription, remote: &GatewaySubscription) -> Result<Subscription> {
        let state = state_from_gateway(remote, local.total_count)?;
        if state == local.state() {
            return Ok(local.clone());
        }
        self.subscriptions
            .update_state(&local.gateway_subscription_id, &state)
            .await
    }

    /// Refreshes a subscription the user owns from the gateway.
    pub async fn reconcile(&self, user: &User, gateway_id: &str) -> Result<Subscription> {
        let local = self.owned_subscription(user, gateway_id).await?;
        let remote = self.gateway.fetch_subscription(gateway_id).await?;
        self.apply_remote(&local, &remote).await
    }

    pub async fn apply_action(
        &self,
        user: &User,
        gateway_id: &str,
        action: LifecycleAction,
        cancel_at_cycle_end: bool,
    ) -> Result<Subscription> {
        let local = self.owned_subscription(user, gateway_id).await?;

        let remote = match action {
            LifecycleAction::Cancel => {
                self.gateway
                    .cancel_subscription(gateway_id, cancel_at_cycle_end)
                    .await?
            }
            LifecycleAction::Pause => self.gateway.pause_subscription(gateway_id).await?,
            LifecycleAction::Resume => self.gateway.resume_subscription(gateway_id).await?,
        };

        tracing::info!(
            "User {} applied {} to subscription {}; gateway status {}",
            user.id,
            action.as_str(),
            gateway_id,
            remote.status
        );
        self.apply_remote(&local, &remote).await
    }

    /// Pulls every gateway subscription of a customer into the local ledger.
    /// Non-admins may only sync the customer carrying their own email.
    pub async fn sync_customer(&self, user: &User, lookup: CustomerLookup) -> Result<SyncReport> {
        let customer = match lookup {
            CustomerLookup::Id(id) => {
                if id.trim().is_empty() {
                    return Err(AppError::Validation("Customer ID or email is required".to_string()));
                }
                self.gateway.fetch_customer(&id).await?
            }
            CustomerLookup::Email(email) => {
                if email.trim().is_empty() {
                    return Err(AppError::Validation("Customer ID or email is required".to_string()));
                }
                self.gateway
                    .list_customers(GATEWAY_PAGE_SIZE)
                    .await?
                    .into_iter()
                    .find(|c| {
                        c.email
                            .as_deref()
                            .map(|e| e.eq_ignore_ascii_case(&email))
                            .unwrap_or(false)
                    })
                    .ok_or_else(|| AppError::NotFound("Customer not found in gateway".to_string()))?
            }
        };

        let customer_email = customer.email.clone().unwrap_or_default();
        if !user.is_admin() && !customer_email.eq_ignore_ascii_case(&user.email) {
            return Err(AppError::NotOwner(format!(
                "user {} cannot sync customer {}",
                user.id, customer.id
            )));
        }

        let remote_subs: Vec<GatewaySubscription> = self
            .gateway
            .list_subscriptions(GATEWAY_PAGE_SIZE)
            .await?
            .into_iter()
            .filter(|s| s.customer_id.as_deref() == Some(customer.id.as_str()))
            .collect();

        let mut entries = Vec::with_capacity(remote_subs.len());
        for remote in &remote_subs {
            let outcome = match self.sync_one(user.id, &customer, remote).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("Error syncing subscription {}: {}", remote.id, e);
                    SyncOutcome::Error { error: e.to_string() }
                }
            };
            entries.push(SyncEntry {
                subscription_id: remote.id.clone(),
                outcome,
            });
        }

        tracing::info!(
            "Synced {} subscriptions for customer {}",
            entries.len(),
            customer.id
        );
        Ok(SyncReport { customer, entries })
    }

    async fn sync_one(
        &self,
        owner: Uuid,
        customer: &GatewayCustomer,
        remote: &GatewaySubscription,
    ) -> Result<SyncOutcome> {
        match self.subscriptions.find_by_gateway_id(&remote.id).await? {
            Some(local) => {
                self.apply_remote(&local, remote).await?;
                Ok(SyncOutcome::Updated)
            }
            None => {
                let state = state_from_gateway(remote, remote.paid_count)?;
                let (amount, currency) = match &remote.plan {
                    Some(plan) => (plan.item.amount, plan.item.currency.clone()),
                    None => (0, self.currency.clone()),
                };
                self.subscriptions
                    .create(NewSubscription {
                        user_id: Some(owner),
                        gateway_subscription_id: remote.id.clone(),
                        gateway_plan_id: remote.plan_id.clone(),
                        gateway_customer_id: customer.id.clone(),
                        amount,
                        currency,
                        subscriber_name: customer.name.clone().unwrap_or_default(),
                        subscriber_email: customer.email.clone().unwrap_or_default(),
                        subscriber_phone: customer.contact.clone(),
                        state,
                        short_url: remote.short_url.clone(),
                    })
                    .await?;
                Ok(SyncOutcome::Inserted)
            }
        }
    }

    /// Applies a verified gateway webhook. Events for subscriptions that
    /// are not in the local ledger are ignored.
    pub async fn handle_webhook_event(&self, event: &WebhookEvent) -> Result<()> {
        let kind = event.kind();
        if kind == WebhookKind::Ignored {
            tracing::debug!("Ignoring webhook event {}", event.event);
            return Ok(());
        }

        let Some(remote) = event.subscription() else {
            tracing::warn!("Webhook {} carried no subscription entity", event.event);
            return Ok(());
        };

        let Some(local) = self.subscriptions.find_by_gateway_id(&remote.id).await? else {
            tracing::warn!("Webhook {} for unknown subscription {}", event.event, remote.id);
            return Ok(());
        };

        // An unrecognized status is not written, but a reported charge still is.
        let updated = if SubscriptionStatus::from_str(&remote.status).is_some() {
            self.apply_remote(&local, remote).await?
        } else {
            tracing::warn!(
                "Webhook {} reported unrecognized status '{}' for {}; keeping local state",
                event.event,
                remote.status,
                remote.id
            );
            local
        };

        if kind == WebhookKind::SubscriptionCharged {
            if let Some(payment) = event.payment() {
                if self
                    .subscriptions
                    .find_payment_by_gateway_id(&payment.id)
                    .await?
                    .is_none()
                {
                    self.subscriptions
                        .record_payment(NewSubscriptionPayment {
                            subscription_id: updated.id,
                            gateway_payment_id: payment.id.clone(),
                            amount: payment.amount,
                            status: payment.status.clone(),
                            period_start: remote.current_start,
                            period_end: remote.current_end,
                            paid_at: payment
                                .created_at
                                .and_then(|ts| DateTime::from_timestamp(ts, 0)),
                        })
                        .await?;
                    tracing::info!("Recorded charge {} for subscription {}", payment.id, remote.id);
                }
            }
        }

        Ok(())
    }
}
