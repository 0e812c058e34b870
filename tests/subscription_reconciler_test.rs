mod common;

use chrono::Utc;
use patron::{
    domain::{LifecycleAction, SubscriptionStatus},
    error::AppError,
    payments::{
        fake::GatewayCall,
        webhook::WebhookEvent,
        GatewayError,
    },
    repository::SubscriptionRepository,
    service::subscription_service::{
        CreateSubscriptionInput, CustomerLookup, SubscriptionHistory, SyncOutcome,
    },
};

fn input(email: &str) -> CreateSubscriptionInput {
    CreateSubscriptionInput {
        plan_id: "plan_00000000000001".to_string(),
        amount: 50_000,
        customer_name: "Asha Rao".to_string(),
        customer_email: email.to_string(),
        customer_phone: Some("9999999999".to_string()),
        total_count: None,
    }
}

fn timing_error() -> GatewayError {
    GatewayError::Timing("start_at cannot be lesser than the current time".to_string())
}

fn is_create(call: &GatewayCall) -> bool {
    matches!(call, GatewayCall::CreateSubscription { .. })
}

#[tokio::test]
async fn test_create_then_reconcile() -> anyhow::Result<()> {
    let ctx = common::test_context().await?;
    let user = common::create_user(&ctx.pool, "u1", "asha@example.com").await?;
    let service = ctx.services.subscriptions()?;

    let created = service.create_subscription(&user, input("asha@example.com")).await?;
    assert_eq!(created.status, SubscriptionStatus::Created);
    assert_eq!(created.total_count, 120);
    assert_eq!(created.paid_count, 0);
    assert_eq!(created.remaining_count, 120);
    assert_eq!(created.amount, 50_000);
    assert!(created.short_url.is_some());
    assert_eq!(created.user_id, Some(user.id));

    ctx.gateway.update_subscription(&created.gateway_subscription_id, |s| {
        s.status = "active".to_string();
        s.paid_count = 1;
        s.current_start = Some(1_735_689_600);
        s.current_end = Some(1_738_368_000);
        s.charge_at = Some(1_738_368_000);
    }).await;

    let reconciled = service.reconcile(&user, &created.gateway_subscription_id).await?;
    assert_eq!(reconciled.status, SubscriptionStatus::Active);
    assert_eq!(reconciled.paid_count, 1);
    assert_eq!(reconciled.remaining_count, 119);
    assert_eq!(reconciled.next_charge_at, Some(1_738_368_000));

    Ok(())
}

#[tokio::test]
async fn test_monthly_plan_to_subscription_end_to_end() -> anyhow::Result<()> {
    let ctx = common::test_context().await?;
    let user = common::create_user(&ctx.pool, "u1", "a@b.com").await?;

    let plan = ctx.services.donations()?.create_plan(500, Some("monthly")).await?;
    assert_eq!(plan.item.amount, 50_000);

    let created = ctx.services.subscriptions()?
        .create_subscription(&user, CreateSubscriptionInput {
            plan_id: plan.id.clone(),
            amount: plan.item.amount,
            customer_name: "A".to_string(),
            customer_email: "a@b.com".to_string(),
            customer_phone: None,
            total_count: Some(120),
        })
        .await?;

    assert_eq!(
        ctx.gateway.count_calls(|c| matches!(c, GatewayCall::CreateCustomer { .. })).await,
        1
    );
    assert_eq!(ctx.gateway.count_calls(is_create).await, 1);
    assert_eq!(created.gateway_plan_id, plan.id);
    assert_eq!(created.total_count, 120);
    assert_eq!(created.remaining_count, 120);
    assert_eq!(created.paid_count, 0);

    Ok(())
}

#[tokio::test]
async fn test_timing_retry_pushes_start_forward() -> anyhow::Result<()> {
    let ctx = common::test_context().await?;
    let user = common::create_user(&ctx.pool, "u1", "asha@example.com").await?;
    let service = ctx.services.subscriptions()?;

    ctx.gateway.fail_next_create_subscription(timing_error()).await;
    ctx.gateway.fail_next_create_subscription(timing_error()).await;

    let before = Utc::now().timestamp();
    let created = service.create_subscription(&user, input("asha@example.com")).await?;
    let after = Utc::now().timestamp();
    assert_eq!(created.status, SubscriptionStatus::Created);

    let starts: Vec<Option<i64>> = ctx.gateway.calls().await
        .into_iter()
        .filter_map(|c| match c {
            GatewayCall::CreateSubscription { start_at, .. } => Some(start_at),
            _ => None,
        })
        .collect();
    assert_eq!(starts.len(), 3);
    assert_eq!(starts[0], None);

    let second = starts[1].unwrap_or_default();
    assert!(second >= before + 300 && second <= after + 300);
    let third = starts[2].unwrap_or_default();
    assert!(third >= before + 600 && third <= after + 600);

    Ok(())
}

#[tokio::test]
async fn test_timing_retry_gives_up_after_three_attempts() -> anyhow::Result<()> {
    let ctx = common::test_context().await?;
    let user = common::create_user(&ctx.pool, "u1", "asha@example.com").await?;
    let service = ctx.services.subscriptions()?;

    for _ in 0..4 {
        ctx.gateway.fail_next_create_subscription(timing_error()).await;
    }

    let result = service.create_subscription(&user, input("asha@example.com")).await;
    assert!(matches!(result, Err(AppError::Timing(_))));
    assert_eq!(ctx.gateway.count_calls(is_create).await, 3);
    assert!(ctx.services.subscription_repo.find_by_user(user.id).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_non_timing_error_is_not_retried() -> anyhow::Result<()> {
    let ctx = common::test_context().await?;
    let user = common::create_user(&ctx.pool, "u1", "asha@example.com").await?;
    let service = ctx.services.subscriptions()?;

    ctx.gateway.fail_next_create_subscription(GatewayError::Rejected {
        code: "BAD_REQUEST_ERROR".to_string(),
        description: "The id provided does not exist".to_string(),
    }).await;

    let result = service.create_subscription(&user, input("asha@example.com")).await;
    assert!(matches!(result, Err(AppError::Gateway(_))));
    assert_eq!(ctx.gateway.count_calls(is_create).await, 1);

    Ok(())
}

#[tokio::test]
async fn test_invalid_input_never_reaches_gateway() -> anyhow::Result<()> {
    let ctx = common::test_context().await?;
    let user = common::create_user(&ctx.pool, "u1", "asha@example.com").await?;
    let service = ctx.services.subscriptions()?;

    let mut bad = input("not-an-email");
    bad.plan_id = String::new();

    let result = service.create_subscription(&user, bad).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
    assert!(ctx.gateway.calls().await.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_ownership_is_checked_before_gateway() -> anyhow::Result<()> {
    let ctx = common::test_context().await?;
    let owner = common::create_user(&ctx.pool, "u1", "asha@example.com").await?;
    let intruder = common::create_user(&ctx.pool, "u2", "ravi@example.com").await?;
    let service = ctx.services.subscriptions()?;

    let created = service.create_subscription(&owner, input("asha@example.com")).await?;
    ctx.gateway.clear_calls().await;

    let fetch = service.reconcile(&intruder, &created.gateway_subscription_id).await;
    assert!(matches!(fetch, Err(AppError::NotOwner(_))));

    let cancel = service
        .apply_action(&intruder, &created.gateway_subscription_id, LifecycleAction::Cancel, false)
        .await;
    assert!(matches!(cancel, Err(AppError::NotOwner(_))));

    let unknown = service.reconcile(&owner, "sub_does_not_exist").await;
    assert!(matches!(unknown, Err(AppError::NotOwner(_))));

    assert!(ctx.gateway.calls().await.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_lifecycle_actions_update_local_status() -> anyhow::Result<()> {
    let ctx = common::test_context().await?;
    let user = common::create_user(&ctx.pool, "u1", "asha@example.com").await?;
    let service = ctx.services.subscriptions()?;

    let created = service.create_subscription(&user, input("asha@example.com")).await?;
    let id = created.gateway_subscription_id.clone();
    ctx.gateway.update_subscription(&id, |s| s.status = "active".to_string()).await;

    let paused = service.apply_action(&user, &id, LifecycleAction::Pause, false).await?;
    assert_eq!(paused.status, SubscriptionStatus::Paused);

    let resumed = service.apply_action(&user, &id, LifecycleAction::Resume, false).await?;
    assert_eq!(resumed.status, SubscriptionStatus::Active);

    let cancelled = service.apply_action(&user, &id, LifecycleAction::Cancel, false).await?;
    assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);
    assert!(ctx.gateway.calls().await.contains(&GatewayCall::CancelSubscription {
        id: id.clone(),
        at_cycle_end: false,
    }));

    Ok(())
}

#[tokio::test]
async fn test_reconcile_is_idempotent() -> anyhow::Result<()> {
    let ctx = common::test_context().await?;
    let user = common::create_user(&ctx.pool, "u1", "asha@example.com").await?;
    let service = ctx.services.subscriptions()?;

    let created = service.create_subscription(&user, input("asha@example.com")).await?;
    let id = created.gateway_subscription_id.clone();
    ctx.gateway.update_subscription(&id, |s| {
        s.status = "active".to_string();
        s.paid_count = 3;
    }).await;

    let first = service.reconcile(&user, &id).await?;
    let second = service.reconcile(&user, &id).await?;
    assert_eq!(first, second);
    assert_eq!(second.remaining_count, second.total_count - second.paid_count);

    Ok(())
}

#[tokio::test]
async fn test_unknown_gateway_status_is_not_written() -> anyhow::Result<()> {
    let ctx = common::test_context().await?;
    let user = common::create_user(&ctx.pool, "u1", "asha@example.com").await?;
    let service = ctx.services.subscriptions()?;

    let created = service.create_subscription(&user, input("asha@example.com")).await?;
    let id = created.gateway_subscription_id.clone();
    ctx.gateway.update_subscription(&id, |s| s.status = "expired".to_string()).await;

    let result = service.reconcile(&user, &id).await;
    assert!(matches!(result, Err(AppError::Gateway(_))));

    let local = ctx.services.subscription_repo.find_by_gateway_id(&id).await?;
    assert_eq!(local.map(|s| s.status), Some(SubscriptionStatus::Created));

    Ok(())
}

#[tokio::test]
async fn test_known_customer_is_reused_and_stale_subscriptions_cleaned() -> anyhow::Result<()> {
    let ctx = common::test_context().await?;
    let user = common::create_user(&ctx.pool, "u1", "asha@example.com").await?;
    let service = ctx.services.subscriptions()?;

    // Never authorized, so it stays in `created`.
    let abandoned = service.create_subscription(&user, input("asha@example.com")).await?;
    let retried = service.create_subscription(&user, input("asha@example.com")).await?;

    assert_eq!(retried.gateway_customer_id, abandoned.gateway_customer_id);
    assert_eq!(ctx.gateway.customers().await.len(), 1);

    let upstream = ctx.gateway.subscription(&abandoned.gateway_subscription_id).await;
    assert_eq!(upstream.map(|s| s.status), Some("cancelled".to_string()));

    let repo = &ctx.services.subscription_repo;
    assert!(repo.find_by_gateway_id(&abandoned.gateway_subscription_id).await?.is_none());
    assert!(repo.find_by_gateway_id(&retried.gateway_subscription_id).await?.is_some());

    Ok(())
}

#[tokio::test]
async fn test_active_subscriptions_survive_customer_reuse() -> anyhow::Result<()> {
    let ctx = common::test_context().await?;
    let user = common::create_user(&ctx.pool, "u1", "asha@example.com").await?;
    let service = ctx.services.subscriptions()?;

    let first = service.create_subscription(&user, input("asha@example.com")).await?;
    ctx.gateway.update_subscription(&first.gateway_subscription_id, |s| {
        s.status = "active".to_string();
    }).await;

    service.create_subscription(&user, input("asha@example.com")).await?;

    let upstream = ctx.gateway.subscription(&first.gateway_subscription_id).await;
    assert_eq!(upstream.map(|s| s.status), Some("active".to_string()));
    assert_eq!(ctx.services.subscription_repo.find_by_user(user.id).await?.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_vanished_customer_is_recreated() -> anyhow::Result<()> {
    let ctx = common::test_context().await?;
    let user = common::create_user(&ctx.pool, "u1", "asha@example.com").await?;
    let service = ctx.services.subscriptions()?;

    let first = service.create_subscription(&user, input("asha@example.com")).await?;
    sqlx::query("UPDATE subscriptions SET gateway_customer_id = 'cust_gone' WHERE gateway_subscription_id = ?")
        .bind(&first.gateway_subscription_id)
        .execute(&ctx.pool)
        .await?;

    let second = service.create_subscription(&user, input("asha@example.com")).await?;
    assert_ne!(second.gateway_customer_id, "cust_gone");
    assert_eq!(ctx.gateway.customers().await.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_bulk_sync_collects_per_item_errors() -> anyhow::Result<()> {
    let ctx = common::test_context().await?;
    let user = common::create_user(&ctx.pool, "u1", "asha@example.com").await?;
    let service = ctx.services.subscriptions()?;

    let customer = ctx.gateway.insert_customer("Asha Rao", "asha@example.com").await;
    let other = ctx.gateway.insert_customer("Ravi", "ravi@example.com").await;
    ctx.gateway.insert_subscription(common::gateway_subscription("sub_a", &customer.id, "active")).await;
    ctx.gateway.insert_subscription(common::gateway_subscription("sub_b", &customer.id, "expired")).await;
    ctx.gateway.insert_subscription(common::gateway_subscription("sub_c", &other.id, "active")).await;

    let report = service
        .sync_customer(&user, CustomerLookup::Email("ASHA@example.com".to_string()))
        .await?;
    assert_eq!(report.customer.id, customer.id);
    assert_eq!(report.entries.len(), 2);
    assert_eq!(report.failures(), 1);

    let a = report.entries.iter().find(|e| e.subscription_id == "sub_a");
    assert_eq!(a.map(|e| e.outcome.clone()), Some(SyncOutcome::Inserted));
    let b = report.entries.iter().find(|e| e.subscription_id == "sub_b");
    assert!(matches!(b.map(|e| &e.outcome), Some(SyncOutcome::Error { .. })));

    let local = ctx.services.subscription_repo.find_by_gateway_id("sub_a").await?;
    let local = local.ok_or_else(|| anyhow::anyhow!("sub_a was not inserted"))?;
    assert_eq!(local.user_id, Some(user.id));
    assert_eq!(local.status, SubscriptionStatus::Active);
    assert_eq!(local.remaining_count, 11);

    ctx.gateway.update_subscription("sub_a", |s| s.paid_count = 2).await;
    let again = service
        .sync_customer(&user, CustomerLookup::Id(customer.id.clone()))
        .await?;
    let a = again.entries.iter().find(|e| e.subscription_id == "sub_a");
    assert_eq!(a.map(|e| e.outcome.clone()), Some(SyncOutcome::Updated));

    let local = ctx.services.subscription_repo.find_by_gateway_id("sub_a").await?;
    assert_eq!(local.map(|s| s.paid_count), Some(2));

    Ok(())
}

#[tokio::test]
async fn test_sync_of_foreign_customer_requires_admin() -> anyhow::Result<()> {
    let ctx = common::test_context().await?;
    let user = common::create_user(&ctx.pool, "u1", "asha@example.com").await?;
    let admin = common::create_admin(&ctx.pool, "admin", "ops@example.com").await?;
    let service = ctx.services.subscriptions()?;

    let other = ctx.gateway.insert_customer("Ravi", "ravi@example.com").await;
    ctx.gateway.insert_subscription(common::gateway_subscription("sub_r", &other.id, "active")).await;

    let denied = service.sync_customer(&user, CustomerLookup::Id(other.id.clone())).await;
    assert!(matches!(denied, Err(AppError::NotOwner(_))));

    let report = service.sync_customer(&admin, CustomerLookup::Id(other.id.clone())).await?;
    assert_eq!(report.failures(), 0);

    let missing = service.sync_customer(&admin, CustomerLookup::Email("nobody@example.com".into())).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_charged_webhook_records_payment_once() -> anyhow::Result<()> {
    let ctx = common::test_context().await?;
    let user = common::create_user(&ctx.pool, "u1", "asha@example.com").await?;
    let service = ctx.services.subscriptions()?;

    let created = service.create_subscription(&user, input("asha@example.com")).await?;
    let body = serde_json::json!({
        "entity": "event",
        "event": "subscription.charged",
        "payload": {
            "subscription": { "entity": {
                "id": created.gateway_subscription_id,
                "plan_id": "plan_00000000000001",
                "customer_id": created.gateway_customer_id,
                "status": "active",
                "current_start": 1_735_689_600,
                "current_end": 1_738_368_000,
                "charge_at": 1_738_368_000,
                "total_count": 120,
                "paid_count": 1,
                "remaining_count": 119
            }},
            "payment": { "entity": {
                "id": "pay_00000000000042",
                "amount": 50_000,
                "status": "captured"
            }}
        }
    });
    let event: WebhookEvent = serde_json::from_value(body)?;

    service.handle_webhook_event(&event).await?;
    service.handle_webhook_event(&event).await?;

    let history = SubscriptionHistory::load(ctx.services.subscription_repo.as_ref(), &user).await?;
    assert_eq!(history.payments.len(), 1);
    assert_eq!(history.total_subscription_payments, 50_000);
    assert_eq!(history.active_subscriptions, 1);
    assert_eq!(history.total_monthly_amount, 50_000);
    assert_eq!(history.subscriptions[0].paid_count, 1);

    Ok(())
}

#[tokio::test]
async fn test_charge_recorded_when_status_is_unrecognized() -> anyhow::Result<()> {
    let ctx = common::test_context().await?;
    let user = common::create_user(&ctx.pool, "u1", "asha@example.com").await?;
    let service = ctx.services.subscriptions()?;

    let created = service.create_subscription(&user, input("asha@example.com")).await?;
    let body = serde_json::json!({
        "entity": "event",
        "event": "subscription.charged",
        "payload": {
            "subscription": { "entity": {
                "id": created.gateway_subscription_id,
                "plan_id": "plan_00000000000001",
                "status": "completed",
                "total_count": 120,
                "paid_count": 120
            }},
            "payment": { "entity": {
                "id": "pay_final",
                "amount": 50_000,
                "status": "captured",
                "created_at": 1_738_368_000
            }}
        }
    });
    let event: WebhookEvent = serde_json::from_value(body)?;

    service.handle_webhook_event(&event).await?;

    let history = SubscriptionHistory::load(ctx.services.subscription_repo.as_ref(), &user).await?;
    assert_eq!(history.payments.len(), 1);
    assert_eq!(history.payments[0].payment.gateway_payment_id, "pay_final");
    assert_eq!(history.payments[0].payment.payment_date.timestamp(), 1_738_368_000);

    // The unrecognized status is not written over the ledger.
    let local = ctx.services.subscription_repo
        .find_by_gateway_id(&created.gateway_subscription_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("subscription missing"))?;
    assert_eq!(local.status, SubscriptionStatus::Created);
    assert_eq!(local.paid_count, 0);

    Ok(())
}

#[tokio::test]
async fn test_state_change_webhook_with_unrecognized_status_is_accepted() -> anyhow::Result<()> {
    let ctx = common::test_context().await?;
    let user = common::create_user(&ctx.pool, "u1", "asha@example.com").await?;
    let service = ctx.services.subscriptions()?;

    let created = service.create_subscription(&user, input("asha@example.com")).await?;
    let body = serde_json::json!({
        "event": "subscription.pending",
        "payload": {
            "subscription": { "entity": {
                "id": created.gateway_subscription_id,
                "plan_id": "plan_00000000000001",
                "status": "pending",
                "paid_count": 0
            }}
        }
    });
    let event: WebhookEvent = serde_json::from_value(body)?;

    service.handle_webhook_event(&event).await?;
    let history = SubscriptionHistory::load(ctx.services.subscription_repo.as_ref(), &user).await?;
    assert!(history.payments.is_empty());

    Ok(())
}
