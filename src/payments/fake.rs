//! In-memory gateway for tests. Records every call so tests can assert on
//! what reached the gateway, and lets a test script failures for
//! subscription creation.

use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;

use super::{
    CreateCustomer, CreateOrder, CreatePlan, CreateSubscription, GatewayCustomer, GatewayError,
    GatewayOrder, GatewayPlan, GatewayResult, GatewaySubscription, PaymentGateway, PlanItem,
};

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    CreateOrder { amount: i64 },
    FetchOrder(String),
    CreatePlan { amount: i64 },
    CreateCustomer { email: String },
    FetchCustomer(String),
    ListCustomers,
    CreateSubscription { plan_id: String, customer_id: String, start_at: Option<i64> },
    FetchSubscription(String),
    CancelSubscription { id: String, at_cycle_end: bool },
    PauseSubscription(String),
    ResumeSubscription(String),
    ListSubscriptions,
}

#[derive(Default)]
struct FakeState {
    next_id: u64,
    orders: Vec<GatewayOrder>,
    plans: Vec<GatewayPlan>,
    customers: Vec<GatewayCustomer>,
    subscriptions: Vec<GatewaySubscription>,
    create_subscription_failures: VecDeque<GatewayError>,
    calls: Vec<GatewayCall>,
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}_{:014}", prefix, self.next_id)
    }

    fn subscription_mut(&mut self, id: &str) -> GatewayResult<&mut GatewaySubscription> {
        self.subscriptions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| GatewayError::NotFound(format!("subscription {} does not exist", id)))
    }
}

#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    pub async fn count_calls(&self, matcher: impl Fn(&GatewayCall) -> bool) -> usize {
        self.state.lock().await.calls.iter().filter(|c| matcher(c)).count()
    }

    /// Queue an error for the next `create_subscription` call; queued errors
    /// are consumed in order before creation succeeds again.
    pub async fn fail_next_create_subscription(&self, error: GatewayError) {
        self.state.lock().await.create_subscription_failures.push_back(error);
    }

    pub async fn insert_customer(&self, name: &str, email: &str) -> GatewayCustomer {
        let mut state = self.state.lock().await;
        let customer = GatewayCustomer {
            id: state.next_id("cust"),
            name: Some(name.to_string()),
            email: Some(email.to_string()),
            contact: None,
        };
        state.customers.push(customer.clone());
        customer
    }

    pub async fn insert_subscription(&self, subscription: GatewaySubscription) {
        self.state.lock().await.subscriptions.push(subscription);
    }

    /// Mutate a stored subscription in place, simulating a gateway-side change.
    pub async fn update_subscription(&self, id: &str, f: impl FnOnce(&mut GatewaySubscription)) {
        let mut state = self.state.lock().await;
        if let Ok(sub) = state.subscription_mut(id) {
            f(sub);
        }
    }

    pub async fn subscription(&self, id: &str) -> Option<GatewaySubscription> {
        self.state.lock().await.subscriptions.iter().find(|s| s.id == id).cloned()
    }

    pub async fn customers(&self) -> Vec<GatewayCustomer> {
        self.state.lock().await.customers.clone()
    }

    pub async fn insert_order(&self, amount: i64, currency: &str) -> GatewayOrder {
        let mut state = self.state.lock().await;
        let order = GatewayOrder {
            id: state.next_id("order"),
            amount,
            currency: currency.to_string(),
            receipt: None,
            status: Some("created".to_string()),
        };
        state.orders.push(order.clone());
        order
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(&self, request: CreateOrder) -> GatewayResult<GatewayOrder> {
        let mut state = self.state.lock().await;
        state.calls.push(GatewayCall::CreateOrder { amount: request.amount });
        let order = GatewayOrder {
            id: state.next_id("order"),
            amount: request.amount,
            currency: request.currency,
            receipt: Some(request.receipt),
            status: Some("created".to_string()),
        };
        state.orders.push(order.clone());
        Ok(order)
    }

    async fn fetch_order(&self, order_id: &str) -> GatewayResult<GatewayOrder> {
        let mut state = self.state.lock().await;
        state.calls.push(GatewayCall::FetchOrder(order_id.to_string()));
        state
            .orders
            .iter()
            .find(|o| o.id == order_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("order {} does not exist", order_id)))
    }

    async fn create_plan(&self, request: CreatePlan) -> GatewayResult<GatewayPlan> {
        let mut state = self.state.lock().await;
        state.calls.push(GatewayCall::CreatePlan { amount: request.amount });
        let plan = GatewayPlan {
            id: state.next_id("plan"),
            period: request.period.as_str().to_string(),
            interval: request.interval,
            item: PlanItem {
                name: Some(request.item_name),
                amount: request.amount,
                currency: request.currency,
            },
        };
        state.plans.push(plan.clone());
        Ok(plan)
    }

    async fn create_customer(&self, request: CreateCustomer) -> GatewayResult<GatewayCustomer> {
        let mut state = self.state.lock().await;
        state.calls.push(GatewayCall::CreateCustomer { email: request.email.clone() });
        let customer = GatewayCustomer {
            id: state.next_id("cust"),
            name: Some(request.name),
            email: Some(request.email),
            contact: request.phone,
        };
        state.customers.push(customer.clone());
        Ok(customer)
    }

    async fn fetch_customer(&self, customer_id: &str) -> GatewayResult<GatewayCustomer> {
        let mut state = self.state.lock().await;
        state.calls.push(GatewayCall::FetchCustomer(customer_id.to_string()));
        state
            .customers
            .iter()
            .find(|c| c.id == customer_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("customer {} does not exist", customer_id)))
    }

    async fn list_customers(&self, count: u32) -> GatewayResult<Vec<GatewayCustomer>> {
        let mut state = self.state.lock().await;
        state.calls.push(GatewayCall::ListCustomers);
        Ok(state.customers.iter().take(count as usize).cloned().collect())
    }

    async fn create_subscription(&self, request: CreateSubscription) -> GatewayResult<GatewaySubscription> {
        let mut state = self.state.lock().await;
        state.calls.push(GatewayCall::CreateSubscription {
            plan_id: request.plan_id.clone(),
            customer_id: request.customer_id.clone(),
            start_at: request.start_at,
        });
        if let Some(error) = state.create_subscription_failures.pop_front() {
            return Err(error);
        }

        let id = state.next_id("sub");
        let subscription = GatewaySubscription {
            short_url: Some(format!("https://rzp.io/i/{}", id)),
            id,
            plan_id: request.plan_id,
            customer_id: Some(request.customer_id),
            status: "created".to_string(),
            current_start: None,
            current_end: None,
            charge_at: request.start_at,
            start_at: request.start_at,
            total_count: Some(request.total_count),
            paid_count: 0,
            remaining_count: Some(request.total_count),
            created_at: Some(chrono::Utc::now().timestamp()),
            plan: None,
        };
        state.subscriptions.push(subscription.clone());
        Ok(subscription)
    }

    async fn fetch_subscription(&self, subscription_id: &str) -> GatewayResult<GatewaySubscription> {
        let mut state = self.state.lock().await;
        state.calls.push(GatewayCall::FetchSubscription(subscription_id.to_string()));
        state.subscription_mut(subscription_id).map(|s| s.clone())
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        cancel_at_cycle_end: bool,
    ) -> GatewayResult<GatewaySubscription> {
        let mut state = self.state.lock().await;
        state.calls.push(GatewayCall::CancelSubscription {
            id: subscription_id.to_string(),
            at_cycle_end: cancel_at_cycle_end,
        });
        let sub = state.subscription_mut(subscription_id)?;
        if !cancel_at_cycle_end {
            sub.status = "cancelled".to_string();
            sub.charge_at = None;
        }
        Ok(sub.clone())
    }

    async fn pause_subscription(&self, subscription_id: &str) -> GatewayResult<GatewaySubscription> {
        let mut state = self.state.lock().await;
        state.calls.push(GatewayCall::PauseSubscription(subscription_id.to_string()));
        let sub = state.subscription_mut(subscription_id)?;
        sub.status = "paused".to_string();
        sub.charge_at = None;
        Ok(sub.clone())
    }

    async fn resume_subscription(&self, subscription_id: &str) -> GatewayResult<GatewaySubscription> {
        let mut state = self.state.lock().await;
        state.calls.push(GatewayCall::ResumeSubscription(subscription_id.to_string()));
        let sub = state.subscription_mut(subscription_id)?;
        sub.status = "active".to_string();
        sub.charge_at = sub.current_end;
        Ok(sub.clone())
    }

    async fn list_subscriptions(&self, count: u32) -> GatewayResult<Vec<GatewaySubscription>> {
        let mut state = self.state.lock().await;
        state.calls.push(GatewayCall::ListSubscriptions);
        Ok(state.subscriptions.iter().take(count as usize).cloned().collect())
    }
}
