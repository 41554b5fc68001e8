//! Order builders and lifecycle shortcuts for integration tests.

use chrono::{Days, Utc};
use uuid::Uuid;

use order_ops::database::InMemoryStore;
use order_ops::models::{CustomerTier, NewOrder, Order, OrderStatus, OrderType};
use order_ops::orchestration::{OrderOpsSystem, PaymentConfirmation, StatusUpdate};

/// Builder for checkout payloads
#[derive(Debug, Clone)]
pub struct OrderBuilder {
    new_order: NewOrder,
}

impl Default for OrderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderBuilder {
    pub fn new() -> Self {
        Self {
            new_order: NewOrder {
                customer_id: format!("cust_{}", Uuid::new_v4().simple()),
                customer_tier: CustomerTier::Standard,
                total_amount: 250.0,
                order_type: OrderType::Standard,
                rush_order: false,
                group_order: false,
                party_size: 0,
                event_date: None,
            },
        }
    }

    pub fn total(mut self, total: f64) -> Self {
        self.new_order.total_amount = total;
        self
    }

    pub fn vip(mut self) -> Self {
        self.new_order.customer_tier = CustomerTier::Vip;
        self
    }

    pub fn rush(mut self) -> Self {
        self.new_order.rush_order = true;
        self
    }

    pub fn order_type(mut self, order_type: OrderType) -> Self {
        self.new_order.order_type = order_type;
        self
    }

    pub fn wedding(mut self, party_size: i32) -> Self {
        self.new_order.order_type = OrderType::WeddingParty;
        self.new_order.group_order = true;
        self.new_order.party_size = party_size;
        self
    }

    pub fn event_in_days(mut self, days: u64) -> Self {
        self.new_order.event_date = Some(Utc::now().date_naive() + Days::new(days));
        self
    }

    pub fn build(self) -> NewOrder {
        self.new_order
    }

    pub async fn create(self, system: &OrderOpsSystem<InMemoryStore>) -> Order {
        system
            .coordinator()
            .create_order(self.build())
            .await
            .expect("order creation")
    }
}

pub async fn confirm_payment(system: &OrderOpsSystem<InMemoryStore>, order_id: Uuid) {
    system
        .coordinator()
        .process_payment_confirmation(PaymentConfirmation {
            order_id,
            payment_event_id: format!("evt_{}", Uuid::new_v4().simple()),
            amount: None,
        })
        .await
        .expect("payment confirmation");
}

/// Apply each status in turn as `actor`.
pub async fn advance(
    system: &OrderOpsSystem<InMemoryStore>,
    order_id: Uuid,
    statuses: &[OrderStatus],
) {
    for status in statuses {
        system
            .coordinator()
            .update_order_status(StatusUpdate {
                order_id,
                status: *status,
                actor: Some("ops_user".to_string()),
                notes: None,
            })
            .await
            .unwrap_or_else(|err| panic!("transition to {status} failed: {err}"));
    }
}
