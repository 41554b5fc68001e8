use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::constants::events;
use crate::database::{OrderStore, StorageError};
use crate::error::{OrderOpsError, Result};
use crate::events::{Notification, Notifier};
use crate::models::{NewPartyMember, Order, PartyMember};

/// Per-member result of a bulk invite
#[derive(Debug, Clone, Serialize)]
pub struct InviteResult {
    pub email: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member: Option<PartyMember>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InviteResult {
    fn invited(member: PartyMember) -> Self {
        Self {
            email: member.email.clone(),
            success: true,
            member: Some(member),
            error: None,
        }
    }

    fn rejected(email: &str, error: impl Into<String>) -> Self {
        Self {
            email: email.to_string(),
            success: false,
            member: None,
            error: Some(error.into()),
        }
    }
}

/// Bulk invitations for wedding party members. A bad or duplicate entry is
/// reported in its own result and never aborts the rest of the batch.
pub struct WeddingPartyCoordinator<S: OrderStore> {
    store: Arc<S>,
    notifier: Arc<dyn Notifier>,
}

impl<S: OrderStore> WeddingPartyCoordinator<S> {
    pub fn new(store: Arc<S>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    pub async fn invite_members_in(
        &self,
        uow: &mut S::UnitOfWork,
        order: &Order,
        members: Vec<NewPartyMember>,
        now: DateTime<Utc>,
    ) -> Result<Vec<InviteResult>> {
        if !order.group_order {
            return Err(OrderOpsError::validation(format!(
                "order {} is not a group order",
                order.id
            )));
        }

        let mut results = Vec::with_capacity(members.len());
        for new_member in members {
            if let Err(message) = new_member.validate() {
                results.push(InviteResult::rejected(new_member.email.trim(), message));
                continue;
            }

            let member = PartyMember {
                id: Uuid::new_v4(),
                order_id: order.id,
                name: new_member.name.trim().to_string(),
                email: new_member.normalized_email(),
                role: new_member.role.clone(),
                invited_at: now,
            };
            match self.store.insert_party_member(uow, &member).await {
                Ok(()) => results.push(InviteResult::invited(member)),
                Err(StorageError::Duplicate { .. }) => {
                    warn!(order_id = %order.id, email = %member.email, "Party member already invited");
                    results.push(InviteResult::rejected(
                        &member.email,
                        "email already invited to this order",
                    ));
                }
                Err(other) => return Err(other.into()),
            }
        }

        let invited = results.iter().filter(|r| r.success).count();
        info!(
            order_id = %order.id,
            invited,
            rejected = results.len() - invited,
            "Wedding party invitations processed"
        );
        Ok(results)
    }

    /// Notify each successfully invited member. Call after commit.
    pub async fn notify_invited(&self, order_id: Uuid, results: &[InviteResult]) {
        for member in results.iter().filter_map(|r| r.member.as_ref()) {
            let notification = Notification::new(
                events::PARTY_MEMBER_INVITED,
                order_id,
                json!({
                    "member_id": member.id,
                    "name": member.name,
                    "email": member.email,
                    "role": member.role,
                }),
            );
            if let Err(error) = self.notifier.notify(notification).await {
                warn!(%order_id, email = %member.email, %error, "Invitation notification failed");
            }
        }
    }

    pub async fn members(&self, order_id: Uuid) -> Result<Vec<PartyMember>> {
        let mut uow = self.store.begin().await?;
        let members = self.store.party_members(&mut uow, order_id).await?;
        self.store.rollback(uow).await?;
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemoryStore;
    use crate::events::EventPublisher;
    use crate::models::{NewOrder, OrderType};

    fn member(name: &str, email: &str) -> NewPartyMember {
        NewPartyMember {
            name: name.to_string(),
            email: email.to_string(),
            role: Some("groomsman".to_string()),
        }
    }

    fn wedding_order(order_type: OrderType) -> Order {
        Order::from_new(
            NewOrder {
                customer_id: "cust_wedding".to_string(),
                customer_tier: Default::default(),
                total_amount: 1800.0,
                order_type,
                rush_order: false,
                group_order: false,
                party_size: 5,
                event_date: None,
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_duplicate_email_only_fails_its_own_item() {
        let store = InMemoryStore::new();
        let publisher = EventPublisher::default();
        let mut receiver = publisher.subscribe();
        let coordinator =
            WeddingPartyCoordinator::new(Arc::new(store.clone()), Arc::new(publisher.clone()));
        let order = wedding_order(OrderType::WeddingParty);

        let mut uow = store.begin().await.unwrap();
        store.insert_order(&mut uow, &order).await.unwrap();
        let results = coordinator
            .invite_members_in(
                &mut uow,
                &order,
                vec![
                    member("Groom", "groom@example.com"),
                    member("Groom Again", "GROOM@example.com"),
                    member("Best Man", "best.man@example.com"),
                ],
                Utc::now(),
            )
            .await
            .unwrap();
        store.commit(uow).await.unwrap();

        let flags: Vec<bool> = results.iter().map(|r| r.success).collect();
        assert_eq!(flags, vec![true, false, true]);
        assert!(results[1].error.is_some());

        coordinator.notify_invited(order.id, &results).await;
        assert_eq!(receiver.recv().await.unwrap().name, events::PARTY_MEMBER_INVITED);
        assert_eq!(receiver.recv().await.unwrap().name, events::PARTY_MEMBER_INVITED);

        assert_eq!(coordinator.members(order.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_members_are_reported_per_item() {
        let store = InMemoryStore::new();
        let coordinator =
            WeddingPartyCoordinator::new(Arc::new(store.clone()), Arc::new(EventPublisher::default()));
        let order = wedding_order(OrderType::WeddingParty);

        let mut uow = store.begin().await.unwrap();
        store.insert_order(&mut uow, &order).await.unwrap();
        let results = coordinator
            .invite_members_in(
                &mut uow,
                &order,
                vec![member("", "usher@example.com"), member("Usher", "nope")],
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(results.iter().all(|r| !r.success));
    }

    #[tokio::test]
    async fn test_individual_orders_cannot_invite() {
        let store = InMemoryStore::new();
        let coordinator =
            WeddingPartyCoordinator::new(Arc::new(store.clone()), Arc::new(EventPublisher::default()));
        let order = wedding_order(OrderType::Standard);

        let mut uow = store.begin().await.unwrap();
        store.insert_order(&mut uow, &order).await.unwrap();
        let result = coordinator
            .invite_members_in(&mut uow, &order, vec![member("Groom", "g@example.com")], Utc::now())
            .await;
        assert!(matches!(result, Err(OrderOpsError::Validation(_))));
    }
}
