use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wedding party member invited against a group order.
/// Maps to `wedding_party_members`; email is unique per order (case-insensitive).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyMember {
    pub id: Uuid,
    pub order_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Option<String>,
    pub invited_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPartyMember {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
}

impl NewPartyMember {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("member name is required".to_string());
        }
        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
            _ => Err(format!("invalid email address: {}", self.email)),
        }
    }

    pub fn normalized_email(&self) -> String {
        self.email.trim().to_lowercase()
    }
}
