use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Provisioned user row. Provisioning itself happens outside this service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub slug: String,
    pub email: String,
    pub display_name: String,
    pub pfp_url: Option<String>,
    pub is_admin: bool,
}

/// The authenticated caller, as carried by every request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActiveUser {
    pub id: Uuid,
    pub slug: String,
    pub email: String,
    pub display_name: String,
    pub is_admin: bool,
}

impl From<&User> for ActiveUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            slug: user.slug.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            is_admin: user.is_admin,
        }
    }
}
