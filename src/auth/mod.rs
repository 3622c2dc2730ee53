//! Actor context resolution.
//!
//! Authentication and session issuance live outside this service. Upstream
//! middleware (gateway) resolves the caller and forwards a trusted actor
//! context in the `x-actor-id` and `x-actor-role` headers; the engine performs
//! no credential checks itself.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

const ACTOR_ID_HEADER: &str = "x-actor-id";
const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Role of the actor issuing a request
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ActorRole {
    Customer,
    Seller,
    Delivery,
    Admin,
}

/// Trusted per-request actor identity
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ActorContext {
    pub actor_id: Uuid,
    pub role: ActorRole,
}

impl ActorContext {
    pub fn new(actor_id: Uuid, role: ActorRole) -> Self {
        Self { actor_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }

    /// Rejects callers outside the given role (admins always pass).
    pub fn require_role(&self, role: ActorRole) -> Result<(), AuthError> {
        if self.role == role || self.is_admin() {
            Ok(())
        } else {
            Err(AuthError::WrongRole {
                expected: role,
                actual: self.role,
            })
        }
    }
}

/// Actor context extraction errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing actor context headers")]
    MissingContext,

    #[error("Invalid actor id")]
    InvalidActorId,

    #[error("Unknown actor role: {0}")]
    UnknownRole(String),

    #[error("Operation requires role '{expected}', caller has role '{actual}'")]
    WrongRole {
        expected: ActorRole,
        actual: ActorRole,
    },
}

impl From<AuthError> for crate::errors::ServiceError {
    fn from(err: AuthError) -> Self {
        match &err {
            AuthError::WrongRole { .. } => crate::errors::ServiceError::Forbidden(err.to_string()),
            _ => crate::errors::ServiceError::Unauthorized(err.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::WrongRole { .. } => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        };
        let body = Json(serde_json::json!({
            "error": {
                "code": "AUTH_CONTEXT",
                "message": self.to_string(),
            }
        }));
        (status, body).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ActorContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor_id = parts
            .headers
            .get(ACTOR_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::MissingContext)?;
        let role = parts
            .headers
            .get(ACTOR_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::MissingContext)?;

        let actor_id = Uuid::parse_str(actor_id.trim()).map_err(|_| AuthError::InvalidActorId)?;
        let role =
            ActorRole::from_str(role.trim()).map_err(|_| AuthError::UnknownRole(role.to_string()))?;

        Ok(ActorContext::new(actor_id, role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parsing_accepts_known_roles() {
        assert_eq!(ActorRole::from_str("customer").unwrap(), ActorRole::Customer);
        assert_eq!(ActorRole::from_str("seller").unwrap(), ActorRole::Seller);
        assert_eq!(ActorRole::from_str("delivery").unwrap(), ActorRole::Delivery);
        assert_eq!(ActorRole::from_str("ADMIN").unwrap(), ActorRole::Admin);
        assert!(ActorRole::from_str("superuser").is_err());
    }

    #[test]
    fn require_role_lets_admins_through() {
        let admin = ActorContext::new(Uuid::new_v4(), ActorRole::Admin);
        assert!(admin.require_role(ActorRole::Customer).is_ok());
        assert!(admin.require_role(ActorRole::Seller).is_ok());

        let customer = ActorContext::new(Uuid::new_v4(), ActorRole::Customer);
        assert!(customer.require_role(ActorRole::Customer).is_ok());
        assert!(customer.require_role(ActorRole::Seller).is_err());
    }

    #[test]
    fn role_display_is_snake_case() {
        assert_eq!(ActorRole::Delivery.to_string(), "delivery");
        assert_eq!(ActorRole::Customer.to_string(), "customer");
    }
}
