// Trusted-identity extraction. Token validation happens in an upstream
// authentication collaborator; by the time a request reaches this service the
// {user id, role, permissions} triple in the headers has been verified, and
// the engine only has to carry it as an explicit Actor.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{request::Parts, StatusCode};
use axum::Json;

use caseboard_core::Actor;

pub const USER_HEADER: &str = "x-user-id";
pub const ROLE_HEADER: &str = "x-user-role";
pub const PERMISSIONS_HEADER: &str = "x-user-permissions";

/// The authenticated actor for a request.
#[derive(Debug, Clone)]
pub struct AuthContext(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        };

        let user_id = header(USER_HEADER).filter(|v| !v.is_empty()).ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({
                    "success": false,
                    "error": {
                        "kind": "unauthenticated",
                        "message": "missing verified user identity",
                    },
                })),
            )
        })?;

        let role = header(ROLE_HEADER).unwrap_or_else(|| "analyst".to_string());
        let permissions = header(PERMISSIONS_HEADER)
            .map(|csv| {
                csv.split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(AuthContext(
            Actor::new(user_id, role).with_permissions(permissions),
        ))
    }
}
