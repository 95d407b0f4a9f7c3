use crate::extractors::RejectionType;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use domain::Id;
use log::*;

/// Header carrying the caller's user id, set by the authentication layer in front of this service.
pub(crate) const USER_ID_HEADER: &str = "x-user-id";

/// The id of the user making the request.
pub(crate) struct AuthenticatedUser(pub Id);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = RejectionType;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()))?;

        match value.to_str().ok().and_then(|v| v.trim().parse::<Id>().ok()) {
            Some(user_id) => Ok(AuthenticatedUser(user_id)),
            None => {
                debug!("Rejecting malformed {USER_ID_HEADER} header");
                Err((StatusCode::UNAUTHORIZED, "Unauthorized".to_string()))
            }
        }
    }
}
