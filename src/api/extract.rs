//! Request extractors.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::domain::{Actor, Role, UserId};
use crate::error::PlatformError;

/// Header carrying the caller's user id (UUID).
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the caller's role (`admin` or `user`). Defaults to
/// `user` when absent.
pub const USER_ROLE_HEADER: &str = "x-user-role";

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = PlatformError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(raw_id) = header(parts, USER_ID_HEADER)? else {
            return Err(PlatformError::Unauthorized(format!(
                "missing {USER_ID_HEADER} header"
            )));
        };
        let user_id = uuid::Uuid::parse_str(raw_id.trim())
            .map(UserId::from_uuid)
            .map_err(|_| PlatformError::Unauthorized(format!("{USER_ID_HEADER} is not a UUID")))?;
        let role = match header(parts, USER_ROLE_HEADER)? {
            Some(raw) => raw.parse::<Role>()?,
            None => Role::User,
        };

        Ok(Self { user_id, role })
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, PlatformError> {
    parts
        .headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map_err(|_| PlatformError::Unauthorized(format!("{name} is not ASCII")))
        })
        .transpose()
}
