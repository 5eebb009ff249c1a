//! Identity of the caller, as asserted by the upstream auth proxy.

use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use vial_common::UserId;

pub const USER_ID_HEADER: &str = "X-User-Id";

/// The authenticated user making the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub UserId);

#[derive(Debug)]
pub enum AuthError {
    Missing,
    Malformed,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CurrentUser {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match request.headers().get_one(USER_ID_HEADER) {
            None => Outcome::Error((Status::Unauthorized, AuthError::Missing)),
            Some(value) => match value.trim().parse::<UserId>() {
                Ok(user_id) => Outcome::Success(CurrentUser(user_id)),
                Err(_) => Outcome::Error((Status::Unauthorized, AuthError::Malformed)),
            },
        }
    }
}
