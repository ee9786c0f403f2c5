use std::future::{ready, Ready};

use actix_web::{dev::Payload, error::ErrorUnauthorized, Error, FromRequest, HttpRequest};

use crate::engine::models::common::UserId;

/// Header carrying the caller's id, set by the gateway in front of the service.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// The identified caller. Use `Option<UserInfo>` where guests are allowed.
#[derive(Debug, Clone)]
pub struct UserInfo {
    pub id: UserId,
}

impl FromRequest for UserInfo {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let id = req
            .headers()
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<UserId>().ok());
        match id {
            Some(id) => ready(Ok(UserInfo { id })),
            None => ready(Err(ErrorUnauthorized("missing or invalid X-User-Id header"))),
        }
    }
}
