//! Caller identity handed over by the auth layer in front of this server

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::{Error, Result};

pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Clone, Debug)]
pub struct CurrentUser {
    user_id: String,
}

impl CurrentUser {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(CurrentUser::new)
            .ok_or(Error::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<CurrentUser> {
        let (mut parts, _) = request.into_parts();
        CurrentUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_trimmed_header() {
        let request = Request::builder()
            .header(USER_ID_HEADER, " alice ")
            .body(())
            .unwrap();
        assert_eq!(extract(request).await.unwrap().user_id(), "alice");
    }

    #[tokio::test]
    async fn missing_or_blank_header_is_unauthorized() {
        let blank = Request::builder().header(USER_ID_HEADER, "  ").body(()).unwrap();
        assert!(matches!(extract(blank).await, Err(Error::Unauthorized)));

        let missing = Request::builder().body(()).unwrap();
        assert!(matches!(extract(missing).await, Err(Error::Unauthorized)));
    }
}
