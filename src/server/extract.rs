//! Request extractors.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::error::ApiError;

/// Header carrying the authenticated owner id, set by the upstream auth proxy.
pub const OWNER_HEADER: &str = "x-owner-id";

/// The authenticated owner of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerId(pub i64);

impl OwnerId {
    fn from_parts(parts: &Parts) -> Result<Self, ApiError> {
        let value = parts
            .headers
            .get(OWNER_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("missing owner identity".to_string()))?;

        value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .map(OwnerId)
            .ok_or_else(|| ApiError::Unauthorized("invalid owner identity".to_string()))
    }
}

impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_parts(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/containers");
        if let Some(value) = header {
            builder = builder.header(OWNER_HEADER, value);
        }
        builder.body(()).expect("request").into_parts().0
    }

    #[test]
    fn test_owner_header_parsed() {
        assert_eq!(OwnerId::from_parts(&parts_with(Some("42"))).unwrap(), OwnerId(42));
    }

    #[test]
    fn test_missing_or_invalid_header_is_unauthorized() {
        assert!(matches!(
            OwnerId::from_parts(&parts_with(None)),
            Err(ApiError::Unauthorized(_))
        ));
        assert!(matches!(
            OwnerId::from_parts(&parts_with(Some("alice"))),
            Err(ApiError::Unauthorized(_))
        ));
    }
}
