use super::AuthError;
use crate::domain_model::UserId;

/// Extracts the credential from an `Authorization` header value.
///
/// `Ok(None)` means no usable credential was sent at all, `Err` means a header
/// was sent but not in the `Bearer <token>` form.
pub fn parse_bearer(header: Option<&str>) -> Result<Option<&str>, AuthError> {
    let header = header.unwrap_or_default().trim();
    if header.is_empty() || header == "Bearer" {
        return Ok(None);
    }
    match header.strip_prefix("Bearer ") {
        Some(token) if token.trim().is_empty() => Ok(None),
        Some(token) => Ok(Some(token.trim())),
        None => Err(AuthError::InvalidToken),
    }
}

#[async_trait::async_trait]
pub trait AccessGuard: Send + Sync {
    /// Admits the caller presenting `authorization` and returns the verified subject.
    async fn admit(&self, authorization: Option<&str>) -> Result<UserId, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bearer_missing() {
        assert!(matches!(parse_bearer(None), Ok(None)));
        assert!(matches!(parse_bearer(Some("")), Ok(None)));
        assert!(matches!(parse_bearer(Some("Bearer ")), Ok(None)));
        assert!(matches!(parse_bearer(Some("Bearer    ")), Ok(None)));
    }

    #[test]
    fn test_parse_bearer_token() {
        assert_eq!(parse_bearer(Some("Bearer abc.def.ghi")).unwrap(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_parse_bearer_wrong_scheme() {
        assert!(matches!(
            parse_bearer(Some("Basic dXNlcjpwYXNz")),
            Err(AuthError::InvalidToken)
        ));
    }
}
