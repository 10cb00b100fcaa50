//! Response handling shared by the HTTP backends

use crate::{Error, Result};
use reqwest::{Response, StatusCode};

/// Map a non-success HTTP status to the error taxonomy
pub(crate) fn status_error(backend: &str, status: StatusCode, body: &str, id: Option<&str>) -> Error {
    let reason = format!("HTTP {}: {}", status.as_u16(), body.trim());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Authentication {
            backend: backend.to_string(),
            reason,
        },
        StatusCode::NOT_FOUND => Error::NotFound {
            id: id.unwrap_or_default().to_string(),
        },
        _ => Error::backend(backend, reason),
    }
}

/// Pass successful responses through, turn everything else into an [`Error`]
pub(crate) async fn check(backend: &str, response: Response, id: Option<&str>) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(backend, status, &body, id))
}

pub(crate) fn transport(backend: &str, error: reqwest::Error) -> Error {
    Error::backend(backend, format!("request failed: {error}"))
}

/// Collapse lookup failures to `false`; credential failures still propagate
pub(crate) fn pinned_or_false(backend: &str, outcome: Result<bool>) -> Result<bool> {
    match outcome {
        Ok(pinned) => Ok(pinned),
        Err(e) if e.is_authentication() => Err(e),
        Err(e) => {
            tracing::debug!("{} pin lookup failed, treating as unpinned: {}", backend, e);
            Ok(false)
        }
    }
}

pub(crate) fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(StatusCode::UNAUTHORIZED)]
    #[case(StatusCode::FORBIDDEN)]
    fn test_auth_statuses(#[case] status: StatusCode) {
        assert!(status_error("pinning", status, "bad jwt", None).is_authentication());
    }

    #[test]
    fn test_not_found_and_other_statuses() {
        let err = status_error("kubo", StatusCode::NOT_FOUND, "", Some("bafy"));
        assert!(matches!(err, Error::NotFound { ref id } if id == "bafy"));

        let err = status_error("kubo", StatusCode::INTERNAL_SERVER_ERROR, "boom", None);
        assert!(matches!(err, Error::Backend { ref reason, .. } if reason.contains("500")));
    }

    #[test]
    fn test_pinned_or_false() {
        assert!(!pinned_or_false("p", Err(Error::backend("p", "down"))).unwrap());
        assert!(!pinned_or_false("p", Err(Error::NotFound { id: "x".into() })).unwrap());
        assert!(pinned_or_false("p", Ok(true)).unwrap());
        let auth = Error::Authentication {
            backend: "p".into(),
            reason: "401".into(),
        };
        assert!(pinned_or_false("p", Err(auth)).is_err());
    }

    #[test]
    fn test_trim_base() {
        assert_eq!(trim_base("https://api.example.com/"), "https://api.example.com");
    }
}
