//! ARM error type and classification helpers

use serde_json::Value;
use thiserror::Error;

/// ARM error codes that mean "the thing you asked for is not there"
pub const NOT_FOUND_CODES: &[&str] = &[
    "ResourceNotFound",
    "ResourceGroupNotFound",
    "ParentResourceNotFound",
    "SubscriptionNotFound",
    "NotFound",
];

/// Errors raised at the HTTP boundary
#[derive(Debug, Error)]
pub enum ArmError {
    #[error("ARM request failed ({status}): {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("authentication failed: {0}")]
    Auth(String),
}

impl ArmError {
    /// Build an API error from a non-success response.
    ///
    /// Understands the ARM envelope `{"error": {"code", "message"}}` and the
    /// OAuth shape `{"error": "...", "error_description": "..."}`.
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let (code, message) = match parsed.as_ref().and_then(|v| v.get("error")) {
            Some(Value::Object(err)) => (
                err.get("code").and_then(Value::as_str).map(str::to_string),
                err.get("message").and_then(Value::as_str).map(str::to_string),
            ),
            Some(Value::String(code)) => (
                Some(code.clone()),
                parsed
                    .as_ref()
                    .and_then(|v| v.get("error_description"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
            ),
            _ => (None, None),
        };

        let reason = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown");

        ArmError::Api {
            status,
            code: code.unwrap_or_else(|| reason.replace(' ', "")),
            message: message.unwrap_or_else(|| reason.to_string()),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ArmError::Api { status, .. } => Some(*status),
            ArmError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            ArmError::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            ArmError::Api { status, code, .. } => {
                *status == 404 || NOT_FOUND_CODES.contains(&code.as_str())
            }
            _ => false,
        }
    }

    /// Transport failures and throttling/server statuses are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            ArmError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ArmError::Api { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// Find the first `ArmError` in an anyhow chain
pub fn find_arm_error(err: &anyhow::Error) -> Option<&ArmError> {
    err.chain().find_map(|e| e.downcast_ref::<ArmError>())
}

/// Whether a missing resource should be treated as an empty result
pub fn is_not_found(err: &anyhow::Error) -> bool {
    if let Some(arm) = find_arm_error(err) {
        return arm.is_not_found();
    }

    let text = format!("{:#}", err);
    NOT_FOUND_CODES
        .iter()
        .filter(|code| **code != "NotFound")
        .any(|code| text.contains(code))
        || text.contains("404 Not Found")
}

/// Whether the error carries one of the given ARM error codes
pub fn has_error_code(err: &anyhow::Error, codes: &[String]) -> bool {
    if codes.is_empty() {
        return false;
    }
    match find_arm_error(err).and_then(ArmError::code) {
        Some(code) => codes.iter().any(|c| c.eq_ignore_ascii_case(code)),
        None => {
            let text = format!("{:#}", err);
            codes.iter().any(|c| text.contains(c.as_str()))
        }
    }
}

/// Format an ARM error for display
pub fn format_arm_error(err: &anyhow::Error) -> String {
    if let Some(ArmError::Api {
        status,
        code,
        message,
    }) = find_arm_error(err)
    {
        return match status {
            401 => "Authentication failed. Run 'az login' or check the client credentials."
                .to_string(),
            403 => format!("Permission denied ({}). Check your Azure role assignments.", code),
            404 => format!("Resource not found ({}).", code),
            429 => "Rate limit exceeded. Please try again later.".to_string(),
            _ => {
                let message: String = message.chars().take(160).collect();
                format!("{}: {}", code, message)
            }
        };
    }

    let text = format!("{:#}", err);
    let sanitized: String = text
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(160)
        .collect();
    if sanitized.len() < text.len() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_from_response_parses_arm_envelope() {
        let body = r#"{"error":{"code":"ResourceGroupNotFound","message":"Resource group 'rg' could not be found."}}"#;
        let err = ArmError::from_response(404, body);
        assert_eq!(err.code(), Some("ResourceGroupNotFound"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_from_response_parses_oauth_error() {
        let body = r#"{"error":"invalid_client","error_description":"AADSTS7000215: Invalid client secret"}"#;
        let err = ArmError::from_response(401, body);
        assert_eq!(err.code(), Some("invalid_client"));
        assert!(err.to_string().contains("AADSTS7000215"));
    }

    #[test]
    fn test_from_response_without_body_uses_reason() {
        let err = ArmError::from_response(503, "");
        assert_eq!(err.code(), Some("ServiceUnavailable"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_is_not_found_through_context() {
        let err = anyhow::Error::from(ArmError::from_response(
            404,
            r#"{"error":{"code":"ResourceNotFound","message":"gone"}}"#,
        ));
        let err: anyhow::Result<()> = Err(err).context("Failed to get key vault");
        assert!(is_not_found(&err.unwrap_err()));
    }

    #[test]
    fn test_forbidden_is_not_not_found() {
        let err = anyhow::Error::from(ArmError::from_response(
            403,
            r#"{"error":{"code":"AuthorizationFailed","message":"no"}}"#,
        ));
        assert!(!is_not_found(&err));
        assert!(has_error_code(&err, &["authorizationfailed".to_string()]));
        assert!(!has_error_code(&err, &[]));
    }

    #[test]
    fn test_is_not_found_substring_fallback() {
        let err = anyhow::anyhow!("upstream said ResourceGroupNotFound");
        assert!(is_not_found(&err));
        assert!(!is_not_found(&anyhow::anyhow!("NotFoundation")));
        assert!(is_not_found(&anyhow::anyhow!("HTTP status client error (404 Not Found)")));
        assert!(!is_not_found(&anyhow::anyhow!(
            "request 0d404c1e-5f2a-4b3c-9404-aa0000000404 timed out"
        )));
    }

    #[test]
    fn test_format_arm_error() {
        let err = anyhow::Error::from(ArmError::from_response(429, ""));
        assert_eq!(
            format_arm_error(&err),
            "Rate limit exceeded. Please try again later."
        );
    }
}
