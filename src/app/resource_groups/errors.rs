//! Error taxonomy for the tree layer.
//!
//! Most failures are plain `anyhow::Error`s with context and are isolated to
//! the node that produced them. The variants of [`TreeError`] are the ones a
//! caller needs to match on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
    /// A branch data provider returned nothing where a value is mandatory.
    #[error("Branch data provider for '{resource_type}' returned an empty result from {operation}")]
    EmptyProviderResult {
        resource_type: String,
        operation: &'static str,
    },

    #[error("Unknown group-by setting '{0}'")]
    UnknownGroupBy(String),

    #[error("Provider panicked during {operation}: {message}")]
    ProviderPanicked {
        operation: &'static str,
        message: String,
    },
}

impl TreeError {
    /// True for errors that signal a broken provider contract rather than a
    /// failed call. These are reported, not rendered as "no children".
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, TreeError::EmptyProviderResult { .. })
    }
}

/// Look through an error chain for a contract violation.
pub fn is_contract_violation(error: &anyhow::Error) -> bool {
    error
        .chain()
        .filter_map(|cause| cause.downcast_ref::<TreeError>())
        .any(TreeError::is_contract_violation)
}

/// Display form of a failure, shown on invalid-resource placeholder nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedError {
    pub error_type: String,
    pub message: String,
}

/// Classify an error for display.
///
/// The type is taken from the first recognisable token in the root cause
/// (`SomethingException`, `SomethingError`, an `HTTP 4xx` status, or a
/// `Code: Message` prefix). The message is the root cause text.
pub fn parse_error(error: &anyhow::Error) -> ParsedError {
    if let Some(tree_error) = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<TreeError>())
    {
        let error_type = match tree_error {
            TreeError::EmptyProviderResult { .. } => "EmptyProviderResult",
            TreeError::UnknownGroupBy(_) => "UnknownGroupBy",
            TreeError::ProviderPanicked { .. } => "ProviderPanicked",
        };
        return ParsedError {
            error_type: error_type.to_string(),
            message: tree_error.to_string(),
        };
    }

    let message = error.root_cause().to_string();
    ParsedError {
        error_type: extract_error_type(&message).unwrap_or_else(|| "Error".to_string()),
        message,
    }
}

fn extract_error_type(message: &str) -> Option<String> {
    if let Some((code, _)) = message.split_once(':') {
        let code = code.trim();
        if !code.is_empty() && !code.contains(' ') && code.chars().all(|c| c.is_alphanumeric() || c == '.' || c == '_') {
            return Some(code.to_string());
        }
    }

    let tokens: Vec<&str> = message
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    if let Some(token) = tokens
        .iter()
        .find(|t| t.len() > "Error".len() && (t.ends_with("Exception") || t.ends_with("Error")))
    {
        return Some(token.to_string());
    }

    tokens
        .windows(2)
        .find(|w| w[0].eq_ignore_ascii_case("http") && w[1].len() == 3 && w[1].chars().all(|c| c.is_ascii_digit()))
        .map(|w| format!("HTTP {}", w[1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_contract_violation_survives_context() {
        let err = anyhow::Error::new(TreeError::EmptyProviderResult {
            resource_type: "microsoft.web/sites".into(),
            operation: "getResourceItem",
        })
        .context("while resolving site1");
        assert!(is_contract_violation(&err));

        let plain = anyhow!("boom");
        assert!(!is_contract_violation(&plain));
    }

    #[test]
    fn test_parse_error_code_prefix() {
        let err = anyhow!("AuthorizationFailed: client lacks permission").context("listing sites");
        let parsed = parse_error(&err);
        assert_eq!(parsed.error_type, "AuthorizationFailed");
        assert_eq!(parsed.message, "AuthorizationFailed: client lacks permission");
    }

    #[test]
    fn test_parse_error_exception_token() {
        let parsed = parse_error(&anyhow!("request failed with ResourceNotFoundException"));
        assert_eq!(parsed.error_type, "ResourceNotFoundException");
    }

    #[test]
    fn test_parse_error_http_status() {
        let parsed = parse_error(&anyhow!("request returned HTTP 404 for the site"));
        assert_eq!(parsed.error_type, "HTTP 404");
    }

    #[test]
    fn test_parse_error_fallback() {
        let parsed = parse_error(&anyhow!("something went wrong"));
        assert_eq!(parsed.error_type, "Error");
        assert_eq!(parsed.message, "something went wrong");
    }

    #[test]
    fn test_parse_error_named_variant() {
        let err = anyhow::Error::new(TreeError::EmptyProviderResult {
            resource_type: "t".into(),
            operation: "getResourceItem",
        });
        assert_eq!(parse_error(&err).error_type, "EmptyProviderResult");
    }
}
