//! Live traffic validation.
//!
//! Request and response payloads are assembled into an envelope, coerced to
//! the declared wire types and run through the operation's compiled
//! validator. Raw violations are then normalized into
//! [`LiveValidationIssue`]s.

mod issue;
mod normalize;
mod operation;

pub use issue::{IssueCode, LiveValidationIssue, Severity, SourceLocation};
pub use normalize::{NormalizeContext, filter_included, normalize, to_json_path};
pub use operation::{normalize_status_code, validate_request, validate_response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::routing::{RouteError, UNKNOWN_API_VERSION, UNKNOWN_OPERATION_ID};

/// Runtime exception codes that are not routing failures.
pub const INCORRECT_INPUT: &str = "INCORRECT_INPUT";
pub const REQUEST_VALIDATION_ERROR: &str = "REQUEST_VALIDATION_ERROR";
pub const RESPONSE_VALIDATION_ERROR: &str = "RESPONSE_VALIDATION_ERROR";
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

/// A captured HTTP request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveRequest {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: Map<String, Value>,
    /// Parsed query; taken from `url` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl LiveRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }
}

/// Case-insensitive lookup of a string header.
pub fn header_value<'a>(headers: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, value)| value.as_str())
}

/// A captured HTTP response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveResponse {
    /// Numeric code (`"200"`) or reason phrase (`"OK"`).
    pub status_code: String,
    #[serde(default)]
    pub headers: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponsePair {
    pub live_request: LiveRequest,
    pub live_response: LiveResponse,
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct ValidateOptions {
    /// Codes to report; empty reports every code.
    pub include_errors: Vec<IssueCode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationInfo {
    pub operation_id: String,
    pub api_version: String,
}

impl Default for OperationInfo {
    fn default() -> Self {
        Self {
            operation_id: UNKNOWN_OPERATION_ID.to_string(),
            api_version: UNKNOWN_API_VERSION.to_string(),
        }
    }
}

/// A failure that prevented validation from running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeException {
    pub code: String,
    pub message: String,
}

impl RuntimeException {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&RouteError> for RuntimeException {
    fn from(error: &RouteError) -> Self {
        Self::new(error.code(), error.to_string())
    }
}

/// Outcome of validating one request or response.
///
/// `is_successful` is `None` when a runtime exception prevented validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveValidationResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_successful: Option<bool>,
    pub operation_info: OperationInfo,
    pub errors: Vec<LiveValidationIssue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_exception: Option<RuntimeException>,
}

impl LiveValidationResult {
    pub fn failed(operation_info: OperationInfo, exception: RuntimeException) -> Self {
        Self {
            is_successful: None,
            operation_info,
            errors: Vec::new(),
            runtime_exception: Some(exception),
        }
    }

    pub fn completed(operation_info: OperationInfo, errors: Vec<LiveValidationIssue>) -> Self {
        Self {
            is_successful: Some(errors.is_empty()),
            operation_info,
            errors,
            runtime_exception: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponseLiveValidationResult {
    pub request_validation_result: LiveValidationResult,
    pub response_validation_result: LiveValidationResult,
    /// Set when the input pair itself was malformed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_exception: Option<RuntimeException>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_pair_deserializes_camel_case() {
        let pair: RequestResponsePair = serde_json::from_value(json!({
            "liveRequest": {
                "url": "/pets?api-version=1.0",
                "method": "GET",
                "headers": {"X-Ms-Request-Id": "abc"}
            },
            "liveResponse": {"statusCode": "OK", "headers": {}, "body": {"id": 1}}
        }))
        .unwrap();

        assert_eq!(pair.live_request.header("x-ms-request-id"), Some("abc"));
        assert!(pair.live_request.query.is_none());
        assert_eq!(pair.live_response.status_code, "OK");
        assert_eq!(pair.live_response.body, Some(json!({"id": 1})));
    }

    #[test]
    fn test_result_serialization_omits_unset_fields() {
        let result = LiveValidationResult::completed(OperationInfo::default(), Vec::new());
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "isSuccessful": true,
                "operationInfo": {
                    "operationId": "unknown-operation-id",
                    "apiVersion": "unknown-api-version"
                },
                "errors": []
            })
        );

        let failed = LiveValidationResult::failed(
            OperationInfo::default(),
            RuntimeException::new(INTERNAL_ERROR, "boom"),
        );
        assert_eq!(failed.is_successful, None);
        assert_eq!(
            serde_json::to_value(&failed).unwrap()["runtimeException"],
            json!({"code": "INTERNAL_ERROR", "message": "boom"})
        );
    }
}
