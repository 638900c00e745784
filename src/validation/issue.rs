//! Issue taxonomy shared by the executor, the normalizer and callers.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::swagger::Position;

/// Stable issue codes reported for live traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    InternalError,
    DiscriminatorValueNotFound,
    AnyOfMissing,
    OneOfMissing,
    OneOfMultiple,
    ObjectAdditionalProperties,
    ObjectMissingRequiredProperty,
    ObjectPropertiesMaximum,
    ObjectPropertiesMinimum,
    ArrayLengthLong,
    ArrayLengthShort,
    ArrayUnique,
    InvalidType,
    InvalidFormat,
    Pattern,
    MultipleOf,
    EnumCaseMismatch,
    EnumMismatch,
    MaxLength,
    MinLength,
    Minimum,
    Maximum,
    MinimumExclusive,
    MaximumExclusive,
    ReadonlyPropertyNotAllowedInRequest,
    WriteonlyPropertyNotAllowedInResponse,
    SecretProperty,
    InvalidResponseCode,
    InvalidContentType,
    MissingRequiredParameter,
    InvalidResponseBody,
    InvalidResponseHeader,
    MissingResourceId,
    LroResponseCode,
    LroResponseHeader,
}

impl IssueCode {
    pub fn severity(self) -> Severity {
        match self {
            Self::InvalidContentType | Self::InvalidResponseHeader => Severity::Error,
            _ => Severity::Critical,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InternalError => "INTERNAL_ERROR",
            Self::DiscriminatorValueNotFound => "DISCRIMINATOR_VALUE_NOT_FOUND",
            Self::AnyOfMissing => "ANY_OF_MISSING",
            Self::OneOfMissing => "ONE_OF_MISSING",
            Self::OneOfMultiple => "ONE_OF_MULTIPLE",
            Self::ObjectAdditionalProperties => "OBJECT_ADDITIONAL_PROPERTIES",
            Self::ObjectMissingRequiredProperty => "OBJECT_MISSING_REQUIRED_PROPERTY",
            Self::ObjectPropertiesMaximum => "OBJECT_PROPERTIES_MAXIMUM",
            Self::ObjectPropertiesMinimum => "OBJECT_PROPERTIES_MINIMUM",
            Self::ArrayLengthLong => "ARRAY_LENGTH_LONG",
            Self::ArrayLengthShort => "ARRAY_LENGTH_SHORT",
            Self::ArrayUnique => "ARRAY_UNIQUE",
            Self::InvalidType => "INVALID_TYPE",
            Self::InvalidFormat => "INVALID_FORMAT",
            Self::Pattern => "PATTERN",
            Self::MultipleOf => "MULTIPLE_OF",
            Self::EnumCaseMismatch => "ENUM_CASE_MISMATCH",
            Self::EnumMismatch => "ENUM_MISMATCH",
            Self::MaxLength => "MAX_LENGTH",
            Self::MinLength => "MIN_LENGTH",
            Self::Minimum => "MINIMUM",
            Self::Maximum => "MAXIMUM",
            Self::MinimumExclusive => "MINIMUM_EXCLUSIVE",
            Self::MaximumExclusive => "MAXIMUM_EXCLUSIVE",
            Self::ReadonlyPropertyNotAllowedInRequest => "READONLY_PROPERTY_NOT_ALLOWED_IN_REQUEST",
            Self::WriteonlyPropertyNotAllowedInResponse => {
                "WRITEONLY_PROPERTY_NOT_ALLOWED_IN_RESPONSE"
            }
            Self::SecretProperty => "SECRET_PROPERTY",
            Self::InvalidResponseCode => "INVALID_RESPONSE_CODE",
            Self::InvalidContentType => "INVALID_CONTENT_TYPE",
            Self::MissingRequiredParameter => "MISSING_REQUIRED_PARAMETER",
            Self::InvalidResponseBody => "INVALID_RESPONSE_BODY",
            Self::InvalidResponseHeader => "INVALID_RESPONSE_HEADER",
            Self::MissingResourceId => "MISSING_RESOURCE_ID",
            Self::LroResponseCode => "LRO_RESPONSE_CODE",
            Self::LroResponseHeader => "LRO_RESPONSE_HEADER",
        }
    }
}

impl std::fmt::Display for IssueCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issue severity; serialized as its numeric level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Critical = 0,
    Error = 1,
    Warning = 2,
    Information = 3,
    Verbose = 4,
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

/// Contract location an issue was raised from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

/// One normalized finding about a live request or response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveValidationIssue {
    pub code: IssueCode,
    pub message: String,
    pub severity: Severity,
    /// JSON pointers into the payload.
    pub paths_in_payload: Vec<String>,
    /// JSON paths into the payload; body paths start with `$`.
    pub json_paths_in_payload: Vec<String>,
    pub schema_path: String,
    pub source: SourceLocation,
    pub documentation_url: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Value>,
    /// Failures of the individual `anyOf`/`oneOf` branches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inner: Option<Vec<LiveValidationIssue>>,
}

impl LiveValidationIssue {
    /// An issue that is not tied to a payload location.
    pub fn new(code: IssueCode, message: impl Into<String>, source: SourceLocation) -> Self {
        Self {
            code,
            message: message.into(),
            severity: code.severity(),
            paths_in_payload: Vec::new(),
            json_paths_in_payload: Vec::new(),
            schema_path: String::new(),
            source,
            documentation_url: String::new(),
            params: Vec::new(),
            inner: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::readonly(
        IssueCode::ReadonlyPropertyNotAllowedInRequest,
        "\"READONLY_PROPERTY_NOT_ALLOWED_IN_REQUEST\""
    )]
    #[case::lro(IssueCode::LroResponseHeader, "\"LRO_RESPONSE_HEADER\"")]
    #[case::one_of(IssueCode::OneOfMissing, "\"ONE_OF_MISSING\"")]
    fn test_code_wire_names(#[case] code: IssueCode, #[case] expected: &str) {
        assert_eq!(serde_json::to_string(&code).unwrap(), expected);
        assert_eq!(format!("\"{code}\""), expected);
        let parsed: IssueCode = serde_json::from_str(expected).unwrap();
        assert_eq!(parsed, code);
    }

    #[test]
    fn test_severity_levels() {
        assert_eq!(IssueCode::InvalidContentType.severity(), Severity::Error);
        assert_eq!(IssueCode::InvalidResponseHeader.severity(), Severity::Error);
        assert_eq!(IssueCode::InvalidType.severity(), Severity::Critical);
        assert_eq!(serde_json::to_string(&Severity::Error).unwrap(), "1");
    }
}
