//! Parsing of the routing facts carried by a request URL.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use url::Url;

use super::{RouteError, RouteResult, UNKNOWN_API_VERSION, UNKNOWN_PROVIDER};

/// Base for request URLs that carry only a path.
pub const DEFAULT_BASE_URL: &str = "https://management.azure.com";

static PROVIDER_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)/providers/([^/]+)").unwrap());

/// Routing facts of one live request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRequest {
    /// Lowercased provider namespace, `microsoft.unknown` when the path has none.
    pub provider: String,
    pub resource_type: String,
    /// Lowercased `api-version` query value.
    pub api_version: String,
    /// Lowercased HTTP method.
    pub method: String,
    pub host: String,
    pub path: String,
    /// Query with keys and values lowercased.
    pub query: Map<String, Value>,
    pub correlation_id: String,
    pub activity_id: String,
    pub request_url: String,
}

impl ValidationRequest {
    pub fn parse(
        request_url: &str,
        method: &str,
        correlation_id: &str,
        activity_id: &str,
    ) -> RouteResult<Self> {
        if request_url.trim().is_empty() {
            return Err(RouteError::PotentialOperationSearch(
                "An error occurred while trying to parse validation payload.\
                 requestUrl is a required parameter of type \"string\" and it cannot be an empty string."
                    .to_string(),
            ));
        }
        if method.trim().is_empty() {
            return Err(RouteError::PotentialOperationSearch(
                "An error occurred while trying to parse validation payload.\
                 requestMethod is a required parameter of type \"string\" and it cannot be an empty string."
                    .to_string(),
            ));
        }

        let url = parse_url(request_url)?;
        let path = url.path().to_string();
        let mut query = Map::new();
        for (key, value) in url.query_pairs() {
            query.insert(key.to_lowercase(), Value::String(value.to_lowercase()));
        }

        let api_version = query
            .get("api-version")
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN_API_VERSION)
            .to_lowercase();
        let provider = provider_from_path(&path).unwrap_or(UNKNOWN_PROVIDER);
        let resource_type = resource_type(&path, provider);

        Ok(Self {
            provider: provider.to_lowercase(),
            resource_type,
            api_version,
            method: method.to_lowercase(),
            host: url.host_str().unwrap_or_default().to_string(),
            path,
            query,
            correlation_id: correlation_id.to_string(),
            activity_id: activity_id.to_string(),
            request_url: request_url.to_string(),
        })
    }
}

/// Resolves `request_url` against [`DEFAULT_BASE_URL`].
pub fn parse_url(request_url: &str) -> RouteResult<Url> {
    let base = Url::parse(DEFAULT_BASE_URL)
        .map_err(|e| RouteError::PotentialOperationSearch(e.to_string()))?;
    base.join(request_url).map_err(|e| {
        RouteError::PotentialOperationSearch(format!(
            "An error occurred while trying to parse validation payload. Invalid requestUrl \"{request_url}\": {e}"
        ))
    })
}

/// Last provider namespace of a path, e.g. `Microsoft.Authorization` for
/// `/subscriptions/{id}/providers/Microsoft.Storage/.../providers/Microsoft.Authorization/locks`.
pub fn provider_from_path(path: &str) -> Option<&str> {
    PROVIDER_SEGMENT
        .captures_iter(path)
        .last()
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// First segment after the provider namespace.
pub fn resource_type(path: &str, provider: &str) -> String {
    let mut rest = path;
    if let Some(index) = path.find(provider).filter(|i| *i > 0) {
        rest = path.get(index + provider.len() + 1..).unwrap_or_default();
    }
    match rest.find('/') {
        Some(slash) if slash > 0 => rest[..slash].to_string(),
        _ => rest.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_parse_arm_request() {
        let request = ValidationRequest::parse(
            "https://management.azure.com/subscriptions/s/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts/acc?api-version=2019-06-01&$Filter=ABC",
            "PUT",
            "corr",
            "act",
        )
        .unwrap();

        assert_eq!(request.provider, "microsoft.storage");
        assert_eq!(request.resource_type, "storageAccounts");
        assert_eq!(request.api_version, "2019-06-01");
        assert_eq!(request.method, "put");
        assert_eq!(request.host, "management.azure.com");
        assert_eq!(request.query.get("$filter"), Some(&Value::from("abc")));
        assert_eq!(request.correlation_id, "corr");
    }

    #[test]
    fn test_relative_url_without_provider() {
        let request = ValidationRequest::parse("/pets/1", "get", "", "").unwrap();
        assert_eq!(request.provider, UNKNOWN_PROVIDER);
        assert_eq!(request.api_version, UNKNOWN_API_VERSION);
        assert_eq!(request.host, "management.azure.com");
        assert_eq!(request.path, "/pets/1");
    }

    #[rstest]
    #[case::empty_url("", "get")]
    #[case::blank_method("/pets", "  ")]
    fn test_missing_inputs_rejected(#[case] url: &str, #[case] method: &str) {
        let err = ValidationRequest::parse(url, method, "", "").unwrap_err();
        assert_eq!(err.code(), "POTENTIAL_OPERATION_SEARCH_ERROR");
    }

    #[test]
    fn test_last_provider_wins() {
        assert_eq!(
            provider_from_path(
                "/subscriptions/s/providers/Microsoft.Storage/storageAccounts/a/providers/Microsoft.Authorization/locks/l"
            ),
            Some("Microsoft.Authorization")
        );
        assert_eq!(provider_from_path("/pets"), None);
    }
}
