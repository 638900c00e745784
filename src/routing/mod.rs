//! Operation routing.
//!
//! Indexes every operation of the loaded contracts by provider namespace,
//! api-version and HTTP method, and finds the operation a live request
//! targets. Lookups narrow tier by tier so a miss reports the first tier
//! that had nothing:
//!
//! - provider (`microsoft.storage`, or `microsoft.unknown` for contracts
//!   without one)
//! - api-version (lowercased)
//! - method (lowercased)
//! - path template, tried in three slots: plain templates, templates with a
//!   leading multi-segment parameter, and single-parameter templates such
//!   as `/{resourceId}`

mod operation;
mod request;

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use percent_encoding::percent_decode_str;
use serde_json::{Map, Value, json};
use thiserror::Error;

pub use operation::{Coercion, Operation, Response, coerce_map};
pub use request::{DEFAULT_BASE_URL, ValidationRequest, parse_url, provider_from_path, resource_type};

use crate::swagger::SpecDocument;

/// Provider bucket for contracts whose paths name no provider.
pub const UNKNOWN_PROVIDER: &str = "microsoft.unknown";
pub const UNKNOWN_API_VERSION: &str = "unknown-api-version";
pub const UNKNOWN_OPERATION_ID: &str = "unknown-operation-id";

/// Why a request could not be routed to exactly one operation.
#[derive(Debug, Clone, Error)]
pub enum RouteError {
    #[error("{0}")]
    PotentialOperationSearch(String),
    #[error("{0}")]
    PathNotFound(String),
    #[error("{0}")]
    OperationNotFound(String),
    #[error("{0}")]
    OperationNotFoundWithVerb(String),
    #[error("{0}")]
    OperationNotFoundWithApi(String),
    #[error("{0}")]
    OperationNotFoundWithProvider(String),
    #[error("{0}")]
    DoubleForwardSlashes(String),
    #[error("{0}")]
    MultipleOperationsFound(String),
}

impl RouteError {
    /// Stable error name reported as the runtime exception code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PotentialOperationSearch(_) => "POTENTIAL_OPERATION_SEARCH_ERROR",
            Self::PathNotFound(_) => "PATH_NOT_FOUND_IN_REQUEST_URL",
            Self::OperationNotFound(_) => "OPERATION_NOT_FOUND_IN_CACHE",
            Self::OperationNotFoundWithVerb(_) => "OPERATION_NOT_FOUND_IN_CACHE_WITH_VERB",
            Self::OperationNotFoundWithApi(_) => "OPERATION_NOT_FOUND_IN_CACHE_WITH_API",
            Self::OperationNotFoundWithProvider(_) => "OPERATION_NOT_FOUND_IN_CACHE_WITH_PROVIDER",
            Self::DoubleForwardSlashes(_) => "DOUBLE_FORWARD_SLASHES_IN_URL",
            Self::MultipleOperationsFound(_) => "MULTIPLE_OPERATIONS_FOUND",
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Self::PotentialOperationSearch(_) => "OAV123",
            Self::PathNotFound(_) => "OAV124",
            Self::OperationNotFound(_) => "OAV125",
            Self::OperationNotFoundWithVerb(_) => "OAV126",
            Self::OperationNotFoundWithApi(_) => "OAV127",
            Self::OperationNotFoundWithProvider(_) => "OAV128",
            Self::DoubleForwardSlashes(_) => "OAV129",
            Self::MultipleOperationsFound(_) => "OAV120",
        }
    }
}

pub type RouteResult<T> = Result<T, RouteError>;

/// The operation a request was routed to.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub operation: Arc<Operation>,
    /// Path parameters, percent-decoded.
    pub path_params: Map<String, Value>,
    /// Version bucket the operation was found in.
    pub api_version: String,
}

#[derive(Debug, Default)]
struct Bucket {
    full: Vec<Arc<Operation>>,
    extended: Vec<Arc<Operation>>,
    param_only: Vec<Arc<Operation>>,
}

impl Bucket {
    fn insert(&mut self, operation: Arc<Operation>) {
        let regex = &operation.regex;
        if !regex.has_multi_path_param() {
            self.full.push(operation);
        } else if regex.is_param_only() {
            self.param_only.push(operation);
        } else {
            self.extended.push(operation);
        }
    }

    /// First non-empty slot result, with a retry on the `/providers/...`
    /// suffix of the path when the full path matches nothing.
    fn find(&self, request: &ValidationRequest, api_version: &str) -> Vec<RouteMatch> {
        let matches = self.find_path(request, &request.path, api_version);
        if !matches.is_empty() {
            return matches;
        }
        match request.path.to_lowercase().rfind("/providers/") {
            Some(index) if index > 0 => self.find_path(request, &request.path[index..], api_version),
            _ => Vec::new(),
        }
    }

    fn find_path(&self, request: &ValidationRequest, path: &str, api_version: &str) -> Vec<RouteMatch> {
        [&self.full, &self.extended, &self.param_only]
            .into_iter()
            .map(|slot| match_slot(slot, request, path, api_version))
            .find(|matches| !matches.is_empty())
            .unwrap_or_default()
    }
}

/// Matches one slot; query-constrained hits win over plain ones, which win
/// over multi-segment ones.
fn match_slot(
    slot: &[Arc<Operation>],
    request: &ValidationRequest,
    path: &str,
    api_version: &str,
) -> Vec<RouteMatch> {
    let query = Value::Object(request.query.clone());
    let mut with_query = Vec::new();
    let mut plain = Vec::new();
    let mut multi = Vec::new();

    for operation in slot {
        let constrained = match operation.regex.query() {
            Some(constraint) if !constraint.is_satisfied(&query) => continue,
            Some(_) => true,
            None => false,
        };
        let Some(captures) = operation.regex.captures(&request.host, path) else {
            continue;
        };
        let found = RouteMatch {
            operation: Arc::clone(operation),
            path_params: decode_captures(captures),
            api_version: api_version.to_string(),
        };
        if constrained {
            with_query.push(found);
        } else if operation.regex.has_multi_path_param() {
            multi.push(found);
        } else {
            plain.push(found);
        }
    }

    [with_query, plain, multi]
        .into_iter()
        .find(|matches| !matches.is_empty())
        .unwrap_or_default()
}

fn decode_captures(captures: Vec<(String, String)>) -> Map<String, Value> {
    captures
        .into_iter()
        .map(|(key, raw)| {
            let decoded = percent_decode_str(&raw).decode_utf8_lossy().into_owned();
            (key, Value::String(decoded))
        })
        .collect()
}

type MethodMap = HashMap<String, Bucket>;

/// Index of every routable operation.
#[derive(Debug, Default)]
pub struct OperationCache {
    /// provider -> api-version -> method. Versions are ordered so the
    /// unknown-provider fallback scans them deterministically.
    providers: HashMap<String, BTreeMap<String, MethodMap>>,
    operations: Vec<Arc<Operation>>,
}

impl OperationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes every operation of `spec`. Paths without a built matcher are
    /// skipped. Returns the number of operations added.
    pub fn add_spec(&mut self, spec: &SpecDocument) -> usize {
        let mut added = 0;
        for path in &spec.paths {
            let Some(regex) = &path.regex else {
                tracing::debug!(spec = %spec.id, template = %path.template, "Skipping path without matcher");
                continue;
            };
            let template_path = path.template.split('?').next().unwrap_or_default();
            for def in &path.operations {
                let operation = Arc::new(Operation::new(spec, &path.template, Arc::clone(regex), def));
                let provider = match provider_from_path(template_path) {
                    Some(provider) if !provider.starts_with('{') => provider.to_lowercase(),
                    _ => UNKNOWN_PROVIDER.to_string(),
                };
                let version = operation.api_version.clone();
                if let Some(hint) = &spec.provider_hint
                    && !hint.eq_ignore_ascii_case(&provider)
                    && provider != UNKNOWN_PROVIDER
                {
                    tracing::debug!(
                        spec = %spec.id,
                        template = %path.template,
                        hint = %hint,
                        provider = %provider,
                        "Path provider differs from document location"
                    );
                }

                self.providers
                    .entry(provider)
                    .or_default()
                    .entry(version)
                    .or_default()
                    .entry(operation.method.as_str().to_lowercase())
                    .or_default()
                    .insert(Arc::clone(&operation));
                self.operations.push(operation);
                added += 1;
            }
        }
        added
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn operations(&self) -> &[Arc<Operation>] {
        &self.operations
    }

    /// Finds the single operation `request` targets.
    pub fn search(&self, request: &ValidationRequest) -> RouteResult<RouteMatch> {
        if request.path.contains("//") {
            return Err(RouteError::DoubleForwardSlashes(format!(
                "Found double forward slashes in request url path \"{}\".",
                request.path
            )));
        }

        let mut matches = match self.lookup(request, &request.provider, &request.api_version) {
            Ok(matches) => matches,
            Err(reason) => {
                tracing::debug!(code = reason.code(), reason = %reason, "Falling back to unknown provider");
                self.lookup_unknown(request).ok_or(reason)?
            }
        };

        if matches.len() > 1 {
            let found: Vec<Value> = matches
                .iter()
                .map(|m| {
                    json!({
                        "id": m.operation.operation_id,
                        "path": m.operation.template,
                        "specPath": &*m.operation.spec_id,
                    })
                })
                .collect();
            return Err(RouteError::MultipleOperationsFound(format!(
                "Found multiple matching operations for request url \"{}\" with HTTP Method \"{}\".Operation Information: {}",
                request.request_url,
                request.method,
                Value::Array(found)
            )));
        }
        matches.pop().ok_or_else(|| {
            RouteError::OperationNotFound(not_found_message(request, &request.provider, &request.api_version))
        })
    }

    fn lookup(&self, request: &ValidationRequest, provider: &str, api_version: &str) -> RouteResult<Vec<RouteMatch>> {
        if request.path.is_empty() {
            return Err(RouteError::PathNotFound(format!(
                "Could not find path from requestUrl: \"{}\".",
                request.request_url
            )));
        }
        let versions = self.providers.get(provider).ok_or_else(|| {
            RouteError::OperationNotFoundWithProvider(format!(
                "Could not find provider \"{provider}\" in the cache."
            ))
        })?;
        let methods = versions.get(api_version).ok_or_else(|| {
            RouteError::OperationNotFoundWithApi(format!(
                "Could not find exact api-version \"{api_version}\" for provider \"{provider}\" in the cache."
            ))
        })?;
        let bucket = methods.get(&request.method).ok_or_else(|| {
            RouteError::OperationNotFoundWithVerb(format!(
                "Could not find any methods with verb \"{}\" for api-version \"{api_version}\" and provider \"{provider}\" in the cache.",
                request.method
            ))
        })?;

        let matches = bucket.find(request, api_version);
        if matches.is_empty() {
            return Err(RouteError::OperationNotFound(not_found_message(request, provider, api_version)));
        }
        Ok(matches)
    }

    /// Tries the unknown-provider bucket, first under the request's
    /// api-version and then under every other version it holds.
    fn lookup_unknown(&self, request: &ValidationRequest) -> Option<Vec<RouteMatch>> {
        if let Ok(matches) = self.lookup(request, UNKNOWN_PROVIDER, &request.api_version) {
            return Some(matches);
        }
        let versions = self.providers.get(UNKNOWN_PROVIDER)?;
        versions
            .keys()
            .filter(|version| **version != request.api_version)
            .find_map(|version| self.lookup(request, UNKNOWN_PROVIDER, version).ok())
    }
}

fn not_found_message(request: &ValidationRequest, provider: &str, api_version: &str) -> String {
    format!(
        "Could not find best match operation for verb \"{}\" for api-version \"{api_version}\" and provider \"{provider}\" in the cache.",
        request.method
    )
}
