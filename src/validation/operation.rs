//! Request and response validation for a routed operation.

use std::collections::HashMap;

use http::{Method, StatusCode};
use serde_json::{Map, Value};

use super::{
    IssueCode, LiveRequest, LiveResponse, LiveValidationIssue, SourceLocation,
    normalize::{NormalizeContext, normalize},
};
use crate::{
    compiler::{CompileError, Compiler, Direction, ValidationContext},
    routing::{Coercion, Operation, RouteMatch, coerce_map},
};

const DEFAULT_RESPONSE_CONTENT_TYPE: &str = "application/octet-stream";

/// Validates a request against the operation it was routed to.
///
/// `query` is the request query with its original casing.
#[tracing::instrument(
    skip_all,
    fields(operation_id = %matched.operation.operation_id)
)]
pub async fn validate_request(
    compiler: &Compiler,
    matched: &RouteMatch,
    request: &LiveRequest,
    mut query: Map<String, Value>,
    is_arm_call: bool,
) -> Result<Vec<LiveValidationIssue>, CompileError> {
    let operation = &matched.operation;
    let program = operation.request_program(compiler).await?;

    let mut path = matched.path_params.clone();
    coerce_map(&mut path, &operation.path_coercions);
    coerce_map(&mut query, &operation.query_coercions);
    let headers = lower_headers(&request.headers, &operation.header_coercions);

    let mut issues = Vec::new();
    check_content_type(&operation.consumes, &headers, true, operation, &mut issues);

    let body = match &request.body {
        Some(Value::Object(map)) if map.is_empty() && operation.optional_body => None,
        body => body.clone(),
    };
    let mut envelope = Map::new();
    envelope.insert("path".to_string(), Value::Object(path));
    if let Some(body) = body {
        envelope.insert("body".to_string(), body);
    }
    envelope.insert("headers".to_string(), Value::Object(headers));
    envelope.insert("query".to_string(), Value::Object(query));

    let violations = program.validate(
        &Value::Object(envelope),
        &ValidationContext::request(operation.method.clone()),
    );
    let ctx = NormalizeContext {
        direction: Direction::Request,
        status_code: None,
        long_running: operation.long_running,
        is_arm_call,
        spec_url: &operation.spec_id,
    };
    issues.extend(normalize(violations, &ctx));
    Ok(issues)
}

/// Validates a response against the operation its request was routed to.
///
/// `response.status_code` must already be numeric; see
/// [`normalize_status_code`].
#[tracing::instrument(
    skip_all,
    fields(operation_id = %operation.operation_id, status = %response.status_code)
)]
pub async fn validate_response(
    compiler: &Compiler,
    operation: &Operation,
    response: &LiveResponse,
    is_arm_call: bool,
) -> Result<Vec<LiveValidationIssue>, CompileError> {
    let status = response.status_code.as_str();
    let numeric = status.parse::<u16>().ok();
    let declared = operation.response(status).or_else(|| {
        numeric
            .filter(|code| (400..=599).contains(code))
            .and_then(|_| operation.response("default"))
    });
    let Some(declared) = declared else {
        let mut issue = LiveValidationIssue::new(
            IssueCode::InvalidResponseCode,
            format!("The swagger file does not define '{status}' response code"),
            responses_source(operation),
        );
        issue.params = vec![Value::from(status)];
        return Ok(vec![issue]);
    };

    let program = operation.response_program(declared, compiler).await?;
    let headers = lower_headers(&response.headers, &declared.header_coercions);

    let mut issues = Vec::new();
    if declared.has_schema() {
        check_content_type(&operation.produces, &headers, false, operation, &mut issues);
        if is_arm_call && numeric.is_some_and(|code| (200..300).contains(&code)) {
            check_long_running(operation, status, &headers, &mut issues);
        }
    }

    let mut envelope = Map::new();
    envelope.insert("headers".to_string(), Value::Object(headers));
    if let Some(body) = &response.body {
        envelope.insert("body".to_string(), body.clone());
    }
    let violations = program.validate(
        &Value::Object(envelope),
        &ValidationContext::response(operation.method.clone()),
    );
    let ctx = NormalizeContext {
        direction: Direction::Response,
        status_code: Some(status),
        long_running: operation.long_running,
        is_arm_call,
        spec_url: &operation.spec_id,
    };
    issues.extend(normalize(violations, &ctx));
    Ok(issues)
}

/// Converts a reason phrase such as `OK` or `No Content` into its numeric
/// code. Known numeric codes and unrecognized values are returned as given.
pub fn normalize_status_code(status: &str) -> String {
    let is_known_code = status
        .parse::<u16>()
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .is_some_and(|code| code.canonical_reason().is_some());
    if is_known_code {
        return status.to_string();
    }

    let wanted = status.to_lowercase();
    (100..600)
        .filter_map(|code| StatusCode::from_u16(code).ok())
        .find(|code| {
            code.canonical_reason()
                .is_some_and(|reason| squash_reason(reason) == wanted)
        })
        .map(|code| code.as_u16().to_string())
        .unwrap_or_else(|| status.to_string())
}

fn squash_reason(reason: &str) -> String {
    reason
        .chars()
        .filter(|c| *c != ' ' && *c != '-')
        .collect::<String>()
        .to_lowercase()
}

fn lower_headers(headers: &Map<String, Value>, coercions: &HashMap<String, Coercion>) -> Map<String, Value> {
    let mut lowered: Map<String, Value> = headers
        .iter()
        .map(|(name, value)| (name.to_lowercase(), value.clone()))
        .collect();
    coerce_map(&mut lowered, coercions);
    lowered
}

fn check_content_type(
    allowed: &[String],
    headers: &Map<String, Value>,
    is_request: bool,
    operation: &Operation,
    issues: &mut Vec<LiveValidationIssue>,
) {
    let declared = headers
        .get("content-type")
        .and_then(Value::as_str)
        .and_then(|value| value.split(';').next())
        .filter(|value| !value.is_empty());
    let content_type = match declared {
        Some(content_type) => content_type,
        None if is_request => return,
        None => DEFAULT_RESPONSE_CONTENT_TYPE,
    };
    if allowed.iter().any(|allowed| allowed == content_type) {
        return;
    }
    // Declared types may carry parameters, e.g. `application/json;odata=minimalmetadata`.
    let parameterized_match = allowed
        .iter()
        .filter(|allowed| allowed.contains(';'))
        .filter_map(|allowed| allowed.split(';').next())
        .any(|prefix| prefix.contains(content_type));
    if parameterized_match {
        return;
    }

    let supported = allowed.join(", ");
    let mut issue = LiveValidationIssue::new(
        IssueCode::InvalidContentType,
        format!("Invalid Content-Type ({content_type}).  These are supported: {supported}"),
        operation_source(operation),
    );
    issue.params = vec![Value::from(content_type), Value::from(supported)];
    issues.push(issue);
}

fn check_long_running(
    operation: &Operation,
    status: &str,
    headers: &Map<String, Value>,
    issues: &mut Vec<LiveValidationIssue>,
) {
    if !operation.long_running {
        return;
    }
    let method = &operation.method;
    let (needs_header, accepted): (&[&str], &[&str]) = if method == Method::POST {
        (&["201", "202"], &["200", "204"])
    } else if method == Method::PATCH || method == Method::PUT {
        (&["201", "202"], &["200"])
    } else if method == Method::DELETE {
        (&["202"], &["200", "204"])
    } else {
        return;
    };

    if needs_header.contains(&status) {
        check_long_running_header(operation, status, headers, issues);
    } else if !accepted.contains(&status) {
        let mut issue = LiveValidationIssue::new(
            IssueCode::LroResponseCode,
            format!(
                "Respond to the initial request of a long running operation, Patch/Post call must return 201 or 202, \
                 Delete call must return 202 or 204, Put call must return 202 or 201 or 200, but {status} being returned"
            ),
            responses_source(operation),
        );
        issue.params = vec![Value::from(status)];
        issues.push(issue);
    }
}

fn check_long_running_header(
    operation: &Operation,
    status: &str,
    headers: &Map<String, Value>,
    issues: &mut Vec<LiveValidationIssue>,
) {
    // 201 may report progress through provisioningState instead.
    if status == "201" {
        return;
    }
    let missing = |name: &str| match headers.get(name) {
        None => true,
        Some(Value::String(value)) => value.is_empty(),
        Some(_) => false,
    };
    if missing("location") && missing("azure-asyncoperation") {
        let mut issue = LiveValidationIssue::new(
            IssueCode::LroResponseHeader,
            "Long running operation should return location or azure-AsyncOperation in header but not provided",
            responses_source(operation),
        );
        issue.params = vec![Value::from("location or azure-AsyncOperation")];
        issues.push(issue);
    }
}

fn operation_source(operation: &Operation) -> SourceLocation {
    SourceLocation {
        url: operation.spec_id.to_string(),
        json_ref: Some(format!("#{}", operation.source.pointer)),
        position: operation.source.position,
    }
}

fn responses_source(operation: &Operation) -> SourceLocation {
    SourceLocation {
        url: operation.spec_id.to_string(),
        json_ref: Some(format!("#{}/responses", operation.source.pointer)),
        position: None,
    }
}
