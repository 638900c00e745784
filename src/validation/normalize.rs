//! Turns raw violations into reported issues.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::{IssueCode, LiveValidationIssue, SourceLocation};
use crate::{
    compiler::{Direction, PathSegment, Violation},
    swagger::escape_pointer_token,
};

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap());

const ARM_ID_FORMAT_MESSAGE: &str = "Object didn't pass validation for format arm-id";

/// Facts about the validated exchange that change how issues are reported.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeContext<'a> {
    pub direction: Direction,
    /// Response status as declared, e.g. `"202"`.
    pub status_code: Option<&'a str>,
    pub long_running: bool,
    pub is_arm_call: bool,
    /// Document reported when a violation carries no source url.
    pub spec_url: &'a str,
}

/// Groups violations that share code, message and source, then rewrites
/// each group into a reported issue. Issues dropped by the skip rules are
/// removed.
pub fn normalize(violations: Vec<Violation>, ctx: &NormalizeContext<'_>) -> Vec<LiveValidationIssue> {
    let mut groups: Vec<(Violation, Vec<Vec<PathSegment>>)> = Vec::new();
    let mut index: HashMap<(IssueCode, String, String, String), usize> = HashMap::new();
    for mut violation in violations {
        let key = (
            violation.code,
            violation.message.clone(),
            violation.source.url.to_string(),
            violation.source.pointer.clone(),
        );
        let path = std::mem::take(&mut violation.path);
        match index.get(&key) {
            Some(&at) => {
                let paths = &mut groups[at].1;
                if !paths.contains(&path) {
                    paths.push(path);
                }
            }
            None => {
                index.insert(key, groups.len());
                groups.push((violation, vec![path]));
            }
        }
    }

    groups
        .into_iter()
        .filter_map(|(violation, paths)| to_issue(violation, paths, ctx))
        .collect()
}

fn to_issue(
    mut violation: Violation,
    paths: Vec<Vec<PathSegment>>,
    ctx: &NormalizeContext<'_>,
) -> Option<LiveValidationIssue> {
    let inner = std::mem::take(&mut violation.inner);
    let url = if violation.source.url.is_empty() {
        ctx.spec_url.to_string()
    } else {
        violation.source.url.to_string()
    };
    let mut issue = LiveValidationIssue::new(
        violation.code,
        violation.message,
        SourceLocation {
            url,
            json_ref: Some(format!("#{}", violation.source.pointer)),
            position: violation.source.position,
        },
    );
    issue.schema_path = violation.schema_path;
    issue.params = violation.params;
    if !inner.is_empty() {
        issue.inner = Some(normalize(inner, ctx));
    }

    let mut skip = false;
    for segments in &paths {
        let json_path = to_json_path(segments);
        match issue.code {
            IssueCode::MissingResourceId if json_path.contains("properties") => {
                skip = true;
                continue;
            }
            IssueCode::InvalidType if !ctx.is_arm_call && issue.schema_path.contains("additionalProperties") => {
                tracing::error!(
                    code = %issue.code,
                    path = %json_path,
                    schema_path = %issue.schema_path,
                    message = %issue.message,
                    "AdditionalProperties validation failed"
                );
                skip = true;
                continue;
            }
            IssueCode::InvalidFormat if !ctx.is_arm_call && issue.message.contains(ARM_ID_FORMAT_MESSAGE) => {
                tracing::error!(path = %json_path, message = %issue.message, "arm-id format validation failed");
                skip = true;
            }
            _ => {}
        }

        let is_required = issue.code == IssueCode::ObjectMissingRequiredProperty;
        let is_body = matches!(segments.first(), Some(PathSegment::Key(key)) if key == "body");

        if is_body && (segments.len() > 1 || !is_required) {
            issue.json_paths_in_payload.push(format!("${}", to_json_path(&segments[1..])));
            issue.paths_in_payload.push(to_pointer(&segments[1..]));
            continue;
        }

        if is_required {
            skip |= remap_required(&mut issue, segments, is_body, ctx);
        }
        issue.json_paths_in_payload.push(json_path);
        issue.paths_in_payload.push(to_pointer(segments));
    }

    (!skip).then_some(issue)
}

/// Rewrites a missing-property issue at the envelope level. Returns whether
/// the issue should be dropped.
fn remap_required(
    issue: &mut LiveValidationIssue,
    segments: &[PathSegment],
    is_body: bool,
    ctx: &NormalizeContext<'_>,
) -> bool {
    let mut skip = false;
    match ctx.direction {
        Direction::Response if is_body => {
            issue.code = IssueCode::InvalidResponseBody;
            skip = ctx.long_running && matches!(ctx.status_code, Some("201" | "202"));
        }
        Direction::Response => {
            if matches!(segments.first(), Some(PathSegment::Key(key)) if key == "headers") {
                issue.code = IssueCode::InvalidResponseHeader;
            }
        }
        Direction::Request => issue.code = IssueCode::MissingRequiredParameter,
    }

    let missing = issue
        .params
        .first()
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    issue.severity = issue.code.severity();
    issue.message = match issue.code {
        IssueCode::MissingRequiredParameter => "Value is required but was not provided".to_string(),
        IssueCode::InvalidResponseBody => "Body is required in response but not provided".to_string(),
        IssueCode::InvalidResponseHeader => {
            format!("Header {missing} is required in response but not provided")
        }
        _ => format!("Missing required property: {missing}"),
    };
    skip
}

/// Formats a payload location as a JSON path: `.key` for identifier keys,
/// `['key']` otherwise and `[0]` for indices.
pub fn to_json_path(segments: &[PathSegment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            PathSegment::Key(key) if IDENTIFIER.is_match(key) => {
                out.push('.');
                out.push_str(key);
            }
            PathSegment::Key(key) => {
                out.push_str("['");
                out.push_str(&key.replace('\\', "\\\\").replace('\'', "\\'"));
                out.push_str("']");
            }
            PathSegment::Index(index) => out.push_str(&format!("[{index}]")),
        }
    }
    out
}

fn to_pointer(segments: &[PathSegment]) -> String {
    segments
        .iter()
        .map(|segment| match segment {
            PathSegment::Key(key) => format!("/{}", escape_pointer_token(key)),
            PathSegment::Index(index) => format!("/{index}"),
        })
        .collect()
}

/// Keeps only issues whose code is in `include`; an empty list keeps all.
pub fn filter_included(issues: Vec<LiveValidationIssue>, include: &[IssueCode]) -> Vec<LiveValidationIssue> {
    if include.is_empty() {
        return issues;
    }
    issues.into_iter().filter(|issue| include.contains(&issue.code)).collect()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::swagger::{Position, SchemaSource};

    fn key(k: &str) -> PathSegment {
        PathSegment::Key(k.to_string())
    }

    fn violation(code: IssueCode, message: &str, path: Vec<PathSegment>, params: Vec<Value>) -> Violation {
        let mut v = Violation::for_test(code, message, path, SchemaSource::new("spec.json", "/definitions/Pet"));
        v.params = params;
        v
    }

    fn ctx(direction: Direction) -> NormalizeContext<'static> {
        NormalizeContext {
            direction,
            status_code: None,
            long_running: false,
            is_arm_call: true,
            spec_url: "spec.json",
        }
    }

    #[test]
    fn test_body_paths_become_dollar_paths() {
        let issues = normalize(
            vec![violation(
                IssueCode::InvalidType,
                "Expected type string but found type integer",
                vec![key("body"), key("tags"), PathSegment::Index(0), key("x-name")],
                Vec::new(),
            )],
            &ctx(Direction::Request),
        );
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].json_paths_in_payload, vec!["$.tags[0]['x-name']"]);
        assert_eq!(issues[0].paths_in_payload, vec!["/tags/0/x-name"]);
        assert_eq!(issues[0].source.json_ref.as_deref(), Some("#/definitions/Pet"));
    }

    #[test]
    fn test_missing_body_property_keeps_code() {
        let issues = normalize(
            vec![violation(
                IssueCode::ObjectMissingRequiredProperty,
                "Missing required property: name",
                vec![key("body"), key("name")],
                vec![Value::from("name")],
            )],
            &ctx(Direction::Request),
        );
        assert_eq!(issues[0].code, IssueCode::ObjectMissingRequiredProperty);
        assert_eq!(issues[0].json_paths_in_payload, vec!["$.name"]);
    }

    #[rstest]
    #[case::request_query(
        Direction::Request,
        vec![key("query"), key("api-version")],
        IssueCode::MissingRequiredParameter,
        "Value is required but was not provided"
    )]
    #[case::response_body(
        Direction::Response,
        vec![key("body")],
        IssueCode::InvalidResponseBody,
        "Body is required in response but not provided"
    )]
    #[case::response_header(
        Direction::Response,
        vec![key("headers"), key("location")],
        IssueCode::InvalidResponseHeader,
        "Header location is required in response but not provided"
    )]
    fn test_required_miss_remapped(
        #[case] direction: Direction,
        #[case] path: Vec<PathSegment>,
        #[case] code: IssueCode,
        #[case] message: &str,
    ) {
        let missing = match path.last() {
            Some(PathSegment::Key(k)) => k.clone(),
            _ => String::new(),
        };
        let issues = normalize(
            vec![violation(
                IssueCode::ObjectMissingRequiredProperty,
                "Missing required property",
                path,
                vec![Value::from(missing)],
            )],
            &ctx(direction),
        );
        assert_eq!(issues[0].code, code);
        assert_eq!(issues[0].message, message);
        assert_eq!(issues[0].severity, code.severity());
    }

    #[test]
    fn test_long_running_accepted_without_body() {
        let context = NormalizeContext {
            status_code: Some("202"),
            long_running: true,
            ..ctx(Direction::Response)
        };
        let issues = normalize(
            vec![violation(
                IssueCode::ObjectMissingRequiredProperty,
                "Missing required property: body",
                vec![key("body")],
                vec![Value::from("body")],
            )],
            &context,
        );
        assert!(issues.is_empty());
    }

    #[test]
    fn test_duplicates_collapse_with_paths() {
        let make = |index| {
            violation(
                IssueCode::InvalidType,
                "Expected type string but found type integer",
                vec![key("body"), PathSegment::Index(index)],
                Vec::new(),
            )
        };
        let issues = normalize(vec![make(0), make(1), make(0)], &ctx(Direction::Request));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].json_paths_in_payload, vec!["$[0]", "$[1]"]);
    }

    #[test]
    fn test_position_carried_through_collapse() {
        let position = Position { line: 12, column: 9 };
        let make = |name: &str| {
            let mut v = violation(
                IssueCode::InvalidType,
                "Expected type string but found type integer",
                vec![key("body"), key(name)],
                Vec::new(),
            );
            v.source = v.source.clone().at(Some(position));
            v
        };
        let issues = normalize(vec![make("a"), make("b")], &ctx(Direction::Request));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].source.position, Some(position));
        assert_eq!(issues[0].json_paths_in_payload, vec!["$.a", "$.b"]);
    }

    #[test]
    fn test_branch_failures_normalized_as_inner() {
        let mut any_of = violation(
            IssueCode::AnyOfMissing,
            "Data does not match any schemas from 'anyOf'",
            vec![key("body"), key("size")],
            Vec::new(),
        );
        any_of.inner = vec![
            violation(
                IssueCode::InvalidType,
                "Expected type integer but found type string",
                vec![key("body"), key("size")],
                Vec::new(),
            ),
            violation(
                IssueCode::InvalidType,
                "Expected type boolean but found type string",
                vec![key("body"), key("size")],
                Vec::new(),
            ),
        ];
        let plain = violation(IssueCode::MaxLength, "String is too long", vec![key("body"), key("name")], Vec::new());

        let issues = normalize(vec![any_of, plain], &ctx(Direction::Request));
        assert_eq!(issues.len(), 2);
        let inner = issues[0].inner.as_ref().unwrap();
        assert_eq!(inner.len(), 2);
        assert_eq!(inner[1].json_paths_in_payload, vec!["$.size"]);
        assert!(issues[1].inner.is_none());
    }

    #[test]
    fn test_skip_rules() {
        let nested_resource = violation(
            IssueCode::MissingResourceId,
            "id is required",
            vec![key("body"), key("properties"), key("child")],
            Vec::new(),
        );
        let mut additional = violation(
            IssueCode::InvalidType,
            "Expected type string but found type integer",
            vec![key("body"), key("extra")],
            Vec::new(),
        );
        additional.schema_path = "#/additionalProperties/type".to_string();

        let non_arm = NormalizeContext {
            is_arm_call: false,
            ..ctx(Direction::Response)
        };
        assert!(normalize(vec![nested_resource, additional.clone()], &non_arm).is_empty());
        assert_eq!(normalize(vec![additional], &ctx(Direction::Response)).len(), 1);
    }

    #[test]
    fn test_filter_included() {
        let issues = normalize(
            vec![
                violation(IssueCode::InvalidType, "a", vec![key("body")], Vec::new()),
                violation(IssueCode::Pattern, "b", vec![key("body")], Vec::new()),
            ],
            &ctx(Direction::Request),
        );
        let kept = filter_included(issues.clone(), &[IssueCode::Pattern]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].code, IssueCode::Pattern);
        assert_eq!(filter_included(issues, &[]).len(), 2);
    }
}
