//! The live validator facade.
//!
//! [`LiveValidator::initialize`] discovers and loads contracts, runs the
//! schema transforms and indexes every operation. Validate calls then route
//! each request to its operation and run the operation's validator, which
//! is compiled on first use or ahead of time by pre-compilation.

use std::{
    borrow::Cow,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use serde_json::{Map, Value, json};

use crate::{
    compiler::{Compiler, CompilerOptions},
    config::ValidatorConfig,
    observability::metrics::{record_route_miss, record_validation, set_cached_operations},
    routing::{OperationCache, RouteError, RouteMatch, ValidationRequest, parse_url},
    swagger::{FileSystemLoader, LoadResult, SchemaArena, SwaggerReader, discovery::discover_spec_paths},
    transform::{TransformContext, TransformOptions, transform_global, transform_spec},
    validation::{
        INCORRECT_INPUT, INTERNAL_ERROR, IssueCode, LiveRequest, LiveResponse, LiveValidationResult,
        OperationInfo, REQUEST_VALIDATION_ERROR, RESPONSE_VALIDATION_ERROR, RequestResponseLiveValidationResult,
        RequestResponsePair, RuntimeException, ValidateOptions, filter_included, header_value, normalize_status_code,
        validate_request, validate_response,
    },
};

const CORRELATION_ID_HEADER: &str = "x-ms-correlation-request-id";
const ACTIVITY_ID_HEADER: &str = "x-ms-request-id";

/// Shape every request/response pair must have before it is deserialized.
static PAIR_SHAPE: Lazy<Result<jsonschema::Validator, String>> = Lazy::new(|| {
    let schema = json!({
        "type": "object",
        "required": ["liveRequest", "liveResponse"],
        "properties": {
            "liveRequest": {
                "type": "object",
                "required": ["url", "method"],
                "properties": {
                    "url": {"type": "string"},
                    "method": {"type": "string"},
                    "headers": {"type": "object"},
                    "query": {"type": "object"}
                }
            },
            "liveResponse": {
                "type": "object",
                "required": ["statusCode"],
                "properties": {
                    "statusCode": {"type": "string"},
                    "headers": {"type": "object"}
                }
            }
        }
    });
    jsonschema::draft7::new(&schema).map_err(|e| e.to_string())
});

/// Target of the request a response answers.
#[derive(Debug, Clone, Copy)]
pub struct RequestTarget<'a> {
    pub url: &'a str,
    pub method: &'a str,
}

/// Counts reported by [`LiveValidator::initialize`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitializeSummary {
    pub specs_loaded: usize,
    pub specs_failed: usize,
    pub operations: usize,
}

/// Everything built by one initialize; replaced wholesale on re-initialize.
struct State {
    cache: OperationCache,
    compiler: Compiler,
    precompiled: AtomicBool,
}

impl State {
    fn empty(is_arm_call: bool) -> Self {
        Self {
            cache: OperationCache::new(),
            compiler: Compiler::new(Arc::new(SchemaArena::new()), CompilerOptions { is_arm_call }),
            precompiled: AtomicBool::new(false),
        }
    }

    /// Compiles every validator in random order, yielding between
    /// operations so request handling keeps making progress.
    async fn precompile_all(&self, yield_between: bool) -> usize {
        let mut operations = self.cache.operations().to_vec();
        operations.shuffle(&mut rand::thread_rng());

        let mut failures = 0;
        for operation in operations {
            failures += operation.precompile(&self.compiler).await;
            if yield_between {
                tokio::task::yield_now().await;
            }
        }
        self.precompiled.store(true, Ordering::Release);
        failures
    }
}

pub struct LiveValidator {
    config: ValidatorConfig,
    state: RwLock<Arc<State>>,
}

impl LiveValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        let state = State::empty(config.is_arm_call);
        Self {
            config,
            state: RwLock::new(Arc::new(state)),
        }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    fn state(&self) -> Arc<State> {
        Arc::clone(&self.state.read())
    }

    /// Number of indexed operations.
    pub fn operation_count(&self) -> usize {
        self.state().cache.len()
    }

    /// Whether every validator has been pre-compiled, either by initialize
    /// or by the background task it started.
    pub fn is_load_in_background_completed(&self) -> bool {
        self.state().precompiled.load(Ordering::Acquire)
    }

    /// Loads every discovered contract and swaps in the new operation index.
    ///
    /// Contracts that fail to load or transform are logged and skipped.
    /// Only discovery failures are returned as errors.
    #[tracing::instrument(skip(self), fields(directory = %self.config.directory.display()))]
    pub async fn initialize(&self) -> LoadResult<InitializeSummary> {
        let started = Instant::now();
        let paths = discover_spec_paths(&self.config)?;
        tracing::info!(count = paths.len(), "Discovered contract files");

        let reader = SwaggerReader::new(FileSystemLoader);
        let fetched: Vec<(String, bool)> = stream::iter(paths)
            .map(|path| {
                let reader = &reader;
                async move {
                    match reader.fetch(&path).await {
                        Ok(()) => (path, true),
                        Err(error) => {
                            tracing::warn!(spec = %path, error = %error, "Failed to load contract");
                            (path, false)
                        }
                    }
                }
            })
            .buffered(self.config.max_concurrent_loads.max(1))
            .collect()
            .await;

        let mut summary = InitializeSummary::default();
        let mut arena = SchemaArena::new();
        let mut ctx = TransformContext::new(TransformOptions {
            is_path_case_sensitive: self.config.is_path_case_sensitive,
            model_implicit_default_response: self.config.model_implicit_default_response,
        });
        let mut documents = Vec::new();
        for (path, loaded) in fetched {
            if !loaded {
                summary.specs_failed += 1;
                continue;
            }
            let built = reader
                .build(&path, &mut arena)
                .map_err(|e| e.to_string())
                .and_then(|mut document| {
                    transform_spec(&mut document, &mut arena, &mut ctx)
                        .map(|()| document)
                        .map_err(|e| e.to_string())
                });
            match built {
                Ok(document) => documents.push(document),
                Err(error) => {
                    tracing::warn!(spec = %path, error = %error, "Failed to prepare contract");
                    summary.specs_failed += 1;
                }
            }
        }
        transform_global(&mut arena, &mut ctx);

        let mut cache = OperationCache::new();
        for document in &documents {
            let added = cache.add_spec(document);
            tracing::debug!(spec = %document.id, operations = added, "Indexed contract");
        }
        summary.specs_loaded = documents.len();
        summary.operations = cache.len();
        set_cached_operations(cache.len());

        let state = Arc::new(State {
            cache,
            compiler: Compiler::new(
                Arc::new(arena),
                CompilerOptions {
                    is_arm_call: self.config.is_arm_call,
                },
            ),
            precompiled: AtomicBool::new(false),
        });
        *self.state.write() = Arc::clone(&state);

        if self.config.load_validator_in_initialize {
            let failures = state.precompile_all(false).await;
            tracing::info!(failures, "Pre-compiled validators");
        } else if self.config.load_validator_in_background {
            tokio::spawn(async move {
                let started = Instant::now();
                let failures = state.precompile_all(true).await;
                tracing::info!(
                    failures,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Background validator compilation complete"
                );
            });
        }

        tracing::info!(
            specs_loaded = summary.specs_loaded,
            specs_failed = summary.specs_failed,
            operations = summary.operations,
            documents = reader.document_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Live validator initialized"
        );
        Ok(summary)
    }

    /// Validates one live request.
    #[tracing::instrument(skip_all, fields(method = %request.method, url = %request.url))]
    pub async fn validate_live_request(&self, request: &LiveRequest, options: &ValidateOptions) -> LiveValidationResult {
        let state = self.state();
        let routed = route(&state, request.url.as_str(), request.method.as_str(), &request.headers);
        self.request_result(&state, &routed, request, options).await
    }

    /// Validates one live response to the request described by `target`.
    #[tracing::instrument(
        skip_all,
        fields(method = %target.method, url = %target.url, status = %response.status_code)
    )]
    pub async fn validate_live_response(
        &self,
        response: &LiveResponse,
        target: RequestTarget<'_>,
        options: &ValidateOptions,
    ) -> LiveValidationResult {
        let state = self.state();
        let routed = route(&state, target.url, target.method, &response.headers);
        self.response_result(&state, &routed, response, options).await
    }

    /// Validates a request and its response; both are routed once.
    #[tracing::instrument(
        skip_all,
        fields(method = %pair.live_request.method, url = %pair.live_request.url)
    )]
    pub async fn validate_live_request_response(
        &self,
        pair: &RequestResponsePair,
        options: &ValidateOptions,
    ) -> RequestResponseLiveValidationResult {
        let state = self.state();
        let request = &pair.live_request;
        let routed = route(&state, &request.url, &request.method, &request.headers);
        let request_validation_result = self.request_result(&state, &routed, request, options).await;
        let response_validation_result = self
            .response_result(&state, &routed, &pair.live_response, options)
            .await;
        RequestResponseLiveValidationResult {
            request_validation_result,
            response_validation_result,
            runtime_exception: None,
        }
    }

    /// Checks the shape of an untyped pair, then validates it.
    pub async fn validate_live_request_response_json(
        &self,
        input: &Value,
        options: &ValidateOptions,
    ) -> RequestResponseLiveValidationResult {
        match check_pair_shape(input) {
            Ok(pair) => self.validate_live_request_response(&pair, options).await,
            Err(exception) => RequestResponseLiveValidationResult {
                runtime_exception: Some(exception),
                ..Default::default()
            },
        }
    }

    fn include_errors<'a>(&'a self, options: &'a ValidateOptions) -> &'a [IssueCode] {
        if options.include_errors.is_empty() {
            &self.config.include_errors
        } else {
            &options.include_errors
        }
    }

    async fn request_result(
        &self,
        state: &State,
        routed: &Result<RouteMatch, RouteError>,
        request: &LiveRequest,
        options: &ValidateOptions,
    ) -> LiveValidationResult {
        let started = Instant::now();
        let result = match routed {
            Err(error) => LiveValidationResult::failed(OperationInfo::default(), error.into()),
            Ok(matched) => {
                let info = operation_info(matched);
                let query = match &request.query {
                    Some(query) => query.clone(),
                    None => query_from_url(&request.url),
                };
                match validate_request(&state.compiler, matched, request, query, self.config.is_arm_call).await {
                    Ok(issues) => {
                        LiveValidationResult::completed(info, filter_included(issues, self.include_errors(options)))
                    }
                    Err(error) => {
                        tracing::error!(operation_id = %info.operation_id, error = %error, "Request validation failed");
                        let message = format!(
                            "An error occurred while validating the live request for operation \"{}\". The error is:\n {}",
                            info.operation_id, error
                        );
                        LiveValidationResult::failed(info, RuntimeException::new(REQUEST_VALIDATION_ERROR, message))
                    }
                }
            }
        };
        record("request", &result, started);
        result
    }

    async fn response_result(
        &self,
        state: &State,
        routed: &Result<RouteMatch, RouteError>,
        response: &LiveResponse,
        options: &ValidateOptions,
    ) -> LiveValidationResult {
        let started = Instant::now();
        let result = match routed {
            Err(error) => LiveValidationResult::failed(OperationInfo::default(), error.into()),
            Ok(matched) => {
                let info = operation_info(matched);
                let status = normalize_status_code(&response.status_code);
                let response = if status == response.status_code {
                    Cow::Borrowed(response)
                } else {
                    Cow::Owned(LiveResponse {
                        status_code: status,
                        ..response.clone()
                    })
                };
                match validate_response(&state.compiler, &matched.operation, &response, self.config.is_arm_call).await
                {
                    Ok(issues) => {
                        LiveValidationResult::completed(info, filter_included(issues, self.include_errors(options)))
                    }
                    Err(error) => {
                        tracing::error!(operation_id = %info.operation_id, error = %error, "Response validation failed");
                        let message = format!(
                            "An error occurred while validating the live response for operation \"{}\". The error is:\n {}",
                            info.operation_id, error
                        );
                        LiveValidationResult::failed(info, RuntimeException::new(RESPONSE_VALIDATION_ERROR, message))
                    }
                }
            }
        };
        record("response", &result, started);
        result
    }
}

fn route(
    state: &State,
    url: &str,
    method: &str,
    headers: &Map<String, Value>,
) -> Result<RouteMatch, RouteError> {
    let correlation_id = header_value(headers, CORRELATION_ID_HEADER).unwrap_or_default();
    let activity_id = header_value(headers, ACTIVITY_ID_HEADER).unwrap_or_default();
    let routed = ValidationRequest::parse(url, method, correlation_id, activity_id)
        .and_then(|request| {
            let found = state.cache.search(&request);
            if let Err(error) = &found {
                tracing::info!(
                    code = error.code(),
                    provider = %request.provider,
                    api_version = %request.api_version,
                    correlation_id = %request.correlation_id,
                    activity_id = %request.activity_id,
                    "Request could not be routed"
                );
            }
            found
        });
    if let Err(error) = &routed {
        record_route_miss(error.code());
    }
    routed
}

fn operation_info(matched: &RouteMatch) -> OperationInfo {
    OperationInfo {
        operation_id: matched.operation.operation_id.clone(),
        api_version: matched.api_version.clone(),
    }
}

fn record(kind: &'static str, result: &LiveValidationResult, started: Instant) {
    let outcome = match result.is_successful {
        Some(true) => "valid",
        Some(false) => "invalid",
        None => "runtime_exception",
    };
    record_validation(kind, outcome, result.errors.len(), started.elapsed().as_secs_f64());
}

/// Query of `url` with its original casing; repeated keys become arrays.
fn query_from_url(url: &str) -> Map<String, Value> {
    let mut query = Map::new();
    let Ok(parsed) = parse_url(url) else {
        return query;
    };
    for (key, value) in parsed.query_pairs() {
        let value = Value::String(value.into_owned());
        match query.get_mut(key.as_ref()) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                query.insert(key.into_owned(), value);
            }
        }
    }
    query
}

fn check_pair_shape(input: &Value) -> Result<RequestResponsePair, RuntimeException> {
    if input.is_null() {
        return Err(RuntimeException::new(
            INCORRECT_INPUT,
            "requestResponseObj cannot be null or undefined and must be of type \"object\".",
        ));
    }
    let incorrect = |message: &str, path: &str| {
        let rendered = serde_json::to_string_pretty(input).unwrap_or_else(|_| input.to_string());
        RuntimeException::new(
            INCORRECT_INPUT,
            format!("Found errors \"{message}\" in the provided input in path {path}:\n{rendered}."),
        )
    };

    let validator = PAIR_SHAPE
        .as_ref()
        .map_err(|e| RuntimeException::new(INTERNAL_ERROR, e.clone()))?;
    if let Some(error) = validator.iter_errors(input).next() {
        return Err(incorrect(&error.to_string(), &error.instance_path.to_string()));
    }
    serde_json::from_value(input.clone()).map_err(|e| incorrect(&e.to_string(), ""))
}
