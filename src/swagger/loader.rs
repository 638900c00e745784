//! Contract loading.
//!
//! Loading happens in two phases. [`SwaggerReader::fetch`] is async: it
//! reads a root document through a [`Loader`] and every document reachable
//! through external `$ref`s. [`SwaggerReader::build`] is synchronous: it walks
//! the cached documents and interns schemas into a [`SchemaArena`].

use std::{
    collections::{BTreeMap, HashMap},
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::Regex;
use serde_json::{Map, Value};

use super::{
    HeaderDef, LoadError, LoadResult, OperationDef, ParameterDef, ParameterLocation, PathDef,
    PositionIndex, ResponseDef, Schema, SchemaArena, SchemaId, SchemaSource, SchemaType,
    SpecDocument, escape_pointer_token, parse_method,
};

/// Maximum number of `$ref` hops followed for parameters and responses.
const MAX_REFERENCE_HOPS: usize = 32;

/// Titles whose provider cannot be derived from the path.
const TITLE_PROVIDERS: &[(&str, &str)] = &[("ResourceManagementClient", "Microsoft.Resources")];

static PROVIDER_IN_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[/\\](?:resource-manager|data-plane)[/\\]([^/\\{}]+\.[^/\\{}]+)[/\\]")
        .expect("provider path regex")
});

/// A parsed contract document and the text positions of its nodes.
#[derive(Debug, Clone, Default)]
pub struct LoadedDocument {
    pub value: Value,
    pub positions: PositionIndex,
}

impl LoadedDocument {
    /// Parses the JSON `text` of document `id`.
    pub fn parse(id: &str, text: &str) -> LoadResult<Self> {
        // Some published contracts carry a UTF-8 byte order mark.
        let text = text.trim_start_matches('\u{feff}');
        let value = serde_json::from_str(text).map_err(|source| LoadError::Parse {
            path: id.to_string(),
            source,
        })?;
        Ok(Self {
            value,
            positions: PositionIndex::scan(text),
        })
    }
}

/// Source of raw contract documents.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Loads the JSON document identified by `id`.
    async fn load(&self, id: &str) -> LoadResult<LoadedDocument>;
}

/// Reads JSON documents from the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystemLoader;

#[async_trait]
impl Loader for FileSystemLoader {
    async fn load(&self, id: &str) -> LoadResult<LoadedDocument> {
        let contents = tokio::fs::read_to_string(id)
            .await
            .map_err(|source| LoadError::Io {
                path: id.to_string(),
                source,
            })?;
        LoadedDocument::parse(id, &contents)
    }
}

/// Caches raw documents and turns them into [`SpecDocument`]s.
pub struct SwaggerReader<L> {
    loader: L,
    documents: DashMap<String, Arc<Value>>,
    positions: DashMap<String, Arc<PositionIndex>>,
}

impl<L: Loader> SwaggerReader<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            documents: DashMap::new(),
            positions: DashMap::new(),
        }
    }

    /// Loads a root document and every document it references.
    pub async fn fetch(&self, id: &str) -> LoadResult<()> {
        let mut pending = vec![normalize_path(Path::new(id))];
        while let Some(doc_id) = pending.pop() {
            if self.documents.contains_key(&doc_id) {
                continue;
            }
            let loaded = self.loader.load(&doc_id).await?;
            collect_external_documents(&doc_id, &loaded.value, &mut pending);
            tracing::trace!(document = %doc_id, "Loaded contract document");
            self.positions.insert(doc_id.clone(), Arc::new(loaded.positions));
            self.documents.insert(doc_id, Arc::new(loaded.value));
        }
        Ok(())
    }

    /// Builds the document model of a fetched root document.
    pub fn build(&self, id: &str, arena: &mut SchemaArena) -> LoadResult<SpecDocument> {
        let id = normalize_path(Path::new(id));
        let mut builder = DocumentBuilder {
            documents: &self.documents,
            positions: &self.positions,
            arena,
            urls: HashMap::new(),
        };
        builder.spec(&id)
    }

    /// Number of cached documents, referenced ones included.
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }
}

struct DocumentBuilder<'a> {
    documents: &'a DashMap<String, Arc<Value>>,
    positions: &'a DashMap<String, Arc<PositionIndex>>,
    arena: &'a mut SchemaArena,
    urls: HashMap<String, Arc<str>>,
}

impl DocumentBuilder<'_> {
    fn document(&self, id: &str) -> LoadResult<Arc<Value>> {
        self.documents
            .get(id)
            .map(|doc| Arc::clone(doc.value()))
            .ok_or_else(|| LoadError::UnresolvableReference {
                reference: id.to_string(),
            })
    }

    fn url(&mut self, doc: &str) -> Arc<str> {
        self.urls
            .entry(doc.to_string())
            .or_insert_with(|| Arc::from(doc))
            .clone()
    }

    fn source(&mut self, doc: &str, pointer: impl Into<String>) -> SchemaSource {
        let pointer = pointer.into();
        let position = self
            .positions
            .get(doc)
            .and_then(|index| index.get(&pointer));
        SchemaSource::new(self.url(doc), pointer).at(position)
    }

    fn spec(&mut self, id: &str) -> LoadResult<SpecDocument> {
        let root = self.document(id)?;
        let object = root.as_object().ok_or_else(|| LoadError::InvalidDocument {
            path: id.to_string(),
            message: "document root is not an object".to_string(),
        })?;

        let info = object.get("info");
        let title = info
            .and_then(|i| i.get("title"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let version = info
            .and_then(|i| i.get("version"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let parameterized_host = object.get("x-ms-parameterized-host");
        let host_template = parameterized_host
            .and_then(|h| h.get("hostTemplate"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let mut host_parameters = Vec::new();
        if let Some(params) = parameterized_host
            .and_then(|h| h.get("parameters"))
            .and_then(Value::as_array)
        {
            for index in 0..params.len() {
                host_parameters.push(
                    self.parameter(id, &format!("/x-ms-parameterized-host/parameters/{index}"))?,
                );
            }
        }

        let mut definitions = Vec::new();
        if let Some(defs) = object.get("definitions").and_then(Value::as_object) {
            for name in defs.keys() {
                definitions.push(
                    self.schema_at(id, &format!("/definitions/{}", escape_pointer_token(name)))?,
                );
            }
        }

        let paths = self.paths(id, "paths")?;
        let xms_paths = self.paths(id, "x-ms-paths")?;

        let provider_hint = provider_hint(id, title.as_deref());

        Ok(SpecDocument {
            id: self.url(id),
            title,
            version,
            host: string_field(object, "host"),
            base_path: string_field(object, "basePath").unwrap_or_default(),
            host_template,
            host_parameters,
            consumes: string_list(object.get("consumes")).unwrap_or_default(),
            produces: string_list(object.get("produces")).unwrap_or_default(),
            paths,
            xms_paths,
            definitions,
            provider_hint,
        })
    }

    fn paths(&mut self, doc: &str, key: &str) -> LoadResult<Vec<PathDef>> {
        let root = self.document(doc)?;
        let Some(items) = root.get(key).and_then(Value::as_object) else {
            return Ok(Vec::new());
        };

        let mut paths = Vec::with_capacity(items.len());
        for template in items.keys() {
            let item_pointer = format!("/{key}/{}", escape_pointer_token(template));
            let (item_doc, item_pointer) = self.deref(doc, &item_pointer)?;
            let item_root = self.document(&item_doc)?;
            let Some(item) = item_root.pointer(&item_pointer).and_then(Value::as_object) else {
                continue;
            };

            let mut parameters = Vec::new();
            if let Some(params) = item.get("parameters").and_then(Value::as_array) {
                for index in 0..params.len() {
                    parameters
                        .push(self.parameter(&item_doc, &format!("{item_pointer}/parameters/{index}"))?);
                }
            }

            let mut operations = Vec::new();
            for method_key in item.keys() {
                if parse_method(method_key).is_none() {
                    continue;
                }
                operations.push(self.operation(
                    &item_doc,
                    &item_pointer,
                    method_key,
                    template,
                    &parameters,
                )?);
            }

            paths.push(PathDef {
                template: template.clone(),
                parameters,
                operations,
                regex: None,
            });
        }
        Ok(paths)
    }

    fn operation(
        &mut self,
        doc: &str,
        item_pointer: &str,
        method_key: &str,
        template: &str,
        path_parameters: &[ParameterDef],
    ) -> LoadResult<OperationDef> {
        let pointer = format!("{item_pointer}/{method_key}");
        let root = self.document(doc)?;
        let object = root
            .pointer(&pointer)
            .and_then(Value::as_object)
            .ok_or_else(|| LoadError::InvalidDocument {
                path: doc.to_string(),
                message: format!("operation at {pointer} is not an object"),
            })?;
        let method = parse_method(method_key).ok_or_else(|| LoadError::InvalidDocument {
            path: doc.to_string(),
            message: format!("unsupported method {method_key}"),
        })?;

        let mut parameters: Vec<ParameterDef> = path_parameters.to_vec();
        if let Some(params) = object.get("parameters").and_then(Value::as_array) {
            for index in 0..params.len() {
                let param = self.parameter(doc, &format!("{pointer}/parameters/{index}"))?;
                match parameters
                    .iter_mut()
                    .find(|p| p.name == param.name && p.location == param.location)
                {
                    Some(existing) => *existing = param,
                    None => parameters.push(param),
                }
            }
        }

        let mut responses = Vec::new();
        if let Some(map) = object.get("responses").and_then(Value::as_object) {
            for status in map.keys() {
                responses.push(self.response(
                    doc,
                    &format!("{pointer}/responses/{}", escape_pointer_token(status)),
                    status,
                )?);
            }
        }

        Ok(OperationDef {
            operation_id: string_field(object, "operationId")
                .unwrap_or_else(|| format!("{method_key}_{template}")),
            method,
            parameters,
            consumes: string_list(object.get("consumes")),
            produces: string_list(object.get("produces")),
            responses,
            long_running: object
                .get("x-ms-long-running-operation")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            source: self.source(doc, pointer),
        })
    }

    fn parameter(&mut self, doc: &str, pointer: &str) -> LoadResult<ParameterDef> {
        let (doc, pointer) = self.deref(doc, pointer)?;
        let root = self.document(&doc)?;
        let object = root
            .pointer(&pointer)
            .and_then(Value::as_object)
            .ok_or_else(|| LoadError::InvalidDocument {
                path: doc.clone(),
                message: format!("parameter at {pointer} is not an object"),
            })?;

        let name = string_field(object, "name").ok_or_else(|| LoadError::InvalidDocument {
            path: doc.clone(),
            message: format!("parameter at {pointer} has no name"),
        })?;
        let location = object
            .get("in")
            .and_then(Value::as_str)
            .and_then(ParameterLocation::parse)
            .ok_or_else(|| LoadError::InvalidDocument {
                path: doc.clone(),
                message: format!("parameter {name} has an unknown location"),
            })?;

        let schema = if location == ParameterLocation::Body {
            if object.contains_key("schema") {
                self.schema_at(&doc, &format!("{pointer}/schema"))?
            } else {
                let source = self.source(&doc, format!("{pointer}/schema"));
                self.arena.alloc_located(Schema::new(source))
            }
        } else {
            let id = self.schema_at(&doc, &pointer)?;
            self.arena.get_mut(id).parameter_in = Some(location);
            id
        };

        let wire_type = object
            .get("type")
            .and_then(Value::as_str)
            .and_then(SchemaType::parse);
        let is_plain_string = wire_type == Some(SchemaType::String)
            && object.keys().all(|k| {
                matches!(k.as_str(), "in" | "name" | "type" | "description" | "required")
            });

        Ok(ParameterDef {
            required: object
                .get("required")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            name,
            location,
            schema,
            wire_type,
            is_plain_string,
        })
    }

    fn response(&mut self, doc: &str, pointer: &str, status: &str) -> LoadResult<ResponseDef> {
        let (doc, pointer) = self.deref(doc, pointer)?;
        let root = self.document(&doc)?;
        let Some(object) = root.pointer(&pointer).and_then(Value::as_object) else {
            return Ok(ResponseDef {
                status: status.to_string(),
                schema: None,
                is_file: false,
                headers: Vec::new(),
            });
        };

        let schema = if object.contains_key("schema") {
            Some(self.schema_at(&doc, &format!("{pointer}/schema"))?)
        } else {
            None
        };
        let is_file = schema.is_some_and(|id| {
            self.arena.get(self.arena.resolve(id)).schema_type == Some(SchemaType::File)
        });

        let mut headers = Vec::new();
        if let Some(map) = object.get("headers").and_then(Value::as_object) {
            for (name, header) in map {
                let id = self.schema_at(
                    &doc,
                    &format!("{pointer}/headers/{}", escape_pointer_token(name)),
                )?;
                headers.push(HeaderDef {
                    name: name.clone(),
                    schema: id,
                    wire_type: header
                        .get("type")
                        .and_then(Value::as_str)
                        .and_then(SchemaType::parse),
                });
            }
        }

        Ok(ResponseDef {
            status: status.to_string(),
            schema,
            is_file,
            headers,
        })
    }

    /// Follows `$ref` chains of non-schema objects (parameters, responses,
    /// path items) to the document location that holds the object.
    fn deref(&self, doc: &str, pointer: &str) -> LoadResult<(String, String)> {
        let mut location = (doc.to_string(), pointer.to_string());
        for _ in 0..MAX_REFERENCE_HOPS {
            let root = self.document(&location.0)?;
            let reference = root
                .pointer(&location.1)
                .and_then(|v| v.get("$ref"))
                .and_then(Value::as_str);
            match reference {
                Some(reference) => location = locate(&location.0, reference),
                None => return Ok(location),
            }
        }
        Err(LoadError::UnresolvableReference {
            reference: format!("{}#{}", location.0, location.1),
        })
    }

    fn schema_at(&mut self, doc: &str, pointer: &str) -> LoadResult<SchemaId> {
        if let Some(id) = self.arena.lookup(doc, pointer) {
            return Ok(id);
        }
        let root = self.document(doc)?;
        let value = root
            .pointer(pointer)
            .ok_or_else(|| LoadError::UnresolvableReference {
                reference: format!("{doc}#{pointer}"),
            })?;

        let mut schema = Schema::new(self.source(doc, pointer));
        if pointer.starts_with("/definitions/") {
            schema.ref_self = Some(format!("{doc}#{pointer}"));
        }
        let Some(object) = value.as_object() else {
            return Ok(self.arena.alloc_located(schema));
        };

        if let Some(reference) = object.get("$ref").and_then(Value::as_str) {
            let id = self.arena.alloc_located(schema);
            let (target_doc, target_pointer) = locate(doc, reference);
            let target = self.schema_at(&target_doc, &target_pointer)?;
            self.arena.get_mut(id).reference = Some(target);
            return Ok(id);
        }

        schema.apply_keywords(object);
        let id = self.arena.alloc_located(schema);

        if let Some(props) = object.get("properties").and_then(Value::as_object) {
            let mut properties = BTreeMap::new();
            for key in props.keys() {
                let child = self.schema_at(
                    doc,
                    &format!("{pointer}/properties/{}", escape_pointer_token(key)),
                )?;
                properties.insert(key.clone(), child);
            }
            self.arena.get_mut(id).properties = Some(properties);
        }

        match object.get("items") {
            Some(Value::Object(_)) => {
                let items = self.schema_at(doc, &format!("{pointer}/items"))?;
                self.arena.get_mut(id).items = Some(items);
            }
            Some(Value::Array(tuple)) if !tuple.is_empty() => {
                let items = self.schema_at(doc, &format!("{pointer}/items/0"))?;
                self.arena.get_mut(id).items = Some(items);
            }
            _ => {}
        }

        if object.get("additionalProperties").is_some_and(Value::is_object) {
            let extra = self.schema_at(doc, &format!("{pointer}/additionalProperties"))?;
            self.arena.get_mut(id).additional_properties =
                super::AdditionalProperties::Schema(extra);
        }

        let all_of = self.schema_list(doc, pointer, object, "allOf")?;
        let any_of = self.schema_list(doc, pointer, object, "anyOf")?;
        let one_of = self.schema_list(doc, pointer, object, "oneOf")?;
        let node = self.arena.get_mut(id);
        node.all_of = all_of;
        node.any_of = any_of;
        node.one_of = one_of;

        Ok(id)
    }

    fn schema_list(
        &mut self,
        doc: &str,
        pointer: &str,
        object: &Map<String, Value>,
        keyword: &str,
    ) -> LoadResult<Option<Vec<SchemaId>>> {
        let Some(members) = object.get(keyword).and_then(Value::as_array) else {
            return Ok(None);
        };
        let mut ids = Vec::with_capacity(members.len());
        for index in 0..members.len() {
            ids.push(self.schema_at(doc, &format!("{pointer}/{keyword}/{index}"))?);
        }
        Ok(Some(ids))
    }
}

/// Splits a `$ref` into the document it names (relative to `base`) and its
/// decoded JSON pointer.
pub fn locate(base: &str, reference: &str) -> (String, String) {
    let (document, fragment) = reference.split_once('#').unwrap_or((reference, ""));
    let document = if document.is_empty() {
        base.to_string()
    } else {
        resolve_document(base, document)
    };
    let pointer = percent_decode_str(fragment).decode_utf8_lossy().into_owned();
    (document, pointer)
}

/// Resolves a document reference relative to the referencing document.
pub fn resolve_document(base: &str, reference: &str) -> String {
    let path = Path::new(reference);
    if path.is_absolute() {
        return normalize_path(path);
    }
    match Path::new(base).parent() {
        Some(parent) => normalize_path(&parent.join(path)),
        None => normalize_path(path),
    }
}

/// Lexically removes `.` and `..` components.
pub fn normalize_path(path: &Path) -> String {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(
                    normalized.components().next_back(),
                    Some(Component::Normal(_))
                );
                if can_pop {
                    normalized.pop();
                } else {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized.to_string_lossy().into_owned()
}

/// Queues every document named by an external `$ref`. Example payloads under
/// `x-ms-examples` are not part of the contract and are not followed.
fn collect_external_documents(base: &str, value: &Value, pending: &mut Vec<String>) {
    match value {
        Value::Object(object) => {
            if let Some(reference) = object.get("$ref").and_then(Value::as_str) {
                let document = reference.split('#').next().unwrap_or_default();
                if !document.is_empty() {
                    pending.push(resolve_document(base, document));
                }
            }
            for (key, child) in object {
                if key != "x-ms-examples" {
                    collect_external_documents(base, child, pending);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_external_documents(base, item, pending);
            }
        }
        _ => {}
    }
}

fn provider_hint(id: &str, title: Option<&str>) -> Option<String> {
    if let Some(captures) = PROVIDER_IN_PATH.captures(id) {
        return Some(captures[1].to_string());
    }
    let title = title?;
    TITLE_PROVIDERS
        .iter()
        .find(|(known, _)| *known == title)
        .map(|(_, provider)| provider.to_string())
}

fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    value.and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::swagger::AdditionalProperties;

    /// Serves documents from memory.
    struct MemoryLoader(HashMap<String, Value>);

    #[async_trait]
    impl Loader for MemoryLoader {
        async fn load(&self, id: &str) -> LoadResult<LoadedDocument> {
            let value = self.0.get(id).ok_or_else(|| LoadError::UnresolvableReference {
                reference: id.to_string(),
            })?;
            let text = serde_json::to_string_pretty(value).unwrap();
            LoadedDocument::parse(id, &text)
        }
    }

    fn pets_spec() -> Value {
        json!({
            "swagger": "2.0",
            "info": {"title": "PetStore", "version": "2020-01-01"},
            "basePath": "/",
            "paths": {
                "/pets/{name}": {
                    "parameters": [{"$ref": "#/parameters/NameParameter"}],
                    "put": {
                        "operationId": "Pets_Create",
                        "parameters": [
                            {"name": "pet", "in": "body", "required": true,
                             "schema": {"$ref": "#/definitions/Pet"}},
                            {"$ref": "../common/types.json#/parameters/ApiVersion"}
                        ],
                        "responses": {
                            "200": {"description": "ok", "schema": {"$ref": "#/definitions/Pet"},
                                    "headers": {"x-ms-request-id": {"type": "string"}}},
                            "default": {"$ref": "../common/types.json#/responses/Error"}
                        },
                        "x-ms-examples": {"create": {"$ref": "./examples/create.json"}}
                    }
                }
            },
            "parameters": {
                "NameParameter": {"name": "name", "in": "path", "required": true, "type": "string"}
            },
            "definitions": {
                "Pet": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "tags": {"type": "array", "items": {"type": "string"}},
                        "extra": {"type": "object", "additionalProperties": {"$ref": "#/definitions/Pet"}}
                    },
                    "required": ["name"]
                }
            }
        })
    }

    fn common_types() -> Value {
        json!({
            "parameters": {
                "ApiVersion": {"name": "api-version", "in": "query", "required": true, "type": "string"}
            },
            "responses": {
                "Error": {"description": "error", "schema": {"$ref": "#/definitions/Error"}}
            },
            "definitions": {
                "Error": {"type": "object", "properties": {"code": {"type": "string"}}}
            }
        })
    }

    fn reader() -> SwaggerReader<MemoryLoader> {
        let mut docs = HashMap::new();
        docs.insert("specs/pets/pets.json".to_string(), pets_spec());
        docs.insert("specs/common/types.json".to_string(), common_types());
        SwaggerReader::new(MemoryLoader(docs))
    }

    #[tokio::test]
    async fn test_fetch_follows_external_references_but_not_examples() {
        let reader = reader();
        reader.fetch("specs/pets/pets.json").await.unwrap();
        assert_eq!(reader.document_count(), 2);
    }

    #[tokio::test]
    async fn test_build_resolves_parameters_and_responses() {
        let reader = reader();
        reader.fetch("specs/pets/pets.json").await.unwrap();
        let mut arena = SchemaArena::new();
        let spec = reader.build("specs/pets/pets.json", &mut arena).unwrap();

        assert_eq!(spec.version.as_deref(), Some("2020-01-01"));
        assert_eq!(spec.paths.len(), 1);
        let operation = &spec.paths[0].operations[0];
        assert_eq!(operation.operation_id, "Pets_Create");
        assert_eq!(operation.method, http::Method::PUT);

        let names: Vec<_> = operation.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["name", "pet", "api-version"]);
        let api_version = &operation.parameters[2];
        assert!(api_version.is_plain_string);
        assert_eq!(api_version.location, ParameterLocation::Query);

        let default = operation.response("default").unwrap();
        let error = arena.resolve(default.schema.unwrap());
        assert_eq!(
            &*arena.get(error).source.url,
            "specs/common/types.json"
        );
        let ok = operation.response("200").unwrap();
        assert_eq!(ok.headers[0].name, "x-ms-request-id");
        assert_eq!(ok.headers[0].wire_type, Some(SchemaType::String));
    }

    #[tokio::test]
    async fn test_references_share_one_definition_node() {
        let reader = reader();
        reader.fetch("specs/pets/pets.json").await.unwrap();
        let mut arena = SchemaArena::new();
        let spec = reader.build("specs/pets/pets.json", &mut arena).unwrap();

        let pet = spec.definitions[0];
        let body = spec.paths[0].operations[0].parameters[1].schema;
        assert!(arena.is_reference(body));
        assert_eq!(arena.resolve(body), pet);

        let pet_node = arena.get(pet);
        assert_eq!(pet_node.required, vec!["name".to_string()]);
        assert_eq!(pet_node.ref_name(), Some("Pet"));
        let extra = pet_node.properties.as_ref().unwrap()["extra"];
        match arena.get(extra).additional_properties {
            AdditionalProperties::Schema(inner) => assert_eq!(arena.resolve(inner), pet),
            other => panic!("unexpected additionalProperties {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_schema_nodes_record_text_positions() {
        let reader = reader();
        reader.fetch("specs/pets/pets.json").await.unwrap();
        let mut arena = SchemaArena::new();
        let spec = reader.build("specs/pets/pets.json", &mut arena).unwrap();

        let pet = arena.get(spec.definitions[0]);
        let position = pet.source.position.unwrap();
        assert!(position.line > 1);
        assert!(position.column > 1);

        let operation = &spec.paths[0].operations[0];
        assert!(operation.source.position.is_some());
        let error = arena.resolve(operation.response("default").unwrap().schema.unwrap());
        assert!(arena.get(error).source.position.is_some());
    }

    #[tokio::test]
    async fn test_missing_referenced_document_fails() {
        let mut docs = HashMap::new();
        docs.insert("a.json".to_string(), json!({"definitions": {"X": {"$ref": "b.json#/definitions/Y"}}}));
        let reader = SwaggerReader::new(MemoryLoader(docs));
        assert!(reader.fetch("a.json").await.is_err());
    }

    #[tokio::test]
    async fn test_file_system_loader_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = FileSystemLoader
            .load(path.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }));
    }

    #[test]
    fn test_locate_decodes_pointer_and_joins_paths() {
        let (doc, pointer) = locate("specs/a/spec.json", "../b/types.json#/definitions/Foo%20Bar");
        assert_eq!(doc, "specs/b/types.json");
        assert_eq!(pointer, "/definitions/Foo Bar");

        let (doc, pointer) = locate("specs/a/spec.json", "#/definitions/X");
        assert_eq!(doc, "specs/a/spec.json");
        assert_eq!(pointer, "/definitions/X");
    }

    #[test]
    fn test_provider_hint_from_path_and_title() {
        assert_eq!(
            provider_hint(
                "specification/storage/resource-manager/Microsoft.Storage/stable/2021-01-01/storage.json",
                None
            )
            .as_deref(),
            Some("Microsoft.Storage")
        );
        assert_eq!(
            provider_hint("x/resources.json", Some("ResourceManagementClient")).as_deref(),
            Some("Microsoft.Resources")
        );
        assert_eq!(provider_hint("x/other.json", Some("Other")), None);
    }
}
