//! Arena-allocated schema graph.
//!
//! Every schema object found while reading a contract becomes one [`Schema`]
//! node addressed by a [`SchemaId`]. A `$ref` becomes its own node whose
//! `reference` field points at the target, so transforms can tell a bare
//! reference apart from an inline schema. Nodes are keyed by their document
//! location, which makes a definition shared between contracts a single node.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
};

use serde_json::{Map, Value};

use super::{ParameterLocation, Position};

/// Index of a schema node inside a [`SchemaArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaId(u32);

impl SchemaId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Swagger 2.0 primitive and structural types (`file` included).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaType {
    Object,
    Array,
    String,
    Integer,
    Number,
    Boolean,
    Null,
    File,
}

impl SchemaType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "object" => Some(Self::Object),
            "array" => Some(Self::Array),
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "null" => Some(Self::Null),
            "file" => Some(Self::File),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Array => "array",
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Null => "null",
            Self::File => "file",
        }
    }

    /// Type name of a JSON value the way issue messages report it.
    pub fn of_value(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

/// One entry of `x-ms-mutability`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutability {
    Create,
    Update,
    Read,
}

impl Mutability {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "read" => Some(Self::Read),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AdditionalProperties {
    #[default]
    Unset,
    Allowed(bool),
    Schema(SchemaId),
}

impl AdditionalProperties {
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }
}

/// Where a schema node was declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSource {
    pub url: Arc<str>,
    pub pointer: String,
    /// Where the node starts in the document text, when known.
    pub position: Option<Position>,
}

impl SchemaSource {
    pub fn new(url: impl Into<Arc<str>>, pointer: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pointer: pointer.into(),
            position: None,
        }
    }

    pub fn at(mut self, position: Option<Position>) -> Self {
        self.position = position;
        self
    }

    /// `file#/pointer` form used for reference names.
    pub fn reference(&self) -> String {
        format!("{}#{}", self.url, self.pointer)
    }
}

#[derive(Debug, Clone)]
pub struct Schema {
    /// Target of a `$ref`; a reference node carries no other keywords.
    pub reference: Option<SchemaId>,
    /// `file#/definitions/Name` for nodes reached through a definition.
    pub ref_self: Option<String>,
    pub schema_type: Option<SchemaType>,
    pub format: Option<String>,
    pub pattern: Option<String>,
    pub enum_values: Option<Vec<Value>>,
    pub enum_model_as_string: bool,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_minimum: bool,
    pub exclusive_maximum: bool,
    pub multiple_of: Option<f64>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
    pub unique_items: bool,
    pub min_properties: Option<u64>,
    pub max_properties: Option<u64>,
    pub properties: Option<BTreeMap<String, SchemaId>>,
    pub required: Vec<String>,
    pub additional_properties: AdditionalProperties,
    pub items: Option<SchemaId>,
    pub all_of: Option<Vec<SchemaId>>,
    pub any_of: Option<Vec<SchemaId>>,
    pub one_of: Option<Vec<SchemaId>>,
    pub discriminator: Option<String>,
    pub discriminator_value: Option<String>,
    /// Discriminator value to subtype; `None` marks the root's own value.
    pub discriminator_map: Option<BTreeMap<String, Option<SchemaId>>>,
    /// Raw `x-nullable` / `nullable` marker.
    pub nullable_marker: Option<bool>,
    /// Set by the nullability transform.
    pub nullable: bool,
    /// Failures of this node are never reported on their own.
    pub skip_error: bool,
    pub read_only: bool,
    pub mutability: Option<Vec<Mutability>>,
    pub secret: bool,
    pub azure_resource: bool,
    pub parameter_in: Option<ParameterLocation>,
    pub allow_empty_value: bool,
    pub source: SchemaSource,
}

impl Schema {
    pub fn new(source: SchemaSource) -> Self {
        Self {
            reference: None,
            ref_self: None,
            schema_type: None,
            format: None,
            pattern: None,
            enum_values: None,
            enum_model_as_string: false,
            minimum: None,
            maximum: None,
            exclusive_minimum: false,
            exclusive_maximum: false,
            multiple_of: None,
            min_length: None,
            max_length: None,
            min_items: None,
            max_items: None,
            unique_items: false,
            min_properties: None,
            max_properties: None,
            properties: None,
            required: Vec::new(),
            additional_properties: AdditionalProperties::Unset,
            items: None,
            all_of: None,
            any_of: None,
            one_of: None,
            discriminator: None,
            discriminator_value: None,
            discriminator_map: None,
            nullable_marker: None,
            nullable: false,
            skip_error: false,
            read_only: false,
            mutability: None,
            secret: false,
            azure_resource: false,
            parameter_in: None,
            allow_empty_value: false,
            source,
        }
    }

    /// Reads the scalar keywords of a schema object. Child schemas
    /// (`properties`, `items`, `allOf`, ...) are linked by the reader.
    pub fn apply_keywords(&mut self, object: &Map<String, Value>) {
        self.schema_type = object
            .get("type")
            .and_then(Value::as_str)
            .and_then(SchemaType::parse);
        self.format = string_keyword(object, "format");
        self.pattern = string_keyword(object, "pattern");
        self.enum_values = object.get("enum").and_then(Value::as_array).cloned();
        self.enum_model_as_string = object
            .get("x-ms-enum")
            .and_then(|e| e.get("modelAsString"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        self.minimum = object.get("minimum").and_then(Value::as_f64);
        self.maximum = object.get("maximum").and_then(Value::as_f64);
        self.exclusive_minimum = bool_keyword(object, "exclusiveMinimum");
        self.exclusive_maximum = bool_keyword(object, "exclusiveMaximum");
        self.multiple_of = object.get("multipleOf").and_then(Value::as_f64);
        self.min_length = object.get("minLength").and_then(Value::as_u64);
        self.max_length = object.get("maxLength").and_then(Value::as_u64);
        self.min_items = object.get("minItems").and_then(Value::as_u64);
        self.max_items = object.get("maxItems").and_then(Value::as_u64);
        self.unique_items = bool_keyword(object, "uniqueItems");
        self.min_properties = object.get("minProperties").and_then(Value::as_u64);
        self.max_properties = object.get("maxProperties").and_then(Value::as_u64);
        // Parameters use a boolean `required`; only schema arrays count here.
        self.required = object
            .get("required")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        self.discriminator = string_keyword(object, "discriminator");
        self.discriminator_value = string_keyword(object, "x-ms-discriminator-value");
        self.nullable_marker = object
            .get("x-nullable")
            .or_else(|| object.get("nullable"))
            .and_then(Value::as_bool);
        self.read_only = bool_keyword(object, "readOnly");
        self.mutability = object
            .get("x-ms-mutability")
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(Mutability::parse)
                    .collect()
            });
        self.secret = bool_keyword(object, "x-ms-secret");
        self.azure_resource = bool_keyword(object, "x-ms-azure-resource");
        self.allow_empty_value = bool_keyword(object, "allowEmptyValue");
        if let Some(Value::Bool(allowed)) = object.get("additionalProperties") {
            self.additional_properties = AdditionalProperties::Allowed(*allowed);
        }
    }

    pub fn has_properties(&self) -> bool {
        self.properties.as_ref().is_some_and(|p| !p.is_empty())
    }

    /// Whether `x-ms-mutability` lists `read`.
    pub fn readable(&self) -> bool {
        self.mutability
            .as_ref()
            .is_none_or(|m| m.contains(&Mutability::Read))
    }

    /// Last path segment of the self reference, e.g. `Cat` for
    /// `pets.json#/definitions/Cat`.
    pub fn ref_name(&self) -> Option<&str> {
        self.ref_self
            .as_deref()
            .and_then(|r| r.rsplit('/').next())
            .filter(|name| !name.is_empty())
    }
}

fn string_keyword(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

fn bool_keyword(object: &Map<String, Value>, key: &str) -> bool {
    object.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Owner of every schema node of one validator instance.
#[derive(Debug, Default)]
pub struct SchemaArena {
    nodes: Vec<Schema>,
    by_location: HashMap<(Arc<str>, String), SchemaId>,
}

impl SchemaArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, schema: Schema) -> SchemaId {
        let id = SchemaId(self.nodes.len() as u32);
        self.nodes.push(schema);
        id
    }

    /// Allocates a node and remembers it under its source location.
    pub fn alloc_located(&mut self, schema: Schema) -> SchemaId {
        let key = (schema.source.url.clone(), schema.source.pointer.clone());
        let id = self.alloc(schema);
        self.by_location.insert(key, id);
        id
    }

    pub fn lookup(&self, url: &str, pointer: &str) -> Option<SchemaId> {
        self.by_location
            .get(&(Arc::from(url), pointer.to_string()))
            .copied()
    }

    pub fn get(&self, id: SchemaId) -> &Schema {
        &self.nodes[id.index()]
    }

    pub fn get_mut(&mut self, id: SchemaId) -> &mut Schema {
        &mut self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = SchemaId> + use<> {
        (0..self.nodes.len() as u32).map(SchemaId)
    }

    /// Follows reference nodes to the schema they point at. Reference cycles
    /// stop at the last node visited.
    pub fn resolve(&self, id: SchemaId) -> SchemaId {
        let mut current = id;
        for _ in 0..self.nodes.len() {
            match self.get(current).reference {
                Some(target) => current = target,
                None => break,
            }
        }
        current
    }

    pub fn is_reference(&self, id: SchemaId) -> bool {
        self.get(id).reference.is_some()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn source(pointer: &str) -> SchemaSource {
        SchemaSource::new("spec.json", pointer)
    }

    #[test]
    fn test_apply_keywords_reads_vendor_extensions() {
        let raw = json!({
            "type": "string",
            "enum": ["a", "b"],
            "x-ms-enum": {"name": "Kind", "modelAsString": true},
            "x-ms-mutability": ["create", "read"],
            "x-ms-secret": true,
            "x-nullable": false,
            "readOnly": true
        });
        let mut schema = Schema::new(source("/definitions/Kind"));
        schema.apply_keywords(raw.as_object().unwrap());

        assert_eq!(schema.schema_type, Some(SchemaType::String));
        assert!(schema.enum_model_as_string);
        assert_eq!(
            schema.mutability,
            Some(vec![Mutability::Create, Mutability::Read])
        );
        assert!(schema.secret);
        assert!(schema.read_only);
        assert_eq!(schema.nullable_marker, Some(false));
        assert!(schema.readable());
    }

    #[test]
    fn test_boolean_required_is_ignored() {
        let raw = json!({"name": "id", "in": "path", "required": true, "type": "string"});
        let mut schema = Schema::new(source("/parameters/Id"));
        schema.apply_keywords(raw.as_object().unwrap());
        assert!(schema.required.is_empty());
    }

    #[test]
    fn test_resolve_follows_reference_chain() {
        let mut arena = SchemaArena::new();
        let target = arena.alloc(Schema::new(source("/definitions/Pet")));
        let mut middle = Schema::new(source("/definitions/Alias"));
        middle.reference = Some(target);
        let middle = arena.alloc(middle);
        let mut head = Schema::new(source("/paths/x"));
        head.reference = Some(middle);
        let head = arena.alloc(head);

        assert_eq!(arena.resolve(head), target);
        assert!(arena.is_reference(head));
        assert!(!arena.is_reference(target));
    }

    #[test]
    fn test_resolve_terminates_on_cycle() {
        let mut arena = SchemaArena::new();
        let a = arena.alloc(Schema::new(source("/a")));
        let b = arena.alloc(Schema::new(source("/b")));
        arena.get_mut(a).reference = Some(b);
        arena.get_mut(b).reference = Some(a);
        let _ = arena.resolve(a);
    }

    #[test]
    fn test_ref_name_uses_last_segment() {
        let mut schema = Schema::new(source("/definitions/Cat"));
        schema.ref_self = Some("pets.json#/definitions/Cat".to_string());
        assert_eq!(schema.ref_name(), Some("Cat"));
    }

    #[test]
    fn test_lookup_by_location() {
        let mut arena = SchemaArena::new();
        let id = arena.alloc_located(Schema::new(source("/definitions/Pet")));
        assert_eq!(arena.lookup("spec.json", "/definitions/Pet"), Some(id));
        assert_eq!(arena.lookup("spec.json", "/definitions/Dog"), None);
    }
}
