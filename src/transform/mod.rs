//! Schema transformation pipeline.
//!
//! Contract documents are rewritten in place before any validator is
//! compiled. Per-document transforms run once per [`SpecDocument`] right after
//! it is read; global transforms run once over every schema collected from all
//! documents, since polymorphic hierarchies may span files.
//!
//! Per-document order: x-ms-paths merge, nested-schema collection, reference
//! fields, path regex, implicit default response. Global order:
//! discriminator, allOf, closed objects, nullability, pure objects.

mod all_of;
mod closed_object;
mod discriminator;
mod implicit_default;
mod nested;
mod nullable;
mod path_regex;
mod pure_object;
mod reference_fields;
mod xms_paths;

use std::collections::HashSet;

pub use all_of::AllOfTransform;
pub use closed_object::ClosedObjectTransform;
pub use discriminator::DiscriminatorTransform;
pub use implicit_default::ImplicitDefaultResponseTransform;
pub use nested::NestedSchemaTransform;
pub use nullable::NullableTransform;
pub use path_regex::{PathRegex, PathRegexTransform, QueryConstraint};
pub use pure_object::PureObjectTransform;
pub use reference_fields::ReferenceFieldsTransform;
use thiserror::Error;
pub use xms_paths::XmsPathsTransform;

use crate::swagger::{SchemaArena, SchemaId, SpecDocument};

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Brackets should be deployed in symmetric pairs: {template}")]
    UnbalancedBraces { template: String },

    #[error("Invalid path regex for {template}: {source}")]
    PathRegex {
        template: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid query constraint in {template}: {message}")]
    QueryConstraint { template: String, message: String },
}

pub type TransformResult<T> = Result<T, TransformError>;

/// Options that change what the transforms produce.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformOptions {
    pub is_path_case_sensitive: bool,
    pub model_implicit_default_response: bool,
}

/// State shared by every transform of one initialization.
#[derive(Debug, Default)]
pub struct TransformContext {
    pub options: TransformOptions,
    /// Schemas whose type is absent or `object`.
    pub obj_schemas: Vec<SchemaId>,
    pub arr_schemas: Vec<SchemaId>,
    pub prim_schemas: Vec<SchemaId>,
    /// Non-body parameter nodes.
    pub params: Vec<SchemaId>,
    /// Schemas that other schemas extend through `allOf` in a polymorphic
    /// hierarchy.
    pub base_schemas: HashSet<SchemaId>,
    visited: HashSet<SchemaId>,
    cloud_error: Option<SchemaId>,
}

impl TransformContext {
    pub fn new(options: TransformOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    /// Records a schema node in its shape bucket. Returns false when the
    /// node was already collected.
    pub(crate) fn collect(&mut self, arena: &SchemaArena, id: SchemaId) -> bool {
        if !self.visited.insert(id) {
            return false;
        }
        let schema = arena.get(id);
        match schema.schema_type {
            None | Some(crate::swagger::SchemaType::Object) => self.obj_schemas.push(id),
            Some(crate::swagger::SchemaType::Array) => self.arr_schemas.push(id),
            Some(_) => self.prim_schemas.push(id),
        }
        true
    }
}

/// A transform applied to each document as it is read.
pub trait SpecTransform: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(
        &self,
        spec: &mut SpecDocument,
        arena: &mut SchemaArena,
        ctx: &mut TransformContext,
    ) -> TransformResult<()>;
}

/// A transform applied once over all collected schemas.
pub trait GlobalTransform: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, arena: &mut SchemaArena, ctx: &mut TransformContext);
}

const SPEC_TRANSFORMS: &[&dyn SpecTransform] = &[
    &XmsPathsTransform,
    &NestedSchemaTransform,
    &ReferenceFieldsTransform,
    &PathRegexTransform,
    &ImplicitDefaultResponseTransform,
];

const GLOBAL_TRANSFORMS: &[&dyn GlobalTransform] = &[
    &DiscriminatorTransform,
    &AllOfTransform,
    &ClosedObjectTransform,
    &NullableTransform,
    &PureObjectTransform,
];

/// Runs every per-document transform in order.
pub fn transform_spec(
    spec: &mut SpecDocument,
    arena: &mut SchemaArena,
    ctx: &mut TransformContext,
) -> TransformResult<()> {
    for transform in SPEC_TRANSFORMS {
        tracing::trace!(transform = transform.name(), spec = %spec.id, "Applying transform");
        transform.apply(spec, arena, ctx)?;
    }
    Ok(())
}

/// Runs every global transform in order.
pub fn transform_global(arena: &mut SchemaArena, ctx: &mut TransformContext) {
    for transform in GLOBAL_TRANSFORMS {
        tracing::trace!(transform = transform.name(), "Applying global transform");
        transform.apply(arena, ctx);
    }
    tracing::debug!(
        objects = ctx.obj_schemas.len(),
        arrays = ctx.arr_schemas.len(),
        primitives = ctx.prim_schemas.len(),
        bases = ctx.base_schemas.len(),
        "Schema transforms complete"
    );
}
