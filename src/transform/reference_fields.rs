use super::{SpecTransform, TransformContext, TransformResult};
use crate::swagger::{SchemaArena, SpecDocument};

const DEFAULT_MIME: &str = "application/json";

/// Fills in operation `consumes`/`produces` from the document, falling back
/// to `application/json`.
pub struct ReferenceFieldsTransform;

impl SpecTransform for ReferenceFieldsTransform {
    fn name(&self) -> &'static str {
        "reference-fields"
    }

    fn apply(
        &self,
        spec: &mut SpecDocument,
        _arena: &mut SchemaArena,
        _ctx: &mut TransformContext,
    ) -> TransformResult<()> {
        if spec.consumes.is_empty() {
            spec.consumes = vec![DEFAULT_MIME.to_string()];
        }
        if spec.produces.is_empty() {
            spec.produces = vec![DEFAULT_MIME.to_string()];
        }
        for path in &mut spec.paths {
            for operation in &mut path.operations {
                if operation.consumes.is_none() {
                    operation.consumes = Some(spec.consumes.clone());
                }
                if operation.produces.is_none() {
                    operation.produces = Some(spec.produces.clone());
                }
            }
        }
        Ok(())
    }
}
