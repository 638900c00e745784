use super::{SpecTransform, TransformContext, TransformResult};
use crate::swagger::{SchemaArena, SpecDocument};

/// Moves `x-ms-paths` entries into the regular path list. An entry replaces
/// a regular path with the same template.
pub struct XmsPathsTransform;

impl SpecTransform for XmsPathsTransform {
    fn name(&self) -> &'static str {
        "xms-paths"
    }

    fn apply(
        &self,
        spec: &mut SpecDocument,
        _arena: &mut SchemaArena,
        _ctx: &mut TransformContext,
    ) -> TransformResult<()> {
        for path in std::mem::take(&mut spec.xms_paths) {
            match spec.paths.iter_mut().find(|p| p.template == path.template) {
                Some(existing) => *existing = path,
                None => spec.paths.push(path),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::swagger::PathDef;

    fn path(template: &str) -> PathDef {
        PathDef {
            template: template.to_string(),
            parameters: Vec::new(),
            operations: Vec::new(),
            regex: None,
        }
    }

    fn spec(paths: Vec<PathDef>, xms_paths: Vec<PathDef>) -> SpecDocument {
        SpecDocument {
            id: Arc::from("spec.json"),
            title: None,
            version: None,
            host: None,
            base_path: String::new(),
            host_template: None,
            host_parameters: Vec::new(),
            consumes: Vec::new(),
            produces: Vec::new(),
            paths,
            xms_paths,
            definitions: Vec::new(),
            provider_hint: None,
        }
    }

    #[test]
    fn test_xms_paths_are_merged() {
        let mut doc = spec(vec![path("/a")], vec![path("/a?comp=list"), path("/a")]);
        let mut arena = SchemaArena::new();
        let mut ctx = TransformContext::default();
        XmsPathsTransform.apply(&mut doc, &mut arena, &mut ctx).unwrap();

        let templates: Vec<_> = doc.paths.iter().map(|p| p.template.as_str()).collect();
        assert_eq!(templates, vec!["/a", "/a?comp=list"]);
        assert!(doc.xms_paths.is_empty());
    }
}
