use std::collections::{BTreeMap, HashMap};

use super::{GlobalTransform, TransformContext};
use crate::swagger::{SchemaArena, SchemaId};

/// Builds the discriminator map of every polymorphic root.
///
/// A schema belongs to a hierarchy when one of its `allOf` references leads
/// (possibly through intermediate schemas) to a schema declaring
/// `discriminator`. Its value is `x-ms-discriminator-value`, else the last
/// segment of its definition name. Every schema on the chain between a leaf
/// and the root is recorded as a base schema.
pub struct DiscriminatorTransform;

impl GlobalTransform for DiscriminatorTransform {
    fn name(&self) -> &'static str {
        "discriminator"
    }

    fn apply(&self, arena: &mut SchemaArena, ctx: &mut TransformContext) {
        let mut roots: HashMap<SchemaId, Option<SchemaId>> = HashMap::new();
        for index in 0..ctx.obj_schemas.len() {
            let id = ctx.obj_schemas[index];
            let Some(root) = discriminator_root(arena, id, &mut roots, ctx) else {
                continue;
            };
            let Some(value) = discriminator_value(arena, id) else {
                tracing::warn!(schema = %arena.get(id).source.reference(), "Polymorphic schema has no discriminator value");
                continue;
            };
            let root_value = discriminator_value(arena, root);
            let root_schema = arena.get_mut(root);
            let map = root_schema.discriminator_map.get_or_insert_with(|| {
                let mut map = BTreeMap::new();
                if let Some(root_value) = root_value {
                    map.insert(root_value, None);
                }
                map
            });
            let target = if id == root { None } else { Some(id) };
            map.insert(value, target);
        }
    }
}

fn discriminator_value(arena: &SchemaArena, id: SchemaId) -> Option<String> {
    let schema = arena.get(id);
    schema
        .discriminator_value
        .clone()
        .or_else(|| schema.ref_name().map(str::to_string))
}

/// Walks `allOf` references to the schema that declares the discriminator.
/// Only named definitions can be roots.
fn discriminator_root(
    arena: &SchemaArena,
    id: SchemaId,
    memo: &mut HashMap<SchemaId, Option<SchemaId>>,
    ctx: &mut TransformContext,
) -> Option<SchemaId> {
    let schema = arena.get(id);
    if schema.discriminator.is_some() {
        return schema.ref_self.as_ref().map(|_| id);
    }
    let members = schema.all_of.as_ref()?;
    if let Some(root) = memo.get(&id) {
        return *root;
    }
    memo.insert(id, None);
    for &member in members {
        if !arena.is_reference(member) {
            continue;
        }
        let parent = arena.resolve(member);
        if let Some(root) = discriminator_root(arena, parent, memo, ctx) {
            ctx.base_schemas.insert(parent);
            memo.insert(id, Some(root));
            return Some(root);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        swagger::SchemaType,
        transform::test_support::{reference, typed},
    };

    #[test]
    fn test_builds_map_through_intermediate_schema() {
        let mut arena = SchemaArena::new();
        let pet = typed(&mut arena, "Pet", SchemaType::Object);
        arena.get_mut(pet).discriminator = Some("kind".to_string());
        let pet_ref = reference(&mut arena, pet);
        let mammal = typed(&mut arena, "Mammal", SchemaType::Object);
        arena.get_mut(mammal).all_of = Some(vec![pet_ref]);
        let mammal_ref = reference(&mut arena, mammal);
        let cat = typed(&mut arena, "Cat", SchemaType::Object);
        arena.get_mut(cat).all_of = Some(vec![mammal_ref]);
        arena.get_mut(cat).discriminator_value = Some("feline".to_string());

        let mut ctx = TransformContext::default();
        ctx.obj_schemas = vec![cat, pet, mammal];
        DiscriminatorTransform.apply(&mut arena, &mut ctx);

        let map = arena.get(pet).discriminator_map.as_ref().unwrap();
        assert_eq!(map.get("Pet"), Some(&None));
        assert_eq!(map.get("feline"), Some(&Some(cat)));
        assert_eq!(map.get("Mammal"), Some(&Some(mammal)));
        assert!(ctx.base_schemas.contains(&pet));
        assert!(ctx.base_schemas.contains(&mammal));
        assert!(!ctx.base_schemas.contains(&cat));
    }

    #[test]
    fn test_inline_all_of_members_are_ignored() {
        let mut arena = SchemaArena::new();
        let pet = typed(&mut arena, "Pet", SchemaType::Object);
        arena.get_mut(pet).discriminator = Some("kind".to_string());
        let dog = typed(&mut arena, "Dog", SchemaType::Object);
        arena.get_mut(dog).all_of = Some(vec![pet]);

        let mut ctx = TransformContext::default();
        ctx.obj_schemas = vec![dog];
        DiscriminatorTransform.apply(&mut arena, &mut ctx);
        assert!(arena.get(pet).discriminator_map.is_none());
    }
}
