use std::collections::HashSet;

use super::{GlobalTransform, TransformContext};
use crate::swagger::{SchemaArena, SchemaId, SchemaType};

/// Inlines `allOf` members into the composite schema.
///
/// Members never override a property the composite already has, and their
/// `required` lists are merged. `allOf` is dropped afterwards, except on a
/// base schema without its own discriminator: a schema referencing such an
/// intermediate base still needs its `allOf` to reach the root's dispatch.
pub struct AllOfTransform;

impl GlobalTransform for AllOfTransform {
    fn name(&self) -> &'static str {
        "all-of"
    }

    fn apply(&self, arena: &mut SchemaArena, ctx: &mut TransformContext) {
        let mut done = HashSet::new();
        for &id in &ctx.obj_schemas {
            if arena.get(id).all_of.is_some() {
                flatten(arena, id, &ctx.base_schemas, &mut done);
            }
        }
    }
}

fn flatten(
    arena: &mut SchemaArena,
    id: SchemaId,
    bases: &HashSet<SchemaId>,
    done: &mut HashSet<SchemaId>,
) {
    let schema = arena.get(id);
    if !matches!(schema.schema_type, None | Some(SchemaType::Object)) {
        return;
    }
    let Some(members) = schema.all_of.clone() else {
        return;
    };
    if !done.insert(id) {
        return;
    }

    let mut properties = schema.properties.clone().unwrap_or_default();
    let mut required = schema.required.clone();
    for member in members {
        let target = arena.resolve(member);
        flatten(arena, target, bases, done);
        let member = arena.get(target);
        if let Some(member_properties) = &member.properties {
            for (name, child) in member_properties {
                properties.entry(name.clone()).or_insert(*child);
            }
        }
        for name in &member.required {
            if !required.contains(name) {
                required.push(name.clone());
            }
        }
    }

    let schema = arena.get_mut(id);
    schema.properties = Some(properties);
    schema.required = required;
    if !bases.contains(&id) || schema.discriminator.is_some() {
        schema.all_of = None;
    }
}
