//! GraphQL documents derived from shapes

use crate::error::MapError;
use crate::extract::TYPENAME;
use crate::shape::{Kind, Shape, ShapeRegistry, Source, SATISFIER};

/// Render the selection set of a shape, without the outer braces.
///
/// Keyed fields select their key (with a nested selection for shapes),
/// alternatives become inline fragments and shapes with alternatives also
/// select `__typename` so the extractor can tell which one is populated.
pub fn render_selection(registry: &ShapeRegistry, shape: &str) -> Result<String, MapError> {
    let shape = registry
        .get(shape)
        .ok_or_else(|| MapError::unsupported(shape, "", shape))?;
    selection(registry, shape)
}

fn selection(registry: &ShapeRegistry, shape: &Shape) -> Result<String, MapError> {
    let mut parts = Vec::with_capacity(shape.fields.len() + 1);
    if shape.has_alternatives() {
        parts.push(TYPENAME.to_string());
    }

    for field in &shape.fields {
        let kind = registry.resolve(shape, field)?;
        let part = match (&field.source, element_shape(&kind)) {
            (Source::Fragment(on), Some(nested)) => {
                format!("... on {} {{ {} }}", on, selection(registry, nested)?)
            }
            (Source::Key(key), Some(nested)) => {
                format!("{} {{ {} }}", key, selection(registry, nested)?)
            }
            (Source::Key(key), None) => key.clone(),
            (Source::Fragment(_), None) => {
                return Err(MapError::unsupported(&shape.name, &field.ident, &field.ty))
            }
        };
        parts.push(part);
    }

    Ok(parts.join(" "))
}

fn element_shape<'r>(kind: &Kind<'r>) -> Option<&'r Shape> {
    match kind {
        Kind::Shape(shape) => Some(*shape),
        Kind::List(inner) | Kind::Optional(inner) => element_shape(inner),
        Kind::Primitive(_) => None,
    }
}

/// The query fetching every need of an environment
pub fn needs_query(registry: &ShapeRegistry) -> Result<String, MapError> {
    Ok(format!(
        "query Needs($appSlug: String!, $envName: String!, $types: [TypeRef!]!) {{ \
         app(slug: $appSlug) {{ env(name: $envName) {{ \
         needs(sel: {{typeRefs: $types}}) {{ id typeRef encoreName satisfier {{ {} }} }} \
         }} }} }}",
        render_selection(registry, SATISFIER)?
    ))
}
