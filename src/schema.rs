//! Schema Builder
//!
//! Turns a shape into a tree of declarative attributes. The result depends on
//! the shape definitions only, never on data, so it is built once per data
//! source and kept.

use crate::error::MapError;
use crate::shape::{Kind, Primitive, Shape, ShapeRegistry};
use serde::Serialize;
use std::collections::BTreeMap;

/// Attributes by name
pub type AttributeTree = BTreeMap<String, Attribute>;

/// Type of an attribute value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrType {
    String,
    Int64,
    Bool,
    Float64,
    List(Box<AttrType>),
    Object(BTreeMap<String, AttrType>),
}

impl From<Primitive> for AttrType {
    fn from(p: Primitive) -> Self {
        match p {
            Primitive::String => Self::String,
            Primitive::Int => Self::Int64,
            Primitive::Bool => Self::Bool,
            Primitive::Float => Self::Float64,
        }
    }
}

/// How an attribute is set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Required,
    Optional,
    Computed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeKind {
    Primitive {
        #[serde(rename = "type")]
        ty: AttrType,
    },
    Object {
        attributes: AttributeTree,
    },
    /// List of primitives (or of lists)
    List {
        element: AttrType,
    },
    /// List of objects
    ListNested {
        attributes: AttributeTree,
    },
}

impl AttributeKind {
    pub fn attr_type(&self) -> AttrType {
        match self {
            Self::Primitive { ty } => ty.clone(),
            Self::Object { attributes } => AttrType::Object(attr_types(attributes)),
            Self::List { element } => AttrType::List(Box::new(element.clone())),
            Self::ListNested { attributes } => {
                AttrType::List(Box::new(AttrType::Object(attr_types(attributes))))
            }
        }
    }
}

/// A single attribute
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    #[serde(flatten)]
    pub kind: AttributeKind,
    pub mode: Mode,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl Attribute {
    pub fn computed(kind: AttributeKind, description: &str) -> Self {
        Self {
            kind,
            mode: Mode::Computed,
            description: description.to_string(),
        }
    }

    pub fn string(mode: Mode, description: &str) -> Self {
        Self {
            kind: AttributeKind::Primitive {
                ty: AttrType::String,
            },
            mode,
            description: description.to_string(),
        }
    }

    pub fn attr_type(&self) -> AttrType {
        self.kind.attr_type()
    }
}

/// Types of a set of attributes
pub fn attr_types(attributes: &AttributeTree) -> BTreeMap<String, AttrType> {
    attributes
        .iter()
        .map(|(name, attr)| (name.clone(), attr.attr_type()))
        .collect()
}

/// Insert an attribute or value, failing if the name is taken
pub(crate) fn insert_unique<V>(
    map: &mut BTreeMap<String, V>,
    shape: &Shape,
    name: String,
    value: V,
) -> Result<(), MapError> {
    if map.contains_key(&name) {
        return Err(MapError::NamingCollision {
            shape: shape.name.clone(),
            name,
        });
    }
    map.insert(name, value);
    Ok(())
}

/// Builds attribute trees from shapes
pub struct SchemaBuilder<'r> {
    registry: &'r ShapeRegistry,
}

impl<'r> SchemaBuilder<'r> {
    pub fn new(registry: &'r ShapeRegistry) -> Self {
        Self { registry }
    }

    /// Build the attributes of a shape.
    ///
    /// With a `filter`, one-of alternatives of the top-level shape whose
    /// discriminator is not listed are left out. Nested shapes always declare
    /// all their alternatives.
    pub fn build(&self, shape: &str, filter: Option<&[&str]>) -> Result<AttributeTree, MapError> {
        let shape = self
            .registry
            .get(shape)
            .ok_or_else(|| MapError::unsupported(shape, "", shape))?;
        self.attributes(shape, filter)
    }

    fn attributes(&self, shape: &Shape, filter: Option<&[&str]>) -> Result<AttributeTree, MapError> {
        let mut attrs = AttributeTree::new();

        for field in &shape.fields {
            if !field.included(filter) {
                continue;
            }
            let kind = self.registry.resolve(shape, field)?;

            match &field.name {
                Some(name) if !field.inline => {
                    let attr = self.attribute(&kind, shape.doc(name))?;
                    insert_unique(&mut attrs, shape, name.clone(), attr)?;
                }
                _ => {
                    let inner = match &kind {
                        Kind::Optional(inner) => inner.as_ref(),
                        kind => kind,
                    };
                    let Kind::Shape(nested) = inner else {
                        return Err(MapError::unsupported(&shape.name, &field.ident, &field.ty));
                    };
                    for (name, attr) in self.attributes(nested, None)? {
                        insert_unique(&mut attrs, shape, name, attr)?;
                    }
                }
            }
        }

        Ok(attrs)
    }

    fn attribute(&self, kind: &Kind<'_>, description: &str) -> Result<Attribute, MapError> {
        let kind = match kind {
            Kind::Primitive(p) => AttributeKind::Primitive { ty: (*p).into() },
            Kind::Shape(shape) => AttributeKind::Object {
                attributes: self.attributes(shape, None)?,
            },
            Kind::Optional(inner) => return self.attribute(inner, description),
            Kind::List(inner) => match self.attribute(inner, description)?.kind {
                AttributeKind::Object { attributes } => AttributeKind::ListNested { attributes },
                element => AttributeKind::List {
                    element: element.attr_type(),
                },
            },
        };
        Ok(Attribute::computed(kind, description))
    }
}
