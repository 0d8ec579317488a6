//! Value Extractor
//!
//! Walks a GraphQL response node alongside its shape and produces values
//! keyed exactly like the attributes [`SchemaBuilder`](crate::schema::SchemaBuilder)
//! declares for the same shape.

use crate::error::MapError;
use crate::schema::{insert_unique, SchemaBuilder};
use crate::shape::{Kind, Primitive, Shape, ShapeRegistry, Source};
use serde::Serialize;
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;

/// Discriminator key of nodes holding one-of alternatives
pub const TYPENAME: &str = "__typename";

/// Values by attribute name
pub type ValueTree = BTreeMap<String, Value>;

/// An extracted value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    Float(f64),
    List(Vec<Value>),
    Object(ValueTree),
}

impl Value {
    fn zero(p: Primitive) -> Self {
        match p {
            Primitive::String => Self::String(String::new()),
            Primitive::Int => Self::Int(0),
            Primitive::Bool => Self::Bool(false),
            Primitive::Float => Self::Float(0.0),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ValueTree> {
        match self {
            Self::Object(tree) => Some(tree),
            _ => None,
        }
    }

    /// Look up a dotted path such as `aws_rds.subnet_group.subnets.0.arn`
    pub fn pointer(&self, path: &str) -> Option<&Value> {
        path.split('.').try_fold(self, |current, part| match current {
            Self::Object(tree) => tree.get(part),
            Self::List(items) => items.get(part.parse::<usize>().ok()?),
            _ => None,
        })
    }
}

fn json_kind(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn mismatch(path: &str, expected: &str, found: &Json) -> MapError {
    MapError::TypeMismatch {
        path: path.to_string(),
        expected: expected.to_string(),
        found: json_kind(found).to_string(),
    }
}

/// Extracts value trees from response nodes
pub struct Extractor<'r> {
    registry: &'r ShapeRegistry,
}

impl<'r> Extractor<'r> {
    pub fn new(registry: &'r ShapeRegistry) -> Self {
        Self { registry }
    }

    /// Extract the values of `instance`, a node of the given shape.
    ///
    /// `filter` restricts the top-level alternatives the same way it does for
    /// [`SchemaBuilder::build`](crate::schema::SchemaBuilder::build), and any
    /// shape the builder rejects is rejected here with the same error.
    pub fn extract(
        &self,
        shape: &str,
        instance: &Json,
        filter: Option<&[&str]>,
    ) -> Result<ValueTree, MapError> {
        // Collisions are a property of the shape, not of which values are present
        SchemaBuilder::new(self.registry).build(shape, filter)?;

        let shape = self
            .registry
            .get(shape)
            .ok_or_else(|| MapError::unsupported(shape, "", shape))?;
        let Json::Object(node) = instance else {
            return Err(mismatch(&shape.name, "object", instance));
        };
        self.values(shape, instance, node, filter, &shape.name)
    }

    fn values(
        &self,
        shape: &Shape,
        instance: &Json,
        node: &Map<String, Json>,
        filter: Option<&[&str]>,
        path: &str,
    ) -> Result<ValueTree, MapError> {
        let typename = node.get(TYPENAME).and_then(Json::as_str);
        let mut values = ValueTree::new();

        for field in &shape.fields {
            if !field.included(filter) {
                continue;
            }
            let kind = self.registry.resolve(shape, field)?;

            let raw = match &field.source {
                Source::Fragment(on) if typename == Some(on.as_str()) => Some(instance),
                Source::Fragment(_) => continue,
                Source::Key(key) => node.get(key),
            };

            let child = format!("{}.{}", path, field.name.as_deref().unwrap_or(&field.ident));
            let Some(value) = self.value(&kind, raw, &child)? else {
                continue;
            };

            match &field.name {
                Some(name) if !field.inline => insert_unique(&mut values, shape, name.clone(), value)?,
                _ => {
                    let Value::Object(merged) = value else {
                        return Err(MapError::unsupported(&shape.name, &field.ident, &field.ty));
                    };
                    for (name, value) in merged {
                        insert_unique(&mut values, shape, name, value)?;
                    }
                }
            }
        }

        Ok(values)
    }

    /// `None` means no entry: an optional value that is null or missing
    fn value(&self, kind: &Kind<'_>, raw: Option<&Json>, path: &str) -> Result<Option<Value>, MapError> {
        let raw = raw.filter(|v| !v.is_null());

        let value = match kind {
            Kind::Optional(inner) => match raw {
                Some(raw) => return self.value(inner, Some(raw), path),
                None => return Ok(None),
            },
            Kind::Primitive(p) => match raw {
                None => Value::zero(*p),
                Some(raw) => primitive(*p, raw, path)?,
            },
            Kind::Shape(shape) => {
                let empty = Json::Object(Map::new());
                let instance = raw.unwrap_or(&empty);
                let Json::Object(node) = instance else {
                    return Err(mismatch(path, "object", instance));
                };
                Value::Object(self.values(shape, instance, node, None, path)?)
            }
            Kind::List(inner) => match raw {
                None => Value::List(Vec::new()),
                Some(Json::Array(items)) => {
                    let mut values = Vec::with_capacity(items.len());
                    for (i, item) in items.iter().enumerate() {
                        let item_path = format!("{}[{}]", path, i);
                        if let Some(value) = self.value(inner, Some(item), &item_path)? {
                            values.push(value);
                        }
                    }
                    Value::List(values)
                }
                Some(other) => return Err(mismatch(path, "array", other)),
            },
        };

        Ok(Some(value))
    }
}

fn primitive(p: Primitive, raw: &Json, path: &str) -> Result<Value, MapError> {
    let value = match p {
        Primitive::String => raw.as_str().map(|s| Value::String(s.to_string())),
        Primitive::Int => raw.as_i64().map(Value::Int),
        Primitive::Bool => raw.as_bool().map(Value::Bool),
        Primitive::Float => raw.as_f64().map(Value::Float),
    };
    value.ok_or_else(|| mismatch(path, p.as_str(), raw))
}
