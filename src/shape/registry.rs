//! Shape Registry - Load shape definitions from JSON
//!
//! Shapes describe the GraphQL payloads returned for each kind of need. The
//! built-in definitions are embedded at compile time and parsed once; tests
//! and tools can build their own registry from any set of documents.

use super::types::{Field, Primitive, Source, TypeExpr};
use crate::error::MapError;
use anyhow::{anyhow, bail, Context, Result};
use convert_case::{Case, Casing};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// Embedded shape definition files (compiled into the binary)
const SHAPE_FILES: &[&str] = &[
    include_str!("../shapes/common.json"),
    include_str!("../shapes/satisfier.json"),
    include_str!("../shapes/pubsub.json"),
    include_str!("../shapes/sql.json"),
    include_str!("../shapes/cache.json"),
    include_str!("../shapes/compute.json"),
];

/// Name of the shape holding every satisfier alternative.
pub const SATISFIER: &str = "Satisfier";

/// Root structure of shapes/*.json
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ShapeFile {
    #[serde(default)]
    shapes: HashMap<String, ShapeDef>,
}

/// Shape definition from JSON
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ShapeDef {
    /// Attribute documentation, keyed by resolved attribute name
    #[serde(default)]
    docs: HashMap<String, String>,
    #[serde(default)]
    fields: Vec<FieldDef>,
}

/// Field definition from JSON
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldDef {
    /// Field identifier, PascalCase
    #[serde(default)]
    ident: Option<String>,
    /// GraphQL key, defaults to the identifier in lowerCamelCase
    #[serde(default)]
    key: Option<String>,
    /// Attribute name override
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    ty: TypeExpr,
    #[serde(default)]
    inline: bool,
    /// Marks the field as the one-of alternative for this `__typename`
    #[serde(default)]
    on: Option<String>,
}

impl FieldDef {
    fn resolve(self, shape: &str, index: usize) -> Result<Field> {
        let FieldDef {
            ident,
            key,
            name,
            ty,
            inline,
            on,
        } = self;

        let label = ident
            .clone()
            .or_else(|| name.clone())
            .or_else(|| key.clone())
            .or_else(|| on.clone())
            .unwrap_or_else(|| format!("#{}", index));

        if inline && name.is_some() {
            bail!("inline field {} of shape {} cannot be renamed", label, shape);
        }

        let name = match name {
            Some(name) => Some(name),
            None if inline => None,
            None => {
                let base = ident.as_deref().or(key.as_deref()).ok_or_else(|| {
                    anyhow!("field {} of shape {} has no identifier or name", index, shape)
                })?;
                Some(base.to_case(Case::Snake))
            }
        };

        let source = match (on, key) {
            (Some(_), Some(_)) => {
                bail!("alternative {} of shape {} cannot also have a key", label, shape)
            }
            (Some(on), None) => Source::Fragment(on),
            (None, Some(key)) => Source::Key(key),
            (None, None) => {
                let ident = ident.as_deref().ok_or_else(|| {
                    anyhow!("field {} of shape {} has no identifier or key", label, shape)
                })?;
                Source::Key(ident.to_case(Case::Camel))
            }
        };

        Ok(Field {
            ident: label,
            name,
            source,
            ty,
            inline,
        })
    }
}

/// A shape with resolved fields
#[derive(Debug, Clone)]
pub struct Shape {
    pub name: String,
    pub fields: Vec<Field>,
    docs: HashMap<String, String>,
}

impl Shape {
    /// Documentation for an attribute of this shape ("" if undocumented)
    pub fn doc(&self, attribute: &str) -> &str {
        self.docs.get(attribute).map(String::as_str).unwrap_or("")
    }

    /// True if any field is a one-of alternative, i.e. the node carries `__typename`
    pub fn has_alternatives(&self) -> bool {
        self.fields.iter().any(|f| f.alternative().is_some())
    }
}

/// Resolved kind of a field, with shape references looked up
#[derive(Debug, Clone)]
pub enum Kind<'r> {
    Primitive(Primitive),
    Shape(&'r Shape),
    List(Box<Kind<'r>>),
    Optional(Box<Kind<'r>>),
}

/// All known shapes
#[derive(Debug, Clone, Default)]
pub struct ShapeRegistry {
    shapes: HashMap<String, Shape>,
}

impl ShapeRegistry {
    /// Parse and merge shape definition documents
    pub fn from_sources(sources: &[&str]) -> Result<Self> {
        let mut shapes = HashMap::new();

        for (i, content) in sources.iter().enumerate() {
            let file: ShapeFile = serde_json::from_str(content)
                .with_context(|| format!("Failed to parse shape document {}", i))?;

            for (name, def) in file.shapes {
                if shapes.contains_key(&name) {
                    bail!("shape {} is defined more than once", name);
                }
                let fields = def
                    .fields
                    .into_iter()
                    .enumerate()
                    .map(|(idx, f)| f.resolve(&name, idx))
                    .collect::<Result<Vec<_>>>()?;
                shapes.insert(
                    name.clone(),
                    Shape {
                        name,
                        fields,
                        docs: def.docs,
                    },
                );
            }
        }

        let registry = Self { shapes };
        registry.check_acyclic()?;
        tracing::debug!("Loaded {} shapes", registry.shapes.len());
        Ok(registry)
    }

    /// Get a shape by name
    pub fn get(&self, name: &str) -> Option<&Shape> {
        self.shapes.get(name)
    }

    /// All shape names, sorted
    pub fn shape_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.shapes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve a field's declared type.
    ///
    /// Shared by the schema builder and the value extractor so both reject the
    /// same definitions: unknown names, optional list elements, doubly optional
    /// values, and inline fields or alternatives that are not shapes.
    pub fn resolve(&self, owner: &Shape, field: &Field) -> Result<Kind<'_>, MapError> {
        let unsupported = || MapError::unsupported(&owner.name, &field.ident, &field.ty);
        let kind = self.resolve_type(&field.ty).ok_or_else(unsupported)?;

        if field.inline || field.alternative().is_some() {
            let target = match &kind {
                Kind::Optional(inner) if field.inline && field.alternative().is_none() => {
                    inner.as_ref()
                }
                other => other,
            };
            if !matches!(target, Kind::Shape(_)) {
                return Err(unsupported());
            }
        }
        Ok(kind)
    }

    fn resolve_type(&self, ty: &TypeExpr) -> Option<Kind<'_>> {
        match ty {
            TypeExpr::Primitive(p) => Some(Kind::Primitive(*p)),
            TypeExpr::Named(name) => self.get(name).map(Kind::Shape),
            TypeExpr::List(inner) => match inner.as_ref() {
                TypeExpr::Optional(_) => None,
                inner => Some(Kind::List(Box::new(self.resolve_type(inner)?))),
            },
            TypeExpr::Optional(inner) => match inner.as_ref() {
                TypeExpr::Optional(_) => None,
                inner => Some(Kind::Optional(Box::new(self.resolve_type(inner)?))),
            },
        }
    }

    /// Reject shapes that reference themselves, directly or through others
    fn check_acyclic(&self) -> Result<()> {
        fn refs(ty: &TypeExpr) -> Option<&str> {
            match ty {
                TypeExpr::Named(name) => Some(name),
                TypeExpr::List(inner) | TypeExpr::Optional(inner) => refs(inner),
                TypeExpr::Primitive(_) => None,
            }
        }

        fn visit<'a>(
            reg: &'a ShapeRegistry,
            name: &'a str,
            path: &mut Vec<&'a str>,
            done: &mut HashSet<&'a str>,
        ) -> Result<()> {
            if done.contains(name) {
                return Ok(());
            }
            if path.contains(&name) {
                bail!("shape {} is cyclic ({} -> {})", name, path.join(" -> "), name);
            }
            let Some(shape) = reg.get(name) else {
                return Ok(());
            };
            path.push(name);
            for field in &shape.fields {
                if let Some(next) = refs(&field.ty) {
                    visit(reg, next, path, done)?;
                }
            }
            path.pop();
            done.insert(name);
            Ok(())
        }

        let mut done = HashSet::new();
        for name in self.shapes.keys() {
            visit(self, name, &mut Vec::new(), &mut done)?;
        }
        Ok(())
    }
}

/// Global registry loaded from the embedded JSON
static REGISTRY: OnceLock<ShapeRegistry> = OnceLock::new();

/// Get the shape registry (loads from embedded JSON on first access)
pub fn registry() -> &'static ShapeRegistry {
    REGISTRY.get_or_init(|| {
        ShapeRegistry::from_sources(SHAPE_FILES)
            .unwrap_or_else(|e| panic!("Failed to load embedded shape definitions: {:#}", e))
    })
}
