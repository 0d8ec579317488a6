//! Field types and field descriptors

use std::fmt;
use std::str::FromStr;

/// Primitive kinds the engine maps directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    String,
    Int,
    Bool,
    Float,
}

impl Primitive {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(Self::String),
            "int" => Some(Self::Int),
            "bool" => Some(Self::Bool),
            "float" => Some(Self::Float),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Bool => "bool",
            Self::Float => "float",
        }
    }
}

/// Declared type of a field.
///
/// Written as `string`, `int`, `bool`, `float`, a shape name, `[T]` for a
/// list or `T?` for an optional value. Names are only checked against the
/// registry when a schema or value is built, so anything that is not a known
/// shape (`map[string]string`, `chan int`, ...) surfaces as an unsupported
/// type at that point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(try_from = "String")]
pub enum TypeExpr {
    Primitive(Primitive),
    Named(String),
    List(Box<TypeExpr>),
    Optional(Box<TypeExpr>),
}

impl FromStr for TypeExpr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty type expression".to_string());
        }
        if let Some(inner) = s.strip_suffix('?') {
            return Ok(Self::Optional(Box::new(inner.parse()?)));
        }
        if let Some(inner) = s.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            return Ok(Self::List(Box::new(inner.parse()?)));
        }
        Ok(match Primitive::parse(s) {
            Some(p) => Self::Primitive(p),
            None => Self::Named(s.to_string()),
        })
    }
}

impl TryFrom<String> for TypeExpr {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(p) => f.write_str(p.as_str()),
            Self::Named(n) => f.write_str(n),
            Self::List(inner) => write!(f, "[{}]", inner),
            Self::Optional(inner) => write!(f, "{}?", inner),
        }
    }
}

/// Where a field reads its data from in a response node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A key of the node.
    Key(String),
    /// The node itself, when its `__typename` matches (a GraphQL fragment).
    Fragment(String),
}

/// A resolved field of a shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Identifier used in messages.
    pub ident: String,
    /// Attribute name; `None` only for inline fields.
    pub name: Option<String>,
    pub source: Source,
    pub ty: TypeExpr,
    pub inline: bool,
}

impl Field {
    /// The one-of discriminator, if this field is an alternative.
    pub fn alternative(&self) -> Option<&str> {
        match &self.source {
            Source::Fragment(on) => Some(on),
            Source::Key(_) => None,
        }
    }

    /// True if the field passes an alternative filter.
    pub fn included(&self, filter: Option<&[&str]>) -> bool {
        match (self.alternative(), filter) {
            (Some(on), Some(filter)) => filter.contains(&on),
            _ => true,
        }
    }
}
