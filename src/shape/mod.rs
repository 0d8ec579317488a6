//! Shape descriptors
//!
//! A shape is the structural description of one GraphQL payload: an ordered
//! list of fields, each with an attribute name, a wire key, a declared type
//! and optional `inline` / one-of markers. Shapes are data, not code: the
//! built-in ones live in `src/shapes/*.json` and are parsed once into the
//! [`registry`].
//!
//! # Definition format
//!
//! ```json
//! {
//!   "shapes": {
//!     "SQLServer": {
//!       "docs": { "aws_rds": "Set if the database server instance is an AWS RDS instance" },
//!       "fields": [
//!         { "ident": "AwsRds", "on": "AWSSQLServer", "type": "AWSSQLServer" },
//!         { "ident": "Subnets", "type": "[AWSSubnet]" },
//!         { "key": "server", "inline": true, "type": "SQLServer" }
//!       ]
//!     }
//!   }
//! }
//! ```
//!
//! - `ident` is the field identifier; the attribute name defaults to its
//!   snake_case form and the GraphQL key to its lowerCamelCase form.
//! - `name` and `key` override those.
//! - `inline` merges the field's attributes into the parent.
//! - `on` marks a one-of alternative read from the same node when its
//!   `__typename` matches.

mod registry;
mod types;

pub use registry::{registry, Kind, Shape, ShapeRegistry, SATISFIER};
pub use types::{Field, Primitive, Source, TypeExpr};
