//! Attribute declarations, values and type coercion

pub mod coercion;
pub mod parser;
pub mod schema;
pub mod value;

pub use coercion::{coerce, coerce_declared};
pub use parser::parse_attribute_declarations;
pub use schema::{AttributeDeclaration, AttributeMetadata, AttributeSchema};
pub use value::{
    AssetRef, AttributeType, AttributeValue, Color, EntityRef, NullResolver, RawAttributes,
    RawValue, ReferenceResolver, ReferenceTable,
};
