//! Attribute value types
//!
//! Raw input arrives as [`RawValue`]: either loosely-typed JSON (numbers,
//! strings, arrays, objects) or an already-typed [`AttributeValue`]. Coercion
//! turns it into the typed representation an attribute declaration asks for.

use glam::{Vec2, Vec3, Vec4};
use hecs::Entity;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Declared type of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    Boolean,
    Number,
    String,
    Json,
    Asset,
    Entity,
    Rgb,
    Rgba,
    Vec2,
    Vec3,
    Vec4,
    Curve,
    /// No declared type; values pass through unchanged
    Untyped,
}

impl AttributeType {
    /// Parse a type name as written in script declarations
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "boolean" | "bool" => Some(AttributeType::Boolean),
            "number" | "float" | "int" => Some(AttributeType::Number),
            "string" | "str" => Some(AttributeType::String),
            "json" => Some(AttributeType::Json),
            "asset" => Some(AttributeType::Asset),
            "entity" => Some(AttributeType::Entity),
            "rgb" => Some(AttributeType::Rgb),
            "rgba" | "color" => Some(AttributeType::Rgba),
            "vec2" => Some(AttributeType::Vec2),
            "vec3" => Some(AttributeType::Vec3),
            "vec4" => Some(AttributeType::Vec4),
            "curve" => Some(AttributeType::Curve),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeType::Boolean => "boolean",
            AttributeType::Number => "number",
            AttributeType::String => "string",
            AttributeType::Json => "json",
            AttributeType::Asset => "asset",
            AttributeType::Entity => "entity",
            AttributeType::Rgb => "rgb",
            AttributeType::Rgba => "rgba",
            AttributeType::Vec2 => "vec2",
            AttributeType::Vec3 => "vec3",
            AttributeType::Vec4 => "vec4",
            AttributeType::Curve => "curve",
            AttributeType::Untyped => "untyped",
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RGBA color with components stored as `[r, g, b, a]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub data: [f32; 4],
}

impl Color {
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { data: [r, g, b, a] }
    }

    pub fn r(&self) -> f32 {
        self.data[0]
    }

    pub fn g(&self) -> f32 {
        self.data[1]
    }

    pub fn b(&self) -> f32 {
        self.data[2]
    }

    pub fn a(&self) -> f32 {
        self.data[3]
    }

    /// Overwrite every component with `other`'s
    pub fn copy_from(&mut self, other: &Color) {
        self.data = other.data;
    }

    /// Parse `#RRGGBB` or `#RRGGBBAA` (case-insensitive)
    pub fn from_hex(s: &str) -> Option<Self> {
        let mut color = Color::BLACK;
        color.set_from_hex(s).then_some(color)
    }

    /// Parse a hex string into this color; returns false and leaves the
    /// color untouched if the string is malformed
    pub fn set_from_hex(&mut self, s: &str) -> bool {
        let Some(digits) = s.strip_prefix('#') else {
            return false;
        };
        if !(digits.len() == 6 || digits.len() == 8)
            || !digits.chars().all(|c| c.is_ascii_hexdigit())
        {
            return false;
        }

        let mut bytes = [255u8; 4];
        for (i, byte) in bytes.iter_mut().enumerate().take(digits.len() / 2) {
            match u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16) {
                Ok(value) => *byte = value,
                Err(_) => return false,
            }
        }
        for (component, byte) in self.data.iter_mut().zip(bytes) {
            *component = f32::from(byte) / 255.0;
        }
        true
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

/// Handle to an asset resolved through a [`ReferenceResolver`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetRef {
    pub id: u64,
    pub name: String,
}

impl AssetRef {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Handle to an entity resolved by its global unique identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub entity: Entity,
    pub guid: String,
}

impl EntityRef {
    pub fn new(entity: Entity, guid: impl Into<String>) -> Self {
        Self {
            entity,
            guid: guid.into(),
        }
    }
}

/// A typed attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Boolean(bool),
    Number(f64),
    String(String),
    Json(Value),
    Asset(AssetRef),
    Entity(EntityRef),
    Color(Color),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    /// Element-wise coerced values of an `array` attribute
    List(Vec<Option<AttributeValue>>),
    /// A declared type this runtime does not convert yet; keeps the raw input
    Unsupported {
        attribute_type: AttributeType,
        raw: Value,
    },
}

impl AttributeValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<&Color> {
        match self {
            AttributeValue::Color(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vec3(&self) -> Option<Vec3> {
        match self {
            AttributeValue::Vec3(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, AttributeValue::Unsupported { .. })
    }

    /// Lossy JSON view of the value, used when values cross into scripts
    ///
    /// Assets become their numeric id and entities their guid, which is what
    /// coercion accepts back.
    pub fn to_json(&self) -> Value {
        match self {
            AttributeValue::Boolean(v) => Value::Bool(*v),
            AttributeValue::Number(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            AttributeValue::String(v) => Value::String(v.clone()),
            AttributeValue::Json(v) => v.clone(),
            AttributeValue::Asset(asset) => Value::from(asset.id),
            AttributeValue::Entity(entity) => Value::String(entity.guid.clone()),
            AttributeValue::Color(c) => floats_to_json(&c.data),
            AttributeValue::Vec2(v) => floats_to_json(&v.to_array()),
            AttributeValue::Vec3(v) => floats_to_json(&v.to_array()),
            AttributeValue::Vec4(v) => floats_to_json(&v.to_array()),
            AttributeValue::List(items) => Value::Array(
                items
                    .iter()
                    .map(|item| item.as_ref().map_or(Value::Null, AttributeValue::to_json))
                    .collect(),
            ),
            AttributeValue::Unsupported { raw, .. } => raw.clone(),
        }
    }
}

fn floats_to_json(values: &[f32]) -> Value {
    Value::Array(
        values
            .iter()
            .map(|v| {
                serde_json::Number::from_f64(f64::from(*v))
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            })
            .collect(),
    )
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Boolean(v) => write!(f, "{v}"),
            AttributeValue::Number(v) => write!(f, "{v}"),
            AttributeValue::String(v) => write!(f, "\"{v}\""),
            AttributeValue::Json(v) => write!(f, "{v}"),
            AttributeValue::Asset(a) => write!(f, "asset({}, {})", a.id, a.name),
            AttributeValue::Entity(e) => write!(f, "entity({})", e.guid),
            AttributeValue::Color(c) => write!(
                f,
                "rgba({}, {}, {}, {})",
                c.data[0], c.data[1], c.data[2], c.data[3]
            ),
            AttributeValue::Vec2(v) => write!(f, "({}, {})", v.x, v.y),
            AttributeValue::Vec3(v) => write!(f, "({}, {}, {})", v.x, v.y, v.z),
            AttributeValue::Vec4(v) => write!(f, "({}, {}, {}, {})", v.x, v.y, v.z, v.w),
            AttributeValue::List(items) => write!(f, "[{} items]", items.len()),
            AttributeValue::Unsupported { attribute_type, .. } => {
                write!(f, "<unsupported {attribute_type}>")
            }
        }
    }
}

/// Untyped input for an attribute write
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Json(Value),
    Typed(AttributeValue),
}

/// Raw attribute values keyed by attribute name
pub type RawAttributes = HashMap<String, RawValue>;

impl RawValue {
    pub const NULL: RawValue = RawValue::Json(Value::Null);

    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Json(Value::Null))
    }

    /// JavaScript-style truthiness
    pub fn is_truthy(&self) -> bool {
        match self {
            RawValue::Json(Value::Null) => false,
            RawValue::Json(Value::Bool(b)) | RawValue::Typed(AttributeValue::Boolean(b)) => *b,
            RawValue::Json(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0 && !v.is_nan()),
            RawValue::Typed(AttributeValue::Number(v)) => *v != 0.0 && !v.is_nan(),
            RawValue::Json(Value::String(s)) | RawValue::Typed(AttributeValue::String(s)) => {
                !s.is_empty()
            }
            RawValue::Typed(AttributeValue::Json(v)) => RawValue::Json(v.clone()).is_truthy(),
            _ => true,
        }
    }

    /// Numeric view (JSON numbers and typed numbers only)
    pub fn as_number(&self) -> Option<f64> {
        match self {
            RawValue::Json(Value::Number(n)) => n.as_f64(),
            RawValue::Typed(AttributeValue::Number(v)) => Some(*v),
            RawValue::Typed(AttributeValue::Json(Value::Number(n))) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RawValue::Json(Value::Bool(b)) | RawValue::Typed(AttributeValue::Boolean(b)) => {
                Some(*b)
            }
            RawValue::Typed(AttributeValue::Json(Value::Bool(b))) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RawValue::Json(Value::String(s)) | RawValue::Typed(AttributeValue::String(s)) => {
                Some(s)
            }
            RawValue::Typed(AttributeValue::Json(Value::String(s))) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            RawValue::Json(Value::Array(items))
            | RawValue::Typed(AttributeValue::Json(Value::Array(items))) => Some(items),
            _ => None,
        }
    }

    pub fn typed(&self) -> Option<&AttributeValue> {
        match self {
            RawValue::Typed(value) => Some(value),
            RawValue::Json(_) => None,
        }
    }

    /// The value unchanged, expressed as a typed value (null stays null)
    pub fn into_passthrough(self) -> Option<AttributeValue> {
        match self {
            RawValue::Json(Value::Null) => None,
            RawValue::Json(Value::Bool(b)) => Some(AttributeValue::Boolean(b)),
            RawValue::Json(Value::Number(n)) => match n.as_f64() {
                Some(v) => Some(AttributeValue::Number(v)),
                None => Some(AttributeValue::Json(Value::Number(n))),
            },
            RawValue::Json(Value::String(s)) => Some(AttributeValue::String(s)),
            RawValue::Json(other) => Some(AttributeValue::Json(other)),
            RawValue::Typed(value) => Some(value),
        }
    }

    /// JSON view of the raw value
    pub fn to_json(&self) -> Value {
        match self {
            RawValue::Json(v) => v.clone(),
            RawValue::Typed(value) => value.to_json(),
        }
    }
}

impl From<Value> for RawValue {
    fn from(value: Value) -> Self {
        RawValue::Json(value)
    }
}

impl From<AttributeValue> for RawValue {
    fn from(value: AttributeValue) -> Self {
        RawValue::Typed(value)
    }
}

impl From<Option<AttributeValue>> for RawValue {
    fn from(value: Option<AttributeValue>) -> Self {
        value.map_or(RawValue::NULL, RawValue::Typed)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Json(Value::Bool(value))
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Json(Value::from(value))
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Json(Value::from(value))
    }
}

impl From<i32> for RawValue {
    fn from(value: i32) -> Self {
        RawValue::Json(Value::from(value))
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Json(Value::String(value.to_string()))
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Json(Value::String(value))
    }
}

impl From<Color> for RawValue {
    fn from(value: Color) -> Self {
        RawValue::Typed(AttributeValue::Color(value))
    }
}

impl From<Vec2> for RawValue {
    fn from(value: Vec2) -> Self {
        RawValue::Typed(AttributeValue::Vec2(value))
    }
}

impl From<Vec3> for RawValue {
    fn from(value: Vec3) -> Self {
        RawValue::Typed(AttributeValue::Vec3(value))
    }
}

impl From<Vec4> for RawValue {
    fn from(value: Vec4) -> Self {
        RawValue::Typed(AttributeValue::Vec4(value))
    }
}

impl From<AssetRef> for RawValue {
    fn from(value: AssetRef) -> Self {
        RawValue::Typed(AttributeValue::Asset(value))
    }
}

impl From<EntityRef> for RawValue {
    fn from(value: EntityRef) -> Self {
        RawValue::Typed(AttributeValue::Entity(value))
    }
}

/// Lookup of asset and entity references during coercion
pub trait ReferenceResolver {
    fn resolve_asset(&self, id: u64) -> Option<AssetRef>;
    fn resolve_entity(&self, guid: &str) -> Option<EntityRef>;
}

/// Resolver that finds nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NullResolver;

impl ReferenceResolver for NullResolver {
    fn resolve_asset(&self, _id: u64) -> Option<AssetRef> {
        None
    }

    fn resolve_entity(&self, _guid: &str) -> Option<EntityRef> {
        None
    }
}

/// In-memory resolver backed by lookup tables
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    assets: HashMap<u64, AssetRef>,
    entities: HashMap<String, EntityRef>,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_asset(&mut self, asset: AssetRef) {
        self.assets.insert(asset.id, asset);
    }

    pub fn insert_entity(&mut self, entity: EntityRef) {
        self.entities.insert(entity.guid.clone(), entity);
    }

    pub fn with_asset(mut self, asset: AssetRef) -> Self {
        self.insert_asset(asset);
        self
    }

    pub fn with_entity(mut self, entity: EntityRef) -> Self {
        self.insert_entity(entity);
        self
    }
}

impl ReferenceResolver for ReferenceTable {
    fn resolve_asset(&self, id: u64) -> Option<AssetRef> {
        self.assets.get(&id).cloned()
    }

    fn resolve_entity(&self, guid: &str) -> Option<EntityRef> {
        self.entities.get(guid).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_type_parsing() {
        assert_eq!(AttributeType::parse("number"), Some(AttributeType::Number));
        assert_eq!(AttributeType::parse("float"), Some(AttributeType::Number));
        assert_eq!(AttributeType::parse("Color"), Some(AttributeType::Rgba));
        assert_eq!(AttributeType::parse("vec3"), Some(AttributeType::Vec3));
        assert_eq!(AttributeType::parse("curve"), Some(AttributeType::Curve));
        assert_eq!(AttributeType::parse("matrix"), None);
    }

    #[test]
    fn test_color_from_hex() {
        let color = Color::from_hex("#FF0080").unwrap();
        assert_eq!(color.r(), 1.0);
        assert_eq!(color.g(), 0.0);
        assert!((color.b() - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(color.a(), 1.0);

        let color = Color::from_hex("#ff000000").unwrap();
        assert_eq!(color.a(), 0.0);

        assert!(Color::from_hex("ff0000").is_none());
        assert!(Color::from_hex("#ff00").is_none());
        assert!(Color::from_hex("#gg0000").is_none());
    }

    #[test]
    fn test_truthiness() {
        assert!(!RawValue::from(json!(null)).is_truthy());
        assert!(!RawValue::from(json!(0)).is_truthy());
        assert!(!RawValue::from(json!("")).is_truthy());
        assert!(RawValue::from(json!("0")).is_truthy());
        assert!(RawValue::from(json!([])).is_truthy());
        assert!(RawValue::from(json!({})).is_truthy());
        assert!(RawValue::from(Color::WHITE).is_truthy());
    }

    #[test]
    fn test_to_json_views() {
        assert_eq!(AttributeValue::Number(7.0).to_json(), json!(7.0));
        assert_eq!(
            AttributeValue::Color(Color::new(1.0, 0.5, 0.0, 1.0)).to_json(),
            json!([1.0, 0.5, 0.0, 1.0])
        );
        assert_eq!(
            AttributeValue::List(vec![Some(AttributeValue::Boolean(true)), None]).to_json(),
            json!([true, null])
        );
    }

    #[test]
    fn test_reference_table() {
        let mut world = hecs::World::new();
        let entity = world.spawn(());
        let table = ReferenceTable::new()
            .with_asset(AssetRef::new(3, "crate.png"))
            .with_entity(EntityRef::new(entity, "guid-1"));

        assert_eq!(table.resolve_asset(3).map(|a| a.name), Some("crate.png".to_string()));
        assert!(table.resolve_asset(4).is_none());
        assert_eq!(table.resolve_entity("guid-1").map(|e| e.entity), Some(entity));
        assert!(NullResolver.resolve_entity("guid-1").is_none());
    }
}
