//! Attribute declarations of a script type

use crate::attributes::value::{AttributeType, RawValue};
use tracing::{debug, warn};

/// Names that can never be declared as attributes
pub const RESERVED_ATTRIBUTE_NAMES: &[&str] = &[
    "app",
    "entity",
    "enabled",
    "attributes",
    "script_type",
    "initialized",
    "post_initialized",
    "has",
    "on",
    "off",
    "fire",
    "once",
    "has_event",
];

pub fn is_reserved_attribute(name: &str) -> bool {
    RESERVED_ATTRIBUTE_NAMES.contains(&name)
}

/// Editor-facing hints; the runtime carries them but never reads them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub placeholder: Vec<String>,
    pub tooltip: Option<String>,
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub step: Option<f32>,
    pub precision: Option<u32>,
    /// Maximum element count for array attributes
    pub size: Option<usize>,
    /// Asset type filter for asset pickers
    pub asset_type: Option<String>,
    /// Curve names for curve attributes
    pub curves: Vec<String>,
    /// Fixed choices as (title, value)
    pub choices: Vec<(String, serde_json::Value)>,
}

/// Declaration of one attribute
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDeclaration {
    pub attribute_type: AttributeType,
    pub default: Option<RawValue>,
    pub array: bool,
    pub metadata: AttributeMetadata,
}

impl AttributeDeclaration {
    pub fn new(attribute_type: AttributeType) -> Self {
        Self {
            attribute_type,
            default: None,
            array: false,
            metadata: AttributeMetadata::default(),
        }
    }

    /// A declaration without a type; values pass through unconverted
    pub fn untyped() -> Self {
        Self::new(AttributeType::Untyped)
    }

    pub fn with_default(mut self, default: impl Into<RawValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn array(mut self, array: bool) -> Self {
        self.array = array;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.metadata.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = Some(description.into());
        self
    }

    pub fn range(mut self, min: f32, max: f32) -> Self {
        self.metadata.min = Some(min);
        self.metadata.max = Some(max);
        self
    }

    pub fn with_metadata(mut self, metadata: AttributeMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Ordered set of attribute declarations for one script type
#[derive(Debug, Clone, Default)]
pub struct AttributeSchema {
    entries: Vec<(String, AttributeDeclaration)>,
}

impl AttributeSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an attribute
    ///
    /// Duplicate and reserved names are rejected with a warning and leave
    /// the schema untouched.
    pub fn add(&mut self, script: &str, name: &str, declaration: AttributeDeclaration) -> bool {
        if self.has(name) {
            warn!(
                script = script,
                attribute = name,
                "Attribute is already defined for script type"
            );
            return false;
        }
        if is_reserved_attribute(name) {
            warn!(script = script, attribute = name, "Attribute name is reserved");
            return false;
        }

        debug!(
            script = script,
            attribute = name,
            attribute_type = %declaration.attribute_type,
            "Declared attribute"
        );
        self.entries.push((name.to_string(), declaration));
        true
    }

    /// Remove a declaration; returns whether it existed
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| entry != name);
        before != self.entries.len()
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.iter().any(|(entry, _)| entry == name)
    }

    pub fn get(&self, name: &str) -> Option<&AttributeDeclaration> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, declaration)| declaration)
    }

    /// Declarations in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeDeclaration)> {
        self.entries
            .iter()
            .map(|(name, declaration)| (name.as_str(), declaration))
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
