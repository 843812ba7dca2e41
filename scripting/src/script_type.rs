//! Script types: named behaviour definitions with declared attributes

use crate::attributes::{AttributeDeclaration, AttributeSchema};
use crate::error::ScriptError;
use crate::instance::{ScriptContext, ScriptInstance};
use bitflags::bitflags;
use std::any::Any;
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard};
use tracing::{debug, warn};

/// Names a script type may not use
pub const RESERVED_SCRIPT_NAMES: &[&str] = &[
    "system",
    "entity",
    "create",
    "destroy",
    "swap",
    "move",
    "scripts",
    "enabled",
    "has",
    "on",
    "off",
    "fire",
    "once",
    "has_event",
    "on_enable",
    "on_disable",
    "on_post_state_change",
    "initialize",
    "post_initialize",
    "update",
    "post_update",
];

bitflags! {
    /// Lifecycle callbacks a behaviour actually implements
    ///
    /// Read once when an instance is created; absent callbacks are skipped
    /// without being called.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ScriptCallbacks: u8 {
        const INITIALIZE = 1 << 0;
        const POST_INITIALIZE = 1 << 1;
        const UPDATE = 1 << 2;
        const POST_UPDATE = 1 << 3;
        const SWAP = 1 << 4;
    }
}

/// A lifecycle callback, as reported in error notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptMethod {
    Initialize,
    PostInitialize,
    Update,
    PostUpdate,
    Swap,
}

impl ScriptMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptMethod::Initialize => "initialize",
            ScriptMethod::PostInitialize => "postInitialize",
            ScriptMethod::Update => "update",
            ScriptMethod::PostUpdate => "postUpdate",
            ScriptMethod::Swap => "swap",
        }
    }

    /// Presence flag for this callback
    pub fn flag(&self) -> ScriptCallbacks {
        match self {
            ScriptMethod::Initialize => ScriptCallbacks::INITIALIZE,
            ScriptMethod::PostInitialize => ScriptCallbacks::POST_INITIALIZE,
            ScriptMethod::Update => ScriptCallbacks::UPDATE,
            ScriptMethod::PostUpdate => ScriptCallbacks::POST_UPDATE,
            ScriptMethod::Swap => ScriptCallbacks::SWAP,
        }
    }
}

impl fmt::Display for ScriptMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upcast helper so behaviours can be downcast to their concrete type
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The code behind a script type
///
/// Every callback defaults to a no-op, but only the ones reported by
/// [`ScriptBehaviour::callbacks`] are ever invoked.
pub trait ScriptBehaviour: AsAny + Send + Sync {
    fn callbacks(&self) -> ScriptCallbacks;

    fn initialize(&mut self, _ctx: &mut ScriptContext<'_>) -> Result<(), ScriptError> {
        Ok(())
    }

    fn post_initialize(&mut self, _ctx: &mut ScriptContext<'_>) -> Result<(), ScriptError> {
        Ok(())
    }

    fn update(&mut self, _ctx: &mut ScriptContext<'_>, _dt: f32) -> Result<(), ScriptError> {
        Ok(())
    }

    fn post_update(&mut self, _ctx: &mut ScriptContext<'_>, _dt: f32) -> Result<(), ScriptError> {
        Ok(())
    }

    /// Take over from `old` after a hot swap
    fn swap(
        &mut self,
        _ctx: &mut ScriptContext<'_>,
        _old: &mut ScriptInstance,
    ) -> Result<(), ScriptError> {
        Ok(())
    }
}

type BehaviourFactory = dyn Fn() -> Box<dyn ScriptBehaviour> + Send + Sync;

/// A named script type
///
/// Shared between the registry and every instance through `Arc`. The schema
/// is behind a lock so attributes can still be declared after instances
/// exist.
pub struct ScriptType {
    name: String,
    schema: RwLock<AttributeSchema>,
    factory: Box<BehaviourFactory>,
}

impl ScriptType {
    /// Declare a script type
    ///
    /// Fails for reserved names and for names that do not start with a
    /// letter.
    pub fn new<F>(name: impl Into<String>, factory: F) -> Result<Self, ScriptError>
    where
        F: Fn() -> Box<dyn ScriptBehaviour> + Send + Sync + 'static,
    {
        let name = name.into();
        if RESERVED_SCRIPT_NAMES.contains(&name.as_str()) {
            warn!(script = %name, "Script name is reserved");
            return Err(ScriptError::ReservedName(name));
        }
        if !name.chars().next().is_some_and(char::is_alphabetic) {
            return Err(ScriptError::InvalidName(name));
        }

        debug!(script = %name, "Declared script type");
        Ok(Self {
            name,
            schema: RwLock::new(AttributeSchema::new()),
            factory: Box::new(factory),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Build a fresh behaviour object
    pub fn instantiate(&self) -> Box<dyn ScriptBehaviour> {
        (self.factory)()
    }

    /// Declare an attribute; duplicates and reserved names are rejected
    pub fn add_attribute(&self, name: &str, declaration: AttributeDeclaration) -> bool {
        self.schema
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add(&self.name, name, declaration)
    }

    /// Builder form of [`ScriptType::add_attribute`]
    pub fn with_attribute(self, name: &str, declaration: AttributeDeclaration) -> Self {
        self.add_attribute(name, declaration);
        self
    }

    pub fn remove_attribute(&self, name: &str) -> bool {
        self.schema
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.schema().has(name)
    }

    /// A copy of one declaration
    pub fn attribute(&self, name: &str) -> Option<AttributeDeclaration> {
        self.schema().get(name).cloned()
    }

    /// Read access to the whole schema
    pub fn schema(&self) -> RwLockReadGuard<'_, AttributeSchema> {
        self.schema.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptType")
            .field("name", &self.name)
            .field("attributes", &self.schema().names())
            .finish()
    }
}
