//! Scripting runtime for the engine's entity-component world
//!
//! Script types declare typed attributes and lifecycle callbacks. A
//! [`ScriptComponent`](component::ScriptComponent) on each entity owns the
//! ordered script instances and drives them through attribute
//! initialization, `initialize`, `postInitialize`, per-frame
//! `update`/`postUpdate` and destruction, with hot-swap and reordering
//! support.

pub mod attributes;
pub mod component;
pub mod config;
pub mod error;
pub mod events;
pub mod instance;
pub mod registry;
pub mod rhai_script;
pub mod script_type;
pub mod system;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub mod prelude {
    // Attribute types
    pub use crate::attributes::{
        coerce, AssetRef, AttributeDeclaration, AttributeType, AttributeValue, Color, EntityRef,
        NullResolver, RawAttributes, RawValue, ReferenceResolver, ReferenceTable,
    };

    // Lifecycle types
    pub use crate::component::{
        ComponentEvent, CreateOptions, ScriptComponent, ScriptData, ScriptTarget, SharedResolver,
    };
    pub use crate::instance::{InstanceEvent, ScriptContext, ScriptInstance};
    pub use crate::registry::ScriptRegistry;
    pub use crate::script_type::{ScriptBehaviour, ScriptCallbacks, ScriptMethod, ScriptType};

    // Systems
    pub use crate::system::{
        attach_script_component, remove_script_component, run_script_frame,
        script_initialize_system,
    };

    // Rhai backend
    pub use crate::rhai_script::RhaiScriptLoader;

    // Config and errors
    pub use crate::config::ScriptingConfig;
    pub use crate::error::ScriptError;

    // Math types
    pub use glam::{Vec2, Vec3, Vec4};
}

/// Initialize logging for the scripting runtime
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
