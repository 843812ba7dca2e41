//! Per-entity script component: owns the ordered script instances and drives
//! their lifecycle
//!
//! Instances move through `initialize`, `postInitialize`, then per-frame
//! `update`/`postUpdate` while effectively enabled. Every callback runs
//! inside failure containment: an error or panic disables the offending
//! instance and is published on the `error` channels instead of reaching the
//! caller.

use crate::attributes::schema::is_reserved_attribute;
use crate::attributes::{
    AttributeDeclaration, NullResolver, RawAttributes, RawValue, ReferenceResolver,
};
use crate::config::ScriptingConfig;
use crate::error::ScriptError;
use crate::events::{scoped, EventEmitter, ListenerId};
use crate::instance::{InstanceState, ScriptInstance};
use crate::registry::ScriptRegistry;
use crate::script_type::{ScriptMethod, ScriptType};
use hecs::Entity;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Resolver shared by every component that needs asset and entity lookups
pub type SharedResolver = Arc<dyn ReferenceResolver + Send + Sync>;

/// Names a script either by name or by an already-resolved type
#[derive(Debug, Clone, Copy)]
pub enum ScriptTarget<'a> {
    Name(&'a str),
    Type(&'a Arc<ScriptType>),
}

impl ScriptTarget<'_> {
    pub fn name(&self) -> &str {
        match self {
            ScriptTarget::Name(name) => *name,
            ScriptTarget::Type(script_type) => script_type.name(),
        }
    }

    fn resolve(&self, registry: &ScriptRegistry) -> Option<Arc<ScriptType>> {
        match self {
            ScriptTarget::Name(name) => registry.get(name),
            ScriptTarget::Type(script_type) => Some(Arc::clone(script_type)),
        }
    }
}

impl<'a> From<&'a str> for ScriptTarget<'a> {
    fn from(name: &'a str) -> Self {
        ScriptTarget::Name(name)
    }
}

impl<'a> From<&'a String> for ScriptTarget<'a> {
    fn from(name: &'a String) -> Self {
        ScriptTarget::Name(name)
    }
}

impl<'a> From<&'a Arc<ScriptType>> for ScriptTarget<'a> {
    fn from(script_type: &'a Arc<ScriptType>) -> Self {
        ScriptTarget::Type(script_type)
    }
}

/// Options for [`ScriptComponent::create`]
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Local enabled intent of the new instance
    pub enabled: bool,
    /// Raw attribute input; missing attributes take their declared defaults
    pub attributes: RawAttributes,
    /// Position in the execution order; appended when absent or out of range
    pub insert_index: Option<usize>,
    /// Defer attribute initialization and every lifecycle callback
    pub preloading: bool,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            attributes: RawAttributes::new(),
            insert_index: None,
            preloading: false,
        }
    }
}

impl CreateOptions {
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn insert_at(mut self, index: usize) -> Self {
        self.insert_index = Some(index);
        self
    }

    pub fn preloading(mut self, preloading: bool) -> Self {
        self.preloading = preloading;
        self
    }
}

/// Per-script entry of [`ScriptComponent::apply_data`]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScriptData {
    pub enabled: Option<bool>,
    pub attributes: Option<HashMap<String, Value>>,
}

/// Notification published on a component's channels
#[derive(Debug, Clone, Copy)]
pub enum ComponentEvent<'a> {
    /// `create` and `create:<name>`
    Create(&'a ScriptInstance),
    /// `destroy` and `destroy:<name>`; `None` when only a placeholder existed
    Destroy {
        name: &'a str,
        instance: Option<&'a ScriptInstance>,
    },
    /// `swap` and `swap:<name>`, carrying the replacement
    Swap(&'a ScriptInstance),
    /// `move` and `move:<name>`
    Move {
        instance: &'a ScriptInstance,
        index: usize,
        old_index: usize,
    },
    /// `enabled`
    Enabled,
    /// `disabled`
    Disabled,
    /// `state`, carrying the new effective state
    State(bool),
    /// `remove`
    Remove,
    /// `error`
    Error {
        instance: &'a ScriptInstance,
        error: &'a ScriptError,
        method: ScriptMethod,
    },
}

pub type ComponentListener = dyn FnMut(&ComponentEvent<'_>) + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Live,
    /// Requested while the type was unknown; remembers the wanted position
    Awaiting { index: usize },
}

/// Ordered collection of script instances on one entity
pub struct ScriptComponent {
    entity: Entity,
    enabled: bool,
    entity_enabled: bool,
    last_state: bool,
    scripts: Vec<ScriptInstance>,
    index: HashMap<String, Slot>,
    events: EventEmitter<ComponentListener>,
    resolver: SharedResolver,
    config: ScriptingConfig,
}

impl ScriptComponent {
    pub fn new(entity: Entity) -> Self {
        Self::with_config(entity, ScriptingConfig::default())
    }

    pub fn with_config(entity: Entity, config: ScriptingConfig) -> Self {
        Self {
            entity,
            enabled: true,
            entity_enabled: true,
            last_state: true,
            scripts: Vec::new(),
            index: HashMap::new(),
            events: EventEmitter::new(),
            resolver: Arc::new(NullResolver),
            config,
        }
    }

    /// Use `resolver` for asset and entity attributes
    pub fn with_resolver(mut self, resolver: SharedResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn entity(&self) -> Entity {
        self.entity
    }

    pub fn config(&self) -> &ScriptingConfig {
        &self.config
    }

    // ---- queries ----

    /// Whether a live instance of `name` exists (placeholders excluded)
    pub fn has(&self, name: &str) -> bool {
        matches!(self.index.get(name), Some(Slot::Live))
    }

    /// Whether `name` was requested before its type was registered
    pub fn is_awaiting(&self, name: &str) -> bool {
        matches!(self.index.get(name), Some(Slot::Awaiting { .. }))
    }

    pub fn get(&self, name: &str) -> Option<&ScriptInstance> {
        self.scripts.iter().find(|script| script.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ScriptInstance> {
        self.scripts.iter_mut().find(|script| script.name() == name)
    }

    /// Instances in execution order
    pub fn scripts(&self) -> &[ScriptInstance] {
        &self.scripts
    }

    /// Script names in execution order
    pub fn script_names(&self) -> Vec<&str> {
        self.scripts.iter().map(ScriptInstance::name).collect()
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.scripts.iter().position(|script| script.name() == name)
    }

    // ---- events ----

    pub fn on(
        &mut self,
        channel: impl Into<String>,
        listener: impl FnMut(&ComponentEvent<'_>) + Send + Sync + 'static,
    ) -> ListenerId {
        self.events.on(channel, Box::new(listener))
    }

    pub fn off(&mut self, channel: &str, id: ListenerId) -> bool {
        self.events.off(channel, id)
    }

    pub fn has_event(&self, channel: &str) -> bool {
        self.events.has_listeners(channel)
    }

    // ---- enabled state ----

    /// The component's own enabled flag
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.check_state();
    }

    /// Report the owning entity's effective enabled state
    pub fn set_entity_enabled(&mut self, enabled: bool) {
        self.entity_enabled = enabled;
        self.check_state();
    }

    pub fn is_effectively_enabled(&self) -> bool {
        self.enabled && self.entity_enabled
    }

    /// Recompute the effective state and react to an actual transition
    ///
    /// Fires `enabled`/`disabled` then `state`, resynchronizes every
    /// instance and initializes instances that just became enabled for the
    /// first time. `postInitialize` waits for [`Self::post_state_change`].
    pub fn check_state(&mut self) {
        let state = self.is_effectively_enabled();
        if state == self.last_state {
            return;
        }
        self.last_state = state;
        debug!(entity = ?self.entity, enabled = state, "Script component state changed");

        let (channel, edge) = if state {
            ("enabled", ComponentEvent::Enabled)
        } else {
            ("disabled", ComponentEvent::Disabled)
        };
        self.events.fire(channel, |listener| listener(&edge));
        self.events
            .fire("state", |listener| listener(&ComponentEvent::State(state)));

        for i in 0..self.scripts.len() {
            self.scripts[i].state_mut().set_host_enabled(state);
            if !self.scripts[i].is_initialized() && self.scripts[i].enabled() {
                self.run_initialize(i);
            }
        }
    }

    /// Post-initialize every instance that was initialized but has not
    /// received `postInitialize` yet
    pub fn post_state_change(&mut self) {
        for i in 0..self.scripts.len() {
            let script = &self.scripts[i];
            if script.is_initialized() && !script.is_post_initialized() {
                self.run_post_initialize(i);
            }
        }
    }

    /// Set one instance's enabled intent, initializing it if that makes it
    /// effectively enabled for the first time
    pub fn set_script_enabled(&mut self, name: &str, enabled: bool) -> bool {
        let Some(i) = self.position(name) else {
            return false;
        };
        self.scripts[i].set_enabled(enabled);

        if self.scripts[i].enabled() {
            if !self.scripts[i].is_initialized() {
                self.run_initialize(i);
            }
            if self.scripts[i].is_initialized()
                && !self.scripts[i].is_post_initialized()
                && self.scripts[i].enabled()
            {
                self.run_post_initialize(i);
            }
        }
        true
    }

    // ---- lifecycle operations ----

    /// Add an instance of a script type to this entity
    ///
    /// Returns `None` with a warning when the type already has a live
    /// instance here, or when a name cannot be resolved. In the latter case
    /// a placeholder is recorded at the requested position.
    pub fn create<'t>(
        &mut self,
        registry: &mut ScriptRegistry,
        target: impl Into<ScriptTarget<'t>>,
        options: CreateOptions,
    ) -> Option<&mut ScriptInstance> {
        let target = target.into();
        let name = target.name().to_string();

        if self.has(&name) {
            warn!(
                entity = ?self.entity,
                script = %name,
                "Script is already added to entity"
            );
            return None;
        }

        let Some(script_type) = target.resolve(registry) else {
            let index = options.insert_index.unwrap_or(self.scripts.len());
            warn!(
                entity = ?self.entity,
                script = %name,
                "Script is not registered yet, awaiting registration"
            );
            self.index.insert(name, Slot::Awaiting { index });
            return None;
        };

        let insert_index = match (options.insert_index, self.index.get(&name)) {
            (Some(index), _) => Some(index),
            (None, Some(Slot::Awaiting { index })) => Some(*index),
            (None, _) => None,
        };
        let position = match insert_index {
            Some(index) if index < self.scripts.len() => index,
            _ => self.scripts.len(),
        };

        let instance = ScriptInstance::new(
            script_type,
            self.entity,
            options.enabled,
            self.last_state,
            options.attributes,
        );
        self.scripts.insert(position, instance);
        self.index.insert(name.clone(), Slot::Live);
        registry.subscribe_swap(&name, self.entity);
        debug!(entity = ?self.entity, script = %name, position = position, "Created script instance");

        if !options.preloading {
            let resolver = Arc::clone(&self.resolver);
            self.scripts[position]
                .state_mut()
                .initialize_attributes(&*resolver);
        }

        let event = ComponentEvent::Create(&self.scripts[position]);
        self.events.fire("create", |listener| listener(&event));
        self.events
            .fire(&scoped("create", &name), |listener| listener(&event));

        // Both phases run back to back, even if `initialize` disabled the instance
        if !options.preloading
            && self.is_effectively_enabled()
            && self.scripts[position].local_enabled()
        {
            self.run_initialize(position);
            self.run_post_initialize(position);
        }

        self.scripts.get_mut(position)
    }

    /// Remove an instance or placeholder; returns false if neither existed
    pub fn destroy<'t>(
        &mut self,
        registry: &mut ScriptRegistry,
        target: impl Into<ScriptTarget<'t>>,
    ) -> bool {
        let target = target.into();
        let name = target.name();
        let Some(slot) = self.index.remove(name) else {
            return false;
        };
        registry.unsubscribe_swap(name, self.entity);

        let instance = match slot {
            Slot::Live => self
                .position(name)
                .map(|position| self.scripts.remove(position)),
            Slot::Awaiting { .. } => None,
        };
        debug!(entity = ?self.entity, script = %name, placeholder = instance.is_none(), "Destroyed script");

        let event = ComponentEvent::Destroy {
            name,
            instance: instance.as_ref(),
        };
        self.events.fire("destroy", |listener| listener(&event));
        self.events
            .fire(&scoped("destroy", name), |listener| listener(&event));

        if let Some(mut instance) = instance {
            instance.state_mut().fire_destroy();
        }
        true
    }

    /// Replace a live instance with a fresh one of the (possibly updated) type
    ///
    /// The replacement keeps the old instance's enabled intent, attribute
    /// values and lifecycle flags, then receives `swap(old)`. Fails when the
    /// new type has no swap callback; the old instance stays live.
    pub fn swap<'t>(
        &mut self,
        registry: &ScriptRegistry,
        target: impl Into<ScriptTarget<'t>>,
    ) -> bool {
        let target = target.into();
        let name = target.name().to_string();
        let Some(position) = self.position(&name) else {
            return false;
        };
        let Some(script_type) = target.resolve(registry) else {
            return false;
        };

        let behaviour = script_type.instantiate();
        if !behaviour.callbacks().contains(ScriptMethod::Swap.flag()) {
            debug!(script = %name, "Script type does not support swap");
            return false;
        }

        let resolver = Arc::clone(&self.resolver);
        let old = &self.scripts[position];
        let mut state = InstanceState::new(
            script_type,
            self.entity,
            old.local_enabled(),
            self.last_state,
            old.state().carry_over_attributes(),
        );
        state.initialize_attributes(&*resolver);
        if old.is_initialized() {
            state.mark_initialized();
        }
        if old.is_post_initialized() {
            state.mark_post_initialized();
        }

        let replacement = ScriptInstance::with_behaviour(behaviour, state);
        let mut old = std::mem::replace(&mut self.scripts[position], replacement);
        debug!(entity = ?self.entity, script = %name, "Swapped script instance");

        let catch_panics = self.config.catch_panics;
        let result = contain(catch_panics, || {
            self.scripts[position].call_swap(&mut old, &*resolver)
        });
        if let Err(error) = result {
            self.handle_error(position, ScriptMethod::Swap, error);
        }

        let event = ComponentEvent::Swap(&self.scripts[position]);
        self.events.fire("swap", |listener| listener(&event));
        self.events
            .fire(&scoped("swap", &name), |listener| listener(&event));
        true
    }

    /// Move an instance to `index` in the execution order
    pub fn move_script<'t>(&mut self, target: impl Into<ScriptTarget<'t>>, index: usize) -> bool {
        let target = target.into();
        let name = target.name();
        if index >= self.scripts.len() {
            return false;
        }
        let Some(old_index) = self.position(name) else {
            return false;
        };
        if old_index == index {
            return false;
        }

        let instance = self.scripts.remove(old_index);
        self.scripts.insert(index, instance);

        let event = ComponentEvent::Move {
            instance: &self.scripts[index],
            index,
            old_index,
        };
        self.events.fire("move", |listener| listener(&event));
        self.events
            .fire(&scoped("move", name), |listener| listener(&event));
        true
    }

    /// Destroy every instance; called when the component leaves its entity
    pub fn teardown(&mut self, registry: &mut ScriptRegistry) {
        self.events
            .fire("remove", |listener| listener(&ComponentEvent::Remove));

        while let Some(name) = self.scripts.first().map(|script| script.name().to_string()) {
            if !self.destroy(registry, name.as_str()) {
                break;
            }
        }
        self.index.clear();
    }

    // ---- frame phases ----

    /// Coerce attributes of instances created while preloading
    pub fn initialize_attributes(&mut self) {
        let resolver = Arc::clone(&self.resolver);
        for script in &mut self.scripts {
            script.state_mut().initialize_attributes(&*resolver);
        }
    }

    /// Fire `initialize` on every enabled, not yet initialized instance
    pub fn initialize(&mut self) {
        for i in 0..self.scripts.len() {
            if !self.scripts[i].is_initialized() && self.scripts[i].enabled() {
                self.run_initialize(i);
            }
        }
    }

    /// Fire `postInitialize` on every initialized instance still waiting for it
    pub fn post_initialize(&mut self) {
        self.post_state_change();
    }

    /// Fire `update` on every enabled instance, in order
    pub fn update(&mut self, dt: f32) {
        self.tick(ScriptMethod::Update, dt);
    }

    /// Fire `postUpdate` on every enabled instance, in order
    pub fn post_update(&mut self, dt: f32) {
        self.tick(ScriptMethod::PostUpdate, dt);
    }

    fn tick(&mut self, method: ScriptMethod, dt: f32) {
        for i in 0..self.scripts.len() {
            let script = &self.scripts[i];
            if script.enabled() && script.has_callback(method) {
                self.invoke(i, method, dt);
            }
        }
    }

    // ---- bulk data ----

    /// Apply enabled flags and attribute values per script name
    ///
    /// Attributes missing from a script type are declared on it as untyped
    /// before being written.
    pub fn apply_data(&mut self, data: &HashMap<String, ScriptData>) {
        let resolver = Arc::clone(&self.resolver);
        for (name, script_data) in data {
            let Some(i) = self.position(name) else {
                debug!(entity = ?self.entity, script = %name, "No script instance for data, skipping");
                continue;
            };

            if let Some(attributes) = &script_data.attributes {
                let script = &mut self.scripts[i];
                for (attribute, value) in attributes {
                    if is_reserved_attribute(attribute) {
                        continue;
                    }
                    if !script.script_type().has_attribute(attribute) {
                        script
                            .script_type()
                            .add_attribute(attribute, AttributeDeclaration::untyped());
                    }
                    script.set_attribute(attribute, value.clone(), &*resolver);
                }
            }

            if let Some(enabled) = script_data.enabled {
                self.set_script_enabled(name, enabled);
            }
        }
    }

    // ---- callback invocation ----

    fn run_initialize(&mut self, i: usize) {
        self.scripts[i].state_mut().mark_initialized();
        if self.scripts[i].has_callback(ScriptMethod::Initialize) {
            self.invoke(i, ScriptMethod::Initialize, 0.0);
        }
    }

    fn run_post_initialize(&mut self, i: usize) {
        self.scripts[i].state_mut().mark_post_initialized();
        if self.scripts[i].has_callback(ScriptMethod::PostInitialize) {
            self.invoke(i, ScriptMethod::PostInitialize, 0.0);
        }
    }

    /// Run one callback with failure containment; returns whether it succeeded
    fn invoke(&mut self, i: usize, method: ScriptMethod, dt: f32) -> bool {
        let resolver = Arc::clone(&self.resolver);
        let catch_panics = self.config.catch_panics;
        let script = &mut self.scripts[i];
        match contain(catch_panics, || script.call(method, dt, &*resolver)) {
            Ok(()) => true,
            Err(error) => {
                self.handle_error(i, method, error);
                false
            }
        }
    }

    fn handle_error(&mut self, i: usize, method: ScriptMethod, error: ScriptError) {
        let script = &mut self.scripts[i];
        script.set_enabled(false);

        if !script.state().has_event("error") && self.config.report_unhandled_errors {
            warn!(
                entity = ?self.entity,
                script = %script.name(),
                method = %method,
                "Unhandled error while calling script method"
            );
            error!(script = %script.name(), error = %error, "Script error");
        }

        script.state_mut().fire_error(&error, method);

        let event = ComponentEvent::Error {
            instance: &self.scripts[i],
            error: &error,
            method,
        };
        self.events.fire("error", |listener| listener(&event));
    }
}

/// Run `f`, converting a panic into an error when `catch_panics` is set
fn contain<F>(catch_panics: bool, f: F) -> Result<(), ScriptError>
where
    F: FnOnce() -> Result<(), ScriptError>,
{
    if !catch_panics {
        return f();
    }
    panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(ScriptError::from_panic(payload)))
}

impl fmt::Debug for ScriptComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptComponent")
            .field("entity", &self.entity)
            .field("enabled", &self.enabled)
            .field("entity_enabled", &self.entity_enabled)
            .field("scripts", &self.script_names())
            .field("index", &self.index)
            .field("events", &self.events)
            .finish()
    }
}
