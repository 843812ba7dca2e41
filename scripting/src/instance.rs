//! Script instances and the context handed to their callbacks

use crate::attributes::{
    coerce_declared, AttributeDeclaration, AttributeValue, RawAttributes, RawValue,
    ReferenceResolver,
};
use crate::error::ScriptError;
use crate::events::{scoped, EventEmitter, ListenerId};
use crate::script_type::{ScriptBehaviour, ScriptCallbacks, ScriptMethod, ScriptType};
use hecs::Entity;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{trace, warn};

/// Notification published on an instance's own channels
#[derive(Debug, Clone, Copy)]
pub enum InstanceEvent<'a> {
    /// `enabled`
    Enabled,
    /// `disabled`
    Disabled,
    /// `state`, carrying the new effective state
    State(bool),
    /// `destroy`
    Destroy,
    /// `attr` and `attr:<name>`, fired on every write
    Attribute {
        name: &'a str,
        value: Option<&'a AttributeValue>,
        old: Option<&'a AttributeValue>,
    },
    /// `error`
    Error {
        error: &'a ScriptError,
        method: ScriptMethod,
    },
}

pub type InstanceListener = dyn FnMut(&InstanceEvent<'_>) + Send + Sync;

/// Everything an instance owns apart from its behaviour object
pub struct InstanceState {
    script_type: Arc<ScriptType>,
    entity: Entity,
    attributes: HashMap<String, Option<AttributeValue>>,
    /// Raw input not yet run through coercion
    pending_attributes: Option<RawAttributes>,
    enabled: bool,
    /// Effective state of the owning component and entity
    host_enabled: bool,
    effective_old: bool,
    initialized: bool,
    post_initialized: bool,
    events: EventEmitter<InstanceListener>,
}

impl InstanceState {
    pub(crate) fn new(
        script_type: Arc<ScriptType>,
        entity: Entity,
        enabled: bool,
        host_enabled: bool,
        attributes: RawAttributes,
    ) -> Self {
        Self {
            script_type,
            entity,
            attributes: HashMap::new(),
            pending_attributes: Some(attributes),
            enabled,
            host_enabled,
            effective_old: enabled && host_enabled,
            initialized: false,
            post_initialized: false,
            events: EventEmitter::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.script_type.name()
    }

    pub fn script_type(&self) -> &Arc<ScriptType> {
        &self.script_type
    }

    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// Effective enabled state: local intent and the host's state
    pub fn enabled(&self) -> bool {
        self.enabled && self.host_enabled
    }

    /// The instance's own enabled intent
    pub fn local_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.sync_state();
    }

    pub(crate) fn set_host_enabled(&mut self, host_enabled: bool) {
        self.host_enabled = host_enabled;
        self.sync_state();
    }

    /// Publish `enabled`/`disabled` and `state` on an effective transition
    fn sync_state(&mut self) {
        let enabled = self.enabled();
        if enabled == self.effective_old {
            return;
        }
        self.effective_old = enabled;

        let edge = if enabled {
            InstanceEvent::Enabled
        } else {
            InstanceEvent::Disabled
        };
        let channel = if enabled { "enabled" } else { "disabled" };
        self.events.fire(channel, |listener| listener(&edge));
        self.events
            .fire("state", |listener| listener(&InstanceEvent::State(enabled)));
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_post_initialized(&self) -> bool {
        self.post_initialized
    }

    pub(crate) fn mark_initialized(&mut self) {
        self.initialized = true;
    }

    pub(crate) fn mark_post_initialized(&mut self) {
        self.post_initialized = true;
    }

    /// Tell the instance's own listeners it has been torn down
    pub(crate) fn fire_destroy(&mut self) {
        self.events
            .fire("destroy", |listener| listener(&InstanceEvent::Destroy));
    }

    /// Whether raw attribute input is still waiting for initialization
    pub fn attributes_pending(&self) -> bool {
        self.pending_attributes.is_some()
    }

    /// Current value of a declared attribute
    ///
    /// Values of attributes removed from the script type are no longer
    /// readable.
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        if !self.script_type.has_attribute(name) {
            return None;
        }
        self.attributes.get(name).and_then(Option::as_ref)
    }

    /// Current values of every initialized, still declared attribute
    pub fn attributes(&self) -> impl Iterator<Item = (&str, Option<&AttributeValue>)> {
        self.attributes
            .iter()
            .filter(|(name, _)| self.script_type.has_attribute(name))
            .map(|(name, value)| (name.as_str(), value.as_ref()))
    }

    /// Write an attribute through coercion
    ///
    /// Always publishes `attr` and `attr:<name>`, even when the value did not
    /// change. Writes to undeclared names are ignored with a warning.
    pub fn set_attribute(
        &mut self,
        name: &str,
        raw: impl Into<RawValue>,
        resolver: &dyn ReferenceResolver,
    ) -> bool {
        let Some(declaration) = self.script_type.attribute(name) else {
            warn!(
                script = %self.name(),
                attribute = name,
                "Attribute is not declared on script type"
            );
            return false;
        };
        self.write_attribute(name, &declaration, raw.into(), resolver);
        true
    }

    fn write_attribute(
        &mut self,
        name: &str,
        declaration: &AttributeDeclaration,
        raw: RawValue,
        resolver: &dyn ReferenceResolver,
    ) {
        let previous = self.attributes.remove(name).flatten();
        let old = previous.clone();
        let coerced = coerce_declared(declaration, raw, previous, resolver);
        trace!(script = %self.script_type.name(), attribute = name, value = ?coerced, "Attribute written");
        self.attributes.insert(name.to_string(), coerced);

        let event = InstanceEvent::Attribute {
            name,
            value: self.attributes.get(name).and_then(Option::as_ref),
            old: old.as_ref(),
        };
        self.events.fire("attr", |listener| listener(&event));
        self.events
            .fire(&scoped("attr", name), |listener| listener(&event));
    }

    /// Coerce pending raw input, filling declared defaults for the rest
    ///
    /// Runs once; later calls are no-ops. Attributes already holding a value
    /// keep it unless the raw input names them.
    pub fn initialize_attributes(&mut self, resolver: &dyn ReferenceResolver) {
        let Some(mut raw) = self.pending_attributes.take() else {
            return;
        };

        let declarations: Vec<(String, AttributeDeclaration)> = self
            .script_type
            .schema()
            .iter()
            .map(|(name, declaration)| (name.to_string(), declaration.clone()))
            .collect();

        for (name, declaration) in &declarations {
            if let Some(value) = raw.remove(name) {
                self.write_attribute(name, declaration, value, resolver);
            } else if !self.attributes.contains_key(name) {
                let default = declaration.default.clone().unwrap_or(RawValue::NULL);
                self.write_attribute(name, declaration, default, resolver);
            }
        }

        for name in raw.keys() {
            trace!(script = %self.name(), attribute = %name, "Ignoring undeclared raw attribute");
        }
    }

    /// Attribute state handed to a replacement instance on swap
    pub(crate) fn carry_over_attributes(&self) -> RawAttributes {
        let mut raw = self.pending_attributes.clone().unwrap_or_default();
        for (name, value) in &self.attributes {
            raw.insert(name.clone(), RawValue::from(value.clone()));
        }
        raw
    }

    /// Subscribe to one of this instance's channels
    pub fn on(
        &mut self,
        channel: impl Into<String>,
        listener: impl FnMut(&InstanceEvent<'_>) + Send + Sync + 'static,
    ) -> ListenerId {
        self.events.on(channel, Box::new(listener))
    }

    pub fn off(&mut self, channel: &str, id: ListenerId) -> bool {
        self.events.off(channel, id)
    }

    pub fn has_event(&self, channel: &str) -> bool {
        self.events.has_listeners(channel)
    }

    pub(crate) fn fire_error(&mut self, error: &ScriptError, method: ScriptMethod) {
        self.events.fire("error", |listener| {
            listener(&InstanceEvent::Error { error, method })
        });
    }
}

impl fmt::Debug for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceState")
            .field("script", &self.name())
            .field("entity", &self.entity)
            .field("enabled", &self.enabled)
            .field("host_enabled", &self.host_enabled)
            .field("initialized", &self.initialized)
            .field("post_initialized", &self.post_initialized)
            .field("attributes", &self.attributes)
            .finish()
    }
}

/// One running script on one entity
pub struct ScriptInstance {
    state: InstanceState,
    behaviour: Box<dyn ScriptBehaviour>,
    callbacks: ScriptCallbacks,
}

impl ScriptInstance {
    pub(crate) fn new(
        script_type: Arc<ScriptType>,
        entity: Entity,
        enabled: bool,
        host_enabled: bool,
        attributes: RawAttributes,
    ) -> Self {
        let behaviour = script_type.instantiate();
        Self::with_behaviour(
            behaviour,
            InstanceState::new(script_type, entity, enabled, host_enabled, attributes),
        )
    }

    pub(crate) fn with_behaviour(behaviour: Box<dyn ScriptBehaviour>, state: InstanceState) -> Self {
        let callbacks = behaviour.callbacks();
        Self {
            state,
            behaviour,
            callbacks,
        }
    }

    pub fn name(&self) -> &str {
        self.state.name()
    }

    pub fn entity(&self) -> Entity {
        self.state.entity()
    }

    pub fn script_type(&self) -> &Arc<ScriptType> {
        self.state.script_type()
    }

    pub fn state(&self) -> &InstanceState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut InstanceState {
        &mut self.state
    }

    pub fn enabled(&self) -> bool {
        self.state.enabled()
    }

    pub fn local_enabled(&self) -> bool {
        self.state.local_enabled()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.state.set_enabled(enabled);
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_initialized()
    }

    pub fn is_post_initialized(&self) -> bool {
        self.state.is_post_initialized()
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.state.attribute(name)
    }

    pub fn set_attribute(
        &mut self,
        name: &str,
        raw: impl Into<RawValue>,
        resolver: &dyn ReferenceResolver,
    ) -> bool {
        self.state.set_attribute(name, raw, resolver)
    }

    pub fn on(
        &mut self,
        channel: impl Into<String>,
        listener: impl FnMut(&InstanceEvent<'_>) + Send + Sync + 'static,
    ) -> ListenerId {
        self.state.on(channel, listener)
    }

    pub fn off(&mut self, channel: &str, id: ListenerId) -> bool {
        self.state.off(channel, id)
    }

    /// Callbacks detected when the instance was created
    pub fn callbacks(&self) -> ScriptCallbacks {
        self.callbacks
    }

    pub fn has_callback(&self, method: ScriptMethod) -> bool {
        self.callbacks.contains(method.flag())
    }

    /// Downcast the behaviour to its concrete type
    pub fn behaviour<T: Any>(&self) -> Option<&T> {
        (*self.behaviour).as_any().downcast_ref::<T>()
    }

    /// Run a per-frame or startup callback
    pub(crate) fn call(
        &mut self,
        method: ScriptMethod,
        dt: f32,
        resolver: &dyn ReferenceResolver,
    ) -> Result<(), ScriptError> {
        let mut ctx = ScriptContext::new(&mut self.state, resolver);
        match method {
            ScriptMethod::Initialize => self.behaviour.initialize(&mut ctx),
            ScriptMethod::PostInitialize => self.behaviour.post_initialize(&mut ctx),
            ScriptMethod::Update => self.behaviour.update(&mut ctx, dt),
            ScriptMethod::PostUpdate => self.behaviour.post_update(&mut ctx, dt),
            // Needs the replaced instance, see `call_swap`
            ScriptMethod::Swap => Ok(()),
        }
    }

    pub(crate) fn call_swap(
        &mut self,
        old: &mut ScriptInstance,
        resolver: &dyn ReferenceResolver,
    ) -> Result<(), ScriptError> {
        let mut ctx = ScriptContext::new(&mut self.state, resolver);
        self.behaviour.swap(&mut ctx, old)
    }
}

impl fmt::Debug for ScriptInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptInstance")
            .field("state", &self.state)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

/// What a callback sees of its own instance
pub struct ScriptContext<'a> {
    state: &'a mut InstanceState,
    resolver: &'a dyn ReferenceResolver,
}

impl<'a> ScriptContext<'a> {
    pub fn new(state: &'a mut InstanceState, resolver: &'a dyn ReferenceResolver) -> Self {
        Self { state, resolver }
    }

    pub fn entity(&self) -> Entity {
        self.state.entity()
    }

    pub fn script_name(&self) -> &str {
        self.state.name()
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.state.attribute(name)
    }

    pub fn set_attribute(&mut self, name: &str, raw: impl Into<RawValue>) -> bool {
        self.state.set_attribute(name, raw, self.resolver)
    }

    pub fn enabled(&self) -> bool {
        self.state.enabled()
    }

    /// Change the instance's own enabled intent
    pub fn set_enabled(&mut self, enabled: bool) {
        self.state.set_enabled(enabled);
    }

    pub fn on(
        &mut self,
        channel: impl Into<String>,
        listener: impl FnMut(&InstanceEvent<'_>) + Send + Sync + 'static,
    ) -> ListenerId {
        self.state.on(channel, listener)
    }

    pub fn off(&mut self, channel: &str, id: ListenerId) -> bool {
        self.state.off(channel, id)
    }

    pub fn state(&self) -> &InstanceState {
        self.state
    }

    pub fn resolver(&self) -> &dyn ReferenceResolver {
        self.resolver
    }
}
