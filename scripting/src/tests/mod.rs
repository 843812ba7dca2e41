//! Cross-module test suites and the helpers they share

mod component_tests;
mod rhai_tests;

use crate::component::{ComponentEvent, ScriptComponent};
use crate::error::ScriptError;
use crate::instance::{ScriptContext, ScriptInstance};
use crate::script_type::{ScriptBehaviour, ScriptCallbacks, ScriptMethod, ScriptType};
use std::sync::{Arc, Mutex};

/// Shared, ordered record of what happened
pub(crate) type Log = Arc<Mutex<Vec<String>>>;

pub(crate) fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub(crate) fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub(crate) fn clear(log: &Log) {
    log.lock().unwrap().clear();
}

pub(crate) fn spawn_entity(world: &mut hecs::World) -> hecs::Entity {
    world.spawn(())
}

/// Behaviour that records every callback as `<tag>:<method>`
#[derive(Clone)]
pub(crate) struct Recorder {
    pub tag: String,
    pub log: Log,
    pub callbacks: ScriptCallbacks,
    pub fail_on: Option<ScriptMethod>,
    pub panic_on: Option<ScriptMethod>,
    pub swapped_from: Option<String>,
}

impl Recorder {
    pub fn new(tag: &str, log: &Log) -> Self {
        Self {
            tag: tag.to_string(),
            log: Arc::clone(log),
            callbacks: ScriptCallbacks::all(),
            fail_on: None,
            panic_on: None,
            swapped_from: None,
        }
    }

    pub fn callbacks(mut self, callbacks: ScriptCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn fail_on(mut self, method: ScriptMethod) -> Self {
        self.fail_on = Some(method);
        self
    }

    pub fn panic_on(mut self, method: ScriptMethod) -> Self {
        self.panic_on = Some(method);
        self
    }

    /// A script type whose instances are clones of this recorder
    pub fn script_type(self, name: &str) -> ScriptType {
        ScriptType::new(name, move || Box::new(self.clone()) as Box<dyn ScriptBehaviour>).unwrap()
    }

    fn record(&mut self, method: ScriptMethod) -> Result<(), ScriptError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.tag, method));
        if self.panic_on == Some(method) {
            panic!("{} panicked in {}", self.tag, method);
        }
        if self.fail_on == Some(method) {
            return Err(ScriptError::runtime(format!("{} failed in {}", self.tag, method)));
        }
        Ok(())
    }
}

impl ScriptBehaviour for Recorder {
    fn callbacks(&self) -> ScriptCallbacks {
        self.callbacks
    }

    fn initialize(&mut self, _ctx: &mut ScriptContext<'_>) -> Result<(), ScriptError> {
        self.record(ScriptMethod::Initialize)
    }

    fn post_initialize(&mut self, _ctx: &mut ScriptContext<'_>) -> Result<(), ScriptError> {
        self.record(ScriptMethod::PostInitialize)
    }

    fn update(&mut self, _ctx: &mut ScriptContext<'_>, _dt: f32) -> Result<(), ScriptError> {
        self.record(ScriptMethod::Update)
    }

    fn post_update(&mut self, _ctx: &mut ScriptContext<'_>, _dt: f32) -> Result<(), ScriptError> {
        self.record(ScriptMethod::PostUpdate)
    }

    fn swap(
        &mut self,
        _ctx: &mut ScriptContext<'_>,
        old: &mut ScriptInstance,
    ) -> Result<(), ScriptError> {
        self.swapped_from = old.behaviour::<Recorder>().map(|old| old.tag.clone());
        self.record(ScriptMethod::Swap)
    }
}

fn describe(channel: &str, event: &ComponentEvent<'_>) -> String {
    match event {
        ComponentEvent::Create(instance) | ComponentEvent::Swap(instance) => {
            format!("{channel}({})", instance.name())
        }
        ComponentEvent::Destroy { name, instance } => {
            format!("{channel}({name},{})", instance.is_some())
        }
        ComponentEvent::Move {
            instance,
            index,
            old_index,
        } => format!("{channel}({},{old_index}->{index})", instance.name()),
        ComponentEvent::State(enabled) => format!("{channel}({enabled})"),
        ComponentEvent::Error {
            instance, method, ..
        } => format!("{channel}({},{method})", instance.name()),
        ComponentEvent::Enabled | ComponentEvent::Disabled | ComponentEvent::Remove => {
            channel.to_string()
        }
    }
}

/// Record component notifications on `channels` into `log`
pub(crate) fn listen(component: &mut ScriptComponent, channels: &[&str], log: &Log) {
    for channel in channels {
        let sink = Arc::clone(log);
        let name = channel.to_string();
        component.on(*channel, move |event: &ComponentEvent<'_>| {
            sink.lock().unwrap().push(describe(&name, event));
        });
    }
}
