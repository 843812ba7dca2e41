//! Rhai-backed script types running through the component lifecycle

use super::spawn_entity;
use crate::attributes::{AttributeValue, Color};
use crate::component::{ComponentEvent, CreateOptions, ScriptComponent};
use crate::config::ScriptingConfig;
use crate::error::ScriptError;
use crate::instance::InstanceEvent;
use crate::registry::ScriptRegistry;
use crate::rhai_script::{RhaiBehaviour, RhaiScriptLoader};
use crate::script_type::ScriptCallbacks;
use rhai::Map;
use std::sync::{Arc, Mutex};

const MOVER: &str = r##"
//! @attribute speed: number = 2
//! @attribute tint: rgb = "#00ff00"

fn initialize() {
    this.ticks = 0;
}

fn update(dt) {
    this.ticks += 1;
    this.speed = this.speed * 2.0;
    if this.ticks >= 3 {
        this.enabled = false;
    }
}
"##;

fn private_int(component: &ScriptComponent, script: &str, key: &str) -> Option<i64> {
    let this = component
        .get(script)?
        .behaviour::<RhaiBehaviour>()?
        .this()
        .clone()
        .try_cast::<Map>()?;
    this.get(key)?.as_int().ok()
}

fn create(loader: &RhaiScriptLoader, name: &str, source: &str) -> (ScriptRegistry, ScriptComponent) {
    let mut registry = ScriptRegistry::new();
    registry.register(loader.load_source(name, source).unwrap());
    let mut world = hecs::World::new();
    let mut component = ScriptComponent::new(spawn_entity(&mut world));
    component.create(&mut registry, name, CreateOptions::default());
    (registry, component)
}

#[test]
fn test_rhai_script_declares_attributes_and_callbacks() {
    let loader = RhaiScriptLoader::default();
    let script_type = loader.load_source("mover", MOVER).unwrap();
    assert_eq!(script_type.schema().names(), vec!["speed", "tint"]);
    assert_eq!(
        script_type.instantiate().callbacks(),
        ScriptCallbacks::INITIALIZE | ScriptCallbacks::UPDATE
    );
}

#[test]
fn test_rhai_script_updates_attributes_through_this() {
    let loader = RhaiScriptLoader::default();
    let (_registry, mut component) = create(&loader, "mover", MOVER);

    let writes = Arc::new(Mutex::new(Vec::new()));
    let sink = writes.clone();
    component
        .get_mut("mover")
        .unwrap()
        .on("attr:speed", move |event: &InstanceEvent<'_>| {
            if let InstanceEvent::Attribute { value, old, .. } = event {
                sink.lock()
                    .unwrap()
                    .push((value.and_then(AttributeValue::as_number), old.and_then(AttributeValue::as_number)));
            }
        });

    assert_eq!(private_int(&component, "mover", "ticks"), Some(0));

    component.update(0.016);
    let instance = component.get("mover").unwrap();
    assert_eq!(instance.attribute("speed"), Some(&AttributeValue::Number(4.0)));
    assert_eq!(
        instance.attribute("tint"),
        Some(&AttributeValue::Color(Color::new(0.0, 1.0, 0.0, 1.0)))
    );
    assert_eq!(*writes.lock().unwrap(), vec![(Some(4.0), Some(2.0))]);
    assert_eq!(private_int(&component, "mover", "ticks"), Some(1));
}

#[test]
fn test_rhai_script_can_disable_itself() {
    let loader = RhaiScriptLoader::default();
    let (_registry, mut component) = create(&loader, "mover", MOVER);

    for _ in 0..5 {
        component.update(0.016);
    }
    let instance = component.get("mover").unwrap();
    assert!(!instance.local_enabled());
    assert_eq!(instance.attribute("speed"), Some(&AttributeValue::Number(16.0)));
    assert_eq!(private_int(&component, "mover", "ticks"), Some(3));
}

#[test]
fn test_rhai_throw_is_contained() {
    let loader = RhaiScriptLoader::default();
    let source = r#"
fn update(dt) {
    throw "out of fuel";
}
"#;
    let (_registry, mut component) = create(&loader, "engine", source);

    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    component.on("error", move |event: &ComponentEvent<'_>| {
        if let ComponentEvent::Error { error, .. } = event {
            sink.lock().unwrap().push((*error).clone());
        }
    });

    component.update(0.016);
    let errors = errors.lock().unwrap();
    assert!(matches!(
        errors.as_slice(),
        [ScriptError::Runtime(message)] if message.contains("out of fuel") && message.contains("'update'")
    ));
    assert!(!component.get("engine").unwrap().enabled());
}

#[test]
fn test_rhai_swap_keeps_private_state() {
    let loader = RhaiScriptLoader::default();
    let v1 = r#"
//! @attribute speed: number = 2
fn initialize() { this.ticks = 10; }
fn update(dt) { this.ticks += 1; }
"#;
    let v2 = r#"
//! @attribute speed: number = 2
fn update(dt) { this.ticks += 100; }
fn swap(old) { this.ticks = old.ticks; }
"#;
    let (mut registry, mut component) = create(&loader, "counter", v1);
    component.update(0.016);
    component.get_mut("counter").unwrap().set_attribute(
        "speed",
        9,
        &crate::attributes::NullResolver,
    );

    registry.register(loader.load_source("counter", v2).unwrap());
    assert!(component.swap(&registry, "counter"));
    assert_eq!(private_int(&component, "counter", "ticks"), Some(11));

    component.update(0.016);
    assert_eq!(private_int(&component, "counter", "ticks"), Some(111));
    assert_eq!(
        component.get("counter").unwrap().attribute("speed"),
        Some(&AttributeValue::Number(9.0))
    );
}

#[test]
fn test_loader_reads_scripts_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("spinner.rhai"), MOVER).unwrap();

    let loader = RhaiScriptLoader::new(ScriptingConfig::with_scripts_dir(dir.path()));
    let mut registry = ScriptRegistry::new();
    let script_type = loader.register(&mut registry, "spinner").unwrap();
    assert_eq!(script_type.name(), "spinner");
    assert!(registry.has("spinner"));

    assert!(matches!(
        loader.load("missing"),
        Err(ScriptError::Io { ref path, .. }) if path.ends_with("missing.rhai")
    ));
}

#[test]
fn test_bad_declaration_fails_load() {
    let loader = RhaiScriptLoader::default();
    let result = loader.load_source("bad", "//! @attribute speed: velocity\nfn update(dt) {}");
    assert!(matches!(result, Err(ScriptError::Declaration { line: 1, .. })));
}
