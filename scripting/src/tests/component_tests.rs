//! Ordering, placeholders and bulk data on the script component

use super::{clear, entries, listen, new_log, spawn_entity, Recorder};
use crate::attributes::{
    AssetRef, AttributeDeclaration, AttributeType, AttributeValue, ReferenceTable,
};
use crate::component::{CreateOptions, ScriptComponent, ScriptData};
use crate::registry::ScriptRegistry;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

fn component_with(names: &[&str]) -> (ScriptRegistry, ScriptComponent, super::Log) {
    let log = new_log();
    let mut registry = ScriptRegistry::new();
    for name in names {
        registry.register(Recorder::new(name, &log).script_type(name));
    }
    let mut world = hecs::World::new();
    let mut component = ScriptComponent::new(spawn_entity(&mut world));
    for name in names {
        component.create(&mut registry, *name, CreateOptions::default());
    }
    clear(&log);
    (registry, component, log)
}

#[test]
fn test_move_reorders_execution() {
    let (_registry, mut component, log) = component_with(&["a", "b", "c"]);
    listen(&mut component, &["move", "move:c"], &log);

    assert!(component.move_script("c", 0));
    assert_eq!(component.script_names(), vec!["c", "a", "b"]);
    assert_eq!(entries(&log), vec!["move(c,2->0)", "move:c(c,2->0)"]);

    clear(&log);
    component.update(0.016);
    assert_eq!(entries(&log), vec!["c:update", "a:update", "b:update"]);
}

#[test]
fn test_move_rejects_invalid_requests() {
    let (_registry, mut component, log) = component_with(&["a", "b"]);
    listen(&mut component, &["move"], &log);

    assert!(!component.move_script("a", 2));
    assert!(!component.move_script("missing", 0));
    assert!(!component.move_script("a", 0));
    assert_eq!(component.script_names(), vec!["a", "b"]);
    assert!(entries(&log).is_empty());
}

#[test]
fn test_insert_index_controls_position() {
    let (mut registry, mut component, log) = component_with(&["a", "b"]);
    registry.register(Recorder::new("first", &log).script_type("first"));
    registry.register(Recorder::new("last", &log).script_type("last"));

    component.create(&mut registry, "first", CreateOptions::default().insert_at(0));
    component.create(&mut registry, "last", CreateOptions::default().insert_at(99));
    assert_eq!(component.script_names(), vec!["first", "a", "b", "last"]);
}

#[test]
fn test_duplicate_create_is_rejected() {
    let (mut registry, mut component, log) = component_with(&["a"]);
    listen(&mut component, &["create"], &log);

    assert!(component
        .create(&mut registry, "a", CreateOptions::default())
        .is_none());
    assert_eq!(component.len(), 1);
    assert!(entries(&log).is_empty());
}

#[test]
fn test_create_accepts_script_type() {
    let log = new_log();
    let mut registry = ScriptRegistry::new();
    let script_type = registry.register(Recorder::new("typed", &log).script_type("typed"));

    let mut world = hecs::World::new();
    let mut component = ScriptComponent::new(spawn_entity(&mut world));
    let instance = component
        .create(&mut registry, &script_type, CreateOptions::default())
        .unwrap();
    assert!(Arc::ptr_eq(instance.script_type(), &script_type));
    assert!(component.has("typed"));
}

#[test]
fn test_unresolved_name_leaves_placeholder() {
    let log = new_log();
    let mut registry = ScriptRegistry::new();
    registry.register(Recorder::new("a", &log).script_type("a"));
    registry.register(Recorder::new("b", &log).script_type("b"));

    let mut world = hecs::World::new();
    let mut component = ScriptComponent::new(spawn_entity(&mut world));
    component.create(&mut registry, "a", CreateOptions::default());
    assert!(component
        .create(&mut registry, "late", CreateOptions::default().insert_at(1))
        .is_none());
    component.create(&mut registry, "b", CreateOptions::default());

    assert!(!component.has("late"));
    assert!(component.is_awaiting("late"));
    assert!(component.get("late").is_none());

    // Once the type exists, a plain create lands where it was first requested
    registry.register(Recorder::new("late", &log).script_type("late"));
    let instance = component
        .create(&mut registry, "late", CreateOptions::default())
        .unwrap();
    assert!(instance.is_initialized());
    assert!(component.has("late"));
    assert!(!component.is_awaiting("late"));
    assert_eq!(component.script_names(), vec!["a", "late", "b"]);
}

#[test]
fn test_destroying_placeholder_reports_no_instance() {
    let (mut registry, mut component, log) = component_with(&["a"]);
    component.create(&mut registry, "ghost", CreateOptions::default());
    listen(&mut component, &["destroy:ghost"], &log);

    assert!(component.destroy(&mut registry, "ghost"));
    assert_eq!(entries(&log), vec!["destroy:ghost(ghost,false)"]);
    assert!(!component.is_awaiting("ghost"));
}

#[test]
fn test_failed_resolution_keeps_live_instance() {
    let log = new_log();
    let mut registry = ScriptRegistry::new();
    registry.register(Recorder::new("a", &log).script_type("a"));

    let mut world = hecs::World::new();
    let mut component = ScriptComponent::new(spawn_entity(&mut world));
    component.create(&mut registry, "a", CreateOptions::default());

    registry.remove("a");
    assert!(component
        .create(&mut registry, "a", CreateOptions::default())
        .is_none());
    assert!(component.has("a"));
    assert!(!component.is_awaiting("a"));
}

#[test]
fn test_apply_data_sets_attributes_and_enabled() {
    let log = new_log();
    let mut registry = ScriptRegistry::new();
    registry.register(Recorder::new("mover", &log).script_type("mover").with_attribute(
        "speed",
        AttributeDeclaration::new(AttributeType::Number).with_default(json!(1)),
    ));

    let mut world = hecs::World::new();
    let mut component = ScriptComponent::new(spawn_entity(&mut world));
    component.create(&mut registry, "mover", CreateOptions::default().enabled(false));
    clear(&log);

    let data: HashMap<String, ScriptData> = serde_json::from_value(json!({
        "mover": {
            "enabled": true,
            "attributes": { "speed": "12", "label": "fast", "entity": 3 }
        },
        "absent": { "enabled": false }
    }))
    .unwrap();
    component.apply_data(&data);

    let instance = component.get("mover").unwrap();
    assert_eq!(instance.attribute("speed"), Some(&AttributeValue::Number(12.0)));
    assert_eq!(
        instance.attribute("label"),
        Some(&AttributeValue::String("fast".to_string()))
    );
    assert!(instance.script_type().has_attribute("label"));
    assert!(!instance.script_type().has_attribute("entity"));
    assert!(instance.enabled());
    assert_eq!(entries(&log), vec!["mover:initialize", "mover:postInitialize"]);
}

#[test]
fn test_script_data_fields_are_optional() {
    let data: ScriptData = serde_json::from_value(json!({})).unwrap();
    assert_eq!(data, ScriptData::default());
}

#[test]
fn test_component_resolver_is_used_for_references() {
    let log = new_log();
    let mut registry = ScriptRegistry::new();
    registry.register(
        Recorder::new("sprite", &log)
            .script_type("sprite")
            .with_attribute(
                "texture",
                AttributeDeclaration::new(AttributeType::Asset).with_default(json!(7)),
            ),
    );
    let table = ReferenceTable::new().with_asset(AssetRef::new(7, "grass.png"));

    let mut world = hecs::World::new();
    let mut component =
        ScriptComponent::new(spawn_entity(&mut world)).with_resolver(Arc::new(table));
    let instance = component
        .create(&mut registry, "sprite", CreateOptions::default())
        .unwrap();
    assert_eq!(
        instance.attribute("texture"),
        Some(&AttributeValue::Asset(AssetRef::new(7, "grass.png")))
    );
}

#[test]
fn test_component_lives_in_world() {
    fn assert_component<T: hecs::Component>() {}
    assert_component::<ScriptComponent>();
}
