//! Game entry point running a small scripted scene headlessly

use hecs::World;
use scripting::prelude::*;
use serde_json::json;
use std::collections::HashMap;
use tracing::{error, info, warn};

const FRAME_COUNT: usize = 6;
const FRAME_TIME: f32 = 1.0 / 60.0;

fn main() {
    // Initialize logging
    scripting::init_logging();
    info!("Starting scripted game demo");

    let scripts_dir = std::env::args()
        .nth(1)
        .unwrap_or_else(|| concat!(env!("CARGO_MANIFEST_DIR"), "/assets/scripts").to_string());
    let loader = RhaiScriptLoader::new(ScriptingConfig::with_scripts_dir(scripts_dir));

    let mut registry = ScriptRegistry::new();
    for name in ["rotator", "pulse"] {
        if let Err(e) = loader.register(&mut registry, name) {
            error!("Failed to load script '{}': {}", name, e);
        }
    }

    // Create ECS world
    let mut world = World::new();
    create_demo_scene(&mut world, &mut registry);

    script_initialize_system(&mut world);

    for frame in 0..FRAME_COUNT {
        if frame == FRAME_COUNT / 2 {
            reload_scripts(&loader, &mut registry);
        }
        run_script_frame(&mut world, &mut registry, FRAME_TIME);
    }

    report_scene(&world);
    info!("Demo finished");
}

fn create_demo_scene(world: &mut World, registry: &mut ScriptRegistry) {
    info!("Creating demo scene");

    let cube = world.spawn(());
    let mut component = ScriptComponent::new(cube);
    component.on("error", |event: &ComponentEvent<'_>| {
        if let ComponentEvent::Error {
            instance,
            error,
            method,
        } = event
        {
            warn!("Script '{}' failed in {}: {}", instance.name(), method, error);
        }
    });
    component.create(
        registry,
        "rotator",
        CreateOptions::default()
            .preloading(true)
            .attribute("speed", 90.0),
    );
    component.create(registry, "pulse", CreateOptions::default().preloading(true));

    let data: HashMap<String, ScriptData> = match serde_json::from_value(json!({
        "pulse": { "attributes": { "period": 0.05 } }
    })) {
        Ok(data) => data,
        Err(e) => {
            error!("Invalid script data: {}", e);
            HashMap::new()
        }
    };
    component.apply_data(&data);

    if let Err(e) = attach_script_component(world, cube, component) {
        error!("Failed to attach script component: {}", e);
    }
    info!("Created cube entity: {:?}", cube);
}

/// Recompile every registered script; changed types are swapped next frame
fn reload_scripts(loader: &RhaiScriptLoader, registry: &mut ScriptRegistry) {
    for name in registry.names() {
        match loader.register(registry, &name) {
            Ok(_) => info!("Reloaded script '{}'", name),
            Err(e) => error!("Failed to reload script '{}': {}", name, e),
        }
    }
}

fn report_scene(world: &World) {
    for (entity, component) in world.query::<&ScriptComponent>().iter() {
        for instance in component.scripts() {
            let attributes: Vec<String> = instance
                .state()
                .attributes()
                .map(|(name, value)| match value {
                    Some(value) => format!("{name}={value}"),
                    None => format!("{name}=null"),
                })
                .collect();
            info!(
                "{:?} {} enabled={} [{}]",
                entity,
                instance.name(),
                instance.enabled(),
                attributes.join(", ")
            );
        }
    }
}
