//! Frame systems driving every script component in a world

use crate::component::ScriptComponent;
use crate::registry::ScriptRegistry;
use hecs::{Entity, World};
use tracing::{debug, trace, warn};

/// Attach a script component to an existing entity
pub fn attach_script_component(
    world: &mut World,
    entity: Entity,
    component: ScriptComponent,
) -> Result<(), hecs::NoSuchEntity> {
    debug!(entity = ?entity, "Attaching script component");
    world.insert_one(entity, component)
}

/// Detach an entity's script component and destroy its instances
pub fn remove_script_component(
    world: &mut World,
    registry: &mut ScriptRegistry,
    entity: Entity,
) -> bool {
    match world.remove_one::<ScriptComponent>(entity) {
        Ok(mut component) => {
            component.teardown(registry);
            debug!(entity = ?entity, "Removed script component");
            true
        }
        Err(_) => false,
    }
}

/// Application start: coerce attributes and initialize every component,
/// then post-initialize once all siblings have been initialized
pub fn script_initialize_system(world: &mut World) {
    for (_, component) in world.query_mut::<&mut ScriptComponent>() {
        component.initialize_attributes();
        component.initialize();
    }
    for (_, component) in world.query_mut::<&mut ScriptComponent>() {
        component.post_initialize();
    }
}

/// Swap instances of script types re-registered since the last frame
pub fn script_swap_system(world: &mut World, registry: &mut ScriptRegistry) {
    for (name, entities) in registry.take_pending_swaps() {
        for entity in entities {
            let Ok(mut component) = world.get::<&mut ScriptComponent>(entity) else {
                warn!(entity = ?entity, script = %name, "Swap subscriber has no script component");
                continue;
            };
            if component.swap(registry, name.as_str()) {
                debug!(entity = ?entity, script = %name, "Hot-swapped script");
            }
        }
    }
}

pub fn script_post_state_change_system(world: &mut World) {
    for (_, component) in world.query_mut::<&mut ScriptComponent>() {
        component.post_state_change();
    }
}

pub fn script_update_system(world: &mut World, dt: f32) {
    for (entity, component) in world.query_mut::<&mut ScriptComponent>() {
        trace!(entity = ?entity, dt = dt, "Updating scripts");
        component.update(dt);
    }
}

pub fn script_post_update_system(world: &mut World, dt: f32) {
    for (_, component) in world.query_mut::<&mut ScriptComponent>() {
        component.post_update(dt);
    }
}

/// One frame of script work in the fixed order: swap, post-state-change,
/// update, post-update
pub fn run_script_frame(world: &mut World, registry: &mut ScriptRegistry, dt: f32) {
    script_swap_system(world, registry);
    script_post_state_change_system(world);
    script_update_system(world, dt);
    script_post_update_system(world, dt);
}
