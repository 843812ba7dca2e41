//! Registry of script types by name, with hot-swap bookkeeping

use crate::script_type::ScriptType;
use hecs::Entity;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Owns every registered script type
///
/// Re-registering a name replaces the type and queues a swap for that name.
/// Components subscribe their entity to the names they hold, and the swap
/// system drains the queue once per frame.
#[derive(Debug, Default)]
pub struct ScriptRegistry {
    types: HashMap<String, Arc<ScriptType>>,
    swap_subscribers: HashMap<String, Vec<Entity>>,
    pending_swaps: Vec<String>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a script type, replacing any type of the same name
    pub fn register(&mut self, script_type: ScriptType) -> Arc<ScriptType> {
        let name = script_type.name().to_string();
        let script_type = Arc::new(script_type);

        if self.types.insert(name.clone(), Arc::clone(&script_type)).is_some() {
            info!(script = %name, "Script type replaced, queued swap");
            if !self.pending_swaps.contains(&name) {
                self.pending_swaps.push(name);
            }
        } else {
            debug!(script = %name, "Registered script type");
        }

        script_type
    }

    pub fn get(&self, name: &str) -> Option<Arc<ScriptType>> {
        self.types.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Unregister a type; live instances keep their own reference
    pub fn remove(&mut self, name: &str) -> Option<Arc<ScriptType>> {
        self.pending_swaps.retain(|pending| pending != name);
        self.types.remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Ask to be told when `name` is replaced
    pub fn subscribe_swap(&mut self, name: &str, entity: Entity) {
        let subscribers = self.swap_subscribers.entry(name.to_string()).or_default();
        if !subscribers.contains(&entity) {
            subscribers.push(entity);
        }
    }

    pub fn unsubscribe_swap(&mut self, name: &str, entity: Entity) {
        if let Some(subscribers) = self.swap_subscribers.get_mut(name) {
            subscribers.retain(|subscriber| *subscriber != entity);
            if subscribers.is_empty() {
                self.swap_subscribers.remove(name);
            }
        }
    }

    pub fn swap_subscribers(&self, name: &str) -> &[Entity] {
        self.swap_subscribers
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Drain queued swaps together with the entities subscribed to each name
    pub fn take_pending_swaps(&mut self) -> Vec<(String, Vec<Entity>)> {
        std::mem::take(&mut self.pending_swaps)
            .into_iter()
            .map(|name| {
                let subscribers = self.swap_subscribers(&name).to_vec();
                (name, subscribers)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script_type::{ScriptBehaviour, ScriptCallbacks};

    struct Noop;

    impl ScriptBehaviour for Noop {
        fn callbacks(&self) -> ScriptCallbacks {
            ScriptCallbacks::empty()
        }
    }

    fn script(name: &str) -> ScriptType {
        ScriptType::new(name, || Box::new(Noop) as Box<dyn ScriptBehaviour>).unwrap()
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ScriptRegistry::new();
        registry.register(script("mover"));
        registry.register(script("spinner"));

        assert!(registry.has("mover"));
        assert_eq!(registry.get("spinner").map(|s| s.name().to_string()), Some("spinner".into()));
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.names(), vec!["mover", "spinner"]);
        assert!(registry.take_pending_swaps().is_empty());
    }

    #[test]
    fn test_replacement_queues_swap_for_subscribers() {
        let mut world = hecs::World::new();
        let a = world.spawn(());
        let b = world.spawn(());

        let mut registry = ScriptRegistry::new();
        registry.register(script("mover"));
        registry.subscribe_swap("mover", a);
        registry.subscribe_swap("mover", a);
        registry.subscribe_swap("mover", b);
        registry.unsubscribe_swap("mover", b);

        registry.register(script("mover"));
        registry.register(script("mover"));

        let swaps = registry.take_pending_swaps();
        assert_eq!(swaps, vec![("mover".to_string(), vec![a])]);
        assert!(registry.take_pending_swaps().is_empty());
    }

    #[test]
    fn test_remove_drops_pending_swap() {
        let mut registry = ScriptRegistry::new();
        registry.register(script("mover"));
        registry.register(script("mover"));
        assert!(registry.remove("mover").is_some());
        assert!(registry.take_pending_swaps().is_empty());
        assert!(registry.is_empty());
    }
}
