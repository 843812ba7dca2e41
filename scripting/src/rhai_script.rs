//! Script types implemented in Rhai
//!
//! A Rhai source declares its attributes in `//! @attribute` header lines and
//! implements any of `initialize()`, `post_initialize()`, `update(dt)`,
//! `post_update(dt)` and `swap(old)`. Inside those functions `this` is a map
//! holding the declared attributes, `enabled`, `entity`, and whatever private
//! state the script keeps on it.

use crate::attributes::{parse_attribute_declarations, AttributeValue};
use crate::config::ScriptingConfig;
use crate::error::ScriptError;
use crate::instance::{ScriptContext, ScriptInstance};
use crate::registry::ScriptRegistry;
use crate::script_type::{ScriptBehaviour, ScriptCallbacks, ScriptType};
use rhai::serde::{from_dynamic, to_dynamic};
use rhai::{CallFnOptions, Dynamic, Engine, EvalAltResult, FuncArgs, Map, Scope, AST};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

const ENABLED_KEY: &str = "enabled";
const ENTITY_KEY: &str = "entity";

/// Compiles Rhai sources into script types
pub struct RhaiScriptLoader {
    engine: Arc<Engine>,
    config: ScriptingConfig,
}

impl RhaiScriptLoader {
    pub fn new(config: ScriptingConfig) -> Self {
        let mut engine = Engine::new();

        // Configure engine for safety
        engine.set_max_expr_depths(config.max_expr_depth, config.max_expr_depth);
        engine.set_max_call_levels(config.max_call_levels);
        engine.set_max_operations(config.max_operations);
        engine.set_max_string_size(10_000);
        engine.set_max_array_size(10_000);
        engine.set_max_map_size(1_000);
        engine.disable_symbol("eval");

        engine.on_print(|text| info!(target: "script", "{text}"));
        engine.on_debug(|text, source, position| {
            debug!(
                target: "script",
                source = source.unwrap_or_default(),
                line = position.line().unwrap_or(0),
                "{text}"
            );
        });

        Self {
            engine: Arc::new(engine),
            config,
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn config(&self) -> &ScriptingConfig {
        &self.config
    }

    /// Load `<scripts_dir>/<name>.<ext>`
    pub fn load(&self, name: &str) -> Result<ScriptType, ScriptError> {
        let path = self.config.script_path(name)?;
        debug!(script = name, path = ?path, "Loading script");

        let source = std::fs::read_to_string(&path).map_err(|e| ScriptError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        self.load_source(name, &source)
    }

    /// Compile an in-memory source
    pub fn load_source(&self, name: &str, source: &str) -> Result<ScriptType, ScriptError> {
        let declarations = parse_attribute_declarations(source)?;

        let ast = self.engine.compile(source).map_err(|e| {
            let position = e.position();
            ScriptError::Compile {
                script: name.to_string(),
                line: position.line().unwrap_or(0),
                column: position.position().unwrap_or(0),
                message: e.to_string(),
            }
        })?;

        let callbacks = detect_callbacks(&ast);
        debug!(
            script = name,
            callbacks = ?callbacks,
            attribute_count = declarations.len(),
            "Script lifecycle functions detected"
        );

        let engine = Arc::clone(&self.engine);
        let ast = Arc::new(ast);
        let script = name.to_string();
        let script_type = ScriptType::new(name, move || {
            Box::new(RhaiBehaviour::new(
                Arc::clone(&engine),
                Arc::clone(&ast),
                script.clone(),
                callbacks,
            )) as Box<dyn ScriptBehaviour>
        })?;

        for (attribute, declaration) in declarations {
            script_type.add_attribute(&attribute, declaration);
        }
        Ok(script_type)
    }

    /// Load a script by name and register it, replacing an older version
    pub fn register(
        &self,
        registry: &mut ScriptRegistry,
        name: &str,
    ) -> Result<Arc<ScriptType>, ScriptError> {
        Ok(registry.register(self.load(name)?))
    }
}

impl Default for RhaiScriptLoader {
    fn default() -> Self {
        Self::new(ScriptingConfig::default())
    }
}

/// Which lifecycle functions an AST defines, checked by name and arity
pub fn detect_callbacks(ast: &AST) -> ScriptCallbacks {
    let mut callbacks = ScriptCallbacks::empty();
    for function in ast.iter_functions() {
        let flag = match (function.name, function.params.len()) {
            ("initialize", 0) => ScriptCallbacks::INITIALIZE,
            ("post_initialize", 0) => ScriptCallbacks::POST_INITIALIZE,
            ("update", 1) => ScriptCallbacks::UPDATE,
            ("post_update", 1) => ScriptCallbacks::POST_UPDATE,
            ("swap", 1) => ScriptCallbacks::SWAP,
            _ => continue,
        };
        callbacks |= flag;
    }
    callbacks
}

/// One instance's view of a compiled Rhai script
pub struct RhaiBehaviour {
    engine: Arc<Engine>,
    ast: Arc<AST>,
    script: String,
    callbacks: ScriptCallbacks,
    this: Dynamic,
}

impl RhaiBehaviour {
    fn new(engine: Arc<Engine>, ast: Arc<AST>, script: String, callbacks: ScriptCallbacks) -> Self {
        Self {
            engine,
            ast,
            script,
            callbacks,
            this: Dynamic::from_map(Map::new()),
        }
    }

    /// The `this` map as the script last left it
    pub fn this(&self) -> &Dynamic {
        &self.this
    }

    fn call(
        &mut self,
        ctx: &mut ScriptContext<'_>,
        function: &str,
        args: impl FuncArgs,
    ) -> Result<(), ScriptError> {
        let snapshot = self.sync_in(ctx)?;

        let options = CallFnOptions::new()
            .eval_ast(false)
            .rewind_scope(true)
            .bind_this_ptr(&mut self.this);
        let result = self
            .engine
            .call_fn_with_options::<Dynamic>(options, &mut Scope::new(), &self.ast, function, args)
            .map(|_| ())
            .map_err(|e| runtime_error(&self.script, function, &e));

        // Writes made before a failure still count
        self.sync_out(ctx, snapshot)?;
        result
    }

    /// Refresh `this` from the instance; returns the values handed in
    fn sync_in(&mut self, ctx: &ScriptContext<'_>) -> Result<Snapshot, ScriptError> {
        if !self.this.is::<Map>() {
            self.this = Dynamic::from_map(Map::new());
        }
        let Some(mut map) = self.this.write_lock::<Map>() else {
            return Err(ScriptError::Conversion("`this` is not a map".to_string()));
        };

        let mut attributes = HashMap::new();
        for (name, value) in ctx.state().attributes() {
            let json = value.map_or(Value::Null, AttributeValue::to_json);
            let dynamic = to_dynamic(&json).map_err(|e| ScriptError::Conversion(e.to_string()))?;
            map.insert(name.into(), dynamic);
            attributes.insert(name.to_string(), json);
        }

        let enabled = ctx.state().local_enabled();
        map.insert(ENABLED_KEY.into(), Dynamic::from(enabled));
        map.insert(
            ENTITY_KEY.into(),
            Dynamic::from(ctx.entity().to_bits().get() as i64),
        );

        Ok(Snapshot {
            attributes,
            enabled,
        })
    }

    /// Push attribute and `enabled` changes made by the script back through
    /// the instance, so coercion and notifications apply
    fn sync_out(
        &mut self,
        ctx: &mut ScriptContext<'_>,
        snapshot: Snapshot,
    ) -> Result<(), ScriptError> {
        let mut changed = Vec::new();
        let enabled = {
            let Some(map) = self.this.read_lock::<Map>() else {
                return Ok(());
            };
            for (name, before) in snapshot.attributes {
                let Some(dynamic) = map.get(name.as_str()) else {
                    continue;
                };
                let after: Value =
                    from_dynamic(dynamic).map_err(|e| ScriptError::Conversion(e.to_string()))?;
                if after != before {
                    changed.push((name, after));
                }
            }
            map.get(ENABLED_KEY).and_then(|value| value.as_bool().ok())
        };

        for (name, value) in changed {
            ctx.set_attribute(&name, value);
        }
        if let Some(enabled) = enabled.filter(|enabled| *enabled != snapshot.enabled) {
            ctx.set_enabled(enabled);
        }
        Ok(())
    }
}

struct Snapshot {
    attributes: HashMap<String, Value>,
    enabled: bool,
}

fn runtime_error(script: &str, function: &str, error: &EvalAltResult) -> ScriptError {
    let position = error.position();
    ScriptError::Runtime(format!(
        "{}:{}:{} - {} in '{}'",
        script,
        position.line().unwrap_or(0),
        position.position().unwrap_or(0),
        error,
        function
    ))
}

impl ScriptBehaviour for RhaiBehaviour {
    fn callbacks(&self) -> ScriptCallbacks {
        self.callbacks
    }

    fn initialize(&mut self, ctx: &mut ScriptContext<'_>) -> Result<(), ScriptError> {
        self.call(ctx, "initialize", ())
    }

    fn post_initialize(&mut self, ctx: &mut ScriptContext<'_>) -> Result<(), ScriptError> {
        self.call(ctx, "post_initialize", ())
    }

    fn update(&mut self, ctx: &mut ScriptContext<'_>, dt: f32) -> Result<(), ScriptError> {
        self.call(ctx, "update", (f64::from(dt),))
    }

    fn post_update(&mut self, ctx: &mut ScriptContext<'_>, dt: f32) -> Result<(), ScriptError> {
        self.call(ctx, "post_update", (f64::from(dt),))
    }

    fn swap(
        &mut self,
        ctx: &mut ScriptContext<'_>,
        old: &mut ScriptInstance,
    ) -> Result<(), ScriptError> {
        let old_state = old
            .behaviour::<RhaiBehaviour>()
            .map(|behaviour| behaviour.this.clone())
            .unwrap_or_else(|| Dynamic::from_map(Map::new()));
        self.call(ctx, "swap", (old_state,))
    }
}
