//! The public compiled-engine type, its builder, and the process-wide
//! runtime state (function registry + compile caches) that every compiled
//! [Engine] shares.

use crate::{
    ast::Node,
    builtins,
    cache::{FileCache, TextCache},
    context::Context,
    exec,
    registry::{FunctionRegistry, HostFn},
    template,
    value::Value,
};
use std::{path::Path, sync::Arc};

/// Shared state across every [Engine] compiled from the same builder: the
/// function registry (read on every call, written only during setup) and
/// the two compile caches. Cloning an [Engine] is cheap; cloning a
/// [Runtime] handle even cheaper, since it's just an `Arc`.
pub struct Runtime {
    registry: FunctionRegistry,
    text_cache: TextCache,
    file_cache: FileCache,
}

impl Runtime {
    /// Compile source text into an [Engine], consulting the text cache.
    pub fn compile(self: &Arc<Self>, source: &str) -> Engine {
        let nodes = self
            .text_cache
            .get_or_compile(source, |src| template::parse(src));
        Engine {
            nodes,
            runtime: Arc::clone(self),
        }
    }

    /// Compile a template from a file, consulting the mtime-keyed file
    /// cache. A missing or unreadable file compiles to an empty engine.
    pub fn compile_file(self: &Arc<Self>, path: impl AsRef<Path>) -> Engine {
        let nodes = self
            .file_cache
            .get_or_compile(path.as_ref(), |src| template::parse(src));
        Engine {
            nodes,
            runtime: Arc::clone(self),
        }
    }

    /// Reset both compile caches
    pub fn clear_cache(&self) {
        self.text_cache.clear();
        self.file_cache.clear();
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.registry.contains(name)
    }
}

/// Builder for a [Runtime]: register host functions before compiling any
/// template against it. The built-in function library is pre-registered;
/// [EngineBuilder::register] calls with the same name overwrite a built-in.
pub struct EngineBuilder {
    registry: FunctionRegistry,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        let registry = FunctionRegistry::default();
        builtins::register_all(&registry);
        Self { registry }
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a host function, overwriting any existing registration
    /// (built-in or otherwise) under the same name.
    pub fn register(self, name: impl Into<String>, f: HostFn) -> Self {
        self.registry.register(name, f);
        self
    }

    pub fn build(self) -> Arc<Runtime> {
        Arc::new(Runtime {
            registry: self.registry,
            text_cache: TextCache::default(),
            file_cache: FileCache::default(),
        })
    }
}

/// A compiled template: an immutable node list plus a handle to the shared
/// runtime. Safe to execute concurrently from any number of callers; a
/// [Context] is never shared across concurrent executions.
#[derive(Clone)]
pub struct Engine {
    nodes: Arc<Vec<Node>>,
    runtime: Arc<Runtime>,
}

impl Engine {
    /// Compile template source directly, using a private one-off runtime
    /// with just the built-in functions registered. Prefer
    /// [Runtime::compile] when you need custom host functions or want
    /// compile caching shared across many calls.
    pub fn compile(source: &str) -> Self {
        EngineBuilder::new().build().compile(source)
    }

    /// Execute against a fresh root context built from `params`, returning
    /// the rendered output.
    pub fn execute(&self, ctx: &Context) -> String {
        let mut out = String::new();
        self.execute_to(ctx, &mut out);
        out
    }

    /// Execute, appending output to an existing buffer.
    pub fn execute_to(&self, ctx: &Context, out: &mut String) {
        exec::exec_nodes(self, ctx, &self.nodes, out);
    }

    pub(crate) fn call(&self, ctx: &Context, name: &str, args: Vec<Value>) -> Value {
        self.runtime.registry.call(name, args, ctx)
    }

    pub(crate) fn compile_file_cached(&self, path: &str) -> Option<Arc<Vec<Node>>> {
        Some(
            self.runtime
                .file_cache
                .get_or_compile(Path::new(path), |src| template::parse(src)),
        )
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }
}

/// Convenience: register a function taking already-dispatched [Arguments]
/// under the given name on a fresh builder, compile `source`, and execute
/// against `ctx` in one call. Mirrors the reference API's free-function
/// `RenderText`.
pub fn render_text(source: &str, ctx: &Context) -> String {
    Engine::compile(source).execute(ctx)
}

/// Convenience: compile and render a template from a file path (uncached —
/// callers that render the same file repeatedly should build a [Runtime]
/// once and call [Runtime::compile_file] instead).
pub fn render_file(path: impl AsRef<Path>, ctx: &Context) -> String {
    let runtime = EngineBuilder::new().build();
    runtime.compile_file(path).execute(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Arguments;

    #[test]
    fn test_builtin_function_available_by_default() {
        let engine = Engine::compile("");
        assert!(engine.runtime().has_function("upper"));
    }

    #[test]
    fn test_custom_register_overrides_builtin() {
        let runtime = EngineBuilder::new()
            .register(
                "upper",
                Box::new(|a: &mut Arguments<'_>| {
                    let s: String = a.pop();
                    Value::String(format!("CUSTOM:{s}"))
                }),
            )
            .build();
        let ctx = Context::new(Vec::new());
        let out = runtime.compile("<? echo upper(\"hi\"); ?>").execute(&ctx);
        assert_eq!(out, "CUSTOM:hi");
    }

    #[test]
    fn test_text_cache_reuses_nodes_for_identical_source() {
        let runtime = EngineBuilder::new().build();
        let a = runtime.compile("hello $x");
        let b = runtime.compile("hello $x");
        assert!(Arc::ptr_eq(&a.nodes, &b.nodes));
    }

    #[test]
    fn test_compile_file_missing_path_renders_empty() {
        let ctx = Context::new(Vec::new());
        let out = render_file("/nonexistent/path/does-not-exist.tpl", &ctx);
        assert_eq!(out, "");
    }

    #[test]
    fn test_include_depth_guard_stops_infinite_recursion() {
        let dir = std::env::temp_dir()
            .join(format!("scribe_engine_test_include_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("self.tpl");
        std::fs::write(&path, format!(r#"<? include("{}"); ?>x"#, path.display()))
            .unwrap();

        let runtime = EngineBuilder::new().build();
        let ctx = Context::new(Vec::new());
        let out = runtime.compile_file(&path).execute(&ctx);
        // One `x` per include level up to the depth guard, then it stops.
        assert_eq!(out.len(), crate::context::MAX_INCLUDE_DEPTH + 1);

        std::fs::remove_dir_all(&dir).ok();
    }
}
