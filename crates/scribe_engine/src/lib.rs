//! Embedded template engine: a small PHP-flavored code-block language
//! interleaved with literal text, compiled to an AST and walked by a
//! synchronous tree-walking executor.
//!
//! The host-facing surface is [engine::Engine] / [engine::EngineBuilder] /
//! [engine::Runtime] plus [context::Context] for supplying parameters.
//! Everything else is exposed for callers who want lower-level access (a
//! custom host-path source, direct AST inspection) but the common path is:
//!
//! ```ignore
//! let ctx = Context::new(vec![/* param sources */]);
//! let output = Engine::compile(source).execute(&ctx);
//! ```

pub mod ast;
pub mod builtins;
pub mod cache;
pub mod context;
pub mod engine;
pub mod eval;
pub mod exec;
pub mod interpolate;
pub mod lexer;
pub mod parser;
pub mod registry;
pub mod template;
pub mod value;

pub use context::{Context, PathSource};
pub use engine::{render_file, render_text, Engine, EngineBuilder, Runtime};
pub use registry::{Arguments, HostFn};
pub use value::{FromValue, Value};

/// Build a [Value::Object] from alternating key/value pairs, as a stand-in
/// for the reference API's variadic `Pairs(k1, v1, k2, v2, ...)` helper.
/// Keys are stringified; an odd trailing key with no value is dropped.
#[macro_export]
macro_rules! pairs {
    ($($key:expr => $value:expr),* $(,)?) => {{
        let mut map = indexmap::IndexMap::new();
        $(map.insert($key.to_string(), $crate::Value::from($value));)*
        $crate::Value::Object(map)
    }};
}
