//! The host-function registry: a name-indexed table of boxed callables, with
//! lossy-but-total argument coercion and panic isolation.

use crate::{context::Context, value::Value};
use std::{collections::HashMap, panic::AssertUnwindSafe, sync::RwLock};

/// A registered host function. Arguments have already been evaluated to
/// [Value]s; the function pulls out whatever it needs via [Arguments].
pub type HostFn = Box<dyn Fn(&mut Arguments<'_>) -> Value + Send + Sync>;

/// Arguments passed to one function call, consumed front-to-back.
pub struct Arguments<'a> {
    values: std::collections::VecDeque<Value>,
    ctx: &'a Context,
}

impl<'a> Arguments<'a> {
    pub fn new(values: Vec<Value>, ctx: &'a Context) -> Self {
        Self {
            values: values.into(),
            ctx,
        }
    }

    pub fn context(&self) -> &'a Context {
        self.ctx
    }

    /// Pop the next positional argument and coerce it to `T`. Missing
    /// arguments coerce from [Value::Null], which (per [crate::value::FromValue])
    /// degrades to `T`'s natural zero value rather than erroring.
    pub fn pop<T: crate::value::FromValue>(&mut self) -> T {
        let value = self.values.pop_front().unwrap_or(Value::Null);
        T::from_value(&value)
    }

    /// Peek without consuming, for functions that want the raw [Value]
    /// (e.g. to preserve int-vs-float typing).
    pub fn pop_value(&mut self) -> Value {
        self.values.pop_front().unwrap_or(Value::Null)
    }

    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}

/// An immutable, shareable table of registered functions. Built once via
/// [crate::engine::EngineBuilder::register] before any template is compiled
/// against it.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: RwLock<HashMap<String, HostFn>>,
}

impl FunctionRegistry {
    pub fn register(&self, name: impl Into<String>, f: HostFn) {
        self.functions.write().unwrap().insert(name.into(), f);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.read().unwrap().contains_key(name)
    }

    /// Invoke a registered function by name. Missing functions, and panics
    /// from within the function, both yield `Value::Null` rather than
    /// propagating to the template executor — the engine must keep
    /// rendering regardless of host function misbehavior.
    pub fn call(&self, name: &str, args: Vec<Value>, ctx: &Context) -> Value {
        let functions = self.functions.read().unwrap();
        let Some(f) = functions.get(name) else {
            tracing::debug!(name, "call to unregistered function");
            return Value::Null;
        };
        let mut arguments = Arguments::new(args, ctx);
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            f(&mut arguments)
        }));
        match result {
            Ok(value) => value,
            Err(_) => {
                tracing::debug!(name, "host function panicked");
                Value::Null
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_missing_function_is_null() {
        let registry = FunctionRegistry::default();
        let ctx = Context::new(Vec::new());
        assert_eq!(registry.call("nope", vec![], &ctx), Value::Null);
    }

    #[test]
    fn test_call_panicking_function_is_null() {
        let registry = FunctionRegistry::default();
        registry.register(
            "boom",
            Box::new(|_: &mut Arguments<'_>| panic!("kaboom")),
        );
        let ctx = Context::new(Vec::new());
        assert_eq!(registry.call("boom", vec![], &ctx), Value::Null);
    }

    #[test]
    fn test_pop_coerces_missing_to_zero_value() {
        let ctx = Context::new(Vec::new());
        let mut args = Arguments::new(vec![], &ctx);
        let n: i64 = args.pop();
        assert_eq!(n, 0);
    }
}
