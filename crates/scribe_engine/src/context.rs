//! The variable scope chain: a tree of frames, walked on lookup and updated
//! in-place on assignment.

use crate::value::Value;
use std::{cell::RefCell, collections::HashMap, rc::Rc};

/// The host-path capability: given an opaque host value and a path segment,
/// return the nested value. Implemented for [Value] itself so dotted/indexed
/// traversal over plain template values works with no host involvement;
/// callers that want to expose their own Rust types as param sources can
/// implement this directly.
pub trait PathSource {
    /// Look up a field by name (the `.field` path segment)
    fn get_field(&self, name: &str) -> Option<Value>;

    /// Look up an element by index (the `[expr]` path segment). `key` is
    /// already coerced to a [Value] by the evaluator.
    fn get_index(&self, key: &Value) -> Option<Value>;

    /// Resolve a bare top-level name against this source (used only for the
    /// context's param sources, not nested path segments).
    fn get_root(&self, name: &str) -> Option<Value>;
}

impl PathSource for Value {
    fn get_field(&self, name: &str) -> Option<Value> {
        match self {
            Value::Object(map) => map.get(name).cloned(),
            _ => None,
        }
    }

    fn get_index(&self, key: &Value) -> Option<Value> {
        match self {
            Value::Array(items) => {
                let idx = key.as_i64()?;
                usize::try_from(idx)
                    .ok()
                    .and_then(|idx| items.get(idx))
                    .cloned()
            }
            Value::Object(map) => map.get(&key.stringify()).cloned(),
            _ => None,
        }
    }

    fn get_root(&self, name: &str) -> Option<Value> {
        self.get_field(name)
    }
}

struct Frame {
    vars: HashMap<String, Value>,
    parent: Option<Rc<RefCell<Frame>>>,
}

/// One execution's scope chain, plus the external capabilities (param
/// sources, include depth, host functions) that are inherited unchanged by
/// every child frame.
pub struct Context {
    frame: Rc<RefCell<Frame>>,
    params: Rc<Vec<Rc<dyn PathSource>>>,
    include_depth: usize,
}

pub const MAX_INCLUDE_DEPTH: usize = 32;

impl Context {
    /// Create a fresh root context with the given param sources.
    pub fn new(params: Vec<Rc<dyn PathSource>>) -> Self {
        Self {
            frame: Rc::new(RefCell::new(Frame {
                vars: HashMap::new(),
                parent: None,
            })),
            params: Rc::new(params),
            include_depth: 0,
        }
    }

    /// Create a child frame inheriting param sources and include depth
    pub fn child(&self) -> Self {
        Self {
            frame: Rc::new(RefCell::new(Frame {
                vars: HashMap::new(),
                parent: Some(Rc::clone(&self.frame)),
            })),
            params: Rc::clone(&self.params),
            include_depth: self.include_depth,
        }
    }

    /// Create a child context for an include, with depth incremented. Returns
    /// `None` if the depth guard would be exceeded.
    pub fn include_child(&self) -> Option<Self> {
        if self.include_depth >= MAX_INCLUDE_DEPTH {
            return None;
        }
        let mut child = self.child();
        child.include_depth = self.include_depth + 1;
        Some(child)
    }

    pub fn include_depth(&self) -> usize {
        self.include_depth
    }

    /// Look up a bare variable name: scope chain first, then param sources.
    pub fn get(&self, name: &str) -> Option<Value> {
        let mut frame = Some(Rc::clone(&self.frame));
        while let Some(current) = frame {
            let borrowed = current.borrow();
            if let Some(value) = borrowed.vars.get(name) {
                return Some(value.clone());
            }
            frame = borrowed.parent.clone();
        }
        for source in self.params.iter() {
            if let Some(value) = source.get_root(name) {
                return Some(value);
            }
        }
        None
    }

    /// Assign: update in place at the originating frame if the name already
    /// exists anywhere in the chain, else create it in the current frame.
    pub fn set(&self, name: &str, value: Value) {
        let mut frame = Some(Rc::clone(&self.frame));
        while let Some(current) = frame {
            let mut borrowed = current.borrow_mut();
            if let Some(slot) = borrowed.vars.get_mut(name) {
                *slot = value;
                return;
            }
            frame = borrowed.parent.clone();
        }
        self.frame.borrow_mut().vars.insert(name.to_owned(), value);
    }

    /// Unconditionally write to the *current* frame, regardless of whether
    /// an ancestor already holds this name. Used for loop variables so they
    /// shadow correctly and (for for-range) persist in the right frame.
    pub fn set_local(&self, name: &str, value: Value) {
        self.frame.borrow_mut().vars.insert(name.to_owned(), value);
    }

    /// Resolve an arbitrary path source field/index lookup over a value
    /// that was already obtained from the scope chain or a param source.
    pub fn resolve_path(&self, root: Value, segments: &[PathStep]) -> Option<Value> {
        let mut current = root;
        for step in segments {
            current = match step {
                PathStep::Field(name) => current.get_field(name)?,
                PathStep::Index(key) => current.get_index(key)?,
            };
        }
        Some(current)
    }
}

/// A resolved path step (field name or already-evaluated index key), used by
/// the evaluator when walking a [crate::ast::VarPath].
pub enum PathStep {
    Field(String),
    Index(Value),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_falls_through_to_param_source() {
        let params: Vec<Rc<dyn PathSource>> =
            vec![Rc::new(crate::pairs!("name" => "alice")) as _];
        let ctx = Context::new(params);
        assert_eq!(ctx.get("name"), Some(Value::String("alice".into())));
        assert_eq!(ctx.get("missing"), None);
    }

    #[test]
    fn test_set_updates_originating_frame_not_current() {
        let ctx = Context::new(Vec::new());
        ctx.set("x", Value::Int(1));
        let child = ctx.child();
        child.set("x", Value::Int(2));
        // Updated in the parent frame, visible from both.
        assert_eq!(ctx.get("x"), Some(Value::Int(2)));
        assert_eq!(child.get("x"), Some(Value::Int(2)));
    }

    #[test]
    fn test_set_local_shadows_without_touching_parent() {
        let ctx = Context::new(Vec::new());
        ctx.set("x", Value::Int(1));
        let child = ctx.child();
        child.set_local("x", Value::Int(99));
        assert_eq!(child.get("x"), Some(Value::Int(99)));
        assert_eq!(ctx.get("x"), Some(Value::Int(1)));
    }

    #[test]
    fn test_include_depth_guard() {
        let mut ctx = Context::new(Vec::new());
        for _ in 0..MAX_INCLUDE_DEPTH {
            ctx = ctx.include_child().expect("depth not yet exhausted");
        }
        assert!(ctx.include_child().is_none());
    }

    #[test]
    fn test_resolve_path_over_nested_object() {
        let ctx = Context::new(Vec::new());
        let root = crate::pairs!("inner" => crate::pairs!("n" => 7));
        let steps = [
            PathStep::Field("inner".to_owned()),
            PathStep::Field("n".to_owned()),
        ];
        assert_eq!(ctx.resolve_path(root, &steps), Some(Value::Int(7)));
    }
}
