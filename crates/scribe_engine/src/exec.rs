//! Walks a compiled node list and writes output, evaluating expressions via
//! [crate::eval] and managing the scope chain via [crate::context::Context].

use crate::{
    ast::{CompoundOp, IncDecOp, Node, Stmt, SwitchCase},
    context::Context,
    engine::Engine,
    eval::{eval_expr, resolve_var_path},
    value::Value,
};
use std::fmt::Write as _;

/// The maximum number of iterations a single C-style/while loop may run.
/// Guards against infinite loops in pathological templates.
pub const MAX_FOR_C_ITERATIONS: u64 = 1_000_000;

/// The result of executing one statement or node body: either normal
/// completion, or a structured, non-local transfer up to the nearest
/// enclosing loop (or switch, for `Break`).
///
/// This is the Rust substitute for the reference implementation's
/// panic-based break/continue: a plain enum checked at every loop/switch
/// boundary. Host-function panics (see `registry.rs`) are a different,
/// unrelated mechanism and must never be confused with this one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Flow {
    Normal,
    Break,
    Continue,
}

/// Execute a node list, writing output to `out`. Returns the `Flow` signal
/// propagating out of this body (e.g. a `break` inside an `if` inside a
/// loop body bubbles up through here).
pub fn exec_nodes(
    engine: &Engine,
    ctx: &Context,
    nodes: &[Node],
    out: &mut String,
) -> Flow {
    for node in nodes {
        match exec_node(engine, ctx, node, out) {
            Flow::Normal => {}
            flow => return flow,
        }
    }
    Flow::Normal
}

fn exec_node(engine: &Engine, ctx: &Context, node: &Node, out: &mut String) -> Flow {
    match node {
        Node::Text(parts) => {
            exec_text(ctx, parts, out);
            Flow::Normal
        }
        Node::Stmts(stmts) => exec_stmts(engine, ctx, stmts, out),
        Node::ForRange {
            key,
            value,
            iterable,
            body,
        } => exec_for_range(engine, ctx, key, value, iterable, body, out),
        Node::ForC {
            init,
            cond,
            post,
            body,
        } => exec_for_c(engine, ctx, init, cond, post, body, out),
        Node::If {
            cond,
            then_body,
            else_body,
        } => {
            if eval_expr(engine, ctx, cond).to_bool() {
                exec_nodes(engine, ctx, then_body, out)
            } else {
                exec_nodes(engine, ctx, else_body, out)
            }
        }
        Node::Switch {
            value,
            cases,
            default,
        } => exec_switch(engine, ctx, value, cases, default.as_deref(), out),
        Node::Include(path_expr) => {
            exec_include(engine, ctx, path_expr, out);
            Flow::Normal
        }
    }
}

fn exec_text(ctx: &Context, parts: &[crate::ast::TextPart], out: &mut String) {
    use crate::ast::TextPart;
    for part in parts {
        match part {
            TextPart::Literal(s) => out.push_str(s),
            TextPart::Placeholder(path) => {
                match resolve_var_path(ctx, path) {
                    Some(value) => out.push_str(&value.stringify()),
                    // Missing variable: keep the placeholder text unchanged
                    None => {
                        let _ = write!(out, "{path}");
                    }
                }
            }
        }
    }
}

fn exec_stmts(
    engine: &Engine,
    ctx: &Context,
    stmts: &[Stmt],
    out: &mut String,
) -> Flow {
    for stmt in stmts {
        match exec_stmt(engine, ctx, stmt, out) {
            Flow::Normal => {}
            flow => return flow,
        }
    }
    Flow::Normal
}

fn exec_stmt(engine: &Engine, ctx: &Context, stmt: &Stmt, out: &mut String) -> Flow {
    match stmt {
        Stmt::Echo(expr) => {
            let value = eval_expr(engine, ctx, expr);
            if !matches!(value, Value::Null) {
                out.push_str(&value.stringify());
            }
            Flow::Normal
        }
        Stmt::Expr(expr) => {
            let value = eval_expr(engine, ctx, expr);
            if !matches!(value, Value::Null) {
                out.push_str(&value.stringify());
            }
            Flow::Normal
        }
        Stmt::Assign(path, expr) => {
            let value = eval_expr(engine, ctx, expr);
            assign_path(ctx, path, value);
            Flow::Normal
        }
        Stmt::CompoundAssign(path, op, expr) => {
            let rhs = eval_expr(engine, ctx, expr);
            let current = resolve_var_path(ctx, path).unwrap_or(Value::Int(0));
            let result = apply_compound(&current, *op, &rhs);
            assign_path(ctx, path, result);
            Flow::Normal
        }
        Stmt::IncDec(path, op) => {
            let current = resolve_var_path(ctx, path).unwrap_or(Value::Int(0));
            let result = apply_inc_dec(&current, *op);
            assign_path(ctx, path, result);
            Flow::Normal
        }
        Stmt::Break => Flow::Break,
        Stmt::Continue => Flow::Continue,
    }
}

/// Assign into a variable path. Only bare-name paths (`$x`) can be assigned;
/// a path with field/index suffixes has no defined assignment target and is
/// silently ignored, matching the engine's best-effort error policy.
fn assign_path(ctx: &Context, path: &crate::ast::VarPath, value: Value) {
    if path.segments.is_empty() {
        ctx.set(path.root.as_str(), value);
    }
}

fn apply_compound(current: &Value, op: CompoundOp, rhs: &Value) -> Value {
    let both_int = current.is_int_like() && rhs.is_int_like();
    let (Some(a), Some(b)) = (current.as_f64(), rhs.as_f64()) else {
        return Value::Null;
    };
    let result = match op {
        CompoundOp::Add => a + b,
        CompoundOp::Sub => a - b,
        CompoundOp::Mul => a * b,
        CompoundOp::Div => {
            if b == 0.0 {
                return Value::Null;
            }
            a / b
        }
    };
    if both_int && result.fract() == 0.0 {
        Value::Int(result as i64)
    } else {
        Value::Float(result)
    }
}

fn apply_inc_dec(current: &Value, op: IncDecOp) -> Value {
    let delta = match op {
        IncDecOp::Inc => 1.0,
        IncDecOp::Dec => -1.0,
    };
    match current.as_f64() {
        Some(n) if current.is_int_like() => Value::Int(n as i64 + delta as i64),
        Some(n) => Value::Float(n + delta),
        None => Value::Int(delta as i64),
    }
}

fn exec_for_range(
    engine: &Engine,
    ctx: &Context,
    key: &Option<crate::ast::Identifier>,
    value_name: &crate::ast::Identifier,
    iterable: &crate::ast::Expr,
    body: &[Node],
    out: &mut String,
) -> Flow {
    let iterable_value = eval_expr(engine, ctx, iterable);
    // For-range loop variables live in the *current* scope, not a child, so
    // they persist after the loop per the spec's scope-propagation rule.
    let items: Vec<(Value, Value)> = match &iterable_value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (Value::Int(i as i64), v.clone()))
            .collect(),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| (Value::String(k.clone()), v.clone()))
            .collect(),
        Value::String(s) => s
            .char_indices()
            .map(|(i, c)| (Value::Int(i as i64), Value::String(c.to_string())))
            .collect(),
        Value::Int(n) if *n >= 0 => {
            (0..*n).map(|i| (Value::Int(i), Value::Int(i))).collect()
        }
        _ => Vec::new(),
    };

    let count = items.len();
    for (index, (item_key, item_value)) in items.into_iter().enumerate() {
        if let Some(key_name) = key {
            ctx.set_local(key_name.as_str(), item_key);
        }
        ctx.set_local(value_name.as_str(), item_value);
        ctx.set_local(
            "loop",
            loop_meta(index, count),
        );

        let body_ctx = ctx.child();
        match exec_nodes(engine, &body_ctx, body, out) {
            Flow::Break => break,
            Flow::Continue | Flow::Normal => {}
        }
    }
    Flow::Normal
}

fn exec_for_c(
    engine: &Engine,
    ctx: &Context,
    init: &Option<Box<Stmt>>,
    cond: &Option<crate::ast::Expr>,
    post: &Option<Box<Stmt>>,
    body: &[Node],
    out: &mut String,
) -> Flow {
    // Runs in a child scope so init-declared variables don't leak out
    let loop_ctx = ctx.child();
    if let Some(init) = init {
        exec_stmt(engine, &loop_ctx, init, out);
    }

    let mut iterations: u64 = 0;
    loop {
        if let Some(cond) = cond {
            if !eval_expr(engine, &loop_ctx, cond).to_bool() {
                break;
            }
        }
        if iterations >= MAX_FOR_C_ITERATIONS {
            break;
        }
        iterations += 1;

        let body_ctx = loop_ctx.child();
        match exec_nodes(engine, &body_ctx, body, out) {
            Flow::Break => break,
            Flow::Continue | Flow::Normal => {}
        }

        if let Some(post) = post {
            exec_stmt(engine, &loop_ctx, post, out);
        }
    }
    Flow::Normal
}

fn loop_meta(index: usize, count: usize) -> Value {
    let mut map = indexmap::IndexMap::new();
    map.insert("index".to_owned(), Value::Int(index as i64));
    map.insert("first".to_owned(), Value::Bool(index == 0));
    map.insert(
        "last".to_owned(),
        Value::Bool(count > 0 && index == count - 1),
    );
    map.insert("count".to_owned(), Value::Int(count as i64));
    Value::Object(map)
}

fn exec_switch(
    engine: &Engine,
    ctx: &Context,
    value_expr: &crate::ast::Expr,
    cases: &[SwitchCase],
    default: Option<&[Node]>,
    out: &mut String,
) -> Flow {
    let value = eval_expr(engine, ctx, value_expr);
    for case in cases {
        let matched = case
            .matches
            .iter()
            .any(|m| crate::eval::values_equal(&value, &eval_expr(engine, ctx, m)));
        if matched {
            // Break inside a case body exits the switch only; continue
            // propagates to an enclosing loop.
            return match exec_nodes(engine, &ctx.child(), &case.body, out) {
                Flow::Break => Flow::Normal,
                other => other,
            };
        }
    }
    if let Some(default_body) = default {
        return match exec_nodes(engine, &ctx.child(), default_body, out) {
            Flow::Break => Flow::Normal,
            other => other,
        };
    }
    Flow::Normal
}

fn exec_include(engine: &Engine, ctx: &Context, path_expr: &crate::ast::Expr, out: &mut String) {
    let path_value = eval_expr(engine, ctx, path_expr);
    let path = path_value.stringify();
    if path.is_empty() {
        return;
    }
    let Some(child_ctx) = ctx.include_child() else {
        tracing::debug!(path, "include depth exceeded, aborting include");
        return;
    };
    let Some(nodes) = engine.compile_file_cached(&path) else {
        return;
    };
    exec_nodes(engine, &child_ctx, &nodes, out);
}
