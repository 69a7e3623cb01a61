//! Expression evaluation: operators, variable/path resolution, literals,
//! and array/map construction.

use crate::{
    ast::{BinOp, Expr, IncDecOp, Literal, PathSegment, UnOp, VarPath},
    context::{Context, PathStep},
    engine::Engine,
    value::Value,
};

pub fn eval_expr(engine: &Engine, ctx: &Context, expr: &Expr) -> Value {
    match expr {
        Expr::Lit(lit) => Value::from(lit),
        Expr::Var(path) => {
            resolve_var_path_engine(engine, ctx, path).unwrap_or(Value::Null)
        }
        Expr::Call(name, args) => {
            let values: Vec<Value> =
                args.iter().map(|a| eval_expr(engine, ctx, a)).collect();
            engine.call(ctx, name.as_str(), values)
        }
        Expr::Bin(op, l, r) => eval_bin(engine, ctx, *op, l, r),
        Expr::Un(UnOp::Not, x) => Value::Bool(!eval_expr(engine, ctx, x).to_bool()),
        Expr::Un(UnOp::Neg, x) => negate(&eval_expr(engine, ctx, x)),
        Expr::Coalesce(l, r) => {
            let left = eval_expr(engine, ctx, l);
            if matches!(left, Value::Null) {
                eval_expr(engine, ctx, r)
            } else {
                left
            }
        }
        Expr::IncDec(path, op) => {
            let current =
                resolve_var_path_engine(engine, ctx, path).unwrap_or(Value::Int(0));
            let delta = match op {
                IncDecOp::Inc => 1,
                IncDecOp::Dec => -1,
            };
            let next = match current.as_i64() {
                Some(i) if current.is_int_like() => Value::Int(i + delta),
                Some(_) => Value::Float(current.as_f64().unwrap_or(0.0) + delta as f64),
                None => Value::Int(delta),
            };
            if path.segments.is_empty() {
                ctx.set(path.root.as_str(), next);
            }
            current
        }
        Expr::Ternary(cond, then, els) => {
            if eval_expr(engine, ctx, cond).to_bool() {
                eval_expr(engine, ctx, then)
            } else {
                eval_expr(engine, ctx, els)
            }
        }
        Expr::IsSet(path) => {
            Value::Bool(resolve_var_path_engine(engine, ctx, path).is_some())
        }
        Expr::ArrayLit(items) => Value::Array(
            items.iter().map(|e| eval_expr(engine, ctx, e)).collect(),
        ),
        Expr::MapLit(entries) => {
            let mut map = indexmap::IndexMap::new();
            for (key, expr) in entries {
                map.insert(key.clone(), eval_expr(engine, ctx, expr));
            }
            Value::Object(map)
        }
    }
}

fn negate(value: &Value) -> Value {
    match value {
        Value::Int(i) => Value::Int(-i),
        _ => match value.as_f64() {
            Some(f) => Value::Float(-f),
            None => Value::Null,
        },
    }
}

fn eval_bin(engine: &Engine, ctx: &Context, op: BinOp, l: &Expr, r: &Expr) -> Value {
    // Short-circuit logical operators evaluate the right side lazily
    match op {
        BinOp::And => {
            let left = eval_expr(engine, ctx, l);
            return Value::Bool(
                left.to_bool() && eval_expr(engine, ctx, r).to_bool(),
            );
        }
        BinOp::Or => {
            let left = eval_expr(engine, ctx, l);
            return Value::Bool(
                left.to_bool() || eval_expr(engine, ctx, r).to_bool(),
            );
        }
        _ => {}
    }

    let left = eval_expr(engine, ctx, l);
    let right = eval_expr(engine, ctx, r);

    match op {
        BinOp::Concat => Value::String(left.stringify() + &right.stringify()),
        BinOp::Add | BinOp::Sub | BinOp::Mul => {
            arithmetic(&left, &right, op)
        }
        BinOp::Div => match (left.as_f64(), right.as_f64()) {
            (Some(_), Some(b)) if b == 0.0 => Value::Null,
            (Some(a), Some(b)) => numeric_result(a / b, &left, &right),
            _ => Value::Null,
        },
        BinOp::Mod => match (left.as_i64(), right.as_i64()) {
            (Some(_), Some(0)) => Value::Null,
            (Some(a), Some(b)) => Value::Int(a % b),
            _ => Value::Null,
        },
        BinOp::Eq => Value::Bool(values_equal(&left, &right)),
        BinOp::Ne => Value::Bool(!values_equal(&left, &right)),
        BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
            compare(&left, &right, op)
        }
        BinOp::And | BinOp::Or => unreachable!("handled above"),
    }
}

fn arithmetic(left: &Value, right: &Value, op: BinOp) -> Value {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => {
            let result = match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                _ => unreachable!(),
            };
            numeric_result(result, left, right)
        }
        _ => Value::Null,
    }
}

fn numeric_result(result: f64, left: &Value, right: &Value) -> Value {
    if left.is_int_like() && right.is_int_like() && result.fract() == 0.0 {
        Value::Int(result as i64)
    } else {
        Value::Float(result)
    }
}

pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => left.stringify() == right.stringify(),
        },
    }
}

fn compare(left: &Value, right: &Value, op: BinOp) -> Value {
    let ordering = match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => left.stringify().partial_cmp(&right.stringify()),
    };
    let Some(ordering) = ordering else {
        return Value::Bool(false);
    };
    use std::cmp::Ordering::*;
    Value::Bool(match op {
        BinOp::Lt => ordering == Less,
        BinOp::Gt => ordering == Greater,
        BinOp::Le => ordering != Greater,
        BinOp::Ge => ordering != Less,
        _ => unreachable!(),
    })
}

/// Resolve a variable path against the scope chain / param sources,
/// including any `.field`/`[expr]` suffixes. This is the entry point used
/// from text interpolation, where indices are always static literals.
pub fn resolve_var_path(ctx: &Context, path: &VarPath) -> Option<Value> {
    resolve_var_path_with(None, ctx, path)
}

/// Same as [resolve_var_path], but with an [Engine] available so dynamic
/// `[$var]`/`[fn()]` index segments can be evaluated rather than treated as
/// null.
pub fn resolve_var_path_engine(
    engine: &Engine,
    ctx: &Context,
    path: &VarPath,
) -> Option<Value> {
    resolve_var_path_with(Some(engine), ctx, path)
}

fn resolve_var_path_with(
    engine: Option<&Engine>,
    ctx: &Context,
    path: &VarPath,
) -> Option<Value> {
    let root = ctx.get(path.root.as_str())?;
    if path.segments.is_empty() {
        return Some(root);
    }
    let mut current = root;
    for segment in &path.segments {
        let step = match segment {
            PathSegment::Field(name) => PathStep::Field(name.0.clone()),
            PathSegment::Index(expr) => {
                let key = match (engine, expr.as_ref()) {
                    (Some(engine), _) => eval_expr(engine, ctx, expr),
                    (None, Expr::Lit(lit)) => Value::from(lit),
                    (None, _) => Value::Null,
                };
                PathStep::Index(key)
            }
        };
        current = ctx.resolve_path(current, std::slice::from_ref(&step))?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Literal;

    fn lit_int(i: i64) -> Expr {
        Expr::Lit(Literal::Int(i))
    }

    fn eval(expr: &Expr) -> Value {
        let engine = Engine::compile("");
        let ctx = Context::new(Vec::new());
        eval_expr(&engine, &ctx, expr)
    }

    #[test]
    fn test_int_arithmetic_stays_int() {
        let expr = Expr::Bin(BinOp::Add, Box::new(lit_int(2)), Box::new(lit_int(3)));
        assert_eq!(eval(&expr), Value::Int(5));
    }

    #[test]
    fn test_float_arithmetic_promotes() {
        let expr = Expr::Bin(
            BinOp::Add,
            Box::new(lit_int(2)),
            Box::new(Expr::Lit(Literal::Float(0.5))),
        );
        assert_eq!(eval(&expr), Value::Float(2.5));
    }

    #[test]
    fn test_divide_by_zero_is_null() {
        let expr = Expr::Bin(BinOp::Div, Box::new(lit_int(1)), Box::new(lit_int(0)));
        assert_eq!(eval(&expr), Value::Null);
    }

    #[test]
    fn test_modulo_by_zero_is_null() {
        let expr = Expr::Bin(BinOp::Mod, Box::new(lit_int(1)), Box::new(lit_int(0)));
        assert_eq!(eval(&expr), Value::Null);
    }

    #[test]
    fn test_concat_stringifies_both_sides() {
        let expr = Expr::Bin(
            BinOp::Concat,
            Box::new(Expr::Lit(Literal::Str("n=".into()))),
            Box::new(lit_int(4)),
        );
        assert_eq!(eval(&expr), Value::String("n=4".into()));
    }

    #[test]
    fn test_loose_equality_across_types() {
        let expr = Expr::Bin(
            BinOp::Eq,
            Box::new(lit_int(1)),
            Box::new(Expr::Lit(Literal::Str("1".into()))),
        );
        assert_eq!(eval(&expr), Value::Bool(true));
    }

    #[test]
    fn test_coalesce_uses_right_only_when_left_is_null() {
        let expr = Expr::Coalesce(Box::new(lit_int(0)), Box::new(lit_int(9)));
        assert_eq!(eval(&expr), Value::Int(0), "0 is not null, so left wins");

        let expr = Expr::Coalesce(
            Box::new(Expr::Lit(Literal::Null)),
            Box::new(lit_int(9)),
        );
        assert_eq!(eval(&expr), Value::Int(9));
    }

    #[test]
    fn test_ternary() {
        let expr = Expr::Ternary(
            Box::new(Expr::Lit(Literal::Bool(false))),
            Box::new(lit_int(1)),
            Box::new(lit_int(2)),
        );
        assert_eq!(eval(&expr), Value::Int(2));
    }

    #[test]
    fn test_isset_on_missing_var() {
        let expr = Expr::IsSet(VarPath::simple("nope"));
        assert_eq!(eval(&expr), Value::Bool(false));
    }

    #[test]
    fn test_and_short_circuits_before_evaluating_right() {
        // $missing++ would create the var as a side effect if evaluated; since
        // `&&` short-circuits on a false left side, it must never run.
        let engine = Engine::compile("");
        let ctx = Context::new(Vec::new());
        let expr = Expr::Bin(
            BinOp::And,
            Box::new(Expr::Lit(Literal::Bool(false))),
            Box::new(Expr::IncDec(
                VarPath::simple("counter"),
                crate::ast::IncDecOp::Inc,
            )),
        );
        assert_eq!(eval_expr(&engine, &ctx, &expr), Value::Bool(false));
        assert_eq!(ctx.get("counter"), None);
    }
}
