//! The lightweight interpolator: `$path`, `$$`, pipe-chained modifiers, and
//! bare function calls, for sources with no `<? ?>` code blocks at all.

use crate::{
    ast::{Expr, Literal, PathSegment, VarPath},
    context::Context,
    engine::Engine,
    eval::resolve_var_path,
    value::Value,
};

const BUILTIN_MODIFIERS: &[&str] = &["upper", "lower", "title", "trim", "html", "url", "json"];

/// Render a no-code-block template against `ctx`.
pub fn render(engine: &Engine, ctx: &Context, source: &str) -> String {
    let mut out = String::new();
    let mut s = source;
    while !s.is_empty() {
        match s.find('$') {
            None => {
                out.push_str(s);
                break;
            }
            Some(0) => {
                let (rendered, rest) = render_dollar(engine, ctx, s);
                out.push_str(&rendered);
                s = rest;
            }
            Some(idx) => {
                out.push_str(&s[..idx]);
                s = &s[idx..];
            }
        }
    }
    out
}

/// Render one `$...` construct starting at `s[0] == '$'`. Returns the
/// rendered text and the remaining unconsumed input.
fn render_dollar<'a>(engine: &Engine, ctx: &Context, s: &'a str) -> (String, &'a str) {
    let mut rest = &s[1..];
    if let Some(after) = rest.strip_prefix('$') {
        return ("$".to_owned(), after);
    }

    let name_len = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    if name_len == 0 {
        // Bare `$` with nothing identifier-like following: literal.
        return ("$".to_owned(), rest);
    }
    let name = &rest[..name_len];
    rest = &rest[name_len..];

    if let Some(after_paren) = rest.strip_prefix('(') {
        let (args, after_call) = parse_call_args(after_paren);
        let values: Vec<Value> = args
            .iter()
            .map(|arg| eval_call_arg(ctx, arg))
            .collect();
        let result = engine.call(ctx, name, values);
        return (result.stringify(), after_call);
    }

    let (path, after_path) = parse_path(name, rest);
    let (mods, after_mods) = parse_modifier_chain(after_path);
    let consumed_len = s.len() - after_mods.len();
    let raw_token = &s[..consumed_len];

    let value = resolve_var_path(ctx, &path);
    let rendered = if mods.is_empty() {
        match value {
            Some(v) => v.stringify(),
            None => raw_token.to_owned(),
        }
    } else {
        apply_modifier_chain(engine, ctx, raw_token, value, &mods)
    };
    (rendered, after_mods)
}

fn parse_path<'a>(root: &str, mut rest: &'a str) -> (VarPath, &'a str) {
    let mut path = VarPath::simple(root);
    loop {
        if let Some(after_dot) = rest.strip_prefix('.') {
            let len = after_dot
                .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(after_dot.len());
            if len == 0 {
                break;
            }
            path.segments
                .push(PathSegment::Field(after_dot[..len].into()));
            rest = &after_dot[len..];
        } else if let Some(after_bracket) = rest.strip_prefix('[') {
            match parse_index_literal(after_bracket) {
                Some((segment, after_index)) => {
                    path.segments.push(segment);
                    rest = after_index;
                }
                None => break,
            }
        } else {
            break;
        }
    }
    (path, rest)
}

fn parse_index_literal(input: &str) -> Option<(PathSegment, &str)> {
    if let Some(after_quote) = input.strip_prefix('"') {
        let end = after_quote.find('"')?;
        let key = after_quote[..end].to_owned();
        let after = after_quote[end + 1..].strip_prefix(']')?;
        return Some((
            PathSegment::Index(Box::new(Expr::Lit(Literal::Str(key)))),
            after,
        ));
    }
    if let Some(after_quote) = input.strip_prefix('\'') {
        let end = after_quote.find('\'')?;
        let key = after_quote[..end].to_owned();
        let after = after_quote[end + 1..].strip_prefix(']')?;
        return Some((
            PathSegment::Index(Box::new(Expr::Lit(Literal::Str(key)))),
            after,
        ));
    }
    let digits_end = input.find(|c: char| !c.is_ascii_digit())?;
    if digits_end == 0 {
        return None;
    }
    let n: i64 = input[..digits_end].parse().ok()?;
    let after = input[digits_end..].strip_prefix(']')?;
    Some((PathSegment::Index(Box::new(Expr::Lit(Literal::Int(n)))), after))
}

fn parse_modifier_chain(mut rest: &str) -> (Vec<String>, &str) {
    let mut mods = Vec::new();
    while let Some(after_pipe) = rest.strip_prefix('|') {
        let len = after_pipe
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(after_pipe.len());
        if len == 0 {
            break;
        }
        mods.push(after_pipe[..len].to_owned());
        rest = &after_pipe[len..];
    }
    (mods, rest)
}

fn apply_modifier_chain(
    engine: &Engine,
    ctx: &Context,
    raw_token: &str,
    mut value: Option<Value>,
    mods: &[String],
) -> String {
    for m in mods {
        let is_builtin = BUILTIN_MODIFIERS.contains(&m.as_str());
        match value {
            Some(v) => {
                if is_builtin || engine.runtime().has_function(m) {
                    value = Some(engine.call(ctx, m, vec![v]));
                } else {
                    // Unrecognized modifier on a present value: ignore it.
                    value = Some(v);
                }
            }
            None => {
                if is_builtin {
                    return raw_token.to_owned();
                } else if engine.runtime().has_function(m) {
                    value = Some(engine.call(ctx, m, vec![Value::Null]));
                } else {
                    return m.clone();
                }
            }
        }
    }
    match value {
        Some(v) => v.stringify(),
        None => raw_token.to_owned(),
    }
}

/// One parsed call argument, before evaluation against a context.
enum CallArg {
    Var(String),
    Str(String),
    Number(Value),
}

fn parse_call_args(mut input: &str) -> (Vec<CallArg>, &str) {
    let mut args = Vec::new();
    input = input.trim_start();
    if let Some(after) = input.strip_prefix(')') {
        return (args, after);
    }
    loop {
        input = input.trim_start();
        let Some((arg, after)) = parse_one_arg(input) else {
            break;
        };
        args.push(arg);
        input = after.trim_start();
        if let Some(after_comma) = input.strip_prefix(',') {
            input = after_comma;
            continue;
        }
        break;
    }
    let after = input.trim_start().strip_prefix(')').unwrap_or(input);
    (args, after)
}

fn parse_one_arg(input: &str) -> Option<(CallArg, &str)> {
    if let Some(rest) = input.strip_prefix('$') {
        let len = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        return Some((CallArg::Var(rest[..len].to_owned()), &rest[len..]));
    }
    if let Some(rest) = input.strip_prefix('"') {
        let (s, after) = lex_double_quoted(rest);
        return Some((CallArg::Str(s), after));
    }
    if let Some(rest) = input.strip_prefix('\'') {
        let end = rest.find('\'')?;
        return Some((CallArg::Str(rest[..end].to_owned()), &rest[end + 1..]));
    }
    let len = input
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(input.len());
    if len == 0 {
        return None;
    }
    let text = &input[..len];
    let value = if text.contains('.') {
        Value::Float(text.parse().unwrap_or_default())
    } else {
        Value::Int(text.parse().unwrap_or_default())
    };
    Some((CallArg::Number(value), &input[len..]))
}

fn lex_double_quoted(input: &str) -> (String, &str) {
    let mut out = String::new();
    let mut chars = input.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return (out, &input[i + 1..]),
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, '\\')) => out.push('\\'),
                Some((_, '"')) => out.push('"'),
                Some((_, '\'')) => out.push('\''),
                Some((_, other)) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            },
            other => out.push(other),
        }
    }
    (out, "")
}

fn eval_call_arg(ctx: &Context, arg: &CallArg) -> Value {
    match arg {
        CallArg::Var(name) => ctx.get(name).unwrap_or(Value::Null),
        CallArg::Str(s) => Value::String(s.clone()),
        CallArg::Number(v) => v.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use std::rc::Rc;

    #[test]
    fn test_simple_placeholder() {
        let engine = Engine::compile("");
        let ctx = Context::new(vec![Rc::new(crate::pairs!("name" => "world")) as _]);
        assert_eq!(render(&engine, &ctx, "Hello $name!"), "Hello world!");
    }

    #[test]
    fn test_dollar_escape() {
        let engine = Engine::compile("");
        let ctx = Context::new(Vec::new());
        assert_eq!(render(&engine, &ctx, "$$5"), "$5");
    }

    #[test]
    fn test_modifier_chain_upper_trim() {
        let engine = Engine::compile("");
        let ctx = Context::new(vec![Rc::new(crate::pairs!("name" => "  bob  ")) as _]);
        assert_eq!(render(&engine, &ctx, "$name|trim|upper"), "BOB");
    }

    #[test]
    fn test_missing_variable_builtin_modifier_keeps_placeholder() {
        let engine = Engine::compile("");
        let ctx = Context::new(Vec::new());
        assert_eq!(render(&engine, &ctx, "$missing|upper"), "$missing|upper");
    }

    #[test]
    fn test_function_call_syntax() {
        let engine = Engine::compile("");
        let ctx = Context::new(Vec::new());
        assert_eq!(render(&engine, &ctx, "$upper(\"hi\")"), "HI");
    }
}
