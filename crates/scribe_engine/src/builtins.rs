//! The built-in function library, registered into every [crate::EngineBuilder]
//! by default. Grouped the way the catalog is specified: strings, encoding,
//! type conversion, math, collections, logical/misc, time, debug.

use crate::{
    registry::{Arguments, FunctionRegistry},
    value::Value,
};
use chrono::{DateTime, Utc};
use itertools::Itertools;

pub fn register_all(registry: &FunctionRegistry) {
    register_strings(registry);
    register_encoding(registry);
    register_conversion(registry);
    register_math(registry);
    register_collections(registry);
    register_logical(registry);
    register_time(registry);
    register_debug(registry);
}

fn register_strings(r: &FunctionRegistry) {
    r.register("upper", Box::new(|a: &mut Arguments<'_>| {
        Value::String(a.pop::<String>().to_uppercase())
    }));
    r.register("lower", Box::new(|a: &mut Arguments<'_>| {
        Value::String(a.pop::<String>().to_lowercase())
    }));
    r.register("title", Box::new(|a: &mut Arguments<'_>| {
        let s: String = a.pop();
        Value::String(
            s.split_whitespace()
                .map(title_case_word)
                .collect::<Vec<_>>()
                .join(" "),
        )
    }));
    r.register("trim", Box::new(|a: &mut Arguments<'_>| {
        Value::String(a.pop::<String>().trim().to_owned())
    }));
    r.register("trimLeft", Box::new(|a: &mut Arguments<'_>| {
        let s: String = a.pop();
        let cutset: String = a.pop();
        Value::String(s.trim_start_matches(|c| cutset.contains(c)).to_owned())
    }));
    r.register("trimRight", Box::new(|a: &mut Arguments<'_>| {
        let s: String = a.pop();
        let cutset: String = a.pop();
        Value::String(s.trim_end_matches(|c| cutset.contains(c)).to_owned())
    }));
    r.register("trimPrefix", Box::new(|a: &mut Arguments<'_>| {
        let s: String = a.pop();
        let prefix: String = a.pop();
        Value::String(s.strip_prefix(prefix.as_str()).unwrap_or(&s).to_owned())
    }));
    r.register("trimSuffix", Box::new(|a: &mut Arguments<'_>| {
        let s: String = a.pop();
        let suffix: String = a.pop();
        Value::String(s.strip_suffix(suffix.as_str()).unwrap_or(&s).to_owned())
    }));
    r.register("replace", Box::new(|a: &mut Arguments<'_>| {
        let s: String = a.pop();
        let old: String = a.pop();
        let new: String = a.pop();
        Value::String(s.replace(old.as_str(), &new))
    }));
    r.register("contains", Box::new(|a: &mut Arguments<'_>| {
        let s: String = a.pop();
        let sub: String = a.pop();
        Value::Bool(s.contains(sub.as_str()))
    }));
    r.register("hasPrefix", Box::new(|a: &mut Arguments<'_>| {
        let s: String = a.pop();
        let p: String = a.pop();
        Value::Bool(s.starts_with(p.as_str()))
    }));
    r.register("hasSuffix", Box::new(|a: &mut Arguments<'_>| {
        let s: String = a.pop();
        let p: String = a.pop();
        Value::Bool(s.ends_with(p.as_str()))
    }));
    r.register("split", Box::new(|a: &mut Arguments<'_>| {
        let s: String = a.pop();
        let sep: String = a.pop();
        let parts = if sep.is_empty() {
            s.chars().map(|c| Value::String(c.to_string())).collect()
        } else {
            s.split(sep.as_str())
                .map(|p| Value::String(p.to_owned()))
                .collect()
        };
        Value::Array(parts)
    }));
    r.register("repeat", Box::new(|a: &mut Arguments<'_>| {
        let s: String = a.pop();
        let n: i64 = a.pop();
        Value::String(s.repeat(n.max(0) as usize))
    }));
    r.register("sprintf", Box::new(|a: &mut Arguments<'_>| {
        let fmt: String = a.pop();
        let mut rest = Vec::new();
        while a.remaining() > 0 {
            rest.push(a.pop_value());
        }
        Value::String(sprintf(&fmt, &rest))
    }));
    r.register("join", Box::new(|a: &mut Arguments<'_>| {
        let list: Value = a.pop_value();
        let sep: String = a.pop();
        Value::String(join_values(&list, &sep))
    }));
    r.register("joinAny", Box::new(|a: &mut Arguments<'_>| {
        let any: Value = a.pop_value();
        let sep: String = a.pop();
        Value::String(join_values(&any, &sep))
    }));
}

fn title_case_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Minimal `%s`/`%d`/`%f`/`%v`/`%%` formatter, enough for template authors who
/// expect printf-flavored output. Unknown verbs pass the raw arg through.
fn sprintf(fmt: &str, args: &[Value]) -> String {
    let mut out = String::new();
    let mut args = args.iter();
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('s') | Some('v') => {
                out.push_str(&args.next().cloned().unwrap_or(Value::Null).stringify())
            }
            Some('d') => {
                let v = args.next().cloned().unwrap_or(Value::Null);
                out.push_str(&v.as_i64().unwrap_or(0).to_string());
            }
            Some('f') => {
                let v = args.next().cloned().unwrap_or(Value::Null);
                out.push_str(&v.as_f64().unwrap_or(0.0).to_string());
            }
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    out
}

fn join_values(value: &Value, sep: &str) -> String {
    match value {
        Value::Array(items) => items.iter().map(Value::stringify).join(sep),
        Value::Object(map) => map.values().map(Value::stringify).join(sep),
        Value::String(s) => s.clone(),
        other => other.stringify(),
    }
}

fn register_encoding(r: &FunctionRegistry) {
    r.register("html", Box::new(|a: &mut Arguments<'_>| {
        let s: String = a.pop();
        Value::String(
            s.replace('&', "&amp;")
                .replace('<', "&lt;")
                .replace('>', "&gt;")
                .replace('"', "&quot;")
                .replace('\'', "&#39;"),
        )
    }));
    r.register("url", Box::new(|a: &mut Arguments<'_>| {
        let s: String = a.pop();
        Value::String(url_encode(&s))
    }));
    r.register("json", Box::new(|a: &mut Arguments<'_>| {
        let v: Value = a.pop_value();
        let json: serde_json::Value = v.into();
        Value::String(serde_json::to_string(&json).unwrap_or_default())
    }));
}

fn url_encode(s: &str) -> String {
    let mut out = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn register_conversion(r: &FunctionRegistry) {
    r.register("int", Box::new(|a: &mut Arguments<'_>| {
        Value::Int(a.pop::<i64>())
    }));
    r.register("float", Box::new(|a: &mut Arguments<'_>| {
        Value::Float(a.pop::<f64>())
    }));
    r.register("str", Box::new(|a: &mut Arguments<'_>| {
        Value::String(a.pop::<String>())
    }));
    r.register("bool", Box::new(|a: &mut Arguments<'_>| {
        Value::Bool(a.pop::<bool>())
    }));
}

fn register_math(r: &FunctionRegistry) {
    r.register("abs", Box::new(|a: &mut Arguments<'_>| {
        let v: Value = a.pop_value();
        match v {
            Value::Int(i) => Value::Int(i.abs()),
            other => Value::Float(other.as_f64().unwrap_or(0.0).abs()),
        }
    }));
    r.register("floor", Box::new(|a: &mut Arguments<'_>| {
        Value::Int(a.pop::<f64>().floor() as i64)
    }));
    r.register("ceil", Box::new(|a: &mut Arguments<'_>| {
        Value::Int(a.pop::<f64>().ceil() as i64)
    }));
    r.register("round", Box::new(|a: &mut Arguments<'_>| {
        Value::Int(a.pop::<f64>().round() as i64)
    }));
    r.register("sqrt", Box::new(|a: &mut Arguments<'_>| {
        Value::Float(a.pop::<f64>().sqrt())
    }));
    r.register("pow", Box::new(|a: &mut Arguments<'_>| {
        let base: f64 = a.pop();
        let exp: f64 = a.pop();
        Value::Float(base.powf(exp))
    }));
    r.register("min", Box::new(|a: &mut Arguments<'_>| {
        let x: Value = a.pop_value();
        let y: Value = a.pop_value();
        match (x.as_f64(), y.as_f64()) {
            (Some(a), Some(b)) if a <= b => x,
            (Some(_), Some(_)) => y,
            _ => Value::Null,
        }
    }));
    r.register("max", Box::new(|a: &mut Arguments<'_>| {
        let x: Value = a.pop_value();
        let y: Value = a.pop_value();
        match (x.as_f64(), y.as_f64()) {
            (Some(a), Some(b)) if a >= b => x,
            (Some(_), Some(_)) => y,
            _ => Value::Null,
        }
    }));
}

fn register_collections(r: &FunctionRegistry) {
    r.register("len", Box::new(|a: &mut Arguments<'_>| {
        Value::Int(a.pop_value().len().unwrap_or(0) as i64)
    }));
    r.register("count", Box::new(|a: &mut Arguments<'_>| {
        Value::Int(a.pop_value().len().unwrap_or(0) as i64)
    }));
    r.register("keys", Box::new(|a: &mut Arguments<'_>| {
        match a.pop_value() {
            Value::Object(map) => {
                let mut keys: Vec<String> = map.into_keys().collect();
                keys.sort();
                Value::Array(keys.into_iter().map(Value::String).collect())
            }
            _ => Value::Array(Vec::new()),
        }
    }));
    r.register("values", Box::new(|a: &mut Arguments<'_>| match a.pop_value() {
        Value::Object(map) => Value::Array(map.into_values().collect()),
        Value::Array(items) => Value::Array(items),
        _ => Value::Array(Vec::new()),
    }));
    r.register("first", Box::new(|a: &mut Arguments<'_>| match a.pop_value() {
        Value::Array(items) => items.into_iter().next().unwrap_or(Value::Null),
        Value::String(s) => s
            .chars()
            .next()
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }));
    r.register("last", Box::new(|a: &mut Arguments<'_>| match a.pop_value() {
        Value::Array(items) => items.into_iter().next_back().unwrap_or(Value::Null),
        Value::String(s) => s
            .chars()
            .next_back()
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }));
    r.register("slice", Box::new(|a: &mut Arguments<'_>| {
        let v: Value = a.pop_value();
        let start: i64 = a.pop();
        let end: i64 = a.pop();
        slice_value(&v, start, end)
    }));
}

fn slice_value(value: &Value, start: i64, end: i64) -> Value {
    match value {
        Value::Array(items) => {
            let len = items.len() as i64;
            let start = start.clamp(0, len) as usize;
            let end = end.clamp(0, len) as usize;
            if start >= end {
                Value::Array(Vec::new())
            } else {
                Value::Array(items[start..end].to_vec())
            }
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len() as i64;
            let start = start.clamp(0, len) as usize;
            let end = end.clamp(0, len) as usize;
            if start >= end {
                Value::String(String::new())
            } else {
                Value::String(chars[start..end].iter().collect())
            }
        }
        _ => Value::Null,
    }
}

fn register_logical(r: &FunctionRegistry) {
    r.register("default", Box::new(|a: &mut Arguments<'_>| {
        let v: Value = a.pop_value();
        let fallback: Value = a.pop_value();
        if v.to_bool() {
            v
        } else {
            fallback
        }
    }));
    r.register("not", Box::new(|a: &mut Arguments<'_>| {
        Value::Bool(!a.pop_value().to_bool())
    }));
    r.register("coalesce", Box::new(|a: &mut Arguments<'_>| {
        while a.remaining() > 0 {
            let v = a.pop_value();
            if !matches!(v, Value::Null) {
                return v;
            }
        }
        Value::Null
    }));
    r.register("defined", Box::new(|a: &mut Arguments<'_>| {
        Value::Bool(!matches!(a.pop_value(), Value::Null))
    }));
    r.register("ternary", Box::new(|a: &mut Arguments<'_>| {
        let cond = a.pop_value().to_bool();
        let then = a.pop_value();
        let otherwise = a.pop_value();
        if cond {
            then
        } else {
            otherwise
        }
    }));
}

fn register_time(r: &FunctionRegistry) {
    r.register("now", Box::new(|_: &mut Arguments<'_>| Value::Instant(Utc::now())));
    r.register("date", Box::new(|a: &mut Arguments<'_>| {
        let layout: String = a.pop();
        let v: Value = a.pop_value();
        match parse_instant(&v) {
            Some(instant) => Value::String(format_with_go_layout(&instant, &layout)),
            None => Value::String(String::new()),
        }
    }));
}

fn parse_instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Instant(dt) => Some(*dt),
        Value::Null => None,
        Value::Int(unix) => DateTime::from_timestamp(*unix, 0),
        Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(naive) =
                chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
            {
                return Some(naive.and_utc());
            }
            if let Ok(date) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
            }
            None
        }
        _ => None,
    }
}

/// Translates the handful of Go reference-time layout tokens templates are
/// likely to use into `chrono::format::strftime` specifiers. Unrecognized
/// layout text passes through unchanged.
fn format_with_go_layout(instant: &DateTime<Utc>, layout: &str) -> String {
    let strftime = layout
        .replace("2006", "%Y")
        .replace("01", "%m")
        .replace("02", "%d")
        .replace("15", "%H")
        .replace("04", "%M")
        .replace("05", "%S");
    instant.format(&strftime).to_string()
}

fn register_debug(r: &FunctionRegistry) {
    r.register("dump", Box::new(|a: &mut Arguments<'_>| {
        Value::String(format!("{:?}", a.pop_value()))
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    fn call(registry: &FunctionRegistry, name: &str, args: Vec<Value>) -> Value {
        let ctx = Context::new(Vec::new());
        registry.call(name, args, &ctx)
    }

    #[test]
    fn test_upper_lower_title() {
        let r = FunctionRegistry::default();
        register_all(&r);
        assert_eq!(
            call(&r, "upper", vec![Value::String("ab".into())]),
            Value::String("AB".into())
        );
        assert_eq!(
            call(&r, "title", vec![Value::String("hello world".into())]),
            Value::String("Hello World".into())
        );
    }

    #[test]
    fn test_join_and_join_any() {
        let r = FunctionRegistry::default();
        register_all(&r);
        let list = Value::Array(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(
            call(&r, "joinAny", vec![list, Value::String(",".into())]),
            Value::String("1,2".into())
        );
    }

    #[test]
    fn test_slice_clamps_out_of_range() {
        let r = FunctionRegistry::default();
        register_all(&r);
        let list = Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let result = call(
            &r,
            "slice",
            vec![list, Value::Int(-5), Value::Int(100)],
        );
        assert_eq!(
            result,
            Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[test]
    fn test_slice_start_ge_end_is_empty() {
        let r = FunctionRegistry::default();
        register_all(&r);
        let list = Value::Array(vec![Value::Int(1), Value::Int(2)]);
        let result = call(&r, "slice", vec![list, Value::Int(2), Value::Int(1)]);
        assert_eq!(result, Value::Array(Vec::new()));
    }

    #[test]
    fn test_min_max_non_numeric_is_null() {
        let r = FunctionRegistry::default();
        register_all(&r);
        assert_eq!(
            call(
                &r,
                "min",
                vec![Value::String("x".into()), Value::Int(1)]
            ),
            Value::Null
        );
    }

    #[test]
    fn test_default_falls_back_on_falsy() {
        let r = FunctionRegistry::default();
        register_all(&r);
        assert_eq!(
            call(&r, "default", vec![Value::Int(0), Value::Int(9)]),
            Value::Int(9)
        );
        assert_eq!(
            call(&r, "default", vec![Value::Int(5), Value::Int(9)]),
            Value::Int(5)
        );
    }

    #[test]
    fn test_coalesce_first_non_null() {
        let r = FunctionRegistry::default();
        register_all(&r);
        assert_eq!(
            call(
                &r,
                "coalesce",
                vec![Value::Null, Value::Null, Value::Int(3)]
            ),
            Value::Int(3)
        );
    }

    #[test]
    fn test_date_parses_ymd_layout() {
        let r = FunctionRegistry::default();
        register_all(&r);
        let out = call(
            &r,
            "date",
            vec![
                Value::String("%Y-%m-%d".into()),
                Value::String("2024-01-02".into()),
            ],
        );
        assert_eq!(out, Value::String("2024-01-02".into()));
    }
}
