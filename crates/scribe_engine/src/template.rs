//! The template-level parser: interleaves raw text with `<? ... ?>` code
//! blocks and recursively assembles the nested AST (for/if/switch bodies).

use crate::{
    ast::{Expr, Literal, Node, PathSegment, Stmt, SwitchCase, TextPart, VarPath},
    lexer::tokenize,
    parser::{classify, BlockOpener},
};
use winnow::{
    ModalResult, Parser,
    token::take_while,
};

/// Compile a template's top-level source into a node list. Never fails:
/// unmatched closing tags are silently ignored, malformed code blocks fall
/// back to an empty statement list.
pub fn parse(source: &str) -> Vec<Node> {
    let mut src = source;
    let (nodes, _) = parse_nodes(&mut src, ParseMode::Top);
    nodes
}

#[derive(Clone, Copy, PartialEq)]
enum ParseMode {
    /// Outermost call: boundary tokens (bare `}`, `case`, `default`, `else`)
    /// are unmatched here and silently ignored.
    Top,
    /// Body of an if/for/while: stop at a bare `}`, `}else{`, or
    /// `}else if(...){`.
    Body,
    /// Body of a switch case/default: stop at a bare `}`, `case ...:`, or
    /// `default:`.
    SwitchBody,
}

enum Stop {
    EndOfInput,
    Close,
    CloseElse,
    CloseElseIf(Expr),
    Case(Vec<Expr>),
    Default,
}

fn parse_nodes(src: &mut &str, mode: ParseMode) -> (Vec<Node>, Stop) {
    let mut nodes = Vec::new();
    loop {
        match src.find("<?") {
            Some(idx) => {
                let text = &src[..idx];
                if !text.is_empty() {
                    nodes.push(Node::Text(parse_text_parts(text)));
                }
                *src = &src[idx + 2..];
            }
            None => {
                if !src.is_empty() {
                    nodes.push(Node::Text(parse_text_parts(src)));
                }
                *src = "";
                return (nodes, Stop::EndOfInput);
            }
        }

        let close = src.find("?>").unwrap_or(src.len());
        let code = &src[..close];
        *src = if close >= src.len() {
            ""
        } else {
            &src[close + 2..]
        };
        // Consume a single trailing newline immediately after `?>`
        if let Some(rest) = src.strip_prefix('\n') {
            *src = rest;
        } else if let Some(rest) = src.strip_prefix("\r\n") {
            *src = rest;
        }

        let tokens = tokenize(code.trim());
        match classify(&tokens) {
            BlockOpener::Stmts(stmts) => push_stmts_lifting_includes(&mut nodes, stmts),
            BlockOpener::If(cond) => {
                nodes.push(parse_if_chain(cond, src));
            }
            BlockOpener::For {
                key,
                value,
                iterable,
            } => {
                let (body, reason) = parse_nodes(src, ParseMode::Body);
                consume_unexpected(reason);
                nodes.push(Node::ForRange {
                    key: key.map(Into::into),
                    value: value.into(),
                    iterable,
                    body,
                });
            }
            BlockOpener::ForC { init, cond, post } => {
                let (body, reason) = parse_nodes(src, ParseMode::Body);
                consume_unexpected(reason);
                nodes.push(Node::ForC {
                    init,
                    cond,
                    post,
                    body,
                });
            }
            BlockOpener::Switch(value) => {
                let (cases, default) = parse_switch_body(src);
                nodes.push(Node::Switch {
                    value,
                    cases,
                    default,
                });
            }
            // These are only meaningful when returned from a nested call;
            // seeing one directly means it's unmatched in this context.
            BlockOpener::Close => match mode {
                ParseMode::Body | ParseMode::SwitchBody => {
                    return (nodes, Stop::Close);
                }
                ParseMode::Top => {}
            },
            BlockOpener::CloseElse => match mode {
                ParseMode::Body => return (nodes, Stop::CloseElse),
                _ => {}
            },
            BlockOpener::CloseElseIf(cond) => match mode {
                ParseMode::Body => return (nodes, Stop::CloseElseIf(cond)),
                _ => {}
            },
            BlockOpener::Case(matches) => match mode {
                ParseMode::SwitchBody => return (nodes, Stop::Case(matches)),
                _ => {}
            },
            BlockOpener::Default => match mode {
                ParseMode::SwitchBody => return (nodes, Stop::Default),
                _ => {}
            },
        }

        if src.is_empty() {
            return (nodes, Stop::EndOfInput);
        }
    }
}

/// A nested body stopped on a boundary we weren't expecting (e.g. an `else`
/// inside a for loop). Malformed input; nothing to do but move on.
fn consume_unexpected(_reason: Stop) {}

/// Lift any `include(...)`/`require(...)` call out of a statement list into
/// its own sibling `Node::Include`, wherever in the list it appears, so the
/// included file's nodes splice into the output stream at the right point.
/// The statements before and after it (if any) keep their own `Node::Stmts`.
fn push_stmts_lifting_includes(nodes: &mut Vec<Node>, stmts: Vec<Stmt>) {
    let mut pending = Vec::new();
    for stmt in stmts {
        match include_path(&stmt) {
            Some(path) => {
                if !pending.is_empty() {
                    nodes.push(Node::Stmts(std::mem::take(&mut pending)));
                }
                nodes.push(Node::Include(path));
            }
            None => pending.push(stmt),
        }
    }
    if !pending.is_empty() {
        nodes.push(Node::Stmts(pending));
    }
}

/// A bare `include(path)`/`require(path)` call, parsed like any other
/// function-call statement since the grammar has no dedicated syntax for
/// it; recognized here by name so it can be lifted to a `Node::Include`.
fn include_path(stmt: &Stmt) -> Option<Expr> {
    if let Stmt::Expr(Expr::Call(name, args)) = stmt {
        if (name.as_str() == "include" || name.as_str() == "require")
            && args.len() == 1
        {
            return Some(args[0].clone());
        }
    }
    None
}

fn parse_if_chain(cond: Expr, src: &mut &str) -> Node {
    let (then_body, reason) = parse_nodes(src, ParseMode::Body);
    let else_body = match reason {
        Stop::Close | Stop::EndOfInput => Vec::new(),
        Stop::CloseElse => {
            let (body, _) = parse_nodes(src, ParseMode::Body);
            body
        }
        Stop::CloseElseIf(next_cond) => vec![parse_if_chain(next_cond, src)],
        Stop::Case(_) | Stop::Default => Vec::new(),
    };
    Node::If {
        cond,
        then_body,
        else_body,
    }
}

fn parse_switch_body(src: &mut &str) -> (Vec<SwitchCase>, Option<Vec<Node>>) {
    let mut cases: Vec<SwitchCase> = Vec::new();
    let mut default: Option<Vec<Node>> = None;
    // Discard anything before the first case/default label (malformed, but
    // don't crash).
    let (_, mut reason) = parse_nodes(src, ParseMode::SwitchBody);
    loop {
        match reason {
            Stop::Case(matches) => {
                let (body, next) = parse_nodes(src, ParseMode::SwitchBody);
                cases.push(SwitchCase { matches, body });
                reason = next;
            }
            Stop::Default => {
                let (body, next) = parse_nodes(src, ParseMode::SwitchBody);
                default = Some(body);
                reason = next;
            }
            Stop::Close | Stop::EndOfInput => break,
            Stop::CloseElse | Stop::CloseElseIf(_) => break,
        }
    }
    (cases, default)
}

// ---------------------------------------------------------------------
// Raw-text `$path` placeholder pre-scan
// ---------------------------------------------------------------------

/// Scan a run of plain text, splitting it into literal runs and `$path`
/// placeholders. `$$` collapses to a literal `$`; a trailing or otherwise
/// ambiguous `$` is kept as a literal.
pub fn parse_text_parts(input: &str) -> Vec<TextPart> {
    let mut s = input;
    let mut parts: Vec<TextPart> = Vec::new();
    while !s.is_empty() {
        let part = if s.starts_with('$') {
            match placeholder.parse_next(&mut s) {
                Ok(part) => part,
                Err(_) => {
                    let c = s.chars().next().unwrap();
                    s = &s[c.len_utf8()..];
                    TextPart::Literal(c.to_string())
                }
            }
        } else {
            literal_run.parse_next(&mut s).unwrap_or_else(|_: winnow::error::ErrMode<winnow::error::ContextError>| {
                let rest = s;
                s = "";
                TextPart::Literal(rest.to_string())
            })
        };
        match (&part, parts.last_mut()) {
            (TextPart::Literal(new), Some(TextPart::Literal(prev))) => {
                prev.push_str(new);
            }
            _ => parts.push(part),
        }
    }
    parts
}

fn literal_run(input: &mut &str) -> ModalResult<TextPart> {
    let s: &str = take_while(1.., |c: char| c != '$').parse_next(input)?;
    Ok(TextPart::Literal(s.to_owned()))
}

fn placeholder(input: &mut &str) -> ModalResult<TextPart> {
    '$'.parse_next(input)?;
    if input.starts_with('$') {
        '$'.parse_next(input)?;
        return Ok(TextPart::Literal("$".to_owned()));
    }
    let name: &str =
        take_while(1.., |c: char| c.is_alphanumeric() || c == '_')
            .parse_next(input)?;
    let mut path = VarPath::simple(name);
    loop {
        if let Some(rest) = input.strip_prefix('.') {
            let mut cursor = rest;
            match take_while::<_, _, winnow::error::ContextError>(
                1..,
                |c: char| c.is_alphanumeric() || c == '_',
            )
            .parse_next(&mut cursor)
            {
                Ok(field) if !field.is_empty() => {
                    path.segments.push(PathSegment::Field(field.into()));
                    *input = cursor;
                }
                _ => break,
            }
        } else if let Some(rest) = input.strip_prefix('[') {
            let mut cursor = rest;
            if let Some(seg) = parse_index_segment(&mut cursor) {
                path.segments.push(seg);
                *input = cursor;
            } else {
                break;
            }
        } else {
            break;
        }
    }
    Ok(TextPart::Placeholder(path))
}

/// Parse one `[0]` / `["key"]` / `['key']` index segment. Expects `cursor`
/// positioned just after the `[`; consumes through the matching `]`.
fn parse_index_segment(cursor: &mut &str) -> Option<PathSegment> {
    if let Some(rest) = cursor.strip_prefix('"') {
        let end = rest.find('"')?;
        let key = rest[..end].to_owned();
        *cursor = &rest[end + 1..];
        *cursor = cursor.strip_prefix(']')?;
        return Some(PathSegment::Index(Box::new(Expr::Lit(Literal::Str(
            key,
        )))));
    }
    if let Some(rest) = cursor.strip_prefix('\'') {
        let end = rest.find('\'')?;
        let key = rest[..end].to_owned();
        *cursor = &rest[end + 1..];
        *cursor = cursor.strip_prefix(']')?;
        return Some(PathSegment::Index(Box::new(Expr::Lit(Literal::Str(
            key,
        )))));
    }
    let digits_end = cursor.find(|c: char| !c.is_ascii_digit())?;
    if digits_end == 0 {
        return None;
    }
    let n: i64 = cursor[..digits_end].parse().ok()?;
    *cursor = &cursor[digits_end..];
    *cursor = cursor.strip_prefix(']')?;
    Some(PathSegment::Index(Box::new(Expr::Lit(Literal::Int(n)))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::PathSegment;

    #[test]
    fn test_parse_text_parts_simple() {
        let parts = parse_text_parts("Hello $name!");
        assert_eq!(
            parts,
            vec![
                TextPart::Literal("Hello ".into()),
                TextPart::Placeholder(VarPath::simple("name")),
                TextPart::Literal("!".into()),
            ]
        );
    }

    #[test]
    fn test_parse_text_parts_dollar_escape() {
        let parts = parse_text_parts("$$5");
        assert_eq!(parts, vec![TextPart::Literal("$5".into())]);
    }

    #[test]
    fn test_parse_text_parts_trailing_dollar() {
        let parts = parse_text_parts("cost: $");
        assert_eq!(parts, vec![TextPart::Literal("cost: $".into())]);
    }

    #[test]
    fn test_parse_text_parts_dotted_and_indexed() {
        let parts = parse_text_parts(r#"$p.X,$m["key"],$a[0]"#);
        let mut path = VarPath::simple("p");
        path.segments.push(PathSegment::Field("X".into()));
        assert_eq!(parts[0], TextPart::Placeholder(path));
    }

    #[test]
    fn test_parse_simple_interpolation() {
        let nodes = parse("Hello $name!");
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn test_parse_if_else() {
        let nodes = parse("<? if($x){ ?>a<? }else{ ?>b<? } ?>");
        assert_eq!(nodes.len(), 1);
        match &nodes[0] {
            Node::If {
                then_body,
                else_body,
                ..
            } => {
                assert_eq!(then_body.len(), 1);
                assert_eq!(else_body.len(), 1);
            }
            other => panic!("expected If, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_switch() {
        let nodes = parse(
            r#"<? switch($x){ ?><? case "a","b": ?>AB<? case "c": ?>C<? } ?>"#,
        );
        match &nodes[0] {
            Node::Switch { cases, default, .. } => {
                assert_eq!(cases.len(), 2);
                assert!(default.is_none());
            }
            other => panic!("expected Switch, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_include_alone_in_block() {
        let nodes = parse(r#"<? include("a.tpl"); ?>"#);
        assert_eq!(nodes.len(), 1);
        match &nodes[0] {
            Node::Include(Expr::Lit(Literal::Str(path))) => assert_eq!(path, "a.tpl"),
            other => panic!("expected Include, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_include_followed_by_statement_in_same_block() {
        // The trailing statement must not be silently dropped: it surfaces
        // as its own Stmts node after the lifted Include.
        let nodes = parse(r#"<? include("a.tpl"); $y = 1; ?>"#);
        assert_eq!(nodes.len(), 2);
        assert!(matches!(&nodes[0], Node::Include(_)));
        match &nodes[1] {
            Node::Stmts(stmts) => assert_eq!(stmts.len(), 1),
            other => panic!("expected Stmts, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_statement_followed_by_include_in_same_block() {
        // A statement before the include must not swallow the include into
        // a plain (no-op) function-call statement.
        let nodes = parse(r#"<? $x = 1; include("a.tpl"); ?>"#);
        assert_eq!(nodes.len(), 2);
        match &nodes[0] {
            Node::Stmts(stmts) => assert_eq!(stmts.len(), 1),
            other => panic!("expected Stmts, got {other:?}"),
        }
        assert!(matches!(&nodes[1], Node::Include(_)));
    }

    #[test]
    fn test_parse_for_range() {
        let nodes =
            parse("<? for($v := range $items){ ?>$v<? } ?>");
        match &nodes[0] {
            Node::ForRange { key, value, .. } => {
                assert!(key.is_none());
                assert_eq!(value.as_str(), "v");
            }
            other => panic!("expected ForRange, got {other:?}"),
        }
    }
}
