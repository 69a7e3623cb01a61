//! The compiled representation of a template: text interleaved with parsed
//! code blocks.

use itertools::Itertools;
use std::fmt::{self, Display};

/// A validated identifier (bare variable/function name). Parsing is
/// permissive at the lexer level; this type exists so call sites don't have
/// to carry raw `String`s around for something that's morally a token.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Identifier(pub String);

impl Identifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A literal value appearing directly in source
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(fl) => write!(f, "{fl}"),
            Self::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// One segment of a dotted/indexed path: `$x.field[0]["key"][$dyn]`
#[derive(Clone, Debug, PartialEq)]
pub enum PathSegment {
    Field(Identifier),
    Index(Box<Expr>),
}

/// A variable reference: a root name plus zero or more path segments
#[derive(Clone, Debug, PartialEq)]
pub struct VarPath {
    pub root: Identifier,
    pub segments: Vec<PathSegment>,
}

impl VarPath {
    pub fn simple(root: impl Into<Identifier>) -> Self {
        Self {
            root: root.into(),
            segments: Vec::new(),
        }
    }
}

impl Display for VarPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.root)?;
        for segment in &self.segments {
            match segment {
                PathSegment::Field(name) => write!(f, ".{name}")?,
                PathSegment::Index(expr) => write!(f, "[{expr}]")?,
            }
        }
        Ok(())
    }
}

/// Binary operators, in the precedence order the parser climbs
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    Concat,
    Mul,
    Div,
    Mod,
}

impl Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Or => "||",
            Self::And => "&&",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Concat => ".",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnOp {
    Not,
    Neg,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IncDecOp {
    Inc,
    Dec,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompoundOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// An expression in the code-block language
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Lit(Literal),
    Var(VarPath),
    Call(Identifier, Vec<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
    Un(UnOp, Box<Expr>),
    /// Null-coalescing: `left ?? right`
    Coalesce(Box<Expr>, Box<Expr>),
    /// `$var++` / `$var--`, evaluates to the pre-increment value
    IncDec(VarPath, IncDecOp),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    IsSet(VarPath),
    ArrayLit(Vec<Expr>),
    MapLit(Vec<(String, Expr)>),
}

impl Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lit(lit) => write!(f, "{lit}"),
            Self::Var(path) => write!(f, "{path}"),
            Self::Call(name, args) => {
                write!(f, "{name}({})", args.iter().format(", "))
            }
            Self::Bin(op, l, r) => write!(f, "({l} {op} {r})"),
            Self::Un(UnOp::Not, x) => write!(f, "!{x}"),
            Self::Un(UnOp::Neg, x) => write!(f, "-{x}"),
            Self::Coalesce(l, r) => write!(f, "({l} ?? {r})"),
            Self::IncDec(path, IncDecOp::Inc) => write!(f, "{path}++"),
            Self::IncDec(path, IncDecOp::Dec) => write!(f, "{path}--"),
            Self::Ternary(cond, then, els) => {
                write!(f, "({cond} ? {then} : {els})")
            }
            Self::IsSet(path) => write!(f, "isset({path})"),
            Self::ArrayLit(items) => {
                write!(f, "[{}]", items.iter().format(", "))
            }
            Self::MapLit(entries) => {
                write!(
                    f,
                    "{{{}}}",
                    entries
                        .iter()
                        .format_with(", ", |(k, v), fmt| fmt(&format_args!(
                            "{k}: {v}"
                        )))
                )
            }
        }
    }
}

/// A statement inside a single code block
#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Echo(Expr),
    Expr(Expr),
    Assign(VarPath, Expr),
    CompoundAssign(VarPath, CompoundOp, Expr),
    IncDec(VarPath, IncDecOp),
    Break,
    Continue,
}

/// One static piece of a text node: either literal bytes or a `$path`
/// placeholder to resolve at execution time.
#[derive(Clone, Debug, PartialEq)]
pub enum TextPart {
    Literal(String),
    Placeholder(VarPath),
}

/// A single case label within a switch, matching any of several values
#[derive(Clone, Debug, PartialEq)]
pub struct SwitchCase {
    pub matches: Vec<Expr>,
    pub body: Vec<Node>,
}

/// A compiled template node
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Text(Vec<TextPart>),
    Stmts(Vec<Stmt>),
    ForRange {
        key: Option<Identifier>,
        value: Identifier,
        iterable: Expr,
        body: Vec<Node>,
    },
    ForC {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        post: Option<Box<Stmt>>,
        body: Vec<Node>,
    },
    If {
        cond: Expr,
        then_body: Vec<Node>,
        else_body: Vec<Node>,
    },
    Switch {
        value: Expr,
        cases: Vec<SwitchCase>,
        default: Option<Vec<Node>>,
    },
    Include(Expr),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_path_display_with_field_and_index() {
        let path = VarPath {
            root: "user".into(),
            segments: vec![
                PathSegment::Field("name".into()),
                PathSegment::Index(Box::new(Expr::Lit(Literal::Int(0)))),
            ],
        };
        assert_eq!(path.to_string(), "$user.name[0]");
    }

    #[test]
    fn test_expr_display_round_trips_operator_precedence_text() {
        let expr = Expr::Bin(
            BinOp::Add,
            Box::new(Expr::Lit(Literal::Int(1))),
            Box::new(Expr::Bin(
                BinOp::Mul,
                Box::new(Expr::Lit(Literal::Int(2))),
                Box::new(Expr::Lit(Literal::Int(3))),
            )),
        );
        assert_eq!(expr.to_string(), "(1 + (2 * 3))");
    }

    #[test]
    fn test_identifier_from_str_and_string() {
        let a: Identifier = "x".into();
        let b: Identifier = String::from("x").into();
        assert_eq!(a, b);
    }
}
