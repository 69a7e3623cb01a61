//! Recursive-descent parsing over the token stream: expressions (via
//! precedence climbing), single-block statement sequences, and the block
//! "opener" classification the template parser uses to find nesting
//! boundaries.

use crate::{
    ast::{
        BinOp, CompoundOp, Expr, IncDecOp, Literal, PathSegment, Stmt, UnOp,
        VarPath,
    },
    lexer::Token,
};

pub struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat_op1(&mut self, c: char) -> bool {
        if matches!(self.peek(), Some(Token::Op1(x)) if *x == c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_op2(&mut self, s: &str) -> bool {
        if matches!(self.peek(), Some(Token::Op2(x)) if *x == s) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_semi(&mut self) -> bool {
        if matches!(self.peek(), Some(Token::Semi)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_ident(&mut self, name: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(x)) if x == name) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }
}

// ---------------------------------------------------------------------
// Expression parsing (precedence climbing, low to high per SPEC_FULL §4.3)
// ---------------------------------------------------------------------

pub fn parse_expr(cursor: &mut Cursor<'_>) -> Expr {
    parse_ternary(cursor)
}

fn parse_ternary(cursor: &mut Cursor<'_>) -> Expr {
    let cond = parse_coalesce(cursor);
    if cursor.eat_op1('?') {
        let then = parse_ternary(cursor);
        cursor.eat_op1(':');
        let els = parse_ternary(cursor);
        Expr::Ternary(Box::new(cond), Box::new(then), Box::new(els))
    } else {
        cond
    }
}

fn parse_coalesce(cursor: &mut Cursor<'_>) -> Expr {
    let left = parse_or(cursor);
    if cursor.eat_op2("??") {
        let right = parse_coalesce(cursor);
        Expr::Coalesce(Box::new(left), Box::new(right))
    } else {
        left
    }
}

fn parse_or(cursor: &mut Cursor<'_>) -> Expr {
    let mut left = parse_and(cursor);
    while cursor.eat_op2("||") {
        let right = parse_and(cursor);
        left = Expr::Bin(BinOp::Or, Box::new(left), Box::new(right));
    }
    left
}

fn parse_and(cursor: &mut Cursor<'_>) -> Expr {
    let mut left = parse_equality(cursor);
    while cursor.eat_op2("&&") {
        let right = parse_equality(cursor);
        left = Expr::Bin(BinOp::And, Box::new(left), Box::new(right));
    }
    left
}

fn parse_equality(cursor: &mut Cursor<'_>) -> Expr {
    let mut left = parse_relational(cursor);
    loop {
        let op = if cursor.eat_op2("==") {
            BinOp::Eq
        } else if cursor.eat_op2("!=") {
            BinOp::Ne
        } else {
            break;
        };
        let right = parse_relational(cursor);
        left = Expr::Bin(op, Box::new(left), Box::new(right));
    }
    left
}

fn parse_relational(cursor: &mut Cursor<'_>) -> Expr {
    let mut left = parse_additive(cursor);
    loop {
        let op = if cursor.eat_op2("<=") {
            BinOp::Le
        } else if cursor.eat_op2(">=") {
            BinOp::Ge
        } else if cursor.eat_op1('<') {
            BinOp::Lt
        } else if cursor.eat_op1('>') {
            BinOp::Gt
        } else {
            break;
        };
        let right = parse_additive(cursor);
        left = Expr::Bin(op, Box::new(left), Box::new(right));
    }
    left
}

fn parse_additive(cursor: &mut Cursor<'_>) -> Expr {
    let mut left = parse_multiplicative(cursor);
    loop {
        let op = if cursor.eat_op1('+') {
            BinOp::Add
        } else if cursor.eat_op1('-') {
            BinOp::Sub
        } else if cursor.eat_op1('.') {
            BinOp::Concat
        } else {
            break;
        };
        let right = parse_multiplicative(cursor);
        left = Expr::Bin(op, Box::new(left), Box::new(right));
    }
    left
}

fn parse_multiplicative(cursor: &mut Cursor<'_>) -> Expr {
    let mut left = parse_unary(cursor);
    loop {
        let op = if cursor.eat_op1('*') {
            BinOp::Mul
        } else if cursor.eat_op1('/') {
            BinOp::Div
        } else if cursor.eat_op1('%') {
            BinOp::Mod
        } else {
            break;
        };
        let right = parse_unary(cursor);
        left = Expr::Bin(op, Box::new(left), Box::new(right));
    }
    left
}

fn parse_unary(cursor: &mut Cursor<'_>) -> Expr {
    if cursor.eat_op1('!') {
        Expr::Un(UnOp::Not, Box::new(parse_unary(cursor)))
    } else if cursor.eat_op1('-') {
        Expr::Un(UnOp::Neg, Box::new(parse_unary(cursor)))
    } else {
        parse_primary(cursor)
    }
}

fn parse_primary(cursor: &mut Cursor<'_>) -> Expr {
    match cursor.advance().cloned() {
        Some(Token::Int(i)) => Expr::Lit(Literal::Int(i)),
        Some(Token::Float(f)) => Expr::Lit(Literal::Float(f)),
        Some(Token::Str(s)) => Expr::Lit(Literal::Str(s)),
        Some(Token::Var(name)) => {
            let path = parse_var_path_suffix(cursor, name);
            parse_inc_dec_suffix(cursor, path)
        }
        Some(Token::Op1('(')) => {
            let inner = parse_expr(cursor);
            cursor.eat_op1(')');
            inner
        }
        Some(Token::Op1('[')) => parse_array_lit(cursor),
        Some(Token::Op1('{')) => parse_map_lit(cursor),
        Some(Token::Ident(name)) => parse_ident_primary(cursor, name),
        _ => Expr::Lit(Literal::Null),
    }
}

fn parse_ident_primary(cursor: &mut Cursor<'_>, name: String) -> Expr {
    match name.as_str() {
        "true" => Expr::Lit(Literal::Bool(true)),
        "false" => Expr::Lit(Literal::Bool(false)),
        "null" | "nil" => Expr::Lit(Literal::Null),
        "isset" => {
            cursor.eat_op1('(');
            let path = match cursor.advance().cloned() {
                Some(Token::Var(var_name)) => {
                    parse_var_path_suffix(cursor, var_name)
                }
                _ => VarPath::simple(""),
            };
            cursor.eat_op1(')');
            Expr::IsSet(path)
        }
        _ if matches!(cursor.peek(), Some(Token::Op1('('))) => {
            cursor.advance();
            let args = parse_call_args(cursor);
            Expr::Call(name.into(), args)
        }
        _ => Expr::Lit(Literal::Null),
    }
}

fn parse_call_args(cursor: &mut Cursor<'_>) -> Vec<Expr> {
    let mut args = Vec::new();
    if cursor.eat_op1(')') {
        return args;
    }
    loop {
        args.push(parse_expr(cursor));
        if cursor.eat_op1(',') {
            continue;
        }
        cursor.eat_op1(')');
        break;
    }
    args
}

fn parse_array_lit(cursor: &mut Cursor<'_>) -> Expr {
    let mut items = Vec::new();
    if cursor.eat_op1(']') {
        return Expr::ArrayLit(items);
    }
    loop {
        items.push(parse_expr(cursor));
        if cursor.eat_op1(',') {
            if cursor.eat_op1(']') {
                break;
            }
            continue;
        }
        cursor.eat_op1(']');
        break;
    }
    Expr::ArrayLit(items)
}

fn parse_map_lit(cursor: &mut Cursor<'_>) -> Expr {
    let mut entries = Vec::new();
    if cursor.eat_op1('}') {
        return Expr::MapLit(entries);
    }
    loop {
        let key = match cursor.advance().cloned() {
            Some(Token::Ident(name)) => name,
            Some(Token::Str(s)) => s,
            _ => String::new(),
        };
        cursor.eat_op1(':');
        let value = parse_expr(cursor);
        entries.push((key, value));
        if cursor.eat_op1(',') {
            if cursor.eat_op1('}') {
                break;
            }
            continue;
        }
        cursor.eat_op1('}');
        break;
    }
    Expr::MapLit(entries)
}

/// Parse zero or more `.field` / `[expr]` suffixes onto a variable root
fn parse_var_path_suffix(cursor: &mut Cursor<'_>, root: String) -> VarPath {
    let mut path = VarPath::simple(root);
    loop {
        if cursor.eat_op1('.') {
            if let Some(Token::Ident(name)) = cursor.advance().cloned() {
                path.segments.push(PathSegment::Field(name.into()));
            }
        } else if cursor.eat_op1('[') {
            let index = parse_expr(cursor);
            cursor.eat_op1(']');
            path.segments.push(PathSegment::Index(Box::new(index)));
        } else {
            break;
        }
    }
    path
}

fn parse_inc_dec_suffix(cursor: &mut Cursor<'_>, path: VarPath) -> Expr {
    if cursor.eat_op2("++") {
        Expr::IncDec(path, IncDecOp::Inc)
    } else if cursor.eat_op2("--") {
        Expr::IncDec(path, IncDecOp::Dec)
    } else {
        Expr::Var(path)
    }
}

// ---------------------------------------------------------------------
// Statement parsing within one code block's flat token stream
// ---------------------------------------------------------------------

/// Parse a full sequence of `;`/newline-separated statements from a code
/// block body.
pub fn parse_stmts(cursor: &mut Cursor<'_>) -> Vec<Stmt> {
    let mut stmts = Vec::new();
    while cursor.eat_semi() {}
    while !cursor.at_end() {
        if let Some(stmt) = parse_stmt(cursor) {
            stmts.push(stmt);
        }
        while cursor.eat_semi() {}
    }
    stmts
}

/// Parse a single statement, or `None` if the cursor is empty (used for the
/// optional init/post clauses of a C-style for loop).
pub fn parse_stmt(cursor: &mut Cursor<'_>) -> Option<Stmt> {
    if cursor.at_end() {
        return None;
    }
    if cursor.eat_ident("echo") || cursor.eat_ident("print") {
        return Some(Stmt::Echo(parse_expr(cursor)));
    }
    if cursor.eat_ident("break") {
        return Some(Stmt::Break);
    }
    if cursor.eat_ident("continue") {
        return Some(Stmt::Continue);
    }
    if let Some(Token::Var(name)) = cursor.peek().cloned() {
        // Lookahead: is this `$path = `/`:=`/`+=`/... or a bare expression?
        let save = cursor.pos;
        cursor.advance();
        let path = parse_var_path_suffix(cursor, name);
        if cursor.eat_op2("++") {
            return Some(Stmt::IncDec(path, IncDecOp::Inc));
        }
        if cursor.eat_op2("--") {
            return Some(Stmt::IncDec(path, IncDecOp::Dec));
        }
        if cursor.eat_op1('=') || cursor.eat_op2(":=") {
            return Some(Stmt::Assign(path, parse_expr(cursor)));
        }
        for (token, op) in [
            ("+=", CompoundOp::Add),
            ("-=", CompoundOp::Sub),
            ("*=", CompoundOp::Mul),
            ("/=", CompoundOp::Div),
        ] {
            if cursor.eat_op2(token) {
                return Some(Stmt::CompoundAssign(path, op, parse_expr(cursor)));
            }
        }
        // Not an assignment: rewind and parse as a plain expression
        cursor.pos = save;
    }
    Some(Stmt::Expr(parse_expr(cursor)))
}

// ---------------------------------------------------------------------
// Block-opener classification, used by the template parser to find
// nesting boundaries between `<? ?>` tags.
// ---------------------------------------------------------------------

pub enum BlockOpener {
    For {
        key: Option<String>,
        value: String,
        iterable: Expr,
    },
    ForC {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        post: Option<Box<Stmt>>,
    },
    If(Expr),
    Switch(Expr),
    Case(Vec<Expr>),
    Default,
    Close,
    CloseElse,
    CloseElseIf(Expr),
    Stmts(Vec<Stmt>),
}

/// Find the index (within `tokens`, relative to `open`) of the `)` that
/// matches the `(` at `open`.
fn find_matching_paren(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, tok) in tokens.iter().enumerate().skip(open) {
        match tok {
            Token::Op1('(') => depth += 1,
            Token::Op1(')') => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Classify the tokens of one code block
pub fn classify(tokens: &[Token]) -> BlockOpener {
    if tokens.is_empty() {
        return BlockOpener::Stmts(Vec::new());
    }

    // `}`
    if tokens.len() == 1 && tokens[0] == Token::Op1('}') {
        return BlockOpener::Close;
    }
    // `}else{`
    if tokens.len() == 3
        && tokens[0] == Token::Op1('}')
        && matches!(&tokens[1], Token::Ident(s) if s == "else")
        && tokens[2] == Token::Op1('{')
    {
        return BlockOpener::CloseElse;
    }
    // `}else if(cond){`
    if tokens.len() >= 5
        && tokens[0] == Token::Op1('}')
        && matches!(&tokens[1], Token::Ident(s) if s == "else")
        && matches!(&tokens[2], Token::Ident(s) if s == "if")
        && tokens[3] == Token::Op1('(')
    {
        if let Some(close) = find_matching_paren(tokens, 3) {
            if tokens.get(close + 1) == Some(&Token::Op1('{')) {
                let mut cursor = Cursor::new(&tokens[4..close]);
                return BlockOpener::CloseElseIf(parse_expr(&mut cursor));
            }
        }
    }

    if let Token::Ident(name) = &tokens[0] {
        match name.as_str() {
            "if" if tokens.get(1) == Some(&Token::Op1('(')) => {
                if let Some(close) = find_matching_paren(tokens, 1) {
                    let mut cursor = Cursor::new(&tokens[2..close]);
                    return BlockOpener::If(parse_expr(&mut cursor));
                }
            }
            "switch" if tokens.get(1) == Some(&Token::Op1('(')) => {
                if let Some(close) = find_matching_paren(tokens, 1) {
                    let mut cursor = Cursor::new(&tokens[2..close]);
                    return BlockOpener::Switch(parse_expr(&mut cursor));
                }
            }
            "case" => {
                let mut matches_exprs = Vec::new();
                let end = tokens
                    .iter()
                    .position(|t| *t == Token::Op1(':'))
                    .unwrap_or(tokens.len());
                let mut cursor = Cursor::new(&tokens[1..end]);
                loop {
                    matches_exprs.push(parse_expr(&mut cursor));
                    if !cursor.eat_op1(',') {
                        break;
                    }
                }
                return BlockOpener::Case(matches_exprs);
            }
            "default" => return BlockOpener::Default,
            "for" if tokens.get(1) == Some(&Token::Op1('(')) => {
                if let Some(close) = find_matching_paren(tokens, 1) {
                    if tokens.get(close + 1) == Some(&Token::Op1('{')) {
                        return classify_for(&tokens[2..close]);
                    }
                }
            }
            _ => {}
        }
    }

    let mut cursor = Cursor::new(tokens);
    BlockOpener::Stmts(parse_stmts(&mut cursor))
}

fn classify_for(inside: &[Token]) -> BlockOpener {
    // range form: [Var [, Var]] (":=" | "=") "range" expr
    if let Some(range_pos) = inside.iter().position(
        |t| matches!(t, Token::Ident(s) if s == "range"),
    ) {
        // walk backwards from range_pos to find the assign operator
        if range_pos > 0
            && matches!(
                inside[range_pos - 1],
                Token::Op2(":=") | Token::Op1('=')
            )
        {
            let lhs = &inside[..range_pos - 1];
            let (key, value) = match lhs {
                [Token::Var(v)] => (None, v.clone()),
                [Token::Var(k), Token::Op1(','), Token::Var(v)] => {
                    (Some(k.clone()), v.clone())
                }
                _ => (None, String::new()),
            };
            let mut cursor = Cursor::new(&inside[range_pos + 1..]);
            let iterable = parse_expr(&mut cursor);
            return BlockOpener::For {
                key,
                value,
                iterable,
            };
        }
    }

    // C-style: init ; cond ; post  (exactly two top-level semicolons)
    let semi_positions: Vec<usize> = inside
        .iter()
        .enumerate()
        .filter(|(_, t)| **t == Token::Semi)
        .map(|(i, _)| i)
        .collect();
    if semi_positions.len() == 2 {
        let (s1, s2) = (semi_positions[0], semi_positions[1]);
        let init = {
            let mut cursor = Cursor::new(&inside[..s1]);
            parse_stmt(&mut cursor).map(Box::new)
        };
        let cond = if s1 + 1 == s2 {
            None
        } else {
            let mut cursor = Cursor::new(&inside[s1 + 1..s2]);
            Some(parse_expr(&mut cursor))
        };
        let post = {
            let mut cursor = Cursor::new(&inside[s2 + 1..]);
            parse_stmt(&mut cursor).map(Box::new)
        };
        return BlockOpener::ForC { init, cond, post };
    }

    // while form: bare condition expression, no semicolons
    if inside.is_empty() {
        return BlockOpener::ForC {
            init: None,
            cond: None,
            post: None,
        };
    }
    let mut cursor = Cursor::new(inside);
    let cond = parse_expr(&mut cursor);
    BlockOpener::ForC {
        init: None,
        cond: Some(cond),
        post: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn expr(src: &str) -> Expr {
        let tokens = tokenize(src);
        let mut cursor = Cursor::new(&tokens);
        parse_expr(&mut cursor)
    }

    #[test]
    fn test_multiplication_binds_tighter_than_addition() {
        // 2 + 3 * 4  =>  2 + (3 * 4)
        assert_eq!(
            expr("2 + 3 * 4"),
            Expr::Bin(
                BinOp::Add,
                Box::new(Expr::Lit(Literal::Int(2))),
                Box::new(Expr::Bin(
                    BinOp::Mul,
                    Box::new(Expr::Lit(Literal::Int(3))),
                    Box::new(Expr::Lit(Literal::Int(4))),
                )),
            )
        );
    }

    #[test]
    fn test_parens_override_precedence() {
        // (2 + 3) * 4
        assert_eq!(
            expr("(2 + 3) * 4"),
            Expr::Bin(
                BinOp::Mul,
                Box::new(Expr::Bin(
                    BinOp::Add,
                    Box::new(Expr::Lit(Literal::Int(2))),
                    Box::new(Expr::Lit(Literal::Int(3))),
                )),
                Box::new(Expr::Lit(Literal::Int(4))),
            )
        );
    }

    #[test]
    fn test_comparison_binds_looser_than_additive() {
        // 1 + 1 == 2  =>  (1 + 1) == 2
        assert_eq!(
            expr("1 + 1 == 2"),
            Expr::Bin(
                BinOp::Eq,
                Box::new(Expr::Bin(
                    BinOp::Add,
                    Box::new(Expr::Lit(Literal::Int(1))),
                    Box::new(Expr::Lit(Literal::Int(1))),
                )),
                Box::new(Expr::Lit(Literal::Int(2))),
            )
        );
    }

    #[test]
    fn test_ternary_is_right_associative() {
        // a ? b : c ? d : e  =>  a ? b : (c ? d : e)
        let parsed = expr("1 ? 2 : 3 ? 4 : 5");
        match parsed {
            Expr::Ternary(_, _, els) => {
                assert!(matches!(*els, Expr::Ternary(..)));
            }
            other => panic!("expected Ternary, got {other:?}"),
        }
    }

    #[test]
    fn test_coalesce_is_right_associative_and_looser_than_or() {
        let parsed = expr("1 || 0 ?? 2");
        assert!(matches!(parsed, Expr::Coalesce(..)));
    }

    #[test]
    fn test_unary_not_and_neg() {
        assert_eq!(
            expr("!$x"),
            Expr::Un(UnOp::Not, Box::new(Expr::Var(VarPath::simple("x"))))
        );
        assert_eq!(
            expr("-5"),
            Expr::Un(UnOp::Neg, Box::new(Expr::Lit(Literal::Int(5))))
        );
    }

    #[test]
    fn test_dotted_and_indexed_path() {
        let parsed = expr(r#"$user.name["first"]"#);
        match parsed {
            Expr::Var(path) => {
                assert_eq!(path.root.as_str(), "user");
                assert_eq!(path.segments.len(), 2);
                assert!(matches!(&path.segments[0], PathSegment::Field(n) if n.as_str() == "name"));
            }
            other => panic!("expected Var, got {other:?}"),
        }
    }

    #[test]
    fn test_array_and_map_literals() {
        assert_eq!(
            expr("[1, 2]"),
            Expr::ArrayLit(vec![
                Expr::Lit(Literal::Int(1)),
                Expr::Lit(Literal::Int(2)),
            ])
        );
    }

    #[test]
    fn test_compound_assignment_statement() {
        let tokens = tokenize("$x += 5");
        let mut cursor = Cursor::new(&tokens);
        let stmt = parse_stmt(&mut cursor);
        assert_eq!(
            stmt,
            Some(Stmt::CompoundAssign(
                VarPath::simple("x"),
                CompoundOp::Add,
                Expr::Lit(Literal::Int(5)),
            ))
        );
    }

    #[test]
    fn test_classify_if_and_close() {
        use scribe_util::assert_matches;

        let if_tokens = tokenize("if($x){");
        assert_matches!(classify(&if_tokens), BlockOpener::If(_));

        let close_tokens = tokenize("}");
        assert_matches!(classify(&close_tokens), BlockOpener::Close);
    }

    #[test]
    fn test_classify_for_range_vs_for_c() {
        use scribe_util::assert_matches;

        let range_tokens = tokenize("for($v := range $items){");
        assert_matches!(classify(&range_tokens), BlockOpener::For { .. });

        let c_tokens = tokenize("for($i := 0; $i < 3; $i++){");
        assert_matches!(classify(&c_tokens), BlockOpener::ForC { .. });
    }
}
