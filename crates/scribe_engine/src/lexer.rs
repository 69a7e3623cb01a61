//! Tokenizer for the content of a `<? ... ?>` code block.

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Ident(String),
    Var(String),
    Str(String),
    Int(i64),
    Float(f64),
    /// `==` `!=` `<=` `>=` `&&` `||` `++` `--` `:=` `+=` `-=` `*=` `/=` `??`
    Op2(&'static str),
    /// `+ - * / % . < > = ! ? : ( ) { } [ ] ,`
    Op1(char),
    /// Statement separator: `;` or `\n`. Runs collapse to one token.
    Semi,
    /// A bare `$` not followed by an identifier
    Dollar,
}

/// Tokenize a code-block body. Never fails: unknown bytes are skipped,
/// unterminated strings are closed at end of input.
pub fn tokenize(src: &str) -> Vec<Token> {
    let mut lexer = Lexer {
        chars: src.chars().collect(),
        pos: 0,
        tokens: Vec::new(),
    };
    lexer.run();
    lexer.tokens
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    tokens: Vec<Token>,
}

const TWO_CHAR_OPS: &[&str] = &[
    "==", "!=", "<=", ">=", "&&", "||", "++", "--", ":=", "+=", "-=", "*=",
    "/=", "??",
];

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn push_semi(&mut self) {
        if !matches!(self.tokens.last(), Some(Token::Semi) | None) {
            self.tokens.push(Token::Semi);
        }
    }

    fn run(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' => {
                    self.advance();
                }
                '\n' => {
                    self.advance();
                    self.push_semi();
                }
                ';' => {
                    self.advance();
                    self.push_semi();
                }
                '/' if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                '$' => self.lex_dollar(),
                '"' | '\'' => self.lex_string(c),
                c if c.is_ascii_digit() => self.lex_number(),
                c if c.is_alphabetic() || c == '_' => self.lex_ident(),
                _ => self.lex_symbol(),
            }
        }
    }

    fn lex_dollar(&mut self) {
        self.advance(); // consume '$'
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_')
        {
            self.advance();
        }
        if self.pos == start {
            self.tokens.push(Token::Dollar);
        } else {
            let name: String = self.chars[start..self.pos].iter().collect();
            self.tokens.push(Token::Var(name));
        }
    }

    fn lex_ident(&mut self) {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_')
        {
            self.advance();
        }
        let ident: String = self.chars[start..self.pos].iter().collect();
        self.tokens.push(Token::Ident(ident));
    }

    fn lex_number(&mut self) {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }
        let mut is_float = false;
        if self.peek() == Some('.')
            && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit())
        {
            is_float = true;
            self.advance();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if is_float {
            self.tokens
                .push(Token::Float(text.parse().unwrap_or_default()));
        } else {
            match text.parse::<i64>() {
                Ok(i) => self.tokens.push(Token::Int(i)),
                // Overflow: saturate to the integer max
                Err(_) => self.tokens.push(Token::Int(i64::MAX)),
            }
        }
    }

    fn lex_string(&mut self, quote: char) {
        self.advance(); // opening quote
        let mut out = String::new();
        loop {
            match self.advance() {
                None => break,
                Some(c) if c == quote => break,
                Some('\\') => match self.advance() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('\\') => out.push('\\'),
                    Some('"') => out.push('"'),
                    Some('\'') => out.push('\''),
                    // Unknown escape: preserve the backslash and character
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => out.push('\\'),
                },
                Some(c) => out.push(c),
            }
        }
        self.tokens.push(Token::Str(out));
    }

    fn lex_symbol(&mut self) {
        if let Some(next) = self.peek_at(1) {
            let pair: String = [self.peek().unwrap(), next].into_iter().collect();
            if let Some(op) = TWO_CHAR_OPS.iter().find(|op| ***op == pair) {
                self.advance();
                self.advance();
                self.tokens.push(Token::Op2(op));
                return;
            }
        }
        const SINGLE: &[char] = &[
            '+', '-', '*', '/', '%', '.', '<', '>', '=', '!', '?', ':', '(',
            ')', '{', '}', '[', ']', ',',
        ];
        let c = self.advance().unwrap();
        if SINGLE.contains(&c) {
            self.tokens.push(Token::Op1(c));
        }
        // Unknown single bytes are silently skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_assignment() {
        let tokens = tokenize("$x = 5");
        assert_eq!(
            tokens,
            vec![Token::Var("x".into()), Token::Op1('='), Token::Int(5)]
        );
    }

    #[test]
    fn test_tokenize_two_char_ops() {
        let tokens = tokenize("$x += 1; $y == $z");
        assert_eq!(
            tokens,
            vec![
                Token::Var("x".into()),
                Token::Op2("+="),
                Token::Int(1),
                Token::Semi,
                Token::Var("y".into()),
                Token::Op2("=="),
                Token::Var("z".into()),
            ]
        );
    }

    #[test]
    fn test_tokenize_string_escapes() {
        let tokens = tokenize(r#""a\nb\\c\q""#);
        assert_eq!(tokens, vec![Token::Str("a\nb\\c\\q".into())]);
    }

    #[test]
    fn test_tokenize_overflow_saturates() {
        let tokens = tokenize("99999999999999999999");
        assert_eq!(tokens, vec![Token::Int(i64::MAX)]);
    }

    #[test]
    fn test_tokenize_comment() {
        let tokens = tokenize("$x // comment\n$y");
        assert_eq!(
            tokens,
            vec![
                Token::Var("x".into()),
                Token::Semi,
                Token::Var("y".into()),
            ]
        );
    }

    #[test]
    fn test_tokenize_consecutive_separators_collapse() {
        let tokens = tokenize("$x;\n\n;$y");
        assert_eq!(
            tokens,
            vec![
                Token::Var("x".into()),
                Token::Semi,
                Token::Var("y".into()),
            ]
        );
    }

    #[test]
    fn test_tokenize_bare_dollar() {
        let tokens = tokenize("$ +");
        assert_eq!(tokens, vec![Token::Dollar, Token::Op1('+')]);
    }
}
