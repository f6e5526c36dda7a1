//! Lexer for rillscript source text.

use super::parser::ParseError;

/// A lexical token with its source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub line: usize,
    pub kind: TokenKind,
}

/// Token kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),

    Fn,
    Return,
    If,
    Else,
    While,
    For,
    In,
    Break,
    Continue,
    True,
    False,
    Null,
    And,
    Or,
    Not,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    Eq,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Newline,
    Eof,
}

fn keyword(ident: &str) -> Option<TokenKind> {
    Some(match ident {
        "fn" => TokenKind::Fn,
        "return" => TokenKind::Return,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "for" => TokenKind::For,
        "in" => TokenKind::In,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        _ => return None,
    })
}

/// Tokenize `source`.
///
/// Newlines are significant statement separators except inside parentheses
/// and brackets, where lines join implicitly. `#` starts a comment running
/// to end of line.
pub fn lex(source: &str) -> Result<Vec<Token>, ParseError> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    /// Open `(`/`[` nesting; newlines inside are joined.
    depth: usize,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            depth: 0,
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        self.pos += 1;
        c
    }

    fn push(&mut self, kind: TokenKind) {
        self.tokens.push(Token {
            line: self.line,
            kind,
        });
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            line: self.line,
            message: message.into(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' => {
                    self.pos += 1;
                }
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                '\n' => {
                    self.pos += 1;
                    if self.depth == 0 {
                        // collapse runs of blank lines into one separator
                        if !matches!(
                            self.tokens.last().map(|t| &t.kind),
                            Some(TokenKind::Newline) | None
                        ) {
                            self.push(TokenKind::Newline);
                        }
                    }
                    self.line += 1;
                }
                '0'..='9' => self.number()?,
                '"' | '\'' => self.string(c)?,
                _ if c.is_alphabetic() || c == '_' => self.ident(),
                _ => self.punct(c)?,
            }
        }
        self.push(TokenKind::Eof);
        Ok(self.tokens)
    }

    fn number(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        while matches!(self.peek(), Some('0'..='9')) {
            self.pos += 1;
        }
        let mut is_float = false;
        if self.peek() == Some('.') && matches!(self.peek2(), Some('0'..='9')) {
            is_float = true;
            self.pos += 1;
            while matches!(self.peek(), Some('0'..='9')) {
                self.pos += 1;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if is_float {
            let value = text
                .parse::<f64>()
                .map_err(|_| self.error(format!("invalid number literal '{text}'")))?;
            self.push(TokenKind::Float(value));
        } else {
            let value = text
                .parse::<i64>()
                .map_err(|_| self.error(format!("integer literal '{text}' is out of range")))?;
            self.push(TokenKind::Int(value));
        }
        Ok(())
    }

    fn string(&mut self, quote: char) -> Result<(), ParseError> {
        self.pos += 1;
        let mut text = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => {
                    return Err(self.error("unterminated string literal"));
                }
                Some('\\') => match self.bump() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('\\') => text.push('\\'),
                    Some('\'') => text.push('\''),
                    Some('"') => text.push('"'),
                    Some(c) => {
                        return Err(self.error(format!("unknown escape sequence '\\{c}'")));
                    }
                    None => return Err(self.error("unterminated string literal")),
                },
                Some(c) if c == quote => break,
                Some(c) => text.push(c),
            }
        }
        self.push(TokenKind::Str(text));
        Ok(())
    }

    fn ident(&mut self) {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        match keyword(&text) {
            Some(kind) => self.push(kind),
            None => self.push(TokenKind::Ident(text)),
        }
    }

    fn punct(&mut self, c: char) -> Result<(), ParseError> {
        let eq_follows = self.peek2() == Some('=');
        let (kind, len) = match c {
            '+' if eq_follows => (TokenKind::PlusEq, 2),
            '-' if eq_follows => (TokenKind::MinusEq, 2),
            '*' if eq_follows => (TokenKind::StarEq, 2),
            '/' if eq_follows => (TokenKind::SlashEq, 2),
            '%' if eq_follows => (TokenKind::PercentEq, 2),
            '=' if eq_follows => (TokenKind::EqEq, 2),
            '!' if eq_follows => (TokenKind::NotEq, 2),
            '<' if eq_follows => (TokenKind::Le, 2),
            '>' if eq_follows => (TokenKind::Ge, 2),
            '+' => (TokenKind::Plus, 1),
            '-' => (TokenKind::Minus, 1),
            '*' => (TokenKind::Star, 1),
            '/' => (TokenKind::Slash, 1),
            '%' => (TokenKind::Percent, 1),
            '=' => (TokenKind::Eq, 1),
            '<' => (TokenKind::Lt, 1),
            '>' => (TokenKind::Gt, 1),
            ',' => (TokenKind::Comma, 1),
            ';' => (TokenKind::Semicolon, 1),
            '(' => {
                self.depth += 1;
                (TokenKind::LParen, 1)
            }
            ')' => {
                self.depth = self.depth.saturating_sub(1);
                (TokenKind::RParen, 1)
            }
            '[' => {
                self.depth += 1;
                (TokenKind::LBracket, 1)
            }
            ']' => {
                self.depth = self.depth.saturating_sub(1);
                (TokenKind::RBracket, 1)
            }
            '{' => (TokenKind::LBrace, 1),
            '}' => (TokenKind::RBrace, 1),
            _ => return Err(self.error(format!("unexpected character '{c}'"))),
        };
        self.pos += len;
        self.push(kind);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_assignment() {
        assert_eq!(
            kinds("x = 10"),
            vec![
                TokenKind::Ident("x".to_string()),
                TokenKind::Eq,
                TokenKind::Int(10),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators_and_keywords() {
        assert_eq!(
            kinds("while x <= 3 { x += 1 }"),
            vec![
                TokenKind::While,
                TokenKind::Ident("x".to_string()),
                TokenKind::Le,
                TokenKind::Int(3),
                TokenKind::LBrace,
                TokenKind::Ident("x".to_string()),
                TokenKind::PlusEq,
                TokenKind::Int(1),
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#"s = 'it\'s'"#),
            vec![
                TokenKind::Ident("s".to_string()),
                TokenKind::Eq,
                TokenKind::Str("it's".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_newlines_join_inside_brackets() {
        let toks = kinds("xs = [1,\n2]\ny = 1");
        assert_eq!(
            toks.iter()
                .filter(|k| matches!(k, TokenKind::Newline))
                .count(),
            1
        );
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let toks = kinds("# header\n\n\nx = 1 # trailing\n");
        assert_eq!(
            toks,
            vec![
                TokenKind::Ident("x".to_string()),
                TokenKind::Eq,
                TokenKind::Int(1),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_float_and_int_literals() {
        assert_eq!(
            kinds("1.5 2"),
            vec![TokenKind::Float(1.5), TokenKind::Int(2), TokenKind::Eof]
        );
    }

    #[test]
    fn test_unterminated_string_is_error() {
        assert!(lex("s = 'oops").is_err());
    }

    #[test]
    fn test_line_numbers_advance() {
        let toks = lex("a = 1\nb = 2").unwrap();
        let b = toks
            .iter()
            .find(|t| t.kind == TokenKind::Ident("b".to_string()))
            .unwrap();
        assert_eq!(b.line, 2);
    }
}
