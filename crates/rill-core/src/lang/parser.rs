//! Recursive-descent parser for rillscript.

use std::sync::Arc;

use thiserror::Error;

use super::ast::{BinOp, Expr, ExprKind, Function, Program, Stmt, StmtKind, Target, UnOp};
use super::token::{lex, Token, TokenKind};

/// A lexing or parsing failure with its source line.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

/// Parse a rillscript module.
pub fn parse(source: &str) -> Result<Program, ParseError> {
    let tokens = lex(source)?;
    Parser::new(tokens).parse_program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    fn_depth: usize,
    loop_depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            fn_depth: 0,
            loop_depth: 0,
        }
    }

    fn peek(&self) -> &Token {
        // the token stream always ends with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    /// Owned copy of the next token kind, so match arms can advance freely.
    fn peek_kind(&self) -> TokenKind {
        self.peek().kind.clone()
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.at(&kind) {
            Ok(self.advance())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            line: self.peek().line,
            message: message.into(),
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek().kind, TokenKind::Newline | TokenKind::Semicolon) {
            self.advance();
        }
    }

    fn end_of_statement(&mut self) -> Result<(), ParseError> {
        match self.peek_kind() {
            TokenKind::Newline | TokenKind::Semicolon => {
                self.advance();
                Ok(())
            }
            TokenKind::Eof | TokenKind::RBrace => Ok(()),
            _ => Err(self.error("expected end of statement")),
        }
    }

    fn parse_program(mut self) -> Result<Program, ParseError> {
        let mut body = Vec::new();
        self.skip_separators();
        while !self.at(&TokenKind::Eof) {
            body.push(self.parse_stmt()?);
            self.skip_separators();
        }
        Ok(Program { body })
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.eat(TokenKind::LBrace, "'{'")?;
        let mut body = Vec::new();
        self.skip_separators();
        while !self.at(&TokenKind::RBrace) {
            if self.at(&TokenKind::Eof) {
                return Err(self.error("unexpected end of input, expected '}'"));
            }
            body.push(self.parse_stmt()?);
            self.skip_separators();
        }
        self.advance();
        Ok(body)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        let line = self.peek().line;
        let kind = match self.peek_kind() {
            TokenKind::Fn => self.parse_fn_def()?,
            TokenKind::Return => {
                if self.fn_depth == 0 {
                    return Err(self.error("'return' outside of a function"));
                }
                self.advance();
                let value = match self.peek_kind() {
                    TokenKind::Newline
                    | TokenKind::Semicolon
                    | TokenKind::RBrace
                    | TokenKind::Eof => None,
                    _ => Some(self.parse_expr()?),
                };
                self.end_of_statement()?;
                StmtKind::Return(value)
            }
            TokenKind::If => self.parse_if()?,
            TokenKind::While => {
                self.advance();
                let cond = self.parse_expr()?;
                self.loop_depth += 1;
                let body = self.parse_block()?;
                self.loop_depth -= 1;
                StmtKind::While { cond, body }
            }
            TokenKind::For => {
                self.advance();
                let target = self.parse_ident("loop variable")?;
                self.eat(TokenKind::In, "'in'")?;
                let iter = self.parse_expr()?;
                self.loop_depth += 1;
                let body = self.parse_block()?;
                self.loop_depth -= 1;
                StmtKind::For { target, iter, body }
            }
            TokenKind::Break => {
                if self.loop_depth == 0 {
                    return Err(self.error("'break' outside of a loop"));
                }
                self.advance();
                self.end_of_statement()?;
                StmtKind::Break
            }
            TokenKind::Continue => {
                if self.loop_depth == 0 {
                    return Err(self.error("'continue' outside of a loop"));
                }
                self.advance();
                self.end_of_statement()?;
                StmtKind::Continue
            }
            _ => self.parse_simple_stmt()?,
        };
        Ok(Stmt { line, kind })
    }

    fn parse_fn_def(&mut self) -> Result<StmtKind, ParseError> {
        let line = self.peek().line;
        self.advance();
        let name = self.parse_ident("function name")?;
        self.eat(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                let param = self.parse_ident("parameter name")?;
                if params.contains(&param) {
                    return Err(self.error(format!("duplicate parameter '{param}'")));
                }
                params.push(param);
                if self.at(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.eat(TokenKind::RParen, "')'")?;
        self.fn_depth += 1;
        let saved_loops = std::mem::take(&mut self.loop_depth);
        let body = self.parse_block()?;
        self.loop_depth = saved_loops;
        self.fn_depth -= 1;
        Ok(StmtKind::FnDef(Arc::new(Function {
            name,
            params,
            body,
            line,
        })))
    }

    fn parse_if(&mut self) -> Result<StmtKind, ParseError> {
        let mut branches = Vec::new();
        let mut else_body = None;
        self.advance();
        loop {
            let cond = self.parse_expr()?;
            let body = self.parse_block()?;
            branches.push((cond, body));
            if !self.at(&TokenKind::Else) {
                break;
            }
            self.advance();
            if self.at(&TokenKind::If) {
                self.advance();
                continue;
            }
            else_body = Some(self.parse_block()?);
            break;
        }
        Ok(StmtKind::If {
            branches,
            else_body,
        })
    }

    /// Expression statement, assignment, or augmented assignment.
    fn parse_simple_stmt(&mut self) -> Result<StmtKind, ParseError> {
        let exprs = self.parse_expr_list()?;
        let kind = match self.peek_kind() {
            TokenKind::Eq => {
                self.advance();
                let target = Self::targets_from(exprs, self.peek().line)?;
                let value = self.parse_value_list()?;
                StmtKind::Assign { target, value }
            }
            TokenKind::PlusEq
            | TokenKind::MinusEq
            | TokenKind::StarEq
            | TokenKind::SlashEq
            | TokenKind::PercentEq => {
                let op = match self.advance().kind {
                    TokenKind::PlusEq => BinOp::Add,
                    TokenKind::MinusEq => BinOp::Sub,
                    TokenKind::StarEq => BinOp::Mul,
                    TokenKind::SlashEq => BinOp::Div,
                    _ => BinOp::Mod,
                };
                let name = match Self::targets_from(exprs, self.peek().line)? {
                    Target::Name(name) => name,
                    Target::Tuple(_) => {
                        return Err(self.error("augmented assignment target must be a single name"));
                    }
                };
                let value = self.parse_expr()?;
                StmtKind::AugAssign { name, op, value }
            }
            _ => {
                let mut exprs = exprs;
                if exprs.len() != 1 {
                    return Err(self.error("unexpected ',' in expression statement"));
                }
                StmtKind::Expr(exprs.remove(0))
            }
        };
        self.end_of_statement()?;
        Ok(kind)
    }

    fn targets_from(exprs: Vec<Expr>, line: usize) -> Result<Target, ParseError> {
        let mut names = Vec::with_capacity(exprs.len());
        for expr in &exprs {
            match &expr.kind {
                ExprKind::Name(n) => names.push(n.clone()),
                _ => {
                    return Err(ParseError {
                        line: expr.line,
                        message: "invalid assignment target".to_string(),
                    });
                }
            }
        }
        match names.len() {
            0 => Err(ParseError {
                line,
                message: "missing assignment target".to_string(),
            }),
            1 => Ok(Target::Name(names.remove(0))),
            _ => Ok(Target::Tuple(names)),
        }
    }

    fn parse_expr_list(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut exprs = vec![self.parse_expr()?];
        while self.at(&TokenKind::Comma) {
            self.advance();
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    /// RHS of an assignment: `a, b = 1, 2` makes the value an implicit list.
    fn parse_value_list(&mut self) -> Result<Expr, ParseError> {
        let line = self.peek().line;
        let mut exprs = self.parse_expr_list()?;
        if exprs.len() == 1 {
            Ok(exprs.remove(0))
        } else {
            Ok(Expr {
                line,
                kind: ExprKind::List(exprs),
            })
        }
    }

    fn parse_ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek_kind() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(format!("expected {what}"))),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_and()?;
        while self.at(&TokenKind::Or) {
            let line = self.advance().line;
            let rhs = self.parse_and()?;
            lhs = binary(line, BinOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_not()?;
        while self.at(&TokenKind::And) {
            let line = self.advance().line;
            let rhs = self.parse_not()?;
            lhs = binary(line, BinOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.at(&TokenKind::Not) {
            let line = self.advance().line;
            let operand = self.parse_not()?;
            return Ok(Expr {
                line,
                kind: ExprKind::Unary {
                    op: UnOp::Not,
                    operand: Box::new(operand),
                },
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_add()?;
        let op = match self.peek().kind {
            TokenKind::EqEq => BinOp::Eq,
            TokenKind::NotEq => BinOp::Ne,
            TokenKind::Lt => BinOp::Lt,
            TokenKind::Le => BinOp::Le,
            TokenKind::Gt => BinOp::Gt,
            TokenKind::Ge => BinOp::Ge,
            _ => return Ok(lhs),
        };
        let line = self.advance().line;
        let rhs = self.parse_add()?;
        Ok(binary(line, op, lhs, rhs))
    }

    fn parse_add(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => return Ok(lhs),
            };
            let line = self.advance().line;
            let rhs = self.parse_mul()?;
            lhs = binary(line, op, lhs, rhs);
        }
    }

    fn parse_mul(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => return Ok(lhs),
            };
            let line = self.advance().line;
            let rhs = self.parse_unary()?;
            lhs = binary(line, op, lhs, rhs);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.at(&TokenKind::Minus) {
            let line = self.advance().line;
            let operand = self.parse_unary()?;
            return Ok(Expr {
                line,
                kind: ExprKind::Unary {
                    op: UnOp::Neg,
                    operand: Box::new(operand),
                },
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::LParen => {
                    let line = self.peek().line;
                    let func = match &expr.kind {
                        ExprKind::Name(name) => name.clone(),
                        _ => return Err(self.error("only named functions can be called")),
                    };
                    self.advance();
                    let mut args = Vec::new();
                    if !self.at(&TokenKind::RParen) {
                        args = self.parse_expr_list()?;
                    }
                    self.eat(TokenKind::RParen, "')'")?;
                    expr = Expr {
                        line,
                        kind: ExprKind::Call { func, args },
                    };
                }
                TokenKind::LBracket => {
                    let line = self.advance().line;
                    let index = self.parse_expr()?;
                    self.eat(TokenKind::RBracket, "']'")?;
                    expr = Expr {
                        line,
                        kind: ExprKind::Index {
                            obj: Box::new(expr),
                            index: Box::new(index),
                        },
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let line = self.peek().line;
        let kind = match self.peek_kind() {
            TokenKind::Int(n) => {
                self.advance();
                ExprKind::Int(n)
            }
            TokenKind::Float(x) => {
                self.advance();
                ExprKind::Float(x)
            }
            TokenKind::Str(s) => {
                self.advance();
                ExprKind::Str(s)
            }
            TokenKind::True => {
                self.advance();
                ExprKind::Bool(true)
            }
            TokenKind::False => {
                self.advance();
                ExprKind::Bool(false)
            }
            TokenKind::Null => {
                self.advance();
                ExprKind::Null
            }
            TokenKind::Ident(name) => {
                self.advance();
                ExprKind::Name(name)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                if !self.at(&TokenKind::RBracket) {
                    items = self.parse_expr_list()?;
                }
                self.eat(TokenKind::RBracket, "']'")?;
                ExprKind::List(items)
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.eat(TokenKind::RParen, "')'")?;
                return Ok(inner);
            }
            _ => return Err(self.error("expected an expression")),
        };
        Ok(Expr { line, kind })
    }
}

fn binary(line: usize, op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr {
        line,
        kind: ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment() {
        let program = parse("x = 10").unwrap();
        assert_eq!(program.body.len(), 1);
        match &program.body[0].kind {
            StmtKind::Assign { target, .. } => {
                assert_eq!(target, &Target::Name("x".to_string()));
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_destructuring_assignment() {
        let program = parse("a, b = 1, 2").unwrap();
        match &program.body[0].kind {
            StmtKind::Assign { target, value } => {
                assert_eq!(
                    target,
                    &Target::Tuple(vec!["a".to_string(), "b".to_string()])
                );
                assert!(matches!(value.kind, ExprKind::List(_)));
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_precedence() {
        let program = parse("x = 1 + 2 * 3").unwrap();
        match &program.body[0].kind {
            StmtKind::Assign { value, .. } => match &value.kind {
                ExprKind::Binary { op, rhs, .. } => {
                    assert_eq!(*op, BinOp::Add);
                    assert!(matches!(
                        rhs.kind,
                        ExprKind::Binary { op: BinOp::Mul, .. }
                    ));
                }
                other => panic!("expected binary, got {other:?}"),
            },
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_fn_def_and_call() {
        let program = parse("fn double(n) {\n  return n * 2\n}\ny = double(4)").unwrap();
        assert_eq!(program.body.len(), 2);
        match &program.body[0].kind {
            StmtKind::FnDef(func) => {
                assert_eq!(func.name, "double");
                assert_eq!(func.params, vec!["n".to_string()]);
            }
            other => panic!("expected fn def, got {other:?}"),
        }
    }

    #[test]
    fn test_if_else_chain() {
        let program = parse("if x > 0 { y = 1 } else if x < 0 { y = 2 } else { y = 3 }").unwrap();
        match &program.body[0].kind {
            StmtKind::If {
                branches,
                else_body,
            } => {
                assert_eq!(branches.len(), 2);
                assert!(else_body.is_some());
            }
            other => panic!("expected if, got {other:?}"),
        }
    }

    #[test]
    fn test_return_outside_function_rejected() {
        assert!(parse("return 1").is_err());
    }

    #[test]
    fn test_break_outside_loop_rejected() {
        assert!(parse("break").is_err());
        assert!(parse("fn f() { break }").is_err());
    }

    #[test]
    fn test_invalid_assignment_target() {
        assert!(parse("1 = 2").is_err());
        assert!(parse("f(x) = 2").is_err());
    }

    #[test]
    fn test_statements_split_on_semicolons() {
        let program = parse("a = 1; b = 2").unwrap();
        assert_eq!(program.body.len(), 2);
    }
}
