// File: src/parser.rs
//
// Recursive-descent parser turning the lexer's token stream into the AST
// defined in `ast.rs`. Operator precedence (lowest to highest): assignment,
// logical or, logical and, equality, relational, additive, multiplicative,
// unary, postfix (call/property/index), primary.

use crate::ast::{BinOp, Expr, Stmt};
use crate::errors::{ProboticsError, SourceLocation};
use crate::lexer::{Keyword, Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type PResult<T> = Result<T, ProboticsError>;

pub fn parse(tokens: Vec<Token>) -> PResult<Vec<Stmt>> {
    Parser::new(tokens).parse_program()
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> &TokenKind {
        self.tokens.get(self.pos).map(|t| &t.kind).unwrap_or(&TokenKind::Eof)
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        self.tokens.get(self.pos + offset).map(|t| &t.kind).unwrap_or(&TokenKind::Eof)
    }

    fn location(&self) -> SourceLocation {
        self.tokens.get(self.pos).map(|t| SourceLocation::new(t.line, t.column)).unwrap_or_default()
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if !matches!(kind, TokenKind::Eof) {
            self.pos += 1;
        }
        kind
    }

    fn error(&self, msg: impl Into<String>) -> ProboticsError {
        ProboticsError::compile(msg, self.location())
    }

    fn expect_punct(&mut self, c: char) -> PResult<()> {
        if self.peek() == &TokenKind::Punctuation(c) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected '{c}', found {:?}", self.peek())))
        }
    }

    fn expect_operator(&mut self, op: &str) -> PResult<()> {
        if matches!(self.peek(), TokenKind::Operator(o) if o == op) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected '{op}', found {:?}", self.peek())))
        }
    }

    fn expect_keyword(&mut self, kw: Keyword) -> PResult<()> {
        if self.peek() == &TokenKind::Keyword(kw) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected keyword, found {:?}", self.peek())))
        }
    }

    pub fn parse_program(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while !matches!(self.peek(), TokenKind::Eof) {
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    fn parse_block_body(&mut self) -> PResult<Vec<Stmt>> {
        self.expect_punct('{')?;
        let mut stmts = Vec::new();
        while self.peek() != &TokenKind::Punctuation('}') {
            if matches!(self.peek(), TokenKind::Eof) {
                return Err(self.error("unterminated block, expected '}'"));
            }
            stmts.push(self.parse_stmt()?);
        }
        self.expect_punct('}')?;
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        match self.peek() {
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::While) => self.parse_while(),
            TokenKind::Keyword(Keyword::Break) => {
                self.advance();
                Ok(Stmt::Break)
            }
            TokenKind::Keyword(Keyword::Next) => {
                self.advance();
                Ok(Stmt::Next)
            }
            TokenKind::Keyword(Keyword::Return) => {
                self.advance();
                if self.starts_expr() {
                    Ok(Stmt::Return(Some(self.parse_expr()?)))
                } else {
                    Ok(Stmt::Return(None))
                }
            }
            _ => Ok(Stmt::Expr(self.parse_expr()?)),
        }
    }

    fn starts_expr(&self) -> bool {
        !matches!(
            self.peek(),
            TokenKind::Eof
                | TokenKind::Punctuation('}')
                | TokenKind::Keyword(Keyword::Break)
                | TokenKind::Keyword(Keyword::Next)
        )
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        self.expect_keyword(Keyword::If)?;
        let condition = self.parse_expr()?;
        let then_branch = self.parse_block_body()?;
        let else_branch = if self.peek() == &TokenKind::Keyword(Keyword::Else) {
            self.advance();
            if self.peek() == &TokenKind::Keyword(Keyword::If) {
                Some(vec![self.parse_if()?])
            } else {
                Some(self.parse_block_body()?)
            }
        } else {
            None
        };
        Ok(Stmt::If { condition, then_branch, else_branch })
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        self.expect_keyword(Keyword::While)?;
        let condition = self.parse_expr()?;
        let body = self.parse_block_body()?;
        Ok(Stmt::While { condition, body })
    }

    fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> PResult<Expr> {
        let target = self.parse_logical_or()?;
        if matches!(self.peek(), TokenKind::Operator(op) if op == ":=") {
            self.advance();
            if !is_assignable(&target) {
                return Err(self.error("left-hand side of ':=' must be a name, property, or index"));
            }
            let value = self.parse_assignment()?;
            return Ok(Expr::Assign { target: Box::new(target), value: Box::new(value) });
        }
        Ok(target)
    }

    fn parse_logical_or(&mut self) -> PResult<Expr> {
        let mut left = self.parse_logical_and()?;
        while matches!(self.peek(), TokenKind::Operator(op) if op == "||") {
            self.advance();
            let right = self.parse_logical_and()?;
            left = Expr::Binary { left: Box::new(left), op: BinOp::Or, right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> PResult<Expr> {
        let mut left = self.parse_equality()?;
        while matches!(self.peek(), TokenKind::Operator(op) if op == "&&") {
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::Binary { left: Box::new(left), op: BinOp::And, right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> PResult<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                TokenKind::Operator(o) if o == "==" => BinOp::Eq,
                TokenKind::Operator(o) if o == "!=" => BinOp::Neq,
                _ => break,
            };
            self.advance();
            let right = self.parse_relational()?;
            left = Expr::Binary { left: Box::new(left), op, right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> PResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                TokenKind::Operator(o) if o == "<" => BinOp::Lt,
                TokenKind::Operator(o) if o == "<=" => BinOp::Lte,
                TokenKind::Operator(o) if o == ">" => BinOp::Gt,
                TokenKind::Operator(o) if o == ">=" => BinOp::Gte,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::Binary { left: Box::new(left), op, right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Operator(o) if o == "+" => BinOp::Add,
                TokenKind::Operator(o) if o == "-" => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary { left: Box::new(left), op, right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Operator(o) if o == "*" => BinOp::Mul,
                TokenKind::Operator(o) if o == "/" => BinOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary { left: Box::new(left), op, right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        if matches!(self.peek(), TokenKind::Operator(o) if o == "!") {
            self.advance();
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        if matches!(self.peek(), TokenKind::Operator(o) if o == "-") {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Binary { left: Box::new(Expr::Int(0)), op: BinOp::Sub, right: Box::new(operand) });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                TokenKind::Punctuation('.') => {
                    self.advance();
                    let name = self.expect_identifier()?;
                    expr = Expr::Property { target: Box::new(expr), name };
                }
                TokenKind::Punctuation('[') => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect_punct(']')?;
                    expr = Expr::Index { target: Box::new(expr), index: Box::new(index) };
                }
                TokenKind::Punctuation('(') => {
                    self.advance();
                    let args = self.parse_call_args()?;
                    expr = Expr::Call { callee: Box::new(expr), args };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> PResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.peek() != &TokenKind::Punctuation(')') {
            args.push(self.parse_expr()?);
            while self.peek() == &TokenKind::Punctuation(',') {
                self.advance();
                args.push(self.parse_expr()?);
            }
        }
        self.expect_punct(')')?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        match self.peek().clone() {
            TokenKind::Number(n, is_float) => {
                self.advance();
                Ok(if is_float { Expr::Float(n) } else { Expr::Int(n as i64) })
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Ok(Expr::Null)
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Expr::Identifier(name))
            }
            TokenKind::Punctuation('{') => {
                let body = self.parse_block_body()?;
                Ok(Expr::Block { arg_names: Vec::new(), body })
            }
            TokenKind::Punctuation('(') => {
                if let Some(arg_names) = self.try_parse_block_args() {
                    let body = self.parse_block_body()?;
                    return Ok(Expr::Block { arg_names, body });
                }
                self.advance();
                let expr = self.parse_expr()?;
                self.expect_punct(')')?;
                Ok(expr)
            }
            other => Err(self.error(format!("unexpected token {other:?}"))),
        }
    }

    /// Speculatively tries `( ident (, ident)* ) {`, restoring the cursor on
    /// failure so the caller can fall back to a parenthesized expression.
    fn try_parse_block_args(&mut self) -> Option<Vec<String>> {
        let save = self.pos;
        debug_assert_eq!(self.peek(), &TokenKind::Punctuation('('));
        self.pos += 1;
        let mut names = Vec::new();
        if self.peek() != &TokenKind::Punctuation(')') {
            loop {
                match self.peek().clone() {
                    TokenKind::Identifier(n) => {
                        self.pos += 1;
                        names.push(n);
                    }
                    _ => {
                        self.pos = save;
                        return None;
                    }
                }
                if self.peek() == &TokenKind::Punctuation(',') {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        if self.peek() != &TokenKind::Punctuation(')') {
            self.pos = save;
            return None;
        }
        self.pos += 1;
        if self.peek() != &TokenKind::Punctuation('{') {
            self.pos = save;
            return None;
        }
        Some(names)
    }

    fn expect_identifier(&mut self) -> PResult<String> {
        match self.advance() {
            TokenKind::Identifier(n) => Ok(n),
            other => Err(self.error(format!("expected an identifier, found {other:?}"))),
        }
    }
}

fn is_assignable(expr: &Expr) -> bool {
    matches!(expr, Expr::Identifier(_) | Expr::Property { .. } | Expr::Index { .. })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_src(src: &str) -> Vec<Stmt> {
        parse(tokenize(src).unwrap()).unwrap()
    }

    #[test]
    fn parses_arithmetic_precedence() {
        let stmts = parse_src("1 + (2 - 3) / 4 * 5");
        assert_eq!(stmts.len(), 1);
        assert!(matches!(&stmts[0], Stmt::Expr(Expr::Binary { op: BinOp::Add, .. })));
    }

    #[test]
    fn parses_assignment_chain() {
        let stmts = parse_src("a := 1\nb := a + 2\nb");
        assert_eq!(stmts.len(), 3);
        assert!(matches!(&stmts[0], Stmt::Expr(Expr::Assign { .. })));
    }

    #[test]
    fn parses_while_with_break() {
        let stmts = parse_src("i := 0\nwhile true { i := i + 1\nif i == 5 { break } }\ni");
        assert_eq!(stmts.len(), 3);
        assert!(matches!(&stmts[1], Stmt::While { .. }));
    }

    #[test]
    fn parses_block_with_args() {
        let stmts = parse_src("inc := (arg1) { arg1 + 1 }");
        match &stmts[0] {
            Stmt::Expr(Expr::Assign { value, .. }) => {
                assert!(matches!(**value, Expr::Block { ref arg_names, .. } if arg_names == &["arg1".to_string()]))
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn rejects_assignment_to_non_assignable() {
        assert!(parse(tokenize("1 := 2").unwrap()).is_err());
    }
}
