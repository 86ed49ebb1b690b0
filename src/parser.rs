use std::rc::Rc;

use crate::{
    ast::{BinaryOp, Expr, ExprKind, FunctionDecl, Literal, Stmt, StmtKind, UnaryOp},
    diagnostics::{ParseFailure, SourceSpan},
    lexer::{Keyword, Token, TokenKind, TokenStream},
};

type ParseResult<T> = Result<T, ParseFailure>;

/// Parses exactly one statement from the front of `tokens`.
///
/// On success the cursor sits just past the statement (and its optional `;`).
/// On failure the stream is left wherever the parser stopped; callers are
/// expected to discard it.
pub fn parse_next(tokens: &mut TokenStream) -> ParseResult<Stmt> {
    Parser { tokens }.parse_statement()
}

struct Parser<'a> {
    tokens: &'a mut TokenStream,
}

const EQUALITY: &[(TokenKind, BinaryOp)] = &[
    (TokenKind::EqualEqual, BinaryOp::Equal),
    (TokenKind::BangEqual, BinaryOp::NotEqual),
];

const COMPARISON: &[(TokenKind, BinaryOp)] = &[
    (TokenKind::Less, BinaryOp::Less),
    (TokenKind::LessEqual, BinaryOp::LessEqual),
    (TokenKind::Greater, BinaryOp::Greater),
    (TokenKind::GreaterEqual, BinaryOp::GreaterEqual),
];

const TERM: &[(TokenKind, BinaryOp)] = &[
    (TokenKind::Plus, BinaryOp::Add),
    (TokenKind::Minus, BinaryOp::Sub),
];

const FACTOR: &[(TokenKind, BinaryOp)] = &[
    (TokenKind::Star, BinaryOp::Mul),
    (TokenKind::Slash, BinaryOp::Div),
    (TokenKind::Percent, BinaryOp::Mod),
];

impl Parser<'_> {
    fn parse_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.peek().span.start;
        let next = self.peek().kind;
        let kind = match next {
            TokenKind::Keyword(Keyword::Let) => self.parse_let()?,
            TokenKind::Keyword(Keyword::Function)
                if self.tokens.peek_nth(1).kind == TokenKind::Identifier =>
            {
                self.advance();
                StmtKind::Function(self.parse_function_rest(true)?)
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if()?,
            TokenKind::Keyword(Keyword::While) => {
                self.advance();
                let condition = self.parse_condition()?;
                let body = self.parse_body()?;
                StmtKind::While { condition, body }
            }
            TokenKind::Keyword(Keyword::For) => self.parse_for()?,
            TokenKind::Keyword(Keyword::Try) => self.parse_try()?,
            TokenKind::Keyword(Keyword::Throw) => {
                self.advance();
                StmtKind::Throw(self.parse_expression()?)
            }
            TokenKind::Keyword(Keyword::Return) => {
                self.advance();
                if self.at_statement_end() {
                    StmtKind::Return(None)
                } else {
                    StmtKind::Return(Some(self.parse_expression()?))
                }
            }
            TokenKind::Keyword(Keyword::Break) => {
                self.advance();
                StmtKind::Break
            }
            TokenKind::Keyword(Keyword::Continue) => {
                self.advance();
                StmtKind::Continue
            }
            TokenKind::LBrace if !self.starts_map_literal() => {
                StmtKind::Block(self.parse_block()?)
            }
            _ => StmtKind::Expr(self.parse_expression()?),
        };
        let span = self.span_from(start);
        self.consume_optional_semicolon();
        Ok(Stmt { kind, span })
    }

    fn parse_let(&mut self) -> ParseResult<StmtKind> {
        self.consume_keyword(Keyword::Let)?;
        let name = self.consume_identifier("Expected variable name after 'let'")?;
        let initializer = if self.matches(TokenKind::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        Ok(StmtKind::Let {
            name: name.lexeme,
            initializer,
        })
    }

    fn parse_if(&mut self) -> ParseResult<StmtKind> {
        self.consume_keyword(Keyword::If)?;
        let condition = self.parse_condition()?;
        let then_branch = self.parse_body()?;
        let else_branch = if self.matches_keyword(Keyword::Else) {
            Some(self.parse_body()?)
        } else {
            None
        };
        Ok(StmtKind::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn parse_for(&mut self) -> ParseResult<StmtKind> {
        self.consume_keyword(Keyword::For)?;
        self.consume(TokenKind::LParen, "Expected '(' after 'for'")?;
        let binding = self.consume_identifier("Expected loop variable")?;
        self.consume_keyword(Keyword::In)?;
        let iterable = self.parse_expression()?;
        self.consume(TokenKind::RParen, "Expected ')' after loop iterable")?;
        let body = self.parse_body()?;
        Ok(StmtKind::For {
            binding: binding.lexeme,
            iterable,
            body,
        })
    }

    fn parse_try(&mut self) -> ParseResult<StmtKind> {
        self.consume_keyword(Keyword::Try)?;
        let body = self.parse_block()?;
        self.consume_keyword(Keyword::Catch)?;
        self.consume(TokenKind::LParen, "Expected '(' after 'catch'")?;
        let binding = self.consume_identifier("Expected name for caught value")?;
        self.consume(TokenKind::RParen, "Expected ')' after caught name")?;
        let handler = self.parse_block()?;
        Ok(StmtKind::Try {
            body,
            binding: binding.lexeme,
            handler,
        })
    }

    fn parse_condition(&mut self) -> ParseResult<Expr> {
        self.consume(TokenKind::LParen, "Expected '(' before condition")?;
        let condition = self.parse_expression()?;
        self.consume(TokenKind::RParen, "Expected ')' after condition")?;
        Ok(condition)
    }

    /// A braced block, or a single statement standing in for one.
    fn parse_body(&mut self) -> ParseResult<Vec<Stmt>> {
        if self.check(&TokenKind::LBrace) {
            self.parse_block()
        } else {
            Ok(vec![self.parse_statement()?])
        }
    }

    fn parse_block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.consume(TokenKind::LBrace, "Expected '{' to start block")?;
        let mut items = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
            items.push(self.parse_statement()?);
        }
        self.consume(TokenKind::RBrace, "Expected '}' to close block")?;
        Ok(items)
    }

    /// Parses `[name](params) { body }` once `function` has been consumed.
    fn parse_function_rest(&mut self, named: bool) -> ParseResult<Rc<FunctionDecl>> {
        let name = if named {
            Some(self.consume_identifier("Expected function name")?.lexeme)
        } else {
            None
        };
        self.consume(TokenKind::LParen, "Expected '(' before parameters")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                params.push(self.consume_identifier("Expected parameter name")?.lexeme);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "Expected ')' after parameters")?;
        let body = self.parse_block()?;
        Ok(Rc::new(FunctionDecl { name, params, body }))
    }

    fn parse_expression(&mut self) -> ParseResult<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> ParseResult<Expr> {
        let expr = self.parse_or()?;
        if self.check(&TokenKind::Assign) {
            let equals = self.advance();
            let value = self.parse_assignment()?;
            return match expr.kind {
                ExprKind::Variable(_) | ExprKind::Index { .. } | ExprKind::Field { .. } => {
                    Ok(Expr {
                        span: expr.span.to(value.span),
                        kind: ExprKind::Assign {
                            target: Box::new(expr),
                            value: Box::new(value),
                        },
                    })
                }
                _ => Err(ParseFailure::new("Invalid assignment target", equals)),
            };
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_and()?;
        while self.matches(TokenKind::DoublePipe) {
            let right = self.parse_and()?;
            expr = binary(BinaryOp::Or, expr, right);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_equality()?;
        while self.matches(TokenKind::DoubleAmpersand) {
            let right = self.parse_equality()?;
            expr = binary(BinaryOp::And, expr, right);
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> ParseResult<Expr> {
        self.parse_left_assoc(EQUALITY, Self::parse_comparison)
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        self.parse_left_assoc(COMPARISON, Self::parse_term)
    }

    fn parse_term(&mut self) -> ParseResult<Expr> {
        self.parse_left_assoc(TERM, Self::parse_factor)
    }

    fn parse_factor(&mut self) -> ParseResult<Expr> {
        self.parse_left_assoc(FACTOR, Self::parse_unary)
    }

    fn parse_left_assoc(
        &mut self,
        operators: &[(TokenKind, BinaryOp)],
        operand: fn(&mut Self) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        let mut expr = operand(self)?;
        while let Some(op) = operators
            .iter()
            .find(|(kind, _)| self.check(kind))
            .map(|(_, op)| *op)
        {
            self.advance();
            let right = operand(self)?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let next = self.peek().kind;
        let op = match next {
            TokenKind::Minus => UnaryOp::Negate,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.parse_call(),
        };
        let operator = self.advance().span;
        let right = self.parse_unary()?;
        Ok(Expr {
            span: operator.to(right.span),
            kind: ExprKind::Unary {
                op,
                expr: Box::new(right),
            },
        })
    }

    fn parse_call(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.matches(TokenKind::LParen) {
                let args = self.parse_list(TokenKind::RParen, Self::parse_expression)?;
                let paren = self.consume(TokenKind::RParen, "Expected ')' after arguments")?;
                expr = Expr {
                    span: expr.span.to(paren.span),
                    kind: ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                };
            } else if self.matches(TokenKind::LBracket) {
                let index = self.parse_expression()?;
                let bracket = self.consume(TokenKind::RBracket, "Expected ']' after index")?;
                expr = Expr {
                    span: expr.span.to(bracket.span),
                    kind: ExprKind::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    },
                };
            } else if self.matches(TokenKind::Dot) {
                let ident = self.consume_identifier("Expected member name after '.'")?;
                expr = Expr {
                    span: expr.span.to(ident.span),
                    kind: ExprKind::Field {
                        target: Box::new(expr),
                        field: ident.lexeme,
                    },
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let token = self.peek().clone();
        let literal = |literal| {
            Ok(Expr {
                span: token.span,
                kind: ExprKind::Literal(literal),
            })
        };
        match token.kind {
            TokenKind::Number => {
                self.advance();
                let value = token.lexeme.parse::<f64>().map_err(|_| {
                    ParseFailure::new("Malformed number literal", token.clone())
                })?;
                literal(Literal::Number(value))
            }
            TokenKind::String => {
                self.advance();
                literal(Literal::String(token.lexeme.clone()))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                literal(Literal::Bool(true))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                literal(Literal::Bool(false))
            }
            TokenKind::Keyword(Keyword::Undefined) => {
                self.advance();
                literal(Literal::Undefined)
            }
            TokenKind::Identifier => {
                self.advance();
                Ok(Expr {
                    span: token.span,
                    kind: ExprKind::Variable(token.lexeme.clone()),
                })
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                let rparen = self.consume(TokenKind::RParen, "Expected ')' after expression")?;
                Ok(Expr {
                    span: token.span.to(rparen.span),
                    kind: inner.kind,
                })
            }
            TokenKind::LBracket => {
                self.advance();
                let elements = self.parse_list(TokenKind::RBracket, Self::parse_expression)?;
                let rbracket =
                    self.consume(TokenKind::RBracket, "Expected ']' after array elements")?;
                Ok(Expr {
                    span: token.span.to(rbracket.span),
                    kind: ExprKind::ArrayLiteral(elements),
                })
            }
            TokenKind::LBrace => {
                self.advance();
                let entries = self.parse_list(TokenKind::RBrace, Self::parse_map_entry)?;
                let rbrace = self.consume(TokenKind::RBrace, "Expected '}' after map entries")?;
                Ok(Expr {
                    span: token.span.to(rbrace.span),
                    kind: ExprKind::MapLiteral(entries),
                })
            }
            TokenKind::Keyword(Keyword::Function) => {
                self.advance();
                let named = self.check(&TokenKind::Identifier);
                let decl = self.parse_function_rest(named)?;
                Ok(Expr {
                    span: self.span_from(token.span.start),
                    kind: ExprKind::Function(decl),
                })
            }
            TokenKind::Eof => Err(ParseFailure::new("Unexpected end of input", token.clone())),
            _ => Err(ParseFailure::new(
                "Unexpected token in expression",
                token.clone(),
            )),
        }
    }

    fn parse_map_entry(&mut self) -> ParseResult<(String, Expr)> {
        let key = self.advance();
        if !matches!(key.kind, TokenKind::Identifier | TokenKind::String) {
            return Err(ParseFailure::new("Expected map key", key));
        }
        self.consume(TokenKind::Colon, "Expected ':' after map key")?;
        Ok((key.lexeme, self.parse_expression()?))
    }

    /// Comma separated items up to (not including) `close`; a trailing comma is allowed.
    fn parse_list<T>(
        &mut self,
        close: TokenKind,
        item: fn(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<Vec<T>> {
        let mut items = Vec::new();
        while !self.check(&close) {
            items.push(item(self)?);
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        Ok(items)
    }

    fn starts_map_literal(&self) -> bool {
        matches!(
            self.tokens.peek_nth(1).kind,
            TokenKind::Identifier | TokenKind::String
        ) && self.tokens.peek_nth(2).kind == TokenKind::Colon
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
        )
    }

    fn span_from(&self, start: usize) -> SourceSpan {
        let end = self.tokens.previous().map_or(start, |token| token.span.end);
        SourceSpan::new(start, end.max(start))
    }

    fn consume_optional_semicolon(&mut self) {
        let _ = self.matches(TokenKind::Semicolon);
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(&kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn matches_keyword(&mut self, keyword: Keyword) -> bool {
        self.matches(TokenKind::Keyword(keyword))
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> ParseResult<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.error(message))
        }
    }

    fn consume_keyword(&mut self, keyword: Keyword) -> ParseResult<Token> {
        let message = format!("Expected '{}'", format!("{keyword:?}").to_lowercase());
        self.consume(TokenKind::Keyword(keyword), &message)
    }

    fn consume_identifier(&mut self, message: &str) -> ParseResult<Token> {
        self.consume(TokenKind::Identifier, message)
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek().kind == *kind
    }

    fn peek(&self) -> &Token {
        self.tokens.peek()
    }

    fn advance(&mut self) -> Token {
        self.tokens.advance()
    }

    fn error(&self, message: &str) -> ParseFailure {
        ParseFailure::new(message, self.peek().clone())
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr {
        span: left.span.to(right.span),
        kind: ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    }
}
