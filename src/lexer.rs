use std::fmt;

use crate::diagnostics::{SourceSpan, TokenizeFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Let,
    Function,
    If,
    Else,
    While,
    For,
    In,
    Return,
    Break,
    Continue,
    Throw,
    Try,
    Catch,
    True,
    False,
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Number,
    String,
    Keyword(Keyword),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Colon,
    Semicolon,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    DoubleAmpersand,
    DoublePipe,
    Bang,
    BangEqual,
    EqualEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text of the token; the unescaped contents for string literals.
    pub lexeme: String,
    pub span: SourceSpan,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Eof => write!(f, "<end of input>"),
            TokenKind::String => write!(f, "{:?}", self.lexeme),
            _ => write!(f, "`{}`", self.lexeme),
        }
    }
}

/// Tokens of one source buffer, consumed front to back by the parser.
///
/// The final token is always [`TokenKind::Eof`]; the cursor never moves past it.
#[derive(Debug, Clone)]
pub struct TokenStream {
    tokens: Vec<Token>,
    cursor: usize,
}

impl TokenStream {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, cursor: 0 }
    }

    /// True while at least one token other than end-of-input is left.
    pub fn has_remaining(&self) -> bool {
        !matches!(self.peek().kind, TokenKind::Eof)
    }

    pub fn peek(&self) -> &Token {
        self.peek_nth(0)
    }

    /// Looks `n` tokens past the cursor, clamped to end-of-input.
    pub fn peek_nth(&self, n: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.cursor + n).min(last)]
    }

    pub fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.cursor += 1;
        }
        token
    }

    pub fn previous(&self) -> Option<&Token> {
        self.cursor.checked_sub(1).map(|idx| &self.tokens[idx])
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_remaining()
    }
}

/// Tokenizes all of `source` eagerly.
pub fn tokenize(source: &str) -> Result<TokenStream, TokenizeFailure> {
    Lexer::new(source).tokenize().map(TokenStream::new)
}

struct Lexer {
    chars: Vec<char>,
    current: usize,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            current: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.current).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.current + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.current += 1;
        Some(ch)
    }

    fn match_next(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.current += 1;
            true
        } else {
            false
        }
    }

    fn text(&self, start: usize) -> String {
        self.chars[start..self.current].iter().collect()
    }

    fn collect_while<F>(&mut self, mut predicate: F)
    where
        F: FnMut(char) -> bool,
    {
        while let Some(ch) = self.peek() {
            if !predicate(ch) {
                break;
            }
            self.current += 1;
        }
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), TokenizeFailure> {
        loop {
            match (self.peek(), self.peek_next()) {
                (Some(ch), _) if ch.is_whitespace() => {
                    self.current += 1;
                }
                (Some('/'), Some('/')) => {
                    self.collect_while(|ch| ch != '\n');
                }
                (Some('/'), Some('*')) => {
                    let start = self.current;
                    self.current += 2;
                    let mut depth = 1;
                    while depth > 0 {
                        match (self.bump(), self.peek()) {
                            (Some('/'), Some('*')) => {
                                self.current += 1;
                                depth += 1;
                            }
                            (Some('*'), Some('/')) => {
                                self.current += 1;
                                depth -= 1;
                            }
                            (Some(_), _) => {}
                            (None, _) => {
                                return Err(TokenizeFailure::new(
                                    "Unterminated block comment",
                                    start,
                                ));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn identifier_or_keyword(&mut self, start: usize) -> Token {
        self.collect_while(|ch| ch.is_ascii_alphanumeric() || ch == '_');
        let lexeme = self.text(start);
        let kind = keyword_for(&lexeme).unwrap_or(TokenKind::Identifier);
        Token {
            kind,
            lexeme,
            span: SourceSpan::new(start, self.current),
        }
    }

    fn number_literal(&mut self, start: usize) -> Token {
        self.collect_while(|ch| ch.is_ascii_digit());
        if self.peek() == Some('.') && self.peek_next().is_some_and(|ch| ch.is_ascii_digit()) {
            self.current += 1;
            self.collect_while(|ch| ch.is_ascii_digit());
        }
        Token {
            kind: TokenKind::Number,
            lexeme: self.text(start),
            span: SourceSpan::new(start, self.current),
        }
    }

    fn string_literal(&mut self, start: usize, quote: char) -> Result<Token, TokenizeFailure> {
        let mut value = String::new();
        while let Some(ch) = self.bump() {
            match ch {
                ch if ch == quote => {
                    return Ok(Token {
                        kind: TokenKind::String,
                        lexeme: value,
                        span: SourceSpan::new(start, self.current),
                    });
                }
                '\\' => match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('r') => value.push('\r'),
                    Some('t') => value.push('\t'),
                    Some(other) => value.push(other),
                    None => break,
                },
                _ => value.push(ch),
            }
        }
        Err(TokenizeFailure::new("Unterminated string literal", start))
    }

    fn simple_token(&self, start: usize, kind: TokenKind) -> Token {
        Token {
            kind,
            lexeme: self.text(start),
            span: SourceSpan::new(start, self.current),
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, TokenizeFailure> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments()?;
            let start = self.current;
            let Some(ch) = self.bump() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    lexeme: String::new(),
                    span: SourceSpan::new(start, start),
                });
                break;
            };

            let token = match ch {
                'a'..='z' | 'A'..='Z' | '_' => self.identifier_or_keyword(start),
                '0'..='9' => self.number_literal(start),
                '"' | '\'' => self.string_literal(start, ch)?,
                '(' => self.simple_token(start, TokenKind::LParen),
                ')' => self.simple_token(start, TokenKind::RParen),
                '{' => self.simple_token(start, TokenKind::LBrace),
                '}' => self.simple_token(start, TokenKind::RBrace),
                '[' => self.simple_token(start, TokenKind::LBracket),
                ']' => self.simple_token(start, TokenKind::RBracket),
                ',' => self.simple_token(start, TokenKind::Comma),
                '.' => self.simple_token(start, TokenKind::Dot),
                ':' => self.simple_token(start, TokenKind::Colon),
                ';' => self.simple_token(start, TokenKind::Semicolon),
                '+' => self.simple_token(start, TokenKind::Plus),
                '-' => self.simple_token(start, TokenKind::Minus),
                '*' => self.simple_token(start, TokenKind::Star),
                '/' => self.simple_token(start, TokenKind::Slash),
                '%' => self.simple_token(start, TokenKind::Percent),
                '=' => {
                    if self.match_next('=') {
                        self.simple_token(start, TokenKind::EqualEqual)
                    } else {
                        self.simple_token(start, TokenKind::Assign)
                    }
                }
                '!' => {
                    if self.match_next('=') {
                        self.simple_token(start, TokenKind::BangEqual)
                    } else {
                        self.simple_token(start, TokenKind::Bang)
                    }
                }
                '<' => {
                    if self.match_next('=') {
                        self.simple_token(start, TokenKind::LessEqual)
                    } else {
                        self.simple_token(start, TokenKind::Less)
                    }
                }
                '>' => {
                    if self.match_next('=') {
                        self.simple_token(start, TokenKind::GreaterEqual)
                    } else {
                        self.simple_token(start, TokenKind::Greater)
                    }
                }
                '&' if self.match_next('&') => self.simple_token(start, TokenKind::DoubleAmpersand),
                '|' if self.match_next('|') => self.simple_token(start, TokenKind::DoublePipe),
                other => {
                    return Err(TokenizeFailure::new(
                        format!("Unexpected character '{other}'"),
                        start,
                    ));
                }
            };
            tokens.push(token);
        }
        Ok(tokens)
    }
}

fn keyword_for(ident: &str) -> Option<TokenKind> {
    use self::Keyword as Kw;
    let keyword = match ident {
        "let" => Kw::Let,
        "function" => Kw::Function,
        "if" => Kw::If,
        "else" => Kw::Else,
        "while" => Kw::While,
        "for" => Kw::For,
        "in" => Kw::In,
        "return" => Kw::Return,
        "break" => Kw::Break,
        "continue" => Kw::Continue,
        "throw" => Kw::Throw,
        "try" => Kw::Try,
        "catch" => Kw::Catch,
        "true" => Kw::True,
        "false" => Kw::False,
        "undefined" => Kw::Undefined,
        _ => return None,
    };
    Some(TokenKind::Keyword(keyword))
}
