use std::{fmt, io};

use thiserror::Error;

use crate::{lexer::Token, value::Object};

/// Character span within a source buffer, `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

impl SourceSpan {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub const fn to(self, other: SourceSpan) -> Self {
        Self {
            start: self.start,
            end: other.end,
        }
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// The tokenizer rejected the input at `index`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TokenizeFailure {
    pub message: String,
    pub index: usize,
}

impl TokenizeFailure {
    pub fn new(message: impl Into<String>, index: usize) -> Self {
        Self {
            message: message.into(),
            index,
        }
    }
}

/// The parser could not build a statement starting at the front of the stream.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ParseFailure {
    pub message: String,
    pub token: Token,
}

impl ParseFailure {
    pub fn new(message: impl Into<String>, token: Token) -> Self {
        Self {
            message: message.into(),
            token,
        }
    }
}

/// A statement raised `payload` while being evaluated.
#[derive(Debug, Clone, Error)]
#[error("{payload}")]
pub struct EvalFailure {
    pub payload: Object,
}

/// Everything that can stop the statement driver part way through a buffer.
#[derive(Debug, Clone)]
pub enum ScriptFailure {
    Tokenize(TokenizeFailure),
    Parse(ParseFailure),
    Eval(EvalFailure),
}

impl fmt::Display for ScriptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptFailure::Tokenize(failure) => {
                write!(f, "{}\nAt index {}", failure.message, failure.index)
            }
            ScriptFailure::Parse(failure) => write!(
                f,
                "{}\nAt token {} {}",
                failure.message, failure.token, failure.token.span
            ),
            ScriptFailure::Eval(failure) => write!(f, "{}", failure.payload),
        }
    }
}

impl std::error::Error for ScriptFailure {}

impl From<TokenizeFailure> for ScriptFailure {
    fn from(failure: TokenizeFailure) -> Self {
        ScriptFailure::Tokenize(failure)
    }
}

impl From<ParseFailure> for ScriptFailure {
    fn from(failure: ParseFailure) -> Self {
        ScriptFailure::Parse(failure)
    }
}

impl From<EvalFailure> for ScriptFailure {
    fn from(failure: EvalFailure) -> Self {
        ScriptFailure::Eval(failure)
    }
}

/// Why evaluation of a statement stopped early.
#[derive(Debug, Clone)]
pub enum Halt {
    /// A script-level failure carrying its payload object.
    Raise(Object),
    /// `exit(code)` was called; nothing else may run.
    Exit(i32),
}

impl Halt {
    pub fn raise(message: impl Into<String>) -> Self {
        Halt::Raise(Object::text(message))
    }
}

/// How the caller of the statement driver treats a [`ScriptFailure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    Fatal,
    Recoverable,
}

/// A failure tagged with the policy its caller runs under.
#[derive(Debug, Clone, Error)]
#[error("{failure}")]
pub struct Interrupted {
    pub failure: ScriptFailure,
    pub policy: FailurePolicy,
}

impl Interrupted {
    pub fn new(failure: impl Into<ScriptFailure>, policy: FailurePolicy) -> Self {
        Self {
            failure: failure.into(),
            policy,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.policy == FailurePolicy::Fatal
    }

    /// Writes the structured message for this failure, one line per fact.
    pub fn report(&self, err: &mut dyn io::Write) -> io::Result<()> {
        writeln!(err, "{}", self.failure)?;
        err.flush()
    }
}

/// Unified error type for the interpreter binary. Every variant is fatal and
/// maps to exit code 1.
#[derive(Debug, Error)]
pub enum PeslError {
    #[error("{0}")]
    Usage(String),
    #[error("Cannot run files and repl at the same time")]
    ArgumentConflict,
    #[error("{path} is not a file")]
    FileValidation { path: String },
    #[error("Error reading file {path}")]
    FileRead {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("{0}")]
    Script(#[from] Interrupted),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl PeslError {
    pub fn exit_code(&self) -> i32 {
        1
    }
}

pub type Result<T> = std::result::Result<T, PeslError>;
