//! PESL interpreter: tokenizer, parser and evaluator for the language, plus
//! the statement driver that runs programs in batch or REPL mode against one
//! shared namespace.

pub mod ast;
pub mod batch;
pub mod cli;
pub mod diagnostics;
pub mod driver;
pub mod environment;
pub mod host;
pub mod lexer;
pub mod loader;
pub mod logging;
pub mod methods;
pub mod parser;
pub mod repl;
pub mod runtime;
pub mod value;

pub use batch::BatchRunner;
pub use diagnostics::{FailurePolicy, Halt, PeslError, ScriptFailure, SourceSpan};
pub use driver::Flow;
pub use environment::Namespace;
pub use repl::Repl;
pub use value::Object;
