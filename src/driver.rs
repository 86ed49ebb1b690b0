//! Statement driver shared by the batch runner and the REPL.
//!
//! A buffer is tokenized once, then statements are parsed and evaluated one
//! at a time from the front of the stream. Every statement that completes has
//! already applied its effects to the namespace before the next is parsed, so
//! a failure part way through leaves exactly the earlier effects in place.

use std::io::{self, Write};

use tracing::{debug, trace};

use crate::{
    diagnostics::{EvalFailure, FailurePolicy, Halt, Interrupted, PeslError},
    environment::Namespace,
    lexer::{self, TokenStream},
    parser,
    value::Object,
};

/// How a driver pass ended when no failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Every statement ran.
    Exhausted,
    /// A statement called `exit(code)`; nothing after it ran.
    Exit(i32),
}

impl Flow {
    /// Process exit code for a run that ended this way.
    pub fn exit_code(self) -> i32 {
        match self {
            Flow::Exhausted => 0,
            Flow::Exit(code) => code,
        }
    }
}

/// Sees the value of each statement as soon as it is evaluated.
pub type Observer<'a> = dyn FnMut(&mut dyn Write, &Object) -> io::Result<()> + 'a;

/// Batch mode: values are dropped.
pub fn discard(_: &mut dyn Write, _: &Object) -> io::Result<()> {
    Ok(())
}

/// REPL mode: each value is printed on its own line.
pub fn echo(out: &mut dyn Write, value: &Object) -> io::Result<()> {
    writeln!(out, "{}", value.stringify())?;
    out.flush()
}

/// Tokenizes `source` and runs every statement in it.
pub fn run_source(
    source: &str,
    namespace: &mut Namespace,
    out: &mut dyn Write,
    policy: FailurePolicy,
    observer: &mut Observer<'_>,
) -> Result<Flow, PeslError> {
    let tokens = lexer::tokenize(source).map_err(|failure| Interrupted::new(failure, policy))?;
    trace!(tokens = tokens.len(), "tokenized buffer");
    run_tokens(tokens, namespace, out, policy, observer)
}

/// Runs statements from an already tokenized buffer until it is exhausted,
/// a statement fails, or a statement requests exit.
pub fn run_tokens(
    mut tokens: TokenStream,
    namespace: &mut Namespace,
    out: &mut dyn Write,
    policy: FailurePolicy,
    observer: &mut Observer<'_>,
) -> Result<Flow, PeslError> {
    while tokens.has_remaining() {
        let stmt =
            parser::parse_next(&mut tokens).map_err(|failure| Interrupted::new(failure, policy))?;
        debug!(span = %stmt.span, "evaluating statement");
        match stmt.evaluate(namespace, out) {
            Ok(value) => observer(out, &value)?,
            Err(Halt::Raise(payload)) => {
                return Err(Interrupted::new(EvalFailure { payload }, policy).into());
            }
            Err(Halt::Exit(code)) => {
                debug!(code, "exit requested");
                return Ok(Flow::Exit(code));
            }
        }
    }
    Ok(Flow::Exhausted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{diagnostics::ScriptFailure, host};

    fn run(source: &str, namespace: &mut Namespace) -> (Result<Flow, PeslError>, String) {
        let mut out = Vec::new();
        let result = run_source(source, namespace, &mut out, FailurePolicy::Fatal, &mut discard);
        (result, String::from_utf8(out).expect("utf8"))
    }

    #[test]
    fn statements_apply_in_order() {
        let mut namespace = host::prelude();
        let (result, out) = run("let x = 1 x = x + 1 println(x)", &mut namespace);
        assert_eq!(result.expect("run"), Flow::Exhausted);
        assert_eq!(out, "2\n");
        assert_eq!(namespace.get("x").map(|x| x.to_string()).as_deref(), Some("2"));
    }

    #[test]
    fn tokenize_failure_runs_nothing() {
        let mut namespace = host::prelude();
        let (result, out) = run("println(1) @", &mut namespace);
        let Err(PeslError::Script(interrupted)) = result else {
            panic!("expected a script failure");
        };
        assert!(matches!(interrupted.failure, ScriptFailure::Tokenize(_)));
        assert!(out.is_empty());
    }

    #[test]
    fn eval_failure_keeps_earlier_effects() {
        let mut namespace = host::prelude();
        let (result, _) = run("let a = 1 let b = missing let c = 3", &mut namespace);
        assert!(result.is_err());
        assert!(namespace.contains("a"));
        assert!(!namespace.contains("b"));
        assert!(!namespace.contains("c"));
    }

    #[test]
    fn exit_stops_the_pass() {
        let mut namespace = host::prelude();
        let (result, out) = run("println(1) exit(4) println(2)", &mut namespace);
        assert_eq!(result.expect("run"), Flow::Exit(4));
        assert_eq!(out, "1\n");
    }

    #[test]
    fn echo_observer_sees_every_value() {
        let mut namespace = host::prelude();
        let mut out = Vec::new();
        let flow = run_source(
            "let x = 2 x * 3",
            &mut namespace,
            &mut out,
            FailurePolicy::Recoverable,
            &mut echo,
        )
        .expect("run");
        assert_eq!(flow, Flow::Exhausted);
        assert_eq!(String::from_utf8(out).expect("utf8"), "2\n6\n");
    }
}
