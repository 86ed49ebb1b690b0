use std::io::{self, BufRead, Write};

use rustyline::{DefaultEditor, error::ReadlineError};
use tracing::debug;

use crate::{
    diagnostics::{FailurePolicy, PeslError, Result},
    driver::{self, Flow},
    environment::Namespace,
    host,
};

pub const PROMPT: &str = ">>> ";

/// Where REPL lines come from. `None` means the session's input has ended.
pub trait LineSource {
    fn read_line(&mut self, prompt: &str, out: &mut dyn Write) -> io::Result<Option<String>>;
}

/// Interactive terminal input through `rustyline`, with in-memory history.
pub struct EditorSource {
    editor: DefaultEditor,
}

impl EditorSource {
    pub fn new() -> io::Result<Self> {
        let editor = DefaultEditor::new().map_err(readline_error)?;
        Ok(Self { editor })
    }
}

impl LineSource for EditorSource {
    fn read_line(&mut self, prompt: &str, out: &mut dyn Write) -> io::Result<Option<String>> {
        out.flush()?;
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    self.editor.add_history_entry(line.as_str()).ok();
                }
                Ok(Some(line))
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
            Err(err) => Err(readline_error(err)),
        }
    }
}

fn readline_error(err: ReadlineError) -> io::Error {
    match err {
        ReadlineError::Io(err) => err,
        other => io::Error::new(io::ErrorKind::Other, other),
    }
}

/// Plain buffered input, used when stdin is not a terminal.
pub struct ReaderSource<R> {
    reader: R,
}

impl<R: BufRead> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> LineSource for ReaderSource<R> {
    fn read_line(&mut self, prompt: &str, out: &mut dyn Write) -> io::Result<Option<String>> {
        write!(out, "{prompt}")?;
        out.flush()?;
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }
}

/// One interactive session. The namespace lives as long as the session.
pub struct Repl {
    namespace: Namespace,
}

impl Repl {
    pub fn new(namespace: Namespace) -> Self {
        Self { namespace }
    }

    /// Reads and evaluates lines until input ends or a line calls `exit`.
    pub fn run(
        &mut self,
        input: &mut dyn LineSource,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> Result<Flow> {
        writeln!(out, "PESL {}", env!("CARGO_PKG_VERSION"))?;
        while let Some(line) = input.read_line(PROMPT, out)? {
            if let Flow::Exit(code) = self.eval_line(&line, out, err)? {
                return Ok(Flow::Exit(code));
            }
        }
        debug!("input closed");
        writeln!(out)?;
        out.flush()?;
        Ok(Flow::Exhausted)
    }

    /// Evaluates one line, echoing each statement's value. Script failures are
    /// reported to `err` and swallowed; the next line starts clean.
    pub fn eval_line(
        &mut self,
        line: &str,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> Result<Flow> {
        let result = driver::run_source(
            line,
            &mut self.namespace,
            out,
            FailurePolicy::Recoverable,
            &mut driver::echo,
        );
        match result {
            Err(PeslError::Script(interrupted)) if !interrupted.is_fatal() => {
                debug!(failure = %interrupted, "line abandoned");
                interrupted.report(err)?;
                Ok(Flow::Exhausted)
            }
            other => other,
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }
}

impl Default for Repl {
    fn default() -> Self {
        Self::new(host::prelude())
    }
}
