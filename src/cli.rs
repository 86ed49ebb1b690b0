//! Command-line mode selection and top-level dispatch for the `pesl` binary.

use std::{
    ffi::OsString,
    io::{self, IsTerminal, Write},
};

use clap::{Parser, error::ErrorKind};
use tracing::debug;

use crate::{
    batch::BatchRunner,
    diagnostics::{PeslError, Result},
    repl::{EditorSource, LineSource, ReaderSource, Repl},
};

const INFO: &str = "\
PESL command-line interpreter and REPL.
Language sources and documentation: https://github.com/jearmstrong21/PESL
Run with -h or --help for a summary of the arguments.

Programs run here start with two host functions:
  println([value])  prints the value (or nothing) followed by a newline
  exit([code])      stops the interpreter with the given exit code (default 0)
";

#[derive(Parser, Debug)]
#[command(name = "pesl", version, about = "Interpreter and REPL for PESL programs")]
pub struct Args {
    /// Source files to run, in order, as one program
    #[arg(short, long, num_args = 1.., value_name = "FILE")]
    pub files: Option<Vec<String>>,
    /// Start an interactive session
    #[arg(short, long)]
    pub repl: bool,
    /// Describe this interpreter and its host functions
    #[arg(short, long)]
    pub info: bool,
}

/// The single thing one invocation does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Pre-rendered help or version text for stdout.
    Help(String),
    Info,
    Batch(Vec<String>),
    Repl,
}

impl Args {
    pub fn mode(self) -> Result<Mode> {
        if self.info {
            return Ok(Mode::Info);
        }
        match (self.files, self.repl) {
            (Some(_), true) => Err(PeslError::ArgumentConflict),
            (Some(files), false) => Ok(Mode::Batch(files)),
            (None, _) => Ok(Mode::Repl),
        }
    }
}

/// Parses `args` (program name first) into a [`Mode`].
pub fn resolve<I, T>(args: I) -> Result<Mode>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = match Args::try_parse_from(args) {
        Ok(args) => args,
        Err(err) => {
            let rendered = err.render().to_string();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => Ok(Mode::Help(rendered)),
                _ => Err(PeslError::Usage(rendered)),
            };
        }
    };
    let mode = args.mode()?;
    debug!(?mode, "resolved mode");
    Ok(mode)
}

/// Runs one invocation against the process streams and returns its exit code.
pub fn execute<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut err = io::stderr();
    let code = match resolve(args).and_then(|mode| run(mode, &mut out, &mut err)) {
        Ok(code) => code,
        Err(error) => {
            report(&error, &mut err);
            error.exit_code()
        }
    };
    let _ = out.flush();
    code
}

fn run(mode: Mode, out: &mut dyn Write, err: &mut dyn Write) -> Result<i32> {
    match mode {
        Mode::Help(text) => {
            write!(out, "{text}")?;
            Ok(0)
        }
        Mode::Info => {
            write!(out, "{INFO}")?;
            Ok(0)
        }
        Mode::Batch(files) => {
            let flow = BatchRunner::default().run_files(&files, out)?;
            Ok(flow.exit_code())
        }
        Mode::Repl => {
            let stdin = io::stdin();
            let mut input: Box<dyn LineSource> = if stdin.is_terminal() {
                Box::new(EditorSource::new()?)
            } else {
                Box::new(ReaderSource::new(stdin.lock()))
            };
            let flow = Repl::default().run(input.as_mut(), out, err)?;
            Ok(flow.exit_code())
        }
    }
}

fn report(error: &PeslError, err: &mut dyn Write) {
    let _ = match error {
        PeslError::Usage(rendered) => write!(err, "{rendered}"),
        other => writeln!(err, "{other}"),
    };
    let _ = err.flush();
}
