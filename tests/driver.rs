use std::{fs, io::Cursor, path::Path};

use pesl::{
    BatchRunner, Flow, PeslError, Repl, ScriptFailure, host, loader,
    repl::{PROMPT, ReaderSource},
};
use tempfile::{TempDir, tempdir};

fn write_source(dir: &TempDir, name: &str, contents: &str) -> String {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("write source");
    path.to_string_lossy().into_owned()
}

fn batch(paths: &[String]) -> (Result<Flow, PeslError>, String) {
    let mut runner = BatchRunner::default();
    let mut out = Vec::new();
    let result = runner.run_files(paths, &mut out);
    (result, String::from_utf8(out).expect("utf8"))
}

struct Session {
    flow: Flow,
    out: String,
    err: String,
}

fn repl(input: &str) -> Session {
    let mut repl = Repl::new(host::prelude());
    let mut source = ReaderSource::new(Cursor::new(input.as_bytes()));
    let mut out = Vec::new();
    let mut err = Vec::new();
    let flow = repl.run(&mut source, &mut out, &mut err).expect("session");
    Session {
        flow,
        out: String::from_utf8(out).expect("utf8"),
        err: String::from_utf8(err).expect("utf8"),
    }
}

/// Runs a session on a thread sized like the binary's main thread, so deep
/// evaluation behaves as it does under `pesl`.
fn repl_with_main_stack(input: &'static str) -> Session {
    std::thread::Builder::new()
        .stack_size(8 << 20)
        .spawn(move || repl(input))
        .expect("spawn session thread")
        .join()
        .expect("session thread")
}

/// Everything echoed to stdout after the banner, with prompts removed.
fn echoed(session: &Session) -> Vec<String> {
    session
        .out
        .lines()
        .skip(1)
        .flat_map(|line| line.split(PROMPT))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[test]
fn loader_joins_files_in_order_with_one_space() {
    let dir = tempdir().expect("tempdir");
    let first = write_source(&dir, "first.pesl", "let a = 1");
    let second = write_source(&dir, "second.pesl", "let b = 2\n");
    let third = write_source(&dir, "third.pesl", "");
    let joined = loader::load_sources(&[first, second, third]).expect("load");
    assert_eq!(joined, "let a = 1 let b = 2\n ");
}

#[test]
fn loader_rejects_bare_suffix_and_wrong_extension() {
    let dir = tempdir().expect("tempdir");
    let bare = write_source(&dir, ".pesl", "println(1)");
    let err = loader::load_sources(&[bare.clone()]).expect_err("bare name");
    assert_eq!(err.to_string(), format!("{bare} is not a file"));

    let text = write_source(&dir, "notes.txt", "println(1)");
    assert!(matches!(
        loader::load_sources(&[text]),
        Err(PeslError::FileValidation { .. })
    ));
}

#[test]
fn loader_rejects_directories_and_missing_paths() {
    let dir = tempdir().expect("tempdir");
    let folder = dir.path().join("folder.pesl");
    fs::create_dir(&folder).expect("mkdir");
    assert!(!loader::is_source_file(&folder));
    assert!(!loader::is_source_file(Path::new("does/not/exist.pesl")));
}

#[test]
fn unreadable_source_is_a_read_error() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("bad.pesl");
    fs::write(&path, [0xff, 0xfe, 0x00]).expect("write bytes");
    let path = path.to_string_lossy().into_owned();

    let err = loader::load_sources(&[path.clone()]).expect_err("invalid utf-8");
    assert!(matches!(err, PeslError::FileRead { .. }));
    assert_eq!(err.to_string(), format!("Error reading file {path}"));
    assert_eq!(err.exit_code(), 1);

    let (result, out) = batch(&[path]);
    assert!(matches!(result, Err(PeslError::FileRead { .. })));
    assert!(out.is_empty());
}

#[test]
fn later_files_see_earlier_definitions() {
    let dir = tempdir().expect("tempdir");
    let a = write_source(&dir, "a.pesl", "let x = 5");
    let b = write_source(&dir, "b.pesl", "println(x)");
    let (result, out) = batch(&[a, b]);
    assert_eq!(result.expect("batch"), Flow::Exhausted);
    assert_eq!(out, "5\n");
}

#[test]
fn invalid_file_stops_before_anything_runs() {
    let dir = tempdir().expect("tempdir");
    let good = write_source(&dir, "good.pesl", "println('ran')");
    let missing = dir.path().join("missing.pesl").to_string_lossy().into_owned();
    let (result, out) = batch(&[good, missing]);
    assert!(matches!(result, Err(PeslError::FileValidation { .. })));
    assert!(out.is_empty());
}

#[test]
fn batch_halts_on_first_failure() {
    let mut runner = BatchRunner::default();
    let mut out = Vec::new();
    let err = runner
        .run_source("println(1) println(nope) println(3)", &mut out)
        .expect_err("should fail");
    assert_eq!(out, b"1\n");
    assert_eq!(err.exit_code(), 1);
    let PeslError::Script(interrupted) = err else {
        panic!("expected a script failure");
    };
    assert!(interrupted.is_fatal());
    assert!(matches!(interrupted.failure, ScriptFailure::Eval(_)));
    assert_eq!(interrupted.to_string(), "Undefined variable 'nope'");
}

#[test]
fn batch_never_echoes_values() {
    let mut runner = BatchRunner::default();
    let mut out = Vec::new();
    runner.run_source("1 + 1 let x = 'quiet'", &mut out).expect("batch");
    assert!(out.is_empty());
    assert!(runner.namespace().contains("x"));
}

#[test]
fn exit_code_is_returned_not_raised() {
    let mut runner = BatchRunner::default();
    let mut out = Vec::new();
    assert_eq!(runner.run_source("exit()", &mut out).expect("exit"), Flow::Exit(0));
    let flow = runner
        .run_source("println('a') exit(3) println('b')", &mut out)
        .expect("exit");
    assert_eq!(flow, Flow::Exit(3));
    assert_eq!(flow.exit_code(), 3);
    assert_eq!(out, b"a\n");
}

#[test]
fn exit_with_non_number_is_an_eval_failure() {
    let session = repl("exit(\"x\")\nprintln('still here')\n");
    assert_eq!(session.flow, Flow::Exhausted);
    assert_eq!(session.err, "expected a number, found string\n");
    assert!(session.out.contains("still here"));
}

#[test]
fn println_arity_is_checked() {
    let session = repl("println()\nprintln(1, 2)\n");
    assert_eq!(echoed(&session), vec!["undefined"]);
    assert!(session.out.contains(&format!("{PROMPT}\nundefined\n")));
    assert_eq!(session.err, "Expected between 0 and 1 arguments, got 2\n");
}

#[test]
fn repl_prints_banner_prompts_and_echoes() {
    let session = repl("let x = 1\nx + 1\n");
    assert!(session.out.starts_with(&format!("PESL {}\n", env!("CARGO_PKG_VERSION"))));
    assert_eq!(session.out.matches(PROMPT).count(), 3);
    assert_eq!(echoed(&session), vec!["1", "2"]);
    assert!(session.err.is_empty());
}

#[test]
fn repl_definitions_persist_across_lines() {
    let session = repl("let x = 1\nprintln(x)\n");
    assert_eq!(echoed(&session), vec!["1", "1", "undefined"]);
}

#[test]
fn repl_recovers_from_every_failure_kind() {
    let session = repl("let a = 1 @\nlet b = (\nlet c = 2 missing let d = 4\nprintln(c)\n");
    assert_eq!(session.flow, Flow::Exhausted);
    assert_eq!(
        session.err,
        "Unexpected character '@'\nAt index 10\n\
         Unexpected end of input\nAt token <end of input> [9, 9]\n\
         Undefined variable 'missing'\n"
    );
    // `c` applied before the failure on its line; `d` never ran.
    assert_eq!(echoed(&session), vec!["2", "2", "undefined"]);
}

#[test]
fn repl_tokens_do_not_carry_between_lines() {
    let session = repl("let s = 'open\nprintln('next')\n");
    assert!(session.err.starts_with("Unterminated string literal\nAt index 8"));
    assert!(session.out.contains("next\n"));
}

#[test]
fn repl_stops_at_exit() {
    let session = repl("println('before')\nexit(7)\nprintln('after')\n");
    assert_eq!(session.flow, Flow::Exit(7));
    assert!(session.out.contains("before"));
    assert!(!session.out.contains("after"));
}

#[test]
fn blank_and_comment_lines_echo_nothing() {
    let session = repl("\n   \n// just a note\n");
    assert!(echoed(&session).is_empty());
    assert!(session.err.is_empty());
}

#[test]
fn runaway_recursion_does_not_end_the_session() {
    let session = repl_with_main_stack(
        "function f(n) { return f(n + 1) }\nf(0)\nprintln('alive')\n",
    );
    assert_eq!(session.flow, Flow::Exhausted);
    assert_eq!(session.err, "Recursion limit exceeded (256 calls)\n");
    assert_eq!(echoed(&session), vec!["<function f>", "alive", "undefined"]);
}

#[test]
fn self_containing_array_echoes_without_looping() {
    let session = repl("let a = []\na.push(a)\na\na == a\n");
    assert_eq!(echoed(&session), vec!["[]", "1", "[[...]]", "true"]);
    assert!(session.err.is_empty());
}
