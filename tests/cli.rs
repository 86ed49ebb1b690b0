use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

fn pesl() -> Command {
    let mut cmd = Command::cargo_bin("pesl").expect("binary exists");
    cmd.env_remove("PESL_LOG");
    cmd
}

#[test]
fn runs_files_in_order() {
    let dir = tempdir().expect("create temp dir");
    let first = dir.path().join("first.pesl");
    let second = dir.path().join("second.pesl");
    fs::write(&first, "let greeting = 'hello'").expect("write first");
    fs::write(&second, "println(greeting + ' world')").expect("write second");

    pesl()
        .arg("--files")
        .arg(&first)
        .arg(&second)
        .assert()
        .success()
        .stdout("hello world\n")
        .stderr("");
}

#[test]
fn exit_code_comes_from_the_script() {
    let dir = tempdir().expect("create temp dir");
    let script = dir.path().join("exit.pesl");
    fs::write(&script, "println('bye') exit(3) println('unreachable')").expect("write");

    pesl()
        .arg("-f")
        .arg(&script)
        .assert()
        .code(3)
        .stdout("bye\n");
}

#[test]
fn batch_eval_failure_exits_one() {
    let dir = tempdir().expect("create temp dir");
    let script = dir.path().join("broken.pesl");
    fs::write(&script, "println(1) throw 'bad news' println(2)").expect("write");

    pesl()
        .arg("-f")
        .arg(&script)
        .assert()
        .code(1)
        .stdout("1\n")
        .stderr("bad news\n");
}

#[test]
fn batch_parse_failure_reports_token_span() {
    let dir = tempdir().expect("create temp dir");
    let script = dir.path().join("parse.pesl");
    fs::write(&script, "let 5 = x").expect("write");

    pesl()
        .arg("-f")
        .arg(&script)
        .assert()
        .code(1)
        .stderr("Expected variable name after 'let'\nAt token `5` [4, 5]\n");
}

#[test]
fn misnamed_file_is_rejected() {
    let dir = tempdir().expect("create temp dir");
    let script = dir.path().join("script.txt");
    fs::write(&script, "println(1)").expect("write");

    pesl()
        .arg("-f")
        .arg(&script)
        .assert()
        .code(1)
        .stdout("")
        .stderr(predicate::str::ends_with("script.txt is not a file\n"));
}

#[test]
fn unreadable_file_exits_one() {
    let dir = tempdir().expect("create temp dir");
    let script = dir.path().join("bad.pesl");
    fs::write(&script, [0xff, 0xfe, 0x00]).expect("write");

    pesl()
        .arg("-f")
        .arg(&script)
        .assert()
        .code(1)
        .stdout("")
        .stderr(format!("Error reading file {}\n", script.display()));
}

#[test]
fn repl_survives_runaway_recursion() {
    pesl()
        .write_stdin("function f(n) { return f(n + 1) }\nf(0)\nprintln('alive')\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("alive\n"))
        .stderr("Recursion limit exceeded (256 calls)\n");
}

#[test]
fn files_and_repl_together_conflict() {
    pesl()
        .args(["-f", "a.pesl", "-r"])
        .assert()
        .code(1)
        .stderr("Cannot run files and repl at the same time\n");
}

#[test]
fn unknown_flag_is_a_usage_error() {
    pesl()
        .arg("--bogus")
        .assert()
        .code(1)
        .stdout("")
        .stderr(predicate::str::contains("--bogus").and(predicate::str::contains("Usage")));
}

#[test]
fn help_goes_to_stdout() {
    pesl()
        .arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("--files").and(predicate::str::contains("--repl")));
}

#[test]
fn info_describes_host_functions() {
    pesl()
        .arg("--info")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("println([value])")
                .and(predicate::str::contains("exit([code])")),
        );
}

#[test]
fn repl_is_the_default_mode() {
    pesl()
        .write_stdin("let x = 2\nx * 21\nexit(x)\n")
        .assert()
        .code(2)
        .stdout(predicate::str::contains(">>> 2\n>>> 42\n>>> "));
}

#[test]
fn repl_reports_errors_and_keeps_going() {
    pesl()
        .arg("--repl")
        .write_stdin("nope\nprintln('ok')\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("ok\n"))
        .stderr("Undefined variable 'nope'\n");
}
