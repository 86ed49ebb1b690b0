//! Native functions every program starts with.

use std::io::Write;

use crate::{
    diagnostics::Halt,
    environment::Namespace,
    value::{NativeCallback, NativeFunction, Object},
};

/// A fresh namespace holding only the host natives.
pub fn prelude() -> Namespace {
    let mut namespace = Namespace::new();
    install(&mut namespace);
    namespace
}

pub fn install(namespace: &mut Namespace) {
    namespace.define("println", native("println", 0, 1, println));
    namespace.define("exit", native("exit", 0, 1, exit));
}

fn native(
    name: &'static str,
    min_args: usize,
    max_args: usize,
    callback: NativeCallback,
) -> Object {
    Object::native(NativeFunction {
        name,
        method: false,
        min_args,
        max_args,
        callback,
    })
}

fn println(out: &mut dyn Write, _: Option<&Object>, args: &[Object]) -> Result<Object, Halt> {
    let written = match args.first() {
        Some(value) => writeln!(out, "{}", value.stringify()),
        None => writeln!(out),
    };
    written.map_err(|err| Halt::raise(format!("println failed: {err}")))?;
    Ok(Object::Undefined)
}

/// Never returns a value: success is the terminate signal itself.
fn exit(_: &mut dyn Write, _: Option<&Object>, args: &[Object]) -> Result<Object, Halt> {
    let code = match args.first() {
        Some(value) => value.as_number()? as i32,
        None => 0,
    };
    Err(Halt::Exit(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(
        namespace: &Namespace,
        name: &str,
        args: &[Object],
        out: &mut Vec<u8>,
    ) -> Result<Object, Halt> {
        let Some(Object::Function(function)) = namespace.get(name) else {
            panic!("{name} is not installed");
        };
        let crate::value::Function::Native(native) = &*function else {
            panic!("{name} should be native");
        };
        native.call(out, None, args)
    }

    #[test]
    fn prelude_installs_exactly_the_host_natives() {
        assert_eq!(prelude().names(), vec!["println", "exit"]);
    }

    #[test]
    fn println_without_arguments_writes_a_blank_line() {
        let mut out = Vec::new();
        let result = call(&prelude(), "println", &[], &mut out).expect("println");
        assert!(matches!(result, Object::Undefined));
        assert_eq!(out, b"\n");
    }

    #[test]
    fn println_rejects_two_arguments() {
        let mut out = Vec::new();
        let args = [Object::Number(1.0), Object::Number(2.0)];
        let err = call(&prelude(), "println", &args, &mut out).expect_err("arity");
        let Halt::Raise(payload) = err else {
            panic!("expected a raise");
        };
        assert!(payload.to_string().contains("between 0 and 1"));
        assert!(out.is_empty());
    }

    #[test]
    fn exit_truncates_its_code() {
        let mut out = Vec::new();
        let err = call(&prelude(), "exit", &[Object::Number(3.9)], &mut out).expect_err("exit");
        assert!(matches!(err, Halt::Exit(3)));
        let err = call(&prelude(), "exit", &[], &mut out).expect_err("exit");
        assert!(matches!(err, Halt::Exit(0)));
    }

    #[test]
    fn exit_with_text_is_a_raise() {
        let mut out = Vec::new();
        let err = call(&prelude(), "exit", &[Object::text("x")], &mut out).expect_err("exit");
        assert!(matches!(err, Halt::Raise(_)));
    }
}
