use std::io::Write;

use crate::{
    diagnostics::Halt,
    value::{NativeCallback, NativeFunction, Object},
};

/// Resolves `receiver.name` to a bound-by-call method, if the receiver's type has one.
pub fn lookup(receiver: &Object, name: &str) -> Option<Object> {
    let method = match (receiver, name) {
        (Object::Array(_) | Object::Text(_) | Object::Map(_), "length") => {
            native("length", 0, 0, length)
        }
        (Object::Array(_), "push") => native("push", 1, 1, array_push),
        (Object::Array(_), "pop") => native("pop", 0, 0, array_pop),
        (Object::Text(_), "upper") => native("upper", 0, 0, text_upper),
        (Object::Text(_), "lower") => native("lower", 0, 0, text_lower),
        (Object::Map(_), "keys") => native("keys", 0, 0, map_keys),
        (Object::Map(_), "has") => native("has", 1, 1, map_has),
        _ => return None,
    };
    Some(method)
}

fn native(
    name: &'static str,
    min_args: usize,
    max_args: usize,
    callback: NativeCallback,
) -> Object {
    Object::native(NativeFunction {
        name,
        method: true,
        min_args,
        max_args,
        callback,
    })
}

fn mismatch(name: &str, receiver: Option<&Object>) -> Halt {
    let found = receiver.map_or("nothing", Object::type_name);
    Halt::raise(format!("{name} cannot be called on {found}"))
}

fn length(_: &mut dyn Write, receiver: Option<&Object>, _: &[Object]) -> Result<Object, Halt> {
    let len = match receiver {
        Some(Object::Array(values)) => values.borrow().len(),
        Some(Object::Text(text)) => text.chars().count(),
        Some(Object::Map(map)) => map.borrow().len(),
        other => return Err(mismatch("length", other)),
    };
    Ok(Object::Number(len as f64))
}

/// Appends in place and yields the new length.
fn array_push(
    _: &mut dyn Write,
    receiver: Option<&Object>,
    args: &[Object],
) -> Result<Object, Halt> {
    match receiver {
        Some(Object::Array(values)) => {
            let mut values = values.borrow_mut();
            values.push(args[0].clone());
            Ok(Object::Number(values.len() as f64))
        }
        other => Err(mismatch("push", other)),
    }
}

fn array_pop(_: &mut dyn Write, receiver: Option<&Object>, _: &[Object]) -> Result<Object, Halt> {
    match receiver {
        Some(Object::Array(values)) => Ok(values.borrow_mut().pop().unwrap_or(Object::Undefined)),
        other => Err(mismatch("pop", other)),
    }
}

fn text_upper(_: &mut dyn Write, receiver: Option<&Object>, _: &[Object]) -> Result<Object, Halt> {
    match receiver {
        Some(Object::Text(text)) => Ok(Object::text(text.to_uppercase())),
        other => Err(mismatch("upper", other)),
    }
}

fn text_lower(_: &mut dyn Write, receiver: Option<&Object>, _: &[Object]) -> Result<Object, Halt> {
    match receiver {
        Some(Object::Text(text)) => Ok(Object::text(text.to_lowercase())),
        other => Err(mismatch("lower", other)),
    }
}

fn map_keys(_: &mut dyn Write, receiver: Option<&Object>, _: &[Object]) -> Result<Object, Halt> {
    match receiver {
        Some(Object::Map(map)) => Ok(Object::array(
            map.borrow().keys().map(|key| Object::text(key.clone())).collect(),
        )),
        other => Err(mismatch("keys", other)),
    }
}

fn map_has(_: &mut dyn Write, receiver: Option<&Object>, args: &[Object]) -> Result<Object, Halt> {
    match (receiver, &args[0]) {
        (Some(Object::Map(map)), Object::Text(key)) => {
            Ok(Object::Boolean(map.borrow().contains_key(&**key)))
        }
        (Some(Object::Map(_)), _) => Ok(Object::Boolean(false)),
        (other, _) => Err(mismatch("has", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn call(receiver: &Object, name: &str, args: &[Object]) -> Result<Object, Halt> {
        let Some(Object::Function(function)) = lookup(receiver, name) else {
            panic!("no method {name}");
        };
        let crate::value::Function::Native(native) = &*function else {
            panic!("methods are native");
        };
        native.call(&mut Vec::<u8>::new(), Some(receiver), args)
    }

    #[test]
    fn push_mutates_shared_array() {
        let array = Object::array(vec![Object::Number(1.0)]);
        let alias = array.clone();
        let len = call(&array, "push", &[Object::Number(2.0)]).expect("push");
        assert_eq!(len.to_string(), "2");
        assert_eq!(alias.to_string(), "[1, 2]");
    }

    #[test]
    fn pop_on_empty_array_is_undefined() {
        let array = Object::array(Vec::new());
        let popped = call(&array, "pop", &[]).expect("pop");
        assert!(matches!(popped, Object::Undefined));
    }

    #[test]
    fn text_length_counts_characters() {
        let len = call(&Object::text("héllo"), "length", &[]).expect("length");
        assert_eq!(len.to_string(), "5");
    }

    #[test]
    fn map_has_and_keys_follow_insertion_order() {
        let mut entries = IndexMap::new();
        entries.insert("b".to_string(), Object::Number(1.0));
        entries.insert("a".to_string(), Object::Number(2.0));
        let map = Object::map(entries);
        assert_eq!(call(&map, "keys", &[]).expect("keys").to_string(), "[\"b\", \"a\"]");
        assert!(call(&map, "has", &[Object::text("a")]).expect("has").is_truthy());
        assert!(!call(&map, "has", &[Object::text("z")]).expect("has").is_truthy());
    }

    #[test]
    fn unknown_methods_do_not_resolve() {
        assert!(lookup(&Object::Number(1.0), "length").is_none());
        assert!(lookup(&Object::text("x"), "push").is_none());
    }

    #[test]
    fn arity_is_checked_before_the_callback() {
        let array = Object::array(Vec::new());
        let err = call(&array, "push", &[]).expect_err("missing argument");
        assert!(matches!(err, Halt::Raise(_)));
    }
}
