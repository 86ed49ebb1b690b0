use std::{cell::RefCell, fmt, io::Write, rc::Rc};

use indexmap::IndexMap;

use crate::{ast::FunctionDecl, diagnostics::Halt, environment::EnvironmentRef};

pub type ArrayRef = Rc<RefCell<Vec<Object>>>;
pub type MapRef = Rc<RefCell<IndexMap<String, Object>>>;

/// Every value a PESL program can observe.
///
/// Arrays and maps are shared by reference: mutating one through any alias is
/// visible through all of them.
#[derive(Clone)]
pub enum Object {
    Undefined,
    Boolean(bool),
    Number(f64),
    Text(Rc<str>),
    Array(ArrayRef),
    Map(MapRef),
    Function(Rc<Function>),
}

impl Object {
    pub fn text(value: impl Into<String>) -> Self {
        Object::Text(Rc::from(value.into()))
    }

    pub fn array(values: Vec<Object>) -> Self {
        Object::Array(Rc::new(RefCell::new(values)))
    }

    pub fn map(entries: IndexMap<String, Object>) -> Self {
        Object::Map(Rc::new(RefCell::new(entries)))
    }

    pub fn native(function: NativeFunction) -> Self {
        Object::Function(Rc::new(Function::Native(function)))
    }

    pub fn user(function: UserFunction) -> Self {
        Object::Function(Rc::new(Function::User(function)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Undefined => "undefined",
            Object::Boolean(_) => "boolean",
            Object::Number(_) => "number",
            Object::Text(_) => "string",
            Object::Array(_) => "array",
            Object::Map(_) => "map",
            Object::Function(_) => "function",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Object::Undefined => false,
            Object::Boolean(b) => *b,
            Object::Number(n) => *n != 0.0 && !n.is_nan(),
            Object::Text(s) => !s.is_empty(),
            Object::Array(_) | Object::Map(_) | Object::Function(_) => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Object::Function(_))
    }

    /// Text representation used by `println` and the REPL echo.
    pub fn stringify(&self) -> String {
        self.to_string()
    }

    /// Coerces to a number, raising an evaluation failure for anything else.
    pub fn as_number(&self) -> Result<f64, Halt> {
        match self {
            Object::Number(n) => Ok(*n),
            other => Err(Halt::raise(format!(
                "expected a number, found {}",
                other.type_name()
            ))),
        }
    }

    /// Structural equality; functions compare by identity. Self-referencing
    /// containers compare equal once the same pair is revisited.
    pub fn equals(&self, other: &Object) -> bool {
        self.equals_within(other, &mut Vec::new())
    }

    fn equals_within(&self, other: &Object, pending: &mut Vec<(*const (), *const ())>) -> bool {
        match (self, other) {
            (Object::Undefined, Object::Undefined) => true,
            (Object::Boolean(a), Object::Boolean(b)) => a == b,
            (Object::Number(a), Object::Number(b)) => a == b,
            (Object::Text(a), Object::Text(b)) => a == b,
            (Object::Array(a), Object::Array(b)) => {
                let pair = (Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ());
                if Rc::ptr_eq(a, b) || pending.contains(&pair) {
                    return true;
                }
                pending.push(pair);
                let (a, b) = (a.borrow(), b.borrow());
                let equal = a.len() == b.len()
                    && a.iter().zip(b.iter()).all(|(l, r)| l.equals_within(r, pending));
                pending.pop();
                equal
            }
            (Object::Map(a), Object::Map(b)) => {
                let pair = (Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ());
                if Rc::ptr_eq(a, b) || pending.contains(&pair) {
                    return true;
                }
                pending.push(pair);
                let (a, b) = (a.borrow(), b.borrow());
                let equal = a.len() == b.len()
                    && a.iter().all(|(key, value)| {
                        b.get(key).is_some_and(|rhs| value.equals_within(rhs, pending))
                    });
                pending.pop();
                equal
            }
            (Object::Function(a), Object::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Writes this object; `open` holds the containers currently being
    /// written, so a container reached again prints as `[...]` or `{...}`.
    fn write_to(
        &self,
        f: &mut fmt::Formatter<'_>,
        open: &mut Vec<*const ()>,
        nested: bool,
    ) -> fmt::Result {
        match self {
            Object::Undefined => write!(f, "undefined"),
            Object::Boolean(b) => write!(f, "{b}"),
            Object::Number(n) => fmt_number(*n, f),
            Object::Text(s) if nested => write!(f, "{:?}", &**s),
            Object::Text(s) => write!(f, "{s}"),
            Object::Array(values) => {
                let ptr = Rc::as_ptr(values) as *const ();
                if open.contains(&ptr) {
                    return write!(f, "[...]");
                }
                open.push(ptr);
                write!(f, "[")?;
                for (idx, value) in values.borrow().iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    value.write_to(f, open, true)?;
                }
                open.pop();
                write!(f, "]")
            }
            Object::Map(map) => {
                let ptr = Rc::as_ptr(map) as *const ();
                if open.contains(&ptr) {
                    return write!(f, "{{...}}");
                }
                open.push(ptr);
                write!(f, "{{")?;
                for (idx, (key, value)) in map.borrow().iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: ")?;
                    value.write_to(f, open, true)?;
                }
                open.pop();
                write!(f, "}}")
            }
            Object::Function(function) => write!(f, "<function {}>", function.name()),
        }
    }
}

fn fmt_number(n: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{n}")
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_to(f, &mut Vec::new(), false)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_to(f, &mut Vec::new(), true)
    }
}

pub enum Function {
    Native(NativeFunction),
    User(UserFunction),
}

impl Function {
    pub fn name(&self) -> &str {
        match self {
            Function::Native(native) => native.name,
            Function::User(user) => user.decl.name.as_deref().unwrap_or("anonymous"),
        }
    }
}

/// Host code behind a [`NativeFunction`]. Receives the output sink, the
/// receiver for method calls, and the already-validated argument list.
pub type NativeCallback = fn(&mut dyn Write, Option<&Object>, &[Object]) -> Result<Object, Halt>;

pub struct NativeFunction {
    pub name: &'static str,
    /// Requires a receiver, i.e. must be invoked as `value.name(...)`.
    pub method: bool,
    pub min_args: usize,
    pub max_args: usize,
    pub callback: NativeCallback,
}

impl NativeFunction {
    pub fn call(
        &self,
        out: &mut dyn Write,
        receiver: Option<&Object>,
        args: &[Object],
    ) -> Result<Object, Halt> {
        if self.method && receiver.is_none() {
            return Err(Halt::raise(format!(
                "{} must be called on a value",
                self.name
            )));
        }
        validate_arity(args, self.min_args, self.max_args)?;
        (self.callback)(out, receiver, args)
    }
}

pub struct UserFunction {
    pub decl: Rc<FunctionDecl>,
    pub env: EnvironmentRef,
}

/// Fails unless `min <= args.len() <= max`.
pub fn validate_arity(args: &[Object], min: usize, max: usize) -> Result<(), Halt> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let expected = if min == max {
        format!("{min}")
    } else {
        format!("between {min} and {max}")
    };
    Err(Halt::raise(format!(
        "Expected {expected} arguments, got {}",
        args.len()
    )))
}
