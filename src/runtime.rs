use std::{io::Write, rc::Rc};

use indexmap::IndexMap;

use crate::{
    ast::{BinaryOp, Expr, ExprKind, FunctionDecl, Literal, Stmt, StmtKind, UnaryOp},
    diagnostics::Halt,
    environment::{Environment, EnvironmentRef, Namespace},
    methods,
    value::{Function, Object, UserFunction},
};

impl Stmt {
    /// Evaluates this statement against `namespace`, writing program output to `out`.
    pub fn evaluate(&self, namespace: &mut Namespace, out: &mut dyn Write) -> Result<Object, Halt> {
        Evaluator::new(namespace.scope(), out).evaluate_top_level(self)
    }
}

/// Deepest chain of user function calls one statement may build.
pub const MAX_CALL_DEPTH: usize = 256;

struct Evaluator<'o> {
    env: EnvironmentRef,
    out: &'o mut dyn Write,
    /// User function calls currently in progress.
    call_depth: usize,
}

enum FlowControl {
    Next(Object),
    Return(Object),
    Break,
    Continue,
}

type Eval<T> = Result<T, Halt>;

impl<'o> Evaluator<'o> {
    fn new(env: EnvironmentRef, out: &'o mut dyn Write) -> Self {
        Self {
            env,
            out,
            call_depth: 0,
        }
    }

    fn evaluate_top_level(&mut self, stmt: &Stmt) -> Eval<Object> {
        match self.execute_statement(stmt)? {
            FlowControl::Next(value) => Ok(value),
            FlowControl::Return(_) => Err(Halt::raise("'return' outside of a function")),
            FlowControl::Break => Err(Halt::raise("'break' outside of a loop")),
            FlowControl::Continue => Err(Halt::raise("'continue' outside of a loop")),
        }
    }

    fn execute_statement(&mut self, stmt: &Stmt) -> Eval<FlowControl> {
        match &stmt.kind {
            StmtKind::Let { name, initializer } => {
                let value = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Object::Undefined,
                };
                self.env.borrow_mut().define(name.clone(), value.clone());
                Ok(FlowControl::Next(value))
            }
            StmtKind::Function(decl) => {
                let function = self.closure(decl);
                if let Some(name) = &decl.name {
                    self.env.borrow_mut().define(name.clone(), function.clone());
                }
                Ok(FlowControl::Next(function))
            }
            StmtKind::Expr(expr) => Ok(FlowControl::Next(self.evaluate(expr)?)),
            StmtKind::Block(statements) => {
                let scope = Environment::with_parent(Rc::clone(&self.env));
                self.execute_block(statements, scope)
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let branch = if self.evaluate(condition)?.is_truthy() {
                    Some(then_branch)
                } else {
                    else_branch.as_ref()
                };
                match branch {
                    Some(statements) => {
                        let scope = Environment::with_parent(Rc::clone(&self.env));
                        Ok(settle(self.execute_block(statements, scope)?))
                    }
                    None => Ok(FlowControl::Next(Object::Undefined)),
                }
            }
            StmtKind::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    let scope = Environment::with_parent(Rc::clone(&self.env));
                    match self.execute_block(body, scope)? {
                        FlowControl::Next(_) | FlowControl::Continue => {}
                        FlowControl::Break => break,
                        flow @ FlowControl::Return(_) => return Ok(flow),
                    }
                }
                Ok(FlowControl::Next(Object::Undefined))
            }
            StmtKind::For {
                binding,
                iterable,
                body,
            } => {
                let iterable = self.evaluate(iterable)?;
                let items = iterate(iterable)?;
                for item in items {
                    let scope = Environment::with_parent(Rc::clone(&self.env));
                    scope.borrow_mut().define(binding.clone(), item);
                    match self.execute_block(body, scope)? {
                        FlowControl::Next(_) | FlowControl::Continue => {}
                        FlowControl::Break => break,
                        flow @ FlowControl::Return(_) => return Ok(flow),
                    }
                }
                Ok(FlowControl::Next(Object::Undefined))
            }
            StmtKind::Try {
                body,
                binding,
                handler,
            } => {
                let scope = Environment::with_parent(Rc::clone(&self.env));
                match self.execute_block(body, scope) {
                    Ok(flow) => Ok(settle(flow)),
                    Err(Halt::Raise(payload)) => {
                        let scope = Environment::with_parent(Rc::clone(&self.env));
                        scope.borrow_mut().define(binding.clone(), payload);
                        Ok(settle(self.execute_block(handler, scope)?))
                    }
                    Err(exit @ Halt::Exit(_)) => Err(exit),
                }
            }
            StmtKind::Throw(expr) => Err(Halt::Raise(self.evaluate(expr)?)),
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.evaluate(expr)?,
                    None => Object::Undefined,
                };
                Ok(FlowControl::Return(value))
            }
            StmtKind::Break => Ok(FlowControl::Break),
            StmtKind::Continue => Ok(FlowControl::Continue),
        }
    }

    /// Runs `statements` inside `scope`, restoring the current scope afterwards
    /// whether or not they complete.
    fn execute_block(&mut self, statements: &[Stmt], scope: EnvironmentRef) -> Eval<FlowControl> {
        let prev = std::mem::replace(&mut self.env, scope);
        let result = self.execute_sequence(statements);
        self.env = prev;
        result
    }

    fn execute_sequence(&mut self, statements: &[Stmt]) -> Eval<FlowControl> {
        let mut last_value = Object::Undefined;
        for stmt in statements {
            match self.execute_statement(stmt)? {
                FlowControl::Next(value) => last_value = value,
                other => return Ok(other),
            }
        }
        Ok(FlowControl::Next(last_value))
    }

    fn evaluate(&mut self, expr: &Expr) -> Eval<Object> {
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(literal(lit)),
            ExprKind::Variable(name) => Environment::get(&self.env, name),
            ExprKind::Binary { op, left, right } => self.binary(*op, left, right),
            ExprKind::Unary { op, expr } => {
                let value = self.evaluate(expr)?;
                match op {
                    UnaryOp::Negate => Ok(Object::Number(-value.as_number()?)),
                    UnaryOp::Not => Ok(Object::Boolean(!value.is_truthy())),
                }
            }
            ExprKind::Assign { target, value } => {
                let value = self.evaluate(value)?;
                self.assign(target, value.clone())?;
                Ok(value)
            }
            ExprKind::Call { callee, args } => {
                let (function, receiver) = match &callee.kind {
                    ExprKind::Field { target, field } => {
                        let receiver = self.evaluate(target)?;
                        (member(&receiver, field)?, Some(receiver))
                    }
                    _ => (self.evaluate(callee)?, None),
                };
                let mut arguments = Vec::with_capacity(args.len());
                for arg in args {
                    arguments.push(self.evaluate(arg)?);
                }
                self.call(&function, receiver.as_ref(), arguments)
            }
            ExprKind::ArrayLiteral(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.evaluate(element)?);
                }
                Ok(Object::array(values))
            }
            ExprKind::MapLiteral(entries) => {
                let mut map = IndexMap::new();
                for (key, value_expr) in entries {
                    let value = self.evaluate(value_expr)?;
                    map.insert(key.clone(), value);
                }
                Ok(Object::map(map))
            }
            ExprKind::Index { target, index } => {
                let target = self.evaluate(target)?;
                let index = self.evaluate(index)?;
                index_of(&target, &index)
            }
            ExprKind::Field { target, field } => {
                let target = self.evaluate(target)?;
                member(&target, field)
            }
            ExprKind::Function(decl) => Ok(self.closure(decl)),
        }
    }

    fn closure(&self, decl: &Rc<FunctionDecl>) -> Object {
        Object::user(UserFunction {
            decl: Rc::clone(decl),
            env: Rc::clone(&self.env),
        })
    }

    fn binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Eval<Object> {
        let left = self.evaluate(left)?;
        match op {
            BinaryOp::And if !left.is_truthy() => return Ok(Object::Boolean(false)),
            BinaryOp::Or if left.is_truthy() => return Ok(Object::Boolean(true)),
            _ => {}
        }
        let right = self.evaluate(right)?;
        use BinaryOp::*;
        match op {
            And | Or => Ok(Object::Boolean(right.is_truthy())),
            Add => match (&left, &right) {
                (Object::Text(_), _) | (_, Object::Text(_)) => {
                    Ok(Object::text(format!("{left}{right}")))
                }
                _ => Ok(Object::Number(left.as_number()? + right.as_number()?)),
            },
            Sub => Ok(Object::Number(left.as_number()? - right.as_number()?)),
            Mul => Ok(Object::Number(left.as_number()? * right.as_number()?)),
            Div => Ok(Object::Number(left.as_number()? / right.as_number()?)),
            Mod => Ok(Object::Number(left.as_number()? % right.as_number()?)),
            Equal => Ok(Object::Boolean(left.equals(&right))),
            NotEqual => Ok(Object::Boolean(!left.equals(&right))),
            Less | LessEqual | Greater | GreaterEqual => {
                let ordering = match (&left, &right) {
                    (Object::Text(a), Object::Text(b)) => a.cmp(b),
                    _ => left
                        .as_number()?
                        .partial_cmp(&right.as_number()?)
                        .ok_or_else(|| Halt::raise("Cannot compare NaN"))?,
                };
                Ok(Object::Boolean(match op {
                    Less => ordering.is_lt(),
                    LessEqual => ordering.is_le(),
                    Greater => ordering.is_gt(),
                    _ => ordering.is_ge(),
                }))
            }
        }
    }

    fn call(
        &mut self,
        callee: &Object,
        receiver: Option<&Object>,
        args: Vec<Object>,
    ) -> Eval<Object> {
        let Object::Function(function) = callee else {
            return Err(Halt::raise(format!(
                "Cannot call a value of type {}",
                callee.type_name()
            )));
        };
        match &**function {
            Function::Native(native) => native.call(&mut *self.out, receiver, &args),
            Function::User(user) => {
                let params = &user.decl.params;
                if args.len() != params.len() {
                    return Err(Halt::raise(format!(
                        "Function {} expects {} arguments, got {}",
                        function.name(),
                        params.len(),
                        args.len()
                    )));
                }
                if self.call_depth >= MAX_CALL_DEPTH {
                    return Err(Halt::raise(format!(
                        "Recursion limit exceeded ({MAX_CALL_DEPTH} calls)"
                    )));
                }
                let scope = Environment::with_parent(Rc::clone(&user.env));
                for (name, value) in params.iter().zip(args) {
                    scope.borrow_mut().define(name.clone(), value);
                }
                self.call_depth += 1;
                let flow = self.execute_block(&user.decl.body, scope);
                self.call_depth -= 1;
                match flow? {
                    FlowControl::Next(value) | FlowControl::Return(value) => Ok(value),
                    FlowControl::Break | FlowControl::Continue => Err(Halt::raise(
                        "Loop control cannot escape a function body",
                    )),
                }
            }
        }
    }

    fn assign(&mut self, target: &Expr, value: Object) -> Eval<()> {
        match &target.kind {
            ExprKind::Variable(name) => Environment::assign(&self.env, name, value),
            ExprKind::Field { target, field } => match self.evaluate(target)? {
                Object::Map(map) => {
                    map.borrow_mut().insert(field.clone(), value);
                    Ok(())
                }
                other => Err(Halt::raise(format!(
                    "Cannot set field '{field}' on {}",
                    other.type_name()
                ))),
            },
            ExprKind::Index { target, index } => {
                let container = self.evaluate(target)?;
                let index = self.evaluate(index)?;
                match (&container, &index) {
                    (Object::Array(values), Object::Number(_)) => {
                        let mut values = values.borrow_mut();
                        let idx = array_index(&index, values.len())?;
                        values[idx] = value;
                        Ok(())
                    }
                    (Object::Map(map), Object::Text(key)) => {
                        map.borrow_mut().insert(key.to_string(), value);
                        Ok(())
                    }
                    _ => Err(Halt::raise(format!(
                        "Cannot index {} with {}",
                        container.type_name(),
                        index.type_name()
                    ))),
                }
            }
            _ => Err(Halt::raise("Invalid assignment target")),
        }
    }
}

/// Snapshot of the items a `for` loop visits. Arrays are copied up front so
/// the body may mutate them.
fn iterate(value: Object) -> Eval<Vec<Object>> {
    match value {
        Object::Array(values) => Ok(values.borrow().clone()),
        Object::Text(text) => Ok(text.chars().map(|c| Object::text(c.to_string())).collect()),
        Object::Map(map) => Ok(map.borrow().keys().map(|k| Object::text(k.clone())).collect()),
        other => Err(Halt::raise(format!(
            "Cannot iterate over {}",
            other.type_name()
        ))),
    }
}

/// Turns a finished `if`/`try` branch into the statement's flow; a normal
/// completion yields undefined.
fn settle(flow: FlowControl) -> FlowControl {
    match flow {
        FlowControl::Next(_) => FlowControl::Next(Object::Undefined),
        other => other,
    }
}

fn literal(literal: &Literal) -> Object {
    match literal {
        Literal::Number(n) => Object::Number(*n),
        Literal::Bool(b) => Object::Boolean(*b),
        Literal::String(s) => Object::text(s.clone()),
        Literal::Undefined => Object::Undefined,
    }
}

fn member(target: &Object, name: &str) -> Eval<Object> {
    if let Object::Map(map) = target {
        if let Some(value) = map.borrow().get(name) {
            return Ok(value.clone());
        }
    }
    if let Some(method) = methods::lookup(target, name) {
        return Ok(method);
    }
    match target {
        Object::Map(_) => Ok(Object::Undefined),
        other => Err(Halt::raise(format!(
            "{} has no member '{name}'",
            other.type_name()
        ))),
    }
}

fn index_of(target: &Object, index: &Object) -> Eval<Object> {
    match (target, index) {
        (Object::Array(values), Object::Number(_)) => {
            let values = values.borrow();
            let idx = array_index(index, values.len())?;
            Ok(values[idx].clone())
        }
        (Object::Text(text), Object::Number(_)) => {
            let idx = array_index(index, text.chars().count())?;
            Ok(text
                .chars()
                .nth(idx)
                .map(|ch| Object::text(ch.to_string()))
                .unwrap_or(Object::Undefined))
        }
        (Object::Map(map), Object::Text(key)) => {
            Ok(map.borrow().get(&**key).cloned().unwrap_or(Object::Undefined))
        }
        _ => Err(Halt::raise(format!(
            "Cannot index {} with {}",
            target.type_name(),
            index.type_name()
        ))),
    }
}

fn array_index(index: &Object, len: usize) -> Eval<usize> {
    let n = index.as_number()?;
    if n.fract() != 0.0 || n < 0.0 || n >= len as f64 {
        return Err(Halt::raise(format!(
            "Index {} out of bounds for length {len}",
            Object::Number(n)
        )));
    }
    Ok(n as usize)
}
