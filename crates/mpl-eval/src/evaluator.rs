//! Core statement and expression evaluator.
//!
//! Tree-walking: each node is evaluated by case dispatch on its tag.
//! Side effects are confined to the [`Environment`], the [`GridHost`]
//! port, and the function/rule tables. `return` unwinds through
//! [`RuntimeError::Return`], which never escapes a call boundary.

use crate::env::Environment;
use crate::error::{RuntimeError, RuntimeResult};
use crate::host::GridHost;
use crate::value::{FnTable, FunctionValue, Value};
use mpl_types::ast::*;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Builtin names recognized at the call-evaluation site.
///
/// User `function`/`rule` declarations shadow these; `var` bindings do
/// not (spec'd dispatch order: rules, functions, builtins, variables).
const BUILTIN_NAMES: &[&str] = &[
    "set",
    "clear",
    "step",
    "layer",
    "print",
    "random",
    "seed",
    "activate",
    "deactivate",
    "cellAt",
    "neighborsAlive",
    "neighborSum",
    "neighborCount",
    "neighborMax",
];

/// Returns `true` if the given name is a recognized builtin.
///
/// Rule staging uses this to reject rule names that would collide.
pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

/// Safety limits applied during evaluation.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Maximum function/rule call depth.
    pub max_call_depth: usize,
    /// Optional cap on evaluated nodes (`None` = unlimited).
    pub op_budget: Option<u64>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_call_depth: 1000,
            op_budget: None,
        }
    }
}

/// The tree-walking evaluator.
///
/// Borrows the persistent language state (environment + declaration
/// tables) and the host port; one `Evaluator` drives one `run()` or one
/// rule-body invocation.
pub struct Evaluator<'a, H: GridHost> {
    env: &'a mut Environment,
    functions: &'a mut FnTable,
    rules: &'a mut FnTable,
    host: &'a mut H,
    limits: Limits,
    call_depth: usize,
    ops: u64,
    cancel: Option<&'a AtomicBool>,
}

impl<'a, H: GridHost> Evaluator<'a, H> {
    /// Create an evaluator with default limits.
    pub fn new(
        env: &'a mut Environment,
        functions: &'a mut FnTable,
        rules: &'a mut FnTable,
        host: &'a mut H,
    ) -> Self {
        Self {
            env,
            functions,
            rules,
            host,
            limits: Limits::default(),
            call_depth: 0,
            ops: 0,
            cancel: None,
        }
    }

    /// Override the safety limits.
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Attach a cooperative cancellation flag, checked between
    /// statements and on every loop iteration.
    pub fn with_cancel_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    // ── Budget & cancellation ─────────────────────────────────────────────

    fn spend(&mut self) -> RuntimeResult<()> {
        self.ops += 1;
        if let Some(budget) = self.limits.op_budget {
            if self.ops > budget {
                return Err(RuntimeError::OpBudgetExhausted);
            }
        }
        Ok(())
    }

    fn check_cancelled(&self) -> RuntimeResult<()> {
        if let Some(flag) = self.cancel {
            if flag.load(Ordering::Relaxed) {
                return Err(RuntimeError::Cancelled);
            }
        }
        Ok(())
    }

    // ══════════════════════════════════════════════════════════════════════
    // Program & statements
    // ══════════════════════════════════════════════════════════════════════

    /// Execute a whole program. Stops at the first runtime error; the
    /// environment keeps every mutation committed before the failure.
    pub fn run(&mut self, program: &Program) -> RuntimeResult<()> {
        for stmt in &program.stmts {
            self.check_cancelled()?;
            self.exec_stmt(stmt)?;
        }
        Ok(())
    }

    /// Execute one statement.
    pub fn exec_stmt(&mut self, stmt: &Stmt) -> RuntimeResult<()> {
        self.spend()?;
        match stmt {
            Stmt::Var(decl) => {
                for declarator in &decl.declarators {
                    let value = match &declarator.init {
                        Some(init) => self.eval_expr(init)?,
                        None => Value::Undefined,
                    };
                    self.env.define(&declarator.name.name, value);
                }
                Ok(())
            }
            Stmt::Function(decl) => {
                let func = Rc::new(FunctionValue {
                    name: decl.name.name.clone(),
                    params: decl.params.iter().map(|p| p.name.clone()).collect(),
                    body: decl.body.clone(),
                    is_rule: false,
                });
                self.functions.insert(decl.name.name.clone(), func);
                Ok(())
            }
            Stmt::Rule(decl) => {
                let rule = Rc::new(FunctionValue {
                    name: decl.name.name.clone(),
                    params: decl.params.iter().map(|p| p.name.clone()).collect(),
                    body: decl.body.clone(),
                    is_rule: true,
                });
                self.rules.insert(decl.name.name.clone(), rule);
                Ok(())
            }
            Stmt::If(stmt) => {
                if self.eval_expr(&stmt.condition)?.is_truthy() {
                    self.exec_stmt(&stmt.then_branch)
                } else if let Some(else_branch) = &stmt.else_branch {
                    self.exec_stmt(else_branch)
                } else {
                    Ok(())
                }
            }
            Stmt::While(stmt) => {
                while self.eval_expr(&stmt.condition)?.is_truthy() {
                    self.check_cancelled()?;
                    self.spend()?;
                    self.exec_stmt(&stmt.body)?;
                }
                Ok(())
            }
            Stmt::For(stmt) => {
                self.env.push_scope();
                let result = self.exec_for(stmt);
                self.env.pop_scope();
                result
            }
            Stmt::ForOf(stmt) => {
                let iterable = self.eval_expr(&stmt.iterable)?;
                let items: Vec<Value> = match iterable {
                    Value::Array(items) => items,
                    Value::Object(fields) => fields.into_values().collect(),
                    other => {
                        return Err(RuntimeError::NotIterable(format!(
                            "cannot iterate a {}",
                            other.type_name()
                        )))
                    }
                };
                self.env.push_scope();
                let mut result = Ok(());
                for item in items {
                    if let Err(e) = self.check_cancelled() {
                        result = Err(e);
                        break;
                    }
                    self.env.define(&stmt.binding.name, item);
                    if let Err(e) = self.exec_stmt(&stmt.body) {
                        result = Err(e);
                        break;
                    }
                }
                self.env.pop_scope();
                result
            }
            Stmt::Return(stmt) => {
                let value = match &stmt.value {
                    Some(expr) => self.eval_expr(expr)?,
                    None => Value::Undefined,
                };
                Err(RuntimeError::Return(value))
            }
            Stmt::Block(block) => {
                self.env.push_scope();
                let result = self.exec_stmts(&block.stmts);
                self.env.pop_scope();
                result
            }
            Stmt::Expr(stmt) => {
                self.eval_expr(&stmt.expr)?;
                Ok(())
            }
        }
    }

    fn exec_stmts(&mut self, stmts: &[Stmt]) -> RuntimeResult<()> {
        for stmt in stmts {
            self.exec_stmt(stmt)?;
        }
        Ok(())
    }

    fn exec_for(&mut self, stmt: &ForStmt) -> RuntimeResult<()> {
        if let Some(init) = &stmt.init {
            self.exec_stmt(init)?;
        }
        loop {
            self.check_cancelled()?;
            self.spend()?;
            if let Some(condition) = &stmt.condition {
                if !self.eval_expr(condition)?.is_truthy() {
                    break;
                }
            }
            self.exec_stmt(&stmt.body)?;
            if let Some(increment) = &stmt.increment {
                self.eval_expr(increment)?;
            }
        }
        Ok(())
    }

    // ══════════════════════════════════════════════════════════════════════
    // Expressions
    // ══════════════════════════════════════════════════════════════════════

    /// Evaluate an expression to a [`Value`].
    pub fn eval_expr(&mut self, expr: &Expr) -> RuntimeResult<Value> {
        self.spend()?;
        match &expr.kind {
            ExprKind::Number(n) => Ok(Value::Number(*n)),
            ExprKind::Str(s) => Ok(Value::Str(s.clone())),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Array(elements) => {
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    items.push(self.eval_expr(element)?);
                }
                Ok(Value::Array(items))
            }
            ExprKind::Object(entries) => {
                let mut fields = indexmap::IndexMap::new();
                for entry in entries {
                    let value = self.eval_expr(&entry.value)?;
                    fields.insert(entry.key.name.clone(), value);
                }
                Ok(Value::Object(fields))
            }
            ExprKind::Identifier(name) => self.eval_identifier(name),
            ExprKind::Call { callee, args } => self.eval_call(callee, args),
            ExprKind::Member { object, property } => {
                let object = self.eval_expr(object)?;
                self.eval_member(object, property)
            }
            ExprKind::Binary { left, op, right } => self.eval_binary(left, *op, right),
            ExprKind::Unary { op, operand } => {
                let operand = self.eval_expr(operand)?;
                self.eval_unary(*op, operand)
            }
            ExprKind::Assign { target, value } => {
                let value = self.eval_expr(value)?;
                self.assign(target, value.clone())?;
                Ok(value)
            }
        }
    }

    fn eval_identifier(&mut self, name: &str) -> RuntimeResult<Value> {
        if let Some(value) = self.env.get(name) {
            return Ok(value.clone());
        }
        // Declared functions and rules are first-class values.
        if let Some(func) = self.rules.get(name).or_else(|| self.functions.get(name)) {
            return Ok(Value::Function(Rc::clone(func)));
        }
        Err(RuntimeError::UndefinedVariable(name.to_string()))
    }

    // ── Member access ─────────────────────────────────────────────────────

    fn eval_member(&mut self, object: Value, property: &MemberProp) -> RuntimeResult<Value> {
        let key = match property {
            MemberProp::Name(ident) => Value::Str(ident.name.clone()),
            MemberProp::Index(index) => self.eval_expr(index)?,
        };
        match (&object, &key) {
            (Value::Object(fields), _) => {
                let key = member_key(&key);
                Ok(fields.get(&key).cloned().unwrap_or(Value::Undefined))
            }
            (Value::Array(items), Value::Str(s)) if s == "length" => {
                Ok(Value::Number(items.len() as f64))
            }
            (Value::Array(items), Value::Number(n)) => {
                Ok(array_index(*n, items.len())
                    .and_then(|i| items.get(i).cloned())
                    .unwrap_or(Value::Undefined))
            }
            (Value::Str(s), Value::Str(key)) if key == "length" => {
                Ok(Value::Number(s.chars().count() as f64))
            }
            (Value::Str(s), Value::Number(n)) => Ok(array_index(*n, s.chars().count())
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::Str(c.to_string()))
                .unwrap_or(Value::Undefined)),
            _ => Err(RuntimeError::TypeMismatch(format!(
                "cannot read property {} of {}",
                key.display_string(),
                object.type_name()
            ))),
        }
    }

    // ── Assignment ────────────────────────────────────────────────────────

    fn assign(&mut self, target: &Expr, value: Value) -> RuntimeResult<()> {
        match &target.kind {
            ExprKind::Identifier(name) => {
                if self.env.assign(name, value) {
                    Ok(())
                } else {
                    Err(RuntimeError::UndefinedVariable(name.clone()))
                }
            }
            ExprKind::Member { .. } => {
                // Flatten the access chain down to the base identifier,
                // evaluating index expressions left to right.
                let mut segments = Vec::new();
                let mut current = target;
                let base = loop {
                    match &current.kind {
                        ExprKind::Member { object, property } => {
                            let seg = match property {
                                MemberProp::Name(ident) => Value::Str(ident.name.clone()),
                                MemberProp::Index(index) => self.eval_expr(index)?,
                            };
                            segments.push(seg);
                            current = object;
                        }
                        ExprKind::Identifier(name) => break name.clone(),
                        _ => {
                            return Err(RuntimeError::TypeMismatch(
                                "assignment target must be rooted in a variable".to_string(),
                            ))
                        }
                    }
                };
                segments.reverse();

                let mut root = self
                    .env
                    .get(&base)
                    .cloned()
                    .ok_or_else(|| RuntimeError::UndefinedVariable(base.clone()))?;
                assign_path(&mut root, &segments, value)?;
                self.env.assign(&base, root);
                Ok(())
            }
            _ => Err(RuntimeError::TypeMismatch(
                "invalid assignment target".to_string(),
            )),
        }
    }

    // ── Operators ─────────────────────────────────────────────────────────

    fn eval_binary(&mut self, left: &Expr, op: BinOp, right: &Expr) -> RuntimeResult<Value> {
        // Short-circuit logical operators before touching the right side.
        match op {
            BinOp::And => {
                let lhs = self.eval_expr(left)?;
                if !lhs.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                let rhs = self.eval_expr(right)?;
                return Ok(Value::Bool(rhs.is_truthy()));
            }
            BinOp::Or => {
                let lhs = self.eval_expr(left)?;
                if lhs.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                let rhs = self.eval_expr(right)?;
                return Ok(Value::Bool(rhs.is_truthy()));
            }
            _ => {}
        }

        let lhs = self.eval_expr(left)?;
        let rhs = self.eval_expr(right)?;

        match op {
            BinOp::Eq => Ok(Value::Bool(lhs == rhs)),
            BinOp::NotEq => Ok(Value::Bool(lhs != rhs)),

            BinOp::Add => match (&lhs, &rhs) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                (Value::Str(_), Value::Str(_)) => {
                    // Numeric-like string pairs coerce; anything else
                    // concatenates.
                    match (lhs.as_numeric_string(), rhs.as_numeric_string()) {
                        (Some(a), Some(b)) => Ok(Value::Number(a + b)),
                        _ => Ok(Value::Str(format!(
                            "{}{}",
                            lhs.display_string(),
                            rhs.display_string()
                        ))),
                    }
                }
                _ => Err(type_mismatch(op, &lhs, &rhs)),
            },

            BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => {
                let (a, b) = numeric_operands(op, &lhs, &rhs)?;
                // Division by zero propagates IEEE inf/NaN — no trap.
                Ok(Value::Number(match op {
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Rem => a % b,
                    _ => unreachable!(),
                }))
            }

            BinOp::Less | BinOp::LessEq | BinOp::Greater | BinOp::GreaterEq => {
                match (&lhs, &rhs) {
                    (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(compare(op, *a, *b))),
                    (Value::Str(a), Value::Str(b)) => {
                        // Lexicographic, unless both are numeric-like.
                        match (lhs.as_numeric_string(), rhs.as_numeric_string()) {
                            (Some(a), Some(b)) => Ok(Value::Bool(compare(op, a, b))),
                            _ => Ok(Value::Bool(match op {
                                BinOp::Less => a < b,
                                BinOp::LessEq => a <= b,
                                BinOp::Greater => a > b,
                                BinOp::GreaterEq => a >= b,
                                _ => unreachable!(),
                            })),
                        }
                    }
                    _ => Err(type_mismatch(op, &lhs, &rhs)),
                }
            }

            BinOp::And | BinOp::Or => unreachable!("handled above"),
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: Value) -> RuntimeResult<Value> {
        match op {
            UnaryOp::Neg => match operand {
                Value::Number(n) => Ok(Value::Number(-n)),
                other => Err(RuntimeError::TypeMismatch(format!(
                    "cannot negate a {}",
                    other.type_name()
                ))),
            },
            UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy())),
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Calls
    // ══════════════════════════════════════════════════════════════════════

    fn eval_call(&mut self, callee: &Expr, args: &[Expr]) -> RuntimeResult<Value> {
        // `Math.*` passthrough — only when `Math` is not a user variable.
        if let ExprKind::Member {
            object,
            property: MemberProp::Name(prop),
        } = &callee.kind
        {
            if matches!(&object.kind, ExprKind::Identifier(m) if m == "Math")
                && self.env.get("Math").is_none()
            {
                let argv = self.eval_args(args)?;
                return self.call_math(&prop.name, argv);
            }
        }

        if let ExprKind::Identifier(name) = &callee.kind {
            let argv = self.eval_args(args)?;
            // Dispatch order: rules, functions, builtins, then variables
            // holding function values. Rules/functions shadow builtins;
            // plain variables do not.
            if let Some(rule) = self.rules.get(name).cloned() {
                return self.call_function(&rule, argv);
            }
            if let Some(func) = self.functions.get(name).cloned() {
                return self.call_function(&func, argv);
            }
            if is_builtin(name) {
                return self.call_builtin(name, argv);
            }
            if let Some(Value::Function(func)) = self.env.get(name).cloned() {
                return self.call_function(&func, argv);
            }
            return Err(RuntimeError::UndefinedCallable(name.clone()));
        }

        // Arbitrary callee expression: must evaluate to a function value.
        let callee_value = self.eval_expr(callee)?;
        let argv = self.eval_args(args)?;
        match callee_value {
            Value::Function(func) => self.call_function(&func, argv),
            other => Err(RuntimeError::TypeMismatch(format!(
                "cannot call a {}",
                other.type_name()
            ))),
        }
    }

    fn eval_args(&mut self, args: &[Expr]) -> RuntimeResult<Vec<Value>> {
        let mut argv = Vec::with_capacity(args.len());
        for arg in args {
            argv.push(self.eval_expr(arg)?);
        }
        Ok(argv)
    }

    /// Invoke a user function or rule: fresh frame chained to globals,
    /// positional parameter binding (missing args bind `undefined`,
    /// extras are ignored), `return` unwinds to here.
    pub fn call_function(
        &mut self,
        func: &Rc<FunctionValue>,
        args: Vec<Value>,
    ) -> RuntimeResult<Value> {
        if self.call_depth >= self.limits.max_call_depth {
            return Err(RuntimeError::StackOverflow {
                limit: self.limits.max_call_depth,
            });
        }
        self.call_depth += 1;

        let saved = self.env.take_locals();
        self.env.push_scope();
        for (i, param) in func.params.iter().enumerate() {
            let value = args.get(i).cloned().unwrap_or(Value::Undefined);
            self.env.define(param, value);
        }

        let outcome = self.exec_stmts(&func.body.stmts);

        self.env.pop_scope();
        self.env.restore_locals(saved);
        self.call_depth -= 1;

        match outcome {
            Ok(()) => Ok(Value::Undefined),
            Err(RuntimeError::Return(value)) => Ok(value),
            Err(err) => Err(err),
        }
    }

    // ── Builtins ──────────────────────────────────────────────────────────

    fn call_builtin(&mut self, name: &str, args: Vec<Value>) -> RuntimeResult<Value> {
        match name {
            "set" => {
                let x = num_arg(&args, 0, "set")?;
                let y = num_arg(&args, 1, "set")?;
                let z = opt_num_arg(&args, 2, "set")?.unwrap_or(0.0);
                self.host.set_cell(x, y, z)?;
                Ok(Value::Undefined)
            }
            "clear" => {
                self.host.clear()?;
                Ok(Value::Undefined)
            }
            "step" => {
                self.host.step()?;
                Ok(Value::Undefined)
            }
            "layer" => {
                let index = num_arg(&args, 0, "layer")?;
                self.host.select_layer(index)?;
                Ok(Value::Undefined)
            }
            "print" => {
                let text: Vec<String> = args.iter().map(|v| v.display_string()).collect();
                self.host.print(&text.join(" "));
                Ok(Value::Undefined)
            }
            "random" => Ok(Value::Number(self.host.random())),
            "seed" => {
                let seed = num_arg(&args, 0, "seed")?;
                if !seed.is_finite() || seed < 0.0 {
                    return Err(RuntimeError::InvalidArgument(
                        "seed(n) requires a non-negative finite number".to_string(),
                    ));
                }
                self.host.reseed(seed as u64);
                Ok(Value::Undefined)
            }
            "activate" => {
                let rule_name = match args.first() {
                    Some(Value::Str(s)) => s.clone(),
                    _ => {
                        return Err(RuntimeError::InvalidArgument(
                            "activate(name, ...) requires a rule name string".to_string(),
                        ))
                    }
                };
                let rule_args: Vec<Value> = args.into_iter().skip(1).collect();
                let resolved = self.rules.get(&rule_name).cloned().map(|rule| {
                    // Activation captures the helper tables as of now —
                    // functions first, rules override on name clash to
                    // match call dispatch order.
                    let mut helpers = self.functions.clone();
                    for (name, rule) in self.rules.iter() {
                        helpers.insert(name.clone(), Rc::clone(rule));
                    }
                    (rule, helpers)
                });
                self.host.activate_rule(&rule_name, resolved, rule_args)?;
                Ok(Value::Undefined)
            }
            "deactivate" => {
                let rule_name = match args.first() {
                    Some(Value::Str(s)) => s.clone(),
                    _ => {
                        return Err(RuntimeError::InvalidArgument(
                            "deactivate(name) requires a rule name string".to_string(),
                        ))
                    }
                };
                self.host.deactivate_rule(&rule_name)?;
                Ok(Value::Undefined)
            }
            "cellAt" => {
                let x = num_arg(&args, 0, "cellAt")?;
                let y = num_arg(&args, 1, "cellAt")?;
                let z = opt_num_arg(&args, 2, "cellAt")?.unwrap_or(0.0);
                Ok(Value::Number(self.host.cell_at(x, y, z)))
            }
            "neighborsAlive" | "neighborSum" | "neighborCount" | "neighborMax" => {
                let stats = self
                    .host
                    .neighbor_stats()
                    .ok_or_else(|| RuntimeError::NotInRuleContext(name.to_string()))?;
                Ok(Value::Number(match name {
                    "neighborsAlive" => stats.alive as f64,
                    "neighborSum" => stats.sum,
                    "neighborCount" => stats.count as f64,
                    _ => stats.max as f64,
                }))
            }
            _ => Err(RuntimeError::UndefinedCallable(name.to_string())),
        }
    }

    /// `Math.*` passthrough of standard real-valued functions.
    fn call_math(&mut self, name: &str, args: Vec<Value>) -> RuntimeResult<Value> {
        let unary = |args: &[Value], f: fn(f64) -> f64| -> RuntimeResult<Value> {
            Ok(Value::Number(f(num_arg(args, 0, "Math")?)))
        };
        match name {
            "floor" => unary(&args, f64::floor),
            "ceil" => unary(&args, f64::ceil),
            "round" => unary(&args, f64::round),
            "abs" => unary(&args, f64::abs),
            "sqrt" => unary(&args, f64::sqrt),
            "sin" => unary(&args, f64::sin),
            "cos" => unary(&args, f64::cos),
            "tan" => unary(&args, f64::tan),
            "exp" => unary(&args, f64::exp),
            "log" => unary(&args, f64::ln),
            "pow" => {
                let base = num_arg(&args, 0, "Math.pow")?;
                let exp = num_arg(&args, 1, "Math.pow")?;
                Ok(Value::Number(base.powf(exp)))
            }
            "min" | "max" => {
                if args.is_empty() {
                    return Err(RuntimeError::InvalidArgument(format!(
                        "Math.{name} requires at least one argument"
                    )));
                }
                let mut best = num_arg(&args, 0, "Math")?;
                for i in 1..args.len() {
                    let n = num_arg(&args, i, "Math")?;
                    best = if name == "min" { best.min(n) } else { best.max(n) };
                }
                Ok(Value::Number(best))
            }
            "random" => Ok(Value::Number(self.host.random())),
            _ => Err(RuntimeError::UndefinedCallable(format!("Math.{name}"))),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Free helpers
// ══════════════════════════════════════════════════════════════════════════

/// Fetch a required numeric builtin argument.
fn num_arg(args: &[Value], index: usize, name: &str) -> RuntimeResult<f64> {
    match args.get(index) {
        Some(Value::Number(n)) => Ok(*n),
        Some(other) => Err(RuntimeError::InvalidArgument(format!(
            "{name} expects a number for argument {}, got {}",
            index + 1,
            other.type_name()
        ))),
        None => Err(RuntimeError::InvalidArgument(format!(
            "{name} is missing argument {}",
            index + 1
        ))),
    }
}

/// Fetch an optional numeric builtin argument.
fn opt_num_arg(args: &[Value], index: usize, name: &str) -> RuntimeResult<Option<f64>> {
    match args.get(index) {
        None => Ok(None),
        Some(Value::Number(n)) => Ok(Some(*n)),
        Some(other) => Err(RuntimeError::InvalidArgument(format!(
            "{name} expects a number for argument {}, got {}",
            index + 1,
            other.type_name()
        ))),
    }
}

fn type_mismatch(op: BinOp, lhs: &Value, rhs: &Value) -> RuntimeError {
    RuntimeError::TypeMismatch(format!(
        "'{}' not supported between {} and {}",
        op.symbol(),
        lhs.type_name(),
        rhs.type_name()
    ))
}

/// Resolve both operands of an arithmetic operator to numbers.
/// Coercion applies only when both operands are numeric-like strings.
fn numeric_operands(op: BinOp, lhs: &Value, rhs: &Value) -> RuntimeResult<(f64, f64)> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => Ok((*a, *b)),
        (Value::Str(_), Value::Str(_)) => {
            match (lhs.as_numeric_string(), rhs.as_numeric_string()) {
                (Some(a), Some(b)) => Ok((a, b)),
                _ => Err(type_mismatch(op, lhs, rhs)),
            }
        }
        _ => Err(type_mismatch(op, lhs, rhs)),
    }
}

fn compare(op: BinOp, a: f64, b: f64) -> bool {
    match op {
        BinOp::Less => a < b,
        BinOp::LessEq => a <= b,
        BinOp::Greater => a > b,
        BinOp::GreaterEq => a >= b,
        _ => unreachable!(),
    }
}

/// Convert a member key value to an object key string.
fn member_key(key: &Value) -> String {
    match key {
        Value::Str(s) => s.clone(),
        other => other.display_string(),
    }
}

/// Convert a numeric index into a usize if it addresses a valid slot.
fn array_index(n: f64, len: usize) -> Option<usize> {
    if !n.is_finite() || n < 0.0 {
        return None;
    }
    let idx = n as usize;
    (idx < len).then_some(idx)
}

/// Write `value` into `container` along the evaluated member path.
fn assign_path(container: &mut Value, segments: &[Value], value: Value) -> RuntimeResult<()> {
    let Some((first, rest)) = segments.split_first() else {
        *container = value;
        return Ok(());
    };
    match container {
        Value::Object(fields) => {
            let key = member_key(first);
            let slot = fields.entry(key).or_insert(Value::Undefined);
            assign_path(slot, rest, value)
        }
        Value::Array(items) => {
            let idx = match first {
                Value::Number(n) if n.is_finite() && *n >= 0.0 && n.fract() == 0.0 => {
                    *n as usize
                }
                other => {
                    return Err(RuntimeError::TypeMismatch(format!(
                        "array index must be a non-negative integer, got {}",
                        other.display_string()
                    )))
                }
            };
            if idx >= items.len() {
                items.resize(idx + 1, Value::Undefined);
            }
            assign_path(&mut items[idx], rest, value)
        }
        other => Err(RuntimeError::TypeMismatch(format!(
            "cannot assign into a {}",
            other.type_name()
        ))),
    }
}
