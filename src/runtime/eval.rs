use crate::language::expr::{self, BinaryOp, Expr};
use crate::language::tokenizer::{find_top_level, matching_paren};
use crate::runtime::{
    error::{RuntimeError, RuntimeResult},
    interpreter::Interpreter,
    stack::ensure_sufficient_stack,
    value::{self, ArithmeticError, Comparison, Variable},
};

/// Why a subtree could not produce a value. `Unsupported` degrades to the
/// expression's own text; `Fatal` aborts the statement.
enum EvalError {
    Unsupported,
    Fatal(RuntimeError),
}

type EvalResult = Result<Variable, EvalError>;

impl Interpreter {
    /// Resolves expression text to a value. Defined variables and literals
    /// win outright; anything that does not evaluate becomes a string of the
    /// original text. Only fatal errors escape.
    pub(crate) fn evaluate(&mut self, text: &str) -> RuntimeResult<Variable> {
        let text = text.trim();
        let found = self.env.resolve(text);
        if found.is_defined() {
            return Ok(found);
        }
        let Some(tree) = expr::parse_expression(text) else {
            return Ok(Variable::string("literal", text));
        };
        match self.eval_expr(&tree) {
            Ok(value) => Ok(value),
            Err(EvalError::Unsupported) => Ok(Variable::string("literal", text)),
            Err(EvalError::Fatal(err)) => Err(err),
        }
    }

    fn eval_expr(&mut self, expr: &Expr) -> EvalResult {
        ensure_sufficient_stack(|| self.eval_node(expr))
    }

    fn eval_node(&mut self, expr: &Expr) -> EvalResult {
        match expr {
            Expr::Number(text) => Variable::literal(text).ok_or(EvalError::Unsupported),
            Expr::Str(text) => Ok(Variable::string("literal", text.as_str())),
            Expr::Identifier(name) => {
                let found = self.env.resolve(name);
                if found.is_defined() {
                    Ok(found)
                } else {
                    Ok(Variable::string(name.as_str(), name.as_str()))
                }
            }
            Expr::Neg(inner) => {
                let value = self.eval_expr(inner)?;
                self.apply(BinaryOp::Sub, &Variable::integer("zero", 0), &value)
            }
            Expr::Binary { left, op, right } => {
                let left = self.eval_expr(left)?;
                let right = self.eval_expr(right)?;
                self.apply(*op, &left, &right)
            }
            Expr::Call { name, args } => self.call_expr(name, args),
            Expr::MethodCall {
                object,
                method,
                args,
            } => self.method_expr(object, method, args),
        }
    }

    fn apply(&mut self, op: BinaryOp, left: &Variable, right: &Variable) -> EvalResult {
        match value::arithmetic(op, left, right) {
            Ok(result) => Ok(result),
            Err(ArithmeticError::DivisionByZero) => {
                self.report(&RuntimeError::DivisionByZero);
                Ok(Variable::error("Division by zero"))
            }
            Err(ArithmeticError::Unsupported) => Err(EvalError::Unsupported),
        }
    }

    /// Argument values; a subtree that does not evaluate is passed as text.
    fn eval_arg(&mut self, arg: &Expr) -> EvalResult {
        match self.eval_expr(arg) {
            Err(EvalError::Unsupported) => Ok(Variable::string("literal", arg.as_source())),
            other => other,
        }
    }

    fn call_expr(&mut self, name: &str, args: &[Expr]) -> EvalResult {
        let mut values = Vec::with_capacity(args.len());
        for (idx, arg) in args.iter().enumerate() {
            // Library and symbol names are taken as written.
            let value = match (name, idx, arg.as_name()) {
                ("libcall", 0 | 1, Some(text)) => Variable::string("name", text),
                _ => self.eval_arg(arg)?,
            };
            values.push(value);
        }
        let result = self.call(name, values);
        self.absorb(result)
    }

    fn method_expr(&mut self, object: &str, method: &str, args: &[Expr]) -> EvalResult {
        if object == "fmem" && method == "read" {
            let names: Vec<String> = args
                .iter()
                .map(|arg| arg.as_name().map_or_else(|| arg.as_source(), str::to_string))
                .collect();
            let result = self.fmem_read(&names);
            return self.absorb(result);
        }
        let target = self.env.resolve(object);
        match (method, args) {
            ("contains", [needle]) => {
                if !(target.is_defined() && target.is_string()) {
                    return Ok(Variable::boolean("contains", false));
                }
                let needle = self.eval_arg(needle)?;
                Ok(Variable::boolean(
                    "contains",
                    target.as_str().contains(needle.to_string().as_str()),
                ))
            }
            _ => Err(EvalError::Unsupported),
        }
    }

    /// Failed calls inside an expression are reported and read as zero.
    fn absorb(&mut self, result: RuntimeResult<Variable>) -> EvalResult {
        match result {
            Ok(value) => Ok(value),
            Err(err) if err.is_fatal() => Err(EvalError::Fatal(err)),
            Err(err) => {
                self.report(&err);
                Ok(Variable::integer("result", 0))
            }
        }
    }

    /// User functions first, then built-ins.
    pub(crate) fn call(&mut self, name: &str, args: Vec<Variable>) -> RuntimeResult<Variable> {
        if self.functions.contains_key(name) {
            return self.invoke(name, args);
        }
        match self.call_builtin(name, &args) {
            Some(result) => result,
            None => Err(RuntimeError::UndefinedFunction {
                name: name.to_string(),
            }),
        }
    }

    fn call_builtin(&mut self, name: &str, args: &[Variable]) -> Option<RuntimeResult<Variable>> {
        let value = match name {
            "arch" => Variable::string("arch", self.platform.arch()),
            "flver" => Variable::string("flver", crate::VERSION),
            "clsdef" => Variable::list("clsdef", Vec::new()),
            "input" => return Some(self.read_input()),
            "libcall" => return Some(self.libcall(args)),
            _ => return None,
        };
        Some(Ok(value))
    }

    /// Condition grammar: the first comparison operator found (in
    /// `Comparison::SCAN_ORDER`) splits the text, otherwise literal
    /// `true`/`false`, otherwise the truthiness of the value.
    pub(crate) fn condition(&mut self, text: &str) -> RuntimeResult<bool> {
        let text = text.trim();
        if text.starts_with('(') && matching_paren(text, 0) == Some(text.len() - 1) {
            return self.condition(&text[1..text.len() - 1]);
        }
        for op in Comparison::SCAN_ORDER {
            if let Some(idx) = find_top_level(text, op.symbol()) {
                let left = self.evaluate(&text[..idx])?;
                let right = self.evaluate(&text[idx + op.symbol().len()..])?;
                return Ok(value::compare(op, &left, &right));
            }
        }
        match text {
            "true" | "1" => return Ok(true),
            "false" | "0" => return Ok(false),
            _ => {}
        }
        let found = self.env.resolve(text);
        if found.is_defined() {
            return Ok(found.truthy());
        }
        if !text.contains('(') {
            return Ok(false);
        }
        // A call that does not evaluate is false, not its own (non-empty) text.
        let Some(tree) = expr::parse_expression(text) else {
            return Ok(false);
        };
        match self.eval_expr(&tree) {
            Ok(value) => Ok(value.truthy()),
            Err(EvalError::Unsupported) => Ok(false),
            Err(EvalError::Fatal(err)) => Err(err),
        }
    }
}
