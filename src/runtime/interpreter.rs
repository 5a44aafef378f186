use crate::config::InterpreterConfig;
use crate::diagnostics::Diagnostics;
use crate::language::blocks;
use crate::language::source::{Line, Source};
use crate::language::statement::{self, ElseClause, Statement, Update};
use crate::language::tokenizer::{self, LineForm};
use crate::runtime::{
    environment::{CallFrame, Environment, RETURN_SLOT, Scope},
    error::{RuntimeError, RuntimeResult},
    library::LibraryRegistry,
    memory::{DynamicStore, MemoryLedger},
    platform::{Platform, StdPlatform},
    stack::ensure_sufficient_stack,
    value::{self, ArithmeticError, Variable},
};
use crate::language::expr::BinaryOp;
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, trace};

pub struct FunctionDefinition {
    pub name: String,
    pub params: Vec<String>,
    pub body: Rc<Source>,
}

/// How control leaves a statement or a block.
pub(crate) enum Flow {
    Next(usize),
    Return(Variable),
    Halt,
}

pub struct Interpreter {
    pub(crate) config: InterpreterConfig,
    pub(crate) env: Environment,
    pub(crate) functions: HashMap<String, Rc<FunctionDefinition>>,
    pub(crate) libraries: LibraryRegistry,
    pub(crate) platform: Box<dyn Platform>,
    pub(crate) ledger: MemoryLedger,
    pub(crate) store: DynamicStore,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) output: Box<dyn Write>,
    pub(crate) input: Box<dyn BufRead>,
    source: Option<Rc<Source>>,
    pub(crate) dynamic: bool,
    pub(crate) running: bool,
    pub(crate) current_line: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(InterpreterConfig::default())
    }

    pub fn with_config(config: InterpreterConfig) -> Self {
        Self {
            diagnostics: Diagnostics::new(config.echo_diagnostics),
            config,
            env: Environment::new(),
            functions: HashMap::new(),
            libraries: LibraryRegistry::new(),
            platform: Box::new(StdPlatform),
            ledger: MemoryLedger::new(),
            store: DynamicStore::new(),
            output: Box::new(io::stdout()),
            input: Box::new(io::BufReader::new(io::stdin())),
            source: None,
            dynamic: false,
            running: false,
            current_line: 0,
        }
    }

    pub fn with_platform(mut self, platform: Box<dyn Platform>) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_output(mut self, output: Box<dyn Write>) -> Self {
        self.output = output;
        self
    }

    pub fn with_input(mut self, input: Box<dyn BufRead>) -> Self {
        self.input = input;
        self
    }

    pub fn version(&self) -> &'static str {
        crate::VERSION
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    /// Global binding by bare name.
    pub fn global(&self, name: &str) -> Option<&Variable> {
        self.env.global(name)
    }

    pub fn return_value(&self) -> Variable {
        self.env.return_value()
    }

    pub fn call_depth(&self) -> usize {
        self.env.depth()
    }

    pub fn scope_depth(&self) -> usize {
        self.env.local_depth()
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn load_from_file(&mut self, path: &Path) -> RuntimeResult<()> {
        let text = std::fs::read_to_string(path).map_err(|source| RuntimeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.load_named(&path.display().to_string(), &text);
        Ok(())
    }

    pub fn load_from_text(&mut self, text: &str) -> RuntimeResult<()> {
        self.load_named("<script>", text);
        Ok(())
    }

    fn load_named(&mut self, name: &str, text: &str) {
        let source = Source::parse(text);
        self.dynamic |= source.declares_dynamic();
        debug!(script = name, lines = source.len(), dynamic = self.dynamic, "script loaded");
        self.diagnostics.set_script(name, text);
        self.source = Some(Rc::new(source));
    }

    /// Runs the loaded script from its first line. Stops at the first error
    /// raised directly by a top-level statement.
    pub fn run(&mut self) -> RuntimeResult<()> {
        let source = self.source.clone().ok_or(RuntimeError::NoScriptLoaded)?;
        self.running = true;
        self.env.set_global(
            "ALLMEM",
            Variable::integer("ALLMEM", i64::try_from(self.ledger.total()).unwrap_or(i64::MAX)),
        );
        let result = self.exec_top(&source);
        debug_assert_eq!(self.env.depth(), 0);
        self.env.unwind();
        self.running = false;
        let _ = self.output.flush();
        result
    }

    fn exec_top(&mut self, source: &Rc<Source>) -> RuntimeResult<()> {
        let mut pc = 0;
        while pc < source.len() && self.running {
            match self.exec_line(source, pc) {
                Ok(Flow::Next(next)) => pc = next,
                Ok(Flow::Return(_)) => return Err(self.fail(RuntimeError::ReturnOutsideFunction)),
                Ok(Flow::Halt) => break,
                Err(err) => return Err(self.fail(err)),
            }
        }
        Ok(())
    }

    /// Executes lines `start..end`. Non-fatal errors are reported and the
    /// failing statement (with its block, if it opens one) is skipped.
    pub(crate) fn exec_range(
        &mut self,
        source: &Rc<Source>,
        start: usize,
        end: usize,
    ) -> RuntimeResult<Flow> {
        let mut pc = start;
        while pc < end {
            if !self.running {
                return Ok(Flow::Halt);
            }
            match self.exec_line(source, pc) {
                Ok(Flow::Next(next)) => pc = next,
                Ok(flow) => return Ok(flow),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    self.report(&err);
                    pc = self.skip_statement(source, pc);
                }
            }
        }
        if !self.running {
            return Ok(Flow::Halt);
        }
        Ok(Flow::Next(end))
    }

    fn exec_line(&mut self, source: &Rc<Source>, pc: usize) -> RuntimeResult<Flow> {
        let Some(line) = source.line(pc) else {
            return Ok(Flow::Next(pc + 1));
        };
        self.current_line = line.number;
        if self.config.trace_lines {
            trace!(line = line.number, text = %line.text, "exec");
        }
        let statement = match source.statement(pc) {
            Some(Ok(statement)) => statement,
            Some(Err(message)) => return Err(RuntimeError::syntax(message.clone())),
            None => return Ok(Flow::Next(pc + 1)),
        };
        match statement {
            Statement::Blank | Statement::Close(_) => Ok(Flow::Next(pc + 1)),
            Statement::Else(_) => Err(RuntimeError::syntax("`else` without a matching `if`")),
            Statement::If { condition } => self.exec_if(source, pc, condition),
            Statement::For {
                init,
                condition,
                increment,
            } => self.exec_for(source, pc, init, condition, increment),
            Statement::While { condition } => self.exec_while(source, pc, condition),
            Statement::Function { name, params } => self.define_function(source, pc, name, params),
            Statement::Return(value) => {
                if !self.env.in_call() {
                    return Err(RuntimeError::ReturnOutsideFunction);
                }
                let value = match value {
                    Some(text) => self.evaluate(text)?,
                    None => Variable::integer(RETURN_SLOT, 0),
                };
                Ok(Flow::Return(value))
            }
            Statement::Update(update) => {
                self.apply_update(update)?;
                Ok(Flow::Next(pc + 1))
            }
            Statement::Command(command) => {
                self.exec_command(command)?;
                Ok(Flow::Next(pc + 1))
            }
        }
    }

    fn close_of(&self, source: &Source, opener: usize) -> RuntimeResult<usize> {
        let close = source.blocks().close_of(opener);
        debug_assert_eq!(
            close.map(|close| close + 1),
            blocks::find_block_end(source.lines(), opener + 1)
        );
        close.ok_or_else(|| {
            RuntimeError::syntax(format!(
                "missing closing `}}` for block opened on line {}",
                source.line(opener).map_or(0, |line| line.number)
            ))
        })
    }

    /// Where execution resumes after the statement at `pc` fails.
    fn skip_statement(&self, source: &Source, pc: usize) -> usize {
        match source.statement(pc) {
            Some(Ok(Statement::If { .. })) => self.if_chain_end(source, pc).unwrap_or(pc + 1),
            Some(Ok(
                Statement::For { .. } | Statement::While { .. } | Statement::Function { .. },
            )) => source
                .blocks()
                .close_of(pc)
                .map_or(source.len(), |close| close + 1),
            _ => pc + 1,
        }
    }

    /// The `else` clause continuing an `if` block that closes on `close`,
    /// either on the closing line itself or on the line after it.
    fn else_after(source: &Source, close: usize) -> Option<(usize, ElseClause)> {
        if let Some(Ok(Statement::Close(Some(clause)))) = source.statement(close) {
            return Some((close, clause.clone()));
        }
        if let Some(Ok(Statement::Else(clause))) = source.statement(close + 1) {
            return Some((close + 1, clause.clone()));
        }
        None
    }

    fn if_chain_end(&self, source: &Source, opener: usize) -> RuntimeResult<usize> {
        let mut close = self.close_of(source, opener)?;
        while let Some((next, _)) = Self::else_after(source, close) {
            close = self.close_of(source, next)?;
        }
        Ok(close + 1)
    }

    fn exec_if(&mut self, source: &Rc<Source>, pc: usize, condition: &str) -> RuntimeResult<Flow> {
        let mut opener = pc;
        let mut condition = Some(condition.to_string());
        let mut taken = false;
        loop {
            let close = self.close_of(source, opener)?;
            if !taken {
                let matched = match &condition {
                    Some(text) => self.condition(text)?,
                    None => true,
                };
                if matched {
                    taken = true;
                    debug!(line = self.current_line, "if branch taken");
                    match self.exec_range(source, opener + 1, close)? {
                        Flow::Next(_) => {}
                        flow => return Ok(flow),
                    }
                }
            }
            match Self::else_after(source, close) {
                Some((next, clause)) => {
                    opener = next;
                    condition = clause.condition;
                }
                None => return Ok(Flow::Next(close + 1)),
            }
        }
    }

    fn exec_for(
        &mut self,
        source: &Rc<Source>,
        pc: usize,
        init: &str,
        condition: &str,
        increment: &str,
    ) -> RuntimeResult<Flow> {
        let close = self.close_of(source, pc)?;
        let line = self.current_line;
        self.exec_for_init(init)?;
        loop {
            if !self.running {
                return Ok(Flow::Halt);
            }
            self.current_line = line;
            if !self.condition(condition)? {
                break;
            }
            match self.exec_range(source, pc + 1, close)? {
                Flow::Next(_) => {}
                flow => return Ok(flow),
            }
            self.current_line = line;
            self.exec_increment(increment)?;
        }
        Ok(Flow::Next(close + 1))
    }

    fn exec_for_init(&mut self, init: &str) -> RuntimeResult<()> {
        let line = tokenizer::tokenize(init);
        if line.form != LineForm::Assign {
            return Err(RuntimeError::syntax(format!(
                "for loop initialiser `{init}` is not an assignment"
            )));
        }
        let target = init[..tokenizer::find_assignment(init).unwrap_or(0)].trim();
        let target = if target.contains('.') {
            target.to_string()
        } else {
            format!("int.{target}")
        };
        self.declare(&target, &line.args[0])
    }

    fn exec_increment(&mut self, increment: &str) -> RuntimeResult<()> {
        if let Some(update) = statement::parse_update(increment) {
            return self.apply_update(&update);
        }
        let line = tokenizer::tokenize(increment);
        if line.form != LineForm::Assign {
            return Err(RuntimeError::syntax(format!(
                "unsupported for loop increment `{increment}`"
            )));
        }
        let target = increment[..tokenizer::find_assignment(increment).unwrap_or(0)].trim();
        if target.contains('.') {
            return self.declare(target, &line.args[0]);
        }
        let tag = match self.env.get(target) {
            Some(existing) => existing.ty().tag(),
            None => "int",
        };
        self.declare(&format!("{tag}.{target}"), &line.args[0])
    }

    fn exec_while(&mut self, source: &Rc<Source>, pc: usize, condition: &str) -> RuntimeResult<Flow> {
        let close = self.close_of(source, pc)?;
        let line = self.current_line;
        loop {
            if !self.running {
                return Ok(Flow::Halt);
            }
            self.current_line = line;
            if !self.condition(condition)? {
                break;
            }
            match self.exec_range(source, pc + 1, close)? {
                Flow::Next(_) => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Next(close + 1))
    }

    /// `name++`, `name--`, `name += expr`, `name -= expr`. The result keeps
    /// the variable's type; unknown names start from integer zero.
    pub(crate) fn apply_update(&mut self, update: &Update) -> RuntimeResult<()> {
        let name = update.target();
        let (op, operand) = match update {
            Update::Increment(_) => (BinaryOp::Add, Variable::integer("step", 1)),
            Update::Decrement(_) => (BinaryOp::Sub, Variable::integer("step", 1)),
            Update::AddAssign(_, text) => (BinaryOp::Add, self.evaluate(text)?),
            Update::SubAssign(_, text) => (BinaryOp::Sub, self.evaluate(text)?),
        };
        let current = self
            .env
            .get(name)
            .cloned()
            .unwrap_or_else(|| Variable::integer(name, 0));
        let ty = current.ty();
        match value::arithmetic(op, &current, &operand) {
            Ok(result) => {
                self.env.set(name, result.coerce(ty, name));
                Ok(())
            }
            Err(ArithmeticError::DivisionByZero) => Err(RuntimeError::DivisionByZero),
            Err(ArithmeticError::Unsupported) => Err(RuntimeError::syntax(format!(
                "cannot apply `{}` to `{}` of type {}",
                op.symbol(),
                name,
                ty.tag()
            ))),
        }
    }

    fn define_function(
        &mut self,
        source: &Rc<Source>,
        pc: usize,
        name: &str,
        params: &[String],
    ) -> RuntimeResult<Flow> {
        let close = self.close_of(source, pc)?;
        let body: Vec<Line> = source.lines()[pc + 1..close].to_vec();
        debug!(function = name, params = params.len(), lines = body.len(), "function defined");
        self.functions.insert(
            name.to_string(),
            Rc::new(FunctionDefinition {
                name: name.to_string(),
                params: params.to_vec(),
                body: Rc::new(Source::from_lines(body)),
            }),
        );
        Ok(Flow::Next(close + 1))
    }

    /// Calls a user function. The local scope and call frame are popped on
    /// every exit path, including errors and `allstop`.
    pub(crate) fn invoke(&mut self, name: &str, args: Vec<Variable>) -> RuntimeResult<Variable> {
        let function = self
            .functions
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::UndefinedFunction {
                name: name.to_string(),
            })?;
        if args.len() != function.params.len() {
            return Err(RuntimeError::ArityMismatch {
                name: name.to_string(),
                expected: function.params.len(),
                received: args.len(),
            });
        }
        if self.env.depth() >= self.config.max_call_depth {
            return Err(RuntimeError::RecursionLimit {
                depth: self.config.max_call_depth,
            });
        }

        let mut scope = Scope::new();
        for (param, arg) in function.params.iter().zip(args) {
            scope.insert(param.clone(), arg.renamed(param.clone()));
        }
        let return_line = self.current_line;
        self.env.enter(
            CallFrame {
                function: function.name.clone(),
                return_line,
            },
            scope,
        );
        debug!(function = %function.name, depth = self.env.depth(), "call");
        let outcome = ensure_sufficient_stack(|| {
            self.exec_range(&function.body, 0, function.body.len())
        });
        let frame = self.env.leave();
        debug!(function = %function.name, ok = outcome.is_ok(), "leave");
        if let (Ok(_), Some(frame)) = (&outcome, frame) {
            self.current_line = frame.return_line;
        }

        let value = match outcome? {
            Flow::Return(value) => value,
            Flow::Next(_) | Flow::Halt => Variable::integer(RETURN_SLOT, 0),
        };
        self.env.set_return_value(value.clone());
        Ok(value)
    }

    pub(crate) fn report(&mut self, err: &RuntimeError) {
        self.diagnostics
            .error(err.to_string(), Some(self.current_line).filter(|line| *line > 0));
    }

    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        self.diagnostics
            .warning(message, Some(self.current_line).filter(|line| *line > 0));
    }

    fn fail(&mut self, err: RuntimeError) -> RuntimeError {
        self.report(&err);
        err
    }
}
