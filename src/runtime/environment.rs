use crate::runtime::value::Variable;
use std::collections::HashMap;

/// Name of the global slot holding the last call's return value.
pub const RETURN_SLOT: &str = "__return_value";

#[derive(Clone, Debug, Default)]
pub struct Scope {
    bindings: HashMap<String, Variable>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.bindings.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Variable) {
        self.bindings.insert(name.into(), value);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallFrame {
    pub function: String,
    pub return_line: usize,
}

/// Global bindings plus a stack of function-local scopes. Every call frame
/// owns exactly one local scope, so the two stacks always have equal depth.
#[derive(Clone, Debug, Default)]
pub struct Environment {
    globals: Scope,
    locals: Vec<Scope>,
    frames: Vec<CallFrame>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Literal inference first, then the innermost local scope, then
    /// globals. Absence yields the undefined sentinel, never an error.
    pub fn resolve(&self, name: &str) -> Variable {
        let name = name.trim();
        if let Some(literal) = Variable::literal(name) {
            return literal;
        }
        self.get(name).cloned().unwrap_or_else(Variable::undefined)
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        if let Some(scope) = self.locals.last() {
            if let Some(value) = scope.get(name) {
                return Some(value);
            }
        }
        self.globals.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Variable> {
        if let Some(scope) = self.locals.last_mut() {
            if scope.bindings.contains_key(name) {
                return scope.bindings.get_mut(name);
            }
        }
        self.globals.bindings.get_mut(name)
    }

    /// Writes to the innermost local scope when a call is active.
    pub fn set(&mut self, name: impl Into<String>, value: Variable) {
        match self.locals.last_mut() {
            Some(scope) => scope.insert(name, value),
            None => self.globals.insert(name, value),
        }
    }

    pub fn set_global(&mut self, name: impl Into<String>, value: Variable) {
        self.globals.insert(name, value);
    }

    pub fn global(&self, name: &str) -> Option<&Variable> {
        self.globals.get(name)
    }

    pub fn return_value(&self) -> Variable {
        self.globals
            .get(RETURN_SLOT)
            .cloned()
            .unwrap_or_else(|| Variable::integer(RETURN_SLOT, 0))
    }

    pub fn set_return_value(&mut self, value: Variable) {
        self.globals.insert(RETURN_SLOT, value.renamed(RETURN_SLOT));
    }

    pub fn enter(&mut self, frame: CallFrame, scope: Scope) {
        self.frames.push(frame);
        self.locals.push(scope);
        debug_assert_eq!(self.frames.len(), self.locals.len());
    }

    pub fn leave(&mut self) -> Option<CallFrame> {
        self.locals.pop();
        let frame = self.frames.pop();
        debug_assert_eq!(self.frames.len(), self.locals.len());
        frame
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn local_depth(&self) -> usize {
        self.locals.len()
    }

    pub fn in_call(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Drops any frames left behind by an aborted run.
    pub fn unwind(&mut self) {
        self.locals.clear();
        self.frames.clear();
    }
}
