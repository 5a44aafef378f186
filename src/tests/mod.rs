//! Whole-script behaviour, run against an in-memory output buffer.

mod storage;

use crate::config::InterpreterConfig;
use crate::runtime::error::RuntimeResult;
use crate::Interpreter;
use std::cell::RefCell;
use std::io::{self, Cursor, Write};
use std::rc::Rc;

#[derive(Clone, Default)]
pub(crate) struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub(crate) fn quiet_config() -> InterpreterConfig {
    InterpreterConfig {
        echo_diagnostics: false,
        ..InterpreterConfig::default()
    }
}

pub(crate) fn interpreter(config: InterpreterConfig, input: &str) -> (Interpreter, SharedBuffer) {
    let buffer = SharedBuffer::default();
    let interpreter = Interpreter::with_config(config)
        .with_output(Box::new(buffer.clone()))
        .with_input(Box::new(Cursor::new(input.as_bytes().to_vec())));
    (interpreter, buffer)
}

pub(crate) struct Outcome {
    pub interpreter: Interpreter,
    pub output: String,
    pub result: RuntimeResult<()>,
}

impl Outcome {
    pub(crate) fn errors(&self) -> Vec<String> {
        self.interpreter
            .diagnostics()
            .errors()
            .map(|record| record.message.clone())
            .collect()
    }
}

pub(crate) fn run_with(mut interpreter: Interpreter, buffer: SharedBuffer, script: &str) -> Outcome {
    interpreter.load_from_text(script).expect("load script");
    let result = interpreter.run();
    Outcome {
        interpreter,
        output: buffer.contents(),
        result,
    }
}

pub(crate) fn run(script: &str) -> Outcome {
    let (interpreter, buffer) = interpreter(quiet_config(), "");
    run_with(interpreter, buffer, script)
}
