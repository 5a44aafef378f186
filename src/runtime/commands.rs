use crate::language::tokenizer::{CommandLine, LineForm, unquote};
use crate::runtime::{
    error::{RuntimeError, RuntimeResult},
    interpreter::Interpreter,
    library::{LoadOutcome, default_library_path},
    memory::MemoryKind,
    value::{self, VarType, Variable},
};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

impl Interpreter {
    pub(crate) fn exec_command(&mut self, line: &CommandLine) -> RuntimeResult<()> {
        match line.form {
            LineForm::Assign => self.declare(&line.command, &line.rest),
            LineForm::Call => self.dispatch(&line.command, &line.args),
            LineForm::Words => match line.command.as_str() {
                "video++" | "err" | "warn" if !line.rest.is_empty() => {
                    self.dispatch(&line.command, std::slice::from_ref(&line.rest))
                }
                _ => self.dispatch(&line.command, &line.args),
            },
        }
    }

    /// `type.name = expr`. Same-typed results are stored as they are, other
    /// values are converted through their text; lists always start empty.
    pub(crate) fn declare(&mut self, target: &str, text: &str) -> RuntimeResult<()> {
        let (ty, name) = value::split_type_and_name(target);
        if name == "video++" {
            let value = self.evaluate(text)?;
            return self.write_output(&translate_escapes(&value.to_string()));
        }
        if name.is_empty() {
            return Err(RuntimeError::syntax(format!(
                "missing variable name in `{target}`"
            )));
        }
        let value = if ty == VarType::List {
            Variable::list(name, Vec::new())
        } else {
            self.evaluate(text)?.coerce(ty, name)
        };
        self.env.set(name, value);
        Ok(())
    }

    fn dispatch(&mut self, name: &str, args: &[String]) -> RuntimeResult<()> {
        if self.functions.contains_key(name) {
            let values = self.evaluate_all(args)?;
            self.invoke(name, values)?;
            return Ok(());
        }
        if let Some(op) = name.strip_prefix("fmem.") {
            return self.fmem_command(name, op, args);
        }
        if let Some(list) = name.strip_suffix(".append") {
            return self.append(list, args);
        }
        match name {
            "video++" => {
                let mut text = String::new();
                for arg in args {
                    text.push_str(&self.evaluate(arg)?.to_string());
                }
                self.write_output(&translate_escapes(&text))
            }
            "input" => self.read_input().map(|_| ()),
            "mem" => self.allocate(name, args, MemoryKind::Regular),
            "virmem" => self.allocate(name, args, MemoryKind::Virtual),
            "frmem" => self.free_memory(args),
            "err" => {
                let message = self.message(args)?;
                Err(RuntimeError::ScriptHalted { message })
            }
            "warn" => {
                let message = self.message(args)?;
                self.warn(message);
                Ok(())
            }
            "allstop" => {
                info!(line = self.current_line, "allstop");
                self.running = false;
                Ok(())
            }
            "add" => self.add_library(args),
            "unload" => {
                let library = required(args, 0, "unload", "library name")?;
                self.libraries.unload(unquote(library))
            }
            "libcall" => {
                let mut values = Vec::with_capacity(args.len());
                for (idx, arg) in args.iter().enumerate() {
                    values.push(if idx < 2 {
                        Variable::string("name", unquote(arg))
                    } else {
                        self.evaluate(arg)?
                    });
                }
                self.libcall(&values).map(|_| ())
            }
            "arch" => {
                let arch = self.platform.arch();
                self.write_output(&format!("Architecture: {arch}\n"))?;
                self.env.set_return_value(Variable::string("arch", arch));
                Ok(())
            }
            "flver" | "clsdef" => {
                let value = self.call(name, Vec::new())?;
                self.env.set_return_value(value);
                Ok(())
            }
            _ => Err(RuntimeError::UnknownCommand {
                command: name.to_string(),
            }),
        }
    }

    fn evaluate_all(&mut self, args: &[String]) -> RuntimeResult<Vec<Variable>> {
        args.iter().map(|arg| self.evaluate(arg)).collect()
    }

    fn message(&mut self, args: &[String]) -> RuntimeResult<String> {
        match args.first() {
            Some(arg) => Ok(self.evaluate(arg)?.to_string()),
            None => Ok(String::new()),
        }
    }

    fn append(&mut self, list: &str, args: &[String]) -> RuntimeResult<()> {
        let item = required(args, 0, "append", "value")?;
        let value = self.evaluate(item)?;
        let Some(target) = self.env.get_mut(list) else {
            return Err(RuntimeError::syntax(format!("list `{list}` is not defined")));
        };
        if target.push(value) {
            Ok(())
        } else {
            Err(RuntimeError::syntax(format!("`{list}` is not a list")))
        }
    }

    fn write_output(&mut self, text: &str) -> RuntimeResult<()> {
        self.output
            .write_all(text.as_bytes())
            .and_then(|_| self.output.flush())
            .map_err(|source| RuntimeError::Stream {
                stream: "output",
                source,
            })
    }

    pub(crate) fn read_input(&mut self) -> RuntimeResult<Variable> {
        let _ = self.output.flush();
        let mut line = String::new();
        self.input
            .read_line(&mut line)
            .map_err(|source| RuntimeError::Stream {
                stream: "input",
                source,
            })?;
        let value = Variable::string("input", line.trim_end_matches(['\r', '\n']));
        self.env.set_return_value(value.clone());
        Ok(value)
    }

    fn allocate(&mut self, command: &str, args: &[String], kind: MemoryKind) -> RuntimeResult<()> {
        let [description, size, id, ..] = args else {
            return Err(invalid(command, "expected description, size and id"));
        };
        let size = match unquote(size) {
            "auto" => None,
            _ => Some(self.memory_size(command, size)?),
        };
        let id = self.memory_number(command, id)?;
        self.ledger.allocate(unquote(description), size, id, kind)?;
        Ok(())
    }

    fn free_memory(&mut self, args: &[String]) -> RuntimeResult<()> {
        let [id, mode, ..] = args else {
            return Err(invalid("frmem", "expected id and mode"));
        };
        let id = self.memory_number("frmem", id)?;
        let mode = self.memory_number("frmem", mode)?;
        self.ledger.free(id, mode)?;
        Ok(())
    }

    /// A numeric argument, given literally or through a variable.
    fn memory_number(&self, command: &str, text: &str) -> RuntimeResult<i64> {
        let text = unquote(text);
        let resolved = self.env.resolve(text);
        let digits = if resolved.is_defined() {
            resolved.to_string()
        } else {
            text.to_string()
        };
        digits
            .trim()
            .parse::<i64>()
            .map_err(|_| invalid(command, format!("`{text}` is not a whole number")))
    }

    fn memory_size(&self, command: &str, text: &str) -> RuntimeResult<u64> {
        let size = self.memory_number(command, text)?;
        u64::try_from(size).map_err(|_| invalid(command, format!("size {size} is negative")))
    }

    fn fmem_command(&mut self, command: &str, op: &str, args: &[String]) -> RuntimeResult<()> {
        self.require_dynamic(command)?;
        match op {
            "create" => {
                let [name, size, ..] = args else {
                    return Err(invalid(command, "expected name and size"));
                };
                let size = self.memory_size(command, size)?;
                self.store.create(unquote(name), size);
                Ok(())
            }
            "write" => {
                let [name, key, value, ..] = args else {
                    return Err(invalid(command, "expected name, key and value"));
                };
                let value = self.evaluate(value)?;
                self.store.write(unquote(name), unquote(key), value)
            }
            "read" => self.fmem_read(args).map(|_| ()),
            "destroy" => {
                let name = required(args, 0, command, "name")?;
                self.store.destroy(unquote(name)).map(|_| ())
            }
            _ => Err(RuntimeError::UnknownCommand {
                command: command.to_string(),
            }),
        }
    }

    /// Reads a key into the return slot.
    pub(crate) fn fmem_read(&mut self, args: &[String]) -> RuntimeResult<Variable> {
        self.require_dynamic("fmem.read")?;
        let [name, key, ..] = args else {
            return Err(invalid("fmem.read", "expected name and key"));
        };
        let value = self.store.read(unquote(name), unquote(key))?;
        self.env.set_return_value(value.clone());
        Ok(value)
    }

    fn require_dynamic(&self, command: &str) -> RuntimeResult<()> {
        if self.dynamic {
            Ok(())
        } else {
            Err(RuntimeError::DynamicModeRequired {
                command: command.to_string(),
            })
        }
    }

    fn add_library(&mut self, args: &[String]) -> RuntimeResult<()> {
        let name = unquote(required(args, 0, "add", "library name")?).to_string();
        let mut path = match args.get(1) {
            Some(path) => PathBuf::from(unquote(path)),
            None => default_library_path(&name),
        };
        if path.is_relative() {
            if let Some(dir) = &self.config.library_dir {
                path = dir.join(path);
            }
        }
        match self
            .libraries
            .load(self.platform.as_ref(), &name, &path)?
        {
            LoadOutcome::Loaded => Ok(()),
            LoadOutcome::AlreadyLoaded => {
                self.warn(format!("Library '{name}' is already loaded"));
                Ok(())
            }
        }
    }

    /// `libcall(library, function, args…)`; the result also lands in the
    /// return slot.
    pub(crate) fn libcall(&mut self, args: &[Variable]) -> RuntimeResult<Variable> {
        let [library, symbol, rest @ ..] = args else {
            return Err(RuntimeError::syntax(
                "libcall requires a library and a function name",
            ));
        };
        let library = library.to_string();
        let symbol = symbol.to_string();
        let result = self.libraries.call(&library, &symbol, rest)?;
        info!(library = %library, symbol = %symbol, result = %result, "libcall");
        self.env.set_return_value(result.clone());
        Ok(result)
    }
}

fn required<'a>(args: &'a [String], idx: usize, command: &str, what: &str) -> RuntimeResult<&'a str> {
    args.get(idx)
        .map(String::as_str)
        .filter(|arg| !arg.trim().is_empty())
        .ok_or_else(|| RuntimeError::syntax(format!("`{command}` requires a {what}")))
}

fn invalid(command: &str, message: impl Into<String>) -> RuntimeError {
    RuntimeError::InvalidMemoryArguments {
        command: command.to_string(),
        message: message.into(),
    }
}

/// Expands `\n`, `\t`, `\r`, `\"` and `\\` in script output.
pub fn translate_escapes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
