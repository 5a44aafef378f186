use flare_lang::config::{ConfigError, InterpreterConfig};
use flare_lang::language::source::Source;
use flare_lang::Interpreter;
use std::env;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const USAGE: &str = "Usage: flare [--config PATH] [SCRIPT]
       flare -e CODE
       flare -h | --help
       flare -v | --version

With no script, flare starts an interactive shell.";

enum Mode {
    Script(PathBuf),
    Inline(String),
    Shell,
    Help,
    Version,
}

struct Options {
    mode: Mode,
    config: Option<PathBuf>,
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<Options, String> {
    let mut mode = None;
    let mut config = None;
    let mut args = args.peekable();
    while let Some(arg) = args.next() {
        let next = match arg.as_str() {
            "-h" | "--help" => Mode::Help,
            "-v" | "--version" => Mode::Version,
            "-e" | "--eval" => match args.next() {
                Some(code) => Mode::Inline(code),
                None => return Err("`-e` expects a line of code".into()),
            },
            "--config" => {
                let path = args.next().ok_or("`--config` expects a path")?;
                config = Some(PathBuf::from(path));
                continue;
            }
            flag if flag.starts_with('-') => return Err(format!("unknown option `{flag}`")),
            script => Mode::Script(PathBuf::from(script)),
        };
        if mode.is_some() {
            return Err("only one script may be given".into());
        }
        mode = Some(next);
    }
    Ok(Options {
        mode: mode.unwrap_or(Mode::Shell),
        config,
    })
}

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // Only initialize if RUST_LOG is set
    if env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_level(true).with_writer(io::stderr))
            .with(EnvFilter::from_default_env())
            .init();
    }
}

fn load_config(explicit: Option<&Path>, script: Option<&Path>) -> Result<InterpreterConfig, ConfigError> {
    let config = match explicit {
        Some(path) => InterpreterConfig::load(path)?,
        None => {
            let dir = script
                .and_then(Path::parent)
                .filter(|dir| !dir.as_os_str().is_empty())
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
            InterpreterConfig::discover(&dir)?
        }
    };
    Ok(config.with_env_overrides())
}

fn main() -> ExitCode {
    init_tracing();
    let options = match parse_args(env::args().skip(1)) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{message}\n\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    let script = match &options.mode {
        Mode::Script(path) => Some(path.as_path()),
        _ => None,
    };
    let config = match load_config(options.config.as_deref(), script) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    let mut interpreter = Interpreter::with_config(config);

    match options.mode {
        Mode::Help => {
            println!("{USAGE}");
            ExitCode::SUCCESS
        }
        Mode::Version => {
            println!("flare {}", interpreter.version());
            ExitCode::SUCCESS
        }
        Mode::Script(path) => {
            if let Err(err) = interpreter.load_from_file(&path) {
                eprintln!("{err}");
                return ExitCode::FAILURE;
            }
            exit_code(interpreter.run().is_ok())
        }
        Mode::Inline(code) => {
            if let Err(err) = interpreter.load_from_text(&code) {
                eprintln!("{err}");
                return ExitCode::FAILURE;
            }
            exit_code(interpreter.run().is_ok())
        }
        Mode::Shell => shell(&mut interpreter),
    }
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Reads statements from stdin and runs each against the same interpreter.
/// Lines are buffered while a block is still open.
fn shell(interpreter: &mut Interpreter) -> ExitCode {
    println!("flare {} (type `help` for commands)", interpreter.version());
    let stdin = io::stdin();
    let mut pending = String::new();
    loop {
        print!("{}", if pending.is_empty() { "flare> " } else { "...> " });
        let _ = io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                eprintln!("{err}");
                return ExitCode::FAILURE;
            }
        }

        if pending.is_empty() {
            match line.trim() {
                "" => continue,
                "exit" | "quit" => break,
                "help" => {
                    println!("{USAGE}\n\nShell commands: exit, quit, help, version");
                    continue;
                }
                "version" => {
                    println!("flare {}", interpreter.version());
                    continue;
                }
                _ => {}
            }
        }

        pending.push_str(&line);
        if !Source::parse(&pending).blocks().unclosed().is_empty() {
            continue;
        }
        let code = std::mem::take(&mut pending);
        // Errors were already echoed by the interpreter.
        if interpreter.load_from_text(&code).is_ok() {
            let _ = interpreter.run();
        }
        println!();
    }
    ExitCode::SUCCESS
}
