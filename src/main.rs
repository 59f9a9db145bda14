// kscript - Compiler driver for kerboscript
// Copyright (c) 2025 Tom Waddington. MIT licensed.

use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process;

use log::{Level, LevelFilter, Log, Metadata, Record, debug};

use kscript_compiler::{CodePart, CompilerOptions, Script};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Context the interactive loop compiles into.
const INTERPRETER_CONTEXT: &str = "interpreter";

/// Context shared by the files named on the command line.
const FILES_CONTEXT: &str = "files";

// ============================================================================
// Logging
// ============================================================================

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = match record.level() {
            Level::Error => "error",
            Level::Warn => "warning",
            Level::Info => "info",
            Level::Debug => "debug",
            Level::Trace => "trace",
        };
        eprintln!("[{}] {}: {}", level, record.target(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

// ============================================================================
// Arguments
// ============================================================================

#[derive(Debug, Default)]
struct Args {
    verbosity: u8,
    called_from_run: bool,
    same_address_space: bool,
    files: Vec<String>,
}

fn usage() -> String {
    format!(
        "kscript v{}\n\n\
         Usage: kscript [-v|-vv] [--run] [--same-address-space] [FILE...]\n\n\
         Compiles each FILE and prints its code parts. With no FILE, reads\n\
         commands interactively.\n\n\
         Options:\n  \
           -v, --verbose          Log compile phases (repeat for every instruction)\n  \
           --run                  Compile as a program started by RUN\n  \
           --same-address-space   Run subprograms through a loader trampoline\n  \
           --version              Print the version\n  \
           -h, --help             Print this message",
        VERSION
    )
}

fn parse_args(raw: &[String]) -> Result<Args, String> {
    let mut args = Args::default();
    for arg in raw {
        match arg.as_str() {
            "--version" => {
                println!("kscript v{}", VERSION);
                process::exit(0);
            }
            "-h" | "--help" => {
                println!("{}", usage());
                process::exit(0);
            }
            "-v" | "--verbose" => args.verbosity += 1,
            "-vv" => args.verbosity += 2,
            "--run" => args.called_from_run = true,
            "--same-address-space" => args.same_address_space = true,
            flag if flag.starts_with('-') => {
                return Err(format!("unknown option '{}'\n\n{}", flag, usage()));
            }
            file => args.files.push(file.to_string()),
        }
    }
    Ok(args)
}

fn options(args: &Args) -> CompilerOptions {
    CompilerOptions::standard()
        .called_from_run(args.called_from_run)
        .same_address_space(args.same_address_space)
}

fn main() {
    let raw: Vec<String> = env::args().skip(1).collect();
    let args = match parse_args(&raw) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(2);
        }
    };
    init_logging(args.verbosity);

    let options = options(&args);
    let mut script = Script::new();
    if args.files.is_empty() {
        run_repl(&mut script, &options);
    } else if let Err(e) = compile_files(&mut script, &args.files, &options) {
        eprintln!("{}", e);
        process::exit(1);
    }
}

// ============================================================================
// Files
// ============================================================================

fn print_parts(parts: &[CodePart]) {
    for part in parts {
        print!("{}", part.listing());
    }
}

/// Compile each file into one shared context, stopping at the first error.
fn compile_files(
    script: &mut Script,
    files: &[String],
    options: &CompilerOptions,
) -> Result<(), String> {
    for file_path in files {
        let path = Path::new(file_path);
        if path.extension().and_then(|e| e.to_str()) != Some("ks") {
            debug!("{} does not end in .ks", file_path);
        }
        let source = fs::read_to_string(path)
            .map_err(|e| format!("Error reading '{}': {}", file_path, e))?;

        let parts = script
            .compile(file_path, 1, &source, FILES_CONTEXT, options)
            .map_err(|e| e.render(&source, Some(file_path)))?;
        print_parts(&parts);
    }
    Ok(())
}

// ============================================================================
// Interactive loop
// ============================================================================

/// Read commands until end of input. Lines accumulate until the braces and
/// parentheses of the pending command balance.
fn run_repl(script: &mut Script, options: &CompilerOptions) {
    println!("kscript v{}", VERSION);

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut history = String::new();
    let mut next_line: u32 = 1;
    let mut pending = String::new();

    loop {
        print!("{}", if pending.is_empty() { "> " } else { ". " });
        if let Err(e) = io::stdout().flush() {
            eprintln!("Write error: {}", e);
            break;
        }

        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                eprintln!("Read error: {}", e);
                break;
            }
            None => {
                println!();
                break;
            }
        };
        pending.push_str(&line);
        pending.push('\n');
        if pending.trim().is_empty() {
            pending.clear();
            continue;
        }
        if !Script::is_command_complete(&pending) {
            continue;
        }

        let command = std::mem::take(&mut pending);
        let start_line = next_line;
        next_line += command.lines().count() as u32;
        history.push_str(&command);

        match script.compile("interpreter", start_line, &command, INTERPRETER_CONTEXT, options) {
            Ok(parts) => print_parts(&parts),
            Err(e) => eprintln!("{}", e.render(&history, None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        let args = parse_args(&strings(&["-v", "--run", "a.ks", "b.ks"])).unwrap();
        assert_eq!(args.verbosity, 1);
        assert!(args.called_from_run);
        assert!(!args.same_address_space);
        assert_eq!(args.files, vec!["a.ks", "b.ks"]);

        let args = parse_args(&strings(&["-vv", "--same-address-space"])).unwrap();
        assert_eq!(args.verbosity, 2);
        assert!(args.same_address_space);
        assert!(args.files.is_empty());
    }

    #[test]
    fn test_unknown_option() {
        let err = parse_args(&strings(&["--bogus"])).unwrap_err();
        assert!(err.contains("--bogus"));
    }

    #[test]
    fn test_compile_missing_file() {
        let mut script = Script::new();
        let err = compile_files(
            &mut script,
            &strings(&["/nonexistent/boot.ks"]),
            &CompilerOptions::new(),
        )
        .unwrap_err();
        assert!(err.contains("/nonexistent/boot.ks"));
    }
}
