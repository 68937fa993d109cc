//! CLI entry point for the `ral-tool` binary.

use std::env;
use std::ffi::OsString;
use std::fmt::Display;
use std::path::PathBuf;

use log::{LevelFilter, SetLoggerError};
use num_bigint as _;
use ral_tool::{address_of, decode, encode, load_map, lookup, to_json, tree, ToolError};
use ral_core as _;
use serde::Serialize;
use serde_json as _;
use simple_logger::SimpleLogger;
#[cfg(test)]
use tempfile as _;
use thiserror as _;

const USAGE_TEXT: &str = "\
Usage: ral-tool <command> <map.json> [arguments] [options]

Commands:
  addr   <map.json> <path>                  Canonical path and absolute address
  lookup <map.json> <address> [--root <n>]  Deepest node containing an address
  decode <map.json> <path> <value>          Format every field of a register value
  encode <map.json> <path> <field=value>... Compose a register value from reset
  tree   <map.json>                         List every node with its address

Options:
  -r, --root <name>  Search only the named root (lookup only)
      --json         Print machine-readable JSON
  -v, --verbose      Log load and lookup details to stderr
  -h, --help         Show this help message

Examples:
  ral-tool addr regs.json 'soc.uart[2].ctrl'
  ral-tool lookup regs.json 0x40000208
  ral-tool encode regs.json soc.uart.ctrl en=1 baud=0x1c
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandKind {
    Addr,
    Lookup,
    Decode,
    Encode,
    Tree,
}

impl CommandKind {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "addr" => Some(Self::Addr),
            "lookup" => Some(Self::Lookup),
            "decode" => Some(Self::Decode),
            "encode" => Some(Self::Encode),
            "tree" => Some(Self::Tree),
            _ => None,
        }
    }

    /// Positional arguments after the map path: (minimum, maximum).
    const fn arity(self) -> (usize, Option<usize>) {
        match self {
            Self::Addr | Self::Lookup => (1, Some(1)),
            Self::Decode => (2, Some(2)),
            Self::Encode => (1, None),
            Self::Tree => (0, Some(0)),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct CommandArgs {
    kind: CommandKind,
    map: PathBuf,
    operands: Vec<String>,
    root: Option<String>,
    json: bool,
    verbose: bool,
}

#[derive(Debug)]
enum ParseResult {
    Command(CommandArgs),
    Help,
}

fn parse_args(mut args: impl Iterator<Item = OsString>) -> Result<ParseResult, String> {
    let first = args.next().ok_or_else(|| "missing command".to_string())?;

    if first == "--help" || first == "-h" {
        return Ok(ParseResult::Help);
    }

    let command_str = first.to_string_lossy().to_string();
    let kind = CommandKind::from_name(&command_str)
        .ok_or_else(|| format!("unknown command: {command_str}"))?;
    parse_command_args(kind, args).map(ParseResult::Command)
}

#[allow(clippy::while_let_on_iterator)]
fn parse_command_args(
    kind: CommandKind,
    mut args: impl Iterator<Item = OsString>,
) -> Result<CommandArgs, String> {
    let mut map: Option<PathBuf> = None;
    let mut operands = Vec::new();
    let mut root = None;
    let mut json = false;
    let mut verbose = false;

    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            return Err(USAGE_TEXT.to_string());
        }

        if arg == "--verbose" || arg == "-v" {
            verbose = true;
            continue;
        }

        if arg == "--json" {
            json = true;
            continue;
        }

        if arg == "--root" || arg == "-r" {
            if kind != CommandKind::Lookup {
                return Err("--root is only valid for lookup".to_string());
            }
            let value = args
                .next()
                .ok_or_else(|| "missing value for --root".to_string())?;
            root = Some(value.to_string_lossy().to_string());
            continue;
        }

        let text = arg.to_string_lossy().to_string();
        // Negative field values such as `gain=-1` never start with a dash.
        if text.starts_with('-') {
            return Err(format!("unknown option: {text}"));
        }

        if map.is_none() {
            map = Some(PathBuf::from(arg));
        } else {
            operands.push(text);
        }
    }

    let map = map.ok_or_else(|| "missing map path".to_string())?;
    let (min, max) = kind.arity();
    if operands.len() < min {
        return Err("missing arguments".to_string());
    }
    if max.is_some_and(|max| operands.len() > max) {
        return Err("too many arguments".to_string());
    }
    Ok(CommandArgs {
        kind,
        map,
        operands,
        root,
        json,
        verbose,
    })
}

fn init_logging(verbose: bool) -> Result<(), SetLoggerError> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    SimpleLogger::new().with_level(level).init()
}

fn print_report<T: Serialize + Display>(report: &T, json: bool) -> Result<(), ToolError> {
    if json {
        println!("{}", to_json(report)?);
    } else {
        print!("{report}");
    }
    Ok(())
}

fn run_command(args: &CommandArgs) -> Result<(), ToolError> {
    let map = load_map(&args.map)?;
    let operand = |index: usize| args.operands.get(index).map_or("", String::as_str);
    match args.kind {
        CommandKind::Addr => {
            let located = address_of(&map, operand(0))?;
            print_report(&located, args.json)?;
            if !args.json {
                println!();
            }
        }
        CommandKind::Lookup => {
            let located = lookup(&map, operand(0), args.root.as_deref())?;
            print_report(&located, args.json)?;
            if !args.json {
                println!();
            }
        }
        CommandKind::Decode => {
            print_report(&decode(&map, operand(0), operand(1))?, args.json)?;
        }
        CommandKind::Encode => {
            let report = encode(&map, operand(0), &args.operands[1..])?;
            for warning in &report.warnings {
                eprintln!("warning: {warning}");
            }
            print_report(&report, args.json)?;
        }
        CommandKind::Tree => {
            let rows = tree(&map)?;
            if args.json {
                println!("{}", to_json(&rows)?);
            } else {
                for row in &rows {
                    println!("{row}");
                }
            }
        }
    }
    Ok(())
}

fn run(args: &CommandArgs) -> Result<(), i32> {
    if let Err(error) = init_logging(args.verbose) {
        eprintln!("warning: logging disabled: {error}");
    }
    run_command(args).map_err(|error| {
        eprintln!("error: {error}");
        1
    })
}

fn main() {
    let exit_code = match parse_args(env::args_os().skip(1)) {
        Ok(ParseResult::Help) => {
            println!("{USAGE_TEXT}");
            0
        }
        Ok(ParseResult::Command(args)) => match run(&args) {
            Ok(()) => 0,
            Err(code) => code,
        },
        Err(error) => {
            if error.starts_with("Usage:") {
                println!("{error}");
            } else {
                eprintln!("error: {error}");
                eprintln!("{USAGE_TEXT}");
            }
            1
        }
    };

    std::process::exit(exit_code);
}
