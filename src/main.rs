// main.rs - rpnc command line: REPL on stdin, or batch compilation of a file

use clap::{ArgAction, Parser as ClapParser};
use rpnc::error::{Error, Result};
use rpnc::parser::Parser;
use rpnc::session::Session;
use rpnc::tokenizer::{LineSource, Tokenizer};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::fs;
use std::io::{self, BufRead, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use target_lexicon::Triple;

const PROMPT: &str = "rpn> ";
const HISTORY_FILE: &str = ".rpnc_history";

#[derive(ClapParser)]
#[command(name = "rpnc", version)]
/// Compiler for a small stack-based RPN language
///
/// Without a FILE, lines are read from standard input and every complete
/// unit runs as soon as it is entered. With a FILE, the whole program is
/// compiled into one module whose listing is printed at the end.
struct Cli {
    /// Source file to compile.
    file: Option<PathBuf>,
    /// Run FILE through the interactive driver instead of compiling it.
    #[arg(short, long)]
    interactive: bool,
    /// Also write the compiled module as a native object file.
    #[arg(short = 'o', long = "emit-object", value_name = "PATH")]
    emit_object: Option<PathBuf>,
    /// Target triple for the object file. Defaults to the host.
    #[arg(long, value_name = "TRIPLE", value_parser = parse_triple)]
    target: Option<Triple>,
    /// Do not print the banner.
    #[arg(short, long)]
    quiet: bool,
    /// More log output on stderr; repeat for more detail.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn parse_triple(text: &str) -> std::result::Result<Triple, String> {
    text.parse::<Triple>().map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = stderrlog::new()
        .module(module_path!())
        .verbosity(1 + cli.verbose as usize)
        .init()
    {
        eprintln!("rpnc: could not set up logging: {}", e);
    }

    let result = match &cli.file {
        None => run_repl(cli.quiet),
        Some(path) if cli.interactive => run_file_interactive(path),
        Some(path) => run_batch(path, cli.emit_object.as_deref(), cli.target.as_ref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("rpnc: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn report(error: &Error) {
    eprintln!("error: {}", error);
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| Error::FileOpen {
        path: path.to_path_buf(),
        source,
    })
}

// ============================================================================
// BATCH
// ============================================================================

fn run_batch(path: &Path, object_path: Option<&Path>, target: Option<&Triple>) -> Result<()> {
    let source = read_source(path)?;
    let session = Session::batch(target)?;
    let mut parser = Parser::new(Tokenizer::new(source.chars()));

    let unit = session.compile(&mut parser)?;
    print!("{}", unit.listing);

    if let Some(object_path) = object_path {
        fs::write(object_path, &unit.object)
            .map_err(|e| Error::Emit(format!("{}: {}", object_path.display(), e)))?;
        log::info!("wrote {} bytes to {}", unit.object.len(), object_path.display());
    }
    Ok(())
}

// ============================================================================
// INTERACTIVE
// ============================================================================

fn run_file_interactive(path: &Path) -> Result<()> {
    let source = read_source(path)?;
    let mut session = Session::interactive()?;
    let mut parser = Parser::new(Tokenizer::new(source.chars()));
    session.run_interactive(&mut parser, report)?;
    Ok(())
}

fn run_repl(quiet: bool) -> Result<()> {
    let mut session = Session::interactive()?;
    if !quiet {
        println!("rpnc {} (Cranelift JIT)", env!("CARGO_PKG_VERSION"));
        println!("Ctrl-D on an empty prompt exits");
        println!();
    }

    if io::stdin().is_terminal() {
        match DefaultEditor::new() {
            Ok(editor) => return run_terminal(&mut session, editor),
            Err(e) => log::warn!("line editing unavailable: {}", e),
        }
    }

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let source = LineSource::new(|| lines.next().and_then(|line| line.ok()));
    let mut parser = Parser::new(Tokenizer::new(source));
    session.run_interactive(&mut parser, report)?;
    Ok(())
}

fn run_terminal(session: &mut Session, mut editor: DefaultEditor) -> Result<()> {
    let history_file = dirs::home_dir().map(|mut p| {
        p.push(HISTORY_FILE);
        p
    });
    if let Some(ref path) = history_file {
        let _ = editor.load_history(path);
    }

    // Ctrl-D inside an unfinished unit drops the unit and prompts again;
    // Ctrl-D on a fresh prompt leaves.
    loop {
        let source = LineSource::new(|| read_line(&mut editor));
        let mut parser = Parser::new(Tokenizer::new(source));
        let summary = session.run_interactive(&mut parser, report)?;
        if !summary.ended_inside_unit {
            break;
        }
    }
    println!();

    if let Some(ref path) = history_file {
        let _ = editor.save_history(path);
    }
    Ok(())
}

fn read_line(editor: &mut DefaultEditor) -> Option<String> {
    loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = editor.add_history_entry(line.as_str());
                }
                return Some(line);
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => return None,
            Err(err) => {
                log::error!("readline: {:?}", err);
                return None;
            }
        }
    }
}
