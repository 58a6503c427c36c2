use clap::{crate_version, App, Arg, ErrorKind};
use env_logger::Env;
use log::info;
use loxe::Session;
use std::fs;
use std::io::{self, BufRead, Write};
use std::process;
use std::thread;

const EX_USAGE: i32 = 64;
const EX_SOFTWARE: i32 = 70;
const EX_OSERR: i32 = 71;
const EX_IOERR: i32 = 74;

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let matches = App::new("loxe")
        .version(crate_version!())
        .about("Tree-walking interpreter for the loxe scripting language")
        .arg(
            Arg::with_name("script")
                .help("Script to run; starts an interactive prompt when omitted")
                .index(1),
        )
        .arg(
            Arg::with_name("prompt")
                .long("prompt")
                .value_name("TEXT")
                .default_value("> ")
                .help("Prompt shown by the interactive loop"),
        )
        .get_matches_safe();
    let matches = match matches {
        Ok(matches) => matches,
        Err(e) => match e.kind {
            ErrorKind::HelpDisplayed | ErrorKind::VersionDisplayed => e.exit(),
            _ => {
                eprintln!("{}", e.message);
                process::exit(EX_USAGE);
            }
        },
    };

    let script = matches.value_of("script").map(str::to_owned);
    let prompt = matches.value_of("prompt").unwrap_or("> ").to_owned();
    // Deep recursion in scripts needs more than the main thread's stack.
    let worker = thread::Builder::new()
        .name("interpreter".to_owned())
        .stack_size(loxe::STACK_SIZE)
        .spawn(move || match script {
            Some(path) => run_file(&path),
            None => run_prompt(&prompt),
        });
    let code = match worker {
        Ok(handle) => handle.join().unwrap_or(EX_SOFTWARE),
        Err(e) => {
            eprintln!("Could not start the interpreter thread: {}", e);
            EX_OSERR
        }
    };
    process::exit(code);
}

fn run_file(path: &str) -> i32 {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Could not read '{}': {}", path, e);
            return EX_IOERR;
        }
    };
    info!("running {}", path);
    let mut out = io::stdout();
    let mut session = Session::new(&mut out);
    match session.run(&source) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{}", e);
            e.exit_code()
        }
    }
}

/// Reads and runs one line at a time until an empty line or end of input.
fn run_prompt(prompt: &str) -> i32 {
    let mut out = io::stdout();
    let mut session = Session::new(&mut out);
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut line = String::new();
    loop {
        print!("{}", prompt);
        if let Err(e) = io::stdout().flush() {
            eprintln!("{}", e);
            return EX_IOERR;
        }
        line.clear();
        match input.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}", e);
                return EX_IOERR;
            }
        }
        let source = line.trim_end();
        if source.is_empty() {
            break;
        }
        if let Err(e) = session.run(source) {
            eprintln!("{}", e);
        }
    }
    0
}
