pub mod ast;
pub mod callable;
pub mod class;
pub mod environment;
pub mod instance;
pub mod interpreter;
pub mod parser;
pub mod resolver;
pub mod scanner;
pub mod token;
pub mod value;

mod tracker;

use crate::interpreter::{Interpreter, RuntimeError};
use crate::parser::ParseError;
use crate::resolver::ResolverError;
use crate::scanner::ScanError;
use log::debug;
use std::fmt::Display;
use std::io::Write;

/// Host stack for the thread that runs a `Session`. Sized so that
/// `interpreter::MAX_CALL_DEPTH` nested calls fit in an unoptimized build.
pub const STACK_SIZE: usize = 512 * 1024 * 1024;

/// Why a run stopped. Scan, parse and resolve failures carry every error
/// found in the source; nothing was executed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{}", lines(.0))]
    Scan(Vec<ScanError>),
    #[error("{}", lines(.0))]
    Parse(Vec<ParseError>),
    #[error("{}", lines(.0))]
    Resolve(Vec<ResolverError>),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Scan(_) | Error::Parse(_) | Error::Resolve(_) => 65,
            Error::Runtime(_) => 70,
        }
    }
}

fn lines<T: Display>(errors: &[T]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// One interpreter plus the pipeline in front of it. Globals persist across
/// `run` calls.
pub struct Session<'w> {
    interpreter: Interpreter<'w>,
}

impl<'w> Session<'w> {
    pub fn new(out: &'w mut dyn Write) -> Session<'w> {
        Session {
            interpreter: Interpreter::new(out),
        }
    }

    pub fn interpreter(&self) -> &Interpreter<'w> {
        &self.interpreter
    }

    pub fn run(&mut self, source: &str) -> Result<(), Error> {
        let tokens = scanner::scan_tokens(source).map_err(Error::Scan)?;
        debug!("scanned {} token(s)", tokens.len());
        let statements = parser::parse(&tokens).map_err(Error::Parse)?;
        debug!("parsed {} statement(s)", statements.len());
        resolver::resolve(&statements).map_err(Error::Resolve)?;
        self.interpreter.interpret(&statements)?;
        Ok(())
    }
}

#[cfg(test)]
mod session_tests {
    use crate::tracker::Release;
    use crate::value::Value;
    use crate::{Error, Session};
    use std::rc::Weak;

    const CYCLES: &str = r#"
class Node {
  init() { this.me = this; this.again = this.get; }
  get() { return this; }
}
var n = Node();
var a = [1:];
a[0] = a;
fun outer() {
  var cell = [1:];
  fun inner() { return cell; }
  cell[0] = inner;
  return cell;
}
var c = outer();
"#;

    fn handle(session: &Session<'_>, name: &str) -> Weak<dyn Release> {
        match session.interpreter().globals().get_local(name) {
            Some(Value::Instance(instance)) => instance.downgrade(),
            Some(Value::Array(array)) => array.downgrade(),
            other => panic!("unexpected global {:?}", other),
        }
    }

    #[test]
    fn dropping_the_session_breaks_cycles() {
        let mut out: Vec<u8> = Vec::new();
        let handles: Vec<Weak<dyn Release>>;
        {
            let mut session = Session::new(&mut out);
            session.run(CYCLES).unwrap();
            handles = ["n", "a", "c"]
                .iter()
                .map(|name| handle(&session, name))
                .collect();
            assert!(handles.iter().all(|h| h.strong_count() > 0));
        }
        for h in &handles {
            assert_eq!(h.strong_count(), 0);
        }
    }

    #[test]
    fn exit_codes() {
        let mut out: Vec<u8> = Vec::new();
        let mut session = Session::new(&mut out);
        let scan = session.run("@").unwrap_err();
        assert!(matches!(scan, Error::Scan(_)));
        assert_eq!(scan.exit_code(), 65);
        let runtime = session.run("print -nil;").unwrap_err();
        assert_eq!(runtime.exit_code(), 70);
        assert_eq!(
            runtime.to_string(),
            "[1, 7] RuntimeError: Operand must be a number. at '-'"
        );
    }
}
