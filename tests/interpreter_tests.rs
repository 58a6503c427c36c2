use loxe::{Error, Session};
use pretty_assertions::assert_eq;

fn run(source: &str) -> (String, Result<(), Error>) {
    let mut out: Vec<u8> = Vec::new();
    let result = {
        let mut session = Session::new(&mut out);
        session.run(source)
    };
    (String::from_utf8(out).unwrap(), result)
}

fn expect_output(source: &str, expected: &str) {
    let (out, result) = run(source);
    if let Err(e) = result {
        panic!("unexpected error: {}", e);
    }
    assert_eq!(out, expected);
}

/// Runs `f` on a thread with the stack size the binary uses.
fn on_interpreter_stack<F: FnOnce() + Send + 'static>(f: F) {
    let handle = std::thread::Builder::new()
        .stack_size(loxe::STACK_SIZE)
        .spawn(f)
        .unwrap();
    handle.join().unwrap();
}

/// Returns the output produced before the error.
fn expect_runtime_error(source: &str, message: &str) -> String {
    let (out, result) = run(source);
    match result {
        Err(Error::Runtime(e)) => assert_eq!(e.message, message),
        other => panic!("expected a runtime error, got {:?}", other),
    }
    out
}

fn expect_resolve_error(source: &str, message: &str) {
    let (out, result) = run(source);
    match result {
        Err(Error::Resolve(errors)) => {
            assert_eq!(errors.len(), 1, "{:?}", errors);
            assert_eq!(errors[0].message, message);
        }
        other => panic!("expected a resolve error, got {:?}", other),
    }
    assert_eq!(out, "");
}

#[test]
fn closures_capture_by_reference() {
    expect_output(
        r#"
fun make_counter() {
  var i = 0;
  fun inc() { i = i + 1; return i; }
  return inc;
}
var c = make_counter();
print c();
print c();
var d = make_counter();
print d();
"#,
        "1\n2\n1\n",
    );
}

#[test]
fn shadowing_in_nested_blocks() {
    expect_output(
        "{ var x = 1; { var x = 2; print x; } print x; }",
        "2\n1\n",
    );
}

#[test]
fn closures_bind_to_the_scope_they_were_resolved_in() {
    expect_output(
        r#"
var a = "global";
{
  fun show() { print a; }
  show();
  var a = "block";
  show();
  print a;
}
"#,
        "global\nglobal\nblock\n",
    );
}

#[test]
fn redeclaration_is_a_static_error() {
    let (_, result) = run("{ var x = 1; var x = 2; }");
    let err = result.unwrap_err();
    assert_eq!(err.exit_code(), 65);
    assert_eq!(
        err.to_string(),
        "[1, 18] ResolveError: Symbol 'x' is already declared in this scope. at 'x'"
    );
}

#[test]
fn super_dispatch_across_levels() {
    expect_output(
        r#"
class A {
  method() { return "A.method"; }
  describe() { return "A sees " + this.name; }
}
class B < A {
  method() { return "B then " + super.method(); }
}
class C < B {
  init(name) { this.name = name; }
  method() { return "C then " + super.method(); }
  describe() { return super.describe(); }
}
var c = C("c");
print c.method();
print c.describe();
"#,
        "C then B then A.method\nA sees c\n",
    );
}

#[test]
fn inherited_initializer() {
    expect_output(
        r#"
class Base { init(x) { this.x = x; } }
class Derived < Base {}
print Derived(7).x;
"#,
        "7\n",
    );
}

#[test]
fn arithmetic_and_equality() {
    expect_output(
        r#"
print 1 + 2;
print "a" + "b";
print nil == nil;
print 0 == false;
print 7 / 2;
print -(3 - 5) * 2;
print 1 < 2 and 2 <= 2;
print !nil;
"#,
        "3\nab\ntrue\nfalse\n3.5\n4\ntrue\ntrue\n",
    );
}

#[test]
fn mixed_addition_is_a_runtime_error() {
    let (_, result) = run("print 1 + \"a\";");
    let err = result.unwrap_err();
    assert_eq!(err.exit_code(), 70);
    assert_eq!(
        err.to_string(),
        "[1, 9] RuntimeError: Operands must be two numbers or two strings. at '+'"
    );
}

#[test]
fn logical_operators_short_circuit() {
    expect_output(
        r#"
var calls = 0;
fun touch() { calls = calls + 1; return true; }
print false and touch();
print true or touch();
print nil or "fallback";
print calls;
"#,
        "false\ntrue\nfallback\n0\n",
    );
}

#[test]
fn arrays() {
    expect_output(
        r#"
var a = [3:];
a[0] = "v";
print a[0];
print len(a);
print a;
var b = [4: 1, 2];
print b;
var c = [1, [2, 3]];
print c[1][0];
var alias = c;
alias[0] = 9;
print c[0];
"#,
        "v\n3\n[v, nil, nil]\n[1, 2, nil, nil]\n2\n9\n",
    );
}

#[test]
fn array_bounds() {
    let out = expect_runtime_error(
        "var a = [1, 2, 3]; print a[2]; print a[3];",
        "Index 3 is out of bounds for array of length 3.",
    );
    assert_eq!(out, "3\n");
    expect_runtime_error(
        "var a = [1, 2, 3]; print a[-1];",
        "Index -1 is out of bounds for array of length 3.",
    );
    expect_runtime_error("var a = [1]; a[1] = 0;", "Index 1 is out of bounds for array of length 1.");
    expect_runtime_error("var a = [1]; print a[\"0\"];", "Index must be a number.");
    expect_runtime_error("var a = [1]; print a[0.5];", "Index must be an integer.");
    expect_runtime_error("var a = [1: 1, 2];", "Array of size 1 cannot hold 2 initializers.");
}

#[test]
fn loop_control() {
    expect_output(
        r#"
for (var i = 0; i < 10; i = i + 1) {
  if (i == 2) continue;
  if (i == 5) break;
  print i;
}
var n = 0;
while (true) {
  n = n + 1;
  if (n < 3) continue;
  break;
}
print n;
"#,
        "0\n1\n3\n4\n3\n",
    );
}

#[test]
fn loop_control_outside_loops_is_static() {
    expect_resolve_error("break;", "Can't use 'break' outside of a loop.");
    expect_resolve_error(
        "print \"never\"; continue;",
        "Can't use 'continue' outside of a loop.",
    );
    expect_resolve_error(
        "for (;;) { fun f() { break; } }",
        "Can't use 'break' outside of a loop.",
    );
}

#[test]
fn modules() {
    expect_output(
        r#"
module geometry {
  var pi = 3;
  fun area(r) { return pi * r * r; }
}
print geometry.area(2);
geometry.pi = 4;
print geometry.area(1);
print geometry.pi;
print geometry;
"#,
        "12\n4\n4\n<module geometry>\n",
    );
    expect_runtime_error(
        "module m { var a = 1; } print m.b;",
        "Undefined property 'b'.",
    );
    expect_runtime_error(
        "module m { var a = 1; } m.b = 2;",
        "Undefined property 'b'.",
    );
    expect_runtime_error(
        "var x = 1; print x.y;",
        "Only instances and modules have properties.",
    );
    let out = expect_runtime_error(
        "module m { let x = 1; } print m.x; m.x = 2; print m.x;",
        "Can't assign to read-only binding 'x'.",
    );
    assert_eq!(out, "1\n");
    expect_runtime_error(
        "module outer { module inner { var a = 1; } } outer.inner = nil;",
        "Can't assign to read-only binding 'inner'.",
    );
}

#[test]
fn lambdas() {
    expect_output(
        r#"
var add = fun (a, b) { return a + b; };
print add(1, 2);
print add;
print fun named() {};
fun apply(f, x) { return f(x); }
print apply(fun (n) { return n * 10; }, 4);
"#,
        "3\n<fn>\n<fn named>\n40\n",
    );
}

#[test]
fn named_lambdas_can_recurse() {
    expect_output(
        r#"
var f = fun fact(n) { if (n < 2) return 1; return n * fact(n - 1); };
print f(5);
var fact = "outer";
print f(4);
print fact;
"#,
        "120\n24\nouter\n",
    );
    expect_resolve_error(
        "var f = fun g() { g = nil; };",
        "Can't assign to read-only binding 'g'.",
    );
}

#[test]
fn let_bindings() {
    expect_output("let a = 1; { let a = 2; print a; } print a;", "2\n1\n");
    expect_resolve_error("let a = 1; a = 2;", "Can't assign to read-only binding 'a'.");
    expect_resolve_error(
        "fun f() { let a = 1; fun g() { a = 3; } }",
        "Can't assign to read-only binding 'a'.",
    );
}

#[test]
fn natives() {
    expect_output(
        "print clock() > 0; print len(\"héllo\"); print len;",
        "true\n5\n<native fn len>\n",
    );
    let (_, result) = run("print len(1);");
    match result {
        Err(Error::Runtime(e)) => {
            assert_eq!(e.message, "len() expects an array or a string, got number.");
            assert_eq!(e.token.map(|t| t.lexeme.to_string()), Some(")".to_string()));
        }
        other => panic!("expected a runtime error, got {:?}", other),
    }
}

#[test]
fn initializer_returns_this() {
    expect_output(
        r#"
class P {
  init(x) { this.x = x; return; }
}
var p = P(1);
print p.init(2) == p;
print p.x;
print P;
print p;
"#,
        "true\n2\n<class P>\n<P instance>\n",
    );
}

#[test]
fn fields_shadow_methods() {
    expect_output(
        r#"
class A { m() { return "method"; } }
var a = A();
print a.m();
a.m = fun () { return "field"; };
print a.m();
"#,
        "method\nfield\n",
    );
    expect_runtime_error("class A {} print A().missing;", "Undefined property 'missing'.");
}

#[test]
fn bound_methods_remember_their_instance() {
    expect_output(
        r#"
class Counter {
  init() { this.n = 0; }
  bump() { this.n = this.n + 1; return this.n; }
}
var c = Counter();
var bump = c.bump;
bump();
bump();
print c.n;
"#,
        "2\n",
    );
}

#[test]
fn runtime_errors_halt_execution() {
    let out = expect_runtime_error(
        "print \"before\"; print nil + 1; print \"after\";",
        "Operands must be two numbers or two strings.",
    );
    assert_eq!(out, "before\n");
}

#[test]
fn call_errors() {
    expect_runtime_error("fun f(a) {} f();", "Expected 1 arguments but got 0.");
    expect_runtime_error("\"text\"();", "Can only call functions and classes.");
    expect_runtime_error("class A { init(a, b) {} } A(1);", "Expected 2 arguments but got 1.");
    expect_runtime_error("print undefined;", "'undefined' is an undefined symbol.");
    expect_runtime_error("var x = 1; class A < x {}", "Superclass must be a class.");
}

#[test]
fn unbounded_recursion_is_reported() {
    on_interpreter_stack(|| {
        expect_runtime_error("fun f() { return f(); } f();", "Stack overflow.");
    });
}

#[test]
fn deep_recursion_within_the_limit() {
    on_interpreter_stack(|| {
        expect_output(
            r#"
fun sum(n) { if (n == 0) return 0; return n + sum(n - 1); }
print sum(1000);
fun depth(n) { if (n == 1) return 1; return 1 + depth(n - 1); }
print depth(4990);
"#,
            "500500\n4990\n",
        );
    });
}

#[test]
fn recursion() {
    expect_output(
        r#"
fun fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); }
print fib(15);
"#,
        "610\n",
    );
}

#[test]
fn pure_expressions_are_idempotent() {
    expect_output(
        r#"
var a = 2;
var b = "x";
print (a * 3 + 1 == 7) and (b + b == "xx");
print (a * 3 + 1 == 7) and (b + b == "xx");
"#,
        "true\ntrue\n",
    );
}

#[test]
fn session_keeps_globals_between_runs() {
    let mut out: Vec<u8> = Vec::new();
    {
        let mut session = Session::new(&mut out);
        session.run("var a = 1; fun get() { return a; }").unwrap();
        session.run("a = a + 1;").unwrap();
        session.run("print get();").unwrap();
        assert!(session.run("print missing;").is_err());
        session.run("print a;").unwrap();
    }
    assert_eq!(String::from_utf8(out).unwrap(), "2\n2\n");
}

#[test]
fn syntax_errors_are_all_reported() {
    let (out, result) = run("var = 1;\nprint ;\nprint \"ok\";");
    match result {
        Err(Error::Parse(errors)) => {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            assert_eq!(
                messages,
                vec![
                    "[1, 5] ParseError: Expect variable name. at '='".to_string(),
                    "[2, 7] ParseError: Expect expression. at ';'".to_string(),
                ]
            );
        }
        other => panic!("expected parse errors, got {:?}", other),
    }
    assert_eq!(out, "");
}

#[test]
fn scan_errors_stop_the_run() {
    let (out, result) = run("print 1;\nprint \"open;");
    match result {
        Err(e @ Error::Scan(_)) => {
            assert_eq!(e.exit_code(), 65);
            assert_eq!(e.to_string(), "[2, 7] ScanError: Unterminated string.");
        }
        other => panic!("expected a scan error, got {:?}", other),
    }
    assert_eq!(out, "");
}
