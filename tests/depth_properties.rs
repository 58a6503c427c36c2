//! Property tests for name resolution.
//!
//! Random programs of nested blocks, immediately-called functions and
//! deferred closures are run through the interpreter and compared with a
//! model of lexical scoping. If a resolved depth ever disagreed with the
//! runtime scope chain, a print would read the wrong binding (or fail).

use loxe::Session;
use proptest::prelude::*;
use std::cell::Cell;
use std::rc::Rc;

const NAMES: [&str; 3] = ["a", "b", "c"];

#[derive(Debug, Clone)]
enum Node {
    Declare(usize, u32),
    Print(usize),
    Assign(usize, u32),
    /// `fun gN() { print name; }`, called when its scope ends.
    Capture(usize),
    Block(Vec<Node>),
    /// `fun fN() { ... } fN();`
    Function(Vec<Node>),
}

// ============================================================================
// Strategies
// ============================================================================

fn arb_node() -> impl Strategy<Value = Node> {
    let leaf = prop_oneof![
        (0..NAMES.len(), 0u32..1000).prop_map(|(n, v)| Node::Declare(n, v)),
        (0..NAMES.len()).prop_map(Node::Print),
        (0..NAMES.len(), 0u32..1000).prop_map(|(n, v)| Node::Assign(n, v)),
        (0..NAMES.len()).prop_map(Node::Capture),
    ];
    leaf.prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Node::Block),
            prop::collection::vec(inner, 0..6).prop_map(Node::Function),
        ]
    })
}

// ============================================================================
// Scope model
// ============================================================================

type Binding = Rc<Cell<u32>>;

/// Renders a program while tracking what each print must show. Statements
/// that would not resolve (reads of undeclared names, redeclarations) are
/// dropped, so every rendered program is valid.
struct Model {
    scopes: Vec<Vec<(usize, Binding)>>,
    pending: Vec<Vec<(String, Binding)>>,
    source: String,
    expected: String,
    next_function: usize,
}

impl Model {
    fn new() -> Model {
        Model {
            scopes: vec![Vec::new()],
            pending: vec![Vec::new()],
            source: String::new(),
            expected: String::new(),
            next_function: 0,
        }
    }

    fn lookup(&self, name: usize) -> Option<Binding> {
        self.scopes.iter().rev().find_map(|scope| {
            scope
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, binding)| binding.clone())
        })
    }

    fn function_name(&mut self, prefix: &str) -> String {
        self.next_function += 1;
        format!("{}{}", prefix, self.next_function)
    }

    fn open(&mut self) {
        self.scopes.push(Vec::new());
        self.pending.push(Vec::new());
    }

    fn close(&mut self) {
        for (function, binding) in self.pending.pop().unwrap_or_default() {
            self.source.push_str(&format!("{}();\n", function));
            self.expected.push_str(&format!("{}\n", binding.get()));
        }
        self.scopes.pop();
    }

    fn render(&mut self, nodes: &[Node]) {
        for node in nodes {
            match node {
                Node::Declare(name, value) => {
                    let scope = self.scopes.last_mut().unwrap();
                    if scope.iter().all(|(n, _)| n != name) {
                        scope.push((*name, Rc::new(Cell::new(*value))));
                        self.source
                            .push_str(&format!("var {} = {};\n", NAMES[*name], value));
                    }
                }
                Node::Print(name) => {
                    if let Some(binding) = self.lookup(*name) {
                        self.source.push_str(&format!("print {};\n", NAMES[*name]));
                        self.expected.push_str(&format!("{}\n", binding.get()));
                    }
                }
                Node::Assign(name, value) => {
                    if let Some(binding) = self.lookup(*name) {
                        binding.set(*value);
                        self.source
                            .push_str(&format!("{} = {};\n", NAMES[*name], value));
                    }
                }
                Node::Capture(name) => {
                    if let Some(binding) = self.lookup(*name) {
                        let function = self.function_name("g");
                        self.source.push_str(&format!(
                            "fun {}() {{ print {}; }}\n",
                            function, NAMES[*name]
                        ));
                        self.pending.last_mut().unwrap().push((function, binding));
                    }
                }
                Node::Block(body) => {
                    self.source.push_str("{\n");
                    self.open();
                    self.render(body);
                    self.close();
                    self.source.push_str("}\n");
                }
                Node::Function(body) => {
                    let function = self.function_name("f");
                    self.source.push_str(&format!("fun {}() {{\n", function));
                    self.open();
                    self.render(body);
                    self.close();
                    self.source.push_str(&format!("}}\n{}();\n", function));
                }
            }
        }
    }
}

fn render(program: &[Node]) -> (String, String) {
    let mut model = Model::new();
    model.render(program);
    model.close();
    (model.source, model.expected)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prints_follow_lexical_scope(program in prop::collection::vec(arb_node(), 1..10)) {
        let (source, expected) = render(&program);
        let mut out: Vec<u8> = Vec::new();
        let result = {
            let mut session = Session::new(&mut out);
            session.run(&source)
        };
        prop_assert!(result.is_ok(), "{}\n{}", result.unwrap_err(), source);
        prop_assert_eq!(String::from_utf8(out).unwrap(), expected, "{}", source);
    }

    #[test]
    fn redeclaring_in_one_scope_never_resolves(name in 0..NAMES.len(), nested in 0usize..4) {
        let open = "{ ".repeat(nested);
        let close = " }".repeat(nested);
        let source = format!(
            "{}var {n} = 1; var {n} = 2;{}",
            open,
            close,
            n = NAMES[name]
        );
        let mut out: Vec<u8> = Vec::new();
        let result = Session::new(&mut out).run(&source);
        prop_assert!(matches!(result, Err(loxe::Error::Resolve(_))), "{}", source);
    }
}

#[test]
fn model_renders_deferred_closures_after_reassignment() {
    let program = vec![
        Node::Declare(0, 1),
        Node::Block(vec![Node::Capture(0), Node::Declare(0, 5), Node::Assign(0, 6)]),
        Node::Assign(0, 2),
        Node::Print(0),
    ];
    let (source, expected) = render(&program);
    let mut out: Vec<u8> = Vec::new();
    Session::new(&mut out).run(&source).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), expected);
    assert_eq!(expected, "1\n2\n");
}
