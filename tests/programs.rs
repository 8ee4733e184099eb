#![cfg(feature = "scheme")]
#![expect(clippy::unwrap_used)] // test code OK

use schemelike::Error;
use schemelike::ast::Value;
use schemelike::environment::{Environment, TableConfig, is_prime};
use schemelike::evaluator::{create_global_env, evaluate};
use schemelike::scheme::parse_program_source;

/// Run every form of `source` in `env`, returning the last result
fn run_in(source: &str, env: &mut Environment) -> Result<Option<Value>, Error> {
    let mut last = None;
    for form in parse_program_source(source)? {
        last = Some(evaluate(&form, env)?);
    }
    Ok(last)
}

fn run(source: &str) -> Result<Option<Value>, Error> {
    run_in(source, &mut create_global_env())
}

#[derive(Debug)]
enum Expected {
    Returns(Value),
    Fails(fn(&Error) -> bool),
}

#[test]
fn test_programs_data_driven() {
    use Expected::{Fails, Returns};

    let test_cases: Vec<(&str, &str, Expected)> = vec![
        ("sum", "(+ 1 2 3)", Returns(Value::Integer(6))),
        ("float sum", "(+ 1.0 2 3)", Returns(Value::Float(6.0))),
        (
            "sequencing",
            "(begin (var a 5) (var b 6) (+ a b))",
            Returns(Value::Integer(11)),
        ),
        (
            "top-level forms share the environment",
            "(var a 5)\n(var b 6)\n(+ a b)",
            Returns(Value::Integer(11)),
        ),
        (
            "const blocks var",
            "(const a 5)\n(var a 6)",
            Fails(|e| matches!(e, Error::ConstReassignment(name) if name == "a")),
        ),
        (
            "conditional",
            "(if (< 1 2) 10 20)",
            Returns(Value::Integer(10)),
        ),
        (
            "conditional false",
            "(if (< 2 1) 10 20)",
            Returns(Value::Integer(20)),
        ),
        (
            "function definition and call",
            "(func add2 (a b) (+ a b))\n(add2 3 4)",
            Returns(Value::Integer(7)),
        ),
        ("average", "(average 1 2 3)", Returns(Value::Float(2.0))),
        ("abs", "(abs -5)", Returns(Value::Integer(5))),
        (
            "unbound identifier",
            "(+ 1 missing)",
            Fails(|e| matches!(e, Error::UnboundIdentifier(name) if name == "missing")),
        ),
        (
            "non-bool condition",
            "(if 0 1 2)",
            Fails(|e| matches!(e, Error::InvalidCondition(_))),
        ),
        (
            "integer division by zero",
            "(var zero 0)\n(/ 10 zero)",
            Fails(|e| matches!(e, Error::DivisionByZero)),
        ),
        (
            "float division by zero",
            "(/ 1.0 0)",
            Returns(Value::Float(f64::INFINITY)),
        ),
        (
            "mixed kinds under an integer seed",
            "(- 10 2.5)",
            Fails(|e| matches!(e, Error::TypeMismatch { operator, .. } if operator == "-")),
        ),
        (
            "lex error",
            "(+ 1 #)",
            Fails(|e| matches!(e, Error::Lex(_))),
        ),
        (
            "parse error",
            "(+ 1 2",
            Fails(|e| matches!(e, Error::Parse(_))),
        ),
        (
            "recursion through the copied frame",
            "(func sum_to (n) (if (< n 1) 0 (+ n (sum_to (- n 1)))))\n(sum_to 20)",
            Returns(Value::Integer(210)),
        ),
        (
            "recursion ninety calls deep",
            "(func sum_to (n) (if (< n 1) 0 (+ n (sum_to (- n 1)))))\n(sum_to 90)",
            Returns(Value::Integer(4095)),
        ),
        (
            "float literal ending the program",
            "(var a 1)\n2.5",
            Returns(Value::Float(2.5)),
        ),
        (
            "runaway recursion",
            "(func spin (n) (spin (+ n 1)))\n(spin 0)",
            Fails(|e| matches!(e, Error::DepthLimitExceeded(_))),
        ),
    ];

    for (name, source, expected) in test_cases {
        let result = run(source);
        match (result, expected) {
            (Ok(Some(actual)), Returns(expected)) => {
                assert_eq!(actual, expected, "{name}: wrong result for {source:?}");
            }
            (Err(err), Fails(check)) => {
                assert!(check(&err), "{name}: unexpected error {err:?}");
            }
            (other, expected) => {
                panic!("{name}: expected {expected:?}, got {other:?}");
            }
        }
    }
}

#[test]
fn test_functions_do_not_leak_bindings() {
    let mut env = create_global_env();
    let program = "
        (var counter 0)
        (func bump (by) (begin (var counter (+ counter by)) (var scratch 1) counter))
        (bump 5)
    ";

    assert_eq!(run_in(program, &mut env).unwrap(), Some(Value::Integer(5)));
    assert_eq!(env.lookup("counter").unwrap().value, Value::Integer(0));
    assert!(env.lookup("scratch").is_none());
    assert!(env.lookup("by").is_none());
}

#[test]
fn test_errors_leave_environment_usable() {
    let mut env = create_global_env();

    run_in("(const limit 10)", &mut env).unwrap();
    assert!(run_in("(var limit 11)", &mut env).is_err());
    assert!(run_in("(undefined_fn 1)", &mut env).is_err());

    // Earlier definitions survive failed evaluations
    assert_eq!(
        run_in("(+ limit 1)", &mut env).unwrap(),
        Some(Value::Integer(11))
    );
}

#[test]
fn test_many_bindings_grow_the_table() {
    let mut env = create_global_env();
    let program: String = (0..100)
        .map(|i| format!("(var v{i} {i})\n"))
        .chain(std::iter::once("(+ v0 v1 v50 v99)".to_owned()))
        .collect();

    assert_eq!(
        run_in(&program, &mut env).unwrap(),
        Some(Value::Integer(150))
    );
    assert_eq!(env.size(), 100);
    assert!(is_prime(env.capacity()));
    assert!(env.current_load() <= env.load_factor());
    for i in 0..100 {
        assert_eq!(
            env.lookup(&format!("v{i}")).unwrap().value,
            Value::Integer(i)
        );
    }
}

#[test]
fn test_custom_table_config() {
    let config = TableConfig {
        load_factor: 0.9,
        initial_capacity: 3,
    };
    let mut env = Environment::with_config(config).unwrap();
    assert_eq!(env.capacity(), 3);

    let program = "
        (func fact (n) (if (< n 2) 1 (* n (fact (- n 1)))))
        (var a (fact 5))
        (var b (fact 6))
        (const c (+ a b))
        c
    ";
    assert_eq!(run_in(program, &mut env).unwrap(), Some(Value::Integer(840)));
    assert!(env.capacity() > 3);

    let rejected = Environment::with_config(TableConfig {
        load_factor: 2.0,
        initial_capacity: 11,
    });
    assert!(matches!(rejected, Err(Error::InvalidConfig(_))));
}

#[test]
fn test_empty_program() {
    assert_eq!(run("").unwrap(), None);
    assert_eq!(run("   \n\t").unwrap(), None);
}
