//! End-to-end behavior of converted trees: programs are read, lowered,
//! converted and run, and must behave like the unconverted source.

use framejit_ir::{lower, Literal, Node, UnaryOp};
use framejit_parser::parse;
use framejit_runtime::{compile_tree, ExecError, Executable, RuntimeError, Value};
use framejit_transform::{CompileError, CompileOptions};
use framejit_types::ThunkStrategy;

fn build_with(source: &str, strategy: ThunkStrategy) -> Result<Executable, ExecError> {
    let lowered = lower(&parse(source).unwrap()).unwrap();
    compile_tree(&lowered.root, &CompileOptions::default().with_thunks(strategy))
}

fn build(source: &str) -> Executable {
    build_with(source, ThunkStrategy::Lazy).unwrap()
}

fn int(value: Value) -> i64 {
    value.as_int().unwrap()
}

const COUNTER: &str = r#"
    (lambda ((start int))
      (block ((count int) (next (fn () int)))
        (set! count start)
        (set! next (lambda () (set!op + count 1) count))
        (call next)
        (call next)
        (+ (call next) (* count 100))))
"#;

#[test]
fn test_captured_variables_are_shared_with_the_closure() {
    let exe = build(COUNTER);
    assert_eq!(exe.arity(), 1);
    assert_eq!(exe.table().len(), 1);
    assert_eq!(int(exe.invoke(vec![Value::Int(10)]).unwrap()), 1313);
}

#[test]
fn test_escaping_closures_keep_their_frames() {
    let exe = build("(lambda ((a int)) (lambda ((b int)) (lambda ((c int)) (+ a (* b c)))))");
    let add_a = exe.invoke(vec![Value::Int(1)]).unwrap();
    let mul_b = add_a.as_function().unwrap().call(vec![Value::Int(2)]).unwrap();
    let f = mul_b.as_function().unwrap();
    assert_eq!(int(f.call(vec![Value::Int(3)]).unwrap()), 7);
    assert_eq!(int(f.call(vec![Value::Int(5)]).unwrap()), 11);
}

#[test]
fn test_each_activation_gets_its_own_frame() {
    let source = r#"
        (lambda ()
          (block ((make (fn (int) (fn () int))) (a (fn () int)) (b (fn () int)))
            (set! make (lambda ((n int)) (lambda () (set!op * n 2) n)))
            (set! a (call make 1))
            (set! b (call make 10))
            (call a)
            (call a)
            (+ (call a) (call b))))
    "#;
    assert_eq!(int(build(source).invoke(vec![]).unwrap()), 28);
}

#[test]
fn test_loop_iterations_get_fresh_blocks() {
    let source = r#"
        (lambda ()
          (block ((i int) (first (fn () int)) (last (fn () int)))
            (while (< i 3)
              (block ((k int))
                (set! k i)
                (if (== i 0) (set! first (lambda () k)))
                (set! last (lambda () k)))
              (set!op + i 1))
            (+ (* (call first) 10) (call last))))
    "#;
    assert_eq!(int(build(source).invoke(vec![]).unwrap()), 2);
}

#[test]
fn test_quote_observes_later_writes() {
    let source = r#"
        (lambda ()
          (block ((x int) (q any))
            (set! x 1)
            (set! q (quote (lambda () (+ x 1))))
            (set! x 41)
            q))
    "#;
    let value = build(source).invoke(vec![]).unwrap();
    let Value::Quote(quote) = value else {
        panic!("expected a quote");
    };
    assert_eq!(int(quote.read("x").unwrap()), 41);

    let compiled = quote.compile().unwrap();
    let f = compiled.as_function().unwrap();
    assert_eq!(int(f.call(vec![]).unwrap()), 42);

    quote.write("x", Value::Int(9)).unwrap();
    assert_eq!(int(f.call(vec![]).unwrap()), 10);
    assert!(quote.write("y", Value::Int(0)).is_err());
}

#[test]
fn test_quote_inside_a_closure_reaches_outer_frames() {
    let exe = build("(lambda ((a int)) (lambda () (quote (lambda () (* a 2)))))");
    let f = exe.invoke(vec![Value::Int(7)]).unwrap();
    let value = f.as_function().unwrap().call(vec![]).unwrap();
    let Value::Quote(quote) = value else {
        panic!("expected a quote");
    };
    assert_eq!(quote.variables().map(|v| v.name()).collect::<Vec<_>>(), vec!["a"]);
    assert_eq!(int(quote.read("a").unwrap()), 7);
    let compiled = quote.compile().unwrap();
    assert_eq!(int(compiled.as_function().unwrap().call(vec![]).unwrap()), 14);
}

#[test]
fn test_runtime_variables_alias_storage() {
    let source = r#"
        (lambda ((a int))
          (block ((b int) (rv any))
            (set! rv (runtime-variables a b))
            (set! b 5)
            rv))
    "#;
    let value = build(source).invoke(vec![Value::Int(3)]).unwrap();
    let Value::RuntimeVariables(view) = value else {
        panic!("expected runtime variables");
    };
    assert_eq!(view.len(), 2);
    assert_eq!(int(view.get(0).unwrap()), 3);
    assert_eq!(int(view.get(1).unwrap()), 5);

    view.set(1, Value::Int(8)).unwrap();
    assert_eq!(int(view.get(1).unwrap()), 8);
    assert!(matches!(
        view.get(2),
        Err(RuntimeError::IndexOutOfRange { index: 2, len: 2 })
    ));
}

#[test]
fn test_runtime_variables_seen_by_closures() {
    let source = r#"
        (lambda ()
          (block ((b int) (rv any) (bump (fn () int)))
            (set! rv (runtime-variables b))
            (set! bump (lambda () (set!op + b 1) b))
            (call bump)
            rv))
    "#;
    let value = build(source).invoke(vec![]).unwrap();
    let Value::RuntimeVariables(view) = value else {
        panic!("expected runtime variables");
    };
    assert_eq!(int(view.get(0).unwrap()), 1);
}

#[test]
fn test_lazy_and_eager_agree() {
    for strategy in [ThunkStrategy::Lazy, ThunkStrategy::Eager] {
        let exe = build_with(COUNTER, strategy).unwrap();
        assert_eq!(int(exe.invoke(vec![Value::Int(0)]).unwrap()), 303);
        let compiled = exe.table().get(0).unwrap().is_compiled();
        assert!(compiled);
    }
}

#[test]
fn test_lazy_thunks_wait_for_first_use() {
    let exe = build("(lambda ((go bool)) (if go (call (lambda () 1)) 0))");
    assert_eq!(int(exe.invoke(vec![Value::Bool(false)]).unwrap()), 0);
    assert!(!exe.table().get(0).unwrap().is_compiled());
    assert_eq!(int(exe.invoke(vec![Value::Bool(true)]).unwrap()), 1);
    assert!(exe.table().get(0).unwrap().is_compiled());
}

#[test]
fn test_conversion_is_repeatable() {
    let first = build(COUNTER).invoke(vec![Value::Int(2)]).unwrap();
    let second = build(COUNTER).invoke(vec![Value::Int(2)]).unwrap();
    assert!(first.equals(&second));
}

#[test]
fn test_catch_variables_can_be_captured() {
    let source = r#"
        (lambda ()
          (try (throw 5 int)
            (catch (e int) (when (call (lambda () (> e 2))))
              (call (lambda () (* e 10))))))
    "#;
    assert_eq!(int(build(source).invoke(vec![]).unwrap()), 50);
}

#[test]
fn test_finally_and_rethrow() {
    let source = r#"
        (lambda ()
          (block ((log int) (f (fn () unit)))
            (set! f (lambda () (set!op + log 1) unit))
            (try
              (try (throw "inner") (catch (e int) 0) (finally (call f)))
              (catch (e string) (call f)))
            log))
    "#;
    assert_eq!(int(build(source).invoke(vec![]).unwrap()), 2);
}

#[test]
fn test_uncaught_exception_reaches_the_caller() {
    let err = build("(lambda () (throw 3 int))").invoke(vec![]).unwrap_err();
    assert!(matches!(err, RuntimeError::UncaughtException { ref value } if value == "3"));
}

#[test]
fn test_by_ref_arguments_write_through_frames() {
    let source = r#"
        (lambda ()
          (block ((x int) (bump (fn (int) unit)) (read (fn () int)))
            (set! bump (lambda ((r int ref)) (set!op + r 1) unit))
            (set! read (lambda () x))
            (call bump x)
            (call bump x)
            (call read)))
    "#;
    assert_eq!(int(build(source).invoke(vec![]).unwrap()), 2);
}

#[test]
fn test_capturing_a_by_ref_parameter_is_rejected() {
    let result = build_with("(lambda ((r int ref)) (lambda () r))", ThunkStrategy::Lazy);
    assert!(matches!(
        result,
        Err(ExecError::Compile(CompileError::ByRefCapture { .. }))
    ));
}

#[test]
fn test_non_lambda_roots_run_with_the_table() {
    let source = r#"
        (block ((x int) (f (fn () int)))
          (set! x 4)
          (set! f (lambda () (* x x)))
          (call f))
    "#;
    let exe = build(source);
    assert_eq!(exe.arity(), 0);
    assert_eq!(int(exe.invoke(vec![]).unwrap()), 16);
    assert!(matches!(
        exe.invoke(vec![Value::Int(1)]),
        Err(RuntimeError::ArityMismatch { expected: 0, found: 1 })
    ));
}

#[test]
fn test_reducible_shapes_run_after_normalization() {
    let source = r#"
        (lambda ((a any) (flag bool))
          (block ((n int) (f (fn () int)))
            (set! f (lambda () (set!op + n 2) n))
            (call f)
            (if (and flag (== (?? a 1) 1)) (call f) 0)))
    "#;
    let exe = build(source);
    assert_eq!(int(exe.invoke(vec![Value::Null, Value::Bool(true)]).unwrap()), 4);
    assert_eq!(int(exe.invoke(vec![Value::Null, Value::Bool(false)]).unwrap()), 0);
}

#[test]
fn test_deep_trees_fail_with_the_depth_limit() {
    let mut root = Node::constant(Literal::Int(1));
    for _ in 0..20_000 {
        root = Node::unary(UnaryOp::Neg, root);
    }
    let result = compile_tree(&root, &CompileOptions::default());
    assert!(matches!(
        result,
        Err(ExecError::Compile(CompileError::DepthLimitExceeded { limit: 512, .. }))
    ));
}
