use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

use openworld_scripting::plugin::compiler::{self, ModuleSource};
use openworld_scripting::plugin::router::invoke;
use openworld_scripting::plugin::{ScriptInstance, SeverityPolicy, TracingHost, Value};

const GREETER: &str = r#"
fn greet(name: string) { return "hello " + name }
fn greet(n: int) { return n * 2 }
fn greet(a: int, b: int) { return a + b }
fn fib(n: int) {
    if n < 2 { return n }
    return fib(n - 1) + fib(n - 2)
}
"#;

fn greeter() -> ScriptInstance {
    let (instance, _) = compiler::load(
        ModuleSource {
            name: "greeter",
            file: "greeter.ows",
            source: GREETER,
        },
        &[],
        &SeverityPolicy::default(),
        Arc::new(TracingHost),
    )
    .unwrap();
    instance
}

fn bench_compile(c: &mut Criterion) {
    c.bench_function("compile_greeter", |b| {
        b.iter(|| black_box(greeter()));
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let instance = greeter();

    c.bench_function("dispatch_overload_string", |b| {
        b.iter(|| black_box(invoke(&instance, "greet", vec![Value::from("Ada")])));
    });

    c.bench_function("dispatch_overload_int", |b| {
        b.iter(|| black_box(invoke(&instance, "greet", vec![Value::Int(7)])));
    });

    c.bench_function("dispatch_unresolved", |b| {
        b.iter(|| black_box(invoke(&instance, "greet", vec![Value::Bool(true)])));
    });

    c.bench_function("dispatch_single_fib_15", |b| {
        b.iter(|| black_box(invoke(&instance, "fib", vec![Value::Int(15)])));
    });
}

criterion_group!(benches, bench_compile, bench_dispatch);
criterion_main!(benches);
