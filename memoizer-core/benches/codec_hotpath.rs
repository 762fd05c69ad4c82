use chrono::NaiveDate;
use criterion::{criterion_group, criterion_main, Criterion};
use memoizer_core::{CallArgs, CallId, FunctionRef, NodeId, Value};
use std::hint::black_box;

const FUNCTION: FunctionRef = FunctionRef::new("reports::daily", "positions");

fn bench_args() -> CallArgs {
    CallArgs::new()
        .arg("portfolio-42")
        .arg(Value::tuple([Value::None, Value::Float(3.14), Value::str("usd")]))
        .arg(Value::dict([
            (Value::str("a"), Value::set([Value::str("x"), Value::str("y")])),
            (Value::None, Value::list([Value::Int(1), Value::Int(2), Value::Int(3)])),
        ]))
        .kwarg("window", 30i64)
        .kwarg("include_closed", false)
}

fn bench_encode(c: &mut Criterion) {
    let args = bench_args();
    let asof = NaiveDate::from_ymd_opt(2024, 4, 26)
        .and_then(|d| d.and_hms_micro_opt(12, 23, 45, 123))
        .expect("valid date");

    c.bench_function("codec/encode_call", |b| {
        b.iter(|| {
            let id = CallId::from_call(&FUNCTION, black_box(&args)).expect("encode");
            black_box(id);
        });
    });

    c.bench_function("codec/node_id_filename", |b| {
        let call_id = CallId::from_call(&FUNCTION, &args).expect("encode");
        b.iter(|| {
            let node_id = NodeId::new(black_box(&call_id), asof);
            black_box(node_id);
            black_box(call_id.to_filename());
        });
    });
}

fn bench_decode(c: &mut Criterion) {
    let call_id = CallId::from_call(&FUNCTION, &bench_args()).expect("encode");

    c.bench_function("codec/parse_call", |b| {
        b.iter(|| {
            let parsed = black_box(&call_id).parse().expect("decode");
            black_box(parsed);
        });
    });
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
