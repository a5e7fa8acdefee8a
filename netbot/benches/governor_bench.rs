use criterion::{black_box, criterion_group, criterion_main, Criterion};
use netbot::governor::SamplingGovernor;
use netbot::prelude::*;
use std::path::PathBuf;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name)).unwrap()
}

fn bench_parse_netlist(c: &mut Criterion) {
    let text = fixture("rc_bode_two_outputs.net");

    c.bench_function("parse_netlist", |b| {
        b.iter(|| Netlist::parse(black_box(&text)));
    });
}

fn bench_govern_transient(c: &mut Criterion) {
    let netlist = Netlist::parse(&fixture("rc_long_tran.net")).unwrap();
    let governor = SamplingGovernor::default();

    c.bench_function("govern_transient", |b| {
        b.iter(|| governor.govern(black_box(&netlist)));
    });
}

criterion_group!(benches, bench_parse_netlist, bench_govern_transient);
criterion_main!(benches);
