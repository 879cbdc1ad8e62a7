use std::fs;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use tinyscript::backend::{self, Backend, CompiledUnit};
use tinyscript::bytecode;
use tinyscript::parser::Parser;
use tinyscript::scanner::Scanner;
use tinyscript::semantic;

const WORKLOADS: [(&str, &str); 2] = [
    ("mix", "tests/programs/long_mix/program.tis"),
    ("fib", "tests/programs/fib_recursion/program.tis"),
];

fn load_source(path: &str) -> String {
    fs::read_to_string(path).unwrap_or_else(|err| panic!("read {path}: {err}"))
}

fn compile(source: &str) -> CompiledUnit {
    backend::compile(source).expect("compile")
}

fn bench_frontend(c: &mut Criterion) {
    for (label, path) in WORKLOADS {
        let source = load_source(path);

        c.bench_function(&format!("scan_{label}"), |b| {
            b.iter(|| {
                let mut scanner = Scanner::new(black_box(&source));
                while !scanner.next().is_eof() {}
            })
        });

        c.bench_function(&format!("parse_{label}"), |b| {
            b.iter(|| {
                let out = Parser::new(black_box(&source)).parse();
                black_box(out);
            })
        });

        c.bench_function(&format!("analyze_{label}"), |b| {
            b.iter(|| {
                let (mut program, _) = Parser::new(black_box(&source)).parse();
                let analysis = semantic::analyze(&mut program, true);
                black_box(analysis);
            })
        });
    }
}

fn bench_backends(c: &mut Criterion) {
    for (label, path) in WORKLOADS {
        let source = load_source(path);
        let unit = compile(&source);

        c.bench_function(&format!("generate_{label}"), |b| {
            b.iter(|| {
                let module = bytecode::generate(black_box(&unit.program), &unit.analysis);
                black_box(module);
            })
        });

        for backend in backend::backends() {
            let prepared = backend.prepare(&unit).expect("prepare");
            c.bench_function(&format!("run_{}_{label}", backend.name()), |b| {
                b.iter(|| {
                    let out = prepared.run().expect("run");
                    black_box(out);
                })
            });
        }
    }
}

criterion_group!(benches, bench_frontend, bench_backends);
criterion_main!(benches);
