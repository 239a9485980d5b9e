// Criterion benchmark suite for the srevm interpreter.
//
// Run: cargo bench
// Specific group: cargo bench -- search
// HTML report: target/criterion/report/index.html

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use srevm::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn compile(code: Vec<u32>, groups: usize) -> Pattern {
    Pattern::builder(code)
        .groups(groups)
        .build()
        .expect("benchmark program failed validation")
}

fn haystack() -> SubjectBuf {
    let line = "The quick brown fox jumps over the lazy dog near the riverbank 2024-06-01\n";
    SubjectBuf::from(line.repeat(200) + "needle in a haystack")
}

fn literal_program(text: &str, with_info: bool) -> Vec<u32> {
    let chars: Vec<u32> = text.chars().map(u32::from).collect();
    let mut b = ProgramBuilder::new();
    if with_info {
        let n = chars.len() as u32;
        b.info_prefix(&chars, n, true, n, n);
    }
    for &c in &chars {
        b.literal(c);
    }
    b.build()
}

/// `\d{4}-\d{2}-\d{2}`
fn date_program(with_info: bool) -> Vec<u32> {
    let digit = |b: &mut ProgramBuilder| {
        b.in_set(|s| {
            s.category(CategoryCode::Digit);
        });
    };
    let mut b = ProgramBuilder::new();
    if with_info {
        b.info_charset(10, 10, |s| {
            s.range('0', '9');
        });
    }
    b.repeat_one(4, 4, digit)
        .literal('-')
        .repeat_one(2, 2, digit)
        .literal('-')
        .repeat_one(2, 2, digit)
        .build()
}

// ---------------------------------------------------------------------------
// 1. search -- prefix and charset scans against the general driver
// ---------------------------------------------------------------------------

fn bench_search(c: &mut Criterion) {
    let text = haystack();
    let cases = [
        ("literal_plain", compile(literal_program("needle", false), 0)),
        ("literal_prefix", compile(literal_program("needle", true), 0)),
        ("single_char_prefix", compile(literal_program("!", true), 0)),
        ("date_plain", compile(date_program(false), 0)),
        ("date_charset", compile(date_program(true), 0)),
    ];

    let mut group = c.benchmark_group("search");
    for (name, re) in &cases {
        group.bench_with_input(BenchmarkId::from_parameter(name), re, |b, re| {
            b.iter(|| black_box(re.search(black_box(&text), ..).unwrap().map(|m| m.end())));
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// 2. quantifiers -- single-item loops vs the general REPEAT path
// ---------------------------------------------------------------------------

fn bench_quantifiers(c: &mut Criterion) {
    let text = SubjectBuf::from("a".repeat(5_000) + "b");
    let greedy = compile(
        ProgramBuilder::new()
            .repeat_one(0, MAXREPEAT, |b| {
                b.literal('a');
            })
            .literal('b')
            .build(),
        0,
    );
    let lazy = compile(
        ProgramBuilder::new()
            .min_repeat_one(0, MAXREPEAT, |b| {
                b.literal('a');
            })
            .literal('b')
            .build(),
        0,
    );
    let general = compile(
        ProgramBuilder::new()
            .repeat(0, MAXREPEAT, |b| {
                b.group(1, |b| {
                    b.literal('a');
                });
            })
            .literal('b')
            .build(),
        1,
    );

    let mut group = c.benchmark_group("quantifiers");
    for (name, re) in [("greedy", &greedy), ("lazy", &lazy), ("general", &general)] {
        group.bench_with_input(BenchmarkId::from_parameter(name), re, |b, re| {
            b.iter(|| black_box(re.match_at(black_box(&text), ..).unwrap().is_some()));
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// 3. global -- findall, split and sub over many matches
// ---------------------------------------------------------------------------

fn bench_global(c: &mut Criterion) {
    let text = haystack();
    // \w+
    let words = compile(
        ProgramBuilder::new()
            .repeat_one(1, MAXREPEAT, |b| {
                b.in_set(|s| {
                    s.category(CategoryCode::UniWord);
                });
            })
            .build(),
        0,
    );
    let space = compile(ProgramBuilder::new().literal(' ').build(), 0);
    let repl = SubjectBuf::from(r"<\g<0>>");

    let mut group = c.benchmark_group("global");
    group.bench_function("findall_words", |b| {
        b.iter(|| black_box(words.findall(black_box(&text), ..).unwrap().len()));
    });
    group.bench_function("split_space", |b| {
        b.iter(|| black_box(space.split(black_box(&text), 0).unwrap().len()));
    });
    group.bench_function("sub_template", |b| {
        b.iter(|| {
            let out = words
                .sub(Replacement::Text(repl.as_subject()), black_box(&text), 0)
                .unwrap();
            black_box(out.len())
        });
    });
    group.finish();
}

// ---------------------------------------------------------------------------
// 4. backtracking -- alternation under a loop
// ---------------------------------------------------------------------------

fn bench_backtracking(c: &mut Criterion) {
    // (?:ab|a)*c against runs of "ab" with no final c
    let re = compile(
        ProgramBuilder::new()
            .repeat(0, MAXREPEAT, |b| {
                b.branch(|alts| {
                    alts.alt(|b| {
                        b.literal('a').literal('b');
                    })
                    .alt(|b| {
                        b.literal('a');
                    });
                });
            })
            .literal('c')
            .build(),
        0,
    );

    let mut group = c.benchmark_group("backtracking");
    for n in [10usize, 100, 1_000] {
        let text = SubjectBuf::from("ab".repeat(n));
        group.bench_with_input(BenchmarkId::from_parameter(n), &text, |b, text| {
            b.iter(|| black_box(re.match_at(black_box(text), ..).unwrap().is_some()));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_search,
    bench_quantifiers,
    bench_global,
    bench_backtracking
);
criterion_main!(benches);
