// limits_test.rs - Engine limits and cooperative cancellation.
//
// The limits are process-wide, so every test here holds LIMITS while it
// changes them.

use std::sync::Mutex;

use srevm::prelude::*;
use srevm::state::{match_stack_limit, set_match_stack_limit, set_time_limit, time_limit};

static LIMITS: Mutex<()> = Mutex::new(());

fn lock() -> std::sync::MutexGuard<'static, ()> {
    LIMITS.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// `(?:a)*b` through the general REPEAT path, one frame per iteration.
fn deep() -> Pattern {
    let code = ProgramBuilder::new()
        .repeat(0, MAXREPEAT, |b| {
            b.literal('a');
        })
        .literal('b')
        .build();
    Pattern::builder(code).build().unwrap()
}

/// `(?:a|a)*c`, exponential on a run of `a`.
fn exponential() -> Pattern {
    let code = ProgramBuilder::new()
        .repeat(0, MAXREPEAT, |b| {
            b.branch(|alts| {
                alts.alt(|b| {
                    b.literal('a');
                })
                .alt(|b| {
                    b.literal('a');
                });
            });
        })
        .literal('c')
        .build();
    Pattern::builder(code).build().unwrap()
}

#[test]
fn stack_limit_stops_deep_backtracking() {
    let _guard = lock();
    let text = SubjectBuf::from("a".repeat(10_000) + "b");
    let re = deep();

    assert_eq!(re.match_at(&text, ..).unwrap().unwrap().end(), 10_001);

    set_match_stack_limit(256);
    assert_eq!(match_stack_limit(), 256);
    let err = re.match_at(&text, ..).unwrap_err();
    set_match_stack_limit(0);

    assert_eq!(err, Error::Engine(EngineError::RecursionLimit));
    assert_eq!(err.code(), -3);
}

#[test]
fn triggered_interrupt_cancels_scanner() {
    let _guard = lock();
    let text = SubjectBuf::from("a".repeat(40));
    let re = exponential();
    let scanner = re.scanner(&text, ..).unwrap();

    let interrupt = Interrupt::new();
    interrupt.trigger();
    scanner.set_interrupt(Some(interrupt.clone())).unwrap();
    let err = scanner.search_next().unwrap_err();
    assert_eq!(err, Error::Engine(EngineError::Interrupted));

    interrupt.clear();
    scanner.set_interrupt(None).unwrap();
}

#[test]
fn interrupt_from_another_thread() {
    let _guard = lock();
    let text = SubjectBuf::from("a".repeat(40));
    let re = exponential();
    let scanner = re.scanner(&text, ..).unwrap();
    let interrupt = Interrupt::new();
    scanner.set_interrupt(Some(interrupt.clone())).unwrap();

    let remote = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(20));
        interrupt.trigger();
    });
    let err = scanner.search_next().unwrap_err();
    remote.join().unwrap();
    assert_eq!(err, Error::Engine(EngineError::Interrupted));
}

#[test]
fn time_limit_stops_runaway_search() {
    let _guard = lock();
    let text = SubjectBuf::from("a".repeat(40));
    let re = exponential();

    set_time_limit(20);
    assert_eq!(time_limit(), 20);
    let result = re.search(&text, ..).map(|m| m.is_some());
    set_time_limit(0);

    let err = result.unwrap_err();
    assert_eq!(err, Error::Engine(EngineError::TimeLimit));
    assert_eq!(err.to_string(), "time limit over");
}

#[test]
fn limits_do_not_affect_quick_matches() {
    let _guard = lock();
    set_match_stack_limit(64);
    set_time_limit(1_000);
    let text = SubjectBuf::from("aaab");
    let found = deep().search(&text, ..).map(|m| m.map(|m| m.range()));
    set_match_stack_limit(0);
    set_time_limit(0);
    assert_eq!(found.unwrap(), Some(0..4));
}
