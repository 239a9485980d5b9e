// validate_test.rs - Program validation against corrupted programs.

use srevm::constants::{InfoFlags, MAXGROUPS};
use srevm::prelude::*;
use srevm::validate::{validate, validate_program};

/// One of nearly every construct, two groups.
fn kitchen_sink() -> Vec<u32> {
    ProgramBuilder::new()
        .info(2, MAXREPEAT)
        .group(1, |b| {
            b.branch(|alts| {
                alts.alt(|b| {
                    b.literal('a');
                })
                .alt(|b| {
                    b.in_set(|s| {
                        s.range('0', '9').category(CategoryCode::Space);
                    });
                });
            });
        })
        .repeat_one(0, 3, |b| {
            b.not_literal('x');
        })
        .repeat(1, MAXREPEAT, |b| {
            b.group(2, |b| {
                b.any();
            });
        })
        .groupref_exists_else(
            2,
            |b| {
                b.groupref(1);
            },
            |b| {
                b.at(AtCode::End);
            },
        )
        .atomic(|b| {
            b.min_repeat_one(1, 2, |b| {
                b.literal('b');
            });
        })
        .assert_not(1, |b| {
            b.literal('c');
        })
        .possessive_repeat(0, 1, |b| {
            b.in_set(|s| {
                s.negate().bigcharset([0x100, 0x2000]);
            });
        })
        .build()
}

#[test]
fn builder_output_validates() {
    let code = kitchen_sink();
    assert!(validate(&code, 2));
    assert!(Pattern::builder(code).groups(2).build().is_ok());
}

#[test]
fn mark_beyond_group_count_is_rejected() {
    let code = ProgramBuilder::new()
        .group(1, |b| {
            b.literal('a');
        })
        .build();
    assert!(validate(&code, 1));
    // the closing MARK of group 1 is slot 1; two groups would be slots 0..4
    let mut corrupt = code.clone();
    corrupt[5] = 2;
    assert_eq!(
        validate_program(&corrupt, 1),
        Err(Error::InvalidCode { offset: 5 })
    );
    assert!(validate(&corrupt, 2));
}

#[test]
fn groupref_to_missing_group() {
    let code = ProgramBuilder::new()
        .group(1, |b| {
            b.literal('a');
        })
        .groupref(2)
        .build();
    assert!(!validate(&code, 1));
    assert!(validate(&code, 2));
}

#[test]
fn unknown_opcode_and_bad_operands() {
    assert!(!validate(&[200, Opcode::Success.code()], 0));
    // AT code out of range
    assert!(!validate(&[Opcode::At.code(), 99, Opcode::Success.code()], 0));
    // MIN_UNTIL with no REPEAT
    assert!(!validate(&[Opcode::MinUntil.code(), Opcode::Success.code()], 0));
    // set member outside a set
    assert!(!validate(&[Opcode::Range.code(), 1, 2, Opcode::Success.code()], 0));
}

#[test]
fn skips_must_stay_inside_the_program() {
    let mut code = ProgramBuilder::new()
        .repeat_one(0, MAXREPEAT, |b| {
            b.literal('a');
        })
        .build();
    assert!(validate(&code, 0));
    code[1] += 10;
    assert!(!validate(&code, 0));
    code[1] = 0;
    assert!(!validate(&code, 0));
}

#[test]
fn malformed_info_blocks() {
    let prefix = ['a' as u32, 'b' as u32];
    let mut code = ProgramBuilder::new()
        .info_prefix(&prefix, 2, true, 2, 2)
        .literal('a')
        .literal('b')
        .build();
    assert!(validate(&code, 0));

    let flags = code[2];
    code[2] = (InfoFlags::PREFIX | InfoFlags::CHARSET).bits();
    assert!(!validate(&code, 0));
    code[2] = InfoFlags::LITERAL.bits();
    assert!(!validate(&code, 0));
    code[2] = flags;

    // the search may only skip as many characters as the prefix holds
    code[6] = 3;
    assert_eq!(
        validate_program(&code, 0),
        Err(Error::InvalidCode { offset: 6 })
    );
    code[6] = 2;

    // the skipped words must spell the prefix with LITERAL
    code[14] = 'x' as u32;
    assert!(!validate(&code, 0));
    code[14] = 'b' as u32;
    assert!(validate(&code, 0));

    // overlap entry pointing past the prefix
    let overlap = 7 + prefix.len();
    code[overlap] = 5;
    assert!(!validate(&code, 0));
}

#[test]
fn truncated_charset() {
    let code = ProgramBuilder::new()
        .in_set(|s| {
            s.charset_from([0x61, 0x62]);
        })
        .build();
    assert!(validate(&code, 0));
    // drop one bitmap word and shorten the skip to match
    let mut short = code.clone();
    short.remove(5);
    short[1] -= 1;
    assert!(!validate(&short, 0));
}

#[test]
fn validation_is_repeatable() {
    let code = kitchen_sink();
    let copy = code.clone();
    let first = validate_program(&code, 2);
    let second = validate_program(&code, 2);
    assert_eq!(first, second);
    assert_eq!(code, copy);
}

#[test]
fn single_word_corruption_never_panics() {
    let code = kitchen_sink();
    let mut rejected = 0;
    for i in 0..code.len() {
        for value in [0, 1, 2, 15, 0xff, 0xffff, u32::MAX] {
            let mut corrupt = code.clone();
            corrupt[i] = value;
            if !validate(&corrupt, 2) {
                rejected += 1;
            }
        }
    }
    assert!(rejected > 0);
    for len in 0..code.len() {
        let _ = validate(&code[..len], 2);
    }
}

#[test]
fn prefix_skip_past_the_program_is_rejected() {
    let a = 'a' as u32;
    let info = Opcode::Info.code();
    let literal = Opcode::Literal.code();
    let success = Opcode::Success.code();
    for flags in [InfoFlags::PREFIX | InfoFlags::LITERAL, InfoFlags::PREFIX] {
        // INFO claims five skippable characters for a one-character prefix.
        let code = vec![info, 8, flags.bits(), 1, 1, 1, 5, a, 0, literal, a, success];
        assert!(!validate(&code, 0));
        assert!(Pattern::builder(code.clone()).build().is_err());

        let mut fixed = code;
        fixed[6] = 1;
        let re = Pattern::builder(fixed).build().unwrap();
        let text = SubjectBuf::from("a");
        assert_eq!(re.search(&text, ..).unwrap().unwrap().range(), 0..1);
    }
}

#[test]
fn group_count_limit_is_inclusive() {
    let code = ProgramBuilder::new().literal('a').build();
    assert!(validate(&code, MAXGROUPS));
    assert!(!validate(&code, MAXGROUPS + 1));
    assert_eq!(
        Pattern::builder(code).groups(MAXGROUPS + 1).build().unwrap_err(),
        Error::InvalidCode { offset: 0 }
    );
}
