// search.rs - Search driver.
// Finds the leftmost match at or after state.start, using the INFO block's
// literal prefix (memchr + KMP overlap table) or first-character set to
// skip hopeless positions before handing off to the matcher.

use crate::api::Pattern;
use crate::constants::{AtCode, InfoFlags, Opcode};
use crate::error::EngineError;
use crate::exec::{charset, sre_match};
use crate::state::State;
use crate::subject::{with_units, CodeUnit};

/// Search `pattern` from `state.start`. On success `state.start..state.ptr`
/// is the match.
pub fn run_search(state: &mut State<'_>, pattern: &Pattern) -> Result<bool, EngineError> {
    let subject = state.subject;
    with_units!(subject, text => sre_search(state, text, pattern.code()))
}

/// Literal prefix recorded in an INFO block.
#[derive(Debug, Clone, Copy)]
struct Prefix {
    len: usize,
    /// Words of the program the prefix already covers.
    skip: usize,
    /// Index of the first prefix word; the overlap table follows it.
    at: usize,
}

impl Prefix {
    #[inline]
    fn char(&self, code: &[u32], i: usize) -> u32 {
        code[self.at + i]
    }

    /// KMP fallback after `i` matched characters (1 <= i <= len).
    #[inline]
    fn overlap(&self, code: &[u32], i: usize) -> usize {
        code[self.at + self.len + i - 1] as usize
    }
}

pub(crate) fn sre_search<C: CodeUnit>(
    state: &mut State<'_>,
    text: &[C],
    code: &[u32],
) -> Result<bool, EngineError> {
    let ptr = state.start;
    let mut end = state.end;
    if ptr > end {
        return Ok(false);
    }

    let mut pc = 0;
    let mut flags = InfoFlags::empty();
    let mut prefix = None;
    let mut set = None;

    if code[0] == Opcode::Info as u32 {
        // <INFO> <1=skip> <2=flags> <3=min> <4=max> <5=prefix info>
        flags = InfoFlags::from_bits_truncate(code[2]);
        let min = code[3] as usize;
        if min != 0 && end - ptr < min {
            return Ok(false);
        }
        if min > 1 {
            // Leave at least one character so the literal scan still works.
            end = (end - (min - 1)).max(ptr);
        }
        if flags.contains(InfoFlags::PREFIX) {
            // <length> <skip> <prefix data> <overlap data>
            prefix = Some(Prefix {
                len: code[5] as usize,
                skip: code[6] as usize,
                at: 7,
            });
        } else if flags.contains(InfoFlags::CHARSET) {
            set = Some(5);
        }
        pc = 1 + code[1] as usize;
    }

    let literal = flags.contains(InfoFlags::LITERAL);
    match prefix {
        Some(prefix) if prefix.len == 1 => {
            search_char(state, text, code, pc, prefix, literal)
        }
        Some(prefix) if prefix.len > 1 => {
            search_prefix(state, text, code, pc, prefix, literal)
        }
        _ => match set {
            Some(set) => search_set(state, text, code, pc, set),
            None => search_general(state, text, code, pc, end),
        },
    }
}

/// Pattern starts with one known character.
fn search_char<C: CodeUnit>(
    state: &mut State<'_>,
    text: &[C],
    code: &[u32],
    pc: usize,
    prefix: Prefix,
    literal: bool,
) -> Result<bool, EngineError> {
    let Some(c) = C::from_code(prefix.char(code, 0)) else {
        // does not fit the code-unit width
        return Ok(false);
    };
    let mut ptr = state.start;
    let end = state.end;
    state.must_advance = false;
    while ptr < end {
        match C::find(&text[ptr..end], c) {
            Some(offset) => ptr += offset,
            None => return Ok(false),
        }
        state.start = ptr;
        state.ptr = ptr + prefix.skip;
        if literal {
            return Ok(true);
        }
        if sre_match(state, text, code, pc + 2 * prefix.skip, false)? {
            return Ok(true);
        }
        ptr += 1;
        state.reset_marks();
    }
    Ok(false)
}

/// Pattern starts with a known multi-character prefix; skip forward with
/// the overlap table.
fn search_prefix<C: CodeUnit>(
    state: &mut State<'_>,
    text: &[C],
    code: &[u32],
    pc: usize,
    prefix: Prefix,
    literal: bool,
) -> Result<bool, EngineError> {
    let mut ptr = state.start;
    let end = state.end;
    let len = prefix.len;
    if len > end - ptr {
        return Ok(false);
    }
    if (0..len).any(|i| C::from_code(prefix.char(code, i)).is_none()) {
        return Ok(false);
    }
    let first = prefix.char(code, 0);
    let at = |ptr: usize| -> u32 { text[ptr].into() };

    while ptr < end {
        loop {
            let c = at(ptr);
            ptr += 1;
            if c == first {
                break;
            }
            if ptr >= end {
                return Ok(false);
            }
        }
        if ptr >= end {
            return Ok(false);
        }

        let mut i = 1;
        state.must_advance = false;
        loop {
            if at(ptr) == prefix.char(code, i) {
                i += 1;
                if i != len {
                    ptr += 1;
                    if ptr >= end {
                        return Ok(false);
                    }
                    continue;
                }
                // found a potential match
                state.start = ptr + 1 - len;
                state.ptr = ptr + 1 + prefix.skip - len;
                if literal {
                    return Ok(true);
                }
                if sre_match(state, text, code, pc + 2 * prefix.skip, false)? {
                    return Ok(true);
                }
                ptr += 1;
                if ptr >= end {
                    return Ok(false);
                }
                state.reset_marks();
            }
            i = prefix.overlap(code, i);
            if i == 0 {
                break;
            }
        }
    }
    Ok(false)
}

/// Pattern starts with a character from a known set.
fn search_set<C: CodeUnit>(
    state: &mut State<'_>,
    text: &[C],
    code: &[u32],
    pc: usize,
    set: usize,
) -> Result<bool, EngineError> {
    let mut ptr = state.start;
    let end = state.end;
    state.must_advance = false;
    loop {
        while ptr < end && !charset(code, set, text[ptr].into()) {
            ptr += 1;
        }
        if ptr >= end {
            return Ok(false);
        }
        state.start = ptr;
        state.ptr = ptr;
        if sre_match(state, text, code, pc, false)? {
            return Ok(true);
        }
        ptr += 1;
        state.reset_marks();
    }
}

/// Try every position in turn. Only the first attempt is top-level, so
/// `must_advance` applies to it alone.
fn search_general<C: CodeUnit>(
    state: &mut State<'_>,
    text: &[C],
    code: &[u32],
    pc: usize,
    end: usize,
) -> Result<bool, EngineError> {
    let mut ptr = state.start;
    state.ptr = ptr;
    let mut found = sre_match(state, text, code, pc, true)?;
    state.must_advance = false;

    let anchored = code[pc] == Opcode::At as u32
        && matches!(
            code.get(pc + 1).copied().and_then(AtCode::from_code),
            Some(AtCode::Beginning | AtCode::BeginningString)
        );
    if !found && anchored {
        state.start = end;
        state.ptr = end;
        return Ok(false);
    }

    while !found && ptr < end {
        ptr += 1;
        state.reset_marks();
        state.start = ptr;
        state.ptr = ptr;
        found = sre_match(state, text, code, pc, false)?;
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProgramBuilder;
    use crate::constants::MAXREPEAT;
    use crate::subject::SubjectBuf;

    fn search(p: &Pattern, text: &str) -> Option<(usize, usize)> {
        let buf = SubjectBuf::from(text);
        let mut state = State::new(p, buf.as_subject(), 0, usize::MAX).unwrap();
        run_search(&mut state, p)
            .unwrap()
            .then(|| (state.start(), state.ptr()))
    }

    fn pattern(code: Vec<u32>) -> Pattern {
        Pattern::builder(code).build().unwrap()
    }

    #[test]
    fn single_literal_prefix() {
        // x\d
        let p = pattern(
            ProgramBuilder::new()
                .info_prefix(&['x' as u32], 1, false, 2, 2)
                .literal('x')
                .in_set(|s| {
                    s.range('0', '9');
                })
                .build(),
        );
        assert_eq!(search(&p, "axbx5"), Some((3, 5)));
        assert_eq!(search(&p, "axbx"), None);
    }

    #[test]
    fn literal_flag_skips_the_matcher() {
        let p = pattern(
            ProgramBuilder::new()
                .info_prefix(&['a' as u32, 'b' as u32], 2, true, 2, 2)
                .literal('a')
                .literal('b')
                .build(),
        );
        assert_eq!(search(&p, "xxaab"), Some((3, 5)));
    }

    #[test]
    fn overlapping_prefix_restarts_correctly() {
        let prefix: Vec<u32> = "abab".chars().map(u32::from).collect();
        let p = pattern(
            ProgramBuilder::new()
                .info_prefix(&prefix, 4, false, 5, 5)
                .literal('a')
                .literal('b')
                .literal('a')
                .literal('b')
                .literal('c')
                .build(),
        );
        assert_eq!(search(&p, "abababc"), Some((2, 7)));
        assert_eq!(search(&p, "abababa"), None);
    }

    #[test]
    fn prefix_wider_than_subject_units() {
        let p = pattern(
            ProgramBuilder::new()
                .info_prefix(&[0x3a3], 1, true, 1, 1)
                .literal('\u{3a3}')
                .build(),
        );
        assert_eq!(search(&p, "abc"), None);
        assert_eq!(search(&p, "ab\u{3a3}"), Some((2, 3)));
    }

    #[test]
    fn charset_filter() {
        // [ab]c
        let p = pattern(
            ProgramBuilder::new()
                .info_charset(2, 2, |s| {
                    s.literal('a').literal('b');
                })
                .in_set(|s| {
                    s.literal('a').literal('b');
                })
                .literal('c')
                .build(),
        );
        assert_eq!(search(&p, "xxabc"), Some((3, 5)));
        assert_eq!(search(&p, "ab"), None);
    }

    #[test]
    fn anchored_pattern_tries_once() {
        let p = pattern(ProgramBuilder::new().at(AtCode::Beginning).literal('b').build());
        assert_eq!(search(&p, "ab"), None);
        assert_eq!(search(&p, "ba"), Some((0, 1)));
    }

    #[test]
    fn must_advance_rejects_empty_match_at_start() {
        // a*
        let p = pattern(
            ProgramBuilder::new()
                .repeat_one(0, MAXREPEAT, |b| {
                    b.literal('a');
                })
                .build(),
        );
        let buf = SubjectBuf::from("ba");
        let mut state = State::new(&p, buf.as_subject(), 0, 2).unwrap();
        state.set_must_advance(true);
        assert!(run_search(&mut state, &p).unwrap());
        assert_eq!((state.start(), state.ptr()), (1, 2));
    }

    #[test]
    fn info_minimum_bounds_the_search() {
        // .{3} with min 3 on a two-character subject
        let p = pattern(
            ProgramBuilder::new()
                .info(3, 3)
                .any()
                .any()
                .any()
                .build(),
        );
        assert_eq!(search(&p, "ab"), None);
        assert_eq!(search(&p, "abcd"), Some((0, 3)));
    }

    #[test]
    fn start_past_end_finds_nothing() {
        let p = pattern(ProgramBuilder::new().build());
        let buf = SubjectBuf::from("abc");
        let mut state = State::new(&p, buf.as_subject(), 3, 1).unwrap();
        assert!(!run_search(&mut state, &p).unwrap());
    }
}
