// exec.rs - Core matcher.
//
// Backtracking opcode interpreter. Every point where the matcher would
// recurse ("try this sub-pattern, then come back here") pushes the current
// Frame onto the state's frame stack with a resume label and starts a
// fresh frame at the target. When a frame finishes, its parent is popped
// and continued at its label. Native stack depth stays constant no matter
// how deep the backtracking goes.
//
// The interpreter is generic over the code unit, so it is instantiated
// once per input width.

use crate::api::Pattern;
use crate::chars::{
    category, char_loc_ignore, is_linebreak, is_loc_word, is_uni_word, is_word, lower_ascii,
    lower_locale, lower_unicode, upper_locale, upper_unicode,
};
use crate::constants::{AtCode, Opcode, MAXREPEAT};
use crate::error::EngineError;
use crate::stack::{RepeatId, RepeatRecord};
use crate::state::State;
use crate::subject::{with_units, CodeUnit};
use crate::validate::block_byte;

const SUCCESS: u32 = Opcode::Success as u32;
const LITERAL: u32 = Opcode::Literal as u32;
const INFO: u32 = Opcode::Info as u32;

/// Try `pattern` at `state.ptr`, without moving forward on failure.
///
/// On success `state.ptr` is the end of the match. `toplevel` enables the
/// `match_all` / `must_advance` checks at the final SUCCESS.
pub fn run_match(
    state: &mut State<'_>,
    pattern: &Pattern,
    toplevel: bool,
) -> Result<bool, EngineError> {
    let subject = state.subject;
    with_units!(subject, text => sre_match(state, text, pattern.code(), 0, toplevel))
}

// ============================================================================
// Frames
// ============================================================================

/// Where a suspended frame continues once its callee returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resume {
    Start,
    Branch,
    RepeatOne,
    MinRepeatOne,
    Repeat,
    MaxUntilMin,
    MaxUntilMore,
    MaxUntilTail,
    MinUntilMin,
    MinUntilTail,
    MinUntilMore,
    PossessiveMin,
    PossessiveMore,
    Atomic,
    Assert,
    AssertNot,
}

/// One suspended sub-match.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Frame {
    resume: Resume,
    /// Program position; for suspended frames, the opcode's first operand.
    pc: usize,
    ptr: usize,
    toplevel: bool,
    lastmark: isize,
    lastindex: isize,
    count: isize,
    rep: Option<RepeatId>,
    /// Literal that must follow a REPEAT_ONE.
    chr: Option<u32>,
    /// Previous `last_ptr`, or the position of the last possessive iteration.
    saved: Option<usize>,
}

impl Frame {
    fn new(pc: usize, ptr: usize, toplevel: bool) -> Self {
        Frame {
            resume: Resume::Start,
            pc,
            ptr,
            toplevel,
            lastmark: -1,
            lastindex: -1,
            count: 0,
            rep: None,
            chr: None,
            saved: None,
        }
    }

    #[inline]
    fn save_lastmark(&mut self, state: &State<'_>) {
        self.lastmark = state.lastmark;
        self.lastindex = state.lastindex;
    }

    #[inline]
    fn restore_lastmark(&self, state: &mut State<'_>) {
        state.lastmark = self.lastmark;
        state.lastindex = self.lastindex;
    }

    /// Give back one repetition of a single-width item.
    #[inline]
    fn step_back(&mut self) {
        if self.count == 0 {
            self.count = -1;
        } else {
            self.ptr -= 1;
            self.count -= 1;
        }
    }

    #[inline]
    fn rep(&self) -> Result<RepeatId, EngineError> {
        self.rep.ok_or(EngineError::State)
    }
}

/// What the driver does next with the current frame.
enum Step {
    /// Keep dispatching the current frame.
    Continue,
    /// Suspend the current frame and start one at `target`.
    Call { target: usize, toplevel: bool },
    /// The current frame is done.
    Return(bool),
}

macro_rules! fail {
    () => {
        return Ok(Step::Return(false))
    };
}

// ============================================================================
// Driver
// ============================================================================

/// Match `code[pc..]` at `state.ptr`. Re-entrant: nested calls (from
/// `count`) stack their frames above the caller's.
pub(crate) fn sre_match<C: CodeUnit>(
    state: &mut State<'_>,
    text: &[C],
    code: &[u32],
    pc: usize,
    toplevel: bool,
) -> Result<bool, EngineError> {
    let base = state.frames.len();
    let result = drive(state, text, code, pc, toplevel, base);
    state.frames.truncate(base);
    result
}

fn drive<C: CodeUnit>(
    state: &mut State<'_>,
    text: &[C],
    code: &[u32],
    pc: usize,
    toplevel: bool,
    base: usize,
) -> Result<bool, EngineError> {
    let mut ctx = Frame::new(pc, state.ptr, toplevel);
    let mut step = enter(state, code, &mut ctx);
    loop {
        step = match step {
            Step::Continue => dispatch(state, text, code, &mut ctx)?,
            Step::Call { target, toplevel } => {
                state.frames.push(ctx)?;
                ctx = Frame::new(target, state.ptr, toplevel);
                enter(state, code, &mut ctx)
            }
            Step::Return(matched) => {
                if state.frames.len() <= base {
                    return Ok(matched);
                }
                let Some(parent) = state.frames.pop() else {
                    return Ok(matched);
                };
                ctx = parent;
                resume(state, text, code, &mut ctx, matched)?
            }
        };
    }
}

/// Frame entry: honour a leading INFO block's minimum length.
fn enter(state: &State<'_>, code: &[u32], ctx: &mut Frame) -> Step {
    if code[ctx.pc] == INFO {
        // <INFO> <1=skip> <2=flags> <3=min> ...
        let min = code[ctx.pc + 3] as usize;
        if min != 0 && state.end.saturating_sub(ctx.ptr) < min {
            return Step::Return(false);
        }
        ctx.pc += code[ctx.pc + 1] as usize + 1;
    }
    Step::Continue
}

#[inline]
fn unit<C: CodeUnit>(text: &[C], i: usize) -> u32 {
    text[i].into()
}

/// Test the character at `ctx.ptr` and step over it on success.
#[inline]
fn single<C: CodeUnit>(
    text: &[C],
    ctx: &mut Frame,
    end: usize,
    next_pc: usize,
    test: impl FnOnce(u32) -> bool,
) -> bool {
    if ctx.ptr >= end || !test(unit(text, ctx.ptr)) {
        return false;
    }
    ctx.ptr += 1;
    ctx.pc = next_pc;
    true
}

#[inline]
fn too_short(min: u32, ptr: usize, end: usize) -> bool {
    ptr > end || min as usize > end - ptr
}

// ============================================================================
// Dispatch
// ============================================================================

fn dispatch<C: CodeUnit>(
    state: &mut State<'_>,
    text: &[C],
    code: &[u32],
    ctx: &mut Frame,
) -> Result<Step, EngineError> {
    macro_rules! hand_off {
        ($e:expr) => {
            match $e? {
                Step::Continue => continue,
                other => return Ok(other),
            }
        };
    }

    loop {
        state.check_signals()?;
        let Some(op) = Opcode::from_code(code[ctx.pc]) else {
            return Err(EngineError::Illegal);
        };
        let pc = ctx.pc + 1;
        let ptr = ctx.ptr;
        let end = state.end;

        match op {
            Opcode::Mark => {
                // <MARK> <gid>
                state.set_mark(code[pc] as usize, ptr);
                ctx.pc = pc + 1;
            }

            Opcode::Literal => {
                let arg = code[pc];
                if !single(text, ctx, end, pc + 1, |c| c == arg) {
                    fail!();
                }
            }
            Opcode::NotLiteral => {
                let arg = code[pc];
                if !single(text, ctx, end, pc + 1, |c| c != arg) {
                    fail!();
                }
            }
            Opcode::LiteralIgnore => {
                let arg = code[pc];
                if !single(text, ctx, end, pc + 1, |c| lower_ascii(c) == arg) {
                    fail!();
                }
            }
            Opcode::NotLiteralIgnore => {
                let arg = code[pc];
                if !single(text, ctx, end, pc + 1, |c| lower_ascii(c) != arg) {
                    fail!();
                }
            }
            Opcode::LiteralUniIgnore => {
                let arg = code[pc];
                if !single(text, ctx, end, pc + 1, |c| lower_unicode(c) == arg) {
                    fail!();
                }
            }
            Opcode::NotLiteralUniIgnore => {
                let arg = code[pc];
                if !single(text, ctx, end, pc + 1, |c| lower_unicode(c) != arg) {
                    fail!();
                }
            }
            Opcode::LiteralLocIgnore => {
                let arg = code[pc];
                if !single(text, ctx, end, pc + 1, |c| char_loc_ignore(arg, c)) {
                    fail!();
                }
            }
            Opcode::NotLiteralLocIgnore => {
                let arg = code[pc];
                if !single(text, ctx, end, pc + 1, |c| !char_loc_ignore(arg, c)) {
                    fail!();
                }
            }

            Opcode::Success => {
                if ctx.toplevel
                    && ((state.match_all && ptr != state.end)
                        || (state.must_advance && ptr == state.start))
                {
                    fail!();
                }
                state.ptr = ptr;
                return Ok(Step::Return(true));
            }

            Opcode::Failure => fail!(),

            Opcode::At => {
                // <AT> <code>
                if !at(state, text, ptr, code[pc]) {
                    fail!();
                }
                ctx.pc = pc + 1;
            }

            Opcode::Any => {
                if !single(text, ctx, end, pc, |c| !is_linebreak(c)) {
                    fail!();
                }
            }
            Opcode::AnyAll => {
                if !single(text, ctx, end, pc, |_| true) {
                    fail!();
                }
            }

            Opcode::In => {
                // <IN> <skip> <set>
                let next = pc + code[pc] as usize;
                if !single(text, ctx, end, next, |c| charset(code, pc + 1, c)) {
                    fail!();
                }
            }
            Opcode::InIgnore => {
                let next = pc + code[pc] as usize;
                if !single(text, ctx, end, next, |c| charset(code, pc + 1, lower_ascii(c))) {
                    fail!();
                }
            }
            Opcode::InUniIgnore => {
                let next = pc + code[pc] as usize;
                if !single(text, ctx, end, next, |c| charset(code, pc + 1, lower_unicode(c))) {
                    fail!();
                }
            }
            Opcode::InLocIgnore => {
                let next = pc + code[pc] as usize;
                if !single(text, ctx, end, next, |c| charset_loc_ignore(code, pc + 1, c)) {
                    fail!();
                }
            }

            Opcode::Jump | Opcode::Info => {
                // <JUMP> <offset>
                ctx.pc = pc + code[pc] as usize;
            }

            Opcode::Branch => {
                // <BRANCH> <0=skip> code <JUMP> ... <NULL>
                ctx.pc = pc;
                ctx.save_lastmark(state);
                if state.repeat.is_some() {
                    state.mark_push(ctx.lastmark)?;
                }
                hand_off!(branch_next(state, text, code, ctx));
            }

            Opcode::RepeatOne => {
                // <REPEAT_ONE> <skip> <1=min> <2=max> item <SUCCESS> tail
                let min = code[pc + 1];
                if too_short(min, ptr, end) {
                    fail!();
                }
                state.ptr = ptr;
                let n = count(state, text, code, pc + 3, code[pc + 2])?;
                if n < min as usize {
                    fail!();
                }
                ctx.pc = pc;
                ctx.count = n as isize;
                ctx.ptr = ptr + n;

                let tail = pc + code[pc] as usize;
                if code[tail] == SUCCESS
                    && ctx.ptr == state.end
                    && !(ctx.toplevel && state.must_advance && ctx.ptr == state.start)
                {
                    // tail is empty; we're finished
                    state.ptr = ctx.ptr;
                    return Ok(Step::Return(true));
                }

                ctx.save_lastmark(state);
                if state.repeat.is_some() {
                    state.mark_push(ctx.lastmark)?;
                }
                ctx.chr = (code[tail] == LITERAL).then(|| code[tail + 1]);
                hand_off!(repeat_one_next(state, text, code, ctx));
            }

            Opcode::MinRepeatOne => {
                // <MIN_REPEAT_ONE> <skip> <1=min> <2=max> item <SUCCESS> tail
                let min = code[pc + 1];
                if too_short(min, ptr, end) {
                    fail!();
                }
                state.ptr = ptr;
                ctx.pc = pc;
                if min == 0 {
                    ctx.count = 0;
                } else {
                    let n = count(state, text, code, pc + 3, min)?;
                    if n < min as usize {
                        fail!();
                    }
                    ctx.count = n as isize;
                    ctx.ptr = ptr + n;
                }

                let tail = pc + code[pc] as usize;
                if code[tail] == SUCCESS
                    && !(ctx.toplevel
                        && ((state.match_all && ctx.ptr != state.end)
                            || (state.must_advance && ctx.ptr == state.start)))
                {
                    state.ptr = ctx.ptr;
                    return Ok(Step::Return(true));
                }

                ctx.save_lastmark(state);
                if state.repeat.is_some() {
                    state.mark_push(ctx.lastmark)?;
                }
                hand_off!(min_repeat_one_next(state, code, ctx));
            }

            Opcode::PossessiveRepeatOne => {
                // <POSSESSIVE_REPEAT_ONE> <skip> <1=min> <2=max> item <SUCCESS> tail
                let min = code[pc + 1];
                if too_short(min, ptr, end) {
                    fail!();
                }
                state.ptr = ptr;
                let n = count(state, text, code, pc + 3, code[pc + 2])?;
                if n < min as usize {
                    fail!();
                }
                ctx.ptr = ptr + n;
                let tail = pc + code[pc] as usize;
                if code[tail] == SUCCESS
                    && ctx.ptr == state.end
                    && !(ctx.toplevel && state.must_advance && ctx.ptr == state.start)
                {
                    state.ptr = ctx.ptr;
                    return Ok(Step::Return(true));
                }
                ctx.pc = tail;
            }

            Opcode::Repeat => {
                // <REPEAT> <skip> <1=min> <2=max> item <UNTIL> tail
                let id = state.repeats.acquire(RepeatRecord {
                    count: -1,
                    pattern: Some(pc),
                    prev: state.repeat,
                    last_ptr: None,
                })?;
                state.repeat = Some(id);
                ctx.rep = Some(id);
                ctx.pc = pc;
                state.ptr = ptr;
                ctx.resume = Resume::Repeat;
                return Ok(Step::Call {
                    target: pc + code[pc] as usize,
                    toplevel: ctx.toplevel,
                });
            }

            Opcode::MaxUntil => {
                // maximizing repeat
                // <REPEAT> <skip> <1=min> <2=max> item <MAX_UNTIL> tail
                let id = state.repeat.ok_or(EngineError::State)?;
                let body = state.repeats[id].pattern.ok_or(EngineError::State)?;
                ctx.rep = Some(id);
                ctx.pc = pc;
                state.ptr = ptr;
                ctx.count = state.repeats[id].count + 1;

                if ctx.count < code[body + 1] as isize {
                    // not enough matches
                    state.repeats[id].count = ctx.count;
                    ctx.resume = Resume::MaxUntilMin;
                    return Ok(Step::Call {
                        target: body + 3,
                        toplevel: ctx.toplevel,
                    });
                }
                hand_off!(max_until_more(state, code, ctx, id, body));
            }

            Opcode::MinUntil => {
                // minimizing repeat
                // <REPEAT> <skip> <1=min> <2=max> item <MIN_UNTIL> tail
                let id = state.repeat.ok_or(EngineError::State)?;
                let body = state.repeats[id].pattern.ok_or(EngineError::State)?;
                ctx.rep = Some(id);
                ctx.pc = pc;
                state.ptr = ptr;
                ctx.count = state.repeats[id].count + 1;

                if ctx.count < code[body + 1] as isize {
                    state.repeats[id].count = ctx.count;
                    ctx.resume = Resume::MinUntilMin;
                    return Ok(Step::Call {
                        target: body + 3,
                        toplevel: ctx.toplevel,
                    });
                }

                // see if the tail matches
                state.repeat = state.repeats[id].prev;
                ctx.save_lastmark(state);
                if state.repeat.is_some() {
                    state.mark_push(ctx.lastmark)?;
                }
                ctx.resume = Resume::MinUntilTail;
                return Ok(Step::Call {
                    target: pc,
                    toplevel: ctx.toplevel,
                });
            }

            Opcode::PossessiveRepeat => {
                // <POSSESSIVE_REPEAT> <skip> <1=min> <2=max> pattern <SUCCESS> tail
                state.ptr = ptr;
                let id = state.repeats.acquire(RepeatRecord {
                    count: -1,
                    pattern: None,
                    prev: state.repeat,
                    last_ptr: None,
                })?;
                state.repeat = Some(id);
                ctx.rep = Some(id);
                ctx.pc = pc;
                ctx.count = 0;
                hand_off!(possessive_min_next(state, code, ctx));
            }

            Opcode::AtomicGroup => {
                // <ATOMIC_GROUP> <skip> pattern <SUCCESS> tail
                state.ptr = ptr;
                ctx.pc = pc;
                ctx.resume = Resume::Atomic;
                return Ok(Step::Call {
                    target: pc + 1,
                    toplevel: false,
                });
            }

            Opcode::GroupRef
            | Opcode::GroupRefIgnore
            | Opcode::GroupRefUniIgnore
            | Opcode::GroupRefLocIgnore => {
                // <GROUPREF> <group>
                let fold: fn(u32) -> u32 = match op {
                    Opcode::GroupRefIgnore => lower_ascii,
                    Opcode::GroupRefUniIgnore => lower_unicode,
                    Opcode::GroupRefLocIgnore => lower_locale,
                    _ => |c| c,
                };
                let Some((p, e)) = captured(state, code[pc] as usize) else {
                    fail!();
                };
                let len = e - p;
                if ptr > end || end - ptr < len {
                    fail!();
                }
                for i in 0..len {
                    if fold(unit(text, ptr + i)) != fold(unit(text, p + i)) {
                        fail!();
                    }
                }
                ctx.ptr = ptr + len;
                ctx.pc = pc + 1;
            }

            Opcode::GroupRefExists => {
                // <GROUPREF_EXISTS> <group> <skip> codeyes <JUMP> codeno ...
                ctx.pc = if captured(state, code[pc] as usize).is_some() {
                    pc + 2
                } else {
                    pc + code[pc + 1] as usize
                };
            }

            Opcode::Assert => {
                // <ASSERT> <skip> <back> <pattern>
                let back = code[pc + 1] as usize;
                if ptr < back {
                    fail!();
                }
                state.ptr = ptr - back;
                ctx.pc = pc;
                ctx.resume = Resume::Assert;
                return Ok(Step::Call {
                    target: pc + 2,
                    toplevel: false,
                });
            }

            Opcode::AssertNot => {
                // <ASSERT_NOT> <skip> <back> <pattern>
                let back = code[pc + 1] as usize;
                if ptr >= back {
                    state.ptr = ptr - back;
                    ctx.pc = pc;
                    ctx.save_lastmark(state);
                    if state.repeat.is_some() {
                        state.mark_push(ctx.lastmark)?;
                    }
                    ctx.resume = Resume::AssertNot;
                    return Ok(Step::Call {
                        target: pc + 2,
                        toplevel: false,
                    });
                }
                ctx.pc = pc + code[pc] as usize;
            }

            // Set items and parser-only opcodes never appear here in a
            // validated program.
            Opcode::Category
            | Opcode::Charset
            | Opcode::BigCharset
            | Opcode::Negate
            | Opcode::Range
            | Opcode::RangeUniIgnore
            | Opcode::Subpattern => return Err(EngineError::Illegal),
        }
    }
}

/// Span of group `index` (0-based, group 0 excluded) if it was captured
/// with `start <= end`.
#[inline]
fn captured(state: &State<'_>, index: usize) -> Option<(usize, usize)> {
    let groupref = index * 2;
    if groupref as isize >= state.lastmark {
        return None;
    }
    match (state.marks[groupref], state.marks[groupref + 1]) {
        (Some(p), Some(e)) if p <= e => Some((p, e)),
        _ => None,
    }
}

// ============================================================================
// Resumption
// ============================================================================

fn resume<C: CodeUnit>(
    state: &mut State<'_>,
    text: &[C],
    code: &[u32],
    ctx: &mut Frame,
    matched: bool,
) -> Result<Step, EngineError> {
    match ctx.resume {
        Resume::Start => Err(EngineError::State),

        Resume::Branch => {
            if matched {
                if state.repeat.is_some() {
                    state.mark_pop_discard(ctx.lastmark);
                }
                return Ok(Step::Return(true));
            }
            if state.repeat.is_some() {
                state.mark_pop_keep(ctx.lastmark);
            }
            ctx.restore_lastmark(state);
            ctx.pc += code[ctx.pc] as usize;
            branch_next(state, text, code, ctx)
        }

        Resume::RepeatOne => {
            if matched {
                if state.repeat.is_some() {
                    state.mark_pop_discard(ctx.lastmark);
                }
                return Ok(Step::Return(true));
            }
            if state.repeat.is_some() {
                state.mark_pop_keep(ctx.lastmark);
            }
            ctx.restore_lastmark(state);
            ctx.step_back();
            repeat_one_next(state, text, code, ctx)
        }

        Resume::MinRepeatOne => {
            if matched {
                if state.repeat.is_some() {
                    state.mark_pop_discard(ctx.lastmark);
                }
                return Ok(Step::Return(true));
            }
            if state.repeat.is_some() {
                state.mark_pop_keep(ctx.lastmark);
            }
            ctx.restore_lastmark(state);
            state.ptr = ctx.ptr;
            if count(state, text, code, ctx.pc + 3, 1)? == 0 {
                if state.repeat.is_some() {
                    state.mark_pop_discard(ctx.lastmark);
                }
                return Ok(Step::Return(false));
            }
            ctx.ptr += 1;
            ctx.count += 1;
            min_repeat_one_next(state, code, ctx)
        }

        Resume::Repeat => {
            let id = ctx.rep()?;
            state.repeat = state.repeats[id].prev;
            state.repeats.release(id);
            Ok(Step::Return(matched))
        }

        Resume::MaxUntilMin | Resume::MinUntilMin => {
            if matched {
                return Ok(Step::Return(true));
            }
            let id = ctx.rep()?;
            state.repeats[id].count = ctx.count - 1;
            state.ptr = ctx.ptr;
            Ok(Step::Return(false))
        }

        Resume::MaxUntilMore => {
            let id = ctx.rep()?;
            state.repeats[id].last_ptr = ctx.saved;
            if matched {
                state.mark_pop_discard(ctx.lastmark);
                return Ok(Step::Return(true));
            }
            state.mark_pop(ctx.lastmark);
            ctx.restore_lastmark(state);
            state.repeats[id].count = ctx.count - 1;
            state.ptr = ctx.ptr;
            Ok(max_until_tail(state, ctx, id))
        }

        Resume::MaxUntilTail => {
            state.repeat = ctx.rep;
            if matched {
                return Ok(Step::Return(true));
            }
            state.ptr = ctx.ptr;
            Ok(Step::Return(false))
        }

        Resume::MinUntilTail => {
            let id = ctx.rep()?;
            let repeat_of_tail = state.repeat;
            state.repeat = Some(id);
            if matched {
                if repeat_of_tail.is_some() {
                    state.mark_pop_discard(ctx.lastmark);
                }
                return Ok(Step::Return(true));
            }
            if repeat_of_tail.is_some() {
                state.mark_pop(ctx.lastmark);
            }
            ctx.restore_lastmark(state);
            state.ptr = ctx.ptr;

            let body = state.repeats[id].pattern.ok_or(EngineError::State)?;
            let max = code[body + 2];
            if (ctx.count >= max as isize && max != MAXREPEAT)
                || Some(state.ptr) == state.repeats[id].last_ptr
            {
                return Ok(Step::Return(false));
            }
            state.repeats[id].count = ctx.count;
            // zero-width match protection
            ctx.saved = state.repeats[id].last_ptr;
            state.repeats[id].last_ptr = Some(state.ptr);
            ctx.resume = Resume::MinUntilMore;
            Ok(Step::Call {
                target: body + 3,
                toplevel: ctx.toplevel,
            })
        }

        Resume::MinUntilMore => {
            let id = ctx.rep()?;
            state.repeats[id].last_ptr = ctx.saved;
            if matched {
                return Ok(Step::Return(true));
            }
            state.repeats[id].count = ctx.count - 1;
            state.ptr = ctx.ptr;
            Ok(Step::Return(false))
        }

        Resume::PossessiveMin => {
            if matched {
                ctx.count += 1;
                return possessive_min_next(state, code, ctx);
            }
            state.ptr = ctx.ptr;
            let id = ctx.rep()?;
            state.repeat = state.repeats[id].prev;
            state.repeats.release(id);
            Ok(Step::Return(false))
        }

        Resume::PossessiveMore => {
            if matched {
                state.mark_pop_discard(ctx.lastmark);
                ctx.count += 1;
                return possessive_more_next(state, code, ctx);
            }
            state.mark_pop(ctx.lastmark);
            ctx.restore_lastmark(state);
            state.ptr = ctx.saved.unwrap_or(ctx.ptr);
            possessive_finish(state, code, ctx)
        }

        Resume::Atomic => {
            if !matched {
                state.ptr = ctx.ptr;
                return Ok(Step::Return(false));
            }
            // Commit: continue after the group's SUCCESS.
            ctx.pc += code[ctx.pc] as usize;
            ctx.ptr = state.ptr;
            Ok(Step::Continue)
        }

        Resume::Assert => {
            if !matched {
                return Ok(Step::Return(false));
            }
            ctx.pc += code[ctx.pc] as usize;
            Ok(Step::Continue)
        }

        Resume::AssertNot => {
            if matched {
                if state.repeat.is_some() {
                    state.mark_pop_discard(ctx.lastmark);
                }
                return Ok(Step::Return(false));
            }
            if state.repeat.is_some() {
                state.mark_pop(ctx.lastmark);
            }
            ctx.restore_lastmark(state);
            ctx.pc += code[ctx.pc] as usize;
            Ok(Step::Continue)
        }
    }
}

// ============================================================================
// Loop helpers
// ============================================================================

/// Try the next viable BRANCH alternative starting at `ctx.pc`.
fn branch_next<C: CodeUnit>(
    state: &mut State<'_>,
    text: &[C],
    code: &[u32],
    ctx: &mut Frame,
) -> Result<Step, EngineError> {
    let ptr = ctx.ptr;
    while code[ctx.pc] != 0 {
        let alt = ctx.pc;
        // Skip alternatives whose leading LITERAL or IN cannot match.
        let first = code[alt + 1];
        let hopeless = (first == LITERAL
            && (ptr >= state.end || unit(text, ptr) != code[alt + 2]))
            || (first == Opcode::In as u32
                && (ptr >= state.end || !charset(code, alt + 3, unit(text, ptr))));
        if hopeless {
            ctx.pc += code[alt] as usize;
            continue;
        }
        state.ptr = ptr;
        ctx.resume = Resume::Branch;
        return Ok(Step::Call {
            target: alt + 1,
            toplevel: ctx.toplevel,
        });
    }
    if state.repeat.is_some() {
        state.mark_pop_discard(ctx.lastmark);
    }
    Ok(Step::Return(false))
}

/// Try the REPEAT_ONE tail at the current count, backing off first to a
/// position where a literal tail can match.
fn repeat_one_next<C: CodeUnit>(
    state: &mut State<'_>,
    text: &[C],
    code: &[u32],
    ctx: &mut Frame,
) -> Result<Step, EngineError> {
    let min = code[ctx.pc + 1] as isize;
    if let Some(chr) = ctx.chr {
        while ctx.count >= min && (ctx.ptr >= state.end || unit(text, ctx.ptr) != chr) {
            ctx.step_back();
        }
    }
    if ctx.count < min {
        if state.repeat.is_some() {
            state.mark_pop_discard(ctx.lastmark);
        }
        return Ok(Step::Return(false));
    }
    state.ptr = ctx.ptr;
    ctx.resume = Resume::RepeatOne;
    Ok(Step::Call {
        target: ctx.pc + code[ctx.pc] as usize,
        toplevel: ctx.toplevel,
    })
}

fn min_repeat_one_next(
    state: &mut State<'_>,
    code: &[u32],
    ctx: &mut Frame,
) -> Result<Step, EngineError> {
    let max = code[ctx.pc + 2];
    if max == MAXREPEAT || ctx.count <= max as isize {
        state.ptr = ctx.ptr;
        ctx.resume = Resume::MinRepeatOne;
        return Ok(Step::Call {
            target: ctx.pc + code[ctx.pc] as usize,
            toplevel: ctx.toplevel,
        });
    }
    if state.repeat.is_some() {
        state.mark_pop_discard(ctx.lastmark);
    }
    Ok(Step::Return(false))
}

/// MAX_UNTIL once the minimum is met: one more iteration if allowed,
/// otherwise the tail.
fn max_until_more(
    state: &mut State<'_>,
    code: &[u32],
    ctx: &mut Frame,
    id: RepeatId,
    body: usize,
) -> Result<Step, EngineError> {
    let max = code[body + 2];
    if (ctx.count < max as isize || max == MAXREPEAT)
        && Some(state.ptr) != state.repeats[id].last_ptr
    {
        // we may have enough matches, but if we can match another item, do so
        state.repeats[id].count = ctx.count;
        ctx.save_lastmark(state);
        state.mark_push(ctx.lastmark)?;
        // zero-width match protection
        ctx.saved = state.repeats[id].last_ptr;
        state.repeats[id].last_ptr = Some(state.ptr);
        ctx.resume = Resume::MaxUntilMore;
        return Ok(Step::Call {
            target: body + 3,
            toplevel: ctx.toplevel,
        });
    }
    Ok(max_until_tail(state, ctx, id))
}

/// Leave the loop and match what follows it, outside this repeat context.
fn max_until_tail(state: &mut State<'_>, ctx: &mut Frame, id: RepeatId) -> Step {
    state.repeat = state.repeats[id].prev;
    ctx.resume = Resume::MaxUntilTail;
    Step::Call {
        target: ctx.pc,
        toplevel: ctx.toplevel,
    }
}

fn possessive_min_next(
    state: &mut State<'_>,
    code: &[u32],
    ctx: &mut Frame,
) -> Result<Step, EngineError> {
    if ctx.count < code[ctx.pc + 1] as isize {
        // not enough matches
        ctx.resume = Resume::PossessiveMin;
        return Ok(Step::Call {
            target: ctx.pc + 3,
            toplevel: false,
        });
    }
    ctx.saved = None;
    possessive_more_next(state, code, ctx)
}

fn possessive_more_next(
    state: &mut State<'_>,
    code: &[u32],
    ctx: &mut Frame,
) -> Result<Step, EngineError> {
    let max = code[ctx.pc + 2];
    // Stop once an iteration matched the empty string.
    if (ctx.count < max as isize || max == MAXREPEAT) && Some(state.ptr) != ctx.saved {
        ctx.save_lastmark(state);
        state.mark_push(ctx.lastmark)?;
        ctx.saved = Some(state.ptr);
        ctx.resume = Resume::PossessiveMore;
        return Ok(Step::Call {
            target: ctx.pc + 3,
            toplevel: false,
        });
    }
    possessive_finish(state, code, ctx)
}

fn possessive_finish(
    state: &mut State<'_>,
    code: &[u32],
    ctx: &mut Frame,
) -> Result<Step, EngineError> {
    let id = ctx.rep()?;
    state.repeat = state.repeats[id].prev;
    state.repeats.release(id);
    // Past the body's SUCCESS.
    ctx.pc += code[ctx.pc] as usize + 1;
    ctx.ptr = state.ptr;
    Ok(Step::Continue)
}

// ============================================================================
// Count
// ============================================================================

#[inline]
fn scan<C: CodeUnit>(text: &[C], mut ptr: usize, end: usize, test: impl Fn(u32) -> bool) -> usize {
    while ptr < end && test(unit(text, ptr)) {
        ptr += 1;
    }
    ptr
}

/// Count how many times the single item at `code[pc..]` matches in a row
/// from `state.ptr`, up to `maxcount`. Never touches capture marks.
pub(crate) fn count<C: CodeUnit>(
    state: &mut State<'_>,
    text: &[C],
    code: &[u32],
    pc: usize,
    maxcount: u32,
) -> Result<usize, EngineError> {
    let start = state.ptr;
    let mut end = state.end;
    if start > end {
        return Ok(0);
    }
    if maxcount != MAXREPEAT && (maxcount as usize) < end - start {
        end = start + maxcount as usize;
    }

    let Some(op) = Opcode::from_code(code[pc]) else {
        return Err(EngineError::Illegal);
    };
    let arg = code.get(pc + 1).copied().unwrap_or(0);
    let ptr = match op {
        Opcode::In => scan(text, start, end, |c| charset(code, pc + 2, c)),
        Opcode::Any => scan(text, start, end, |c| !is_linebreak(c)),
        Opcode::AnyAll => end,
        Opcode::Literal => match C::from_code(arg) {
            Some(chr) => {
                let mut ptr = start;
                while ptr < end && text[ptr] == chr {
                    ptr += 1;
                }
                ptr
            }
            None => start,
        },
        Opcode::LiteralIgnore => scan(text, start, end, |c| lower_ascii(c) == arg),
        Opcode::LiteralUniIgnore => scan(text, start, end, |c| lower_unicode(c) == arg),
        Opcode::LiteralLocIgnore => scan(text, start, end, |c| char_loc_ignore(arg, c)),
        Opcode::NotLiteral => match C::from_code(arg) {
            Some(chr) => {
                let mut ptr = start;
                while ptr < end && text[ptr] != chr {
                    ptr += 1;
                }
                ptr
            }
            None => end,
        },
        Opcode::NotLiteralIgnore => scan(text, start, end, |c| lower_ascii(c) != arg),
        Opcode::NotLiteralUniIgnore => scan(text, start, end, |c| lower_unicode(c) != arg),
        Opcode::NotLiteralLocIgnore => scan(text, start, end, |c| !char_loc_ignore(arg, c)),
        _ => {
            // repeated single character pattern
            while state.ptr < end {
                let before = state.ptr;
                if !sre_match(state, text, code, pc, false)? || state.ptr == before {
                    break;
                }
            }
            return Ok(state.ptr - start);
        }
    };
    Ok(ptr - start)
}

// ============================================================================
// Sets and position assertions
// ============================================================================

/// True if `ch` is in the set program starting at `code[pc]`.
pub(crate) fn charset(code: &[u32], mut pc: usize, ch: u32) -> bool {
    let mut ok = true;
    loop {
        let Some(op) = Opcode::from_code(code[pc]) else {
            return false;
        };
        pc += 1;
        match op {
            Opcode::Failure => return !ok,
            Opcode::Literal => {
                // <LITERAL> <code>
                if ch == code[pc] {
                    return ok;
                }
                pc += 1;
            }
            Opcode::Category => {
                // <CATEGORY> <code>
                if category(code[pc], ch) {
                    return ok;
                }
                pc += 1;
            }
            Opcode::Charset => {
                // <CHARSET> <bitmap>
                if ch < 256 && code[pc + (ch as usize >> 5)] & (1u32 << (ch & 31)) != 0 {
                    return ok;
                }
                pc += 8;
            }
            Opcode::Range => {
                // <RANGE> <lower> <upper>
                if code[pc] <= ch && ch <= code[pc + 1] {
                    return ok;
                }
                pc += 2;
            }
            Opcode::RangeUniIgnore => {
                // <RANGE_UNI_IGNORE> <lower> <upper>
                if code[pc] <= ch && ch <= code[pc + 1] {
                    return ok;
                }
                let uch = upper_unicode(ch);
                if code[pc] <= uch && uch <= code[pc + 1] {
                    return ok;
                }
                pc += 2;
            }
            Opcode::Negate => ok = !ok,
            Opcode::BigCharset => {
                // <BIGCHARSET> <blockcount> <256 blockindices> <blocks>
                let blocks = code[pc] as usize;
                pc += 1;
                if ch < 0x10000 {
                    let block = block_byte(code, pc, (ch >> 8) as usize) as usize;
                    let bit = block * 256 + (ch & 255) as usize;
                    if code[pc + 64 + bit / 32] & (1u32 << (bit % 32)) != 0 {
                        return ok;
                    }
                }
                pc += 64 + blocks * 8;
            }
            _ => return false,
        }
    }
}

fn charset_loc_ignore(code: &[u32], pc: usize, ch: u32) -> bool {
    let lo = lower_locale(ch);
    if charset(code, pc, lo) {
        return true;
    }
    let up = upper_locale(ch);
    up != lo && charset(code, pc, up)
}

fn at<C: CodeUnit>(state: &State<'_>, text: &[C], ptr: usize, at: u32) -> bool {
    let end = state.end;
    let word_around = |is_word: fn(u32) -> bool| {
        let that = ptr > 0 && is_word(unit(text, ptr - 1));
        let this = ptr < end && is_word(unit(text, ptr));
        (that, this)
    };
    let Some(at) = AtCode::from_code(at) else {
        return false;
    };
    match at {
        AtCode::Beginning | AtCode::BeginningString => ptr == 0,
        AtCode::BeginningLine => ptr == 0 || is_linebreak(unit(text, ptr - 1)),
        AtCode::End => ptr == end || (ptr + 1 == end && is_linebreak(unit(text, ptr))),
        AtCode::EndLine => ptr == end || (ptr < end && is_linebreak(unit(text, ptr))),
        AtCode::EndString => ptr == end,
        AtCode::Boundary | AtCode::LocBoundary | AtCode::UniBoundary
        | AtCode::NonBoundary | AtCode::LocNonBoundary | AtCode::UniNonBoundary => {
            if end == 0 {
                return false;
            }
            let is_word: fn(u32) -> bool = match at {
                AtCode::LocBoundary | AtCode::LocNonBoundary => is_loc_word,
                AtCode::UniBoundary | AtCode::UniNonBoundary => is_uni_word,
                _ => is_word,
            };
            let (that, this) = word_around(is_word);
            match at {
                AtCode::Boundary | AtCode::LocBoundary | AtCode::UniBoundary => this != that,
                _ => this == that,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProgramBuilder;
    use crate::constants::CategoryCode;
    use crate::subject::{Subject, SubjectBuf};

    fn pattern(code: Vec<u32>, groups: usize) -> Pattern {
        Pattern::builder(code).groups(groups).build().unwrap()
    }

    /// Match at position 0; returns the end position.
    fn match_end(p: &Pattern, text: &str) -> Option<usize> {
        let buf = SubjectBuf::from(text);
        let mut state = State::new(p, buf.as_subject(), 0, usize::MAX).unwrap();
        run_match(&mut state, p, true).unwrap().then(|| state.ptr())
    }

    fn full_end(p: &Pattern, text: &str) -> Option<usize> {
        let buf = SubjectBuf::from(text);
        let mut state = State::new(p, buf.as_subject(), 0, usize::MAX).unwrap();
        state.set_match_all(true);
        run_match(&mut state, p, true).unwrap().then(|| state.ptr())
    }

    #[test]
    fn literal_sequence() {
        let p = pattern(ProgramBuilder::new().literal('a').literal('b').build(), 0);
        assert_eq!(match_end(&p, "abc"), Some(2));
        assert_eq!(match_end(&p, "ac"), None);
        assert_eq!(match_end(&p, "a"), None);
    }

    #[test]
    fn first_alternative_wins() {
        let p = pattern(
            ProgramBuilder::new()
                .branch(|alts| {
                    alts.alt(|b| {
                        b.literal('a');
                    })
                    .alt(|b| {
                        b.literal('a').literal('b');
                    });
                })
                .build(),
            0,
        );
        assert_eq!(match_end(&p, "ab"), Some(1));
        assert_eq!(full_end(&p, "ab"), Some(2));
    }

    #[test]
    fn greedy_backs_off_possessive_does_not() {
        let greedy = pattern(
            ProgramBuilder::new()
                .repeat_one(1, MAXREPEAT, |b| {
                    b.literal('a');
                })
                .literal('a')
                .build(),
            0,
        );
        assert_eq!(match_end(&greedy, "aaa"), Some(3));
        let possessive = pattern(
            ProgramBuilder::new()
                .possessive_repeat_one(1, MAXREPEAT, |b| {
                    b.literal('a');
                })
                .literal('a')
                .build(),
            0,
        );
        assert_eq!(match_end(&possessive, "aaa"), None);
    }

    #[test]
    fn lazy_single_repeat_grows() {
        // a*?b
        let p = pattern(
            ProgramBuilder::new()
                .min_repeat_one(0, MAXREPEAT, |b| {
                    b.literal('a');
                })
                .literal('b')
                .build(),
            0,
        );
        assert_eq!(match_end(&p, "aaab"), Some(4));
        assert_eq!(match_end(&p, "aaa"), None);
    }

    #[test]
    fn zero_width_loop_terminates() {
        // (a*)*
        let p = pattern(
            ProgramBuilder::new()
                .repeat(0, MAXREPEAT, |b| {
                    b.group(1, |b| {
                        b.repeat_one(0, MAXREPEAT, |b| {
                            b.literal('a');
                        });
                    });
                })
                .build(),
            1,
        );
        assert_eq!(match_end(&p, "b"), Some(0));
        assert_eq!(match_end(&p, "aab"), Some(2));
    }

    #[test]
    fn general_repeat_backtracks_into_iterations() {
        // (?:ab|a)*b on "aab"
        let p = pattern(
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
                .literal('b')
                .build(),
            0,
        );
        assert_eq!(match_end(&p, "aab"), Some(3));
        assert_eq!(match_end(&p, "aa"), None);
    }

    #[test]
    fn lazy_general_repeat() {
        // (?:ab)+?  then 'a'
        let p = pattern(
            ProgramBuilder::new()
                .min_repeat(1, MAXREPEAT, |b| {
                    b.literal('a').literal('b');
                })
                .literal('a')
                .build(),
            0,
        );
        assert_eq!(match_end(&p, "ababa"), Some(3));
    }

    #[test]
    fn bounded_repeat_respects_max() {
        // (?:a){2,3}
        let p = pattern(
            ProgramBuilder::new()
                .repeat(2, 3, |b| {
                    b.literal('a');
                })
                .build(),
            0,
        );
        assert_eq!(match_end(&p, "a"), None);
        assert_eq!(match_end(&p, "aaaaa"), Some(3));
    }

    #[test]
    fn possessive_general_repeat() {
        // (?:a|ab)*+c: the loop keeps its first choice of "a" on "abc".
        let p = pattern(
            ProgramBuilder::new()
                .possessive_repeat(0, MAXREPEAT, |b| {
                    b.branch(|alts| {
                        alts.alt(|b| {
                            b.literal('a');
                        })
                        .alt(|b| {
                            b.literal('a').literal('b');
                        });
                    });
                })
                .literal('c')
                .build(),
            0,
        );
        assert_eq!(match_end(&p, "aac"), Some(3));
        assert_eq!(match_end(&p, "abc"), None);
    }

    #[test]
    fn atomic_group_commits() {
        // (?>a|ab)c on "abc": the group commits to "a", then 'c' fails at 'b'
        let p = pattern(
            ProgramBuilder::new()
                .atomic(|b| {
                    b.branch(|alts| {
                        alts.alt(|b| {
                            b.literal('a');
                        })
                        .alt(|b| {
                            b.literal('a').literal('b');
                        });
                    });
                })
                .literal('c')
                .build(),
            0,
        );
        assert_eq!(match_end(&p, "abc"), None);
        assert_eq!(match_end(&p, "ac"), Some(2));
    }

    #[test]
    fn backreference() {
        // (a)\1
        let p = pattern(
            ProgramBuilder::new()
                .group(1, |b| {
                    b.literal('a');
                })
                .groupref(1)
                .build(),
            1,
        );
        assert_eq!(match_end(&p, "aa"), Some(2));
        assert_eq!(match_end(&p, "ab"), None);
    }

    #[test]
    fn backreference_ignore_case() {
        let p = pattern(
            ProgramBuilder::new()
                .group(1, |b| {
                    b.in_set(|s| {
                        s.range('a', 'z').range('A', 'Z');
                    });
                })
                .groupref_op(Opcode::GroupRefIgnore, 1)
                .build(),
            1,
        );
        assert_eq!(match_end(&p, "xX"), Some(2));
        assert_eq!(match_end(&p, "xy"), None);
    }

    #[test]
    fn lookaround() {
        // a(?=b)
        let ahead = pattern(
            ProgramBuilder::new()
                .literal('a')
                .assert(0, |b| {
                    b.literal('b');
                })
                .build(),
            0,
        );
        assert_eq!(match_end(&ahead, "ab"), Some(1));
        assert_eq!(match_end(&ahead, "ac"), None);

        // a(?!b)
        let not_ahead = pattern(
            ProgramBuilder::new()
                .literal('a')
                .assert_not(0, |b| {
                    b.literal('b');
                })
                .build(),
            0,
        );
        assert_eq!(match_end(&not_ahead, "ab"), None);
        assert_eq!(match_end(&not_ahead, "ac"), Some(1));

        // .(?<=a)
        let behind = pattern(
            ProgramBuilder::new()
                .any()
                .assert(1, |b| {
                    b.literal('a');
                })
                .build(),
            0,
        );
        assert_eq!(match_end(&behind, "a"), Some(1));
        assert_eq!(match_end(&behind, "b"), None);
    }

    #[test]
    fn conditional_on_group() {
        // (a)?(?(1)b|c)
        let p = pattern(
            ProgramBuilder::new()
                .repeat(0, 1, |b| {
                    b.group(1, |b| {
                        b.literal('a');
                    });
                })
                .groupref_exists_else(
                    1,
                    |b| {
                        b.literal('b');
                    },
                    |b| {
                        b.literal('c');
                    },
                )
                .build(),
            1,
        );
        assert_eq!(match_end(&p, "ab"), Some(2));
        assert_eq!(match_end(&p, "c"), Some(1));
        assert_eq!(match_end(&p, "ac"), None);
    }

    #[test]
    fn anchors_and_boundaries() {
        let p = pattern(
            ProgramBuilder::new()
                .at(AtCode::Boundary)
                .literal('a')
                .at(AtCode::Boundary)
                .build(),
            0,
        );
        assert_eq!(match_end(&p, "a b"), Some(1));
        assert_eq!(match_end(&p, "ab"), None);

        let end = pattern(ProgramBuilder::new().literal('a').at(AtCode::End).build(), 0);
        assert_eq!(match_end(&end, "a\n"), Some(1));
        assert_eq!(match_end(&end, "a\n\n"), None);
    }

    #[test]
    fn charset_items() {
        let p = pattern(
            ProgramBuilder::new()
                .in_set(|s| {
                    s.negate().category(CategoryCode::Digit).literal('x');
                })
                .build(),
            0,
        );
        assert_eq!(match_end(&p, "q"), Some(1));
        assert_eq!(match_end(&p, "5"), None);
        assert_eq!(match_end(&p, "x"), None);

        let big = pattern(
            ProgramBuilder::new()
                .in_set(|s| {
                    s.bigcharset(['\u{3a3}' as u32, 'b' as u32]);
                })
                .build(),
            0,
        );
        assert_eq!(match_end(&big, "\u{3a3}"), Some(1));
        assert_eq!(match_end(&big, "b"), Some(1));
        assert_eq!(match_end(&big, "\u{3a4}"), None);
    }

    #[test]
    fn ignore_case_literals() {
        let p = pattern(
            ProgramBuilder::new()
                .literal_op(Opcode::LiteralUniIgnore, '\u{3c3}')
                .build(),
            0,
        );
        assert_eq!(match_end(&p, "\u{3a3}"), Some(1));
        let loc = pattern(
            ProgramBuilder::new()
                .literal_op(Opcode::LiteralLocIgnore, 'a')
                .build(),
            0,
        );
        assert_eq!(match_end(&loc, "A"), Some(1));
    }

    #[test]
    fn count_general_item() {
        // [a-c] under IN_UNI_IGNORE goes through the general count path.
        let p = pattern(
            ProgramBuilder::new()
                .repeat_one(0, MAXREPEAT, |b| {
                    b.set(Opcode::InUniIgnore, |s| {
                        s.range('a', 'c');
                    });
                })
                .build(),
            0,
        );
        assert_eq!(match_end(&p, "AbCd"), Some(3));
    }

    #[test]
    fn deep_backtracking_uses_no_native_recursion() {
        // (?:a|b)*c against 20k 'a's and no 'c'.
        let p = pattern(
            ProgramBuilder::new()
                .repeat(0, MAXREPEAT, |b| {
                    b.branch(|alts| {
                        alts.alt(|b| {
                            b.literal('a');
                        })
                        .alt(|b| {
                            b.literal('b');
                        });
                    });
                })
                .literal('c')
                .build(),
            0,
        );
        let text = "a".repeat(20_000);
        assert_eq!(match_end(&p, &text), None);
        let text = format!("{}c", text);
        assert_eq!(match_end(&p, &text), Some(20_001));
    }

    #[test]
    fn wide_subjects() {
        let p = pattern(
            ProgramBuilder::new()
                .literal('\u{1f600}')
                .literal('x')
                .build(),
            0,
        );
        let units = ['\u{1f600}' as u32, 'x' as u32];
        let mut state = State::new(&p, Subject::Ucs4(&units), 0, 2).unwrap();
        assert!(run_match(&mut state, &p, true).unwrap());
        assert_eq!(state.ptr(), 2);
    }

    #[test]
    fn illegal_opcode_is_an_error() {
        // Bypass validation to reach the defensive path.
        let p = Pattern::builder(vec![Opcode::Category as u32, 0, SUCCESS])
            .build_unchecked();
        let buf = SubjectBuf::from("1");
        let mut state = State::new(&p, buf.as_subject(), 0, 1).unwrap();
        assert_eq!(run_match(&mut state, &p, true), Err(EngineError::Illegal));
    }

    #[test]
    fn until_without_repeat_is_a_state_error() {
        let p = Pattern::builder(vec![Opcode::MaxUntil as u32, SUCCESS]).build_unchecked();
        let buf = SubjectBuf::from("");
        let mut state = State::new(&p, buf.as_subject(), 0, 0).unwrap();
        assert_eq!(run_match(&mut state, &p, true), Err(EngineError::State));
    }
}
