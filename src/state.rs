// state.rs - Match state and engine limits.
//
// A State holds everything one match session mutates: slice bounds,
// cursor, capture marks, the repeat chain, and the backtracking stacks.
// Lifecycle: State::new (init) -> reset between attempts -> finalize/drop.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::api::Pattern;
use crate::constants::{CHECK_INTERVAL_MASK, DEFAULT_MATCH_STACK_LIMIT, DEFAULT_TIME_LIMIT_MSEC};
use crate::error::{EngineError, Error};
use crate::exec::Frame;
use crate::stack::{DataStack, RepeatId, RepeatPool};
use crate::subject::Subject;

// ============================================================================
// Global limits
// ============================================================================

static MATCH_STACK_LIMIT: AtomicUsize = AtomicUsize::new(DEFAULT_MATCH_STACK_LIMIT);
static TIME_LIMIT: AtomicU64 = AtomicU64::new(DEFAULT_TIME_LIMIT_MSEC);

/// Cap on entries in each backtracking stack (0 = unlimited).
pub fn set_match_stack_limit(n: usize) { MATCH_STACK_LIMIT.store(n, Ordering::Relaxed); }
pub fn match_stack_limit() -> usize { MATCH_STACK_LIMIT.load(Ordering::Relaxed) }
/// Wall-clock budget per search in milliseconds (0 = unlimited).
pub fn set_time_limit(msec: u64) { TIME_LIMIT.store(msec, Ordering::Relaxed); }
pub fn time_limit() -> u64 { TIME_LIMIT.load(Ordering::Relaxed) }

// ============================================================================
// Interrupt
// ============================================================================

/// A shareable cancellation flag, polled by the matcher every few
/// thousand dispatch steps.
///
/// ```
/// use srevm::state::Interrupt;
///
/// let handle = Interrupt::new();
/// let remote = handle.clone();
/// remote.trigger();
/// assert!(handle.is_triggered());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ============================================================================
// State
// ============================================================================

/// Mutable session state for matching one pattern against one subject.
#[derive(Debug)]
pub struct State<'h> {
    pub(crate) subject: Subject<'h>,
    /// Requested bounds after clamping.
    pub(crate) pos: usize,
    pub(crate) endpos: usize,
    /// Start of the current attempt and end of the slice.
    pub(crate) start: usize,
    pub(crate) end: usize,
    pub(crate) ptr: usize,
    /// Two slots per capture group, group 0 excluded.
    pub(crate) marks: Vec<Option<usize>>,
    pub(crate) lastmark: isize,
    pub(crate) lastindex: isize,
    pub(crate) repeat: Option<RepeatId>,
    pub(crate) repeats: RepeatPool,
    pub(crate) data: DataStack<Option<usize>>,
    pub(crate) frames: DataStack<Frame>,
    pub(crate) must_advance: bool,
    pub(crate) match_all: bool,
    sigcount: u32,
    time_limit: u64,
    /// Lazily-initialized start time for time-limit checking.
    time_start: Option<Instant>,
    interrupt: Option<Interrupt>,
}

impl<'h> State<'h> {
    /// Prepare a session over `subject[pos..endpos]`.
    ///
    /// Out-of-range bounds are clamped to the subject. A bytes pattern
    /// with a text subject (or the reverse) is a type error.
    pub fn new(
        pattern: &Pattern,
        subject: Subject<'h>,
        pos: usize,
        endpos: usize,
    ) -> Result<State<'h>, Error> {
        if pattern.is_bytes() && !subject.is_bytes() {
            return Err(Error::Type(
                "cannot use a bytes pattern on a string-like object",
            ));
        }
        if !pattern.is_bytes() && subject.is_bytes() {
            return Err(Error::Type(
                "cannot use a string pattern on a bytes-like object",
            ));
        }

        let length = subject.len();
        let start = pos.min(length);
        let end = endpos.min(length);

        let slots = pattern.groups() * 2;
        let mut marks = Vec::new();
        marks
            .try_reserve_exact(slots)
            .map_err(|_| EngineError::Memory)?;
        marks.resize(slots, None);

        let stack_limit = match_stack_limit();
        Ok(State {
            subject,
            pos: start,
            endpos: end,
            start,
            end,
            ptr: start,
            marks,
            lastmark: -1,
            lastindex: -1,
            repeat: None,
            repeats: RepeatPool::new(),
            data: DataStack::new(stack_limit),
            frames: DataStack::new(stack_limit),
            must_advance: false,
            match_all: false,
            sigcount: 0,
            time_limit: time_limit(),
            time_start: None,
            interrupt: None,
        })
    }

    /// Forget captures and the repeat chain before another attempt.
    /// Pooled repeat records stay allocated.
    pub fn reset(&mut self) {
        self.lastmark = -1;
        self.lastindex = -1;
        self.repeat = None;
        self.data.clear();
        self.frames.clear();
        self.time_start = None;
    }

    /// Release every buffer the session holds.
    pub fn finalize(mut self) {
        self.marks = Vec::new();
        self.data.release();
        self.frames.release();
        self.repeats.clear();
    }

    pub fn set_interrupt(&mut self, interrupt: Option<Interrupt>) {
        self.interrupt = interrupt;
    }

    /// Start the next global attempt where the last match ended. An empty
    /// match may not repeat there.
    pub(crate) fn advance(&mut self) {
        self.must_advance = self.ptr == self.start;
        self.start = self.ptr;
    }

    /// Reject an empty match at the attempt's start position.
    pub fn set_must_advance(&mut self, yes: bool) {
        self.must_advance = yes;
    }

    /// Require the match to reach the slice end.
    pub fn set_match_all(&mut self, yes: bool) {
        self.match_all = yes;
    }

    pub fn subject(&self) -> Subject<'h> {
        self.subject
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn endpos(&self) -> usize {
        self.endpos
    }

    /// Where the last successful attempt started.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Where the last successful attempt ended.
    pub fn ptr(&self) -> usize {
        self.ptr
    }

    /// Index of the most recently closed group, if any.
    pub fn lastindex(&self) -> Option<usize> {
        usize::try_from(self.lastindex).ok()
    }

    /// Span of capture group `group` (1-based) from the last attempt.
    pub fn group_span(&self, group: usize) -> Result<Option<(usize, usize)>, Error> {
        if group == 0 {
            return Ok(Some((self.start, self.ptr)));
        }
        let j = 2 * (group - 1);
        if j + 1 >= self.marks.len() || (j + 1) as isize > self.lastmark {
            return Ok(None);
        }
        match (self.marks[j], self.marks[j + 1]) {
            (Some(a), Some(b)) if a > b => Err(Error::WrongSpan { group }),
            (Some(a), Some(b)) => Ok(Some((a, b))),
            _ => Ok(None),
        }
    }

    // === Marks ===

    #[inline]
    pub(crate) fn set_mark(&mut self, i: usize, pos: usize) {
        if i & 1 == 1 {
            self.lastindex = (i / 2 + 1) as isize;
        }
        if i as isize > self.lastmark {
            // Slots skipped over belong to groups not seen this attempt.
            let from = (self.lastmark + 1) as usize;
            for slot in &mut self.marks[from..i] {
                *slot = None;
            }
            self.lastmark = i as isize;
        }
        self.marks[i] = Some(pos);
    }

    #[inline]
    pub(crate) fn reset_marks(&mut self) {
        self.lastmark = -1;
        self.lastindex = -1;
    }

    #[inline]
    fn mark_count(lastmark: isize) -> usize {
        (lastmark + 1).max(0) as usize
    }

    pub(crate) fn mark_push(&mut self, lastmark: isize) -> Result<(), EngineError> {
        let n = Self::mark_count(lastmark);
        if n > 0 {
            self.data.push_slice(&self.marks[..n])?;
        }
        Ok(())
    }

    pub(crate) fn mark_pop(&mut self, lastmark: isize) {
        let n = Self::mark_count(lastmark);
        if n > 0 {
            self.data.pop_into(&mut self.marks[..n], true);
        }
    }

    pub(crate) fn mark_pop_keep(&mut self, lastmark: isize) {
        let n = Self::mark_count(lastmark);
        if n > 0 {
            self.data.pop_into(&mut self.marks[..n], false);
        }
    }

    pub(crate) fn mark_pop_discard(&mut self, lastmark: isize) {
        self.data.discard(Self::mark_count(lastmark));
    }

    // === Limits ===

    /// Count one dispatch step and, every few thousand steps, poll the
    /// interrupt flag and the time limit.
    #[inline]
    pub(crate) fn check_signals(&mut self) -> Result<(), EngineError> {
        self.sigcount = self.sigcount.wrapping_add(1);
        if self.sigcount & CHECK_INTERVAL_MASK != 0 {
            return Ok(());
        }
        if self.interrupt.as_ref().is_some_and(Interrupt::is_triggered) {
            return Err(EngineError::Interrupted);
        }
        if self.time_limit != 0 {
            let start = *self.time_start.get_or_insert_with(Instant::now);
            if start.elapsed() >= Duration::from_millis(self.time_limit) {
                return Err(EngineError::TimeLimit);
            }
        }
        Ok(())
    }
}
