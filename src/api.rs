// api.rs - Public matching API.
//
// Pattern wraps a validated opcode program. The single-shot operations
// (match_at, fullmatch, search) return a Match snapshot; the global ones
// (findall, finditer, split, sub, subn) drive one State across the subject,
// using must_advance so an empty match never repeats at the same position.

use std::collections::HashMap;
use std::fmt;
use std::ops::{Bound, Range, RangeBounds};
use std::sync::{Arc, Mutex, TryLockError};

use smallvec::SmallVec;

use crate::constants::{SreFlag, MAGIC};
use crate::error::Error;
use crate::exec::run_match;
use crate::search::run_search;
use crate::state::{Interrupt, State};
use crate::subject::{Joiner, Subject, SubjectBuf};
use crate::template::Template;
use crate::validate::validate_program;

/// Resolve a range of positions to `(pos, endpos)`; the state clamps both.
fn bounds(range: impl RangeBounds<usize>) -> (usize, usize) {
    let pos = match range.start_bound() {
        Bound::Included(&s) => s,
        Bound::Excluded(&s) => s.saturating_add(1),
        Bound::Unbounded => 0,
    };
    let endpos = match range.end_bound() {
        Bound::Included(&e) => e.saturating_add(1),
        Bound::Excluded(&e) => e,
        Bound::Unbounded => usize::MAX,
    };
    (pos, endpos)
}

// ============================================================================
// Pattern
// ============================================================================

/// A validated program plus its group metadata.
///
/// # Examples
///
/// ```
/// use srevm::api::Pattern;
/// use srevm::builder::ProgramBuilder;
/// use srevm::constants::MAXREPEAT;
/// use srevm::subject::SubjectBuf;
///
/// // [0-9]+
/// let code = ProgramBuilder::new()
///     .repeat_one(1, MAXREPEAT, |b| {
///         b.in_set(|s| {
///             s.range('0', '9');
///         });
///     })
///     .build();
/// let re = Pattern::builder(code).build()?;
///
/// let text = SubjectBuf::from("answer: 42");
/// let m = re.search(&text, ..)?.unwrap();
/// assert_eq!(m.range(), 8..10);
/// assert_eq!(m.as_subject().to_string_lossy(), "42");
/// # Ok::<(), srevm::error::Error>(())
/// ```
pub struct Pattern {
    code: Vec<u32>,
    groups: usize,
    flags: SreFlag,
    groupindex: HashMap<String, usize>,
    /// Name of each group by number; slot 0 is unused.
    indexgroup: Vec<Option<String>>,
    is_bytes: bool,
    templates: Mutex<HashMap<SubjectBuf, Arc<Template>>>,
}

impl Pattern {
    /// Start building a pattern around `code`.
    pub fn builder(code: Vec<u32>) -> PatternBuilder {
        PatternBuilder::new(code)
    }

    pub fn code(&self) -> &[u32] {
        &self.code
    }

    /// Number of capture groups, group 0 excluded.
    pub fn groups(&self) -> usize {
        self.groups
    }

    pub fn flags(&self) -> SreFlag {
        self.flags
    }

    /// True if the pattern matches bytes rather than text.
    pub fn is_bytes(&self) -> bool {
        self.is_bytes
    }

    pub fn group_index(&self, name: &str) -> Option<usize> {
        self.groupindex.get(name).copied()
    }

    pub fn group_name(&self, index: usize) -> Option<&str> {
        self.indexgroup.get(index)?.as_deref()
    }

    pub fn groupindex(&self) -> &HashMap<String, usize> {
        &self.groupindex
    }

    fn session<'h>(
        &self,
        subject: Subject<'h>,
        range: impl RangeBounds<usize>,
    ) -> Result<State<'h>, Error> {
        let (pos, endpos) = bounds(range);
        State::new(self, subject, pos, endpos)
    }

    fn snapshot<'h>(&self, state: &State<'h>, found: bool) -> Result<Option<Match<'_, 'h>>, Error> {
        if found {
            Match::new(self, state).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Match anchored at the start of `range`.
    pub fn match_at<'h>(
        &self,
        subject: impl Into<Subject<'h>>,
        range: impl RangeBounds<usize>,
    ) -> Result<Option<Match<'_, 'h>>, Error> {
        let mut state = self.session(subject.into(), range)?;
        if state.start > state.end {
            return Ok(None);
        }
        let found = run_match(&mut state, self, true)?;
        self.snapshot(&state, found)
    }

    /// Match that must span the whole of `range`.
    pub fn fullmatch<'h>(
        &self,
        subject: impl Into<Subject<'h>>,
        range: impl RangeBounds<usize>,
    ) -> Result<Option<Match<'_, 'h>>, Error> {
        let mut state = self.session(subject.into(), range)?;
        if state.start > state.end {
            return Ok(None);
        }
        state.set_match_all(true);
        let found = run_match(&mut state, self, true)?;
        self.snapshot(&state, found)
    }

    /// Leftmost match anywhere in `range`.
    pub fn search<'h>(
        &self,
        subject: impl Into<Subject<'h>>,
        range: impl RangeBounds<usize>,
    ) -> Result<Option<Match<'_, 'h>>, Error> {
        let mut state = self.session(subject.into(), range)?;
        let found = run_search(&mut state, self)?;
        self.snapshot(&state, found)
    }

    /// All non-overlapping matches, as group 0 when the pattern has no
    /// groups, group 1 when it has one, and a tuple of every group
    /// otherwise. Unmatched groups come back empty.
    pub fn findall<'h>(
        &self,
        subject: impl Into<Subject<'h>>,
        range: impl RangeBounds<usize>,
    ) -> Result<Vec<FindAllItem<'h>>, Error> {
        let subject = subject.into();
        let mut state = self.session(subject, range)?;
        let group = |state: &State<'h>, g: usize| -> Result<Subject<'h>, Error> {
            Ok(match state.group_span(g)? {
                Some((b, e)) => subject.slice(b, e),
                None => subject.slice(0, 0),
            })
        };

        let mut items = Vec::new();
        while state.start <= state.end {
            state.reset();
            state.ptr = state.start;
            if !run_search(&mut state, self)? {
                break;
            }
            let item = match self.groups {
                0 => FindAllItem::Single(subject.slice(state.start, state.ptr)),
                1 => FindAllItem::Single(group(&state, 1)?),
                n => FindAllItem::Tuple(
                    (1..=n)
                        .map(|g| group(&state, g))
                        .collect::<Result<_, _>>()?,
                ),
            };
            items.push(item);
            state.advance();
        }
        Ok(items)
    }

    /// Lazily yield successive matches.
    pub fn finditer<'h>(
        &self,
        subject: impl Into<Subject<'h>>,
        range: impl RangeBounds<usize>,
    ) -> Result<FindIter<'_, 'h>, Error> {
        Ok(FindIter {
            scanner: self.scanner(subject, range)?,
            done: false,
        })
    }

    /// A stateful cursor for stepping through matches by hand.
    pub fn scanner<'h>(
        &self,
        subject: impl Into<Subject<'h>>,
        range: impl RangeBounds<usize>,
    ) -> Result<Scanner<'_, 'h>, Error> {
        let state = self.session(subject.into(), range)?;
        Ok(Scanner {
            pattern: self,
            inner: Mutex::new(ScanState {
                state,
                exhausted: false,
            }),
        })
    }

    /// Split around matches. Captured groups are interleaved with the
    /// pieces, `None` where a group did not take part. `maxsplit == 0`
    /// means no limit.
    pub fn split<'h>(
        &self,
        subject: impl Into<Subject<'h>>,
        maxsplit: usize,
    ) -> Result<Vec<Option<Subject<'h>>>, Error> {
        let subject = subject.into();
        let mut state = self.session(subject, ..)?;
        let mut pieces = Vec::new();
        let mut last = state.start;
        let mut n = 0;
        while maxsplit == 0 || n < maxsplit {
            state.reset();
            state.ptr = state.start;
            if !run_search(&mut state, self)? {
                break;
            }
            // segment before this match
            pieces.push(Some(subject.slice(last, state.start)));
            for g in 1..=self.groups {
                pieces.push(state.group_span(g)?.map(|(b, e)| subject.slice(b, e)));
            }
            n += 1;
            state.advance();
            last = state.ptr;
        }
        // segment following the last match, even if empty
        pieces.push(Some(subject.slice(last, subject.len())));
        Ok(pieces)
    }

    /// Replace up to `count` matches (0 = all).
    pub fn sub<'h>(
        &self,
        repl: Replacement<'_>,
        subject: impl Into<Subject<'h>>,
        count: usize,
    ) -> Result<SubjectBuf, Error> {
        self.subn(repl, subject, count).map(|(out, _)| out)
    }

    /// Like [`sub`](Self::sub), also returning the number of replacements.
    pub fn subn<'h>(
        &self,
        repl: Replacement<'_>,
        subject: impl Into<Subject<'h>>,
        count: usize,
    ) -> Result<(SubjectBuf, usize), Error> {
        let subject = subject.into();
        let shared: Arc<Template>;
        let mut filter = match repl {
            Replacement::Text(text) => {
                self.check_kind(text.is_bytes())?;
                if text.code_points().any(|c| c == '\\' as u32) {
                    shared = self.template(text)?;
                    Filter::from_template(shared.as_ref())
                } else {
                    Filter::Literal(text)
                }
            }
            Replacement::Template(template) => {
                self.check_kind(template.is_bytes())?;
                Filter::from_template(template)
            }
            Replacement::Callable(f) => Filter::Callable(f),
        };

        let mut state = self.session(subject, ..)?;
        let mut out = Joiner::new(self.is_bytes);
        let mut n = 0;
        let mut i = 0;
        while count == 0 || n < count {
            state.reset();
            state.ptr = state.start;
            if !run_search(&mut state, self)? {
                break;
            }
            let (b, e) = (state.start, state.ptr);
            if i < b {
                self.push_piece(&mut out, subject.slice(i, b))?;
            }
            match &mut filter {
                Filter::Literal(text) => {
                    if !text.is_empty() {
                        self.push_piece(&mut out, *text)?;
                    }
                }
                Filter::Template(template) => {
                    let m = Match::new(self, &state)?;
                    template.expand_into(&m, &mut out)?;
                }
                Filter::Callable(f) => {
                    let m = Match::new(self, &state)?;
                    if let Some(item) = (**f)(&m) {
                        self.push_piece(&mut out, item.as_subject())?;
                    }
                }
            }
            i = e;
            n += 1;
            state.advance();
        }
        if i < state.endpos {
            self.push_piece(&mut out, subject.slice(i, state.endpos))?;
        }
        Ok((out.finish(), n))
    }

    /// Compile `repl` as a replacement template, reusing an earlier
    /// compilation of the same text.
    pub fn template(&self, repl: Subject<'_>) -> Result<Arc<Template>, Error> {
        let key = repl.to_buf();
        let mut cache = self
            .templates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(template) = cache.get(&key) {
            return Ok(Arc::clone(template));
        }
        let template = Arc::new(Template::compile(self, repl)?);
        cache.insert(key, Arc::clone(&template));
        Ok(template)
    }

    fn push_piece(&self, out: &mut Joiner, piece: Subject<'_>) -> Result<(), Error> {
        if out.push(piece) {
            Ok(())
        } else {
            self.check_kind(!self.is_bytes)
        }
    }

    fn check_kind(&self, is_bytes: bool) -> Result<(), Error> {
        match (self.is_bytes, is_bytes) {
            (true, false) => Err(Error::Type("expected a bytes-like object, str found")),
            (false, true) => Err(Error::Type("expected str instance, bytes found")),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pattern")
            .field("groups", &self.groups)
            .field("flags", &self.flags)
            .field("is_bytes", &self.is_bytes)
            .finish_non_exhaustive()
    }
}

// === PatternBuilder ===

/// Builder for a [`Pattern`]; [`build`](Self::build) validates the program.
///
/// ```
/// use srevm::api::Pattern;
/// use srevm::builder::ProgramBuilder;
///
/// let code = ProgramBuilder::new()
///     .group(1, |b| {
///         b.literal('x');
///     })
///     .build();
/// let re = Pattern::builder(code).groups(1).group_name("x", 1).build().unwrap();
/// assert_eq!(re.group_index("x"), Some(1));
/// ```
#[derive(Debug, Clone)]
pub struct PatternBuilder {
    code: Vec<u32>,
    groups: usize,
    flags: SreFlag,
    names: Vec<(String, usize)>,
    is_bytes: bool,
    magic: u32,
}

impl PatternBuilder {
    pub fn new(code: Vec<u32>) -> Self {
        PatternBuilder {
            code,
            groups: 0,
            flags: SreFlag::empty(),
            names: Vec::new(),
            is_bytes: false,
            magic: MAGIC,
        }
    }

    /// Number of capture groups the program marks.
    pub fn groups(mut self, groups: usize) -> Self {
        self.groups = groups;
        self
    }

    pub fn flags(mut self, flags: SreFlag) -> Self {
        self.flags = flags;
        self
    }

    /// Name group `index` (1-based).
    pub fn group_name(mut self, name: &str, index: usize) -> Self {
        self.names.push((name.to_string(), index));
        self
    }

    /// Match bytes subjects instead of text.
    pub fn bytes(mut self, yes: bool) -> Self {
        self.is_bytes = yes;
        self
    }

    /// Opcode numbering the program was produced for.
    pub fn magic(mut self, magic: u32) -> Self {
        self.magic = magic;
        self
    }

    pub fn build(self) -> Result<Pattern, Error> {
        if self.magic != MAGIC {
            return Err(Error::Version {
                expected: MAGIC,
                found: self.magic,
            });
        }
        validate_program(&self.code, self.groups)?;
        self.finish()
    }

    /// Skip validation; for exercising the matcher's own error paths.
    #[cfg(test)]
    pub(crate) fn build_unchecked(self) -> Pattern {
        let groups = self.groups;
        self.finish().unwrap_or_else(|_| panic!("bad group names for {} groups", groups))
    }

    fn finish(self) -> Result<Pattern, Error> {
        let mut groupindex = HashMap::new();
        let mut indexgroup = vec![None; self.groups + 1];
        for (name, index) in self.names {
            if index == 0 || index > self.groups {
                return Err(Error::NoSuchGroup(name));
            }
            indexgroup[index] = Some(name.clone());
            groupindex.insert(name, index);
        }
        Ok(Pattern {
            code: self.code,
            groups: self.groups,
            flags: self.flags,
            groupindex,
            indexgroup,
            is_bytes: self.is_bytes,
            templates: Mutex::new(HashMap::new()),
        })
    }
}

// ============================================================================
// Match
// ============================================================================

/// Group spans captured by one successful attempt.
#[derive(Clone)]
pub struct Match<'p, 'h> {
    pattern: &'p Pattern,
    subject: Subject<'h>,
    pos: usize,
    endpos: usize,
    /// Span per group, group 0 first.
    spans: SmallVec<[Option<(usize, usize)>; 8]>,
    lastindex: Option<usize>,
}

impl<'p, 'h> Match<'p, 'h> {
    pub(crate) fn new(pattern: &'p Pattern, state: &State<'h>) -> Result<Self, Error> {
        let mut spans = SmallVec::with_capacity(pattern.groups + 1);
        for g in 0..=pattern.groups {
            spans.push(state.group_span(g)?);
        }
        Ok(Match {
            pattern,
            subject: state.subject(),
            pos: state.pos(),
            endpos: state.endpos(),
            spans,
            lastindex: state.lastindex(),
        })
    }

    pub fn pattern(&self) -> &'p Pattern {
        self.pattern
    }

    pub fn subject(&self) -> Subject<'h> {
        self.subject
    }

    /// Bounds the match was requested with.
    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn endpos(&self) -> usize {
        self.endpos
    }

    /// Start of the whole match.
    pub fn start(&self) -> usize {
        self.range().start
    }

    /// End of the whole match.
    pub fn end(&self) -> usize {
        self.range().end
    }

    pub fn range(&self) -> Range<usize> {
        match self.spans[0] {
            Some((b, e)) => b..e,
            None => 0..0,
        }
    }

    /// The matched text.
    pub fn as_subject(&self) -> Subject<'h> {
        let r = self.range();
        self.subject.slice(r.start, r.end)
    }

    /// Span of `group`, `None` if it did not take part.
    pub fn span(&self, group: usize) -> Result<Option<(usize, usize)>, Error> {
        self.spans
            .get(group)
            .copied()
            .ok_or_else(|| Error::NoSuchGroup(group.to_string()))
    }

    /// Text of `group`, `None` if it did not take part.
    pub fn group(&self, group: usize) -> Result<Option<Subject<'h>>, Error> {
        Ok(self.span(group)?.map(|(b, e)| self.subject.slice(b, e)))
    }

    pub fn group_by_name(&self, name: &str) -> Result<Option<Subject<'h>>, Error> {
        let index = self
            .pattern
            .group_index(name)
            .ok_or_else(|| Error::NoSuchGroup(name.to_string()))?;
        self.group(index)
    }

    /// Groups 1..=n.
    pub fn groups(&self) -> Vec<Option<Subject<'h>>> {
        self.spans[1..]
            .iter()
            .map(|span| span.map(|(b, e)| self.subject.slice(b, e)))
            .collect()
    }

    /// Named groups by name.
    pub fn groupdict(&self) -> HashMap<String, Option<Subject<'h>>> {
        self.pattern
            .groupindex
            .iter()
            .map(|(name, &index)| {
                let text = self.spans[index].map(|(b, e)| self.subject.slice(b, e));
                (name.clone(), text)
            })
            .collect()
    }

    /// Number of the last group closed.
    pub fn lastindex(&self) -> Option<usize> {
        self.lastindex
    }

    /// Name of the last group closed, if it has one.
    pub fn lastgroup(&self) -> Option<&'p str> {
        self.pattern.group_name(self.lastindex?)
    }

    /// Expand a replacement template against this match.
    pub fn expand(&self, template: Subject<'_>) -> Result<SubjectBuf, Error> {
        self.pattern.template(template)?.expand(self)
    }
}

impl fmt::Debug for Match<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Match")
            .field("span", &self.range())
            .field("match", &self.as_subject())
            .finish()
    }
}

// ============================================================================
// Scanner
// ============================================================================

struct ScanState<'h> {
    state: State<'h>,
    exhausted: bool,
}

/// Steps through a subject one match at a time, each attempt resuming
/// where the previous match ended.
///
/// A scanner is not re-entrant: a call that overlaps another call on the
/// same scanner fails with [`Error::ScannerBusy`].
pub struct Scanner<'p, 'h> {
    pattern: &'p Pattern,
    inner: Mutex<ScanState<'h>>,
}

impl<'p, 'h> Scanner<'p, 'h> {
    pub fn pattern(&self) -> &'p Pattern {
        self.pattern
    }

    /// Next match anchored where the last one ended.
    pub fn match_next(&self) -> Result<Option<Match<'p, 'h>>, Error> {
        self.step(false)
    }

    /// Next match anywhere after the last one.
    pub fn search_next(&self) -> Result<Option<Match<'p, 'h>>, Error> {
        self.step(true)
    }

    /// Install or remove a cancellation flag for later calls.
    pub fn set_interrupt(&self, interrupt: Option<Interrupt>) -> Result<(), Error> {
        self.lock()?.state.set_interrupt(interrupt);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ScanState<'h>>, Error> {
        match self.inner.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(Error::ScannerBusy),
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
        }
    }

    fn step(&self, search: bool) -> Result<Option<Match<'p, 'h>>, Error> {
        let mut guard = self.lock()?;
        let scan = &mut *guard;
        if scan.exhausted {
            return Ok(None);
        }
        let state = &mut scan.state;
        state.reset();
        state.ptr = state.start;

        let found = if search {
            run_search(state, self.pattern)?
        } else {
            state.start <= state.end && run_match(state, self.pattern, true)?
        };
        if !found {
            scan.exhausted = true;
            return Ok(None);
        }
        let m = Match::new(self.pattern, state)?;
        state.advance();
        Ok(Some(m))
    }
}

impl fmt::Debug for Scanner<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scanner")
            .field("pattern", self.pattern)
            .finish_non_exhaustive()
    }
}

// === FindIter ===

/// Iterator over successive non-overlapping matches.
#[derive(Debug)]
pub struct FindIter<'p, 'h> {
    scanner: Scanner<'p, 'h>,
    done: bool,
}

impl<'p, 'h> Iterator for FindIter<'p, 'h> {
    type Item = Result<Match<'p, 'h>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.scanner.search_next() {
            Ok(Some(m)) => Some(Ok(m)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

// ============================================================================
// findall / sub inputs and outputs
// ============================================================================

/// One element of [`Pattern::findall`]'s result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindAllItem<'h> {
    Single(Subject<'h>),
    Tuple(Vec<Subject<'h>>),
}

/// What [`Pattern::sub`] puts in place of each match.
pub enum Replacement<'r> {
    /// Inserted verbatim, or compiled as a template if it contains a
    /// backslash.
    Text(Subject<'r>),
    /// A precompiled template.
    Template(&'r Template),
    /// Called per match; `None` inserts nothing.
    Callable(&'r mut dyn FnMut(&Match<'_, '_>) -> Option<SubjectBuf>),
}

impl fmt::Debug for Replacement<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Replacement::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Replacement::Template(t) => f.debug_tuple("Template").field(t).finish(),
            Replacement::Callable(_) => f.write_str("Callable(..)"),
        }
    }
}

enum Filter<'r, 't> {
    Literal(Subject<'t>),
    Template(&'t Template),
    Callable(&'r mut dyn FnMut(&Match<'_, '_>) -> Option<SubjectBuf>),
}

impl<'r, 't> Filter<'r, 't> {
    /// Templates without group references are inserted as plain text.
    fn from_template(template: &'t Template) -> Self {
        match template.as_literal() {
            Some(text) => Filter::Literal(text),
            None => Filter::Template(template),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProgramBuilder;
    use crate::constants::MAXREPEAT;

    fn digits() -> Pattern {
        let code = ProgramBuilder::new()
            .repeat_one(1, MAXREPEAT, |b| {
                b.in_set(|s| {
                    s.range('0', '9');
                });
            })
            .build();
        Pattern::builder(code).build().unwrap()
    }

    #[test]
    fn bounds_follow_range_syntax() {
        assert_eq!(bounds(..), (0, usize::MAX));
        assert_eq!(bounds(2..5), (2, 5));
        assert_eq!(bounds(2..=5), (2, 6));
        assert_eq!(bounds(3..), (3, usize::MAX));
    }

    #[test]
    fn build_checks_magic_and_code() {
        let err = Pattern::builder(ProgramBuilder::new().build())
            .magic(1)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            Error::Version {
                expected: MAGIC,
                found: 1
            }
        );
        let err = Pattern::builder(vec![99]).build().unwrap_err();
        assert!(matches!(err, Error::InvalidCode { .. }));
        let err = Pattern::builder(ProgramBuilder::new().build())
            .group_name("g", 1)
            .build()
            .unwrap_err();
        assert_eq!(err, Error::NoSuchGroup("g".into()));
    }

    #[test]
    fn match_search_fullmatch() {
        let re = digits();
        let text = SubjectBuf::from("12ab34");
        assert_eq!(re.match_at(&text, ..).unwrap().unwrap().range(), 0..2);
        assert!(re.match_at(&text, 2..).unwrap().is_none());
        assert_eq!(re.search(&text, 2..).unwrap().unwrap().range(), 4..6);
        assert!(re.fullmatch(&text, ..).unwrap().is_none());
        assert_eq!(re.fullmatch(&text, 4..).unwrap().unwrap().range(), 4..6);
        assert!(re.match_at(&text, 5..2).unwrap().is_none());
    }

    #[test]
    fn match_accessors() {
        let code = ProgramBuilder::new()
            .group(1, |b| {
                b.literal('a');
            })
            .repeat(0, 1, |b| {
                b.group(2, |b| {
                    b.literal('x');
                });
            })
            .group(3, |b| {
                b.literal('b');
            })
            .build();
        let re = Pattern::builder(code)
            .groups(3)
            .group_name("first", 1)
            .group_name("last", 3)
            .build()
            .unwrap();
        let text = SubjectBuf::from("zab");
        let m = re.search(&text, ..).unwrap().unwrap();
        assert_eq!(m.range(), 1..3);
        assert_eq!(m.span(1).unwrap(), Some((1, 2)));
        assert_eq!(m.span(2).unwrap(), None);
        assert!(matches!(m.span(4), Err(Error::NoSuchGroup(_))));
        assert_eq!(
            m.group_by_name("last").unwrap().map(|s| s.to_string_lossy()),
            Some("b".to_string())
        );
        assert_eq!(m.groups().len(), 3);
        assert_eq!(m.groupdict().len(), 2);
        assert_eq!(m.lastindex(), Some(3));
        assert_eq!(m.lastgroup(), Some("last"));
        let expanded = m.expand(SubjectBuf::from(r"\g<last>\1").as_subject()).unwrap();
        assert_eq!(expanded, SubjectBuf::from("ba"));
    }

    #[test]
    fn scanner_steps_and_exhausts() {
        let re = digits();
        let text = SubjectBuf::from("1a22");
        let scanner = re.scanner(&text, ..).unwrap();
        assert_eq!(scanner.match_next().unwrap().unwrap().range(), 0..1);
        assert!(scanner.match_next().unwrap().is_none());
        // exhausted for good
        assert!(scanner.search_next().unwrap().is_none());

        let scanner = re.scanner(&text, ..).unwrap();
        let spans: Vec<_> = std::iter::from_fn(|| scanner.search_next().unwrap())
            .map(|m| m.range())
            .collect();
        assert_eq!(spans, vec![0..1, 2..4]);
    }

    #[test]
    fn scanner_reports_concurrent_use() {
        let re = digits();
        let text = SubjectBuf::from("1");
        let scanner = re.scanner(&text, ..).unwrap();
        let _held = scanner.inner.lock().unwrap();
        assert_eq!(scanner.search_next().unwrap_err(), Error::ScannerBusy);
    }

    #[test]
    fn template_cache_is_reused() {
        let re = digits();
        let repl = SubjectBuf::from(r"<\g<0>>");
        let a = re.template(repl.as_subject()).unwrap();
        let b = re.template(repl.as_subject()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn sub_rejects_kind_mismatch() {
        let re = digits();
        let text = SubjectBuf::from("1");
        let err = re
            .sub(Replacement::Text(Subject::Bytes(b"x")), &text, 0)
            .unwrap_err();
        assert!(matches!(err, Error::Type(_)));

        let mut wrong = |_: &Match<'_, '_>| Some(SubjectBuf::Bytes(b"x".to_vec()));
        let err = re
            .sub(Replacement::Callable(&mut wrong), &text, 0)
            .unwrap_err();
        assert!(matches!(err, Error::Type(_)));
    }
}
