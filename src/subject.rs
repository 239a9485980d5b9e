// subject.rs - Input sequences.
// CodeUnit abstracts the 1/2/4-byte element widths the matcher is
// instantiated for; Subject borrows an input, SubjectBuf owns one.

use std::fmt;

// ============================================================================
// Code units
// ============================================================================

/// One element of an input sequence.
pub trait CodeUnit: Copy + Eq + Into<u32> + fmt::Debug + 'static {
    /// Element width in bytes.
    const WIDTH: usize;

    /// Narrow a code point to this width, `None` if it does not fit.
    fn from_code(code: u32) -> Option<Self>;

    /// Offset of the first `needle` in `haystack`.
    #[inline]
    fn find(haystack: &[Self], needle: Self) -> Option<usize> {
        haystack.iter().position(|&c| c == needle)
    }
}

impl CodeUnit for u8 {
    const WIDTH: usize = 1;

    #[inline]
    fn from_code(code: u32) -> Option<u8> {
        u8::try_from(code).ok()
    }

    #[inline]
    fn find(haystack: &[u8], needle: u8) -> Option<usize> {
        memchr::memchr(needle, haystack)
    }
}

impl CodeUnit for u16 {
    const WIDTH: usize = 2;

    #[inline]
    fn from_code(code: u32) -> Option<u16> {
        u16::try_from(code).ok()
    }
}

impl CodeUnit for u32 {
    const WIDTH: usize = 4;

    #[inline]
    fn from_code(code: u32) -> Option<u32> {
        Some(code)
    }
}

/// Run `$body` with `$text` bound to the subject's code-unit slice,
/// monomorphizing once per width.
macro_rules! with_units {
    ($subject:expr, $text:ident => $body:expr) => {
        match $subject {
            $crate::subject::Subject::Bytes($text) | $crate::subject::Subject::Latin1($text) => {
                $body
            }
            $crate::subject::Subject::Ucs2($text) => $body,
            $crate::subject::Subject::Ucs4($text) => $body,
        }
    };
}
pub(crate) use with_units;

// ============================================================================
// Subject
// ============================================================================

/// A borrowed input sequence.
///
/// `Bytes` is binary data and only matches bytes patterns. The three text
/// forms hold code points at the narrowest width that fits them.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject<'h> {
    Bytes(&'h [u8]),
    Latin1(&'h [u8]),
    Ucs2(&'h [u16]),
    Ucs4(&'h [u32]),
}

impl<'h> Subject<'h> {
    /// Number of code units.
    pub fn len(&self) -> usize {
        match self {
            Subject::Bytes(s) | Subject::Latin1(s) => s.len(),
            Subject::Ucs2(s) => s.len(),
            Subject::Ucs4(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_bytes(&self) -> bool {
        matches!(self, Subject::Bytes(_))
    }

    /// Element width in bytes.
    pub fn width(&self) -> usize {
        match self {
            Subject::Bytes(_) | Subject::Latin1(_) => u8::WIDTH,
            Subject::Ucs2(_) => u16::WIDTH,
            Subject::Ucs4(_) => u32::WIDTH,
        }
    }

    /// Code point at `index`.
    pub fn get(&self, index: usize) -> Option<u32> {
        match self {
            Subject::Bytes(s) | Subject::Latin1(s) => s.get(index).map(|&c| u32::from(c)),
            Subject::Ucs2(s) => s.get(index).map(|&c| u32::from(c)),
            Subject::Ucs4(s) => s.get(index).copied(),
        }
    }

    /// Sub-sequence `[start, end)`, clamped to the subject.
    pub fn slice(&self, start: usize, end: usize) -> Subject<'h> {
        let end = end.min(self.len());
        let start = start.min(end);
        match *self {
            Subject::Bytes(s) => Subject::Bytes(&s[start..end]),
            Subject::Latin1(s) => Subject::Latin1(&s[start..end]),
            Subject::Ucs2(s) => Subject::Ucs2(&s[start..end]),
            Subject::Ucs4(s) => Subject::Ucs4(&s[start..end]),
        }
    }

    pub fn code_points(&self) -> impl Iterator<Item = u32> + 'h {
        let subject = *self;
        (0..subject.len()).filter_map(move |i| subject.get(i))
    }

    pub fn to_buf(&self) -> SubjectBuf {
        match *self {
            Subject::Bytes(s) => SubjectBuf::Bytes(s.to_vec()),
            Subject::Latin1(s) => SubjectBuf::Latin1(s.to_vec()),
            Subject::Ucs2(s) => SubjectBuf::Ucs2(s.to_vec()),
            Subject::Ucs4(s) => SubjectBuf::Ucs4(s.to_vec()),
        }
    }

    /// Decode to a `String`. Bytes are read as UTF-8, lone surrogates and
    /// invalid sequences become U+FFFD.
    pub fn to_string_lossy(&self) -> String {
        match self {
            Subject::Bytes(s) => String::from_utf8_lossy(s).into_owned(),
            _ => self
                .code_points()
                .map(|c| char::from_u32(c).unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect(),
        }
    }
}

impl fmt::Debug for Subject<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Bytes(s) => write!(f, "b{:?}", String::from_utf8_lossy(s)),
            _ => write!(f, "{:?}", self.to_string_lossy()),
        }
    }
}

impl<'h> From<&'h [u8]> for Subject<'h> {
    fn from(bytes: &'h [u8]) -> Self {
        Subject::Bytes(bytes)
    }
}

impl<'h, const N: usize> From<&'h [u8; N]> for Subject<'h> {
    fn from(bytes: &'h [u8; N]) -> Self {
        Subject::Bytes(bytes)
    }
}

impl<'h> From<&'h SubjectBuf> for Subject<'h> {
    fn from(buf: &'h SubjectBuf) -> Self {
        buf.as_subject()
    }
}

// ============================================================================
// SubjectBuf
// ============================================================================

/// An owned input sequence.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum SubjectBuf {
    Bytes(Vec<u8>),
    Latin1(Vec<u8>),
    Ucs2(Vec<u16>),
    Ucs4(Vec<u32>),
}

impl SubjectBuf {
    /// Store text code points at the narrowest width that holds them all.
    pub fn from_code_points(points: &[u32]) -> SubjectBuf {
        let max = points.iter().copied().max().unwrap_or(0);
        if max <= 0xff {
            SubjectBuf::Latin1(points.iter().map(|&c| c as u8).collect())
        } else if max <= 0xffff {
            SubjectBuf::Ucs2(points.iter().map(|&c| c as u16).collect())
        } else {
            SubjectBuf::Ucs4(points.to_vec())
        }
    }

    pub fn as_subject(&self) -> Subject<'_> {
        match self {
            SubjectBuf::Bytes(s) => Subject::Bytes(s),
            SubjectBuf::Latin1(s) => Subject::Latin1(s),
            SubjectBuf::Ucs2(s) => Subject::Ucs2(s),
            SubjectBuf::Ucs4(s) => Subject::Ucs4(s),
        }
    }

    pub fn len(&self) -> usize {
        self.as_subject().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_bytes(&self) -> bool {
        matches!(self, SubjectBuf::Bytes(_))
    }

    pub fn to_string_lossy(&self) -> String {
        self.as_subject().to_string_lossy()
    }
}

impl fmt::Debug for SubjectBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.as_subject(), f)
    }
}

impl From<&str> for SubjectBuf {
    fn from(text: &str) -> Self {
        let points: Vec<u32> = text.chars().map(u32::from).collect();
        SubjectBuf::from_code_points(&points)
    }
}

impl From<String> for SubjectBuf {
    fn from(text: String) -> Self {
        SubjectBuf::from(text.as_str())
    }
}

impl From<&[u8]> for SubjectBuf {
    fn from(bytes: &[u8]) -> Self {
        SubjectBuf::Bytes(bytes.to_vec())
    }
}

impl From<Vec<u8>> for SubjectBuf {
    fn from(bytes: Vec<u8>) -> Self {
        SubjectBuf::Bytes(bytes)
    }
}

// ============================================================================
// Joiner
// ============================================================================

/// Concatenates pieces of one kind (bytes or text) into a [`SubjectBuf`].
#[derive(Debug)]
pub(crate) enum Joiner {
    Bytes(Vec<u8>),
    Text(Vec<u32>),
}

impl Joiner {
    pub fn new(bytes: bool) -> Self {
        if bytes {
            Joiner::Bytes(Vec::new())
        } else {
            Joiner::Text(Vec::new())
        }
    }

    /// Append `piece`; returns false if its kind does not match.
    pub fn push(&mut self, piece: Subject<'_>) -> bool {
        match (self, piece) {
            (Joiner::Bytes(out), Subject::Bytes(s)) => {
                out.extend_from_slice(s);
                true
            }
            (Joiner::Text(out), piece) if !piece.is_bytes() => {
                out.extend(piece.code_points());
                true
            }
            _ => false,
        }
    }

    pub fn finish(self) -> SubjectBuf {
        match self {
            Joiner::Bytes(out) => SubjectBuf::Bytes(out),
            Joiner::Text(out) => SubjectBuf::from_code_points(&out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrowest_width_is_chosen() {
        assert!(matches!(SubjectBuf::from("caf\u{e9}"), SubjectBuf::Latin1(_)));
        assert!(matches!(SubjectBuf::from("\u{3a3}x"), SubjectBuf::Ucs2(_)));
        assert!(matches!(SubjectBuf::from("\u{1f600}"), SubjectBuf::Ucs4(_)));
        assert_eq!(SubjectBuf::from("\u{3a3}x").as_subject().width(), 2);
    }

    #[test]
    fn slice_clamps() {
        let buf = SubjectBuf::from("hello");
        let s = buf.as_subject();
        assert_eq!(s.slice(1, 3).to_string_lossy(), "el");
        assert_eq!(s.slice(4, 99).to_string_lossy(), "o");
        assert!(s.slice(9, 2).is_empty());
    }

    #[test]
    fn find_uses_each_width() {
        assert_eq!(u8::find(b"abcabc", b'c'), Some(2));
        assert_eq!(u16::find(&[1, 2, 3], 3), Some(2));
        assert_eq!(u32::find(&[7, 8], 9), None);
        assert_eq!(u8::from_code(0x100), None);
    }

    #[test]
    fn joiner_rejects_mixed_kinds() {
        let mut j = Joiner::new(false);
        let a = SubjectBuf::from("ab");
        let b = SubjectBuf::from("\u{3a3}");
        assert!(j.push(a.as_subject()));
        assert!(j.push(b.as_subject()));
        assert!(!j.push(Subject::Bytes(b"x")));
        assert_eq!(j.finish(), SubjectBuf::from("ab\u{3a3}"));
    }

    #[test]
    fn lossy_decoding() {
        assert_eq!(Subject::Ucs2(&[0x68, 0xd800]).to_string_lossy(), "h\u{fffd}");
        assert_eq!(Subject::Bytes(b"hi").to_string_lossy(), "hi");
    }
}
