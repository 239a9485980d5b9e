// constants.rs - Opcode numbering and program-level constants.
// Opcode, AtCode, CategoryCode, InfoFlags, SreFlag, limits.

use bitflags::bitflags;

// === Program Constants ===

/// Version tag of the opcode numbering below.
pub const MAGIC: u32 = 20221023;
/// Size in bytes of one program code word.
pub const CODESIZE: usize = 4;
/// Repeat upper bound meaning "unbounded".
pub const MAXREPEAT: u32 = u32::MAX;
/// Largest declarable capture group count.
pub const MAXGROUPS: usize = (u32::MAX / 2) as usize;

// === Config Constants ===
pub const DEFAULT_MATCH_STACK_LIMIT: usize = 0;
pub const DEFAULT_TIME_LIMIT_MSEC: u64 = 0;
/// Dispatch steps between two polls of the interrupt flag and time limit.
pub const CHECK_INTERVAL_MASK: u32 = 0xfff;

// === Opcodes ===

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Failure = 0,
    Success = 1,
    Any = 2,
    AnyAll = 3,
    Assert = 4,
    AssertNot = 5,
    At = 6,
    Branch = 7,
    Category = 8,
    Charset = 9,
    BigCharset = 10,
    GroupRef = 11,
    GroupRefExists = 12,
    In = 13,
    Info = 14,
    Jump = 15,
    Literal = 16,
    Mark = 17,
    MaxUntil = 18,
    MinUntil = 19,
    NotLiteral = 20,
    Negate = 21,
    Range = 22,
    Repeat = 23,
    RepeatOne = 24,
    Subpattern = 25,
    MinRepeatOne = 26,
    AtomicGroup = 27,
    PossessiveRepeat = 28,
    PossessiveRepeatOne = 29,
    GroupRefIgnore = 30,
    InIgnore = 31,
    LiteralIgnore = 32,
    NotLiteralIgnore = 33,
    GroupRefLocIgnore = 34,
    InLocIgnore = 35,
    LiteralLocIgnore = 36,
    NotLiteralLocIgnore = 37,
    GroupRefUniIgnore = 38,
    InUniIgnore = 39,
    LiteralUniIgnore = 40,
    NotLiteralUniIgnore = 41,
    RangeUniIgnore = 42,
}

impl Opcode {
    const ALL: [Opcode; 43] = [
        Opcode::Failure,
        Opcode::Success,
        Opcode::Any,
        Opcode::AnyAll,
        Opcode::Assert,
        Opcode::AssertNot,
        Opcode::At,
        Opcode::Branch,
        Opcode::Category,
        Opcode::Charset,
        Opcode::BigCharset,
        Opcode::GroupRef,
        Opcode::GroupRefExists,
        Opcode::In,
        Opcode::Info,
        Opcode::Jump,
        Opcode::Literal,
        Opcode::Mark,
        Opcode::MaxUntil,
        Opcode::MinUntil,
        Opcode::NotLiteral,
        Opcode::Negate,
        Opcode::Range,
        Opcode::Repeat,
        Opcode::RepeatOne,
        Opcode::Subpattern,
        Opcode::MinRepeatOne,
        Opcode::AtomicGroup,
        Opcode::PossessiveRepeat,
        Opcode::PossessiveRepeatOne,
        Opcode::GroupRefIgnore,
        Opcode::InIgnore,
        Opcode::LiteralIgnore,
        Opcode::NotLiteralIgnore,
        Opcode::GroupRefLocIgnore,
        Opcode::InLocIgnore,
        Opcode::LiteralLocIgnore,
        Opcode::NotLiteralLocIgnore,
        Opcode::GroupRefUniIgnore,
        Opcode::InUniIgnore,
        Opcode::LiteralUniIgnore,
        Opcode::NotLiteralUniIgnore,
        Opcode::RangeUniIgnore,
    ];

    /// Decode a program word, `None` if it names no opcode.
    #[inline]
    pub fn from_code(code: u32) -> Option<Opcode> {
        Self::ALL.get(code as usize).copied()
    }

    #[inline]
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl From<Opcode> for u32 {
    fn from(op: Opcode) -> u32 {
        op as u32
    }
}

// === Position Assertions (AT operands) ===

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtCode {
    Beginning = 0,
    BeginningLine = 1,
    BeginningString = 2,
    Boundary = 3,
    NonBoundary = 4,
    End = 5,
    EndLine = 6,
    EndString = 7,
    LocBoundary = 8,
    LocNonBoundary = 9,
    UniBoundary = 10,
    UniNonBoundary = 11,
}

impl AtCode {
    pub fn from_code(code: u32) -> Option<AtCode> {
        Some(match code {
            0 => AtCode::Beginning,
            1 => AtCode::BeginningLine,
            2 => AtCode::BeginningString,
            3 => AtCode::Boundary,
            4 => AtCode::NonBoundary,
            5 => AtCode::End,
            6 => AtCode::EndLine,
            7 => AtCode::EndString,
            8 => AtCode::LocBoundary,
            9 => AtCode::LocNonBoundary,
            10 => AtCode::UniBoundary,
            11 => AtCode::UniNonBoundary,
            _ => return None,
        })
    }
}

impl From<AtCode> for u32 {
    fn from(at: AtCode) -> u32 {
        at as u32
    }
}

// === Character Categories (CATEGORY operands) ===

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoryCode {
    Digit = 0,
    NotDigit = 1,
    Space = 2,
    NotSpace = 3,
    Word = 4,
    NotWord = 5,
    Linebreak = 6,
    NotLinebreak = 7,
    LocWord = 8,
    LocNotWord = 9,
    UniDigit = 10,
    UniNotDigit = 11,
    UniSpace = 12,
    UniNotSpace = 13,
    UniWord = 14,
    UniNotWord = 15,
    UniLinebreak = 16,
    UniNotLinebreak = 17,
}

impl CategoryCode {
    pub fn from_code(code: u32) -> Option<CategoryCode> {
        use CategoryCode::*;
        const ALL: [CategoryCode; 18] = [
            Digit,
            NotDigit,
            Space,
            NotSpace,
            Word,
            NotWord,
            Linebreak,
            NotLinebreak,
            LocWord,
            LocNotWord,
            UniDigit,
            UniNotDigit,
            UniSpace,
            UniNotSpace,
            UniWord,
            UniNotWord,
            UniLinebreak,
            UniNotLinebreak,
        ];
        ALL.get(code as usize).copied()
    }
}

impl From<CategoryCode> for u32 {
    fn from(cat: CategoryCode) -> u32 {
        cat as u32
    }
}

// === Flags ===

bitflags! {
    /// Hints carried by a leading `INFO` block.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InfoFlags: u32 {
        /// A literal prefix table follows.
        const PREFIX = 1;
        /// The whole pattern is the literal prefix.
        const LITERAL = 2;
        /// A first-character charset follows.
        const CHARSET = 4;
    }
}

bitflags! {
    /// Flags the pattern was compiled with. Folding and multiline behaviour
    /// are already baked into the opcodes; these are kept for reporting.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SreFlag: u32 {
        const TEMPLATE = 1;
        const IGNORECASE = 2;
        const LOCALE = 4;
        const MULTILINE = 8;
        const DOTALL = 16;
        const UNICODE = 32;
        const VERBOSE = 64;
        const DEBUG = 128;
        const ASCII = 256;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_roundtrip_covers_every_value() {
        for v in 0..43u32 {
            let op = Opcode::from_code(v).unwrap();
            assert_eq!(op.code(), v);
        }
        assert_eq!(Opcode::from_code(43), None);
    }

    #[test]
    fn at_and_category_ranges() {
        assert_eq!(AtCode::from_code(11), Some(AtCode::UniNonBoundary));
        assert_eq!(AtCode::from_code(12), None);
        assert_eq!(CategoryCode::from_code(17), Some(CategoryCode::UniNotLinebreak));
        assert_eq!(CategoryCode::from_code(18), None);
    }

    #[test]
    fn info_flags_reject_unknown_bits() {
        assert_eq!(InfoFlags::from_bits(8), None);
        assert_eq!(
            InfoFlags::from_bits(3),
            Some(InfoFlags::PREFIX | InfoFlags::LITERAL)
        );
    }
}
