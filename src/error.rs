// error.rs - Error types for srevm.
//
// EngineError is the small closed set of status codes the matcher and
// search driver return; Error is what the public API reports.

use std::fmt;

// === Engine Status Codes ===

pub const SRE_ERROR_ILLEGAL: i32 = -1;
pub const SRE_ERROR_STATE: i32 = -2;
pub const SRE_ERROR_RECURSION_LIMIT: i32 = -3;
pub const SRE_ERROR_MEMORY: i32 = -9;
pub const SRE_ERROR_INTERRUPTED: i32 = -10;
pub const SRE_ERROR_TIME_LIMIT: i32 = -11;

/// Abnormal termination of a match attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineError {
    /// Unknown or misplaced opcode reached at runtime.
    Illegal,
    /// Inconsistent engine state, e.g. an UNTIL without a repeat context.
    State,
    /// The match-stack limit was exceeded.
    RecursionLimit,
    /// Growing the backtracking stacks failed.
    Memory,
    /// An interrupt handle was triggered.
    Interrupted,
    /// The configured time limit elapsed.
    TimeLimit,
}

impl EngineError {
    pub fn code(self) -> i32 {
        match self {
            EngineError::Illegal => SRE_ERROR_ILLEGAL,
            EngineError::State => SRE_ERROR_STATE,
            EngineError::RecursionLimit => SRE_ERROR_RECURSION_LIMIT,
            EngineError::Memory => SRE_ERROR_MEMORY,
            EngineError::Interrupted => SRE_ERROR_INTERRUPTED,
            EngineError::TimeLimit => SRE_ERROR_TIME_LIMIT,
        }
    }

    pub fn from_code(code: i32) -> Option<EngineError> {
        Some(match code {
            SRE_ERROR_ILLEGAL => EngineError::Illegal,
            SRE_ERROR_STATE => EngineError::State,
            SRE_ERROR_RECURSION_LIMIT => EngineError::RecursionLimit,
            SRE_ERROR_MEMORY => EngineError::Memory,
            SRE_ERROR_INTERRUPTED => EngineError::Interrupted,
            SRE_ERROR_TIME_LIMIT => EngineError::TimeLimit,
            _ => return None,
        })
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Illegal => {
                write!(f, "internal error in regular expression engine: illegal opcode")
            }
            EngineError::State => {
                write!(f, "internal error in regular expression engine: illegal state")
            }
            EngineError::RecursionLimit => write!(f, "maximum recursion limit exceeded"),
            EngineError::Memory => write!(f, "memory allocation failed"),
            EngineError::Interrupted => write!(f, "match interrupted"),
            EngineError::TimeLimit => write!(f, "time limit over"),
        }
    }
}

impl std::error::Error for EngineError {}

// === Public Error ===

/// Error type for pattern construction and matching operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The opcode program failed structural validation.
    InvalidCode { offset: usize },
    /// Bytes pattern used on text, or the reverse.
    Type(&'static str),
    /// A match attempt terminated abnormally.
    Engine(EngineError),
    /// A captured group ended before it started.
    WrongSpan { group: usize },
    /// A scanner call raced another call on the same scanner.
    ScannerBusy,
    /// The program was produced for a different opcode numbering.
    Version { expected: u32, found: u32 },
    /// A replacement template could not be compiled.
    Template { message: String },
    /// Unknown group name or out-of-range group number.
    NoSuchGroup(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidCode { offset } => write!(f, "invalid SRE code at word {}", offset),
            Error::Type(message) => write!(f, "{}", message),
            Error::Engine(err) => write!(f, "{}", err),
            Error::WrongSpan { group } => write!(
                f,
                "the span of capturing group {} is wrong (internal error)",
                group
            ),
            Error::ScannerBusy => write!(f, "regular expression scanner already executing"),
            Error::Version { expected, found } => write!(
                f,
                "SRE module mismatch: expected magic {}, found {}",
                expected, found
            ),
            Error::Template { message } => write!(f, "bad template: {}", message),
            Error::NoSuchGroup(group) => write!(f, "no such group: {}", group),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Engine(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        Error::Engine(err)
    }
}

impl Error {
    /// Returns the engine status code, or 0 for errors raised outside the engine.
    pub fn code(&self) -> i32 {
        match self {
            Error::Engine(err) => err.code(),
            Error::InvalidCode { .. } | Error::WrongSpan { .. } => SRE_ERROR_ILLEGAL,
            _ => 0,
        }
    }

    pub(crate) fn template(message: impl Into<String>) -> Self {
        Error::Template {
            message: message.into(),
        }
    }
}
