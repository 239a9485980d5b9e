// template.rs - Replacement templates.
//
// A template is compiled once per (pattern, replacement) pair into
// alternating literal pieces and group references, then expanded against
// each match by sub/subn and Match::expand.
//
// Syntax: \g<name>, \g<number>, \N and \NN group references, \0 and
// three-digit octal escapes, the ASCII escapes \a \b \f \n \r \t \v \\.
// Other escapes of ASCII letters are errors; any other escaped character
// is kept as written, backslash included.

use crate::api::{Match, Pattern};
use crate::constants::MAXGROUPS;
use crate::error::Error;
use crate::subject::{Joiner, Subject, SubjectBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(SubjectBuf),
    Group(usize),
}

/// A compiled replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    is_bytes: bool,
    pieces: Vec<Piece>,
}

impl Template {
    /// Compile `repl` for use with `pattern`.
    pub fn compile(pattern: &Pattern, repl: Subject<'_>) -> Result<Template, Error> {
        if repl.is_bytes() != pattern.is_bytes() {
            return Err(Error::Type(if pattern.is_bytes() {
                "expected a bytes-like object for the replacement"
            } else {
                "expected a str instance for the replacement"
            }));
        }
        Parser {
            chars: repl.code_points().collect(),
            pos: 0,
            pattern,
            is_bytes: repl.is_bytes(),
            literal: Vec::new(),
            pieces: Vec::new(),
        }
        .parse()
    }

    pub fn is_bytes(&self) -> bool {
        self.is_bytes
    }

    /// The whole expansion when the template references no groups.
    pub(crate) fn as_literal(&self) -> Option<Subject<'_>> {
        match self.pieces.as_slice() {
            [Piece::Literal(text)] => Some(text.as_subject()),
            _ => None,
        }
    }

    /// Append the expansion for `m` to `out`. Unmatched groups expand to
    /// nothing.
    pub(crate) fn expand_into(&self, m: &Match<'_, '_>, out: &mut Joiner) -> Result<(), Error> {
        for piece in &self.pieces {
            let ok = match piece {
                Piece::Literal(text) => out.push(text.as_subject()),
                Piece::Group(g) => match m.group(*g)? {
                    Some(text) => out.push(text),
                    None => true,
                },
            };
            if !ok {
                return Err(Error::Type("template kind does not match the subject"));
            }
        }
        Ok(())
    }

    /// Expansion for `m` as a new buffer.
    pub fn expand(&self, m: &Match<'_, '_>) -> Result<SubjectBuf, Error> {
        let mut out = Joiner::new(self.is_bytes);
        self.expand_into(m, &mut out)?;
        Ok(out.finish())
    }
}

// ============================================================================
// Parser
// ============================================================================

const BACKSLASH: u32 = '\\' as u32;

#[inline]
fn is_digit(c: Option<u32>) -> bool {
    matches!(c, Some(c) if (0x30..=0x39).contains(&c))
}

#[inline]
fn is_octal(c: Option<u32>) -> bool {
    matches!(c, Some(c) if (0x30..=0x37).contains(&c))
}

fn simple_escape(c: u32) -> Option<u32> {
    let mapped = match char::from_u32(c)? {
        'a' => 0x07,
        'b' => 0x08,
        'f' => 0x0c,
        'n' => 0x0a,
        'r' => 0x0d,
        't' => 0x09,
        'v' => 0x0b,
        '\\' => BACKSLASH,
        _ => return None,
    };
    Some(mapped)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_alphanumeric())
}

struct Parser<'p> {
    chars: Vec<u32>,
    pos: usize,
    pattern: &'p Pattern,
    is_bytes: bool,
    literal: Vec<u32>,
    pieces: Vec<Piece>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u32> {
        self.chars.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<u32> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::template(format!("{} at position {}", message.into(), self.pos))
    }

    fn flush_literal(&mut self) {
        let buf = if self.is_bytes {
            SubjectBuf::Bytes(self.literal.iter().map(|&c| c as u8).collect())
        } else {
            SubjectBuf::from_code_points(&self.literal)
        };
        self.literal.clear();
        self.pieces.push(Piece::Literal(buf));
    }

    fn add_group(&mut self, index: usize) -> Result<(), Error> {
        if index > self.pattern.groups() {
            return Err(self.error(format!("invalid group reference {}", index)));
        }
        if !self.literal.is_empty() {
            self.flush_literal();
        }
        self.pieces.push(Piece::Group(index));
        Ok(())
    }

    fn parse(mut self) -> Result<Template, Error> {
        while let Some(c) = self.next() {
            if c != BACKSLASH {
                self.literal.push(c);
                continue;
            }
            let Some(e) = self.next() else {
                return Err(self.error("bad escape (end of pattern)"));
            };
            match char::from_u32(e) {
                Some('g') => self.named_group()?,
                Some('0') => {
                    let mut value = 0;
                    for _ in 0..2 {
                        if !is_octal(self.peek()) {
                            break;
                        }
                        value = value * 8 + (self.next().unwrap_or(0x30) - 0x30);
                    }
                    self.literal.push(value & 0xff);
                }
                Some('1'..='9') => self.numbered_group(e)?,
                _ => match simple_escape(e) {
                    Some(mapped) => self.literal.push(mapped),
                    None if e < 0x80 && (e as u8).is_ascii_alphabetic() => {
                        return Err(self.error(format!(
                            "bad escape \\{}",
                            char::from(e as u8)
                        )));
                    }
                    None => {
                        self.literal.push(BACKSLASH);
                        self.literal.push(e);
                    }
                },
            }
        }
        if !self.literal.is_empty() || self.pieces.is_empty() {
            self.flush_literal();
        }
        Ok(Template {
            is_bytes: self.is_bytes,
            pieces: self.pieces,
        })
    }

    /// After `\g`: `<name>` or `<number>`.
    fn named_group(&mut self) -> Result<(), Error> {
        if self.next() != Some('<' as u32) {
            return Err(self.error("missing <"));
        }
        let mut name = String::new();
        loop {
            match self.next() {
                None => return Err(self.error("missing >, unterminated name")),
                Some(c) if c == '>' as u32 => break,
                Some(c) => name.push(char::from_u32(c).unwrap_or(char::REPLACEMENT_CHARACTER)),
            }
        }
        if name.is_empty() {
            return Err(self.error("missing group name"));
        }
        let index = if name.bytes().all(|b| b.is_ascii_digit()) {
            name.parse::<usize>()
                .ok()
                .filter(|&i| i < MAXGROUPS)
                .ok_or_else(|| self.error(format!("invalid group reference {}", name)))?
        } else {
            if !is_identifier(&name) || (self.is_bytes && !name.is_ascii()) {
                return Err(self.error(format!("bad character in group name '{}'", name)));
            }
            self.pattern
                .group_index(&name)
                .ok_or_else(|| Error::NoSuchGroup(name.clone()))?
        };
        self.add_group(index)
    }

    /// After `\N` with N in 1..=9: one or two decimal digits name a group,
    /// three octal digits an escape.
    fn numbered_group(&mut self, first: u32) -> Result<(), Error> {
        let mut digits = vec![first];
        if is_digit(self.peek()) {
            digits.push(self.next().unwrap_or(0x30));
            if is_octal(Some(first)) && is_octal(Some(digits[1])) && is_octal(self.peek()) {
                digits.push(self.next().unwrap_or(0x30));
                let value = digits.iter().fold(0, |v, &d| v * 8 + (d - 0x30));
                if value > 0o377 {
                    return Err(self.error(format!(
                        "octal escape value \\{} outside of range 0-0o377",
                        digits.iter().filter_map(|&d| char::from_u32(d)).collect::<String>()
                    )));
                }
                self.literal.push(value);
                return Ok(());
            }
        }
        let index = digits.iter().fold(0usize, |v, &d| v * 10 + (d - 0x30) as usize);
        self.add_group(index)
    }
}
