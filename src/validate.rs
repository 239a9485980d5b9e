// validate.rs - Structural verification of opcode programs.
//
// Walks a program once, without executing it, and confirms that every
// operand is present, every skip stays inside its enclosing region, and
// every nested body ends in the terminator its opcode requires.
// A program that fails here must never reach the matcher.

use crate::constants::{AtCode, CategoryCode, InfoFlags, Opcode, MAXGROUPS};
use crate::error::Error;

/// Offset of the word that made a program invalid.
type Invalid = usize;

/// How an inner walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tail {
    /// Ran off the end of the region.
    Plain,
    /// The region's last item was a JUMP.
    Jump,
}

/// True if `code` is a well-formed program declaring `groups` capture groups.
pub fn validate(code: &[u32], groups: usize) -> bool {
    validate_program(code, groups).is_ok()
}

/// Like [`validate`], reporting where the program went wrong.
pub fn validate_program(code: &[u32], groups: usize) -> Result<(), Error> {
    validate_outer(code, groups).map_err(|offset| Error::InvalidCode { offset })
}

fn validate_outer(code: &[u32], groups: usize) -> Result<(), Invalid> {
    if groups > MAXGROUPS {
        return Err(0);
    }
    let Some((&last, _)) = code.split_last() else {
        return Err(0);
    };
    if last != Opcode::Success.code() {
        return Err(code.len() - 1);
    }
    match validate_inner(code, 0, code.len() - 1, groups)? {
        Tail::Plain => Ok(()),
        Tail::Jump => Err(code.len() - 1),
    }
}

// ============================================================================
// Cursor
// ============================================================================

struct Cursor<'c> {
    code: &'c [u32],
    pos: usize,
    end: usize,
}

impl<'c> Cursor<'c> {
    fn new(code: &'c [u32], pos: usize, end: usize) -> Self {
        Cursor { code, pos, end }
    }

    #[inline]
    fn arg(&mut self) -> Result<u32, Invalid> {
        if self.pos >= self.end {
            return Err(self.pos);
        }
        let v = self.code[self.pos];
        self.pos += 1;
        Ok(v)
    }

    /// Read a skip and check that `skip word + skip` stays inside the region.
    #[inline]
    fn skip(&mut self) -> Result<usize, Invalid> {
        let at = self.pos;
        let skip = self.arg()? as usize;
        if skip > self.end - at {
            return Err(at);
        }
        Ok(skip)
    }

    /// Read a skip measured from the word before it.
    #[inline]
    fn skip_from_previous(&mut self) -> Result<usize, Invalid> {
        let at = self.pos;
        let skip = self.arg()? as usize;
        if skip == 0 || skip - 1 > self.end - at {
            return Err(at);
        }
        Ok(skip)
    }

    #[inline]
    fn expect(&mut self, op: Opcode) -> Result<(), Invalid> {
        let at = self.pos;
        if self.arg()? != op.code() {
            return Err(at);
        }
        Ok(())
    }
}

/// End of a body that starts at `body` and stops `reserved` words before
/// `sw + skip`, or an error if the skip is too short to hold the layout.
#[inline]
fn body_end(sw: usize, skip: usize, reserved: usize, body: usize) -> Result<usize, Invalid> {
    match (sw + skip).checked_sub(reserved) {
        Some(end) if end >= body => Ok(end),
        _ => Err(sw),
    }
}

/// Byte `i` of a BIGCHARSET block table packed four to a word.
#[inline]
pub(crate) fn block_byte(code: &[u32], table: usize, i: usize) -> u32 {
    (code[table + i / 4] >> ((i % 4) * 8)) & 0xff
}

// ============================================================================
// Charset
// ============================================================================

fn validate_charset(code: &[u32], pos: usize, end: usize) -> Result<(), Invalid> {
    let mut c = Cursor::new(code, pos, end);
    while c.pos < c.end {
        let at = c.pos;
        match Opcode::from_code(c.arg()?) {
            Some(Opcode::Negate) => {}
            Some(Opcode::Literal) => {
                c.arg()?;
            }
            Some(Opcode::Range | Opcode::RangeUniIgnore) => {
                c.arg()?;
                c.arg()?;
            }
            Some(Opcode::Charset) => {
                if 8 > c.end - c.pos {
                    return Err(at);
                }
                c.pos += 8;
            }
            Some(Opcode::BigCharset) => {
                let blocks = c.arg()?;
                if 64 > c.end - c.pos {
                    return Err(at);
                }
                for i in 0..256 {
                    if block_byte(code, c.pos, i) >= blocks {
                        return Err(c.pos + i / 4);
                    }
                }
                c.pos += 64;
                let bitmaps = blocks as usize * 8;
                if bitmaps > c.end - c.pos {
                    return Err(at);
                }
                c.pos += bitmaps;
            }
            Some(Opcode::Category) => {
                if CategoryCode::from_code(c.arg()?).is_none() {
                    return Err(at + 1);
                }
            }
            _ => return Err(at),
        }
    }
    Ok(())
}

// ============================================================================
// Program body
// ============================================================================

fn validate_inner(code: &[u32], pos: usize, end: usize, groups: usize) -> Result<Tail, Invalid> {
    let mut c = Cursor::new(code, pos, end);
    while c.pos < c.end {
        let at = c.pos;
        let Some(op) = Opcode::from_code(c.arg()?) else {
            return Err(at);
        };
        match op {
            Opcode::Mark => {
                if c.arg()? as usize >= 2 * groups {
                    return Err(at + 1);
                }
            }

            Opcode::Literal
            | Opcode::NotLiteral
            | Opcode::LiteralIgnore
            | Opcode::NotLiteralIgnore
            | Opcode::LiteralUniIgnore
            | Opcode::NotLiteralUniIgnore
            | Opcode::LiteralLocIgnore
            | Opcode::NotLiteralLocIgnore => {
                c.arg()?;
            }

            Opcode::Success | Opcode::Failure | Opcode::Any | Opcode::AnyAll => {}

            Opcode::At => {
                if AtCode::from_code(c.arg()?).is_none() {
                    return Err(at + 1);
                }
            }

            Opcode::In | Opcode::InIgnore | Opcode::InUniIgnore | Opcode::InLocIgnore => {
                let skip = c.skip()?;
                let set_end = body_end(at + 1, skip, 1, c.pos)?;
                validate_charset(code, c.pos, set_end)?;
                c.pos = set_end;
                c.expect(Opcode::Failure)?;
            }

            Opcode::Info => {
                let skip = c.skip()?;
                let next = at + 1 + skip;
                let flags = InfoFlags::from_bits(c.arg()?).ok_or(at + 2)?;
                c.arg()?; // min
                c.arg()?; // max
                if flags.contains(InfoFlags::PREFIX | InfoFlags::CHARSET)
                    || (flags.contains(InfoFlags::LITERAL) && !flags.contains(InfoFlags::PREFIX))
                {
                    return Err(at + 2);
                }
                if flags.contains(InfoFlags::PREFIX) {
                    let prefix_len = c.arg()? as usize;
                    let prefix_skip = c.arg()? as usize;
                    if prefix_skip > prefix_len {
                        return Err(at + 6);
                    }
                    let room = next.checked_sub(c.pos).ok_or(at)?;
                    if prefix_len > room {
                        return Err(at);
                    }
                    let prefix_at = c.pos;
                    c.pos += prefix_len;
                    if prefix_len > next - c.pos {
                        return Err(at);
                    }
                    // Overlap entries index back into the prefix.
                    for i in 0..prefix_len {
                        if code[c.pos + i] as usize >= prefix_len {
                            return Err(c.pos + i);
                        }
                    }
                    c.pos += prefix_len;
                    // The search resumes matching after the first
                    // `prefix_skip` characters, which must be LITERAL pairs
                    // spelling the prefix right after the INFO block.
                    if prefix_skip > (c.end - next) / 2 {
                        return Err(at + 6);
                    }
                    for i in 0..prefix_skip {
                        let w = next + 2 * i;
                        if code[w] != Opcode::Literal.code()
                            || code[w + 1] != code[prefix_at + i]
                        {
                            return Err(w);
                        }
                    }
                }
                if flags.contains(InfoFlags::CHARSET) {
                    let set_end = body_end(at + 1, skip, 1, c.pos)?;
                    validate_charset(code, c.pos, set_end)?;
                    if code[set_end] != Opcode::Failure.code() {
                        return Err(set_end);
                    }
                    c.pos = next;
                } else if c.pos != next {
                    return Err(at);
                }
            }

            Opcode::Branch => {
                let mut target: Option<usize> = None;
                loop {
                    let sw = c.pos;
                    let skip = c.skip()?;
                    if skip == 0 {
                        break;
                    }
                    let alt_end = body_end(sw, skip, 2, c.pos)?;
                    if validate_inner(code, c.pos, alt_end, groups)? == Tail::Jump {
                        return Err(sw);
                    }
                    c.pos = alt_end;
                    c.expect(Opcode::Jump)?;
                    let jsw = c.pos;
                    let jskip = c.skip()?;
                    let jump_to = jsw + jskip;
                    match target {
                        None => target = Some(jump_to),
                        Some(t) if t != jump_to => return Err(jsw),
                        Some(_) => {}
                    }
                }
                if target != Some(c.pos) {
                    return Err(at);
                }
            }

            Opcode::RepeatOne | Opcode::MinRepeatOne | Opcode::PossessiveRepeatOne => {
                let sw = c.pos;
                let skip = c.skip()?;
                let min = c.arg()?;
                let max = c.arg()?;
                // max <= MAXREPEAT holds by width.
                if min > max {
                    return Err(sw + 1);
                }
                let item_end = body_end(sw, skip, 1, c.pos)?;
                if validate_inner(code, c.pos, item_end, groups)? == Tail::Jump {
                    return Err(sw);
                }
                c.pos = item_end;
                c.expect(Opcode::Success)?;
            }

            Opcode::Repeat | Opcode::PossessiveRepeat => {
                let sw = c.pos;
                let skip = c.skip()?;
                let min = c.arg()?;
                let max = c.arg()?;
                if min > max {
                    return Err(sw + 1);
                }
                let body = body_end(sw, skip, 0, c.pos)?;
                if validate_inner(code, c.pos, body, groups)? == Tail::Jump {
                    return Err(sw);
                }
                c.pos = body;
                let until_at = c.pos;
                let until = Opcode::from_code(c.arg()?);
                let ok = if op == Opcode::PossessiveRepeat {
                    until == Some(Opcode::Success)
                } else {
                    matches!(until, Some(Opcode::MaxUntil | Opcode::MinUntil))
                };
                if !ok {
                    return Err(until_at);
                }
            }

            Opcode::AtomicGroup => {
                let sw = c.pos;
                let skip = c.skip()?;
                let body = body_end(sw, skip, 1, c.pos)?;
                if validate_inner(code, c.pos, body, groups)? == Tail::Jump {
                    return Err(sw);
                }
                c.pos = body;
                c.expect(Opcode::Success)?;
            }

            Opcode::GroupRef
            | Opcode::GroupRefIgnore
            | Opcode::GroupRefUniIgnore
            | Opcode::GroupRefLocIgnore => {
                if c.arg()? as usize >= groups {
                    return Err(at + 1);
                }
            }

            Opcode::GroupRefExists => {
                if c.arg()? as usize >= groups {
                    return Err(at + 1);
                }
                let gw = at + 1;
                let skip = c.skip_from_previous()?;
                let then_end = body_end(gw, skip, 0, c.pos)?;
                let mut tail = validate_inner(code, c.pos, then_end, groups)?;
                let mut next = then_end;
                if tail == Tail::Jump {
                    // The then-part ended in `JUMP skipno`; the else-part follows.
                    c.pos = then_end - 1;
                    let jsw = c.pos;
                    let skipno = c.skip()?;
                    let else_end = body_end(jsw, skipno, 0, c.pos)?;
                    tail = validate_inner(code, c.pos, else_end, groups)?;
                    next = else_end;
                }
                if tail == Tail::Jump {
                    return Err(at);
                }
                c.pos = next;
            }

            Opcode::Assert | Opcode::AssertNot => {
                let sw = c.pos;
                let skip = c.skip()?;
                c.arg()?; // back
                let body = body_end(sw, skip, 1, c.pos)?;
                if validate_inner(code, c.pos, body, groups)? == Tail::Jump {
                    return Err(sw);
                }
                c.pos = body;
                c.expect(Opcode::Success)?;
            }

            Opcode::Jump => {
                // Only legal as the last item of a region; the caller
                // checks where it lands.
                if c.pos + 1 != c.end {
                    return Err(at);
                }
                return Ok(Tail::Jump);
            }

            // Set-only opcodes, MIN/MAX_UNTIL outside a REPEAT, SUBPATTERN.
            _ => return Err(at),
        }
    }
    Ok(Tail::Plain)
}
