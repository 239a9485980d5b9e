// builder.rs - Program assembly.
//
// ProgramBuilder emits opcode words and back-patches skip offsets so
// programs can be written structurally instead of by hand-counted arrays.
// It produces the same layouts a pattern compiler would, including INFO
// prefix and overlap tables, and is what the tests and benches use.

use crate::constants::{AtCode, CategoryCode, InfoFlags, Opcode, MAXREPEAT};

/// Assembles a program word by word.
///
/// ```
/// use srevm::builder::ProgramBuilder;
/// use srevm::constants::MAXREPEAT;
///
/// // a+b
/// let code = ProgramBuilder::new()
///     .repeat_one(1, MAXREPEAT, |b| {
///         b.literal('a');
///     })
///     .literal('b')
///     .build();
/// assert!(srevm::validate::validate(&code, 0));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ProgramBuilder {
    code: Vec<u32>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw words.
    pub fn emit(&mut self, words: &[u32]) -> &mut Self {
        self.code.extend_from_slice(words);
        self
    }

    pub fn op(&mut self, op: Opcode) -> &mut Self {
        self.code.push(op.code());
        self
    }

    /// Finish with SUCCESS and hand over the words.
    pub fn build(&mut self) -> Vec<u32> {
        let mut code = std::mem::take(&mut self.code);
        code.push(Opcode::Success.code());
        code
    }

    fn placeholder(&mut self) -> usize {
        self.code.push(0);
        self.code.len() - 1
    }

    /// Point the skip word at `at` to the current end.
    fn patch(&mut self, at: usize) {
        self.code[at] = (self.code.len() - at) as u32;
    }

    // === Single characters ===

    pub fn literal(&mut self, c: impl Into<u32>) -> &mut Self {
        self.literal_op(Opcode::Literal, c)
    }

    pub fn not_literal(&mut self, c: impl Into<u32>) -> &mut Self {
        self.literal_op(Opcode::NotLiteral, c)
    }

    /// Any of the LITERAL / NOT_LITERAL family. Folding variants expect
    /// `c` already lowered.
    pub fn literal_op(&mut self, op: Opcode, c: impl Into<u32>) -> &mut Self {
        self.code.extend_from_slice(&[op.code(), c.into()]);
        self
    }

    pub fn any(&mut self) -> &mut Self {
        self.op(Opcode::Any)
    }

    pub fn any_all(&mut self) -> &mut Self {
        self.op(Opcode::AnyAll)
    }

    pub fn at(&mut self, at: AtCode) -> &mut Self {
        self.code.extend_from_slice(&[Opcode::At.code(), at.into()]);
        self
    }

    // === Groups ===

    pub fn mark(&mut self, id: u32) -> &mut Self {
        self.code.extend_from_slice(&[Opcode::Mark.code(), id]);
        self
    }

    /// Capture group `n` (1-based) around `body`.
    pub fn group(&mut self, n: u32, body: impl FnOnce(&mut Self)) -> &mut Self {
        self.mark(2 * (n - 1));
        body(self);
        self.mark(2 * (n - 1) + 1)
    }

    /// Backreference to group `n` (1-based).
    pub fn groupref(&mut self, n: u32) -> &mut Self {
        self.groupref_op(Opcode::GroupRef, n)
    }

    pub fn groupref_op(&mut self, op: Opcode, n: u32) -> &mut Self {
        self.code.extend_from_slice(&[op.code(), n - 1]);
        self
    }

    /// `(?(n)then)`
    pub fn groupref_exists(&mut self, n: u32, then: impl FnOnce(&mut Self)) -> &mut Self {
        self.code.extend_from_slice(&[Opcode::GroupRefExists.code(), n - 1]);
        let skip = self.placeholder();
        then(self);
        self.code[skip] = (self.code.len() - skip + 1) as u32;
        self
    }

    /// `(?(n)then|otherwise)`
    pub fn groupref_exists_else(
        &mut self,
        n: u32,
        then: impl FnOnce(&mut Self),
        otherwise: impl FnOnce(&mut Self),
    ) -> &mut Self {
        self.code.extend_from_slice(&[Opcode::GroupRefExists.code(), n - 1]);
        let skip_yes = self.placeholder();
        then(self);
        self.op(Opcode::Jump);
        let skip_no = self.placeholder();
        self.code[skip_yes] = (self.code.len() - skip_yes + 1) as u32;
        otherwise(self);
        self.patch(skip_no);
        self
    }

    // === Sets ===

    /// `<IN> <skip> set <FAILURE>`
    pub fn in_set(&mut self, items: impl FnOnce(&mut SetBuilder<'_>)) -> &mut Self {
        self.set(Opcode::In, items)
    }

    /// A set under any IN opcode (IN, IN_IGNORE, IN_UNI_IGNORE, IN_LOC_IGNORE).
    pub fn set(&mut self, op: Opcode, items: impl FnOnce(&mut SetBuilder<'_>)) -> &mut Self {
        self.op(op);
        let skip = self.placeholder();
        items(&mut SetBuilder {
            code: &mut self.code,
        });
        self.op(Opcode::Failure);
        self.patch(skip);
        self
    }

    // === Alternation ===

    pub fn branch(&mut self, alts: impl FnOnce(&mut Alternatives<'_>)) -> &mut Self {
        self.op(Opcode::Branch);
        let mut list = Alternatives {
            b: self,
            tails: Vec::new(),
        };
        alts(&mut list);
        let tails = list.tails;
        // end of branch
        self.op(Opcode::Failure);
        for tail in tails {
            self.patch(tail);
        }
        self
    }

    // === Repetition ===

    /// Greedy repeat of a single-width item.
    pub fn repeat_one(&mut self, min: u32, max: u32, item: impl FnOnce(&mut Self)) -> &mut Self {
        self.repeat_item(Opcode::RepeatOne, min, max, item)
    }

    pub fn min_repeat_one(&mut self, min: u32, max: u32, item: impl FnOnce(&mut Self)) -> &mut Self {
        self.repeat_item(Opcode::MinRepeatOne, min, max, item)
    }

    pub fn possessive_repeat_one(
        &mut self,
        min: u32,
        max: u32,
        item: impl FnOnce(&mut Self),
    ) -> &mut Self {
        self.repeat_item(Opcode::PossessiveRepeatOne, min, max, item)
    }

    fn repeat_item(&mut self, op: Opcode, min: u32, max: u32, item: impl FnOnce(&mut Self)) -> &mut Self {
        self.op(op);
        let skip = self.placeholder();
        self.code.extend_from_slice(&[min, max]);
        item(self);
        self.op(Opcode::Success);
        self.patch(skip);
        self
    }

    /// Greedy general repeat (`REPEAT ... MAX_UNTIL`).
    pub fn repeat(&mut self, min: u32, max: u32, body: impl FnOnce(&mut Self)) -> &mut Self {
        self.repeat_until(Opcode::MaxUntil, min, max, body)
    }

    /// Lazy general repeat (`REPEAT ... MIN_UNTIL`).
    pub fn min_repeat(&mut self, min: u32, max: u32, body: impl FnOnce(&mut Self)) -> &mut Self {
        self.repeat_until(Opcode::MinUntil, min, max, body)
    }

    fn repeat_until(&mut self, until: Opcode, min: u32, max: u32, body: impl FnOnce(&mut Self)) -> &mut Self {
        self.op(Opcode::Repeat);
        let skip = self.placeholder();
        self.code.extend_from_slice(&[min, max]);
        body(self);
        self.patch(skip);
        self.op(until)
    }

    pub fn possessive_repeat(&mut self, min: u32, max: u32, body: impl FnOnce(&mut Self)) -> &mut Self {
        self.op(Opcode::PossessiveRepeat);
        let skip = self.placeholder();
        self.code.extend_from_slice(&[min, max]);
        body(self);
        self.patch(skip);
        self.op(Opcode::Success)
    }

    // === Atomic groups and lookaround ===

    pub fn atomic(&mut self, body: impl FnOnce(&mut Self)) -> &mut Self {
        self.op(Opcode::AtomicGroup);
        let skip = self.placeholder();
        body(self);
        self.op(Opcode::Success);
        self.patch(skip);
        self
    }

    /// Lookahead (`back == 0`) or fixed-width lookbehind.
    pub fn assert(&mut self, back: u32, body: impl FnOnce(&mut Self)) -> &mut Self {
        self.lookaround(Opcode::Assert, back, body)
    }

    pub fn assert_not(&mut self, back: u32, body: impl FnOnce(&mut Self)) -> &mut Self {
        self.lookaround(Opcode::AssertNot, back, body)
    }

    fn lookaround(&mut self, op: Opcode, back: u32, body: impl FnOnce(&mut Self)) -> &mut Self {
        self.op(op);
        let skip = self.placeholder();
        self.code.push(back);
        body(self);
        self.op(Opcode::Success);
        self.patch(skip);
        self
    }

    // === INFO ===

    /// INFO block carrying only length bounds. `max` saturates at MAXREPEAT.
    pub fn info(&mut self, min: u32, max: u32) -> &mut Self {
        self.info_block(InfoFlags::empty(), min, max, |_| {})
    }

    /// INFO block with a literal prefix. `prefix_skip` is how many leading
    /// program items the prefix covers; `literal` says the prefix is the
    /// whole pattern.
    pub fn info_prefix(
        &mut self,
        prefix: &[u32],
        prefix_skip: u32,
        literal: bool,
        min: u32,
        max: u32,
    ) -> &mut Self {
        let mut flags = InfoFlags::PREFIX;
        if literal {
            flags |= InfoFlags::LITERAL;
        }
        self.info_block(flags, min, max, |code| {
            code.push(prefix.len() as u32);
            code.push(prefix_skip);
            code.extend_from_slice(prefix);
            code.extend(overlap_table(prefix));
        })
    }

    /// INFO block with a first-character set.
    pub fn info_charset(
        &mut self,
        min: u32,
        max: u32,
        items: impl FnOnce(&mut SetBuilder<'_>),
    ) -> &mut Self {
        self.info_block(InfoFlags::CHARSET, min, max, |code| {
            items(&mut SetBuilder { code: &mut *code });
            code.push(Opcode::Failure.code());
        })
    }

    fn info_block(
        &mut self,
        flags: InfoFlags,
        min: u32,
        max: u32,
        tail: impl FnOnce(&mut Vec<u32>),
    ) -> &mut Self {
        self.op(Opcode::Info);
        let skip = self.placeholder();
        self.code.extend_from_slice(&[flags.bits(), min, max.min(MAXREPEAT)]);
        tail(&mut self.code);
        self.patch(skip);
        self
    }
}

/// KMP failure table: entry `i` is the length of the longest proper
/// prefix of `prefix[..=i]` that is also its suffix.
pub fn overlap_table(prefix: &[u32]) -> Vec<u32> {
    let mut table = vec![0u32; prefix.len()];
    for i in 1..prefix.len() {
        let mut idx = table[i - 1] as usize;
        loop {
            if prefix[i] == prefix[idx] {
                table[i] = idx as u32 + 1;
                break;
            }
            if idx == 0 {
                table[i] = 0;
                break;
            }
            idx = table[idx - 1] as usize;
        }
    }
    table
}

// ============================================================================
// Alternatives
// ============================================================================

/// Collects the alternatives of a BRANCH.
pub struct Alternatives<'b> {
    b: &'b mut ProgramBuilder,
    tails: Vec<usize>,
}

impl Alternatives<'_> {
    pub fn alt(&mut self, body: impl FnOnce(&mut ProgramBuilder)) -> &mut Self {
        let skip = self.b.placeholder();
        body(self.b);
        self.b.op(Opcode::Jump);
        self.tails.push(self.b.placeholder());
        self.b.patch(skip);
        self
    }
}

// ============================================================================
// Sets
// ============================================================================

/// Emits set items; the enclosing call adds the FAILURE terminator.
pub struct SetBuilder<'c> {
    code: &'c mut Vec<u32>,
}

impl SetBuilder<'_> {
    pub fn literal(&mut self, c: impl Into<u32>) -> &mut Self {
        self.code.extend_from_slice(&[Opcode::Literal.code(), c.into()]);
        self
    }

    pub fn range(&mut self, lo: impl Into<u32>, hi: impl Into<u32>) -> &mut Self {
        self.code.extend_from_slice(&[Opcode::Range.code(), lo.into(), hi.into()]);
        self
    }

    /// Range tested against the character and its uppercase form.
    pub fn range_uni_ignore(&mut self, lo: impl Into<u32>, hi: impl Into<u32>) -> &mut Self {
        self.code
            .extend_from_slice(&[Opcode::RangeUniIgnore.code(), lo.into(), hi.into()]);
        self
    }

    pub fn category(&mut self, cat: CategoryCode) -> &mut Self {
        self.code.extend_from_slice(&[Opcode::Category.code(), cat.into()]);
        self
    }

    pub fn negate(&mut self) -> &mut Self {
        self.code.push(Opcode::Negate.code());
        self
    }

    /// 256-bit membership bitmap, bit `c` in word `c / 32`.
    pub fn charset(&mut self, bits: [u32; 8]) -> &mut Self {
        self.code.push(Opcode::Charset.code());
        self.code.extend_from_slice(&bits);
        self
    }

    /// Bitmap of the given characters; those above U+00FF are ignored.
    pub fn charset_from(&mut self, chars: impl IntoIterator<Item = u32>) -> &mut Self {
        let mut bits = [0u32; 8];
        for c in chars.into_iter().filter(|&c| c < 256) {
            bits[c as usize / 32] |= 1 << (c % 32);
        }
        self.charset(bits)
    }

    /// Two-level BMP bitmap; characters above U+FFFF are ignored.
    pub fn bigcharset(&mut self, chars: impl IntoIterator<Item = u32>) -> &mut Self {
        let mut pages = [[0u32; 8]; 256];
        for c in chars.into_iter().filter(|&c| c < 0x10000) {
            let low = (c & 0xff) as usize;
            pages[(c >> 8) as usize][low / 32] |= 1 << (low % 32);
        }

        let mut blocks: Vec<[u32; 8]> = Vec::new();
        let mut index = [0u8; 256];
        for (hi, page) in pages.iter().enumerate() {
            let block = match blocks.iter().position(|b| b == page) {
                Some(i) => i,
                None => {
                    blocks.push(*page);
                    blocks.len() - 1
                }
            };
            index[hi] = block as u8;
        }

        self.code.push(Opcode::BigCharset.code());
        self.code.push(blocks.len() as u32);
        for quad in index.chunks(4) {
            self.code.push(u32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]));
        }
        for block in &blocks {
            self.code.extend_from_slice(block);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::validate;

    fn op(o: Opcode) -> u32 {
        o.code()
    }

    #[test]
    fn branch_layout() {
        let code = ProgramBuilder::new()
            .branch(|alts| {
                alts.alt(|b| {
                    b.literal('a');
                })
                .alt(|b| {
                    b.literal('b');
                });
            })
            .build();
        assert_eq!(
            code,
            vec![
                op(Opcode::Branch),
                5,
                op(Opcode::Literal),
                97,
                op(Opcode::Jump),
                7,
                5,
                op(Opcode::Literal),
                98,
                op(Opcode::Jump),
                2,
                0,
                op(Opcode::Success),
            ]
        );
        assert!(validate(&code, 0));
    }

    #[test]
    fn repeat_layouts_validate() {
        let code = ProgramBuilder::new()
            .repeat(1, MAXREPEAT, |b| {
                b.group(1, |b| {
                    b.literal('x');
                });
            })
            .min_repeat(0, 3, |b| {
                b.literal('y');
            })
            .possessive_repeat(0, MAXREPEAT, |b| {
                b.any();
            })
            .atomic(|b| {
                b.any_all();
            })
            .build();
        assert!(validate(&code, 1));
        assert!(!validate(&code, 0));
    }

    #[test]
    fn conditional_layouts_validate() {
        let code = ProgramBuilder::new()
            .group(1, |b| {
                b.literal('a');
            })
            .groupref_exists(1, |b| {
                b.literal('b');
            })
            .groupref_exists_else(
                1,
                |b| {
                    b.literal('c');
                },
                |b| {
                    b.literal('d').literal('e');
                },
            )
            .build();
        assert!(validate(&code, 1));
    }

    #[test]
    fn overlap_table_matches_kmp() {
        let t = |s: &str| overlap_table(&s.chars().map(u32::from).collect::<Vec<_>>());
        assert_eq!(t("abab"), vec![0, 0, 1, 2]);
        assert_eq!(t("aaa"), vec![0, 1, 2]);
        assert_eq!(t("abcabd"), vec![0, 0, 0, 1, 2, 0]);
    }

    #[test]
    fn info_blocks_validate() {
        let prefix = ['a' as u32, 'b' as u32];
        let code = ProgramBuilder::new()
            .info_prefix(&prefix, 2, true, 2, 2)
            .literal('a')
            .literal('b')
            .build();
        assert_eq!(code[1] as usize, 1 + 3 + 2 + 2 + 2);
        assert!(validate(&code, 0));

        let code = ProgramBuilder::new()
            .info_charset(1, MAXREPEAT, |s| {
                s.range('0', '9');
            })
            .in_set(|s| {
                s.range('0', '9');
            })
            .build();
        assert!(validate(&code, 0));
    }

    #[test]
    fn bigcharset_shares_identical_blocks() {
        let code = ProgramBuilder::new()
            .in_set(|s| {
                s.bigcharset([0x41, 0x3a3]);
            })
            .build();
        // <IN> <skip> <BIGCHARSET> <count> ...
        assert_eq!(code[3], 3);
        assert!(validate(&code, 0));
    }

    #[test]
    fn charset_from_sets_bits() {
        let code = ProgramBuilder::new()
            .in_set(|s| {
                s.charset_from([0, 33, 255, 300]);
            })
            .build();
        assert_eq!(&code[3..11], &[1, 2, 0, 0, 0, 0, 0, 1 << 31]);
    }
}
