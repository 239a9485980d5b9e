// chars.rs - Character classifiers and case folding.
// Plain (ASCII), locale ("C" locale, below 256) and Unicode flavours,
// plus the category dispatch used by CATEGORY set items.

use crate::constants::CategoryCode;

// === ASCII Ctype Table ===
// One byte of flags per code point below 128.

const CT_DIGIT: u8 = 0x01;
const CT_SPACE: u8 = 0x02;
const CT_LOWER: u8 = 0x04;
const CT_UPPER: u8 = 0x08;
const CT_ALNUM: u8 = CT_DIGIT | CT_LOWER | CT_UPPER;

const fn build_ascii_ctype() -> [u8; 128] {
    let mut table = [0u8; 128];
    let mut i = 0;
    while i < 128 {
        let b = i as u8;
        let mut flags = 0;
        if b.is_ascii_digit() {
            flags |= CT_DIGIT;
        }
        // VT (0x0b) counts as space here, unlike u8::is_ascii_whitespace.
        if matches!(b, b' ' | b'\t'..=b'\r') {
            flags |= CT_SPACE;
        }
        if b.is_ascii_lowercase() {
            flags |= CT_LOWER;
        }
        if b.is_ascii_uppercase() {
            flags |= CT_UPPER;
        }
        table[i] = flags;
        i += 1;
    }
    table
}

static ASCII_CTYPE: [u8; 128] = build_ascii_ctype();

#[inline]
fn ascii_has(ch: u32, flags: u8) -> bool {
    ch < 128 && ASCII_CTYPE[ch as usize] & flags != 0
}

// === Plain (ASCII) Classifiers ===

#[inline]
pub fn is_digit(ch: u32) -> bool {
    ascii_has(ch, CT_DIGIT)
}

#[inline]
pub fn is_space(ch: u32) -> bool {
    ascii_has(ch, CT_SPACE)
}

#[inline]
pub fn is_alnum(ch: u32) -> bool {
    ascii_has(ch, CT_ALNUM)
}

#[inline]
pub fn is_word(ch: u32) -> bool {
    is_alnum(ch) || ch == u32::from(b'_')
}

#[inline]
pub fn is_linebreak(ch: u32) -> bool {
    ch == u32::from(b'\n')
}

#[inline]
pub fn lower_ascii(ch: u32) -> u32 {
    if ascii_has(ch, CT_UPPER) {
        ch + 32
    } else {
        ch
    }
}

#[inline]
pub fn upper_ascii(ch: u32) -> u32 {
    if ascii_has(ch, CT_LOWER) {
        ch - 32
    } else {
        ch
    }
}

// === Locale Classifiers ===
// Only defined below 256. The "C" locale classifies exactly like ASCII.

#[inline]
pub fn is_loc_alnum(ch: u32) -> bool {
    ch < 256 && is_alnum(ch)
}

#[inline]
pub fn is_loc_word(ch: u32) -> bool {
    is_loc_alnum(ch) || ch == u32::from(b'_')
}

#[inline]
pub fn lower_locale(ch: u32) -> u32 {
    if ch < 256 {
        lower_ascii(ch)
    } else {
        ch
    }
}

#[inline]
pub fn upper_locale(ch: u32) -> u32 {
    if ch < 256 {
        upper_ascii(ch)
    } else {
        ch
    }
}

/// True if `ch` equals the pattern literal `pattern` under locale folding
/// in either direction.
#[inline]
pub fn char_loc_ignore(pattern: u32, ch: u32) -> bool {
    ch == pattern || lower_locale(ch) == pattern || upper_locale(ch) == pattern
}

// === Unicode Classifiers ===

// General category Nd as inclusive [lo, hi] pairs, sorted (Unicode 14.0).
static DECIMAL_RANGES: &[u32] = &[
    0x0030, 0x0039, 0x0660, 0x0669, 0x06f0, 0x06f9, 0x07c0, 0x07c9,
    0x0966, 0x096f, 0x09e6, 0x09ef, 0x0a66, 0x0a6f, 0x0ae6, 0x0aef,
    0x0b66, 0x0b6f, 0x0be6, 0x0bef, 0x0c66, 0x0c6f, 0x0ce6, 0x0cef,
    0x0d66, 0x0d6f, 0x0de6, 0x0def, 0x0e50, 0x0e59, 0x0ed0, 0x0ed9,
    0x0f20, 0x0f29, 0x1040, 0x1049, 0x1090, 0x1099, 0x17e0, 0x17e9,
    0x1810, 0x1819, 0x1946, 0x194f, 0x19d0, 0x19d9, 0x1a80, 0x1a89,
    0x1a90, 0x1a99, 0x1b50, 0x1b59, 0x1bb0, 0x1bb9, 0x1c40, 0x1c49,
    0x1c50, 0x1c59, 0xa620, 0xa629, 0xa8d0, 0xa8d9, 0xa900, 0xa909,
    0xa9d0, 0xa9d9, 0xa9f0, 0xa9f9, 0xaa50, 0xaa59, 0xabf0, 0xabf9,
    0xff10, 0xff19, 0x104a0, 0x104a9, 0x10d30, 0x10d39, 0x11066, 0x1106f,
    0x110f0, 0x110f9, 0x11136, 0x1113f, 0x111d0, 0x111d9, 0x112f0, 0x112f9,
    0x11450, 0x11459, 0x114d0, 0x114d9, 0x11650, 0x11659, 0x116c0, 0x116c9,
    0x11730, 0x11739, 0x118e0, 0x118e9, 0x11950, 0x11959, 0x11c50, 0x11c59,
    0x11d50, 0x11d59, 0x11da0, 0x11da9, 0x16a60, 0x16a69, 0x16ac0, 0x16ac9,
    0x16b50, 0x16b59, 0x1d7ce, 0x1d7ff, 0x1e140, 0x1e149, 0x1e2f0, 0x1e2f9,
    0x1e950, 0x1e959, 0x1fbf0, 0x1fbf9,
];

// Letters (L*) and numbers with a numeric type, from U+0080 up
// (Unicode 14.0). Combining marks never count, even when alphabetic.
static ALNUM_RANGES: &[u32] = &[
    0x00aa, 0x00aa, 0x00b2, 0x00b3, 0x00b5, 0x00b5, 0x00b9, 0x00ba,
    0x00bc, 0x00be, 0x00c0, 0x00d6, 0x00d8, 0x00f6, 0x00f8, 0x02c1,
    0x02c6, 0x02d1, 0x02e0, 0x02e4, 0x02ec, 0x02ec, 0x02ee, 0x02ee,
    0x0370, 0x0374, 0x0376, 0x0377, 0x037a, 0x037d, 0x037f, 0x037f,
    0x0386, 0x0386, 0x0388, 0x038a, 0x038c, 0x038c, 0x038e, 0x03a1,
    0x03a3, 0x03f5, 0x03f7, 0x0481, 0x048a, 0x052f, 0x0531, 0x0556,
    0x0559, 0x0559, 0x0560, 0x0588, 0x05d0, 0x05ea, 0x05ef, 0x05f2,
    0x0620, 0x064a, 0x0660, 0x0669, 0x066e, 0x066f, 0x0671, 0x06d3,
    0x06d5, 0x06d5, 0x06e5, 0x06e6, 0x06ee, 0x06fc, 0x06ff, 0x06ff,
    0x0710, 0x0710, 0x0712, 0x072f, 0x074d, 0x07a5, 0x07b1, 0x07b1,
    0x07c0, 0x07ea, 0x07f4, 0x07f5, 0x07fa, 0x07fa, 0x0800, 0x0815,
    0x081a, 0x081a, 0x0824, 0x0824, 0x0828, 0x0828, 0x0840, 0x0858,
    0x0860, 0x086a, 0x0870, 0x0887, 0x0889, 0x088e, 0x08a0, 0x08c9,
    0x0904, 0x0939, 0x093d, 0x093d, 0x0950, 0x0950, 0x0958, 0x0961,
    0x0966, 0x096f, 0x0971, 0x0980, 0x0985, 0x098c, 0x098f, 0x0990,
    0x0993, 0x09a8, 0x09aa, 0x09b0, 0x09b2, 0x09b2, 0x09b6, 0x09b9,
    0x09bd, 0x09bd, 0x09ce, 0x09ce, 0x09dc, 0x09dd, 0x09df, 0x09e1,
    0x09e6, 0x09f1, 0x09f4, 0x09f9, 0x09fc, 0x09fc, 0x0a05, 0x0a0a,
    0x0a0f, 0x0a10, 0x0a13, 0x0a28, 0x0a2a, 0x0a30, 0x0a32, 0x0a33,
    0x0a35, 0x0a36, 0x0a38, 0x0a39, 0x0a59, 0x0a5c, 0x0a5e, 0x0a5e,
    0x0a66, 0x0a6f, 0x0a72, 0x0a74, 0x0a85, 0x0a8d, 0x0a8f, 0x0a91,
    0x0a93, 0x0aa8, 0x0aaa, 0x0ab0, 0x0ab2, 0x0ab3, 0x0ab5, 0x0ab9,
    0x0abd, 0x0abd, 0x0ad0, 0x0ad0, 0x0ae0, 0x0ae1, 0x0ae6, 0x0aef,
    0x0af9, 0x0af9, 0x0b05, 0x0b0c, 0x0b0f, 0x0b10, 0x0b13, 0x0b28,
    0x0b2a, 0x0b30, 0x0b32, 0x0b33, 0x0b35, 0x0b39, 0x0b3d, 0x0b3d,
    0x0b5c, 0x0b5d, 0x0b5f, 0x0b61, 0x0b66, 0x0b6f, 0x0b71, 0x0b77,
    0x0b83, 0x0b83, 0x0b85, 0x0b8a, 0x0b8e, 0x0b90, 0x0b92, 0x0b95,
    0x0b99, 0x0b9a, 0x0b9c, 0x0b9c, 0x0b9e, 0x0b9f, 0x0ba3, 0x0ba4,
    0x0ba8, 0x0baa, 0x0bae, 0x0bb9, 0x0bd0, 0x0bd0, 0x0be6, 0x0bf2,
    0x0c05, 0x0c0c, 0x0c0e, 0x0c10, 0x0c12, 0x0c28, 0x0c2a, 0x0c39,
    0x0c3d, 0x0c3d, 0x0c58, 0x0c5a, 0x0c5d, 0x0c5d, 0x0c60, 0x0c61,
    0x0c66, 0x0c6f, 0x0c78, 0x0c7e, 0x0c80, 0x0c80, 0x0c85, 0x0c8c,
    0x0c8e, 0x0c90, 0x0c92, 0x0ca8, 0x0caa, 0x0cb3, 0x0cb5, 0x0cb9,
    0x0cbd, 0x0cbd, 0x0cdd, 0x0cde, 0x0ce0, 0x0ce1, 0x0ce6, 0x0cef,
    0x0cf1, 0x0cf2, 0x0d04, 0x0d0c, 0x0d0e, 0x0d10, 0x0d12, 0x0d3a,
    0x0d3d, 0x0d3d, 0x0d4e, 0x0d4e, 0x0d54, 0x0d56, 0x0d58, 0x0d61,
    0x0d66, 0x0d78, 0x0d7a, 0x0d7f, 0x0d85, 0x0d96, 0x0d9a, 0x0db1,
    0x0db3, 0x0dbb, 0x0dbd, 0x0dbd, 0x0dc0, 0x0dc6, 0x0de6, 0x0def,
    0x0e01, 0x0e30, 0x0e32, 0x0e33, 0x0e40, 0x0e46, 0x0e50, 0x0e59,
    0x0e81, 0x0e82, 0x0e84, 0x0e84, 0x0e86, 0x0e8a, 0x0e8c, 0x0ea3,
    0x0ea5, 0x0ea5, 0x0ea7, 0x0eb0, 0x0eb2, 0x0eb3, 0x0ebd, 0x0ebd,
    0x0ec0, 0x0ec4, 0x0ec6, 0x0ec6, 0x0ed0, 0x0ed9, 0x0edc, 0x0edf,
    0x0f00, 0x0f00, 0x0f20, 0x0f33, 0x0f40, 0x0f47, 0x0f49, 0x0f6c,
    0x0f88, 0x0f8c, 0x1000, 0x102a, 0x103f, 0x1049, 0x1050, 0x1055,
    0x105a, 0x105d, 0x1061, 0x1061, 0x1065, 0x1066, 0x106e, 0x1070,
    0x1075, 0x1081, 0x108e, 0x108e, 0x1090, 0x1099, 0x10a0, 0x10c5,
    0x10c7, 0x10c7, 0x10cd, 0x10cd, 0x10d0, 0x10fa, 0x10fc, 0x1248,
    0x124a, 0x124d, 0x1250, 0x1256, 0x1258, 0x1258, 0x125a, 0x125d,
    0x1260, 0x1288, 0x128a, 0x128d, 0x1290, 0x12b0, 0x12b2, 0x12b5,
    0x12b8, 0x12be, 0x12c0, 0x12c0, 0x12c2, 0x12c5, 0x12c8, 0x12d6,
    0x12d8, 0x1310, 0x1312, 0x1315, 0x1318, 0x135a, 0x1369, 0x137c,
    0x1380, 0x138f, 0x13a0, 0x13f5, 0x13f8, 0x13fd, 0x1401, 0x166c,
    0x166f, 0x167f, 0x1681, 0x169a, 0x16a0, 0x16ea, 0x16ee, 0x16f8,
    0x1700, 0x1711, 0x171f, 0x1731, 0x1740, 0x1751, 0x1760, 0x176c,
    0x176e, 0x1770, 0x1780, 0x17b3, 0x17d7, 0x17d7, 0x17dc, 0x17dc,
    0x17e0, 0x17e9, 0x17f0, 0x17f9, 0x1810, 0x1819, 0x1820, 0x1878,
    0x1880, 0x1884, 0x1887, 0x18a8, 0x18aa, 0x18aa, 0x18b0, 0x18f5,
    0x1900, 0x191e, 0x1946, 0x196d, 0x1970, 0x1974, 0x1980, 0x19ab,
    0x19b0, 0x19c9, 0x19d0, 0x19da, 0x1a00, 0x1a16, 0x1a20, 0x1a54,
    0x1a80, 0x1a89, 0x1a90, 0x1a99, 0x1aa7, 0x1aa7, 0x1b05, 0x1b33,
    0x1b45, 0x1b4c, 0x1b50, 0x1b59, 0x1b83, 0x1ba0, 0x1bae, 0x1be5,
    0x1c00, 0x1c23, 0x1c40, 0x1c49, 0x1c4d, 0x1c7d, 0x1c80, 0x1c88,
    0x1c90, 0x1cba, 0x1cbd, 0x1cbf, 0x1ce9, 0x1cec, 0x1cee, 0x1cf3,
    0x1cf5, 0x1cf6, 0x1cfa, 0x1cfa, 0x1d00, 0x1dbf, 0x1e00, 0x1f15,
    0x1f18, 0x1f1d, 0x1f20, 0x1f45, 0x1f48, 0x1f4d, 0x1f50, 0x1f57,
    0x1f59, 0x1f59, 0x1f5b, 0x1f5b, 0x1f5d, 0x1f5d, 0x1f5f, 0x1f7d,
    0x1f80, 0x1fb4, 0x1fb6, 0x1fbc, 0x1fbe, 0x1fbe, 0x1fc2, 0x1fc4,
    0x1fc6, 0x1fcc, 0x1fd0, 0x1fd3, 0x1fd6, 0x1fdb, 0x1fe0, 0x1fec,
    0x1ff2, 0x1ff4, 0x1ff6, 0x1ffc, 0x2070, 0x2071, 0x2074, 0x2079,
    0x207f, 0x2089, 0x2090, 0x209c, 0x2102, 0x2102, 0x2107, 0x2107,
    0x210a, 0x2113, 0x2115, 0x2115, 0x2119, 0x211d, 0x2124, 0x2124,
    0x2126, 0x2126, 0x2128, 0x2128, 0x212a, 0x212d, 0x212f, 0x2139,
    0x213c, 0x213f, 0x2145, 0x2149, 0x214e, 0x214e, 0x2150, 0x2189,
    0x2460, 0x249b, 0x24ea, 0x24ff, 0x2776, 0x2793, 0x2c00, 0x2ce4,
    0x2ceb, 0x2cee, 0x2cf2, 0x2cf3, 0x2cfd, 0x2cfd, 0x2d00, 0x2d25,
    0x2d27, 0x2d27, 0x2d2d, 0x2d2d, 0x2d30, 0x2d67, 0x2d6f, 0x2d6f,
    0x2d80, 0x2d96, 0x2da0, 0x2da6, 0x2da8, 0x2dae, 0x2db0, 0x2db6,
    0x2db8, 0x2dbe, 0x2dc0, 0x2dc6, 0x2dc8, 0x2dce, 0x2dd0, 0x2dd6,
    0x2dd8, 0x2dde, 0x2e2f, 0x2e2f, 0x3005, 0x3007, 0x3021, 0x3029,
    0x3031, 0x3035, 0x3038, 0x303c, 0x3041, 0x3096, 0x309d, 0x309f,
    0x30a1, 0x30fa, 0x30fc, 0x30ff, 0x3105, 0x312f, 0x3131, 0x318e,
    0x3192, 0x3195, 0x31a0, 0x31bf, 0x31f0, 0x31ff, 0x3220, 0x3229,
    0x3248, 0x324f, 0x3251, 0x325f, 0x3280, 0x3289, 0x32b1, 0x32bf,
    0x3400, 0x4dbf, 0x4e00, 0xa48c, 0xa4d0, 0xa4fd, 0xa500, 0xa60c,
    0xa610, 0xa62b, 0xa640, 0xa66e, 0xa67f, 0xa69d, 0xa6a0, 0xa6ef,
    0xa717, 0xa71f, 0xa722, 0xa788, 0xa78b, 0xa7ca, 0xa7d0, 0xa7d1,
    0xa7d3, 0xa7d3, 0xa7d5, 0xa7d9, 0xa7f2, 0xa801, 0xa803, 0xa805,
    0xa807, 0xa80a, 0xa80c, 0xa822, 0xa830, 0xa835, 0xa840, 0xa873,
    0xa882, 0xa8b3, 0xa8d0, 0xa8d9, 0xa8f2, 0xa8f7, 0xa8fb, 0xa8fb,
    0xa8fd, 0xa8fe, 0xa900, 0xa925, 0xa930, 0xa946, 0xa960, 0xa97c,
    0xa984, 0xa9b2, 0xa9cf, 0xa9d9, 0xa9e0, 0xa9e4, 0xa9e6, 0xa9fe,
    0xaa00, 0xaa28, 0xaa40, 0xaa42, 0xaa44, 0xaa4b, 0xaa50, 0xaa59,
    0xaa60, 0xaa76, 0xaa7a, 0xaa7a, 0xaa7e, 0xaaaf, 0xaab1, 0xaab1,
    0xaab5, 0xaab6, 0xaab9, 0xaabd, 0xaac0, 0xaac0, 0xaac2, 0xaac2,
    0xaadb, 0xaadd, 0xaae0, 0xaaea, 0xaaf2, 0xaaf4, 0xab01, 0xab06,
    0xab09, 0xab0e, 0xab11, 0xab16, 0xab20, 0xab26, 0xab28, 0xab2e,
    0xab30, 0xab5a, 0xab5c, 0xab69, 0xab70, 0xabe2, 0xabf0, 0xabf9,
    0xac00, 0xd7a3, 0xd7b0, 0xd7c6, 0xd7cb, 0xd7fb, 0xf900, 0xfa6d,
    0xfa70, 0xfad9, 0xfb00, 0xfb06, 0xfb13, 0xfb17, 0xfb1d, 0xfb1d,
    0xfb1f, 0xfb28, 0xfb2a, 0xfb36, 0xfb38, 0xfb3c, 0xfb3e, 0xfb3e,
    0xfb40, 0xfb41, 0xfb43, 0xfb44, 0xfb46, 0xfbb1, 0xfbd3, 0xfd3d,
    0xfd50, 0xfd8f, 0xfd92, 0xfdc7, 0xfdf0, 0xfdfb, 0xfe70, 0xfe74,
    0xfe76, 0xfefc, 0xff10, 0xff19, 0xff21, 0xff3a, 0xff41, 0xff5a,
    0xff66, 0xffbe, 0xffc2, 0xffc7, 0xffca, 0xffcf, 0xffd2, 0xffd7,
    0xffda, 0xffdc, 0x10000, 0x1000b, 0x1000d, 0x10026, 0x10028, 0x1003a,
    0x1003c, 0x1003d, 0x1003f, 0x1004d, 0x10050, 0x1005d, 0x10080, 0x100fa,
    0x10107, 0x10133, 0x10140, 0x10178, 0x1018a, 0x1018b, 0x10280, 0x1029c,
    0x102a0, 0x102d0, 0x102e1, 0x102fb, 0x10300, 0x10323, 0x1032d, 0x1034a,
    0x10350, 0x10375, 0x10380, 0x1039d, 0x103a0, 0x103c3, 0x103c8, 0x103cf,
    0x103d1, 0x103d5, 0x10400, 0x1049d, 0x104a0, 0x104a9, 0x104b0, 0x104d3,
    0x104d8, 0x104fb, 0x10500, 0x10527, 0x10530, 0x10563, 0x10570, 0x1057a,
    0x1057c, 0x1058a, 0x1058c, 0x10592, 0x10594, 0x10595, 0x10597, 0x105a1,
    0x105a3, 0x105b1, 0x105b3, 0x105b9, 0x105bb, 0x105bc, 0x10600, 0x10736,
    0x10740, 0x10755, 0x10760, 0x10767, 0x10780, 0x10785, 0x10787, 0x107b0,
    0x107b2, 0x107ba, 0x10800, 0x10805, 0x10808, 0x10808, 0x1080a, 0x10835,
    0x10837, 0x10838, 0x1083c, 0x1083c, 0x1083f, 0x10855, 0x10858, 0x10876,
    0x10879, 0x1089e, 0x108a7, 0x108af, 0x108e0, 0x108f2, 0x108f4, 0x108f5,
    0x108fb, 0x1091b, 0x10920, 0x10939, 0x10980, 0x109b7, 0x109bc, 0x109cf,
    0x109d2, 0x10a00, 0x10a10, 0x10a13, 0x10a15, 0x10a17, 0x10a19, 0x10a35,
    0x10a40, 0x10a48, 0x10a60, 0x10a7e, 0x10a80, 0x10a9f, 0x10ac0, 0x10ac7,
    0x10ac9, 0x10ae4, 0x10aeb, 0x10aef, 0x10b00, 0x10b35, 0x10b40, 0x10b55,
    0x10b58, 0x10b72, 0x10b78, 0x10b91, 0x10ba9, 0x10baf, 0x10c00, 0x10c48,
    0x10c80, 0x10cb2, 0x10cc0, 0x10cf2, 0x10cfa, 0x10d23, 0x10d30, 0x10d39,
    0x10e60, 0x10e7e, 0x10e80, 0x10ea9, 0x10eb0, 0x10eb1, 0x10f00, 0x10f27,
    0x10f30, 0x10f45, 0x10f51, 0x10f54, 0x10f70, 0x10f81, 0x10fb0, 0x10fcb,
    0x10fe0, 0x10ff6, 0x11003, 0x11037, 0x11052, 0x1106f, 0x11071, 0x11072,
    0x11075, 0x11075, 0x11083, 0x110af, 0x110d0, 0x110e8, 0x110f0, 0x110f9,
    0x11103, 0x11126, 0x11136, 0x1113f, 0x11144, 0x11144, 0x11147, 0x11147,
    0x11150, 0x11172, 0x11176, 0x11176, 0x11183, 0x111b2, 0x111c1, 0x111c4,
    0x111d0, 0x111da, 0x111dc, 0x111dc, 0x111e1, 0x111f4, 0x11200, 0x11211,
    0x11213, 0x1122b, 0x11280, 0x11286, 0x11288, 0x11288, 0x1128a, 0x1128d,
    0x1128f, 0x1129d, 0x1129f, 0x112a8, 0x112b0, 0x112de, 0x112f0, 0x112f9,
    0x11305, 0x1130c, 0x1130f, 0x11310, 0x11313, 0x11328, 0x1132a, 0x11330,
    0x11332, 0x11333, 0x11335, 0x11339, 0x1133d, 0x1133d, 0x11350, 0x11350,
    0x1135d, 0x11361, 0x11400, 0x11434, 0x11447, 0x1144a, 0x11450, 0x11459,
    0x1145f, 0x11461, 0x11480, 0x114af, 0x114c4, 0x114c5, 0x114c7, 0x114c7,
    0x114d0, 0x114d9, 0x11580, 0x115ae, 0x115d8, 0x115db, 0x11600, 0x1162f,
    0x11644, 0x11644, 0x11650, 0x11659, 0x11680, 0x116aa, 0x116b8, 0x116b8,
    0x116c0, 0x116c9, 0x11700, 0x1171a, 0x11730, 0x1173b, 0x11740, 0x11746,
    0x11800, 0x1182b, 0x118a0, 0x118f2, 0x118ff, 0x11906, 0x11909, 0x11909,
    0x1190c, 0x11913, 0x11915, 0x11916, 0x11918, 0x1192f, 0x1193f, 0x1193f,
    0x11941, 0x11941, 0x11950, 0x11959, 0x119a0, 0x119a7, 0x119aa, 0x119d0,
    0x119e1, 0x119e1, 0x119e3, 0x119e3, 0x11a00, 0x11a00, 0x11a0b, 0x11a32,
    0x11a3a, 0x11a3a, 0x11a50, 0x11a50, 0x11a5c, 0x11a89, 0x11a9d, 0x11a9d,
    0x11ab0, 0x11af8, 0x11c00, 0x11c08, 0x11c0a, 0x11c2e, 0x11c40, 0x11c40,
    0x11c50, 0x11c6c, 0x11c72, 0x11c8f, 0x11d00, 0x11d06, 0x11d08, 0x11d09,
    0x11d0b, 0x11d30, 0x11d46, 0x11d46, 0x11d50, 0x11d59, 0x11d60, 0x11d65,
    0x11d67, 0x11d68, 0x11d6a, 0x11d89, 0x11d98, 0x11d98, 0x11da0, 0x11da9,
    0x11ee0, 0x11ef2, 0x11fb0, 0x11fb0, 0x11fc0, 0x11fd4, 0x12000, 0x12399,
    0x12400, 0x1246e, 0x12480, 0x12543, 0x12f90, 0x12ff0, 0x13000, 0x1342e,
    0x14400, 0x14646, 0x16800, 0x16a38, 0x16a40, 0x16a5e, 0x16a60, 0x16a69,
    0x16a70, 0x16abe, 0x16ac0, 0x16ac9, 0x16ad0, 0x16aed, 0x16b00, 0x16b2f,
    0x16b40, 0x16b43, 0x16b50, 0x16b59, 0x16b5b, 0x16b61, 0x16b63, 0x16b77,
    0x16b7d, 0x16b8f, 0x16e40, 0x16e96, 0x16f00, 0x16f4a, 0x16f50, 0x16f50,
    0x16f93, 0x16f9f, 0x16fe0, 0x16fe1, 0x16fe3, 0x16fe3, 0x17000, 0x187f7,
    0x18800, 0x18cd5, 0x18d00, 0x18d08, 0x1aff0, 0x1aff3, 0x1aff5, 0x1affb,
    0x1affd, 0x1affe, 0x1b000, 0x1b122, 0x1b150, 0x1b152, 0x1b164, 0x1b167,
    0x1b170, 0x1b2fb, 0x1bc00, 0x1bc6a, 0x1bc70, 0x1bc7c, 0x1bc80, 0x1bc88,
    0x1bc90, 0x1bc99, 0x1d2e0, 0x1d2f3, 0x1d360, 0x1d378, 0x1d400, 0x1d454,
    0x1d456, 0x1d49c, 0x1d49e, 0x1d49f, 0x1d4a2, 0x1d4a2, 0x1d4a5, 0x1d4a6,
    0x1d4a9, 0x1d4ac, 0x1d4ae, 0x1d4b9, 0x1d4bb, 0x1d4bb, 0x1d4bd, 0x1d4c3,
    0x1d4c5, 0x1d505, 0x1d507, 0x1d50a, 0x1d50d, 0x1d514, 0x1d516, 0x1d51c,
    0x1d51e, 0x1d539, 0x1d53b, 0x1d53e, 0x1d540, 0x1d544, 0x1d546, 0x1d546,
    0x1d54a, 0x1d550, 0x1d552, 0x1d6a5, 0x1d6a8, 0x1d6c0, 0x1d6c2, 0x1d6da,
    0x1d6dc, 0x1d6fa, 0x1d6fc, 0x1d714, 0x1d716, 0x1d734, 0x1d736, 0x1d74e,
    0x1d750, 0x1d76e, 0x1d770, 0x1d788, 0x1d78a, 0x1d7a8, 0x1d7aa, 0x1d7c2,
    0x1d7c4, 0x1d7cb, 0x1d7ce, 0x1d7ff, 0x1df00, 0x1df1e, 0x1e100, 0x1e12c,
    0x1e137, 0x1e13d, 0x1e140, 0x1e149, 0x1e14e, 0x1e14e, 0x1e290, 0x1e2ad,
    0x1e2c0, 0x1e2eb, 0x1e2f0, 0x1e2f9, 0x1e7e0, 0x1e7e6, 0x1e7e8, 0x1e7eb,
    0x1e7ed, 0x1e7ee, 0x1e7f0, 0x1e7fe, 0x1e800, 0x1e8c4, 0x1e8c7, 0x1e8cf,
    0x1e900, 0x1e943, 0x1e94b, 0x1e94b, 0x1e950, 0x1e959, 0x1ec71, 0x1ecab,
    0x1ecad, 0x1ecaf, 0x1ecb1, 0x1ecb4, 0x1ed01, 0x1ed2d, 0x1ed2f, 0x1ed3d,
    0x1ee00, 0x1ee03, 0x1ee05, 0x1ee1f, 0x1ee21, 0x1ee22, 0x1ee24, 0x1ee24,
    0x1ee27, 0x1ee27, 0x1ee29, 0x1ee32, 0x1ee34, 0x1ee37, 0x1ee39, 0x1ee39,
    0x1ee3b, 0x1ee3b, 0x1ee42, 0x1ee42, 0x1ee47, 0x1ee47, 0x1ee49, 0x1ee49,
    0x1ee4b, 0x1ee4b, 0x1ee4d, 0x1ee4f, 0x1ee51, 0x1ee52, 0x1ee54, 0x1ee54,
    0x1ee57, 0x1ee57, 0x1ee59, 0x1ee59, 0x1ee5b, 0x1ee5b, 0x1ee5d, 0x1ee5d,
    0x1ee5f, 0x1ee5f, 0x1ee61, 0x1ee62, 0x1ee64, 0x1ee64, 0x1ee67, 0x1ee6a,
    0x1ee6c, 0x1ee72, 0x1ee74, 0x1ee77, 0x1ee79, 0x1ee7c, 0x1ee7e, 0x1ee7e,
    0x1ee80, 0x1ee89, 0x1ee8b, 0x1ee9b, 0x1eea1, 0x1eea3, 0x1eea5, 0x1eea9,
    0x1eeab, 0x1eebb, 0x1f100, 0x1f10c, 0x1fbf0, 0x1fbf9, 0x20000, 0x2a6df,
    0x2a700, 0x2b738, 0x2b740, 0x2b81d, 0x2b820, 0x2cea1, 0x2ceb0, 0x2ebe0,
    0x2f800, 0x2fa1d, 0x30000, 0x3134a,
];

fn in_ranges(ranges: &[u32], code: u32) -> bool {
    // Binary search on code range pairs
    let n = ranges.len() / 2;
    let mut low = 0usize;
    let mut high = n;
    while low < high {
        let mid = (low + high) / 2;
        if code > ranges[mid * 2 + 1] {
            low = mid + 1;
        } else {
            high = mid;
        }
    }
    low < n && code >= ranges[low * 2]
}

#[inline]
pub fn is_uni_digit(ch: u32) -> bool {
    if ch < 128 {
        return is_digit(ch);
    }
    in_ranges(DECIMAL_RANGES, ch)
}

#[inline]
pub fn is_uni_space(ch: u32) -> bool {
    if ch < 128 {
        return is_space(ch) || (0x1c..=0x1f).contains(&ch);
    }
    char::from_u32(ch).is_some_and(char::is_whitespace)
}

#[inline]
pub fn is_uni_linebreak(ch: u32) -> bool {
    matches!(
        ch,
        0x0a | 0x0b | 0x0c | 0x0d | 0x1c | 0x1d | 0x1e | 0x85 | 0x2028 | 0x2029
    )
}

#[inline]
pub fn is_uni_alnum(ch: u32) -> bool {
    if ch < 128 {
        return is_alnum(ch);
    }
    in_ranges(ALNUM_RANGES, ch)
}

#[inline]
pub fn is_uni_word(ch: u32) -> bool {
    is_uni_alnum(ch) || ch == u32::from(b'_')
}

/// Simple lowercase mapping. A multi-character expansion keeps its
/// first character (U+0130 folds to `i`).
pub fn lower_unicode(ch: u32) -> u32 {
    if ch < 128 {
        return lower_ascii(ch);
    }
    match char::from_u32(ch) {
        Some(c) => c.to_lowercase().next().map_or(ch, u32::from),
        None => ch,
    }
}

// Simple uppercase mappings of the characters whose full uppercase form
// expands: [lo, hi, delta]. Every other expanding character has no simple
// mapping.
static EXPANDING_UPPER: &[(u32, u32, u32)] = &[
    (0x1f80, 0x1f87, 8),
    (0x1f90, 0x1f97, 8),
    (0x1fa0, 0x1fa7, 8),
    (0x1fb3, 0x1fb3, 9),
    (0x1fc3, 0x1fc3, 9),
    (0x1ff3, 0x1ff3, 9),
];

/// Simple uppercase mapping.
pub fn upper_unicode(ch: u32) -> u32 {
    if ch < 128 {
        return upper_ascii(ch);
    }
    let Some(c) = char::from_u32(ch) else {
        return ch;
    };
    let mut upper = c.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(u), None) => u32::from(u),
        _ => EXPANDING_UPPER
            .iter()
            .find(|&&(lo, hi, _)| (lo..=hi).contains(&ch))
            .map_or(ch, |&(_, _, delta)| ch + delta),
    }
}

// === Category Dispatch ===

/// Test `ch` against a CATEGORY operand. Unknown tags never match.
pub fn category(tag: u32, ch: u32) -> bool {
    let Some(cat) = CategoryCode::from_code(tag) else {
        return false;
    };
    match cat {
        CategoryCode::Digit => is_digit(ch),
        CategoryCode::NotDigit => !is_digit(ch),
        CategoryCode::Space => is_space(ch),
        CategoryCode::NotSpace => !is_space(ch),
        CategoryCode::Word => is_word(ch),
        CategoryCode::NotWord => !is_word(ch),
        CategoryCode::Linebreak => is_linebreak(ch),
        CategoryCode::NotLinebreak => !is_linebreak(ch),
        CategoryCode::LocWord => is_loc_word(ch),
        CategoryCode::LocNotWord => !is_loc_word(ch),
        CategoryCode::UniDigit => is_uni_digit(ch),
        CategoryCode::UniNotDigit => !is_uni_digit(ch),
        CategoryCode::UniSpace => is_uni_space(ch),
        CategoryCode::UniNotSpace => !is_uni_space(ch),
        CategoryCode::UniWord => is_uni_word(ch),
        CategoryCode::UniNotWord => !is_uni_word(ch),
        CategoryCode::UniLinebreak => is_uni_linebreak(ch),
        CategoryCode::UniNotLinebreak => !is_uni_linebreak(ch),
    }
}
