//! Canonical text views matched against the signature tables.

use unicode_normalization::UnicodeNormalization;

/// Invisible characters stripped before matching.
const ZERO_WIDTH: &[char] = &[
    '\u{00AD}', // soft hyphen
    '\u{034F}',
    '\u{061C}',
    '\u{115F}',
    '\u{1160}',
    '\u{17B4}',
    '\u{17B5}',
    '\u{180E}',
    '\u{200B}',
    '\u{200C}',
    '\u{200D}',
    '\u{200E}',
    '\u{200F}',
    '\u{202A}',
    '\u{202B}',
    '\u{202C}',
    '\u{202D}',
    '\u{202E}', // right-to-left override
    '\u{2060}',
    '\u{2061}',
    '\u{2062}',
    '\u{2063}',
    '\u{2064}',
    '\u{2066}',
    '\u{2067}',
    '\u{2068}',
    '\u{2069}',
    '\u{3164}',
    '\u{FEFF}',
    '\u{FFA0}',
];

/// Confusables NFKC leaves alone (Cyrillic, Greek, Latin small capitals).
const HOMOGLYPHS: &[(char, char)] = &[
    ('а', 'a'),
    ('в', 'b'),
    ('с', 'c'),
    ('ԁ', 'd'),
    ('е', 'e'),
    ('һ', 'h'),
    ('і', 'i'),
    ('ј', 'j'),
    ('к', 'k'),
    ('ӏ', 'l'),
    ('м', 'm'),
    ('п', 'n'),
    ('о', 'o'),
    ('р', 'p'),
    ('ԛ', 'q'),
    ('г', 'r'),
    ('ѕ', 's'),
    ('т', 't'),
    ('ц', 'u'),
    ('ѵ', 'v'),
    ('ԝ', 'w'),
    ('х', 'x'),
    ('у', 'y'),
    ('А', 'a'),
    ('В', 'b'),
    ('С', 'c'),
    ('Е', 'e'),
    ('Н', 'h'),
    ('І', 'i'),
    ('Ј', 'j'),
    ('К', 'k'),
    ('М', 'm'),
    ('О', 'o'),
    ('Р', 'p'),
    ('Ѕ', 's'),
    ('Т', 't'),
    ('Х', 'x'),
    ('У', 'y'),
    ('α', 'a'),
    ('ο', 'o'),
    ('ρ', 'p'),
    ('ν', 'v'),
    ('τ', 't'),
    ('ι', 'i'),
    ('κ', 'k'),
    ('Α', 'a'),
    ('Β', 'b'),
    ('Ε', 'e'),
    ('Η', 'h'),
    ('Ι', 'i'),
    ('Κ', 'k'),
    ('Μ', 'm'),
    ('Ν', 'n'),
    ('Ο', 'o'),
    ('Ρ', 'p'),
    ('Τ', 't'),
    ('Χ', 'x'),
    ('Υ', 'y'),
    ('Ζ', 'z'),
    ('ɑ', 'a'),
    ('ɡ', 'g'),
    ('ᴀ', 'a'),
    ('ʙ', 'b'),
    ('ᴄ', 'c'),
    ('ᴅ', 'd'),
    ('ᴇ', 'e'),
    ('ɢ', 'g'),
    ('ʜ', 'h'),
    ('ɪ', 'i'),
    ('ᴊ', 'j'),
    ('ᴋ', 'k'),
    ('ʟ', 'l'),
    ('ᴍ', 'm'),
    ('ɴ', 'n'),
    ('ᴏ', 'o'),
    ('ᴘ', 'p'),
    ('ʀ', 'r'),
    ('ꜱ', 's'),
    ('ᴛ', 't'),
    ('ᴜ', 'u'),
    ('ᴠ', 'v'),
    ('ᴡ', 'w'),
    ('ʏ', 'y'),
    ('ᴢ', 'z'),
];

/// Characters attackers interleave to split tokens (`r''m`, `e\val`, `w^get`).
const SQUEEZE: &[char] = &['\'', '"', '\\', '^', '`'];

fn fold_homoglyph(c: char) -> char {
    HOMOGLYPHS
        .iter()
        .find_map(|&(from, to)| (from == c).then_some(to))
        .unwrap_or(c)
}

/// NFKC plus zero-width removal, case preserved. Decoders run on this view.
#[must_use]
pub fn canonical(text: &str) -> String {
    text.nfkc().filter(|c| !ZERO_WIDTH.contains(c)).collect()
}

/// Canonical text with confusables folded and lower-cased.
#[must_use]
pub fn normalize(text: &str) -> String {
    canonical(text)
        .chars()
        .map(fold_homoglyph)
        .flat_map(char::to_lowercase)
        .collect()
}

/// Normalized text with token-splitting characters removed.
///
/// Returns `None` when nothing was removed so callers skip a duplicate scan.
#[must_use]
pub fn squeeze(normalized: &str) -> Option<String> {
    if !normalized.contains(SQUEEZE) {
        return None;
    }
    Some(normalized.chars().filter(|c| !SQUEEZE.contains(c)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fullwidth_folds_to_ascii() {
        assert_eq!(normalize("ｅｖａｌ（"), "eval(");
    }

    #[test]
    fn cyrillic_lookalikes_fold() {
        assert_eq!(normalize("еvаl(х)"), "eval(x)");
        assert_eq!(normalize("ЅUDO rm"), "sudo rm");
    }

    #[test]
    fn zero_width_removed() {
        assert_eq!(normalize("e\u{200B}v\u{200D}al\u{FEFF}("), "eval(");
        assert_eq!(canonical("A\u{202E}B"), "AB");
    }

    #[test]
    fn canonical_keeps_case() {
        assert_eq!(canonical("ZXZhbCgp"), "ZXZhbCgp");
    }

    #[test]
    fn squeeze_removes_splitters() {
        assert_eq!(squeeze("r''m -rf /").as_deref(), Some("rm -rf /"));
        assert_eq!(squeeze("e\\val(").as_deref(), Some("eval("));
        assert_eq!(squeeze("plain text"), None);
    }
}
