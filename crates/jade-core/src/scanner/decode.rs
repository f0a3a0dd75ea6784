//! Best-effort decoding of embedded base64 and percent-encoded payloads.

use std::fmt;
use std::sync::LazyLock;

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use percent_encoding::percent_decode_str;
use regex::Regex;

static BASE64_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9+/_-]{8,}={0,2}").unwrap());

const LENIENT: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_decode_padding_mode(DecodePaddingMode::Indifferent)
    .with_decode_allow_trailing_bits(true);
const STANDARD: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const URL_SAFE: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Base64,
    Percent,
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base64 => f.write_str("base64"),
            Self::Percent => f.write_str("percent"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub encoding: Encoding,
    pub text: String,
}

const MIN_RUN: usize = 8;
const MIN_READABLE: usize = 4;

/// Lossy text view of decoded bytes, kept only when it is mostly text with a
/// readable stretch. A payload glued behind a few garbage bytes still
/// surfaces; a misaligned decode of an ordinary token does not.
fn readable(bytes: &[u8]) -> Option<String> {
    let text: String = String::from_utf8_lossy(bytes)
        .chars()
        .map(|c| {
            if c.is_control() && !matches!(c, '\n' | '\r' | '\t') {
                char::REPLACEMENT_CHARACTER
            } else {
                c
            }
        })
        .collect();
    let mut total = 0;
    let mut good = 0;
    let mut stretch = 0;
    let mut longest = 0;
    for c in text.chars() {
        total += 1;
        if c != char::REPLACEMENT_CHARACTER {
            good += 1;
        }
        if c.is_whitespace() || c == char::REPLACEMENT_CHARACTER {
            stretch = 0;
        } else {
            stretch += 1;
            longest = longest.max(stretch);
        }
    }
    (longest >= MIN_READABLE && good * 4 >= total * 3).then_some(text)
}

fn decode_base64(run: &str) -> Option<String> {
    let engine = if run.contains(['-', '_']) {
        &URL_SAFE
    } else {
        &STANDARD
    };
    engine.decode(run).ok().and_then(|bytes| readable(&bytes))
}

/// Alignments worth decoding for one run: the run shifted by up to three
/// symbols, then its pieces between path and url-safe separators.
fn alignments(run: &str, limit: usize) -> Vec<&str> {
    let mut out: Vec<&str> = (0..4)
        .filter_map(|offset| run.get(offset..))
        .filter(|view| view.len() >= MIN_RUN)
        .collect();
    if run.contains(['/', '-', '_']) {
        let pieces = run
            .split(['/', '-', '_'])
            .filter(|piece| piece.len() >= MIN_RUN)
            .take(limit);
        for piece in pieces {
            if !out.contains(&piece) {
                out.push(piece);
            }
        }
    }
    out
}

fn push_unique(out: &mut Vec<Decoded>, encoding: Encoding, text: String) {
    if !out.iter().any(|d| d.text == text) {
        out.push(Decoded { encoding, text });
    }
}

/// Decoded views of `text`, at most `limit` encoded runs examined.
///
/// Invalid escapes and misaligned base64 never hide the rest of a payload:
/// percent decoding is lossy and each run is tried at every alignment.
#[must_use]
pub fn decode_candidates(text: &str, limit: usize) -> Vec<Decoded> {
    let mut out = Vec::new();
    let mut examined = 0;

    if text.contains('%') && limit > 0 {
        examined += 1;
        let decoded = percent_decode_str(text).decode_utf8_lossy();
        if decoded != text {
            push_unique(&mut out, Encoding::Percent, decoded.into_owned());
        }
    }

    for run in BASE64_RUN.find_iter(text) {
        if examined >= limit {
            break;
        }
        examined += 1;
        for view in alignments(run.as_str(), limit) {
            if let Some(decoded) = decode_base64(view) {
                push_unique(&mut out, Encoding::Base64, decoded);
            }
        }
    }
    out
}
