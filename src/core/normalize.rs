//! Decoding and canonicalisation of fixture files and program output.
//!
//! Fixtures were authored over many years in mixed locales, so the bytes on
//! disk carry no reliable encoding label. [`decode`] walks a fixed rule table
//! ([`DECODE_RULES`]) and the first rule that accepts the bytes wins; the last
//! rule maps bytes one-to-one onto code points, so decoding never fails.
//!
//! [`canonicalize`] then removes formatting noise that legacy fixtures are
//! known to carry. It is idempotent.

use std::cmp::Reverse;

use encoding_rs::{BIG5, Encoding, GB18030, SHIFT_JIS, UTF_16BE, UTF_16LE};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeRule {
    /// UTF-8, UTF-16LE or UTF-16BE announced by a byte-order mark.
    ByteOrderMark,
    /// Seven-bit text without NUL bytes.
    Ascii,
    /// Well-formed UTF-8 with at least one multi-byte sequence.
    Utf8,
    /// GB18030, Big5 and Shift_JIS. Every clean decode with at least one
    /// non-ASCII code point is a candidate; the one with the most characters
    /// from its encoding's common double-byte block wins, ties going to the
    /// earlier encoding. See [`legacy_cjk`].
    LegacyCjk,
    /// UTF-16 without a byte-order mark. Only tried when NUL bytes are present.
    Utf16,
    /// Every byte mapped to the code point of the same value. Never fails.
    Latin1Fallback,
}

pub const DECODE_RULES: [DecodeRule; 6] = [
    DecodeRule::ByteOrderMark,
    DecodeRule::Ascii,
    DecodeRule::Utf8,
    DecodeRule::LegacyCjk,
    DecodeRule::Utf16,
    DecodeRule::Latin1Fallback,
];

type CommonBlock = fn(&[u8]) -> bool;

/// Legacy candidates in priority order, each with the byte range of its
/// everyday repertoire:
///
/// | encoding  | common block                                   |
/// |-----------|------------------------------------------------|
/// | GB18030   | GB2312 rows, lead and trail `A1..=FE`, lead up to `F7` |
/// | Big5      | standard Big5, lead `A1..=F9`                  |
/// | Shift_JIS | JIS X 0208 symbols, kana and level 1 kanji, lead `81..=9F` |
///
/// The same bytes read in a foreign encoding mostly land in extension or
/// user-defined blocks, which do not count. EUC-KR is not a candidate: its
/// Hangul rows coincide byte for byte with GB2312 level 1 hanzi.
fn legacy_cjk() -> [(&'static Encoding, CommonBlock); 3] {
    [
        (GB18030, gb2312_block),
        (BIG5, big5_block),
        (SHIFT_JIS, jis_level1_block),
    ]
}

fn gb2312_block(bytes: &[u8]) -> bool {
    matches!(bytes, [0xA1..=0xF7, 0xA1..=0xFE])
}

fn big5_block(bytes: &[u8]) -> bool {
    matches!(bytes, [0xA1..=0xF9, 0x40..=0x7E | 0xA1..=0xFE])
}

fn jis_level1_block(bytes: &[u8]) -> bool {
    matches!(bytes, [0x81..=0x9F, 0x40..=0x7E | 0x80..=0xFC])
}

/// Non-ASCII characters of `text` that `encoding` writes inside `block`.
fn common_chars(encoding: &'static Encoding, block: CommonBlock, text: &str) -> usize {
    let mut buf = [0u8; 4];
    text.chars()
        .filter(|c| !c.is_ascii())
        .filter(|c| {
            let (bytes, _, _) = encoding.encode(c.encode_utf8(&mut buf));
            block(&bytes)
        })
        .count()
}

/// Full-width characters folded to their half-width form by [`canonicalize`].
pub const FULL_WIDTH_FOLDS: [(char, char); 3] = [('：', ':'), ('；', ';'), ('\u{3000}', ' ')];

const BOM: char = '\u{FEFF}';

pub fn decode(bytes: &[u8]) -> String {
    decode_with_rule(bytes).0
}

/// Decodes `bytes` and reports which rule accepted them.
pub fn decode_with_rule(bytes: &[u8]) -> (String, DecodeRule) {
    for rule in DECODE_RULES {
        if let Some(text) = apply_rule(rule, bytes) {
            return (text, rule);
        }
    }
    (latin1(bytes), DecodeRule::Latin1Fallback)
}

fn apply_rule(rule: DecodeRule, bytes: &[u8]) -> Option<String> {
    match rule {
        DecodeRule::ByteOrderMark => {
            let (encoding, bom_len) = Encoding::for_bom(bytes)?;
            let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
            Some(text.into_owned())
        }
        DecodeRule::Ascii => {
            if bytes.is_ascii() && !bytes.contains(&0) {
                std::str::from_utf8(bytes).ok().map(str::to_string)
            } else {
                None
            }
        }
        DecodeRule::Utf8 => std::str::from_utf8(bytes)
            .ok()
            .filter(|text| !text.is_ascii() && is_plausible(text))
            .map(str::to_string),
        DecodeRule::LegacyCjk => legacy_cjk()
            .into_iter()
            .enumerate()
            .filter_map(|(priority, (encoding, block))| {
                let text = encoding
                    .decode_without_bom_handling_and_without_replacement(bytes)
                    .filter(|text| !text.is_ascii() && is_plausible(text))?;
                let score = common_chars(encoding, block, &text);
                Some((score, Reverse(priority), text.into_owned()))
            })
            .max_by_key(|(score, priority, _)| (*score, *priority))
            .map(|(_, _, text)| text),
        DecodeRule::Utf16 => {
            if bytes.len() % 2 != 0 || !bytes.contains(&0) {
                return None;
            }
            [UTF_16LE, UTF_16BE].into_iter().find_map(|encoding| {
                encoding
                    .decode_without_bom_handling_and_without_replacement(bytes)
                    .filter(|text| is_plausible(text))
                    .map(|text| text.into_owned())
            })
        }
        DecodeRule::Latin1Fallback => Some(latin1(bytes)),
    }
}

/// Rejects text that a wrong decoder typically produces: NUL, C1 controls,
/// private-use code points and replacement characters.
fn is_plausible(text: &str) -> bool {
    !text.chars().any(|c| {
        c == '\0'
            || ('\u{80}'..='\u{9F}').contains(&c)
            || ('\u{E000}'..='\u{F8FF}').contains(&c)
            || c == char::REPLACEMENT_CHARACTER
    })
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Canonical comparison form: no byte-order marks at line starts, `\n` line
/// endings, full-width colon/semicolon/space folded, trailing whitespace
/// trimmed per line, no leading or trailing blank lines.
pub fn canonicalize(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");

    let lines: Vec<String> = unified
        .split('\n')
        .map(|line| {
            let folded: String = line
                .trim_start_matches(BOM)
                .chars()
                .map(fold_full_width)
                .collect();
            folded.trim_end().to_string()
        })
        .collect();

    let first = lines.iter().position(|line| !line.is_empty());
    let last = lines.iter().rposition(|line| !line.is_empty());
    match (first, last) {
        (Some(first), Some(last)) => lines[first..=last].join("\n"),
        _ => String::new(),
    }
}

fn fold_full_width(c: char) -> char {
    FULL_WIDTH_FOLDS
        .iter()
        .find(|(wide, _)| *wide == c)
        .map(|(_, narrow)| *narrow)
        .unwrap_or(c)
}

/// Cuts `text` to at most `max_chars` characters, marking the cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "输入：a[0][1]=5；结束";

    #[test]
    fn test_bom_variants() {
        let mut utf8 = vec![0xEF, 0xBB, 0xBF];
        utf8.extend_from_slice("答案".as_bytes());
        assert_eq!(decode_with_rule(&utf8), ("答案".to_string(), DecodeRule::ByteOrderMark));

        let mut utf16le = vec![0xFF, 0xFE];
        utf16le.extend("ok".encode_utf16().flat_map(|u| u.to_le_bytes()));
        assert_eq!(decode(&utf16le), "ok");

        let mut utf16be = vec![0xFE, 0xFF];
        utf16be.extend("ok".encode_utf16().flat_map(|u| u.to_be_bytes()));
        assert_eq!(decode(&utf16be), "ok");
    }

    #[test]
    fn test_ascii_and_utf8() {
        assert_eq!(decode_with_rule(b"1 2 3\n"), ("1 2 3\n".to_string(), DecodeRule::Ascii));
        assert_eq!(
            decode_with_rule(SAMPLE.as_bytes()),
            (SAMPLE.to_string(), DecodeRule::Utf8)
        );
    }

    #[test]
    fn test_legacy_cjk() {
        let (gbk, _, _) = encoding_rs::GBK.encode(SAMPLE);
        assert_eq!(decode_with_rule(&gbk), (SAMPLE.to_string(), DecodeRule::LegacyCjk));
    }

    #[test]
    fn test_each_legacy_encoding_round_trips() {
        let cases = [
            (encoding_rs::GBK, "结果：a[0]=5；完成"),
            (GB18030, "输出：𠀀 数据"),
            (BIG5, "輸入：結果"),
            (SHIFT_JIS, "こんにちは世界"),
            (SHIFT_JIS, "答え：42"),
        ];
        for (encoding, text) in cases {
            let (bytes, _, unmappable) = encoding.encode(text);
            assert!(!unmappable, "{} cannot encode {:?}", encoding.name(), text);
            assert_eq!(
                decode_with_rule(&bytes),
                (text.to_string(), DecodeRule::LegacyCjk),
                "{}",
                encoding.name()
            );
        }
    }

    #[test]
    fn test_common_block_scoring() {
        let (sjis, _, _) = SHIFT_JIS.encode("こんにちは世界");
        let misread = GB18030
            .decode_without_bom_handling_and_without_replacement(&sjis)
            .unwrap();

        assert_eq!(common_chars(GB18030, gb2312_block, &misread), 0);
        assert_eq!(common_chars(SHIFT_JIS, jis_level1_block, "こんにちは世界"), 7);
    }

    #[test]
    fn test_utf16_without_bom() {
        let bytes: Vec<u8> = "sum=3".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        assert_eq!(decode_with_rule(&bytes), ("sum=3".to_string(), DecodeRule::Utf16));
    }

    #[test]
    fn test_decode_is_total() {
        let samples: Vec<Vec<u8>> = vec![
            vec![],
            vec![0x00],
            vec![0xFF],
            vec![0x80, 0x81, 0x82],
            vec![0xC3],
            (0u8..=255).collect(),
            vec![0xED, 0xA0, 0x80],
        ];
        for bytes in samples {
            let text = decode(&bytes);
            if bytes.is_empty() {
                assert!(text.is_empty());
            }
        }
        assert_eq!(decode(&[0xFF]), "\u{FF}");
    }

    #[test]
    fn test_canonicalize_rules() {
        let raw = "\u{FEFF}\r\n\r\nline one  \r\nkey：value；x\u{3000}\r\n\n \n";
        assert_eq!(canonicalize(raw), "line one\nkey:value;x");
        assert_eq!(canonicalize("a\rb"), "a\nb");
        assert_eq!(canonicalize("\n \n\t\n"), "");
    }

    #[test]
    fn test_canonicalize_is_idempotent() {
        let samples = [
            "",
            "\n\u{FEFF}abc",
            "\n\u{FEFF}\nabc",
            "\u{FEFF}\u{FEFF}x  \r\n",
            "a\u{3000}\u{3000}\nb ：",
            " \u{FEFF}a\r\r\n",
            "\u{FEFF} \n z",
        ];
        for sample in samples {
            let once = canonicalize(sample);
            assert_eq!(canonicalize(&once), once, "sample {:?}", sample);
        }
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("你好世界", 2), "你好...");
        assert_eq!(preview("short", 10), "short");
    }
}
