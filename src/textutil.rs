use once_cell::sync::Lazy;
use regex::Regex;

use crate::sentinels::PLACEHOLDER_RE;

static LETTER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{L}").expect("letter"));

pub fn strip_placeholders(text: &str) -> String {
    PLACEHOLDER_RE.replace_all(text, " ").into_owned()
}

/// True when nothing but placeholders, digits and punctuation is left.
pub fn is_trivial_placeholder_text(text: &str) -> bool {
    let plain = strip_placeholders(text);
    !LETTER_RE.is_match(plain.trim())
}

/// Writing system expected in output for a target language code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetScript {
    Han,
    Japanese,
    Hangul,
    Cyrillic,
    Greek,
    Arabic,
    Hebrew,
    Thai,
    Latin,
}

impl TargetScript {
    pub fn for_language(lang: &str) -> Self {
        let lang = lang.trim().to_ascii_lowercase();
        let primary = lang.split(['-', '_']).next().unwrap_or_default();
        match primary {
            "zh" | "cn" | "chinese" => TargetScript::Han,
            "ja" | "jp" | "japanese" => TargetScript::Japanese,
            "ko" | "kr" | "korean" => TargetScript::Hangul,
            "ru" | "uk" | "be" | "bg" | "sr" | "mk" | "kk" => TargetScript::Cyrillic,
            "el" => TargetScript::Greek,
            "ar" | "fa" | "ur" => TargetScript::Arabic,
            "he" | "iw" | "yi" => TargetScript::Hebrew,
            "th" => TargetScript::Thai,
            _ => TargetScript::Latin,
        }
    }

    pub fn matches(self, ch: char) -> bool {
        match self {
            TargetScript::Han => is_han(ch),
            TargetScript::Japanese => is_han(ch) || is_jp_kana(ch),
            TargetScript::Hangul => is_hangul(ch),
            TargetScript::Cyrillic => in_ranges(ch, &[(0x0400, 0x04FF), (0x0500, 0x052F)]),
            TargetScript::Greek => in_ranges(ch, &[(0x0370, 0x03FF), (0x1F00, 0x1FFF)]),
            TargetScript::Arabic => in_ranges(ch, &[(0x0600, 0x06FF), (0x0750, 0x077F)]),
            TargetScript::Hebrew => in_ranges(ch, &[(0x0590, 0x05FF)]),
            TargetScript::Thai => in_ranges(ch, &[(0x0E00, 0x0E7F)]),
            TargetScript::Latin => ch.is_alphabetic() && (ch.is_ascii() || in_ranges(ch, &[(0x00C0, 0x024F)])),
        }
    }

    pub fn appears_in(self, text: &str) -> bool {
        text.chars().any(|ch| self.matches(ch))
    }
}

fn in_ranges(ch: char, ranges: &[(u32, u32)]) -> bool {
    let u = ch as u32;
    ranges.iter().any(|(lo, hi)| (*lo..=*hi).contains(&u))
}

fn is_han(ch: char) -> bool {
    in_ranges(
        ch,
        &[
            (0x3400, 0x4DBF),
            (0x4E00, 0x9FFF),
            (0xF900, 0xFAFF),
            (0x20000, 0x2A6DF),
            (0x2A700, 0x2EBEF),
        ],
    )
}

fn is_jp_kana(ch: char) -> bool {
    in_ranges(ch, &[(0x3040, 0x309F), (0x30A0, 0x30FF), (0x31F0, 0x31FF)])
}

fn is_hangul(ch: char) -> bool {
    in_ranges(ch, &[(0xAC00, 0xD7AF), (0x1100, 0x11FF), (0x3130, 0x318F)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trivial_text_has_no_letters_outside_placeholders() {
        assert!(is_trivial_placeholder_text("[P1] 42 [P2]!"));
        assert!(is_trivial_placeholder_text(""));
        assert!(!is_trivial_placeholder_text("[P1] Stone"));
    }

    #[test]
    fn scripts_follow_language_codes() {
        assert_eq!(TargetScript::for_language("zh-CN"), TargetScript::Han);
        assert_eq!(TargetScript::for_language("ko_KR"), TargetScript::Hangul);
        assert_eq!(TargetScript::for_language("de"), TargetScript::Latin);
        assert!(TargetScript::Hangul.appears_in("철 검"));
        assert!(!TargetScript::Hangul.appears_in("Iron Sword"));
        assert!(TargetScript::Japanese.appears_in("鉄の剣"));
        assert!(TargetScript::Latin.appears_in("Épée"));
    }
}
