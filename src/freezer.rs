use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

use crate::sentinels::{placeholder_token, PLACEHOLDER_RE};

/// Token -> original substring, in first-encounter order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceholderMap {
    entries: Vec<(String, String)>,
}

impl PlaceholderMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(t, _)| t == token)
            .map(|(_, original)| original.as_str())
    }

    pub fn contains(&self, token: &str) -> bool {
        self.get(token).is_some()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(t, _)| t.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(t, o)| (t.as_str(), o.as_str()))
    }

    fn push(&mut self, original: &str) -> String {
        let token = placeholder_token(self.entries.len() + 1);
        self.entries.push((token.clone(), original.to_string()));
        token
    }
}

impl FromIterator<(String, String)> for PlaceholderMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FreezeResult {
    pub text: String,
    pub placeholders: PlaceholderMap,
    /// Source used literal `\n` escapes; `restore` writes them back.
    pub escaped_newlines: bool,
    /// Source carried its own `\r`; model CRLFs are then kept as-is.
    pub source_has_cr: bool,
}

impl FreezeResult {
    pub fn restore(&self, translated: &str) -> String {
        let out = unfreeze_text(translated, &self.placeholders);
        if !self.escaped_newlines {
            out
        } else if self.source_has_cr {
            out.replace('\n', "\\n")
        } else {
            out.replace("\r\n", "\n").replace('\n', "\\n")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternClass {
    Markup,
    ItemReference,
    BraceSpan,
    FormatCode,
    Printf,
    NamespacedId,
}

/// Higher entries claim their spans first.
pub const PATTERN_PRIORITY: [PatternClass; 6] = [
    PatternClass::Markup,
    PatternClass::ItemReference,
    PatternClass::BraceSpan,
    PatternClass::FormatCode,
    PatternClass::Printf,
    PatternClass::NamespacedId,
];

static MARKUP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"</?[A-Za-z][A-Za-z0-9_:\-]*(?:\s*=\s*[^<>\r\n]*|\s+[^<>\r\n]*)?\s*/?>")
        .expect("markup regex")
});
static ITEM_REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[A-Za-z0-9_#@$.:/\-]+\]").expect("item reference regex"));
static FORMAT_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"§[0-9A-FK-ORXa-fk-orx]").expect("format code regex"));
static PRINTF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"%(?:\d+\$)?[-+#0]*(?:\d+|\*)?(?:\.(?:\d+|\*))?(?:hh|h|ll|l|L|z|j|t)?[diouxXeEfFgGaAcsp%]|%\d+",
    )
    .expect("printf regex")
});
static NAMESPACED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[a-z_][a-z0-9_.\-]*:[a-z0-9_.\-/]*[a-z0-9_/]").expect("namespaced id regex")
});

impl PatternClass {
    fn find_spans(self, text: &str) -> Vec<Range<usize>> {
        let re: &Regex = match self {
            PatternClass::BraceSpan => return balanced_brace_spans(text),
            PatternClass::Markup => &MARKUP_RE,
            PatternClass::ItemReference => &ITEM_REF_RE,
            PatternClass::FormatCode => &FORMAT_CODE_RE,
            PatternClass::Printf => &PRINTF_RE,
            PatternClass::NamespacedId => &NAMESPACED_RE,
        };
        re.find_iter(text).map(|m| m.range()).collect()
    }
}

/// Outermost balanced `{...}` spans. A stray `{` or `}` is plain text and
/// does not hide balanced spans after it.
pub fn balanced_brace_spans(text: &str) -> Vec<Range<usize>> {
    let mut open: Vec<usize> = Vec::new();
    let mut pairs: Vec<Range<usize>> = Vec::new();
    for (i, b) in text.bytes().enumerate() {
        match b {
            b'{' => open.push(i),
            b'}' => {
                if let Some(start) = open.pop() {
                    pairs.push(start..i + 1);
                }
            }
            _ => {}
        }
    }
    pairs.sort_by_key(|r| r.start);

    let mut outer: Vec<Range<usize>> = Vec::new();
    for pair in pairs {
        match outer.last() {
            Some(last) if pair.start < last.end => {}
            _ => outer.push(pair),
        }
    }
    outer
}

fn claim_spans(text: &str) -> Vec<Range<usize>> {
    let mut claimed: Vec<Range<usize>> = Vec::new();
    for class in PATTERN_PRIORITY {
        for span in class.find_spans(text) {
            if span.is_empty() {
                continue;
            }
            let overlaps = claimed
                .iter()
                .any(|c| c.start < span.end && span.start < c.end);
            if !overlaps {
                claimed.push(span);
            }
        }
    }
    claimed.sort_by_key(|r| r.start);
    claimed
}

pub fn freeze_text(text: &str) -> FreezeResult {
    let escaped_newlines = text.contains("\\n") && !text.contains('\n');
    let source_has_cr = text.contains('\r');
    let working = if escaped_newlines {
        text.replace("\\n", "\n")
    } else {
        text.to_string()
    };

    let mut placeholders = PlaceholderMap::new();
    if working.is_empty() {
        return FreezeResult {
            text: working,
            placeholders,
            escaped_newlines,
            source_has_cr,
        };
    }

    let mut out = String::with_capacity(working.len());
    let mut pos = 0usize;
    for span in claim_spans(&working) {
        out.push_str(&working[pos..span.start]);
        out.push_str(&placeholders.push(&working[span.clone()]));
        pos = span.end;
    }
    out.push_str(&working[pos..]);

    FreezeResult {
        text: out,
        placeholders,
        escaped_newlines,
        source_has_cr,
    }
}

pub fn unfreeze_text(text: &str, placeholders: &PlaceholderMap) -> String {
    if placeholders.is_empty() || text.is_empty() {
        return text.to_string();
    }
    PLACEHOLDER_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let tok = &caps[0];
            placeholders.get(tok).unwrap_or(tok).to_string()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn originals(r: &FreezeResult) -> Vec<&str> {
        r.placeholders.iter().map(|(_, o)| o).collect()
    }

    #[test]
    fn freezes_format_codes_and_printf_left_to_right() {
        let r = freeze_text("Hit §aenemy§r for %s damage");
        assert_eq!(r.text, "Hit [P1]enemy[P2] for [P3] damage");
        assert_eq!(originals(&r), vec!["§a", "§r", "%s"]);
        assert_eq!(r.restore(&r.text), "Hit §aenemy§r for %s damage");
    }

    #[test]
    fn nested_braces_become_one_token() {
        let r = freeze_text("Gain {count, plural, one {# point} other {# points}} now");
        assert_eq!(r.text, "Gain [P1] now");
        assert_eq!(r.placeholders.len(), 1);
    }

    #[test]
    fn unbalanced_braces_stay_plain() {
        let r = freeze_text("a { b {c} d");
        assert_eq!(r.text, "a { b [P1] d");
        let r = freeze_text("x } y {");
        assert!(r.placeholders.is_empty());
        assert_eq!(r.text, "x } y {");
    }

    #[test]
    fn higher_class_claims_overlapping_span() {
        let r = freeze_text("<color={tint}>Red</color> [minecraft:stone]");
        assert_eq!(r.text, "[P1]Red[P2] [P3]");
        assert_eq!(originals(&r), vec!["<color={tint}>", "</color>", "[minecraft:stone]"]);
    }

    #[test]
    fn namespaced_ids_and_positional_printf() {
        let r = freeze_text("Drops minecraft:iron_ingot x%1$d.");
        assert_eq!(r.text, "Drops [P1] x[P2].");
        assert_eq!(originals(&r), vec!["minecraft:iron_ingot", "%1$d"]);
    }

    #[test]
    fn duplicates_get_fresh_tokens() {
        let r = freeze_text("%s and %s");
        assert_eq!(r.text, "[P1] and [P2]");
        assert_eq!(originals(&r), vec!["%s", "%s"]);
    }

    #[test]
    fn plain_and_empty_inputs_yield_empty_maps() {
        assert!(freeze_text("").placeholders.is_empty());
        let r = freeze_text("Just 100% sure");
        assert!(r.placeholders.is_empty());
        assert_eq!(r.text, "Just 100% sure");
    }

    #[test]
    fn escaped_newlines_round_trip() {
        let src = r"First line\nSecond §eline";
        let r = freeze_text(src);
        assert!(r.escaped_newlines);
        assert_eq!(r.text, "First line\nSecond [P1]line");
        assert_eq!(r.restore(&r.text), src);
        assert_eq!(r.restore("Eins\nZwei [P1]Zeile"), r"Eins\nZwei §eZeile");
        assert_eq!(r.restore("Eins\r\nZwei"), r"Eins\nZwei");
    }

    #[test]
    fn carriage_returns_before_escapes_are_kept() {
        let src = "line one\r\\nline two §a";
        let r = freeze_text(src);
        assert!(r.escaped_newlines);
        assert!(r.source_has_cr);
        assert_eq!(r.text, "line one\r\nline two [P1]");
        assert_eq!(r.restore(&r.text), src);
    }

    #[test]
    fn real_newlines_disable_unescaping() {
        let src = "a\\nb\nc";
        let r = freeze_text(src);
        assert!(!r.escaped_newlines);
        assert_eq!(r.restore(&r.text), src);
    }

    #[test]
    fn unknown_tokens_survive_unfreeze() {
        let r = freeze_text("§a");
        assert_eq!(unfreeze_text("[P1] [P9]", &r.placeholders), "§a [P9]");
    }
}
