use once_cell::sync::Lazy;
use regex::Regex;

/// Matches anything shaped like a placeholder token, known or not.
pub static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[P(\d+)\]").expect("placeholder regex"));

pub fn placeholder_token(id: usize) -> String {
    format!("[P{id}]")
}

pub fn placeholder_tokens_in(text: &str) -> Vec<String> {
    if text.is_empty() {
        return vec![];
    }
    PLACEHOLDER_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

#[inline]
pub fn contains_placeholder(text: &str) -> bool {
    PLACEHOLDER_RE.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_found_in_order() {
        let found = placeholder_tokens_in("[P2] then [P10] and [P2]");
        assert_eq!(found, vec!["[P2]", "[P10]", "[P2]"]);
        assert_eq!(placeholder_token(7), "[P7]");
        assert!(!contains_placeholder("[Q1] [P] P1"));
    }
}
