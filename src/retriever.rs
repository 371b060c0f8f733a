use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::terminology::{DictionarySnapshot, TermEntry};
use crate::textutil::strip_placeholders;

pub const MAX_CONTEXT_ENTRIES: usize = 8;
pub const MAX_EXACT_MATCHES: usize = 16;

const K1: f64 = 1.2;
const B: f64 = 0.75;
const MIN_WORD_CHARS: usize = 4;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z]+(?:'s)?").expect("word regex"));
static TERM_WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{L}+").expect("term word regex"));

fn singular(word: &str) -> Option<&str> {
    let stem = word
        .strip_suffix("'s")
        .or_else(|| word.strip_suffix('s').filter(|s| !s.ends_with('s')))?;
    (stem.len() >= MIN_WORD_CHARS).then_some(stem)
}

fn normalize_token(word: &str) -> &str {
    singular(word).unwrap_or(word)
}

/// Lowercase words longer than three letters, plus singular forms of plurals.
pub fn query_words(text: &str) -> Vec<String> {
    let plain = strip_placeholders(text).to_lowercase();
    let mut seen = HashSet::new();
    let mut words = Vec::new();
    for m in WORD_RE.find_iter(&plain) {
        let w = m.as_str();
        let base = w.strip_suffix("'s").unwrap_or(w);
        for candidate in [Some(base), singular(w)].into_iter().flatten() {
            if candidate.len() >= MIN_WORD_CHARS && seen.insert(candidate.to_string()) {
                words.push(candidate.to_string());
            }
        }
    }
    words
}

fn term_words(term: &str) -> Vec<String> {
    TERM_WORD_RE
        .find_iter(&term.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

struct Candidate<'a> {
    entry: &'a TermEntry,
    tokens: Vec<String>,
}

/// BM25 over the candidate terms, the ones sharing a whole word with the text.
pub fn select(normalized_text: &str, dictionary: &DictionarySnapshot) -> Vec<String> {
    let words = query_words(normalized_text);
    if words.is_empty() || dictionary.is_empty() {
        return vec![];
    }
    let word_set: HashSet<&str> = words.iter().map(String::as_str).collect();

    let candidates: Vec<Candidate<'_>> = dictionary
        .iter()
        .filter_map(|entry| {
            let raw = term_words(&entry.term);
            if !raw.iter().any(|w| word_set.contains(w.as_str())) {
                return None;
            }
            let tokens = raw.iter().map(|w| normalize_token(w).to_string()).collect();
            Some(Candidate { entry, tokens })
        })
        .collect();
    if candidates.is_empty() {
        return vec![];
    }

    let mut query: Vec<&str> = Vec::new();
    for w in &words {
        let t = normalize_token(w);
        if !query.contains(&t) {
            query.push(t);
        }
    }

    let n = candidates.len() as f64;
    let avgdl = candidates.iter().map(|c| c.tokens.len()).sum::<usize>() as f64 / n;
    let mut df: HashMap<&str, usize> = HashMap::new();
    for c in &candidates {
        let unique: HashSet<&str> = c.tokens.iter().map(String::as_str).collect();
        for t in unique {
            *df.entry(t).or_default() += 1;
        }
    }

    let mut scored: Vec<(f64, &TermEntry)> = candidates
        .iter()
        .map(|c| (bm25_score(&query, &c.tokens, &df, n, avgdl), c.entry))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    scored
        .into_iter()
        .filter(|(score, _)| *score > 0.0)
        .take(MAX_CONTEXT_ENTRIES)
        .map(|(_, e)| context_line(e))
        .collect()
}

fn bm25_score(query: &[&str], doc: &[String], df: &HashMap<&str, usize>, n: f64, avgdl: f64) -> f64 {
    let dl = doc.len() as f64;
    let mut score = 0.0;
    for q in query {
        let tf = doc.iter().filter(|t| t.as_str() == *q).count() as f64;
        if tf == 0.0 {
            continue;
        }
        let d = df.get(q).copied().unwrap_or(0) as f64;
        let idf = (1.0 + (n - d + 0.5) / (d + 0.5)).ln();
        let norm = if avgdl > 0.0 { dl / avgdl } else { 1.0 };
        score += idf * tf * (K1 + 1.0) / (tf + K1 * (1.0 - B + B * norm));
    }
    score
}

/// Dictionary terms occurring verbatim (case-insensitive, on word
/// boundaries) in the text, longest first.
pub fn exact_matches(normalized_text: &str, dictionary: &DictionarySnapshot, limit: usize) -> Vec<String> {
    let plain = strip_placeholders(normalized_text).to_lowercase();
    let mut hits: Vec<&TermEntry> = dictionary
        .iter()
        .filter(|e| {
            let term = e.term.to_lowercase();
            term.chars().count() >= 2 && contains_whole(&plain, &term)
        })
        .collect();
    hits.sort_by(|a, b| b.term.chars().count().cmp(&a.term.chars().count()));
    hits.truncate(limit);
    hits.into_iter().map(context_line).collect()
}

/// Retriever selection plus exact matches, de-duplicated in that order.
pub fn context_lines(normalized_text: &str, dictionary: &DictionarySnapshot) -> Vec<String> {
    let mut lines = select(normalized_text, dictionary);
    for line in exact_matches(normalized_text, dictionary, MAX_EXACT_MATCHES) {
        if !lines.contains(&line) {
            lines.push(line);
        }
    }
    lines
}

fn context_line(entry: &TermEntry) -> String {
    format!("{} -> {}", entry.term, entry.value.render())
}

fn contains_whole(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(i, m)| {
        let before = haystack[..i].chars().next_back();
        let after = haystack[i + m.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminology::Dictionary;

    fn dict(pairs: &[(&str, &str)]) -> DictionarySnapshot {
        let d = Dictionary::new();
        for (t, v) in pairs {
            d.add(t, v).unwrap();
        }
        d.snapshot()
    }

    #[test]
    fn words_include_singulars_and_skip_short_ones() {
        let words = query_words("[P1] The swords of Steve's dogs");
        assert_eq!(words, vec!["swords", "sword", "steve", "dogs"]);
    }

    #[test]
    fn select_ranks_candidates_and_formats_lines() {
        let snap = dict(&[
            ("Sword", "검"),
            ("Iron Sword", "철 검"),
            ("Iron", "철"),
            ("Shield", "방패"),
        ]);
        let lines = select("Craft [P1]Iron Swords[P2] quickly", &snap);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Iron Sword -> 철 검");
        assert!(lines.contains(&"Sword -> 검".to_string()));
        assert!(lines.contains(&"Iron -> 철".to_string()));
        assert!(!lines.iter().any(|l| l.starts_with("Shield")));
    }

    #[test]
    fn single_candidate_still_scores_positive() {
        let snap = dict(&[("Creeper", "크리퍼")]);
        assert_eq!(select("A creeper explodes", &snap), vec!["Creeper -> 크리퍼"]);
    }

    #[test]
    fn at_most_eight_lines() {
        let pairs: Vec<(String, String)> = (0..20)
            .map(|i| (format!("Stone variant{i}"), format!("돌{i}")))
            .collect();
        let d = Dictionary::new();
        for (t, v) in &pairs {
            d.add(t, v).unwrap();
        }
        let lines = select("Polished stone block", &d.snapshot());
        assert_eq!(lines.len(), MAX_CONTEXT_ENTRIES);
        assert_eq!(lines[0], "Stone variant0 -> 돌0");
    }

    #[test]
    fn empty_dictionary_or_no_words_is_fine() {
        let snap = dict(&[("Iron", "철")]);
        assert!(select("[P1] 42 [P2]", &snap).is_empty());
        assert!(select("Iron", &DictionarySnapshot::default()).is_empty());
    }

    #[test]
    fn exact_matches_are_word_bounded_and_longest_first() {
        let snap = dict(&[("TNT", "TNT"), ("Ore", "광석"), ("Gold Ore", "금 광석")]);
        let hits = exact_matches("Mine gold ore with TNT", &snap, MAX_EXACT_MATCHES);
        assert_eq!(hits, vec!["Gold Ore -> 금 광석", "TNT -> TNT", "Ore -> 광석"]);
        assert!(exact_matches("More explosives", &snap, 16).is_empty());
    }

    #[test]
    fn context_lines_dedupe() {
        let snap = dict(&[("Diamond", "다이아몬드"), ("TNT", "TNT")]);
        let lines = context_lines("Diamond and TNT", &snap);
        assert_eq!(lines, vec!["Diamond -> 다이아몬드", "TNT -> TNT"]);
    }
}
