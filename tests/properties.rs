use std::sync::Arc;

use proptest::prelude::*;

use asset_localizer::freezer::freeze_text;
use asset_localizer::quality::validate_placeholders;
use asset_localizer::retriever::{select, MAX_CONTEXT_ENTRIES};
use asset_localizer::terminology::Dictionary;

proptest! {
    #[test]
    fn frozen_text_restores_to_the_source(source in "[a-zA-Z0-9 §%{}:_.<>/$\n-]{0,48}") {
        let frozen = freeze_text(&source);
        prop_assert_eq!(frozen.restore(&frozen.text), source);
        prop_assert!(validate_placeholders(&frozen.placeholders, &frozen.text).is_clean());
    }

    #[test]
    fn escaped_newlines_survive_the_round_trip(lines in prop::collection::vec("[a-z %§0-9\r]{0,12}", 1..4)) {
        let source = lines.join("\\n");
        let frozen = freeze_text(&source);
        prop_assert_eq!(frozen.restore(&frozen.text), source);
    }

    #[test]
    fn dictionary_only_grows(pairs in prop::collection::vec(("[a-z]{1,8}", "[a-z]{1,8}"), 1..40)) {
        let dict = Dictionary::new();
        let mut previous = 0;
        for (i, (term, value)) in pairs.iter().enumerate() {
            dict.add(term, value).unwrap();
            prop_assert!(dict.len() >= previous);
            previous = dict.len();
            for (t, v) in &pairs[..=i] {
                let found = dict.lookup(t);
                prop_assert!(found.is_some());
                prop_assert!(found.unwrap().values().contains(v));
            }
        }
        for (term, value) in &pairs {
            prop_assert_eq!(dict.add(term, value), Ok(false));
        }
        prop_assert_eq!(dict.len(), previous);
    }

    #[test]
    fn retrieval_is_bounded_and_known(
        terms in prop::collection::vec("[a-z]{4,8}", 0..30),
        text in "[a-z ]{0,80}",
    ) {
        let dict = Dictionary::new();
        for t in &terms {
            dict.add(t, &t.to_uppercase()).unwrap();
        }
        let snapshot = dict.snapshot();
        let lines = select(&text, &snapshot);
        prop_assert!(lines.len() <= MAX_CONTEXT_ENTRIES);
        for line in lines {
            let term = line.split(" -> ").next().unwrap_or_default();
            prop_assert!(snapshot.lookup(term).is_some());
        }
    }
}

#[test]
fn concurrent_adds_are_all_kept() {
    let dict = Arc::new(Dictionary::new());
    std::thread::scope(|scope| {
        for worker in 0..8 {
            let dict = dict.clone();
            scope.spawn(move || {
                for i in 0..50 {
                    dict.add(&format!("term{worker}x{i}"), &format!("값{i}")).unwrap();
                    dict.add("shared", &format!("공유{worker}")).unwrap();
                }
            });
        }
    });
    assert_eq!(dict.len(), 8 * 50 + 1);
    for worker in 0..8 {
        for i in 0..50 {
            assert!(dict.lookup(&format!("term{worker}x{i}")).is_some());
        }
    }
    assert_eq!(dict.lookup("SHARED").unwrap().values().len(), 8);
}
