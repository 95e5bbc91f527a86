use std::collections::BTreeSet;

use plate_origin::config::MatcherConfig;
use plate_origin::grammar::{Grammar, GrammarDefinition, JurisdictionId};
use plate_origin::matcher::{MatchVerdict, SegmentOutcome, match_all, match_text, normalize};
use plate_origin::store::GrammarStore;

fn grammar(id: &str, pattern: &str) -> Grammar {
    Grammar::from_definition(&GrammarDefinition::with_pattern(id, pattern)).expect("grammar")
}

fn strict() -> MatcherConfig {
    MatcherConfig { length_tolerance: 0, ..MatcherConfig::default() }
}

#[test]
fn exact_text_scores_one() {
    let x = grammar("X", "LLL-DDD");
    let m = match_text("ABC-123", &x, &MatcherConfig::default());
    assert_eq!(m.score(), 1.0);
    assert_eq!(m.verdict(), MatchVerdict::Exact);
    assert!(m.segments().iter().all(|s| s.outcome == SegmentOutcome::Matched));
    assert_eq!(m.segments()[0].text, "ABC");
    // case and surrounding noise do not matter
    assert_eq!(match_text("  abc-123 ", &x, &MatcherConfig::default()).score(), 1.0);
    assert_eq!(match_text("abc_-123!", &x, &MatcherConfig::default()).score(), 1.0);
}

#[test]
fn conforming_texts_score_one_for_every_grammar() {
    let cases = [
        ("LLL-DDD", vec!["ABC-123", "xyz-000"]),
        ("L{1,3}-L{1,2} D{1,4}", vec!["B-AB 1234", "HH-A 1", "ABC-DE 12", "M-X 99"]),
        ("'CD' DDD", vec!["CD 123"]),
        ("DLLLDDD", vec!["7ABC123"]),
        ("LLL DDA", vec!["ABC 12D", "ABC 123"]),
        ("A{2,4}/DD", vec!["A1/22", "ZZZZ/10"]),
    ];
    for (pattern, texts) in cases {
        let g = grammar("T", pattern);
        for text in texts {
            let m = match_text(text, &g, &strict());
            assert_eq!(m.score(), 1.0, "{text} against {pattern}: {}", m.explain());
        }
    }
}

#[test]
fn short_segment_gets_partial_credit() {
    let x = grammar("X", "LLL-DDD");
    let m = match_text("AB-123", &x, &MatcherConfig::default());
    assert!(m.score() > 0.0 && m.score() < 1.0);
    assert_eq!(m.score(), 0.5);
    assert_eq!(m.verdict(), MatchVerdict::Partial);
    assert_eq!(m.segments()[0].outcome, SegmentOutcome::LengthMismatch { min: 3, max: 3, found: 2 });
    assert_eq!(m.segments()[1].outcome, SegmentOutcome::Matched);
    assert!(m.explain().starts_with("segment 1: length mismatch (expected 3, found 2)"));
}

#[test]
fn lengths_outside_bounds_are_rejected() {
    let x = grammar("X", "LLL-DDD");
    for text in ["ABCD-1234", "AB-12", "A", "ABCDEFGHIJ-123"] {
        let m = match_text(text, &x, &strict());
        assert_eq!(m.score(), 0.0, "{text}");
        assert_eq!(m.verdict(), MatchVerdict::Rejected);
        assert!(m.segments().is_empty());
    }
    // the default tolerance admits one character of slack, no more
    assert!(match_text("ABCD-123", &x, &MatcherConfig::default()).score() > 0.0);
    assert_eq!(match_text("ABCDE-1234", &x, &MatcherConfig::default()).score(), 0.0);
    assert!(match_text("AB-12", &x, &strict()).explain().contains("outside 7..7"));
}

#[test]
fn missing_separator_and_wrong_class() {
    let x = grammar("X", "LLL-DDD");
    let m = match_text("ABC123", &x, &MatcherConfig::default());
    assert_eq!(m.score(), 0.75);
    assert_eq!(m.segments()[0].outcome, SegmentOutcome::SeparatorMissing { expected: '-' });

    let m = match_text("AB1-123", &x, &MatcherConfig::default());
    assert_eq!(m.score(), 0.5);
    assert_eq!(m.segments()[0].outcome, SegmentOutcome::ClassMismatch { position: 2 });

    let cd = grammar("CD", "'CD' DDD");
    let m = match_text("CX 123", &cd, &MatcherConfig::default());
    assert_eq!(m.segments()[0].outcome, SegmentOutcome::ClassMismatch { position: 1 });
}

#[test]
fn forbidden_substrings_cap_the_score() {
    let de = Grammar::from_definition(
        &GrammarDefinition::with_pattern("DE", "L{1,3}-L{1,2} D{1,4}").forbid("SS"),
    )
    .expect("grammar");
    let m = match_text("SS-AB 123", &de, &MatcherConfig::default());
    assert!(m.score() < 0.5);
    assert_eq!(m.score(), 0.45);
    assert_eq!(m.forbidden_hits(), ["SS"]);
    assert_eq!(
        m.segments()[0].outcome,
        SegmentOutcome::ForbiddenSubstring { substring: "SS".into() }
    );
    assert_eq!(m.verdict(), MatchVerdict::Partial);

    let lenient = MatcherConfig { forbidden_penalty: 0.2, forbidden_cap: 0.4, ..MatcherConfig::default() };
    assert!((match_text("SS-AB 123", &de, &lenient).score() - 0.2).abs() < 1e-12);
}

#[test]
fn normalize_collapses_whitespace_and_strips_noise() {
    let separators: BTreeSet<char> = [' ', '-'].into_iter().collect();
    assert_eq!(normalize("  ab\t 12--3 ", &separators), "AB 12--3");
    assert_eq!(normalize("a.b/c", &separators), "ABC");
    assert_eq!(normalize(" - ", &separators), "");
}

fn store() -> GrammarStore {
    GrammarStore::load(vec![
        GrammarDefinition::with_pattern("X", "LLL-DDD"),
        GrammarDefinition::with_pattern("B", "LLL-DDD"),
        GrammarDefinition::with_pattern("Y", "LLL-LLL"),
        GrammarDefinition::with_pattern("Z", "DDDD"),
        GrammarDefinition::with_pattern("S", "LL DDD LL"),
        GrammarDefinition::with_pattern("N", "LLLDDD"),
    ])
    .expect("store")
}

#[test]
fn match_all_sorts_by_score_then_id() {
    let store = store();
    let matches = match_all("ABC-123", &store, &MatcherConfig::default());
    assert_eq!(matches.len(), store.len());
    let order: Vec<&str> = matches.iter().map(|m| m.jurisdiction().as_str()).collect();
    // B, N and X all conform exactly; N never sees the hyphen
    assert_eq!(&order[..3], ["B", "N", "X"]);
    assert_eq!(order[3], "Y");
    assert!(matches.windows(2).all(|w| w[0].score() >= w[1].score()));
    let z = matches.iter().find(|m| m.jurisdiction().as_str() == "Z").expect("Z");
    assert_eq!(z.verdict(), MatchVerdict::Rejected);
}

#[test]
fn match_all_is_deterministic_and_agrees_with_match_text() {
    let store = store();
    let config = MatcherConfig::default();
    for text in ["ABC-123", "AB 123-CD", "ab 123 cd", "7", "ABC123X"] {
        let first = match_all(text, &store, &config);
        let second = match_all(text, &store, &config);
        assert_eq!(first, second);
        for m in &first {
            let grammar = store.lookup(m.jurisdiction()).expect("grammar");
            assert_eq!(*m, match_text(text, grammar, &config), "{text} against {}", grammar);
        }
    }
}

#[test]
fn match_all_keeps_one_record_per_grammar_even_when_pruned() {
    let store = store();
    let matches = match_all("ABCDEFGHIJKLMNOP", &store, &MatcherConfig::default());
    assert_eq!(matches.len(), store.len());
    assert!(matches.iter().all(|m| m.score() == 0.0));
    let ids: Vec<&JurisdictionId> = matches.iter().map(|m| m.jurisdiction()).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}
