use std::path::Path;
use std::sync::Arc;

use plate_origin::PlateOriginError;
use plate_origin::config::EngineConfig;
use plate_origin::fusion::{FORMAT_SOURCE, VisualSignal, VisualSignalRecord, fuse};
use plate_origin::grammar::{GrammarDefinition, JurisdictionId};
use plate_origin::matcher::SegmentOutcome;
use plate_origin::session::{InferenceSession, PlateOriginEngine};
use plate_origin::store::GrammarStore;

fn id(raw: &str) -> JurisdictionId {
    JurisdictionId::new(raw).expect("valid id")
}

fn store() -> GrammarStore {
    GrammarStore::load(vec![
        GrammarDefinition::with_pattern("X", "LLL-DDD"),
        GrammarDefinition::with_pattern("Y", "LLL-LLL"),
        GrammarDefinition::with_pattern("Z", "DDDD"),
    ])
    .expect("store")
}

fn confidence_of(session: &InferenceSession, jurisdiction: &str) -> Option<f64> {
    session
        .current_result()
        .iter()
        .find(|c| c.jurisdiction.as_str() == jurisdiction)
        .map(|c| c.confidence)
}

#[test]
fn result_is_empty_before_text() {
    let store = store();
    let session = InferenceSession::new(&store);
    assert!(session.current_result().is_empty());
}

#[test]
fn text_then_visual_signal_refines_the_ranking() {
    let store = store();
    let mut session = InferenceSession::new(&store);
    session.add_text("ABC-123").expect("text");
    let text_only = confidence_of(&session, "X").expect("X ranked");
    assert!(confidence_of(&session, "Y").is_some());
    assert!(confidence_of(&session, "Z").is_none());

    let color = VisualSignal::new("color-scheme", [(id("X"), 0.8), (id("Y"), 0.1)], 0.5);
    session.add_visual_signal(color).expect("signal");
    let ranked = session.current_result();
    assert_eq!(ranked[0].jurisdiction, id("X"));
    assert_eq!(ranked[1].jurisdiction, id("Y"));
    assert!(ranked[0].confidence > ranked[1].confidence);
    assert!(ranked[0].confidence > text_only);
    assert_eq!(ranked[0].explain(), "format 0.90, color-scheme 0.40");
}

#[test]
fn incremental_result_matches_fusion_from_scratch() {
    let store = store();
    let mut session = InferenceSession::new(&store);
    session.add_text("abc 123").expect("text");
    session
        .add_visual_signal(VisualSignal::new("color-scheme", [(id("X"), 0.7), (id("Y"), 0.9)], 0.5))
        .expect("signal");
    session
        .add_visual_signal(VisualSignal::new("font", [(id("Y"), 0.2)], 0.3))
        .expect("signal");
    let recomputed = fuse(session.evidence(), &session.config().fusion);
    assert_eq!(session.current_result(), recomputed.as_slice());
}

#[test]
fn signals_may_arrive_before_text() {
    let store = store();
    let color = VisualSignal::new("color-scheme", [(id("X"), 0.8), (id("Z"), 1.0)], 0.5);

    let mut early = InferenceSession::new(&store);
    early.add_visual_signal(color.clone()).expect("signal");
    assert!(early.current_result().is_empty());
    early.add_text("ABC-123").expect("text");

    let mut late = InferenceSession::new(&store);
    late.add_text("ABC-123").expect("text");
    late.add_visual_signal(color).expect("signal");

    assert_eq!(early.current_result(), late.current_result());
    assert!(early.current_result().iter().all(|c| c.jurisdiction != id("Z")));
}

#[test]
fn duplicate_source_keeps_the_first_signal() {
    let store = store();
    let mut session = InferenceSession::new(&store);
    session.add_text("ABC-123").expect("text");
    session
        .add_visual_signal(VisualSignal::new("color-scheme", [(id("X"), 0.8)], 0.5))
        .expect("signal");
    let before = session.current_result().to_vec();
    let err = session
        .add_visual_signal(VisualSignal::new("color-scheme", [(id("X"), 0.1)], 0.5))
        .unwrap_err();
    assert!(matches!(err, PlateOriginError::DuplicateSignalSource(ref name) if name == "color-scheme"));
    assert_eq!(session.current_result(), before.as_slice());
    let x = &session.current_result()[0];
    assert_eq!(x.trace.iter().filter(|c| c.source == "color-scheme").count(), 1);
    assert_eq!(x.trace.iter().find(|c| c.source == "color-scheme").map(|c| c.score), Some(0.8));
}

#[test]
fn invalid_signal_is_isolated() {
    let store = store();
    let mut session = InferenceSession::new(&store);
    session.add_text("ABC-123").expect("text");
    session
        .add_visual_signal(VisualSignal::new("font", [(id("X"), 0.4)], 0.5))
        .expect("signal");
    let before = session.current_result().to_vec();
    let err = session
        .add_visual_signal(VisualSignal::new("emblem", [(id("X"), -0.2)], 0.5))
        .unwrap_err();
    assert!(matches!(err, PlateOriginError::InvalidSignalScore { .. }));
    assert_eq!(session.current_result(), before.as_slice());
    session
        .add_visual_signal(VisualSignal::new("emblem", [(id("X"), 0.2)], 0.5))
        .expect("corrected signal");
    assert!(confidence_of(&session, "X").expect("X") > before[0].confidence);
}

#[test]
fn empty_and_repeated_text_are_refused() {
    let store = store();
    let mut session = InferenceSession::new(&store);
    assert!(matches!(session.add_text(""), Err(PlateOriginError::EmptyInput)));
    assert!(matches!(session.add_text("  - . "), Err(PlateOriginError::EmptyInput)));
    session.add_text("ABC-123").expect("text");
    assert!(matches!(
        session.add_text("XYZ-999"),
        Err(PlateOriginError::DuplicateSignalSource(name)) if name == FORMAT_SOURCE
    ));
    assert_eq!(session.structural_match(&id("X")).expect("X").text(), "ABC-123");
}

#[test]
fn format_is_reserved_for_the_text() {
    let store = store();
    let mut session = InferenceSession::new(&store);
    assert!(matches!(
        session.add_visual_signal(VisualSignal::new(FORMAT_SOURCE, [(id("X"), 0.9)], 0.5)),
        Err(PlateOriginError::DuplicateSignalSource(name)) if name == FORMAT_SOURCE
    ));
    session.add_text("ABC-123").expect("text after a refused format signal");
    assert_eq!(session.current_result()[0].jurisdiction, id("X"));
    assert_eq!(session.current_result()[0].trace.len(), 1);
}

#[test]
fn no_signal_outweighs_an_exact_format_match() {
    let store = store();
    let mut session = InferenceSession::new(&store);
    session.add_text("ABC-123").expect("text");
    let before = session.current_result().to_vec();
    let err = session
        .add_visual_signal(VisualSignal::new("emblem", [(id("Y"), 1.0)], 1.0))
        .unwrap_err();
    match err {
        PlateOriginError::InvalidSignalScore { source_name, jurisdiction, value } => {
            assert_eq!(source_name, "emblem");
            assert_eq!(jurisdiction, None);
            assert_eq!(value, 1.0);
        }
        other => panic!("unexpected {other}"),
    }
    assert_eq!(session.current_result(), before.as_slice());
    assert!(!session.evidence().has_source("emblem"));

    // at the format weight the signal is accepted
    session
        .add_visual_signal(VisualSignal::new("emblem", [(id("Y"), 1.0)], 0.9))
        .expect("signal at the format weight");
    let recomputed = fuse(session.evidence(), &session.config().fusion);
    assert_eq!(session.current_result(), recomputed.as_slice());
}

#[test]
fn engine_refuses_an_invalid_configuration() {
    let mut config = EngineConfig::default();
    config.fusion.format_weight = 1.5;
    let err = PlateOriginEngine::new(Arc::new(store()), config).err().expect("refused");
    assert!(matches!(err, PlateOriginError::Config(_)));

    let mut config = EngineConfig::default();
    config.fusion.default_reliability = 0.95;
    assert!(PlateOriginEngine::new(Arc::new(store()), config).is_err());
}

#[test]
fn structural_explanation_is_available() {
    let store = store();
    let mut session = InferenceSession::new(&store);
    session.add_text("AB-123").expect("text");
    let x = session.structural_match(&id("X")).expect("X");
    assert_eq!(x.score(), 0.5);
    assert_eq!(x.segments()[0].outcome, SegmentOutcome::LengthMismatch { min: 3, max: 3, found: 2 });
}

#[test]
fn current_result_is_idempotent() {
    let store = store();
    let mut session = InferenceSession::new(&store);
    session.add_text("ABC-123").expect("text");
    session
        .add_visual_signal(VisualSignal::new("emblem", [(id("Y"), 0.9)], 0.9))
        .expect("signal");
    let first = session.current_result().to_vec();
    let second = session.current_result().to_vec();
    assert_eq!(first, second);
}

#[test]
fn unknown_jurisdictions_in_signals_are_ignored() {
    let store = store();
    let mut session = InferenceSession::new(&store);
    session.add_text("ABC-123").expect("text");
    let before = session.current_result().to_vec();
    session
        .add_visual_signal(VisualSignal::new("emblem", [(id("QQ"), 1.0)], 0.9))
        .expect("signal");
    assert_eq!(session.current_result(), before.as_slice());
}

#[test]
fn engine_sessions_use_its_configuration() {
    let config = EngineConfig::from_toml_str(
        r#"
        [fusion]
        max_candidates = 1
        [fusion.reliability]
        color-scheme = 0.25
        "#,
    )
    .expect("config");
    let engine = PlateOriginEngine::new(Arc::new(store()), config).expect("engine");
    let mut session = engine.session();
    session.add_text("ABC-123").expect("text");
    session
        .add_visual_record(VisualSignalRecord {
            source: "color-scheme".into(),
            scores: [(id("X"), 1.0)].into_iter().collect(),
            reliability: None,
        })
        .expect("record");
    let ranked = session.current_result();
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].trace[1].weight, 0.25);
}

#[test]
fn store_is_shared_across_concurrent_sessions() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/grammars.json");
    let store = Arc::new(GrammarStore::from_json_file(&path).expect("bundled grammars"));
    let texts = ["B-MW 1234", "AB-123-CD", "AB 123 CD", "12-ABC-3", "7ABC123", "abc-1234"];
    let expected = ["DE", "FR", "IT", "NL", "US-CA", "US-NY"];
    std::thread::scope(|scope| {
        let handles: Vec<_> = texts
            .iter()
            .map(|text| {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    let mut session = InferenceSession::new(&store);
                    session.add_text(text).expect("text");
                    session.current_result()[0].jurisdiction.to_string()
                })
            })
            .collect();
        for (handle, jurisdiction) in handles.into_iter().zip(expected) {
            assert_eq!(handle.join().expect("thread"), jurisdiction);
        }
    });
}
