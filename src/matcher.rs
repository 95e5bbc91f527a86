//! Structural matching of plate text against grammars.
//!
//! Alignment is a small dynamic program over (segment, text position): every
//! segment may claim any run of the remaining text, the separator after it is
//! consumed when present, and the alignment with the most segment credit wins.
//! Among equally good alignments the one giving earlier segments the shortest
//! runs is kept, so results are deterministic. Cost is bounded by
//! segments x text length squared, with no backtracking.

use std::collections::BTreeSet;
use std::fmt;

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::config::MatcherConfig;
use crate::grammar::{Grammar, JurisdictionId, Segment};
use crate::store::GrammarStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchVerdict {
    Exact,
    Partial,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SegmentOutcome {
    Matched,
    LengthMismatch { min: usize, max: usize, found: usize },
    /// `position` is the offset of the first offending character within the segment.
    ClassMismatch { position: usize },
    SeparatorMissing { expected: char },
    ForbiddenSubstring { substring: String },
}
impl fmt::Display for SegmentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SegmentOutcome::Matched => write!(f, "matched"),
            SegmentOutcome::LengthMismatch { min, max, found } if min == max => {
                write!(f, "length mismatch (expected {min}, found {found})")
            }
            SegmentOutcome::LengthMismatch { min, max, found } => {
                write!(f, "length mismatch (expected {min}..{max}, found {found})")
            }
            SegmentOutcome::ClassMismatch { position } => {
                write!(f, "class mismatch at character {}", position + 1)
            }
            SegmentOutcome::SeparatorMissing { expected } => {
                write!(f, "separator '{expected}' missing")
            }
            SegmentOutcome::ForbiddenSubstring { substring } => {
                write!(f, "forbidden substring '{substring}'")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentMatch {
    /// The text aligned to this segment, without its separator.
    pub text: String,
    pub outcome: SegmentOutcome,
}

/// Result of comparing one plate text with one grammar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuralMatch {
    jurisdiction: JurisdictionId,
    score: f64,
    verdict: MatchVerdict,
    text: String,
    length_bounds: (usize, usize),
    segments: Vec<SegmentMatch>,
    forbidden_hits: Vec<String>,
}

impl StructuralMatch {
    fn rejected(grammar: &Grammar, text: String) -> Self {
        Self {
            jurisdiction: grammar.id().clone(),
            score: 0.0,
            verdict: MatchVerdict::Rejected,
            text,
            length_bounds: grammar.length_bounds(),
            segments: Vec::new(),
            forbidden_hits: Vec::new(),
        }
    }
    pub fn jurisdiction(&self) -> &JurisdictionId {
        &self.jurisdiction
    }
    pub fn score(&self) -> f64 {
        self.score
    }
    pub fn verdict(&self) -> MatchVerdict {
        self.verdict
    }
    /// The normalized text as this grammar saw it.
    pub fn text(&self) -> &str {
        &self.text
    }
    /// Empty when the text was rejected by the length gate.
    pub fn segments(&self) -> &[SegmentMatch] {
        &self.segments
    }
    pub fn forbidden_hits(&self) -> &[String] {
        &self.forbidden_hits
    }
    /// One line per segment, e.g. `segment 1: length mismatch (expected 3, found 2)`.
    pub fn explain(&self) -> String {
        if self.segments.is_empty() {
            let (min, max) = self.length_bounds;
            return format!(
                "{}: length {} outside {min}..{max}",
                self.jurisdiction,
                self.text.chars().count()
            );
        }
        self.segments
            .iter()
            .enumerate()
            .map(|(i, s)| format!("segment {}: {}", i + 1, s.outcome))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Upper-cases the text, collapses whitespace to single spaces and drops every
/// character that is neither alphanumeric nor in `separators`.
pub fn normalize(text: &str, separators: &BTreeSet<char>) -> String {
    let mut normalized = String::with_capacity(text.len());
    let mut previous_space = false;
    for c in text.chars().flat_map(char::to_uppercase) {
        let c = if c.is_whitespace() { ' ' } else { c };
        if c == ' ' && previous_space {
            continue;
        }
        previous_space = c == ' ';
        if c.is_alphanumeric() || separators.contains(&c) {
            normalized.push(c);
        }
    }
    normalized.trim_matches(|c: char| !c.is_alphanumeric()).to_string()
}

/// Matches one text against one grammar.
pub fn match_text(text: &str, grammar: &Grammar, config: &MatcherConfig) -> StructuralMatch {
    let separators: BTreeSet<char> = grammar.separators().collect();
    match_normalized(normalize(text, &separators), grammar, config)
}

/// Matches one text against every grammar in the store, best first.
pub fn match_all(text: &str, store: &GrammarStore, config: &MatcherConfig) -> Vec<StructuralMatch> {
    let normalized = normalize(text, store.separators());
    let longest = normalized.chars().count();
    let shortest = normalized.chars().filter(|c| c.is_alphanumeric()).count();
    let candidates = store.candidates(shortest, longest, config.length_tolerance);
    let mut matches: Vec<StructuralMatch> = store
        .par_grammars()
        .enumerate()
        .map(|(ordinal, grammar)| {
            let restricted = restrict(&normalized, grammar);
            if candidates.contains(ordinal as u32) {
                match_normalized(restricted, grammar, config)
            } else {
                StructuralMatch::rejected(grammar, restricted)
            }
        })
        .collect();
    sort_matches(&mut matches);
    debug!(
        text = %normalized,
        grammars = matches.len(),
        candidates = candidates.len(),
        best = matches.first().map(|m| m.score).unwrap_or(0.0),
        "matched text against store"
    );
    matches
}

/// Descending score, ties broken by jurisdiction id.
pub fn sort_matches(matches: &mut [StructuralMatch]) {
    matches.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.jurisdiction.cmp(&b.jurisdiction))
    });
}

// keeps only the separators this grammar knows about
fn restrict(normalized: &str, grammar: &Grammar) -> String {
    let own: BTreeSet<char> = grammar.separators().collect();
    normalized
        .chars()
        .filter(|c| c.is_alphanumeric() || own.contains(c))
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct Step {
    credit: f64,
    run: usize,
    separator_present: bool,
}

fn match_normalized(text: String, grammar: &Grammar, config: &MatcherConfig) -> StructuralMatch {
    let chars: Vec<char> = text.chars().collect();
    let (min, max) = grammar.length_bounds();
    let tolerance = config.length_tolerance;
    if chars.is_empty() || chars.len() + tolerance < min || chars.len() > max + tolerance {
        return StructuralMatch::rejected(grammar, text);
    }

    let segments = grammar.segments();
    let length = chars.len();
    // best[i][p]: best alignment of segments i.. onto chars[p..]
    let mut best: Vec<Vec<Option<Step>>> = vec![vec![None; length + 1]; segments.len() + 1];
    best[segments.len()][length] = Some(Step { credit: 0.0, run: 0, separator_present: false });
    for (i, segment) in segments.iter().enumerate().rev() {
        for start in 0..=length {
            let mut chosen: Option<Step> = None;
            for run in 0..=(length - start) {
                let end = start + run;
                let separator_present = match segment.separator() {
                    Some(separator) => chars.get(end) == Some(&separator),
                    None => false,
                };
                let next = if separator_present { end + 1 } else { end };
                let Some(rest) = best[i + 1][next] else { continue };
                let outcome = judge(segment, &chars[start..end], separator_present);
                let credit = credit_of(&outcome, config) + rest.credit;
                if chosen.is_none_or(|c| credit > c.credit) {
                    chosen = Some(Step { credit, run, separator_present });
                }
            }
            best[i][start] = chosen;
        }
    }

    // walk the chosen alignment, recording each segment's span of plate content
    let mut aligned = Vec::with_capacity(segments.len());
    let mut spans = Vec::with_capacity(segments.len());
    let mut content = String::new();
    let mut position = 0;
    let mut credit = 0.0;
    for (i, segment) in segments.iter().enumerate() {
        let Some(step) = best[i][position] else {
            return StructuralMatch::rejected(grammar, text);
        };
        let run = &chars[position..position + step.run];
        let outcome = judge(segment, run, step.separator_present);
        credit += credit_of(&outcome, config);
        let span_start = content.chars().count();
        content.extend(run.iter());
        spans.push(span_start..span_start + run.len());
        aligned.push(SegmentMatch { text: run.iter().collect(), outcome });
        position += step.run + usize::from(step.separator_present);
    }

    let mut forbidden_hits = Vec::new();
    for substring in grammar.forbidden() {
        for (byte_index, _) in content.match_indices(substring.as_str()) {
            let hit = content[..byte_index].chars().count();
            if let Some(owner) = spans.iter().position(|span| span.contains(&hit)) {
                if aligned[owner].outcome == SegmentOutcome::Matched {
                    aligned[owner].outcome = SegmentOutcome::ForbiddenSubstring { substring: substring.clone() };
                }
            }
            if !forbidden_hits.contains(substring) {
                forbidden_hits.push(substring.clone());
            }
        }
    }

    let mut score = credit / segments.len() as f64;
    if !forbidden_hits.is_empty() {
        score = (score * config.forbidden_penalty).min(config.forbidden_cap);
    }
    let score = score.clamp(0.0, 1.0);
    let verdict = if score == 0.0 {
        MatchVerdict::Rejected
    } else if score == 1.0 {
        MatchVerdict::Exact
    } else {
        MatchVerdict::Partial
    };
    StructuralMatch {
        jurisdiction: grammar.id().clone(),
        score,
        verdict,
        text,
        length_bounds: (min, max),
        segments: aligned,
        forbidden_hits,
    }
}

fn judge(segment: &Segment, run: &[char], separator_present: bool) -> SegmentOutcome {
    if !(segment.min()..=segment.max()).contains(&run.len()) {
        return SegmentOutcome::LengthMismatch { min: segment.min(), max: segment.max(), found: run.len() };
    }
    if let Some(position) = run
        .iter()
        .enumerate()
        .position(|(i, c)| !segment.class().admits(i, *c))
    {
        return SegmentOutcome::ClassMismatch { position };
    }
    match segment.separator() {
        Some(expected) if !separator_present => SegmentOutcome::SeparatorMissing { expected },
        _ => SegmentOutcome::Matched,
    }
}

fn credit_of(outcome: &SegmentOutcome, config: &MatcherConfig) -> f64 {
    match outcome {
        SegmentOutcome::Matched => 1.0,
        SegmentOutcome::SeparatorMissing { .. } => config.separator_credit,
        _ => 0.0,
    }
}
