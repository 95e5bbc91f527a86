//! Evidence fusion and ranking.
//!
//! Every piece of evidence for a jurisdiction is a scaled contribution
//! `weight * score`, combined noisy-OR style:
//! `confidence = 1 - (1 - c_1) * (1 - c_2) * ...`.
//! The structural match is always the first contribution. Jurisdictions whose
//! structural score is below the configured minimum are never ranked, however
//! strong their visual evidence.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::FusionConfig;
use crate::error::{PlateOriginError, Result};
use crate::grammar::JurisdictionId;
use crate::matcher::StructuralMatch;

/// Source name under which the structural match appears in traces.
pub const FORMAT_SOURCE: &str = "format";

// ------------- VisualSignal -------------
/// An externally computed score per jurisdiction, e.g. from color-scheme analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualSignal {
    name: String,
    scores: BTreeMap<JurisdictionId, f64>,
    reliability: f64,
}

impl VisualSignal {
    pub fn new<I>(name: &str, scores: I, reliability: f64) -> Self
    where
        I: IntoIterator<Item = (JurisdictionId, f64)>,
    {
        Self { name: name.trim().to_string(), scores: scores.into_iter().collect(), reliability }
    }
    /// Uses the record's own reliability, else the one configured for its source.
    pub fn from_record(record: VisualSignalRecord, config: &FusionConfig) -> Self {
        let reliability = record.reliability.unwrap_or_else(|| config.reliability_of(record.source.trim()));
        Self::new(&record.source, record.scores, reliability)
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn reliability(&self) -> f64 {
        self.reliability
    }
    pub fn score(&self, jurisdiction: &JurisdictionId) -> Option<f64> {
        self.scores.get(jurisdiction).copied()
    }
    pub fn scores(&self) -> &BTreeMap<JurisdictionId, f64> {
        &self.scores
    }
    /// Scores must lie in [0, 1] and the reliability in (0, 1].
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(PlateOriginError::Ingestion("visual signal without a source name".into()));
        }
        if !(self.reliability > 0.0 && self.reliability <= 1.0) {
            return Err(PlateOriginError::InvalidSignalScore {
                source_name: self.name.clone(),
                jurisdiction: None,
                value: self.reliability,
            });
        }
        match self.scores.iter().find(|(_, score)| !(0.0..=1.0).contains(*score)) {
            Some((jurisdiction, score)) => Err(PlateOriginError::InvalidSignalScore {
                source_name: self.name.clone(),
                jurisdiction: Some(jurisdiction.clone()),
                value: *score,
            }),
            None => Ok(()),
        }
    }
}

/// Refuses a signal weighted above the format contribution, which no single
/// visual source may outweigh.
pub fn check_reliability(signal: &VisualSignal, config: &FusionConfig) -> Result<()> {
    if signal.reliability > config.format_weight {
        return Err(PlateOriginError::InvalidSignalScore {
            source_name: signal.name.clone(),
            jurisdiction: None,
            value: signal.reliability,
        });
    }
    Ok(())
}

/// A visual signal as supplied by callers; `reliability` may be left to configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualSignalRecord {
    pub source: String,
    pub scores: BTreeMap<JurisdictionId, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reliability: Option<f64>,
}

// ------------- EvidenceVector -------------
/// Append-only evidence for one inference request.
#[derive(Debug, Clone, Default)]
pub struct EvidenceVector {
    structural: Option<BTreeMap<JurisdictionId, StructuralMatch>>,
    signals: Vec<VisualSignal>,
}

impl EvidenceVector {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn has_source(&self, name: &str) -> bool {
        (name == FORMAT_SOURCE && self.structural.is_some())
            || self.signals.iter().any(|s| s.name == name)
    }
    /// Records the structural matches of one text; a vector holds at most one text.
    pub fn add_structural(&mut self, matches: Vec<StructuralMatch>) -> Result<()> {
        if self.has_source(FORMAT_SOURCE) {
            return Err(PlateOriginError::DuplicateSignalSource(FORMAT_SOURCE.into()));
        }
        self.structural = Some(matches.into_iter().map(|m| (m.jurisdiction().clone(), m)).collect());
        Ok(())
    }
    /// Rejects the signal, leaving the vector untouched, when its source is
    /// already present or any of its values is out of range.
    /// The name `format` belongs to the text and is refused even before text arrives.
    pub fn add_signal(&mut self, signal: VisualSignal) -> Result<()> {
        if signal.name == FORMAT_SOURCE || self.has_source(&signal.name) {
            return Err(PlateOriginError::DuplicateSignalSource(signal.name));
        }
        signal.validate()?;
        self.signals.push(signal);
        Ok(())
    }
    pub fn structural_match(&self, jurisdiction: &JurisdictionId) -> Option<&StructuralMatch> {
        self.structural.as_ref().and_then(|s| s.get(jurisdiction))
    }
    pub fn structural_matches(&self) -> impl Iterator<Item = &StructuralMatch> {
        self.structural.iter().flat_map(|s| s.values())
    }
    pub fn signals(&self) -> &[VisualSignal] {
        &self.signals
    }
    pub fn has_text(&self) -> bool {
        self.structural.is_some()
    }
}

// ------------- RankedCandidate -------------
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contribution {
    pub source: String,
    pub score: f64,
    pub weight: f64,
    /// `weight * score`, the value that entered the noisy-OR.
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidate {
    pub jurisdiction: JurisdictionId,
    pub confidence: f64,
    pub structural_score: f64,
    /// Largest contribution first.
    pub trace: Vec<Contribution>,
}
impl RankedCandidate {
    /// e.g. `format 0.94, color-scheme 0.71`
    pub fn explain(&self) -> String {
        self.trace
            .iter()
            .map(|c| format!("{} {:.2}", c.source, c.contribution))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
impl fmt::Display for RankedCandidate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {:.3} ({})", self.jurisdiction, self.confidence, self.explain())
    }
}

// Running noisy-OR state for one jurisdiction. Sessions keep these alive between
// signals; `fuse` rebuilds them, absorbing evidence in the same order.
#[derive(Debug, Clone)]
pub(crate) struct Accumulator {
    residual: f64,
    structural_score: f64,
    trace: Vec<Contribution>,
}
impl Accumulator {
    pub(crate) fn new(structural_score: f64, config: &FusionConfig) -> Self {
        let mut accumulator = Self { residual: 1.0, structural_score, trace: Vec::new() };
        accumulator.absorb(FORMAT_SOURCE, structural_score, config.format_weight);
        accumulator
    }
    pub(crate) fn absorb(&mut self, source: &str, score: f64, weight: f64) {
        let contribution = (weight * score).clamp(0.0, 1.0);
        self.residual *= 1.0 - contribution;
        self.trace.push(Contribution { source: source.to_string(), score, weight, contribution });
    }
    pub(crate) fn candidate(&self, jurisdiction: &JurisdictionId) -> RankedCandidate {
        let mut trace = self.trace.clone();
        trace.sort_by(|a, b| b.contribution.total_cmp(&a.contribution));
        RankedCandidate {
            jurisdiction: jurisdiction.clone(),
            confidence: (1.0 - self.residual).clamp(0.0, 1.0),
            structural_score: self.structural_score,
            trace,
        }
    }
}

/// Structural matches that pass the gate, each with its format contribution absorbed.
/// A rejected match never passes, even with the gate configured at zero.
pub(crate) fn gate(
    matches: impl IntoIterator<Item = (JurisdictionId, f64)>,
    config: &FusionConfig,
) -> BTreeMap<JurisdictionId, Accumulator> {
    matches
        .into_iter()
        .filter(|(_, score)| *score > 0.0 && *score >= config.min_structural_score)
        .map(|(id, score)| (id, Accumulator::new(score, config)))
        .collect()
}

/// Descending confidence, ties broken by jurisdiction id, truncated to `max_candidates`.
pub(crate) fn rank(accumulators: &BTreeMap<JurisdictionId, Accumulator>, config: &FusionConfig) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = accumulators
        .iter()
        .map(|(id, accumulator)| accumulator.candidate(id))
        .collect();
    ranked.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.jurisdiction.cmp(&b.jurisdiction))
    });
    if let Some(limit) = config.max_candidates {
        ranked.truncate(limit);
    }
    ranked
}

/// Ranks every jurisdiction in the evidence vector from scratch. Signal weights
/// above `format_weight` count as `format_weight`.
pub fn fuse(evidence: &EvidenceVector, config: &FusionConfig) -> Vec<RankedCandidate> {
    let mut accumulators = gate(
        evidence.structural_matches().map(|m| (m.jurisdiction().clone(), m.score())),
        config,
    );
    for signal in evidence.signals() {
        for (jurisdiction, score) in signal.scores() {
            if let Some(accumulator) = accumulators.get_mut(jurisdiction) {
                accumulator.absorb(signal.name(), *score, signal.reliability().min(config.format_weight));
            }
        }
    }
    rank(&accumulators, config)
}
