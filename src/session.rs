use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::sync::Arc;

use lazy_static::lazy_static;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{PlateOriginError, Result};
use crate::fusion::{self, Accumulator, EvidenceVector, FORMAT_SOURCE, RankedCandidate, VisualSignal, VisualSignalRecord};
use crate::grammar::JurisdictionId;
use crate::matcher::{self, StructuralMatch};
use crate::store::GrammarStore;

lazy_static! {
    static ref DEFAULT_CONFIG: EngineConfig = EngineConfig::default();
}

/// A loaded grammar store together with the configuration sessions run under.
pub struct PlateOriginEngine {
    store: Arc<GrammarStore>,
    config: EngineConfig,
}
impl PlateOriginEngine {
    pub fn new(store: Arc<GrammarStore>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }
    pub fn store(&self) -> &GrammarStore {
        &self.store
    }
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
    pub fn session(&self) -> InferenceSession<'_> {
        InferenceSession::with_config(&self.store, &self.config)
    }
}

/// Evidence gathered for one plate, ranked on demand.
///
/// Each named source (the text is `format`) may be added once. Rejected evidence
/// leaves the session as it was. Not meant to be shared between threads; callers
/// extracting signals concurrently add them one at a time.
pub struct InferenceSession<'e> {
    store: &'e GrammarStore,
    config: &'e EngineConfig,
    evidence: EvidenceVector,
    // live noisy-OR state for every jurisdiction past the structural gate
    accumulators: BTreeMap<JurisdictionId, Accumulator>,
    ranked: OnceCell<Vec<RankedCandidate>>,
}

impl<'e> InferenceSession<'e> {
    pub fn new(store: &'e GrammarStore) -> Self {
        Self::with_config(store, &DEFAULT_CONFIG)
    }

    // only reached through PlateOriginEngine, which has validated the config
    pub(crate) fn with_config(store: &'e GrammarStore, config: &'e EngineConfig) -> Self {
        Self {
            store,
            config,
            evidence: EvidenceVector::new(),
            accumulators: BTreeMap::new(),
            ranked: OnceCell::new(),
        }
    }

    /// Matches the text against every grammar in the store.
    pub fn add_text(&mut self, text: &str) -> Result<()> {
        if self.evidence.has_source(FORMAT_SOURCE) {
            return Err(PlateOriginError::DuplicateSignalSource(FORMAT_SOURCE.into()));
        }
        let normalized = matcher::normalize(text, self.store.separators());
        if !normalized.chars().any(char::is_alphanumeric) {
            return Err(PlateOriginError::EmptyInput);
        }
        let matches = matcher::match_all(text, self.store, &self.config.matcher);
        let mut accumulators = fusion::gate(
            matches.iter().map(|m| (m.jurisdiction().clone(), m.score())),
            &self.config.fusion,
        );
        // signals that arrived before the text
        for signal in self.evidence.signals() {
            for (jurisdiction, score) in signal.scores() {
                if let Some(accumulator) = accumulators.get_mut(jurisdiction) {
                    accumulator.absorb(signal.name(), *score, signal.reliability());
                }
            }
        }
        self.evidence.add_structural(matches)?;
        debug!(text = %normalized, gated = accumulators.len(), "text added to session");
        self.accumulators = accumulators;
        self.ranked = OnceCell::new();
        Ok(())
    }

    pub fn add_visual_signal(&mut self, signal: VisualSignal) -> Result<()> {
        let name = signal.name().to_string();
        let added = fusion::check_reliability(&signal, &self.config.fusion)
            .and_then(|()| self.evidence.add_signal(signal));
        if let Err(e) = added {
            warn!(source = %name, error = %e, "visual signal rejected");
            return Err(e);
        }
        let Some(signal) = self.evidence.signals().last() else {
            return Ok(());
        };
        let mut unknown = 0;
        for (jurisdiction, score) in signal.scores() {
            if let Some(accumulator) = self.accumulators.get_mut(jurisdiction) {
                accumulator.absorb(signal.name(), *score, signal.reliability());
            } else if self.store.lookup(jurisdiction).is_none() {
                unknown += 1;
            }
        }
        if unknown > 0 {
            warn!(source = %name, unknown, "visual signal scores jurisdictions missing from the store");
        }
        debug!(source = %name, reliability = signal.reliability(), "visual signal added to session");
        self.ranked = OnceCell::new();
        Ok(())
    }

    /// Adds a record, taking its reliability from configuration when it has none.
    pub fn add_visual_record(&mut self, record: VisualSignalRecord) -> Result<()> {
        let signal = VisualSignal::from_record(record, &self.config.fusion);
        self.add_visual_signal(signal)
    }

    /// The ranking for the evidence so far; empty until text has been added.
    pub fn current_result(&self) -> &[RankedCandidate] {
        self.ranked
            .get_or_init(|| fusion::rank(&self.accumulators, &self.config.fusion))
    }

    pub fn structural_match(&self, jurisdiction: &JurisdictionId) -> Option<&StructuralMatch> {
        self.evidence.structural_match(jurisdiction)
    }

    pub fn evidence(&self) -> &EvidenceVector {
        &self.evidence
    }

    pub fn config(&self) -> &EngineConfig {
        self.config
    }
}
