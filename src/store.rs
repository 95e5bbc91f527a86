use core::hash::BuildHasherDefault;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use rayon::prelude::*;
use roaring::RoaringBitmap;
use seahash::SeaHasher;
use tracing::info;

use crate::error::{PlateOriginError, Result};
use crate::grammar::{Grammar, GrammarDefinition, JurisdictionId};

pub type IdHasher = BuildHasherDefault<SeaHasher>;

/// Position of a grammar in the store's arena.
pub type Ordinal = u32;

// ------------- GrammarStore -------------
// Read-only after load, so it can be shared between sessions without locking.
#[derive(Debug)]
pub struct GrammarStore {
    // the arena, sorted by jurisdiction id
    grammars: Vec<Grammar>,
    ordinals: HashMap<JurisdictionId, Ordinal, IdHasher>,
    // total plate length -> grammars whose bounds include it
    by_length: BTreeMap<usize, RoaringBitmap>,
    by_country: HashMap<String, RoaringBitmap, IdHasher>,
    separators: BTreeSet<char>,
    fingerprint: String,
}

impl GrammarStore {
    /// Validates every definition; any failure aborts the whole load.
    pub fn load<I>(definitions: I) -> Result<Self>
    where
        I: IntoIterator<Item = GrammarDefinition>,
    {
        let mut grammars = Vec::new();
        for definition in definitions {
            grammars.push(Grammar::from_definition(&definition)?);
        }
        grammars.sort_by(|a, b| a.id().cmp(b.id()));
        if let Some(pair) = grammars.windows(2).find(|pair| pair[0].id() == pair[1].id()) {
            return Err(PlateOriginError::MalformedGrammar {
                jurisdiction: pair[0].id().to_string(),
                reason: "duplicate jurisdiction id".into(),
            });
        }

        let mut ordinals = HashMap::default();
        let mut by_length: BTreeMap<usize, RoaringBitmap> = BTreeMap::new();
        let mut by_country: HashMap<String, RoaringBitmap, IdHasher> = HashMap::default();
        let mut separators = BTreeSet::new();
        let mut hasher = blake3::Hasher::new();
        for (ordinal, grammar) in grammars.iter().enumerate() {
            let ordinal = ordinal as Ordinal;
            ordinals.insert(grammar.id().clone(), ordinal);
            let (min, max) = grammar.length_bounds();
            for length in min..=max {
                by_length.entry(length).or_default().insert(ordinal);
            }
            by_country
                .entry(grammar.id().country().to_string())
                .or_default()
                .insert(ordinal);
            separators.extend(grammar.separators());
            hasher.update(grammar.to_string().as_bytes());
            hasher.update(b"\n");
        }
        let fingerprint = hasher.finalize().to_hex().to_string();
        info!(grammars = grammars.len(), %fingerprint, "grammar store loaded");
        Ok(Self { grammars, ordinals, by_length, by_country, separators, fingerprint })
    }

    /// Loads a JSON array of grammar definitions.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let definitions: Vec<GrammarDefinition> = serde_json::from_str(json)?;
        Self::load(definitions)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            PlateOriginError::Ingestion(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    pub fn lookup(&self, id: &JurisdictionId) -> Option<&Grammar> {
        self.ordinals.get(id).map(|o| &self.grammars[*o as usize])
    }

    /// Every grammar in jurisdiction order; call again to restart.
    pub fn all_grammars(&self) -> std::slice::Iter<'_, Grammar> {
        self.grammars.iter()
    }

    pub fn par_grammars(&self) -> rayon::slice::Iter<'_, Grammar> {
        self.grammars.par_iter()
    }

    pub fn grammar(&self, ordinal: Ordinal) -> Option<&Grammar> {
        self.grammars.get(ordinal as usize)
    }

    pub fn ordinal(&self, id: &JurisdictionId) -> Option<Ordinal> {
        self.ordinals.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.grammars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grammars.is_empty()
    }

    /// Grammars whose length bounds, widened by `tolerance`, meet `shortest..=longest`.
    pub fn candidates(&self, shortest: usize, longest: usize, tolerance: usize) -> RoaringBitmap {
        let low = shortest.saturating_sub(tolerance);
        let high = longest.saturating_add(tolerance);
        let mut candidates = RoaringBitmap::new();
        for (_, bitmap) in self.by_length.range(low..=high) {
            candidates |= bitmap;
        }
        candidates
    }

    /// Every jurisdiction sharing the given country code, e.g. all `US-*` states.
    pub fn jurisdictions_in(&self, country: &str) -> Vec<&JurisdictionId> {
        match self.by_country.get(&country.trim().to_uppercase()) {
            Some(bitmap) => bitmap
                .iter()
                .filter_map(|o| self.grammar(o))
                .map(|g| g.id())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Union of the separator characters used by any grammar.
    pub fn separators(&self) -> &BTreeSet<char> {
        &self.separators
    }

    /// Content hash of the loaded grammars, independent of load order.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}
