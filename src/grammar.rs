//! Plate format grammars.
//!
//! A [`Grammar`] describes the valid text layout of one jurisdiction's plates as an
//! ordered list of [`Segment`]s. Grammars are data: they arrive as
//! [`GrammarDefinition`] records from an external loader and are validated once,
//! after which they never change.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{PlateOriginError, Result};
use crate::notation;

lazy_static! {
    // ISO-style country code with an optional subdivision, e.g. DE or US-CA
    static ref JURISDICTION_ID: Regex = Regex::new(r"^[A-Z]{1,3}(?:-[A-Z0-9]{1,4})?$").unwrap();
}

/// Longest plate text, separators included, that a grammar may describe.
pub const MAX_PLATE_LENGTH: usize = 32;

// ------------- JurisdictionId -------------
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JurisdictionId(String);

impl JurisdictionId {
    /// Normalizes to upper case; `None` unless the result looks like `CC` or `CC-SUB`.
    pub fn new(raw: &str) -> Option<Self> {
        let id = raw.trim().to_uppercase();
        if JURISDICTION_ID.is_match(&id) {
            Some(Self(id))
        } else {
            None
        }
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
    pub fn country(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }
    pub fn subdivision(&self) -> Option<&str> {
        self.0.split_once('-').map(|(_, sub)| sub)
    }
}
impl TryFrom<String> for JurisdictionId {
    type Error = String;
    fn try_from(raw: String) -> std::result::Result<Self, Self::Error> {
        Self::new(&raw).ok_or_else(|| format!("invalid jurisdiction id '{raw}'"))
    }
}
impl From<JurisdictionId> for String {
    fn from(id: JurisdictionId) -> Self {
        id.0
    }
}
impl fmt::Display for JurisdictionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ------------- CharClass -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassName {
    Letters,
    Digits,
    Alphanumeric,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CharClass {
    Letters,
    Digits,
    Alphanumeric,
    /// Fixed text, stored upper case.
    Literal(String),
}
impl CharClass {
    /// Whether `c` may appear at `offset` within a run of this class.
    pub fn admits(&self, offset: usize, c: char) -> bool {
        match self {
            CharClass::Letters => c.is_alphabetic(),
            CharClass::Digits => c.is_ascii_digit(),
            CharClass::Alphanumeric => c.is_alphanumeric(),
            CharClass::Literal(text) => text.chars().nth(offset) == Some(c),
        }
    }
    fn symbol(&self) -> char {
        match self {
            CharClass::Letters => 'L',
            CharClass::Digits => 'D',
            CharClass::Alphanumeric | CharClass::Literal(_) => 'A',
        }
    }
}
impl From<ClassName> for CharClass {
    fn from(name: ClassName) -> Self {
        match name {
            ClassName::Letters => CharClass::Letters,
            ClassName::Digits => CharClass::Digits,
            ClassName::Alphanumeric => CharClass::Alphanumeric,
        }
    }
}

// ------------- Segment -------------
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Segment {
    class: CharClass,
    min: usize,
    max: usize,
    separator: Option<char>,
}
impl Segment {
    pub fn class(&self) -> &CharClass {
        &self.class
    }
    pub fn min(&self) -> usize {
        self.min
    }
    pub fn max(&self) -> usize {
        self.max
    }
    pub fn separator(&self) -> Option<char> {
        self.separator
    }
}
impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.class {
            CharClass::Literal(text) => write!(f, "'{text}'")?,
            class if self.min == self.max => {
                write!(f, "{}", class.symbol().to_string().repeat(self.min))?
            }
            class => write!(f, "{}{{{},{}}}", class.symbol(), self.min, self.max)?,
        }
        if let Some(separator) = self.separator {
            write!(f, "{separator}")?;
        }
        Ok(())
    }
}

// ------------- Definitions (as loaded) -------------
/// One segment as it appears in the external grammar database.
///
/// Either `class` with `length` or `min`/`max`, or a fixed `literal`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<ClassName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub literal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<char>,
}
impl SegmentDefinition {
    pub fn class(class: ClassName, min: usize, max: usize) -> Self {
        Self { class: Some(class), min: Some(min), max: Some(max), ..Self::default() }
    }
    pub fn literal(text: &str) -> Self {
        Self { literal: Some(text.to_string()), ..Self::default() }
    }
    pub fn then(mut self, separator: char) -> Self {
        self.separator = Some(separator);
        self
    }
}

/// A raw grammar record, validated by [`Grammar::from_definition`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrammarDefinition {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<SegmentDefinition>,
    /// Compact notation such as `LLL-DDD`, an alternative to `segments`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forbidden: Vec<String>,
}
impl GrammarDefinition {
    pub fn with_pattern(id: &str, pattern: &str) -> Self {
        Self { id: id.to_string(), pattern: Some(pattern.to_string()), ..Self::default() }
    }
    pub fn with_segments(id: &str, segments: Vec<SegmentDefinition>) -> Self {
        Self { id: id.to_string(), segments, ..Self::default() }
    }
    pub fn forbid(mut self, substring: &str) -> Self {
        self.forbidden.push(substring.to_string());
        self
    }
}

// ------------- Grammar -------------
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Grammar {
    id: JurisdictionId,
    name: Option<String>,
    segments: Vec<Segment>,
    forbidden: Vec<String>,
    min_length: usize,
    max_length: usize,
}

impl Grammar {
    pub fn from_definition(definition: &GrammarDefinition) -> Result<Self> {
        let malformed = |reason: String| PlateOriginError::MalformedGrammar {
            jurisdiction: definition.id.clone(),
            reason,
        };
        let id = JurisdictionId::new(&definition.id)
            .ok_or_else(|| malformed("jurisdiction id is not an ISO-style code".into()))?;
        let parsed;
        let segment_definitions = match &definition.pattern {
            Some(_) if !definition.segments.is_empty() => {
                return Err(malformed("both segments and pattern given".into()));
            }
            Some(pattern) => {
                parsed = notation::parse(pattern).map_err(|e| malformed(e.to_string()))?;
                &parsed
            }
            None => &definition.segments,
        };
        if segment_definitions.is_empty() {
            return Err(malformed("grammar has no segments".into()));
        }
        let mut segments = Vec::with_capacity(segment_definitions.len());
        for (i, segment) in segment_definitions.iter().enumerate() {
            segments.push(build_segment(segment).map_err(|reason| malformed(format!("segment {}: {reason}", i + 1)))?);
        }
        if segments.last().is_some_and(|s| s.separator.is_some()) {
            return Err(malformed("last segment cannot carry a separator".into()));
        }
        let mut forbidden = Vec::with_capacity(definition.forbidden.len());
        for substring in &definition.forbidden {
            let substring: String = substring.trim().to_uppercase();
            if substring.is_empty() {
                return Err(malformed("empty forbidden substring".into()));
            }
            forbidden.push(substring);
        }
        let separators = segments.iter().filter(|s| s.separator.is_some()).count();
        let total = |bound: fn(&Segment) -> usize| {
            segments
                .iter()
                .try_fold(separators, |sum, s| sum.checked_add(bound(s)))
                .filter(|&length| length <= MAX_PLATE_LENGTH)
        };
        let (Some(min_length), Some(max_length)) = (total(|s| s.min), total(|s| s.max)) else {
            return Err(malformed(format!("plates may not exceed {MAX_PLATE_LENGTH} characters")));
        };
        Ok(Self { id, name: definition.name.clone(), segments, forbidden, min_length, max_length })
    }
    pub fn id(&self) -> &JurisdictionId {
        &self.id
    }
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
    pub fn forbidden(&self) -> &[String] {
        &self.forbidden
    }
    /// Bounds on the full plate text including separators.
    pub fn length_bounds(&self) -> (usize, usize) {
        (self.min_length, self.max_length)
    }
    pub fn separators(&self) -> impl Iterator<Item = char> + '_ {
        self.segments.iter().filter_map(|s| s.separator)
    }
    /// The grammar in compact notation, e.g. `LLL-DDD`.
    pub fn notation(&self) -> String {
        self.segments.iter().map(|s| s.to_string()).collect()
    }
}
impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} [{}]", self.id, self.notation())?;
        if !self.forbidden.is_empty() {
            write!(f, " !{}", self.forbidden.join(","))?;
        }
        Ok(())
    }
}

fn build_segment(definition: &SegmentDefinition) -> std::result::Result<Segment, String> {
    if let Some(separator) = definition.separator {
        if separator.is_alphanumeric() {
            return Err(format!("separator '{separator}' is alphanumeric"));
        }
        // normalization turns every whitespace character into a plain space
        if separator.is_whitespace() && separator != ' ' {
            return Err(format!("separator {separator:?} is whitespace other than a space"));
        }
    }
    let (class, min, max) = match (&definition.class, &definition.literal) {
        (Some(_), Some(_)) => return Err("both class and literal given".into()),
        (None, None) => return Err("neither class nor literal given".into()),
        (None, Some(literal)) => {
            let text = literal.trim().to_uppercase();
            if text.is_empty() || !text.chars().all(char::is_alphanumeric) {
                return Err(format!("literal '{literal}' must be non-empty letters or digits"));
            }
            let length = text.chars().count();
            (CharClass::Literal(text), length, length)
        }
        (Some(name), None) => {
            let (min, max) = match (definition.length, definition.min, definition.max) {
                (Some(length), None, None) => (length, length),
                (None, Some(min), Some(max)) => (min, max),
                (None, Some(min), None) => (min, min),
                (None, None, Some(max)) => (1, max),
                (None, None, None) => return Err("no length given".into()),
                _ => return Err("length given together with min/max".into()),
            };
            if min == 0 || min > max {
                return Err(format!("contradictory length bounds {min}..{max}"));
            }
            if max > MAX_PLATE_LENGTH {
                return Err(format!("length {max} exceeds {MAX_PLATE_LENGTH}"));
            }
            (CharClass::from(*name), min, max)
        }
    };
    Ok(Segment { class, min, max, separator: definition.separator })
}
