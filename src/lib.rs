//! Plate origin – infers which jurisdiction (country, state, province) a license
//! plate belongs to from its text and from independently derived visual signals.
//!
//! The engine is a table-driven classifier over a database of plate grammars:
//! * A [`grammar::Grammar`] describes one jurisdiction's plate layout as ordered
//!   segments (letters, digits, alphanumerics or fixed literals), each with length
//!   bounds and an optional trailing separator, plus forbidden substrings.
//! * The [`store::GrammarStore`] validates and owns every grammar. It is read-only
//!   after load and indexes grammars by id, plate length and country.
//! * The [`matcher`] aligns a text with each grammar and scores the alignment,
//!   1.0 for exact conformance with partial credit for near misses.
//! * [`fusion`] combines structural scores with visual signals (color scheme,
//!   font, emblem, ...) into ranked, explainable candidates.
//! * An [`session::InferenceSession`] accumulates the evidence for one plate and
//!   re-ranks as signals arrive.
//!
//! Grammars are data. They are loaded from JSON records, either as explicit
//! segments or in the compact [`notation`] (`LLL-DDD`, `L{1,3}-L{1,2} D{1,4}`).
//!
//! ## Quick Start
//! ```
//! use plate_origin::grammar::{GrammarDefinition, JurisdictionId};
//! use plate_origin::fusion::VisualSignal;
//! use plate_origin::session::InferenceSession;
//! use plate_origin::store::GrammarStore;
//!
//! let store = GrammarStore::load(vec![
//!     GrammarDefinition::with_pattern("X", "LLL-DDD"),
//!     GrammarDefinition::with_pattern("Y", "DD-LLLL"),
//! ]).unwrap();
//! let mut session = InferenceSession::new(&store);
//! session.add_text("abc-123").unwrap();
//! let x = JurisdictionId::new("X").unwrap();
//! session.add_visual_signal(VisualSignal::new("color-scheme", [(x.clone(), 0.8)], 0.5)).unwrap();
//! let best = &session.current_result()[0];
//! assert_eq!(best.jurisdiction, x);
//! println!("{}", best.explain()); // format 0.90, color-scheme 0.40
//! ```

pub mod config;
pub mod error;
pub mod fusion;
pub mod grammar;
pub mod matcher;
pub mod notation;
pub mod session;
pub mod store;

pub use error::{PlateOriginError, Result};
