//! Compact pattern notation for grammar definitions.
//!
//! `L` is a letter, `D` a digit and `A` either. Repeating a class character widens
//! the segment (`LLL` is three letters), `{m}` or `{m,n}` after a single class
//! character gives explicit bounds, `'TEXT'` is a fixed literal, and `-`, space,
//! `.` or `/` between segments is the separator that follows the preceding segment.

use pest::Parser;
use pest::error::LineColLocation;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::error::{PlateOriginError, Result};
use crate::grammar::{ClassName, SegmentDefinition};

#[derive(Parser)]
#[grammar = "notation.pest"]
struct NotationParser;

fn parse_error(message: String) -> PlateOriginError {
    PlateOriginError::Parse { message, line: None, col: None }
}

pub fn parse(pattern: &str) -> Result<Vec<SegmentDefinition>> {
    let mut pairs = NotationParser::parse(Rule::pattern, pattern).map_err(|e| {
        let (line, col) = match e.line_col {
            LineColLocation::Pos((l, c)) => (l, c),
            LineColLocation::Span((l, c), _) => (l, c),
        };
        PlateOriginError::Parse { message: e.variant.message().to_string(), line: Some(line), col: Some(col) }
    })?;
    let mut segments: Vec<SegmentDefinition> = Vec::new();
    let Some(root) = pairs.next() else {
        return Err(parse_error(format!("empty pattern '{pattern}'")));
    };
    for pair in root.into_inner() {
        match pair.as_rule() {
            Rule::segment => segments.push(parse_segment(pair)?),
            Rule::separator => {
                // the grammar guarantees a segment before every separator
                if let (Some(last), Some(c)) = (segments.last_mut(), pair.as_str().chars().next()) {
                    last.separator = Some(c);
                }
            }
            _ => (),
        }
    }
    Ok(segments)
}

fn parse_segment(pair: Pair<Rule>) -> Result<SegmentDefinition> {
    let Some(inner) = pair.into_inner().next() else {
        return Err(parse_error("empty segment".into()));
    };
    match inner.as_rule() {
        Rule::literal => {
            let text = inner.into_inner().next().map(|t| t.as_str()).unwrap_or_default();
            Ok(SegmentDefinition::literal(text))
        }
        Rule::run => {
            let mut parts = inner.into_inner();
            let Some(symbols) = parts.next() else {
                return Err(parse_error("empty run".into()));
            };
            let class = match symbols.as_rule() {
                Rule::letters => ClassName::Letters,
                Rule::digits => ClassName::Digits,
                _ => ClassName::Alphanumeric,
            };
            let repeat = symbols.as_str().len();
            match parts.next() {
                None => Ok(SegmentDefinition::class(class, repeat, repeat)),
                Some(_) if repeat > 1 => Err(parse_error(format!(
                    "bounds apply to a single class character, found '{}'",
                    symbols.as_str()
                ))),
                Some(bounds) => {
                    let numbers = bounds
                        .into_inner()
                        .map(|n| n.as_str().parse::<usize>())
                        .collect::<std::result::Result<Vec<_>, _>>()
                        .map_err(|e| parse_error(e.to_string()))?;
                    match numbers.as_slice() {
                        [exact] => Ok(SegmentDefinition::class(class, *exact, *exact)),
                        [min, max] => Ok(SegmentDefinition::class(class, *min, *max)),
                        _ => Err(parse_error("malformed bounds".into())),
                    }
                }
            }
        }
        rule => Err(parse_error(format!("unexpected {rule:?}"))),
    }
}
