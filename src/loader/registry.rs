//! Built-in map/reduce operators, registered by name.
//!
//! Rather than fetching and executing arbitrary code referenced by a
//! URL, operators are registered by name ahead of time and a URL is
//! treated as identifying one of them by convention.

use regex::Regex;
use std::sync::Arc;

use crate::model::KeyValue;

/// A user-supplied map function: `map(key, value) -> [KeyValue]`.
/// `key` is the input line number, `value` the line's text.
pub trait Mapper: Send + Sync {
    fn apply(&self, key: i64, value: &str) -> Vec<KeyValue>;
}

/// A user-supplied reduce function: `reduce(key, values) -> [KeyValue]`.
pub trait Reducer: Send + Sync {
    fn apply(&self, key: &str, values: &[String]) -> Vec<KeyValue>;
}

struct WordCountMapper {
    word_re: Regex,
}

impl WordCountMapper {
    fn new() -> Self {
        Self {
            word_re: Regex::new(r"[A-Za-z]+").expect("static regex"),
        }
    }
}

impl Mapper for WordCountMapper {
    fn apply(&self, _key: i64, value: &str) -> Vec<KeyValue> {
        self.word_re
            .find_iter(&value.to_lowercase())
            .map(|m| KeyValue::new(m.as_str(), "1"))
            .collect()
    }
}

struct WordCountReducer;

impl Reducer for WordCountReducer {
    fn apply(&self, key: &str, values: &[String]) -> Vec<KeyValue> {
        let total: i64 = values.iter().filter_map(|v| v.parse::<i64>().ok()).sum();
        vec![KeyValue::new(key, total.to_string())]
    }
}

struct CharCountMapper;

impl Mapper for CharCountMapper {
    fn apply(&self, _key: i64, value: &str) -> Vec<KeyValue> {
        value
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphabetic())
            .map(|c| KeyValue::new(c.to_string(), "1"))
            .collect()
    }
}

struct CharCountReducer;

impl Reducer for CharCountReducer {
    fn apply(&self, key: &str, values: &[String]) -> Vec<KeyValue> {
        let total: i64 = values.iter().filter_map(|v| v.parse::<i64>().ok()).sum();
        vec![KeyValue::new(key, total.to_string())]
    }
}

struct LineLengthMapper;

impl Mapper for LineLengthMapper {
    fn apply(&self, _key: i64, value: &str) -> Vec<KeyValue> {
        vec![KeyValue::new("line_length", value.chars().count().to_string())]
    }
}

struct AverageLengthReducer;

impl Reducer for AverageLengthReducer {
    fn apply(&self, key: &str, values: &[String]) -> Vec<KeyValue> {
        let lengths: Vec<f64> = values.iter().filter_map(|v| v.parse::<f64>().ok()).collect();
        if lengths.is_empty() {
            return Vec::new();
        }
        let average = lengths.iter().sum::<f64>() / lengths.len() as f64;
        vec![KeyValue::new(key, format!("{average:.2}"))]
    }
}

/// Resolves a bare operator name (e.g. `wordcount`) to a mapper or
/// reducer. Returns `None` if the name isn't registered.
pub fn lookup_mapper(name: &str) -> Option<Arc<dyn Mapper>> {
    match name {
        "wordcount" => Some(Arc::new(WordCountMapper::new())),
        "charcount" => Some(Arc::new(CharCountMapper)),
        "linelength" => Some(Arc::new(LineLengthMapper)),
        _ => None,
    }
}

pub fn lookup_reducer(name: &str) -> Option<Arc<dyn Reducer>> {
    match name {
        "wordcount" => Some(Arc::new(WordCountReducer)),
        "charcount" => Some(Arc::new(CharCountReducer)),
        "linelength" => Some(Arc::new(AverageLengthReducer)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wordcount_splits_on_whitespace_and_punctuation() {
        let mapper = lookup_mapper("wordcount").unwrap();
        let kvs = mapper.apply(0, "to be, or not to be!");
        let words: Vec<_> = kvs.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(words, vec!["to", "be", "or", "not", "to", "be"]);
    }

    #[test]
    fn wordcount_reducer_sums_counts() {
        let reducer = lookup_reducer("wordcount").unwrap();
        let out = reducer.apply("to", &["1".to_string(), "1".to_string()]);
        assert_eq!(out, vec![KeyValue::new("to", "2")]);
    }

    #[test]
    fn unknown_operator_is_none() {
        assert!(lookup_mapper("no-such-operator").is_none());
        assert!(lookup_reducer("no-such-operator").is_none());
    }
}
