//! Merge passages that come from the same source document.
//!
//! Keys are compared exactly (case and whitespace sensitive). A group's text
//! is its members' texts in input order, its explanation the members'
//! explanations joined with [`EXPLANATION_SEPARATOR`], and its score the
//! best member score. Results without a source key stay on their own.

use std::collections::HashMap;

use serde_json::Value;

use docsearch_core::types::{FusedResult, EXPLANATION_KEY};

use crate::ranking::sort_by_score;

pub const TEXT_SEPARATOR: &str = "\n\n";
pub const EXPLANATION_SEPARATOR: &str = " | ";

struct Group {
    head: FusedResult,
    texts: Vec<String>,
    explanations: Vec<String>,
}

impl Group {
    fn start(result: FusedResult) -> Self {
        let mut group = Self { texts: vec![], explanations: vec![], head: result.clone() };
        group.absorb(result);
        group
    }

    fn absorb(&mut self, result: FusedResult) {
        if let Some(e) = result.explanation().filter(|e| !e.is_empty()) {
            self.explanations.push(e.to_string());
        }
        if result.score > self.head.score {
            self.head.score = result.score;
        }
        self.head.found_by.extend(result.found_by.iter().copied());
        self.texts.push(result.text);
    }

    fn finish(self) -> FusedResult {
        let mut out = self.head;
        out.text = self.texts.join(TEXT_SEPARATOR);
        if !self.explanations.is_empty() {
            out.metadata.insert(EXPLANATION_KEY.to_string(), Value::String(self.explanations.join(EXPLANATION_SEPARATOR)));
        }
        out
    }
}

/// One result per distinct `key` value, best group first.
pub fn group_by_source(results: Vec<FusedResult>, key: &str) -> Vec<FusedResult> {
    let mut groups: Vec<Group> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for result in results {
        match result.source(key).map(str::to_string) {
            Some(source) => match by_key.get(&source) {
                Some(&i) => groups[i].absorb(result),
                None => {
                    by_key.insert(source, groups.len());
                    groups.push(Group::start(result));
                }
            },
            None => groups.push(Group::start(result)),
        }
    }

    let mut out: Vec<FusedResult> = groups.into_iter().map(Group::finish).collect();
    sort_by_score(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsearch_core::types::{Meta, Method, FILENAME_KEY};
    use std::collections::BTreeSet;

    fn result(text: &str, source: Option<&str>, score: f32, explanation: &str) -> FusedResult {
        let mut metadata = Meta::new();
        if let Some(s) = source {
            metadata.insert(FILENAME_KEY.into(), Value::String(s.into()));
        }
        if !explanation.is_empty() {
            metadata.insert(EXPLANATION_KEY.into(), Value::String(explanation.into()));
        }
        FusedResult { text: text.into(), metadata, score, found_by: BTreeSet::from([Method::ModelReported]) }
    }

    #[test]
    fn merges_same_source_in_order() {
        let out = group_by_source(
            vec![
                result("one", Some("a.pdf"), 0.91, "first"),
                result("two", Some("b.pdf"), 0.95, ""),
                result("three", Some("a.pdf"), 0.97, "second"),
            ],
            FILENAME_KEY,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].text, "one\n\nthree");
        assert_eq!(out[0].score, 0.97);
        assert_eq!(out[0].explanation(), Some("first | second"));
        assert_eq!(out[1].text, "two");
    }

    #[test]
    fn keys_are_case_sensitive() {
        let out = group_by_source(
            vec![result("x", Some("Doc.pdf"), 0.9, ""), result("y", Some("doc.pdf"), 0.9, "")],
            FILENAME_KEY,
        );
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn results_without_a_key_are_never_merged() {
        let out = group_by_source(vec![result("x", None, 0.5, ""), result("y", None, 0.6, "")], FILENAME_KEY);
        assert_eq!(out.iter().map(|r| r.text.as_str()).collect::<Vec<_>>(), ["y", "x"]);
    }
}
