//! Record selection.
//!
//! A filter is a tree of conjunctions and disjunctions whose leaves match a
//! single attribute against a set of candidate values. The traversal invokes
//! it on every assembled record and drops records it rejects.

use crate::reader::Record;

/// A single-attribute match.
#[derive(Debug, Clone)]
pub struct AttrMatch {
    pub name: String,
    pub values: Vec<Vec<u8>>,
    /// Whether a record that lacks the attribute passes.
    pub pass_if_missing: bool,
}

impl AttrMatch {
    pub fn new(name: impl Into<String>, values: Vec<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            values,
            pass_if_missing: false,
        }
    }

    pub fn pass_if_missing(mut self, pass: bool) -> Self {
        self.pass_if_missing = pass;
        self
    }
}

#[derive(Debug, Clone)]
pub enum FilterExpr {
    Match(AttrMatch),
    Conjunction(Vec<FilterExpr>),
    Disjunction(Vec<FilterExpr>),
}

impl FilterExpr {
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            FilterExpr::Match(leaf) => match record.get(&leaf.name) {
                Some(value) => leaf.values.iter().any(|candidate| candidate == value),
                None => leaf.pass_if_missing,
            },
            FilterExpr::Conjunction(exprs) => exprs.iter().all(|expr| expr.matches(record)),
            FilterExpr::Disjunction(exprs) => exprs.iter().any(|expr| expr.matches(record)),
        }
    }
}
