//! Graph patterns, the quads they match and the rows produced by matching them.
//!
//! A [`GraphPattern`] is a quad template where every position is either a bound [`Term`] or a
//! variable. Looking a pattern up against a quad source turns it into a [`QuadPattern`] where
//! variables become wildcards, and every matched [`Quad`] binds the pattern's variables into a
//! [`SampleRow`].

use std::collections::{BTreeMap, BTreeSet};

use derive_more::{Display, From};
use enum_as_inner::EnumAsInner;
use enumset::{enum_set, EnumSet, EnumSetType};
use strum::IntoEnumIterator;
use strum_macros::{EnumIter, IntoStaticStr};

mod graph;
pub use graph::*;

/// A bound RDF term in its lexical form, e.g. `<http://example.org/p>`, `"lit"` or `_:b0`.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Display, From)]
pub struct Term(String);

impl Term {
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Term {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Position of a term inside a quad.
///
/// Iteration order is subject, predicate, object, graph. Join positions are scanned in that
/// order.
#[derive(Debug, EnumSetType, EnumIter, IntoStaticStr)]
pub enum QuadPosition {
    #[strum(serialize = "s")]
    Subject,
    #[strum(serialize = "p")]
    Predicate,
    #[strum(serialize = "o")]
    Object,
    #[strum(serialize = "g")]
    Graph,
}

impl QuadPosition {
    /// Short code of the position: `s`, `p`, `o` or `g`.
    pub fn code(self) -> &'static str {
        self.into()
    }

    /// Positions considered when deciding whether two patterns are connected. Graph variables
    /// do not connect patterns.
    pub fn connectivity() -> EnumSet<QuadPosition> {
        enum_set!(QuadPosition::Subject | QuadPosition::Predicate | QuadPosition::Object)
    }
}

/// One position of a graph pattern.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Display, EnumAsInner)]
pub enum PatternTerm {
    #[display(fmt = "{}", _0)]
    Bound(Term),
    #[display(fmt = "?{}", _0)]
    Variable(String),
}

impl PatternTerm {
    pub fn var<S: Into<String>>(name: S) -> Self {
        PatternTerm::Variable(name.into())
    }

    pub fn bound<T: Into<Term>>(term: T) -> Self {
        PatternTerm::Bound(term.into())
    }
}

/// A matched row of the underlying source.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Quad {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
    pub graph: Term,
}

impl Quad {
    pub fn new<S, P, O, G>(subject: S, predicate: P, object: O, graph: G) -> Self
    where
        S: Into<Term>,
        P: Into<Term>,
        O: Into<Term>,
        G: Into<Term>,
    {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            graph: graph.into(),
        }
    }

    pub fn term(&self, position: QuadPosition) -> &Term {
        match position {
            QuadPosition::Subject => &self.subject,
            QuadPosition::Predicate => &self.predicate,
            QuadPosition::Object => &self.object,
            QuadPosition::Graph => &self.graph,
        }
    }
}

/// Lookup sent to a quad source. `None` at a position is a wildcard.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq)]
pub struct QuadPattern {
    pub subject: Option<Term>,
    pub predicate: Option<Term>,
    pub object: Option<Term>,
    pub graph: Option<Term>,
}

impl QuadPattern {
    pub fn get(&self, position: QuadPosition) -> Option<&Term> {
        match position {
            QuadPosition::Subject => self.subject.as_ref(),
            QuadPosition::Predicate => self.predicate.as_ref(),
            QuadPosition::Object => self.object.as_ref(),
            QuadPosition::Graph => self.graph.as_ref(),
        }
    }

    pub fn set(&mut self, position: QuadPosition, term: Option<Term>) {
        let slot = match position {
            QuadPosition::Subject => &mut self.subject,
            QuadPosition::Predicate => &mut self.predicate,
            QuadPosition::Object => &mut self.object,
            QuadPosition::Graph => &mut self.graph,
        };
        *slot = term;
    }

    pub fn matches(&self, quad: &Quad) -> bool {
        QuadPosition::iter().all(|position| match self.get(position) {
            Some(term) => quad.term(position) == term,
            None => true,
        })
    }
}

/// Variable bindings of one (partially) joined result row.
pub type SampleRow = BTreeMap<String, Term>;

/// A quad template over bound terms and variables.
///
/// `graph = None` matches quads of any graph and binds nothing.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct GraphPattern {
    pub subject: PatternTerm,
    pub predicate: PatternTerm,
    pub object: PatternTerm,
    pub graph: Option<PatternTerm>,
}

impl GraphPattern {
    pub fn new(subject: PatternTerm, predicate: PatternTerm, object: PatternTerm) -> Self {
        Self {
            subject,
            predicate,
            object,
            graph: None,
        }
    }

    pub fn with_graph(mut self, graph: PatternTerm) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn term(&self, position: QuadPosition) -> Option<&PatternTerm> {
        match position {
            QuadPosition::Subject => Some(&self.subject),
            QuadPosition::Predicate => Some(&self.predicate),
            QuadPosition::Object => Some(&self.object),
            QuadPosition::Graph => self.graph.as_ref(),
        }
    }

    /// Variable name at `position`, if that position holds a variable.
    pub fn variable_at(&self, position: QuadPosition) -> Option<&str> {
        self.term(position)
            .and_then(PatternTerm::as_variable)
            .map(String::as_str)
    }

    /// Distinct variables occurring at the given positions.
    pub fn variables_in(&self, positions: EnumSet<QuadPosition>) -> BTreeSet<&str> {
        positions
            .iter()
            .filter_map(|position| self.variable_at(position))
            .collect()
    }

    /// Distinct variables occurring anywhere in the pattern, graph included.
    pub fn variables(&self) -> BTreeSet<&str> {
        self.variables_in(EnumSet::all())
    }

    /// Lookup matching this pattern: bound terms stay, variables become wildcards.
    pub fn to_lookup(&self) -> QuadPattern {
        let mut lookup = QuadPattern::default();
        for position in QuadPosition::iter() {
            if let Some(PatternTerm::Bound(term)) = self.term(position) {
                lookup.set(position, Some(term.clone()));
            }
        }
        lookup
    }

    /// Extends `row` with the bindings `quad` gives to this pattern's variables.
    ///
    /// Returns `None` when the quad disagrees with a value already bound, either in `row` or by
    /// a repeated variable of this pattern.
    pub fn extend_row(&self, row: &SampleRow, quad: &Quad) -> Option<SampleRow> {
        let mut extended = row.clone();
        for position in QuadPosition::iter() {
            if let Some(variable) = self.variable_at(position) {
                let value = quad.term(position);
                match extended.get(variable) {
                    Some(bound) if bound != value => return None,
                    Some(_) => {}
                    None => {
                        extended.insert(variable.to_string(), value.clone());
                    }
                }
            }
        }
        Some(extended)
    }

    /// Row binding this pattern's variables from `quad`.
    pub fn bind(&self, quad: &Quad) -> Option<SampleRow> {
        self.extend_row(&SampleRow::new(), quad)
    }
}

impl std::fmt::Display for GraphPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)?;
        if let Some(graph) = &self.graph {
            write!(f, " {}", graph)?;
        }
        Ok(())
    }
}
