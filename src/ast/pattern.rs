//! Glob patterns for the `like` operator.

use std::fmt::{Display, Formatter, Result as FmtResult};

/// One piece of a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatternElem {
    Literal(String),
    Wildcard,
}

/// A normalized glob: adjacent literals are merged and runs of wildcards
/// collapse to one, so literals and wildcards strictly alternate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Pattern {
    elems: Vec<PatternElem>,
}

impl Pattern {
    pub fn new(elems: impl IntoIterator<Item = PatternElem>) -> Self {
        let mut pattern = Pattern::default();
        for elem in elems {
            pattern.push(elem);
        }
        pattern
    }

    /// Parses glob text where `*` is a wildcard, `\*` a literal star, `\"` a
    /// quote and `\\` a literal backslash. Any other backslash is kept as-is.
    pub fn parse(text: &str) -> Self {
        let mut pattern = Pattern::default();
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\\' if matches!(chars.peek(), Some('*' | '\\' | '"')) => {
                    if let Some(escaped) = chars.next() {
                        pattern.push_char(escaped);
                    }
                }
                '*' => pattern.push(PatternElem::Wildcard),
                c => pattern.push_char(c),
            }
        }
        pattern
    }

    fn push_char(&mut self, c: char) {
        if let Some(PatternElem::Literal(lit)) = self.elems.last_mut() {
            lit.push(c);
            return;
        }
        self.elems.push(PatternElem::Literal(c.to_string()));
    }

    fn push(&mut self, elem: PatternElem) {
        match elem {
            PatternElem::Wildcard => {
                if self.elems.last() != Some(&PatternElem::Wildcard) {
                    self.elems.push(PatternElem::Wildcard);
                }
            }
            PatternElem::Literal(lit) => lit.chars().for_each(|c| self.push_char(c)),
        }
    }

    pub fn elems(&self) -> &[PatternElem] {
        &self.elems
    }

    /// Matches the whole of `text`.
    ///
    /// A leading literal must be a prefix and a trailing literal a suffix.
    /// Literals between wildcards take their leftmost occurrence, which leaves
    /// the most input for the segments that follow.
    pub fn wildcard_match(&self, text: &str) -> bool {
        let mut rest = text;
        let mut after_wildcard = false;
        let last = self.elems.len().saturating_sub(1);

        for (idx, elem) in self.elems.iter().enumerate() {
            match elem {
                PatternElem::Wildcard => after_wildcard = true,
                PatternElem::Literal(lit) if !after_wildcard => {
                    let Some(tail) = rest.strip_prefix(lit.as_str()) else {
                        return false;
                    };
                    rest = tail;
                }
                PatternElem::Literal(lit) if idx == last => return rest.ends_with(lit.as_str()),
                PatternElem::Literal(lit) => {
                    let Some(pos) = rest.find(lit.as_str()) else {
                        return false;
                    };
                    rest = &rest[pos + lit.len()..];
                    after_wildcard = false;
                }
            }
        }

        after_wildcard || rest.is_empty()
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        for elem in &self.elems {
            match elem {
                PatternElem::Wildcard => write!(f, "*")?,
                PatternElem::Literal(lit) => {
                    for c in lit.chars() {
                        match c {
                            '*' => write!(f, "\\*")?,
                            '\\' => write!(f, "\\\\")?,
                            '"' => write!(f, "\\\"")?,
                            c => write!(f, "{c}")?,
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
