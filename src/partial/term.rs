//! Request terms that may be only partly known.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;

use itertools::Itertools;

use crate::types::{EntityUid, Value};

/// One request dimension, or a piece of one, in a batch request.
///
/// A `Variable` is a named slot that the batch search fills from a list of
/// candidates. `Ignore` marks a dimension the caller does not care about; it
/// is replaced by a default once the search reaches its last slot. Records
/// and sets nest terms so a slot can sit anywhere inside the context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Value(Value),
    Variable(String),
    Ignore,
    Record(Arc<BTreeMap<String, Term>>),
    Set(Arc<Vec<Term>>),
}

impl Term {
    pub fn variable(name: impl Into<String>) -> Self {
        Term::Variable(name.into())
    }

    pub fn record<K: Into<String>>(fields: impl IntoIterator<Item = (K, Term)>) -> Self {
        Term::Record(Arc::new(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn set(items: impl IntoIterator<Item = Term>) -> Self {
        Term::Set(Arc::new(items.into_iter().collect()))
    }

    /// The concrete value, when the term holds no variable and no ignore.
    pub fn to_value(&self) -> Option<Value> {
        match self {
            Term::Value(v) => Some(v.clone()),
            Term::Variable(_) | Term::Ignore => None,
            Term::Record(fields) => {
                let fields = fields
                    .iter()
                    .map(|(k, t)| t.to_value().map(|v| (k.clone(), v)))
                    .collect::<Option<BTreeMap<_, _>>>()?;
                Some(Value::Record(Arc::new(fields)))
            }
            Term::Set(items) => {
                let items = items.iter().map(Term::to_value).collect::<Option<Vec<_>>>()?;
                Some(Value::Set(Arc::new(items)))
            }
        }
    }

    /// Adds the names of every variable in the term to `out`.
    pub fn collect_variables(&self, out: &mut BTreeSet<String>) {
        match self {
            Term::Variable(name) => {
                out.insert(name.clone());
            }
            Term::Record(fields) => fields.values().for_each(|t| t.collect_variables(out)),
            Term::Set(items) => items.iter().for_each(|t| t.collect_variables(out)),
            Term::Value(_) | Term::Ignore => {}
        }
    }

    pub fn contains_ignore(&self) -> bool {
        match self {
            Term::Ignore => true,
            Term::Record(fields) => fields.values().any(Term::contains_ignore),
            Term::Set(items) => items.iter().any(Term::contains_ignore),
            Term::Value(_) | Term::Variable(_) => false,
        }
    }

    /// Binds `name` to `value`. Only the records and sets on the path to an
    /// occurrence are rebuilt; everything else is shared with `self`.
    pub fn substitute(&self, name: &str, value: &Value) -> Term {
        let bind = |t: &Term| match t {
            Term::Variable(n) if n == name => Some(Rewrite::Replace(Term::Value(value.clone()))),
            _ => None,
        };
        match self.rewrite(&bind) {
            Rewrite::Replace(t) => t,
            Rewrite::Keep | Rewrite::Remove => self.clone(),
        }
    }

    /// Replaces a top-level ignore by `default` and drops ignored fields and
    /// elements nested inside records and sets.
    pub fn with_defaults(&self, default: &Value) -> Term {
        if let Term::Ignore = self {
            return Term::Value(default.clone());
        }
        let drop_ignored = |t: &Term| matches!(t, Term::Ignore).then_some(Rewrite::Remove);
        match self.rewrite(&drop_ignored) {
            Rewrite::Replace(t) => t,
            Rewrite::Keep | Rewrite::Remove => self.clone(),
        }
    }

    /// Copy-on-write rewrite driven by `f`, which returns `None` to descend
    /// into a term unchanged.
    fn rewrite(&self, f: &impl Fn(&Term) -> Option<Rewrite>) -> Rewrite {
        if let Some(rewrite) = f(self) {
            return rewrite;
        }
        match self {
            Term::Record(fields) => {
                let mut changed: Option<BTreeMap<String, Term>> = None;
                for (key, field) in fields.iter() {
                    match field.rewrite(f) {
                        Rewrite::Keep => {}
                        Rewrite::Replace(t) => {
                            changed
                                .get_or_insert_with(|| (**fields).clone())
                                .insert(key.clone(), t);
                        }
                        Rewrite::Remove => {
                            changed
                                .get_or_insert_with(|| (**fields).clone())
                                .remove(key);
                        }
                    }
                }
                changed.map_or(Rewrite::Keep, |map| Rewrite::Replace(Term::Record(Arc::new(map))))
            }
            Term::Set(items) => {
                let mut rebuilt: Option<Vec<Term>> = None;
                for (idx, item) in items.iter().enumerate() {
                    let rewrite = item.rewrite(f);
                    if rebuilt.is_none() && !matches!(rewrite, Rewrite::Keep) {
                        rebuilt = Some(items[..idx].to_vec());
                    }
                    if let Some(out) = rebuilt.as_mut() {
                        match rewrite {
                            Rewrite::Keep => out.push(item.clone()),
                            Rewrite::Replace(t) => out.push(t),
                            Rewrite::Remove => {}
                        }
                    }
                }
                rebuilt.map_or(Rewrite::Keep, |items| Rewrite::Replace(Term::Set(Arc::new(items))))
            }
            Term::Value(_) | Term::Variable(_) | Term::Ignore => Rewrite::Keep,
        }
    }
}

enum Rewrite {
    Keep,
    Replace(Term),
    Remove,
}

impl From<Value> for Term {
    fn from(v: Value) -> Self {
        Term::Value(v)
    }
}

impl From<EntityUid> for Term {
    fn from(uid: EntityUid) -> Self {
        Term::Value(Value::EntityUid(uid))
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Term::Value(v) => write!(f, "{v}"),
            Term::Variable(name) => write!(f, "?{name}"),
            Term::Ignore => write!(f, "_"),
            Term::Record(fields) => write!(
                f,
                "{{{}}}",
                fields
                    .iter()
                    .map(|(k, v)| format!("\"{}\": {v}", k.escape_debug()))
                    .join(", ")
            ),
            Term::Set(items) => write!(f, "[{}]", items.iter().join(", ")),
        }
    }
}
