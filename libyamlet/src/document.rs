//! A parsed document and its table of shared nodes.

use std::fmt;

use crate::error::{Result, SerializeError};
use crate::mapping::Mapping;
use crate::value::{AnchorId, TaggedValue, Value};

/// A named node that may be referenced from several places.
#[derive(Clone, PartialEq, Eq)]
pub struct Anchor {
    pub name: String,
    pub value: Value,
}

/// A YAML document: a root value plus the anchored nodes it refers to.
///
/// Anchored nodes are owned here, once. The tree refers to them through
/// [`Value::Shared`] handles, so aliases share identity with their anchor
/// and self-referential documents are representable.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Document {
    root: Value,
    anchors: Vec<Anchor>,
}

impl Document {
    pub fn new(root: Value) -> Self {
        Self {
            root,
            anchors: Vec::new(),
        }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn set_root(&mut self, root: Value) {
        self.root = root;
    }

    pub fn into_root(self) -> Value {
        self.root
    }

    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    pub fn anchor(&self, id: AnchorId) -> Option<&Anchor> {
        self.anchors.get(id.0)
    }

    /// Add a shared node and return its handle.
    pub fn add_anchor(&mut self, name: impl Into<String>, value: Value) -> AnchorId {
        let id = AnchorId(self.anchors.len());
        self.anchors.push(Anchor {
            name: name.into(),
            value,
        });
        id
    }

    /// Replace the node behind a handle. Unknown handles are ignored.
    pub fn set_anchor(&mut self, id: AnchorId, value: Value) {
        if let Some(anchor) = self.anchors.get_mut(id.0) {
            anchor.value = value;
        }
    }

    /// Follow shared handles until a concrete node is reached.
    ///
    /// A dangling handle, or a chain of handles that loops back on
    /// itself, resolves to the last handle seen.
    pub fn resolve<'a>(&'a self, value: &'a Value) -> &'a Value {
        let mut current = value;
        for _ in 0..=self.anchors.len() {
            match current {
                Value::Shared(id) => match self.anchors.get(id.0) {
                    Some(anchor) => current = &anchor.value,
                    None => return current,
                },
                _ => return current,
            }
        }
        current
    }

    /// Look up a string key in the root mapping, following handles.
    pub fn get(&self, key: &str) -> Option<&Value> {
        let root = self.resolve(&self.root);
        root.get(key).map(|v| self.resolve(v))
    }

    /// Deep copy of the root with every handle replaced by its node.
    ///
    /// Fails on documents that contain a cycle.
    pub fn expand(&self) -> Result<Value> {
        let mut active = vec![false; self.anchors.len()];
        self.expand_value(&self.root, &mut active)
    }

    fn expand_value(&self, value: &Value, active: &mut [bool]) -> Result<Value> {
        Ok(match value {
            Value::Shared(id) => {
                let anchor = self
                    .anchors
                    .get(id.0)
                    .ok_or(SerializeError::DanglingAnchor(id.0))?;
                if active[id.0] {
                    return Err(SerializeError::Cycle(anchor.name.clone()).into());
                }
                active[id.0] = true;
                let expanded = self.expand_value(&anchor.value, active)?;
                active[id.0] = false;
                expanded
            }
            Value::Sequence(items) => Value::Sequence(
                items
                    .iter()
                    .map(|item| self.expand_value(item, active))
                    .collect::<Result<_>>()?,
            ),
            Value::Mapping(map) => {
                let mut out = Mapping::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(self.expand_value(k, active)?, self.expand_value(v, active)?);
                }
                Value::Mapping(out)
            }
            Value::Tagged(t) => Value::Tagged(Box::new(TaggedValue {
                tag: t.tag.clone(),
                value: self.expand_value(&t.value, active)?,
            })),
            other => other.clone(),
        })
    }
}

impl From<Value> for Document {
    fn from(root: Value) -> Self {
        Document::new(root)
    }
}

impl fmt::Debug for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "&{} ", self.name)?;
        fmt::Debug::fmt(&self.value, f)
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.anchors.is_empty() {
            return fmt::Debug::fmt(&self.root, f);
        }
        f.debug_struct("Document")
            .field("root", &self.root)
            .field("anchors", &AnchorTable(&self.anchors))
            .finish()
    }
}

struct AnchorTable<'a>(&'a [Anchor]);

impl fmt::Debug for AnchorTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.iter().enumerate().map(|(i, a)| (Handle(i), a)))
            .finish()
    }
}

struct Handle(usize);

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
