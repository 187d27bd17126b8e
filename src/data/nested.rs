//! Shape-preserving trees of leaves
//!
//! Validation data may be a single dataset or arbitrarily nested lists of
//! datasets. `Nested` models that shape so the same stream constructor can be
//! applied to every leaf while the output mirrors the input exactly.

use std::fmt;

use serde_json::Value;

use crate::error::{Error, Result};

/// A leaf, or an ordered list of subtrees
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Nested<T> {
    Leaf(T),
    Node(Vec<Nested<T>>),
}

/// Position of an entry inside a `Nested` tree, as child offsets from the root
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TreePath(Vec<usize>);

impl TreePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn segments(&self) -> &[usize] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Path of the `index`-th child of this position
    pub fn child(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(index);
        Self(segments)
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "root");
        }
        for index in &self.0 {
            write!(f, "[{}]", index)?;
        }
        Ok(())
    }
}

impl<T> Nested<T> {
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    pub fn as_leaf(&self) -> Option<&T> {
        match self {
            Self::Leaf(value) => Some(value),
            Self::Node(_) => None,
        }
    }

    pub fn into_leaf(self) -> Option<T> {
        match self {
            Self::Leaf(value) => Some(value),
            Self::Node(_) => None,
        }
    }

    /// Children of a node; a leaf has none
    pub fn children(&self) -> &[Nested<T>] {
        match self {
            Self::Leaf(_) => &[],
            Self::Node(children) => children,
        }
    }

    /// Borrowing view with the same shape
    pub fn as_ref(&self) -> Nested<&T> {
        match self {
            Self::Leaf(value) => Nested::Leaf(value),
            Self::Node(children) => Nested::Node(children.iter().map(Nested::as_ref).collect()),
        }
    }

    /// Leaves in depth-first order
    pub fn leaves(&self) -> Vec<&T> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a T>) {
        match self {
            Self::Leaf(value) => out.push(value),
            Self::Node(children) => children.iter().for_each(|c| c.collect_leaves(out)),
        }
    }

    pub fn num_leaves(&self) -> usize {
        match self {
            Self::Leaf(_) => 1,
            Self::Node(children) => children.iter().map(Nested::num_leaves).sum(),
        }
    }

    /// Whether both trees have the same nesting, ignoring leaf values
    pub fn same_shape<U>(&self, other: &Nested<U>) -> bool {
        match (self, other) {
            (Self::Leaf(_), Nested::Leaf(_)) => true,
            (Self::Node(a), Nested::Node(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_shape(y))
            }
            _ => false,
        }
    }

    /// Replace every leaf, keeping the shape
    pub fn map<U, F>(self, mut f: F) -> Nested<U>
    where
        F: FnMut(T) -> U,
    {
        self.map_inner(&mut f)
    }

    fn map_inner<U, F>(self, f: &mut F) -> Nested<U>
    where
        F: FnMut(T) -> U,
    {
        match self {
            Self::Leaf(value) => Nested::Leaf(f(value)),
            Self::Node(children) => {
                Nested::Node(children.into_iter().map(|c| c.map_inner(f)).collect())
            }
        }
    }

    /// Fallible leaf replacement; `f` also receives the leaf's position.
    ///
    /// Stops at the first error in depth-first order.
    pub fn try_map<U, E, F>(self, mut f: F) -> std::result::Result<Nested<U>, E>
    where
        F: FnMut(&TreePath, T) -> std::result::Result<U, E>,
    {
        self.try_map_inner(&mut TreePath::root(), &mut f)
    }

    fn try_map_inner<U, E, F>(
        self,
        path: &mut TreePath,
        f: &mut F,
    ) -> std::result::Result<Nested<U>, E>
    where
        F: FnMut(&TreePath, T) -> std::result::Result<U, E>,
    {
        match self {
            Self::Leaf(value) => f(path, value).map(Nested::Leaf),
            Self::Node(children) => {
                let mut mapped = Vec::with_capacity(children.len());
                for (index, child) in children.into_iter().enumerate() {
                    path.0.push(index);
                    let result = child.try_map_inner(path, f);
                    path.0.pop();
                    mapped.push(result?);
                }
                Ok(Nested::Node(mapped))
            }
        }
    }

    /// Borrowing variant of [`Nested::try_map`]
    pub fn try_map_ref<U, E, F>(&self, mut f: F) -> std::result::Result<Nested<U>, E>
    where
        F: FnMut(&TreePath, &T) -> std::result::Result<U, E>,
    {
        self.as_ref().try_map(|path, value| f(path, value))
    }
}

impl Nested<String> {
    /// Parse dataset references out of a configuration value.
    ///
    /// Strings are leaves and arrays are nodes. Anything else cannot name a
    /// dataset and is rejected with its position.
    pub fn from_value(value: &Value) -> Result<Self> {
        Self::from_value_at(value, &TreePath::root())
    }

    fn from_value_at(value: &Value, path: &TreePath) -> Result<Self> {
        match value {
            Value::String(name) if !name.trim().is_empty() => Ok(Self::Leaf(name.clone())),
            Value::String(_) => Err(Error::structural(path, "empty dataset name")),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| Self::from_value_at(item, &path.child(index)))
                .collect::<Result<Vec<_>>>()
                .map(Self::Node),
            other => Err(Error::structural(
                path,
                format!("expected a dataset name or a list, found {}", describe(other)),
            )),
        }
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

impl<T> From<T> for Nested<T> {
    fn from(value: T) -> Self {
        Self::Leaf(value)
    }
}
