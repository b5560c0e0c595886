use ndarray::Array2;
use std::collections::{BTreeMap, BTreeSet};

/// Hierarchical attribute/group read access, the decoder's only view of the
/// source file.
///
/// Paths are `/`-separated group paths; the empty string addresses the root.
/// A missing group, attribute or dataset is a first-class `None`, never an
/// error: the decoder uses absence to select fallback strategies.
pub trait VolumeContainer {
    /// Names of the direct child groups of `path`
    fn group_names(&self, path: &str) -> Vec<String>;

    /// Scalar floating-point attribute, coercing integer attributes
    fn attr_f64(&self, path: &str, key: &str) -> Option<f64>;

    /// Scalar integer attribute
    fn attr_i64(&self, path: &str, key: &str) -> Option<i64>;

    /// String attribute
    fn attr_str(&self, path: &str, key: &str) -> Option<String>;

    /// 1D floating-point array attribute
    fn attr_f64_array(&self, path: &str, key: &str) -> Option<Vec<f64>>;

    /// Raw 2D sample dataset stored under `path/data`
    fn data_array(&self, path: &str) -> Option<Array2<f64>>;
}

/// Attribute value stored in a [`MemoryContainer`]
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Float(f64),
    Int(i64),
    Str(String),
    FloatArray(Vec<f64>),
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<Vec<f64>> for AttrValue {
    fn from(v: Vec<f64>) -> Self {
        AttrValue::FloatArray(v)
    }
}

/// In-memory [`VolumeContainer`] with a small builder API.
///
/// Serves tests and embedders that already hold the source hierarchy in
/// memory; on-disk backends implement the trait outside this crate.
#[derive(Debug, Clone, Default)]
pub struct MemoryContainer {
    groups: BTreeSet<String>,
    attrs: BTreeMap<String, BTreeMap<String, AttrValue>>,
    arrays: BTreeMap<String, Array2<f64>>,
}

impl MemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a group and all of its ancestors
    pub fn add_group(&mut self, path: &str) -> &mut Self {
        let mut prefix = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(part);
            self.groups.insert(prefix.clone());
        }
        self
    }

    /// Set an attribute on a group, creating the group if needed
    pub fn set_attr(&mut self, path: &str, key: &str, value: impl Into<AttrValue>) -> &mut Self {
        self.add_group(path);
        self.attrs
            .entry(path.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
        self
    }

    /// Store the raw sample dataset of a group
    pub fn set_data(&mut self, path: &str, data: Array2<f64>) -> &mut Self {
        self.add_group(path);
        self.arrays.insert(path.to_string(), data);
        self
    }

    fn attr(&self, path: &str, key: &str) -> Option<&AttrValue> {
        self.attrs.get(path)?.get(key)
    }
}

impl VolumeContainer for MemoryContainer {
    fn group_names(&self, path: &str) -> Vec<String> {
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        };
        self.groups
            .iter()
            .filter_map(|g| {
                let rest = g.strip_prefix(&prefix)?;
                if rest.is_empty() || rest.contains('/') {
                    None
                } else {
                    Some(rest.to_string())
                }
            })
            .collect()
    }

    fn attr_f64(&self, path: &str, key: &str) -> Option<f64> {
        match self.attr(path, key)? {
            AttrValue::Float(v) => Some(*v),
            AttrValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    fn attr_i64(&self, path: &str, key: &str) -> Option<i64> {
        match self.attr(path, key)? {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    fn attr_str(&self, path: &str, key: &str) -> Option<String> {
        match self.attr(path, key)? {
            AttrValue::Str(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn attr_f64_array(&self, path: &str, key: &str) -> Option<Vec<f64>> {
        match self.attr(path, key)? {
            AttrValue::FloatArray(v) => Some(v.clone()),
            _ => None,
        }
    }

    fn data_array(&self, path: &str) -> Option<Array2<f64>> {
        self.arrays.get(path).cloned()
    }
}
