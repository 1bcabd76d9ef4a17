//! Ordered, case-insensitive HTTP header multi-map

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// HTTP headers as `name -> [values]`
///
/// Names keep their original spelling and insertion order; lookups ignore
/// ASCII case. Each name may carry several values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(IndexMap<String, Vec<String>>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.0.keys().position(|k| k.eq_ignore_ascii_case(name))
    }

    /// First value of `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// All values of `name`, in the order they were added
    pub fn get_all(&self, name: &str) -> Option<&[String]> {
        self.position(name)
            .and_then(|i| self.0.get_index(i))
            .map(|(_, values)| values.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Replace every value of `name`
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.position(&name) {
            Some(i) => {
                if let Some((_, values)) = self.0.get_index_mut(i) {
                    *values = vec![value.into()];
                }
            }
            None => {
                self.0.insert(name, vec![value.into()]);
            }
        }
    }

    /// Add a value to `name`, keeping existing ones
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.position(&name) {
            Some(i) => {
                if let Some((_, values)) = self.0.get_index_mut(i) {
                    values.push(value.into());
                }
            }
            None => {
                self.0.insert(name, vec![value.into()]);
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        let i = self.position(name)?;
        self.0.shift_remove_index(i).map(|(_, values)| values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}
