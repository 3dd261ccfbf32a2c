//! Ordered string parameters.
//!
//! [`Params`] stores the values captured from a request path as well as the
//! key/value pairs handed to [`Router::url_for`](crate::Router::url_for). Insertion
//! order is preserved and writing an existing key replaces its value in place, so
//! the last write wins without moving the entry.

/// Key under which a `*` pattern segment stores the captured remainder.
pub const SPLAT: &str = ":splat";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, String)>,
}

impl Params {
    #[inline]
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Builds parameters from a flattened `[k1, v1, k2, v2, ..]` slice.
    ///
    /// Returns `None` when the slice has an odd length.
    pub fn from_flat<S: AsRef<str>>(values: &[S]) -> Option<Self> {
        if values.len() % 2 != 0 {
            return None;
        }

        let mut params = Self::new();
        for pair in values.chunks_exact(2) {
            params.insert(pair[0].as_ref(), pair[1].as_ref());
        }
        Some(params)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: impl AsRef<str>) -> Option<&str> {
        let key = key.as_ref();
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    #[inline]
    pub fn contains_key(&self, key: impl AsRef<str>) -> bool {
        self.get(key).is_some()
    }

    /// Inserts a value, replacing the value of an existing key in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: impl AsRef<str>) -> Option<String> {
        let key = key.as_ref();
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Merges `other` into `self`, values of `other` win on key collision.
    pub fn extend(&mut self, other: Params) {
        for (k, v) in other.entries {
            self.insert(k, v);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Splits the `:splat` value on `/` into positional keys `"0"`, `"1"`, ...
    pub fn explode_splat(&mut self) {
        let Some(splat) = self.get(SPLAT).map(str::to_owned) else {
            return;
        };

        for (index, part) in splat.split('/').enumerate() {
            self.insert(index.to_string(), part);
        }
    }

    /// Renders the parameters as a query string: `?k1=v1&k2=v2`, or an empty string.
    ///
    /// Keys and values are emitted as given, without escaping.
    pub fn to_query(&self) -> String {
        if self.entries.is_empty() {
            return String::new();
        }

        let pairs = self.entries.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>();
        format!("?{}", pairs.join("&"))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}
