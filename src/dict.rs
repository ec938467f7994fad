//! Route-compression dictionary negotiated at handshake.
//!
//! The server hands down a `route -> code` map; the reverse map is built once
//! here and both directions stay immutable until the next handshake replaces
//! the whole dictionary.

use std::collections::HashMap;

/// Bidirectional route string <-> `u16` code mapping.
#[derive(Debug, Default, Clone)]
pub struct RouteDict {
    to_code: HashMap<String, u16>,
    to_route: HashMap<u16, String>,
}

impl RouteDict {
    /// Empty dictionary: every route travels uncompressed.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from the server's handshake `dict` map.
    ///
    /// A code claimed by two routes would break decode injectivity; the
    /// first claim wins and later ones are skipped with a warning.
    pub fn from_handshake(dict: &HashMap<String, u16>) -> Self {
        let mut to_code = HashMap::with_capacity(dict.len());
        let mut to_route = HashMap::with_capacity(dict.len());

        // Iterate in sorted order so duplicate resolution is deterministic.
        let mut entries: Vec<_> = dict.iter().collect();
        entries.sort();
        for (route, &code) in entries {
            if let Some(existing) = to_route.get(&code) {
                tracing::warn!(
                    "route dict code {} claimed by {:?} and {:?}, keeping the first",
                    code,
                    existing,
                    route
                );
                continue;
            }
            to_code.insert(route.clone(), code);
            to_route.insert(code, route.clone());
        }

        Self { to_code, to_route }
    }

    /// Code for a route, if the dictionary covers it.
    #[inline]
    pub fn compress(&self, route: &str) -> Option<u16> {
        self.to_code.get(route).copied()
    }

    /// Route for a code, if the dictionary covers it.
    #[inline]
    pub fn expand(&self, code: u16) -> Option<&str> {
        self.to_route.get(&code).map(String::as_str)
    }

    /// Whether any routes are mapped.
    pub fn is_empty(&self) -> bool {
        self.to_code.is_empty()
    }

    /// Number of mapped routes.
    pub fn len(&self) -> usize {
        self.to_code.len()
    }
}
