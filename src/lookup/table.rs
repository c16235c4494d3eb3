use std::collections::BTreeMap;

use super::{Error, NameKind, Result};

/// Bidirectional id/name table for one [`NameKind`].
///
/// Both directions are filled together when the table is built and names are
/// normalized on insertion and on lookup, so `CAP_NET_RAW`, `cap_net_raw` and
/// `net_raw` all resolve to the same entry.
#[derive(Debug, Clone)]
pub struct Lookup {
    kind: NameKind,
    names: BTreeMap<u32, String>,
    ids: BTreeMap<String, u32>,
}

impl Lookup {
    /// Builds a table from `(id, name)` pairs.
    ///
    /// A later pair overrides an earlier one with the same id or name.
    pub fn new<N: AsRef<str>>(kind: NameKind, entries: impl IntoIterator<Item = (u32, N)>) -> Self {
        let mut names = BTreeMap::new();
        let mut ids = BTreeMap::new();
        for (id, name) in entries {
            let name = kind.normalize(name.as_ref());
            if let Some(old_name) = names.insert(id, name.clone()) {
                ids.remove(&old_name);
            }
            if let Some(old_id) = ids.insert(name, id) {
                if old_id != id {
                    names.remove(&old_id);
                }
            }
        }
        Self { kind, names, ids }
    }

    /// Returns the name registered for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownId`] if `id` is not registered.
    pub fn name(&self, id: i64) -> Result<&str> {
        u32::try_from(id)
            .ok()
            .and_then(|id| self.names.get(&id))
            .map(String::as_str)
            .ok_or(Error::UnknownId {
                kind: self.kind,
                id,
            })
    }

    /// Returns the id registered for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownName`] if `name` is not registered.
    pub fn id(&self, name: &str) -> Result<u32> {
        let normalized = self.kind.normalize(name);
        self.ids
            .get(&normalized)
            .copied()
            .ok_or_else(|| Error::UnknownName {
                kind: self.kind,
                name: name.to_owned(),
            })
    }

    /// Iterates over all entries ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.names.iter().map(|(id, name)| (*id, name.as_str()))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities() -> Lookup {
        Lookup::new(
            NameKind::Capability,
            [(0, "CAP_CHOWN"), (12, "CAP_NET_ADMIN"), (13, "CAP_NET_RAW")],
        )
    }

    #[test]
    fn test_inverse_lookups() {
        let lookup = capabilities();
        for (id, name) in lookup.iter() {
            assert_eq!(lookup.id(name).unwrap(), id);
            assert_eq!(lookup.name(i64::from(id)).unwrap(), name);
        }
        assert_eq!(lookup.len(), 3);
    }

    #[test]
    fn test_lookup_normalizes_queries() {
        let lookup = capabilities();
        assert_eq!(lookup.name(13).unwrap(), "net_raw");
        assert_eq!(lookup.id("CAP_NET_RAW").unwrap(), 13);
        assert_eq!(lookup.id("Net_Raw").unwrap(), 13);
    }

    #[test]
    fn test_unknown_lookups_fail() {
        let lookup = capabilities();
        assert!(matches!(
            lookup.name(99),
            Err(Error::UnknownId { id: 99, .. })
        ));
        assert!(matches!(lookup.name(-1), Err(Error::UnknownId { .. })));
        assert!(matches!(
            lookup.id("sys_admin"),
            Err(Error::UnknownName { .. })
        ));
    }

    #[test]
    fn test_duplicate_entries_keep_maps_inverse() {
        let lookup = Lookup::new(NameKind::Syscall, [(1, "write"), (1, "pwrite"), (2, "pwrite")]);
        assert!(lookup.id("write").is_err());
        assert!(lookup.name(1).is_err());
        assert_eq!(lookup.id("pwrite").unwrap(), 2);
        assert_eq!(lookup.name(2).unwrap(), "pwrite");
    }
}
