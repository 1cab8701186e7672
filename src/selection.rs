//! Rows marked for batch deletion.

use std::collections::HashMap;

use crate::identity::{RowFingerprint, RowKey};

#[derive(Debug, Clone, Default)]
pub struct SelectionSet {
    selected: HashMap<RowFingerprint, RowKey>,
}

impl SelectionSet {
    pub fn new() -> Self { Self::default() }

    /// Flip one row; returns whether it is selected afterwards.
    pub fn toggle(&mut self, key: &RowKey) -> bool {
        if self.selected.remove(&key.fingerprint).is_some() {
            false
        } else {
            self.selected.insert(key.fingerprint.clone(), key.clone());
            true
        }
    }

    /// Select every row in `keys`, or clear the selection when all of them already are.
    pub fn toggle_all(&mut self, keys: &[RowKey]) {
        let all = !keys.is_empty() && keys.iter().all(|k| self.selected.contains_key(&k.fingerprint));
        if all {
            self.selected.clear();
        } else {
            for k in keys {
                self.selected.entry(k.fingerprint.clone()).or_insert_with(|| k.clone());
            }
        }
    }

    pub fn contains(&self, fp: &RowFingerprint) -> bool { self.selected.contains_key(fp) }

    pub fn len(&self) -> usize { self.selected.len() }

    pub fn is_empty(&self) -> bool { self.selected.is_empty() }

    pub fn clear(&mut self) { self.selected.clear(); }

    /// Selected keys, ordered by fingerprint so batch payloads are reproducible.
    pub fn keys(&self) -> Vec<RowKey> {
        let mut out: Vec<RowKey> = self.selected.values().cloned().collect();
        out.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::CellValue;

    fn key(id: i64) -> RowKey { RowKey::new(vec![CellValue::int(id)]) }

    #[test]
    fn toggle_flips() {
        let mut s = SelectionSet::new();
        assert!(s.toggle(&key(1)));
        assert!(s.contains(&key(1).fingerprint));
        assert!(!s.toggle(&key(1)));
        assert!(s.is_empty());
    }

    #[test]
    fn toggle_all_selects_then_clears() {
        let mut s = SelectionSet::new();
        let page = vec![key(1), key(2), key(3)];
        s.toggle(&key(2));
        s.toggle_all(&page);
        assert_eq!(s.len(), 3);
        s.toggle_all(&page);
        assert_eq!(s.len(), 0);
        s.toggle_all(&[]);
        assert!(s.is_empty());
    }

    #[test]
    fn keys_are_stable() {
        let mut s = SelectionSet::new();
        s.toggle(&key(9));
        s.toggle(&key(4));
        assert_eq!(s.keys(), s.keys());
        assert_eq!(s.keys().len(), 2);
    }
}
