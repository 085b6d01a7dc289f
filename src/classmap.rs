//! Cross-model class reconciliation.
//!
//! Heterogeneous detectors carry disjoint class vocabularies. The `ClassMap`
//! is built once at startup from each adapter's vocabulary (restricted to its
//! allowed classes) and translates any adapter's local class id into the
//! canonical class space of adapter 0. It is read-only after construction and
//! safe to share across frames.

use anyhow::{anyhow, Result};

/// One canonical class with its per-adapter local ids.
#[derive(Clone, Debug)]
struct ClassRow {
    /// Lowercased class name as spelled by adapter 0.
    name: String,
    /// `ids[k]` is adapter k's local id for this class, or `None` when the
    /// adapter has no class of that name. `ids[0]` is the canonical id.
    ids: Vec<Option<u32>>,
}

/// Cross-adapter class identity table.
#[derive(Clone, Debug)]
pub struct ClassMap {
    rows: Vec<ClassRow>,
    adapter_count: usize,
}

impl ClassMap {
    /// Build the table from each adapter's vocabulary and allowed-class list.
    ///
    /// Matching is an exact case-insensitive name comparison. When two allowed
    /// ids in the same adapter share a name, the first occurrence (allowed-list
    /// order) wins; this is deliberately permissive, not an error.
    ///
    /// Fails when the inputs are inconsistent: no adapters, mismatched list
    /// lengths, an empty vocabulary, or an allowed id outside its vocabulary.
    /// An inconsistent table here is a configuration error and must stop the
    /// run before any sampling happens.
    pub fn build(vocabularies: &[Vec<String>], allowed_classes: &[Vec<u32>]) -> Result<Self> {
        if vocabularies.is_empty() {
            return Err(anyhow!("class map requires at least one adapter"));
        }
        if vocabularies.len() != allowed_classes.len() {
            return Err(anyhow!(
                "vocabulary count ({}) does not match allowed-class list count ({})",
                vocabularies.len(),
                allowed_classes.len()
            ));
        }
        for (adapter, (vocab, allowed)) in vocabularies.iter().zip(allowed_classes).enumerate() {
            if vocab.is_empty() {
                return Err(anyhow!("adapter {} has an empty class vocabulary", adapter));
            }
            for &id in allowed {
                if id as usize >= vocab.len() {
                    return Err(anyhow!(
                        "adapter {}: allowed class id {} outside vocabulary of {} classes",
                        adapter,
                        id,
                        vocab.len()
                    ));
                }
            }
        }

        let lowered: Vec<Vec<String>> = vocabularies
            .iter()
            .map(|vocab| vocab.iter().map(|n| n.to_lowercase()).collect())
            .collect();

        let mut rows: Vec<ClassRow> = Vec::new();
        for &canonical_id in &allowed_classes[0] {
            let name = lowered[0][canonical_id as usize].clone();
            // First occurrence wins on duplicate names within adapter 0.
            if rows.iter().any(|row| row.name == name) {
                continue;
            }
            let mut ids = vec![Some(canonical_id)];
            for adapter in 1..lowered.len() {
                let found = allowed_classes[adapter]
                    .iter()
                    .copied()
                    .find(|&id| lowered[adapter][id as usize] == name);
                ids.push(found);
            }
            rows.push(ClassRow { name, ids });
        }

        Ok(Self {
            rows,
            adapter_count: vocabularies.len(),
        })
    }

    /// Translate an adapter-local class id into the canonical class space.
    ///
    /// Identity for every allowed class of adapter 0; `None` when the class has
    /// no canonical counterpart.
    pub fn map_to_canonical(&self, adapter_index: usize, local_class_id: u32) -> Option<u32> {
        if adapter_index >= self.adapter_count {
            return None;
        }
        self.rows
            .iter()
            .find(|row| row.ids[adapter_index] == Some(local_class_id))
            .and_then(|row| row.ids[0])
    }

    /// Translate a canonical class id into an adapter's local class space.
    pub fn local_id(&self, adapter_index: usize, canonical_class_id: u32) -> Option<u32> {
        if adapter_index >= self.adapter_count {
            return None;
        }
        self.rows
            .iter()
            .find(|row| row.ids[0] == Some(canonical_class_id))
            .and_then(|row| row.ids[adapter_index])
    }

    /// Canonical class names in row order, for the dataset manifest.
    pub fn canonical_names(&self) -> Vec<String> {
        self.rows.iter().map(|row| row.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn adapter_count(&self) -> usize {
        self.adapter_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn canonical_mapping_is_identity_for_adapter_zero() {
        let vocabularies = vec![vocab(&["person", "helmet", "car"]), vocab(&["car", "person"])];
        let allowed = vec![vec![0, 1, 2], vec![0, 1]];
        let map = ClassMap::build(&vocabularies, &allowed).unwrap();

        for id in [0u32, 1, 2] {
            assert_eq!(map.map_to_canonical(0, id), Some(id));
        }
    }

    #[test]
    fn names_match_case_insensitively_across_adapters() {
        let vocabularies = vec![vocab(&["Person", "Helmet"]), vocab(&["hard hat", "person"])];
        let allowed = vec![vec![0, 1], vec![0, 1]];
        let map = ClassMap::build(&vocabularies, &allowed).unwrap();

        // adapter 1's "person" (id 1) maps to canonical 0.
        assert_eq!(map.map_to_canonical(1, 1), Some(0));
        // adapter 1's "hard hat" has no canonical counterpart.
        assert_eq!(map.map_to_canonical(1, 0), None);
        // "helmet" is unmapped in adapter 1.
        assert_eq!(map.local_id(1, 1), None);
        assert_eq!(map.local_id(1, 0), Some(1));
    }

    #[test]
    fn duplicate_names_keep_the_first_occurrence() {
        let vocabularies = vec![
            vocab(&["person", "person", "car"]),
            vocab(&["person", "car", "person"]),
        ];
        let allowed = vec![vec![0, 1, 2], vec![0, 1, 2]];
        let map = ClassMap::build(&vocabularies, &allowed).unwrap();

        // One row for "person" (canonical 0), one for "car".
        assert_eq!(map.len(), 2);
        assert_eq!(map.map_to_canonical(0, 0), Some(0));
        // Adapter 0's second "person" id is not a row, so it is unmapped.
        assert_eq!(map.map_to_canonical(0, 1), None);
        // Adapter 1's first "person" occurrence wins.
        assert_eq!(map.local_id(1, 0), Some(0));
    }

    #[test]
    fn allowed_subset_restricts_rows() {
        let vocabularies = vec![vocab(&["person", "helmet", "car"]), vocab(&["person"])];
        let allowed = vec![vec![1], vec![0]];
        let map = ClassMap::build(&vocabularies, &allowed).unwrap();

        assert_eq!(map.len(), 1);
        assert_eq!(map.canonical_names(), vec!["helmet".to_string()]);
        // "person" is not allowed for adapter 0, so adapter 1's person is unmapped.
        assert_eq!(map.map_to_canonical(1, 0), None);
    }

    #[test]
    fn inconsistent_inputs_are_fatal() {
        assert!(ClassMap::build(&[], &[]).is_err());
        assert!(ClassMap::build(&[vocab(&["a"])], &[vec![0], vec![0]]).is_err());
        assert!(ClassMap::build(&[vec![]], &[vec![]]).is_err());
        assert!(ClassMap::build(&[vocab(&["a"])], &[vec![3]]).is_err());
    }
}
