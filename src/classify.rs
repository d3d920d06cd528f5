//! Partitions the global library index by cross-unikernel occurrence count.

use crate::index::GlobalLibraryIndex;

#[derive(Debug, Clone, Default)]
/// The three disjoint partitions of a [`GlobalLibraryIndex`], each a list of
/// library names in first-observed order.
pub struct Classification {
    /// Libraries present in every unikernel (`occurrence_count == unikernel_count`)
    pub common_to_all: Vec<String>,
    /// Libraries present in more than one but not all unikernels
    pub common_subset: Vec<String>,
    /// Libraries present in exactly one unikernel
    pub individual: Vec<String>,
}

impl Classification {
    /// Whether `lib` falls in `common_subset` or `individual`
    pub fn is_subset_or_individual(&self, lib: &str) -> bool {
        self.common_subset.iter().any(|l| l == lib) || self.individual.iter().any(|l| l == lib)
    }
}

/// Partition `index` given the total number of unikernels being aligned.
pub fn classify(index: &GlobalLibraryIndex, unikernel_count: usize) -> Classification {
    let mut classification = Classification::default();
    for (name, record) in index.iter() {
        if record.occurrence_count == unikernel_count {
            classification.common_to_all.push(name.to_string());
        } else if record.occurrence_count > 1 {
            classification.common_subset.push(name.to_string());
        } else {
            classification.individual.push(name.to_string());
        }
    }
    classification
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::library::{ElfKind, LibraryRecord};

    fn record(name: &str, occurrence_count: usize) -> LibraryRecord {
        let mut r = LibraryRecord::new(name, ElfKind::Relocatable);
        r.occurrence_count = occurrence_count;
        r
    }

    #[test]
    fn partitions_are_disjoint_and_exhaustive() {
        let mut index = GlobalLibraryIndex::new();
        index.observe(&record("libuksched", 1));
        index.observe(&record("libuksched", 1));
        index.observe(&record("libhello", 1));
        index.observe(&record("libshared", 1));
        index.observe(&record("libshared", 1));

        let classification = classify(&index, 3);
        assert_eq!(classification.common_to_all, vec!["libuksched"]);
        assert_eq!(classification.common_subset, vec!["libshared"]);
        assert_eq!(classification.individual, vec!["libhello"]);
    }
}
