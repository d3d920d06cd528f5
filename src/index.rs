//! The global library index: the running worst-case section geometry for
//! every library seen across every unikernel probed so far.

use crate::model::library::LibraryRecord;
use crate::ordered_map::OrderedMap;

#[derive(Debug, Clone, Default)]
/// Libraries indexed by name, in first-observed order, each holding the
/// largest section sizes seen across every unikernel that contains it.
pub struct GlobalLibraryIndex {
    libraries: OrderedMap<LibraryRecord>,
}

impl GlobalLibraryIndex {
    /// An empty index
    pub fn new() -> Self {
        Self {
            libraries: OrderedMap::new(),
        }
    }

    /// Fold one unikernel's probed record for a library into the index: first
    /// sighting is adopted as-is, subsequent sightings are merged via
    /// [`LibraryRecord::merge`].
    pub fn observe(&mut self, record: &LibraryRecord) {
        match self.libraries.get_mut(&record.name) {
            Some(existing) => existing.merge(record),
            None => self.libraries.insert(record.name.clone(), record.clone()),
        }
    }

    /// Look up a library's current worst-case record
    pub fn get(&self, name: &str) -> Option<&LibraryRecord> {
        self.libraries.get(name)
    }

    /// Iterate libraries in first-observed order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &LibraryRecord)> {
        self.libraries.iter()
    }

    /// How many distinct libraries have been observed
    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    /// Whether no library has been observed yet
    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }
}
