use rustc_hash::FxHashMap;

/// Name lookup for the arena. Renamed reads keep their old entry; callers
/// check the stored name when that matters.
#[derive(Debug, Default)]
pub struct SequenceIndex {
    name_to_id: FxHashMap<String, usize>,
}

impl SequenceIndex {
    pub fn new() -> Self {
        SequenceIndex {
            name_to_id: FxHashMap::default(),
        }
    }

    /// Register `name` for `id`, returning the id it previously mapped to.
    pub fn insert(&mut self, name: &str, id: usize) -> Option<usize> {
        self.name_to_id.insert(name.to_owned(), id)
    }

    pub fn get_id(&self, name: &str) -> Option<usize> {
        self.name_to_id.get(name).copied()
    }

    pub fn remove(&mut self, name: &str) -> Option<usize> {
        self.name_to_id.remove(name)
    }

    pub fn len(&self) -> usize {
        self.name_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.name_to_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_lookup() {
        let mut index = SequenceIndex::new();
        assert_eq!(index.insert("read_a", 0), None);
        assert_eq!(index.insert("ctg1", 1), None);
        assert_eq!(index.get_id("ctg1"), Some(1));
        assert_eq!(index.insert("ctg1", 4), Some(1));
        assert_eq!(index.remove("read_a"), Some(0));
        assert_eq!(index.get_id("read_a"), None);
        assert_eq!(index.len(), 1);
    }
}
