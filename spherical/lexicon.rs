use std::collections::HashMap;

/// A compact id naming a canonical set in an [IdSetLexicon]
pub type IdSetId = u32;

/// Every lexicon names the empty set with this id
pub const EMPTY_SET_ID: IdSetId = 0;

/// Canonicalizes sets of small integers into dense ids
///
/// Sets are canonicalized by sorting and deduplication, so equal sets always receive the same id
/// and ids can be compared for set equality. Ids are dense and start at zero, so callers can use
/// them as array indices. The lexicon is append-only: ids stay valid for its whole lifetime.
///
/// The builder keeps two of these: one for caller-supplied edge labels, one for the input-edge
/// ids that collapse onto each snapped edge.
#[derive(Debug, Clone)]
pub struct IdSetLexicon {
    sets: Vec<Vec<u32>>,
    ids: HashMap<Vec<u32>, IdSetId>,
}

impl Default for IdSetLexicon {
    fn default() -> Self {
        IdSetLexicon::new()
    }
}

impl IdSetLexicon {
    pub fn new() -> Self {
        let mut ids = HashMap::new();
        ids.insert(Vec::new(), EMPTY_SET_ID);
        IdSetLexicon {
            sets: vec![Vec::new()],
            ids,
        }
    }

    /// The id of the canonicalized `values`, allocating a new id for an unseen set
    pub fn add(&mut self, values: impl IntoIterator<Item = u32>) -> IdSetId {
        let mut set: Vec<u32> = values.into_iter().collect();
        set.sort_unstable();
        set.dedup();
        if let Some(&id) = self.ids.get(&set) {
            return id;
        }
        let id = self.sets.len() as IdSetId;
        self.ids.insert(set.clone(), id);
        self.sets.push(set);
        id
    }

    pub fn singleton(&mut self, value: u32) -> IdSetId {
        self.add([value])
    }

    /// The id of the union of the given sets
    pub fn union(&mut self, set_ids: impl IntoIterator<Item = IdSetId>) -> IdSetId {
        let mut values = Vec::new();
        for set_id in set_ids {
            values.extend_from_slice(self.id_set(set_id));
        }
        self.add(values)
    }

    /// The canonical (sorted, deduplicated) contents of a set
    pub fn id_set(&self, id: IdSetId) -> &[u32] {
        &self.sets[id as usize]
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        // The empty set is always present
        false
    }

    pub fn clear(&mut self) {
        *self = IdSetLexicon::new();
    }
}
