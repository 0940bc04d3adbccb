use serde::{Deserialize, Serialize};

use super::{edit_path, Edit};

/// A collection snapshot plus the index lists describing how it was reached
/// from the previous snapshot.
///
/// `deletes` are positions in the previous snapshot; `inserts` and `updates`
/// are positions in `collection`. All three lists are ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionChange<T> {
    pub collection: Vec<T>,
    pub inserts: Vec<usize>,
    pub deletes: Vec<usize>,
    pub updates: Vec<usize>,
}

impl<T> CollectionChange<T> {
    pub fn new(
        collection: Vec<T>,
        inserts: Vec<usize>,
        deletes: Vec<usize>,
        updates: Vec<usize>,
    ) -> Self {
        Self {
            collection,
            inserts,
            deletes,
            updates,
        }
    }

    /// The first event of an observed collection: a snapshot, no changes.
    pub fn initial(collection: Vec<T>) -> Self {
        Self::new(collection, Vec::new(), Vec::new(), Vec::new())
    }

    /// Elements were inserted at `indices` of `collection`.
    pub fn inserted(collection: Vec<T>, indices: impl IntoIterator<Item = usize>) -> Self {
        Self::new(collection, sorted(indices), Vec::new(), Vec::new())
    }

    /// Elements at `indices` of the previous snapshot were removed.
    pub fn deleted(collection: Vec<T>, indices: impl IntoIterator<Item = usize>) -> Self {
        Self::new(collection, Vec::new(), sorted(indices), Vec::new())
    }

    /// Elements at `indices` were replaced in place.
    pub fn updated(collection: Vec<T>, indices: impl IntoIterator<Item = usize>) -> Self {
        Self::new(collection, Vec::new(), Vec::new(), sorted(indices))
    }

    pub fn has_changes(&self) -> bool {
        !(self.inserts.is_empty() && self.deletes.is_empty() && self.updates.is_empty())
    }
}

impl<T: PartialEq> CollectionChange<T> {
    /// Derive the change from `old` to `new` through the LCS diff.
    ///
    /// Updates are never inferred; a replaced element shows up as a delete
    /// plus an insert.
    pub fn from_diff(old: &[T], new: Vec<T>) -> Self {
        let mut inserts = Vec::new();
        let mut deletes = Vec::new();

        for edit in edit_path(old, &new) {
            match edit {
                Edit::Insert { target } => inserts.push(target),
                Edit::Delete { source, .. } => deletes.push(source),
            }
        }

        Self::new(new, inserts, deletes, Vec::new())
    }
}

fn sorted(indices: impl IntoIterator<Item = usize>) -> Vec<usize> {
    let mut indices: Vec<usize> = indices.into_iter().collect();
    indices.sort_unstable();
    indices.dedup();
    indices
}
