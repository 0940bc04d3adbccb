//! Sequence diffing.
//!
//! [`diff`] computes a minimal insert/delete edit script between two ordered
//! sequences using the longest common subsequence. The script is what
//! collection wrappers replay to describe a change as a [`CollectionChange`].
//!
//! Indices in a [`DiffStep`] are positions in the sequence *as it looks when
//! the step is applied*, so replaying the steps in order with [`apply`]
//! always turns the source into the target.
//!
//! # Example
//!
//! ```rust
//! use ripple_core::diff::{apply, diff, DiffStep};
//!
//! let steps = diff(&['a', 'b', 'c'], &['a', 'c', 'd']);
//! assert_eq!(
//!     steps,
//!     vec![
//!         DiffStep::Delete { element: 'b', index: 1 },
//!         DiffStep::Insert { element: 'd', index: 2 },
//!     ]
//! );
//! assert_eq!(apply(vec!['a', 'b', 'c'], &steps), vec!['a', 'c', 'd']);
//! ```

mod collection;

use serde::{Deserialize, Serialize};

pub use collection::CollectionChange;

/// One operation of an edit script.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum DiffStep<T> {
    Insert { element: T, index: usize },
    Delete { element: T, index: usize },
}

impl<T> DiffStep<T> {
    pub fn element(&self) -> &T {
        match self {
            DiffStep::Insert { element, .. } | DiffStep::Delete { element, .. } => element,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            DiffStep::Insert { index, .. } | DiffStep::Delete { index, .. } => *index,
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, DiffStep::Insert { .. })
    }
}

/// A step of the backtracked LCS path, before elements are attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Edit {
    /// `y[target]` is inserted at position `target`.
    Insert { target: usize },

    /// `x[source]` is removed from position `at`.
    Delete { source: usize, at: usize },
}

/// LCS lengths of every prefix pair, stored row-major in an (m+1)×(n+1) grid.
struct LcsTable {
    width: usize,
    cells: Vec<usize>,
}

impl LcsTable {
    fn build<T: PartialEq>(x: &[T], y: &[T]) -> Self {
        let width = y.len() + 1;
        let mut cells = vec![0; (x.len() + 1) * width];

        for i in 1..=x.len() {
            for j in 1..=y.len() {
                cells[i * width + j] = if x[i - 1] == y[j - 1] {
                    cells[(i - 1) * width + j - 1] + 1
                } else {
                    cells[(i - 1) * width + j].max(cells[i * width + j - 1])
                };
            }
        }

        Self { width, cells }
    }

    fn get(&self, i: usize, j: usize) -> usize {
        self.cells[i * self.width + j]
    }
}

/// Backtrack the LCS table into forward-ordered edits.
pub(crate) fn edit_path<T: PartialEq>(x: &[T], y: &[T]) -> Vec<Edit> {
    let table = LcsTable::build(x, y);
    let mut edits = Vec::with_capacity(x.len() + y.len() - 2 * table.get(x.len(), y.len()));
    let (mut i, mut j) = (x.len(), y.len());

    while i > 0 || j > 0 {
        if j > 0 && (i == 0 || table.get(i, j) == table.get(i, j - 1)) {
            edits.push(Edit::Insert { target: j - 1 });
            j -= 1;
        } else if i > 0 && (j == 0 || table.get(i, j) == table.get(i - 1, j)) {
            // Everything before this point already reads y[..j].
            edits.push(Edit::Delete { source: i - 1, at: j });
            i -= 1;
        } else {
            i -= 1;
            j -= 1;
        }
    }

    edits.reverse();
    edits
}

/// Compute the edit script turning `x` into `y`.
///
/// The script is minimal: its length is `x.len() + y.len() - 2 * lcs`.
/// Runs in O(m·n) time and space.
pub fn diff<T: PartialEq + Clone>(x: &[T], y: &[T]) -> Vec<DiffStep<T>> {
    edit_path(x, y)
        .into_iter()
        .map(|edit| match edit {
            Edit::Insert { target } => DiffStep::Insert {
                element: y[target].clone(),
                index: target,
            },
            Edit::Delete { source, at } => DiffStep::Delete {
                element: x[source].clone(),
                index: at,
            },
        })
        .collect()
}

/// Replay an edit script against `source`.
///
/// # Panics
///
/// Panics if a step's index is out of range for the sequence at the time the
/// step is applied, which means the script was not produced for `source`.
pub fn apply<T: Clone>(mut source: Vec<T>, steps: &[DiffStep<T>]) -> Vec<T> {
    for step in steps {
        match step {
            DiffStep::Insert { element, index } => source.insert(*index, element.clone()),
            DiffStep::Delete { index, .. } => {
                source.remove(*index);
            }
        }
    }
    source
}
