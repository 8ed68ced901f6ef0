//! Invertible in-place edits to a cached collection.
//!
//! A patch is an explicit command value rather than a structural diff:
//! applying it returns the exact patch that undoes it, so rollback is O(1)
//! and there is no ambiguity about partial-apply states.

use std::error::Error;
use std::fmt;

use crate::record::Record;

/// One edit to an ordered collection.
#[derive(Clone, Debug, PartialEq)]
pub enum Patch<T: Record> {
    /// Insert `item` at `index` (`None` appends). The inverse removes it.
    Insert { index: Option<usize>, item: T },
    /// Remove the item with this id. The inverse re-inserts it at the
    /// recorded position.
    Remove { id: String },
    /// Swap the item with the same id for `item`. The inverse swaps the
    /// prior value back.
    Replace { item: T },
}

impl<T: Record> Patch<T> {
    /// Append `item` to the end of the collection.
    pub fn append(item: T) -> Self {
        Patch::Insert { index: None, item }
    }

    /// Apply the edit to `items`, returning the inverse edit.
    pub(crate) fn apply(self, items: &mut Vec<T>) -> Result<Patch<T>, PatchError> {
        match self {
            Patch::Insert { index, item } => {
                let at = index.unwrap_or(items.len()).min(items.len());
                let id = item.id().to_string();
                items.insert(at, item);
                Ok(Patch::Remove { id })
            }
            Patch::Remove { id } => {
                let at = items
                    .iter()
                    .position(|existing| existing.id() == id)
                    .ok_or(PatchError::MissingTarget(id))?;
                let item = items.remove(at);
                Ok(Patch::Insert {
                    index: Some(at),
                    item,
                })
            }
            Patch::Replace { item } => {
                let at = items
                    .iter()
                    .position(|existing| existing.id() == item.id())
                    .ok_or_else(|| PatchError::MissingTarget(item.id().to_string()))?;
                let prior = std::mem::replace(&mut items[at], item);
                Ok(Patch::Replace { item: prior })
            }
        }
    }
}

/// Why a patch could not be applied. The cache entry is left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// No item with the targeted id exists in the collection.
    MissingTarget(String),
    /// The cache entry has never been populated, so there is nothing to edit.
    NoData(String),
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchError::MissingTarget(id) => write!(f, "no cached item with id {}", id),
            PatchError::NoData(key) => write!(f, "cache entry {} holds no data", key),
        }
    }
}

impl Error for PatchError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Review;

    fn review(id: &str, rating: u8) -> Review {
        Review {
            id: id.into(),
            movie: "m1".into(),
            review: "fine".into(),
            rating,
        }
    }

    #[test]
    fn insert_then_inverse_restores_the_sequence() {
        let mut items = vec![review("r1", 3), review("r2", 4)];
        let before = items.clone();

        let inverse = Patch::Insert {
            index: Some(1),
            item: review("r9", 5),
        }
        .apply(&mut items)
        .unwrap();
        assert_eq!(items[1].id, "r9");

        inverse.apply(&mut items).unwrap();
        assert_eq!(items, before);
    }

    #[test]
    fn remove_inverse_restores_original_position() {
        let mut items = vec![review("r1", 3), review("r2", 4), review("r3", 5)];
        let before = items.clone();

        let inverse = Patch::Remove { id: "r2".into() }.apply(&mut items).unwrap();
        assert_eq!(items.len(), 2);

        inverse.apply(&mut items).unwrap();
        assert_eq!(items, before);
    }

    #[test]
    fn replace_inverse_restores_prior_value() {
        let mut items = vec![review("r1", 3)];
        let before = items.clone();

        let inverse = Patch::Replace {
            item: review("r1", 5),
        }
        .apply(&mut items)
        .unwrap();
        assert_eq!(items[0].rating, 5);

        inverse.apply(&mut items).unwrap();
        assert_eq!(items, before);
    }

    #[test]
    fn append_goes_to_the_end() {
        let mut items = vec![review("r1", 3)];
        Patch::append(review("r2", 4)).apply(&mut items).unwrap();
        assert_eq!(items.last().unwrap().id, "r2");
    }

    #[test]
    fn missing_target_leaves_items_untouched() {
        let mut items = vec![review("r1", 3)];
        let err = Patch::<Review>::Remove { id: "nope".into() }
            .apply(&mut items)
            .unwrap_err();
        assert_eq!(err, PatchError::MissingTarget("nope".into()));
        assert_eq!(items.len(), 1);
    }
}
