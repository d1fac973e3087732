//! Flattening of per-image nested batches for model inference, and the
//! inverse restoration.
//!
//! The [`Structure`] returned by [`flatten`] is the only state needed to undo
//! it: `restore(flatten(x).1, &flatten(x).0) == x`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReshapeError {
    #[error("structure expects {expected} values but {actual} were given")]
    CountMismatch { expected: usize, actual: usize },
    #[error("structure describes {expected} images but {actual} were given")]
    ImageCountMismatch { expected: usize, actual: usize },
    #[error("image {image} has {actual} items, structure expects {expected}")]
    ImageMismatch {
        image: usize,
        expected: usize,
        actual: usize,
    },
}

/// Number of items contributed by each image, in image order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Structure(Vec<usize>);

impl Structure {
    pub fn new(counts: Vec<usize>) -> Self {
        Self(counts)
    }

    pub fn counts(&self) -> &[usize] {
        &self.0
    }

    /// Number of images
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of flattened items
    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }

    /// Start index of each image's slice in the flattened batch
    pub fn offsets(&self) -> Vec<usize> {
        self.0
            .iter()
            .scan(0, |start, &count| {
                let current = *start;
                *start += count;
                Some(current)
            })
            .collect()
    }

    fn check(&self, actual: usize) -> Result<(), ReshapeError> {
        let expected = self.total();
        if expected == actual {
            Ok(())
        } else {
            Err(ReshapeError::CountMismatch { expected, actual })
        }
    }
}

impl From<Vec<usize>> for Structure {
    fn from(counts: Vec<usize>) -> Self {
        Self(counts)
    }
}

/// Concatenate per-image lists in image order
pub fn flatten<T>(nested: Vec<Vec<T>>) -> (Structure, Vec<T>) {
    let structure = Structure(nested.iter().map(Vec::len).collect());
    let flat = nested.into_iter().flatten().collect();
    (structure, flat)
}

/// Split a flat batch back into per-image lists.
///
/// Image `i` receives exactly `structure[i]` consecutive values.
pub fn restore<T>(flat: Vec<T>, structure: &Structure) -> Result<Vec<Vec<T>>, ReshapeError> {
    structure.check(flat.len())?;

    let mut values = flat.into_iter();
    Ok(structure
        .counts()
        .iter()
        .map(|&count| values.by_ref().take(count).collect())
        .collect())
}

/// Borrowing variant of [`restore`] using index slices
pub fn restore_slices<'a, T>(
    flat: &'a [T],
    structure: &Structure,
) -> Result<Vec<&'a [T]>, ReshapeError> {
    structure.check(flat.len())?;

    Ok(structure
        .offsets()
        .into_iter()
        .zip(structure.counts())
        .map(|(start, &count)| &flat[start..start + count])
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_running_sums() {
        let structure = Structure::new(vec![2, 0, 3, 1]);
        assert_eq!(structure.offsets(), vec![0, 2, 2, 5]);
        assert_eq!(structure.total(), 6);
    }

    #[test]
    fn slices_follow_structure() {
        let structure = Structure::new(vec![1, 0, 2]);
        let slices = restore_slices(&[7, 8, 9], &structure).unwrap();
        assert_eq!(slices, vec![&[7][..], &[][..], &[8, 9][..]]);
    }

    #[test]
    fn slices_reject_short_input() {
        let structure = Structure::new(vec![1, 2]);
        assert_eq!(
            restore_slices(&[1, 2], &structure),
            Err(ReshapeError::CountMismatch {
                expected: 3,
                actual: 2
            })
        );
    }
}
