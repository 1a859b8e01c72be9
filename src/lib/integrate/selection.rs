//! Row/column validity selections

use crate::core::error::{CellfuseError, Result};
use crate::dataset::{Axis, Dataset};
use log::debug;

/// Strictly increasing positions along one axis of a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValiditySelection {
    positions: Vec<usize>,
}

impl ValiditySelection {
    /// Every position `0..len`.
    pub fn all(len: usize) -> Self {
        Self {
            positions: (0..len).collect(),
        }
    }

    /// Positions whose mask entry is set, in ascending order.
    pub fn from_mask(mask: &[bool]) -> Self {
        Self {
            positions: mask
                .iter()
                .enumerate()
                .filter_map(|(idx, &keep)| keep.then_some(idx))
                .collect(),
        }
    }

    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Resolve the participating positions along `axis`.
///
/// Without an attribute every position participates; with one, the positions whose
/// attribute value is truthy do, in original order.
pub fn resolve_selection(
    dataset: &dyn Dataset,
    axis: Axis,
    attr: Option<&str>,
) -> Result<ValiditySelection> {
    let len = dataset.dimension(axis);
    let Some(name) = attr else {
        return Ok(ValiditySelection::all(len));
    };

    let values = dataset.read_attribute(axis, name)?;
    if values.len() != len {
        return Err(CellfuseError::DimensionMismatch {
            expected: format!("{} attribute '{}' length = {}", axis, name, len),
            actual: format!("{} attribute '{}' length = {}", axis, name, values.len()),
        });
    }

    let selection = ValiditySelection::from_mask(&values.truthy());
    debug!(
        "{}: {} of {} {}s selected by '{}'",
        dataset.name(),
        selection.len(),
        len,
        axis,
        name
    );
    Ok(selection)
}
