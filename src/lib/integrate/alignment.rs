//! Canonical feature order and per-dataset feature alignment

use super::selection::ValiditySelection;
use crate::core::error::{CellfuseError, Result};
use crate::dataset::{Axis, Dataset};
use log::{debug, info};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

/// Remove one trailing version suffix (`.` followed by digits) from an identifier.
///
/// `ENSG00000141510.16` becomes `ENSG00000141510`; identifiers without a numeric
/// suffix are returned unchanged.
pub fn strip_version(id: &str) -> &str {
    match id.rsplit_once('.') {
        Some((stem, suffix))
            if !stem.is_empty()
                && !suffix.is_empty()
                && suffix.bytes().all(|b| b.is_ascii_digit()) =>
        {
            stem
        }
        _ => id,
    }
}

/// Read the feature identifiers at the selected rows, optionally version-stripped.
pub fn read_feature_ids(
    dataset: &dyn Dataset,
    rows: &ValiditySelection,
    feat_attr: &str,
    strip: bool,
) -> Result<Vec<String>> {
    let values = dataset.read_attribute(Axis::Row, feat_attr)?;
    let mut ids = values.select_strings(rows.positions())?;
    if strip {
        for id in ids.iter_mut() {
            let stripped_len = strip_version(id).len();
            id.truncate(stripped_len);
        }
    }
    Ok(ids)
}

/// Identifiers occurring more than once, in order of their second occurrence.
pub(crate) fn find_duplicates(ids: &[String]) -> Vec<String> {
    let mut seen = FxHashSet::default();
    let mut reported = FxHashSet::default();
    ids.iter()
        .filter(|id| !seen.insert(id.as_str()) && reported.insert(id.as_str()))
        .cloned()
        .collect()
}

/// The fixed row order of a merge: unique feature identifiers from the source
/// dataset. Immutable once built; clones share storage.
#[derive(Debug, Clone)]
pub struct CanonicalFeatureOrder {
    ids: Arc<Vec<String>>,
    lookup: Arc<FxHashMap<String, usize>>,
}

impl CanonicalFeatureOrder {
    /// Build from identifiers in their final order. `origin` names the dataset for errors.
    pub fn from_ids(origin: &str, ids: Vec<String>) -> Result<Self> {
        let duplicates = find_duplicates(&ids);
        if !duplicates.is_empty() {
            return Err(CellfuseError::DuplicateFeature {
                dataset: origin.to_string(),
                duplicates,
            });
        }
        let lookup = ids
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.clone(), idx))
            .collect();
        Ok(Self {
            ids: Arc::new(ids),
            lookup: Arc::new(lookup),
        })
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.lookup.get(id).copied()
    }
}

/// Map from a dataset's local (selected) feature position to its canonical row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureAlignment {
    targets: Vec<usize>,
}

impl FeatureAlignment {
    pub fn identity(len: usize) -> Self {
        Self {
            targets: (0..len).collect(),
        }
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.targets
    }

    /// Number of local features.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Establish the canonical feature order from the source dataset.
pub fn build_canonical(
    source: &dyn Dataset,
    rows: &ValiditySelection,
    feat_attr: &str,
    strip: bool,
) -> Result<CanonicalFeatureOrder> {
    let ids = read_feature_ids(source, rows, feat_attr, strip)?;
    let canonical = CanonicalFeatureOrder::from_ids(source.name(), ids)?;
    info!(
        "Canonical feature order from {}: {} features",
        source.name(),
        canonical.len()
    );
    Ok(canonical)
}

/// Align a dataset's selected features against `canonical`.
///
/// Every local identifier must occur in `canonical`; unmatched identifiers fail the
/// alignment with [`CellfuseError::FeatureAlignment`] listing all of them.
pub fn align(
    target: &dyn Dataset,
    rows: &ValiditySelection,
    feat_attr: &str,
    strip: bool,
    canonical: &CanonicalFeatureOrder,
) -> Result<FeatureAlignment> {
    let ids = read_feature_ids(target, rows, feat_attr, strip)?;

    let duplicates = find_duplicates(&ids);
    if !duplicates.is_empty() {
        return Err(CellfuseError::DuplicateFeature {
            dataset: target.name().to_string(),
            duplicates,
        });
    }

    let mut targets = Vec::with_capacity(ids.len());
    let mut missing = Vec::new();
    for id in &ids {
        match canonical.position(id) {
            Some(pos) => targets.push(pos),
            None => missing.push(id.clone()),
        }
    }
    if !missing.is_empty() {
        return Err(CellfuseError::FeatureAlignment {
            dataset: target.name().to_string(),
            missing,
        });
    }

    debug!(
        "Aligned {} features of {} onto {} canonical rows",
        targets.len(),
        target.name(),
        canonical.len()
    );
    Ok(FeatureAlignment { targets })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{AttributeValues, MemoryDataset};
    use anyhow::Result;

    fn with_features(name: &str, ids: &[&str]) -> MemoryDataset {
        MemoryDataset::new(name, ids.len(), 1)
            .with_row_attribute(
                "Accession",
                AttributeValues::Strings(ids.iter().map(|s| s.to_string()).collect()),
            )
            .unwrap()
    }

    #[test]
    fn version_suffix_is_stripped_once() {
        assert_eq!(strip_version("ENSG00000141510.16"), "ENSG00000141510");
        assert_eq!(strip_version("ENSG1.2.3"), "ENSG1.2");
        assert_eq!(strip_version("Gene.A"), "Gene.A");
        assert_eq!(strip_version("NoVersion"), "NoVersion");
        assert_eq!(strip_version(".5"), ".5");
        assert_eq!(strip_version("trailing."), "trailing.");
    }

    #[test]
    fn canonical_order_follows_source_selection() -> Result<()> {
        let source = with_features("src", &["A.1", "B.2", "C.3"]);
        let rows = ValiditySelection::from_mask(&[true, false, true]);
        let canonical = build_canonical(&source, &rows, "Accession", true)?;
        assert_eq!(canonical.ids(), &["A".to_string(), "C".to_string()]);
        assert_eq!(canonical.position("C"), Some(1));
        Ok(())
    }

    #[test]
    fn duplicate_source_features_are_rejected() {
        let source = with_features("src", &["A.1", "A.2"]);
        let rows = ValiditySelection::all(2);
        let err = build_canonical(&source, &rows, "Accession", true).unwrap_err();
        assert!(matches!(err, CellfuseError::DuplicateFeature { .. }));
    }

    #[test]
    fn target_alignment_maps_local_to_canonical() -> Result<()> {
        let canonical = CanonicalFeatureOrder::from_ids(
            "src",
            vec!["A".to_string(), "B".to_string(), "C".to_string()],
        )?;
        let target = with_features("tgt", &["C", "A"]);
        let alignment = align(&target, &ValiditySelection::all(2), "Accession", false, &canonical)?;
        assert_eq!(alignment.as_slice(), &[2, 0]);
        Ok(())
    }

    #[test]
    fn aligning_source_to_itself_is_identity() -> Result<()> {
        let source = with_features("src", &["A", "B", "C"]);
        let rows = ValiditySelection::all(3);
        let canonical = build_canonical(&source, &rows, "Accession", false)?;
        let alignment = align(&source, &rows, "Accession", false, &canonical)?;
        assert_eq!(alignment, FeatureAlignment::identity(3));
        Ok(())
    }

    #[test]
    fn unmatched_target_feature_names_identifier() -> Result<()> {
        let canonical =
            CanonicalFeatureOrder::from_ids("src", vec!["A".to_string(), "B".to_string()])?;
        let target = with_features("tgt", &["A", "Z"]);
        let err = align(&target, &ValiditySelection::all(2), "Accession", false, &canonical)
            .unwrap_err();
        match err {
            CellfuseError::FeatureAlignment { dataset, missing } => {
                assert_eq!(dataset, "tgt");
                assert_eq!(missing, vec!["Z".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn version_stripping_applies_to_targets_too() -> Result<()> {
        let canonical = CanonicalFeatureOrder::from_ids("src", vec!["A".to_string()])?;
        let target = with_features("tgt", &["A.7"]);
        let alignment = align(&target, &ValiditySelection::all(1), "Accession", true, &canonical)?;
        assert_eq!(alignment.as_slice(), &[0]);
        Ok(())
    }
}
