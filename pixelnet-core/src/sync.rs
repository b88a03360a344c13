//! Weight synchronization between a global network and its local copies.
//!
//! A [`SyncPlan`] is computed once from the parameter shapes of both networks.
//! Building it fails unless both sides have exactly the same keys with the same
//! shapes, so a plan that exists can always be executed.
use crate::error::PixelNetError;
use std::collections::BTreeMap;

/// Assignment of one source parameter to the destination parameter of the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Parameter key, e.g. `l1_w`.
    pub key: String,

    /// Shape shared by both parameters.
    pub shape: Vec<usize>,
}

/// Validated list of per-key assignments, ordered by key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    assignments: Vec<Assignment>,
}

impl SyncPlan {
    /// Builds the plan copying `source` into `dest`.
    ///
    /// Both arguments map parameter keys to shapes.
    pub fn new(
        source: &BTreeMap<String, Vec<usize>>,
        dest: &BTreeMap<String, Vec<usize>>,
    ) -> Result<Self, PixelNetError> {
        let missing: Vec<String> = source
            .keys()
            .filter(|k| !dest.contains_key(*k))
            .cloned()
            .collect();
        let unexpected: Vec<String> = dest
            .keys()
            .filter(|k| !source.contains_key(*k))
            .cloned()
            .collect();

        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(PixelNetError::WeightKeyMismatch {
                missing,
                unexpected,
            });
        }

        let mut assignments = Vec::with_capacity(source.len());
        for (key, source_shape) in source.iter() {
            let dest_shape = &dest[key];
            if source_shape != dest_shape {
                return Err(PixelNetError::WeightShapeMismatch {
                    key: key.clone(),
                    source_shape: source_shape.clone(),
                    dest_shape: dest_shape.clone(),
                });
            }
            assignments.push(Assignment {
                key: key.clone(),
                shape: source_shape.clone(),
            });
        }

        Ok(Self { assignments })
    }

    /// Assignments in key order.
    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    /// Number of assignments.
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    /// Returns `true` if the plan copies nothing.
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Keys in the order they are assigned.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.assignments.iter().map(|a| a.key.as_str())
    }
}
