//! The control catalog.
//!
//! A catalog is loaded once at startup and shared as an immutable reference.
//! Controls keep their load order (files sorted by name), which makes router
//! ranking ties deterministic.

mod loader;
mod types;

pub use loader::load_catalog;
#[allow(unused_imports)]
pub use types::{
    BindSpec, ControlDefinition, ControlIntent, FieldType, KeywordSet, QueryDefinition,
    ResultColumn,
};

use std::collections::HashMap;

use crate::error::{Result, VitalsError};

/// Immutable, ordered collection of control definitions.
#[derive(Debug, Clone)]
pub struct ControlCatalog {
    controls: Vec<ControlDefinition>,
    by_id: HashMap<String, usize>,
}

impl ControlCatalog {
    /// Builds a catalog from pre-validated controls, enforcing cross-control
    /// rules (unique ids). Order of `controls` becomes iteration order.
    pub fn from_controls(controls: Vec<ControlDefinition>) -> Result<Self> {
        let mut by_id = HashMap::with_capacity(controls.len());
        for (idx, control) in controls.iter().enumerate() {
            if by_id.insert(control.control_id.clone(), idx).is_some() {
                return Err(VitalsError::catalog(format!(
                    "duplicate control_id '{}'",
                    control.control_id
                )));
            }
        }
        Ok(Self { controls, by_id })
    }

    /// All controls in catalog order.
    pub fn get_all_controls(&self) -> &[ControlDefinition] {
        &self.controls
    }

    /// Looks up a control by id.
    pub fn get_control(&self, control_id: &str) -> Option<&ControlDefinition> {
        self.by_id.get(control_id).map(|&idx| &self.controls[idx])
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }
}
