//! Pile-type templates: expected cartons per layer, top layer first
//!
//! ```json
//! {"piles": [{"pile_id": 1, "name": "standard 5x10", "template_layers": [10, 10, 10, 10, 10]}]}
//! ```

use crate::types::TemplateLayers;
use carton_count_common::{CountError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

pub trait TemplateSource: Send + Sync {
    /// Template for `pile_id`, empty when the pile type is unknown
    fn template_layers(&self, pile_id: u32) -> TemplateLayers;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PileType {
    pub pile_id: u32,
    #[serde(default)]
    pub name: String,
    pub template_layers: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct PileConfigFile {
    piles: Vec<PileType>,
}

/// Pile types keyed by id
#[derive(Debug, Clone, Default)]
pub struct PileTypeDatabase {
    piles: HashMap<u32, PileType>,
}

impl PileTypeDatabase {
    /// Load pile types from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CountError::ConfigNotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        let db = Self::from_json(&contents)?;
        info!("Loaded {} pile types from {}", db.len(), path.display());
        Ok(db)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let file: PileConfigFile = serde_json::from_str(contents)
            .map_err(|e| CountError::ConfigParse(format!("pile config: {e}")))?;
        Self::from_piles(file.piles)
    }

    /// Build from pile types, rejecting zero layer counts and totals past `u32`
    pub fn from_piles(piles: Vec<PileType>) -> Result<Self> {
        let mut map = HashMap::with_capacity(piles.len());
        for pile in piles {
            if pile.template_layers.contains(&0) {
                return Err(CountError::ConfigParse(format!(
                    "pile {} has a layer with zero cartons",
                    pile.pile_id
                )));
            }
            let total = pile
                .template_layers
                .iter()
                .try_fold(0u32, |acc, &c| acc.checked_add(c));
            if total.is_none() {
                return Err(CountError::ConfigParse(format!(
                    "pile {} template total exceeds {}",
                    pile.pile_id,
                    u32::MAX
                )));
            }
            map.insert(pile.pile_id, pile);
        }
        Ok(Self { piles: map })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.piles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.piles.is_empty()
    }

    /// Cartons in a complete pile of this type
    #[must_use]
    pub fn total_count(&self, pile_id: u32) -> Option<u32> {
        self.piles
            .get(&pile_id)
            .map(|p| p.template_layers.iter().fold(0u32, |acc, &c| acc.saturating_add(c)))
    }

    #[must_use]
    pub fn pile_name(&self, pile_id: u32) -> Option<&str> {
        self.piles.get(&pile_id).map(|p| p.name.as_str())
    }
}

impl TemplateSource for PileTypeDatabase {
    fn template_layers(&self, pile_id: u32) -> TemplateLayers {
        self.piles
            .get(&pile_id)
            .map(|p| TemplateLayers::new(p.template_layers.clone()))
            .unwrap_or_default()
    }
}
