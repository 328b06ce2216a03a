use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;

use super::layout::TreeLayoutType;
use super::Tree;

pub const REFERENCE_COLOR: &str = "black";

/// Support colour bands, checked from the highest threshold down.
const SUPPORT_THRESHOLDS: [(f64, &str); 3] = [(100.0, "black"), (75.0, "darkgrey"), (50.0, "grey")];
const LOW_SUPPORT_COLOR: &str = "lightgrey";

/// Options controlling SVG output.
#[derive(Debug, Clone)]
pub struct RenderStyle {
    pub layout: TreeLayoutType,
    pub width_mm: f32,
    /// Leaves whose names match are drawn as reference taxa.
    pub reference: Option<Regex>,
    pub seed: Option<u64>,
    /// Diameter of support markers.
    pub node_size: f32,
    pub font_size: f32,
    pub font_family: String,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            layout: TreeLayoutType::Circular,
            width_mm: 500.0,
            reference: None,
            seed: None,
            node_size: 5.0,
            font_size: 10.0,
            font_family: "Arial".to_string(),
        }
    }
}

impl RenderStyle {
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }

    pub fn is_reference(&self, name: &str) -> bool {
        self.reference
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(name))
    }
}

/// Species key of a leaf: its name up to the first underscore.
pub fn species_key(name: &str) -> &str {
    name.split('_').next().unwrap_or(name)
}

/// Marker colour for an internal node with the given bootstrap support.
pub fn support_color(support: f64) -> &'static str {
    if support <= 50.0 {
        return LOW_SUPPORT_COLOR;
    }
    SUPPORT_THRESHOLDS
        .iter()
        .find(|(threshold, _)| support >= *threshold)
        .map(|(_, color)| *color)
        .unwrap_or(LOW_SUPPORT_COLOR)
}

/// Random `#rrggbb` colour per species, assigned in leaf order.
#[derive(Debug, Clone, Default)]
pub struct SpeciesColors {
    colors: HashMap<String, String>,
    order: Vec<String>,
}

impl SpeciesColors {
    pub fn assign<R: Rng>(tree: &Tree, style: &RenderStyle, rng: &mut R) -> Self {
        let mut palette = Self::default();
        for leaf_id in tree.leaves_in_order() {
            let Some(name) = tree.nodes[leaf_id].name.as_deref() else {
                continue;
            };
            if style.is_reference(name) {
                continue;
            }
            let species = species_key(name);
            if !palette.colors.contains_key(species) {
                let color = format!("#{:06x}", rng.random_range(0..=0xFF_FFFF_u32));
                palette.colors.insert(species.to_owned(), color);
                palette.order.push(species.to_owned());
            }
        }
        palette
    }

    pub fn get(&self, species: &str) -> Option<&str> {
        self.colors.get(species).map(String::as_str)
    }

    /// Label colour for a leaf name, black for reference taxa.
    pub fn leaf_color<'a>(&'a self, name: &str, style: &RenderStyle) -> &'a str {
        if style.is_reference(name) {
            return REFERENCE_COLOR;
        }
        self.get(species_key(name)).unwrap_or(REFERENCE_COLOR)
    }

    #[cfg(test)]
    pub fn species(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }
}
