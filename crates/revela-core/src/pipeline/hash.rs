//! Content-addressed keys for calibration profiles.

use blake3::Hasher as Blake3Hasher;
use serde::Serialize;
use std::fmt;

use crate::recipe::TechnicalRecipe;

/// Number of hex characters kept from the digest.
pub const KEY_LEN: usize = 16;

/// Identifies a calibration: the technical recipe plus the analyzer inputs
/// (estimators, proxy size) that turned it into statistics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecipeKey(String);

#[derive(Serialize)]
struct KeyMaterial<'a> {
    recipe: &'a TechnicalRecipe,
    inputs: &'a [String],
}

impl RecipeKey {
    /// BLAKE3 over the canonical JSON of the recipe and analyzer inputs,
    /// truncated to [`KEY_LEN`] hex characters.
    pub fn compute(recipe: &TechnicalRecipe, inputs: &[String]) -> serde_json::Result<Self> {
        let canonical = serde_json::to_vec(&KeyMaterial { recipe, inputs })?;
        let mut hasher = Blake3Hasher::new();
        hasher.update(&canonical);
        let hex = hasher.finalize().to_hex();
        Ok(Self(hex[..KEY_LEN].to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecipeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::AlignMode;

    fn ids() -> Vec<String> {
        vec![
            "fixed-target:0.5".into(),
            "fixed-alignment:1,0.9,0.95".into(),
            "proxy:1024".into(),
        ]
    }

    #[test]
    fn test_key_is_stable_and_short() {
        let recipe = TechnicalRecipe::default();
        let a = RecipeKey::compute(&recipe, &ids()).unwrap();
        let b = RecipeKey::compute(&recipe.clone(), &ids()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), KEY_LEN);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_any_field_change_changes_key() {
        let base = RecipeKey::compute(&TechnicalRecipe::default(), &ids()).unwrap();
        let changed = [
            TechnicalRecipe {
                dmin_percentile: 3.5,
                ..Default::default()
            },
            TechnicalRecipe {
                align_mode: AlignMode::Manual,
                ..Default::default()
            },
            TechnicalRecipe {
                light_ratio: [1.0, 1.0, 0.99],
                ..Default::default()
            },
        ];
        for recipe in changed {
            assert_ne!(RecipeKey::compute(&recipe, &ids()).unwrap(), base);
        }
    }

    #[test]
    fn test_estimator_change_changes_key() {
        let recipe = TechnicalRecipe::default();
        let base = RecipeKey::compute(&recipe, &ids()).unwrap();
        let other = RecipeKey::compute(&recipe, &["percentile-target:99".into()]).unwrap();
        assert_ne!(base, other);
    }
}
