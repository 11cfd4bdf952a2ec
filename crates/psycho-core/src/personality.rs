//! The assistant's trait vector, persisted to `data/personality.json` (§9).
//!
//! Traits are free-standing floats in `0.0..=1.0`, not a graph/relational
//! concern, so this gets its own tiny JSON-backed store rather than a table.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonalityTraits {
    #[serde(default = "default_trait")]
    pub humor: f32,
    #[serde(default = "default_trait")]
    pub warmth: f32,
    #[serde(default = "default_trait")]
    pub directness: f32,
    #[serde(default = "default_trait")]
    pub formality: f32,
}

fn default_trait() -> f32 {
    0.5
}

impl Default for PersonalityTraits {
    fn default() -> Self {
        Self { humor: 0.5, warmth: 0.5, directness: 0.5, formality: 0.5 }
    }
}

impl PersonalityTraits {
    pub fn clamp(&mut self) {
        self.humor = self.humor.clamp(0.0, 1.0);
        self.warmth = self.warmth.clamp(0.0, 1.0);
        self.directness = self.directness.clamp(0.0, 1.0);
        self.formality = self.formality.clamp(0.0, 1.0);
    }
}

/// Patch body for partial trait updates; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PersonalityPatch {
    pub humor: Option<f32>,
    pub warmth: Option<f32>,
    pub directness: Option<f32>,
    pub formality: Option<f32>,
}

pub struct PersonalityStore {
    path: PathBuf,
}

impl PersonalityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self, default_humor: f32) -> PersonalityTraits {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or(PersonalityTraits { humor: default_humor, ..PersonalityTraits::default() })
    }

    pub fn save(&self, traits: &PersonalityTraits) -> std::io::Result<()> {
        if let Some(parent) = Path::new(&self.path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string_pretty(traits).unwrap_or_default();
        std::fs::write(&self.path, body)
    }

    pub fn apply_patch(&self, default_humor: f32, patch: PersonalityPatch) -> std::io::Result<PersonalityTraits> {
        let mut traits = self.load(default_humor);
        if let Some(v) = patch.humor {
            traits.humor = v;
        }
        if let Some(v) = patch.warmth {
            traits.warmth = v;
        }
        if let Some(v) = patch.directness {
            traits.directness = v;
        }
        if let Some(v) = patch.formality {
            traits.formality = v;
        }
        traits.clamp();
        self.save(&traits)?;
        Ok(traits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_configured_default_humor() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersonalityStore::new(dir.path().join("personality.json"));
        let traits = store.load(0.8);
        assert_eq!(traits.humor, 0.8);
        assert_eq!(traits.warmth, 0.5);
    }

    #[test]
    fn patch_updates_only_named_fields_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersonalityStore::new(dir.path().join("personality.json"));
        store.save(&PersonalityTraits::default()).unwrap();

        let patched = store.apply_patch(0.5, PersonalityPatch { humor: Some(0.9), ..Default::default() }).unwrap();
        assert_eq!(patched.humor, 0.9);
        assert_eq!(patched.warmth, 0.5);

        let reloaded = store.load(0.5);
        assert_eq!(reloaded, patched);
    }

    #[test]
    fn patch_clamps_out_of_range_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersonalityStore::new(dir.path().join("personality.json"));
        let patched = store.apply_patch(0.5, PersonalityPatch { directness: Some(1.7), ..Default::default() }).unwrap();
        assert_eq!(patched.directness, 1.0);
    }
}
