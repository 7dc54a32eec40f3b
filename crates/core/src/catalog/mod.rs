use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{BreathworkError, Result};

/// Direction of a breathing phase. `Hold` has no intrinsic direction; the
/// animation pins it to whatever the previous phase reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseKind {
    Inhale,
    Hold,
    Exhale,
}

/// One named segment of a breathing cycle with a fixed duration in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    pub duration: u32,
    #[serde(rename = "type")]
    pub kind: PhaseKind,
}

/// An ordered, repeating sequence of phases defining one breathing pattern.
///
/// Techniques are immutable once loaded and shared read-only between the
/// catalog and any running session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Technique {
    pub id: String,
    pub name: String,
    pub description: String,
    pub phases: Vec<Phase>,
    #[serde(default)]
    pub effects: Vec<String>,
    #[serde(rename = "totalCycle", default)]
    pub total_cycle: u32,
}

impl Technique {
    /// Sum of the phase durations, i.e. the length of one full cycle.
    pub fn cycle_seconds(&self) -> u32 {
        self.phases.iter().map(|phase| phase.duration).sum()
    }
}

/// Grouping of technique ids under a label, used for catalog navigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mode {
    pub name: String,
    #[serde(default)]
    pub icon: String,
    pub techniques: Vec<String>,
}

/// The full technique catalog consumed by the session engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub techniques: Vec<Technique>,
    #[serde(default)]
    pub modes: HashMap<String, Mode>,
    #[serde(default)]
    pub durations: Vec<u32>,
}

impl Catalog {
    /// Loads the catalog from a JSON file. Any failure (missing file, parse
    /// error, no surviving techniques) is recovered locally by substituting
    /// the built-in fallback catalog; load problems are never fatal.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::try_load(path) {
            Ok(catalog) => catalog,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "falling back to built-in catalog");
                Self::fallback()
            }
        }
    }

    fn try_load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Parses a catalog from a JSON string and drops techniques that violate
    /// the data-model invariants (empty phase list, zero-length phase).
    pub fn from_json(raw: &str) -> Result<Self> {
        let mut catalog: Catalog = serde_json::from_str(raw)?;
        catalog.retain_valid();
        if catalog.techniques.is_empty() {
            return Err(BreathworkError::msg("catalog contains no usable techniques"));
        }
        if catalog.durations.is_empty() {
            catalog.durations = default_durations();
        }
        Ok(catalog)
    }

    fn retain_valid(&mut self) {
        self.techniques.retain(|technique| {
            let valid = !technique.phases.is_empty()
                && technique.phases.iter().all(|phase| phase.duration > 0);
            if !valid {
                tracing::warn!(id = %technique.id, "dropping technique with invalid phases");
            }
            valid
        });
    }

    /// Looks up a technique by id.
    pub fn technique(&self, id: &str) -> Result<&Technique> {
        self.techniques
            .iter()
            .find(|technique| technique.id == id)
            .ok_or_else(|| BreathworkError::UnknownTechnique(id.to_string()))
    }

    /// Looks up a navigation mode by key.
    pub fn mode(&self, key: &str) -> Result<&Mode> {
        self.modes
            .get(key)
            .ok_or_else(|| BreathworkError::UnknownMode(key.to_string()))
    }

    /// Returns the techniques grouped under a mode, in the mode's own order.
    /// Ids the catalog does not know are skipped rather than treated as
    /// errors, matching how a partially edited catalog should degrade.
    pub fn techniques_for_mode(&self, key: &str) -> Result<Vec<&Technique>> {
        let mode = self.mode(key)?;
        Ok(mode
            .techniques
            .iter()
            .filter_map(|id| self.technique(id).ok())
            .collect())
    }

    /// Built-in catalog used whenever no external catalog can be loaded.
    pub fn fallback() -> Self {
        let techniques = vec![
            technique(
                "box",
                "Box breathing",
                "4-4-4-4 — balance and calm",
                vec![
                    phase("Inhale", 4, PhaseKind::Inhale),
                    phase("Hold", 4, PhaseKind::Hold),
                    phase("Exhale", 4, PhaseKind::Exhale),
                    phase("Hold", 4, PhaseKind::Hold),
                ],
                &["stress", "focus"],
            ),
            technique(
                "478",
                "4-7-8 technique",
                "Deep relaxation before sleep",
                vec![
                    phase("Inhale", 4, PhaseKind::Inhale),
                    phase("Hold", 7, PhaseKind::Hold),
                    phase("Exhale", 8, PhaseKind::Exhale),
                ],
                &["sleep"],
            ),
            technique(
                "physiological",
                "Physiological sigh",
                "Double inhale + long exhale",
                vec![
                    phase("Inhale", 2, PhaseKind::Inhale),
                    phase("Top-up inhale", 1, PhaseKind::Inhale),
                    phase("Exhale", 6, PhaseKind::Exhale),
                ],
                &["stress", "quick"],
            ),
            technique(
                "coherent",
                "Coherent 5/5",
                "Even breathing for balance",
                vec![
                    phase("Inhale", 5, PhaseKind::Inhale),
                    phase("Exhale", 5, PhaseKind::Exhale),
                ],
                &["energy", "focus"],
            ),
            technique(
                "relax48",
                "Inhale 4 / Exhale 8",
                "Extended exhale for relaxation",
                vec![
                    phase("Inhale", 4, PhaseKind::Inhale),
                    phase("Exhale", 8, PhaseKind::Exhale),
                ],
                &["sleep", "stress"],
            ),
            technique(
                "wave",
                "Wave breathing",
                "Smooth rise and fall",
                vec![
                    phase("Inhale", 6, PhaseKind::Inhale),
                    phase("Pause", 2, PhaseKind::Hold),
                    phase("Exhale", 6, PhaseKind::Exhale),
                    phase("Pause", 2, PhaseKind::Hold),
                ],
                &["focus", "energy"],
            ),
        ];

        let modes = [
            ("sleep", "Sleep", "🌙", vec!["478", "relax48"]),
            ("stress", "Stress", "🧘", vec!["box", "physiological", "relax48"]),
            ("focus", "Focus", "🎯", vec!["box", "coherent", "wave"]),
            ("energy", "Energy", "⚡", vec!["coherent", "wave"]),
            ("quick", "Quick", "⏱️", vec!["physiological"]),
        ]
        .into_iter()
        .map(|(key, name, icon, ids)| {
            (
                key.to_string(),
                Mode {
                    name: name.to_string(),
                    icon: icon.to_string(),
                    techniques: ids.into_iter().map(str::to_string).collect(),
                },
            )
        })
        .collect();

        Self {
            techniques,
            modes,
            durations: default_durations(),
        }
    }
}

fn default_durations() -> Vec<u32> {
    vec![60, 180, 300, 600]
}

fn phase(name: &str, duration: u32, kind: PhaseKind) -> Phase {
    Phase {
        name: name.to_string(),
        duration,
        kind,
    }
}

fn technique(
    id: &str,
    name: &str,
    description: &str,
    phases: Vec<Phase>,
    effects: &[&str],
) -> Technique {
    let total_cycle = phases.iter().map(|phase| phase.duration).sum();
    Technique {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        phases,
        effects: effects.iter().map(|effect| effect.to_string()).collect(),
        total_cycle,
    }
}
