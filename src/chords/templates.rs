//! Chord template bank.
//!
//! Each template is a binary pitch-class mask built from a root and an
//! interval structure, stored L2-normalized so that four-note chords do not
//! outscore the triads they contain just by having more active bins.

use std::collections::HashSet;
use std::fmt;

use crate::error::{AnalysisError, Result};
use crate::features::chroma::{N_CHROMA, PITCH_CLASSES};

/// Chord quality with its interval structure and name suffix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChordQuality {
    Major,
    Minor,
    SuspendedFourth,
    DominantSeventh,
}

impl ChordQuality {
    pub const TRIADS: [ChordQuality; 2] = [ChordQuality::Major, ChordQuality::Minor];

    pub const EXTENDED: [ChordQuality; 4] = [
        ChordQuality::Major,
        ChordQuality::Minor,
        ChordQuality::SuspendedFourth,
        ChordQuality::DominantSeventh,
    ];

    /// Semitones above the root.
    pub fn intervals(&self) -> &'static [usize] {
        match self {
            ChordQuality::Major => &[0, 4, 7],
            ChordQuality::Minor => &[0, 3, 7],
            ChordQuality::SuspendedFourth => &[0, 5, 7],
            ChordQuality::DominantSeventh => &[0, 4, 7, 10],
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            ChordQuality::Major => "",
            ChordQuality::Minor => "m",
            ChordQuality::SuspendedFourth => "sus4",
            ChordQuality::DominantSeventh => "7",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChordTemplate {
    name: String,
    /// Unit-length mask; zero on inactive pitch classes.
    weights: [f32; N_CHROMA],
}

impl ChordTemplate {
    /// Build a template from a binary mask. The mask must have at least one
    /// active pitch class.
    pub fn from_mask(name: impl Into<String>, mask: [bool; N_CHROMA]) -> Result<Self> {
        let name = name.into();
        let active = mask.iter().filter(|&&on| on).count();
        if active == 0 {
            return Err(AnalysisError::InvalidInput(format!(
                "chord template '{}' has an empty mask",
                name
            )));
        }
        Ok(Self {
            name,
            weights: unit_weights(&mask),
        })
    }

    /// Template for `quality` rooted at pitch class `root` (0 = C).
    pub fn from_root(root: usize, quality: ChordQuality) -> Self {
        let root = root % N_CHROMA;
        let mut mask = [false; N_CHROMA];
        for &interval in quality.intervals() {
            mask[(root + interval) % N_CHROMA] = true;
        }
        Self {
            name: format!("{}{}", PITCH_CLASSES[root], quality.suffix()),
            weights: unit_weights(&mask),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weights(&self) -> &[f32; N_CHROMA] {
        &self.weights
    }

    /// Pitch classes the template covers.
    pub fn mask(&self) -> [bool; N_CHROMA] {
        let mut mask = [false; N_CHROMA];
        for (m, &w) in mask.iter_mut().zip(self.weights.iter()) {
            *m = w > 0.0;
        }
        mask
    }

    pub fn active_count(&self) -> usize {
        self.weights.iter().filter(|&&w| w > 0.0).count()
    }

    /// Correlation of a chroma vector against this template.
    pub fn score(&self, chroma: &[f32; N_CHROMA]) -> f32 {
        self.weights
            .iter()
            .zip(chroma.iter())
            .map(|(w, c)| w * c)
            .sum()
    }
}

fn unit_weights(mask: &[bool; N_CHROMA]) -> [f32; N_CHROMA] {
    let active = mask.iter().filter(|&&on| on).count().max(1);
    let level = 1.0 / (active as f32).sqrt();
    let mut weights = [0.0f32; N_CHROMA];
    for (w, &on) in weights.iter_mut().zip(mask.iter()) {
        if on {
            *w = level;
        }
    }
    weights
}

impl fmt::Display for ChordTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let notes: Vec<&str> = self
            .mask()
            .iter()
            .enumerate()
            .filter(|(_, &on)| on)
            .map(|(pc, _)| PITCH_CLASSES[pc])
            .collect();
        write!(f, "{} [{}]", self.name, notes.join(" "))
    }
}

/// Immutable set of chord templates, kept sorted by name.
///
/// Sorted order is the iteration order, so the recognizer's first-wins tie
/// break resolves ties alphabetically.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateBank {
    templates: Vec<ChordTemplate>,
}

impl TemplateBank {
    /// Build a bank from arbitrary templates. Names must be unique.
    pub fn new(mut templates: Vec<ChordTemplate>) -> Result<Self> {
        if templates.is_empty() {
            return Err(AnalysisError::InvalidInput("template bank is empty".into()));
        }
        let mut seen = HashSet::new();
        for template in &templates {
            if !seen.insert(template.name.clone()) {
                return Err(AnalysisError::InvalidInput(format!(
                    "duplicate chord template '{}'",
                    template.name
                )));
            }
        }
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self { templates })
    }

    /// Build from `(name, mask)` pairs.
    pub fn from_masks<I, S>(masks: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, [bool; N_CHROMA])>,
        S: Into<String>,
    {
        let templates = masks
            .into_iter()
            .map(|(name, mask)| ChordTemplate::from_mask(name, mask))
            .collect::<Result<Vec<_>>>()?;
        Self::new(templates)
    }

    /// All roots for each of `qualities`.
    pub fn with_qualities(qualities: &[ChordQuality]) -> Result<Self> {
        Self::new(Self::rooted(qualities))
    }

    /// Major and minor triads for all 12 roots (24 templates).
    pub fn triads() -> Self {
        Self::sorted(Self::rooted(&ChordQuality::TRIADS))
    }

    /// Triads plus sus4 and dominant seventh chords (48 templates).
    pub fn extended() -> Self {
        Self::sorted(Self::rooted(&ChordQuality::EXTENDED))
    }

    fn rooted(qualities: &[ChordQuality]) -> Vec<ChordTemplate> {
        qualities
            .iter()
            .flat_map(|&quality| {
                (0..N_CHROMA).map(move |root| ChordTemplate::from_root(root, quality))
            })
            .collect()
    }

    fn sorted(mut templates: Vec<ChordTemplate>) -> Self {
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        Self { templates }
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChordTemplate> {
        self.templates.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ChordTemplate> {
        self.templates
            .binary_search_by(|t| t.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.templates[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Highest-scoring template. Only a strictly greater score replaces
    /// the current best, so ties go to the alphabetically first name.
    pub fn best_match(&self, chroma: &[f32; N_CHROMA]) -> (&ChordTemplate, f32) {
        let mut best = &self.templates[0];
        let mut best_score = best.score(chroma);
        for template in &self.templates[1..] {
            let score = template.score(chroma);
            if score > best_score {
                best = template;
                best_score = score;
            }
        }
        (best, best_score)
    }
}

impl Default for TemplateBank {
    fn default() -> Self {
        Self::triads()
    }
}
