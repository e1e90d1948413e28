//! Viseme frame types

use serde::{Deserialize, Serialize};

/// Mouth-shape category of an analysis frame
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum VisemeCategory {
    Silence,
    A,
    I,
    U,
    E,
    O,
    Consonant,
}

impl VisemeCategory {
    pub const VOWELS: [VisemeCategory; 5] = [
        VisemeCategory::A,
        VisemeCategory::I,
        VisemeCategory::U,
        VisemeCategory::E,
        VisemeCategory::O,
    ];

    pub fn is_vowel(&self) -> bool {
        Self::VOWELS.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VisemeCategory::Silence => "silence",
            VisemeCategory::A => "a",
            VisemeCategory::I => "i",
            VisemeCategory::U => "u",
            VisemeCategory::E => "e",
            VisemeCategory::O => "o",
            VisemeCategory::Consonant => "consonant",
        }
    }
}

/// Named mouth parameters sent to the renderer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct MouthParams {
    /// Vertical opening (0.0-1.0)
    pub open_y: f32,
    /// Horizontal opening / lip width (0.0-1.0)
    pub open_x: f32,
    /// Mouth form: -1.0 rounded/frown, 1.0 spread/smile
    pub form: f32,
}

impl MouthParams {
    pub const CLOSED: MouthParams = MouthParams {
        open_y: 0.0,
        open_x: 0.0,
        form: 0.0,
    };

    pub fn new(open_y: f32, open_x: f32, form: f32) -> Self {
        Self { open_y, open_x, form }
    }

    pub fn clamped(self) -> Self {
        Self {
            open_y: self.open_y.clamp(0.0, 1.0),
            open_x: self.open_x.clamp(0.0, 1.0),
            form: self.form.clamp(-1.0, 1.0),
        }
    }
}

/// One classified analysis frame of a clip
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisemeFrame {
    /// Seconds from clip start
    pub timestamp: f64,
    pub category: VisemeCategory,
    /// Normalized frame loudness (0.0-1.0)
    pub intensity: f32,
    pub params: MouthParams,
    /// Classification confidence (0.0-1.0)
    pub confidence: f32,
}

impl VisemeFrame {
    pub fn silence(timestamp: f64) -> Self {
        Self {
            timestamp,
            category: VisemeCategory::Silence,
            intensity: 0.0,
            params: MouthParams::CLOSED,
            confidence: 1.0,
        }
    }
}
