//! Vowel classification and mouth-parameter mapping

use crate::config::{FormantRange, FormantTable};
use vocalis_core::{MouthParams, VisemeCategory};

/// Distance of `value` outside `[lo, hi]`, in range widths
fn axis_distance(value: f64, (lo, hi): (f64, f64)) -> f64 {
    let width = (hi - lo).max(1.0);
    if value < lo {
        (lo - value) / width
    } else if value > hi {
        (value - hi) / width
    } else {
        0.0
    }
}

/// `1 / (1 + d)`; 1.0 inside both ranges
pub fn score(f1: f64, f2: f64, range: &FormantRange) -> f32 {
    let d1 = axis_distance(f1, range.f1);
    let d2 = axis_distance(f2, range.f2);
    (1.0 / (1.0 + (d1 * d1 + d2 * d2).sqrt())) as f32
}

/// Best vowel for (F1, F2) with its score; ties go to the earlier vowel
pub fn best_vowel(f1: f64, f2: f64, table: &FormantTable) -> (VisemeCategory, f32) {
    table
        .iter()
        .map(|(category, range)| (category, score(f1, f2, range)))
        .fold((VisemeCategory::Consonant, 0.0), |best, candidate| {
            if candidate.1 > best.1 {
                candidate
            } else {
                best
            }
        })
}

/// Category and confidence; scores under `confidence_floor` become `Consonant`
pub fn classify(f1: f64, f2: f64, table: &FormantTable, confidence_floor: f32) -> (VisemeCategory, f32) {
    let (category, confidence) = best_vowel(f1, f2, table);
    if confidence < confidence_floor {
        (VisemeCategory::Consonant, confidence)
    } else {
        (category, confidence)
    }
}

pub fn base_params(category: VisemeCategory) -> MouthParams {
    match category {
        VisemeCategory::A => MouthParams::new(1.0, 0.5, 0.0),
        VisemeCategory::I => MouthParams::new(0.2, 1.0, 0.6),
        VisemeCategory::U => MouthParams::new(0.3, 0.1, -0.6),
        VisemeCategory::E => MouthParams::new(0.5, 0.8, 0.3),
        VisemeCategory::O => MouthParams::new(0.7, 0.2, -0.4),
        VisemeCategory::Consonant => MouthParams::new(0.25, 0.4, 0.0),
        VisemeCategory::Silence => MouthParams::CLOSED,
    }
}

/// Scale base parameters by intensity: fully on vertical opening, half on shape
pub fn mouth_params(category: VisemeCategory, intensity: f32, gain: f32) -> MouthParams {
    let base = base_params(category);
    let intensity = intensity.clamp(0.0, 1.0);
    let shape = 0.5 + 0.5 * intensity;
    MouthParams::new(
        base.open_y * intensity * gain,
        base.open_x * shape * gain,
        base.form * shape * gain,
    )
    .clamped()
}
