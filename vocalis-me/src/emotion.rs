//! Keyword and punctuation emotion scoring, plus expression and motion vocabularies

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use vocalis_core::Emotion;

/// Facial expression presets understood by the renderer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Expression {
    Neutral,
    Joy,
    Sadness,
    Anger,
    Fear,
    Surprise,
    Calm,
    Mystic,
}

impl Expression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Expression::Neutral => "neutral",
            Expression::Joy => "joy",
            Expression::Sadness => "sadness",
            Expression::Anger => "anger",
            Expression::Fear => "fear",
            Expression::Surprise => "surprise",
            Expression::Calm => "calm",
            Expression::Mystic => "mystic",
        }
    }
}

impl From<Emotion> for Expression {
    fn from(emotion: Emotion) -> Self {
        match emotion {
            Emotion::Neutral => Expression::Neutral,
            Emotion::Joy => Expression::Joy,
            Emotion::Sadness => Expression::Sadness,
            Emotion::Anger => Expression::Anger,
            Emotion::Fear => Expression::Fear,
            Emotion::Surprise => Expression::Surprise,
            Emotion::Calm => Expression::Calm,
            Emotion::Mystic => Expression::Mystic,
        }
    }
}

/// Body motions the renderer can trigger
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Motion {
    Nod,
    Bounce,
    Droop,
    Shake,
    Tremble,
    Startle,
    Sway,
    Gaze,
    CardReveal,
    Ponder,
}

impl Motion {
    /// Motion played at the start of a clip for an emotion
    pub fn for_emotion(emotion: Emotion) -> Option<Motion> {
        match emotion {
            Emotion::Neutral => None,
            Emotion::Joy => Some(Motion::Bounce),
            Emotion::Sadness => Some(Motion::Droop),
            Emotion::Anger => Some(Motion::Shake),
            Emotion::Fear => Some(Motion::Tremble),
            Emotion::Surprise => Some(Motion::Startle),
            Emotion::Calm => Some(Motion::Sway),
            Emotion::Mystic => Some(Motion::Gaze),
        }
    }
}

/// Outcome of scoring one text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmotionAnalysis {
    pub primary: Emotion,
    /// 0.3-1.0
    pub intensity: f32,
    /// Share of the total score held by the primary emotion; 1.0 for an explicit hint
    pub confidence: f32,
    /// Raw lexicon hits per emotion
    pub scores: BTreeMap<Emotion, f32>,
}

impl EmotionAnalysis {
    pub fn expression(&self) -> Expression {
        self.primary.into()
    }
}

const MIN_INTENSITY: f32 = 0.3;
const BASE_INTENSITY: f32 = 0.5;
const MAX_DENSITY_BOOST: f32 = 0.4;
const EXCLAMATION_BOOST: f32 = 0.1;
const MAX_EXCLAMATIONS: usize = 3;
const UNHINTED_NEUTRAL_CONFIDENCE: f32 = 0.5;

fn lexicon(emotion: Emotion) -> &'static [&'static str] {
    match emotion {
        Emotion::Neutral => &[],
        Emotion::Joy => &[
            "happy", "glad", "joy", "great", "wonderful", "awesome", "love", "fun", "congrat", "yay",
            "기쁘", "기뻐", "행복", "좋아", "신나", "축하", "최고", "즐거",
        ],
        Emotion::Sadness => &[
            "sad", "sorry", "unfortunate", "miss", "cry", "lonely", "tear", "grief",
            "슬프", "슬퍼", "아쉽", "외로", "눈물", "우울", "미안",
        ],
        Emotion::Anger => &[
            "angry", "mad", "furious", "annoy", "hate", "unfair", "rage",
            "화나", "화가", "짜증", "분노", "열받", "싫어",
        ],
        Emotion::Fear => &[
            "afraid", "scared", "fear", "worr", "anxious", "nervous", "terrif",
            "무서", "두려", "걱정", "불안", "겁",
        ],
        Emotion::Surprise => &[
            "wow", "surpris", "amazing", "unbelievable", "incredible", "shock",
            "놀라", "놀랐", "깜짝", "대박", "세상에",
        ],
        Emotion::Calm => &[
            "calm", "peace", "relax", "gentle", "quiet", "breathe", "rest",
            "편안", "차분", "평화", "천천히", "괜찮",
        ],
        Emotion::Mystic => &[
            "tarot", "fortune", "destiny", "fate", "mystic", "card", "spirit", "magic", "star",
            "타로", "운세", "운명", "카드", "신비", "별자리", "점괘",
        ],
    }
}

/// Counts hits of one keyword: ASCII keywords match word prefixes, Hangul keywords match substrings
fn keyword_hits(text: &str, words: &[&str], keyword: &str) -> usize {
    if keyword.is_ascii() {
        words.iter().filter(|w| w.starts_with(keyword)).count()
    } else {
        text.matches(keyword).count()
    }
}

/// In-process emotion scorer over Korean and English lexicons
#[derive(Debug, Clone, Default)]
pub struct EmotionAnalyzer;

impl EmotionAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Score `text`; an explicit hint decides the primary emotion with full confidence
    pub fn analyze(&self, text: &str, hint: Option<Emotion>) -> EmotionAnalysis {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let mut scores = BTreeMap::new();
        for emotion in Emotion::ALL.iter().copied().filter(|e| *e != Emotion::Neutral) {
            let hits: usize = lexicon(emotion)
                .iter()
                .map(|keyword| keyword_hits(&lowered, &words, keyword))
                .sum();
            if hits > 0 {
                scores.insert(emotion, hits as f32);
            }
        }

        let total: f32 = scores.values().sum();
        let word_count = text.split_whitespace().count().max(1);
        let exclamations = text.chars().filter(|c| *c == '!' || *c == '！').count();

        let density = total / word_count as f32;
        let intensity = (BASE_INTENSITY
            + (density * MAX_DENSITY_BOOST).min(MAX_DENSITY_BOOST)
            + EXCLAMATION_BOOST * exclamations.min(MAX_EXCLAMATIONS) as f32)
            .clamp(MIN_INTENSITY, 1.0);

        // Ties resolve to the emotion listed first
        let top = Emotion::ALL
            .iter()
            .filter_map(|e| scores.get(e).map(|s| (*e, *s)))
            .fold(None, |best: Option<(Emotion, f32)>, (e, s)| match best {
                Some((_, best_score)) if best_score >= s => best,
                _ => Some((e, s)),
            });

        let (primary, confidence) = match (hint, top) {
            (Some(hint), _) => (hint, 1.0),
            (None, Some((emotion, score))) => (emotion, score / total),
            (None, None) => (Emotion::Neutral, UNHINTED_NEUTRAL_CONFIDENCE),
        };

        debug!(
            primary = primary.as_str(),
            intensity,
            confidence,
            hinted = hint.is_some(),
            "Emotion analyzed"
        );

        EmotionAnalysis {
            primary,
            intensity,
            confidence,
            scores,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_takes_precedence() {
        let analysis = EmotionAnalyzer::new().analyze("I am so sad today", Some(Emotion::Joy));
        assert_eq!(analysis.primary, Emotion::Joy);
        assert_eq!(analysis.confidence, 1.0);
        assert_eq!(analysis.expression(), Expression::Joy);
    }

    #[test]
    fn test_korean_lexicon() {
        let analysis = EmotionAnalyzer::new().analyze("정말 기쁘고 행복해요", None);
        assert_eq!(analysis.primary, Emotion::Joy);
        assert_eq!(analysis.confidence, 1.0);
    }

    #[test]
    fn test_confidence_is_top_share() {
        let analysis = EmotionAnalyzer::new().analyze("happy happy happy but scared", None);
        assert_eq!(analysis.primary, Emotion::Joy);
        assert!((analysis.confidence - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_no_hits_is_neutral() {
        let analysis = EmotionAnalyzer::new().analyze("The meeting is at noon", None);
        assert_eq!(analysis.primary, Emotion::Neutral);
        assert_eq!(analysis.intensity, BASE_INTENSITY);
        assert!(analysis.confidence < 0.7);
        assert!(analysis.scores.is_empty());
    }

    #[test]
    fn test_exclamations_raise_intensity() {
        let analyzer = EmotionAnalyzer::new();
        let calm = analyzer.analyze("great news", None);
        let excited = analyzer.analyze("great news!!!", None);
        assert!(excited.intensity > calm.intensity);
        assert!(excited.intensity <= 1.0);
    }

    #[test]
    fn test_ascii_keywords_match_word_starts() {
        let analysis = EmotionAnalyzer::new().analyze("a starry night", None);
        assert_eq!(analysis.primary, Emotion::Mystic);
        let analysis = EmotionAnalyzer::new().analyze("mustard", None);
        assert_eq!(analysis.primary, Emotion::Neutral);
    }

    #[test]
    fn test_motion_mapping() {
        assert_eq!(Motion::for_emotion(Emotion::Joy), Some(Motion::Bounce));
        assert_eq!(Motion::for_emotion(Emotion::Neutral), None);
        assert_eq!(serde_json::to_string(&Motion::CardReveal).unwrap(), "\"card_reveal\"");
    }
}
