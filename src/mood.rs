//! User mood detection and system prompt wording.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Emotional tone attributed to the user for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    #[default]
    Neutral,
    Happy,
    Anxious,
    Curious,
    Sad,
}

impl Mood {
    pub const ALL: [Mood; 5] = [
        Mood::Neutral,
        Mood::Happy,
        Mood::Anxious,
        Mood::Curious,
        Mood::Sad,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Mood::Neutral => "neutral",
            Mood::Happy => "happy",
            Mood::Anxious => "anxious",
            Mood::Curious => "curious",
            Mood::Sad => "sad",
        }
    }
}

impl std::fmt::Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mood {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mood::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown mood '{s}'"))
    }
}

/// Decides the mood for a turn from its text and embedding.
#[async_trait]
pub trait MoodProvider: Send + Sync + std::fmt::Debug {
    async fn detect(&self, text: &str, embedding: &[f32]) -> Mood;
}

/// Always reports the same mood.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedMood(pub Mood);

#[async_trait]
impl MoodProvider for FixedMood {
    async fn detect(&self, _text: &str, _embedding: &[f32]) -> Mood {
        self.0
    }
}

/// Lexical cue matching. First matching group wins; no cue means neutral.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordMood;

const CUES: &[(Mood, &[&str])] = &[
    (
        Mood::Anxious,
        &["anxious", "worried", "nervous", "scared", "stressed", "afraid", "difficult"],
    ),
    (
        Mood::Sad,
        &["sad", "lonely", "depressed", "unhappy", "miss", "lost", "tired"],
    ),
    (
        Mood::Happy,
        &["happy", "great", "glad", "excited", "love", "wonderful", "awesome"],
    ),
    (
        Mood::Curious,
        &["how", "why", "what", "wonder", "curious", "learn", "explain"],
    ),
];

impl KeywordMood {
    #[must_use]
    pub fn classify(text: &str) -> Mood {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty())
            .collect();

        for (mood, cues) in CUES {
            if words.iter().any(|w| cues.contains(w)) {
                return *mood;
            }
        }
        if lowered.trim_end().ends_with('?') {
            return Mood::Curious;
        }
        Mood::Neutral
    }
}

#[async_trait]
impl MoodProvider for KeywordMood {
    async fn detect(&self, text: &str, _embedding: &[f32]) -> Mood {
        Self::classify(text)
    }
}

/// Instruction text for the system entry of a request.
#[must_use]
pub fn system_prompt(mood: Mood, coaching: bool) -> String {
    if coaching {
        format!(
            "You are a helpful assistant. The user seems {mood}, help user to increase their self efficacy."
        )
    } else {
        format!("You are a helpful assistant. The user seems {mood}.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt() {
        assert_eq!(
            system_prompt(Mood::Curious, false),
            "You are a helpful assistant. The user seems curious."
        );
        assert!(system_prompt(Mood::Sad, true).ends_with("increase their self efficacy."));
    }

    #[test]
    fn test_mood_parse_roundtrip() {
        for mood in Mood::ALL {
            assert_eq!(mood.as_str().parse::<Mood>().unwrap(), mood);
        }
        assert!("grumpy".parse::<Mood>().is_err());
    }

    #[test]
    fn test_keyword_classification() {
        assert_eq!(
            KeywordMood::classify("I'd like to learn the guitar, but it seems so difficult."),
            Mood::Anxious
        );
        assert_eq!(KeywordMood::classify("I feel so lonely today"), Mood::Sad);
        assert_eq!(KeywordMood::classify("Is it going to rain?"), Mood::Curious);
        assert_eq!(KeywordMood::classify("I watched a show"), Mood::Neutral);
    }

    #[tokio::test]
    async fn test_fixed_mood() {
        let provider = FixedMood(Mood::Happy);
        assert_eq!(provider.detect("anything", &[]).await, Mood::Happy);
    }
}
