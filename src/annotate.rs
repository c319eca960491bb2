//! Text Annotation Pipeline.
//!
//! Turns raw text into the prompt the Generation Engine reads, in this order:
//!
//! 1. emotion prefix (`[HAPPY] `), omitted for [`Emotion::Neutral`]
//! 2. laughter pass: each sentence gets `[laughs]` with probability
//!    [`LAUGHTER_PROBABILITY`]
//! 3. breathing pass over the output of step 2: `[breathes]` with
//!    probability [`BREATHING_PROBABILITY`]
//! 4. language prefix (`[fr] `) once for the whole text when the language is
//!    not [`NATIVE_LANGUAGE`]
//!
//! Marker placement draws from the `RngCore` passed in by the caller. With an
//! entropy-seeded source the output is not reproducible; seed it to make it so.
//!
//! # Sentences
//!
//! A sentence ends at a run of `.`, `!` or `?` followed by whitespace or the
//! end of the text. Text without a terminator is a single sentence. Markers go
//! before the terminator (`Hello [laughs].`) and sentences are rejoined with a
//! single space.

use std::fmt;
use std::str::FromStr;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::config::NATIVE_LANGUAGE;
use crate::error::VoiceCloneError;

pub const LAUGHTER_PROBABILITY: f64 = 0.3;
pub const LAUGHTER_MARKER: &str = "[laughs]";

pub const BREATHING_PROBABILITY: f64 = 0.2;
pub const BREATHING_MARKER: &str = "[breathes]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    #[default]
    Neutral,
    Happy,
    Sad,
    Angry,
    Surprised,
    Excited,
    Concerned,
}

impl Emotion {
    pub const ALL: [Emotion; 7] = [
        Emotion::Neutral,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Surprised,
        Emotion::Excited,
        Emotion::Concerned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Surprised => "surprised",
            Emotion::Excited => "excited",
            Emotion::Concerned => "concerned",
        }
    }

    /// Prefix injected in front of the text, `None` for neutral.
    pub fn marker(&self) -> Option<&'static str> {
        match self {
            Emotion::Neutral => None,
            Emotion::Happy => Some("[HAPPY] "),
            Emotion::Sad => Some("[SAD] "),
            Emotion::Angry => Some("[ANGRY] "),
            Emotion::Surprised => Some("[SURPRISED] "),
            Emotion::Excited => Some("[EXCITED] "),
            Emotion::Concerned => Some("[CONCERNED] "),
        }
    }

    /// Like [`FromStr`], but unknown values degrade to neutral with a warning.
    pub fn parse_lenient(value: &str) -> Emotion {
        value.parse().unwrap_or_else(|_| {
            log::warn!("Unrecognized emotion {value:?}, using neutral");
            Emotion::Neutral
        })
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Emotion {
    type Err = VoiceCloneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Emotion::ALL
            .into_iter()
            .find(|e| e.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                VoiceCloneError::InvalidRequest(format!(
                    "unknown emotion {s:?}; expected one of {}",
                    Emotion::ALL.map(|e| e.as_str()).join(", ")
                ))
            })
    }
}

/// Paralinguistic directives for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Effects {
    pub emotion: Option<Emotion>,
    pub laughter: bool,
    pub breathing: bool,
}

impl Effects {
    /// Build from loosely typed inputs. An unrecognized emotion becomes neutral.
    pub fn from_parts(emotion: Option<&str>, laughter: bool, breathing: bool) -> Self {
        Self {
            emotion: emotion.map(Emotion::parse_lenient),
            laughter,
            breathing,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.emotion.and_then(|e| e.marker()).is_none() && !self.laughter && !self.breathing
    }
}

/// The engine-facing text produced by [`annotate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedPrompt {
    pub final_text: String,
    pub laughs: usize,
    pub breaths: usize,
}

impl AnnotatedPrompt {
    pub fn as_str(&self) -> &str {
        &self.final_text
    }
}

impl fmt::Display for AnnotatedPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.final_text)
    }
}

pub fn annotate(
    text: &str,
    language: &str,
    effects: &Effects,
    rng: &mut dyn RngCore,
) -> AnnotatedPrompt {
    let mut out = match effects.emotion.and_then(|e| e.marker()) {
        Some(marker) => format!("{marker}{text}"),
        None => text.to_string(),
    };

    let mut laughs = 0;
    if effects.laughter {
        (out, laughs) = sprinkle(&out, LAUGHTER_MARKER, LAUGHTER_PROBABILITY, rng);
    }
    let mut breaths = 0;
    if effects.breathing {
        (out, breaths) = sprinkle(&out, BREATHING_MARKER, BREATHING_PROBABILITY, rng);
    }

    if let Some(marker) = language_marker(language) {
        out.insert_str(0, &marker);
    }

    log::debug!("Annotated prompt ({laughs} laughs, {breaths} breaths): {out:?}");
    AnnotatedPrompt {
        final_text: out,
        laughs,
        breaths,
    }
}

/// `[xx] ` from the primary subtag of a non-native language, `None` for the
/// native one or blank input. Region subtags are dropped: `fr-CA` gives `[fr] `.
pub fn language_marker(language: &str) -> Option<String> {
    let code = language.trim().to_ascii_lowercase();
    let primary = code.split(['-', '_']).next().unwrap_or_default();
    if primary.is_empty() || primary == NATIVE_LANGUAGE {
        None
    } else {
        Some(format!("[{primary}] "))
    }
}

/// Flip a coin per sentence and insert `marker` on heads.
fn sprinkle(text: &str, marker: &str, probability: f64, rng: &mut dyn RngCore) -> (String, usize) {
    let mut inserted = 0;
    let units: Vec<String> = split_sentences(text)
        .into_iter()
        .map(|unit| {
            if !rng.gen_bool(probability) {
                return unit.to_string();
            }
            inserted += 1;
            let body = unit.trim_end_matches(is_terminator);
            let terminator = &unit[body.len()..];
            let body = body.trim_end();
            if body.is_empty() {
                format!("{marker}{terminator}")
            } else {
                format!("{body} {marker}{terminator}")
            }
        })
        .collect();
    (units.join(" "), inserted)
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut units = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !is_terminator(c) {
            continue;
        }
        let mut end = i + c.len_utf8();
        while let Some(&(j, next)) = chars.peek() {
            if !is_terminator(next) {
                break;
            }
            end = j + next.len_utf8();
            chars.next();
        }
        let at_boundary = chars.peek().map_or(true, |&(_, next)| next.is_whitespace());
        if at_boundary {
            units.push(text[start..end].trim());
            start = end;
        }
    }
    units.push(text[start..].trim());
    units.retain(|u| !u.is_empty());
    units
}
