//! Notes and tones played on the buzzer.

use keylock_tone_macro::musical_notes;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::time::Duration;

musical_notes!();

impl Serialize for MusicalNote {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for MusicalNote {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(D::Error::custom)
    }
}

/// A note held for a fixed time.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tone {
    pub note: MusicalNote,
    #[serde(rename = "duration_ms", with = "millis")]
    pub duration: Duration,
}

impl Tone {
    pub fn new(note: MusicalNote, duration: Duration) -> Self {
        Self { note, duration }
    }

    pub fn frequency_hz(&self) -> f64 {
        self.note.as_freq_hz()
    }
}

impl Display for Tone {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} for {} ms", self.note, self.duration.as_millis())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keylock_tone_macro::{note, tone};

    #[test]
    fn notes_resolve_to_equal_tempered_frequencies() {
        assert_eq!(note!("A4").as_freq_hz(), 440.0);
        assert_eq!(note!("F4").as_freq_hz().round(), 349.0);
        assert_eq!(note!("D#7").as_freq_hz().round(), 2489.0);
        assert_eq!(note!("Eb7"), note!("D#7"));
    }

    #[test]
    fn tone_macro_builds_tones() {
        let tone = tone!("F4" for 50ms);
        assert_eq!(tone.note, MusicalNote::F4);
        assert_eq!(tone.duration, Duration::from_millis(50));
        assert_eq!(tone.to_string(), "F4 for 50 ms");
    }

    #[test]
    fn tones_round_trip_through_json() {
        let tone = tone!("Eb7" for 50ms);
        let json = serde_json::to_string(&tone).unwrap();
        assert_eq!(json, r#"{"note":"D#7","duration_ms":50}"#);
        assert_eq!(serde_json::from_str::<Tone>(&json).unwrap(), tone);
        assert!(serde_json::from_str::<Tone>(r#"{"note":"H2","duration_ms":5}"#).is_err());
    }
}
