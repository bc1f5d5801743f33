use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The five wound categories the classifier can output.
///
/// The discriminant order is load-bearing: the network's output vector is
/// positional over this enumeration, so variants must never be reordered or
/// removed once a model has been trained against them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WoundClass {
    Abrasions,
    Bruises,
    Burns,
    Cut,
    Normal,
}

/// Languages the engine can localize labels and descriptors into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Th,
}

impl WoundClass {
    /// All classes in model output order.
    pub const ALL: [WoundClass; 5] = [
        WoundClass::Abrasions,
        WoundClass::Bruises,
        WoundClass::Burns,
        WoundClass::Cut,
        WoundClass::Normal,
    ];

    /// Number of classes, i.e. the expected length of a probability vector.
    pub const COUNT: usize = Self::ALL.len();

    /// Position of this class in the model's output vector.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Maps a model output index back to a class.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Display label for the given language.
    pub fn label(self, language: Language) -> &'static str {
        match language {
            Language::En => match self {
                WoundClass::Abrasions => "Abrasions",
                WoundClass::Bruises => "Bruises",
                WoundClass::Burns => "Burns",
                WoundClass::Cut => "Cut",
                WoundClass::Normal => "Normal",
            },
            Language::Th => match self {
                WoundClass::Abrasions => "แผลถลอก",
                WoundClass::Bruises => "รอยช้ำ",
                WoundClass::Burns => "แผลไฟไหม้",
                WoundClass::Cut => "แผลบาด",
                WoundClass::Normal => "ผิวหนังปกติ",
            },
        }
    }
}

impl fmt::Display for WoundClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label(Language::En))
    }
}

impl FromStr for WoundClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|class| class.label(Language::En).eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown wound class: {}", s))
    }
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Th => "th",
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "en" | "EN" | "En" => Ok(Language::En),
            "th" | "TH" | "Th" => Ok(Language::Th),
            other => Err(format!("unsupported language: {} (expected en or th)", other)),
        }
    }
}

/// Outcome of a single classification call.
///
/// Returned by value; the engine keeps no reference to it beyond its
/// aggregate latency counters.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationResult {
    /// Class with the highest probability.
    pub predicted: WoundClass,
    /// Probability of the predicted class.
    pub confidence: f32,
    /// Full distribution in [`WoundClass::ALL`] order. Sums to 1.0 within
    /// floating-point epsilon.
    pub probabilities: [f32; WoundClass::COUNT],
    /// Wall-clock inference time for this call.
    #[serde(skip)]
    pub elapsed: Duration,
}

impl ClassificationResult {
    /// Probability for a specific class.
    pub fn probability(&self, class: WoundClass) -> f32 {
        self.probabilities[class.index()]
    }

    /// The distribution re-keyed by localized class labels, in enumeration
    /// order.
    pub fn labelled_probabilities(&self, language: Language) -> Vec<(String, f32)> {
        WoundClass::ALL
            .iter()
            .map(|class| (class.label(language).to_string(), self.probabilities[class.index()]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_order_is_positional() {
        assert_eq!(WoundClass::Abrasions.index(), 0);
        assert_eq!(WoundClass::Bruises.index(), 1);
        assert_eq!(WoundClass::Burns.index(), 2);
        assert_eq!(WoundClass::Cut.index(), 3);
        assert_eq!(WoundClass::Normal.index(), 4);
    }

    #[test]
    fn test_index_round_trip() {
        for class in WoundClass::ALL {
            assert_eq!(WoundClass::from_index(class.index()), Some(class));
        }
        assert_eq!(WoundClass::from_index(WoundClass::COUNT), None);
    }

    #[test]
    fn test_labels_localized() {
        assert_eq!(WoundClass::Cut.label(Language::En), "Cut");
        assert_eq!(WoundClass::Cut.label(Language::Th), "แผลบาด");
        assert_eq!(WoundClass::Normal.label(Language::Th), "ผิวหนังปกติ");
    }

    #[test]
    fn test_class_from_str() {
        assert_eq!("cut".parse::<WoundClass>().unwrap(), WoundClass::Cut);
        assert_eq!("Abrasions".parse::<WoundClass>().unwrap(), WoundClass::Abrasions);
        assert!("laceration".parse::<WoundClass>().is_err());
    }

    #[test]
    fn test_language_from_str() {
        assert_eq!("en".parse::<Language>().unwrap(), Language::En);
        assert_eq!("th".parse::<Language>().unwrap(), Language::Th);
        assert!("de".parse::<Language>().is_err());
    }

    #[test]
    fn test_labelled_probabilities_follow_enum_order() {
        let result = ClassificationResult {
            predicted: WoundClass::Burns,
            confidence: 0.5,
            probabilities: [0.1, 0.1, 0.5, 0.2, 0.1],
            elapsed: Duration::from_millis(3),
        };
        let labelled = result.labelled_probabilities(Language::En);
        assert_eq!(labelled[0], ("Abrasions".to_string(), 0.1));
        assert_eq!(labelled[2], ("Burns".to_string(), 0.5));
        assert_eq!(result.probability(WoundClass::Cut), 0.2);
    }
}
