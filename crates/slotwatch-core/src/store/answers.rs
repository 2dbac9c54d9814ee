//! Security-question answer map.
//!
//! The portal renders question text with minor formatting variance, so
//! lookups normalize case and whitespace on both sides instead of
//! matching exact strings.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::data_dir;
use crate::error::ConfigError;

const ANSWERS_FILE: &str = "answers.json";

/// Mapping from normalized question text to answer string.
#[derive(Debug, Clone, Default)]
pub struct SecurityAnswerMap {
    answers: HashMap<String, String>,
}

/// Lowercase, trim and collapse runs of whitespace so that formatting
/// variance on the portal side still matches the stored key.
fn normalize(question: &str) -> String {
    question
        .split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

impl SecurityAnswerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default on-disk location inside the data directory.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join(ANSWERS_FILE))
    }

    /// Load the answer map from the default location, failing fast when
    /// the file is missing or malformed.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load a `{"question": "answer"}` JSON object from `path`.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::MissingKey(format!(
                "security answers file not found at {}",
                path.display()
            )));
        }
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let parsed: HashMap<String, String> =
            serde_json::from_str(&raw).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;

        let mut map = Self::new();
        for (question, answer) in parsed {
            map.insert(&question, answer);
        }
        if map.answers.is_empty() {
            return Err(ConfigError::MissingKey(format!(
                "security answers file at {} is empty",
                path.display()
            )));
        }
        Ok(map)
    }

    pub fn insert(&mut self, question: &str, answer: impl Into<String>) {
        self.answers.insert(normalize(question), answer.into());
    }

    /// Look up an answer for a question as presented by the portal.
    pub fn lookup(&self, question: &str) -> Option<&str> {
        self.answers.get(&normalize(question)).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;

    #[test]
    fn lookup_is_case_and_whitespace_insensitive() {
        let mut map = SecurityAnswerMap::new();
        map.insert("what is your mother's maiden name?", "smith");

        assert_eq!(
            map.lookup("What is your Mother's Maiden Name?"),
            Some("smith")
        );
        assert_eq!(
            map.lookup("  What   is your mother's\tmaiden name? "),
            Some("smith")
        );
    }

    #[test]
    fn unknown_question_has_no_match() {
        let mut map = SecurityAnswerMap::new();
        map.insert("what city were you born in?", "pune");
        assert_eq!(map.lookup("What was the name of your first pet?"), None);
    }

    #[test]
    fn loads_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"What street did you grow up on?": "park road"}}"#
        )
        .unwrap();

        let map = SecurityAnswerMap::load_from(file.path()).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.lookup("what street did YOU grow up on?"), Some("park road"));
    }

    #[test]
    fn missing_file_fails_fast() {
        let err = SecurityAnswerMap::load_from(Path::new("/nonexistent/answers.json")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(_)));
    }

    #[test]
    fn malformed_json_fails_fast() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = SecurityAnswerMap::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseFailed(_)));
    }

    #[test]
    fn empty_map_fails_fast() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{}}").unwrap();
        let err = SecurityAnswerMap::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(_)));
    }

    proptest! {
        /// Any re-spacing or case change of a stored question still matches.
        #[test]
        fn normalization_survives_case_and_spacing(
            words in proptest::collection::vec("[a-zA-Z]{1,8}", 1..6),
            spaces in proptest::collection::vec(" |  |\t", 0..6),
        ) {
            let question = words.join(" ");
            let mut map = SecurityAnswerMap::new();
            map.insert(&question, "answer");

            let mut mangled = String::new();
            for (i, word) in words.iter().enumerate() {
                if i > 0 {
                    mangled.push_str(spaces.get(i % spaces.len().max(1)).map(|s| s.as_str()).unwrap_or(" "));
                }
                mangled.push_str(&word.to_uppercase());
            }
            prop_assert_eq!(map.lookup(&mangled), Some("answer"));
        }
    }
}
