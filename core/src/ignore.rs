use std::collections::BTreeMap;

use regex::{Regex, RegexBuilder};

use crate::Error;

/// Benign printer states, English and Norwegian firmware strings.
pub const DEFAULT_IGNORE: &[(&str, &[&str])] = &[
    ("low-supply", &["low:", "lite:"]),
    ("paper-empty", &["no paper", "tomt for papir"]),
    (
        "power-saving",
        &[
            "low power mode",
            "energy saver mode",
            "energisparemodus",
            "modus for lavt str",
        ],
    ),
    ("warm-up", &["warming up", "warmer opp"]),
];

pub fn default_ignore_tags() -> BTreeMap<String, Vec<String>> {
    DEFAULT_IGNORE
        .iter()
        .map(|(tag, phrases)| {
            (
                tag.to_string(),
                phrases.iter().map(|phrase| phrase.to_string()).collect(),
            )
        })
        .collect()
}

/// Tagged ignore phrases compiled into one case-insensitive alternation.
#[derive(Debug, Clone)]
pub struct IgnoreList {
    tags: Vec<String>,
    pattern: Option<Regex>,
}

impl IgnoreList {
    pub fn new(phrases: BTreeMap<String, Vec<String>>) -> Result<Self, Error> {
        let mut tags = Vec::new();
        let mut groups = Vec::new();
        for (tag, literals) in &phrases {
            let alternatives: Vec<String> = literals
                .iter()
                .filter(|literal| !literal.is_empty())
                .map(|literal| regex::escape(&literal.to_lowercase()))
                .collect();
            if alternatives.is_empty() {
                continue;
            }
            groups.push(format!("(?P<t{}>{})", tags.len(), alternatives.join("|")));
            tags.push(tag.clone());
        }

        let pattern = if groups.is_empty() {
            None
        } else {
            let compiled = RegexBuilder::new(&groups.join("|"))
                .case_insensitive(true)
                .build()
                .map_err(|error| Error::IgnorePattern {
                    details: error.to_string(),
                })?;
            Some(compiled)
        };

        Ok(Self { tags, pattern })
    }

    pub fn matches(&self, description: &str) -> bool {
        self.pattern
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(&description.to_lowercase()))
    }

    /// Tag of the first phrase found in `description`.
    pub fn matched_tag(&self, description: &str) -> Option<&str> {
        let pattern = self.pattern.as_ref()?;
        let lowered = description.to_lowercase();
        let captures = pattern.captures(&lowered)?;
        self.tags
            .iter()
            .enumerate()
            .find(|(position, _)| captures.name(&format!("t{position}")).is_some())
            .map(|(_, tag)| tag.as_str())
    }
}

impl Default for IgnoreList {
    fn default() -> Self {
        Self::new(default_ignore_tags()).expect("escaped literals compile")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_list_drops_benign_states() {
        let ignore = IgnoreList::default();
        assert!(ignore.matches("Low: Toner (Black)"));
        assert!(ignore.matches("Energy Saver Mode"));
        assert!(ignore.matches("Skuff 2: Tomt for papir"));
        assert!(ignore.matches("Warmer opp"));
        assert!(!ignore.matches("Paper Jam"));
        assert!(!ignore.matches("Toner empty"));
    }

    #[test]
    fn default_list_compiles_every_builtin_tag() {
        let ignore = IgnoreList::default();
        for (tag, phrases) in DEFAULT_IGNORE {
            for phrase in *phrases {
                assert_eq!(ignore.matched_tag(phrase), Some(*tag), "{phrase}");
            }
        }
    }

    #[test]
    fn reports_matching_tag() {
        let ignore = IgnoreList::default();
        assert_eq!(ignore.matched_tag("WARMING UP"), Some("warm-up"));
        assert_eq!(ignore.matched_tag("Lite: Gul toner"), Some("low-supply"));
        assert_eq!(ignore.matched_tag("Door open"), None);
    }

    #[test]
    fn literals_are_not_regex_syntax() {
        let mut phrases = BTreeMap::new();
        phrases.insert("custom".to_string(), vec!["tray (2)".to_string(), String::new()]);
        let ignore = IgnoreList::new(phrases).expect("compile");
        assert!(ignore.matches("Tray (2) open"));
        assert!(!ignore.matches("tray 2 open"));
    }

    #[test]
    fn empty_list_matches_nothing() {
        let ignore = IgnoreList::new(BTreeMap::new()).expect("compile");
        assert!(!ignore.matches("low: toner"));
        assert_eq!(ignore.matched_tag("low: toner"), None);
    }
}
