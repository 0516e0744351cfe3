//! Player-name normalization
//!
//! Folds a raw extracted name to the canonical comparison key:
//! trim, lower-case, strip diacritics, collapse whitespace.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::{PlayerLimits, RumorError};

/// Quote characters analyzers like to wrap names in
const WRAPPING_QUOTES: &[char] = &['"', '\'', '“', '”', '‘', '’', '«', '»', '`'];

/// Fold a name to its lookup key. Never fails; may return an empty string.
pub fn normalize_name(raw: &str) -> String {
    let unquoted = raw.trim().trim_matches(WRAPPING_QUOTES);
    let folded: String = unquoted
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect();
    collapse_whitespace(&folded)
}

/// Normalize a raw player name, rejecting empty or oversized input
pub fn normalize_player_name(raw: &str, limits: &PlayerLimits) -> Result<String, RumorError> {
    let display = raw.trim();
    if display.chars().count() > limits.max_name_len {
        return Err(RumorError::validation(format!(
            "player name exceeds {} characters",
            limits.max_name_len
        )));
    }
    let normalized = normalize_name(display);
    if normalized.is_empty() {
        return Err(RumorError::validation(format!(
            "player name {:?} is empty after normalization",
            raw
        )));
    }
    Ok(normalized)
}

/// Normalize and validate a full alias list, dropping the player's own key
/// and duplicates that fold to the same spelling.
pub fn normalize_aliases(
    aliases: &[String],
    own_normalized: &str,
    limits: &PlayerLimits,
) -> Result<Vec<String>, RumorError> {
    let mut out: Vec<String> = Vec::with_capacity(aliases.len());
    for alias in aliases {
        if alias.trim().chars().count() > limits.max_alias_len {
            return Err(RumorError::validation(format!(
                "alias {:?} exceeds {} characters",
                alias, limits.max_alias_len
            )));
        }
        let key = normalize_name(alias);
        if key.is_empty() || key == own_normalized || out.contains(&key) {
            continue;
        }
        out.push(key);
    }
    if out.len() > limits.max_aliases {
        return Err(RumorError::validation(format!(
            "at most {} aliases allowed, got {}",
            limits.max_aliases,
            out.len()
        )));
    }
    Ok(out)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_case_and_whitespace() {
        assert_eq!(normalize_name("  ISCO "), "isco");
        assert_eq!(normalize_name("Nabil \t  Fekir"), "nabil fekir");
    }

    #[test]
    fn test_normalize_diacritics() {
        assert_eq!(normalize_name("Héctor Bellerín"), "hector bellerin");
        assert_eq!(normalize_name("Çağlar Söyüncü"), "caglar soyuncu");
        assert_eq!(normalize_name("Joaquín"), normalize_name("joaquin"));
    }

    #[test]
    fn test_normalize_strips_wrapping_quotes() {
        assert_eq!(normalize_name("\"Chimy\" "), "chimy");
        assert_eq!(normalize_name("«Lo Celso»"), "lo celso");
    }

    #[test]
    fn test_player_name_validation() {
        let limits = PlayerLimits::default();
        assert_eq!(normalize_player_name(" Isco ", &limits).unwrap(), "isco");
        assert!(normalize_player_name("   ", &limits).is_err());
        assert!(normalize_player_name("\"\"", &limits).is_err());
        let long = "a".repeat(limits.max_name_len + 1);
        assert!(normalize_player_name(&long, &limits).is_err());
    }

    #[test]
    fn test_alias_normalization() {
        let limits = PlayerLimits::default();
        let aliases = vec![
            "Francisco Román Alarcón".to_string(),
            "francisco roman alarcon".to_string(),
            "ISCO".to_string(),
            " ".to_string(),
        ];
        let out = normalize_aliases(&aliases, "isco", &limits).unwrap();
        assert_eq!(out, vec!["francisco roman alarcon".to_string()]);
    }

    #[test]
    fn test_alias_caps() {
        let limits = PlayerLimits {
            max_aliases: 2,
            ..PlayerLimits::default()
        };
        let aliases: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert!(normalize_aliases(&aliases, "x", &limits).is_err());

        let long = vec!["b".repeat(limits.max_alias_len + 1)];
        assert!(normalize_aliases(&long, "x", &limits).is_err());
    }
}
