//! Display-name grammar and normalization.
//!
//! Matches (letter | digit | space | hyphen | dot), where letter includes
//! ASCII letters and the Turkish-language set. Length ≤ 20 after trimming.
//! Uniqueness against other lockers on the same kiosk is handled by
//! `lcp-storage::lockers::display_name_taken`, which this module feeds a
//! normalized name.

use crate::error::LockerError;

const MAX_LEN: usize = 20;
const TURKISH_LETTERS: &[char] = &['ç', 'Ç', 'ğ', 'Ğ', 'ı', 'İ', 'ö', 'Ö', 'ş', 'Ş', 'ü', 'Ü'];

fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == ' ' || c == '-' || c == '.' || TURKISH_LETTERS.contains(&c)
}

/// Trim and validate a proposed display name.
///
/// Idempotent under trimming: `validate(name) == validate(trim(name))`.
///
/// # Errors
///
/// Returns [`LockerError::Validation`] if the trimmed name is empty, exceeds
/// [`MAX_LEN`] characters, or contains a character outside the grammar. A
/// too-long name's message includes the first 20 characters as a suggestion.
pub fn validate(name: &str) -> Result<String, LockerError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(LockerError::Validation { reason: "display name must not be empty".to_owned() });
    }

    if let Some(bad) = trimmed.chars().find(|c| !is_allowed_char(*c)) {
        return Err(LockerError::Validation {
            reason: format!("display name contains disallowed character '{bad}'"),
        });
    }

    if trimmed.chars().count() > MAX_LEN {
        let suggestion: String = trimmed.chars().take(MAX_LEN).collect();
        return Err(LockerError::Validation {
            reason: format!(
                "display name too long ({} chars, max {MAX_LEN}); try '{suggestion}'",
                trimmed.chars().count()
            ),
        });
    }

    Ok(trimmed.to_owned())
}

/// Case- and whitespace-insensitive key used for uniqueness checks.
#[must_use]
pub fn normalize_for_uniqueness(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_turkish_letters() {
        assert!(validate("Dolap ı-Şık.1").is_ok());
    }

    #[test]
    fn rejects_disallowed_character() {
        assert!(validate("Locker_1").is_err());
    }

    #[test]
    fn validation_is_idempotent_under_trimming() {
        let padded = "  Locker A  ";
        assert_eq!(validate(padded).unwrap(), validate(padded.trim()).unwrap());
    }

    #[test]
    fn too_long_name_suggests_truncation() {
        let name = "this name is definitely far too long";
        let err = validate(name).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains(&name[..20]));
    }
}
