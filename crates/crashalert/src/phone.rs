//! Phone number normalization.
//!
//! Raw contact numbers are reduced to the form a provider can accept and
//! classified by which provider can deliver to them.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Country calling code served by the domestic provider.
pub const DOMESTIC_COUNTRY_CODE: &str = "91";

/// Number of digits in a domestic subscriber number.
pub const DOMESTIC_DIGITS: usize = 10;

/// Which provider class can deliver to a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhoneClass {
    /// Ten-digit domestic number.
    Domestic,
    /// E.164 number for the international provider.
    International,
    /// Not deliverable by any provider.
    Invalid,
}

impl std::fmt::Display for PhoneClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Domestic => write!(f, "domestic"),
            Self::International => write!(f, "international"),
            Self::Invalid => write!(f, "invalid"),
        }
    }
}

/// A phone number after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedPhone {
    /// The input as given.
    pub raw: String,
    /// Ten digits for domestic numbers, `+<digits>` for international ones.
    pub canonical: String,
    /// Provider class.
    pub class: PhoneClass,
}

impl NormalizedPhone {
    /// Whether some provider can deliver to this number.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.class != PhoneClass::Invalid
    }

    /// The ten-digit form expected by the domestic provider.
    #[must_use]
    pub fn domestic_number(&self) -> Option<&str> {
        match self.class {
            PhoneClass::Domestic => Some(&self.canonical),
            PhoneClass::International | PhoneClass::Invalid => None,
        }
    }

    /// The E.164 form expected by the international provider.
    ///
    /// Domestic numbers are prefixed with the domestic country code.
    #[must_use]
    pub fn e164(&self) -> Option<String> {
        match self.class {
            PhoneClass::Domestic => Some(format!("+{DOMESTIC_COUNTRY_CODE}{}", self.canonical)),
            PhoneClass::International => Some(self.canonical.clone()),
            PhoneClass::Invalid => None,
        }
    }
}

fn non_digit() -> &'static Regex {
    static NON_DIGIT: OnceLock<Regex> = OnceLock::new();
    NON_DIGIT.get_or_init(|| Regex::new(r"\D").expect("static pattern compiles"))
}

/// Strip every non-digit character.
#[must_use]
pub fn digits_only(raw: &str) -> String {
    non_digit().replace_all(raw, "").into_owned()
}

/// Normalize a raw phone string.
///
/// Rules, in order:
/// 1. 10 digits → domestic.
/// 2. 12 digits starting with `91` → domestic, prefix stripped.
/// 3. 13 digits starting with `091` → domestic, prefix stripped.
/// 4. Leading `+` and 2–15 digits → international.
/// 5. Anything else → invalid.
#[must_use]
pub fn normalize(raw: &str) -> NormalizedPhone {
    let digits = digits_only(raw);
    let prefixed = format!("0{DOMESTIC_COUNTRY_CODE}");

    let (canonical, class) = if digits.len() == DOMESTIC_DIGITS {
        (digits, PhoneClass::Domestic)
    } else if digits.len() == DOMESTIC_DIGITS + 2 && digits.starts_with(DOMESTIC_COUNTRY_CODE) {
        (digits[2..].to_string(), PhoneClass::Domestic)
    } else if digits.len() == DOMESTIC_DIGITS + 3 && digits.starts_with(&prefixed) {
        (digits[3..].to_string(), PhoneClass::Domestic)
    } else if raw.trim_start().starts_with('+') && (2..=15).contains(&digits.len()) {
        (format!("+{digits}"), PhoneClass::International)
    } else {
        (digits, PhoneClass::Invalid)
    };

    NormalizedPhone {
        raw: raw.to_string(),
        canonical,
        class,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_domestic() {
        let phone = normalize("9876543210");
        assert_eq!(phone.class, PhoneClass::Domestic);
        assert_eq!(phone.canonical, "9876543210");
    }

    #[test]
    fn test_domestic_with_country_code() {
        let phone = normalize("+919876543210");
        assert_eq!(phone.class, PhoneClass::Domestic);
        assert_eq!(phone.canonical, "9876543210");

        let phone = normalize("91 98765 43210");
        assert_eq!(phone.class, PhoneClass::Domestic);
        assert_eq!(phone.canonical, "9876543210");
    }

    #[test]
    fn test_domestic_with_trunk_prefix() {
        let phone = normalize("091-98765-43210");
        assert_eq!(phone.class, PhoneClass::Domestic);
        assert_eq!(phone.canonical, "9876543210");
    }

    #[test]
    fn test_eleven_digits_with_leading_zero_is_invalid() {
        let phone = normalize("09876543210");
        assert_eq!(phone.class, PhoneClass::Invalid);
        assert!(!phone.is_valid());
    }

    #[test]
    fn test_international() {
        let phone = normalize("+12345678901");
        assert_eq!(phone.class, PhoneClass::International);
        assert_eq!(phone.canonical, "+12345678901");

        let phone = normalize("+1 (987) 654-3210 0");
        assert_eq!(phone.class, PhoneClass::International);
        assert_eq!(phone.canonical, "+198765432100");
    }

    #[test]
    fn test_international_length_limits() {
        assert_eq!(normalize("+4").class, PhoneClass::Invalid);
        assert_eq!(normalize("+44").class, PhoneClass::International);
        assert_eq!(normalize("+1234567890123456").class, PhoneClass::Invalid);
    }

    #[test]
    fn test_garbage_is_invalid() {
        assert_eq!(normalize("").class, PhoneClass::Invalid);
        assert_eq!(normalize("call me").class, PhoneClass::Invalid);
        assert_eq!(normalize("12345").class, PhoneClass::Invalid);
    }

    #[test]
    fn test_normalization_is_idempotent() {
        for raw in [
            "9876543210",
            "+919876543210",
            "091 98765 43210",
            "+12345678901",
            "+44 20 7946 0958",
            "+1234567890",
        ] {
            let once = normalize(raw);
            assert!(once.is_valid(), "{raw} should be valid");
            let twice = normalize(&once.canonical);
            assert_eq!(twice.canonical, once.canonical, "not idempotent for {raw}");
            assert_eq!(twice.class, once.class);
        }
    }

    #[test]
    fn test_provider_forms() {
        let domestic = normalize("+91 98765 43210");
        assert_eq!(domestic.domestic_number(), Some("9876543210"));
        assert_eq!(domestic.e164().as_deref(), Some("+919876543210"));

        let international = normalize("+12345678901");
        assert_eq!(international.domestic_number(), None);
        assert_eq!(international.e164().as_deref(), Some("+12345678901"));

        assert_eq!(normalize("nope").e164(), None);
    }
}
