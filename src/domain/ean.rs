use std::fmt;

/// A validated EAN/GTIN search code. Codes that fail validation never reach
/// the engine; the batch loop marks those rows "Invalid EAN" directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ean(String);

impl Ean {
    pub fn parse(raw: &str) -> Result<Ean, String> {
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Err("empty EAN code".to_string());
        }
        if trimmed.eq_ignore_ascii_case("nan") {
            return Err(format!("'{}' is not an EAN code", trimmed));
        }
        if trimmed.chars().count() < 8 {
            return Err(format!("'{}' is too short for an EAN code", trimmed));
        }

        Ok(Ean(trimmed.to_string()))
    }
}

impl AsRef<str> for Ean {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::Ean;

    #[test]
    fn valid_codes_are_accepted_and_trimmed() {
        let ean = Ean::parse("  4006381333931 ").unwrap();
        assert_eq!(ean.as_ref(), "4006381333931");

        assert!(Ean::parse("12345678").is_ok());
    }

    #[test]
    fn short_codes_are_rejected() {
        assert!(Ean::parse("123").is_err());
        assert!(Ean::parse("1234567").is_err());
    }

    #[test]
    fn empty_and_nan_are_rejected() {
        assert!(Ean::parse("").is_err());
        assert!(Ean::parse("   ").is_err());
        assert!(Ean::parse("nan").is_err());
        assert!(Ean::parse("NaN").is_err());
    }
}
