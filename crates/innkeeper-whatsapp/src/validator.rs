// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recipient format check for WhatsApp numbers.

use innkeeper_core::RecipientValidator;

/// Accepts E.164 numbers: 8 to 15 digits, optionally prefixed with `+`,
/// not starting with `0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhoneNumberValidator;

impl PhoneNumberValidator {
    const MIN_DIGITS: usize = 8;
    const MAX_DIGITS: usize = 15;
}

impl RecipientValidator for PhoneNumberValidator {
    fn validate(&self, recipient: &str) -> Result<(), String> {
        let digits = recipient.strip_prefix('+').unwrap_or(recipient);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err("phone number must contain only digits and an optional leading '+'".into());
        }
        if digits.starts_with('0') {
            return Err("phone number must start with a country code".into());
        }
        if !(Self::MIN_DIGITS..=Self::MAX_DIGITS).contains(&digits.len()) {
            return Err(format!(
                "phone number must have {} to {} digits, got {}",
                Self::MIN_DIGITS,
                Self::MAX_DIGITS,
                digits.len()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_e164_with_and_without_plus() {
        assert!(PhoneNumberValidator.validate("+4915112345678").is_ok());
        assert!(PhoneNumberValidator.validate("15550001111").is_ok());
        assert!(PhoneNumberValidator.validate("12345678").is_ok());
    }

    #[test]
    fn rejects_formatting_characters() {
        assert!(PhoneNumberValidator.validate("+1 555 000 1111").is_err());
        assert!(PhoneNumberValidator.validate("555-0001").is_err());
        assert!(PhoneNumberValidator.validate("++15550001111").is_err());
        assert!(PhoneNumberValidator.validate("+").is_err());
        assert!(PhoneNumberValidator.validate("").is_err());
    }

    #[test]
    fn enforces_length_bounds() {
        assert!(PhoneNumberValidator.validate("1234567").is_err());
        assert!(PhoneNumberValidator.validate("1234567890123456").is_err());
        let err = PhoneNumberValidator.validate("+123").unwrap_err();
        assert!(err.contains("got 3"), "{err}");
    }

    #[test]
    fn rejects_leading_zero() {
        assert!(PhoneNumberValidator.validate("015112345678").is_err());
    }
}
