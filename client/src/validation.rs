//! Client-side input validation.
//!
//! Nothing here touches the network: a form that fails validation is never
//! submitted.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use std::fmt;
use thiserror::Error;

/// Characters accepted as the "special" password character.
pub const PASSWORD_SPECIAL_CHARACTERS: &str = "!@#$%^&*()_+-=[]{};':\"\\|,.<>/?";

/// Minimum password length in characters.
pub const PASSWORD_MIN_LENGTH: usize = 8;

/// Exact length of a phone verification code.
pub const VERIFICATION_CODE_LENGTH: usize = 6;

/// Minimum number of digits in a phone number.
pub const PHONE_MIN_DIGITS: usize = 7;

/// Earliest accepted birth year.
pub const BIRTH_YEAR_MIN: i32 = 1900;

/// A single password strength rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordRequirement {
    /// At least [`PASSWORD_MIN_LENGTH`] characters
    MinLength,
    /// An ASCII uppercase letter
    Uppercase,
    /// An ASCII lowercase letter
    Lowercase,
    /// An ASCII digit
    Digit,
    /// One of [`PASSWORD_SPECIAL_CHARACTERS`]
    Special,
}

impl fmt::Display for PasswordRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::MinLength => "at least 8 characters",
            Self::Uppercase => "an uppercase letter",
            Self::Lowercase => "a lowercase letter",
            Self::Digit => "a digit",
            Self::Special => "a special character",
        };
        f.write_str(text)
    }
}

/// Why a form was rejected before submission.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is blank.
    #[error("{0} is required")]
    Required(&'static str),

    /// Password misses one or more strength rules (all are listed).
    #[error("Password needs {}", join_requirements(.0))]
    WeakPassword(Vec<PasswordRequirement>),

    /// Birth date is not a real `dd.MM.yyyy` date in the accepted range.
    #[error("Birth date must be a valid date in dd.MM.yyyy format")]
    InvalidBirthDate,

    /// Phone lacks the `+` prefix or enough digits.
    #[error("Phone number must include + and at least 7 digits")]
    InvalidPhone,

    /// Verification code is not exactly six characters.
    #[error("Verification code must be 6 characters")]
    InvalidCode,

    /// New password and confirmation differ.
    #[error("Passwords do not match")]
    PasswordMismatch,
}

fn join_requirements(missing: &[PasswordRequirement]) -> String {
    missing
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Every password rule `password` fails, in a fixed order.
#[must_use]
pub fn missing_password_requirements(password: &str) -> Vec<PasswordRequirement> {
    let mut missing = Vec::new();

    if password.chars().count() < PASSWORD_MIN_LENGTH {
        missing.push(PasswordRequirement::MinLength);
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        missing.push(PasswordRequirement::Uppercase);
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        missing.push(PasswordRequirement::Lowercase);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        missing.push(PasswordRequirement::Digit);
    }
    if !password.chars().any(|c| PASSWORD_SPECIAL_CHARACTERS.contains(c)) {
        missing.push(PasswordRequirement::Special);
    }

    missing
}

/// Check password strength.
///
/// # Errors
///
/// Returns [`ValidationError::WeakPassword`] listing every missing rule.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let missing = missing_password_requirements(password);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::WeakPassword(missing))
    }
}

/// Parse a `dd.MM.yyyy` birth date.
///
/// The year must fall between 1900 and the year of `now`.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidBirthDate`] for malformed or impossible dates.
pub fn parse_birth_date(input: &str, now: DateTime<Utc>) -> Result<NaiveDate, ValidationError> {
    let mut parts = input.split('.');
    let (Some(day), Some(month), Some(year), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ValidationError::InvalidBirthDate);
    };

    let well_formed = |part: &str, len: usize| {
        part.len() == len && part.chars().all(|c| c.is_ascii_digit())
    };
    if !(well_formed(day, 2) && well_formed(month, 2) && well_formed(year, 4)) {
        return Err(ValidationError::InvalidBirthDate);
    }

    let (Ok(day), Ok(month), Ok(year)) = (day.parse::<u32>(), month.parse::<u32>(), year.parse::<i32>())
    else {
        return Err(ValidationError::InvalidBirthDate);
    };

    if !(BIRTH_YEAR_MIN..=now.year()).contains(&year) {
        return Err(ValidationError::InvalidBirthDate);
    }

    NaiveDate::from_ymd_opt(year, month, day).ok_or(ValidationError::InvalidBirthDate)
}

/// Strip everything but digits, `+`, spaces and dashes.
#[must_use]
pub fn normalize_phone(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-'))
        .collect()
}

/// Check a phone number.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidPhone`] when `+` is missing or there are
/// fewer than seven digits.
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    if phone.contains('+') && digits >= PHONE_MIN_DIGITS {
        Ok(())
    } else {
        Err(ValidationError::InvalidPhone)
    }
}

/// Check a verification code.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidCode`] unless the trimmed code has six characters.
pub fn validate_code(code: &str) -> Result<(), ValidationError> {
    if code.trim().chars().count() == VERIFICATION_CODE_LENGTH {
        Ok(())
    } else {
        Err(ValidationError::InvalidCode)
    }
}

/// Check sign-in credentials.
///
/// # Errors
///
/// Returns [`ValidationError::Required`] for a blank phone or password.
pub fn validate_sign_in(phone: &str, password: &str) -> Result<(), ValidationError> {
    if phone.trim().is_empty() {
        return Err(ValidationError::Required("Phone number"));
    }
    if password.is_empty() {
        return Err(ValidationError::Required("Password"));
    }
    Ok(())
}

/// Check a password reset submission.
///
/// # Errors
///
/// Returns the first failing rule: missing token, weak password, or mismatch.
pub fn validate_password_reset(
    token: &str,
    new_password: &str,
    confirmation: &str,
) -> Result<(), ValidationError> {
    if token.trim().is_empty() {
        return Err(ValidationError::Required("Reset token"));
    }
    validate_password(new_password)?;
    if new_password != confirmation {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(())
}

/// The sign-up form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Display name
    pub name: String,
    /// Birth date as typed, `dd.MM.yyyy`
    pub birth_date: String,
    /// Phone number
    pub phone: String,
    /// Chosen password
    pub password: String,
}

impl Registration {
    /// Validate every field.
    ///
    /// # Errors
    ///
    /// Returns the first failing rule in form order.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::Required("Name"));
        }
        parse_birth_date(&self.birth_date, now)?;
        validate_password(&self.password)?;
        validate_phone(&self.phone)?;
        Ok(())
    }
}
