use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::DomainError;

const MIN_PASSWORD_LENGTH: usize = 8;
// bcrypt silently truncates beyond this
const MAX_PASSWORD_BYTES: usize = 72;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("hardcoded email regex is invalid - fix source code")
});

/// Validate email format (RFC 5322 simplified)
pub fn validate_email(email: &str) -> Result<(), DomainError> {
    if !email.is_empty() && email.len() <= 254 && EMAIL_REGEX.is_match(email) {
        Ok(())
    } else {
        Err(DomainError::InvalidEmail(email.to_string()))
    }
}

/// Password policy:
/// - 8 to 72 bytes
/// - at least one uppercase letter, one lowercase letter and one digit
pub fn validate_password_policy(password: &str) -> Result<(), DomainError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(DomainError::PasswordPolicyViolation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(DomainError::PasswordPolicyViolation(format!(
            "Password must be at most {} bytes",
            MAX_PASSWORD_BYTES
        )));
    }

    let has_uppercase = password.chars().any(char::is_uppercase);
    let has_lowercase = password.chars().any(char::is_lowercase);
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if !(has_uppercase && has_lowercase && has_digit) {
        return Err(DomainError::PasswordPolicyViolation(
            "Password must contain an uppercase letter, a lowercase letter and a digit".to_string(),
        ));
    }

    Ok(())
}

pub fn hash_password(password: &str, cost: u32) -> Result<String, DomainError> {
    bcrypt::hash(password, cost).map_err(|e| DomainError::Internal(format!("Password hashing failed: {}", e)))
}

/// Malformed stored hashes verify as false rather than erroring.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match bcrypt::verify(password, hash) {
        Ok(matches) => matches,
        Err(e) => {
            tracing::warn!("Password hash could not be verified: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_addresses() {
        assert!(validate_email("parent@example.com").is_ok());
        assert!(validate_email("first.last+tag@city.gov.pl").is_ok());
    }

    #[test]
    fn rejects_malformed_addresses() {
        for bad in ["", "plain", "@example.com", "a@b", "a b@example.com"] {
            assert!(matches!(validate_email(bad), Err(DomainError::InvalidEmail(_))), "{bad}");
        }
    }

    #[test]
    fn password_policy() {
        assert!(validate_password_policy("Secret123").is_ok());
        assert!(validate_password_policy("Sh0rt").is_err());
        assert!(validate_password_policy("alllowercase1").is_err());
        assert!(validate_password_policy("ALLUPPERCASE1").is_err());
        assert!(validate_password_policy("NoDigitsHere").is_err());
        assert!(validate_password_policy(&format!("Aa1{}", "x".repeat(80))).is_err());
    }

    #[test]
    fn hash_roundtrip() {
        let hash = hash_password("Secret123", 4).unwrap();
        assert!(verify_password("Secret123", &hash));
        assert!(!verify_password("Secret124", &hash));
        assert!(!verify_password("Secret123", "not-a-hash"));
    }
}
