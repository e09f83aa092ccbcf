//! Input shape checks for the authentication flows.
//!
//! These run before any lookup so malformed input is reported with per-field
//! detail and never reaches storage.

use academia_core::{DomainResult, FieldErrors};

const MAX_EMAIL_LEN: usize = 254;
/// Upper bound keeps hashing cost predictable.
const MAX_PASSWORD_LEN: usize = 256;
const MAX_NAME_LEN: usize = 100;

pub fn check_email(errors: &mut FieldErrors, field: &str, email: &str) {
    let email = email.trim();
    if email.is_empty() {
        errors.add(field, "is required");
        return;
    }
    if email.len() > MAX_EMAIL_LEN {
        errors.add(field, format!("must be at most {MAX_EMAIL_LEN} characters"));
        return;
    }
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        errors.add(field, "must be a valid email address");
    }
}

pub fn check_password(errors: &mut FieldErrors, field: &str, password: &str, min_len: usize) {
    let len = password.chars().count();
    if len == 0 {
        errors.add(field, "is required");
    } else if len < min_len {
        errors.add(field, format!("must be at least {min_len} characters"));
    } else if len > MAX_PASSWORD_LEN {
        errors.add(field, format!("must be at most {MAX_PASSWORD_LEN} characters"));
    }
}

pub fn check_required(errors: &mut FieldErrors, field: &str, value: &str) {
    let value = value.trim();
    if value.is_empty() {
        errors.add(field, "is required");
    } else if value.chars().count() > MAX_NAME_LEN {
        errors.add(field, format!("must be at most {MAX_NAME_LEN} characters"));
    }
}

/// Email + tenant domain, the pair used by the pre-authentication lookups.
pub fn check_account_lookup(email: &str, tenant_domain: &str) -> DomainResult<()> {
    let mut errors = FieldErrors::new();
    check_email(&mut errors, "email", email);
    check_required(&mut errors, "tenantDomain", tenant_domain);
    errors.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use academia_core::DomainError;

    fn email_ok(email: &str) -> bool {
        let mut errors = FieldErrors::new();
        check_email(&mut errors, "email", email);
        errors.is_empty()
    }

    #[test]
    fn email_shapes() {
        assert!(email_ok("coach@gym1.example"));
        assert!(email_ok("  coach@gym1 "));
        assert!(!email_ok(""));
        assert!(!email_ok("coach"));
        assert!(!email_ok("@gym1"));
        assert!(!email_ok("coach@"));
        assert!(!email_ok("co ach@gym1"));
        assert!(!email_ok("a@b@c"));
    }

    #[test]
    fn password_length_bounds() {
        let mut errors = FieldErrors::new();
        check_password(&mut errors, "password", "short", 8);
        check_password(&mut errors, "newPassword", "long-enough", 8);
        match errors.into_result().unwrap_err() {
            DomainError::Validation(fields) => {
                assert!(fields.contains_key("password"));
                assert!(!fields.contains_key("newPassword"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn lookup_reports_each_field() {
        match check_account_lookup("", " ").unwrap_err() {
            DomainError::Validation(fields) => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields["tenantDomain"], "is required");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
