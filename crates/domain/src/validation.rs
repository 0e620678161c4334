use crate::DomainError;

pub(crate) fn required(field: &str, value: &str, max: usize) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::ValidationFailed(format!("{field} is required")));
    }
    max_len(field, value, max)
}

pub(crate) fn max_len(field: &str, value: &str, max: usize) -> Result<(), DomainError> {
    if value.chars().count() > max {
        return Err(DomainError::ValidationFailed(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

/// One `@` with a non-empty local part and domain part.
pub(crate) fn email(value: &str) -> Result<(), DomainError> {
    required("email", value, 100)?;
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(DomainError::ValidationFailed(format!(
            "email '{value}' is not a valid address"
        )));
    }
    Ok(())
}
