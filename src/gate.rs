use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2, PasswordHash, PasswordVerifier,
};

use crate::errors::{AppError, AppResult};

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Batches without a hash accept anything, including an empty password.
pub fn verify(password_hash: Option<&str>, supplied: &str) -> bool {
    let Some(password_hash) = password_hash else {
        return true;
    };

    let parsed = match PasswordHash::new(password_hash) {
        Ok(parsed) => parsed,
        Err(why) => {
            tracing::error!("stored password hash could not be parsed: {why}");
            return false;
        }
    };

    Argon2::default()
        .verify_password(supplied.as_bytes(), &parsed)
        .is_ok()
}

/// Like [`verify`], but tells a missing password apart from a wrong one.
pub fn check(password_hash: Option<&str>, supplied: Option<&str>) -> AppResult<()> {
    if password_hash.is_none() {
        return Ok(());
    }

    match supplied {
        None | Some("") => Err(AppError::PasswordRequired),
        Some(supplied) if verify(password_hash, supplied) => Ok(()),
        Some(_) => Err(AppError::PasswordMismatch),
    }
}
