use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tokio::io;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("You need to upload at least one file.")]
    EmptyUpload,
    #[error("Oops, Looks like the file you tried uploading has invalid name! Change the name and try again.")]
    InvalidFileName,
    #[error("{0}")]
    Validation(String),

    #[error("We couldn't find this link! Please re-check and try again.")]
    NotFound,
    #[error("This link has expired.")]
    Expired,
    #[error("This link could only be downloaded once, and it already was.")]
    Consumed,
    #[error("This link is password protected! You need to provide the password.")]
    PasswordRequired,
    #[error("Hmm.. Wrong password, you must've typed that wrong.")]
    PasswordMismatch,

    #[error("The file behind this link is gone.")]
    BlobMissing(String),
    #[error("Something went wrong on our side! Please try again later.")]
    ArchiveEmpty,
    #[error("Something went wrong on our side! Please try again later.")]
    StoreUnavailable(#[source] anyhow::Error),
    #[error("This link name is already taken.")]
    TokenTaken,

    #[error("Something went wrong on our side! Please try again later.")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::EmptyUpload | Self::InvalidFileName | Self::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound | Self::BlobMissing(_) => StatusCode::NOT_FOUND,
            Self::Expired | Self::Consumed => StatusCode::GONE,
            Self::PasswordRequired | Self::PasswordMismatch => StatusCode::UNAUTHORIZED,
            Self::TokenTaken => StatusCode::CONFLICT,
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::ArchiveEmpty | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyUpload => "empty-upload",
            Self::InvalidFileName => "invalid-file-name",
            Self::Validation(_) => "validation",
            Self::NotFound => "not-found",
            Self::Expired => "expired",
            Self::Consumed => "consumed",
            Self::PasswordRequired => "password-required",
            Self::PasswordMismatch => "password-mismatch",
            Self::BlobMissing(_) => "file-gone",
            Self::TokenTaken => "token-taken",
            Self::StoreUnavailable(_) => "unavailable",
            Self::ArchiveEmpty | Self::Other(_) => "other",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.status();

        // BlobMissing and ArchiveEmpty are logged where the token is known.
        if matches!(self, Self::Other(_) | Self::StoreUnavailable(_)) {
            tracing::error!("{self:?}");
        }

        let res = ErrorResponse {
            error_code: self.error_code().to_string(),
            error: self.to_string(),
        };
        (code, Json(res)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(value: sqlx::Error) -> Self {
        Self::StoreUnavailable(value.into())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(value: sqlx::migrate::MigrateError) -> Self {
        Self::StoreUnavailable(value.into())
    }
}

impl From<io::Error> for AppError {
    fn from(value: io::Error) -> Self {
        Self::Other(value.into())
    }
}

impl From<MultipartError> for AppError {
    fn from(value: MultipartError) -> Self {
        Self::Validation(value.body_text())
    }
}

impl From<zip::result::ZipError> for AppError {
    fn from(value: zip::result::ZipError) -> Self {
        Self::Other(value.into())
    }
}

impl From<argon2::password_hash::Error> for AppError {
    fn from(value: argon2::password_hash::Error) -> Self {
        Self::Other(anyhow::anyhow!("password hashing failed: {value}"))
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error_code: String,
    pub error: String,
}
