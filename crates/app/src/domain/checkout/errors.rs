//! Checkout service errors.

use bazaar::{cart::CartError, checkout::CheckoutError};
use sqlx::{
    Error,
    error::{DatabaseError, ErrorKind},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckoutServiceError {
    #[error("cart not found")]
    NotFound,

    #[error("related resource not found")]
    InvalidReference,

    #[error("invalid data")]
    InvalidData,

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error("storage error")]
    Sql(#[source] Error),
}

impl From<Error> for CheckoutServiceError {
    fn from(error: Error) -> Self {
        if matches!(error, Error::RowNotFound) {
            return Self::NotFound;
        }

        match error.as_database_error().map(DatabaseError::kind) {
            Some(ErrorKind::ForeignKeyViolation) => Self::InvalidReference,
            Some(ErrorKind::CheckViolation) => Self::InvalidData,
            Some(ErrorKind::Other | _) | None => Self::Sql(error),
        }
    }
}
