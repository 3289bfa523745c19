mod jwt;

pub use jwt::*;

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("{0}")]
    Invalid(&'static str),
    #[error("The {0} role is required")]
    Role(&'static str),
}
