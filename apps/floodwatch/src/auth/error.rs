use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("malformed token: {0}")]
    MalformedToken(String),
    #[error("token has expired")]
    Expired,
    #[error("token carries unknown role '{0}'")]
    UnknownRole(String),
    #[error("not logged in")]
    NotLoggedIn,
}
