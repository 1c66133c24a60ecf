use rocket::{
    http::Status,
    request::{FromRequest, Outcome, Request},
    State,
};

/// Shared secret for the admin endpoints.
pub struct AdminToken(pub String);

#[derive(Debug)]
pub enum AuthError {
    Missing,
    Invalid,
    Unconfigured,
}

/// Request guard for `Authorization: Bearer <ADMIN_TOKEN>`.
pub struct Admin;

/// Compares every byte regardless of where the first mismatch is.
fn tokens_match(given: &str, expected: &str) -> bool {
    let (given, expected) = (given.as_bytes(), expected.as_bytes());
    given.len() == expected.len()
        && given
            .iter()
            .zip(expected)
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
}

fn bearer(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Admin {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let expected = match request.guard::<&State<AdminToken>>().await {
            Outcome::Success(token) if !token.0.is_empty() => token,
            _ => return Outcome::Error((Status::Unauthorized, AuthError::Unconfigured)),
        };

        match request.headers().get_one("Authorization").and_then(bearer) {
            None => Outcome::Error((Status::Unauthorized, AuthError::Missing)),
            Some(token) if tokens_match(token, &expected.0) => Outcome::Success(Admin),
            Some(_) => {
                tracing::warn!("Rejected admin request with a wrong token");
                Outcome::Error((Status::Unauthorized, AuthError::Invalid))
            }
        }
    }
}
