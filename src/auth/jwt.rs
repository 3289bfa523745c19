use crate::{auth::AuthError, now, AppState, Error, Result};
use actix_web::http::header::AUTHORIZATION;
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};

/// Caller roles granted by the identity provider.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Organizer,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JwtToken {
    // issued at
    pub iat: i64,
    // expiration
    pub exp: i64,
    // subject, the user id at the identity provider
    pub sub: String,
    pub role: Role,
}

impl JwtToken {
    pub fn from_str(token: &str, secret: &[u8]) -> Result<Self, AuthError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        Ok(
            jsonwebtoken::decode::<JwtToken>(
                token,
                &DecodingKey::from_secret(secret),
                &validation,
            )?
            .claims,
        )
    }

    pub fn generate(
        sub: &str,
        role: Role,
        expiry: usize,
        secret: &[u8],
    ) -> Result<String, AuthError> {
        let now = now() as i64;
        let payload = JwtToken {
            iat: now,
            exp: now + expiry as i64,
            sub: sub.to_owned(),
            role,
        };

        Ok(jsonwebtoken::encode(
            &Header::default(),
            &payload,
            &EncodingKey::from_secret(secret),
        )?)
    }
}

/// Caller holding a valid bearer token of any role.
#[derive(Debug)]
pub struct AuthedUser {
    pub token: JwtToken,
}

impl AuthedUser {
    fn from_http(req: &HttpRequest) -> Result<Self> {
        if let Some(state) = req.app_data::<web::Data<AppState>>() {
            if let Some(auth) = req.headers().get(AUTHORIZATION) {
                if let Ok(auth) = auth.to_str() {
                    if auth.starts_with("bearer") || auth.starts_with("Bearer") {
                        let token = auth[6..auth.len()].trim();
                        let secret = state.setting.read().auth.secret.clone();
                        let token = JwtToken::from_str(token, secret.as_bytes())?;
                        return Ok(Self { token });
                    }
                }
            }
        }
        Err(AuthError::Invalid("missing auth token").into())
    }

    fn require(self, roles: &[Role], name: &'static str) -> Result<Self> {
        if roles.contains(&self.token.role) {
            Ok(self)
        } else {
            Err(AuthError::Role(name).into())
        }
    }
}

impl FromRequest for AuthedUser {
    type Error = Error;
    type Future = Ready<Result<AuthedUser>>;

    fn from_request(req: &HttpRequest, _pl: &mut Payload) -> Self::Future {
        ready(AuthedUser::from_http(req))
    }
}

/// Caller with the admin role.
#[derive(Debug)]
pub struct Admin(pub AuthedUser);

impl FromRequest for Admin {
    type Error = Error;
    type Future = Ready<Result<Admin>>;

    fn from_request(req: &HttpRequest, _pl: &mut Payload) -> Self::Future {
        ready(
            AuthedUser::from_http(req)
                .and_then(|user| user.require(&[Role::Admin], "admin"))
                .map(Admin),
        )
    }
}

/// Caller allowed to create events, organizers and admins.
#[derive(Debug)]
pub struct Organizer(pub AuthedUser);

impl FromRequest for Organizer {
    type Error = Error;
    type Future = Ready<Result<Organizer>>;

    fn from_request(req: &HttpRequest, _pl: &mut Payload) -> Self::Future {
        ready(
            AuthedUser::from_http(req)
                .and_then(|user| user.require(&[Role::Admin, Role::Organizer], "organizer"))
                .map(Organizer),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn token() -> anyhow::Result<()> {
        let token = JwtToken::generate("user_abc123", Role::Organizer, 3600, b"secret")?;
        let auth = JwtToken::from_str(&token, b"secret")?;
        assert_eq!(auth.sub, "user_abc123");
        assert_eq!(auth.role, Role::Organizer);
        // wrong secret
        assert!(JwtToken::from_str(&token, b"other").is_err());
        // expired
        let token = JwtToken::generate("user_abc123", Role::Admin, 1, b"secret")?;
        tokio::time::sleep(Duration::from_secs(2)).await;
        let res = JwtToken::from_str(&token, b"secret");
        assert!(res.is_err());
        Ok(())
    }

    #[test]
    fn role() -> anyhow::Result<()> {
        let user = AuthedUser {
            token: JwtToken {
                iat: 0,
                exp: 0,
                sub: "u".to_owned(),
                role: Role::Organizer,
            },
        };
        let user = user.require(&[Role::Admin, Role::Organizer], "organizer")?;
        assert!(user.require(&[Role::Admin], "admin").is_err());
        Ok(())
    }
}
