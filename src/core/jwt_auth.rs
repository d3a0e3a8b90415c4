use actix_web::{dev::Payload, web, Error as ActixWebError};
use actix_web::{error::ErrorUnauthorized, http, FromRequest, HttpRequest};
use core::fmt;
use jsonwebtoken::{decode, DecodingKey, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use uuid::Uuid;

use crate::core::AppConfig;

impl fmt::Display for AuthErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            serde_json::to_string(&self).unwrap_or_else(|_| self.error.clone())
        )
    }
}

#[derive(Debug, Serialize)]
struct AuthErrorResponse {
    success: bool,
    error: String,
}

fn authentication_required() -> AuthErrorResponse {
    AuthErrorResponse {
        success: false,
        error: "Authentication required".to_string(),
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtClaims {
    pub sub: String, // user ID
    pub email: String,
    pub role: String,
    #[serde(default)]
    pub name: Option<String>,
    pub exp: usize, // expiration time
}

/// The authenticated principal for a request. Resolved once from the bearer
/// token and passed into handlers explicitly; nothing downstream reads
/// request extensions for identity.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub claims: JwtClaims,
}

impl AuthenticatedUser {
    pub fn display_name(&self) -> String {
        self.claims
            .name
            .clone()
            .unwrap_or_else(|| self.email.clone())
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = ActixWebError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let config = match req.app_data::<web::Data<AppConfig>>() {
            Some(config) => config,
            None => return ready(Err(ErrorUnauthorized(authentication_required()))),
        };

        let token = req
            .headers()
            .get(http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|value| value.to_string());

        let token = match token {
            Some(token) => token,
            None => return ready(Err(ErrorUnauthorized(authentication_required()))),
        };

        let claims = match decode::<JwtClaims>(
            &token,
            &DecodingKey::from_secret(config.jwt_auth_config.secret.expose_secret().as_ref()),
            &Validation::default(),
        ) {
            Ok(data) => data.claims,
            Err(_) => return ready(Err(ErrorUnauthorized(authentication_required()))),
        };

        let user_id: Uuid = match claims.sub.parse() {
            Ok(id) => id,
            Err(_) => return ready(Err(ErrorUnauthorized(authentication_required()))),
        };

        let email = claims.email.clone();

        ready(Ok(AuthenticatedUser {
            user_id,
            email,
            claims,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use claims::{assert_err, assert_ok};
    use fake::faker::internet::en::SafeEmail;
    use fake::Fake;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token_for(claims: &JwtClaims, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_ref()),
        )
        .expect("failed to encode test token")
    }

    #[test]
    fn claims_round_trip_through_a_signed_token() {
        let secret = "test-secret";
        let email: String = SafeEmail().fake();
        let claims = JwtClaims {
            sub: Uuid::new_v4().to_string(),
            email: email.clone(),
            role: "subscriber".to_string(),
            name: Some("Test Reader".to_string()),
            exp: (Utc::now().timestamp() + 3600) as usize,
        };

        let token = token_for(&claims, secret);
        let decoded = decode::<JwtClaims>(
            &token,
            &DecodingKey::from_secret(secret.as_ref()),
            &Validation::default(),
        );
        let decoded = assert_ok!(decoded).claims;
        assert_eq!(decoded.email, email);
        assert_eq!(decoded.sub, claims.sub);
    }

    #[test]
    fn a_token_signed_with_another_secret_is_rejected() {
        let claims = JwtClaims {
            sub: Uuid::new_v4().to_string(),
            email: SafeEmail().fake(),
            role: "subscriber".to_string(),
            name: None,
            exp: (Utc::now().timestamp() + 3600) as usize,
        };

        let token = token_for(&claims, "the-right-secret");
        let decoded = decode::<JwtClaims>(
            &token,
            &DecodingKey::from_secret("the-wrong-secret".as_ref()),
            &Validation::default(),
        );
        assert_err!(decoded);
    }
}
