use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::error_handling::AppError;
use crate::models::{TenantId, UserId};
use crate::state::AppState;

/// Bearer token issued by the platform. Every sync operation runs in the
/// tenant and on behalf of the user named here.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub exp: usize,
    pub iat: usize,
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_ref()),
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
        }
    }

    pub fn generate_token(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        ttl: chrono::Duration,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();

        let claims = Claims {
            sub: user_id.to_string(),
            tenant_id,
            user_id,
            exp: (now + ttl).timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        encode(&Header::default(), &claims, &self.encoding_key)
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(
            token,
            &self.decoding_key,
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
    }

    pub fn extract_token_from_header(auth_header: &str) -> Option<&str> {
        auth_header.strip_prefix("Bearer ")
    }
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(JwtService::extract_token_from_header)
        .ok_or(AppError::Unauthorized)?;

    let claims = JwtService::new(&state.jwt_secret).validate_token(token)?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_carry_tenant_and_user() {
        let jwt = JwtService::new("test-secret");
        let token = jwt.generate_token(3, 17, chrono::Duration::hours(1)).unwrap();

        let claims = jwt.validate_token(&token).unwrap();
        assert_eq!(claims.tenant_id, 3);
        assert_eq!(claims.user_id, 17);
        assert_eq!(claims.sub, "17");
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let token = JwtService::new("one")
            .generate_token(1, 1, chrono::Duration::hours(1))
            .unwrap();
        assert!(JwtService::new("two").validate_token(&token).is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let jwt = JwtService::new("test-secret");
        let token = jwt.generate_token(1, 1, chrono::Duration::hours(-2)).unwrap();
        assert!(jwt.validate_token(&token).is_err());
    }

    #[test]
    fn bearer_prefix_is_required() {
        assert_eq!(JwtService::extract_token_from_header("Bearer abc"), Some("abc"));
        assert_eq!(JwtService::extract_token_from_header("Basic abc"), None);
    }
}
