use crate::{
    auth::jwt::verify_token,
    config::Config,
    error::AppError,
    model::role::Role,
    models::{Claims, TokenType},
};
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::{Ready, ready};

/// Caller identity taken from a verified access token.
///
/// The token's role is only checked for validity. Workflow and profile
/// decisions reload the actor from the database instead.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
}

impl AuthUser {
    pub fn from_claims(claims: Claims) -> Result<Self, AppError> {
        if claims.token_type != TokenType::Access {
            return Err(AppError::Unauthorized("Access token required".into()));
        }
        if let Some(id) = claims.role {
            Role::from_id(id).ok_or_else(|| AppError::Unauthorized("Invalid role".into()))?;
        }
        Ok(Self {
            user_id: claims.user_id,
            username: claims.sub,
        })
    }
}

pub fn bearer_token(req: &HttpRequest) -> Result<&str, AppError> {
    let header = req
        .headers()
        .get("Authorization")
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;
    header
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid Authorization header encoding".into()))?
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Authorization header must start with Bearer".into()))
}

fn extract(req: &HttpRequest) -> Result<AuthUser, AppError> {
    // set by auth_middleware on protected scopes
    if let Some(user) = req.extensions().get::<AuthUser>() {
        return Ok(user.clone());
    }

    let token = bearer_token(req)?;
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| AppError::Internal("Config missing".into()))?;
    let claims = verify_token(token, &config.jwt_secret)
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;
    AuthUser::from_claims(claims)
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(extract(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn claims(token_type: TokenType, role: Option<u8>) -> Claims {
        Claims {
            user_id: 4,
            sub: "mgr".into(),
            role,
            exp: 0,
            jti: "jti".into(),
            token_type,
            employee_id: Some(9),
        }
    }

    #[test]
    fn access_claims_become_auth_user() {
        let user = AuthUser::from_claims(claims(TokenType::Access, Some(2))).unwrap();
        assert_eq!(user.user_id, 4);
        assert_eq!(user.username, "mgr");
    }

    #[test]
    fn unknown_role_ids_are_refused() {
        assert!(matches!(
            AuthUser::from_claims(claims(TokenType::Access, Some(99))),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn refresh_claims_are_refused() {
        assert!(matches!(
            AuthUser::from_claims(claims(TokenType::Refresh, Some(2))),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn users_without_role_are_accepted() {
        let user = AuthUser::from_claims(claims(TokenType::Access, None)).unwrap();
        assert_eq!(user.user_id, 4);
    }

    #[test]
    fn bearer_prefix_is_required() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Token abc"))
            .to_http_request();
        assert!(bearer_token(&req).is_err());

        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer abc"))
            .to_http_request();
        assert_eq!(bearer_token(&req).unwrap(), "abc");
    }
}
