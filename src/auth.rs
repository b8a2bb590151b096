use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, FromRequest, HttpRequest};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures_util::future::LocalBoxFuture;
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::ApiError;
use crate::models::User;
use crate::query;
use crate::AppState;

const PASSWORD_ALGORITHM: &str = "pbkdf2_sha256";
const PASSWORD_ITERATIONS: u32 = 390_000;
const SALT_LENGTH: usize = 22;
const TOKEN_BYTES: usize = 20;
const TOKEN_SCHEME: &str = "Token ";

pub fn hash_password(password: &str) -> String {
    let salt: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LENGTH)
        .map(char::from)
        .collect();
    hash_password_with(password, &salt, PASSWORD_ITERATIONS)
}

/// Encodes as `pbkdf2_sha256$<iterations>$<salt>$<base64 digest>`.
pub fn hash_password_with(password: &str, salt: &str, iterations: u32) -> String {
    let digest = pbkdf2_digest(password, salt, iterations);
    format!(
        "{}${}${}${}",
        PASSWORD_ALGORITHM,
        iterations,
        salt,
        STANDARD.encode(digest)
    )
}

pub fn verify_password(password: &str, encoded: &str) -> bool {
    let mut parts = encoded.splitn(4, '$');
    let (algorithm, iterations, salt, expected) =
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(a), Some(i), Some(s), Some(e)) => (a, i, s, e),
            _ => return false,
        };
    if algorithm != PASSWORD_ALGORITHM {
        return false;
    }
    let iterations = match iterations.parse::<u32>() {
        Ok(n) if n > 0 => n,
        _ => return false,
    };
    let expected = match STANDARD.decode(expected) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let actual = pbkdf2_digest(password, salt, iterations);
    actual.len() == expected.len() && bool::from(actual[..].ct_eq(&expected[..]))
}

fn pbkdf2_digest(password: &str, salt: &str, iterations: u32) -> [u8; 32] {
    let mut digest = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), iterations, &mut digest);
    digest
}

/// 40 hex characters of OS randomness.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Token key from an `Authorization: Token <key>` header.
///
/// `Ok(None)` means the request is anonymous. A header using the token
/// scheme without a usable key is an error, like an unknown key.
pub(crate) fn token_from_request(req: &HttpRequest) -> Result<Option<String>, ApiError> {
    let header = match req.headers().get(AUTHORIZATION) {
        Some(header) => header,
        None => return Ok(None),
    };
    let value = header.to_str().map_err(|_| ApiError::InvalidToken)?;
    if value.len() < TOKEN_SCHEME.len()
        || !value[..TOKEN_SCHEME.len()].eq_ignore_ascii_case(TOKEN_SCHEME)
    {
        return Ok(None);
    }
    let key = value[TOKEN_SCHEME.len()..].trim();
    if key.is_empty() || key.contains(' ') {
        return Err(ApiError::InvalidToken);
    }
    Ok(Some(key.to_string()))
}

async fn resolve_user(state: Option<web::Data<AppState>>, key: String) -> Result<User, ApiError> {
    let state = state.ok_or_else(|| {
        log::error!("application state is not registered");
        ApiError::Unavailable
    })?;
    let user = state
        .db
        .run(move |conn| Ok(query::users::user_by_token(conn, &key)?))
        .await?;
    match user {
        Some(user) if user.is_active => Ok(user),
        _ => Err(ApiError::InvalidToken),
    }
}

/// The authenticated caller; anonymous requests are rejected with 401.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequest for CurrentUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let token = token_from_request(req);
        let state = req.app_data::<web::Data<AppState>>().cloned();
        Box::pin(async move {
            let key = token?.ok_or(ApiError::NotAuthenticated)?;
            resolve_user(state, key).await.map(CurrentUser)
        })
    }
}

/// The caller if a token was presented.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl MaybeUser {
    pub fn id(&self) -> Option<i32> {
        self.0.as_ref().map(|user| user.id)
    }
}

impl FromRequest for MaybeUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let token = token_from_request(req);
        let state = req.app_data::<web::Data<AppState>>().cloned();
        Box::pin(async move {
            match token? {
                Some(key) => resolve_user(state, key).await.map(|u| MaybeUser(Some(u))),
                None => Ok(MaybeUser(None)),
            }
        })
    }
}
