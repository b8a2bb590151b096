use actix_web::{post, web, HttpResponse};

use crate::auth::{verify_password, CurrentUser, MaybeUser};
use crate::dto::TokenDto;
use crate::error::{ApiError, FieldErrors};
use crate::query;
use crate::validation::LoginPayload;
use crate::AppState;

const BAD_CREDENTIALS: &str = "Unable to log in with provided credentials.";

#[post("/auth/token/login")]
pub async fn login(
    _viewer: MaybeUser,
    state: web::Data<AppState>,
    payload: web::Json<LoginPayload>,
) -> Result<HttpResponse, ApiError> {
    let (email, password) = payload.into_inner().validate()?;
    let user = state
        .db
        .run(move |conn| Ok(query::users::find_by_email(conn, &email)?))
        .await?
        .filter(|user| user.is_active)
        .ok_or_else(bad_credentials)?;

    let encoded = user.password.clone();
    if !web::block(move || verify_password(&password, &encoded)).await? {
        return Err(bad_credentials());
    }

    let user_id = user.id;
    let key = state
        .db
        .run(move |conn| Ok(query::users::token_for(conn, user_id)?))
        .await?;
    log::info!("user {} logged in", user_id);
    Ok(HttpResponse::Ok().json(TokenDto { auth_token: key }))
}

#[post("/auth/token/logout")]
pub async fn logout(
    CurrentUser(user): CurrentUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user.id;
    state
        .db
        .run(move |conn| Ok(query::users::revoke_token(conn, user_id)?))
        .await?;
    log::info!("user {} logged out", user_id);
    Ok(HttpResponse::NoContent().finish())
}

fn bad_credentials() -> ApiError {
    ApiError::Validation(FieldErrors::single("non_field_errors", BAD_CREDENTIALS))
}

#[cfg(test)]
mod tests {
    use actix_web::http::header::AUTHORIZATION;
    use actix_web::http::StatusCode;
    use actix_web::test;
    use serde_json::json;

    use crate::api::helper::{read_json, test_app};

    #[actix_web::test]
    async fn login_requires_both_fields() {
        let app = test::init_service(test_app()).await;
        let req = test::TestRequest::post()
            .uri("/api/auth/token/login/")
            .set_json(json!({ "email": "" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let json = read_json(resp).await;
        assert_eq!(json["email"][0], "This field may not be blank.");
        assert_eq!(json["password"][0], "This field is required.");
    }

    #[actix_web::test]
    async fn login_rejects_malformed_json() {
        let app = test::init_service(test_app()).await;
        let req = test::TestRequest::post()
            .uri("/api/auth/token/login/")
            .insert_header(("content-type", "application/json"))
            .set_payload("{\"email\": ")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(read_json(resp).await["errors"].is_string());
    }

    #[actix_web::test]
    async fn login_rejects_a_malformed_token() {
        let app = test::init_service(test_app()).await;
        let req = test::TestRequest::post()
            .uri("/api/auth/token/login/")
            .insert_header((AUTHORIZATION, "Token two words"))
            .set_json(json!({ "email": "cook@example.com", "password": "tasty-soup-42" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(read_json(resp).await["detail"], "Invalid token.");
    }

    #[actix_web::test]
    async fn logout_requires_a_token() {
        let app = test::init_service(test_app()).await;
        let req = test::TestRequest::post()
            .uri("/api/auth/token/logout/")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            read_json(resp).await["detail"],
            "Authentication credentials were not provided."
        );
    }
}
