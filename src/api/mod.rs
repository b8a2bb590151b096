//! HTTP surface. Routes are registered without trailing slashes; the server
//! wraps the app in `NormalizePath::trim()` so `/api/users/` matches too.

use actix_web::{web, HttpRequest};

use crate::dto::UrlContext;
use crate::error::ApiError;
use crate::AppState;

mod auth;
mod ingredients;
mod recipes;
mod users;

#[cfg(test)]
mod helper;

/// Base64 images travel inside JSON bodies.
const MAX_JSON_BODY_BYTES: usize = 10 * 1024 * 1024;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .app_data(query_config())
        .app_data(path_config())
        .service(
            web::scope("/api")
                .service(auth::login)
                .service(auth::logout)
                // literal segments before `{id}`
                .service(users::me)
                .service(users::set_password)
                .service(users::put_avatar)
                .service(users::delete_avatar)
                .service(users::subscriptions)
                .service(users::list_users)
                .service(users::create_user)
                .service(users::get_user)
                .service(users::subscribe)
                .service(users::unsubscribe)
                .service(ingredients::list_ingredients)
                .service(ingredients::get_ingredient)
                .service(recipes::download_shopping_cart)
                .service(recipes::list_recipes)
                .service(recipes::create_recipe)
                .service(recipes::get_recipe)
                .service(recipes::put_recipe)
                .service(recipes::patch_recipe)
                .service(recipes::delete_recipe)
                .service(recipes::get_link)
                .service(recipes::add_favorite)
                .service(recipes::remove_favorite)
                .service(recipes::add_to_cart)
                .service(recipes::remove_from_cart),
        );
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(MAX_JSON_BODY_BYTES)
        .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into())
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into())
}

fn path_config() -> web::PathConfig {
    web::PathConfig::default().error_handler(|_err, _req| ApiError::NotFound.into())
}

/// `scheme://host` as the client reached us.
pub(crate) fn origin(req: &HttpRequest) -> String {
    let info = req.connection_info();
    format!("{}://{}", info.scheme(), info.host())
}

pub(crate) fn url_context<'a>(req: &HttpRequest, state: &'a AppState) -> UrlContext<'a> {
    UrlContext {
        origin: origin(req),
        media: &state.media,
    }
}
