use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::api::url_context;
use crate::auth::{hash_password, verify_password, CurrentUser, MaybeUser};
use crate::dto::{AvatarDto, CreatedUserDto, SubscriptionDto, UserDto};
use crate::error::{is_unique_violation, ApiError, FieldErrors};
use crate::media::{decode_image, AVATARS_DIR};
use crate::models::NewUser;
use crate::pagination::{PageQuery, Paginated};
use crate::query;
use crate::validation::{parse_recipes_limit, RegistrationPayload, SetPasswordPayload};
use crate::AppState;

const EMAIL_TAKEN: &str = "A user with that email already exists.";
const USERNAME_TAKEN: &str = "A user with that username already exists.";

#[derive(Debug, Default, Deserialize)]
pub struct RecipesLimitQuery {
    recipes_limit: Option<String>,
}

impl RecipesLimitQuery {
    fn limit(&self) -> Option<usize> {
        parse_recipes_limit(self.recipes_limit.as_deref())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AvatarPayload {
    avatar: Option<String>,
}

#[get("/users")]
pub async fn list_users(
    viewer: MaybeUser,
    state: web::Data<AppState>,
    page: web::Query<PageQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let page = page.resolve(state.page_size)?;
    let viewer_id = viewer.id();
    let (count, users, followed) = state
        .db
        .run(move |conn| {
            let count = query::users::count(conn)?;
            page.check(count)?;
            let users = query::users::page(conn, page.offset(), page.per_page)?;
            let followed = match viewer_id {
                Some(viewer_id) => {
                    let ids: Vec<i32> = users.iter().map(|u| u.id).collect();
                    query::users::followed_among(conn, viewer_id, &ids)?
                }
                None => Default::default(),
            };
            Ok((count, users, followed))
        })
        .await?;

    let urls = url_context(&req, &state);
    let results = users
        .iter()
        .map(|user| UserDto::new(user, followed.contains(&user.id), &urls))
        .collect();
    Ok(HttpResponse::Ok().json(Paginated::new(&req, page, count, results)))
}

#[post("/users")]
pub async fn create_user(
    _viewer: MaybeUser,
    state: web::Data<AppState>,
    payload: web::Json<RegistrationPayload>,
) -> Result<HttpResponse, ApiError> {
    let registration = payload.into_inner().validate()?;

    let (email, username) = (registration.email.clone(), registration.username.clone());
    let (email_taken, username_taken) = state
        .db
        .run(move |conn| Ok(query::users::taken(conn, &email, &username)?))
        .await?;
    taken_errors(email_taken, username_taken).into_result()?;

    let password = registration.password;
    let encoded = web::block(move || hash_password(&password)).await?;
    let new_user = NewUser {
        email: registration.email,
        username: registration.username,
        first_name: registration.first_name,
        last_name: registration.last_name,
        password: encoded,
    };
    let user = state
        .db
        .run(move |conn| match query::users::create(conn, &new_user) {
            Ok(user) => Ok(user),
            // lost a race against a concurrent registration
            Err(err) if is_unique_violation(&err) => {
                let (email_taken, username_taken) =
                    query::users::taken(conn, &new_user.email, &new_user.username)?;
                let mut errors = taken_errors(email_taken, username_taken);
                if errors.is_empty() {
                    errors.add("non_field_errors", "A user with these details already exists.");
                }
                Err(ApiError::Validation(errors))
            }
            Err(err) => Err(err.into()),
        })
        .await?;
    log::info!("registered user {} ({})", user.id, user.username);
    Ok(HttpResponse::Created().json(CreatedUserDto::from(&user)))
}

fn taken_errors(email_taken: bool, username_taken: bool) -> FieldErrors {
    let mut errors = FieldErrors::new();
    if email_taken {
        errors.add("email", EMAIL_TAKEN);
    }
    if username_taken {
        errors.add("username", USERNAME_TAKEN);
    }
    errors
}

#[get("/users/me")]
pub async fn me(
    CurrentUser(user): CurrentUser,
    state: web::Data<AppState>,
    req: HttpRequest,
) -> HttpResponse {
    HttpResponse::Ok().json(UserDto::new(&user, false, &url_context(&req, &state)))
}

#[get("/users/{id}")]
pub async fn get_user(
    viewer: MaybeUser,
    state: web::Data<AppState>,
    user_id: web::Path<i32>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user_id = user_id.into_inner();
    let viewer_id = viewer.id();
    let (user, is_subscribed) = state
        .db
        .run(move |conn| {
            let user = query::users::find(conn, user_id)?.ok_or(ApiError::NotFound)?;
            let followed = query::users::is_following(conn, viewer_id, user.id)?;
            Ok((user, followed))
        })
        .await?;
    Ok(HttpResponse::Ok().json(UserDto::new(&user, is_subscribed, &url_context(&req, &state))))
}

#[post("/users/set_password")]
pub async fn set_password(
    CurrentUser(user): CurrentUser,
    state: web::Data<AppState>,
    payload: web::Json<SetPasswordPayload>,
) -> Result<HttpResponse, ApiError> {
    let (current, new_password) = payload.into_inner().validate()?;
    let stored = user.password.clone();
    let encoded = web::block(move || {
        if verify_password(&current, &stored) {
            Ok(hash_password(&new_password))
        } else {
            Err(ApiError::Validation(FieldErrors::single(
                "current_password",
                "Invalid password.",
            )))
        }
    })
    .await??;

    let user_id = user.id;
    state
        .db
        .run(move |conn| Ok(query::users::set_password(conn, user_id, &encoded)?))
        .await?;
    log::info!("user {} changed password", user_id);
    Ok(HttpResponse::NoContent().finish())
}

#[put("/users/me/avatar")]
pub async fn put_avatar(
    CurrentUser(user): CurrentUser,
    state: web::Data<AppState>,
    payload: web::Json<AvatarPayload>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let data = payload.into_inner().avatar.ok_or_else(|| {
        ApiError::Validation(FieldErrors::single("avatar", "This field is required."))
    })?;
    let image = decode_image("avatar", &data).map_err(ApiError::Validation)?;

    let media = state.media.clone();
    let stored = web::block(move || media.save(AVATARS_DIR, &image)).await??;

    let user_id = user.id;
    let path = stored.clone();
    let saved = state
        .db
        .run(move |conn| Ok(query::users::set_avatar(conn, user_id, Some(&path))?))
        .await;
    if let Err(err) = saved {
        remove_file(&state, stored).await;
        return Err(err);
    }
    if let Some(previous) = user.avatar {
        remove_file(&state, previous).await;
    }

    let urls = url_context(&req, &state);
    Ok(HttpResponse::Ok().json(AvatarDto {
        avatar: Some(urls.media_url(&stored)),
    }))
}

#[delete("/users/me/avatar")]
pub async fn delete_avatar(
    CurrentUser(user): CurrentUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user.id;
    state
        .db
        .run(move |conn| Ok(query::users::set_avatar(conn, user_id, None)?))
        .await?;
    if let Some(previous) = user.avatar {
        remove_file(&state, previous).await;
    }
    Ok(HttpResponse::NoContent().finish())
}

#[get("/users/subscriptions")]
pub async fn subscriptions(
    CurrentUser(user): CurrentUser,
    state: web::Data<AppState>,
    page: web::Query<PageQuery>,
    limit: web::Query<RecipesLimitQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let page = page.resolve(state.page_size)?;
    let recipes_limit = limit.limit();
    let user_id = user.id;
    let (count, summaries) = state
        .db
        .run(move |conn| {
            let count = query::users::count_followed(conn, user_id)?;
            page.check(count)?;
            let authors = query::users::followed_page(conn, user_id, page.offset(), page.per_page)?;
            let summaries =
                query::recipes::author_summaries(conn, user_id, authors, recipes_limit)?;
            Ok((count, summaries))
        })
        .await?;

    let urls = url_context(&req, &state);
    let results = summaries
        .iter()
        .map(|summary| SubscriptionDto::new(summary, &urls))
        .collect();
    Ok(HttpResponse::Ok().json(Paginated::new(&req, page, count, results)))
}

#[post("/users/{id}/subscribe")]
pub async fn subscribe(
    CurrentUser(user): CurrentUser,
    state: web::Data<AppState>,
    author_id: web::Path<i32>,
    limit: web::Query<RecipesLimitQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let author_id = author_id.into_inner();
    let recipes_limit = limit.limit();
    let user_id = user.id;
    let summary = state
        .db
        .run(move |conn| {
            let author = query::users::find(conn, author_id)?.ok_or(ApiError::NotFound)?;
            if author.id == user_id {
                return Err(ApiError::BadRequest(
                    "You cannot subscribe to yourself.".to_string(),
                ));
            }
            if !query::users::subscribe(conn, user_id, author.id)? {
                return Err(ApiError::BadRequest(
                    "You are already subscribed to this author.".to_string(),
                ));
            }
            query::recipes::author_summaries(conn, user_id, vec![author], recipes_limit)?
                .pop()
                .ok_or(ApiError::NotFound)
        })
        .await?;
    log::info!("user {} subscribed to {}", user_id, author_id);
    Ok(HttpResponse::Created().json(SubscriptionDto::new(&summary, &url_context(&req, &state))))
}

#[delete("/users/{id}/subscribe")]
pub async fn unsubscribe(
    CurrentUser(user): CurrentUser,
    state: web::Data<AppState>,
    author_id: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let author_id = author_id.into_inner();
    let user_id = user.id;
    state
        .db
        .run(move |conn| {
            query::users::find(conn, author_id)?.ok_or(ApiError::NotFound)?;
            if query::users::unsubscribe(conn, user_id, author_id)? {
                Ok(())
            } else {
                Err(ApiError::BadRequest(
                    "You are not subscribed to this author.".to_string(),
                ))
            }
        })
        .await?;
    log::info!("user {} unsubscribed from {}", user_id, author_id);
    Ok(HttpResponse::NoContent().finish())
}

async fn remove_file(state: &AppState, relative: String) {
    let media = state.media.clone();
    if let Err(err) = web::block(move || media.delete(&relative)).await {
        log::warn!("file cleanup was cancelled: {}", err);
    }
}
