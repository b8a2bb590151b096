use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{delete, get, patch, post, put, web, HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::api::{origin, url_context};
use crate::auth::{CurrentUser, MaybeUser};
use crate::dto::{RecipeDto, RecipeShortDto, ShortLinkDto};
use crate::error::{ApiError, FieldErrors};
use crate::media::{decode_image, DecodedImage, RECIPE_IMAGES_DIR};
use crate::models::{Recipe, RecipeChanges, RecipeList, User};
use crate::pagination::{PageQuery, Paginated};
use crate::query;
use crate::query::recipes::{RecipeFields, RecipeFilter};
use crate::shopping_list;
use crate::validation::{parse_flag, RecipePayload, RecipeWrite};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RecipeListQuery {
    author: Option<String>,
    is_favorited: Option<String>,
    is_in_shopping_cart: Option<String>,
}

impl RecipeListQuery {
    /// Flag filters only narrow the list for a signed-in viewer.
    fn filter(&self, viewer: Option<i32>) -> Result<RecipeFilter, ApiError> {
        let author = match self.author.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<i32>().map_err(|_| {
                ApiError::Validation(FieldErrors::single(
                    "author",
                    "Select a valid choice. That choice is not one of the available choices.",
                ))
            })?),
        };
        let favorited = parse_flag(self.is_favorited.as_deref());
        let in_cart = parse_flag(self.is_in_shopping_cart.as_deref());
        Ok(RecipeFilter {
            author,
            favorited_by: viewer.filter(|_| favorited),
            in_cart_of: viewer.filter(|_| in_cart),
        })
    }
}

#[get("/recipes")]
pub async fn list_recipes(
    viewer: MaybeUser,
    state: web::Data<AppState>,
    page: web::Query<PageQuery>,
    filters: web::Query<RecipeListQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let page = page.resolve(state.page_size)?;
    let viewer_id = viewer.id();
    let filter = filters.filter(viewer_id)?;
    let (count, details) = state
        .db
        .run(move |conn| {
            let count = query::recipes::count(conn, filter)?;
            page.check(count)?;
            let recipes = query::recipes::page(conn, filter, page.offset(), page.per_page)?;
            Ok((count, query::recipes::details(conn, viewer_id, recipes)?))
        })
        .await?;

    let urls = url_context(&req, &state);
    let results = details
        .into_iter()
        .map(|detail| RecipeDto::new(detail, &urls))
        .collect();
    Ok(HttpResponse::Ok().json(Paginated::new(&req, page, count, results)))
}

#[get("/recipes/{id}")]
pub async fn get_recipe(
    viewer: MaybeUser,
    state: web::Data<AppState>,
    recipe_id: web::Path<i32>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let recipe_id = recipe_id.into_inner();
    let viewer_id = viewer.id();
    let detail = state
        .db
        .run(move |conn| query::recipes::detail(conn, viewer_id, recipe_id))
        .await?;
    Ok(HttpResponse::Ok().json(RecipeDto::new(detail, &url_context(&req, &state))))
}

#[post("/recipes")]
pub async fn create_recipe(
    CurrentUser(user): CurrentUser,
    state: web::Data<AppState>,
    payload: web::Json<RecipePayload>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let draft = payload.into_inner().validate(RecipeWrite::Full)?;
    let image = match draft.image.as_deref() {
        Some(data) => decode_image("image", data).map_err(ApiError::Validation)?,
        None => {
            return Err(ApiError::Validation(FieldErrors::single(
                "image",
                "This field is required.",
            )))
        }
    };
    let stored = save_image(&state, image).await?;

    let author_id = user.id;
    let path = stored.clone();
    let created = state
        .db
        .run(move |conn| {
            let fields = RecipeFields {
                name: draft.name.as_deref().unwrap_or_default(),
                text: draft.text.as_deref().unwrap_or_default(),
                cooking_time: draft.cooking_time.unwrap_or(1),
                image: &path,
            };
            let recipe_id = query::recipes::create(conn, author_id, fields, &draft.ingredients)?;
            query::recipes::detail(conn, Some(author_id), recipe_id)
        })
        .await;
    let detail = match created {
        Ok(detail) => detail,
        Err(err) => {
            remove_image(&state, stored).await;
            return Err(err);
        }
    };
    log::info!("user {} created recipe {}", author_id, detail.recipe.id);
    Ok(HttpResponse::Created().json(RecipeDto::new(detail, &url_context(&req, &state))))
}

#[put("/recipes/{id}")]
pub async fn put_recipe(
    CurrentUser(user): CurrentUser,
    state: web::Data<AppState>,
    recipe_id: web::Path<i32>,
    payload: web::Json<RecipePayload>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let recipe_id = recipe_id.into_inner();
    update_recipe(user, state, recipe_id, payload.into_inner(), RecipeWrite::Full, req).await
}

#[patch("/recipes/{id}")]
pub async fn patch_recipe(
    CurrentUser(user): CurrentUser,
    state: web::Data<AppState>,
    recipe_id: web::Path<i32>,
    payload: web::Json<RecipePayload>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let recipe_id = recipe_id.into_inner();
    update_recipe(user, state, recipe_id, payload.into_inner(), RecipeWrite::Partial, req).await
}

async fn update_recipe(
    user: User,
    state: web::Data<AppState>,
    recipe_id: i32,
    payload: RecipePayload,
    mode: RecipeWrite,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let existing = owned_recipe(&state, user.id, recipe_id).await?;

    let draft = payload.validate(mode)?;
    let image = match draft.image.as_deref() {
        Some(data) => Some(decode_image("image", data).map_err(ApiError::Validation)?),
        None => None,
    };
    let stored = match image {
        Some(image) => Some(save_image(&state, image).await?),
        None => None,
    };

    let changes = RecipeChanges {
        name: draft.name,
        image: stored.clone(),
        text: draft.text,
        cooking_time: draft.cooking_time,
    };
    let lines = draft.ingredients;
    let viewer = user.id;
    let updated = state
        .db
        .run(move |conn| {
            query::recipes::update(conn, recipe_id, &changes, &lines)?;
            query::recipes::detail(conn, Some(viewer), recipe_id)
        })
        .await;
    let detail = match updated {
        Ok(detail) => detail,
        Err(err) => {
            if let Some(stored) = stored {
                remove_image(&state, stored).await;
            }
            return Err(err);
        }
    };
    if stored.is_some() {
        remove_image(&state, existing.image).await;
    }
    log::info!("user {} updated recipe {}", user.id, recipe_id);
    Ok(HttpResponse::Ok().json(RecipeDto::new(detail, &url_context(&req, &state))))
}

#[delete("/recipes/{id}")]
pub async fn delete_recipe(
    CurrentUser(user): CurrentUser,
    state: web::Data<AppState>,
    recipe_id: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let recipe_id = recipe_id.into_inner();
    let recipe = owned_recipe(&state, user.id, recipe_id).await?;
    state
        .db
        .run(move |conn| Ok(query::recipes::delete(conn, recipe_id)?))
        .await?;
    remove_image(&state, recipe.image).await;
    log::info!("user {} deleted recipe {}", user.id, recipe_id);
    Ok(HttpResponse::NoContent().finish())
}

#[get("/recipes/{id}/get-link")]
pub async fn get_link(
    _viewer: MaybeUser,
    state: web::Data<AppState>,
    recipe_id: web::Path<i32>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let recipe_id = recipe_id.into_inner();
    let recipe = find_recipe(&state, recipe_id).await?;
    Ok(HttpResponse::Ok().json(ShortLinkDto {
        short_link: format!("{}/recipes/{}/", origin(&req), recipe.id),
    }))
}

#[post("/recipes/{id}/favorite")]
pub async fn add_favorite(
    CurrentUser(user): CurrentUser,
    state: web::Data<AppState>,
    recipe_id: web::Path<i32>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    add_to_list(RecipeList::Favorites, user, state, recipe_id.into_inner(), req).await
}

#[delete("/recipes/{id}/favorite")]
pub async fn remove_favorite(
    CurrentUser(user): CurrentUser,
    state: web::Data<AppState>,
    recipe_id: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    remove_from_list(RecipeList::Favorites, user, state, recipe_id.into_inner()).await
}

#[post("/recipes/{id}/shopping_cart")]
pub async fn add_to_cart(
    CurrentUser(user): CurrentUser,
    state: web::Data<AppState>,
    recipe_id: web::Path<i32>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    add_to_list(RecipeList::ShoppingCart, user, state, recipe_id.into_inner(), req).await
}

#[delete("/recipes/{id}/shopping_cart")]
pub async fn remove_from_cart(
    CurrentUser(user): CurrentUser,
    state: web::Data<AppState>,
    recipe_id: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    remove_from_list(RecipeList::ShoppingCart, user, state, recipe_id.into_inner()).await
}

async fn add_to_list(
    list: RecipeList,
    user: User,
    state: web::Data<AppState>,
    recipe_id: i32,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user_id = user.id;
    let recipe = state
        .db
        .run(move |conn| {
            let recipe = query::recipes::find(conn, recipe_id)?.ok_or(ApiError::NotFound)?;
            if query::relations::add(conn, list, user_id, recipe.id)? {
                Ok(recipe)
            } else {
                Err(ApiError::BadRequest(list.already_added().to_string()))
            }
        })
        .await?;
    log::info!("user {} added recipe {} to {:?}", user_id, recipe_id, list);
    Ok(HttpResponse::Created().json(RecipeShortDto::new(&recipe, &url_context(&req, &state))))
}

async fn remove_from_list(
    list: RecipeList,
    user: User,
    state: web::Data<AppState>,
    recipe_id: i32,
) -> Result<HttpResponse, ApiError> {
    let user_id = user.id;
    state
        .db
        .run(move |conn| {
            query::recipes::find(conn, recipe_id)?.ok_or(ApiError::NotFound)?;
            if query::relations::remove(conn, list, user_id, recipe_id)? {
                Ok(())
            } else {
                Err(ApiError::BadRequest(list.not_present().to_string()))
            }
        })
        .await?;
    log::info!("user {} removed recipe {} from {:?}", user_id, recipe_id, list);
    Ok(HttpResponse::NoContent().finish())
}

#[get("/recipes/download_shopping_cart")]
pub async fn download_shopping_cart(
    CurrentUser(user): CurrentUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user.id;
    let rows = state
        .db
        .run(move |conn| Ok(query::relations::cart_rows(conn, user_id)?))
        .await?;
    let items = shopping_list::aggregate(rows);
    let font = state.pdf_font.clone();
    let pdf = web::block(move || {
        shopping_list::render_pdf(&items, font.as_ref().map(|bytes| bytes.as_slice()))
    })
    .await??;

    Ok(HttpResponse::Ok()
        .content_type("application/pdf")
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(shopping_list::FILENAME.to_string())],
        })
        .body(pdf))
}

async fn find_recipe(state: &AppState, recipe_id: i32) -> Result<Recipe, ApiError> {
    state
        .db
        .run(move |conn| query::recipes::find(conn, recipe_id)?.ok_or(ApiError::NotFound))
        .await
}

/// The recipe if `user_id` wrote it: 404 when absent, 403 for anyone else.
async fn owned_recipe(state: &AppState, user_id: i32, recipe_id: i32) -> Result<Recipe, ApiError> {
    let recipe = find_recipe(state, recipe_id).await?;
    if recipe.author_id != user_id {
        return Err(ApiError::PermissionDenied);
    }
    Ok(recipe)
}

async fn save_image(state: &AppState, image: DecodedImage) -> Result<String, ApiError> {
    let media = state.media.clone();
    Ok(web::block(move || media.save(RECIPE_IMAGES_DIR, &image)).await??)
}

async fn remove_image(state: &AppState, relative: String) {
    let media = state.media.clone();
    if let Err(err) = web::block(move || media.delete(&relative)).await {
        log::warn!("file cleanup was cancelled: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use actix_web::http::header::AUTHORIZATION;
    use actix_web::http::StatusCode;
    use actix_web::test::{call_service, init_service, TestRequest};
    use serde_json::json;

    use super::*;
    use crate::api::helper::{read_json, test_app};

    #[test]
    fn flag_filters_need_a_viewer() {
        let query = RecipeListQuery {
            author: Some("4".into()),
            is_favorited: Some("1".into()),
            is_in_shopping_cart: Some("true".into()),
        };
        assert_eq!(
            query.filter(None).unwrap(),
            RecipeFilter {
                author: Some(4),
                favorited_by: None,
                in_cart_of: None,
            }
        );
        assert_eq!(
            query.filter(Some(9)).unwrap(),
            RecipeFilter {
                author: Some(4),
                favorited_by: Some(9),
                in_cart_of: Some(9),
            }
        );
    }

    #[test]
    fn false_flags_do_not_filter() {
        let query = RecipeListQuery {
            author: Some("".into()),
            is_favorited: Some("0".into()),
            is_in_shopping_cart: None,
        };
        assert_eq!(query.filter(Some(9)).unwrap(), RecipeFilter::default());
    }

    #[test]
    fn bad_author_is_rejected() {
        let query = RecipeListQuery {
            author: Some("me".into()),
            ..Default::default()
        };
        assert!(matches!(query.filter(None), Err(ApiError::Validation(_))));
    }

    #[actix_web::test]
    async fn anonymous_recipe_writes_are_rejected() {
        let app = init_service(test_app()).await;
        let body = json!({ "name": "Soup" });
        for req in [
            TestRequest::post().uri("/api/recipes/").set_json(&body),
            TestRequest::patch().uri("/api/recipes/1/").set_json(&body),
            TestRequest::put().uri("/api/recipes/1/").set_json(&body),
            TestRequest::delete().uri("/api/recipes/1/"),
            TestRequest::post().uri("/api/recipes/1/favorite/"),
            TestRequest::delete().uri("/api/recipes/1/shopping_cart/"),
            TestRequest::get().uri("/api/recipes/download_shopping_cart/"),
        ] {
            let resp = call_service(&app, req.to_request()).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(
                read_json(resp).await["detail"],
                "Authentication credentials were not provided."
            );
        }
    }

    #[actix_web::test]
    async fn recipe_ids_must_be_numeric() {
        let app = init_service(test_app()).await;
        for uri in ["/api/recipes/soup/", "/api/recipes/soup/get-link/"] {
            let req = TestRequest::get().uri(uri).to_request();
            let resp = call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{}", uri);
        }
    }

    #[actix_web::test]
    async fn short_link_checks_the_token() {
        let app = init_service(test_app()).await;
        let req = TestRequest::get()
            .uri("/api/recipes/1/get-link/")
            .insert_header((AUTHORIZATION, "Token "))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(read_json(resp).await["detail"], "Invalid token.");
    }

    #[actix_web::test]
    async fn malformed_filters_are_bad_requests() {
        let app = init_service(test_app()).await;
        let req = TestRequest::get()
            .uri("/api/recipes/?author=me")
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(read_json(resp).await["author"].is_array());
    }
}
