use actix_web::{get, web, HttpResponse};
use serde::Deserialize;

use crate::auth::MaybeUser;
use crate::cache::Lookup;
use crate::dto::IngredientDto;
use crate::error::ApiError;
use crate::models::Ingredient;
use crate::query;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct IngredientSearch {
    name: Option<String>,
}

/// The whole catalogue, from Redis when possible. A miss is refilled from
/// MySQL; when Redis itself failed the refill is not written back.
async fn catalogue(state: &AppState) -> Result<Vec<Ingredient>, ApiError> {
    let lookup = match state.cache.clone() {
        Some(cache) => web::block(move || cache.load()).await?,
        None => Lookup::Unavailable,
    };
    let lookup = match lookup {
        Lookup::Hit(ingredients) => return Ok(ingredients),
        other => other,
    };
    let ingredients = state
        .db
        .run(|conn| Ok(query::ingredients::all(conn)?))
        .await?;
    if let (Lookup::Miss, Some(cache)) = (lookup, state.cache.clone()) {
        let cached = ingredients.clone();
        web::block(move || cache.store(&cached)).await?;
    }
    Ok(ingredients)
}

fn starting_with(ingredients: Vec<Ingredient>, prefix: Option<&str>) -> Vec<IngredientDto> {
    match prefix {
        Some(prefix) if !prefix.is_empty() => ingredients
            .into_iter()
            .filter(|ingredient| ingredient.name.starts_with(prefix))
            .collect(),
        _ => ingredients,
    }
}

#[get("/ingredients")]
pub async fn list_ingredients(
    _viewer: MaybeUser,
    state: web::Data<AppState>,
    search: web::Query<IngredientSearch>,
) -> Result<HttpResponse, ApiError> {
    let ingredients = catalogue(&state).await?;
    Ok(HttpResponse::Ok().json(starting_with(ingredients, search.name.as_deref())))
}

#[get("/ingredients/{id}")]
pub async fn get_ingredient(
    _viewer: MaybeUser,
    state: web::Data<AppState>,
    ingredient_id: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let ingredient_id = ingredient_id.into_inner();
    let ingredient = state
        .db
        .run(move |conn| {
            query::ingredients::find(conn, ingredient_id)?.ok_or(ApiError::NotFound)
        })
        .await?;
    Ok(HttpResponse::Ok().json(ingredient))
}
