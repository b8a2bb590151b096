//! Favorites and shopping cart: per-user sets of recipes.

use std::collections::HashSet;

use diesel::prelude::*;

use crate::error::is_unique_violation;
use crate::models::{NewCartEntry, NewFavorite, RecipeList};
use crate::schema::{favorites, ingredients, recipe_ingredients, shopping_carts};

/// The subset of `recipe_ids` present in the user's list.
pub fn contained(
    conn: &MysqlConnection,
    list: RecipeList,
    user_id: i32,
    recipe_ids: &[i32],
) -> QueryResult<HashSet<i32>> {
    if recipe_ids.is_empty() {
        return Ok(HashSet::new());
    }
    let found = match list {
        RecipeList::Favorites => favorites::table
            .filter(favorites::user_id.eq(user_id))
            .filter(favorites::recipe_id.eq_any(recipe_ids))
            .select(favorites::recipe_id)
            .load::<i32>(conn)?,
        RecipeList::ShoppingCart => shopping_carts::table
            .filter(shopping_carts::user_id.eq(user_id))
            .filter(shopping_carts::recipe_id.eq_any(recipe_ids))
            .select(shopping_carts::recipe_id)
            .load::<i32>(conn)?,
    };
    Ok(found.into_iter().collect())
}

/// Returns `false` when the recipe is already in the list.
pub fn add(conn: &MysqlConnection, list: RecipeList, user_id: i32, recipe_id: i32) -> QueryResult<bool> {
    let inserted = match list {
        RecipeList::Favorites => diesel::insert_into(favorites::table)
            .values(&NewFavorite { user_id, recipe_id })
            .execute(conn),
        RecipeList::ShoppingCart => diesel::insert_into(shopping_carts::table)
            .values(&NewCartEntry { user_id, recipe_id })
            .execute(conn),
    };
    match inserted {
        Ok(_) => Ok(true),
        Err(err) if is_unique_violation(&err) => Ok(false),
        Err(err) => Err(err),
    }
}

/// Returns `false` when the recipe was not in the list.
pub fn remove(
    conn: &MysqlConnection,
    list: RecipeList,
    user_id: i32,
    recipe_id: i32,
) -> QueryResult<bool> {
    let deleted = match list {
        RecipeList::Favorites => diesel::delete(
            favorites::table
                .filter(favorites::user_id.eq(user_id))
                .filter(favorites::recipe_id.eq(recipe_id)),
        )
        .execute(conn)?,
        RecipeList::ShoppingCart => diesel::delete(
            shopping_carts::table
                .filter(shopping_carts::user_id.eq(user_id))
                .filter(shopping_carts::recipe_id.eq(recipe_id)),
        )
        .execute(conn)?,
    };
    Ok(deleted > 0)
}

/// `(name, unit, amount)` for every ingredient line of every recipe in the cart.
pub fn cart_rows(conn: &MysqlConnection, user_id: i32) -> QueryResult<Vec<(String, String, i32)>> {
    let cart = shopping_carts::table
        .filter(shopping_carts::user_id.eq(user_id))
        .select(shopping_carts::recipe_id);
    recipe_ingredients::table
        .inner_join(ingredients::table)
        .filter(recipe_ingredients::recipe_id.eq_any(cart))
        .select((
            ingredients::name,
            ingredients::measurement_unit,
            recipe_ingredients::amount,
        ))
        .load(conn)
}
