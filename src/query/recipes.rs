use std::collections::HashMap;

use diesel::mysql::Mysql;
use diesel::prelude::*;

use crate::db::last_inserted_id;
use crate::error::{ApiError, FieldErrors};
use crate::models::{
    AuthorSummary, Ingredient, NewRecipe, NewRecipeIngredient, Recipe, RecipeChanges,
    RecipeDetail, RecipeList, User,
};
use crate::query::{ingredients as ingredient_queries, relations, users as user_queries};
use crate::schema::{favorites, ingredients, recipe_ingredients, recipes, shopping_carts, users};

/// Recipe list filters; the user-relative ones hold the viewer's id.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecipeFilter {
    pub author: Option<i32>,
    pub favorited_by: Option<i32>,
    pub in_cart_of: Option<i32>,
}

fn filtered<'a>(filter: RecipeFilter) -> recipes::BoxedQuery<'a, Mysql> {
    let mut query = recipes::table.into_boxed();
    if let Some(author) = filter.author {
        query = query.filter(recipes::author_id.eq(author));
    }
    if let Some(user_id) = filter.favorited_by {
        query = query.filter(
            recipes::id.eq_any(
                favorites::table
                    .filter(favorites::user_id.eq(user_id))
                    .select(favorites::recipe_id),
            ),
        );
    }
    if let Some(user_id) = filter.in_cart_of {
        query = query.filter(
            recipes::id.eq_any(
                shopping_carts::table
                    .filter(shopping_carts::user_id.eq(user_id))
                    .select(shopping_carts::recipe_id),
            ),
        );
    }
    query
}

pub fn count(conn: &MysqlConnection, filter: RecipeFilter) -> QueryResult<i64> {
    filtered(filter).count().get_result(conn)
}

/// Newest first.
pub fn page(
    conn: &MysqlConnection,
    filter: RecipeFilter,
    offset: i64,
    limit: i64,
) -> QueryResult<Vec<Recipe>> {
    filtered(filter)
        .order((recipes::pub_date.desc(), recipes::id.desc()))
        .limit(limit)
        .offset(offset)
        .load(conn)
}

pub fn find(conn: &MysqlConnection, recipe_id: i32) -> QueryResult<Option<Recipe>> {
    recipes::table.find(recipe_id).first(conn).optional()
}

/// Loads authors, ingredients and viewer flags for a batch of recipes with a
/// fixed number of queries, keeping the input order.
pub fn details(
    conn: &MysqlConnection,
    viewer: Option<i32>,
    list: Vec<Recipe>,
) -> QueryResult<Vec<RecipeDetail>> {
    if list.is_empty() {
        return Ok(Vec::new());
    }
    let recipe_ids: Vec<i32> = list.iter().map(|r| r.id).collect();
    let mut author_ids: Vec<i32> = list.iter().map(|r| r.author_id).collect();
    author_ids.sort_unstable();
    author_ids.dedup();

    let authors: HashMap<i32, User> = users::table
        .filter(users::id.eq_any(&author_ids))
        .load::<User>(conn)?
        .into_iter()
        .map(|user| (user.id, user))
        .collect();

    let rows = recipe_ingredients::table
        .inner_join(ingredients::table)
        .filter(recipe_ingredients::recipe_id.eq_any(&recipe_ids))
        .order(recipe_ingredients::id.asc())
        .select((
            recipe_ingredients::recipe_id,
            ingredients::all_columns,
            recipe_ingredients::amount,
        ))
        .load::<(i32, Ingredient, i32)>(conn)?;
    let mut lines: HashMap<i32, Vec<(Ingredient, i32)>> = HashMap::new();
    for (recipe_id, ingredient, amount) in rows {
        lines.entry(recipe_id).or_default().push((ingredient, amount));
    }

    let (favorited, in_cart, followed) = match viewer {
        Some(user_id) => (
            relations::contained(conn, RecipeList::Favorites, user_id, &recipe_ids)?,
            relations::contained(conn, RecipeList::ShoppingCart, user_id, &recipe_ids)?,
            user_queries::followed_among(conn, user_id, &author_ids)?,
        ),
        None => Default::default(),
    };

    list.into_iter()
        .map(|recipe| -> QueryResult<RecipeDetail> {
            let author = authors
                .get(&recipe.author_id)
                .cloned()
                .ok_or(diesel::result::Error::NotFound)?;
            Ok(RecipeDetail {
                author_followed: followed.contains(&author.id),
                author,
                ingredients: lines.remove(&recipe.id).unwrap_or_default(),
                is_favorited: favorited.contains(&recipe.id),
                is_in_shopping_cart: in_cart.contains(&recipe.id),
                recipe,
            })
        })
        .collect()
}

pub fn detail(
    conn: &MysqlConnection,
    viewer: Option<i32>,
    recipe_id: i32,
) -> Result<RecipeDetail, ApiError> {
    let recipe = find(conn, recipe_id)?.ok_or(ApiError::NotFound)?;
    details(conn, viewer, vec![recipe])?
        .pop()
        .ok_or(ApiError::NotFound)
}

/// Fields of a recipe that is about to be inserted.
#[derive(Debug, Clone, Copy)]
pub struct RecipeFields<'a> {
    pub name: &'a str,
    pub text: &'a str,
    pub cooking_time: i32,
    pub image: &'a str,
}

fn ensure_ingredients_exist(conn: &MysqlConnection, lines: &[(i32, i32)]) -> Result<(), ApiError> {
    let ids: Vec<i32> = lines.iter().map(|(id, _)| *id).collect();
    let existing = ingredient_queries::existing_ids(conn, &ids)?;
    let mut errors = FieldErrors::new();
    for id in ids.iter().filter(|id| !existing.contains(*id)) {
        errors.add(
            "ingredients",
            format!("Invalid pk \"{}\" - object does not exist.", id),
        );
    }
    errors.into_result()
}

fn replace_ingredients(
    conn: &MysqlConnection,
    recipe_id: i32,
    lines: &[(i32, i32)],
) -> QueryResult<()> {
    diesel::delete(recipe_ingredients::table.filter(recipe_ingredients::recipe_id.eq(recipe_id)))
        .execute(conn)?;
    let rows: Vec<NewRecipeIngredient> = lines
        .iter()
        .map(|&(ingredient_id, amount)| NewRecipeIngredient {
            recipe_id,
            ingredient_id,
            amount,
        })
        .collect();
    diesel::insert_into(recipe_ingredients::table)
        .values(&rows)
        .execute(conn)?;
    Ok(())
}

pub fn create(
    conn: &MysqlConnection,
    author_id: i32,
    fields: RecipeFields,
    lines: &[(i32, i32)],
) -> Result<i32, ApiError> {
    conn.transaction::<_, ApiError, _>(|| {
        ensure_ingredients_exist(conn, lines)?;
        diesel::insert_into(recipes::table)
            .values(&NewRecipe {
                author_id,
                name: fields.name,
                image: fields.image,
                text: fields.text,
                cooking_time: fields.cooking_time,
            })
            .execute(conn)?;
        let recipe_id = last_inserted_id(conn)?;
        replace_ingredients(conn, recipe_id, lines)?;
        Ok(recipe_id)
    })
}

pub(crate) fn update(
    conn: &MysqlConnection,
    recipe_id: i32,
    changes: &RecipeChanges,
    lines: &[(i32, i32)],
) -> Result<(), ApiError> {
    conn.transaction::<_, ApiError, _>(|| {
        ensure_ingredients_exist(conn, lines)?;
        if !changes.is_empty() {
            diesel::update(recipes::table.find(recipe_id))
                .set(changes)
                .execute(conn)?;
        }
        replace_ingredients(conn, recipe_id, lines)?;
        Ok(())
    })
}

pub fn delete(conn: &MysqlConnection, recipe_id: i32) -> QueryResult<usize> {
    diesel::delete(recipes::table.find(recipe_id)).execute(conn)
}

/// Subscription view of each author: their newest recipes (at most
/// `recipes_limit`) and how many they have in total.
pub fn author_summaries(
    conn: &MysqlConnection,
    viewer: i32,
    authors: Vec<User>,
    recipes_limit: Option<usize>,
) -> QueryResult<Vec<AuthorSummary>> {
    if authors.is_empty() {
        return Ok(Vec::new());
    }
    let author_ids: Vec<i32> = authors.iter().map(|a| a.id).collect();
    let followed = user_queries::followed_among(conn, viewer, &author_ids)?;

    let mut by_author: HashMap<i32, Vec<Recipe>> = HashMap::new();
    for recipe in recipes::table
        .filter(recipes::author_id.eq_any(&author_ids))
        .order((recipes::pub_date.desc(), recipes::id.desc()))
        .load::<Recipe>(conn)?
    {
        by_author.entry(recipe.author_id).or_default().push(recipe);
    }

    Ok(authors
        .into_iter()
        .map(|author| {
            let mut recipes = by_author.remove(&author.id).unwrap_or_default();
            let recipes_count = recipes.len() as i64;
            if let Some(limit) = recipes_limit {
                recipes.truncate(limit);
            }
            AuthorSummary {
                is_subscribed: followed.contains(&author.id),
                author,
                recipes,
                recipes_count,
            }
        })
        .collect())
}
