use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::schema::{
    auth_tokens, favorites, ingredients, recipe_ingredients, recipes, shopping_carts,
    subscriptions, users,
};

#[derive(Debug, Clone, Queryable)]
pub struct User {
    pub id: i32,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub avatar: Option<String>,
    pub is_active: bool,
    pub is_staff: bool,
    pub date_joined: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[table_name = "users"]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

#[derive(Debug, Insertable)]
#[table_name = "auth_tokens"]
pub(crate) struct NewToken<'a> {
    pub key: &'a str,
    pub user_id: i32,
}

#[derive(Debug, Insertable)]
#[table_name = "subscriptions"]
pub(crate) struct NewSubscription {
    pub user_id: i32,
    pub author_id: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Queryable)]
pub struct Ingredient {
    pub id: i32,
    pub name: String,
    pub measurement_unit: String,
}

impl Ingredient {
    pub(crate) fn list_from_u8(bytes: &[u8]) -> Result<Vec<Self>, bincode::Error> {
        bincode::deserialize(bytes)
    }

    pub(crate) fn list_to_u8(list: &[Self]) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(list)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Insertable, Deserialize)]
#[table_name = "ingredients"]
pub struct NewIngredient {
    pub name: String,
    pub measurement_unit: String,
}

#[derive(Debug, Clone, Queryable)]
pub struct Recipe {
    pub id: i32,
    pub author_id: i32,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
    pub pub_date: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[table_name = "recipes"]
pub(crate) struct NewRecipe<'a> {
    pub author_id: i32,
    pub name: &'a str,
    pub image: &'a str,
    pub text: &'a str,
    pub cooking_time: i32,
}

/// Scalar recipe fields touched by an update; `None` keeps the stored value.
#[derive(Debug, Default, AsChangeset)]
#[table_name = "recipes"]
pub(crate) struct RecipeChanges {
    pub name: Option<String>,
    pub image: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
}

impl RecipeChanges {
    pub(crate) fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.image.is_none()
            && self.text.is_none()
            && self.cooking_time.is_none()
    }
}

// amount of an ingredient used by a recipe, in the ingredient's own unit
#[derive(Debug, Insertable)]
#[table_name = "recipe_ingredients"]
pub(crate) struct NewRecipeIngredient {
    pub recipe_id: i32,
    pub ingredient_id: i32,
    pub amount: i32,
}

#[derive(Debug, Insertable)]
#[table_name = "favorites"]
pub(crate) struct NewFavorite {
    pub user_id: i32,
    pub recipe_id: i32,
}

#[derive(Debug, Insertable)]
#[table_name = "shopping_carts"]
pub(crate) struct NewCartEntry {
    pub user_id: i32,
    pub recipe_id: i32,
}

/// Per-user recipe collections that share the same shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeList {
    Favorites,
    ShoppingCart,
}

impl RecipeList {
    pub fn already_added(self) -> &'static str {
        match self {
            RecipeList::Favorites => "Recipe is already in favorites",
            RecipeList::ShoppingCart => "Recipe is already in the shopping cart",
        }
    }

    pub fn not_present(self) -> &'static str {
        match self {
            RecipeList::Favorites => "Recipe is not in favorites",
            RecipeList::ShoppingCart => "Recipe is not in the shopping cart",
        }
    }
}

/// A recipe with everything its full representation needs, relative to a viewer.
#[derive(Debug, Clone)]
pub struct RecipeDetail {
    pub recipe: Recipe,
    pub author: User,
    pub author_followed: bool,
    pub ingredients: Vec<(Ingredient, i32)>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

/// An author as seen from the subscriptions endpoints.
#[derive(Debug, Clone)]
pub struct AuthorSummary {
    pub author: User,
    pub is_subscribed: bool,
    pub recipes: Vec<Recipe>,
    pub recipes_count: i64,
}
