use serde::Serialize;

use crate::media::MediaStorage;
use crate::models::{AuthorSummary, Ingredient, Recipe, RecipeDetail, User};

/// Turns stored media paths into absolute URLs for one response.
pub struct UrlContext<'a> {
    pub origin: String,
    pub media: &'a MediaStorage,
}

impl<'a> UrlContext<'a> {
    pub fn media_url(&self, relative: &str) -> String {
        self.media.url(&self.origin, relative)
    }
}

#[derive(Debug, Serialize)]
pub struct UserDto {
    pub email: String,
    pub id: i32,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
    pub avatar: Option<String>,
}

impl UserDto {
    pub fn new(user: &User, is_subscribed: bool, urls: &UrlContext) -> Self {
        Self {
            email: user.email.clone(),
            id: user.id,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            is_subscribed,
            avatar: user.avatar.as_deref().map(|path| urls.media_url(path)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedUserDto {
    pub email: String,
    pub id: i32,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<&User> for CreatedUserDto {
    fn from(user: &User) -> Self {
        Self {
            email: user.email.clone(),
            id: user.id,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AvatarDto {
    pub avatar: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenDto {
    pub auth_token: String,
}

#[derive(Debug, Serialize)]
pub struct ShortLinkDto {
    #[serde(rename = "short-link")]
    pub short_link: String,
}

#[derive(Debug, Serialize)]
pub struct RecipeIngredientDto {
    pub id: i32,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(Debug, Serialize)]
pub struct RecipeDto {
    pub id: i32,
    pub author: UserDto,
    pub ingredients: Vec<RecipeIngredientDto>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
}

impl RecipeDto {
    pub fn new(detail: RecipeDetail, urls: &UrlContext) -> Self {
        let RecipeDetail {
            recipe,
            author,
            author_followed,
            ingredients,
            is_favorited,
            is_in_shopping_cart,
        } = detail;
        Self {
            id: recipe.id,
            author: UserDto::new(&author, author_followed, urls),
            ingredients: ingredients
                .into_iter()
                .map(|(ingredient, amount)| RecipeIngredientDto {
                    id: ingredient.id,
                    name: ingredient.name,
                    measurement_unit: ingredient.measurement_unit,
                    amount,
                })
                .collect(),
            is_favorited,
            is_in_shopping_cart,
            image: urls.media_url(&recipe.image),
            name: recipe.name,
            text: recipe.text,
            cooking_time: recipe.cooking_time,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecipeShortDto {
    pub id: i32,
    pub name: String,
    pub image: String,
    pub cooking_time: i32,
}

impl RecipeShortDto {
    pub fn new(recipe: &Recipe, urls: &UrlContext) -> Self {
        Self {
            id: recipe.id,
            name: recipe.name.clone(),
            image: urls.media_url(&recipe.image),
            cooking_time: recipe.cooking_time,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubscriptionDto {
    #[serde(flatten)]
    pub user: UserDto,
    pub recipes: Vec<RecipeShortDto>,
    pub recipes_count: i64,
}

impl SubscriptionDto {
    pub fn new(summary: &AuthorSummary, urls: &UrlContext) -> Self {
        Self {
            user: UserDto::new(&summary.author, summary.is_subscribed, urls),
            recipes: summary
                .recipes
                .iter()
                .map(|recipe| RecipeShortDto::new(recipe, urls))
                .collect(),
            recipes_count: summary.recipes_count,
        }
    }
}

pub type IngredientDto = Ingredient;
