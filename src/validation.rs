use std::collections::HashSet;
use std::convert::TryFrom;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ApiError, FieldErrors};

const REQUIRED: &str = "This field is required.";
const BLANK: &str = "This field may not be blank.";
const NOT_AN_INTEGER: &str = "A valid integer is required.";

pub const EMAIL_MAX_LENGTH: usize = 254;
pub const USER_NAME_MAX_LENGTH: usize = 150;
pub const RECIPE_NAME_MAX_LENGTH: usize = 256;
pub const PASSWORD_MIN_LENGTH: usize = 8;

static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w.@+-]+$").unwrap());
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s.]+$").unwrap());

fn max_length_message(max: usize) -> String {
    format!("Ensure this field has no more than {} characters.", max)
}

/// Trimmed, non-blank, bounded text field.
fn text_field(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<&str>,
    max: Option<usize>,
) -> Option<String> {
    let value = match value {
        Some(v) => v.trim(),
        None => {
            errors.add(field, REQUIRED);
            return None;
        }
    };
    if value.is_empty() {
        errors.add(field, BLANK);
        return None;
    }
    if let Some(max) = max {
        if value.chars().count() > max {
            errors.add(field, max_length_message(max));
            return None;
        }
    }
    Some(value.to_string())
}

pub fn check_password(errors: &mut FieldErrors, field: &str, password: &str) {
    if password.chars().count() < PASSWORD_MIN_LENGTH {
        errors.add(
            field,
            format!(
                "This password is too short. It must contain at least {} characters.",
                PASSWORD_MIN_LENGTH
            ),
        );
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        errors.add(field, "This password is entirely numeric.");
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RegistrationPayload {
    pub email: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

impl RegistrationPayload {
    /// Field checks that need no database; uniqueness is checked by the caller.
    pub fn validate(self) -> Result<Registration, ApiError> {
        let mut errors = FieldErrors::new();
        let email = text_field(&mut errors, "email", self.email.as_deref(), Some(EMAIL_MAX_LENGTH));
        if let Some(email) = &email {
            if !EMAIL_RE.is_match(email) {
                errors.add("email", "Enter a valid email address.");
            }
        }
        let username = text_field(
            &mut errors,
            "username",
            self.username.as_deref(),
            Some(USER_NAME_MAX_LENGTH),
        );
        if let Some(username) = &username {
            if !USERNAME_RE.is_match(username) {
                errors.add(
                    "username",
                    "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
                );
            }
        }
        let first_name = text_field(
            &mut errors,
            "first_name",
            self.first_name.as_deref(),
            Some(USER_NAME_MAX_LENGTH),
        );
        let last_name = text_field(
            &mut errors,
            "last_name",
            self.last_name.as_deref(),
            Some(USER_NAME_MAX_LENGTH),
        );
        match self.password.as_deref() {
            None => errors.add("password", REQUIRED),
            Some("") => errors.add("password", BLANK),
            Some(password) => check_password(&mut errors, "password", password),
        }
        errors.into_result()?;
        match (email, username, first_name, last_name, self.password) {
            (Some(email), Some(username), Some(first_name), Some(last_name), Some(password)) => {
                Ok(Registration {
                    email: email.to_lowercase(),
                    username,
                    first_name,
                    last_name,
                    password,
                })
            }
            _ => Err(ApiError::Validation(FieldErrors::single("non_field_errors", REQUIRED))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginPayload {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl LoginPayload {
    pub fn validate(self) -> Result<(String, String), ApiError> {
        let mut errors = FieldErrors::new();
        let email = text_field(&mut errors, "email", self.email.as_deref(), None);
        let password = match self.password {
            None => {
                errors.add("password", REQUIRED);
                None
            }
            Some(p) if p.is_empty() => {
                errors.add("password", BLANK);
                None
            }
            Some(p) => Some(p),
        };
        errors.into_result()?;
        Ok((
            email.unwrap_or_default().to_lowercase(),
            password.unwrap_or_default(),
        ))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SetPasswordPayload {
    pub new_password: Option<String>,
    pub current_password: Option<String>,
}

impl SetPasswordPayload {
    /// Returns `(current, new)` once both are present and the new one is acceptable.
    pub fn validate(self) -> Result<(String, String), ApiError> {
        let mut errors = FieldErrors::new();
        if self.current_password.as_deref().map_or(true, str::is_empty) {
            errors.add("current_password", REQUIRED);
        }
        match self.new_password.as_deref() {
            None | Some("") => errors.add("new_password", REQUIRED),
            Some(password) => check_password(&mut errors, "new_password", password),
        }
        errors.into_result()?;
        Ok((
            self.current_password.unwrap_or_default(),
            self.new_password.unwrap_or_default(),
        ))
    }
}

/// Integer fields arrive as JSON numbers or, from form-driven clients, as
/// numeric strings; both are accepted and checked during validation.
#[derive(Debug, Clone, Deserialize)]
pub struct IngredientAmountPayload {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub amount: Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecipePayload {
    pub ingredients: Option<Vec<IngredientAmountPayload>>,
    pub image: Option<String>,
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<Value>,
}

/// How much of the recipe a write must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeWrite {
    /// POST and PUT: every field.
    Full,
    /// PATCH: scalar fields are optional, the ingredient list is not.
    Partial,
}

/// A checked recipe write. The image is still the raw data URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeDraft {
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
    pub image: Option<String>,
    pub ingredients: Vec<(i32, i32)>,
}

impl RecipePayload {
    pub fn validate(self, mode: RecipeWrite) -> Result<RecipeDraft, ApiError> {
        let mut errors = FieldErrors::new();
        let full = mode == RecipeWrite::Full;

        let name = if full || self.name.is_some() {
            text_field(&mut errors, "name", self.name.as_deref(), Some(RECIPE_NAME_MAX_LENGTH))
        } else {
            None
        };
        let text = if full || self.text.is_some() {
            text_field(&mut errors, "text", self.text.as_deref(), None)
        } else {
            None
        };

        let cooking_time = match self.cooking_time.as_ref().map(integer) {
            None if full => {
                errors.add("cooking_time", REQUIRED);
                None
            }
            None => None,
            Some(None) => {
                errors.add("cooking_time", NOT_AN_INTEGER);
                None
            }
            Some(Some(minutes)) => match i32::try_from(minutes) {
                Ok(minutes) if minutes >= 1 => Some(minutes),
                _ => {
                    errors.add("cooking_time", "Cooking time must be at least 1 minute.");
                    None
                }
            },
        };

        let image = match self.image {
            None if full => {
                errors.add("image", REQUIRED);
                None
            }
            Some(data) if data.trim().is_empty() => {
                errors.add("image", BLANK);
                None
            }
            other => other,
        };

        let ingredients = check_ingredients(&mut errors, self.ingredients);
        errors.into_result()?;

        Ok(RecipeDraft {
            name,
            text,
            cooking_time,
            image,
            ingredients,
        })
    }
}

fn check_ingredients(
    errors: &mut FieldErrors,
    ingredients: Option<Vec<IngredientAmountPayload>>,
) -> Vec<(i32, i32)> {
    let ingredients = match ingredients {
        None => {
            errors.add("ingredients", REQUIRED);
            return Vec::new();
        }
        Some(list) if list.is_empty() => {
            errors.add("ingredients", "At least one ingredient is required.");
            return Vec::new();
        }
        Some(list) => list,
    };

    let mut seen = HashSet::new();
    let mut checked = Vec::with_capacity(ingredients.len());
    for item in ingredients {
        let (id, amount) = match (integer(&item.id), integer(&item.amount)) {
            (Some(id), Some(amount)) => (id, amount),
            _ if item.id.is_null() || item.amount.is_null() => {
                errors.add("ingredients", REQUIRED);
                continue;
            }
            _ => {
                errors.add("ingredients", NOT_AN_INTEGER);
                continue;
            }
        };
        let id = match i32::try_from(id) {
            Ok(id) if id > 0 => id,
            _ => {
                errors.add(
                    "ingredients",
                    format!("Invalid pk \"{}\" - object does not exist.", id),
                );
                continue;
            }
        };
        let amount = match i32::try_from(amount) {
            Ok(amount) if amount >= 1 => amount,
            _ => {
                errors.add("ingredients", "Ingredient amount must be at least 1.");
                continue;
            }
        };
        if !seen.insert(id) {
            errors.add("ingredients", "Ingredients must not repeat.");
            continue;
        }
        checked.push((id, amount));
    }
    checked
}

/// A JSON number or a numeric string, as an integer.
fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Query-string booleans as the frontend sends them: `1`/`true` and `0`/`false`.
pub fn parse_flag(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1") | Some("true")
    )
}

/// `recipes_limit` is honoured only as a positive integer.
pub fn parse_recipes_limit(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|v| v.trim().parse::<usize>().ok()).filter(|n| *n > 0)
}
