table! {
    auth_tokens (key) {
        key -> Varchar,
        user_id -> Integer,
        created -> Timestamp,
    }
}

table! {
    favorites (id) {
        id -> Integer,
        user_id -> Integer,
        recipe_id -> Integer,
    }
}

table! {
    ingredients (id) {
        id -> Integer,
        name -> Varchar,
        measurement_unit -> Varchar,
    }
}

table! {
    recipe_ingredients (id) {
        id -> Integer,
        recipe_id -> Integer,
        ingredient_id -> Integer,
        amount -> Integer,
    }
}

table! {
    recipes (id) {
        id -> Integer,
        author_id -> Integer,
        name -> Varchar,
        image -> Varchar,
        text -> Text,
        cooking_time -> Integer,
        pub_date -> Timestamp,
    }
}

table! {
    shopping_carts (id) {
        id -> Integer,
        user_id -> Integer,
        recipe_id -> Integer,
    }
}

table! {
    subscriptions (id) {
        id -> Integer,
        user_id -> Integer,
        author_id -> Integer,
    }
}

table! {
    users (id) {
        id -> Integer,
        email -> Varchar,
        username -> Varchar,
        first_name -> Varchar,
        last_name -> Varchar,
        password -> Varchar,
        avatar -> Nullable<Varchar>,
        is_active -> Bool,
        is_staff -> Bool,
        date_joined -> Timestamp,
    }
}

joinable!(auth_tokens -> users (user_id));
joinable!(favorites -> recipes (recipe_id));
joinable!(recipe_ingredients -> ingredients (ingredient_id));
joinable!(recipe_ingredients -> recipes (recipe_id));
joinable!(recipes -> users (author_id));
joinable!(shopping_carts -> recipes (recipe_id));

allow_tables_to_appear_in_same_query!(
    auth_tokens,
    favorites,
    ingredients,
    recipe_ingredients,
    recipes,
    shopping_carts,
    subscriptions,
    users,
);
