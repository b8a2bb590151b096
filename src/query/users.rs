use std::collections::{HashMap, HashSet};

use diesel::dsl::exists;
use diesel::prelude::*;

use crate::auth::generate_token;
use crate::db::last_inserted_id;
use crate::error::is_unique_violation;
use crate::models::{NewSubscription, NewToken, NewUser, User};
use crate::schema::{auth_tokens, subscriptions, users};

pub fn find(conn: &MysqlConnection, user_id: i32) -> QueryResult<Option<User>> {
    users::table.find(user_id).first(conn).optional()
}

pub fn find_by_email(conn: &MysqlConnection, email: &str) -> QueryResult<Option<User>> {
    users::table
        .filter(users::email.eq(email))
        .first(conn)
        .optional()
}

/// Whether the email and the username are already registered.
pub fn taken(conn: &MysqlConnection, email: &str, username: &str) -> QueryResult<(bool, bool)> {
    let email_taken: bool =
        diesel::select(exists(users::table.filter(users::email.eq(email)))).get_result(conn)?;
    let username_taken: bool = diesel::select(exists(users::table.filter(users::username.eq(username))))
        .get_result(conn)?;
    Ok((email_taken, username_taken))
}

pub fn create(conn: &MysqlConnection, new_user: &NewUser) -> QueryResult<User> {
    conn.transaction::<_, diesel::result::Error, _>(|| {
        diesel::insert_into(users::table)
            .values(new_user)
            .execute(conn)?;
        let user_id = last_inserted_id(conn)?;
        users::table.find(user_id).first(conn)
    })
}

pub fn count(conn: &MysqlConnection) -> QueryResult<i64> {
    users::table.count().get_result(conn)
}

pub fn page(conn: &MysqlConnection, offset: i64, limit: i64) -> QueryResult<Vec<User>> {
    users::table
        .order((users::username.asc(), users::id.asc()))
        .limit(limit)
        .offset(offset)
        .load(conn)
}

pub fn set_password(conn: &MysqlConnection, user_id: i32, encoded: &str) -> QueryResult<usize> {
    diesel::update(users::table.find(user_id))
        .set(users::password.eq(encoded))
        .execute(conn)
}

pub fn set_avatar(conn: &MysqlConnection, user_id: i32, avatar: Option<&str>) -> QueryResult<usize> {
    diesel::update(users::table.find(user_id))
        .set(users::avatar.eq(avatar))
        .execute(conn)
}

pub fn user_by_token(conn: &MysqlConnection, key: &str) -> QueryResult<Option<User>> {
    auth_tokens::table
        .inner_join(users::table)
        .filter(auth_tokens::key.eq(key))
        .select(users::all_columns)
        .first(conn)
        .optional()
}

/// The user's token, created on first login and reused afterwards.
pub fn token_for(conn: &MysqlConnection, user_id: i32) -> QueryResult<String> {
    conn.transaction::<_, diesel::result::Error, _>(|| {
        let existing = auth_tokens::table
            .filter(auth_tokens::user_id.eq(user_id))
            .select(auth_tokens::key)
            .first::<String>(conn)
            .optional()?;
        if let Some(key) = existing {
            return Ok(key);
        }
        let key = generate_token();
        diesel::insert_into(auth_tokens::table)
            .values(&NewToken { key: &key, user_id })
            .execute(conn)?;
        Ok(key)
    })
}

pub fn revoke_token(conn: &MysqlConnection, user_id: i32) -> QueryResult<usize> {
    diesel::delete(auth_tokens::table.filter(auth_tokens::user_id.eq(user_id))).execute(conn)
}

/// The subset of `author_ids` that `user_id` is subscribed to.
pub fn followed_among(
    conn: &MysqlConnection,
    user_id: i32,
    author_ids: &[i32],
) -> QueryResult<HashSet<i32>> {
    if author_ids.is_empty() {
        return Ok(HashSet::new());
    }
    let followed = subscriptions::table
        .filter(subscriptions::user_id.eq(user_id))
        .filter(subscriptions::author_id.eq_any(author_ids))
        .select(subscriptions::author_id)
        .load::<i32>(conn)?;
    Ok(followed.into_iter().collect())
}

pub fn is_following(conn: &MysqlConnection, viewer: Option<i32>, author_id: i32) -> QueryResult<bool> {
    match viewer {
        Some(user_id) => Ok(followed_among(conn, user_id, &[author_id])?.contains(&author_id)),
        None => Ok(false),
    }
}

/// Returns `false` when the subscription already exists.
pub fn subscribe(conn: &MysqlConnection, user_id: i32, author_id: i32) -> QueryResult<bool> {
    let inserted = diesel::insert_into(subscriptions::table)
        .values(&NewSubscription { user_id, author_id })
        .execute(conn);
    match inserted {
        Ok(_) => Ok(true),
        Err(err) if is_unique_violation(&err) => Ok(false),
        Err(err) => Err(err),
    }
}

/// Returns `false` when there was nothing to delete.
pub fn unsubscribe(conn: &MysqlConnection, user_id: i32, author_id: i32) -> QueryResult<bool> {
    let deleted = diesel::delete(
        subscriptions::table
            .filter(subscriptions::user_id.eq(user_id))
            .filter(subscriptions::author_id.eq(author_id)),
    )
    .execute(conn)?;
    Ok(deleted > 0)
}

pub fn count_followed(conn: &MysqlConnection, user_id: i32) -> QueryResult<i64> {
    subscriptions::table
        .filter(subscriptions::user_id.eq(user_id))
        .count()
        .get_result(conn)
}

/// Authors `user_id` follows, oldest subscription first.
pub fn followed_page(
    conn: &MysqlConnection,
    user_id: i32,
    offset: i64,
    limit: i64,
) -> QueryResult<Vec<User>> {
    let author_ids = subscriptions::table
        .filter(subscriptions::user_id.eq(user_id))
        .order(subscriptions::id.asc())
        .select(subscriptions::author_id)
        .limit(limit)
        .offset(offset)
        .load::<i32>(conn)?;
    if author_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut by_id: HashMap<i32, User> = users::table
        .filter(users::id.eq_any(&author_ids))
        .load::<User>(conn)?
        .into_iter()
        .map(|user| (user.id, user))
        .collect();
    Ok(author_ids
        .iter()
        .filter_map(|id| by_id.remove(id))
        .collect())
}
