use std::collections::HashSet;

use diesel::prelude::*;

use crate::models::{Ingredient, NewIngredient};
use crate::schema::ingredients;

const INSERT_BATCH_SIZE: usize = 500;

pub fn all(conn: &MysqlConnection) -> QueryResult<Vec<Ingredient>> {
    ingredients::table
        .order((ingredients::name.asc(), ingredients::id.asc()))
        .load(conn)
}

pub fn find(conn: &MysqlConnection, ingredient_id: i32) -> QueryResult<Option<Ingredient>> {
    ingredients::table
        .find(ingredient_id)
        .first(conn)
        .optional()
}

pub fn existing_ids(conn: &MysqlConnection, ids: &[i32]) -> QueryResult<HashSet<i32>> {
    if ids.is_empty() {
        return Ok(HashSet::new());
    }
    let found = ingredients::table
        .filter(ingredients::id.eq_any(ids))
        .select(ingredients::id)
        .load::<i32>(conn)?;
    Ok(found.into_iter().collect())
}

/// Inserts in batches, silently skipping (name, unit) pairs that already exist.
/// Returns the number of rows actually inserted.
pub fn insert_ignoring_duplicates(
    conn: &MysqlConnection,
    rows: &[NewIngredient],
) -> QueryResult<usize> {
    conn.transaction::<_, diesel::result::Error, _>(|| {
        let mut inserted = 0;
        for batch in rows.chunks(INSERT_BATCH_SIZE) {
            inserted += diesel::insert_or_ignore_into(ingredients::table)
                .values(batch)
                .execute(conn)?;
        }
        Ok(inserted)
    })
}
