use super::*;

table! {
    users (id) {
        id -> BigInt,
        email -> Varchar,
        username -> Nullable<Varchar>,
        blocked -> Bool,
        invalid_notes_counter -> Integer,
        created_at -> Timestamptz,
    }
}

#[derive(Queryable)]
#[diesel(table_name = users)]
struct UserPrivate {
    id: i64,
    email: String,
    username: Option<String>,
    blocked: bool,
    invalid_notes_counter: i32,
    created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = users)]
struct UserPrivateNew<'a> {
    email: &'a str,
    username: Option<&'a str>,
}

fn private_to_public(p: UserPrivate) -> Result<UserRecord> {
    use conversions::*;
    Ok(UserRecord {
        user_id: i64_to_u64(p.id)?,
        email: p.email,
        username: p.username,
        blocked: p.blocked,
        invalid_notes_counter: i32_to_u32(p.invalid_notes_counter)?,
        created_at: p.created_at,
    })
}

pub fn insert_user(
    conn: &mut PgConnection,
    input_email: &str,
    input_username: Option<&str>,
) -> Result<UserRecord> {
    use self::users::dsl::*;

    let insert_row = UserPrivateNew {
        email: input_email,
        username: input_username,
    };

    let row = diesel::insert_into(users)
        .values(&insert_row)
        .get_result::<UserPrivate>(conn)?;
    private_to_public(row)
}

pub fn get_user_by_id(conn: &mut PgConnection, row_id: u64) -> Result<Option<UserRecord>> {
    use self::users::dsl::*;

    let row_id = conversions::u64_to_i64(row_id)?;
    users
        .filter(id.eq(row_id))
        .first::<UserPrivate>(conn)
        .optional()?
        .map(private_to_public)
        .transpose()
}

pub fn get_users_by_ids(conn: &mut PgConnection, row_ids: &HashSet<u64>) -> Result<Vec<UserRecord>> {
    use self::users::dsl::*;

    let row_ids = conversions::u64s_to_i64s(row_ids)?;
    users
        .filter(id.eq_any(row_ids))
        .order(id.asc())
        .load::<UserPrivate>(conn)?
        .into_iter()
        .map(private_to_public)
        .collect()
}

pub fn get_blocked_user_ids(conn: &mut PgConnection, block_threshold: u32) -> Result<HashSet<u64>> {
    use self::users::dsl::*;

    let block_threshold = conversions::u32_to_i32(block_threshold)?;
    let ids = users
        .filter(blocked.eq(true).or(invalid_notes_counter.gt(block_threshold)))
        .select(id)
        .load::<i64>(conn)?;
    conversions::i64s_to_u64s(ids)
}

/// Atomically bump the user's invalid note count and return the new value.
pub fn increment_invalid_notes_counter(conn: &mut PgConnection, row_id: u64) -> Result<Option<u32>> {
    use self::users::dsl::*;

    let row_id = conversions::u64_to_i64(row_id)?;
    diesel::update(users.filter(id.eq(row_id)))
        .set(invalid_notes_counter.eq(invalid_notes_counter + 1))
        .returning(invalid_notes_counter)
        .get_result::<i32>(conn)
        .optional()?
        .map(conversions::i32_to_u32)
        .transpose()
}

pub fn set_user_blocked(conn: &mut PgConnection, row_id: u64, is_blocked: bool) -> Result<bool> {
    use self::users::dsl::*;

    let row_id = conversions::u64_to_i64(row_id)?;
    let updated = diesel::update(users.filter(id.eq(row_id)))
        .set(blocked.eq(is_blocked))
        .execute(conn)?;
    Ok(updated > 0)
}
