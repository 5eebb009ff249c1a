use super::*;

table! {
    notes (id) {
        id -> BigInt,
        user_id -> BigInt,
        custom_id -> Nullable<Varchar>,
        comments -> Nullable<Text>,
        unavailable_counter -> Integer,
        invalid_counter -> Integer,
        created_at -> Timestamptz,
    }
}

table! {
    note_urls (id) {
        id -> BigInt,
        note_id -> BigInt,
        position -> Integer,
        url -> Varchar,
    }
}

#[derive(Queryable)]
#[diesel(table_name = notes)]
struct NotePrivate {
    id: i64,
    user_id: i64,
    custom_id: Option<String>,
    comments: Option<String>,
    unavailable_counter: i32,
    invalid_counter: i32,
    created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = notes)]
struct NotePrivateNew<'a> {
    user_id: i64,
    custom_id: Option<&'a str>,
}

#[derive(Insertable)]
#[diesel(table_name = note_urls)]
struct NoteUrlPrivateNew<'a> {
    note_id: i64,
    position: i32,
    url: &'a str,
}

fn private_to_public(p: NotePrivate, urls: Vec<String>) -> Result<NoteRecord> {
    use conversions::*;
    Ok(NoteRecord {
        note_id: i64_to_u64(p.id)?,
        user_id: i64_to_u64(p.user_id)?,
        custom_id: p.custom_id,
        comments: p.comments,
        urls,
        unavailable_counter: i32_to_u32(p.unavailable_counter)?,
        invalid_counter: i32_to_u32(p.invalid_counter)?,
        created_at: p.created_at,
    })
}

/// Load the urls of several notes at once, in their original order.
fn get_urls_for_notes(conn: &mut PgConnection, row_ids: &[i64]) -> Result<HashMap<i64, Vec<String>>> {
    use self::note_urls::dsl::*;

    let rows = note_urls
        .filter(note_id.eq_any(row_ids))
        .order((note_id.asc(), position.asc()))
        .select((note_id, url))
        .load::<(i64, String)>(conn)?;
    Ok(rows.into_iter().into_group_map())
}

fn attach_urls(conn: &mut PgConnection, rows: Vec<NotePrivate>) -> Result<Vec<NoteRecord>> {
    let row_ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
    let mut urls = get_urls_for_notes(conn, &row_ids)?;
    rows.into_iter()
        .map(|row| {
            let row_urls = urls.remove(&row.id).unwrap_or_default();
            private_to_public(row, row_urls)
        })
        .collect()
}

pub fn insert_note(conn: &mut PgConnection, new_note: &NewNote) -> Result<NoteRecord> {
    conn.transaction::<_, anyhow::Error, _>(|conn| {
        let insert_row = NotePrivateNew {
            user_id: conversions::u64_to_i64(new_note.user_id)?,
            custom_id: new_note.custom_id.as_deref(),
        };
        let row = diesel::insert_into(notes::table)
            .values(&insert_row)
            .get_result::<NotePrivate>(conn)?;

        let url_rows = new_note
            .urls
            .iter()
            .enumerate()
            .map(|(i, url)| {
                Ok(NoteUrlPrivateNew {
                    note_id: row.id,
                    position: i32::try_from(i)?,
                    url,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        diesel::insert_into(note_urls::table)
            .values(&url_rows)
            .execute(conn)?;

        private_to_public(row, new_note.urls.clone())
    })
}

pub fn get_note_by_id(conn: &mut PgConnection, row_id: u64) -> Result<Option<NoteRecord>> {
    use self::notes::dsl::*;

    let row_id = conversions::u64_to_i64(row_id)?;
    let Some(row) = notes
        .filter(id.eq(row_id))
        .first::<NotePrivate>(conn)
        .optional()?
    else {
        return Ok(None);
    };
    Ok(attach_urls(conn, vec![row])?.pop())
}

pub fn update_note_comments(conn: &mut PgConnection, row_id: u64, text: &str) -> Result<bool> {
    use self::notes::dsl::*;

    let row_id = conversions::u64_to_i64(row_id)?;
    let updated = diesel::update(notes.filter(id.eq(row_id)))
        .set(comments.eq(text))
        .execute(conn)?;
    Ok(updated > 0)
}

/// Atomically bump the note's unavailable counter and return the new value.
pub fn increment_unavailable_counter(conn: &mut PgConnection, row_id: u64) -> Result<Option<u32>> {
    use self::notes::dsl::*;

    let row_id = conversions::u64_to_i64(row_id)?;
    diesel::update(notes.filter(id.eq(row_id)))
        .set(unavailable_counter.eq(unavailable_counter + 1))
        .returning(unavailable_counter)
        .get_result::<i32>(conn)
        .optional()?
        .map(conversions::i32_to_u32)
        .transpose()
}

/// Atomically bump the note's invalid counter and return the new value.
pub fn increment_invalid_counter(conn: &mut PgConnection, row_id: u64) -> Result<Option<u32>> {
    use self::notes::dsl::*;

    let row_id = conversions::u64_to_i64(row_id)?;
    diesel::update(notes.filter(id.eq(row_id)))
        .set(invalid_counter.eq(invalid_counter + 1))
        .returning(invalid_counter)
        .get_result::<i32>(conn)
        .optional()?
        .map(conversions::i32_to_u32)
        .transpose()
}

/// The oldest note accepted by the filter.
pub fn find_first_assignable_note(
    conn: &mut PgConnection,
    filter: &AssignmentFilter,
) -> Result<Option<NoteRecord>> {
    use self::notes::dsl::*;

    let excluded_ids = conversions::u64s_to_i64s(&filter.excluded_note_ids)?;
    let blocked_ids = conversions::u64s_to_i64s(&filter.blocked_user_ids)?;
    let max_counter = conversions::u32_to_i32(filter.max_counter)?;

    let mut query = notes
        .filter(id.ne_all(excluded_ids))
        .filter(user_id.ne_all(blocked_ids))
        .filter(unavailable_counter.le(max_counter))
        .filter(invalid_counter.le(max_counter))
        .into_boxed();
    if let Some(restrict_to) = &filter.restrict_to {
        query = query.filter(id.eq_any(conversions::u64s_to_i64s(restrict_to)?));
    }

    let Some(row) = query
        .order((created_at.asc(), id.asc()))
        .first::<NotePrivate>(conn)
        .optional()?
    else {
        return Ok(None);
    };
    Ok(attach_urls(conn, vec![row])?.pop())
}

/// Notes not reported invalid too often whose owner is not blocked, oldest first.
pub fn get_valid_notes(
    conn: &mut PgConnection,
    max_invalid_counter: u32,
    blocked_user_ids: &HashSet<u64>,
) -> Result<Vec<NoteRecord>> {
    use self::notes::dsl::*;

    let max_invalid_counter = conversions::u32_to_i32(max_invalid_counter)?;
    let blocked_ids = conversions::u64s_to_i64s(blocked_user_ids)?;
    let rows = notes
        .filter(invalid_counter.le(max_invalid_counter))
        .filter(user_id.ne_all(blocked_ids))
        .order((created_at.asc(), id.asc()))
        .load::<NotePrivate>(conn)?;
    attach_urls(conn, rows)
}

pub fn get_invalid_note_ids(conn: &mut PgConnection, max_invalid_counter: u32) -> Result<HashSet<u64>> {
    use self::notes::dsl::*;

    let max_invalid_counter = conversions::u32_to_i32(max_invalid_counter)?;
    let ids = notes
        .filter(invalid_counter.gt(max_invalid_counter))
        .select(id)
        .load::<i64>(conn)?;
    conversions::i64s_to_u64s(ids)
}
