use super::*;

table! {
    annotations (id) {
        id -> BigInt,
        note_id -> BigInt,
        user_id -> BigInt,
        property_name -> Varchar,
        value -> Text,
        created_at -> Timestamptz,
    }
}

#[derive(Queryable)]
#[diesel(table_name = annotations)]
struct AnnotationPrivate {
    id: i64,
    note_id: i64,
    user_id: i64,
    property_name: String,
    value: String,
    created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = annotations)]
struct AnnotationPrivateNew<'a> {
    note_id: i64,
    user_id: i64,
    property_name: String,
    value: &'a str,
}

fn private_to_public(p: AnnotationPrivate) -> Result<AnnotationRecord> {
    use conversions::*;
    Ok(AnnotationRecord {
        annotation_id: i64_to_u64(p.id)?,
        note_id: i64_to_u64(p.note_id)?,
        user_id: i64_to_u64(p.user_id)?,
        property_name: deserialize_field_name(&p.property_name)?,
        value: p.value,
        created_at: p.created_at,
    })
}

fn build_new_row(
    user: UserId,
    note: NoteId,
    property: FieldName,
    input_value: &str,
) -> Result<AnnotationPrivateNew<'_>> {
    use conversions::*;
    Ok(AnnotationPrivateNew {
        note_id: u64_to_i64(note)?,
        user_id: u64_to_i64(user)?,
        property_name: serialize_field_name(property),
        value: input_value,
    })
}

pub fn insert_annotation(
    conn: &mut PgConnection,
    user: UserId,
    note: NoteId,
    property: FieldName,
    input_value: &str,
) -> Result<AnnotationRecord> {
    use self::annotations::dsl::*;

    let insert_row = build_new_row(user, note, property, input_value)?;
    let row = diesel::insert_into(annotations)
        .values(&insert_row)
        .get_result::<AnnotationPrivate>(conn)?;
    private_to_public(row)
}

pub fn annotation_exists(
    conn: &mut PgConnection,
    user: UserId,
    note: NoteId,
    property: FieldName,
    input_value: &str,
) -> Result<bool> {
    use self::annotations::dsl::*;
    use diesel::dsl::exists;

    let query = annotations
        .filter(user_id.eq(conversions::u64_to_i64(user)?))
        .filter(note_id.eq(conversions::u64_to_i64(note)?))
        .filter(property_name.eq(conversions::serialize_field_name(property)))
        .filter(value.eq(input_value));
    Ok(diesel::select(exists(query)).get_result::<bool>(conn)?)
}

pub fn get_annotations_for_note(conn: &mut PgConnection, note: NoteId) -> Result<Vec<AnnotationRecord>> {
    use self::annotations::dsl::*;

    annotations
        .filter(note_id.eq(conversions::u64_to_i64(note)?))
        .order((created_at.asc(), id.asc()))
        .load::<AnnotationPrivate>(conn)?
        .into_iter()
        .map(private_to_public)
        .collect()
}

pub fn get_annotations_for_property(
    conn: &mut PgConnection,
    property: FieldName,
) -> Result<Vec<AnnotationRecord>> {
    use self::annotations::dsl::*;

    annotations
        .filter(property_name.eq(conversions::serialize_field_name(property)))
        .order((created_at.asc(), id.asc()))
        .load::<AnnotationPrivate>(conn)?
        .into_iter()
        .map(private_to_public)
        .collect()
}

pub fn get_user_annotated_note_ids(
    conn: &mut PgConnection,
    property: FieldName,
    user: UserId,
) -> Result<HashSet<NoteId>> {
    use self::annotations::dsl::*;

    let ids = annotations
        .filter(property_name.eq(conversions::serialize_field_name(property)))
        .filter(user_id.eq(conversions::u64_to_i64(user)?))
        .select(note_id)
        .distinct()
        .load::<i64>(conn)?;
    conversions::i64s_to_u64s(ids)
}

/// Annotation counts per user, largest first, ties by user id.
pub fn count_annotations_by_user(
    conn: &mut PgConnection,
    excluded_user_ids: &HashSet<UserId>,
    excluded_note_ids: &HashSet<NoteId>,
) -> Result<Vec<(UserId, u64)>> {
    use self::annotations::dsl::*;
    use diesel::dsl::count_star;

    let excluded_user_ids = conversions::u64s_to_i64s(excluded_user_ids)?;
    let excluded_note_ids = conversions::u64s_to_i64s(excluded_note_ids)?;
    let rows = annotations
        .filter(user_id.ne_all(excluded_user_ids))
        .filter(note_id.ne_all(excluded_note_ids))
        .group_by(user_id)
        .select((user_id, count_star()))
        .load::<(i64, i64)>(conn)?;

    let mut counts = rows
        .into_iter()
        .map(|(user, count)| Ok((conversions::i64_to_u64(user)?, conversions::i64_to_u64(count)?)))
        .collect::<Result<Vec<_>>>()?;
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    Ok(counts)
}
