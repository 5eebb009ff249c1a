use super::*;

table! {
    validated_annotations (id) {
        id -> BigInt,
        note_id -> BigInt,
        property_name -> Varchar,
        value -> Text,
        created_at -> Timestamptz,
    }
}

#[derive(Queryable)]
#[diesel(table_name = validated_annotations)]
struct ValidatedAnnotationPrivate {
    id: i64,
    note_id: i64,
    property_name: String,
    value: String,
    created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = validated_annotations)]
struct ValidatedAnnotationPrivateNew<'a> {
    note_id: i64,
    property_name: String,
    value: &'a str,
}

fn private_to_public(p: ValidatedAnnotationPrivate) -> Result<ValidatedAnnotationRecord> {
    use conversions::*;
    Ok(ValidatedAnnotationRecord {
        validated_id: i64_to_u64(p.id)?,
        note_id: i64_to_u64(p.note_id)?,
        property_name: deserialize_field_name(&p.property_name)?,
        value: p.value,
        created_at: p.created_at,
    })
}

/// Insert unless the note already has a validated value for the property.
/// Relies on the unique index on (note_id, property_name); concurrent writers race on it and
/// exactly one wins.
pub fn insert_validated_annotation_if_absent(
    conn: &mut PgConnection,
    note: NoteId,
    property: FieldName,
    input_value: &str,
) -> Result<bool> {
    use self::validated_annotations::dsl::*;

    let insert_row = ValidatedAnnotationPrivateNew {
        note_id: conversions::u64_to_i64(note)?,
        property_name: conversions::serialize_field_name(property),
        value: input_value,
    };
    let inserted = diesel::insert_into(validated_annotations)
        .values(&insert_row)
        .on_conflict((note_id, property_name))
        .do_nothing()
        .execute(conn)?;
    Ok(inserted > 0)
}

pub fn get_validated_for_notes(
    conn: &mut PgConnection,
    notes: &[NoteId],
) -> Result<Vec<ValidatedAnnotationRecord>> {
    use self::validated_annotations::dsl::*;

    let ids = notes
        .iter()
        .map(|note| conversions::u64_to_i64(*note))
        .collect::<Result<Vec<_>>>()?;
    validated_annotations
        .filter(note_id.eq_any(ids))
        .order(id.asc())
        .load::<ValidatedAnnotationPrivate>(conn)?
        .into_iter()
        .map(private_to_public)
        .collect()
}

pub fn get_validated_for_property(
    conn: &mut PgConnection,
    property: FieldName,
) -> Result<Vec<ValidatedAnnotationRecord>> {
    use self::validated_annotations::dsl::*;

    validated_annotations
        .filter(property_name.eq(conversions::serialize_field_name(property)))
        .order(id.asc())
        .load::<ValidatedAnnotationPrivate>(conn)?
        .into_iter()
        .map(private_to_public)
        .collect()
}

pub fn get_validated_note_ids(
    conn: &mut PgConnection,
    property: FieldName,
    input_value: Option<&str>,
) -> Result<HashSet<NoteId>> {
    use self::validated_annotations::dsl::*;

    let mut query = validated_annotations
        .filter(property_name.eq(conversions::serialize_field_name(property)))
        .select(note_id)
        .distinct()
        .into_boxed();
    if let Some(input_value) = input_value {
        query = query.filter(value.eq(input_value.to_string()));
    }
    let ids = query.load::<i64>(conn)?;
    conversions::i64s_to_u64s(ids)
}
