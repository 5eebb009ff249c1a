//! The registry of annotatable properties.
//!
//! Every property is described by a [`FieldDescriptor`]: how a submitted value is validated and
//! stored, and how two stored values are compared when counting agreement. The rest of the
//! pipeline is identical for every property.

use crate::error::AnnotateError;
use crate::geo::{self, Coordinates, StoredCoordinates};
use crate::NOT_AVAILABLE;
use chrono::{Datelike, NaiveDate, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use url::Url;

pub const AGE_OPTIONS: &[&str] = &["child", "young", "adult", "old"];
pub const SEX_OPTIONS: &[&str] = &["hombre", "mujer"];
pub const TRANSPORTATION_OPTIONS: &[&str] = &["peaton", "ciclista", "motociclista"];
pub const BOOLEAN_OPTIONS: &[&str] = &["true", "false"];
pub const VEHICLE_OPTIONS: &[&str] = &[
    "automovil",
    "ambulancia",
    "bus",
    "bicicleta",
    "caballo",
    "camion",
    "camioneta",
    "carreta",
    "cuatrimoto",
    "grua",
    "taxi",
    "motocicleta",
    "patrulla",
    "pipa",
    "tractor",
    "trailer",
    "tren",
    "tren_ligero",
];

/// Ages above this are rejected as typos.
const MAX_AGE_YEARS: u16 = 130;

/// Each property volunteers can annotate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldName {
    VictimAge,
    VictimName,
    VictimSex,
    VictimTransportation,
    AccidentDate,
    AccidentTime,
    Coordinates,
    HasVictimizerInfo,
    VictimizerSex,
    VictimizerAge,
    VictimizerVehicle,
    Unavailable,
}

impl FieldName {
    pub const ALL: [FieldName; 12] = [
        FieldName::VictimAge,
        FieldName::VictimName,
        FieldName::VictimSex,
        FieldName::VictimTransportation,
        FieldName::AccidentDate,
        FieldName::AccidentTime,
        FieldName::Coordinates,
        FieldName::HasVictimizerInfo,
        FieldName::VictimizerSex,
        FieldName::VictimizerAge,
        FieldName::VictimizerVehicle,
        FieldName::Unavailable,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FieldName::VictimAge => "victimAge",
            FieldName::VictimName => "victimName",
            FieldName::VictimSex => "victimSex",
            FieldName::VictimTransportation => "victimTransportation",
            FieldName::AccidentDate => "accidentDate",
            FieldName::AccidentTime => "accidentTime",
            FieldName::Coordinates => "coordinates",
            FieldName::HasVictimizerInfo => "hasVictimizerInfo",
            FieldName::VictimizerSex => "victimizerSex",
            FieldName::VictimizerAge => "victimizerAge",
            FieldName::VictimizerVehicle => "victimizerVehicle",
            FieldName::Unavailable => "unavailable",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldName {
    type Err = AnnotateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldName::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| AnnotateError::UnknownField(s.to_string()))
    }
}

/// A value as sent by a client, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmittedValue {
    Text(String),
    Date {
        year: i32,
        month: u32,
        day: u32,
    },
    Coordinates {
        google_maps_url: String,
        #[serde(default)]
        latitude: Option<f64>,
        #[serde(default)]
        longitude: Option<f64>,
    },
    NotAvailable,
}

/// How a submitted value is validated and turned into its stored form.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueRule {
    Options(&'static [&'static str]),
    /// An option or a whole number of years.
    AgeOrOptions(&'static [&'static str]),
    FreeText,
    Date { earliest_year: i32 },
    HourOfDay,
    Coordinates,
    /// Only the "not available" marker is accepted.
    MarkerOnly,
}

/// When two stored values count as the same answer.
#[derive(Debug, Clone, PartialEq)]
pub enum AgreementRule {
    Exact,
    /// Whitespace-collapsed, case-insensitive comparison.
    NormalizedText,
    /// Coordinates within a radius, in meters.
    Proximity { radius_meters: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: FieldName,
    pub value_rule: ValueRule,
    pub agreement: AgreementRule,
    /// Only offered once a note is validated to have victimizer information.
    pub requires_victimizer_info: bool,
}

/// Summary of a field for clients building forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSummary {
    pub name: FieldName,
    pub options: Option<Vec<String>>,
    pub requires_victimizer_info: bool,
}

impl FieldDescriptor {
    fn new(name: FieldName, value_rule: ValueRule) -> Self {
        Self {
            name,
            value_rule,
            agreement: AgreementRule::Exact,
            requires_victimizer_info: false,
        }
    }

    fn agreement(mut self, agreement: AgreementRule) -> Self {
        self.agreement = agreement;
        self
    }

    fn after_victimizer_info(mut self) -> Self {
        self.requires_victimizer_info = true;
        self
    }

    pub fn options(&self) -> Option<&'static [&'static str]> {
        match self.value_rule {
            ValueRule::Options(options) | ValueRule::AgeOrOptions(options) => Some(options),
            _ => None,
        }
    }

    pub fn summary(&self) -> FieldSummary {
        FieldSummary {
            name: self.name,
            options: self
                .options()
                .map(|options| options.iter().map(ToString::to_string).collect()),
            requires_victimizer_info: self.requires_victimizer_info,
        }
    }

    /// Validate a submitted value and return the string to store.
    ///
    /// # Errors
    /// Returns `MissingValue` for blank input and `InvalidValue` when the value does not fit the
    /// field.
    pub fn canonicalize(&self, submitted: &SubmittedValue) -> Result<String, AnnotateError> {
        let field = self.name;
        match (submitted, &self.value_rule) {
            (SubmittedValue::NotAvailable, _) => Ok(NOT_AVAILABLE.to_string()),
            (_, ValueRule::MarkerOnly) => Err(AnnotateError::invalid_value(
                field,
                "only the not available marker is accepted",
            )),
            (SubmittedValue::Text(text), rule) => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(AnnotateError::MissingValue(field));
                }
                canonicalize_text(field, rule, text)
            }
            (SubmittedValue::Date { year, month, day }, ValueRule::Date { earliest_year }) => {
                let date = NaiveDate::from_ymd_opt(*year, *month, *day).ok_or_else(|| {
                    AnnotateError::invalid_value(field, "not a calendar date")
                })?;
                check_accident_date(field, date, *earliest_year)
            }
            (
                SubmittedValue::Coordinates {
                    google_maps_url,
                    latitude,
                    longitude,
                },
                ValueRule::Coordinates,
            ) => canonicalize_coordinates(field, google_maps_url, *latitude, *longitude),
            _ => Err(AnnotateError::invalid_value(
                field,
                "value has the wrong shape for this property",
            )),
        }
    }

    /// Whether two stored values count as agreeing.
    pub fn agrees(&self, stored: &str, candidate: &str) -> bool {
        let stored_is_marker = stored == NOT_AVAILABLE;
        let candidate_is_marker = candidate == NOT_AVAILABLE;
        if stored_is_marker || candidate_is_marker {
            return stored_is_marker && candidate_is_marker;
        }

        match self.agreement {
            AgreementRule::Exact => stored == candidate,
            AgreementRule::NormalizedText => normalize_text(stored) == normalize_text(candidate),
            AgreementRule::Proximity { radius_meters } => {
                match (
                    StoredCoordinates::parse(stored),
                    StoredCoordinates::parse(candidate),
                ) {
                    (Some(a), Some(b)) => {
                        geo::haversine_distance(a.coordinates(), b.coordinates()) <= radius_meters
                    }
                    _ => false,
                }
            }
        }
    }
}

/// Collapse whitespace runs to a single space, trim, and lowercase.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().join(" ").to_lowercase()
}

fn canonicalize_text(field: FieldName, rule: &ValueRule, text: &str) -> Result<String, AnnotateError> {
    match rule {
        ValueRule::Options(options) => {
            if options.contains(&text) {
                Ok(text.to_string())
            } else {
                Err(AnnotateError::invalid_value(
                    field,
                    format!("expected one of {}", options.join(", ")),
                ))
            }
        }
        ValueRule::AgeOrOptions(options) => {
            if options.contains(&text) {
                return Ok(text.to_string());
            }
            match text.parse::<u16>() {
                Ok(years) if years <= MAX_AGE_YEARS => Ok(years.to_string()),
                _ => Err(AnnotateError::invalid_value(
                    field,
                    format!(
                        "expected a whole number of years or one of {}",
                        options.join(", ")
                    ),
                )),
            }
        }
        ValueRule::FreeText => Ok(text.to_string()),
        ValueRule::Date { earliest_year } => {
            let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .map_err(|_| AnnotateError::invalid_value(field, "expected yyyy-mm-dd"))?;
            check_accident_date(field, date, *earliest_year)
        }
        ValueRule::HourOfDay => {
            let hour = text
                .strip_suffix(":00")
                .and_then(|hour| hour.parse::<u32>().ok())
                .filter(|hour| *hour < 24)
                .ok_or_else(|| AnnotateError::invalid_value(field, "expected an hour like 13:00"))?;
            Ok(format!("{hour}:00"))
        }
        ValueRule::Coordinates => canonicalize_coordinates(field, text, None, None),
        ValueRule::MarkerOnly => Err(AnnotateError::invalid_value(
            field,
            "only the not available marker is accepted",
        )),
    }
}

fn check_accident_date(
    field: FieldName,
    date: NaiveDate,
    earliest_year: i32,
) -> Result<String, AnnotateError> {
    let today = Utc::now().date_naive();
    if date.year() < earliest_year {
        return Err(AnnotateError::invalid_value(
            field,
            format!("dates before {earliest_year} are not collected"),
        ));
    }
    if date > today {
        return Err(AnnotateError::invalid_value(field, "date is in the future"));
    }
    Ok(date.format("%Y-%m-%d").to_string())
}

fn canonicalize_coordinates(
    field: FieldName,
    google_maps_url: &str,
    latitude: Option<f64>,
    longitude: Option<f64>,
) -> Result<String, AnnotateError> {
    let google_maps_url = google_maps_url.trim();
    if google_maps_url.is_empty() {
        return Err(AnnotateError::MissingValue(field));
    }
    let is_http = Url::parse(google_maps_url)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false);
    if !is_http {
        return Err(AnnotateError::invalid_value(field, "google maps url is invalid"));
    }

    let coordinates = match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Coordinates {
            latitude,
            longitude,
        },
        (None, None) => geo::coordinates_from_google_maps_url(google_maps_url).ok_or_else(|| {
            AnnotateError::invalid_value(field, "no pin found in the google maps url")
        })?,
        _ => {
            return Err(AnnotateError::invalid_value(
                field,
                "latitude and longitude must be sent together",
            ));
        }
    };
    if !coordinates.is_in_range() {
        return Err(AnnotateError::invalid_value(
            field,
            "coordinates are out of range",
        ));
    }

    StoredCoordinates {
        google_maps_url: google_maps_url.to_string(),
        latitude: coordinates.latitude,
        longitude: coordinates.longitude,
    }
    .to_value()
    .map_err(|e| AnnotateError::invalid_value(field, e.to_string()))
}

/// The immutable set of annotatable properties, built once at startup.
#[derive(Debug, Clone)]
pub struct FieldRegistry {
    descriptors: Vec<FieldDescriptor>,
}

impl FieldRegistry {
    pub fn new(proximity_radius_meters: f64, earliest_accident_year: i32) -> Self {
        let descriptors = FieldName::ALL
            .into_iter()
            .map(|name| match name {
                FieldName::VictimAge => FieldDescriptor::new(name, ValueRule::AgeOrOptions(AGE_OPTIONS)),
                FieldName::VictimName => FieldDescriptor::new(name, ValueRule::FreeText)
                    .agreement(AgreementRule::NormalizedText),
                FieldName::VictimSex => FieldDescriptor::new(name, ValueRule::Options(SEX_OPTIONS)),
                FieldName::VictimTransportation => {
                    FieldDescriptor::new(name, ValueRule::Options(TRANSPORTATION_OPTIONS))
                }
                FieldName::AccidentDate => FieldDescriptor::new(
                    name,
                    ValueRule::Date {
                        earliest_year: earliest_accident_year,
                    },
                ),
                FieldName::AccidentTime => FieldDescriptor::new(name, ValueRule::HourOfDay),
                FieldName::Coordinates => FieldDescriptor::new(name, ValueRule::Coordinates).agreement(
                    AgreementRule::Proximity {
                        radius_meters: proximity_radius_meters,
                    },
                ),
                FieldName::HasVictimizerInfo => {
                    FieldDescriptor::new(name, ValueRule::Options(BOOLEAN_OPTIONS))
                }
                FieldName::VictimizerSex => FieldDescriptor::new(name, ValueRule::Options(SEX_OPTIONS))
                    .after_victimizer_info(),
                FieldName::VictimizerAge => FieldDescriptor::new(name, ValueRule::Options(AGE_OPTIONS))
                    .after_victimizer_info(),
                FieldName::VictimizerVehicle => {
                    FieldDescriptor::new(name, ValueRule::Options(VEHICLE_OPTIONS))
                }
                FieldName::Unavailable => FieldDescriptor::new(name, ValueRule::MarkerOnly),
            })
            .collect();
        Self { descriptors }
    }

    pub fn is_valid_field(&self, name: &str) -> bool {
        name.parse::<FieldName>().is_ok()
    }

    pub fn all_fields(&self) -> BTreeSet<FieldName> {
        self.descriptors.iter().map(|d| d.name).collect()
    }

    pub fn descriptor(&self, name: FieldName) -> &FieldDescriptor {
        &self.descriptors[name.index()]
    }

    /// Parse a property name from a request.
    ///
    /// # Errors
    /// Returns `UnknownField` for names outside the registry.
    pub fn parse_field(&self, name: &str) -> Result<FieldName, AnnotateError> {
        name.parse()
    }

    pub fn summaries(&self) -> Vec<FieldSummary> {
        self.descriptors.iter().map(FieldDescriptor::summary).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DEFAULT_EARLIEST_ACCIDENT_YEAR, DEFAULT_PROXIMITY_RADIUS_METERS};

    fn registry() -> FieldRegistry {
        FieldRegistry::new(
            DEFAULT_PROXIMITY_RADIUS_METERS,
            DEFAULT_EARLIEST_ACCIDENT_YEAR,
        )
    }

    fn text(value: &str) -> SubmittedValue {
        SubmittedValue::Text(value.to_string())
    }

    #[test]
    fn test_registry_covers_every_field_in_order() {
        let registry = registry();
        for field in FieldName::ALL {
            assert_eq!(registry.descriptor(field).name, field);
        }
        assert_eq!(registry.all_fields().len(), FieldName::ALL.len());
    }

    #[test]
    fn test_is_valid_field() {
        let registry = registry();
        assert!(registry.is_valid_field("victimAge"));
        assert!(registry.is_valid_field("hasVictimizerInfo"));
        assert!(registry.is_valid_field("unavailable"));
        assert!(!registry.is_valid_field("VictimAge"));
        assert!(!registry.is_valid_field("shoeSize"));
        assert!(!registry.is_valid_field(""));
    }

    #[test]
    fn test_field_name_round_trips_through_serde() {
        let json = serde_json::to_string(&FieldName::VictimizerVehicle).unwrap();
        assert_eq!(json, "\"victimizerVehicle\"");
        assert_eq!(
            "victimizerVehicle".parse::<FieldName>().unwrap(),
            FieldName::VictimizerVehicle
        );
    }

    #[test]
    fn test_options() {
        let sex = registry().descriptor(FieldName::VictimSex).clone();
        assert_eq!(sex.canonicalize(&text(" mujer ")).unwrap(), "mujer");
        assert!(matches!(
            sex.canonicalize(&text("otro")),
            Err(AnnotateError::InvalidValue { .. })
        ));
        assert!(matches!(
            sex.canonicalize(&text("   ")),
            Err(AnnotateError::MissingValue(FieldName::VictimSex))
        ));
    }

    #[test]
    fn test_age_accepts_numbers_and_options() {
        let age = registry().descriptor(FieldName::VictimAge).clone();
        assert_eq!(age.canonicalize(&text("adult")).unwrap(), "adult");
        assert_eq!(age.canonicalize(&text("034")).unwrap(), "34");
        assert_eq!(age.canonicalize(&text("0")).unwrap(), "0");
        assert!(age.canonicalize(&text("-3")).is_err());
        assert!(age.canonicalize(&text("200")).is_err());
        assert!(age.canonicalize(&text("grown")).is_err());
    }

    #[test]
    fn test_victimizer_age_is_options_only() {
        let age = registry().descriptor(FieldName::VictimizerAge).clone();
        assert!(age.requires_victimizer_info);
        assert!(age.canonicalize(&text("34")).is_err());
        assert_eq!(age.canonicalize(&text("old")).unwrap(), "old");
    }

    #[test]
    fn test_date() {
        let date = registry().descriptor(FieldName::AccidentDate).clone();
        let ymd = SubmittedValue::Date {
            year: 2020,
            month: 2,
            day: 29,
        };
        assert_eq!(date.canonicalize(&ymd).unwrap(), "2020-02-29");
        assert_eq!(date.canonicalize(&text("2021-07-04")).unwrap(), "2021-07-04");

        let not_leap = SubmittedValue::Date {
            year: 2019,
            month: 2,
            day: 29,
        };
        assert!(date.canonicalize(&not_leap).is_err());
        assert!(date.canonicalize(&text("2017-12-31")).is_err());
        assert!(date.canonicalize(&text("04/07/2021")).is_err());

        let next_year = Utc::now().year() + 1;
        assert!(date.canonicalize(&text(&format!("{next_year}-01-01"))).is_err());
    }

    #[test]
    fn test_time() {
        let time = registry().descriptor(FieldName::AccidentTime).clone();
        assert_eq!(time.canonicalize(&text("0:00")).unwrap(), "0:00");
        assert_eq!(time.canonicalize(&text("07:00")).unwrap(), "7:00");
        assert_eq!(time.canonicalize(&text("23:00")).unwrap(), "23:00");
        assert!(time.canonicalize(&text("24:00")).is_err());
        assert!(time.canonicalize(&text("7:30")).is_err());
    }

    #[test]
    fn test_coordinates_explicit_and_extracted() {
        let coordinates = registry().descriptor(FieldName::Coordinates).clone();
        let explicit = SubmittedValue::Coordinates {
            google_maps_url: "https://maps.google.com/?q=1".to_string(),
            latitude: Some(20.5),
            longitude: Some(-100.4),
        };
        let stored = coordinates.canonicalize(&explicit).unwrap();
        let parsed = StoredCoordinates::parse(&stored).unwrap();
        assert_eq!(parsed.latitude, 20.5);

        let extracted = SubmittedValue::Coordinates {
            google_maps_url: "https://www.google.com/maps/place/x/@1,2,17z/data=!3m1!3d20.58!4d-100.40"
                .to_string(),
            latitude: None,
            longitude: None,
        };
        let parsed = StoredCoordinates::parse(&coordinates.canonicalize(&extracted).unwrap()).unwrap();
        assert_eq!((parsed.latitude, parsed.longitude), (20.58, -100.40));

        let half = SubmittedValue::Coordinates {
            google_maps_url: "https://maps.google.com/".to_string(),
            latitude: Some(1.0),
            longitude: None,
        };
        assert!(coordinates.canonicalize(&half).is_err());

        let out_of_range = SubmittedValue::Coordinates {
            google_maps_url: "https://maps.google.com/".to_string(),
            latitude: Some(91.0),
            longitude: Some(0.0),
        };
        assert!(coordinates.canonicalize(&out_of_range).is_err());

        let not_http = SubmittedValue::Coordinates {
            google_maps_url: "ftp://maps.google.com/".to_string(),
            latitude: Some(1.0),
            longitude: Some(1.0),
        };
        assert!(coordinates.canonicalize(&not_http).is_err());
    }

    #[test]
    fn test_wrong_shape_is_rejected() {
        let sex = registry().descriptor(FieldName::VictimSex).clone();
        let date = SubmittedValue::Date {
            year: 2020,
            month: 1,
            day: 1,
        };
        assert!(matches!(
            sex.canonicalize(&date),
            Err(AnnotateError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_marker_only_field() {
        let unavailable = registry().descriptor(FieldName::Unavailable).clone();
        assert_eq!(
            unavailable.canonicalize(&SubmittedValue::NotAvailable).unwrap(),
            NOT_AVAILABLE
        );
        assert!(unavailable.canonicalize(&text("yes")).is_err());
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("Juan   Pérez"), "juan pérez");
        assert_eq!(normalize_text(" juan\tpérez "), "juan pérez");
    }

    #[test]
    fn test_agreement_rules() {
        let registry = registry();
        let name = registry.descriptor(FieldName::VictimName);
        assert!(name.agrees("Juan   Pérez", " juan pérez "));
        assert!(!name.agrees("Juan Pérez", "Juana Pérez"));

        let sex = registry.descriptor(FieldName::VictimSex);
        assert!(sex.agrees("mujer", "mujer"));
        assert!(!sex.agrees("mujer", "hombre"));

        // markers only agree with markers
        assert!(sex.agrees(NOT_AVAILABLE, NOT_AVAILABLE));
        assert!(!sex.agrees(NOT_AVAILABLE, "mujer"));
        assert!(!name.agrees("na", NOT_AVAILABLE));
    }

    #[test]
    fn test_summaries() {
        let summaries = registry().summaries();
        let transport = summaries
            .iter()
            .find(|s| s.name == FieldName::VictimTransportation)
            .unwrap();
        assert_eq!(transport.options.as_ref().unwrap().len(), 3);
        let name = summaries
            .iter()
            .find(|s| s.name == FieldName::VictimName)
            .unwrap();
        assert_eq!(name.options, None);
    }
}
