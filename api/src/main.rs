//! An api for crowdsourced annotation of road collision notes.

#[macro_use]
extern crate rocket;

mod auth;
mod backend;
mod helpers;

use anyhow::{Context, anyhow};
use auth::CurrentUser;
use backend::Backend;
use clap::Parser;
use helpers::*;
use rocket::http::{ContentType, Header};
use rocket::request::Request;
use rocket::response::Responder;
use rocket::serde::json::Json;
use rocket::serde::{Deserialize, Serialize};
use rocket::{Build, Rocket, State};
use rocket_prometheus::PrometheusMetrics;
use rocket_prometheus::prometheus::{IntCounterVec, Opts};
use tracing_subscriber::EnvFilter;
use vial_common::config::ConfigArgs;
use vial_common::export::{self, EXPORT_FILE_NAME};
use vial_common::fields::{FieldSummary, SubmittedValue};
use vial_common::memory_store::MemoryStore;
use vial_common::submission::{self, OmitAction};
use vial_common::{
    AnnotateError, AnnotationReceipt, AnnotationRepository, Config, FieldName, NoteAssignment,
    NoteId, NoteRecord, NoteWithAnnotations, annotations, assignment, db_util,
};

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    /// Keep all data in memory instead of connecting to DATABASE_URL.
    #[arg(long)]
    in_memory: bool,

    /// Origin allowed to call the api from a browser.
    #[arg(long, env = "CORS_ORIGIN", default_value = "*")]
    cors_origin: String,
}

/// Everything the routes share.
pub struct AppState {
    backend: Backend,
    config: Config,
}

/// Counts annotations by property and outcome.
pub struct AnnotationMetrics(IntCounterVec);

impl AnnotationMetrics {
    fn record(&self, property: FieldName, receipt: &AnnotationReceipt) {
        self.0
            .with_label_values(&[property.as_str(), receipt.outcome.as_str()])
            .inc();
    }
}

fn parse_property(state: &AppState, property: &str) -> Result<FieldName, ApiError> {
    state
        .config
        .registry
        .parse_field(property)
        .map_err(annotate_error)
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
struct NextNote {
    note: Option<NoteAssignment>,
}

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
struct SubmitRequest {
    note_id: NoteId,
    value: SubmittedValue,
}

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
struct OmitRequest {
    note_id: NoteId,
    property_name: String,
    action: OmitAction,
}

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
struct CreateNoteRequest {
    urls: Vec<String>,
    #[serde(default)]
    custom_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
struct CommentRequest {
    comments: String,
}

#[get("/fields")]
fn list_fields(state: &State<AppState>) -> Json<Vec<FieldSummary>> {
    Json(state.config.registry.summaries())
}

#[get("/annotate/<property>/next")]
fn next_note(state: &State<AppState>, user: CurrentUser, property: &str) -> ApiResult<NextNote> {
    let property = parse_property(state, property)?;
    let note = state
        .backend
        .with_repo(|repo| {
            Ok(assignment::select_for_field(
                repo,
                &state.config,
                property,
                user.0,
            )?)
        })
        .map_err(annotate_error)?;
    Ok(Json(NextNote { note }))
}

#[post("/annotate/<property>", data = "<request>")]
fn annotate(
    state: &State<AppState>,
    metrics: &State<AnnotationMetrics>,
    user: CurrentUser,
    property: &str,
    request: Json<SubmitRequest>,
) -> ApiResult<AnnotationReceipt> {
    let property = parse_property(state, property)?;
    let receipt = state
        .backend
        .with_repo(|repo| {
            submission::submit_annotation(
                repo,
                &state.config,
                user.0,
                request.note_id,
                property,
                &request.value,
            )
        })
        .map_err(annotate_error)?;
    metrics.record(property, &receipt);
    Ok(Json(receipt))
}

#[post("/omit", data = "<request>")]
fn omit(
    state: &State<AppState>,
    metrics: &State<AnnotationMetrics>,
    user: CurrentUser,
    request: Json<OmitRequest>,
) -> ApiResult<AnnotationReceipt> {
    let property = parse_property(state, &request.property_name)?;
    let receipt = state
        .backend
        .with_repo(|repo| {
            submission::omit(
                repo,
                &state.config,
                user.0,
                request.note_id,
                property,
                request.action,
            )
        })
        .map_err(annotate_error)?;
    metrics.record(property, &receipt);
    Ok(Json(receipt))
}

#[post("/notes", data = "<request>")]
fn create_note(
    state: &State<AppState>,
    user: CurrentUser,
    request: Json<CreateNoteRequest>,
) -> ApiResult<NoteRecord> {
    state
        .backend
        .with_repo(|repo| {
            submission::require_active_user(repo, &state.config, user.0)?;
            annotations::create_note(
                repo,
                &state.config,
                user.0,
                &request.urls,
                request.custom_id.as_deref(),
            )
        })
        .map(Json)
        .map_err(annotate_error)
}

#[get("/notes/<note_id>")]
fn get_note(
    state: &State<AppState>,
    _user: CurrentUser,
    note_id: NoteId,
) -> ApiResult<NoteWithAnnotations> {
    state
        .backend
        .with_repo(|repo| Ok(annotations::get_note_with_annotations(repo, note_id)?))
        .map_err(annotate_error)?
        .map(Json)
        .ok_or_else(|| not_found_error("note-02", format!("Note #{note_id} does not exist.")))
}

#[post("/notes/<note_id>/comment", data = "<request>")]
fn comment_note(
    state: &State<AppState>,
    user: CurrentUser,
    note_id: NoteId,
    request: Json<CommentRequest>,
) -> ApiResult<NoteRecord> {
    state
        .backend
        .with_repo(|repo| {
            submission::require_active_user(repo, &state.config, user.0)?;
            annotations::update_comment(repo, note_id, &request.comments)?;
            repo.get_note(note_id)?.ok_or(AnnotateError::NoteNotFound {
                note_id,
                field: None,
            })
        })
        .map(Json)
        .map_err(annotate_error)
}

/// The CSV export, offered as a download.
struct CsvAttachment(String);

impl<'r> Responder<'r, 'static> for CsvAttachment {
    fn respond_to(self, request: &'r Request<'_>) -> rocket::response::Result<'static> {
        rocket::Response::build_from(self.0.respond_to(request)?)
            .header(ContentType::CSV)
            .header(Header::new(
                "Content-Disposition",
                format!("attachment;filename={EXPORT_FILE_NAME}"),
            ))
            .ok()
    }
}

#[get("/data")]
fn export_data(state: &State<AppState>, _user: CurrentUser) -> Result<CsvAttachment, ApiError> {
    let notes = state
        .backend
        .with_repo(|repo| Ok(export::get_all_valid_notes(repo, &state.config)?))
        .map_err(annotate_error)?;
    Ok(CsvAttachment(export::to_csv(&state.config, &notes)))
}

#[get("/contributors")]
fn list_contributors(state: &State<AppState>) -> ApiResult<Vec<String>> {
    state
        .backend
        .with_repo(|repo| Ok(export::get_contributors(repo, &state.config)?))
        .map(Json)
        .map_err(annotate_error)
}

#[catch(400)]
fn bad_request(_req: &Request) -> Json<ApiErrorBody> {
    Json(ApiErrorBody::new(
        ApiErrorKind::BadRequest,
        "request-01",
        "The request could not be understood.",
    ))
}

#[catch(401)]
fn unauthorized(_req: &Request) -> Json<ApiErrorBody> {
    Json(ApiErrorBody::new(
        ApiErrorKind::Unauthorized,
        "user-02",
        format!("A valid {} header is required.", auth::USER_ID_HEADER),
    ))
}

#[catch(404)]
fn not_found(_req: &Request) -> Json<ApiErrorBody> {
    Json(ApiErrorBody::new(
        ApiErrorKind::NotFound,
        "request-02",
        "The requested resource could not be found.",
    ))
}

#[catch(422)]
fn unprocessable(_req: &Request) -> Json<ApiErrorBody> {
    Json(ApiErrorBody::new(
        ApiErrorKind::BadRequest,
        "request-01",
        "The request body is malformed.",
    ))
}

#[catch(500)]
fn internal(_req: &Request) -> Json<ApiErrorBody> {
    Json(ApiErrorBody::new(
        ApiErrorKind::Internal,
        "service-01",
        "The service is unavailable, please try again later.",
    ))
}

fn build_rocket(
    backend: Backend,
    config: Config,
    cors_origin: String,
) -> anyhow::Result<Rocket<Build>> {
    let prometheus = PrometheusMetrics::new();
    let annotations_total = IntCounterVec::new(
        Opts::new("vial_annotations_total", "Annotations recorded, by property and outcome"),
        &["property", "outcome"],
    )?;
    prometheus
        .registry()
        .register(Box::new(annotations_total.clone()))?;

    tracing::info!(backend = backend.name(), "Building api");
    Ok(rocket::build()
        .attach(RequestTimingFairing)
        .attach(CorsFairing {
            allowed_origin: cors_origin,
        })
        .attach(prometheus.clone())
        .manage(AppState { backend, config })
        .manage(AnnotationMetrics(annotations_total))
        .mount(
            "/",
            routes![
                list_fields,
                next_note,
                annotate,
                omit,
                create_note,
                get_note,
                comment_note,
                export_data,
                list_contributors
            ],
        )
        .mount("/metrics", prometheus)
        .register(
            "/",
            catchers![bad_request, unauthorized, not_found, unprocessable, internal],
        ))
}

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_args(&cli.config).context("Invalid configuration")?;
    let backend = if cli.in_memory {
        tracing::warn!("Running with an in-memory store, nothing will be persisted");
        Backend::memory(MemoryStore::new())
    } else {
        Backend::Postgres(db_util::get_database_pool()?)
    };

    build_rocket(backend, config, cli.cors_origin)?
        .launch()
        .await
        .map_err(|e| anyhow!("Rocket failed: {e}"))?;
    Ok(())
}
