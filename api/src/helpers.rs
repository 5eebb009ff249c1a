//! Some helper functions for the API.

use crate::auth::USER_ID_HEADER;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Header;
use rocket::http::{Status, StatusClass};
use rocket::request::Request;
use rocket::response::Response;
use rocket::response::status as rocket_status;
use rocket::serde::json::Json;
use rocket::serde::{Deserialize, Serialize};
use std::time::Instant;
use vial_common::AnnotateError;
use vial_common::error::ErrorClass;

/// Logs one line per request, labelled with the handler that served it and the calling user.
#[derive(Clone, Copy)]
pub struct RequestTimingFairing;

#[rocket::async_trait]
impl Fairing for RequestTimingFairing {
    fn info(&self) -> Info {
        Info {
            name: "Request timing",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _data: &mut rocket::Data<'_>) {
        request.local_cache(Instant::now);
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let elapsed_ms = request.local_cache(Instant::now).elapsed().as_millis();
        let route = request
            .route()
            .and_then(|route| route.name.as_deref())
            .unwrap_or("unmatched");
        let user = request.headers().get_one(USER_ID_HEADER).unwrap_or("-");
        let status = response.status();

        if status.class() == StatusClass::ServerError {
            tracing::warn!(route, user, status = status.code, elapsed_ms, "Request failed");
        } else if request.uri().path().starts_with("/metrics") {
            // scrapes are frequent
            tracing::debug!(status = status.code, elapsed_ms, "Metrics scraped");
        } else {
            tracing::info!(route, user, status = status.code, elapsed_ms, "Request completed");
        }
    }
}

/// CORS headers for the annotation front end.
///
/// Clients send `X-User-Id` and JSON bodies, and read `Content-Disposition` to name the CSV
/// download.
#[derive(Clone)]
pub struct CorsFairing {
    pub allowed_origin: String,
}

#[rocket::async_trait]
impl Fairing for CorsFairing {
    fn info(&self) -> Info {
        Info {
            name: "CORS",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, _request: &'r Request<'_>, response: &mut Response<'r>) {
        response.set_header(Header::new(
            "Access-Control-Allow-Origin",
            self.allowed_origin.clone(),
        ));
        response.set_header(Header::new("Access-Control-Allow-Methods", "GET, POST, OPTIONS"));
        response.set_header(Header::new(
            "Access-Control-Allow-Headers",
            format!("Content-Type, {USER_ID_HEADER}"),
        ));
        response.set_header(Header::new(
            "Access-Control-Expose-Headers",
            "Content-Disposition",
        ));
        if self.allowed_origin != "*" {
            response.set_header(Header::new("Vary", "Origin"));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "rocket::serde")]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct ApiErrorBody {
    pub error: ApiErrorKind,
    pub code: String,
    pub message: String,
}

impl ApiErrorBody {
    pub fn new(error: ApiErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error,
            code: code.into(),
            message: message.into(),
        }
    }
}

pub type ApiError = rocket_status::Custom<Json<ApiErrorBody>>;
pub type ApiResult<T> = Result<Json<T>, ApiError>;

fn api_error(
    status: Status,
    kind: ApiErrorKind,
    code: impl Into<String>,
    message: impl Into<String>,
) -> ApiError {
    rocket_status::Custom(status, Json(ApiErrorBody::new(kind, code, message)))
}

pub fn not_found_error(code: impl Into<String>, message: impl Into<String>) -> ApiError {
    api_error(Status::NotFound, ApiErrorKind::NotFound, code, message)
}

pub fn bad_request_error(code: impl Into<String>, message: impl Into<String>) -> ApiError {
    api_error(Status::BadRequest, ApiErrorKind::BadRequest, code, message)
}

/// Map a pipeline error to a response. Storage failures are logged and hidden from the client.
pub fn annotate_error(err: AnnotateError) -> ApiError {
    let code = err.code();
    match err.class() {
        ErrorClass::InvalidRequest => bad_request_error(code, err.to_string()),
        ErrorClass::Forbidden => {
            api_error(Status::Forbidden, ApiErrorKind::Forbidden, code, err.to_string())
        }
        ErrorClass::Service => {
            tracing::error!(error = %err, "Storage failure");
            api_error(
                Status::InternalServerError,
                ApiErrorKind::Internal,
                code,
                "The service is unavailable, please try again later.",
            )
        }
    }
}
