//! HTTP API consumed by the voting dashboard.

use ezballot_core::{
    Candidate, CandidateId, Error, RegistrationRecord, RegistrationRequest, RegistrationStatus,
    VoteError, VoteReceipt, VoterIdentity, VoterStatus,
};
use percent_encoding::percent_decode_str;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, warn};
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::election::Registration;
use crate::state::AppState;

const MAX_BODY_BYTES: u64 = 16 * 1024;

/// Body of `POST /api/votes`.
#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub identity: String,
    pub candidate_id: CandidateId,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

/// A receipt with binary fields hex-encoded.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReceiptView {
    pub sequence: u64,
    pub voter_identity: String,
    pub candidate_id: CandidateId,
    pub timestamp: u64,
    pub prev: String,
    pub digest: String,
    pub signature: String,
}

impl From<&VoteReceipt> for ReceiptView {
    fn from(receipt: &VoteReceipt) -> Self {
        Self {
            sequence: receipt.sequence,
            voter_identity: receipt.voter_identity.to_string(),
            candidate_id: receipt.candidate_id,
            timestamp: receipt.timestamp,
            prev: receipt.prev.to_hex(),
            digest: receipt.digest.to_hex(),
            signature: hex::encode(&receipt.signature),
        }
    }
}

#[derive(Serialize)]
struct RegistrationView {
    registration_id: String,
    identity: String,
    constituency: String,
    registered_at: u64,
    status: RegistrationStatus,
}

impl From<&RegistrationRecord> for RegistrationView {
    fn from(record: &RegistrationRecord) -> Self {
        Self {
            registration_id: record.registration_id.clone(),
            identity: record.identity.to_string(),
            constituency: record.constituency.clone(),
            registered_at: record.registered_at,
            status: record.status,
        }
    }
}

#[derive(Serialize)]
struct StatusView {
    identity: String,
    has_voted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    voted_at: Option<u64>,
}

#[derive(Serialize)]
struct KeyView {
    verifying_key: String,
}

/// All routes, with JSON error bodies for rejections.
pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| warp::reply::with_status("OK", StatusCode::OK));

    let candidates = warp::path!("api" / "candidates")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(list_candidates);

    let register = warp::path!("api" / "register")
        .and(warp::post())
        .and(json_body::<RegistrationRequest>())
        .and(with_state(state.clone()))
        .and_then(register_voter);

    let votes = warp::path!("api" / "votes")
        .and(warp::post())
        .and(json_body::<VoteRequest>())
        .and(with_state(state.clone()))
        .and_then(submit_vote);

    let status = warp::path!("api" / "voters" / String / "status")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(voter_status);

    let receipt = warp::path!("api" / "voters" / String / "receipt")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(voter_receipt);

    let results = warp::path!("api" / "results")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(latest_results);

    let key = warp::path!("api" / "receipts" / "key")
        .and(warp::get())
        .and(with_state(state))
        .and_then(receipt_key);

    health
        .or(candidates)
        .or(register)
        .or(votes)
        .or(status)
        .or(receipt)
        .or(results)
        .or(key)
        .recover(handle_rejection)
        .with(
            warp::cors()
                .allow_any_origin()
                .allow_methods(vec!["GET", "POST"])
                .allow_header("content-type"),
        )
        .with(warp::trace::request())
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

fn json_reply<T: Serialize>(value: &T, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(value), status).into_response()
}

fn error_reply(status: StatusCode, error: &str, message: impl Into<String>) -> Response {
    json_reply(
        &ErrorBody {
            error,
            message: message.into(),
        },
        status,
    )
}

fn vote_error_reply(err: &VoteError) -> Response {
    let status = match err {
        VoteError::AlreadyVoted(_) => StatusCode::CONFLICT,
        VoteError::UnknownCandidate(_) => StatusCode::UNPROCESSABLE_ENTITY,
        VoteError::IdentityNotEligible(_) => StatusCode::FORBIDDEN,
        VoteError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    let message = match err {
        VoteError::StorageUnavailable(_) => {
            "The vote could not be recorded. Please try again later.".to_string()
        }
        other => other.to_string(),
    };
    error_reply(status, err.category(), message)
}

fn core_error_reply(err: &Error) -> Response {
    match err {
        Error::Vote(vote) => vote_error_reply(vote),
        Error::InvalidIdentity(_) => {
            error_reply(StatusCode::BAD_REQUEST, "invalid_identity", err.to_string())
        }
        Error::InvalidRegistration { .. } => {
            error_reply(StatusCode::BAD_REQUEST, "invalid_registration", err.to_string())
        }
        Error::AlreadyRegistered(_) => {
            error_reply(StatusCode::CONFLICT, "already_registered", err.to_string())
        }
        Error::RegistryUnavailable(reason) => {
            error!("Failed to persist registration: {}", reason);
            error_reply(
                StatusCode::SERVICE_UNAVAILABLE,
                "storage_unavailable",
                "The registration could not be saved. Please try again later.",
            )
        }
        other => {
            error!("Request failed: {}", other);
            error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "Internal server error",
            )
        }
    }
}

fn parse_identity(raw: &str) -> Result<VoterIdentity, Response> {
    VoterIdentity::new(raw).map_err(|e| core_error_reply(&e))
}

/// Identity from a percent-encoded path segment.
fn parse_identity_segment(segment: &str) -> Result<VoterIdentity, Response> {
    let decoded = percent_decode_str(segment).decode_utf8().map_err(|_| {
        error_reply(
            StatusCode::BAD_REQUEST,
            "invalid_identity",
            "identity is not valid UTF-8",
        )
    })?;
    parse_identity(&decoded)
}

async fn list_candidates(state: AppState) -> Result<Response, Infallible> {
    let candidates: Vec<Candidate> = state.coordinator.candidates().iter().cloned().collect();
    Ok(json_reply(&candidates, StatusCode::OK))
}

async fn register_voter(
    request: RegistrationRequest,
    state: AppState,
) -> Result<Response, Infallible> {
    let Some(registration) = state.registration else {
        return Ok(error_reply(
            StatusCode::NOT_FOUND,
            "registration_disabled",
            "Voter registration is not enabled for this election",
        ));
    };

    let outcome = tokio::task::spawn_blocking(move || {
        let Registration { registry, file } = registration;
        registry.register_persisted(request, |records| file.save(records))
    })
    .await;

    match outcome {
        Ok(Ok(record)) => Ok(json_reply(
            &RegistrationView::from(&record),
            StatusCode::CREATED,
        )),
        Ok(Err(e)) => Ok(core_error_reply(&e)),
        Err(e) => {
            error!("Registration task failed: {}", e);
            Ok(error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "Internal server error",
            ))
        }
    }
}

async fn submit_vote(request: VoteRequest, state: AppState) -> Result<Response, Infallible> {
    let identity = match parse_identity(&request.identity) {
        Ok(identity) => identity,
        Err(reply) => return Ok(reply),
    };

    let coordinator = Arc::clone(&state.coordinator);
    let candidate_id = request.candidate_id;
    let outcome =
        tokio::task::spawn_blocking(move || coordinator.submit_vote(&identity, candidate_id))
            .await;

    match outcome {
        Ok(Ok(receipt)) => {
            state.refresh.notify_one();
            Ok(json_reply(&ReceiptView::from(&receipt), StatusCode::CREATED))
        }
        Ok(Err(e)) => Ok(vote_error_reply(&e)),
        Err(e) => {
            error!("Vote task failed: {}", e);
            Ok(error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "Internal server error",
            ))
        }
    }
}

async fn voter_status(raw: String, state: AppState) -> Result<Response, Infallible> {
    let identity = match parse_identity_segment(&raw) {
        Ok(identity) => identity,
        Err(reply) => return Ok(reply),
    };

    let view = match state.coordinator.status(&identity) {
        VoterStatus::NotVoted => StatusView {
            identity: identity.to_string(),
            has_voted: false,
            voted_at: None,
        },
        VoterStatus::Voted(record) => StatusView {
            identity: identity.to_string(),
            has_voted: true,
            voted_at: Some(record.timestamp),
        },
    };
    Ok(json_reply(&view, StatusCode::OK))
}

async fn voter_receipt(raw: String, state: AppState) -> Result<Response, Infallible> {
    let identity = match parse_identity_segment(&raw) {
        Ok(identity) => identity,
        Err(reply) => return Ok(reply),
    };

    match state.coordinator.receipt(&identity) {
        Some(receipt) => Ok(json_reply(&ReceiptView::from(&receipt), StatusCode::OK)),
        None => Ok(error_reply(
            StatusCode::NOT_FOUND,
            "no_receipt",
            format!("No vote on record for {identity}"),
        )),
    }
}

async fn latest_results(state: AppState) -> Result<Response, Infallible> {
    Ok(json_reply(&*state.latest_results(), StatusCode::OK))
}

async fn receipt_key(state: AppState) -> Result<Response, Infallible> {
    let view = KeyView {
        verifying_key: hex::encode(state.coordinator.verifying_key().as_bytes()),
    };
    Ok(json_reply(&view, StatusCode::OK))
}

async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    if err.is_not_found() {
        return Ok(error_reply(StatusCode::NOT_FOUND, "not_found", "Not found"));
    }
    if let Some(e) = err.find::<warp::body::BodyDeserializeError>() {
        return Ok(error_reply(StatusCode::BAD_REQUEST, "invalid_body", e.to_string()));
    }
    if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        return Ok(error_reply(
            StatusCode::PAYLOAD_TOO_LARGE,
            "payload_too_large",
            "Request body too large",
        ));
    }
    if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(error_reply(
            StatusCode::METHOD_NOT_ALLOWED,
            "method_not_allowed",
            "Method not allowed",
        ));
    }

    warn!("Unhandled rejection: {:?}", err);
    Ok(error_reply(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal",
        "Internal server error",
    ))
}
