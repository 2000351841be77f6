pub mod event;

use serde_json::json;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use warp::{http::StatusCode, path, Filter, Rejection};

use std::{convert::Infallible, sync::Arc};

use crate::apis::{
    vbout::{AttemptReport, DeliveryResult, RejectionStatus},
    Api,
};
use crate::config::WebhookServerConfiguration;

use event::{FormSubmission, FORM_SUBMISSION_EVENT};

const MAX_BODY_BYTES: u64 = 1024 * 256;

/// All routes the relay serves. Every path through here terminates in a
/// structured JSON reply; nothing escapes to the platform boundary raw.
pub fn routes(
    api: Arc<Api>,
    server: WebhookServerConfiguration,
) -> impl Filter<Extract = impl warp::Reply, Error = Infallible> + Clone {
    webhook_route(api.clone())
        .or(diagnostic_route(api, server.diagnostics))
        .recover(handle_rejection)
}

fn with<T>(value: T) -> impl Filter<Extract = (T,), Error = Infallible> + Clone
where
    T: Send + Sync + Clone,
{
    warp::any().map(move || value.clone())
}

fn webhook_route(
    api: Arc<Api>,
) -> impl Filter<Extract = (warp::reply::WithStatus<warp::reply::Json>,), Error = Rejection> + Clone
{
    path!("webhook" / "charla")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with(api))
        .and_then(handle_submission)
}

fn diagnostic_route(
    api: Arc<Api>,
    enabled: bool,
) -> impl Filter<Extract = (warp::reply::WithStatus<warp::reply::Json>,), Error = Rejection> + Clone
{
    path!("diagnostic" / "vbout")
        .and(warp::get())
        .and(with(api))
        .and(with(enabled))
        .and_then(handle_diagnostic)
}

/// Per invocation: Received -> Validated -> ContactExtracted ->
/// CallAttempted* -> Succeeded | Failed. Nothing survives past the reply.
async fn handle_submission(
    submission: FormSubmission,
    api: Arc<Api>,
) -> Result<warp::reply::WithStatus<warp::reply::Json>, Rejection> {
    info!(
        "Received webhook event [{}] from visitor [{}]",
        submission.event, submission.visitor_id
    );

    if submission.event != FORM_SUBMISSION_EVENT {
        warn!("Dropping webhook with event type [{}]", submission.event);
        return Ok(error_reply(StatusCode::BAD_REQUEST, "Invalid event type"));
    }

    if !api.vbout.api_key_present() {
        error!("The VBout API key is blank; check the secrets file");
        return Ok(error_reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Server configuration error",
        ));
    }

    let contact = match submission.contact() {
        Some(contact) => contact,
        None => return Ok(error_reply(StatusCode::BAD_REQUEST, "Email is required")),
    };

    match api.vbout.add_contact(&contact).await {
        DeliveryResult::Delivered {
            strategy,
            contact_id,
            payload,
        } => Ok(warp::reply::with_status(
            warp::reply::json(&json!({
                "success": true,
                "contact_id": contact_id,
                "email": contact.email,
                "strategy": strategy,
                "response": payload,
            })),
            StatusCode::OK,
        )),
        DeliveryResult::Rejected { last } => {
            let status = match api.vbout.rejection_status() {
                RejectionStatus::Accepted => StatusCode::OK,
                RejectionStatus::PassThrough => StatusCode::INTERNAL_SERVER_ERROR,
            };
            Ok(failure_reply(status, "The CRM rejected the contact", &last))
        }
        DeliveryResult::Unreachable { last } => Ok(failure_reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to reach the CRM",
            &last,
        )),
    }
}

async fn handle_diagnostic(
    api: Arc<Api>,
    enabled: bool,
) -> Result<warp::reply::WithStatus<warp::reply::Json>, Rejection> {
    if !enabled {
        return Err(warp::reject::not_found());
    }

    if !api.vbout.api_key_present() {
        return Ok(error_reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Server configuration error",
        ));
    }

    let reports = api.vbout.probe().await;
    let working = reports.iter().filter(|r| r.success).count();
    Ok(warp::reply::with_status(
        warp::reply::json(&json!({ "results": reports, "working": working })),
        StatusCode::OK,
    ))
}

async fn handle_rejection(
    err: Rejection,
) -> Result<warp::reply::WithStatus<warp::reply::Json>, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else if err
        .find::<warp::filters::body::BodyDeserializeError>()
        .is_some()
    {
        (StatusCode::BAD_REQUEST, "Invalid JSON body")
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Payload too large")
    } else {
        error!("Unhandled rejection: {err:?}");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    };

    Ok(error_reply(status, message))
}

fn error_reply(
    status: StatusCode,
    message: &str,
) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(
        warp::reply::json(&json!({ "success": false, "error": message })),
        status,
    )
}

fn failure_reply(
    status: StatusCode,
    message: &str,
    last: &AttemptReport,
) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(
        warp::reply::json(&json!({
            "success": false,
            "error": message,
            "strategy": last.strategy.clone(),
            "details": last.detail.clone(),
            "timestamp": timestamp(),
        })),
        status,
    )
}

fn timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}
