//! Axum request handlers.

use std::sync::{Arc, OnceLock};

use axum::{extract::State, http::StatusCode, Json};
use tracing::{debug, info, warn};

use super::dto::{
    ContactBody, CountdownRequest, CountdownView, DirectSmsRequest, EmergencyRequest, LogAck,
    LogQuery, LogRequest, SettingsBody, SuccessResponse,
};
use super::error::{ApiError, ApiResult};
use super::extract::{ApiJson, ApiPath, ApiQuery};
use super::state::{AppState, CountdownSession};
use crate::config::{AlertSettings, MAX_COUNTDOWN_SECONDS, MIN_COUNTDOWN_SECONDS};
use crate::contact::{Contact, ContactUpdate};
use crate::countdown;
use crate::dispatch::DeliveryResult;
use crate::event::{EmergencyEvent, Location};
use crate::provider::{BatchOutcome, SmsProvider};
use crate::repository::NotificationRecord;
use crate::severity::SeverityLevel;

const DEFAULT_LOG_LIMIT: usize = 50;
const MAX_LOG_LIMIT: usize = 500;

fn parse_contact_id(raw: &str) -> ApiResult<i64> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid contact ID"))
}

fn parse_severity(raw: &str) -> ApiResult<SeverityLevel> {
    Ok(raw.parse::<SeverityLevel>()?)
}

/// Keep contacts named in `ids`, or all of them when `ids` is absent.
fn select_contacts(contacts: Vec<Contact>, ids: Option<&[i64]>) -> Vec<Contact> {
    match ids {
        Some(ids) => contacts
            .into_iter()
            .filter(|c| ids.contains(&c.id))
            .collect(),
        None => contacts,
    }
}

// ---------------------------------------------------------------------------
// Contacts
// ---------------------------------------------------------------------------

/// `GET /api/contacts`
#[tracing::instrument(skip(state))]
pub async fn list_contacts(State(state): State<AppState>) -> ApiResult<Json<Vec<Contact>>> {
    Ok(Json(state.contacts().list_contacts()?))
}

/// `GET /api/contacts/{id}`
#[tracing::instrument(skip(state))]
pub async fn get_contact(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<Contact>> {
    let id = parse_contact_id(&id)?;
    state
        .contacts()
        .get_contact(id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Contact", id))
}

/// `POST /api/contacts`
#[tracing::instrument(skip(state, body))]
pub async fn create_contact(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ContactBody>,
) -> ApiResult<(StatusCode, Json<Contact>)> {
    if let Some(id) = body.id {
        let updated = state.contacts().update_contact(id, &body.as_update())?;
        return Ok((StatusCode::OK, Json(updated)));
    }

    let contact = state.contacts().create_contact(body.contact)?;
    info!("Created contact {}", contact.id);
    Ok((StatusCode::CREATED, Json(contact)))
}

/// `PUT /api/contacts/{id}`
#[tracing::instrument(skip(state, update))]
pub async fn update_contact(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
    ApiJson(update): ApiJson<ContactUpdate>,
) -> ApiResult<Json<Contact>> {
    let id = parse_contact_id(&id)?;
    Ok(Json(state.contacts().update_contact(id, &update)?))
}

/// `DELETE /api/contacts/{id}`
#[tracing::instrument(skip(state))]
pub async fn delete_contact(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<SuccessResponse>> {
    let id = parse_contact_id(&id)?;
    if state.contacts().delete_contact(id)? {
        Ok(Json(SuccessResponse::ok()))
    } else {
        Err(ApiError::not_found("Contact", id))
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// `GET /api/settings`
#[tracing::instrument(skip(state))]
pub async fn get_settings(State(state): State<AppState>) -> ApiResult<Json<SettingsBody>> {
    Ok(Json(state.alert_settings()?.into()))
}

/// `POST /api/settings`
#[tracing::instrument(skip(state))]
pub async fn save_settings(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SettingsBody>,
) -> ApiResult<Json<SuccessResponse>> {
    let settings = AlertSettings::from(body);
    state.settings().save_settings(&settings)?;
    Ok(Json(SuccessResponse::ok()))
}

// ---------------------------------------------------------------------------
// Emergency dispatch
// ---------------------------------------------------------------------------

/// `POST /api/emergency/sms`
#[tracing::instrument(skip(state, request))]
pub async fn send_emergency(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<EmergencyRequest>,
) -> ApiResult<Json<DeliveryResult>> {
    let result = match request {
        EmergencyRequest::BySeverityAndContacts {
            severity,
            location,
            contact_ids,
        } => {
            let severity = parse_severity(&severity)?;
            location.validate()?;

            let targets = select_contacts(
                state.contacts().list_contacts()?,
                contact_ids.as_deref(),
            );
            if targets.is_empty() {
                return Err(ApiError::bad_request("No emergency contacts available"));
            }

            let event = EmergencyEvent::new(severity, location, 0);
            state.dispatcher().dispatch(&event, &targets).await
        }
        EmergencyRequest::ByExplicitRecipients {
            phone_numbers,
            message,
        } => {
            validate_direct(&phone_numbers, &message)?;
            state
                .dispatcher()
                .dispatch_to_numbers(&message, &phone_numbers)
                .await
        }
    };
    Ok(Json(result))
}

fn validate_direct(numbers: &[String], message: &str) -> ApiResult<()> {
    if numbers.iter().all(|n| n.trim().is_empty()) {
        return Err(ApiError::bad_request(
            "phoneNumbers must be a non-empty array",
        ));
    }
    if message.trim().is_empty() {
        return Err(ApiError::bad_request("message is required"));
    }
    Ok(())
}

async fn send_direct(
    provider: &dyn SmsProvider,
    request: DirectSmsRequest,
) -> ApiResult<Json<BatchOutcome>> {
    validate_direct(&request.phone_numbers, &request.message)?;
    debug!(
        "Direct {} send to {} number(s)",
        provider.name(),
        request.phone_numbers.len()
    );
    Ok(Json(
        provider.send(&request.phone_numbers, &request.message).await,
    ))
}

/// `POST /api/emergency/sms/fast2sms`
#[tracing::instrument(skip(state, request))]
pub async fn send_domestic(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<DirectSmsRequest>,
) -> ApiResult<Json<BatchOutcome>> {
    send_direct(state.providers().domestic.as_ref(), request).await
}

/// `POST /api/emergency/sms/twilio`
#[tracing::instrument(skip(state, request))]
pub async fn send_international(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<DirectSmsRequest>,
) -> ApiResult<Json<BatchOutcome>> {
    send_direct(state.providers().international.as_ref(), request).await
}

// ---------------------------------------------------------------------------
// Notification log
// ---------------------------------------------------------------------------

/// `POST /api/emergency/log`
#[tracing::instrument(skip(state, request))]
pub async fn append_log(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LogRequest>,
) -> ApiResult<(StatusCode, Json<LogAck>)> {
    let record = NotificationRecord {
        id: None,
        event_id: request.event_id.unwrap_or_else(|| "manual".to_string()),
        contact_id: request.contact_id,
        channel: None,
        message: request.message,
        success: request.success,
        error_message: request.error_message,
        attempted_at: chrono::Utc::now(),
    };
    let id = state.log().append(&record)?;
    Ok((StatusCode::CREATED, Json(LogAck { success: true, id })))
}

/// `GET /api/emergency/log?limit=N`
#[tracing::instrument(skip(state))]
pub async fn recent_log(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LogQuery>,
) -> ApiResult<Json<Vec<NotificationRecord>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);
    Ok(Json(state.log().recent(limit)?))
}

// ---------------------------------------------------------------------------
// Countdown sessions
// ---------------------------------------------------------------------------

fn view(session: &CountdownSession) -> CountdownView {
    CountdownView {
        id: session.id,
        severity: session.event.severity(),
        location: session.event.location(),
        state: session.handle.state(),
        report: session.report.get().cloned(),
    }
}

fn find_session(state: &AppState, id: u64) -> ApiResult<Arc<CountdownSession>> {
    state
        .session(id)?
        .ok_or_else(|| ApiError::not_found("Countdown", id))
}

/// `POST /api/emergency/countdown`
#[tracing::instrument(skip(state))]
pub async fn start_countdown(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CountdownRequest>,
) -> ApiResult<(StatusCode, Json<CountdownView>)> {
    let settings = state.alert_settings()?;

    let severity = match (&request.severity, request.force) {
        (Some(severity), _) => parse_severity(severity)?,
        (None, Some(force)) => settings.thresholds.classify(force),
        (None, None) => return Err(ApiError::bad_request("force or severity is required")),
    };
    if severity == SeverityLevel::None {
        return Err(ApiError::bad_request(
            "impact is below the mild threshold; no countdown started",
        ));
    }

    let seconds = request
        .countdown_seconds
        .unwrap_or(settings.countdown_seconds);
    if !(MIN_COUNTDOWN_SECONDS..=MAX_COUNTDOWN_SECONDS).contains(&seconds) {
        return Err(ApiError::bad_request(format!(
            "countdownSeconds must be between {MIN_COUNTDOWN_SECONDS} and {MAX_COUNTDOWN_SECONDS}"
        )));
    }

    let location: Location = request
        .location
        .unwrap_or(state.config().message.fallback_location);
    location.validate()?;

    let event = EmergencyEvent::new(severity, location, seconds);
    let (runner, handle) = countdown::arm(seconds, state.tick());
    let session = state.insert_session(CountdownSession {
        id: state.next_session_id(),
        event: event.clone(),
        handle,
        report: Arc::new(OnceLock::new()),
    })?;

    let fire_state = state.clone();
    let table = state.clone();
    let contact_ids = request.contact_ids;
    let slot = session.report.clone();
    let session_id = session.id;
    tokio::spawn(async move {
        let report = runner
            .run(move |reason| async move {
                debug!("Countdown {} fired ({:?})", session_id, reason);
                let contacts = select_contacts(
                    fire_state.contacts().list_contacts()?,
                    contact_ids.as_deref(),
                );
                Ok::<_, crate::Error>(fire_state.dispatcher().dispatch(&event, &contacts).await)
            })
            .await;
        let _ = slot.set(report);

        tokio::time::sleep(table.config().session_retention()).await;
        match table.remove_session(session_id) {
            Ok(_) => debug!("Countdown {} released", session_id),
            Err(e) => warn!("Countdown {} not released: {}", session_id, e),
        }
    });

    info!(
        "Countdown {} armed: {} for {}s",
        session.id, severity, seconds
    );
    Ok((StatusCode::CREATED, Json(view(&session))))
}

/// `GET /api/emergency/countdown/{id}`
#[tracing::instrument(skip(state))]
pub async fn get_countdown(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<u64>,
) -> ApiResult<Json<CountdownView>> {
    let session = find_session(&state, id)?;
    Ok(Json(view(&session)))
}

/// `POST /api/emergency/countdown/{id}/cancel`
#[tracing::instrument(skip(state))]
pub async fn cancel_countdown(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<u64>,
) -> ApiResult<Json<CountdownView>> {
    let session = find_session(&state, id)?;
    session.handle.cancel()?;
    session.handle.clone().closed().await;
    Ok(Json(view(&session)))
}

/// `POST /api/emergency/countdown/{id}/trigger`
#[tracing::instrument(skip(state))]
pub async fn trigger_countdown(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<u64>,
) -> ApiResult<Json<CountdownView>> {
    let session = find_session(&state, id)?;
    session.handle.trigger()?;
    session.handle.clone().closed().await;
    Ok(Json(view(&session)))
}
