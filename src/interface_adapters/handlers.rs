use axum::{Json, extract::State, http::StatusCode};
use std::time::Duration;
use tracing::error;

use crate::domain::errors::{MaintenanceError, StoreError};
use crate::domain::presence::PresenceSnapshot;
use crate::domain::user::UserProfile;
use crate::interface_adapters::protocol::{
    ActiveEventRequest, ActiveEventResponse, ErrorResponse, GeneratorActionRequest,
    GeneratorResponse, PresenceResponse, RegisterRequest, RemoveAllRequest, RemoveAllResponse,
    RestoreRequest, StatsResponse, UserSettingsRequest,
};
use crate::interface_adapters::state::AppState;
use crate::use_cases::maintenance::RestoreReport;

type ApiError = (StatusCode, Json<ErrorResponse>);

// Places a new generator for its owner.
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<GeneratorResponse>, ApiError> {
    let generator = state
        .maintenance
        .place(payload.owner, payload.location, &payload.generator_type)
        .await
        .map_err(map_maintenance_error)?;
    Ok(Json(GeneratorResponse { generator }))
}

pub async fn unregister(
    State(state): State<AppState>,
    Json(payload): Json<GeneratorActionRequest>,
) -> Result<Json<GeneratorResponse>, ApiError> {
    let generator = state
        .maintenance
        .remove(payload.actor, &payload.generator_id)
        .await
        .map_err(map_maintenance_error)?;
    Ok(Json(GeneratorResponse { generator }))
}

pub async fn fix(
    State(state): State<AppState>,
    Json(payload): Json<GeneratorActionRequest>,
) -> Result<Json<GeneratorResponse>, ApiError> {
    let generator = state
        .maintenance
        .fix(payload.actor, &payload.generator_id)
        .await
        .map_err(map_maintenance_error)?;
    Ok(Json(GeneratorResponse { generator }))
}

pub async fn upgrade(
    State(state): State<AppState>,
    Json(payload): Json<GeneratorActionRequest>,
) -> Result<Json<GeneratorResponse>, ApiError> {
    let generator = state
        .maintenance
        .upgrade(payload.actor, &payload.generator_id)
        .await
        .map_err(map_maintenance_error)?;
    Ok(Json(GeneratorResponse { generator }))
}

pub async fn remove_all(
    State(state): State<AppState>,
    Json(payload): Json<RemoveAllRequest>,
) -> Result<Json<RemoveAllResponse>, ApiError> {
    let removed = state
        .maintenance
        .remove_all(payload.owner)
        .await
        .map_err(map_maintenance_error)?;
    Ok(Json(RemoveAllResponse { removed }))
}

// Replaces the online-player/loaded-world snapshot used by every periodic task.
pub async fn presence(
    State(state): State<AppState>,
    Json(snapshot): Json<PresenceSnapshot>,
) -> Json<PresenceResponse> {
    let response = PresenceResponse {
        online: snapshot.online.len(),
        worlds: snapshot.worlds.len(),
    };
    state.presence.replace(snapshot);
    Json(response)
}

pub async fn active_event(
    State(state): State<AppState>,
    Json(payload): Json<ActiveEventRequest>,
) -> Result<Json<ActiveEventResponse>, ApiError> {
    match payload.event {
        Some(event) => {
            if payload.duration_seconds == 0 {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    "duration_seconds must be positive",
                ));
            }
            state
                .events
                .start(event, Duration::from_secs(payload.duration_seconds));
        }
        None => {
            state.events.stop();
        }
    }
    let remaining_seconds = state.events.remaining_seconds();
    Ok(Json(ActiveEventResponse {
        active: remaining_seconds.is_some(),
        remaining_seconds,
    }))
}

// Called by the game server after a world loads, with the blocks found at each stored location.
pub async fn restore_world(
    State(state): State<AppState>,
    Json(payload): Json<RestoreRequest>,
) -> Result<Json<RestoreReport>, ApiError> {
    state
        .maintenance
        .restore_world(&payload.world, &payload.found)
        .await
        .map(Json)
        .map_err(|err| map_store_error(err, "world restore failed"))
}

pub async fn user_settings(
    State(state): State<AppState>,
    Json(payload): Json<UserSettingsRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    let users = &state.ctx.users;
    let mut profile = users
        .get_or_create(payload.player, &payload.name)
        .await
        .map_err(|err| map_store_error(err, "profile lookup failed"))?;

    if let Some(enabled) = payload.auto_sell_generators {
        profile.auto_sell_generators = enabled;
    }
    if let Some(enabled) = payload.auto_sell_inventory {
        profile.auto_sell_inventory = enabled;
    }
    users
        .save(&profile)
        .await
        .map_err(|err| map_store_error(err, "profile save failed"))?;
    Ok(Json(profile))
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let ctx = &state.ctx;
    let store = ctx
        .repository
        .stats()
        .await
        .map_err(|err| map_store_error(err, "stats unavailable"))?;

    Ok(Json(StatsResponse {
        server_id: ctx.locks.server_id().to_string(),
        generators: store.generators,
        owners: store.owners,
        worlds: store.worlds,
        active_leases: store.active_leases,
        held_leases: ctx.locks.held_ids().await.len(),
        cached: ctx.cache.len().await,
        dirty: ctx.cache.dirty_count().await,
        corruption_in_seconds: state.corruption.seconds_until_next(),
    }))
}

// Helper to build a JSON error response.
fn error_response(status: StatusCode, message: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            message: message.to_string(),
        }),
    )
}

fn map_store_error(err: StoreError, context: &str) -> ApiError {
    error!(error = %err, "{context}");
    error_response(StatusCode::BAD_GATEWAY, "storage error")
}

fn map_maintenance_error(err: MaintenanceError) -> ApiError {
    match err {
        MaintenanceError::NotFound => error_response(StatusCode::NOT_FOUND, "generator not found"),
        MaintenanceError::NotOwner => {
            error_response(StatusCode::FORBIDDEN, "generator belongs to another player")
        }
        MaintenanceError::Occupied | MaintenanceError::HeldElsewhere => {
            error_response(StatusCode::CONFLICT, &err.to_string())
        }
        MaintenanceError::NotCorrupted
        | MaintenanceError::NoUpgrade
        | MaintenanceError::UnknownType(_) => {
            error_response(StatusCode::BAD_REQUEST, &err.to_string())
        }
        MaintenanceError::NotEnoughMoney { .. } => {
            error_response(StatusCode::PAYMENT_REQUIRED, &err.to_string())
        }
        MaintenanceError::Store(err) => map_store_error(err, "maintenance flow failed"),
        MaintenanceError::Economy(err) => {
            error!(error = %err, "economy call failed");
            error_response(StatusCode::BAD_GATEWAY, "economy unavailable")
        }
    }
}
