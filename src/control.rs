// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Local HTTP control surface.
//!
//! | Path | Query | Effect |
//! |------|-------|--------|
//! | `/wol` | `mac` | Wake-on-LAN for an arbitrary MAC |
//! | `/shutdown` | `host`, `user`, `pwd`, `port` | Remote shutdown of an arbitrary host |
//! | `/preset_on` | `device` | Wake a device from the power-on list |
//! | `/preset_off` | `device` | Shut down a device from the power-off list |
//! | `/status` | | Relay session state as JSON |
//!
//! Plain-text bodies throughout. Actions run before the response is sent
//! and are never retried.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::action::{DeviceActions, Dispatcher, PresetOutcome};
use crate::device::{DEFAULT_SSH_PORT, MacAddress, ShutdownTarget};
use crate::protocol::{SessionSnapshot, SessionState};

/// Shared state behind every handler.
pub struct ControlState<A> {
    dispatcher: Arc<Dispatcher<A>>,
    session: watch::Receiver<SessionSnapshot>,
}

impl<A> ControlState<A> {
    /// Creates handler state from the dispatcher and the session watch.
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher<A>>, session: watch::Receiver<SessionSnapshot>) -> Self {
        Self {
            dispatcher,
            session,
        }
    }
}

impl<A> Clone for ControlState<A> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
            session: self.session.clone(),
        }
    }
}

/// Builds the control router.
pub fn router<A: DeviceActions>(state: ControlState<A>) -> Router {
    Router::new()
        .route("/wol", get(wol::<A>))
        .route("/shutdown", get(shutdown::<A>))
        .route("/preset_on", get(preset_on::<A>))
        .route("/preset_off", get(preset_off::<A>))
        .route("/status", get(status::<A>))
        .fallback(unknown)
        .with_state(state)
}

/// Serves the control router on `listener` until the task is dropped.
///
/// # Errors
///
/// Returns an error if accepting connections fails.
pub async fn serve<A: DeviceActions>(
    listener: TcpListener,
    state: ControlState<A>,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "HTTP control surface listening");
    }
    axum::serve(listener, router(state)).await
}

fn reply(path: &str, status: StatusCode, body: String) -> Response {
    if status.is_success() {
        tracing::info!(path, status = status.as_u16(), body = %body, "HTTP response");
    } else {
        tracing::warn!(path, status = status.as_u16(), body = %body, "HTTP response");
    }
    (status, body).into_response()
}

#[derive(Debug, Deserialize)]
struct WolQuery {
    mac: Option<String>,
}

async fn wol<A: DeviceActions>(
    State(state): State<ControlState<A>>,
    Query(query): Query<WolQuery>,
) -> Response {
    const PATH: &str = "/wol";
    tracing::info!(path = PATH, mac = ?query.mac, "HTTP request");

    let Some(raw) = query.mac.filter(|s| !s.trim().is_empty()) else {
        return reply(PATH, StatusCode::BAD_REQUEST, "Missing mac parameter".to_string());
    };
    let Ok(mac) = raw.parse::<MacAddress>() else {
        return reply(PATH, StatusCode::BAD_REQUEST, "Invalid mac parameter".to_string());
    };

    match state.dispatcher.actions().wake(mac).await {
        Ok(()) => reply(PATH, StatusCode::OK, format!("WOL triggered for {raw}")),
        Err(e) => reply(PATH, StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct ShutdownQuery {
    host: Option<String>,
    user: Option<String>,
    pwd: Option<String>,
    port: Option<String>,
}

impl ShutdownQuery {
    fn target(&self) -> Option<ShutdownTarget> {
        let present = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());
        let host = present(&self.host)?;
        let user = present(&self.user)?;
        let password = present(&self.pwd)?;
        let port = self
            .port
            .as_deref()
            .and_then(|p| p.trim().parse::<u16>().ok())
            .filter(|&p| p != 0)
            .unwrap_or(DEFAULT_SSH_PORT);
        Some(
            ShutdownTarget::new(host, user)
                .with_password(password)
                .with_port(port),
        )
    }
}

async fn shutdown<A: DeviceActions>(
    State(state): State<ControlState<A>>,
    Query(query): Query<ShutdownQuery>,
) -> Response {
    const PATH: &str = "/shutdown";
    tracing::info!(
        path = PATH,
        host = ?query.host,
        user = ?query.user,
        port = ?query.port,
        "HTTP request"
    );

    let Some(target) = query.target() else {
        return reply(PATH, StatusCode::BAD_REQUEST, "Missing host/user/pwd".to_string());
    };

    match state.dispatcher.actions().shutdown(&target).await {
        Ok(()) => reply(
            PATH,
            StatusCode::OK,
            format!("Shutdown triggered for {}", target.host),
        ),
        Err(e) => reply(PATH, StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct PresetQuery {
    device: Option<String>,
}

async fn preset_on<A: DeviceActions>(
    State(state): State<ControlState<A>>,
    Query(query): Query<PresetQuery>,
) -> Response {
    const PATH: &str = "/preset_on";
    tracing::info!(path = PATH, device = ?query.device, "HTTP request");

    let Some(id) = preset_id(query) else {
        return reply(PATH, StatusCode::BAD_REQUEST, "Missing device parameter".to_string());
    };
    let outcome = state.dispatcher.preset_on(&id).await;
    preset_reply(PATH, "on", &id, &outcome)
}

async fn preset_off<A: DeviceActions>(
    State(state): State<ControlState<A>>,
    Query(query): Query<PresetQuery>,
) -> Response {
    const PATH: &str = "/preset_off";
    tracing::info!(path = PATH, device = ?query.device, "HTTP request");

    let Some(id) = preset_id(query) else {
        return reply(PATH, StatusCode::BAD_REQUEST, "Missing device parameter".to_string());
    };
    let outcome = state.dispatcher.preset_off(&id).await;
    preset_reply(PATH, "off", &id, &outcome)
}

fn preset_id(query: PresetQuery) -> Option<String> {
    query
        .device
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn preset_reply(path: &str, direction: &str, id: &str, outcome: &PresetOutcome) -> Response {
    match outcome {
        PresetOutcome::NotEnabled => reply(
            path,
            StatusCode::BAD_REQUEST,
            format!("Invalid device parameter: {id}"),
        ),
        PresetOutcome::Executed(_) | PresetOutcome::NoAction | PresetOutcome::NotFound => reply(
            path,
            StatusCode::OK,
            format!("Preset executed {direction}: {id}"),
        ),
    }
}

#[derive(Debug, Serialize)]
struct StatusBody<'a> {
    state: SessionState,
    generation: u64,
    topic: &'a str,
}

async fn status<A: DeviceActions>(State(state): State<ControlState<A>>) -> Response {
    let snapshot = *state.session.borrow();
    tracing::info!(path = "/status", state = ?snapshot.state, "HTTP request");
    Json(StatusBody {
        state: snapshot.state,
        generation: snapshot.generation,
        topic: state.dispatcher.topic(),
    })
    .into_response()
}

async fn unknown(uri: Uri) -> Response {
    tracing::info!(path = uri.path(), "HTTP request");
    reply(uri.path(), StatusCode::NOT_FOUND, "Unknown API".to_string())
}
