//! Story feed and engagement service.
//!
//! Serves a paginated feed of multi-page stories and tracks per-user likes
//! while keeping the denormalized like counter consistent under concurrent
//! toggles.
//!
//! # Architecture
//!
//! - [`feed`] composes story metadata with ordered pages; strictly read-only.
//! - [`ledger`] owns the per-user like relation, the single source of truth
//!   for "user X likes story Y".
//! - [`guard`] couples every effective relation change to one atomic counter
//!   adjustment, with bounded retries and drift logging when the store
//!   misbehaves.
//! - [`client`] is the session-side optimistic mirror used by frontends:
//!   toggles apply locally first and reconcile with the server response.
//!
//! Requests are handled statelessly; there is no cross-request in-process
//! lock. Correctness of concurrent toggles rests entirely on the storage
//! layer's atomic delta-apply (see [`store::Storage::adjust_likes`]).
//!
//! # Storage backends
//!
//! `STORYFEED_STORE=memory` (default) keeps everything in process, which the
//! test suite relies on. `STORYFEED_STORE=redis` uses the layout described in
//! [`database`], with `INCRBY` as the counter primitive.
//!
//! # Identity
//!
//! An upstream auth collaborator attaches the validated user id to requests
//! as the `x-user-id` header; like routes reject requests without it. No
//! session validation happens here.

use std::{sync::Arc, time::Duration};

use axum::{
    http::{header::CONTENT_TYPE, HeaderName, Method},
    routing::{delete, get, post},
    Router,
};

use signal::{
    ctrl_c,
    unix::{signal, SignalKind},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub mod client;
pub mod config;
pub mod database;
pub mod error;
pub mod feed;
pub mod guard;
pub mod ledger;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;

use config::Config;
use routes::{
    like_handler, my_likes_handler, recent_pages_handler, stories_handler, story_handler,
    today_handler, unlike_handler, USER_ID_HEADER,
};
use state::AppState;

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let config = Config::load();
    let state = AppState::new(config)
        .await
        .expect("Storage backend misconfigured!");

    info!("Starting server...");

    let app = router(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static(USER_ID_HEADER)])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/stories", post(stories_handler))
        .route("/stories/today", get(today_handler))
        .route("/stories/{id}", get(story_handler))
        .route("/stories/{id}/pages/recent", get(recent_pages_handler))
        .route("/likes", post(like_handler).get(my_likes_handler))
        .route("/likes/{id}", delete(unlike_handler))
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
