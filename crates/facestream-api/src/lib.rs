pub mod handlers;

use std::net::SocketAddr;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

/// Path prefix of the streaming endpoint; the peer's user id follows it.
pub const STREAM_PATH: &str = "/face-detection";

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new().route(
        &format!("{STREAM_PATH}/{{user_id}}"),
        get(handlers::handle_stream),
    );

    if state.api_enabled {
        let api_routes = Router::new()
            .route("/status", get(handlers::handle_status))
            .route(
                "/sessions/{peer}",
                get(handlers::handle_session_inspect).delete(handlers::handle_session_drop),
            );
        app = app.nest("/api", api_routes);
    }

    app.with_state(state).layer(cors)
}

/// Bind `addr` and serve until the future is dropped.
pub async fn serve(state: ApiState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_listener(listener, state).await
}

/// Serve on an already bound listener.
pub async fn serve_listener(listener: TcpListener, state: ApiState) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, api = state.api_enabled, "listening for frame streams");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
