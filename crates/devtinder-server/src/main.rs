use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use devtinder_api::auth::{self, AppState, AppStateInner};
use devtinder_api::connections;
use devtinder_api::messages;
use devtinder_api::middleware::require_auth;
use devtinder_gateway::connection;
use devtinder_gateway::dispatcher::Dispatcher;

#[derive(Clone)]
struct ServerState {
    dispatcher: Dispatcher,
    db: Arc<devtinder_db::Database>,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "devtinder=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("DEVTINDER_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("DEVTINDER_DB_PATH").unwrap_or_else(|_| "devtinder.db".into());
    let host = std::env::var("DEVTINDER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("DEVTINDER_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = Arc::new(devtinder_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let dispatcher = Dispatcher::new();
    let app_state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        jwt_secret: jwt_secret.clone(),
        dispatcher: dispatcher.clone(),
    });

    let state = ServerState {
        dispatcher,
        db,
        jwt_secret,
    };

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route(
            "/connections/request/{user_id}",
            post(connections::request_connection),
        )
        .route(
            "/connections/accept/{user_id}",
            post(connections::accept_connection),
        )
        .route(
            "/connections/reject/{user_id}",
            post(connections::reject_connection),
        )
        .route("/connections/requests", get(connections::get_requests))
        .route(
            "/connections/requests/sent",
            get(connections::get_sent_requests),
        )
        .route("/connections", get(connections::get_connections))
        .route(
            "/connections/{user_id}",
            delete(connections::remove_connection),
        )
        .route("/messages/unread/count", get(messages::unread_count))
        .route("/messages/{user_id}", get(messages::get_messages))
        .route("/messages/{user_id}", post(messages::send_message))
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("DevTinder server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<ServerState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, state.db, state.jwt_secret)
    })
}
