use axum::{
  headers::ContentType, response::IntoResponse, routing::get, Router,
  TypedHeader,
};

mod bridge;
mod download;
mod error;
mod filename;
mod formats;
mod locator;
mod metadata;
mod producer;
mod session;
mod title;
mod util;

pub use error::{Error, Result};
pub use util::YTDLP_SLOTS;

pub const LISTEN_ADDR: &str = "0.0.0.0:8080";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let app = Router::new()
    .route("/", get(homepage))
    .route("/health", get(health))
    .route("/api/formats", get(formats::list_formats))
    .route("/api/extract", get(formats::extract_urls))
    .route("/api/download", get(download::download_video));

  tracing::info!("listening on {LISTEN_ADDR}");

  axum::Server::bind(&LISTEN_ADDR.parse().expect("hard-coded addr is valid"))
    .serve(app.into_make_service())
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("failed to start server");

  Ok(())
}

async fn shutdown_signal() {
  tokio::signal::ctrl_c()
    .await
    .expect("failed to install ctrl-c handler");
}

pub const HOMEPAGE_HTML: &str = include_str!("../html/homepage.html");

async fn homepage() -> impl IntoResponse {
  (
    TypedHeader::<ContentType>(ContentType::html()),
    HOMEPAGE_HTML,
  )
}

async fn health() -> impl IntoResponse {
  "ok".to_owned()
}
