use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("unsupported url ({0}): {1}")]
  UnsupportedURL(String, &'static str),

  #[error("failed to spawn yt-dlp: {0}")]
  ProducerSpawn(#[source] std::io::Error),

  #[error("yt-dlp exited with status {0}")]
  ProducerExit(i32),

  #[error("metadata fetch failed: {0}")]
  Metadata(String),

  #[error(transparent)]
  IO(#[from] std::io::Error),

  #[error(transparent)]
  Json(#[from] serde_json::Error),

  #[error(transparent)]
  Http(#[from] axum::http::Error),
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    match self {
      Error::UnsupportedURL(..) => {
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
      }
      _ => {
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
      }
    }
  }
}
