use axum::{
  body::StreamBody,
  extract::Query,
  http::{header, Response, StatusCode},
  response::IntoResponse,
};
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use tokio::sync::oneshot;
use tracing::info;

use crate::bridge::{self, BridgeStream};
use crate::filename::FilenamePair;
use crate::metadata::Ytdlp;
use crate::producer::Producer;
use crate::session::{self, StreamSession};
use crate::{locator, title, Result};

// "best available" selector understood by yt-dlp
const DEFAULT_FORMAT: &str = "best";

type BodyStream = BoxStream<'static, Result<Bytes>>;

#[derive(Deserialize)]
pub struct DownloadReq {
  url: String,
  format: Option<String>,
}

#[axum::debug_handler]
pub async fn download_video(
  Query(req): Query<DownloadReq>,
) -> Result<impl IntoResponse> {
  let url = locator::validate(&req.url)?;
  let format = req.format.as_deref().unwrap_or(DEFAULT_FORMAT);

  let video_title = title::resolve(&Ytdlp, &url).await;
  let names = FilenamePair::from_title(&video_title);
  info!("streaming {url} as {} (format {format})", names.ascii);

  let producer = Producer::spawn(&url, format).await?;
  let body = stream_body(producer).await?;

  let resp = Response::builder()
    .status(StatusCode::OK)
    .header(header::CONTENT_TYPE, "video/mp4")
    .header(header::CONTENT_DISPOSITION, names.content_disposition("mp4"))
    .header(header::CACHE_CONTROL, "no-store, no-cache, must-revalidate")
    .body(body)?;

  Ok(resp)
}

// wire the producer to a response body. the first item is awaited before the
// response commits, so a producer that dies without output surfaces as a
// plain 500 instead of an aborted 200.
async fn stream_body(mut producer: Producer) -> Result<StreamBody<BodyStream>> {
  let stdout = producer.take_stdout();
  let stderr = producer.take_stderr();
  bridge::spawn_stderr_logger(stderr);

  let session = StreamSession::new();
  let (exit_tx, exit_rx) = oneshot::channel();
  session::spawn_monitor(session.clone(), producer, exit_tx);

  let mut stream = BridgeStream::new(session, stdout, exit_rx);
  let first = stream.next().await;

  let stream: BodyStream = match first {
    None => stream::empty().boxed(),
    Some(Err(e)) => return Err(e),
    Some(Ok(first)) => stream::iter([Ok(first)]).chain(stream).boxed(),
  };

  Ok(StreamBody::new(stream))
}
