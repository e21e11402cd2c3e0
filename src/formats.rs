use std::cmp::Reverse;
use std::time::Duration;

use axum::{extract::Query, Json};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::metadata::{Describe, Format, VideoInfo, Ytdlp};
use crate::{locator, Error, Result};

// bound on the metadata subprocess for both endpoints here
const DESCRIBE_TIMEOUT: Duration = Duration::from_secs(30);

// selector tried first by the extract endpoint
const EXTRACT_DEFAULT_FORMAT: &str =
  "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best";

#[derive(Deserialize)]
pub struct FormatsReq {
  url: String,
}

#[derive(Serialize)]
pub struct FormatsResp {
  formats: Vec<Format>,
}

pub async fn list_formats(
  Query(req): Query<FormatsReq>,
) -> Result<Json<FormatsResp>> {
  let url = locator::validate(&req.url)?;
  let info = describe_bounded(&url).await?;

  Ok(Json(FormatsResp {
    formats: playable_formats(info.formats),
  }))
}

// browser-playable container with at least one usable stream, best first
fn playable_formats(formats: Vec<Format>) -> Vec<Format> {
  formats
    .into_iter()
    .filter(Format::has_stream)
    .filter(|f| matches!(f.ext.as_deref(), Some("mp4") | Some("webm")))
    .sorted_by_key(|f| Reverse(f.height()))
    .collect()
}

#[derive(Deserialize)]
pub struct ExtractReq {
  url: String,
  format: Option<String>,
}

#[derive(Serialize)]
pub struct ExtractResp {
  urls: Vec<String>,
  format: String,
  note: String,
  formats: Vec<Format>,
}

pub async fn extract_urls(
  Query(req): Query<ExtractReq>,
) -> Result<Json<ExtractResp>> {
  let url = locator::validate(&req.url)?;
  let format = req.format.as_deref().unwrap_or(EXTRACT_DEFAULT_FORMAT);

  let info = describe_bounded(&url).await?;
  let mp4_formats: Vec<Format> =
    info.formats.into_iter().filter(Format::is_mp4_video).collect();

  // nothing the selector could pick from; hand out whatever is best
  if mp4_formats.is_empty() {
    let urls = Ytdlp.resolve_urls(&url, "best").await?;
    return Ok(Json(ExtractResp {
      urls,
      format: "best".to_string(),
      note: "No MP4 available, using best format".to_string(),
      formats: Vec::new(),
    }));
  }

  let urls = Ytdlp.resolve_urls(&url, format).await?;
  let note = if urls.len() > 1 {
    "Video and audio separate"
  } else {
    "Single stream"
  };

  Ok(Json(ExtractResp {
    urls,
    format: format.to_string(),
    note: note.to_string(),
    formats: mp4_formats,
  }))
}

async fn describe_bounded(url: &http_types::Url) -> Result<VideoInfo> {
  tokio::time::timeout(DESCRIBE_TIMEOUT, Ytdlp.describe(url))
    .await
    .map_err(|_| Error::Metadata("metadata fetch timed out".to_string()))?
}

#[cfg(test)]
mod test {
  use super::*;

  fn format(ext: &str, vcodec: &str, acodec: &str, resolution: &str) -> Format {
    Format {
      format_id: Some(format!("{ext}-{resolution}")),
      ext: Some(ext.to_string()),
      vcodec: Some(vcodec.to_string()),
      acodec: Some(acodec.to_string()),
      resolution: Some(resolution.to_string()),
      ..Default::default()
    }
  }

  #[test]
  fn test_playable_formats_filter_and_order() {
    let formats = vec![
      format("mp4", "avc1", "mp4a", "640x360"),
      format("mhtml", "none", "none", "48x27"),
      format("webm", "vp9", "none", "1920x1080"),
      format("m4a", "none", "mp4a", "audio only"),
      format("mp4", "avc1", "none", "1280x720"),
    ];

    let listed = playable_formats(formats);
    let heights: Vec<u32> = listed.iter().map(Format::height).collect();
    assert_eq!(heights, vec![1080, 720, 360]);
    // storyboard (no streams) and non-browser containers are gone
    assert!(listed
      .iter()
      .all(|f| matches!(f.ext.as_deref(), Some("mp4") | Some("webm"))));
  }

  #[test]
  fn test_playable_formats_keeps_audio_only_mp4() {
    // audio-only mp4 still has a usable stream and stays listed
    let formats = vec![format("mp4", "none", "mp4a", "audio only")];
    assert_eq!(playable_formats(formats).len(), 1);
  }
}
