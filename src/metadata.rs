use async_trait::async_trait;
use http_types::Url;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::{Error, Result, YTDLP_SLOTS};

// metadata shape reported by the extraction tool. the fields vary a lot
// between sites and tool versions, so everything is optional.
#[derive(Debug, Default, Deserialize)]
pub struct VideoInfo {
  #[serde(default)]
  pub title: Option<String>,
  #[serde(default)]
  pub formats: Vec<Format>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Format {
  #[serde(default)]
  pub format_id: Option<String>,
  #[serde(default)]
  pub ext: Option<String>,
  #[serde(default)]
  pub vcodec: Option<String>,
  #[serde(default)]
  pub acodec: Option<String>,
  #[serde(default)]
  pub resolution: Option<String>,
  #[serde(default)]
  pub filesize: Option<u64>,
  #[serde(default)]
  pub fps: Option<f64>,
}

impl Format {
  // vertical resolution parsed out of "WxH", 0 when unknown
  pub fn height(&self) -> u32 {
    self
      .resolution
      .as_deref()
      .and_then(|r| r.split('x').nth(1))
      .and_then(|h| h.parse().ok())
      .unwrap_or(0)
  }

  pub fn has_stream(&self) -> bool {
    self.vcodec.as_deref() != Some("none")
      || self.acodec.as_deref() != Some("none")
  }

  pub fn is_mp4_video(&self) -> bool {
    self.ext.as_deref() == Some("mp4") && self.vcodec.as_deref() != Some("none")
  }
}

#[async_trait]
pub trait Describe {
  async fn describe(&self, url: &Url) -> Result<VideoInfo>;
}

// run yt-dlp command line in metadata-only mode.
// requires yt-dlp executable to be in PATH.
pub struct Ytdlp;

#[async_trait]
impl Describe for Ytdlp {
  async fn describe(&self, url: &Url) -> Result<VideoInfo> {
    let guard = YTDLP_SLOTS.acquire().await;
    let output = Command::new("yt-dlp")
      .arg("--no-warnings")
      .arg("--compat-options")
      .arg("no-youtube-unavailable-videos")
      .arg("--dump-json")
      .arg(url.as_str())
      .kill_on_drop(true)
      .output()
      .await?;
    drop(guard);

    if !output.status.success() {
      return Err(Error::Metadata(stderr_tail(&output.stderr)));
    }

    Ok(serde_json::from_slice(&output.stdout)?)
  }
}

impl Ytdlp {
  // resolve direct media urls for a format selector. separate video and
  // audio streams come back as one url per line.
  pub async fn resolve_urls(
    &self,
    url: &Url,
    format: &str,
  ) -> Result<Vec<String>> {
    let guard = YTDLP_SLOTS.acquire().await;
    let output = Command::new("yt-dlp")
      .arg("--no-warnings")
      .arg("--get-url")
      .arg("-f")
      .arg(format)
      .arg(url.as_str())
      .kill_on_drop(true)
      .output()
      .await?;
    drop(guard);

    if !output.status.success() {
      return Err(Error::Metadata(stderr_tail(&output.stderr)));
    }

    let urls = String::from_utf8_lossy(&output.stdout)
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty())
      .map(str::to_string)
      .collect();

    Ok(urls)
  }
}

fn stderr_tail(stderr: &[u8]) -> String {
  let text = String::from_utf8_lossy(stderr);
  text
    .lines()
    .rev()
    .find(|line| !line.trim().is_empty())
    .unwrap_or("yt-dlp reported no error output")
    .to_string()
}
