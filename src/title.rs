use std::time::Duration;

use http_types::Url;
use tracing::warn;

use crate::metadata::Describe;

pub const FALLBACK_TITLE: &str = "video";

// upper bound on the metadata call; the download proceeds with the fallback
// title when this expires
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(15);

// never fails: any resolution problem degrades to the fallback title so the
// download itself still goes ahead
pub async fn resolve<D: Describe>(describer: &D, url: &Url) -> String {
  let resolved =
    tokio::time::timeout(RESOLVE_TIMEOUT, describer.describe(url)).await;

  match resolved {
    Ok(Ok(info)) => match info.title {
      Some(title) if !title.trim().is_empty() => title,
      _ => {
        warn!("no title in metadata for {url}, using fallback");
        FALLBACK_TITLE.to_string()
      }
    },
    Ok(Err(e)) => {
      warn!("title resolution for {url} failed: {e}");
      FALLBACK_TITLE.to_string()
    }
    Err(_) => {
      warn!("title resolution for {url} timed out");
      FALLBACK_TITLE.to_string()
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::metadata::VideoInfo;
  use crate::{Error, Result};
  use async_trait::async_trait;

  struct Fixed(&'static str);
  struct Blank;
  struct Failing;
  struct Garbled;
  struct Hanging;

  #[async_trait]
  impl Describe for Fixed {
    async fn describe(&self, _url: &Url) -> Result<VideoInfo> {
      Ok(VideoInfo {
        title: Some(self.0.to_string()),
        ..Default::default()
      })
    }
  }

  #[async_trait]
  impl Describe for Blank {
    async fn describe(&self, _url: &Url) -> Result<VideoInfo> {
      Ok(VideoInfo {
        title: Some("   ".to_string()),
        ..Default::default()
      })
    }
  }

  #[async_trait]
  impl Describe for Failing {
    async fn describe(&self, _url: &Url) -> Result<VideoInfo> {
      Err(Error::Metadata("ERROR: video unavailable".to_string()))
    }
  }

  #[async_trait]
  impl Describe for Garbled {
    async fn describe(&self, _url: &Url) -> Result<VideoInfo> {
      Ok(serde_json::from_str("not json at all")?)
    }
  }

  #[async_trait]
  impl Describe for Hanging {
    async fn describe(&self, _url: &Url) -> Result<VideoInfo> {
      futures::future::pending().await
    }
  }

  fn url() -> Url {
    "https://youtu.be/abc123".parse().unwrap()
  }

  #[tokio::test]
  async fn test_title_passes_through() {
    assert_eq!(resolve(&Fixed("some title"), &url()).await, "some title");
  }

  #[tokio::test]
  async fn test_failure_falls_back() {
    assert_eq!(resolve(&Failing, &url()).await, FALLBACK_TITLE);
  }

  #[tokio::test]
  async fn test_malformed_metadata_falls_back() {
    assert_eq!(resolve(&Garbled, &url()).await, FALLBACK_TITLE);
  }

  #[tokio::test]
  async fn test_missing_and_blank_titles_fall_back() {
    let missing = Fixed("");
    assert_eq!(resolve(&missing, &url()).await, FALLBACK_TITLE);
    assert_eq!(resolve(&Blank, &url()).await, FALLBACK_TITLE);
  }

  #[tokio::test(start_paused = true)]
  async fn test_timeout_falls_back() {
    assert_eq!(resolve(&Hanging, &url()).await, FALLBACK_TITLE);
  }
}
