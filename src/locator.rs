use http_types::Url;

use crate::{Error, Result};

// accepted video sites. subdomains (www, m, music) match by suffix.
const ACCEPTED_DOMAINS: &[&str] = &["youtube.com", "youtu.be"];

// reject anything that is not an http(s) url on a whitelisted host. no
// network access happens here.
pub fn validate(raw: &str) -> Result<Url> {
  if raw.trim().is_empty() {
    return Err(Error::UnsupportedURL(raw.into(), "empty url"));
  }

  let url: Url = raw
    .parse()
    .map_err(|_| Error::UnsupportedURL(raw.into(), "malformed url"))?;

  if !matches!(url.scheme(), "http" | "https") {
    return Err(Error::UnsupportedURL(raw.into(), "not an http(s) url"));
  }

  let host = url
    .host_str()
    .ok_or_else(|| Error::UnsupportedURL(raw.into(), "missing host"))?
    .to_lowercase();

  let accepted = ACCEPTED_DOMAINS
    .iter()
    .any(|d| host == *d || host.ends_with(&format!(".{d}")));

  if !accepted {
    return Err(Error::UnsupportedURL(raw.into(), "not a youtube url"));
  }

  Ok(url)
}
