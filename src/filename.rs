use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

pub const FALLBACK_NAME: &str = "video";

const MAX_NAME_CHARS: usize = 100;

// everything outside the ascii word/space/dot/dash set becomes `_`
static ASCII_UNSAFE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"[^A-Za-z0-9_\s.-]").unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
// characters most filesystems refuse, plus control characters
static FILESYSTEM_RESERVED: Lazy<Regex> =
  Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).unwrap());

// the download filename in two encodings: a plain-ascii fallback for the
// `filename` parameter and a utf-8 variant for rfc 5987 `filename*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenamePair {
  pub ascii: String,
  pub utf8: String,
}

impl FilenamePair {
  pub fn from_title(title: &str) -> Self {
    Self {
      ascii: ascii_name(title),
      utf8: utf8_name(title),
    }
  }

  pub fn content_disposition(&self, ext: &str) -> String {
    format!(
      "attachment; filename=\"{}.{}\"; filename*=UTF-8''{}.{}",
      self.ascii,
      ext,
      urlencoding::encode(&self.utf8),
      ext
    )
  }
}

fn ascii_name(title: &str) -> String {
  let normalized: String = title.nfkd().collect();
  let replaced = ASCII_UNSAFE.replace_all(&normalized, "_");
  let collapsed = WHITESPACE_RUN.replace_all(&replaced, "_");
  let truncated: String =
    collapsed.trim().chars().take(MAX_NAME_CHARS).collect();
  // leading dots would produce hidden files on unix
  let stripped = truncated.trim_start_matches('.');

  if stripped.chars().all(|c| c == '_') {
    FALLBACK_NAME.to_string()
  } else {
    stripped.to_string()
  }
}

fn utf8_name(title: &str) -> String {
  let replaced = FILESYSTEM_RESERVED.replace_all(title, "_");
  let truncated: String = replaced.trim().chars().take(MAX_NAME_CHARS).collect();

  if truncated.chars().all(|c| c == '_') {
    FALLBACK_NAME.to_string()
  } else {
    truncated
  }
}
