use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::sync::SyncOptions;

pub const DEFAULT_API_URL: &str =
  "http://localhost:8080";
pub const DEFAULT_API_PATH: &str =
  "app/v1/todo";
pub const TOKEN_ENV: &str =
  "TASKDECK_TOKEN";
pub const RC_ENV: &str = "TASKDECKRC";

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

/// Where the task API lives.
#[derive(
  Debug, Clone, PartialEq, Eq,
)]
pub struct ApiConfig {
  pub base_url: String,
  pub path:     String
}

impl ApiConfig {
  pub fn new(
    base_url: impl Into<String>,
    path: impl Into<String>
  ) -> Self {
    Self {
      base_url: base_url.into(),
      path:     path.into()
    }
  }

  /// Collection URL, e.g.
  /// `http://host/app/v1/todo`.
  pub fn endpoint(&self) -> String {
    let base =
      self.base_url.trim_end_matches('/');
    let path =
      self.path.trim_matches('/');
    if path.is_empty() {
      base.to_string()
    } else {
      format!("{base}/{path}")
    }
  }
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self::new(
      DEFAULT_API_URL,
      DEFAULT_API_PATH
    )
  }
}

impl Config {
  pub fn defaults() -> Self {
    let mut cfg = Config {
      map:          HashMap::new(),
      loaded_files: vec![]
    };

    for (key, value) in [
      ("api.url", DEFAULT_API_URL),
      ("api.path", DEFAULT_API_PATH),
      ("sync.serialize", "on"),
      (
        "sync.refresh_after_create",
        "off"
      ),
      ("confirm", "on"),
      ("color", "on")
    ] {
      cfg.map.insert(
        key.to_string(),
        value.to_string()
      );
    }

    cfg
  }

  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Self::defaults();

    let rc = resolve_rc_path(
      rc_override
    )?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading taskdeckrc");
      cfg.load_file(&path)?;
    } else {
      warn!(
        "no taskdeckrc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      if key == "api.token" {
        debug!(key = %key, "applying override");
      } else {
        debug!(key = %key, value = %v, "applying override");
      }
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn api(&self) -> ApiConfig {
    ApiConfig::new(
      self
        .get("api.url")
        .unwrap_or_else(|| {
          DEFAULT_API_URL.to_string()
        }),
      self
        .get("api.path")
        .unwrap_or_else(|| {
          DEFAULT_API_PATH.to_string()
        })
    )
  }

  pub fn sync_options(
    &self
  ) -> SyncOptions {
    let defaults =
      SyncOptions::default();
    SyncOptions {
      serialize_per_item: self
        .get_bool("sync.serialize")
        .unwrap_or(
          defaults.serialize_per_item
        ),
      refresh_after_create: self
        .get_bool(
          "sync.refresh_after_create"
        )
        .unwrap_or(
          defaults.refresh_after_create
        )
    }
  }

  /// Token from the command line, then
  /// the environment, then `api.token`.
  pub fn resolve_token(
    &self,
    cli_token: Option<&str>
  ) -> Option<String> {
    [
      cli_token.map(str::to_string),
      std::env::var(TOKEN_ENV).ok(),
      self.get("api.token")
    ]
    .into_iter()
    .flatten()
    .find(|t| !t.trim().is_empty())
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if line.is_empty()
        || line.starts_with('#')
      {
        continue;
      }

      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }

      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if self
          .loaded_files
          .contains(&include_path)
        {
          warn!(include = %include_path.display(), "include cycle; skipping");
        } else if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  let candidate =
    home.join(".taskdeckrc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}
