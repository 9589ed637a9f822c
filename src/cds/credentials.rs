//! Archive URL and API key lookup.
//!
//! Resolved the same way as the reference `cdsapi` client: `CDSAPI_URL` and `CDSAPI_KEY`
//! from the environment, with anything missing read from the rc file named by `CDSAPI_RC`
//! (default `~/.cdsapirc`). The rc file holds `url: ...` and `key: ...` lines.

use std::{env, fs, path::PathBuf};

use anyhow::{anyhow, Context, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub url: String,
    pub key: String,
}

impl Credentials {
    pub fn from_environment() -> Result<Self> {
        let url = env::var("CDSAPI_URL").ok();
        let key = env::var("CDSAPI_KEY").ok();
        if let (Some(url), Some(key)) = (&url, &key) {
            return Credentials::resolve(Some(url.clone()), Some(key.clone()), None);
        }

        let rc_path = rc_path().ok_or_else(|| anyhow!("Could not locate home directory"))?;
        let rc = if rc_path.exists() {
            Some(
                fs::read_to_string(&rc_path)
                    .with_context(|| format!("Failed to read `{}`", rc_path.display()))?,
            )
        } else {
            None
        };

        Credentials::resolve(url, key, rc.as_deref())
            .with_context(|| format!("Set CDSAPI_URL and CDSAPI_KEY or create `{}`", rc_path.display()))
    }

    /// Environment values win over the rc file.
    pub fn resolve(url: Option<String>, key: Option<String>, rc: Option<&str>) -> Result<Self> {
        let (rc_url, rc_key) = rc.map(parse_rc).unwrap_or_default();

        let url = url
            .or(rc_url)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| anyhow!("Missing archive URL"))?;
        let key = key
            .or(rc_key)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow!("Missing API key"))?;

        Ok(Credentials {
            url: url.trim_end_matches('/').to_string(),
            key,
        })
    }
}

fn rc_path() -> Option<PathBuf> {
    match env::var("CDSAPI_RC") {
        Ok(path) => Some(PathBuf::from(path)),
        Err(_) => dirs::home_dir().map(|home| home.join(".cdsapirc")),
    }
}

fn parse_rc(text: &str) -> (Option<String>, Option<String>) {
    let mut url = None;
    let mut key = None;

    for line in text.lines() {
        if let Some((name, value)) = line.split_once(':') {
            let value = value.trim().to_string();
            match name.trim() {
                "url" => url = Some(value),
                "key" => key = Some(value),
                _ => {}
            }
        }
    }

    (url, key)
}

// -- Tests -------------------------------------------------------------------
