use std::{env, fs, path::Path};

use crate::{domain::GroupId, errors::Error, Result};

/// Typed server configuration, read from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    pub service_name: String,
    pub log_json: bool,

    /// Reject requests whose parameter fails to decode or validate instead of
    /// handing the handler a best-effort value.
    pub strict_params: bool,

    /// Groups loaded into the registry at startup.
    pub preload_groups: Vec<GroupId>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "gim".to_string(),
            log_json: false,
            strict_params: false,
            preload_groups: Vec::new(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let defaults = Self::default();

        let service_name = env_str("GIM_SERVICE_NAME")
            .and_then(non_empty)
            .unwrap_or(defaults.service_name);
        if service_name.contains(char::is_whitespace) {
            return Err(Error::Config(format!(
                "GIM_SERVICE_NAME must not contain whitespace: {service_name:?}"
            )));
        }

        let log_json = env_bool("GIM_LOG_JSON").unwrap_or(defaults.log_json);
        let strict_params = env_bool("GIM_STRICT_PARAMS").unwrap_or(defaults.strict_params);
        let preload_groups = parse_csv_ids(env_str("GIM_PRELOAD_GROUPS"))?;

        Ok(Self {
            service_name,
            log_json,
            strict_params,
            preload_groups,
        })
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| parse_bool(&s))
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_csv_ids(v: Option<String>) -> Result<Vec<GroupId>> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map(GroupId)
                .map_err(|_| Error::Config(format!("GIM_PRELOAD_GROUPS: bad group id {s:?}")))
        })
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
