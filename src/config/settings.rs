use crate::auth::{self, Credentials};
use crate::error::{SyncError, SyncResult};
use chrono_tz::Tz;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_TIMEZONE: &str = "America/Santiago";
pub const DEFAULT_LOG_EVERY: usize = 250;
pub const DEFAULT_LAYOUT_PATH: &str = "config/layout.yaml";

/// Runtime settings read from the environment (optionally seeded from a
/// `.env` file). Values only some commands need are optional here and
/// checked by the `require_*` accessors.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub sheet_id: Option<String>,
    pub sheets_credentials: Option<Credentials>,
    pub firestore_credentials: Option<Credentials>,
    pub firestore_project_id: Option<String>,
    pub firestore_collection: Option<String>,
    pub timezone: Tz,
    pub limit: Option<usize>,
    pub log_every: usize,
    pub layout_path: PathBuf,
}

impl Settings {
    /// Load `env_file` (or `./.env` when present) into the process
    /// environment, then read the settings from it. Relative credential
    /// paths resolve against the directory of the loaded env file.
    pub fn from_env(env_file: Option<&Path>) -> SyncResult<Self> {
        let loaded = match env_file {
            Some(path) => Some(dotenvy::from_path(path).map(|_| path.to_path_buf()).map_err(
                |e| SyncError::Config(format!("Cannot load env file '{}': {}", path.display(), e)),
            )?),
            None => match dotenvy::dotenv() {
                Ok(path) => Some(path),
                Err(e) if e.not_found() => None,
                Err(e) => return Err(SyncError::Config(format!("Cannot load .env: {}", e))),
            },
        };
        let base_dir = loaded
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::from_lookup_in(&base_dir, |key| std::env::var(key).ok())
    }

    /// Read the settings through `lookup` (keeps tests off the process env)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> SyncResult<Self> {
        Self::from_lookup_in(Path::new(""), lookup)
    }

    /// Same as [`Settings::from_lookup`], resolving relative paths from `base_dir`
    pub fn from_lookup_in(
        base_dir: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> SyncResult<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        // a bearer token overrides both key files
        let override_token = get("GOOGLE_ACCESS_TOKEN").map(Credentials::Token);
        let key_file = |key: &str| {
            get(key).map(|raw| Credentials::ServiceAccount(resolve_path(base_dir, &raw)))
        };
        let sheets_credentials = override_token
            .clone()
            .or_else(|| key_file("GOOGLE_SHEETS_CREDENTIALS_PATH"));
        let firestore_credentials = override_token.or_else(|| key_file("FIREBASE_CREDENTIALS_PATH"));

        let timezone_name = get("TIMEZONE").unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let timezone = Tz::from_str(&timezone_name).map_err(|_| {
            SyncError::Config(format!("TIMEZONE: unknown time zone '{}'", timezone_name))
        })?;

        Ok(Self {
            sheet_id: get("GOOGLE_SHEET_ID"),
            sheets_credentials,
            firestore_credentials,
            firestore_project_id: get("FIRESTORE_PROJECT_ID"),
            firestore_collection: get("FIRESTORE_COLLECTION_NAME"),
            timezone,
            limit: parse_number(&get, "LIMIT")?,
            log_every: parse_number(&get, "LOG_EVERY")?.unwrap_or(DEFAULT_LOG_EVERY),
            layout_path: get("LAYOUT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LAYOUT_PATH)),
        })
    }

    pub fn require_sheet_id(&self) -> SyncResult<&str> {
        self.sheet_id
            .as_deref()
            .ok_or_else(|| missing("GOOGLE_SHEET_ID"))
    }

    pub fn require_sheets_credentials(&self) -> SyncResult<&Credentials> {
        self.sheets_credentials
            .as_ref()
            .ok_or_else(|| missing("GOOGLE_SHEETS_CREDENTIALS_PATH (or GOOGLE_ACCESS_TOKEN)"))
    }

    pub fn require_firestore_credentials(&self) -> SyncResult<&Credentials> {
        self.firestore_credentials
            .as_ref()
            .ok_or_else(|| missing("FIREBASE_CREDENTIALS_PATH (or GOOGLE_ACCESS_TOKEN)"))
    }

    /// `(project id, collection name)`; the project defaults to the one
    /// recorded in the Firebase key file
    pub fn require_firestore(&self) -> SyncResult<(String, &str)> {
        let collection = self
            .firestore_collection
            .as_deref()
            .ok_or_else(|| missing("FIRESTORE_COLLECTION_NAME"))?;
        if let Some(project) = &self.firestore_project_id {
            return Ok((project.clone(), collection));
        }
        let from_key = match &self.firestore_credentials {
            Some(Credentials::ServiceAccount(path)) => auth::service_account_project(path)?,
            _ => None,
        };
        let project = from_key.ok_or_else(|| missing("FIRESTORE_PROJECT_ID"))?;
        Ok((project, collection))
    }
}

/// Absolute paths are kept; relative ones are joined onto `base_dir`
fn resolve_path(base_dir: &Path, raw: &str) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn missing(name: &str) -> SyncError {
    SyncError::Config(format!("{} is not set", name))
}

fn parse_number(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> SyncResult<Option<usize>> {
    match get(key) {
        None => Ok(None),
        Some(raw) => raw.parse::<usize>().map(Some).map_err(|_| {
            SyncError::Config(format!("{}: expected a non-negative integer, got '{}'", key, raw))
        }),
    }
}
