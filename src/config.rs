use std::env;
use std::path::PathBuf;

use directories::ProjectDirs;

use crate::error::{AppError, AppResult};

pub const DB_PATH_VAR: &str = "CLIPSHELF_DB_PATH";
pub const DEFAULT_COLLECTION_VAR: &str = "CLIPSHELF_DEFAULT_COLLECTION";
pub const LOG_FILTER_VAR: &str = "CLIPSHELF_LOG";

const DB_FILE_NAME: &str = "clipshelf.sqlite3";
const FALLBACK_COLLECTION: &str = "default";

/// Runtime settings supplied by the host process through the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    /// Used when a request names no collection; hidden from collection listings.
    pub default_collection: String,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let db_path = match non_blank(DB_PATH_VAR) {
            Some(path) => PathBuf::from(path),
            None => ProjectDirs::from("", "", "clipshelf")
                .map(|dirs| dirs.data_dir().join(DB_FILE_NAME))
                .ok_or_else(|| {
                    AppError::Config(format!(
                        "no data directory available; set {DB_PATH_VAR}"
                    ))
                })?,
        };

        let default_collection = non_blank(DEFAULT_COLLECTION_VAR)
            .map(|name| name.trim().to_string())
            .unwrap_or_else(|| FALLBACK_COLLECTION.to_string());

        Ok(Self {
            db_path,
            default_collection,
        })
    }
}
