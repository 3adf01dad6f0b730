use std::path::PathBuf;

use serde::Deserialize;

use crate::clock::{Clock, SystemClock};
use crate::model::Actor;
use crate::store::SqliteStore;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    /// Authenticated caller, filled in by the host. Absent for public methods.
    #[serde(default)]
    pub actor: Option<Actor>,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub store: Option<SqliteStore>,
    pub clock: Box<dyn Clock>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            store: None,
            clock: Box::new(SystemClock),
        }
    }
}
