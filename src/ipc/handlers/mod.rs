pub mod attainment;
pub mod core;
pub mod directory;
pub mod exams;
pub mod marks;
pub mod session;

use crate::attainment::AttainmentParams;
use crate::config::Config;
use crate::ipc::error::ok;
use crate::model::User;
use crate::store::SqliteStore;
use crate::views::ViewError;
use rusqlite::Connection;

fn store<'a>(db: &'a Option<Connection>, config: &Config) -> Result<SqliteStore<'a>, ViewError> {
    let conn = db
        .as_ref()
        .ok_or_else(|| ViewError::new("no_workspace", "select a workspace first"))?;
    Ok(SqliteStore::new(conn).with_attainment(AttainmentParams {
        student_threshold: config.attain_threshold,
        direct_weight: config.direct_weight,
    }))
}

fn session_user(session: &Option<User>) -> Result<User, ViewError> {
    session
        .clone()
        .ok_or_else(|| ViewError::new("no_session", "no current instructor; call session.setUser"))
}

fn required_str(params: &serde_json::Value, key: &str) -> Result<String, ViewError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ViewError::new("bad_params", format!("missing {key}")))
}

fn optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn required_object<'a>(
    params: &'a serde_json::Value,
    key: &str,
) -> Result<&'a serde_json::Map<String, serde_json::Value>, ViewError> {
    params
        .get(key)
        .and_then(|v| v.as_object())
        .ok_or_else(|| ViewError::new("bad_params", format!("{key} must be an object")))
}

fn string_list(params: &serde_json::Value, key: &str) -> Result<Vec<String>, ViewError> {
    let Some(items) = params.get(key).and_then(|v| v.as_array()) else {
        return Err(ViewError::new("bad_params", format!("{key} must be a list of ids")));
    };
    items
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| ViewError::new("bad_params", format!("{key} must be a list of ids")))
        })
        .collect()
}

fn respond(id: &str, result: Result<serde_json::Value, ViewError>) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => e.response(id),
    }
}
