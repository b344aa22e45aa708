use super::{required_str, respond, session_user, store, string_list};
use crate::calc::parse_marks_query;
use crate::ipc::types::{AppState, Request};
use crate::views::marks_entry::PreviewStatus;
use crate::views::ViewError;
use serde_json::json;
use std::path::PathBuf;

fn select_exam(state: &mut AppState, req: &Request) -> Result<serde_json::Value, ViewError> {
    let s = store(&state.db, &state.config)?;
    let owner = session_user(&state.session)?;
    let exam_id = required_str(&req.params, "examId")?;
    let exam = state.exam_config.get(&s, &owner, &exam_id)?;
    let sel = state.marks.select_exam(&s, exam)?;
    Ok(json!({
        "exam": sel.exam,
        "students": sel.roster,
        "recordCount": sel.records.len(),
    }))
}

/// Every draft operation needs both a session and a selected exam.
fn require_session(state: &AppState) -> Result<(), ViewError> {
    session_user(&state.session).map(|_| ())
}

fn set_score(state: &mut AppState, req: &Request) -> Result<serde_json::Value, ViewError> {
    require_session(state)?;
    let student_id = required_str(&req.params, "studentId")?;
    let question_id = required_str(&req.params, "questionId")?;
    let score = match req.params.get("score") {
        None => return Err(ViewError::new("bad_params", "missing score")),
        Some(v) if v.is_null() => None,
        Some(v) => Some(
            v.as_f64()
                .ok_or_else(|| ViewError::new("bad_params", "score must be a number or null"))?,
        ),
    };
    let row = state.marks.set_score(&student_id, &question_id, score)?;
    Ok(json!({ "row": row }))
}

fn bulk_fill(state: &mut AppState, req: &Request) -> Result<serde_json::Value, ViewError> {
    require_session(state)?;
    let student_ids = string_list(&req.params, "studentIds")?;
    let value = req
        .params
        .get("value")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| ViewError::new("bad_params", "value must be a number"))?;
    let updated = state.marks.bulk_fill(&student_ids, value)?;
    Ok(json!({ "updated": updated }))
}

fn bulk_clear(state: &mut AppState, req: &Request) -> Result<serde_json::Value, ViewError> {
    require_session(state)?;
    let student_ids = string_list(&req.params, "studentIds")?;
    let updated = state.marks.bulk_clear(&student_ids)?;
    Ok(json!({ "updated": updated }))
}

fn view(state: &mut AppState, req: &Request) -> Result<serde_json::Value, ViewError> {
    require_session(state)?;
    let query = parse_marks_query(&req.params)?;
    let rows = state.marks.rows(&query)?;
    let stats = state.marks.stats(state.config.pass_fraction)?;
    let dirty = state.marks.selection().map(|s| s.dirty).unwrap_or(false);
    Ok(json!({ "rows": rows, "stats": stats, "dirty": dirty }))
}

fn stats(state: &mut AppState) -> Result<serde_json::Value, ViewError> {
    require_session(state)?;
    let stats = state.marks.stats(state.config.pass_fraction)?;
    Ok(json!({ "stats": stats }))
}

fn save(state: &mut AppState) -> Result<serde_json::Value, ViewError> {
    let s = store(&state.db, &state.config)?;
    session_user(&state.session)?;
    let saved = state.marks.save(&s)?;
    Ok(json!({ "saved": saved }))
}

fn import_preview(state: &mut AppState, req: &Request) -> Result<serde_json::Value, ViewError> {
    require_session(state)?;
    let path = PathBuf::from(required_str(&req.params, "path")?);
    let preview = state.marks.import_preview(&path)?;
    let matched = preview
        .rows
        .iter()
        .filter(|r| r.status == PreviewStatus::Matched)
        .count();
    Ok(json!({
        "previewId": preview.preview_id,
        "examId": preview.exam_id,
        "header": preview.header,
        "matchedColumns": preview.matched_columns,
        "ignoredColumns": preview.ignored_columns,
        "matchedRows": matched,
        "unmatchedRows": preview.rows.len() - matched,
        // Large files are truncated in the response only.
        "rows": preview.rows.iter().take(250).collect::<Vec<_>>(),
        "warnings": preview.warnings,
    }))
}

fn import_confirm(state: &mut AppState, req: &Request) -> Result<serde_json::Value, ViewError> {
    require_session(state)?;
    let preview_id = required_str(&req.params, "previewId")?;
    let applied = state.marks.import_confirm(&preview_id)?;
    tracing::info!(applied = applied.applied, skipped = applied.skipped, "marks import applied");
    Ok(json!(applied))
}

fn export(state: &mut AppState, req: &Request) -> Result<serde_json::Value, ViewError> {
    require_session(state)?;
    let path = PathBuf::from(required_str(&req.params, "path")?);
    let query = parse_marks_query(&req.params)?;
    let rows = state.marks.export(&path, &query)?;
    tracing::info!(path = %path.display(), rows, "marks exported");
    Ok(json!({ "path": path.to_string_lossy(), "rows": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "marks.selectExam" => select_exam(state, req),
        "marks.setScore" => set_score(state, req),
        "marks.bulkFill" => bulk_fill(state, req),
        "marks.bulkClear" => bulk_clear(state, req),
        "marks.view" => view(state, req),
        "marks.stats" => stats(state),
        "marks.save" => save(state),
        "marks.importPreview" => import_preview(state, req),
        "marks.importConfirm" => import_confirm(state, req),
        "marks.export" => export(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
