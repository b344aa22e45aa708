use super::{optional_str, required_str, respond, session_user, store};
use crate::ipc::types::{AppState, Request};
use crate::model::ExamType;
use crate::views::attainment::Variant;
use crate::views::ViewError;
use serde_json::json;

fn parse_variant(raw: &str) -> Result<Variant, ViewError> {
    Variant::parse(raw)
        .ok_or_else(|| ViewError::new("bad_params", "variant must be one of: basic, advanced"))
}

fn select(state: &mut AppState, req: &Request) -> Result<serde_json::Value, ViewError> {
    let s = store(&state.db, &state.config)?;
    let owner = session_user(&state.session)?;
    let subject_id = required_str(&req.params, "subjectId")?;
    let exam_type = match optional_str(&req.params, "examType") {
        None => None,
        Some(t) if t.eq_ignore_ascii_case("all") => None,
        Some(t) => Some(ExamType::parse(&t).ok_or_else(|| {
            ViewError::new("bad_params", format!("unknown exam type: {t}"))
        })?),
    };
    let variant = optional_str(&req.params, "variant")
        .map(|v| parse_variant(&v))
        .transpose()?;

    match state
        .attainment
        .select(&s, &owner, &subject_id, exam_type, variant)?
    {
        Some(summary) => Ok(json!({ "cleared": false, "summary": summary })),
        None => Ok(json!({ "cleared": true, "subjectId": subject_id })),
    }
}

fn set_variant(state: &mut AppState, req: &Request) -> Result<serde_json::Value, ViewError> {
    session_user(&state.session)?;
    let variant = parse_variant(&required_str(&req.params, "variant")?)?;
    let summary = state.attainment.set_variant(variant);
    Ok(json!({ "variant": variant.as_str(), "summary": summary }))
}

fn clear(state: &mut AppState) -> Result<serde_json::Value, ViewError> {
    session_user(&state.session)?;
    state.attainment.clear();
    Ok(json!({ "cleared": true, "variant": state.attainment.variant().as_str() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "attainment.select" => select(state, req),
        "attainment.setVariant" => set_variant(state, req),
        "attainment.clear" => clear(state),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
