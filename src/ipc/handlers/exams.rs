use super::{required_object, required_str, respond, session_user, store, string_list};
use crate::calc::parse_exam_query;
use crate::ipc::types::{AppState, Request};
use crate::model::Exam;
use crate::views::ViewError;
use serde_json::json;

fn exam_result(state: &mut AppState, exam: Exam) -> serde_json::Value {
    state.marks.exam_changed(&exam);
    json!({ "exam": exam })
}

fn list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, ViewError> {
    let s = store(&state.db, &state.config)?;
    let owner = session_user(&state.session)?;
    let query = parse_exam_query(&req.params)?;
    let exams = state.exam_config.list(&s, &owner, &query)?;
    Ok(json!({ "exams": exams }))
}

fn get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, ViewError> {
    let s = store(&state.db, &state.config)?;
    let owner = session_user(&state.session)?;
    let exam_id = required_str(&req.params, "examId")?;
    let exam = state.exam_config.get(&s, &owner, &exam_id)?;
    Ok(json!({ "exam": exam }))
}

fn create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, ViewError> {
    let owner = session_user(&state.session)?;
    let raw = req
        .params
        .get("exam")
        .ok_or_else(|| ViewError::new("bad_params", "missing exam"))?;
    let exam = {
        let s = store(&state.db, &state.config)?;
        state.exam_config.create(&s, &owner, raw)?
    };
    Ok(json!({ "exam": exam }))
}

fn update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, ViewError> {
    let owner = session_user(&state.session)?;
    let exam_id = required_str(&req.params, "examId")?;
    let patch = required_object(&req.params, "exam")?;
    let exam = {
        let s = store(&state.db, &state.config)?;
        state.exam_config.update(&s, &owner, &exam_id, patch)?
    };
    Ok(exam_result(state, exam))
}

fn delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, ViewError> {
    let owner = session_user(&state.session)?;
    let exam_id = required_str(&req.params, "examId")?;
    {
        let s = store(&state.db, &state.config)?;
        state.exam_config.delete(&s, &owner, &exam_id)?;
    }
    state.marks.exam_deleted(&exam_id);
    Ok(json!({ "deleted": true, "examId": exam_id }))
}

fn question_add(state: &mut AppState, req: &Request) -> Result<serde_json::Value, ViewError> {
    let owner = session_user(&state.session)?;
    let exam_id = required_str(&req.params, "examId")?;
    let question = req
        .params
        .get("question")
        .filter(|v| v.is_object())
        .ok_or_else(|| ViewError::new("bad_params", "question must be an object"))?;
    let exam = {
        let s = store(&state.db, &state.config)?;
        state.exam_config.add_question(&s, &owner, &exam_id, question)?
    };
    Ok(exam_result(state, exam))
}

fn question_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, ViewError> {
    let owner = session_user(&state.session)?;
    let exam_id = required_str(&req.params, "examId")?;
    let question_id = required_str(&req.params, "questionId")?;
    let patch = required_object(&req.params, "patch")?;
    let exam = {
        let s = store(&state.db, &state.config)?;
        state
            .exam_config
            .update_question(&s, &owner, &exam_id, &question_id, patch)?
    };
    Ok(exam_result(state, exam))
}

fn question_remove(state: &mut AppState, req: &Request) -> Result<serde_json::Value, ViewError> {
    let owner = session_user(&state.session)?;
    let exam_id = required_str(&req.params, "examId")?;
    let question_id = required_str(&req.params, "questionId")?;
    let exam = {
        let s = store(&state.db, &state.config)?;
        state
            .exam_config
            .remove_question(&s, &owner, &exam_id, &question_id)?
    };
    Ok(exam_result(state, exam))
}

fn question_move(state: &mut AppState, req: &Request) -> Result<serde_json::Value, ViewError> {
    let owner = session_user(&state.session)?;
    let exam_id = required_str(&req.params, "examId")?;
    let question_id = required_str(&req.params, "questionId")?;
    let to_index = req
        .params
        .get("toIndex")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| ViewError::new("bad_params", "toIndex must be a non-negative integer"))?
        as usize;
    let exam = {
        let s = store(&state.db, &state.config)?;
        state
            .exam_config
            .move_question(&s, &owner, &exam_id, &question_id, to_index)?
    };
    Ok(exam_result(state, exam))
}

fn select_subject(state: &mut AppState, req: &Request) -> Result<serde_json::Value, ViewError> {
    let s = store(&state.db, &state.config)?;
    let owner = session_user(&state.session)?;
    let subject_id = required_str(&req.params, "subjectId")?;
    let selected = state.exam_config.select_subject(&s, &owner, &subject_id)?;
    Ok(json!({
        "subject": selected.subject,
        "courseOutcomes": selected.course_outcomes,
        "programOutcomes": selected.program_outcomes,
        "suggestions": selected.suggestions,
        "warnings": selected.warnings,
    }))
}

fn suggest_weights(state: &mut AppState, req: &Request) -> Result<serde_json::Value, ViewError> {
    session_user(&state.session)?;
    let co_ids = string_list(&req.params, "coIds")?;
    let suggestions = state.exam_config.suggest_weights(&co_ids)?;
    Ok(json!({ "suggestions": suggestions }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "exams.list" => list(state, req),
        "exams.get" => get(state, req),
        "exams.create" => create(state, req),
        "exams.update" => update(state, req),
        "exams.delete" => delete(state, req),
        "exams.questions.add" => question_add(state, req),
        "exams.questions.update" => question_update(state, req),
        "exams.questions.remove" => question_remove(state, req),
        "exams.questions.move" => question_move(state, req),
        "examConfig.selectSubject" => select_subject(state, req),
        "examConfig.suggestWeights" => suggest_weights(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
