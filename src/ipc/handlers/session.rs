use super::{required_str, respond, store};
use crate::ipc::types::{AppState, Request};
use crate::store::DirectoryStore;
use crate::views::ViewError;
use serde_json::json;

fn set_user(state: &mut AppState, req: &Request) -> Result<serde_json::Value, ViewError> {
    let user_id = required_str(&req.params, "userId")?;
    let user = {
        let store = store(&state.db, &state.config)?;
        store.user(&user_id)?
    };
    let Some(user) = user else {
        return Err(ViewError::new("not_found", "user not found")
            .with_details(json!({ "userId": user_id })));
    };
    state.reset_views();
    tracing::info!(user_id = %user.id, "session user set");
    let result = json!({ "user": user });
    state.session = Some(user);
    Ok(result)
}

fn get(state: &AppState) -> serde_json::Value {
    json!({
        "user": state.session,
        "selection": {
            "subjectId": state.exam_config.selected().map(|s| s.subject.id.clone()),
            "examId": state.marks.selection().map(|s| s.exam.id.clone()),
            "attainmentSubjectId": state.attainment.current().map(|(id, _)| id.to_string()),
        }
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.setUser" => Some(respond(&req.id, set_user(state, req))),
        "session.get" => Some(respond(&req.id, Ok(get(state)))),
        _ => None,
    }
}
