use super::{optional_str, required_str, respond, session_user, store};
use crate::ipc::types::{AppState, Request};
use crate::store::{DirectoryStore, SqliteStore};
use crate::views::ViewError;
use serde_json::json;

fn not_found(what: &str, id: &str) -> ViewError {
    ViewError::new("not_found", format!("{what} not found")).with_details(json!({ "id": id }))
}

fn percent_param(params: &serde_json::Value, key: &str) -> Result<f64, ViewError> {
    match params.get(key).and_then(|v| v.as_f64()) {
        Some(p) if (0.0..=100.0).contains(&p) => Ok(p),
        _ => Err(ViewError::new(
            "bad_params",
            format!("{key} must be a percentage between 0 and 100"),
        )),
    }
}

fn create_department(s: &SqliteStore<'_>, params: &serde_json::Value) -> Result<serde_json::Value, ViewError> {
    let name = required_str(params, "name")?;
    Ok(json!({ "department": s.create_department(&name)? }))
}

fn create_user(s: &SqliteStore<'_>, params: &serde_json::Value) -> Result<serde_json::Value, ViewError> {
    let name = required_str(params, "name")?;
    let department_id = optional_str(params, "departmentId");
    if let Some(d) = department_id.as_deref() {
        if !s.department_exists(d)? {
            return Err(not_found("department", d));
        }
    }
    Ok(json!({ "user": s.create_user(&name, department_id.as_deref())? }))
}

fn create_class(s: &SqliteStore<'_>, params: &serde_json::Value) -> Result<serde_json::Value, ViewError> {
    let name = required_str(params, "name")?;
    Ok(json!({ "class": s.create_class(&name)? }))
}

fn create_student(s: &SqliteStore<'_>, params: &serde_json::Value) -> Result<serde_json::Value, ViewError> {
    let class_id = required_str(params, "classId")?;
    let name = required_str(params, "name")?;
    let roll_no = required_str(params, "rollNo")?;
    if !s.class_exists(&class_id)? {
        return Err(not_found("class", &class_id));
    }
    Ok(json!({ "student": s.create_student(&class_id, &name, &roll_no)? }))
}

fn create_subject(s: &SqliteStore<'_>, params: &serde_json::Value) -> Result<serde_json::Value, ViewError> {
    let code = required_str(params, "code")?;
    let name = required_str(params, "name")?;
    let class_id = required_str(params, "classId")?;
    let department_id = required_str(params, "departmentId")?;
    let instructor_id = required_str(params, "instructorId")?;
    if !s.class_exists(&class_id)? {
        return Err(not_found("class", &class_id));
    }
    if !s.department_exists(&department_id)? {
        return Err(not_found("department", &department_id));
    }
    if s.user(&instructor_id)?.is_none() {
        return Err(not_found("user", &instructor_id));
    }
    let subject = s.create_subject(&code, &name, &class_id, &department_id, &instructor_id)?;
    Ok(json!({ "subject": subject }))
}

fn create_co(s: &SqliteStore<'_>, params: &serde_json::Value) -> Result<serde_json::Value, ViewError> {
    let subject_id = required_str(params, "subjectId")?;
    let code = required_str(params, "code")?;
    let description = optional_str(params, "description").unwrap_or_default();
    let target = percent_param(params, "targetPercent")?;
    if s.subject(&subject_id)?.is_none() {
        return Err(not_found("subject", &subject_id));
    }
    let co = s.create_course_outcome(&subject_id, &code, &description, target)?;
    Ok(json!({ "courseOutcome": co }))
}

fn create_po(s: &SqliteStore<'_>, params: &serde_json::Value) -> Result<serde_json::Value, ViewError> {
    let department_id = required_str(params, "departmentId")?;
    let code = required_str(params, "code")?;
    let description = optional_str(params, "description").unwrap_or_default();
    let target = percent_param(params, "targetPercent")?;
    if !s.department_exists(&department_id)? {
        return Err(not_found("department", &department_id));
    }
    let po = s.create_program_outcome(&department_id, &code, &description, target)?;
    Ok(json!({ "programOutcome": po }))
}

/// Weight 0 removes the mapping; 1..=3 is low/medium/high correlation.
fn set_co_po_weight(s: &SqliteStore<'_>, params: &serde_json::Value) -> Result<serde_json::Value, ViewError> {
    let co_id = required_str(params, "coId")?;
    let po_id = required_str(params, "poId")?;
    let weight = match params.get("weight").and_then(|v| v.as_i64()) {
        Some(w) if (0..=3).contains(&w) => w,
        _ => return Err(ViewError::new("bad_params", "weight must be an integer 0..=3")),
    };
    let Some(co) = s.course_outcome(&co_id)? else {
        return Err(not_found("course outcome", &co_id));
    };
    let Some(po) = s.program_outcome(&po_id)? else {
        return Err(not_found("program outcome", &po_id));
    };
    let subject = s.subject(&co.subject_id)?;
    if subject.map(|sub| sub.department_id != po.department_id).unwrap_or(true) {
        return Err(ViewError::new(
            "bad_params",
            "program outcome belongs to another department",
        ));
    }
    s.set_co_po_weight(&co_id, &po_id, weight)?;
    Ok(json!({ "coId": co_id, "poId": po_id, "weight": weight }))
}

fn set_indirect(s: &SqliteStore<'_>, params: &serde_json::Value) -> Result<serde_json::Value, ViewError> {
    let subject_id = required_str(params, "subjectId")?;
    let po_id = required_str(params, "poId")?;
    let percent = match params.get("percent") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(_) => Some(percent_param(params, "percent")?),
    };
    if s.subject(&subject_id)?.is_none() {
        return Err(not_found("subject", &subject_id));
    }
    if s.program_outcome(&po_id)?.is_none() {
        return Err(not_found("program outcome", &po_id));
    }
    s.set_indirect(&subject_id, &po_id, percent)?;
    Ok(json!({ "subjectId": subject_id, "poId": po_id, "percent": percent }))
}

fn subjects_list(state: &AppState) -> Result<serde_json::Value, ViewError> {
    let s = store(&state.db, &state.config)?;
    let owner = session_user(&state.session)?;
    let subjects: Vec<_> = s
        .subjects()?
        .into_iter()
        .filter(|sub| sub.instructor_id == owner.id)
        .collect();
    Ok(json!({ "subjects": subjects }))
}

fn students_list(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, ViewError> {
    let s = store(&state.db, &state.config)?;
    let class_id = required_str(params, "classId")?;
    if !s.class_exists(&class_id)? {
        return Err(not_found("class", &class_id));
    }
    Ok(json!({ "students": s.students_in_class(&class_id)? }))
}

type AdminFn = fn(&SqliteStore<'_>, &serde_json::Value) -> Result<serde_json::Value, ViewError>;

fn admin(state: &AppState, req: &Request, f: AdminFn) -> serde_json::Value {
    let result = store(&state.db, &state.config).and_then(|s| f(&s, &req.params));
    if let Err(e) = &result {
        tracing::debug!(method = %req.method, code = e.code, "directory write rejected");
    }
    respond(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f: AdminFn = match req.method.as_str() {
        "directory.createDepartment" => create_department,
        "directory.createUser" => create_user,
        "directory.createClass" => create_class,
        "directory.createStudent" => create_student,
        "directory.createSubject" => create_subject,
        "outcomes.createCo" => create_co,
        "outcomes.createPo" => create_po,
        "outcomes.setCoPoWeight" => set_co_po_weight,
        "outcomes.setIndirect" => set_indirect,
        "subjects.list" => return Some(respond(&req.id, subjects_list(state))),
        "students.list" => return Some(respond(&req.id, students_list(state, &req.params))),
        _ => return None,
    };
    Some(admin(state, req, f))
}
