use super::{owned_subject, FieldErrors, ViewError};
use crate::calc::{project_exams, ExamQuery};
use crate::model::{
    BloomLevel, CoPoWeight, CoWeight, CourseOutcome, Difficulty, Exam, ExamType, ProgramOutcome,
    Question, Section, Subject, User, MARK_STEP,
};
use crate::store::{CoPoWeightLookup, DirectoryStore, ExamStore, OutcomeLookup};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoSuggestion {
    pub co_id: String,
    pub po_id: String,
    pub po_code: String,
    pub weight: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectOutcomes {
    pub subject: Subject,
    pub course_outcomes: Vec<CourseOutcome>,
    pub program_outcomes: Vec<ProgramOutcome>,
    pub suggestions: Vec<PoSuggestion>,
    pub warnings: Vec<String>,
}

struct Memo {
    revision: u64,
    owner_id: String,
    query: ExamQuery,
    exam_ids: Vec<String>,
}

#[derive(Default)]
pub struct ExamConfigView {
    exams: Option<Vec<Exam>>,
    revision: u64,
    memo: Option<Memo>,
    selected: Option<SubjectOutcomes>,
    weights: Vec<CoPoWeight>,
}

pub fn valid_marks(m: f64) -> bool {
    m.is_finite() && m >= MARK_STEP && (m / MARK_STEP).fract() == 0.0
}

fn field_str<'a>(obj: &'a serde_json::Map<String, serde_json::Value>, key: &str) -> Option<&'a str> {
    obj.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn parse_tag<T>(
    obj: &serde_json::Map<String, serde_json::Value>,
    key: &str,
    path: &str,
    what: &str,
    parse: fn(&str) -> Option<T>,
    errors: &mut FieldErrors,
) -> Option<T> {
    match field_str(obj, key) {
        None => {
            errors.insert(format!("{path}.{key}"), format!("{what} is required"));
            None
        }
        Some(raw) => {
            let parsed = parse(raw);
            if parsed.is_none() {
                errors.insert(format!("{path}.{key}"), format!("unknown {what}: {raw}"));
            }
            parsed
        }
    }
}

fn parse_co_weights(
    raw: Option<&serde_json::Value>,
    path: &str,
    subject_cos: &HashSet<&str>,
    errors: &mut FieldErrors,
) -> Vec<CoWeight> {
    let Some(raw) = raw.filter(|v| !v.is_null()) else {
        return Vec::new();
    };
    let Some(items) = raw.as_array() else {
        errors.insert(format!("{path}.coWeights"), "must be a list".to_string());
        return Vec::new();
    };
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let item_path = format!("{path}.coWeights[{i}]");
        let co_id = item.get("coId").and_then(|v| v.as_str()).map(str::trim);
        let weight = item.get("weight").and_then(|v| v.as_f64());
        let Some(co_id) = co_id.filter(|s| !s.is_empty()) else {
            errors.insert(format!("{item_path}.coId"), "course outcome is required".to_string());
            continue;
        };
        if !subject_cos.contains(co_id) {
            errors.insert(
                format!("{item_path}.coId"),
                "course outcome does not belong to this subject".to_string(),
            );
            continue;
        }
        if !seen.insert(co_id.to_string()) {
            errors.insert(
                format!("{item_path}.coId"),
                "course outcome listed twice".to_string(),
            );
            continue;
        }
        match weight {
            Some(w) if w > 0.0 && w <= 100.0 => out.push(CoWeight {
                co_id: co_id.to_string(),
                weight: w,
            }),
            _ => {
                errors.insert(
                    format!("{item_path}.weight"),
                    "weight must be a percentage in (0, 100]".to_string(),
                );
            }
        }
    }
    out
}

fn parse_question(
    raw: &serde_json::Value,
    path: &str,
    subject_cos: &HashSet<&str>,
    errors: &mut FieldErrors,
) -> Option<Question> {
    let Some(obj) = raw.as_object() else {
        errors.insert(path.to_string(), "question must be an object".to_string());
        return None;
    };
    let id = field_str(obj, "id")
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let text = obj
        .get("text")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let max_marks = match obj.get("maxMarks").and_then(|v| v.as_f64()) {
        Some(m) if valid_marks(m) => Some(m),
        Some(_) => {
            errors.insert(
                format!("{path}.maxMarks"),
                format!("marks must be at least {MARK_STEP} in steps of {MARK_STEP}"),
            );
            None
        }
        None => {
            errors.insert(format!("{path}.maxMarks"), "marks are required".to_string());
            None
        }
    };
    let section = parse_tag(obj, "section", path, "section", Section::parse, errors);
    let bloom_level = parse_tag(obj, "bloomLevel", path, "level", BloomLevel::parse, errors);
    let difficulty = parse_tag(obj, "difficulty", path, "difficulty", Difficulty::parse, errors);
    let co_weights = parse_co_weights(obj.get("coWeights"), path, subject_cos, errors);

    Some(Question {
        id,
        number: 0,
        text,
        max_marks: max_marks?,
        section: section?,
        bloom_level: bloom_level?,
        difficulty: difficulty?,
        co_weights,
    })
}

/// Header fields of an exam. The subject is resolved by the caller.
struct ExamHeader {
    name: Option<String>,
    exam_type: Option<ExamType>,
    date: Option<String>,
    duration_minutes: Option<i64>,
}

fn parse_header(obj: &serde_json::Map<String, serde_json::Value>, errors: &mut FieldErrors) -> ExamHeader {
    let name = field_str(obj, "name").map(str::to_string);
    if name.is_none() {
        errors.insert("name".into(), "name is required".into());
    }

    let exam_type = match field_str(obj, "examType") {
        None => {
            errors.insert("examType".into(), "type is required".into());
            None
        }
        Some(raw) => {
            let t = ExamType::parse(raw);
            if t.is_none() {
                errors.insert("examType".into(), format!("unknown exam type: {raw}"));
            }
            t
        }
    };

    let date = match field_str(obj, "date") {
        None => None,
        Some(raw) => {
            if NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_err() {
                errors.insert("date".into(), "date must be YYYY-MM-DD".into());
            }
            Some(raw.to_string())
        }
    };

    let duration_minutes = match obj.get("durationMinutes") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => match v.as_i64() {
            Some(n) if n > 0 => Some(n),
            _ => {
                errors.insert(
                    "durationMinutes".into(),
                    "duration must be a positive number of minutes".into(),
                );
                None
            }
        },
    };

    ExamHeader {
        name,
        exam_type,
        date,
        duration_minutes,
    }
}

fn parse_questions(
    raw: Option<&serde_json::Value>,
    subject_cos: &HashSet<&str>,
    errors: &mut FieldErrors,
) -> Vec<Question> {
    let items = raw.and_then(|v| v.as_array()).cloned().unwrap_or_default();
    if items.is_empty() {
        errors.insert("questions".into(), "at least one question is required".into());
        return Vec::new();
    }
    let mut ids: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let path = format!("questions[{i}]");
        if let Some(q) = parse_question(item, &path, subject_cos, errors) {
            if !ids.insert(q.id.clone()) {
                errors.insert(format!("{path}.id"), "duplicate question id".into());
                continue;
            }
            out.push(q);
        }
    }
    out
}

/// Overlays `patch` onto `base`; both are JSON objects.
fn overlay(base: serde_json::Value, patch: &serde_json::Map<String, serde_json::Value>) -> serde_json::Value {
    let mut base = base;
    if let Some(obj) = base.as_object_mut() {
        for (k, v) in patch {
            obj.insert(k.clone(), v.clone());
        }
    }
    base
}

impl ExamConfigView {
    pub fn selected(&self) -> Option<&SubjectOutcomes> {
        self.selected.as_ref()
    }

    fn invalidate(&mut self) {
        self.exams = None;
        self.revision += 1;
    }

    fn load_exams<S: ExamStore + ?Sized>(&mut self, store: &S) -> Result<&[Exam], ViewError> {
        if self.exams.is_none() {
            self.exams = Some(store.list_exams()?);
            self.revision += 1;
        }
        Ok(self.exams.as_deref().unwrap_or(&[]))
    }

    /// Filtered and sorted exams of subjects the owner teaches.
    pub fn list<S>(&mut self, store: &S, owner: &User, query: &ExamQuery) -> Result<Vec<Exam>, ViewError>
    where
        S: ExamStore + DirectoryStore + ?Sized,
    {
        let owned: HashSet<String> = store
            .subjects()?
            .into_iter()
            .filter(|s| s.instructor_id == owner.id)
            .map(|s| s.id)
            .collect();
        let exams = self.load_exams(store)?.to_vec();
        let revision = self.revision;

        let memo_hit = self
            .memo
            .as_ref()
            .map(|m| m.revision == revision && m.owner_id == owner.id && m.query == *query)
            .unwrap_or(false);
        if !memo_hit {
            let visible: Vec<Exam> = exams
                .iter()
                .filter(|e| owned.contains(&e.subject_id))
                .cloned()
                .collect();
            let exam_ids = project_exams(&visible, query)
                .into_iter()
                .map(|e| e.id.clone())
                .collect();
            self.memo = Some(Memo {
                revision,
                owner_id: owner.id.clone(),
                query: query.clone(),
                exam_ids,
            });
        }

        let ids = self.memo.as_ref().map(|m| m.exam_ids.as_slice()).unwrap_or(&[]);
        Ok(ids
            .iter()
            .filter_map(|id| exams.iter().find(|e| &e.id == id))
            .filter(|e| owned.contains(&e.subject_id))
            .cloned()
            .collect())
    }

    /// An exam the owner may see; others are reported as missing.
    pub fn get<S>(&self, store: &S, owner: &User, exam_id: &str) -> Result<Exam, ViewError>
    where
        S: ExamStore + DirectoryStore + ?Sized,
    {
        let not_found =
            || ViewError::new("not_found", "exam not found").with_details(json!({ "examId": exam_id }));
        let Some(exam) = store.get_exam(exam_id)? else {
            return Err(not_found());
        };
        match store.subject(&exam.subject_id)? {
            Some(s) if s.instructor_id == owner.id => Ok(exam),
            _ => Err(not_found()),
        }
    }

    fn build_exam<S>(
        &self,
        store: &S,
        owner: &User,
        id: String,
        raw: &serde_json::Value,
    ) -> Result<Exam, ViewError>
    where
        S: DirectoryStore + OutcomeLookup + ?Sized,
    {
        let Some(obj) = raw.as_object() else {
            return Err(ViewError::new("bad_params", "exam must be an object"));
        };
        let mut errors = FieldErrors::new();
        let header = parse_header(obj, &mut errors);

        let cos = match field_str(obj, "subjectId") {
            None => {
                errors.insert("subjectId".into(), "subject is required".into());
                Vec::new()
            }
            Some(subject_id) => match store.subject(subject_id)? {
                None => {
                    errors.insert("subjectId".into(), "unknown subject".into());
                    Vec::new()
                }
                Some(_) => {
                    let subject = owned_subject(store, owner, subject_id)?;
                    store.course_outcomes_for_subject(&subject.id)?
                }
            },
        };
        let co_ids: HashSet<&str> = cos.iter().map(|c| c.id.as_str()).collect();
        let questions = parse_questions(obj.get("questions"), &co_ids, &mut errors);

        if !errors.is_empty() {
            return Err(ViewError::validation(errors));
        }
        let (Some(name), Some(exam_type), Some(subject_id)) =
            (header.name, header.exam_type, field_str(obj, "subjectId"))
        else {
            return Err(ViewError::validation(errors));
        };

        let mut exam = Exam {
            id,
            name,
            subject_id: subject_id.to_string(),
            exam_type,
            date: header.date,
            duration_minutes: header.duration_minutes,
            questions,
        };
        exam.renumber();
        Ok(exam)
    }

    pub fn create<S>(&mut self, store: &S, owner: &User, raw: &serde_json::Value) -> Result<Exam, ViewError>
    where
        S: ExamStore + DirectoryStore + OutcomeLookup + ?Sized,
    {
        let exam = self.build_exam(store, owner, Uuid::new_v4().to_string(), raw)?;
        store.create_exam(&exam)?;
        self.invalidate();
        tracing::info!(exam_id = %exam.id, questions = exam.questions.len(), "exam created");
        Ok(exam)
    }

    /// Fields present in `patch` replace the stored ones; `totalMarks` is ignored.
    pub fn update<S>(
        &mut self,
        store: &S,
        owner: &User,
        exam_id: &str,
        patch: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Exam, ViewError>
    where
        S: ExamStore + DirectoryStore + OutcomeLookup + ?Sized,
    {
        let current = self.get(store, owner, exam_id)?;
        let base = serde_json::to_value(&current)
            .map_err(|e| ViewError::new("bad_params", e.to_string()))?;
        let merged = overlay(base, patch);
        let exam = self.build_exam(store, owner, current.id.clone(), &merged)?;
        self.persist(store, exam)
    }

    fn persist<S>(&mut self, store: &S, exam: Exam) -> Result<Exam, ViewError>
    where
        S: ExamStore + ?Sized,
    {
        store.update_exam(&exam)?;
        self.invalidate();
        tracing::info!(exam_id = %exam.id, total_marks = exam.total_marks(), "exam updated");
        Ok(exam)
    }

    pub fn delete<S>(&mut self, store: &S, owner: &User, exam_id: &str) -> Result<(), ViewError>
    where
        S: ExamStore + DirectoryStore + ?Sized,
    {
        let exam = self.get(store, owner, exam_id)?;
        if !store.delete_exam(&exam.id)? {
            return Err(ViewError::new("not_found", "exam not found"));
        }
        self.invalidate();
        tracing::info!(exam_id = %exam.id, "exam deleted");
        Ok(())
    }

    fn questions_json(exam: &Exam) -> Result<Vec<serde_json::Value>, ViewError> {
        exam.questions
            .iter()
            .map(|q| serde_json::to_value(q).map_err(|e| ViewError::new("bad_params", e.to_string())))
            .collect()
    }

    fn replace_questions<S>(
        &mut self,
        store: &S,
        owner: &User,
        exam: &Exam,
        questions: Vec<serde_json::Value>,
    ) -> Result<Exam, ViewError>
    where
        S: ExamStore + DirectoryStore + OutcomeLookup + ?Sized,
    {
        let mut patch = serde_json::Map::new();
        patch.insert("questions".into(), serde_json::Value::Array(questions));
        self.update(store, owner, &exam.id, &patch)
    }

    pub fn add_question<S>(
        &mut self,
        store: &S,
        owner: &User,
        exam_id: &str,
        question: &serde_json::Value,
    ) -> Result<Exam, ViewError>
    where
        S: ExamStore + DirectoryStore + OutcomeLookup + ?Sized,
    {
        let exam = self.get(store, owner, exam_id)?;
        let mut questions = Self::questions_json(&exam)?;
        // New questions always get a fresh id.
        let mut q = question.clone();
        if let Some(obj) = q.as_object_mut() {
            obj.remove("id");
        }
        questions.push(q);
        self.replace_questions(store, owner, &exam, questions)
    }

    pub fn update_question<S>(
        &mut self,
        store: &S,
        owner: &User,
        exam_id: &str,
        question_id: &str,
        patch: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Exam, ViewError>
    where
        S: ExamStore + DirectoryStore + OutcomeLookup + ?Sized,
    {
        let exam = self.get(store, owner, exam_id)?;
        let Some(pos) = exam.questions.iter().position(|q| q.id == question_id) else {
            return Err(ViewError::new("not_found", "question not found")
                .with_details(json!({ "questionId": question_id })));
        };
        let mut questions = Self::questions_json(&exam)?;
        let mut patch = patch.clone();
        patch.remove("id");
        questions[pos] = overlay(questions[pos].clone(), &patch);
        self.replace_questions(store, owner, &exam, questions)
    }

    pub fn remove_question<S>(
        &mut self,
        store: &S,
        owner: &User,
        exam_id: &str,
        question_id: &str,
    ) -> Result<Exam, ViewError>
    where
        S: ExamStore + DirectoryStore + OutcomeLookup + ?Sized,
    {
        let exam = self.get(store, owner, exam_id)?;
        let Some(pos) = exam.questions.iter().position(|q| q.id == question_id) else {
            return Err(ViewError::new("not_found", "question not found")
                .with_details(json!({ "questionId": question_id })));
        };
        let mut questions = Self::questions_json(&exam)?;
        questions.remove(pos);
        self.replace_questions(store, owner, &exam, questions)
    }

    pub fn move_question<S>(
        &mut self,
        store: &S,
        owner: &User,
        exam_id: &str,
        question_id: &str,
        to_index: usize,
    ) -> Result<Exam, ViewError>
    where
        S: ExamStore + DirectoryStore + OutcomeLookup + ?Sized,
    {
        let mut exam = self.get(store, owner, exam_id)?;
        let Some(pos) = exam.questions.iter().position(|q| q.id == question_id) else {
            return Err(ViewError::new("not_found", "question not found")
                .with_details(json!({ "questionId": question_id })));
        };
        if to_index >= exam.questions.len() {
            return Err(ViewError::new("bad_params", "toIndex out of range")
                .with_details(json!({ "toIndex": to_index, "count": exam.questions.len() })));
        }
        let q = exam.questions.remove(pos);
        exam.questions.insert(to_index, q);
        exam.renumber();
        self.persist(store, exam)
    }

    /// Loads the outcome lists for a subject. A failing CO-PO weighting
    /// lookup only empties the suggestions.
    pub fn select_subject<S>(
        &mut self,
        store: &S,
        owner: &User,
        subject_id: &str,
    ) -> Result<&SubjectOutcomes, ViewError>
    where
        S: DirectoryStore + OutcomeLookup + CoPoWeightLookup + ?Sized,
    {
        let subject = owned_subject(store, owner, subject_id)?;
        let course_outcomes = store.course_outcomes_for_subject(&subject.id)?;
        let program_outcomes = store.program_outcomes_for_department(&subject.department_id)?;

        let mut warnings = Vec::new();
        let weights = match store.co_po_weights_for_subject(&subject.id) {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!(subject_id = %subject.id, error = %e, "CO-PO weighting unavailable");
                warnings.push(format!("CO-PO weight suggestions unavailable: {e}"));
                Vec::new()
            }
        };

        let suggestions = suggestions_for(&weights, &program_outcomes, None);
        self.weights = weights;
        Ok(self.selected.insert(SubjectOutcomes {
            subject,
            course_outcomes,
            program_outcomes,
            suggestions,
            warnings,
        }))
    }

    pub fn suggest_weights(&self, co_ids: &[String]) -> Result<Vec<PoSuggestion>, ViewError> {
        let Some(sel) = self.selected.as_ref() else {
            return Err(ViewError::new("no_selection", "select a subject first"));
        };
        let filter: HashSet<&str> = co_ids.iter().map(String::as_str).collect();
        Ok(suggestions_for(
            &self.weights,
            &sel.program_outcomes,
            Some(&filter),
        ))
    }
}

fn suggestions_for(
    weights: &[CoPoWeight],
    program_outcomes: &[ProgramOutcome],
    co_filter: Option<&HashSet<&str>>,
) -> Vec<PoSuggestion> {
    weights
        .iter()
        .filter(|w| co_filter.map(|f| f.contains(w.co_id.as_str())).unwrap_or(true))
        .filter_map(|w| {
            program_outcomes
                .iter()
                .find(|po| po.id == w.po_id)
                .map(|po| PoSuggestion {
                    co_id: w.co_id.clone(),
                    po_id: po.id.clone(),
                    po_code: po.code.clone(),
                    weight: w.weight,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MarkRecord, MarkSubmission, Student};
    use crate::store::{MarksStore, StoreError};
    use std::cell::RefCell;

    /// In-memory stores with a switch to break the weighting lookup.
    #[derive(Default)]
    struct FakeStore {
        subjects: Vec<Subject>,
        cos: Vec<CourseOutcome>,
        pos: Vec<ProgramOutcome>,
        weights: Vec<CoPoWeight>,
        weights_fail: bool,
        exams: RefCell<Vec<Exam>>,
        list_calls: RefCell<usize>,
    }

    impl DirectoryStore for FakeStore {
        fn subjects(&self) -> Result<Vec<Subject>, StoreError> {
            Ok(self.subjects.clone())
        }
        fn subject(&self, id: &str) -> Result<Option<Subject>, StoreError> {
            Ok(self.subjects.iter().find(|s| s.id == id).cloned())
        }
        fn user(&self, _id: &str) -> Result<Option<User>, StoreError> {
            Ok(None)
        }
        fn students_in_class(&self, _class_id: &str) -> Result<Vec<Student>, StoreError> {
            Ok(Vec::new())
        }
    }

    impl OutcomeLookup for FakeStore {
        fn course_outcomes_for_subject(&self, id: &str) -> Result<Vec<CourseOutcome>, StoreError> {
            Ok(self.cos.iter().filter(|c| c.subject_id == id).cloned().collect())
        }
        fn program_outcomes_for_department(&self, id: &str) -> Result<Vec<ProgramOutcome>, StoreError> {
            Ok(self.pos.iter().filter(|p| p.department_id == id).cloned().collect())
        }
    }

    impl CoPoWeightLookup for FakeStore {
        fn co_po_weights_for_subject(&self, _id: &str) -> Result<Vec<CoPoWeight>, StoreError> {
            if self.weights_fail {
                return Err(StoreError::Query(rusqlite::Error::InvalidQuery));
            }
            Ok(self.weights.clone())
        }
    }

    impl ExamStore for FakeStore {
        fn list_exams(&self) -> Result<Vec<Exam>, StoreError> {
            *self.list_calls.borrow_mut() += 1;
            Ok(self.exams.borrow().clone())
        }
        fn get_exam(&self, id: &str) -> Result<Option<Exam>, StoreError> {
            Ok(self.exams.borrow().iter().find(|e| e.id == id).cloned())
        }
        fn create_exam(&self, exam: &Exam) -> Result<(), StoreError> {
            self.exams.borrow_mut().push(exam.clone());
            Ok(())
        }
        fn update_exam(&self, exam: &Exam) -> Result<(), StoreError> {
            let mut exams = self.exams.borrow_mut();
            if let Some(slot) = exams.iter_mut().find(|e| e.id == exam.id) {
                *slot = exam.clone();
            }
            Ok(())
        }
        fn delete_exam(&self, id: &str) -> Result<bool, StoreError> {
            let mut exams = self.exams.borrow_mut();
            let before = exams.len();
            exams.retain(|e| e.id != id);
            Ok(exams.len() != before)
        }
    }

    impl MarksStore for FakeStore {
        fn marks_for_exam(&self, _id: &str) -> Result<Vec<MarkRecord>, StoreError> {
            Ok(Vec::new())
        }
        fn save_marks(&self, _s: &[MarkSubmission]) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn owner() -> User {
        User {
            id: "u1".into(),
            name: "Instructor".into(),
            department_id: None,
        }
    }

    fn fixture() -> FakeStore {
        FakeStore {
            subjects: vec![
                Subject {
                    id: "sub1".into(),
                    code: "CS201".into(),
                    name: "Data Structures".into(),
                    class_id: "c1".into(),
                    department_id: "d1".into(),
                    instructor_id: "u1".into(),
                },
                Subject {
                    id: "sub2".into(),
                    code: "CS301".into(),
                    name: "Compilers".into(),
                    class_id: "c2".into(),
                    department_id: "d1".into(),
                    instructor_id: "someone-else".into(),
                },
            ],
            cos: vec![CourseOutcome {
                id: "co1".into(),
                subject_id: "sub1".into(),
                code: "CO1".into(),
                description: "Trees".into(),
                target_percent: 60.0,
            }],
            pos: vec![ProgramOutcome {
                id: "po1".into(),
                department_id: "d1".into(),
                code: "PO1".into(),
                description: "Engineering knowledge".into(),
                target_percent: 60.0,
            }],
            weights: vec![CoPoWeight {
                co_id: "co1".into(),
                po_id: "po1".into(),
                weight: 3,
            }],
            ..FakeStore::default()
        }
    }

    fn question(marks: f64) -> serde_json::Value {
        json!({
            "text": "Explain",
            "maxMarks": marks,
            "section": "A",
            "bloomLevel": "apply",
            "difficulty": "medium",
            "coWeights": [{ "coId": "co1", "weight": 40 }]
        })
    }

    fn draft() -> serde_json::Value {
        json!({
            "name": "Quiz 1",
            "subjectId": "sub1",
            "examType": "quiz",
            "date": "2026-03-02",
            "questions": [question(10.0), question(15.0)]
        })
    }

    #[test]
    fn total_marks_tracks_question_mutations() {
        let store = fixture();
        let mut view = ExamConfigView::default();
        let exam = view.create(&store, &owner(), &draft()).expect("create");
        assert_eq!(exam.total_marks(), 25.0);

        let exam = view
            .add_question(&store, &owner(), &exam.id, &question(5.0))
            .expect("add");
        assert_eq!(exam.total_marks(), 30.0);
        assert_eq!(exam.questions[2].number, 3);

        let first = exam.questions[0].id.clone();
        let patch = json!({ "maxMarks": 12.5 });
        let exam = view
            .update_question(&store, &owner(), &exam.id, &first, patch.as_object().expect("obj"))
            .expect("edit");
        assert_eq!(exam.total_marks(), 32.5);

        let exam = view
            .remove_question(&store, &owner(), &exam.id, &first)
            .expect("remove");
        assert_eq!(exam.total_marks(), 20.0);
        assert_eq!(exam.questions[0].number, 1);
    }

    #[test]
    fn validation_is_field_scoped_and_skips_store() {
        let store = fixture();
        let mut view = ExamConfigView::default();
        let bad = json!({
            "subjectId": "sub1",
            "examType": "oral",
            "questions": [{
                "maxMarks": 0.3,
                "section": "Z",
                "bloomLevel": "apply",
                "coWeights": [{ "coId": "co-elsewhere", "weight": 10 }]
            }]
        });
        let e = view.create(&store, &owner(), &bad).expect_err("invalid");
        assert_eq!(e.code, "validation_failed");
        let fields = e.details.expect("details")["fields"].clone();
        for key in [
            "name",
            "examType",
            "questions[0].maxMarks",
            "questions[0].section",
            "questions[0].difficulty",
            "questions[0].coWeights[0].coId",
        ] {
            assert!(fields.get(key).is_some(), "missing error for {key}: {fields}");
        }
        assert!(store.exams.borrow().is_empty());

        let none = json!({ "name": "x", "subjectId": "sub1", "examType": "quiz", "questions": [] });
        let e = view.create(&store, &owner(), &none).expect_err("no questions");
        assert!(e.details.expect("details")["fields"].get("questions").is_some());
    }

    #[test]
    fn half_point_granularity() {
        assert!(valid_marks(0.5));
        assert!(valid_marks(7.5));
        assert!(!valid_marks(0.25));
        assert!(!valid_marks(2.3));
        assert!(!valid_marks(0.0));
    }

    #[test]
    fn weights_need_not_sum_to_hundred() {
        let store = fixture();
        let mut view = ExamConfigView::default();
        let exam = view.create(&store, &owner(), &draft()).expect("create");
        assert_eq!(exam.questions[0].co_weights[0].weight, 40.0);
    }

    #[test]
    fn subjects_of_other_instructors_are_forbidden() {
        let store = fixture();
        let mut view = ExamConfigView::default();
        let mut d = draft();
        d["subjectId"] = json!("sub2");
        let e = view.create(&store, &owner(), &d).expect_err("forbidden");
        assert_eq!(e.code, "forbidden");
        let e = view.select_subject(&store, &owner(), "sub2").expect_err("forbidden");
        assert_eq!(e.code, "forbidden");
    }

    #[test]
    fn weighting_failure_degrades_to_empty_suggestions() {
        let mut store = fixture();
        let mut view = ExamConfigView::default();
        let sel = view.select_subject(&store, &owner(), "sub1").expect("select");
        assert_eq!(sel.suggestions.len(), 1);
        assert!(sel.warnings.is_empty());

        store.weights_fail = true;
        let sel = view.select_subject(&store, &owner(), "sub1").expect("select");
        assert!(sel.suggestions.is_empty());
        assert_eq!(sel.course_outcomes.len(), 1);
        assert_eq!(sel.program_outcomes.len(), 1);
        assert_eq!(sel.warnings.len(), 1);
        assert!(view.suggest_weights(&["co1".into()]).expect("suggest").is_empty());
    }

    #[test]
    fn list_is_memoized_until_a_mutation() {
        let store = fixture();
        let mut view = ExamConfigView::default();
        view.create(&store, &owner(), &draft()).expect("create");
        let q = ExamQuery::default();
        assert_eq!(view.list(&store, &owner(), &q).expect("list").len(), 1);
        assert_eq!(view.list(&store, &owner(), &q).expect("list").len(), 1);
        assert_eq!(*store.list_calls.borrow(), 1);

        let mut d = draft();
        d["name"] = json!("Quiz 2");
        view.create(&store, &owner(), &d).expect("create");
        assert_eq!(view.list(&store, &owner(), &q).expect("list").len(), 2);
        assert_eq!(*store.list_calls.borrow(), 2);
    }
}
