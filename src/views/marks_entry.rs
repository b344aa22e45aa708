use super::ViewError;
use crate::calc::{build_mark_rows, compute_marks_stats, project_mark_rows, MarkRow, MarksQuery, MarksStats};
use crate::model::{Exam, MarkRecord, MarkSubmission, Student};
use crate::spreadsheet::{self, Cell, Sheet};
use crate::store::{DirectoryStore, MarksStore};
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::Path;

pub struct MarksSelection {
    pub exam: Exam,
    pub roster: Vec<Student>,
    pub records: HashMap<String, MarkRecord>,
    /// Students whose record was removed since load; saved as deletions.
    pub cleared: HashSet<String>,
    pub dirty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewStatus {
    Matched,
    MissingStudent,
    InvalidScore,
    DuplicateStudent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRow {
    pub line: usize,
    pub key: String,
    pub student_id: Option<String>,
    pub status: PreviewStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip)]
    scores: Vec<(String, f64)>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportPreview {
    pub preview_id: String,
    pub exam_id: String,
    pub header: Vec<String>,
    pub matched_columns: Vec<String>,
    pub ignored_columns: Vec<String>,
    pub rows: Vec<PreviewRow>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportApplied {
    pub applied: usize,
    pub skipped: usize,
}

#[derive(Default)]
pub struct MarksEntryView {
    selection: Option<MarksSelection>,
    preview: Option<ImportPreview>,
}

enum KeyColumn {
    RollNo(usize),
    StudentId(usize),
}

fn normalize_header(h: &str) -> String {
    h.chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .collect::<String>()
        .to_ascii_lowercase()
}

fn question_column(h: &str) -> Option<usize> {
    let n = normalize_header(h);
    let digits = n.strip_prefix('q')?;
    let num: usize = digits.parse().ok()?;
    (num >= 1).then_some(num - 1)
}

impl MarksEntryView {
    pub fn selection(&self) -> Option<&MarksSelection> {
        self.selection.as_ref()
    }

    fn selected(&self) -> Result<&MarksSelection, ViewError> {
        self.selection
            .as_ref()
            .ok_or_else(|| ViewError::new("no_selection", "select an exam first"))
    }

    fn selected_mut(&mut self) -> Result<&mut MarksSelection, ViewError> {
        self.selection
            .as_mut()
            .ok_or_else(|| ViewError::new("no_selection", "select an exam first"))
    }

    /// Loads roster and stored marks, discarding any unsaved draft.
    pub fn select_exam<S>(&mut self, store: &S, exam: Exam) -> Result<&MarksSelection, ViewError>
    where
        S: DirectoryStore + MarksStore + ?Sized,
    {
        let Some(subject) = store.subject(&exam.subject_id)? else {
            return Err(ViewError::new("not_found", "subject not found")
                .with_details(json!({ "subjectId": exam.subject_id })));
        };
        let roster = store.students_in_class(&subject.class_id)?;
        let records = store
            .marks_for_exam(&exam.id)?
            .into_iter()
            .map(|r| (r.student_id.clone(), r))
            .collect();
        self.preview = None;
        tracing::debug!(exam_id = %exam.id, students = roster.len(), "marks entry loaded");
        Ok(self.selection.insert(MarksSelection {
            exam,
            roster,
            records,
            cleared: HashSet::new(),
            dirty: false,
        }))
    }

    /// Keeps the loaded draft consistent with an edited exam definition.
    pub fn exam_changed(&mut self, exam: &Exam) {
        if let Some(sel) = self.selection.as_mut().filter(|s| s.exam.id == exam.id) {
            sel.exam = exam.clone();
            for rec in sel.records.values_mut() {
                rec.scores.retain(|qid, _| exam.question(qid).is_some());
            }
            self.preview = None;
        }
    }

    pub fn exam_deleted(&mut self, exam_id: &str) {
        if self.selection.as_ref().map(|s| s.exam.id == exam_id).unwrap_or(false) {
            self.selection = None;
            self.preview = None;
        }
    }

    pub fn clear(&mut self) {
        self.selection = None;
        self.preview = None;
    }

    pub fn set_score(
        &mut self,
        student_id: &str,
        question_id: &str,
        score: Option<f64>,
    ) -> Result<MarkRow, ViewError> {
        let sel = self.selected_mut()?;
        if !sel.roster.iter().any(|s| s.id == student_id) {
            return Err(ViewError::new("not_found", "student is not on this exam's roster")
                .with_details(json!({ "studentId": student_id })));
        }
        let Some(question) = sel.exam.question(question_id) else {
            return Err(ViewError::new("not_found", "question not found")
                .with_details(json!({ "questionId": question_id })));
        };
        let max = question.max_marks;

        match score {
            Some(v) if !v.is_finite() || v < 0.0 || v > max => {
                return Err(ViewError::new("bad_params", format!("score must be between 0 and {max}"))
                    .with_details(json!({ "questionId": question_id, "max": max, "score": v })));
            }
            Some(v) => {
                let exam_id = sel.exam.id.clone();
                sel.records
                    .entry(student_id.to_string())
                    .or_insert_with(|| MarkRecord::new(&exam_id, student_id))
                    .scores
                    .insert(question_id.to_string(), v);
            }
            None => {
                let now_empty = match sel.records.get_mut(student_id) {
                    Some(rec) => {
                        rec.scores.remove(question_id);
                        rec.scores.is_empty()
                    }
                    None => false,
                };
                if now_empty {
                    sel.records.remove(student_id);
                    sel.cleared.insert(student_id.to_string());
                }
            }
        }
        sel.dirty = true;
        self.row(student_id)
    }

    fn row(&self, student_id: &str) -> Result<MarkRow, ViewError> {
        let sel = self.selected()?;
        build_mark_rows(&sel.exam, &sel.roster, &sel.records)
            .into_iter()
            .find(|r| r.student_id == student_id)
            .ok_or_else(|| ViewError::new("not_found", "student not found"))
    }

    fn roster_ids(sel: &MarksSelection, student_ids: &[String]) -> Result<Vec<String>, ViewError> {
        let unknown: Vec<&String> = student_ids
            .iter()
            .filter(|id| !sel.roster.iter().any(|s| &s.id == *id))
            .collect();
        if !unknown.is_empty() {
            return Err(ViewError::new("not_found", "students are not on this exam's roster")
                .with_details(json!({ "studentIds": unknown })));
        }
        Ok(student_ids.to_vec())
    }

    /// Sets every question of each listed student to `value`.
    pub fn bulk_fill(&mut self, student_ids: &[String], value: f64) -> Result<usize, ViewError> {
        let sel = self.selected_mut()?;
        let cap = sel
            .exam
            .questions
            .iter()
            .map(|q| q.max_marks)
            .fold(f64::INFINITY, f64::min);
        if sel.exam.questions.is_empty() || !value.is_finite() || value < 0.0 || value > cap {
            return Err(ViewError::new(
                "bad_params",
                format!("value must be between 0 and the smallest question maximum ({cap})"),
            ));
        }
        let ids = Self::roster_ids(sel, student_ids)?;
        let exam_id = sel.exam.id.clone();
        let question_ids: Vec<String> = sel.exam.questions.iter().map(|q| q.id.clone()).collect();
        for sid in &ids {
            let rec = sel
                .records
                .entry(sid.clone())
                .or_insert_with(|| MarkRecord::new(&exam_id, sid));
            for qid in &question_ids {
                rec.scores.insert(qid.clone(), value);
            }
        }
        if !ids.is_empty() {
            sel.dirty = true;
        }
        Ok(ids.len())
    }

    pub fn bulk_clear(&mut self, student_ids: &[String]) -> Result<usize, ViewError> {
        self.bulk_fill(student_ids, 0.0)
    }

    pub fn rows(&self, query: &MarksQuery) -> Result<Vec<MarkRow>, ViewError> {
        let sel = self.selected()?;
        Ok(project_mark_rows(
            build_mark_rows(&sel.exam, &sel.roster, &sel.records),
            query,
        ))
    }

    /// Statistics over roster students that have a record.
    pub fn stats(&self, pass_fraction: f64) -> Result<MarksStats, ViewError> {
        let sel = self.selected()?;
        let totals: Vec<f64> = sel
            .roster
            .iter()
            .filter_map(|s| sel.records.get(&s.id))
            .map(|r| r.total(&sel.exam))
            .collect();
        Ok(compute_marks_stats(&totals, sel.exam.total_marks(), pass_fraction))
    }

    /// Persists one submission per roster student with a record, plus an
    /// empty submission for each student cleared since load. On failure the
    /// draft stays dirty.
    pub fn save<S: MarksStore + ?Sized>(&mut self, store: &S) -> Result<usize, ViewError> {
        let sel = self.selected_mut()?;
        let mut submissions: Vec<MarkSubmission> = sel
            .roster
            .iter()
            .filter_map(|s| sel.records.get(&s.id))
            .map(|rec| MarkSubmission {
                exam_id: sel.exam.id.clone(),
                student_id: rec.student_id.clone(),
                scores: sel
                    .exam
                    .questions
                    .iter()
                    .filter_map(|q| rec.scores.get(&q.id).map(|v| (q.id.clone(), *v)))
                    .collect(),
                total: rec.total(&sel.exam),
            })
            .collect();
        let saved = submissions.len();
        let mut cleared: Vec<&String> = sel
            .cleared
            .iter()
            .filter(|sid| !sel.records.contains_key(*sid))
            .collect();
        cleared.sort();
        submissions.extend(cleared.into_iter().map(|sid| MarkSubmission {
            exam_id: sel.exam.id.clone(),
            student_id: sid.clone(),
            scores: Vec::new(),
            total: 0.0,
        }));
        store.save_marks(&submissions)?;
        sel.cleared.clear();
        sel.dirty = false;
        tracing::info!(
            exam_id = %sel.exam.id,
            saved,
            cleared = submissions.len() - saved,
            "marks saved"
        );
        Ok(saved)
    }

    pub fn import_preview(&mut self, path: &Path) -> Result<&ImportPreview, ViewError> {
        let sel = self.selected()?;
        let (bytes, sheet) = spreadsheet::read_sheet(path).map_err(|e| {
            ViewError::new("import_failed", format!("{e:#}"))
                .with_details(json!({ "path": path.to_string_lossy() }))
        })?;
        let preview_id = format!("{:x}", Sha256::digest(&bytes));
        let preview = build_preview(sel, &sheet, preview_id)?;
        tracing::info!(
            exam_id = %preview.exam_id,
            rows = preview.rows.len(),
            "marks import previewed"
        );
        Ok(self.preview.insert(preview))
    }

    /// Applies matched preview rows, replacing those students' draft scores.
    pub fn import_confirm(&mut self, preview_id: &str) -> Result<ImportApplied, ViewError> {
        let matches = self
            .preview
            .as_ref()
            .map(|p| p.preview_id == preview_id)
            .unwrap_or(false);
        if !matches {
            return Err(ViewError::new(
                "stale_preview",
                "preview is missing or out of date; preview the file again",
            ));
        }
        let Some(preview) = self.preview.take() else {
            return Err(ViewError::new("stale_preview", "preview is missing"));
        };
        let sel = self.selected_mut()?;
        let mut applied = 0;
        let mut skipped = 0;
        for row in &preview.rows {
            let (PreviewStatus::Matched, Some(sid)) = (row.status, row.student_id.as_ref()) else {
                skipped += 1;
                continue;
            };
            if row.scores.is_empty() {
                if sel.records.remove(sid).is_some() {
                    sel.cleared.insert(sid.clone());
                }
            } else {
                let mut rec = MarkRecord::new(&sel.exam.id, sid);
                rec.scores.extend(row.scores.iter().cloned());
                sel.records.insert(sid.clone(), rec);
            }
            applied += 1;
        }
        if applied > 0 {
            sel.dirty = true;
        }
        Ok(ImportApplied { applied, skipped })
    }

    pub fn export(&self, path: &Path, query: &MarksQuery) -> Result<usize, ViewError> {
        let sel = self.selected()?;
        let rows = self.rows(query)?;
        let mut header = vec!["Roll No".to_string(), "Name".to_string()];
        header.extend(sel.exam.questions.iter().map(|q| format!("Q{}", q.number)));
        header.push("Total".into());
        header.push("Percentage".into());

        let opt = |v: Option<f64>| v.map(Cell::Number).unwrap_or(Cell::Empty);
        let sheet = Sheet {
            header,
            rows: rows
                .iter()
                .map(|r| {
                    let mut cells = vec![Cell::Text(r.roll_no.clone()), Cell::Text(r.name.clone())];
                    cells.extend(r.scores.iter().map(|s| opt(*s)));
                    cells.push(opt(r.total));
                    cells.push(opt(r.percentage));
                    cells
                })
                .collect(),
        };
        spreadsheet::write_sheet(path, &sheet).map_err(|e| {
            ViewError::new("export_failed", format!("{e:#}"))
                .with_details(json!({ "path": path.to_string_lossy() }))
        })?;
        Ok(rows.len())
    }
}

/// Roll numbers match case-insensitively, or numerically when both sides are
/// integers ("01" written by a spreadsheet as 1).
fn roll_matches(roll_no: &str, key: &str) -> bool {
    let (roll_no, key) = (roll_no.trim(), key.trim());
    if roll_no.eq_ignore_ascii_case(key) {
        return true;
    }
    match (roll_no.parse::<u64>(), key.parse::<u64>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn cell(row: &[Cell], i: usize) -> Cell {
    row.get(i).cloned().unwrap_or(Cell::Empty)
}

fn build_preview(sel: &MarksSelection, sheet: &Sheet, preview_id: String) -> Result<ImportPreview, ViewError> {
    let mut key_col = None;
    let mut question_cols: Vec<(usize, String)> = Vec::new();
    let mut matched_columns = Vec::new();
    let mut ignored_columns = Vec::new();

    for (i, h) in sheet.header.iter().enumerate() {
        let n = normalize_header(h);
        if key_col.is_none() && matches!(n.as_str(), "rollno" | "rollnumber" | "roll") {
            key_col = Some(KeyColumn::RollNo(i));
            matched_columns.push(h.clone());
        } else if key_col.is_none() && matches!(n.as_str(), "studentid" | "id") {
            key_col = Some(KeyColumn::StudentId(i));
            matched_columns.push(h.clone());
        } else if let Some(q) = question_column(h).and_then(|idx| sel.exam.questions.get(idx)) {
            question_cols.push((i, q.id.clone()));
            matched_columns.push(h.clone());
        } else {
            ignored_columns.push(h.clone());
        }
    }

    let Some(key_col) = key_col else {
        return Err(ViewError::new(
            "import_failed",
            "file needs a Roll No or Student Id column",
        )
        .with_details(json!({ "header": sheet.header })));
    };
    let mut warnings = Vec::new();
    if question_cols.is_empty() {
        warnings.push("no question columns (Q1, Q2, ...) matched this exam".to_string());
    }

    let mut seen: HashSet<String> = HashSet::new();
    let rows = sheet
        .rows
        .iter()
        .enumerate()
        .filter(|(_, r)| r.iter().any(|c| *c != Cell::Empty))
        .map(|(idx, r)| {
            let line = idx + 2;
            let (key, student) = match &key_col {
                KeyColumn::RollNo(i) => {
                    let k = cell(r, *i).text();
                    let s = sel.roster.iter().find(|s| roll_matches(&s.roll_no, &k));
                    (k, s)
                }
                KeyColumn::StudentId(i) => {
                    let k = cell(r, *i).text();
                    let s = sel.roster.iter().find(|s| s.id == k.trim());
                    (k, s)
                }
            };
            let Some(student) = student else {
                return PreviewRow {
                    line,
                    key,
                    student_id: None,
                    status: PreviewStatus::MissingStudent,
                    message: Some("no student on the roster with this key".into()),
                    scores: Vec::new(),
                };
            };
            // First row for a student wins; later ones are skipped.
            if !seen.insert(student.id.clone()) {
                return PreviewRow {
                    line,
                    key,
                    student_id: Some(student.id.clone()),
                    status: PreviewStatus::DuplicateStudent,
                    message: Some("student already appears on an earlier row".into()),
                    scores: Vec::new(),
                };
            }

            let mut scores = Vec::new();
            let mut problem = None;
            for (col, qid) in &question_cols {
                let max = sel.exam.question(qid).map(|q| q.max_marks).unwrap_or(0.0);
                match cell(r, *col).number() {
                    Ok(None) => {}
                    Ok(Some(v)) if v >= 0.0 && v <= max => scores.push((qid.clone(), v)),
                    Ok(Some(v)) => {
                        problem = Some(format!("{}: {v} is outside 0..{max}", sheet.header[*col]));
                        break;
                    }
                    Err(e) => {
                        problem = Some(format!("{}: {e}", sheet.header[*col]));
                        break;
                    }
                }
            }
            match problem {
                Some(message) => PreviewRow {
                    line,
                    key,
                    student_id: Some(student.id.clone()),
                    status: PreviewStatus::InvalidScore,
                    message: Some(message),
                    scores: Vec::new(),
                },
                None => PreviewRow {
                    line,
                    key,
                    student_id: Some(student.id.clone()),
                    status: PreviewStatus::Matched,
                    message: None,
                    scores,
                },
            }
        })
        .collect();

    Ok(ImportPreview {
        preview_id,
        exam_id: sel.exam.id.clone(),
        header: sheet.header.clone(),
        matched_columns,
        ignored_columns,
        rows,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::MarkSortField;
    use crate::model::{BloomLevel, Difficulty, ExamType, Question, Section, Subject, User};
    use crate::store::StoreError;
    use std::cell::RefCell;

    struct FakeStore {
        roster: Vec<Student>,
        saved: RefCell<Vec<MarkSubmission>>,
        fail_save: bool,
    }

    impl DirectoryStore for FakeStore {
        fn subjects(&self) -> Result<Vec<Subject>, StoreError> {
            Ok(Vec::new())
        }
        fn subject(&self, id: &str) -> Result<Option<Subject>, StoreError> {
            Ok(Some(Subject {
                id: id.into(),
                code: "CS201".into(),
                name: "Data Structures".into(),
                class_id: "c1".into(),
                department_id: "d1".into(),
                instructor_id: "u1".into(),
            }))
        }
        fn user(&self, _id: &str) -> Result<Option<User>, StoreError> {
            Ok(None)
        }
        fn students_in_class(&self, _class_id: &str) -> Result<Vec<Student>, StoreError> {
            Ok(self.roster.clone())
        }
    }

    impl MarksStore for FakeStore {
        fn marks_for_exam(&self, _exam_id: &str) -> Result<Vec<MarkRecord>, StoreError> {
            Ok(Vec::new())
        }
        fn save_marks(&self, submissions: &[MarkSubmission]) -> Result<(), StoreError> {
            if self.fail_save {
                return Err(StoreError::Write {
                    code: "db_tx_failed",
                    table: "marks",
                    source: rusqlite::Error::InvalidQuery,
                });
            }
            self.saved.borrow_mut().extend(submissions.iter().cloned());
            Ok(())
        }
    }

    fn student(id: &str, roll: &str, name: &str) -> Student {
        Student {
            id: id.into(),
            class_id: "c1".into(),
            name: name.into(),
            roll_no: roll.into(),
        }
    }

    fn question(id: &str, max_marks: f64) -> Question {
        Question {
            id: id.into(),
            number: 0,
            text: String::new(),
            max_marks,
            section: Section::A,
            bloom_level: BloomLevel::Apply,
            difficulty: Difficulty::Medium,
            co_weights: Vec::new(),
        }
    }

    fn exam() -> Exam {
        let mut e = Exam {
            id: "e1".into(),
            name: "Midterm".into(),
            subject_id: "sub1".into(),
            exam_type: ExamType::Midterm,
            date: None,
            duration_minutes: None,
            questions: vec![question("q1", 10.0), question("q2", 10.0), question("q3", 20.0)],
        };
        e.renumber();
        e
    }

    fn store() -> FakeStore {
        FakeStore {
            roster: vec![
                student("s1", "01", "Ada"),
                student("s2", "02", "Brian"),
                student("s3", "03", "Chen"),
                student("s4", "04", "Dana"),
            ],
            saved: RefCell::new(Vec::new()),
            fail_save: false,
        }
    }

    fn loaded(store: &FakeStore) -> MarksEntryView {
        let mut view = MarksEntryView::default();
        view.select_exam(store, exam()).expect("select");
        view
    }

    fn enter(view: &mut MarksEntryView, sid: &str, scores: [f64; 3]) {
        for (q, v) in ["q1", "q2", "q3"].iter().zip(scores) {
            view.set_score(sid, q, Some(v)).expect("score");
        }
    }

    #[test]
    fn stats_skip_students_without_marks() {
        let store = store();
        let mut view = loaded(&store);
        enter(&mut view, "s1", [5.0, 5.0, 10.0]);
        enter(&mut view, "s2", [6.0, 6.0, 12.0]);
        enter(&mut view, "s3", [10.0, 10.0, 10.0]);

        let stats = view.stats(0.4).expect("stats");
        assert_eq!(stats.count, 3);
        assert_eq!(stats.average, 24.67);
        assert_eq!(stats.pass_threshold, 16.0);
        assert_eq!(stats.pass_rate, 100.0);

        let rows = view.rows(&MarksQuery::default()).expect("rows");
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[3].total, None);
    }

    #[test]
    fn scores_are_bounded_by_question_max() {
        let store = store();
        let mut view = loaded(&store);
        let e = view.set_score("s1", "q1", Some(10.5)).expect_err("too high");
        assert_eq!(e.code, "bad_params");
        let e = view.set_score("s1", "q1", Some(-1.0)).expect_err("negative");
        assert_eq!(e.code, "bad_params");
        assert!(!view.selection().expect("sel").dirty);

        let row = view.set_score("s1", "q1", Some(10.0)).expect("max ok");
        assert_eq!(row.total, Some(10.0));
        let row = view.set_score("s1", "q1", None).expect("clear");
        assert_eq!(row.total, None);
    }

    #[test]
    fn bulk_fill_is_capped_by_smallest_question() {
        let store = store();
        let mut view = loaded(&store);
        let ids = vec!["s1".to_string(), "s2".to_string()];
        assert_eq!(view.bulk_fill(&ids, 10.5).expect_err("cap").code, "bad_params");
        assert_eq!(view.bulk_fill(&ids, 4.0).expect("fill"), 2);
        let rows = view.rows(&MarksQuery::default()).expect("rows");
        assert_eq!(rows[0].total, Some(12.0));

        view.bulk_clear(&["s1".to_string()]).expect("clear");
        let rows = view.rows(&MarksQuery::default()).expect("rows");
        assert_eq!(rows[0].total, Some(0.0));
        assert_eq!(rows[0].scores, vec![Some(0.0); 3]);

        let e = view.bulk_fill(&["nobody".to_string()], 1.0).expect_err("unknown");
        assert_eq!(e.code, "not_found");
    }

    #[test]
    fn failed_save_keeps_draft_dirty() {
        let mut store = store();
        store.fail_save = true;
        let mut view = loaded(&store);
        enter(&mut view, "s1", [1.0, 2.0, 3.0]);
        let e = view.save(&store).expect_err("save fails");
        assert_eq!(e.code, "db_tx_failed");
        assert!(view.selection().expect("sel").dirty);

        store.fail_save = false;
        assert_eq!(view.save(&store).expect("save"), 1);
        assert!(!view.selection().expect("sel").dirty);
        let saved = store.saved.borrow();
        assert_eq!(saved[0].total, 6.0);
        assert_eq!(saved[0].scores.len(), 3);
    }

    #[test]
    fn edited_exam_drops_scores_for_removed_questions() {
        let store = store();
        let mut view = loaded(&store);
        enter(&mut view, "s1", [1.0, 2.0, 3.0]);
        let mut e = exam();
        e.questions.remove(0);
        view.exam_changed(&e);
        let rows = view.rows(&MarksQuery::default()).expect("rows");
        assert_eq!(rows[0].total, Some(5.0));
        assert_eq!(rows[0].scores.len(), 2);
    }

    #[test]
    fn import_applies_matched_rows_only() {
        let store = store();
        let mut view = loaded(&store);
        let dir = std::env::temp_dir().join(format!("outcomesd-import-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("dir");
        let path = dir.join("marks.csv");
        std::fs::write(
            &path,
            "Roll No,Name,Q1,Q2,Q3,Remarks\n01,Ada,8,9,15,good\n02,Brian,11,1,1,\n99,Ghost,1,1,1,\n",
        )
        .expect("write csv");

        let preview = view.import_preview(&path).expect("preview");
        assert_eq!(preview.ignored_columns, vec!["Name".to_string(), "Remarks".to_string()]);
        let statuses: Vec<PreviewStatus> = preview.rows.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                PreviewStatus::Matched,
                PreviewStatus::InvalidScore,
                PreviewStatus::MissingStudent
            ]
        );
        let id = preview.preview_id.clone();

        assert_eq!(view.import_confirm("nope").expect_err("stale").code, "stale_preview");
        let applied = view.import_confirm(&id).expect("confirm");
        assert_eq!(applied.applied, 1);
        assert_eq!(applied.skipped, 2);

        let q = MarksQuery {
            sort_by: MarkSortField::RollNo,
            ..MarksQuery::default()
        };
        let rows = view.rows(&q).expect("rows");
        assert_eq!(rows[0].total, Some(32.0));
        assert_eq!(rows[1].total, None);
        assert!(view.import_confirm(&id).is_err());
    }

    #[test]
    fn clearing_a_students_last_score_is_saved_as_a_deletion() {
        let store = store();
        let mut view = loaded(&store);
        view.set_score("s1", "q1", Some(7.0)).expect("score");
        view.set_score("s2", "q1", Some(3.0)).expect("score");
        view.save(&store).expect("save");

        view.set_score("s1", "q1", None).expect("clear");
        assert_eq!(view.save(&store).expect("save"), 1);
        let saved = store.saved.borrow();
        let last = &saved[saved.len() - 2..];
        assert_eq!(last[0].student_id, "s2");
        assert_eq!(last[1].student_id, "s1");
        assert!(last[1].scores.is_empty());
        drop(saved);

        // Nothing is left to delete on the next save.
        view.save(&store).expect("save");
        let saved = store.saved.borrow();
        assert_eq!(saved.len(), 5);
        assert_eq!(saved[4].student_id, "s2");
    }

    #[test]
    fn import_keeps_the_first_row_for_a_student() {
        let store = store();
        let mut view = loaded(&store);
        let dir = std::env::temp_dir().join(format!("outcomesd-import-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("dir");
        let path = dir.join("marks.csv");
        std::fs::write(&path, "Roll No,Q1,Q2,Q3\n1,4,4,4\n01,9,9,9\n").expect("write csv");

        let preview = view.import_preview(&path).expect("preview");
        assert_eq!(preview.rows[0].status, PreviewStatus::Matched);
        assert_eq!(preview.rows[0].student_id.as_deref(), Some("s1"));
        assert_eq!(preview.rows[1].status, PreviewStatus::DuplicateStudent);
        let id = preview.preview_id.clone();

        let applied = view.import_confirm(&id).expect("confirm");
        assert_eq!(applied.applied, 1);
        assert_eq!(applied.skipped, 1);
        let rows = view.rows(&MarksQuery::default()).expect("rows");
        assert_eq!(rows[0].total, Some(12.0));
    }

    #[test]
    fn numeric_roll_cells_match_padded_roll_numbers() {
        assert!(roll_matches("01", "1"));
        assert!(roll_matches("A-07", "a-07"));
        assert!(!roll_matches("01", "10"));
        assert!(!roll_matches("A1", "1"));
    }
}
