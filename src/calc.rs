use crate::model::{Exam, ExamType, MarkRecord, Student};
use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

/// One-decimal rounding used for every displayed percentage:
/// `Int(10*|x| + 0.5) / 10` with the sign of `x`, so gaps round the same
/// either side of zero.
pub fn round_off_1_decimal(x: f64) -> f64 {
    let r = ((10.0 * x.abs()) + 0.5).floor() / 10.0;
    if r == 0.0 {
        0.0
    } else {
        r.copysign(x)
    }
}

pub fn round_2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub fn percent_of(value: f64, out_of: f64) -> f64 {
    if out_of > 0.0 {
        100.0 * value / out_of
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum ExamSortField {
    #[default]
    Name,
    Date,
    Type,
    TotalMarks,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExamQuery {
    /// Lowercased, trimmed; `None` when blank.
    pub search: Option<String>,
    pub exam_type: Option<ExamType>,
    pub sort_by: ExamSortField,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkSortField {
    #[default]
    RollNo,
    Name,
    Total,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MarksQuery {
    pub search: Option<String>,
    pub sort_by: MarkSortField,
    pub order: SortOrder,
}

fn opt_str<'a>(
    obj: &'a serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<Option<&'a str>, CalcError> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_str()
            .map(Some)
            .ok_or_else(|| CalcError::new("bad_params", format!("{key} must be a string or null"))),
    }
}

fn parse_search(obj: &serde_json::Map<String, serde_json::Value>) -> Result<Option<String>, CalcError> {
    Ok(opt_str(obj, "search")?
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty()))
}

fn parse_order(obj: &serde_json::Map<String, serde_json::Value>) -> Result<SortOrder, CalcError> {
    match opt_str(obj, "order")?.map(|s| s.trim().to_ascii_lowercase()) {
        None => Ok(SortOrder::Asc),
        Some(s) if s == "asc" => Ok(SortOrder::Asc),
        Some(s) if s == "desc" => Ok(SortOrder::Desc),
        Some(_) => Err(CalcError::new("bad_params", "order must be one of: asc, desc")),
    }
}

pub fn parse_exam_query(raw: &serde_json::Value) -> Result<ExamQuery, CalcError> {
    let empty = serde_json::Map::new();
    let obj = match raw {
        serde_json::Value::Null => &empty,
        serde_json::Value::Object(o) => o,
        _ => return Err(CalcError::new("bad_params", "params must be an object")),
    };

    let exam_type = match opt_str(obj, "type")?.map(str::trim) {
        None => None,
        Some(t) if t.is_empty() || t.eq_ignore_ascii_case("all") => None,
        Some(t) => match ExamType::parse(t) {
            Some(v) => Some(v),
            None => {
                return Err(CalcError::new(
                    "bad_params",
                    format!("unknown exam type filter: {t}"),
                ))
            }
        },
    };

    let sort_by = match opt_str(obj, "sortBy")? {
        None => ExamSortField::Name,
        Some("name") => ExamSortField::Name,
        Some("date") => ExamSortField::Date,
        Some("type") => ExamSortField::Type,
        Some("totalMarks") => ExamSortField::TotalMarks,
        Some(_) => {
            return Err(CalcError::new(
                "bad_params",
                "sortBy must be one of: name, date, type, totalMarks",
            ))
        }
    };

    Ok(ExamQuery {
        search: parse_search(obj)?,
        exam_type,
        sort_by,
        order: parse_order(obj)?,
    })
}

pub fn parse_marks_query(raw: &serde_json::Value) -> Result<MarksQuery, CalcError> {
    let empty = serde_json::Map::new();
    let obj = match raw {
        serde_json::Value::Null => &empty,
        serde_json::Value::Object(o) => o,
        _ => return Err(CalcError::new("bad_params", "params must be an object")),
    };
    let sort_by = match opt_str(obj, "sortBy")? {
        None => MarkSortField::RollNo,
        Some("rollNo") => MarkSortField::RollNo,
        Some("name") => MarkSortField::Name,
        Some("total") => MarkSortField::Total,
        Some(_) => {
            return Err(CalcError::new(
                "bad_params",
                "sortBy must be one of: rollNo, name, total",
            ))
        }
    };
    Ok(MarksQuery {
        search: parse_search(obj)?,
        sort_by,
        order: parse_order(obj)?,
    })
}

fn exam_matches(exam: &Exam, q: &ExamQuery) -> bool {
    if let Some(t) = q.exam_type {
        if exam.exam_type != t {
            return false;
        }
    }
    let Some(term) = q.search.as_deref() else {
        return true;
    };
    exam.name.to_lowercase().contains(term)
        || exam.exam_type.label().to_lowercase().contains(term)
}

fn exam_date(exam: &Exam) -> Option<NaiveDate> {
    exam.date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}

fn compare_exams(a: &Exam, b: &Exam, field: ExamSortField) -> Ordering {
    let primary = match field {
        ExamSortField::Name => a
            .name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name)),
        ExamSortField::Date => exam_date(a).cmp(&exam_date(b)),
        ExamSortField::Type => a.exam_type.label().cmp(b.exam_type.label()),
        ExamSortField::TotalMarks => a.total_marks().total_cmp(&b.total_marks()),
    };
    // Ids are unique, so the order is total and desc is the exact reverse of asc.
    primary.then_with(|| a.id.cmp(&b.id))
}

pub fn project_exams<'a>(exams: &'a [Exam], q: &ExamQuery) -> Vec<&'a Exam> {
    let mut out: Vec<&Exam> = exams.iter().filter(|e| exam_matches(e, q)).collect();
    out.sort_by(|a, b| compare_exams(a, b, q.sort_by));
    if q.order == SortOrder::Desc {
        out.reverse();
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRow {
    pub student_id: String,
    pub roll_no: String,
    pub name: String,
    /// One slot per exam question, in question order.
    pub scores: Vec<Option<f64>>,
    pub total: Option<f64>,
    pub percentage: Option<f64>,
}

pub fn build_mark_rows(
    exam: &Exam,
    roster: &[Student],
    records: &HashMap<String, MarkRecord>,
) -> Vec<MarkRow> {
    let out_of = exam.total_marks();
    roster
        .iter()
        .map(|s| {
            let rec = records.get(&s.id);
            let scores = exam
                .questions
                .iter()
                .map(|q| rec.and_then(|r| r.scores.get(&q.id).copied()))
                .collect();
            let total = rec.map(|r| r.total(exam));
            MarkRow {
                student_id: s.id.clone(),
                roll_no: s.roll_no.clone(),
                name: s.name.clone(),
                scores,
                total,
                percentage: total.map(|t| round_2(percent_of(t, out_of))),
            }
        })
        .collect()
}

fn compare_rows(a: &MarkRow, b: &MarkRow, field: MarkSortField) -> Ordering {
    let primary = match field {
        MarkSortField::RollNo => a.roll_no.cmp(&b.roll_no),
        MarkSortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        // Students without a record sort before any total.
        MarkSortField::Total => match (a.total, b.total) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => x.total_cmp(&y),
        },
    };
    primary.then_with(|| a.student_id.cmp(&b.student_id))
}

pub fn project_mark_rows(rows: Vec<MarkRow>, q: &MarksQuery) -> Vec<MarkRow> {
    let mut out: Vec<MarkRow> = rows
        .into_iter()
        .filter(|r| match q.search.as_deref() {
            None => true,
            Some(term) => {
                r.name.to_lowercase().contains(term) || r.roll_no.to_lowercase().contains(term)
            }
        })
        .collect();
    out.sort_by(|a, b| compare_rows(a, b, q.sort_by));
    if q.order == SortOrder::Desc {
        out.reverse();
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBand {
    pub grade: &'static str,
    pub min_percent: f64,
    pub max_percent: Option<f64>,
    pub count: usize,
}

const GRADE_BANDS: [(&str, f64, Option<f64>); 5] = [
    ("A", 90.0, None),
    ("B", 80.0, Some(90.0)),
    ("C", 70.0, Some(80.0)),
    ("D", 60.0, Some(70.0)),
    ("F", f64::NEG_INFINITY, Some(60.0)),
];

pub fn grade_for_percent(p: f64) -> &'static str {
    GRADE_BANDS
        .iter()
        .find(|(_, min, _)| p >= *min)
        .map(|(g, _, _)| *g)
        .unwrap_or("F")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarksStats {
    pub count: usize,
    pub total_marks: f64,
    pub pass_threshold: f64,
    pub pass_count: usize,
    /// Percent of defined totals at or above the pass threshold.
    pub pass_rate: f64,
    pub average: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub median: Option<f64>,
    pub std_dev: f64,
    pub distribution: Vec<GradeBand>,
}

fn compute_median(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    if n % 2 == 1 {
        Some(sorted[n / 2])
    } else {
        Some((sorted[(n / 2) - 1] + sorted[n / 2]) / 2.0)
    }
}

/// `totals` holds one entry per student with a record; absent students are not passed in.
pub fn compute_marks_stats(totals: &[f64], total_marks: f64, pass_fraction: f64) -> MarksStats {
    let mut sorted = totals.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let n = sorted.len();
    let pass_threshold = pass_fraction * total_marks;

    let sum: f64 = sorted.iter().sum();
    let average = if n > 0 { sum / n as f64 } else { 0.0 };
    let pass_count = sorted.iter().filter(|t| **t >= pass_threshold).count();
    let pass_rate = if n > 0 {
        100.0 * pass_count as f64 / n as f64
    } else {
        0.0
    };
    let std_dev = if n > 0 {
        let var = sorted.iter().map(|t| (t - average).powi(2)).sum::<f64>() / n as f64;
        var.sqrt()
    } else {
        0.0
    };

    let mut counts: HashMap<&'static str, usize> = HashMap::new();
    for t in &sorted {
        *counts
            .entry(grade_for_percent(percent_of(*t, total_marks)))
            .or_default() += 1;
    }
    let distribution = GRADE_BANDS
        .iter()
        .map(|(grade, min, max)| GradeBand {
            grade: *grade,
            min_percent: if min.is_finite() { *min } else { 0.0 },
            max_percent: *max,
            count: counts.get(grade).copied().unwrap_or(0),
        })
        .collect();

    MarksStats {
        count: n,
        total_marks,
        pass_threshold: round_2(pass_threshold),
        pass_count,
        pass_rate: round_2(pass_rate),
        average: round_2(average),
        min: sorted.first().copied(),
        max: sorted.last().copied(),
        median: compute_median(&sorted).map(round_2),
        std_dev: round_2(std_dev),
        distribution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BloomLevel, Difficulty, Question, Section};
    use serde_json::json;

    fn exam(id: &str, name: &str, t: ExamType, date: Option<&str>, marks: &[f64]) -> Exam {
        Exam {
            id: id.into(),
            name: name.into(),
            subject_id: "s".into(),
            exam_type: t,
            date: date.map(str::to_string),
            duration_minutes: None,
            questions: marks
                .iter()
                .enumerate()
                .map(|(i, m)| Question {
                    id: format!("{id}-q{i}"),
                    number: i as i64 + 1,
                    text: String::new(),
                    max_marks: *m,
                    section: Section::A,
                    bloom_level: BloomLevel::Remember,
                    difficulty: Difficulty::Easy,
                    co_weights: Vec::new(),
                })
                .collect(),
        }
    }

    fn sample() -> Vec<Exam> {
        vec![
            exam("e1", "Midterm Algebra", ExamType::Midterm, Some("2026-02-10"), &[20.0, 30.0]),
            exam("e2", "quiz 1", ExamType::Quiz, Some("2026-01-15"), &[10.0]),
            exam("e3", "Final Paper", ExamType::Final, None, &[40.0, 60.0]),
            exam("e4", "Lab Practical", ExamType::Practical, Some("2026-03-01"), &[25.0]),
        ]
    }

    fn ids(v: &[&Exam]) -> Vec<String> {
        v.iter().map(|e| e.id.clone()).collect()
    }

    #[test]
    fn round_off_matches_display_rounding() {
        assert_eq!(round_off_1_decimal(0.0), 0.0);
        assert_eq!(round_off_1_decimal(3.54), 3.5);
        assert_eq!(round_off_1_decimal(3.55), 3.6);
        assert_eq!(round_off_1_decimal(66.6667), 66.7);
        assert_eq!(round_off_1_decimal(2.35), 2.4);
        assert_eq!(round_off_1_decimal(-2.35), -2.4);
        assert_eq!(round_off_1_decimal(-6.6667), -6.7);
        assert!(round_off_1_decimal(-0.04).is_sign_positive());
        assert_eq!(round_2(74.0 / 3.0), 24.67);
    }

    #[test]
    fn search_is_case_insensitive_on_name_and_type() {
        let exams = sample();
        let q = parse_exam_query(&json!({ "search": "QUIZ" })).expect("query");
        assert_eq!(ids(&project_exams(&exams, &q)), vec!["e2"]);

        let q = parse_exam_query(&json!({ "search": "midterm" })).expect("query");
        assert_eq!(ids(&project_exams(&exams, &q)), vec!["e1"]);

        let q = parse_exam_query(&json!({ "search": "zzz-none" })).expect("query");
        assert!(project_exams(&exams, &q).is_empty());
    }

    #[test]
    fn type_filter_and_all() {
        let exams = sample();
        let q = parse_exam_query(&json!({ "type": "final" })).expect("query");
        assert_eq!(ids(&project_exams(&exams, &q)), vec!["e3"]);
        let q = parse_exam_query(&json!({ "type": "all" })).expect("query");
        assert_eq!(project_exams(&exams, &q).len(), 4);
        assert!(parse_exam_query(&json!({ "type": "oral" })).is_err());
    }

    #[test]
    fn desc_is_exact_reverse_of_asc_for_every_field() {
        let exams = sample();
        for field in ["name", "date", "type", "totalMarks"] {
            let asc = parse_exam_query(&json!({ "sortBy": field })).expect("asc");
            let desc = parse_exam_query(&json!({ "sortBy": field, "order": "desc" })).expect("desc");
            let mut a = ids(&project_exams(&exams, &asc));
            let d = ids(&project_exams(&exams, &desc));
            a.reverse();
            assert_eq!(a, d, "field {field}");
        }
    }

    #[test]
    fn sorting_by_total_and_date() {
        let exams = sample();
        let q = parse_exam_query(&json!({ "sortBy": "totalMarks" })).expect("query");
        assert_eq!(ids(&project_exams(&exams, &q)), vec!["e2", "e4", "e1", "e3"]);
        let q = parse_exam_query(&json!({ "sortBy": "date" })).expect("query");
        assert_eq!(ids(&project_exams(&exams, &q)), vec!["e3", "e2", "e1", "e4"]);
    }

    #[test]
    fn ties_break_on_id() {
        let exams = vec![
            exam("b", "Same", ExamType::Quiz, None, &[5.0]),
            exam("a", "Same", ExamType::Quiz, None, &[5.0]),
        ];
        let q = parse_exam_query(&json!({ "sortBy": "totalMarks" })).expect("query");
        assert_eq!(ids(&project_exams(&exams, &q)), vec!["a", "b"]);
    }

    #[test]
    fn stats_over_defined_totals() {
        let s = compute_marks_stats(&[20.0, 24.0, 30.0], 40.0, 0.4);
        assert_eq!(s.count, 3);
        assert_eq!(s.average, 24.67);
        assert_eq!(s.pass_threshold, 16.0);
        assert_eq!(s.pass_count, 3);
        assert_eq!(s.pass_rate, 100.0);
        assert_eq!(s.min, Some(20.0));
        assert_eq!(s.max, Some(30.0));
        assert_eq!(s.median, Some(24.0));
        assert_eq!(s.std_dev, 4.11);
        let grades: Vec<(&str, usize)> = s.distribution.iter().map(|b| (b.grade, b.count)).collect();
        assert_eq!(grades, vec![("A", 0), ("B", 0), ("C", 1), ("D", 1), ("F", 1)]);
    }

    #[test]
    fn stats_empty_is_zero() {
        let s = compute_marks_stats(&[], 40.0, 0.4);
        assert_eq!(s.count, 0);
        assert_eq!(s.pass_rate, 0.0);
        assert_eq!(s.average, 0.0);
        assert_eq!(s.median, None);
    }

    #[test]
    fn pass_threshold_is_inclusive() {
        let s = compute_marks_stats(&[15.5, 16.0], 40.0, 0.4);
        assert_eq!(s.pass_count, 1);
        assert_eq!(s.pass_rate, 50.0);
    }

    #[test]
    fn grade_band_edges() {
        assert_eq!(grade_for_percent(90.0), "A");
        assert_eq!(grade_for_percent(89.99), "B");
        assert_eq!(grade_for_percent(80.0), "B");
        assert_eq!(grade_for_percent(60.0), "D");
        assert_eq!(grade_for_percent(59.9), "F");
        assert_eq!(grade_for_percent(0.0), "F");
    }

    #[test]
    fn mark_rows_keep_absent_students_sparse() {
        let e = exam("e1", "Quiz", ExamType::Quiz, None, &[10.0, 10.0]);
        let roster = vec![
            Student {
                id: "s2".into(),
                class_id: "c".into(),
                name: "Zed".into(),
                roll_no: "02".into(),
            },
            Student {
                id: "s1".into(),
                class_id: "c".into(),
                name: "amy".into(),
                roll_no: "01".into(),
            },
        ];
        let mut rec = MarkRecord::new("e1", "s2");
        rec.scores.insert("e1-q0".into(), 7.0);
        let records: HashMap<String, MarkRecord> = [("s2".to_string(), rec)].into_iter().collect();

        let rows = build_mark_rows(&e, &roster, &records);
        assert_eq!(rows[0].scores, vec![Some(7.0), None]);
        assert_eq!(rows[0].total, Some(7.0));
        assert_eq!(rows[0].percentage, Some(35.0));
        assert_eq!(rows[1].total, None);

        let q = parse_marks_query(&json!({ "sortBy": "total", "order": "desc" })).expect("query");
        let sorted = project_mark_rows(rows.clone(), &q);
        assert_eq!(sorted[0].student_id, "s2");

        let q = parse_marks_query(&json!({ "search": "AM" })).expect("query");
        let found = project_mark_rows(rows, &q);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].student_id, "s1");
    }
}
