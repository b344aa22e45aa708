use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Smallest mark step a question can carry.
pub const MARK_STEP: f64 = 0.5;

macro_rules! tag_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $key:literal, $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $key),+
                }
            }

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            pub fn parse(raw: &str) -> Option<Self> {
                let t = raw.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(t) || v.label().eq_ignore_ascii_case(t))
            }
        }
    };
}

tag_enum!(ExamType {
    Quiz => "quiz", "Quiz",
    Assignment => "assignment", "Assignment",
    Midterm => "midterm", "Midterm",
    Final => "final", "Final",
    Practical => "practical", "Practical",
    Project => "project", "Project",
});

tag_enum!(Section {
    A => "a", "A",
    B => "b", "B",
    C => "c", "C",
});

tag_enum!(
    /// Bloom's taxonomy level of a question.
    BloomLevel {
        Remember => "remember", "Remember",
        Understand => "understand", "Understand",
        Apply => "apply", "Apply",
        Analyze => "analyze", "Analyze",
        Evaluate => "evaluate", "Evaluate",
        Create => "create", "Create",
    }
);

tag_enum!(Difficulty {
    Easy => "easy", "Easy",
    Medium => "medium", "Medium",
    Hard => "hard", "Hard",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoWeight {
    pub co_id: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub number: i64,
    pub text: String,
    pub max_marks: f64,
    pub section: Section,
    pub bloom_level: BloomLevel,
    pub difficulty: Difficulty,
    pub co_weights: Vec<CoWeight>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Exam {
    pub id: String,
    pub name: String,
    pub subject_id: String,
    pub exam_type: ExamType,
    pub date: Option<String>,
    pub duration_minutes: Option<i64>,
    pub questions: Vec<Question>,
}

impl Exam {
    pub fn total_marks(&self) -> f64 {
        self.questions.iter().map(|q| q.max_marks).sum()
    }

    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    /// Display numbers follow list position.
    pub fn renumber(&mut self) {
        for (i, q) in self.questions.iter_mut().enumerate() {
            q.number = i as i64 + 1;
        }
    }
}

// Hand-written so `totalMarks` is always emitted from the question list.
impl Serialize for Exam {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("Exam", 8)?;
        s.serialize_field("id", &self.id)?;
        s.serialize_field("name", &self.name)?;
        s.serialize_field("subjectId", &self.subject_id)?;
        s.serialize_field("examType", &self.exam_type)?;
        s.serialize_field("date", &self.date)?;
        s.serialize_field("durationMinutes", &self.duration_minutes)?;
        s.serialize_field("totalMarks", &self.total_marks())?;
        s.serialize_field("questions", &self.questions)?;
        s.end()
    }
}

/// One student's scores for one exam. Absent questions have no entry yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkRecord {
    pub exam_id: String,
    pub student_id: String,
    pub scores: BTreeMap<String, f64>,
}

impl MarkRecord {
    pub fn new(exam_id: &str, student_id: &str) -> Self {
        Self {
            exam_id: exam_id.to_string(),
            student_id: student_id.to_string(),
            scores: BTreeMap::new(),
        }
    }

    /// Sum over the exam's current questions; stale or missing entries count as zero.
    pub fn total(&self, exam: &Exam) -> f64 {
        exam.questions
            .iter()
            .filter_map(|q| self.scores.get(&q.id))
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkSubmission {
    pub exam_id: String,
    pub student_id: String,
    pub scores: Vec<(String, f64)>,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub department_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassGroup {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub class_id: String,
    pub name: String,
    pub roll_no: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub code: String,
    pub name: String,
    pub class_id: String,
    pub department_id: String,
    pub instructor_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseOutcome {
    pub id: String,
    pub subject_id: String,
    pub code: String,
    pub description: String,
    pub target_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramOutcome {
    pub id: String,
    pub department_id: String,
    pub code: String,
    pub description: String,
    pub target_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoPoWeight {
    pub co_id: String,
    pub po_id: String,
    pub weight: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoAttainmentRow {
    pub co_id: String,
    pub code: String,
    pub target_percent: f64,
    pub actual_percent: f64,
    pub level: i64,
    pub gap: f64,
    pub coverage_percent: f64,
    pub evidence_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoAttainmentRow {
    pub po_id: String,
    pub code: String,
    pub target_percent: f64,
    pub direct_percent: f64,
    pub indirect_percent: Option<f64>,
    pub total_percent: f64,
    pub level: i64,
    pub gap: f64,
    pub contributing_cos: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionRow {
    pub key: String,
    pub label: String,
    pub question_count: usize,
    pub marks: f64,
    pub marks_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttainmentSummary {
    pub subject_id: String,
    pub exam_type: Option<ExamType>,
    pub student_count: usize,
    pub co_rows: Vec<CoAttainmentRow>,
    pub po_rows: Vec<PoAttainmentRow>,
    pub bloom_distribution: Vec<DistributionRow>,
    pub difficulty_distribution: Vec<DistributionRow>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: &str, max_marks: f64) -> Question {
        Question {
            id: id.to_string(),
            number: 0,
            text: String::new(),
            max_marks,
            section: Section::A,
            bloom_level: BloomLevel::Apply,
            difficulty: Difficulty::Medium,
            co_weights: Vec::new(),
        }
    }

    fn exam(questions: Vec<Question>) -> Exam {
        Exam {
            id: "e1".into(),
            name: "Unit Test".into(),
            subject_id: "s1".into(),
            exam_type: ExamType::Quiz,
            date: None,
            duration_minutes: None,
            questions,
        }
    }

    #[test]
    fn total_marks_follows_question_list() {
        let mut e = exam(vec![question("q1", 10.0), question("q2", 15.0)]);
        assert_eq!(e.total_marks(), 25.0);
        e.questions.push(question("q3", 5.0));
        assert_eq!(e.total_marks(), 30.0);
        e.questions.remove(0);
        assert_eq!(e.total_marks(), 20.0);

        let v = serde_json::to_value(&e).expect("serialize exam");
        assert_eq!(v["totalMarks"], serde_json::json!(20.0));
    }

    #[test]
    fn record_total_ignores_entries_for_removed_questions() {
        let e = exam(vec![question("q1", 10.0), question("q2", 15.0)]);
        let mut r = MarkRecord::new("e1", "st1");
        r.scores.insert("q1".into(), 7.5);
        r.scores.insert("gone".into(), 4.0);
        assert_eq!(r.total(&e), 7.5);
    }

    #[test]
    fn tags_parse_key_or_label() {
        assert_eq!(ExamType::parse("Midterm"), Some(ExamType::Midterm));
        assert_eq!(BloomLevel::parse(" analyze "), Some(BloomLevel::Analyze));
        assert_eq!(Section::parse("b"), Some(Section::B));
        assert_eq!(Difficulty::parse("extreme"), None);
    }
}
