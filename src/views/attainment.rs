use super::ViewError;
use crate::calc::round_off_1_decimal;
use crate::model::{AttainmentSummary, ExamType, Subject, User};
use crate::store::{AttainmentService, DirectoryStore};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Variant {
    #[default]
    Basic,
    Advanced,
}

impl Variant {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "basic" => Some(Variant::Basic),
            "advanced" => Some(Variant::Advanced),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Variant::Basic => "basic",
            Variant::Advanced => "advanced",
        }
    }
}

struct Selection {
    subject: Subject,
    exam_type: Option<ExamType>,
    summary: AttainmentSummary,
}

#[derive(Default)]
pub struct AttainmentView {
    variant: Variant,
    selection: Option<Selection>,
}

fn r1(x: f64) -> f64 {
    round_off_1_decimal(x)
}

pub fn render_basic(subject: &Subject, s: &AttainmentSummary) -> serde_json::Value {
    json!({
        "variant": "basic",
        "subject": { "id": subject.id, "code": subject.code, "name": subject.name },
        "examType": s.exam_type,
        "studentCount": s.student_count,
        "coRows": s.co_rows.iter().map(|r| json!({
            "code": r.code,
            "targetPercent": r1(r.target_percent),
            "actualPercent": r1(r.actual_percent),
            "level": r.level,
        })).collect::<Vec<_>>(),
        "poRows": s.po_rows.iter().map(|r| json!({
            "code": r.code,
            "totalPercent": r1(r.total_percent),
            "level": r.level,
        })).collect::<Vec<_>>(),
    })
}

pub fn render_advanced(subject: &Subject, s: &AttainmentSummary) -> serde_json::Value {
    let dist = |rows: &[crate::model::DistributionRow]| {
        rows.iter()
            .map(|d| {
                json!({
                    "key": d.key,
                    "label": d.label,
                    "questionCount": d.question_count,
                    "marks": d.marks,
                    "marksPercent": r1(d.marks_percent),
                })
            })
            .collect::<Vec<_>>()
    };
    json!({
        "variant": "advanced",
        "subject": {
            "id": subject.id,
            "code": subject.code,
            "name": subject.name,
            "departmentId": subject.department_id,
            "classId": subject.class_id,
        },
        "examType": s.exam_type,
        "studentCount": s.student_count,
        "coRows": s.co_rows.iter().map(|r| json!({
            "coId": r.co_id,
            "code": r.code,
            "targetPercent": r1(r.target_percent),
            "actualPercent": r1(r.actual_percent),
            "gap": r1(r.gap),
            "level": r.level,
            "coveragePercent": r1(r.coverage_percent),
            "evidenceCount": r.evidence_count,
        })).collect::<Vec<_>>(),
        "poRows": s.po_rows.iter().map(|r| json!({
            "poId": r.po_id,
            "code": r.code,
            "targetPercent": r1(r.target_percent),
            "directPercent": r1(r.direct_percent),
            "indirectPercent": r.indirect_percent.map(r1),
            "totalPercent": r1(r.total_percent),
            "gap": r1(r.gap),
            "level": r.level,
            "contributingCos": r.contributing_cos,
        })).collect::<Vec<_>>(),
        "bloomDistribution": dist(&s.bloom_distribution),
        "difficultyDistribution": dist(&s.difficulty_distribution),
    })
}

impl AttainmentView {
    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn clear(&mut self) {
        self.selection = None;
    }

    fn render(&self) -> Option<serde_json::Value> {
        let sel = self.selection.as_ref()?;
        Some(match self.variant {
            Variant::Basic => render_basic(&sel.subject, &sel.summary),
            Variant::Advanced => render_advanced(&sel.subject, &sel.summary),
        })
    }

    /// Fetches a fresh summary. A subject that is missing or taught by someone
    /// else clears the selection and yields `None`.
    pub fn select<S>(
        &mut self,
        store: &S,
        owner: &User,
        subject_id: &str,
        exam_type: Option<ExamType>,
        variant: Option<Variant>,
    ) -> Result<Option<serde_json::Value>, ViewError>
    where
        S: DirectoryStore + AttainmentService + ?Sized,
    {
        if let Some(v) = variant {
            self.variant = v;
        }
        let subject = match store.subject(subject_id)? {
            Some(s) if s.instructor_id == owner.id => s,
            _ => {
                tracing::debug!(subject_id, "attainment selection cleared");
                self.selection = None;
                return Ok(None);
            }
        };
        let summary = store.attainment_summary(&subject.id, exam_type)?;
        self.selection = Some(Selection {
            subject,
            exam_type,
            summary,
        });
        Ok(self.render())
    }

    /// Switches renderer over the cached summary; nothing is refetched.
    pub fn set_variant(&mut self, variant: Variant) -> Option<serde_json::Value> {
        self.variant = variant;
        self.render()
    }

    pub fn current(&self) -> Option<(&str, Option<ExamType>)> {
        self.selection
            .as_ref()
            .map(|s| (s.subject.id.as_str(), s.exam_type))
    }
}
