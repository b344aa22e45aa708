use crate::calc::percent_of;
use crate::model::{
    AttainmentSummary, BloomLevel, CoAttainmentRow, CoPoWeight, CourseOutcome, Difficulty,
    DistributionRow, Exam, ExamType, MarkRecord, PoAttainmentRow, ProgramOutcome, Question,
};
use crate::store::{
    AttainmentService, CoPoWeightLookup, DirectoryStore, ExamStore, MarksStore, OutcomeLookup,
    SqliteStore, StoreError,
};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttainmentParams {
    /// Student CO score (percent) needed to count as attaining the CO.
    pub student_threshold: f64,
    /// Share of the direct value in a PO total when an indirect value exists.
    pub direct_weight: f64,
}

impl Default for AttainmentParams {
    fn default() -> Self {
        Self {
            student_threshold: 60.0,
            direct_weight: 0.8,
        }
    }
}

pub fn attainment_level(percent: f64) -> i64 {
    if percent >= 70.0 {
        3
    } else if percent >= 60.0 {
        2
    } else if percent >= 50.0 {
        1
    } else {
        0
    }
}

pub struct AttainmentInput<'a> {
    pub subject_id: &'a str,
    pub exam_type: Option<ExamType>,
    pub exams: &'a [Exam],
    pub marks: &'a [MarkRecord],
    pub course_outcomes: &'a [CourseOutcome],
    pub program_outcomes: &'a [ProgramOutcome],
    pub co_po_weights: &'a [CoPoWeight],
    pub indirect: &'a HashMap<String, f64>,
}

struct CoOutcome {
    actual: f64,
    evidence: usize,
}

pub fn compute_attainment(input: &AttainmentInput<'_>, params: AttainmentParams) -> AttainmentSummary {
    let exams: Vec<&Exam> = input
        .exams
        .iter()
        .filter(|e| e.subject_id == input.subject_id)
        .filter(|e| input.exam_type.map(|t| e.exam_type == t).unwrap_or(true))
        .collect();
    let exam_index: HashMap<&str, &Exam> = exams.iter().map(|e| (e.id.as_str(), *e)).collect();
    let question_count: usize = exams.iter().map(|e| e.questions.len()).sum();

    // (exam, student) -> record
    let records: HashMap<(&str, &str), &MarkRecord> = input
        .marks
        .iter()
        .filter(|r| exam_index.contains_key(r.exam_id.as_str()))
        .map(|r| ((r.exam_id.as_str(), r.student_id.as_str()), r))
        .collect();
    let students: BTreeSet<&str> = records.keys().map(|(_, s)| *s).collect();

    let mut co_rows = Vec::with_capacity(input.course_outcomes.len());
    let mut co_outcomes: HashMap<&str, CoOutcome> = HashMap::new();
    for co in input.course_outcomes {
        let mapped: Vec<(&Exam, &Question, f64)> = exams
            .iter()
            .flat_map(|e| e.questions.iter().map(move |q| (*e, q)))
            .filter_map(|(e, q)| {
                q.co_weights
                    .iter()
                    .find(|w| w.co_id == co.id)
                    .map(|w| (e, q, w.weight))
            })
            .collect();

        let mut evidence = 0usize;
        let mut evaluated = 0usize;
        let mut attained = 0usize;
        for student in &students {
            let mut earned = 0.0;
            let mut possible = 0.0;
            for (e, q, w) in &mapped {
                let Some(rec) = records.get(&(e.id.as_str(), *student)) else {
                    continue;
                };
                let Some(score) = rec.scores.get(&q.id) else {
                    continue;
                };
                earned += score * w;
                possible += q.max_marks * w;
                evidence += 1;
            }
            if possible > 0.0 {
                evaluated += 1;
                if percent_of(earned, possible) >= params.student_threshold {
                    attained += 1;
                }
            }
        }

        let actual = if evaluated > 0 {
            100.0 * attained as f64 / evaluated as f64
        } else {
            0.0
        };
        co_outcomes.insert(co.id.as_str(), CoOutcome { actual, evidence });
        co_rows.push(CoAttainmentRow {
            co_id: co.id.clone(),
            code: co.code.clone(),
            target_percent: co.target_percent,
            actual_percent: actual,
            level: attainment_level(actual),
            gap: actual - co.target_percent,
            coverage_percent: percent_of(mapped.len() as f64, question_count as f64),
            evidence_count: evidence,
        });
    }

    let co_codes: HashMap<&str, &str> = input
        .course_outcomes
        .iter()
        .map(|c| (c.id.as_str(), c.code.as_str()))
        .collect();
    let po_rows = input
        .program_outcomes
        .iter()
        .map(|po| {
            let mut weighted = 0.0;
            let mut weight_sum = 0.0;
            let mut contributing = Vec::new();
            for w in input.co_po_weights.iter().filter(|w| w.po_id == po.id && w.weight > 0) {
                let Some(outcome) = co_outcomes.get(w.co_id.as_str()) else {
                    continue;
                };
                if outcome.evidence == 0 {
                    continue;
                }
                weighted += outcome.actual * w.weight as f64;
                weight_sum += w.weight as f64;
                if let Some(code) = co_codes.get(w.co_id.as_str()) {
                    contributing.push(code.to_string());
                }
            }
            let direct = if weight_sum > 0.0 {
                weighted / weight_sum
            } else {
                0.0
            };
            let indirect = input.indirect.get(&po.id).copied();
            let total = match indirect {
                Some(i) => direct * params.direct_weight + i * (1.0 - params.direct_weight),
                None => direct,
            };
            contributing.sort();
            PoAttainmentRow {
                po_id: po.id.clone(),
                code: po.code.clone(),
                target_percent: po.target_percent,
                direct_percent: direct,
                indirect_percent: indirect,
                total_percent: total,
                level: attainment_level(total),
                gap: total - po.target_percent,
                contributing_cos: contributing,
            }
        })
        .collect();

    let all_marks: f64 = exams.iter().map(|e| e.total_marks()).sum();
    let bloom_distribution = BloomLevel::ALL
        .iter()
        .map(|lvl| {
            distribution_row(&exams, all_marks, lvl.as_str(), lvl.label(), |q| {
                q.bloom_level == *lvl
            })
        })
        .collect();
    let difficulty_distribution = Difficulty::ALL
        .iter()
        .map(|d| distribution_row(&exams, all_marks, d.as_str(), d.label(), |q| q.difficulty == *d))
        .collect();

    AttainmentSummary {
        subject_id: input.subject_id.to_string(),
        exam_type: input.exam_type,
        student_count: students.len(),
        co_rows,
        po_rows,
        bloom_distribution,
        difficulty_distribution,
    }
}

fn distribution_row<F>(exams: &[&Exam], all_marks: f64, key: &str, label: &str, pred: F) -> DistributionRow
where
    F: Fn(&Question) -> bool,
{
    let (count, marks) = exams
        .iter()
        .flat_map(|e| e.questions.iter())
        .filter(|q| pred(q))
        .fold((0usize, 0.0f64), |(c, m), q| (c + 1, m + q.max_marks));
    DistributionRow {
        key: key.to_string(),
        label: label.to_string(),
        question_count: count,
        marks,
        marks_percent: percent_of(marks, all_marks),
    }
}

impl SqliteStore<'_> {
    fn indirect_for_subject(&self, subject_id: &str) -> Result<HashMap<String, f64>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT po_id, percent FROM po_indirect WHERE subject_id = ?")?;
        let rows = stmt
            .query_map([subject_id], |r| Ok((r.get::<_, String>(0)?, r.get::<_, f64>(1)?)))?
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(rows)
    }
}

impl AttainmentService for SqliteStore<'_> {
    fn attainment_summary(
        &self,
        subject_id: &str,
        exam_type: Option<ExamType>,
    ) -> Result<AttainmentSummary, StoreError> {
        let Some(subject) = self.subject(subject_id)? else {
            return Err(StoreError::Query(rusqlite::Error::QueryReturnedNoRows));
        };
        let exams: Vec<Exam> = self
            .list_exams()?
            .into_iter()
            .filter(|e| e.subject_id == subject.id)
            .collect();
        let mut marks = Vec::new();
        for e in &exams {
            marks.extend(self.marks_for_exam(&e.id)?);
        }
        let course_outcomes = self.course_outcomes_for_subject(&subject.id)?;
        let program_outcomes = self.program_outcomes_for_department(&subject.department_id)?;
        let co_po_weights = self.co_po_weights_for_subject(&subject.id)?;
        let indirect = self.indirect_for_subject(&subject.id)?;

        Ok(compute_attainment(
            &AttainmentInput {
                subject_id: &subject.id,
                exam_type,
                exams: &exams,
                marks: &marks,
                course_outcomes: &course_outcomes,
                program_outcomes: &program_outcomes,
                co_po_weights: &co_po_weights,
                indirect: &indirect,
            },
            self.attainment,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CoWeight, Section};

    fn q(id: &str, max: f64, bloom: BloomLevel, diff: Difficulty, cos: &[(&str, f64)]) -> Question {
        Question {
            id: id.into(),
            number: 0,
            text: String::new(),
            max_marks: max,
            section: Section::A,
            bloom_level: bloom,
            difficulty: diff,
            co_weights: cos
                .iter()
                .map(|(c, w)| CoWeight {
                    co_id: c.to_string(),
                    weight: *w,
                })
                .collect(),
        }
    }

    fn co(id: &str, code: &str, target: f64) -> CourseOutcome {
        CourseOutcome {
            id: id.into(),
            subject_id: "sub".into(),
            code: code.into(),
            description: String::new(),
            target_percent: target,
        }
    }

    fn record(exam: &str, student: &str, scores: &[(&str, f64)]) -> MarkRecord {
        let mut r = MarkRecord::new(exam, student);
        for (qid, s) in scores {
            r.scores.insert(qid.to_string(), *s);
        }
        r
    }

    #[test]
    fn co_and_po_attainment_from_marks() {
        let exams = vec![Exam {
            id: "e1".into(),
            name: "Midterm".into(),
            subject_id: "sub".into(),
            exam_type: ExamType::Midterm,
            date: None,
            duration_minutes: None,
            questions: vec![
                q("q1", 10.0, BloomLevel::Remember, Difficulty::Easy, &[("co1", 100.0)]),
                q("q2", 10.0, BloomLevel::Apply, Difficulty::Hard, &[("co2", 100.0)]),
                q("q3", 20.0, BloomLevel::Apply, Difficulty::Medium, &[]),
            ],
        }];
        let marks = vec![
            record("e1", "s1", &[("q1", 8.0), ("q2", 3.0)]),
            record("e1", "s2", &[("q1", 5.0), ("q2", 9.0)]),
            record("e1", "s3", &[("q1", 6.0)]),
        ];
        let cos = vec![co("co1", "CO1", 60.0), co("co2", "CO2", 50.0)];
        let pos = vec![ProgramOutcome {
            id: "po1".into(),
            department_id: "d".into(),
            code: "PO1".into(),
            description: String::new(),
            target_percent: 60.0,
        }];
        let weights = vec![
            CoPoWeight {
                co_id: "co1".into(),
                po_id: "po1".into(),
                weight: 3,
            },
            CoPoWeight {
                co_id: "co2".into(),
                po_id: "po1".into(),
                weight: 1,
            },
        ];
        let indirect = HashMap::new();

        let summary = compute_attainment(
            &AttainmentInput {
                subject_id: "sub",
                exam_type: None,
                exams: &exams,
                marks: &marks,
                course_outcomes: &cos,
                program_outcomes: &pos,
                co_po_weights: &weights,
                indirect: &indirect,
            },
            AttainmentParams::default(),
        );

        assert_eq!(summary.student_count, 3);
        // CO1: s1 80%, s2 50%, s3 60% -> 2 of 3 attain.
        let c1 = &summary.co_rows[0];
        assert!((c1.actual_percent - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(c1.level, 2);
        assert_eq!(c1.evidence_count, 3);
        assert!((c1.coverage_percent - 100.0 / 3.0).abs() < 1e-9);
        // CO2: s1 30%, s2 90% -> 1 of 2.
        let c2 = &summary.co_rows[1];
        assert_eq!(c2.actual_percent, 50.0);
        assert_eq!(c2.gap, 0.0);
        assert_eq!(c2.level, 1);

        let p1 = &summary.po_rows[0];
        let expected = (200.0 / 3.0 * 3.0 + 50.0) / 4.0;
        assert!((p1.direct_percent - expected).abs() < 1e-9);
        assert_eq!(p1.total_percent, p1.direct_percent);
        assert_eq!(p1.contributing_cos, vec!["CO1", "CO2"]);

        let apply = summary
            .bloom_distribution
            .iter()
            .find(|d| d.key == "apply")
            .expect("apply row");
        assert_eq!(apply.question_count, 2);
        assert_eq!(apply.marks, 30.0);
        assert_eq!(apply.marks_percent, 75.0);
        assert_eq!(summary.difficulty_distribution.len(), 3);
    }

    #[test]
    fn indirect_blends_into_po_total() {
        let pos = vec![ProgramOutcome {
            id: "po1".into(),
            department_id: "d".into(),
            code: "PO1".into(),
            description: String::new(),
            target_percent: 60.0,
        }];
        let indirect: HashMap<String, f64> = [("po1".to_string(), 80.0)].into_iter().collect();
        let summary = compute_attainment(
            &AttainmentInput {
                subject_id: "sub",
                exam_type: Some(ExamType::Quiz),
                exams: &[],
                marks: &[],
                course_outcomes: &[],
                program_outcomes: &pos,
                co_po_weights: &[],
                indirect: &indirect,
            },
            AttainmentParams::default(),
        );
        let p = &summary.po_rows[0];
        assert_eq!(p.direct_percent, 0.0);
        assert!((p.total_percent - 16.0).abs() < 1e-9);
        assert!(p.contributing_cos.is_empty());
    }

    #[test]
    fn level_edges() {
        assert_eq!(attainment_level(70.0), 3);
        assert_eq!(attainment_level(69.9), 2);
        assert_eq!(attainment_level(50.0), 1);
        assert_eq!(attainment_level(49.9), 0);
    }
}
