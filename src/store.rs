//! Stores the views read from and write back to.
//!
//! Each trait is one collaborator contract. `SqliteStore` implements all of
//! them over the workspace database; views only see the traits.

use crate::attainment::AttainmentParams;
use crate::model::{
    AttainmentSummary, BloomLevel, ClassGroup, CoPoWeight, CoWeight, CourseOutcome, Department,
    Difficulty, Exam, ExamType, MarkRecord, MarkSubmission, ProgramOutcome, Question, Section,
    Student, Subject, User,
};
use rusqlite::{Connection, OptionalExtension, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    Query(#[from] rusqlite::Error),
    #[error("{table}: {source}")]
    Write {
        code: &'static str,
        table: &'static str,
        source: rusqlite::Error,
    },
    #[error("corrupt {table} row: {message}")]
    Corrupt { table: &'static str, message: String },
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Query(_) => "db_query_failed",
            StoreError::Write { code, .. } => *code,
            StoreError::Corrupt { .. } => "db_query_failed",
        }
    }

    pub fn table(&self) -> Option<&'static str> {
        match self {
            StoreError::Write { table, .. } | StoreError::Corrupt { table, .. } => Some(*table),
            StoreError::Query(_) => None,
        }
    }
}

fn write_err(code: &'static str, table: &'static str) -> impl FnOnce(rusqlite::Error) -> StoreError {
    move |source| StoreError::Write {
        code,
        table,
        source,
    }
}

pub trait ExamStore {
    fn list_exams(&self) -> Result<Vec<Exam>, StoreError>;
    fn get_exam(&self, exam_id: &str) -> Result<Option<Exam>, StoreError>;
    fn create_exam(&self, exam: &Exam) -> Result<(), StoreError>;
    fn update_exam(&self, exam: &Exam) -> Result<(), StoreError>;
    /// Returns false when no such exam existed.
    fn delete_exam(&self, exam_id: &str) -> Result<bool, StoreError>;
}

pub trait DirectoryStore {
    fn subjects(&self) -> Result<Vec<Subject>, StoreError>;
    fn subject(&self, subject_id: &str) -> Result<Option<Subject>, StoreError>;
    fn user(&self, user_id: &str) -> Result<Option<User>, StoreError>;
    fn students_in_class(&self, class_id: &str) -> Result<Vec<Student>, StoreError>;
}

pub trait OutcomeLookup {
    fn course_outcomes_for_subject(&self, subject_id: &str)
        -> Result<Vec<CourseOutcome>, StoreError>;
    fn program_outcomes_for_department(
        &self,
        department_id: &str,
    ) -> Result<Vec<ProgramOutcome>, StoreError>;
}

pub trait CoPoWeightLookup {
    fn co_po_weights_for_subject(&self, subject_id: &str) -> Result<Vec<CoPoWeight>, StoreError>;
}

pub trait MarksStore {
    fn marks_for_exam(&self, exam_id: &str) -> Result<Vec<MarkRecord>, StoreError>;
    fn save_marks(&self, submissions: &[MarkSubmission]) -> Result<(), StoreError>;
}

pub trait AttainmentService {
    fn attainment_summary(
        &self,
        subject_id: &str,
        exam_type: Option<ExamType>,
    ) -> Result<AttainmentSummary, StoreError>;
}

pub struct SqliteStore<'a> {
    pub(crate) conn: &'a Connection,
    pub(crate) attainment: AttainmentParams,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            attainment: AttainmentParams::default(),
        }
    }

    pub fn with_attainment(mut self, params: AttainmentParams) -> Self {
        self.attainment = params;
        self
    }

    fn load_questions(&self, exam_id: &str) -> Result<Vec<Question>, StoreError> {
        let mut weight_stmt = self.conn.prepare(
            "SELECT question_id, co_id, weight
             FROM question_co_weights
             WHERE exam_id = ?
             ORDER BY sort_order",
        )?;
        let mut weights: HashMap<String, Vec<CoWeight>> = HashMap::new();
        let rows = weight_stmt.query_map([exam_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, f64>(2)?,
            ))
        })?;
        for row in rows {
            let (question_id, co_id, weight) = row?;
            weights
                .entry(question_id)
                .or_default()
                .push(CoWeight { co_id, weight });
        }

        let mut stmt = self.conn.prepare(
            "SELECT id, idx, text, max_marks, section, bloom_level, difficulty
             FROM questions
             WHERE exam_id = ?
             ORDER BY idx",
        )?;
        let raw = stmt
            .query_map([exam_id], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, i64>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, f64>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, String>(5)?,
                    r.get::<_, String>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(raw.len());
        for (id, idx, text, max_marks, section, bloom_level, difficulty) in raw {
            let corrupt = |what: &str, v: &str| StoreError::Corrupt {
                table: "questions",
                message: format!("question {id}: unknown {what} {v:?}"),
            };
            let section = Section::parse(&section).ok_or_else(|| corrupt("section", &section))?;
            let bloom_level =
                BloomLevel::parse(&bloom_level).ok_or_else(|| corrupt("bloom level", &bloom_level))?;
            let difficulty =
                Difficulty::parse(&difficulty).ok_or_else(|| corrupt("difficulty", &difficulty))?;
            let co_weights = weights.remove(&id).unwrap_or_default();
            out.push(Question {
                id,
                number: idx + 1,
                text,
                max_marks,
                section,
                bloom_level,
                difficulty,
                co_weights,
            });
        }
        Ok(out)
    }

    fn exam_from_row(
        &self,
        id: String,
        subject_id: String,
        name: String,
        exam_type: String,
        date: Option<String>,
        duration_minutes: Option<i64>,
    ) -> Result<Exam, StoreError> {
        let Some(exam_type) = ExamType::parse(&exam_type) else {
            return Err(StoreError::Corrupt {
                table: "exams",
                message: format!("exam {id}: unknown type {exam_type:?}"),
            });
        };
        let questions = self.load_questions(&id)?;
        Ok(Exam {
            id,
            name,
            subject_id,
            exam_type,
            date,
            duration_minutes,
            questions,
        })
    }

    pub fn create_department(&self, name: &str) -> Result<Department, StoreError> {
        let d = Department {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
        };
        self.conn
            .execute(
                "INSERT INTO departments(id, name) VALUES(?, ?)",
                (&d.id, &d.name),
            )
            .map_err(write_err("db_insert_failed", "departments"))?;
        Ok(d)
    }

    pub fn create_user(&self, name: &str, department_id: Option<&str>) -> Result<User, StoreError> {
        let u = User {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            department_id: department_id.map(str::to_string),
        };
        self.conn
            .execute(
                "INSERT INTO users(id, name, department_id) VALUES(?, ?, ?)",
                (&u.id, &u.name, &u.department_id),
            )
            .map_err(write_err("db_insert_failed", "users"))?;
        Ok(u)
    }

    pub fn create_class(&self, name: &str) -> Result<ClassGroup, StoreError> {
        let c = ClassGroup {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
        };
        self.conn
            .execute("INSERT INTO classes(id, name) VALUES(?, ?)", (&c.id, &c.name))
            .map_err(write_err("db_insert_failed", "classes"))?;
        Ok(c)
    }

    pub fn create_student(
        &self,
        class_id: &str,
        name: &str,
        roll_no: &str,
    ) -> Result<Student, StoreError> {
        let s = Student {
            id: Uuid::new_v4().to_string(),
            class_id: class_id.to_string(),
            name: name.to_string(),
            roll_no: roll_no.to_string(),
        };
        self.conn
            .execute(
                "INSERT INTO students(id, class_id, name, roll_no) VALUES(?, ?, ?, ?)",
                (&s.id, &s.class_id, &s.name, &s.roll_no),
            )
            .map_err(write_err("db_insert_failed", "students"))?;
        Ok(s)
    }

    pub fn create_subject(
        &self,
        code: &str,
        name: &str,
        class_id: &str,
        department_id: &str,
        instructor_id: &str,
    ) -> Result<Subject, StoreError> {
        let s = Subject {
            id: Uuid::new_v4().to_string(),
            code: code.to_string(),
            name: name.to_string(),
            class_id: class_id.to_string(),
            department_id: department_id.to_string(),
            instructor_id: instructor_id.to_string(),
        };
        self.conn
            .execute(
                "INSERT INTO subjects(id, code, name, class_id, department_id, instructor_id)
                 VALUES(?, ?, ?, ?, ?, ?)",
                (
                    &s.id,
                    &s.code,
                    &s.name,
                    &s.class_id,
                    &s.department_id,
                    &s.instructor_id,
                ),
            )
            .map_err(write_err("db_insert_failed", "subjects"))?;
        Ok(s)
    }

    pub fn create_course_outcome(
        &self,
        subject_id: &str,
        code: &str,
        description: &str,
        target_percent: f64,
    ) -> Result<CourseOutcome, StoreError> {
        let co = CourseOutcome {
            id: Uuid::new_v4().to_string(),
            subject_id: subject_id.to_string(),
            code: code.to_string(),
            description: description.to_string(),
            target_percent,
        };
        self.conn
            .execute(
                "INSERT INTO course_outcomes(id, subject_id, code, description, target_percent)
                 VALUES(?, ?, ?, ?, ?)",
                (
                    &co.id,
                    &co.subject_id,
                    &co.code,
                    &co.description,
                    co.target_percent,
                ),
            )
            .map_err(write_err("db_insert_failed", "course_outcomes"))?;
        Ok(co)
    }

    pub fn create_program_outcome(
        &self,
        department_id: &str,
        code: &str,
        description: &str,
        target_percent: f64,
    ) -> Result<ProgramOutcome, StoreError> {
        let po = ProgramOutcome {
            id: Uuid::new_v4().to_string(),
            department_id: department_id.to_string(),
            code: code.to_string(),
            description: description.to_string(),
            target_percent,
        };
        self.conn
            .execute(
                "INSERT INTO program_outcomes(id, department_id, code, description, target_percent)
                 VALUES(?, ?, ?, ?, ?)",
                (
                    &po.id,
                    &po.department_id,
                    &po.code,
                    &po.description,
                    po.target_percent,
                ),
            )
            .map_err(write_err("db_insert_failed", "program_outcomes"))?;
        Ok(po)
    }

    pub fn set_co_po_weight(&self, co_id: &str, po_id: &str, weight: i64) -> Result<(), StoreError> {
        if weight == 0 {
            self.conn
                .execute(
                    "DELETE FROM co_po_weights WHERE co_id = ? AND po_id = ?",
                    (co_id, po_id),
                )
                .map_err(write_err("db_delete_failed", "co_po_weights"))?;
            return Ok(());
        }
        self.conn
            .execute(
                "INSERT INTO co_po_weights(co_id, po_id, weight) VALUES(?, ?, ?)
                 ON CONFLICT(co_id, po_id) DO UPDATE SET weight = excluded.weight",
                (co_id, po_id, weight),
            )
            .map_err(write_err("db_insert_failed", "co_po_weights"))?;
        Ok(())
    }

    pub fn set_indirect(&self, subject_id: &str, po_id: &str, percent: Option<f64>) -> Result<(), StoreError> {
        match percent {
            None => {
                self.conn
                    .execute(
                        "DELETE FROM po_indirect WHERE subject_id = ? AND po_id = ?",
                        (subject_id, po_id),
                    )
                    .map_err(write_err("db_delete_failed", "po_indirect"))?;
            }
            Some(p) => {
                self.conn
                    .execute(
                        "INSERT INTO po_indirect(subject_id, po_id, percent) VALUES(?, ?, ?)
                         ON CONFLICT(subject_id, po_id) DO UPDATE SET percent = excluded.percent",
                        (subject_id, po_id, p),
                    )
                    .map_err(write_err("db_insert_failed", "po_indirect"))?;
            }
        }
        Ok(())
    }

    pub fn course_outcome(&self, co_id: &str) -> Result<Option<CourseOutcome>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, subject_id, code, description, target_percent
                 FROM course_outcomes WHERE id = ?",
                [co_id],
                |r| {
                    Ok(CourseOutcome {
                        id: r.get(0)?,
                        subject_id: r.get(1)?,
                        code: r.get(2)?,
                        description: r.get(3)?,
                        target_percent: r.get(4)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn program_outcome(&self, po_id: &str) -> Result<Option<ProgramOutcome>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, department_id, code, description, target_percent
                 FROM program_outcomes WHERE id = ?",
                [po_id],
                |r| {
                    Ok(ProgramOutcome {
                        id: r.get(0)?,
                        department_id: r.get(1)?,
                        code: r.get(2)?,
                        description: r.get(3)?,
                        target_percent: r.get(4)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn class_exists(&self, class_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .conn
            .query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| {
                r.get::<_, i64>(0)
            })
            .optional()?
            .is_some())
    }

    pub fn department_exists(&self, department_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT 1 FROM departments WHERE id = ?",
                [department_id],
                |r| r.get::<_, i64>(0),
            )
            .optional()?
            .is_some())
    }
}

fn insert_questions(tx: &Transaction<'_>, exam: &Exam) -> Result<(), StoreError> {
    for (idx, q) in exam.questions.iter().enumerate() {
        tx.execute(
            "INSERT INTO questions(id, exam_id, idx, text, max_marks, section, bloom_level, difficulty)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &q.id,
                &exam.id,
                idx as i64,
                &q.text,
                q.max_marks,
                q.section.as_str(),
                q.bloom_level.as_str(),
                q.difficulty.as_str(),
            ),
        )
        .map_err(write_err("db_insert_failed", "questions"))?;
        for (sort_order, w) in q.co_weights.iter().enumerate() {
            tx.execute(
                "INSERT INTO question_co_weights(exam_id, question_id, co_id, weight, sort_order)
                 VALUES(?, ?, ?, ?, ?)",
                (&exam.id, &q.id, &w.co_id, w.weight, sort_order as i64),
            )
            .map_err(write_err("db_insert_failed", "question_co_weights"))?;
        }
    }
    Ok(())
}

fn delete_questions(tx: &Transaction<'_>, exam_id: &str) -> Result<(), StoreError> {
    tx.execute(
        "DELETE FROM question_co_weights WHERE exam_id = ?",
        [exam_id],
    )
    .map_err(write_err("db_delete_failed", "question_co_weights"))?;
    tx.execute("DELETE FROM questions WHERE exam_id = ?", [exam_id])
        .map_err(write_err("db_delete_failed", "questions"))?;
    Ok(())
}

fn now_stamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl ExamStore for SqliteStore<'_> {
    fn list_exams(&self) -> Result<Vec<Exam>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, subject_id, name, exam_type, date, duration_minutes FROM exams ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, Option<String>>(4)?,
                    r.get::<_, Option<i64>>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, subject_id, name, exam_type, date, duration)| {
                self.exam_from_row(id, subject_id, name, exam_type, date, duration)
            })
            .collect()
    }

    fn get_exam(&self, exam_id: &str) -> Result<Option<Exam>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, subject_id, name, exam_type, date, duration_minutes FROM exams WHERE id = ?",
                [exam_id],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, String>(3)?,
                        r.get::<_, Option<String>>(4)?,
                        r.get::<_, Option<i64>>(5)?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((id, subject_id, name, exam_type, date, duration)) => self
                .exam_from_row(id, subject_id, name, exam_type, date, duration)
                .map(Some),
            None => Ok(None),
        }
    }

    fn create_exam(&self, exam: &Exam) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO exams(id, subject_id, name, exam_type, date, duration_minutes, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                &exam.id,
                &exam.subject_id,
                &exam.name,
                exam.exam_type.as_str(),
                &exam.date,
                exam.duration_minutes,
                now_stamp(),
            ),
        )
        .map_err(write_err("db_insert_failed", "exams"))?;
        insert_questions(&tx, exam)?;
        tx.commit()
            .map_err(write_err("db_commit_failed", "exams"))?;
        Ok(())
    }

    fn update_exam(&self, exam: &Exam) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let changed = tx
            .execute(
                "UPDATE exams
                 SET subject_id = ?, name = ?, exam_type = ?, date = ?, duration_minutes = ?, updated_at = ?
                 WHERE id = ?",
                (
                    &exam.subject_id,
                    &exam.name,
                    exam.exam_type.as_str(),
                    &exam.date,
                    exam.duration_minutes,
                    now_stamp(),
                    &exam.id,
                ),
            )
            .map_err(write_err("db_update_failed", "exams"))?;
        if changed == 0 {
            return Err(StoreError::Query(rusqlite::Error::QueryReturnedNoRows));
        }
        delete_questions(&tx, &exam.id)?;
        insert_questions(&tx, exam)?;

        // Marks on removed questions no longer count; stored totals follow.
        tx.execute(
            "DELETE FROM marks
             WHERE exam_id = ?1 AND question_id NOT IN (SELECT id FROM questions WHERE exam_id = ?1)",
            [&exam.id],
        )
        .map_err(write_err("db_delete_failed", "marks"))?;
        tx.execute(
            "UPDATE mark_totals
             SET total = (
               SELECT COALESCE(SUM(m.score), 0) FROM marks m
               WHERE m.exam_id = mark_totals.exam_id AND m.student_id = mark_totals.student_id
             )
             WHERE exam_id = ?",
            [&exam.id],
        )
        .map_err(write_err("db_update_failed", "mark_totals"))?;

        tx.commit()
            .map_err(write_err("db_commit_failed", "exams"))?;
        Ok(())
    }

    fn delete_exam(&self, exam_id: &str) -> Result<bool, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM marks WHERE exam_id = ?", [exam_id])
            .map_err(write_err("db_delete_failed", "marks"))?;
        tx.execute("DELETE FROM mark_totals WHERE exam_id = ?", [exam_id])
            .map_err(write_err("db_delete_failed", "mark_totals"))?;
        delete_questions(&tx, exam_id)?;
        let changed = tx
            .execute("DELETE FROM exams WHERE id = ?", [exam_id])
            .map_err(write_err("db_delete_failed", "exams"))?;
        tx.commit()
            .map_err(write_err("db_commit_failed", "exams"))?;
        Ok(changed > 0)
    }
}

fn subject_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: r.get(0)?,
        code: r.get(1)?,
        name: r.get(2)?,
        class_id: r.get(3)?,
        department_id: r.get(4)?,
        instructor_id: r.get(5)?,
    })
}

impl DirectoryStore for SqliteStore<'_> {
    fn subjects(&self) -> Result<Vec<Subject>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, code, name, class_id, department_id, instructor_id FROM subjects ORDER BY code",
        )?;
        let rows = stmt
            .query_map([], subject_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn subject(&self, subject_id: &str) -> Result<Option<Subject>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, code, name, class_id, department_id, instructor_id FROM subjects WHERE id = ?",
                [subject_id],
                subject_from_row,
            )
            .optional()?)
    }

    fn user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, department_id FROM users WHERE id = ?",
                [user_id],
                |r| {
                    Ok(User {
                        id: r.get(0)?,
                        name: r.get(1)?,
                        department_id: r.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    fn students_in_class(&self, class_id: &str) -> Result<Vec<Student>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, class_id, name, roll_no FROM students WHERE class_id = ? ORDER BY roll_no, name",
        )?;
        let rows = stmt
            .query_map([class_id], |r| {
                Ok(Student {
                    id: r.get(0)?,
                    class_id: r.get(1)?,
                    name: r.get(2)?,
                    roll_no: r.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl OutcomeLookup for SqliteStore<'_> {
    fn course_outcomes_for_subject(
        &self,
        subject_id: &str,
    ) -> Result<Vec<CourseOutcome>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, subject_id, code, description, target_percent
             FROM course_outcomes WHERE subject_id = ? ORDER BY code",
        )?;
        let rows = stmt
            .query_map([subject_id], |r| {
                Ok(CourseOutcome {
                    id: r.get(0)?,
                    subject_id: r.get(1)?,
                    code: r.get(2)?,
                    description: r.get(3)?,
                    target_percent: r.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn program_outcomes_for_department(
        &self,
        department_id: &str,
    ) -> Result<Vec<ProgramOutcome>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, department_id, code, description, target_percent
             FROM program_outcomes WHERE department_id = ? ORDER BY code",
        )?;
        let rows = stmt
            .query_map([department_id], |r| {
                Ok(ProgramOutcome {
                    id: r.get(0)?,
                    department_id: r.get(1)?,
                    code: r.get(2)?,
                    description: r.get(3)?,
                    target_percent: r.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl CoPoWeightLookup for SqliteStore<'_> {
    fn co_po_weights_for_subject(&self, subject_id: &str) -> Result<Vec<CoPoWeight>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT w.co_id, w.po_id, w.weight
             FROM co_po_weights w
             JOIN course_outcomes co ON co.id = w.co_id
             JOIN program_outcomes po ON po.id = w.po_id
             WHERE co.subject_id = ?
             ORDER BY co.code, po.code",
        )?;
        let rows = stmt
            .query_map([subject_id], |r| {
                Ok(CoPoWeight {
                    co_id: r.get(0)?,
                    po_id: r.get(1)?,
                    weight: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl MarksStore for SqliteStore<'_> {
    fn marks_for_exam(&self, exam_id: &str) -> Result<Vec<MarkRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT student_id, question_id, score FROM marks WHERE exam_id = ? ORDER BY student_id",
        )?;
        let rows = stmt.query_map([exam_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, f64>(2)?,
            ))
        })?;
        let mut out: Vec<MarkRecord> = Vec::new();
        for row in rows {
            let (student_id, question_id, score) = row?;
            if out.last().map(|r| r.student_id != student_id).unwrap_or(true) {
                out.push(MarkRecord::new(exam_id, &student_id));
            }
            if let Some(rec) = out.last_mut() {
                rec.scores.insert(question_id, score);
            }
        }
        Ok(out)
    }

    fn save_marks(&self, submissions: &[MarkSubmission]) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let stamp = now_stamp();
        for sub in submissions {
            tx.execute(
                "DELETE FROM marks WHERE exam_id = ? AND student_id = ?",
                (&sub.exam_id, &sub.student_id),
            )
            .map_err(write_err("db_delete_failed", "marks"))?;
            for (question_id, score) in &sub.scores {
                tx.execute(
                    "INSERT INTO marks(exam_id, student_id, question_id, score) VALUES(?, ?, ?, ?)",
                    (&sub.exam_id, &sub.student_id, question_id, score),
                )
                .map_err(write_err("db_insert_failed", "marks"))?;
            }
            // No scores left: the student has no record for this exam.
            if sub.scores.is_empty() {
                tx.execute(
                    "DELETE FROM mark_totals WHERE exam_id = ? AND student_id = ?",
                    (&sub.exam_id, &sub.student_id),
                )
                .map_err(write_err("db_delete_failed", "mark_totals"))?;
                continue;
            }
            tx.execute(
                "INSERT INTO mark_totals(exam_id, student_id, total, updated_at) VALUES(?, ?, ?, ?)
                 ON CONFLICT(exam_id, student_id) DO UPDATE SET
                   total = excluded.total,
                   updated_at = excluded.updated_at",
                (&sub.exam_id, &sub.student_id, sub.total, &stamp),
            )
            .map_err(write_err("db_insert_failed", "mark_totals"))?;
        }
        tx.commit()
            .map_err(write_err("db_commit_failed", "marks"))?;
        Ok(())
    }
}
