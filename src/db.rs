use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE: &str = "outcomes.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS departments(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            department_id TEXT,
            FOREIGN KEY(department_id) REFERENCES departments(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            name TEXT NOT NULL,
            roll_no TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            UNIQUE(class_id, roll_no)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL,
            name TEXT NOT NULL,
            class_id TEXT NOT NULL,
            department_id TEXT NOT NULL,
            instructor_id TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(department_id) REFERENCES departments(id),
            FOREIGN KEY(instructor_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_instructor ON subjects(instructor_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS course_outcomes(
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            code TEXT NOT NULL,
            description TEXT NOT NULL,
            target_percent REAL NOT NULL,
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            UNIQUE(subject_id, code)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS program_outcomes(
            id TEXT PRIMARY KEY,
            department_id TEXT NOT NULL,
            code TEXT NOT NULL,
            description TEXT NOT NULL,
            target_percent REAL NOT NULL,
            FOREIGN KEY(department_id) REFERENCES departments(id),
            UNIQUE(department_id, code)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS co_po_weights(
            co_id TEXT NOT NULL,
            po_id TEXT NOT NULL,
            weight INTEGER NOT NULL,
            PRIMARY KEY(co_id, po_id),
            FOREIGN KEY(co_id) REFERENCES course_outcomes(id),
            FOREIGN KEY(po_id) REFERENCES program_outcomes(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS po_indirect(
            subject_id TEXT NOT NULL,
            po_id TEXT NOT NULL,
            percent REAL NOT NULL,
            PRIMARY KEY(subject_id, po_id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(po_id) REFERENCES program_outcomes(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exams(
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            name TEXT NOT NULL,
            exam_type TEXT NOT NULL,
            date TEXT,
            duration_minutes INTEGER,
            updated_at TEXT,
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exams_subject ON exams(subject_id)",
        [],
    )?;

    // Total marks is never stored; it is always the sum over this table.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS questions(
            id TEXT NOT NULL,
            exam_id TEXT NOT NULL,
            idx INTEGER NOT NULL,
            text TEXT NOT NULL,
            max_marks REAL NOT NULL,
            section TEXT NOT NULL,
            bloom_level TEXT NOT NULL,
            difficulty TEXT NOT NULL,
            PRIMARY KEY(exam_id, id),
            FOREIGN KEY(exam_id) REFERENCES exams(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_questions_exam ON questions(exam_id, idx)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS question_co_weights(
            exam_id TEXT NOT NULL,
            question_id TEXT NOT NULL,
            co_id TEXT NOT NULL,
            weight REAL NOT NULL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(exam_id, question_id, co_id),
            FOREIGN KEY(exam_id, question_id) REFERENCES questions(exam_id, id),
            FOREIGN KEY(co_id) REFERENCES course_outcomes(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS marks(
            exam_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            question_id TEXT NOT NULL,
            score REAL NOT NULL,
            PRIMARY KEY(exam_id, student_id, question_id),
            FOREIGN KEY(exam_id) REFERENCES exams(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS mark_totals(
            exam_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            total REAL NOT NULL,
            updated_at TEXT,
            PRIMARY KEY(exam_id, student_id),
            FOREIGN KEY(exam_id) REFERENCES exams(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_exam ON marks(exam_id)",
        [],
    )?;

    Ok(conn)
}

#[cfg(test)]
pub fn open_temp_db() -> anyhow::Result<Connection> {
    let dir = std::env::temp_dir().join(format!("outcomesd-unit-{}", uuid::Uuid::new_v4()));
    open_db(&dir)
}
