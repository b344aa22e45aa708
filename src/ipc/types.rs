use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::config::Config;
use crate::model::User;
use crate::views::attainment::AttainmentView;
use crate::views::exam_config::ExamConfigView;
use crate::views::marks_entry::MarksEntryView;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub config: Config,
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    /// Current instructor; every view operation is scoped to them.
    pub session: Option<User>,
    pub exam_config: ExamConfigView,
    pub marks: MarksEntryView,
    pub attainment: AttainmentView,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            workspace: None,
            db: None,
            session: None,
            exam_config: ExamConfigView::default(),
            marks: MarksEntryView::default(),
            attainment: AttainmentView::default(),
        }
    }

    pub fn reset_views(&mut self) {
        self.exam_config = ExamConfigView::default();
        self.marks.clear();
        self.attainment = AttainmentView::default();
    }
}
