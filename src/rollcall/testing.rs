//! In-memory backend shared by controller and CLI tests.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    api::{ApiError, RollCallApi},
    models::{Class, Group, NewRollCall, PersistedRollCall, Student},
};

#[derive(Default)]
pub(crate) struct FakeApi {
    pub classes: Vec<Class>,
    pub fail_saves: AtomicBool,
    pub save_delay: Option<Duration>,
    pub saved: Mutex<Vec<NewRollCall>>,
}

impl FakeApi {
    pub fn with_classes(classes: Vec<Class>) -> Self {
        Self {
            classes,
            ..Self::default()
        }
    }

    pub fn fail_saves(&self) {
        self.fail_saves.store(true, Ordering::SeqCst);
    }

    pub fn saved_count(&self) -> usize {
        self.saved.lock().unwrap().len()
    }
}

#[async_trait]
impl RollCallApi for FakeApi {
    async fn list_classes(&self) -> Result<Vec<Class>, ApiError> {
        Ok(self.classes.clone())
    }

    async fn list_groups(&self, class_id: i64) -> Result<Vec<Group>, ApiError> {
        Ok(self
            .classes
            .iter()
            .find(|class| class.id == class_id)
            .map(|class| class.groups.clone())
            .unwrap_or_default())
    }

    async fn list_students(&self, group_id: i64) -> Result<Vec<Student>, ApiError> {
        Ok(self
            .classes
            .iter()
            .flat_map(|class| class.groups.iter())
            .find(|group| group.id == group_id)
            .map(|group| group.students.clone())
            .unwrap_or_default())
    }

    async fn create_roll_call(&self, record: NewRollCall) -> Result<PersistedRollCall, ApiError> {
        if let Some(delay) = self.save_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 500,
                detail: "database unavailable".into(),
            });
        }
        let mut saved = self.saved.lock().unwrap();
        saved.push(record);
        Ok(PersistedRollCall {
            id: saved.len() as i64,
            student_id: record.student_id,
            class_id: record.class_id,
            group_id: None,
            called_at: Utc::now(),
            student: None,
        })
    }

    async fn roll_call_history(&self) -> Result<Vec<PersistedRollCall>, ApiError> {
        Ok(Vec::new())
    }
}

pub(crate) fn student(id: i64, name: &str, weight: u32) -> Student {
    Student {
        id,
        student_id: format!("S{id}"),
        name: name.into(),
        weight,
        group_id: None,
        created_at: None,
    }
}

/// A class with a single group `id * 10` named "G1".
pub(crate) fn class(id: i64, name: &str, students: Vec<Student>) -> Class {
    Class {
        id,
        name: name.into(),
        owner_id: None,
        created_at: None,
        groups: vec![Group {
            id: id * 10,
            name: "G1".into(),
            class_id: Some(id),
            created_at: None,
            students,
        }],
    }
}

pub(crate) fn one_a() -> Class {
    class(1, "1-A", vec![student(1, "Alice", 1), student(2, "Bob", 3)])
}
