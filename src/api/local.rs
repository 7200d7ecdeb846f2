use async_trait::async_trait;

use super::{ApiError, RollCallApi};
use crate::{
    db::Database,
    models::{Class, Group, NewRollCall, PersistedRollCall, Student},
};

#[async_trait]
impl RollCallApi for Database {
    async fn list_classes(&self) -> Result<Vec<Class>, ApiError> {
        Ok(self.get_classes().await?)
    }

    async fn list_groups(&self, class_id: i64) -> Result<Vec<Group>, ApiError> {
        Ok(self.get_groups(class_id).await?)
    }

    async fn list_students(&self, group_id: i64) -> Result<Vec<Student>, ApiError> {
        Ok(self.get_students(group_id).await?)
    }

    async fn create_roll_call(&self, record: NewRollCall) -> Result<PersistedRollCall, ApiError> {
        Ok(self.insert_roll_call(record).await?)
    }

    async fn roll_call_history(&self) -> Result<Vec<PersistedRollCall>, ApiError> {
        Ok(self.list_roll_calls().await?)
    }
}
