use crate::{
    models::{Candidate, Class, Group, HistoryRecord, PersistedRollCall, Student},
    rollcall::{RollCallController, RollCallSnapshot},
    AppState,
};

fn controller_from_state(state: &AppState) -> RollCallController {
    state.rollcall.clone()
}

pub async fn get_roll_call_state(state: &AppState) -> Result<RollCallSnapshot, String> {
    let controller = controller_from_state(state);
    Ok(controller.get_snapshot().await)
}

pub async fn refresh_classes(state: &AppState) -> Result<Vec<Class>, String> {
    let controller = controller_from_state(state);
    controller.refresh_classes().await.map_err(|e| e.to_string())
}

pub async fn select_class(state: &AppState, class_id: i64) -> Result<RollCallSnapshot, String> {
    let controller = controller_from_state(state);
    controller
        .select_class_by_id(class_id)
        .await
        .map_err(|e| e.to_string())
}

pub async fn get_groups_for_class(state: &AppState, class_id: i64) -> Result<Vec<Group>, String> {
    let controller = controller_from_state(state);
    controller
        .groups_for_class(class_id)
        .await
        .map_err(|e| e.to_string())
}

pub async fn get_students_for_group(
    state: &AppState,
    group_id: i64,
) -> Result<Vec<Student>, String> {
    let controller = controller_from_state(state);
    controller
        .students_for_group(group_id)
        .await
        .map_err(|e| e.to_string())
}

pub async fn toggle_group(state: &AppState, group_id: i64) -> Result<bool, String> {
    let controller = controller_from_state(state);
    controller
        .toggle_group(group_id)
        .await
        .map_err(|e| e.to_string())
}

pub async fn toggle_repeat(state: &AppState) -> Result<bool, String> {
    let controller = controller_from_state(state);
    controller.toggle_repeat().await.map_err(|e| e.to_string())
}

pub async fn set_roll_speed(state: &AppState, ms: u64) -> Result<u64, String> {
    let controller = controller_from_state(state);
    Ok(controller.set_roll_speed(ms).await)
}

pub async fn start_roll_call(state: &AppState) -> Result<RollCallSnapshot, String> {
    let controller = controller_from_state(state);
    controller.start().await.map_err(|e| e.to_string())
}

/// Returns the committed record without waiting for the server save.
pub async fn stop_roll_call(state: &AppState) -> Result<Option<HistoryRecord>, String> {
    let controller = controller_from_state(state);
    controller.stop().await.map_err(|e| e.to_string())
}

/// Waits for outstanding saves. Returns how many succeeded, or every failure
/// message joined by newlines.
pub async fn finish_pending_saves(state: &AppState) -> Result<usize, String> {
    let controller = controller_from_state(state);
    let mut saved = 0;
    let mut failures = Vec::new();
    for result in controller.flush_pending().await {
        match result {
            Ok(_) => saved += 1,
            Err(err) => failures.push(err.to_string()),
        }
    }
    if failures.is_empty() {
        Ok(saved)
    } else {
        Err(failures.join("\n"))
    }
}

pub async fn reset_roll_call(state: &AppState) -> Result<RollCallSnapshot, String> {
    let controller = controller_from_state(state);
    Ok(controller.reset().await)
}

pub async fn delete_history_record(state: &AppState, id: i64) -> Result<HistoryRecord, String> {
    let controller = controller_from_state(state);
    controller
        .delete_history(id)
        .await
        .map_err(|e| e.to_string())
}

pub async fn recent_history(state: &AppState, limit: usize) -> Result<Vec<HistoryRecord>, String> {
    let controller = controller_from_state(state);
    Ok(controller.recent(limit).await)
}

pub async fn get_candidates(state: &AppState) -> Result<Vec<Candidate>, String> {
    let controller = controller_from_state(state);
    Ok(controller.candidates().await)
}

pub async fn dismiss_error(state: &AppState) -> Result<(), String> {
    let controller = controller_from_state(state);
    controller.dismiss_error().await;
    Ok(())
}

pub async fn get_remote_history(state: &AppState) -> Result<Vec<PersistedRollCall>, String> {
    let controller = controller_from_state(state);
    controller.remote_history().await.map_err(|e| e.to_string())
}
