use serde::Serialize;

use crate::error::AppError;
use crate::store::{NewTodo, TodoPatch};

const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, Serialize)]
pub struct DeleteTodoResponse {
    pub success: bool,
}

fn validate_title(title: &str) -> Result<(), AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::BadRequest("标题不能为空".into()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::BadRequest(format!(
            "标题不能超过{}个字符",
            MAX_TITLE_LEN
        )));
    }
    Ok(())
}

fn validate_questions(value: i32) -> Result<(), AppError> {
    if value < 0 {
        return Err(AppError::BadRequest("题目数量不能为负数".into()));
    }
    Ok(())
}

pub(super) fn validate_new(todo: &NewTodo) -> Result<(), AppError> {
    validate_title(&todo.title)?;
    validate_questions(todo.questions_target)
}

pub(super) fn validate_patch(patch: &TodoPatch) -> Result<(), AppError> {
    if let Some(title) = &patch.title {
        validate_title(title)?;
    }
    for value in [patch.questions_target, patch.questions_completed]
        .into_iter()
        .flatten()
    {
        validate_questions(value)?;
    }
    Ok(())
}
