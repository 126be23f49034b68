use crate::error::AppError;
use crate::store::ProfilePatch;

/// 排行榜展示人数
pub const LEADERBOARD_SIZE: i64 = 10;

const MAX_NAME_LEN: usize = 50;

pub(super) fn validate_profile_patch(patch: &ProfilePatch) -> Result<(), AppError> {
    if let Some(name) = &patch.name {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(AppError::BadRequest(format!(
                "昵称长度需在1到{}个字符之间",
                MAX_NAME_LEN
            )));
        }
    }
    // 用户名只允许字母、数字和下划线
    if let Some(username) = &patch.username {
        if username.is_empty() || !username.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(AppError::BadRequest(
                "用户名格式无效，只允许使用字母、数字和下划线".into(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_must_be_word_characters() {
        let bad = ProfilePatch {
            username: Some("no spaces".into()),
            ..ProfilePatch::default()
        };
        assert!(validate_profile_patch(&bad).is_err());

        let good = ProfilePatch {
            username: Some("study_buddy42".into()),
            ..ProfilePatch::default()
        };
        assert!(validate_profile_patch(&good).is_ok());
    }
}
