//! Pattern-based remapping of known server errors into localized user-facing
//! text. Anything unrecognized passes through verbatim.

/// Registration failures caused by a taken username.
pub(crate) fn map_register_error(raw: &str) -> String {
    let lower = raw.to_lowercase();
    let duplicate = lower.contains("exist")
        || lower.contains("taken")
        || lower.contains("duplicate")
        || raw.contains("已存在")
        || raw.contains("已被注册");
    if duplicate {
        "该账号已经被注册，换个账号吧".to_string()
    } else {
        raw.to_string()
    }
}

/// Add-friend failures caused by an unknown username.
pub(crate) fn map_add_friend_error(raw: &str) -> String {
    let lower = raw.to_lowercase();
    let missing = lower.contains("not found")
        || lower.contains("no such user")
        || raw.contains("不存在");
    if missing {
        "用户不存在，请检查用户名".to_string()
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_account_is_localized() {
        assert_eq!(
            map_register_error("Username already exists"),
            "该账号已经被注册，换个账号吧"
        );
        assert_eq!(
            map_register_error("该用户名已存在"),
            "该账号已经被注册，换个账号吧"
        );
    }

    #[test]
    fn other_register_errors_pass_through() {
        assert_eq!(map_register_error("Password too short"), "Password too short");
    }

    #[test]
    fn missing_friend_is_localized() {
        assert_eq!(map_add_friend_error("User not found"), "用户不存在，请检查用户名");
    }

    #[test]
    fn other_friend_errors_pass_through() {
        assert_eq!(
            map_add_friend_error("Cannot add yourself"),
            "Cannot add yourself"
        );
    }
}
