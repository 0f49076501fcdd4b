//! Role gate: caller must be authenticated, have a role, and hold one of the required role codes.

use super::Caller;
use crate::error::AppError;

/// Empty `required` admits any authenticated caller.
pub fn authorize(caller: Option<&Caller>, required: &[String]) -> Result<(), AppError> {
    let caller = caller.ok_or_else(|| AppError::Unauthenticated("Authentication required.".into()))?;
    if required.is_empty() {
        return Ok(());
    }
    let code = caller
        .role_code()
        .ok_or_else(|| AppError::Forbidden("User has no assigned role.".into()))?;
    if required.iter().any(|r| r == code) {
        Ok(())
    } else {
        tracing::debug!(user_id = caller.user.id, role = %code, "role gate denied");
        Err(AppError::Forbidden(format!(
            "Insufficient permissions. Required role(s): {}",
            required.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Row;
    use chrono::Utc;
    use serde_json::{json, Map, Value};
    use std::collections::BTreeMap;

    fn row(id: i64, attrs: Value) -> Row {
        Row {
            id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
            attributes: attrs.as_object().cloned().unwrap_or_else(Map::new),
            relations: BTreeMap::new(),
        }
    }

    fn caller(role: Option<&str>) -> Caller {
        Caller {
            user: row(1, json!({"phone": "1"})),
            role: role.map(|c| row(2, json!({"code": c}))),
            token_id: 9,
        }
    }

    fn admin() -> Vec<String> {
        vec!["admin".to_string()]
    }

    #[test]
    fn unauthenticated_is_401() {
        let e = authorize(None, &admin()).unwrap_err();
        assert!(matches!(e, AppError::Unauthenticated(ref m) if m == "Authentication required."));
    }

    #[test]
    fn missing_role_is_403() {
        let e = authorize(Some(&caller(None)), &admin()).unwrap_err();
        assert!(matches!(e, AppError::Forbidden(ref m) if m == "User has no assigned role."));
    }

    #[test]
    fn wrong_role_lists_required_codes() {
        let e = authorize(Some(&caller(Some("user"))), &["admin".into(), "editor".into()]).unwrap_err();
        assert!(matches!(e, AppError::Forbidden(ref m) if m == "Insufficient permissions. Required role(s): admin, editor"));
    }

    #[test]
    fn matching_role_or_open_route_passes() {
        assert!(authorize(Some(&caller(Some("admin"))), &admin()).is_ok());
        assert!(authorize(Some(&caller(None)), &[]).is_ok());
    }
}
