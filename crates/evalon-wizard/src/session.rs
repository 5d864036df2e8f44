//! Authenticated session context.
//!
//! A [`Session`] is produced by a successful login or by completing a
//! registration, and is passed explicitly to whatever needs it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Account type, as the backend names it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    /// Administrator of an organisation.
    #[default]
    OrganizationAdmin,
    /// Teacher account.
    Teacher,
    /// Student account.
    Student,
}

impl std::fmt::Display for UserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OrganizationAdmin => write!(f, "organization_admin"),
            Self::Teacher => write!(f, "teacher"),
            Self::Student => write!(f, "student"),
        }
    }
}

/// Authentication context for a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Bearer token issued by the backend.
    pub auth_token: String,
    /// Backend id of the user.
    pub user_id: String,
    /// Account type.
    pub user_type: UserType,
    /// Organisation the user belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
}

impl Session {
    /// Creates a session without an organisation.
    #[must_use]
    pub fn new(
        auth_token: impl Into<String>,
        user_id: impl Into<String>,
        user_type: UserType,
    ) -> Self {
        Self {
            auth_token: auth_token.into(),
            user_id: user_id.into(),
            user_type,
            organization_id: None,
        }
    }

    /// Sets the organisation id.
    #[must_use]
    pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    /// Value for an `Authorization` header.
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.auth_token)
    }

    /// Builds a session from a response carrying `token` and a user object
    /// at `user_key` (e.g. `"teacher"`), reading the id from `id` or `_id`.
    ///
    /// Returns `None` when the token or id is missing.
    #[must_use]
    pub fn from_response(data: &Value, user_key: &str, user_type: UserType) -> Option<Self> {
        let token = data.get("token")?.as_str()?;
        let user_id = json_id(data.get(user_key)?)?;
        Some(Self::new(token, user_id, user_type))
    }

    /// Builds a session from a login response: `token`, a `user` object and
    /// an optional `organization` object.
    #[must_use]
    pub fn from_login_response(data: &Value, user_type: UserType) -> Option<Self> {
        let session = Self::from_response(data, "user", user_type)?;
        Some(match data.get("organization").and_then(json_id) {
            Some(id) => session.with_organization(id),
            None => session,
        })
    }
}

/// Reads an id from `id` or `_id`, accepting strings and numbers.
pub(crate) fn json_id(object: &Value) -> Option<String> {
    let id = object.get("id").or_else(|| object.get("_id"))?;
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_user_type_serialization() {
        assert_eq!(
            serde_json::to_string(&UserType::OrganizationAdmin).unwrap(),
            "\"organization_admin\""
        );
        assert_eq!(UserType::Student.to_string(), "student");
    }

    #[test]
    fn test_session_from_response() {
        let data = json!({"token": "jwt-1", "teacher": {"id": "t-42"}});
        let session = Session::from_response(&data, "teacher", UserType::Teacher).unwrap();
        assert_eq!(session.auth_token, "jwt-1");
        assert_eq!(session.user_id, "t-42");
        assert_eq!(session.organization_id, None);
        assert_eq!(session.bearer(), "Bearer jwt-1");
    }

    #[test]
    fn test_session_from_response_accepts_mongo_ids() {
        let data = json!({"token": "jwt-2", "student": {"_id": "s-7"}});
        let session = Session::from_response(&data, "student", UserType::Student).unwrap();
        assert_eq!(session.user_id, "s-7");
    }

    #[test]
    fn test_session_from_response_requires_token() {
        let data = json!({"teacher": {"id": "t-42"}});
        assert!(Session::from_response(&data, "teacher", UserType::Teacher).is_none());
    }

    #[test]
    fn test_session_from_login_response() {
        let data = json!({
            "token": "jwt-3",
            "user": {"_id": "u-9", "email": "ravi@gvs.edu", "role": "organization_admin"},
            "organization": {"_id": "org-3", "name": "Green Valley School"}
        });
        let session = Session::from_login_response(&data, UserType::OrganizationAdmin).unwrap();
        assert_eq!(session.user_id, "u-9");
        assert_eq!(session.organization_id.as_deref(), Some("org-3"));
    }

    #[test]
    fn test_session_serialization_skips_missing_org() {
        let session = Session::new("tok", "u1", UserType::Student);
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(
            json,
            json!({"authToken": "tok", "userId": "u1", "userType": "student"})
        );

        let with_org = session.with_organization("org-1");
        assert_eq!(with_org.organization_id.as_deref(), Some("org-1"));
    }
}
