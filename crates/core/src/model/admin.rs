use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Headline numbers on the admin dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    #[serde(default)]
    pub total_users: u64,
    #[serde(default)]
    pub latest_registration_date: Option<String>,
    #[serde(default)]
    pub total_careers: u64,
    #[serde(default)]
    pub total_subjects: u64,
    #[serde(default)]
    pub total_hours_study: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartDataset {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub data: Vec<f64>,
}

/// Chart series in the shape the chart widgets consume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub datasets: Vec<ChartDataset>,
}

impl ChartData {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminUser {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "crate::model::de::bool_or_int")]
    pub is_premium: bool,
    #[serde(default)]
    pub premium_expires_at: Option<DateTime<Utc>>,
}

/// One page of the admin user list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPage {
    pub users: Vec<AdminUser>,
    pub current_page: u32,
    pub last_page: u32,
    pub total: u64,
}

/// Fields an admin may change on a user. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdminUserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_premium: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub premium_expires_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_user_accepts_integer_premium_flag() {
        let user: AdminUser =
            serde_json::from_str(r#"{"id": 4, "name": "Ana", "is_premium": 1}"#).unwrap();
        assert!(user.is_premium);
        assert_eq!(user.email, None);
    }

    #[test]
    fn update_skips_unset_fields() {
        let update = AdminUserUpdate {
            is_premium: Some(false),
            ..AdminUserUpdate::default()
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            serde_json::json!({"is_premium": false})
        );
    }
}
