//! Request bodies and query params for the contact endpoints.

use chrono::NaiveDate;
use serde::Deserialize;
use validator::Validate;

use crate::models::NewContact;

#[derive(Debug, Deserialize, Validate)]
pub struct ContactPayload {
    #[validate(length(min = 1, max = 50, message = "First name must be 1 to 50 characters"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 50, message = "Last name must be 1 to 50 characters"))]
    pub last_name: String,
    #[validate(
        email(message = "Invalid email address"),
        length(max = 100, message = "Email must be at most 100 characters")
    )]
    pub email: String,
    #[validate(length(min = 1, max = 20, message = "Phone must be 1 to 20 characters"))]
    pub phone: String,
    pub birthday: Option<NaiveDate>,
    #[validate(length(max = 250, message = "Extra info must be at most 250 characters"))]
    pub extra_info: Option<String>,
}

impl From<ContactPayload> for NewContact {
    fn from(payload: ContactPayload) -> Self {
        NewContact {
            first_name: payload.first_name,
            last_name: payload.last_name,
            email: payload.email,
            phone: payload.phone,
            birthday: payload.birthday,
            extra_info: payload.extra_info,
        }
    }
}

fn default_limit() -> i64 {
    100
}

fn default_birthday_days() -> i64 {
    7
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct BirthdaysQuery {
    #[serde(default = "default_birthday_days")]
    pub days: i64,
}
