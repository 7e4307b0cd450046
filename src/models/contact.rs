//! Contact entity owned by a single user.

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Contact {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub birthday: Option<NaiveDate>,
    pub extra_info: Option<String>,
    #[serde(skip_serializing)]
    pub user_id: i64,
}

/// Field set for creating or fully replacing a contact.
#[derive(Debug, Clone)]
pub struct NewContact {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub birthday: Option<NaiveDate>,
    pub extra_info: Option<String>,
}

/// True if the contact's next birthday anniversary falls within
/// `[today, today + days]`. Handles year wrap-around; Feb 29 birthdays
/// are observed on Feb 28 in non-leap years.
pub fn birthday_in_window(birthday: NaiveDate, today: NaiveDate, days: i64) -> bool {
    let end = today + Duration::days(days);
    for year in [today.year(), today.year() + 1] {
        let anniversary = birthday
            .with_year(year)
            .or_else(|| NaiveDate::from_ymd_opt(year, 2, 28));
        if let Some(date) = anniversary {
            if date >= today && date <= end {
                return true;
            }
        }
    }
    false
}
