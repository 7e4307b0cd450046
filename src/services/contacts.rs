//! Contact book operations, always scoped to the owning user.

use std::sync::Arc;

use chrono::Utc;

use crate::errors::AppError;
use crate::models::{birthday_in_window, Contact, NewContact};
use crate::services::database::ContactStore;

#[derive(Clone)]
pub struct ContactService {
    store: Arc<dyn ContactStore>,
}

impl ContactService {
    pub fn new(store: Arc<dyn ContactStore>) -> Self {
        Self { store }
    }

    pub async fn list(
        &self,
        user_id: i64,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Contact>, AppError> {
        self.store
            .list(user_id, skip, limit)
            .await
            .map_err(AppError::Database)
    }

    pub async fn get(&self, user_id: i64, contact_id: i64) -> Result<Contact, AppError> {
        self.store
            .get(user_id, contact_id)
            .await
            .map_err(AppError::Database)?
            .ok_or_else(|| AppError::NotFound("Contact not found".to_string()))
    }

    pub async fn create(&self, user_id: i64, contact: NewContact) -> Result<Contact, AppError> {
        self.store
            .insert(user_id, contact)
            .await
            .map_err(AppError::Database)
    }

    pub async fn update(
        &self,
        user_id: i64,
        contact_id: i64,
        contact: NewContact,
    ) -> Result<Contact, AppError> {
        self.store
            .update(user_id, contact_id, contact)
            .await
            .map_err(AppError::Database)?
            .ok_or_else(|| AppError::NotFound("Contact not found".to_string()))
    }

    pub async fn delete(&self, user_id: i64, contact_id: i64) -> Result<Contact, AppError> {
        self.store
            .delete(user_id, contact_id)
            .await
            .map_err(AppError::Database)?
            .ok_or_else(|| AppError::NotFound("Contact not found".to_string()))
    }

    pub async fn search(&self, user_id: i64, query: &str) -> Result<Vec<Contact>, AppError> {
        self.store
            .search(user_id, query)
            .await
            .map_err(AppError::Database)
    }

    /// Contacts whose birthday anniversary falls within the next `days`
    /// days, counted from today inclusive.
    pub async fn upcoming_birthdays(
        &self,
        user_id: i64,
        days: i64,
    ) -> Result<Vec<Contact>, AppError> {
        let today = Utc::now().date_naive();
        let contacts = self
            .store
            .with_birthdays(user_id)
            .await
            .map_err(AppError::Database)?;

        Ok(contacts
            .into_iter()
            .filter(|c| {
                c.birthday
                    .map(|b| birthday_in_window(b, today, days))
                    .unwrap_or(false)
            })
            .collect())
    }
}
