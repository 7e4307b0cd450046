//! User directory and contact store.
//!
//! Both traits are backed by Postgres in production and by in-process
//! doubles in the test suite. The user directory is the single system of
//! record for identity; everything else (tokens, cache) derives from it.

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::models::{Contact, NewContact, NewUser, Role, User};

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, user_id: i64) -> Result<Option<User>, anyhow::Error>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, anyhow::Error>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, anyhow::Error>;

    /// Insert a new user row. Uniqueness of username and email is enforced
    /// by the store; a duplicate surfaces as an error.
    async fn insert_user(&self, user: NewUser) -> Result<User, anyhow::Error>;

    async fn update_password(&self, user_id: i64, hashed_password: &str)
        -> Result<(), anyhow::Error>;
    async fn update_avatar(&self, user_id: i64, avatar_url: &str) -> Result<User, anyhow::Error>;
    async fn update_role(&self, user_id: i64, role: Role) -> Result<Option<User>, anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn list(&self, user_id: i64, skip: i64, limit: i64)
        -> Result<Vec<Contact>, anyhow::Error>;
    async fn get(&self, user_id: i64, contact_id: i64) -> Result<Option<Contact>, anyhow::Error>;
    async fn insert(&self, user_id: i64, contact: NewContact) -> Result<Contact, anyhow::Error>;
    async fn update(
        &self,
        user_id: i64,
        contact_id: i64,
        contact: NewContact,
    ) -> Result<Option<Contact>, anyhow::Error>;
    async fn delete(&self, user_id: i64, contact_id: i64)
        -> Result<Option<Contact>, anyhow::Error>;

    /// Case-insensitive substring match over first name, last name and
    /// email, scoped to the owner.
    async fn search(&self, user_id: i64, query: &str) -> Result<Vec<Contact>, anyhow::Error>;

    /// All of the owner's contacts that have a birthday on record; window
    /// filtering happens above the store.
    async fn with_birthdays(&self, user_id: i64) -> Result<Vec<Contact>, anyhow::Error>;
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_id(&self, user_id: i64) -> Result<Option<User>, anyhow::Error> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, anyhow::Error> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, anyhow::Error> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, anyhow::Error> {
        let inserted = sqlx::query_as::<_, User>(
            "INSERT INTO users (username, email, hashed_password, avatar, confirmed, role) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.hashed_password)
        .bind(&user.avatar)
        .bind(user.confirmed)
        .bind(user.role)
        .fetch_one(&self.pool)
        .await?;
        Ok(inserted)
    }

    async fn update_password(
        &self,
        user_id: i64,
        hashed_password: &str,
    ) -> Result<(), anyhow::Error> {
        sqlx::query("UPDATE users SET hashed_password = $1 WHERE id = $2")
            .bind(hashed_password)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_avatar(&self, user_id: i64, avatar_url: &str) -> Result<User, anyhow::Error> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET avatar = $1 WHERE id = $2 RETURNING *",
        )
        .bind(avatar_url)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn update_role(&self, user_id: i64, role: Role) -> Result<Option<User>, anyhow::Error> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET role = $1 WHERE id = $2 RETURNING *",
        )
        .bind(role)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgContactStore {
    pool: PgPool,
}

impl PgContactStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactStore for PgContactStore {
    async fn list(
        &self,
        user_id: i64,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Contact>, anyhow::Error> {
        let contacts = sqlx::query_as::<_, Contact>(
            "SELECT * FROM contacts WHERE user_id = $1 ORDER BY id OFFSET $2 LIMIT $3",
        )
        .bind(user_id)
        .bind(skip)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(contacts)
    }

    async fn get(&self, user_id: i64, contact_id: i64) -> Result<Option<Contact>, anyhow::Error> {
        let contact = sqlx::query_as::<_, Contact>(
            "SELECT * FROM contacts WHERE id = $1 AND user_id = $2",
        )
        .bind(contact_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(contact)
    }

    async fn insert(&self, user_id: i64, contact: NewContact) -> Result<Contact, anyhow::Error> {
        let inserted = sqlx::query_as::<_, Contact>(
            "INSERT INTO contacts (first_name, last_name, email, phone, birthday, extra_info, user_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
        )
        .bind(&contact.first_name)
        .bind(&contact.last_name)
        .bind(&contact.email)
        .bind(&contact.phone)
        .bind(contact.birthday)
        .bind(&contact.extra_info)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(inserted)
    }

    async fn update(
        &self,
        user_id: i64,
        contact_id: i64,
        contact: NewContact,
    ) -> Result<Option<Contact>, anyhow::Error> {
        let updated = sqlx::query_as::<_, Contact>(
            "UPDATE contacts SET first_name = $1, last_name = $2, email = $3, phone = $4, \
             birthday = $5, extra_info = $6 WHERE id = $7 AND user_id = $8 RETURNING *",
        )
        .bind(&contact.first_name)
        .bind(&contact.last_name)
        .bind(&contact.email)
        .bind(&contact.phone)
        .bind(contact.birthday)
        .bind(&contact.extra_info)
        .bind(contact_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn delete(
        &self,
        user_id: i64,
        contact_id: i64,
    ) -> Result<Option<Contact>, anyhow::Error> {
        let deleted = sqlx::query_as::<_, Contact>(
            "DELETE FROM contacts WHERE id = $1 AND user_id = $2 RETURNING *",
        )
        .bind(contact_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(deleted)
    }

    async fn search(&self, user_id: i64, query: &str) -> Result<Vec<Contact>, anyhow::Error> {
        let pattern = format!("%{}%", query);
        let contacts = sqlx::query_as::<_, Contact>(
            "SELECT * FROM contacts WHERE user_id = $1 AND \
             (first_name ILIKE $2 OR last_name ILIKE $2 OR email ILIKE $2) ORDER BY id",
        )
        .bind(user_id)
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;
        Ok(contacts)
    }

    async fn with_birthdays(&self, user_id: i64) -> Result<Vec<Contact>, anyhow::Error> {
        let contacts = sqlx::query_as::<_, Contact>(
            "SELECT * FROM contacts WHERE user_id = $1 AND birthday IS NOT NULL ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(contacts)
    }
}

// ---------------------------------------------------------------------------
// In-memory doubles
// ---------------------------------------------------------------------------

/// In-process user directory used by the test suite.
///
/// Counts username lookups so tests can observe whether a request was
/// served from the identity cache or fell through to the directory.
#[derive(Default)]
pub struct MemoryDirectory {
    users: Mutex<Vec<User>>,
    next_id: AtomicUsize,
    username_lookups: AtomicUsize,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
            username_lookups: AtomicUsize::new(0),
        }
    }

    pub fn username_lookups(&self) -> usize {
        self.username_lookups.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<User>>, anyhow::Error> {
        self.users
            .lock()
            .map_err(|e| anyhow::anyhow!("Directory mutex poisoned: {}", e))
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn find_by_id(&self, user_id: i64) -> Result<Option<User>, anyhow::Error> {
        Ok(self.lock()?.iter().find(|u| u.id == user_id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, anyhow::Error> {
        self.username_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .lock()?
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, anyhow::Error> {
        Ok(self.lock()?.iter().find(|u| u.email == email).cloned())
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, anyhow::Error> {
        let mut users = self.lock()?;
        if users
            .iter()
            .any(|u| u.username == user.username || u.email == user.email)
        {
            anyhow::bail!("duplicate key value violates unique constraint");
        }
        let inserted = User {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) as i64,
            username: user.username,
            email: user.email,
            hashed_password: user.hashed_password,
            created_at: chrono::Utc::now(),
            avatar: user.avatar,
            confirmed: user.confirmed,
            role: user.role,
        };
        users.push(inserted.clone());
        Ok(inserted)
    }

    async fn update_password(
        &self,
        user_id: i64,
        hashed_password: &str,
    ) -> Result<(), anyhow::Error> {
        let mut users = self.lock()?;
        if let Some(user) = users.iter_mut().find(|u| u.id == user_id) {
            user.hashed_password = hashed_password.to_string();
        }
        Ok(())
    }

    async fn update_avatar(&self, user_id: i64, avatar_url: &str) -> Result<User, anyhow::Error> {
        let mut users = self.lock()?;
        let user = users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| anyhow::anyhow!("no user with id {}", user_id))?;
        user.avatar = Some(avatar_url.to_string());
        Ok(user.clone())
    }

    async fn update_role(&self, user_id: i64, role: Role) -> Result<Option<User>, anyhow::Error> {
        let mut users = self.lock()?;
        Ok(users.iter_mut().find(|u| u.id == user_id).map(|user| {
            user.role = role;
            user.clone()
        }))
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

/// In-process contact store used by the test suite.
#[derive(Default)]
pub struct MemoryContactStore {
    contacts: Mutex<HashMap<i64, Contact>>,
    next_id: AtomicUsize,
}

impl MemoryContactStore {
    pub fn new() -> Self {
        Self {
            contacts: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<i64, Contact>>, anyhow::Error> {
        self.contacts
            .lock()
            .map_err(|e| anyhow::anyhow!("Contact store mutex poisoned: {}", e))
    }

    fn sorted(mut contacts: Vec<Contact>) -> Vec<Contact> {
        contacts.sort_by_key(|c| c.id);
        contacts
    }
}

#[async_trait]
impl ContactStore for MemoryContactStore {
    async fn list(
        &self,
        user_id: i64,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Contact>, anyhow::Error> {
        let all: Vec<Contact> = self
            .lock()?
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        Ok(Self::sorted(all)
            .into_iter()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn get(&self, user_id: i64, contact_id: i64) -> Result<Option<Contact>, anyhow::Error> {
        Ok(self
            .lock()?
            .get(&contact_id)
            .filter(|c| c.user_id == user_id)
            .cloned())
    }

    async fn insert(&self, user_id: i64, contact: NewContact) -> Result<Contact, anyhow::Error> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i64;
        let inserted = Contact {
            id,
            first_name: contact.first_name,
            last_name: contact.last_name,
            email: contact.email,
            phone: contact.phone,
            birthday: contact.birthday,
            extra_info: contact.extra_info,
            user_id,
        };
        self.lock()?.insert(id, inserted.clone());
        Ok(inserted)
    }

    async fn update(
        &self,
        user_id: i64,
        contact_id: i64,
        contact: NewContact,
    ) -> Result<Option<Contact>, anyhow::Error> {
        let mut contacts = self.lock()?;
        match contacts.get_mut(&contact_id) {
            Some(existing) if existing.user_id == user_id => {
                existing.first_name = contact.first_name;
                existing.last_name = contact.last_name;
                existing.email = contact.email;
                existing.phone = contact.phone;
                existing.birthday = contact.birthday;
                existing.extra_info = contact.extra_info;
                Ok(Some(existing.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete(
        &self,
        user_id: i64,
        contact_id: i64,
    ) -> Result<Option<Contact>, anyhow::Error> {
        let mut contacts = self.lock()?;
        match contacts.get(&contact_id) {
            Some(existing) if existing.user_id == user_id => Ok(contacts.remove(&contact_id)),
            _ => Ok(None),
        }
    }

    async fn search(&self, user_id: i64, query: &str) -> Result<Vec<Contact>, anyhow::Error> {
        let needle = query.to_lowercase();
        let matches: Vec<Contact> = self
            .lock()?
            .values()
            .filter(|c| c.user_id == user_id)
            .filter(|c| {
                c.first_name.to_lowercase().contains(&needle)
                    || c.last_name.to_lowercase().contains(&needle)
                    || c.email.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        Ok(Self::sorted(matches))
    }

    async fn with_birthdays(&self, user_id: i64) -> Result<Vec<Contact>, anyhow::Error> {
        let matches: Vec<Contact> = self
            .lock()?
            .values()
            .filter(|c| c.user_id == user_id && c.birthday.is_some())
            .cloned()
            .collect();
        Ok(Self::sorted(matches))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: email.to_string(),
            hashed_password: "argon2-hash".to_string(),
            avatar: None,
            confirmed: true,
            role: Role::User,
        }
    }

    fn new_contact(first: &str) -> NewContact {
        NewContact {
            first_name: first.to_string(),
            last_name: "Wilson".to_string(),
            email: format!("{}@example.com", first.to_lowercase()),
            phone: "555-0100".to_string(),
            birthday: None,
            extra_info: None,
        }
    }

    #[tokio::test]
    async fn directory_rejects_duplicate_username() {
        let dir = MemoryDirectory::new();
        dir.insert_user(new_user("wade", "wade@example.com"))
            .await
            .unwrap();
        let err = dir
            .insert_user(new_user("wade", "other@example.com"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unique"));
    }

    #[tokio::test]
    async fn directory_counts_username_lookups() {
        let dir = MemoryDirectory::new();
        dir.find_by_username("wade").await.unwrap();
        dir.find_by_username("wade").await.unwrap();
        assert_eq!(dir.username_lookups(), 2);
    }

    #[tokio::test]
    async fn contact_store_scopes_by_owner() {
        let store = MemoryContactStore::new();
        let mine = store.insert(1, new_contact("Wade")).await.unwrap();
        store.insert(2, new_contact("Vanessa")).await.unwrap();

        assert!(store.get(2, mine.id).await.unwrap().is_none());
        assert!(store.delete(2, mine.id).await.unwrap().is_none());
        assert_eq!(store.list(1, 0, 100).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn contact_search_is_case_insensitive() {
        let store = MemoryContactStore::new();
        store.insert(1, new_contact("Wade")).await.unwrap();

        let hits = store.search(1, "wAdE").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(store.search(1, "zzz").await.unwrap().is_empty());
    }
}
