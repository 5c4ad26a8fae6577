use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use fete_types::models::{Preferences, Role, User};

use super::{col, json_col, to_json};
use crate::Database;
use crate::models::{NewUser, UserRow};

const USER_COLUMNS: &str =
    "id, name, email, password, phone, role, avatar, is_verified, preferences, created_at, updated_at";

impl Database {
    pub fn create_user(&self, new: &NewUser) -> Result<UserRow> {
        let now = Utc::now();
        let preferences = to_json(&Preferences::default())?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, email, password, phone, role, preferences, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                rusqlite::params![
                    new.id.to_string(),
                    new.name,
                    new.email,
                    new.password_hash,
                    new.phone,
                    new.role.as_str(),
                    preferences,
                    now,
                ],
            )?;
            query_user(conn, "id", &new.id.to_string())?
                .ok_or_else(|| anyhow::anyhow!("user {} vanished after insert", new.id))
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", &id.to_string()))
    }

    /// Apply the provided profile fields; `None` keeps the stored value.
    pub fn update_profile(
        &self,
        id: Uuid,
        name: Option<&str>,
        phone: Option<&str>,
        avatar: Option<&str>,
        preferences: Option<&Preferences>,
    ) -> Result<Option<UserRow>> {
        let preferences = preferences.map(to_json).transpose()?;
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET
                    name        = COALESCE(?2, name),
                    phone       = COALESCE(?3, phone),
                    avatar      = COALESCE(?4, avatar),
                    preferences = COALESCE(?5, preferences),
                    updated_at  = ?6
                 WHERE id = ?1",
                rusqlite::params![id.to_string(), name, phone, avatar, preferences, Utc::now()],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_user(conn, "id", &id.to_string())
        })
    }

    pub fn set_user_role(&self, id: Uuid, role: Role) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET role = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![id.to_string(), role.as_str(), Utc::now()],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_user(conn, "id", &id.to_string())
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // `column` is always one of our own literals, never user input
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let row = conn.query_row(&sql, [value], map_user).optional()?;
    Ok(row)
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        user: User {
            id: col(row, 0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            phone: row.get(4)?,
            role: col(row, 5)?,
            avatar: row.get(6)?,
            is_verified: row.get(7)?,
            preferences: json_col(row, 8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        },
        password_hash: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::is_constraint_violation;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            id: Uuid::new_v4(),
            name: "Dana".into(),
            email: email.into(),
            password_hash: "$argon2id$stub".into(),
            phone: None,
            role: Role::Client,
        }
    }

    #[test]
    fn duplicate_email_is_a_constraint_violation() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&new_user("dana@example.com")).unwrap();

        let err = db.create_user(&new_user("dana@example.com")).err().unwrap();
        assert!(is_constraint_violation(&err));
    }

    #[test]
    fn profile_update_keeps_unset_fields() {
        let db = Database::open_in_memory().unwrap();
        let created = db.create_user(&new_user("kim@example.com")).unwrap();

        let updated = db
            .update_profile(created.user.id, None, Some("555-0100"), None, None)
            .unwrap()
            .unwrap();
        assert_eq!(updated.user.name, "Dana");
        assert_eq!(updated.user.phone.as_deref(), Some("555-0100"));
        assert!(updated.user.preferences.notifications.email);
    }
}
