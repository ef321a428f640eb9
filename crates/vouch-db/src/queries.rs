use rusqlite::{Connection, OptionalExtension};

use vouch_types::models::{Notification, NotificationId, User, UserId};

use crate::models::{self, NOTIFICATION_COLUMNS, USER_COLUMNS, UserRow};
use crate::{Database, Result, StoreError};

impl Database {
    // -- Users --

    pub fn create_user(&self, username: &str, password_hash: &str) -> Result<User> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, password) VALUES (?1, ?2)",
                (username, password_hash),
            )?;
            Ok(User {
                id: conn.last_insert_rowid(),
                username: username.to_string(),
            })
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1");
            Ok(conn.query_row(&sql, [username], models::user_row).optional()?)
        })
    }

    pub fn get_user_by_id(&self, id: UserId) -> Result<Option<User>> {
        self.with_conn(|conn| query_user(conn, id))
    }

    pub fn get_username_by_id(&self, id: UserId) -> Result<String> {
        self.with_conn(|conn| {
            query_user(conn, id)?
                .map(|u| u.username)
                .ok_or(StoreError::not_found("user", id))
        })
    }

    /// All users, ordered by username ascending.
    pub fn list_users(&self) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, username FROM users ORDER BY username ASC")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Notifications --

    pub fn insert_notification(&self, user_id: UserId, message: &str) -> Result<Notification> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (user_id, message) VALUES (?1, ?2)",
                (user_id, message),
            )?;
            let id = conn.last_insert_rowid();
            query_notification(conn, id)?.ok_or(StoreError::not_found("notification", id))
        })
    }

    /// Newest first.
    pub fn list_notifications(&self, user_id: UserId) -> Result<Vec<Notification>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], models::notification)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn mark_notification_read(&self, id: NotificationId) -> Result<Notification> {
        self.with_conn(|conn| {
            let changed = conn.execute("UPDATE notifications SET read = 1 WHERE id = ?1", [id])?;
            if changed == 0 {
                return Err(StoreError::not_found("notification", id));
            }
            query_notification(conn, id)?.ok_or(StoreError::not_found("notification", id))
        })
    }
}

pub(crate) fn query_user(conn: &Connection, id: UserId) -> Result<Option<User>> {
    Ok(conn
        .query_row("SELECT id, username FROM users WHERE id = ?1", [id], |row| {
            Ok(User {
                id: row.get(0)?,
                username: row.get(1)?,
            })
        })
        .optional()?)
}

fn query_notification(conn: &Connection, id: NotificationId) -> Result<Option<Notification>> {
    let sql = format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], models::notification).optional()?)
}
