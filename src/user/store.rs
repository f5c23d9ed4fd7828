use super::{NewUser, User, UserStatus};
use crate::database::{text_enum_column, Database, Query};
use anyhow::{Context, Result};
use rusqlite::Row;
use tracing::debug;

pub trait UserStore {
    /// Inserts a new user and returns its id.
    fn insert_user(&self, user: &NewUser) -> Result<i64>;

    /// Returns None if no user has the given email.
    fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Returns None if the user does not exist.
    fn get_user(&self, id: i64) -> Result<Option<User>>;
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        uuid: row.get("uuid")?,
        email: row.get("email")?,
        external_id: row.get("external_id")?,
        provider: row.get("provider")?,
        status: text_enum_column(row, "status", UserStatus::from_str)?,
        created: row.get("created_at")?,
    })
}

impl Database {
    fn get_single_user(&self, query: Query<'_>) -> Result<Option<User>> {
        let name = query.name;
        let mut user = None;
        self.run_query(query.on_row(|row| {
            let found = row_to_user(row)?;
            debug!("user returned {}", found);
            user = Some(found);
            Ok(())
        }))
        .with_context(|| format!("{} failed", name))?;
        Ok(user)
    }
}

impl UserStore for Database {
    fn insert_user(&self, user: &NewUser) -> Result<i64> {
        let mut id = None;
        self.run_query(
            Query::new(
                "InsertUser",
                "INSERT INTO user (uuid, email, provider, status, created_at) \
                 VALUES (:uuid, :email, :provider, :status, :created) RETURNING id;",
            )
            .performs_update()
            .bind(":uuid", user.uuid.clone())
            .bind(":email", user.email.clone())
            .bind(":provider", user.provider.clone())
            .bind(":status", user.status.as_str().to_string())
            .bind(":created", user.created.clone())
            .on_row(|row| {
                id = Some(row.get(0)?);
                Ok(())
            }),
        )
        .with_context(|| format!("Failed to insert user {}", user.email))?;

        id.with_context(|| format!("Insert of user {} returned no id", user.email))
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.get_single_user(
            Query::new("GetUserByEmail", "SELECT * FROM user WHERE email = :email;")
                .bind(":email", email.to_string()),
        )
    }

    fn get_user(&self, id: i64) -> Result<Option<User>> {
        self.get_single_user(
            Query::new("GetUser", "SELECT * FROM user WHERE id = :id;").bind(":id", id),
        )
    }
}
