//! User repository
//!
//! Database operations for users and teaching applications.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{CreateUserInput, IdSelector, TeachingApplication, UpdateProfile, User, UserType};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySql, MySqlPool, QueryBuilder, Row, Sqlite, SqlitePool};
use std::sync::Arc;

use super::push_id_in;

const USER_COLUMNS: &str =
    "id, email, password_hash, user_type_id, first_name, last_name, profile_pic, created_at, updated_at";

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, input: &CreateUserInput) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by email
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// List users ordered by id
    async fn list(&self, ids: &IdSelector) -> Result<Vec<User>>;

    /// Apply a profile update, returning the updated user
    async fn update_profile(&self, id: i64, update: &UpdateProfile) -> Result<Option<User>>;

    /// Record a teaching application and raise the applicant to `promote_to`.
    ///
    /// Users already at or above `promote_to` keep their type. Returns whether
    /// the user was promoted.
    async fn submit_teaching_application(
        &self,
        application: &TeachingApplication,
        promote_to: UserType,
    ) -> Result<bool>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, input: &CreateUserInput) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(self.pool.sqlite()?, input).await,
            DatabaseDriver::Mysql => create_user_mysql(self.pool.mysql()?, input).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_user_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_user_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_user_by_email_sqlite(self.pool.sqlite()?, email).await,
            DatabaseDriver::Mysql => get_user_by_email_mysql(self.pool.mysql()?, email).await,
        }
    }

    async fn list(&self, ids: &IdSelector) -> Result<Vec<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_users_sqlite(self.pool.sqlite()?, ids).await,
            DatabaseDriver::Mysql => list_users_mysql(self.pool.mysql()?, ids).await,
        }
    }

    async fn update_profile(&self, id: i64, update: &UpdateProfile) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                update_profile_sqlite(pool, id, update).await?;
                get_user_by_id_sqlite(pool, id).await
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                update_profile_mysql(pool, id, update).await?;
                get_user_by_id_mysql(pool, id).await
            }
        }
    }

    async fn submit_teaching_application(
        &self,
        application: &TeachingApplication,
        promote_to: UserType,
    ) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                submit_application_sqlite(self.pool.sqlite()?, application, promote_to).await
            }
            DatabaseDriver::Mysql => {
                submit_application_mysql(self.pool.mysql()?, application, promote_to).await
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, input: &CreateUserInput) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (email, password_hash, user_type_id, first_name, last_name, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&input.email)
    .bind(&input.password_hash)
    .bind(input.user_type.id())
    .bind(&input.first_name)
    .bind(&input.last_name)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(created_user(result.last_insert_rowid(), input))
}

async fn get_user_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.map(|row| row_to_user_sqlite(&row)).transpose()
}

async fn get_user_by_email_sqlite(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?");
    let row = sqlx::query(&sql)
        .bind(email)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by email")?;

    row.map(|row| row_to_user_sqlite(&row)).transpose()
}

async fn list_users_sqlite(pool: &SqlitePool, ids: &IdSelector) -> Result<Vec<User>> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {USER_COLUMNS} FROM users"));
    if let Some(ids) = ids.ids() {
        qb.push(" WHERE ");
        push_id_in(&mut qb, "id", ids);
    }
    qb.push(" ORDER BY id");

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to list users")?;

    rows.iter().map(row_to_user_sqlite).collect()
}

async fn update_profile_sqlite(pool: &SqlitePool, id: i64, update: &UpdateProfile) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE users
        SET first_name = COALESCE(?, first_name),
            last_name = COALESCE(?, last_name),
            profile_pic = COALESCE(?, profile_pic),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(update.first_name.as_deref())
    .bind(update.last_name.as_deref())
    .bind(update.profile_pic.as_deref())
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to update user profile")?;
    Ok(())
}

async fn submit_application_sqlite(
    pool: &SqlitePool,
    application: &TeachingApplication,
    promote_to: UserType,
) -> Result<bool> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO teaching_applications (user_id, experience, motivation, platform_choice, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(application.user_id)
    .bind(&application.experience)
    .bind(&application.motivation)
    .bind(&application.platform_choice)
    .bind(application.created_at)
    .execute(&mut *tx)
    .await
    .context("Failed to create teaching application")?;

    let promoted = sqlx::query(
        "UPDATE users SET user_type_id = ?, updated_at = ? WHERE id = ? AND user_type_id < ?",
    )
    .bind(promote_to.id())
    .bind(Utc::now())
    .bind(application.user_id)
    .bind(promote_to.id())
    .execute(&mut *tx)
    .await
    .context("Failed to promote user")?
    .rows_affected();

    tx.commit().await?;
    Ok(promoted > 0)
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let type_id: i64 = row.try_get("user_type_id")?;
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        user_type: UserType::from_id(type_id)
            .with_context(|| format!("Unknown user type id {}", type_id))?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        profile_pic: row.try_get("profile_pic")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, input: &CreateUserInput) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (email, password_hash, user_type_id, first_name, last_name, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&input.email)
    .bind(&input.password_hash)
    .bind(input.user_type.id())
    .bind(&input.first_name)
    .bind(&input.last_name)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(created_user(result.last_insert_id() as i64, input))
}

async fn get_user_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.map(|row| row_to_user_mysql(&row)).transpose()
}

async fn get_user_by_email_mysql(pool: &MySqlPool, email: &str) -> Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?");
    let row = sqlx::query(&sql)
        .bind(email)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by email")?;

    row.map(|row| row_to_user_mysql(&row)).transpose()
}

async fn list_users_mysql(pool: &MySqlPool, ids: &IdSelector) -> Result<Vec<User>> {
    let mut qb = QueryBuilder::<MySql>::new(format!("SELECT {USER_COLUMNS} FROM users"));
    if let Some(ids) = ids.ids() {
        qb.push(" WHERE ");
        push_id_in(&mut qb, "id", ids);
    }
    qb.push(" ORDER BY id");

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to list users")?;

    rows.iter().map(row_to_user_mysql).collect()
}

async fn update_profile_mysql(pool: &MySqlPool, id: i64, update: &UpdateProfile) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE users
        SET first_name = COALESCE(?, first_name),
            last_name = COALESCE(?, last_name),
            profile_pic = COALESCE(?, profile_pic),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(update.first_name.as_deref())
    .bind(update.last_name.as_deref())
    .bind(update.profile_pic.as_deref())
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to update user profile")?;
    Ok(())
}

async fn submit_application_mysql(
    pool: &MySqlPool,
    application: &TeachingApplication,
    promote_to: UserType,
) -> Result<bool> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO teaching_applications (user_id, experience, motivation, platform_choice, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(application.user_id)
    .bind(&application.experience)
    .bind(&application.motivation)
    .bind(&application.platform_choice)
    .bind(application.created_at)
    .execute(&mut *tx)
    .await
    .context("Failed to create teaching application")?;

    let promoted = sqlx::query(
        "UPDATE users SET user_type_id = ?, updated_at = ? WHERE id = ? AND user_type_id < ?",
    )
    .bind(promote_to.id())
    .bind(Utc::now())
    .bind(application.user_id)
    .bind(promote_to.id())
    .execute(&mut *tx)
    .await
    .context("Failed to promote user")?
    .rows_affected();

    tx.commit().await?;
    Ok(promoted > 0)
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    let type_id: i64 = row.try_get("user_type_id")?;
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        user_type: UserType::from_id(type_id)
            .with_context(|| format!("Unknown user type id {}", type_id))?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        profile_pic: row.try_get("profile_pic")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn created_user(id: i64, input: &CreateUserInput) -> User {
    let now = Utc::now();
    User {
        id,
        email: input.email.clone(),
        password_hash: input.password_hash.clone(),
        user_type: input.user_type,
        first_name: input.first_name.clone(),
        last_name: input.last_name.clone(),
        profile_pic: None,
        created_at: now,
        updated_at: now,
    }
}
