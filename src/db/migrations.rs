//! Database migrations module
//!
//! Code-based migrations embedded directly in the binary as SQL strings, with a
//! variant for each supported driver.
//!
//! ```ignore
//! use plaja::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! ```
//!
//! Each migration is a [`Migration`] with a unique `version`, a `name` and the
//! SQL for SQLite and MySQL. Applied versions are recorded in `_migrations`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};

use super::DynDatabasePool;
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
    /// SQL statements for MySQL
    pub up_mysql: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// All schema migrations, in application order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                user_type_id INTEGER NOT NULL DEFAULT 1,
                first_name VARCHAR(100) NOT NULL,
                last_name VARCHAR(100) NOT NULL,
                profile_pic VARCHAR(512),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                user_type_id BIGINT NOT NULL DEFAULT 1,
                first_name VARCHAR(100) NOT NULL,
                last_name VARCHAR(100) NOT NULL,
                profile_pic VARCHAR(512),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
    },
    Migration {
        version: 2,
        name: "create_course_catalog",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS course_levels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(100) NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS course_categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(100) NOT NULL UNIQUE
            );
            INSERT OR IGNORE INTO course_levels (title) VALUES ('Beginner'), ('Intermediate'), ('Advanced');
            INSERT OR IGNORE INTO course_categories (title) VALUES ('Go'), ('C++'), ('C#'), ('Rust'), ('Ruby'), ('Python');
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS course_levels (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                title VARCHAR(100) NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS course_categories (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                title VARCHAR(100) NOT NULL UNIQUE
            );
            INSERT IGNORE INTO course_levels (title) VALUES ('Beginner'), ('Intermediate'), ('Advanced');
            INSERT IGNORE INTO course_categories (title) VALUES ('Go'), ('C++'), ('C#'), ('Rust'), ('Ruby'), ('Python');
        "#,
    },
    Migration {
        version: 3,
        name: "create_courses",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS courses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(255) NOT NULL,
                short_description TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                thumbnail VARCHAR(512) NOT NULL DEFAULT '',
                level_id INTEGER NOT NULL,
                status_id INTEGER NOT NULL DEFAULT 1,
                instructor_id INTEGER NOT NULL,
                length INTEGER NOT NULL DEFAULT 0,
                price INTEGER NOT NULL DEFAULT 0,
                has_certificate BOOLEAN NOT NULL DEFAULT 0,
                version INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (level_id) REFERENCES course_levels(id),
                FOREIGN KEY (instructor_id) REFERENCES users(id)
            );
            CREATE INDEX IF NOT EXISTS idx_courses_instructor_id ON courses(instructor_id);
            CREATE INDEX IF NOT EXISTS idx_courses_status_id ON courses(status_id);
            CREATE TABLE IF NOT EXISTS course_categories_junction (
                course_id INTEGER NOT NULL,
                category_id INTEGER NOT NULL,
                PRIMARY KEY (course_id, category_id),
                FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE,
                FOREIGN KEY (category_id) REFERENCES course_categories(id) ON DELETE CASCADE
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS courses (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                title VARCHAR(255) NOT NULL,
                short_description TEXT NOT NULL,
                description TEXT NOT NULL,
                thumbnail VARCHAR(512) NOT NULL DEFAULT '',
                level_id BIGINT NOT NULL,
                status_id BIGINT NOT NULL DEFAULT 1,
                instructor_id BIGINT NOT NULL,
                length BIGINT NOT NULL DEFAULT 0,
                price BIGINT NOT NULL DEFAULT 0,
                has_certificate BOOLEAN NOT NULL DEFAULT FALSE,
                version BIGINT NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (level_id) REFERENCES course_levels(id),
                FOREIGN KEY (instructor_id) REFERENCES users(id)
            );
            CREATE INDEX idx_courses_instructor_id ON courses(instructor_id);
            CREATE INDEX idx_courses_status_id ON courses(status_id);
            CREATE TABLE IF NOT EXISTS course_categories_junction (
                course_id BIGINT NOT NULL,
                category_id BIGINT NOT NULL,
                PRIMARY KEY (course_id, category_id),
                FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE,
                FOREIGN KEY (category_id) REFERENCES course_categories(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 4,
        name: "create_course_exercises",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS course_exercises (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                course_id INTEGER NOT NULL,
                type_id INTEGER NOT NULL DEFAULT 1,
                title VARCHAR(255) NOT NULL,
                content TEXT NOT NULL,
                length INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_course_exercises_course_id ON course_exercises(course_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS course_exercises (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                course_id BIGINT NOT NULL,
                type_id BIGINT NOT NULL DEFAULT 1,
                title VARCHAR(255) NOT NULL,
                content MEDIUMTEXT NOT NULL,
                length BIGINT NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_course_exercises_course_id ON course_exercises(course_id);
        "#,
    },
    Migration {
        version: 5,
        name: "create_enrollments_and_certificates",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS enrollments (
                user_id INTEGER NOT NULL,
                course_id INTEGER NOT NULL,
                progress INTEGER NOT NULL DEFAULT 0,
                status_id INTEGER NOT NULL DEFAULT 1,
                last_exercise_id INTEGER,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (user_id, course_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS course_certificates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                course_id INTEGER NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_course_certificates_user_id ON course_certificates(user_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS enrollments (
                user_id BIGINT NOT NULL,
                course_id BIGINT NOT NULL,
                progress BIGINT NOT NULL DEFAULT 0,
                status_id BIGINT NOT NULL DEFAULT 1,
                last_exercise_id BIGINT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (user_id, course_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS course_certificates (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                user_id BIGINT NOT NULL,
                course_id BIGINT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_course_certificates_user_id ON course_certificates(user_id);
        "#,
    },
    Migration {
        version: 6,
        name: "create_teaching_applications",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS teaching_applications (
                user_id INTEGER PRIMARY KEY,
                experience TEXT NOT NULL,
                motivation TEXT NOT NULL,
                platform_choice VARCHAR(255) NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS teaching_applications (
                user_id BIGINT PRIMARY KEY,
                experience TEXT NOT NULL,
                motivation TEXT NOT NULL,
                platform_choice VARCHAR(255) NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
        "#,
    },
];

/// Run all pending migrations
///
/// Returns the number of migrations applied.
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    let applied_versions: Vec<i64> = applied.iter().map(|m| m.version).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&i64::from(migration.version)) {
            tracing::info!(
                "Applying migration {}: {}",
                migration.version,
                migration.name
            );
            apply_migration(pool, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

/// Create the migrations tracking table if it doesn't exist
async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        DatabaseDriver::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version BIGINT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

async fn get_applied_migrations(pool: &DynDatabasePool) -> Result<Vec<MigrationRecord>> {
    match pool.driver() {
        DatabaseDriver::Sqlite => get_applied_migrations_sqlite(pool.sqlite()?).await,
        DatabaseDriver::Mysql => get_applied_migrations_mysql(pool.mysql()?).await,
    }
}

async fn get_applied_migrations_sqlite(pool: &SqlitePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|row| -> Result<MigrationRecord> {
            Ok(MigrationRecord {
                version: row.try_get("version")?,
                name: row.try_get("name")?,
                applied_at: row.try_get("applied_at")?,
            })
        })
        .collect()
}

async fn get_applied_migrations_mysql(pool: &MySqlPool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|row| -> Result<MigrationRecord> {
            Ok(MigrationRecord {
                version: row.try_get("version")?,
                name: row.try_get("name")?,
                applied_at: row.try_get("applied_at")?,
            })
        })
        .collect()
}

async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    match pool.driver() {
        DatabaseDriver::Sqlite => apply_migration_sqlite(pool.sqlite()?, migration).await,
        DatabaseDriver::Mysql => apply_migration_mysql(pool.mysql()?, migration).await,
    }
}

async fn apply_migration_sqlite(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    let mut tx = pool.begin().await?;
    for statement in split_sql_statements(migration.up_sqlite) {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

// MySQL DDL commits implicitly, so statements run one by one on the pool.
async fn apply_migration_mysql(pool: &MySqlPool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_mysql) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;

    Ok(())
}

/// Truncate SQL for error messages
fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, skipping comment-only fragments.
///
/// Statements here never contain `;` inside string literals.
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Get pending migrations count
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;
    let applied = get_applied_migrations(pool).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[tokio::test]
    async fn test_run_migrations_is_repeatable() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, MIGRATIONS.len());

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_pending_count() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        let pending = pending_count(&pool).await.expect("Failed to check");
        assert_eq!(pending, MIGRATIONS.len());

        run_migrations(&pool).await.expect("Failed to run migrations");
        let pending = pending_count(&pool).await.expect("Failed to check");
        assert_eq!(pending, 0);
    }

    #[tokio::test]
    async fn test_catalog_is_seeded() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");

        let sqlite = pool.sqlite().unwrap();
        let categories: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM course_categories")
            .fetch_one(sqlite)
            .await
            .unwrap();
        let levels: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM course_levels")
            .fetch_one(sqlite)
            .await
            .unwrap();
        assert_eq!(categories, 6);
        assert_eq!(levels, 3);
    }

    #[tokio::test]
    async fn test_exercises_cascade_with_course() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");

        pool.execute(
            "INSERT INTO users (email, password_hash, first_name, last_name) \
             VALUES ('a@b.c', 'x', 'A', 'B')",
        )
        .await
        .unwrap();
        pool.execute("INSERT INTO courses (title, level_id, instructor_id) VALUES ('T', 1, 1)")
            .await
            .unwrap();
        pool.execute("INSERT INTO course_exercises (course_id, title, content) VALUES (1, 'e', 'c')")
            .await
            .unwrap();

        pool.execute("DELETE FROM courses WHERE id = 1").await.unwrap();

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM course_exercises")
            .fetch_one(pool.sqlite().unwrap())
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (id INT);\n -- comment only\n;\nCREATE TABLE b (id INT)";
        let statements = split_sql_statements(sql);
        assert_eq!(statements, vec!["CREATE TABLE a (id INT)", "CREATE TABLE b (id INT)"]);
    }
}
