//! Database repositories
//!
//! Repository pattern implementations for database access. Each repository
//! exposes an async trait and a `Sqlx*Repository` that dispatches on the pool's
//! driver to SQLite or MySQL specific queries.

pub mod catalog;
pub mod course;
pub mod enrollment;
pub mod exercise;
pub mod user;

pub use catalog::{CatalogRepository, SqlxCatalogRepository};
pub use course::{CourseRepository, SqlxCourseRepository};
pub use enrollment::{EnrollmentRepository, SqlxEnrollmentRepository};
pub use exercise::{
    AppliedBatch, BatchOutcome, ExerciseBatch, ExerciseRepository, ExerciseUpsert,
    SqlxExerciseRepository,
};
pub use user::{SqlxUserRepository, UserRepository};

use sqlx::QueryBuilder;

/// Whether an error returned by a repository is a unique constraint violation.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
        _ => false,
    }
}

/// Append `column IN (?, ?, ...)` binding every id. An empty list matches nothing.
pub(crate) fn push_id_in<'args, DB>(qb: &mut QueryBuilder<'args, DB>, column: &str, ids: &[i64])
where
    DB: sqlx::Database,
    i64: sqlx::Encode<'args, DB> + sqlx::Type<DB>,
{
    if ids.is_empty() {
        qb.push("1 = 0");
        return;
    }
    qb.push(column).push(" IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
}

/// Tracks whether the next filter needs `WHERE` or `AND`.
pub(crate) struct WhereClause {
    started: bool,
}

impl WhereClause {
    pub(crate) fn new() -> Self {
        Self { started: false }
    }

    pub(crate) fn next<'args, DB: sqlx::Database>(&mut self, qb: &mut QueryBuilder<'args, DB>) {
        qb.push(if self.started { " AND " } else { " WHERE " });
        self.started = true;
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Fixtures shared by repository and service tests.

    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::{CreateUserInput, UserType};
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::{SqlxUserRepository, UserRepository};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    pub(crate) fn unique_suffix() -> u64 {
        COUNTER.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) async fn migrated_pool() -> DynDatabasePool {
        let pool = create_test_pool()
            .await
            .expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    /// Insert a user directly, bypassing password hashing.
    pub(crate) async fn insert_user(pool: &DynDatabasePool, user_type: UserType) -> i64 {
        let repo = SqlxUserRepository::new(pool.clone());
        let user = repo
            .create(&CreateUserInput {
                email: format!("user{}@example.com", unique_suffix()),
                password_hash: "not-a-real-hash".to_string(),
                user_type,
                first_name: "Test".to_string(),
                last_name: "User".to_string(),
            })
            .await
            .expect("Failed to create user");
        user.id
    }
}
