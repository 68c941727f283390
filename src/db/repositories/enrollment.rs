//! Enrollment repository
//!
//! Enrollments and the certificates awarded for them.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{
    CertificateFilter, CourseCertificate, Enrollment, EnrollmentFilter, EnrollmentStatus,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySql, MySqlPool, QueryBuilder, Row, Sqlite, SqlitePool};
use std::sync::Arc;

use super::{push_id_in, WhereClause};

const ENROLLMENT_COLUMNS: &str =
    "user_id, course_id, progress, status_id, last_exercise_id, created_at, updated_at";
const CERTIFICATE_COLUMNS: &str = "id, user_id, course_id, created_at";

#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// List enrollments ordered by creation
    async fn list(&self, filter: &EnrollmentFilter) -> Result<Vec<Enrollment>>;

    /// Enroll a user in a course
    async fn create(&self, user_id: i64, course_id: i64) -> Result<Enrollment>;

    /// List certificates ordered by id
    async fn list_certificates(&self, filter: &CertificateFilter) -> Result<Vec<CourseCertificate>>;
}

pub struct SqlxEnrollmentRepository {
    pool: DynDatabasePool,
}

impl SqlxEnrollmentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn EnrollmentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl EnrollmentRepository for SqlxEnrollmentRepository {
    async fn list(&self, filter: &EnrollmentFilter) -> Result<Vec<Enrollment>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut qb = QueryBuilder::<Sqlite>::new(format!(
                    "SELECT {ENROLLMENT_COLUMNS} FROM enrollments"
                ));
                push_enrollment_filter(&mut qb, filter);
                let rows = qb
                    .build()
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list enrollments")?;
                rows.iter().map(row_to_enrollment_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let mut qb = QueryBuilder::<MySql>::new(format!(
                    "SELECT {ENROLLMENT_COLUMNS} FROM enrollments"
                ));
                push_enrollment_filter(&mut qb, filter);
                let rows = qb
                    .build()
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list enrollments")?;
                rows.iter().map(row_to_enrollment_mysql).collect()
            }
        }
    }

    async fn create(&self, user_id: i64, course_id: i64) -> Result<Enrollment> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_enrollment_sqlite(self.pool.sqlite()?, user_id, course_id).await,
            DatabaseDriver::Mysql => create_enrollment_mysql(self.pool.mysql()?, user_id, course_id).await,
        }
    }

    async fn list_certificates(&self, filter: &CertificateFilter) -> Result<Vec<CourseCertificate>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut qb = QueryBuilder::<Sqlite>::new(format!(
                    "SELECT {CERTIFICATE_COLUMNS} FROM course_certificates"
                ));
                push_certificate_filter(&mut qb, filter);
                let rows = qb
                    .build()
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list certificates")?;
                rows.iter()
                    .map(|row| -> Result<CourseCertificate> {
                        Ok(CourseCertificate {
                            id: row.try_get("id")?,
                            user_id: row.try_get("user_id")?,
                            course_id: row.try_get("course_id")?,
                            created_at: row.try_get("created_at")?,
                        })
                    })
                    .collect()
            }
            DatabaseDriver::Mysql => {
                let mut qb = QueryBuilder::<MySql>::new(format!(
                    "SELECT {CERTIFICATE_COLUMNS} FROM course_certificates"
                ));
                push_certificate_filter(&mut qb, filter);
                let rows = qb
                    .build()
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list certificates")?;
                rows.iter()
                    .map(|row| -> Result<CourseCertificate> {
                        Ok(CourseCertificate {
                            id: row.try_get("id")?,
                            user_id: row.try_get("user_id")?,
                            course_id: row.try_get("course_id")?,
                            created_at: row.try_get("created_at")?,
                        })
                    })
                    .collect()
            }
        }
    }
}

const INSERT_ENROLLMENT_SQL: &str = r#"
    INSERT INTO enrollments (user_id, course_id, progress, status_id, last_exercise_id, created_at, updated_at)
    VALUES (?, ?, 0, ?, NULL, ?, ?)
"#;

fn push_enrollment_filter<'args, DB>(qb: &mut QueryBuilder<'args, DB>, filter: &EnrollmentFilter)
where
    DB: sqlx::Database,
    i64: sqlx::Encode<'args, DB> + sqlx::Type<DB>,
{
    let mut clause = WhereClause::new();
    if let Some(user_ids) = &filter.user_ids {
        clause.next(qb);
        push_id_in(qb, "user_id", user_ids);
    }
    if let Some(status_ids) = &filter.status_ids {
        clause.next(qb);
        push_id_in(qb, "status_id", status_ids);
    }
    if let Some(course_id) = filter.course_id {
        clause.next(qb);
        qb.push("course_id = ").push_bind(course_id);
    }
    qb.push(" ORDER BY created_at, user_id, course_id");
}

fn push_certificate_filter<'args, DB>(qb: &mut QueryBuilder<'args, DB>, filter: &CertificateFilter)
where
    DB: sqlx::Database,
    i64: sqlx::Encode<'args, DB> + sqlx::Type<DB>,
{
    let mut clause = WhereClause::new();
    if let Some(ids) = &filter.ids {
        clause.next(qb);
        push_id_in(qb, "id", ids);
    }
    if let Some(user_id) = filter.user_id {
        clause.next(qb);
        qb.push("user_id = ").push_bind(user_id);
    }
    if let Some(course_id) = filter.course_id {
        clause.next(qb);
        qb.push("course_id = ").push_bind(course_id);
    }
    qb.push(" ORDER BY id");
}

fn new_enrollment(user_id: i64, course_id: i64) -> Enrollment {
    let now = Utc::now();
    Enrollment {
        user_id,
        course_id,
        progress: 0,
        status: EnrollmentStatus::Enrolled,
        last_exercise_id: None,
        created_at: now,
        updated_at: now,
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_enrollment_sqlite(pool: &SqlitePool, user_id: i64, course_id: i64) -> Result<Enrollment> {
    let enrollment = new_enrollment(user_id, course_id);
    sqlx::query(INSERT_ENROLLMENT_SQL)
        .bind(user_id)
        .bind(course_id)
        .bind(enrollment.status.id())
        .bind(enrollment.created_at)
        .bind(enrollment.updated_at)
        .execute(pool)
        .await
        .context("Failed to create enrollment")?;
    Ok(enrollment)
}

fn row_to_enrollment_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Enrollment> {
    let status_id: i64 = row.try_get("status_id")?;
    Ok(Enrollment {
        user_id: row.try_get("user_id")?,
        course_id: row.try_get("course_id")?,
        progress: row.try_get("progress")?,
        status: EnrollmentStatus::from_id(status_id)
            .with_context(|| format!("Unknown enrollment status id {}", status_id))?,
        last_exercise_id: row.try_get("last_exercise_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_enrollment_mysql(pool: &MySqlPool, user_id: i64, course_id: i64) -> Result<Enrollment> {
    let enrollment = new_enrollment(user_id, course_id);
    sqlx::query(INSERT_ENROLLMENT_SQL)
        .bind(user_id)
        .bind(course_id)
        .bind(enrollment.status.id())
        .bind(enrollment.created_at)
        .bind(enrollment.updated_at)
        .execute(pool)
        .await
        .context("Failed to create enrollment")?;
    Ok(enrollment)
}

fn row_to_enrollment_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Enrollment> {
    let status_id: i64 = row.try_get("status_id")?;
    Ok(Enrollment {
        user_id: row.try_get("user_id")?,
        course_id: row.try_get("course_id")?,
        progress: row.try_get("progress")?,
        status: EnrollmentStatus::from_id(status_id)
            .with_context(|| format!("Unknown enrollment status id {}", status_id))?,
        last_exercise_id: row.try_get("last_exercise_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
