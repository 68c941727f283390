//! Exercise repository
//!
//! Besides plain listing, this repository applies reconcile batches: a set of
//! exercise upserts and deletes for one course, followed by a recomputation of
//! the course's total length. A batch runs in a single transaction guarded by
//! the course's optimistic `version`, so either every change in the batch is
//! visible together with the new length, or none is.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{CourseExercise, IdSelector};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySql, MySqlPool, QueryBuilder, Row, Sqlite, SqlitePool};
use std::sync::Arc;

use super::push_id_in;

const EXERCISE_COLUMNS: &str =
    "id, course_id, type_id, title, content, length, created_at, updated_at";

/// Type assigned to exercises created through a batch
pub const DEFAULT_EXERCISE_TYPE: i64 = 1;

/// One exercise to write. `id: None` inserts a new exercise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExerciseUpsert {
    pub id: Option<i64>,
    pub title: String,
    pub content: String,
    /// Precomputed length of `content`
    pub length: i64,
}

/// A reconcile batch against one course.
#[derive(Debug, Clone)]
pub struct ExerciseBatch {
    pub course_id: i64,
    /// The batch only applies while this user still owns the course
    pub instructor_id: i64,
    /// Course version the caller observed before building the batch
    pub expected_version: i64,
    pub upserts: Vec<ExerciseUpsert>,
    pub delete_ids: Vec<i64>,
}

/// Result of a committed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedBatch {
    pub created: Vec<i64>,
    pub updated: Vec<i64>,
    pub deleted: Vec<i64>,
    /// Requested deletes that don't belong to the course
    pub ignored_deletes: Vec<i64>,
    pub course_length: i64,
}

/// What happened to a batch. Only `Applied` commits anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Applied(AppliedBatch),
    /// The course changed owner or version since it was read
    StaleCourse,
    /// An upsert referenced an exercise that is not part of the course
    MissingExercise(i64),
}

#[async_trait]
pub trait ExerciseRepository: Send + Sync {
    /// List a course's exercises ordered by id
    async fn list(&self, course_id: i64, ids: &IdSelector) -> Result<Vec<CourseExercise>>;

    /// Apply a reconcile batch atomically
    async fn apply_batch(&self, batch: &ExerciseBatch) -> Result<BatchOutcome>;
}

pub struct SqlxExerciseRepository {
    pool: DynDatabasePool,
}

impl SqlxExerciseRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ExerciseRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ExerciseRepository for SqlxExerciseRepository {
    async fn list(&self, course_id: i64, ids: &IdSelector) -> Result<Vec<CourseExercise>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_exercises_sqlite(self.pool.sqlite()?, course_id, ids).await,
            DatabaseDriver::Mysql => list_exercises_mysql(self.pool.mysql()?, course_id, ids).await,
        }
    }

    async fn apply_batch(&self, batch: &ExerciseBatch) -> Result<BatchOutcome> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => apply_batch_sqlite(self.pool.sqlite()?, batch).await,
            DatabaseDriver::Mysql => apply_batch_mysql(self.pool.mysql()?, batch).await,
        }
    }
}

const BUMP_VERSION_SQL: &str =
    "UPDATE courses SET version = version + 1 WHERE id = ? AND instructor_id = ? AND version = ?";
const EXERCISE_IN_COURSE_SQL: &str =
    "SELECT id FROM course_exercises WHERE id = ? AND course_id = ?";
const UPDATE_EXERCISE_SQL: &str =
    "UPDATE course_exercises SET title = ?, content = ?, length = ?, updated_at = ? WHERE id = ?";
const INSERT_EXERCISE_SQL: &str = r#"
    INSERT INTO course_exercises (course_id, type_id, title, content, length, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?)
"#;
const SET_COURSE_LENGTH_SQL: &str = "UPDATE courses SET length = ?, updated_at = ? WHERE id = ?";

/// Split requested deletes into those inside the course and the rest,
/// keeping request order and dropping duplicates.
fn partition_deletes(requested: &[i64], in_course: &[i64]) -> (Vec<i64>, Vec<i64>) {
    let mut deleted = Vec::new();
    let mut ignored = Vec::new();
    for id in requested {
        if deleted.contains(id) || ignored.contains(id) {
            continue;
        }
        if in_course.contains(id) {
            deleted.push(*id);
        } else {
            ignored.push(*id);
        }
    }
    (deleted, ignored)
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn list_exercises_sqlite(
    pool: &SqlitePool,
    course_id: i64,
    ids: &IdSelector,
) -> Result<Vec<CourseExercise>> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {EXERCISE_COLUMNS} FROM course_exercises WHERE course_id = "
    ));
    qb.push_bind(course_id);
    if let Some(ids) = ids.ids() {
        qb.push(" AND ");
        push_id_in(&mut qb, "id", ids);
    }
    qb.push(" ORDER BY id");

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to list exercises")?;

    rows.iter().map(row_to_exercise_sqlite).collect()
}

async fn apply_batch_sqlite(pool: &SqlitePool, batch: &ExerciseBatch) -> Result<BatchOutcome> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let bumped = sqlx::query(BUMP_VERSION_SQL)
        .bind(batch.course_id)
        .bind(batch.instructor_id)
        .bind(batch.expected_version)
        .execute(&mut *tx)
        .await
        .context("Failed to lock course version")?
        .rows_affected();
    if bumped == 0 {
        return Ok(BatchOutcome::StaleCourse);
    }

    let mut applied = AppliedBatch::default();

    for upsert in &batch.upserts {
        match upsert.id {
            Some(id) => {
                let exists = sqlx::query(EXERCISE_IN_COURSE_SQL)
                    .bind(id)
                    .bind(batch.course_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .context("Failed to look up exercise")?
                    .is_some();
                if !exists {
                    return Ok(BatchOutcome::MissingExercise(id));
                }

                sqlx::query(UPDATE_EXERCISE_SQL)
                    .bind(&upsert.title)
                    .bind(&upsert.content)
                    .bind(upsert.length)
                    .bind(now)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to update exercise")?;
                applied.updated.push(id);
            }
            None => {
                let id = sqlx::query(INSERT_EXERCISE_SQL)
                    .bind(batch.course_id)
                    .bind(DEFAULT_EXERCISE_TYPE)
                    .bind(&upsert.title)
                    .bind(&upsert.content)
                    .bind(upsert.length)
                    .bind(now)
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to create exercise")?
                    .last_insert_rowid();
                applied.created.push(id);
            }
        }
    }

    if !batch.delete_ids.is_empty() {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT id FROM course_exercises WHERE course_id = ");
        qb.push_bind(batch.course_id).push(" AND ");
        push_id_in(&mut qb, "id", &batch.delete_ids);
        let in_course: Vec<i64> = qb
            .build_query_scalar()
            .fetch_all(&mut *tx)
            .await
            .context("Failed to resolve exercises to delete")?;

        let (deleted, ignored) = partition_deletes(&batch.delete_ids, &in_course);
        if !deleted.is_empty() {
            let mut qb =
                QueryBuilder::<Sqlite>::new("DELETE FROM course_exercises WHERE course_id = ");
            qb.push_bind(batch.course_id).push(" AND ");
            push_id_in(&mut qb, "id", &deleted);
            qb.build()
                .execute(&mut *tx)
                .await
                .context("Failed to delete exercises")?;
        }
        applied.deleted = deleted;
        applied.ignored_deletes = ignored;
    }

    let course_length: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(length), 0) FROM course_exercises WHERE course_id = ?",
    )
    .bind(batch.course_id)
    .fetch_one(&mut *tx)
    .await
    .context("Failed to sum exercise lengths")?;

    sqlx::query(SET_COURSE_LENGTH_SQL)
        .bind(course_length)
        .bind(now)
        .bind(batch.course_id)
        .execute(&mut *tx)
        .await
        .context("Failed to store course length")?;

    tx.commit().await.context("Failed to commit exercise batch")?;

    applied.course_length = course_length;
    Ok(BatchOutcome::Applied(applied))
}

fn row_to_exercise_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<CourseExercise> {
    Ok(CourseExercise {
        id: row.try_get("id")?,
        course_id: row.try_get("course_id")?,
        type_id: row.try_get("type_id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        length: row.try_get("length")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn list_exercises_mysql(
    pool: &MySqlPool,
    course_id: i64,
    ids: &IdSelector,
) -> Result<Vec<CourseExercise>> {
    let mut qb = QueryBuilder::<MySql>::new(format!(
        "SELECT {EXERCISE_COLUMNS} FROM course_exercises WHERE course_id = "
    ));
    qb.push_bind(course_id);
    if let Some(ids) = ids.ids() {
        qb.push(" AND ");
        push_id_in(&mut qb, "id", ids);
    }
    qb.push(" ORDER BY id");

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to list exercises")?;

    rows.iter().map(row_to_exercise_mysql).collect()
}

async fn apply_batch_mysql(pool: &MySqlPool, batch: &ExerciseBatch) -> Result<BatchOutcome> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let bumped = sqlx::query(BUMP_VERSION_SQL)
        .bind(batch.course_id)
        .bind(batch.instructor_id)
        .bind(batch.expected_version)
        .execute(&mut *tx)
        .await
        .context("Failed to lock course version")?
        .rows_affected();
    if bumped == 0 {
        return Ok(BatchOutcome::StaleCourse);
    }

    let mut applied = AppliedBatch::default();

    for upsert in &batch.upserts {
        match upsert.id {
            Some(id) => {
                let exists = sqlx::query(EXERCISE_IN_COURSE_SQL)
                    .bind(id)
                    .bind(batch.course_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .context("Failed to look up exercise")?
                    .is_some();
                if !exists {
                    return Ok(BatchOutcome::MissingExercise(id));
                }

                sqlx::query(UPDATE_EXERCISE_SQL)
                    .bind(&upsert.title)
                    .bind(&upsert.content)
                    .bind(upsert.length)
                    .bind(now)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to update exercise")?;
                applied.updated.push(id);
            }
            None => {
                let id = sqlx::query(INSERT_EXERCISE_SQL)
                    .bind(batch.course_id)
                    .bind(DEFAULT_EXERCISE_TYPE)
                    .bind(&upsert.title)
                    .bind(&upsert.content)
                    .bind(upsert.length)
                    .bind(now)
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to create exercise")?
                    .last_insert_id() as i64;
                applied.created.push(id);
            }
        }
    }

    if !batch.delete_ids.is_empty() {
        let mut qb = QueryBuilder::<MySql>::new("SELECT id FROM course_exercises WHERE course_id = ");
        qb.push_bind(batch.course_id).push(" AND ");
        push_id_in(&mut qb, "id", &batch.delete_ids);
        let in_course: Vec<i64> = qb
            .build_query_scalar()
            .fetch_all(&mut *tx)
            .await
            .context("Failed to resolve exercises to delete")?;

        let (deleted, ignored) = partition_deletes(&batch.delete_ids, &in_course);
        if !deleted.is_empty() {
            let mut qb =
                QueryBuilder::<MySql>::new("DELETE FROM course_exercises WHERE course_id = ");
            qb.push_bind(batch.course_id).push(" AND ");
            push_id_in(&mut qb, "id", &deleted);
            qb.build()
                .execute(&mut *tx)
                .await
                .context("Failed to delete exercises")?;
        }
        applied.deleted = deleted;
        applied.ignored_deletes = ignored;
    }

    // SUM over BIGINT is DECIMAL in MySQL
    let course_length: i64 = sqlx::query_scalar(
        "SELECT CAST(COALESCE(SUM(length), 0) AS SIGNED) FROM course_exercises WHERE course_id = ?",
    )
    .bind(batch.course_id)
    .fetch_one(&mut *tx)
    .await
    .context("Failed to sum exercise lengths")?;

    sqlx::query(SET_COURSE_LENGTH_SQL)
        .bind(course_length)
        .bind(now)
        .bind(batch.course_id)
        .execute(&mut *tx)
        .await
        .context("Failed to store course length")?;

    tx.commit().await.context("Failed to commit exercise batch")?;

    applied.course_length = course_length;
    Ok(BatchOutcome::Applied(applied))
}

fn row_to_exercise_mysql(row: &sqlx::mysql::MySqlRow) -> Result<CourseExercise> {
    Ok(CourseExercise {
        id: row.try_get("id")?,
        course_id: row.try_get("course_id")?,
        type_id: row.try_get("type_id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        length: row.try_get("length")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::*;
    use crate::db::repositories::{CourseRepository, SqlxCourseRepository};
    use crate::models::{CreateCourseInput, UserType};

    struct Fixture {
        repo: SqlxExerciseRepository,
        courses: SqlxCourseRepository,
        instructor: i64,
        course_id: i64,
    }

    async fn fixture() -> Fixture {
        let pool = migrated_pool().await;
        let instructor = insert_user(&pool, UserType::Educator).await;
        let courses = SqlxCourseRepository::new(pool.clone());
        let course = courses
            .create(&CreateCourseInput {
                title: "Course".to_string(),
                level_id: 1,
                has_certificate: false,
                category_ids: vec![],
                thumbnail: String::new(),
                instructor_id: instructor,
            })
            .await
            .unwrap();
        Fixture {
            repo: SqlxExerciseRepository::new(pool),
            courses,
            instructor,
            course_id: course.id,
        }
    }

    fn upsert(id: Option<i64>, length: i64) -> ExerciseUpsert {
        ExerciseUpsert {
            id,
            title: format!("Exercise {:?}", id),
            content: "content".to_string(),
            length,
        }
    }

    async fn version(f: &Fixture) -> i64 {
        f.courses.get_by_id(f.course_id).await.unwrap().unwrap().version
    }

    fn applied(outcome: BatchOutcome) -> AppliedBatch {
        match outcome {
            BatchOutcome::Applied(applied) => applied,
            other => panic!("batch not applied: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_batch_inserts_and_sums() {
        let f = fixture().await;
        let outcome = f
            .repo
            .apply_batch(&ExerciseBatch {
                course_id: f.course_id,
                instructor_id: f.instructor,
                expected_version: version(&f).await,
                upserts: vec![upsert(None, 2), upsert(None, 3)],
                delete_ids: vec![],
            })
            .await
            .unwrap();

        let applied = applied(outcome);
        assert_eq!(applied.created.len(), 2);
        assert_eq!(applied.course_length, 5);

        let course = f.courses.get_by_id(f.course_id).await.unwrap().unwrap();
        assert_eq!(course.length, 5);
        assert_eq!(course.version, 1);

        let exercises = f.repo.list(f.course_id, &IdSelector::All).await.unwrap();
        assert_eq!(exercises.len(), 2);
        assert!(exercises.iter().all(|e| e.type_id == DEFAULT_EXERCISE_TYPE));
    }

    #[tokio::test]
    async fn test_stale_version_changes_nothing() {
        let f = fixture().await;
        let outcome = f
            .repo
            .apply_batch(&ExerciseBatch {
                course_id: f.course_id,
                instructor_id: f.instructor,
                expected_version: version(&f).await + 7,
                upserts: vec![upsert(None, 4)],
                delete_ids: vec![],
            })
            .await
            .unwrap();

        assert_eq!(outcome, BatchOutcome::StaleCourse);
        assert!(f.repo.list(f.course_id, &IdSelector::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_exercise_rolls_back_whole_batch() {
        let f = fixture().await;
        let outcome = f
            .repo
            .apply_batch(&ExerciseBatch {
                course_id: f.course_id,
                instructor_id: f.instructor,
                expected_version: version(&f).await,
                upserts: vec![upsert(None, 4), upsert(Some(9999), 1)],
                delete_ids: vec![],
            })
            .await
            .unwrap();

        assert_eq!(outcome, BatchOutcome::MissingExercise(9999));
        assert!(f.repo.list(f.course_id, &IdSelector::All).await.unwrap().is_empty());
        let course = f.courses.get_by_id(f.course_id).await.unwrap().unwrap();
        assert_eq!(course.version, 0);
        assert_eq!(course.length, 0);
    }

    #[tokio::test]
    async fn test_deletes_partition_and_dedupe() {
        let f = fixture().await;
        let first = applied(
            f.repo
                .apply_batch(&ExerciseBatch {
                    course_id: f.course_id,
                    instructor_id: f.instructor,
                    expected_version: version(&f).await,
                    upserts: vec![upsert(None, 2), upsert(None, 3)],
                    delete_ids: vec![],
                })
                .await
                .unwrap(),
        );

        let doomed = first.created[0];
        let second = applied(
            f.repo
                .apply_batch(&ExerciseBatch {
                    course_id: f.course_id,
                    instructor_id: f.instructor,
                    expected_version: version(&f).await,
                    upserts: vec![],
                    delete_ids: vec![doomed, 424242, doomed],
                })
                .await
                .unwrap(),
        );

        assert_eq!(second.deleted, vec![doomed]);
        assert_eq!(second.ignored_deletes, vec![424242]);
        assert_eq!(second.course_length, 3);
    }

    #[test]
    fn test_partition_deletes() {
        let (deleted, ignored) = partition_deletes(&[3, 1, 3, 8, 8], &[1, 3]);
        assert_eq!(deleted, vec![3, 1]);
        assert_eq!(ignored, vec![8]);
    }
}
