//! Course repository
//!
//! Courses with their many-to-many categories. Length is never written here;
//! it is maintained by the exercise repository's batch operation.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{
    Course, CourseCategory, CourseFilter, CourseStatus, CreateCourseInput, UpdateCourseGeneral,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySql, MySqlPool, QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

use super::{push_id_in, WhereClause};

const COURSE_COLUMNS: &str = "c.id, c.title, c.short_description, c.description, c.thumbnail, \
     c.level_id, c.status_id, c.instructor_id, c.length, c.price, c.has_certificate, c.version, \
     c.created_at, c.updated_at";

/// Course repository trait
#[async_trait]
pub trait CourseRepository: Send + Sync {
    /// Create a course and attach its categories
    async fn create(&self, input: &CreateCourseInput) -> Result<Course>;

    /// Get course by ID, categories included
    async fn get_by_id(&self, id: i64) -> Result<Option<Course>>;

    /// List courses matching the filter
    async fn list(&self, filter: &CourseFilter) -> Result<Vec<Course>>;

    /// Overwrite the general information of a course still owned by
    /// `instructor_id`. Returns `None` when no such course exists.
    async fn update_general(
        &self,
        id: i64,
        instructor_id: i64,
        update: &UpdateCourseGeneral,
    ) -> Result<Option<Course>>;
}

/// SQLx-based course repository implementation
pub struct SqlxCourseRepository {
    pool: DynDatabasePool,
}

impl SqlxCourseRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CourseRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CourseRepository for SqlxCourseRepository {
    async fn create(&self, input: &CreateCourseInput) -> Result<Course> {
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => create_course_sqlite(self.pool.sqlite()?, input).await?,
            DatabaseDriver::Mysql => create_course_mysql(self.pool.mysql()?, input).await?,
        };
        self.get_by_id(id)
            .await?
            .context("Course vanished right after creation")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Course>> {
        let filter = CourseFilter {
            ids: crate::models::IdSelector::Ids(vec![id]),
            ..CourseFilter::default()
        };
        Ok(self.list(&filter).await?.into_iter().next())
    }

    async fn list(&self, filter: &CourseFilter) -> Result<Vec<Course>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                let mut courses = list_courses_sqlite(pool, filter).await?;
                let ids: Vec<i64> = courses.iter().map(|c| c.id).collect();
                let mut categories = categories_for_sqlite(pool, &ids).await?;
                for course in &mut courses {
                    course.categories = categories.remove(&course.id).unwrap_or_default();
                }
                Ok(courses)
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                let mut courses = list_courses_mysql(pool, filter).await?;
                let ids: Vec<i64> = courses.iter().map(|c| c.id).collect();
                let mut categories = categories_for_mysql(pool, &ids).await?;
                for course in &mut courses {
                    course.categories = categories.remove(&course.id).unwrap_or_default();
                }
                Ok(courses)
            }
        }
    }

    async fn update_general(
        &self,
        id: i64,
        instructor_id: i64,
        update: &UpdateCourseGeneral,
    ) -> Result<Option<Course>> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(UPDATE_GENERAL_SQL)
                    .bind(&update.title)
                    .bind(&update.short_description)
                    .bind(&update.description)
                    .bind(update.price)
                    .bind(update.thumbnail.as_deref())
                    .bind(Utc::now())
                    .bind(id)
                    .bind(instructor_id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to update course")?
                    .rows_affected()
            }
            DatabaseDriver::Mysql => {
                sqlx::query(UPDATE_GENERAL_SQL)
                    .bind(&update.title)
                    .bind(&update.short_description)
                    .bind(&update.description)
                    .bind(update.price)
                    .bind(update.thumbnail.as_deref())
                    .bind(Utc::now())
                    .bind(id)
                    .bind(instructor_id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to update course")?
                    .rows_affected()
            }
        };

        if affected == 0 {
            return Ok(None);
        }
        self.get_by_id(id).await
    }
}

const UPDATE_GENERAL_SQL: &str = r#"
    UPDATE courses
    SET title = ?,
        short_description = ?,
        description = ?,
        price = ?,
        thumbnail = COALESCE(?, thumbnail),
        version = version + 1,
        updated_at = ?
    WHERE id = ? AND instructor_id = ?
"#;

const INSERT_COURSE_SQL: &str = r#"
    INSERT INTO courses (title, short_description, description, thumbnail, level_id, status_id,
                         instructor_id, length, price, has_certificate, version, created_at, updated_at)
    VALUES (?, '', '', ?, ?, ?, ?, 0, 0, ?, 0, ?, ?)
"#;

const CATEGORIES_FOR_SQL: &str = "SELECT j.course_id AS course_id, cc.id AS id, cc.title AS title \
     FROM course_categories_junction j \
     JOIN course_categories cc ON cc.id = j.category_id WHERE ";

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_course_sqlite(pool: &SqlitePool, input: &CreateCourseInput) -> Result<i64> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let id = sqlx::query(INSERT_COURSE_SQL)
        .bind(&input.title)
        .bind(&input.thumbnail)
        .bind(input.level_id)
        .bind(CourseStatus::Draft.id())
        .bind(input.instructor_id)
        .bind(input.has_certificate)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create course")?
        .last_insert_rowid();

    for category_id in &input.category_ids {
        sqlx::query("INSERT INTO course_categories_junction (course_id, category_id) VALUES (?, ?)")
            .bind(id)
            .bind(*category_id)
            .execute(&mut *tx)
            .await
            .context("Failed to attach course category")?;
    }

    tx.commit().await?;
    Ok(id)
}

async fn list_courses_sqlite(pool: &SqlitePool, filter: &CourseFilter) -> Result<Vec<Course>> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {COURSE_COLUMNS} FROM courses c"));
    push_course_filter(&mut qb, filter);

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to list courses")?;

    rows.iter().map(row_to_course_sqlite).collect()
}

async fn categories_for_sqlite(
    pool: &SqlitePool,
    course_ids: &[i64],
) -> Result<HashMap<i64, Vec<CourseCategory>>> {
    if course_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let mut qb = QueryBuilder::<Sqlite>::new(CATEGORIES_FOR_SQL);
    push_id_in(&mut qb, "j.course_id", course_ids);
    qb.push(" ORDER BY cc.id");

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to load course categories")?;

    let mut grouped: HashMap<i64, Vec<CourseCategory>> = HashMap::new();
    for row in rows {
        grouped
            .entry(row.try_get("course_id")?)
            .or_default()
            .push(CourseCategory {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
            });
    }
    Ok(grouped)
}

fn row_to_course_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Course> {
    let status_id: i64 = row.try_get("status_id")?;
    Ok(Course {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        short_description: row.try_get("short_description")?,
        description: row.try_get("description")?,
        thumbnail: row.try_get("thumbnail")?,
        level_id: row.try_get("level_id")?,
        status: CourseStatus::from_id(status_id)
            .with_context(|| format!("Unknown course status id {}", status_id))?,
        instructor_id: row.try_get("instructor_id")?,
        length: row.try_get("length")?,
        price: row.try_get("price")?,
        has_certificate: row.try_get("has_certificate")?,
        version: row.try_get("version")?,
        categories: Vec::new(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_course_mysql(pool: &MySqlPool, input: &CreateCourseInput) -> Result<i64> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let id = sqlx::query(INSERT_COURSE_SQL)
        .bind(&input.title)
        .bind(&input.thumbnail)
        .bind(input.level_id)
        .bind(CourseStatus::Draft.id())
        .bind(input.instructor_id)
        .bind(input.has_certificate)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create course")?
        .last_insert_id() as i64;

    for category_id in &input.category_ids {
        sqlx::query("INSERT INTO course_categories_junction (course_id, category_id) VALUES (?, ?)")
            .bind(id)
            .bind(*category_id)
            .execute(&mut *tx)
            .await
            .context("Failed to attach course category")?;
    }

    tx.commit().await?;
    Ok(id)
}

async fn list_courses_mysql(pool: &MySqlPool, filter: &CourseFilter) -> Result<Vec<Course>> {
    let mut qb = QueryBuilder::<MySql>::new(format!("SELECT {COURSE_COLUMNS} FROM courses c"));
    push_course_filter(&mut qb, filter);

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to list courses")?;

    rows.iter().map(row_to_course_mysql).collect()
}

async fn categories_for_mysql(
    pool: &MySqlPool,
    course_ids: &[i64],
) -> Result<HashMap<i64, Vec<CourseCategory>>> {
    if course_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let mut qb = QueryBuilder::<MySql>::new(CATEGORIES_FOR_SQL);
    push_id_in(&mut qb, "j.course_id", course_ids);
    qb.push(" ORDER BY cc.id");

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to load course categories")?;

    let mut grouped: HashMap<i64, Vec<CourseCategory>> = HashMap::new();
    for row in rows {
        grouped
            .entry(row.try_get("course_id")?)
            .or_default()
            .push(CourseCategory {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
            });
    }
    Ok(grouped)
}

fn row_to_course_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Course> {
    let status_id: i64 = row.try_get("status_id")?;
    Ok(Course {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        short_description: row.try_get("short_description")?,
        description: row.try_get("description")?,
        thumbnail: row.try_get("thumbnail")?,
        level_id: row.try_get("level_id")?,
        status: CourseStatus::from_id(status_id)
            .with_context(|| format!("Unknown course status id {}", status_id))?,
        instructor_id: row.try_get("instructor_id")?,
        length: row.try_get("length")?,
        price: row.try_get("price")?,
        has_certificate: row.try_get("has_certificate")?,
        version: row.try_get("version")?,
        categories: Vec::new(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Append joins, `WHERE` filters and `ORDER BY` for a course list query.
fn push_course_filter<'args, DB>(qb: &mut QueryBuilder<'args, DB>, filter: &CourseFilter)
where
    DB: sqlx::Database,
    i64: sqlx::Encode<'args, DB> + sqlx::Type<DB>,
    bool: sqlx::Encode<'args, DB> + sqlx::Type<DB>,
{
    if filter.enrolled_user_id.is_some() {
        qb.push(" JOIN enrollments e ON e.course_id = c.id");
    }

    let mut clause = WhereClause::new();
    if let Some(ids) = filter.ids.ids() {
        clause.next(qb);
        push_id_in(qb, "c.id", ids);
    }
    if let Some(status) = filter.status {
        clause.next(qb);
        qb.push("c.status_id = ").push_bind(status.id());
    }
    if let Some(instructor_id) = filter.instructor_id {
        clause.next(qb);
        qb.push("c.instructor_id = ").push_bind(instructor_id);
    }
    if let Some(level_id) = filter.level_id {
        clause.next(qb);
        qb.push("c.level_id = ").push_bind(level_id);
    }
    if let Some(user_id) = filter.enrolled_user_id {
        clause.next(qb);
        qb.push("e.user_id = ").push_bind(user_id);
    }
    if let Some(has_certificate) = filter.has_certificate {
        clause.next(qb);
        qb.push("c.has_certificate = ").push_bind(has_certificate);
    }

    qb.push(format!(
        " ORDER BY {} {}, c.id ASC",
        filter.sort.column(),
        filter.direction.as_sql()
    ));
}
