//! Exercise aggregation engine
//!
//! Reconciles a batch of exercise upserts and deletes against a course and
//! keeps `course.length` equal to the sum of its exercises' lengths.
//!
//! The batch is applied atomically by the repository, guarded by the course
//! version read during the ownership check. A concurrent reconcile of the same
//! course makes the later commit fail with `Conflict` instead of losing an
//! update. The whole batch is bounded by the persistence deadline.

use crate::db::repositories::{
    AppliedBatch, BatchOutcome, ExerciseBatch, ExerciseRepository, ExerciseUpsert,
};
use crate::models::{CourseExercise, IdSelector};
use crate::services::course::CourseServiceError;
use crate::services::ownership::OwnershipEnforcer;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Reading speed used to estimate exercise length, in words per minute
pub const READING_SPEED_WPM: usize = 200;

/// Estimated reading time of `content` in whole minutes.
pub fn estimate_length(content: &str) -> i64 {
    (content.split_whitespace().count() / READING_SPEED_WPM) as i64
}

/// An exercise as submitted by the instructor. `id: None` creates it.
#[derive(Debug, Clone)]
pub struct ExerciseDraft {
    pub id: Option<i64>,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct ReconcileRequest {
    pub course_id: i64,
    pub upserts: Vec<ExerciseDraft>,
    pub delete_ids: Vec<i64>,
}

/// What a committed reconcile changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub created: Vec<i64>,
    pub updated: Vec<i64>,
    pub deleted: Vec<i64>,
    /// Delete ids that belong to another course and were left alone
    pub ignored_deletes: Vec<i64>,
    pub course_length: i64,
}

impl From<AppliedBatch> for ReconcileOutcome {
    fn from(applied: AppliedBatch) -> Self {
        Self {
            created: applied.created,
            updated: applied.updated,
            deleted: applied.deleted,
            ignored_deletes: applied.ignored_deletes,
            course_length: applied.course_length,
        }
    }
}

pub struct ExerciseService {
    exercises: Arc<dyn ExerciseRepository>,
    ownership: Arc<OwnershipEnforcer>,
    deadline: Duration,
}

impl ExerciseService {
    pub fn new(
        exercises: Arc<dyn ExerciseRepository>,
        ownership: Arc<OwnershipEnforcer>,
        deadline: Duration,
    ) -> Self {
        Self {
            exercises,
            ownership,
            deadline,
        }
    }

    /// Exercises of a course ordered by id.
    pub async fn list(
        &self,
        course_id: i64,
        ids: &IdSelector,
    ) -> Result<Vec<CourseExercise>, CourseServiceError> {
        let exercises = self
            .exercises
            .list(course_id, ids)
            .await
            .context("Failed to list exercises")?;
        Ok(exercises)
    }

    pub async fn reconcile(
        &self,
        actor_id: i64,
        request: ReconcileRequest,
    ) -> Result<ReconcileOutcome, CourseServiceError> {
        let course = self.ownership.authorize(actor_id, request.course_id).await?;

        let batch = ExerciseBatch {
            course_id: course.id,
            instructor_id: actor_id,
            expected_version: course.version,
            upserts: request
                .upserts
                .into_iter()
                .map(|draft| ExerciseUpsert {
                    id: draft.id,
                    length: estimate_length(&draft.content),
                    title: draft.title,
                    content: draft.content,
                })
                .collect(),
            delete_ids: request.delete_ids,
        };

        let outcome = tokio::time::timeout(self.deadline, self.exercises.apply_batch(&batch))
            .await
            .map_err(|_| {
                tracing::error!(course_id = course.id, "Exercise reconcile exceeded deadline");
                CourseServiceError::Timeout
            })?
            .context("Failed to apply exercise batch")?;

        match outcome {
            BatchOutcome::Applied(applied) => {
                if !applied.ignored_deletes.is_empty() {
                    tracing::warn!(
                        course_id = course.id,
                        ignored = ?applied.ignored_deletes,
                        "Ignoring delete ids that belong to another course"
                    );
                }
                tracing::info!(
                    course_id = course.id,
                    created = applied.created.len(),
                    updated = applied.updated.len(),
                    deleted = applied.deleted.len(),
                    length = applied.course_length,
                    "Exercises reconciled"
                );
                Ok(applied.into())
            }
            BatchOutcome::StaleCourse => Err(CourseServiceError::Conflict(format!(
                "Course {} was modified concurrently, reload and retry",
                course.id
            ))),
            BatchOutcome::MissingExercise(id) => Err(CourseServiceError::NotFound(format!(
                "Exercise {} not found in course {}",
                id, course.id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_user, migrated_pool};
    use crate::db::repositories::{CourseRepository, SqlxCourseRepository, SqlxExerciseRepository};
    use crate::db::DynDatabasePool;
    use crate::models::{CreateCourseInput, UserType};
    use async_trait::async_trait;
    use proptest::prelude::*;

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    fn draft(id: Option<i64>, title: &str, word_count: usize) -> ExerciseDraft {
        ExerciseDraft {
            id,
            title: title.to_string(),
            content: words(word_count),
        }
    }

    struct Fixture {
        pool: DynDatabasePool,
        courses: Arc<dyn CourseRepository>,
        service: ExerciseService,
    }

    async fn setup() -> Fixture {
        let pool = migrated_pool().await;
        let courses = SqlxCourseRepository::boxed(pool.clone());
        let service = ExerciseService::new(
            SqlxExerciseRepository::boxed(pool.clone()),
            Arc::new(OwnershipEnforcer::new(courses.clone())),
            Duration::from_secs(5),
        );
        Fixture {
            pool,
            courses,
            service,
        }
    }

    async fn course_for(fx: &Fixture, instructor_id: i64) -> i64 {
        fx.courses
            .create(&CreateCourseInput {
                title: "Course".to_string(),
                level_id: 1,
                has_certificate: false,
                category_ids: vec![],
                thumbnail: String::new(),
                instructor_id,
            })
            .await
            .unwrap()
            .id
    }

    async fn course_length(fx: &Fixture, course_id: i64) -> i64 {
        fx.courses.get_by_id(course_id).await.unwrap().unwrap().length
    }

    #[test]
    fn test_estimate_length() {
        assert_eq!(estimate_length(""), 0);
        assert_eq!(estimate_length(&words(199)), 0);
        assert_eq!(estimate_length(&words(200)), 1);
        assert_eq!(estimate_length(&words(400)), 2);
        assert_eq!(estimate_length("  spaced\n\tout   words "), 0);
    }

    #[tokio::test]
    async fn test_reconcile_scenario_400_600_then_1000() {
        let fx = setup().await;
        let instructor = insert_user(&fx.pool, UserType::Educator).await;
        let course_id = course_for(&fx, instructor).await;

        let first = fx
            .service
            .reconcile(
                instructor,
                ReconcileRequest {
                    course_id,
                    upserts: vec![draft(None, "Intro", 400), draft(None, "Basics", 600)],
                    delete_ids: vec![],
                },
            )
            .await
            .unwrap();
        assert_eq!(first.created.len(), 2);
        assert_eq!(first.course_length, 5);
        assert_eq!(course_length(&fx, course_id).await, 5);

        let exercises = fx.service.list(course_id, &IdSelector::All).await.unwrap();
        let lengths: Vec<i64> = exercises.iter().map(|e| e.length).collect();
        assert_eq!(lengths, vec![2, 3]);

        let second = fx
            .service
            .reconcile(
                instructor,
                ReconcileRequest {
                    course_id,
                    upserts: vec![draft(Some(exercises[0].id), "Intro", 1000)],
                    delete_ids: vec![],
                },
            )
            .await
            .unwrap();
        assert_eq!(second.updated, vec![exercises[0].id]);
        assert_eq!(second.course_length, 8);
        assert_eq!(course_length(&fx, course_id).await, 8);
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent_on_length() {
        let fx = setup().await;
        let instructor = insert_user(&fx.pool, UserType::Educator).await;
        let course_id = course_for(&fx, instructor).await;
        let created = fx
            .service
            .reconcile(
                instructor,
                ReconcileRequest {
                    course_id,
                    upserts: vec![
                        draft(None, "a", 200),
                        draft(None, "b", 400),
                        draft(None, "c", 600),
                    ],
                    delete_ids: vec![],
                },
            )
            .await
            .unwrap();

        let batch = ReconcileRequest {
            course_id,
            upserts: vec![draft(Some(created.created[0]), "a", 1200)],
            delete_ids: vec![created.created[1]],
        };

        let once = fx.service.reconcile(instructor, batch.clone()).await.unwrap();
        let twice = fx.service.reconcile(instructor, batch).await.unwrap();

        assert_eq!(once.course_length, 9);
        assert_eq!(twice.course_length, once.course_length);
        assert_eq!(course_length(&fx, course_id).await, 9);
    }

    #[tokio::test]
    async fn test_reconcile_forbidden_for_non_owner() {
        let fx = setup().await;
        let owner = insert_user(&fx.pool, UserType::Educator).await;
        let admin = insert_user(&fx.pool, UserType::Admin).await;
        let course_id = course_for(&fx, owner).await;

        let result = fx
            .service
            .reconcile(
                admin,
                ReconcileRequest {
                    course_id,
                    upserts: vec![draft(None, "x", 400)],
                    delete_ids: vec![],
                },
            )
            .await;
        assert!(matches!(result, Err(CourseServiceError::Forbidden(_))));
        assert!(fx.service.list(course_id, &IdSelector::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_missing_course() {
        let fx = setup().await;
        let owner = insert_user(&fx.pool, UserType::Educator).await;
        let result = fx
            .service
            .reconcile(
                owner,
                ReconcileRequest {
                    course_id: 31337,
                    upserts: vec![],
                    delete_ids: vec![],
                },
            )
            .await;
        assert!(matches!(result, Err(CourseServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_upsert_of_foreign_exercise_is_not_found_and_rolls_back() {
        let fx = setup().await;
        let owner = insert_user(&fx.pool, UserType::Educator).await;
        let mine = course_for(&fx, owner).await;
        let theirs = course_for(&fx, owner).await;
        let foreign = fx
            .service
            .reconcile(
                owner,
                ReconcileRequest {
                    course_id: theirs,
                    upserts: vec![draft(None, "other", 200)],
                    delete_ids: vec![],
                },
            )
            .await
            .unwrap()
            .created[0];

        let result = fx
            .service
            .reconcile(
                owner,
                ReconcileRequest {
                    course_id: mine,
                    upserts: vec![draft(None, "new", 400), draft(Some(foreign), "steal", 1000)],
                    delete_ids: vec![],
                },
            )
            .await;

        assert!(matches!(result, Err(CourseServiceError::NotFound(_))));
        assert!(fx.service.list(mine, &IdSelector::All).await.unwrap().is_empty());
        assert_eq!(course_length(&fx, mine).await, 0);
        assert_eq!(course_length(&fx, theirs).await, 1);
    }

    /// Known gap: delete ids from another course are skipped, not rejected.
    #[tokio::test]
    async fn test_cross_course_delete_is_ignored() {
        let fx = setup().await;
        let owner = insert_user(&fx.pool, UserType::Educator).await;
        let mine = course_for(&fx, owner).await;
        let theirs = course_for(&fx, owner).await;
        let foreign = fx
            .service
            .reconcile(
                owner,
                ReconcileRequest {
                    course_id: theirs,
                    upserts: vec![draft(None, "keep me", 600)],
                    delete_ids: vec![],
                },
            )
            .await
            .unwrap()
            .created[0];

        let outcome = fx
            .service
            .reconcile(
                owner,
                ReconcileRequest {
                    course_id: mine,
                    upserts: vec![draft(None, "mine", 200)],
                    delete_ids: vec![foreign],
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.ignored_deletes, vec![foreign]);
        assert!(outcome.deleted.is_empty());
        assert_eq!(outcome.course_length, 1);
        let survivors = fx.service.list(theirs, &IdSelector::All).await.unwrap();
        assert_eq!(survivors.len(), 1);
        assert_eq!(course_length(&fx, theirs).await, 3);
    }

    struct StalledRepository;

    #[async_trait]
    impl ExerciseRepository for StalledRepository {
        async fn list(&self, _: i64, _: &IdSelector) -> anyhow::Result<Vec<CourseExercise>> {
            Ok(vec![])
        }

        async fn apply_batch(&self, _: &ExerciseBatch) -> anyhow::Result<BatchOutcome> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(BatchOutcome::StaleCourse)
        }
    }

    #[tokio::test]
    async fn test_reconcile_times_out() {
        let fx = setup().await;
        let owner = insert_user(&fx.pool, UserType::Educator).await;
        let course_id = course_for(&fx, owner).await;
        let service = ExerciseService::new(
            Arc::new(StalledRepository),
            Arc::new(OwnershipEnforcer::new(fx.courses.clone())),
            Duration::from_millis(20),
        );

        let result = service
            .reconcile(
                owner,
                ReconcileRequest {
                    course_id,
                    upserts: vec![],
                    delete_ids: vec![],
                },
            )
            .await;
        assert!(matches!(result, Err(CourseServiceError::Timeout)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn prop_length_is_word_count_over_reading_speed(n in 0usize..5000, sep in "[ \t\n]{1,3}") {
            let content = vec!["w"; n].join(sep.as_str());
            prop_assert_eq!(estimate_length(&content), (n / READING_SPEED_WPM) as i64);
        }
    }
}
