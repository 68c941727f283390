//! Data models
//!
//! Database entities, inputs for repository writes, and list filters.

mod course;
mod enrollment;
mod filter;
mod user;

pub use course::{
    CategoryLevelStat, CategoryStat, Course, CourseCategory, CourseExercise, CourseFilter,
    CourseLevel, CourseSortField, CourseStatus, CreateCourseInput, UpdateCourseGeneral,
};
pub use enrollment::{
    CertificateFilter, CourseCertificate, Enrollment, EnrollmentFilter, EnrollmentStatus,
};
pub use filter::{parse_id_list, IdSelector, InvalidIdList, SortDirection};
pub use user::{CreateUserInput, TeachingApplication, UpdateProfile, User, UserType};
