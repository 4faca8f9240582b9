use std::future::Future;
use std::pin::Pin;

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel::{ConnectionError, ConnectionResult};
use diesel_async::pooled_connection::{AsyncDieselConnectionManager, ManagerConfig};
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::{AsyncConnection, RunQueryDsl, SimpleAsyncConnection};

use crate::error::AppResult;
use crate::model::{Course, CourseEnrolledStudent, Purchase, User, UserEnrolledCourse};
use crate::schema::{course_enrolled_students, courses, purchases, user_enrolled_courses, users};
use crate::types::{CourseSummary, PurchaseStatus, PurchasedCourse, StudentSummary, UserProfile};

pub type DbConnection = SyncConnectionWrapper<SqliteConnection>;
pub type DbPool = diesel_async::pooled_connection::bb8::Pool<DbConnection>;
pub type PooledDbConnection<'a> = diesel_async::pooled_connection::bb8::PooledConnection<'a, DbConnection>;

/// Applied to every pooled connection. Writers from different connections
/// wait on the lock instead of failing with `SQLITE_BUSY`.
const CONNECTION_PRAGMAS: &str = "PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL;";

fn establish_connection(
    database_url: &str,
) -> Pin<Box<dyn Future<Output = ConnectionResult<DbConnection>> + Send + '_>> {
    Box::pin(async move {
        let mut conn = DbConnection::establish(database_url).await?;
        conn.batch_execute(CONNECTION_PRAGMAS)
            .await
            .map_err(ConnectionError::CouldntSetupConfiguration)?;
        Ok(conn)
    })
}

pub async fn create_pool(database_url: &str) -> AppResult<DbPool> {
    let mut config = ManagerConfig::default();
    config.custom_setup = Box::new(establish_connection);
    let manager =
        AsyncDieselConnectionManager::<DbConnection>::new_with_config(database_url, config);
    let pool = bb8::Pool::builder()
        .max_size(8)
        .build(manager)
        .await
        .map_err(|e| crate::error::AppError::DatabaseConnection(e.to_string()))?;
    Ok(pool)
}

pub async fn find_user(conn: &mut DbConnection, user_id: &str) -> AppResult<Option<User>> {
    let user = users::table
        .find(user_id)
        .select(User::as_select())
        .first(conn)
        .await
        .optional()?;
    Ok(user)
}

pub async fn find_course(conn: &mut DbConnection, course_id: &str) -> AppResult<Option<Course>> {
    let course = courses::table
        .find(course_id)
        .select(Course::as_select())
        .first(conn)
        .await
        .optional()?;
    Ok(course)
}

pub async fn find_purchase(
    conn: &mut DbConnection,
    purchase_id: &str,
) -> AppResult<Option<Purchase>> {
    let purchase = purchases::table
        .find(purchase_id)
        .select(Purchase::as_select())
        .first(conn)
        .await
        .optional()?;
    Ok(purchase)
}

pub async fn find_purchase_by_payment_id(
    conn: &mut DbConnection,
    payment_id: &str,
) -> AppResult<Option<Purchase>> {
    let purchase = purchases::table
        .filter(purchases::payment_id.eq(payment_id))
        .select(Purchase::as_select())
        .first(conn)
        .await
        .optional()?;
    Ok(purchase)
}

pub async fn find_completed_purchase(
    conn: &mut DbConnection,
    user_id: &str,
    course_id: &str,
) -> AppResult<Option<Purchase>> {
    let purchase = purchases::table
        .filter(purchases::user_id.eq(user_id))
        .filter(purchases::course_id.eq(course_id))
        .filter(purchases::status.eq(PurchaseStatus::Completed))
        .select(Purchase::as_select())
        .first(conn)
        .await
        .optional()?;
    Ok(purchase)
}

pub async fn insert_purchase(conn: &mut DbConnection, purchase: &Purchase) -> AppResult<()> {
    diesel::insert_into(purchases::table)
        .values(purchase.clone())
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn set_payment_reference(
    conn: &mut DbConnection,
    purchase_id: &str,
    session_id: &str,
) -> AppResult<()> {
    diesel::update(purchases::table.find(purchase_id))
        .set((
            purchases::payment_id.eq(session_id),
            purchases::updated_at.eq(chrono::Utc::now().naive_utc()),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

/// Moves a pending purchase to completed.
///
/// The update only matches rows still in `pending`, so of any number of
/// concurrent callers exactly one gets `true`.
pub async fn complete_purchase(
    conn: &mut DbConnection,
    purchase_id: &str,
    amount: Option<i64>,
) -> AppResult<bool> {
    let updated = diesel::update(
        purchases::table
            .filter(purchases::id.eq(purchase_id))
            .filter(purchases::status.eq(PurchaseStatus::Pending)),
    )
    .set((
        purchases::status.eq(PurchaseStatus::Completed),
        amount.map(|total| purchases::amount.eq(total)),
        purchases::updated_at.eq(chrono::Utc::now().naive_utc()),
    ))
    .execute(conn)
    .await?;

    Ok(updated == 1)
}

/// Set-add on the user side; re-adding an existing member is a no-op.
pub async fn add_enrolled_course(
    conn: &mut DbConnection,
    user_id: &str,
    course_id: &str,
) -> AppResult<()> {
    diesel::insert_or_ignore_into(user_enrolled_courses::table)
        .values(UserEnrolledCourse {
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
        })
        .execute(conn)
        .await?;
    Ok(())
}

/// Set-add on the course side; re-adding an existing member is a no-op.
pub async fn add_enrolled_student(
    conn: &mut DbConnection,
    course_id: &str,
    user_id: &str,
) -> AppResult<()> {
    diesel::insert_or_ignore_into(course_enrolled_students::table)
        .values(CourseEnrolledStudent {
            course_id: course_id.to_string(),
            user_id: user_id.to_string(),
        })
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn enrolled_course_ids(conn: &mut DbConnection, user_id: &str) -> AppResult<Vec<String>> {
    let ids = user_enrolled_courses::table
        .filter(user_enrolled_courses::user_id.eq(user_id))
        .select(user_enrolled_courses::course_id)
        .load::<String>(conn)
        .await?;
    Ok(ids)
}

pub async fn enrolled_student_ids(
    conn: &mut DbConnection,
    course_id: &str,
) -> AppResult<Vec<String>> {
    let ids = course_enrolled_students::table
        .filter(course_enrolled_students::course_id.eq(course_id))
        .select(course_enrolled_students::user_id)
        .load::<String>(conn)
        .await?;
    Ok(ids)
}

pub async fn enrolled_students(
    conn: &mut DbConnection,
    course_id: &str,
) -> AppResult<Vec<StudentSummary>> {
    let students = course_enrolled_students::table
        .inner_join(users::table)
        .filter(course_enrolled_students::course_id.eq(course_id))
        .select(User::as_select())
        .load::<User>(conn)
        .await?;
    Ok(students.iter().map(User::student_summary).collect())
}

pub async fn enrolled_course_summaries(
    conn: &mut DbConnection,
    user_id: &str,
) -> AppResult<Vec<CourseSummary>> {
    let rows = user_enrolled_courses::table
        .inner_join(courses::table.inner_join(users::table))
        .filter(user_enrolled_courses::user_id.eq(user_id))
        .select((Course::as_select(), User::as_select()))
        .load::<(Course, User)>(conn)
        .await?;
    Ok(rows
        .iter()
        .map(|(course, creator)| course.summary(Some(creator)))
        .collect())
}

/// Summary of `course`; `creator` is left empty if the creator row is gone.
pub async fn course_summary(conn: &mut DbConnection, course: &Course) -> AppResult<CourseSummary> {
    let creator = find_user(conn, &course.creator_id).await?;
    Ok(course.summary(creator.as_ref()))
}

/// The user with enrolled courses populated, or `None` if the user is gone.
pub async fn load_profile(conn: &mut DbConnection, user_id: &str) -> AppResult<Option<UserProfile>> {
    let Some(user) = find_user(conn, user_id).await? else {
        return Ok(None);
    };
    let enrolled_courses = enrolled_course_summaries(conn, user_id).await?;

    Ok(Some(UserProfile {
        id: user.id,
        name: user.name,
        email: user.email,
        role: user.role,
        photo_url: user.photo_url,
        enrolled_courses,
    }))
}

pub async fn list_completed_purchases(
    conn: &mut DbConnection,
    user_id: &str,
) -> AppResult<Vec<PurchasedCourse>> {
    let rows = purchases::table
        .inner_join(courses::table.inner_join(users::table))
        .filter(purchases::user_id.eq(user_id))
        .filter(purchases::status.eq(PurchaseStatus::Completed))
        .order(purchases::created_at.desc())
        .select((Purchase::as_select(), Course::as_select(), User::as_select()))
        .load::<(Purchase, Course, User)>(conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(purchase, course, creator)| PurchasedCourse {
            purchase_id: purchase.id,
            amount: purchase.amount,
            status: purchase.status,
            payment_id: purchase.payment_id,
            course: course.summary(Some(&creator)),
        })
        .collect())
}

pub async fn insert_user(conn: &mut DbConnection, user: &User) -> AppResult<()> {
    diesel::insert_into(users::table)
        .values(user.clone())
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn insert_course(conn: &mut DbConnection, course: &Course) -> AppResult<()> {
    diesel::insert_into(courses::table)
        .values(course.clone())
        .execute(conn)
        .await?;
    Ok(())
}
