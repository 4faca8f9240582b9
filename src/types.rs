use diesel::deserialize::{self, FromSql};
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use diesel::{AsExpression, FromSqlRow};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Placeholder payment reference stored until the gateway returns a session id.
pub const PAYMENT_ID_PLACEHOLDER: &str = "temp";

/// Amount charged when a course carries no usable price (minor currency units).
pub const DEFAULT_COURSE_PRICE: i64 = 100;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, AsExpression, FromSqlRow, ToSchema,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Pending,
    Completed,
}

impl ToSql<Text, Sqlite> for PurchaseStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        match *self {
            PurchaseStatus::Pending => <&str as ToSql<Text, Sqlite>>::to_sql(&"pending", out),
            PurchaseStatus::Completed => <&str as ToSql<Text, Sqlite>>::to_sql(&"completed", out),
        }
    }
}

impl FromSql<Text, Sqlite> for PurchaseStatus {
    fn from_sql(
        bytes: <Sqlite as diesel::backend::Backend>::RawValue<'_>,
    ) -> deserialize::Result<Self> {
        let status_str = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        match status_str.as_str() {
            "pending" => Ok(PurchaseStatus::Pending),
            "completed" => Ok(PurchaseStatus::Completed),
            _ => Err("Invalid purchase status".into()),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, AsExpression, FromSqlRow, ToSchema,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Student,
    Instructor,
}

impl ToSql<Text, Sqlite> for UserRole {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        match *self {
            UserRole::Student => <&str as ToSql<Text, Sqlite>>::to_sql(&"student", out),
            UserRole::Instructor => <&str as ToSql<Text, Sqlite>>::to_sql(&"instructor", out),
        }
    }
}

impl FromSql<Text, Sqlite> for UserRole {
    fn from_sql(
        bytes: <Sqlite as diesel::backend::Backend>::RawValue<'_>,
    ) -> deserialize::Result<Self> {
        let role_str = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        match role_str.as_str() {
            "student" => Ok(UserRole::Student),
            "instructor" => Ok(UserRole::Instructor),
            _ => Err("Invalid user role".into()),
        }
    }
}

/// Envelope returned by every authenticated endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EmptyData {}

#[derive(Debug, Deserialize, Serialize, Clone, ToSchema)]
pub struct CheckoutRequest {
    #[serde(rename = "courseId", alias = "course_id", default)]
    pub course_id: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, ToSchema)]
pub struct CheckoutData {
    #[serde(rename = "checkoutUrl")]
    pub checkout_url: String,
    #[serde(rename = "purchaseId")]
    pub purchase_id: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, ToSchema)]
pub struct ConfirmRequest {
    #[serde(rename = "purchaseId", alias = "purchase_id", default)]
    pub purchase_id: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, ToSchema)]
pub struct CreatorSummary {
    pub id: String,
    pub name: String,
    pub photo_url: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, ToSchema)]
pub struct CourseSummary {
    pub id: String,
    pub title: String,
    pub thumbnail: Option<String>,
    pub price: Option<i64>,
    pub category: Option<String>,
    pub level: Option<String>,
    pub creator: Option<CreatorSummary>,
}

#[derive(Debug, Deserialize, Serialize, Clone, ToSchema)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub photo_url: Option<String>,
    pub enrolled_courses: Vec<CourseSummary>,
}

#[derive(Debug, Deserialize, Serialize, Clone, ToSchema)]
pub struct StudentSummary {
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, ToSchema)]
pub struct PurchasedCourse {
    pub purchase_id: String,
    pub amount: i64,
    pub status: PurchaseStatus,
    pub payment_id: String,
    pub course: CourseSummary,
}

#[derive(Debug, Deserialize, Serialize, Clone, ToSchema)]
pub struct CourseDetail {
    #[serde(flatten)]
    pub summary: CourseSummary,
    pub enrolled_students: Vec<StudentSummary>,
}

#[derive(Debug, Deserialize, Serialize, Clone, ToSchema)]
pub struct CourseDetailWithStatus {
    pub course: CourseDetail,
    pub purchased: bool,
    pub enrolled_courses: Vec<String>,
}
