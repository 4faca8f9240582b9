use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::reconciler;
use crate::store;
use crate::types::{
    ApiResponse, CheckoutData, CheckoutRequest, ConfirmRequest, CourseDetail,
    CourseDetailWithStatus, EmptyData, PurchasedCourse, UserProfile,
};
use crate::AppState;
use axum::extract::{Path, State};
use axum::Json;
use utoipa;

/// Start a hosted checkout for a course
///
/// Records a pending purchase, then asks the payment gateway for a checkout
/// session and returns its redirect URL.
#[utoipa::path(
    post,
    path = "/purchase/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Checkout session created", body = ApiResponse<CheckoutData>),
        (status = 400, description = "Missing course id", body = ApiResponse<EmptyData>),
        (status = 401, description = "Unauthorized - Invalid or missing token"),
        (status = 404, description = "Course not found", body = ApiResponse<EmptyData>),
        (status = 409, description = "Course already purchased", body = ApiResponse<EmptyData>),
        (status = 502, description = "Payment gateway failure", body = ApiResponse<EmptyData>)
    ),
    tag = "Purchase",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(payload): Json<CheckoutRequest>,
) -> AppResult<Json<ApiResponse<CheckoutData>>> {
    let mut conn = state.get_db_connection().await?;

    let checkout = reconciler::open_checkout(
        &mut conn,
        state.gateway.as_ref(),
        &state.config,
        &caller.user_id,
        payload.course_id.trim(),
    )
    .await?;

    Ok(Json(ApiResponse::ok(checkout, "Checkout session created")))
}

/// Confirm a purchase after the checkout redirect and enroll the caller
#[utoipa::path(
    post,
    path = "/purchase/confirm",
    request_body = ConfirmRequest,
    responses(
        (status = 200, description = "Purchase confirmed, profile refreshed", body = ApiResponse<UserProfile>),
        (status = 400, description = "Missing purchase id", body = ApiResponse<EmptyData>),
        (status = 401, description = "Unauthorized - Invalid or missing token"),
        (status = 403, description = "Purchase belongs to another user", body = ApiResponse<EmptyData>),
        (status = 404, description = "Purchase, user or course not found", body = ApiResponse<EmptyData>)
    ),
    tag = "Purchase",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn confirm_purchase(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(payload): Json<ConfirmRequest>,
) -> AppResult<Json<ApiResponse<UserProfile>>> {
    let mut conn = state.get_db_connection().await?;

    let profile =
        reconciler::confirm_purchase(&mut conn, &caller.user_id, payload.purchase_id.trim())
            .await?;

    Ok(Json(ApiResponse::ok(profile, "Purchase confirmed")))
}

/// List the caller's completed purchases
#[utoipa::path(
    get,
    path = "/purchase",
    responses(
        (status = 200, description = "Completed purchases", body = ApiResponse<Vec<PurchasedCourse>>),
        (status = 401, description = "Unauthorized - Invalid or missing token")
    ),
    tag = "Purchase",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_purchased_courses(
    State(state): State<AppState>,
    caller: AuthUser,
) -> AppResult<Json<ApiResponse<Vec<PurchasedCourse>>>> {
    let mut conn = state.get_db_connection().await?;
    let purchased = store::list_completed_purchases(&mut conn, &caller.user_id).await?;

    Ok(Json(ApiResponse::ok(purchased, "Purchased courses")))
}

/// Course detail with the caller's purchase status
#[utoipa::path(
    get,
    path = "/purchase/course/{course_id}/detail-with-status",
    params(
        ("course_id" = String, Path, description = "Course identifier")
    ),
    responses(
        (status = 200, description = "Course detail", body = ApiResponse<CourseDetailWithStatus>),
        (status = 401, description = "Unauthorized - Invalid or missing token"),
        (status = 404, description = "Course not found", body = ApiResponse<EmptyData>)
    ),
    tag = "Purchase",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn course_detail_with_status(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(course_id): Path<String>,
) -> AppResult<Json<ApiResponse<CourseDetailWithStatus>>> {
    let mut conn = state.get_db_connection().await?;

    let course = store::find_course(&mut conn, &course_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Course".to_string()))?;
    let summary = store::course_summary(&mut conn, &course).await?;
    let enrolled_students = store::enrolled_students(&mut conn, &course.id).await?;

    let enrolled_courses = store::enrolled_course_ids(&mut conn, &caller.user_id).await?;
    let purchased = enrolled_courses.iter().any(|id| *id == course.id);

    Ok(Json(ApiResponse::ok(
        CourseDetailWithStatus {
            course: CourseDetail {
                summary,
                enrolled_students,
            },
            purchased,
            enrolled_courses,
        },
        "Course detail",
    )))
}
