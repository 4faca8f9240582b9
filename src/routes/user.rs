use axum::extract::{Path, State};
use axum::Json;

use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::reconciler;
use crate::store;
use crate::types::{ApiResponse, EmptyData, UserProfile};
use crate::AppState;

/// The caller's profile with enrolled courses populated
#[utoipa::path(
    get,
    path = "/user/profile",
    responses(
        (status = 200, description = "Profile", body = ApiResponse<UserProfile>),
        (status = 401, description = "Unauthorized - Invalid or missing token"),
        (status = 404, description = "Profile not found", body = ApiResponse<EmptyData>)
    ),
    tag = "User",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_user_profile(
    State(state): State<AppState>,
    caller: AuthUser,
) -> AppResult<Json<ApiResponse<UserProfile>>> {
    let mut conn = state.get_db_connection().await?;

    let profile = store::load_profile(&mut conn, &caller.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile".to_string()))?;

    Ok(Json(ApiResponse::ok(profile, "Profile loaded")))
}

/// Enroll the caller in a course without a purchase
#[utoipa::path(
    post,
    path = "/course/{course_id}/enroll",
    params(
        ("course_id" = String, Path, description = "Course identifier")
    ),
    responses(
        (status = 200, description = "Enrolled, profile refreshed", body = ApiResponse<UserProfile>),
        (status = 400, description = "Already enrolled", body = ApiResponse<EmptyData>),
        (status = 401, description = "Unauthorized - Invalid or missing token"),
        (status = 404, description = "User or course not found", body = ApiResponse<EmptyData>)
    ),
    tag = "User",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn enroll_course(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(course_id): Path<String>,
) -> AppResult<Json<ApiResponse<UserProfile>>> {
    let mut conn = state.get_db_connection().await?;

    let profile = reconciler::enroll_directly(&mut conn, &caller.user_id, &course_id).await?;

    Ok(Json(ApiResponse::ok(profile, "Course enrolled successfully")))
}
