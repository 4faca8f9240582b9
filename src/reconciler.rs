//! Purchase-and-enrollment reconciliation.
//!
//! A purchase reaches `completed` through either the gateway's signed
//! notification or the buyer's explicit confirmation. Both paths may run
//! concurrently, out of order, or more than once. Nothing here takes a lock:
//! the status update is guarded on `pending` and both enrollment writes are
//! set-adds, so replaying any step converges on the same state.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::gateway::{CheckoutSessionRequest, GatewayEvent, GatewayEventKind, PaymentGateway};
use crate::model::{Course, Purchase, User};
use crate::store::{self, DbConnection};
use crate::types::{CheckoutData, UserProfile, UserRole};

const PLACEHOLDER_THUMBNAIL: &str = "https://via.placeholder.com/300";

/// Which enrollment grants a path is allowed to make.
///
/// The notification path refuses to enroll an instructor in their own
/// course; the confirmation and direct enrollment paths do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentPolicy {
    RejectCreatorSelfEnrollment,
    AllowAll,
}

impl EnrollmentPolicy {
    pub fn permits(&self, user: &User, course: &Course) -> bool {
        match self {
            EnrollmentPolicy::AllowAll => true,
            EnrollmentPolicy::RejectCreatorSelfEnrollment => {
                !(user.role == UserRole::Instructor && course.creator_id == user.id)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentOutcome {
    Granted,
    SkippedSelfEnrollment,
}

/// Adds the course to the user's set and the user to the course's set.
///
/// The two writes are independent; if the second is lost the next grant
/// for the same pair repairs it.
pub async fn grant_enrollment(
    conn: &mut DbConnection,
    user: &User,
    course: &Course,
    policy: EnrollmentPolicy,
) -> AppResult<EnrollmentOutcome> {
    if !policy.permits(user, course) {
        info!(user_id = %user.id, course_id = %course.id, "skipping creator self-enrollment");
        return Ok(EnrollmentOutcome::SkippedSelfEnrollment);
    }

    store::add_enrolled_course(conn, &user.id, &course.id).await?;
    store::add_enrolled_student(conn, &course.id, &user.id).await?;

    info!(user_id = %user.id, course_id = %course.id, "enrollment granted");
    Ok(EnrollmentOutcome::Granted)
}

/// Opens a hosted checkout for `course_id` on behalf of `user_id`.
///
/// The pending purchase is written before the gateway is called and is kept
/// if the call fails.
pub async fn open_checkout(
    conn: &mut DbConnection,
    gateway: &dyn PaymentGateway,
    config: &Config,
    user_id: &str,
    course_id: &str,
) -> AppResult<CheckoutData> {
    if course_id.is_empty() {
        return Err(AppError::BadRequest("Course ID is required".to_string()));
    }

    let course = store::find_course(conn, course_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Course".to_string()))?;

    if store::find_completed_purchase(conn, user_id, course_id)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict("Course already purchased".to_string()));
    }

    let purchase = Purchase::pending(
        user_id.to_string(),
        course.id.clone(),
        course.checkout_amount(),
    );
    store::insert_purchase(conn, &purchase).await?;

    let mut metadata = BTreeMap::new();
    metadata.insert("purchaseId".to_string(), purchase.id.clone());
    metadata.insert("userId".to_string(), user_id.to_string());
    metadata.insert("courseId".to_string(), course.id.clone());

    let request = CheckoutSessionRequest {
        product_name: course.title.clone(),
        images: vec![course
            .thumbnail
            .clone()
            .unwrap_or_else(|| PLACEHOLDER_THUMBNAIL.to_string())],
        unit_amount: purchase.amount,
        success_url: format!(
            "{}/course-purchase/success?purchaseId={}",
            config.client_url, purchase.id
        ),
        cancel_url: format!("{}/course-detail/{}", config.client_url, course.id),
        metadata,
    };

    let session = match gateway.create_session(request).await {
        Ok(session) => session,
        Err(e) => {
            warn!(purchase_id = %purchase.id, error = %e, "checkout session creation failed");
            return Err(e.into());
        }
    };

    store::set_payment_reference(conn, &purchase.id, &session.id).await?;
    info!(
        purchase_id = %purchase.id,
        session_id = %session.id,
        amount = purchase.amount,
        "checkout session created"
    );

    Ok(CheckoutData {
        checkout_url: session.url,
        purchase_id: purchase.id,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    Ignored,
    PurchaseNotFound,
    AlreadyCompleted,
    MissingUserOrCourse,
    SelfEnrollmentSkipped,
    Enrolled,
}

/// Applies a verified gateway notification.
///
/// Only store failures are returned as errors; every other outcome should be
/// acknowledged so the gateway stops redelivering.
pub async fn apply_notification(
    conn: &mut DbConnection,
    event: &GatewayEvent,
) -> AppResult<NotificationOutcome> {
    if let GatewayEventKind::Other(kind) = &event.kind {
        info!(kind = %kind, "ignoring gateway event");
        return Ok(NotificationOutcome::Ignored);
    }

    let Some(session_id) = event.session_id.as_deref() else {
        warn!("checkout completion without session id");
        return Ok(NotificationOutcome::Ignored);
    };

    let Some(purchase) = store::find_purchase_by_payment_id(conn, session_id).await? else {
        warn!(session_id, "no purchase for checkout session");
        return Ok(NotificationOutcome::PurchaseNotFound);
    };

    if purchase.is_completed() {
        info!(purchase_id = %purchase.id, session_id, "purchase already completed");
        return Ok(NotificationOutcome::AlreadyCompleted);
    }

    if !store::complete_purchase(conn, &purchase.id, event.amount_total).await? {
        info!(purchase_id = %purchase.id, session_id, "purchase completed concurrently");
        return Ok(NotificationOutcome::AlreadyCompleted);
    }
    info!(
        purchase_id = %purchase.id,
        session_id,
        amount = event.amount_total.unwrap_or(purchase.amount),
        "purchase completed by notification"
    );

    let user = store::find_user(conn, &purchase.user_id).await?;
    let course = store::find_course(conn, &purchase.course_id).await?;
    let (Some(user), Some(course)) = (user, course) else {
        warn!(purchase_id = %purchase.id, session_id, "user or course missing for purchase");
        return Ok(NotificationOutcome::MissingUserOrCourse);
    };

    match grant_enrollment(conn, &user, &course, EnrollmentPolicy::RejectCreatorSelfEnrollment)
        .await?
    {
        EnrollmentOutcome::Granted => Ok(NotificationOutcome::Enrolled),
        EnrollmentOutcome::SkippedSelfEnrollment => Ok(NotificationOutcome::SelfEnrollmentSkipped),
    }
}

/// Completes the caller's purchase from the redirect-back and enrolls them.
pub async fn confirm_purchase(
    conn: &mut DbConnection,
    caller_id: &str,
    purchase_id: &str,
) -> AppResult<UserProfile> {
    if purchase_id.is_empty() {
        return Err(AppError::BadRequest("Purchase ID required".to_string()));
    }

    let purchase = store::find_purchase(conn, purchase_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Purchase".to_string()))?;

    if purchase.user_id != caller_id {
        warn!(purchase_id, caller_id, "confirmation for purchase owned by another user");
        return Err(AppError::Forbidden(
            "Unauthorized purchase access".to_string(),
        ));
    }

    if !purchase.is_completed() && store::complete_purchase(conn, &purchase.id, None).await? {
        info!(purchase_id, payment_id = %purchase.payment_id, "purchase completed by confirmation");
    }

    let user = store::find_user(conn, caller_id).await?;
    let course = store::find_course(conn, &purchase.course_id).await?;
    let (Some(user), Some(course)) = (user, course) else {
        return Err(AppError::NotFound("User or Course".to_string()));
    };

    grant_enrollment(conn, &user, &course, EnrollmentPolicy::AllowAll).await?;

    store::load_profile(conn, caller_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))
}

/// Direct enrollment without a purchase.
pub async fn enroll_directly(
    conn: &mut DbConnection,
    user_id: &str,
    course_id: &str,
) -> AppResult<UserProfile> {
    let user = store::find_user(conn, user_id).await?;
    let course = store::find_course(conn, course_id).await?;
    let (Some(user), Some(course)) = (user, course) else {
        return Err(AppError::NotFound("User or Course".to_string()));
    };

    let enrolled = store::enrolled_course_ids(conn, &user.id).await?;
    if enrolled.iter().any(|id| *id == course.id) {
        return Err(AppError::BadRequest("Already enrolled".to_string()));
    }

    grant_enrollment(conn, &user, &course, EnrollmentPolicy::AllowAll).await?;

    store::load_profile(conn, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))
}
