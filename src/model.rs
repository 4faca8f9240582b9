use crate::types::{
    CourseSummary, CreatorSummary, PurchaseStatus, StudentSummary, UserRole,
    PAYMENT_ID_PLACEHOLDER,
};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

#[derive(Queryable, Selectable, Insertable, Identifiable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::purchases)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Purchase {
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub amount: i64,
    pub status: PurchaseStatus,
    pub payment_id: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Purchase {
    /// A fresh checkout attempt, not yet tied to a gateway session.
    pub fn pending(user_id: String, course_id: String, amount: i64) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            course_id,
            amount,
            status: PurchaseStatus::Pending,
            payment_id: PAYMENT_ID_PLACEHOLDER.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == PurchaseStatus::Completed
    }
}

#[derive(Queryable, Selectable, Insertable, Identifiable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub photo_url: Option<String>,
    pub created_at: NaiveDateTime,
}

impl User {
    pub fn new(name: String, email: String, role: UserRole) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            email,
            role,
            photo_url: None,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    pub fn creator_summary(&self) -> CreatorSummary {
        CreatorSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            photo_url: self.photo_url.clone(),
        }
    }

    pub fn student_summary(&self) -> StudentSummary {
        StudentSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

#[derive(Queryable, Selectable, Insertable, Identifiable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::courses)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Course {
    pub id: String,
    pub creator_id: String,
    pub title: String,
    pub thumbnail: Option<String>,
    pub price: Option<i64>,
    pub category: Option<String>,
    pub level: Option<String>,
    pub created_at: NaiveDateTime,
}

impl Course {
    pub fn new(creator_id: String, title: String, price: Option<i64>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            creator_id,
            title,
            thumbnail: None,
            price,
            category: None,
            level: None,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    /// Price to charge, falling back to the default when unset or not positive.
    pub fn checkout_amount(&self) -> i64 {
        match self.price {
            Some(price) if price > 0 => price,
            _ => crate::types::DEFAULT_COURSE_PRICE,
        }
    }

    pub fn summary(&self, creator: Option<&User>) -> CourseSummary {
        CourseSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            thumbnail: self.thumbnail.clone(),
            price: self.price,
            category: self.category.clone(),
            level: self.level.clone(),
            creator: creator.map(User::creator_summary),
        }
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::user_enrolled_courses)]
pub struct UserEnrolledCourse {
    pub user_id: String,
    pub course_id: String,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::course_enrolled_students)]
pub struct CourseEnrolledStudent {
    pub course_id: String,
    pub user_id: String,
}
