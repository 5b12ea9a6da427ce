use serde::Serialize;
use strum_macros::Display as EnumToString;

use crate::skylearn::models::{Identifier, Subscription, Transaction};

pub const DEFAULT_CURRENCY: &str = "USD";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, EnumToString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EnrollmentSource {
    SkylearnBillingPro,
    SkylearnBillingProSubscription,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    Subscription,
}

/// Courses unlocked by each subscription plan.
pub fn courses_for_plan(plan_id: &str) -> &'static [u64] {
    match plan_id {
        "basic_plan" => &[101, 102],
        "premium_plan" => &[101, 102, 103, 104],
        "enterprise_plan" => &[101, 102, 103, 104, 105, 106],
        _ => &[],
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PurchaseEnrollment {
    pub user_id: Option<Identifier>,
    pub course_id: Identifier,
    pub transaction_id: Identifier,
    pub amount_paid: Option<f64>,
    pub currency: String,
    pub enrollment_date: Option<String>,
    pub source: EnrollmentSource,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SubscriptionEnrollment {
    pub user_id: Option<Identifier>,
    pub course_id: Identifier,
    pub subscription_id: Identifier,
    pub plan_id: String,
    pub access_type: AccessType,
    pub enrollment_date: Option<String>,
    pub source: EnrollmentSource,
}

/// What gets logged and forwarded. Serializes as a flat object in either case.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EnrollmentRecord {
    Purchase(PurchaseEnrollment),
    Subscription(SubscriptionEnrollment),
}

impl EnrollmentRecord {
    /// `None` when the transaction isn't tied to a course.
    pub fn from_transaction(tx: &Transaction) -> Option<EnrollmentRecord> {
        let course_id = tx.course()?.clone();
        Some(EnrollmentRecord::Purchase(PurchaseEnrollment {
            user_id: tx.user_id.clone(),
            course_id,
            transaction_id: tx.id.clone(),
            amount_paid: tx.amount,
            currency: tx
                .currency
                .clone()
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            enrollment_date: tx.created_at.clone(),
            source: EnrollmentSource::SkylearnBillingPro,
        }))
    }

    /// One record per course the plan unlocks; none for an unknown or missing plan.
    pub fn from_subscription(sub: &Subscription) -> Vec<EnrollmentRecord> {
        let plan_id = match sub.plan() {
            Some(plan_id) => plan_id,
            None => return vec![],
        };
        courses_for_plan(plan_id)
            .iter()
            .map(|course_id| {
                EnrollmentRecord::Subscription(SubscriptionEnrollment {
                    user_id: sub.user_id.clone(),
                    course_id: Identifier::Number(*course_id),
                    subscription_id: sub.id.clone(),
                    plan_id: plan_id.to_string(),
                    access_type: AccessType::Subscription,
                    enrollment_date: sub.created_at.clone(),
                    source: EnrollmentSource::SkylearnBillingProSubscription,
                })
            })
            .collect()
    }

    pub fn user_id(&self) -> Option<&Identifier> {
        match self {
            EnrollmentRecord::Purchase(p) => p.user_id.as_ref(),
            EnrollmentRecord::Subscription(s) => s.user_id.as_ref(),
        }
    }

    pub fn course_id(&self) -> &Identifier {
        match self {
            EnrollmentRecord::Purchase(p) => &p.course_id,
            EnrollmentRecord::Subscription(s) => &s.course_id,
        }
    }

    pub fn source(&self) -> EnrollmentSource {
        match self {
            EnrollmentRecord::Purchase(p) => p.source,
            EnrollmentRecord::Subscription(s) => s.source,
        }
    }
}
