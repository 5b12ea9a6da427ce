use std::collections::HashSet;
use thiserror::Error;
use time::{format_description::FormatItem, macros::format_description, Duration, OffsetDateTime};

use super::{
    external::ExternalSystemClient,
    log::{EnrollmentLog, EnrollmentLogError},
    record::EnrollmentRecord,
};
use crate::{
    error_and_incr, info, info_and_incr,
    skylearn::{
        client::{ClientError, SkyLearnClient},
        models::{Identifier, Subscription, Transaction},
    },
    telemetry::{LogKey, StatsD},
};

const QUERY_TIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

pub const TRANSACTIONS_PER_PAGE: u32 = 100;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ClientError),
    #[error(transparent)]
    Log(#[from] EnrollmentLogError),
    #[error("Could not format transaction window. {0}")]
    Window(#[from] time::error::Format),
    #[error("A window of {0} hours reaches outside the supported date range.")]
    WindowOutOfRange(u32),
}

/// Filters for paid transactions created in `[end - hours_back, end]`.
pub fn recent_transaction_filters(
    end: OffsetDateTime,
    hours_back: u32,
) -> Result<Vec<(&'static str, String)>, SyncError> {
    let start = end
        .checked_sub(Duration::hours(i64::from(hours_back)))
        .ok_or(SyncError::WindowOutOfRange(hours_back))?;
    Ok(vec![
        ("status", "paid".to_string()),
        ("after", start.format(QUERY_TIME_FORMAT)?),
        ("before", end.format(QUERY_TIME_FORMAT)?),
        ("per_page", TRANSACTIONS_PER_PAGE.to_string()),
    ])
}

fn display_user(user_id: Option<&Identifier>) -> String {
    user_id.map(Identifier::to_string).unwrap_or_default()
}

pub struct EnrollmentSyncer<'a> {
    api: &'a SkyLearnClient,
    statsd: &'a StatsD,
    log: EnrollmentLog,
    external: Option<ExternalSystemClient>,
    // Only lives as long as this run
    processed_transactions: HashSet<Identifier>,
}

impl<'a> EnrollmentSyncer<'a> {
    pub fn new(
        api: &'a SkyLearnClient,
        statsd: &'a StatsD,
        log: EnrollmentLog,
        external: Option<ExternalSystemClient>,
    ) -> Self {
        EnrollmentSyncer {
            api,
            statsd,
            log,
            external,
            processed_transactions: HashSet::new(),
        }
    }

    pub fn has_processed(&self, transaction_id: &Identifier) -> bool {
        self.processed_transactions.contains(transaction_id)
    }

    /// Returns how many enrollments were written. Any error abandons the rest of the batch.
    pub async fn sync_recent_enrollments(&mut self, hours_back: u32) -> Result<usize, SyncError> {
        info!(
            LogKey::SyncTransactions,
            hours_back, "Syncing enrollments from the last {} hours.", hours_back
        );
        let filters = recent_transaction_filters(OffsetDateTime::now_utc(), hours_back)?;
        let transactions = self.api.get_transactions(&filters).await?;
        self.statsd
            .gauge(&LogKey::SyncTransactionsFound, transactions.len());
        info!(
            LogKey::SyncTransactionsFound,
            count = transactions.len(),
            "Found {} paid transactions.",
            transactions.len()
        );

        let mut processed = 0;
        for transaction in &transactions {
            if self.process_transaction(transaction).await? {
                processed += 1;
            }
        }
        self.statsd
            .gauge(&LogKey::SyncTransactionsProcessed, processed);
        info!(
            LogKey::SyncTransactionsProcessed,
            count = processed,
            "Processed {} enrollments.",
            processed
        );
        Ok(processed)
    }

    /// `Ok(false)` when the transaction was skipped.
    pub async fn process_transaction(
        &mut self,
        transaction: &Transaction,
    ) -> Result<bool, EnrollmentLogError> {
        if self.has_processed(&transaction.id) {
            info_and_incr!(
                self.statsd,
                LogKey::TransactionAlreadyProcessed,
                transaction_id = %transaction.id,
                "Transaction already processed in this run. Skipping."
            );
            return Ok(false);
        }
        let record = match EnrollmentRecord::from_transaction(transaction) {
            Some(record) => record,
            None => {
                info_and_incr!(
                    self.statsd,
                    LogKey::TransactionNoCourse,
                    transaction_id = %transaction.id,
                    "Transaction has no course association."
                );
                return Ok(false);
            }
        };
        info_and_incr!(
            self.statsd,
            LogKey::TransactionEnrollment,
            transaction_id = %transaction.id,
            user_id = %display_user(record.user_id()),
            course_id = %record.course_id(),
            source = %record.source(),
            "Processing enrollment."
        );
        self.record_enrollment(&record).await?;
        self.processed_transactions.insert(transaction.id.clone());
        Ok(true)
    }

    /// Returns how many enrollment records were written.
    pub async fn sync_subscription_enrollments(&self) -> Result<usize, SyncError> {
        info!(
            LogKey::SyncSubscriptions,
            "Syncing subscription-based enrollments."
        );
        let subscriptions = self
            .api
            .get_subscriptions(&[("status", "active".to_string())])
            .await?;
        self.statsd
            .gauge(&LogKey::SyncSubscriptionsFound, subscriptions.len());
        info!(
            LogKey::SyncSubscriptionsFound,
            count = subscriptions.len(),
            "Found {} active subscriptions.",
            subscriptions.len()
        );

        let mut written = 0;
        for subscription in &subscriptions {
            written += self.process_subscription(subscription).await?;
        }
        self.statsd
            .gauge(&LogKey::SyncSubscriptionsProcessed, written);
        Ok(written)
    }

    pub async fn process_subscription(
        &self,
        subscription: &Subscription,
    ) -> Result<usize, EnrollmentLogError> {
        let records = EnrollmentRecord::from_subscription(subscription);
        if records.is_empty() {
            info_and_incr!(
                self.statsd,
                LogKey::SubscriptionUnknownPlan,
                subscription_id = %subscription.id,
                plan_id = ?subscription.plan_id,
                "Subscription plan unlocks no courses."
            );
            return Ok(0);
        }
        info!(
            LogKey::SubscriptionEnrollment,
            subscription_id = %subscription.id,
            user_id = %display_user(subscription.user_id.as_ref()),
            courses = records.len(),
            "Processing subscription."
        );
        for record in &records {
            self.record_enrollment(record).await?;
        }
        Ok(records.len())
    }

    /// Forward first if configured, then always write the local log.
    async fn record_enrollment(&self, record: &EnrollmentRecord) -> Result<(), EnrollmentLogError> {
        self.sync_to_external_system(record).await;
        self.log_enrollment(record)
    }

    pub fn log_enrollment(&self, record: &EnrollmentRecord) -> Result<(), EnrollmentLogError> {
        self.log.append(record).map_err(|e| {
            error_and_incr!(
                self.statsd,
                LogKey::EnrollmentLogWriteFailed,
                error = %e,
                path = %self.log.path().display(),
                "Could not write enrollment to local log."
            );
            e
        })
    }

    /// Failures are logged and swallowed. Returns whether the record was accepted.
    pub async fn sync_to_external_system(&self, record: &EnrollmentRecord) -> bool {
        let external = match &self.external {
            Some(external) => external,
            None => return false,
        };
        match external.forward(record).await {
            Ok(_) => {
                info_and_incr!(
                    self.statsd,
                    LogKey::ExternalSync,
                    user_id = %display_user(record.user_id()),
                    course_id = %record.course_id(),
                    source = %record.source(),
                    "Synced to external system."
                );
                true
            }
            Err(e) => {
                error_and_incr!(
                    self.statsd,
                    LogKey::ExternalSyncFailed,
                    error = %e,
                    user_id = %display_user(record.user_id()),
                    course_id = %record.course_id(),
                    "Failed to sync to external system."
                );
                false
            }
        }
    }
}
