use std::time::Instant;
use thiserror::Error;

use crate::{
    enrollments::{external::ExternalSystemClient, log::EnrollmentLog, syncer::EnrollmentSyncer},
    error_and_incr, info,
    settings::{Settings, SettingsError},
    skylearn::client::{ClientError, SkyLearnClient},
    telemetry::{LogKey, StatsD},
};

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Api(#[from] ClientError),
}

#[derive(Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub api_version: String,
    // None when the phase failed
    pub transaction_enrollments: Option<usize>,
    pub subscription_enrollments: Option<usize>,
}

/// One full pass: status probe, paid transactions, active subscriptions.
///
/// Settings are validated before anything touches the network. A failed
/// status probe ends the run; a failed phase is logged and the run moves on.
pub async fn sync_enrollments(settings: &Settings, statsd: &StatsD) -> Result<RunSummary, RunError> {
    settings.validate()?;
    let started = Instant::now();

    let api = SkyLearnClient::new(&settings.skylearn_base_url, &settings.skylearn_api_key)?;
    info!(
        LogKey::ApiStatusCheck,
        url = api.api_url(),
        "Testing API connection."
    );
    let status = match api.get_status().await {
        Ok(status) => status,
        Err(e) => {
            error_and_incr!(
                statsd,
                LogKey::ApiStatusCheckFailed,
                error = %e,
                "Could not reach SkyLearn Billing Pro API."
            );
            return Err(e.into());
        }
    };
    info!(
        LogKey::ApiStatusCheck,
        version = status.version.as_str(),
        "Connected to SkyLearn Billing Pro API v{}",
        status.version
    );

    let external = match settings.external_system_url() {
        Some(url) => Some(ExternalSystemClient::new(url)?),
        None => None,
    };
    let log = EnrollmentLog::new(&settings.enrollment_log_file);
    let mut syncer = EnrollmentSyncer::new(&api, statsd, log, external);

    let transaction_enrollments = match syncer.sync_recent_enrollments(settings.hours_back).await {
        Ok(processed) => Some(processed),
        Err(e) => {
            error_and_incr!(
                statsd,
                LogKey::SyncTransactionsFailed,
                error = %e,
                "Error syncing enrollments."
            );
            None
        }
    };
    let subscription_enrollments = match syncer.sync_subscription_enrollments().await {
        Ok(written) => Some(written),
        Err(e) => {
            error_and_incr!(
                statsd,
                LogKey::SyncSubscriptionsFailed,
                error = %e,
                "Error syncing subscription enrollments."
            );
            None
        }
    };

    statsd.time(&LogKey::SyncEnrollments, started.elapsed());
    info!(
        LogKey::SyncEnrollments,
        transactions_failed = transaction_enrollments.is_none(),
        subscriptions_failed = subscription_enrollments.is_none(),
        "Enrollment sync completed."
    );
    Ok(RunSummary {
        api_version: status.version,
        transaction_enrollments,
        subscription_enrollments,
    })
}
