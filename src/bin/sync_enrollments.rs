use lib::{
    error, info,
    jobs::sync_enrollments::sync_enrollments,
    settings::get_settings,
    telemetry::{init_sentry, init_tracing, LogKey, StatsD},
};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    // Tracing and Sentry aren't set up until the settings are usable.
    let settings = match get_settings().and_then(|settings| {
        settings.validate()?;
        Ok(settings)
    }) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let _guard = init_sentry(&settings);
    init_tracing("slbp-sync-enrollments", &settings.log_level, std::io::stdout);

    let statsd = StatsD::new(&settings);
    match sync_enrollments(&settings, &statsd).await {
        Ok(summary) => {
            info!(
                LogKey::SyncEnrollments,
                api_version = summary.api_version.as_str(),
                "Enrollment sync completed successfully."
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(LogKey::SyncEnrollmentsFailed, error = %e, "Sync failed.");
            ExitCode::FAILURE
        }
    }
}
