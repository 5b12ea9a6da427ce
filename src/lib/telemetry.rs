use cadence::{
    CountedExt, Gauged, MetricError, NopMetricSink, StatsdClient, Timed, UdpMetricSink,
};
use sentry::ClientInitGuard;
use sentry_tracing::EventFilter;
use std::borrow::Cow;
use std::net::UdpSocket;
use std::time::Duration;
use strum_macros::Display as EnumToString;
use tracing::subscriber::set_global_default;
use tracing_actix_web_mozlog::{JsonStorageLayer, MozLogFormatLayer};
use tracing_log::LogTracer;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

use crate::settings::Settings;

const METRIC_PREFIX: &str = "slbp_sync";

#[derive(Debug, EnumToString, PartialEq, Eq)]
#[strum(serialize_all = "kebab_case")]
pub enum LogKey {
    // Billing API
    ApiRequestFailed,
    ApiStatusCheck,
    ApiStatusCheckFailed,
    // Enrollment log
    EnrollmentLogWriteFailed,
    // External system
    ExternalSync,
    ExternalSyncFailed,
    // Statsd
    StatsDError,
    // Subscriptions
    SubscriptionEnrollment,
    SubscriptionUnknownPlan,
    SyncSubscriptions,
    SyncSubscriptionsFailed,
    SyncSubscriptionsFound,
    SyncSubscriptionsProcessed,
    // Whole run
    SyncEnrollments,
    SyncEnrollmentsFailed,
    // Transactions
    SyncTransactions,
    SyncTransactionsFailed,
    SyncTransactionsFound,
    SyncTransactionsProcessed,
    TransactionAlreadyProcessed,
    TransactionEnrollment,
    TransactionNoCourse,
    // For test cases
    Test,
}

/// Creates a tracing subscriber and sets it as the global default.
pub fn init_tracing<Sink>(service_name: &str, log_level: &str, sink: Sink)
where
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    // Filter out any events that are below `log_level`.
    let env_filter = EnvFilter::new(log_level);

    // Only ERROR events go to Sentry. The EnvFilter above decides what is
    // written to the log output itself.
    let sentry_layer = sentry_tracing::layer().event_filter(|md| match md.level() {
        &tracing::Level::ERROR => EventFilter::Event,
        _ => EventFilter::Ignore,
    });

    let subscriber = Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(MozLogFormatLayer::new(service_name, sink))
        .with(sentry_layer);

    LogTracer::init().expect("Failed to set logger");
    set_global_default(subscriber).expect("Failed to set subscriber");
}

/// An empty DSN leaves Sentry disabled.
pub fn init_sentry(settings: &Settings) -> ClientInitGuard {
    sentry::init((
        settings.sentry_dsn.clone(),
        sentry::ClientOptions {
            environment: Some(Cow::from(settings.environment.clone())),
            // Suppress breadcrumbs.
            max_breadcrumbs: 0,
            release: Some(Cow::from(env!("CARGO_PKG_VERSION"))),
            // Error events (panics and error log messages). Should always be 1.0.
            sample_rate: 1.0,
            // No performance tracing.
            traces_sample_rate: 0.0,
            ..Default::default()
        },
    ))
}

#[macro_export]
macro_rules! info {
    ($key:expr, $($arg:tt)+) => {
        ::tracing::info!(r#type = $key.to_string().as_str(), $($arg)+)
    };
}

#[macro_export]
macro_rules! error {
    ($key:expr, $($arg:tt)+) => {
        ::tracing::error!(r#type = $key.to_string().as_str(), $($arg)+)
    };
}

#[macro_export]
macro_rules! info_and_incr {
    ($statsd:expr, $key:expr, $($arg:tt)+) => {{
        $statsd.incr(&$key);
        $crate::info!($key, $($arg)+);
    }};
}

#[macro_export]
macro_rules! error_and_incr {
    ($statsd:expr, $key:expr, $($arg:tt)+) => {{
        $statsd.incr(&$key);
        $crate::error!($key, $($arg)+);
    }};
}

pub struct StatsD {
    client: StatsdClient,
}

impl StatsD {
    /// Falls back to discarding metrics if the UDP sink can't be set up.
    pub fn new(settings: &Settings) -> Self {
        let host = (settings.statsd_host.clone(), settings.statsd_port);
        let sink = UdpSocket::bind("0.0.0.0:0")
            .map_err(MetricError::from)
            .and_then(|socket| UdpMetricSink::from(host, socket));
        match sink {
            Ok(sink) => StatsD {
                client: StatsdClient::from_sink(METRIC_PREFIX, sink),
            },
            Err(e) => {
                error!(
                    LogKey::StatsDError,
                    error = %e,
                    "Could not set up statsd sink. Metrics are disabled."
                );
                StatsD::nop()
            }
        }
    }

    pub fn nop() -> Self {
        StatsD {
            client: StatsdClient::from_sink(METRIC_PREFIX, NopMetricSink),
        }
    }

    pub fn incr(&self, key: &LogKey) {
        let tag = key.to_string();
        self.client
            .incr(&tag)
            .map_err(|e| {
                error!(
                    LogKey::StatsDError,
                    error = %e,
                    "Could not increment statsd tag {}", tag
                );
            })
            .ok();
    }

    pub fn gauge(&self, key: &LogKey, value: usize) {
        let tag = key.to_string();
        self.client
            .gauge(&tag, value as u64)
            .map_err(|e| {
                error!(
                    LogKey::StatsDError,
                    error = %e,
                    "Could not record gauge {} for statsd tag {}", value, tag
                );
            })
            .ok();
    }

    pub fn time(&self, key: &LogKey, t: Duration) {
        let tag = key.to_string();
        self.client
            .time(&tag, t.as_millis() as u64)
            .map_err(|e| {
                error!(
                    LogKey::StatsDError,
                    error = %e,
                    "Could not record time {:?} for statsd tag {}", t, tag
                );
            })
            .ok();
    }
}
