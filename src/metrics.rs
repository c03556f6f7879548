//! Connection metrics
//!
//! Recorded through the `metrics` facade; they cost nothing until the
//! application installs a recorder.

/// Label values
pub mod labels {
    /// Attempt produced a handle
    pub const OUTCOME_SUCCESS: &str = "success";
    /// Attempt ended in a connection failure
    pub const OUTCOME_FAILURE: &str = "failure";
}

/// Counters
pub mod counters {
    /// A connection attempt started
    pub fn connection_attempted(sslmode: &str) {
        ::metrics::counter!(
            "pgconnect_connection_attempts_total",
            "sslmode" => sslmode.to_string()
        )
        .increment(1);
    }

    /// A session was established
    pub fn connection_established(encrypted: bool) {
        ::metrics::counter!(
            "pgconnect_connections_established_total",
            "encrypted" => if encrypted { "true" } else { "false" }
        )
        .increment(1);
    }

    /// An attempt failed; `kind` is [`crate::ConnectionFailure::kind`]
    pub fn connection_failed(kind: &'static str) {
        ::metrics::counter!("pgconnect_connection_failures_total", "kind" => kind).increment(1);
    }

    /// A diagnostic was handed to the reporter
    pub fn diagnostic_reported() {
        ::metrics::counter!("pgconnect_diagnostics_reported_total").increment(1);
    }
}

/// Histograms
pub mod histograms {
    use std::time::Duration;

    /// Wall time of one attempt, from socket open to startup complete or failure
    pub fn connect_duration(outcome: &'static str, elapsed: Duration) {
        ::metrics::histogram!("pgconnect_connect_duration_ms", "outcome" => outcome)
            .record(elapsed.as_secs_f64() * 1000.0);
    }
}
