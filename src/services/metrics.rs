use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec};

lazy_static! {
    // ── Auth event counters ────────────────────────────────────────────────
    pub static ref LOGINS_COUNTER: CounterVec = register_counter_vec!(
        "auth_logins_total",
        "Login attempts by outcome",
        &["status"]
    ).unwrap();

    pub static ref REGISTRATIONS_COUNTER: CounterVec = register_counter_vec!(
        "auth_registrations_total",
        "Registration attempts by outcome",
        &["status"]
    ).unwrap();

    pub static ref TOKEN_REFRESH_COUNTER: CounterVec = register_counter_vec!(
        "auth_token_refresh_total",
        "Refresh token redemptions by outcome",
        &["status"]
    ).unwrap();

    pub static ref TOKEN_REVOCATIONS_COUNTER: CounterVec = register_counter_vec!(
        "auth_token_revocations_total",
        "Refresh token revocations by outcome",
        &["status"]
    ).unwrap();
}

pub fn record(counter: &CounterVec, status: &str) {
    counter.with_label_values(&[status]).inc();
}
