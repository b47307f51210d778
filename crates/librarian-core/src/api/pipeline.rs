//! Decision functions composed by `ApiClient::send`.
//!
//! Each step of the request pipeline (classify a failure, decide whether
//! to retry, how long to wait, whether to repair the session) is a pure
//! function here so it can be tested without a server.

use std::time::Duration;

use reqwest::StatusCode;

use crate::config::{AuthRoutes, RetryPolicy};

/// Classification of a failed transport attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// No well-formed response arrived (timeout, refused, dropped)
    Transient,
    /// The request could not be issued at all; retrying cannot help
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    /// Refresh the token and replay the call once
    Repair,
    /// Hand the response to normalization as-is
    Surface,
}

pub fn classify_error(err: &reqwest::Error) -> FailureClass {
    if err.is_builder() || err.is_redirect() {
        return FailureClass::Fatal;
    }
    // Everything else is timeout, connect, request or body level
    FailureClass::Transient
}

/// Total attempts allowed for one logical call to `path`.
pub fn attempt_budget(policy: &RetryPolicy, routes: &AuthRoutes, path: &str) -> u32 {
    if routes.is_auth_endpoint(path) {
        policy.auth_max_attempts
    } else {
        policy.max_attempts
    }
}

/// Delay before the retry that follows `retries_made` earlier retries:
/// `base * 2^retries_made`.
pub fn backoff_delay(policy: &RetryPolicy, retries_made: u32) -> Duration {
    let factor = 2u64.saturating_pow(retries_made);
    Duration::from_millis(policy.base_delay_ms.saturating_mul(factor))
}

/// `attempts_made` counts the attempt that just failed.
pub fn decide_retry(
    class: FailureClass,
    attempts_made: u32,
    budget: u32,
    policy: &RetryPolicy,
) -> RetryDecision {
    if class == FailureClass::Fatal || attempts_made >= budget {
        return RetryDecision::GiveUp;
    }
    RetryDecision::RetryAfter(backoff_delay(policy, attempts_made.saturating_sub(1)))
}

/// Only the first 401 of a non-auth call is repaired.
pub fn decide_auth(status: StatusCode, already_repaired: bool, is_auth_endpoint: bool) -> AuthDecision {
    if status == StatusCode::UNAUTHORIZED && !already_repaired && !is_auth_endpoint {
        AuthDecision::Repair
    } else {
        AuthDecision::Surface
    }
}
