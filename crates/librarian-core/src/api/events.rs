/// Session lifecycle notifications broadcast by the `ApiClient`.
///
/// The transport never navigates anywhere itself. A top-level subscriber
/// decides what `SessionInvalidated` means for the user (typically: show
/// the login screen).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A login or registration stored a fresh token
    LoggedIn,
    /// An expired token was replaced through the refresh endpoint
    TokenRefreshed,
    /// Refresh failed; the stored token has been cleared
    SessionInvalidated,
    /// The user logged out and the stored token has been cleared
    LoggedOut,
}

/// Capacity of the session event channel. Slow subscribers only ever
/// miss stale lifecycle notifications.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 16;
