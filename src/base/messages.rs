//! User-visible texts the relay sends on its own behalf.

/// Sent once when the backend could not be reached after all attempts.
pub const SERVICE_UNAVAILABLE: &str = "Service unavailable, please try later";

/// Sent once when the backend refused the request.
pub const REQUEST_REJECTED: &str = "The backend could not handle this request.";
