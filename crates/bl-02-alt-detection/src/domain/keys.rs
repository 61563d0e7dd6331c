//! Shared store key layout for identity signals.

use super::MatchReason;
use shared_types::UserId;

/// Set of `{a}:{b}` markers for pairs already announced for `reason`.
#[must_use]
pub fn notified(reason: MatchReason) -> &'static str {
    match reason {
        MatchReason::Ip => "alt:notified:ip",
        MatchReason::Email => "alt:notified:email",
    }
}

/// Addresses a user has been seen from.
#[must_use]
pub fn user_ips(user: UserId) -> String {
    format!("user:{user}:ips")
}

/// Users seen from an address.
#[must_use]
pub fn ip_users(ip: &str) -> String {
    format!("ip:{ip}:users")
}

/// First-detected timestamp of a pair.
#[must_use]
pub fn pair(a: UserId, b: UserId) -> String {
    format!("alt:pair:{a}:{b}")
}

/// Member of a [`notified`] set.
#[must_use]
pub fn marker(a: UserId, b: UserId) -> String {
    format!("{a}:{b}")
}

/// Known alt accounts of a user.
#[must_use]
pub fn alts(user: UserId) -> String {
    format!("user:{user}:alts")
}

/// Last address a user logged in from.
#[must_use]
pub fn last_ip(user: UserId) -> String {
    format!("user:{user}:last_ip")
}
