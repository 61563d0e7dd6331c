//! # Detection Service
//!
//! [`AltDetector`] records identity signals in the shared store and publishes
//! an `AltAccountDetected` event when two or more accounts share one.
//!
//! ## Address Path
//!
//! ```text
//!  user:{id}:ips  ◄─ sadd ─┐      ┌─ sadd ─► ip:{addr}:users
//!                          └─ ip ─┘                │
//!                                                  ▼ others = members − subject
//!  for each (subject, other):
//!      alt:pair:{a}:{b}   set-if-absent, both orders
//!      user:{id}:alts     sadd, both directions
//!      alt:notified:ip    sadd "{a}:{b}" + "{b}:{a}"  → newly claimed?
//!
//!  login: publish only if at least one pair was newly claimed
//!  registration: always publish
//! ```
//!
//! A claim only sticks once the event is published. When publishing fails
//! the claimed markers are removed again, and `user:{id}:last_ip` is written
//! only after a successful pass, so a retried login is evaluated afresh.
//!
//! Email markers live in `alt:notified:email` and are only touched when
//! `dedup_email_matches` is on.

use crate::domain::{
    confidence, keys, AltAccountDetected, AltMatch, DetectionError, DetectionSource, MatchReason,
};
use crate::ports::{AccountDirectory, AltDetectionApi};
use async_trait::async_trait;
use bl_telemetry::metrics::ALT_DETECTIONS;
use chrono::{DateTime, Utc};
use shared_bus::{to_payload, EventPublisher, EventType};
use shared_store::SharedStore;
use shared_types::{Account, TimeSource, UserId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long the last login address is remembered.
pub const DEFAULT_LAST_IP_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Detector tuning.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Apply the pairwise notified check to email matches too. Off by
    /// default: every email match is published.
    pub dedup_email_matches: bool,
    /// Expiry of `user:{id}:last_ip`.
    pub last_ip_ttl: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            dedup_email_matches: false,
            last_ip_ttl: DEFAULT_LAST_IP_TTL,
        }
    }
}

/// Identity correlation detector.
pub struct AltDetector {
    store: Arc<dyn SharedStore>,
    accounts: Arc<dyn AccountDirectory>,
    publisher: Arc<dyn EventPublisher>,
    time: Arc<dyn TimeSource>,
    config: DetectorConfig,
}

impl AltDetector {
    pub fn new(
        store: Arc<dyn SharedStore>,
        accounts: Arc<dyn AccountDirectory>,
        publisher: Arc<dyn EventPublisher>,
        time: Arc<dyn TimeSource>,
        config: DetectorConfig,
    ) -> Self {
        Self {
            store,
            accounts,
            publisher,
            time,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    async fn address_path(
        &self,
        user: UserId,
        ip: &str,
        source: DetectionSource,
    ) -> Result<Option<AltAccountDetected>, DetectionError> {
        if ip.trim().is_empty() {
            debug!(%user, %source, "No address, skipping detection");
            return Ok(None);
        }

        self.store
            .sadd(&keys::user_ips(user), &[ip.to_string()])
            .await?;
        self.store
            .sadd(&keys::ip_users(ip), &[user.to_string()])
            .await?;

        let mut others: Vec<UserId> = self
            .store
            .smembers(&keys::ip_users(ip))
            .await?
            .iter()
            .filter_map(|raw| raw.parse().ok())
            .filter(|id| *id != user)
            .collect();
        if others.is_empty() {
            return Ok(None);
        }
        others.sort_unstable();

        self.record_pairs(user, &others).await?;
        let claimed = self.claim(MatchReason::Ip, user, &others).await?;
        if source == DetectionSource::Login && claimed.is_empty() {
            debug!(%user, %ip, matches = others.len(), "Group already notified");
            return Ok(None);
        }

        let result = self.report_address(user, ip, source, &others).await;
        self.settle(MatchReason::Ip, &claimed, matches!(result, Ok(Some(_))))
            .await;
        result
    }

    async fn report_address(
        &self,
        user: UserId,
        ip: &str,
        source: DetectionSource,
        others: &[UserId],
    ) -> Result<Option<AltAccountDetected>, DetectionError> {
        let matched = self.accounts.get_accounts(others).await?;
        let note = format!(
            "{} from an address shared with {} other account(s)",
            match source {
                DetectionSource::Registration => "Registered",
                _ => "Logged in",
            },
            matched.len()
        );
        self.report(user, matched, MatchReason::Ip, source, Some(ip), note)
            .await
    }

    /// Write pair bookkeeping for every `(user, other)`.
    async fn record_pairs(&self, user: UserId, others: &[UserId]) -> Result<(), DetectionError> {
        let stamp = self.time.now().to_rfc3339();
        for &other in others {
            self.store
                .set_nx(&keys::pair(user, other), &stamp, None)
                .await?;
            self.store
                .set_nx(&keys::pair(other, user), &stamp, None)
                .await?;
            self.store
                .sadd(&keys::alts(user), &[other.to_string()])
                .await?;
            self.store
                .sadd(&keys::alts(other), &[user.to_string()])
                .await?;
        }
        Ok(())
    }

    /// Claim the notified markers of every `(user, other)` pair for `reason`.
    /// Returns the markers claimed by this call.
    async fn claim(
        &self,
        reason: MatchReason,
        user: UserId,
        others: &[UserId],
    ) -> Result<Vec<String>, DetectionError> {
        let mut claimed = Vec::new();
        for &other in others {
            let markers = [keys::marker(user, other), keys::marker(other, user)];
            match self.store.sadd(keys::notified(reason), &markers).await {
                Ok(0) => {}
                Ok(_) => claimed.extend(markers),
                Err(e) => {
                    self.settle(reason, &claimed, false).await;
                    return Err(e.into());
                }
            }
        }
        Ok(claimed)
    }

    /// Give claimed markers back unless the detection was published.
    async fn settle(&self, reason: MatchReason, claimed: &[String], published: bool) {
        if claimed.is_empty() || published {
            return;
        }
        match self.store.srem(keys::notified(reason), claimed).await {
            Ok(released) => debug!(released, ?reason, "Released notified markers"),
            Err(e) => warn!(error = %e, ?reason, "Failed to release notified markers"),
        }
    }

    async fn report(
        &self,
        user: UserId,
        matched: Vec<Account>,
        reason: MatchReason,
        source: DetectionSource,
        ip: Option<&str>,
        note: String,
    ) -> Result<Option<AltAccountDetected>, DetectionError> {
        if matched.is_empty() {
            warn!(%user, %source, "Matched accounts no longer exist");
            return Ok(None);
        }
        let subject = self
            .accounts
            .get_accounts(&[user])
            .await?
            .into_iter()
            .next()
            .ok_or(DetectionError::UnknownUser(user))?;

        let detection = AltAccountDetected {
            user_id: user,
            username: subject.username,
            confidence: confidence(source, matched.len()),
            matches: matched
                .into_iter()
                .map(|account| AltMatch {
                    user_id: account.id,
                    username: account.username,
                    reason,
                })
                .collect(),
            source,
            ip: ip.map(str::to_string),
            note,
        };

        let payload = to_payload(&detection)?;
        let event = self
            .publisher
            .publish_payload(EventType::AltAccountDetected, payload)
            .await?;
        ALT_DETECTIONS.with_label_values(&[source.as_str()]).inc();
        info!(
            %user,
            %source,
            matches = detection.matches.len(),
            confidence = detection.confidence,
            event_id = %event.id,
            "Alt accounts detected"
        );
        Ok(Some(detection))
    }
}

#[async_trait]
impl AltDetectionApi for AltDetector {
    async fn on_registration(
        &self,
        user: UserId,
        ip: &str,
    ) -> Result<Option<AltAccountDetected>, DetectionError> {
        let detection = self
            .address_path(user, ip, DetectionSource::Registration)
            .await?;
        if !ip.trim().is_empty() {
            self.store
                .set(&keys::last_ip(user), ip, Some(self.config.last_ip_ttl))
                .await?;
        }
        Ok(detection)
    }

    async fn on_login(
        &self,
        user: UserId,
        ip: &str,
    ) -> Result<Option<AltAccountDetected>, DetectionError> {
        let last_ip_key = keys::last_ip(user);
        if self.store.get(&last_ip_key).await?.as_deref() == Some(ip) {
            return Ok(None);
        }
        let detection = self.address_path(user, ip, DetectionSource::Login).await?;
        self.store
            .set(&last_ip_key, ip, Some(self.config.last_ip_ttl))
            .await?;
        Ok(detection)
    }

    async fn on_email_verified(
        &self,
        user: UserId,
        email: &str,
    ) -> Result<Option<AltAccountDetected>, DetectionError> {
        let mut matched = self.accounts.find_by_verified_email(email, user).await?;
        if matched.is_empty() {
            return Ok(None);
        }
        matched.sort_by_key(|account| account.id);

        let ids: Vec<UserId> = matched.iter().map(|account| account.id).collect();
        self.record_pairs(user, &ids).await?;
        let mut claimed = Vec::new();
        if self.config.dedup_email_matches {
            claimed = self.claim(MatchReason::Email, user, &ids).await?;
            if claimed.is_empty() {
                debug!(%user, matches = ids.len(), "Email group already notified");
                return Ok(None);
            }
        }

        let note = format!(
            "Verified an email already used by {} other account(s)",
            matched.len()
        );
        let result = self
            .report(
                user,
                matched,
                MatchReason::Email,
                DetectionSource::EmailVerification,
                None,
                note,
            )
            .await;
        self.settle(MatchReason::Email, &claimed, matches!(result, Ok(Some(_))))
            .await;
        result
    }

    async fn known_alts(&self, user: UserId) -> Result<Vec<UserId>, DetectionError> {
        let mut alts: Vec<UserId> = self
            .store
            .smembers(&keys::alts(user))
            .await?
            .iter()
            .filter_map(|raw| raw.parse().ok())
            .collect();
        alts.sort_unstable();
        Ok(alts)
    }

    async fn first_detected(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<DateTime<Utc>>, DetectionError> {
        let Some(raw) = self.store.get(&keys::pair(a, b)).await? else {
            return Ok(None);
        };
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(at) => Ok(Some(at.with_timezone(&Utc))),
            Err(e) => {
                warn!(%a, %b, error = %e, "Unreadable pair timestamp");
                Ok(None)
            }
        }
    }
}
