//! Failure classification and release blacklisting.
//!
//! Decides whether a failure message describes the *content* (bad release,
//! worth blacklisting so search never returns it again) or the *environment*
//! (local misconfiguration, full disk, unreachable mount — blacklisting the
//! release would burn a perfectly good one). Environment checks run first:
//! a message matching both families is treated as environmental.

use crate::config::{BLACKLIST_TTL, MAX_AUTO_RETRIES};
use crate::db::{Database, NewBlacklistEntry};
use crate::error::Result;
use crate::types::{FailureType, MediaRef};
use std::sync::Arc;

/// Message fragments that indicate a local environment problem
const ENVIRONMENT_KEYWORDS: &[&str] = &[
    "permission",
    "denied",
    "no space",
    "disk full",
    "out of space",
    "connection",
    "timeout",
    "timed out",
    "unreachable",
    "refused",
    "authentication",
    "unauthorized",
    "api key",
    "login",
    "mount",
    "no such path",
    "path not found",
    "network",
    "dns",
];

/// Message fragments that indicate the release content itself is bad
const CONTENT_KEYWORDS: &[&str] = &[
    "crc",
    "unpack",
    "extract",
    "corrupt",
    "damaged",
    "missing article",
    "articles missing",
    "par2",
    "repair",
    "verification failed",
    "password",
    "encrypted",
    "removed",
    "dmca",
    "takedown",
    "expired",
    "not found on server",
    "incomplete",
    "aborted by server",
];

/// Whether a failure message warrants blacklisting the release
///
/// Unclassifiable messages are not blacklist-worthy: when in doubt, keep the
/// release eligible and let the retry budget bound repeated failures.
pub fn should_blacklist(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    if ENVIRONMENT_KEYWORDS.iter().any(|k| message.contains(k)) {
        return false;
    }
    CONTENT_KEYWORDS.iter().any(|k| message.contains(k))
}

/// Classify a failure message
pub fn determine_failure_type(message: &str) -> FailureType {
    let message = message.to_ascii_lowercase();

    if ENVIRONMENT_KEYWORDS.iter().any(|k| message.contains(k)) {
        return FailureType::EnvironmentFailure;
    }
    if message.contains("password") || message.contains("encrypted") {
        return FailureType::PasswordProtected;
    }
    if message.contains("removed")
        || message.contains("dmca")
        || message.contains("takedown")
        || message.contains("expired")
        || message.contains("not found on server")
    {
        return FailureType::Removed;
    }
    if message.contains("crc")
        || message.contains("unpack")
        || message.contains("extract")
        || message.contains("corrupt")
        || message.contains("damaged")
        || message.contains("par2")
        || message.contains("repair")
        || message.contains("verification failed")
    {
        return FailureType::Corruption;
    }
    if message.contains("missing article")
        || message.contains("articles missing")
        || message.contains("incomplete")
        || message.contains("aborted by server")
    {
        return FailureType::ContentFailure;
    }

    FailureType::Unknown
}

/// Classifies failures and maintains the release blacklist
pub struct BlacklistClassifier {
    db: Arc<Database>,
}

impl BlacklistClassifier {
    /// Create a classifier over the given database
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Record a blacklist entry for a failed release
    ///
    /// Entries are append-only and expire after the configured TTL; each one
    /// consumes a unit of the media item's automatic-retry budget.
    pub async fn blacklist(
        &self,
        media: &MediaRef,
        guid: &str,
        indexer: Option<&str>,
        reason: &str,
        failure_type: FailureType,
    ) -> Result<()> {
        let expires_at = chrono::Utc::now().timestamp() + BLACKLIST_TTL.as_secs() as i64;
        let entry = NewBlacklistEntry {
            release_guid: guid.to_string(),
            indexer: indexer.map(str::to_string),
            media: media.clone(),
            reason: reason.to_string(),
            failure_type: failure_type.to_i32(),
            expires_at,
        };
        self.db.insert_blacklist(&entry).await?;

        tracing::info!(
            media = %media,
            guid = %guid,
            failure_type = ?failure_type,
            reason = %reason,
            "Release blacklisted"
        );
        Ok(())
    }

    /// Whether the media item has used up its automatic-retry budget
    ///
    /// Counted before the current failure is recorded, so a budget of N
    /// allows N alternative searches after the original grab.
    pub async fn has_exceeded_retries(&self, media: &MediaRef) -> Result<bool> {
        let count = self.db.count_blacklist_for_media(media).await?;
        Ok(count >= MAX_AUTO_RETRIES)
    }

    /// Whether a release is currently blacklisted
    ///
    /// Search integrations consult this to filter candidate releases.
    pub async fn is_release_blacklisted(
        &self,
        guid: &str,
        indexer: Option<&str>,
    ) -> Result<bool> {
        self.db.is_release_blacklisted(guid, indexer).await
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn classifier() -> (TempDir, BlacklistClassifier) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(&dir.path().join("test.db")).await.unwrap();
        (dir, BlacklistClassifier::new(Arc::new(db)))
    }

    fn movie() -> MediaRef {
        MediaRef::Movie {
            movie_id: "m1".to_string(),
        }
    }

    #[test]
    fn content_failures_are_blacklist_worthy() {
        assert!(should_blacklist("Unpacking failed, CRC error"));
        assert!(should_blacklist("Download failed: missing articles"));
        assert!(should_blacklist("Archive is password protected"));
        assert!(should_blacklist("Removed from indexer (DMCA)"));
        assert!(should_blacklist("PAR2 repair failed"));
    }

    #[test]
    fn environment_failures_are_never_blacklist_worthy() {
        assert!(!should_blacklist("Permission denied: /downloads/complete"));
        assert!(!should_blacklist("No space left on device"));
        assert!(!should_blacklist("Connection refused"));
        assert!(!should_blacklist("API key invalid"));
        assert!(!should_blacklist("Mount point /mnt/nas unreachable"));
    }

    #[test]
    fn environment_wins_when_both_families_match() {
        // "extract" alone would blacklist; the disk-space signal overrides
        assert!(!should_blacklist("Failed to extract: no space left on device"));
        assert_eq!(
            determine_failure_type("Failed to extract: no space left on device"),
            FailureType::EnvironmentFailure
        );
    }

    #[test]
    fn unknown_messages_are_not_blacklist_worthy() {
        assert!(!should_blacklist("Something odd happened"));
        assert_eq!(
            determine_failure_type("Something odd happened"),
            FailureType::Unknown
        );
    }

    #[test]
    fn failure_types_are_assigned_by_specificity() {
        assert_eq!(
            determine_failure_type("Unpacking failed, CRC error"),
            FailureType::Corruption
        );
        assert_eq!(
            determine_failure_type("Archive is encrypted"),
            FailureType::PasswordProtected
        );
        assert_eq!(
            determine_failure_type("Release removed (takedown)"),
            FailureType::Removed
        );
        assert_eq!(
            determine_failure_type("Download incomplete"),
            FailureType::ContentFailure
        );
    }

    #[tokio::test]
    async fn retry_budget_is_counted_before_the_new_entry() {
        let (_dir, classifier) = classifier().await;
        let media = movie();

        for i in 0..MAX_AUTO_RETRIES {
            assert!(
                !classifier.has_exceeded_retries(&media).await.unwrap(),
                "budget must allow retry {i}"
            );
            classifier
                .blacklist(
                    &media,
                    &format!("guid-{i}"),
                    Some("indexer"),
                    "CRC error",
                    FailureType::Corruption,
                )
                .await
                .unwrap();
        }

        assert!(classifier.has_exceeded_retries(&media).await.unwrap());
    }

    #[tokio::test]
    async fn blacklisted_release_is_reported_as_blacklisted() {
        let (_dir, classifier) = classifier().await;
        classifier
            .blacklist(
                &movie(),
                "guid-x",
                Some("nzbs"),
                "password protected",
                FailureType::PasswordProtected,
            )
            .await
            .unwrap();

        assert!(
            classifier
                .is_release_blacklisted("guid-x", Some("nzbs"))
                .await
                .unwrap()
        );
        assert!(
            !classifier
                .is_release_blacklisted("guid-y", Some("nzbs"))
                .await
                .unwrap()
        );
    }
}
