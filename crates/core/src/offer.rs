use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{LeadId, OfferId, ProposalId, TenantId};

/// A random, unguessable key bound to one offer, used as the lookup key for
/// the pixel, click, and unsubscribe endpoints.
///
/// Always 64 lowercase hex characters derived from 32 CSPRNG bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingToken(String);

impl TrackingToken {
    /// Generate a fresh token from the OS random source.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Parse and validate an incoming token string.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] unless the input is exactly 64
    /// lowercase hex characters.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        if raw.len() == 64 && raw.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            Ok(Self(raw.to_owned()))
        } else {
            Err(CoreError::InvalidInput("malformed tracking token".into()))
        }
    }

    /// The token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TrackingToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// State of an offer in its delivery lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Draft,
    PendingApproval,
    Approved,
    Rejected,
    Sent,
    Opened,
    Clicked,
    Responded,
    Converted,
}

impl OfferStatus {
    /// Stable string form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Sent => "sent",
            Self::Opened => "opened",
            Self::Clicked => "clicked",
            Self::Responded => "responded",
            Self::Converted => "converted",
        }
    }

    /// Position on the post-send engagement ladder, or `None` for states
    /// outside it.
    fn engagement_rank(self) -> Option<u8> {
        match self {
            Self::Sent => Some(0),
            Self::Opened => Some(1),
            Self::Clicked => Some(2),
            Self::Responded => Some(3),
            Self::Converted => Some(4),
            _ => None,
        }
    }
}

impl std::fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transitions an offer can attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferTransition {
    Submit,
    Approve,
    Reject,
    Send,
    Open,
    Click,
    Respond,
    Convert,
}

impl OfferTransition {
    /// Stable string form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Send => "send",
            Self::Open => "open",
            Self::Click => "click",
            Self::Respond => "respond",
            Self::Convert => "convert",
        }
    }
}

impl std::fmt::Display for OfferTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explicit outcome of applying a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionResult {
    /// The offer moved to a new state.
    Applied,
    /// The transition is a tolerated repeat; nothing changed.
    Unchanged,
    /// The transition is not allowed from the current state.
    Invalid,
}

impl TransitionResult {
    /// Whether the transition was accepted (applied or tolerated repeat).
    #[must_use]
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Invalid)
    }
}

/// An outbound communication derived from a proposal.
///
/// Timestamps are write-once on first entry into each state; `opened_at` and
/// `clicked_at` keep the first observation when tracking events repeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    /// Unique offer identifier.
    pub id: OfferId,

    /// Owning tenant.
    pub tenant: TenantId,

    /// The lead this offer targets.
    pub lead: LeadId,

    /// The proposal this offer was composed from, if any.
    #[serde(default)]
    pub proposal: Option<ProposalId>,

    /// Recipient email address.
    pub recipient: String,

    /// Subject line.
    pub subject: String,

    /// HTML body.
    pub body: String,

    /// Plain-text alternative body.
    pub plain_text_body: String,

    /// Globally unique tracking key, generated at construction.
    pub tracking_token: TrackingToken,

    /// Current lifecycle state.
    pub status: OfferStatus,

    /// Why the offer was rejected, when it was.
    #[serde(default)]
    pub reject_reason: Option<String>,

    /// Provider message id recorded after transmission.
    #[serde(default)]
    pub message_id: Option<String>,

    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rejected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub opened_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub clicked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub responded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub converted_at: Option<DateTime<Utc>>,

    /// When the provider reported the message as bounced. Engagement stops
    /// here; the recipient lands on the suppression list.
    #[serde(default)]
    pub bounced_at: Option<DateTime<Utc>>,

    /// When the offer was created.
    pub created_at: DateTime<Utc>,

    /// Optimistic-locking version, bumped by the store on every successful
    /// compare-and-swap update.
    #[serde(default)]
    pub version: u64,
}

impl Offer {
    /// Create a draft offer with a fresh tracking token.
    #[must_use]
    pub fn new(
        tenant: impl Into<TenantId>,
        lead: LeadId,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        plain_text_body: impl Into<String>,
    ) -> Self {
        Self {
            id: OfferId::new(),
            tenant: tenant.into(),
            lead,
            proposal: None,
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
            plain_text_body: plain_text_body.into(),
            tracking_token: TrackingToken::generate(),
            status: OfferStatus::Draft,
            reject_reason: None,
            message_id: None,
            submitted_at: None,
            approved_at: None,
            rejected_at: None,
            sent_at: None,
            opened_at: None,
            clicked_at: None,
            responded_at: None,
            converted_at: None,
            bounced_at: None,
            created_at: Utc::now(),
            version: 0,
        }
    }

    /// Link the originating proposal.
    #[must_use]
    pub fn with_proposal(mut self, proposal: ProposalId) -> Self {
        self.proposal = Some(proposal);
        self
    }

    /// Apply a transition at `now`, mutating status and timestamps.
    ///
    /// Returns an explicit result instead of an error so callers can decide
    /// how to surface invalid transitions (HTTP 409, warn-and-skip, ...).
    pub fn apply(&mut self, transition: OfferTransition, now: DateTime<Utc>) -> TransitionResult {
        match transition {
            OfferTransition::Submit => match self.status {
                OfferStatus::Draft => {
                    self.status = OfferStatus::PendingApproval;
                    self.submitted_at.get_or_insert(now);
                    TransitionResult::Applied
                }
                OfferStatus::PendingApproval => TransitionResult::Unchanged,
                _ => TransitionResult::Invalid,
            },
            OfferTransition::Approve => match self.status {
                OfferStatus::PendingApproval => {
                    self.status = OfferStatus::Approved;
                    self.approved_at.get_or_insert(now);
                    TransitionResult::Applied
                }
                _ => TransitionResult::Invalid,
            },
            OfferTransition::Reject => match self.status {
                OfferStatus::PendingApproval | OfferStatus::Approved => {
                    self.status = OfferStatus::Rejected;
                    self.rejected_at.get_or_insert(now);
                    TransitionResult::Applied
                }
                _ => TransitionResult::Invalid,
            },
            OfferTransition::Send => match self.status {
                OfferStatus::Approved => {
                    self.status = OfferStatus::Sent;
                    self.sent_at.get_or_insert(now);
                    TransitionResult::Applied
                }
                _ => TransitionResult::Invalid,
            },
            OfferTransition::Open => self.advance(OfferStatus::Opened, now),
            OfferTransition::Click => self.advance(OfferStatus::Clicked, now),
            OfferTransition::Respond => self.advance(OfferStatus::Responded, now),
            OfferTransition::Convert => self.advance(OfferStatus::Converted, now),
        }
    }

    /// Move forward on the engagement ladder to at least `target`.
    ///
    /// Tracking events arrive at-least-once and out of order; re-entering a
    /// state keeps the first timestamp.
    fn advance(&mut self, target: OfferStatus, now: DateTime<Utc>) -> TransitionResult {
        let Some(current_rank) = self.status.engagement_rank() else {
            return TransitionResult::Invalid;
        };
        let target_rank = target
            .engagement_rank()
            .expect("advance target is always on the engagement ladder");

        // Opening is implied by clicking; both keep write-once-first stamps.
        match target {
            OfferStatus::Opened => {
                self.opened_at.get_or_insert(now);
            }
            OfferStatus::Clicked => {
                self.opened_at.get_or_insert(now);
                self.clicked_at.get_or_insert(now);
            }
            OfferStatus::Responded => {
                self.responded_at.get_or_insert(now);
            }
            OfferStatus::Converted => {
                self.converted_at.get_or_insert(now);
            }
            _ => {}
        }

        if current_rank < target_rank {
            self.status = target;
            TransitionResult::Applied
        } else {
            TransitionResult::Unchanged
        }
    }
}
