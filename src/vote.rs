//! Like/dislike toggling for a single post or comment.
//!
//! Nothing changes until the backend acknowledges the vote. The displayed
//! count is always `baseline + weight(status)`; what differs between the
//! policies is how the baseline is obtained.

use crate::api::ApiError;
use crate::data::VoteService;
pub use crate::model::SupportStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Post,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VoteTarget {
    pub kind: TargetKind,
    pub id: String,
}

impl VoteTarget {
    pub fn post(id: impl Into<String>) -> Self {
        Self {
            kind: TargetKind::Post,
            id: id.into(),
        }
    }

    pub fn comment(id: impl Into<String>) -> Self {
        Self {
            kind: TargetKind::Comment,
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BaselinePolicy {
    /// Baseline is the count supplied at construction, whatever the status
    /// was. An item that starts out liked drifts by one after un-liking.
    #[default]
    Mount,
    /// Baseline is the neutral count implied by the last confirmed
    /// status and count.
    Confirmed,
}

#[derive(Debug, Clone)]
pub struct SupportToggle {
    target: VoteTarget,
    status: SupportStatus,
    count: i64,
    baseline: i64,
    policy: BaselinePolicy,
}

impl SupportToggle {
    pub fn new(target: VoteTarget, status: SupportStatus, count: i64) -> Self {
        Self {
            target,
            status,
            count,
            baseline: count,
            policy: BaselinePolicy::Mount,
        }
    }

    pub fn with_policy(mut self, policy: BaselinePolicy) -> Self {
        self.policy = policy;
        self.baseline = self.derive_baseline();
        self
    }

    pub fn target(&self) -> &VoteTarget {
        &self.target
    }

    pub fn status(&self) -> SupportStatus {
        self.status
    }

    pub fn count(&self) -> i64 {
        self.count
    }

    pub fn policy(&self) -> BaselinePolicy {
        self.policy
    }

    /// Replaces the displayed state with a fresh server copy. Under
    /// [`BaselinePolicy::Mount`] the baseline stays where it was captured.
    pub fn sync(&mut self, status: SupportStatus, count: i64) {
        self.status = status;
        self.count = count;
        if self.policy == BaselinePolicy::Confirmed {
            self.baseline = self.derive_baseline();
        }
    }

    pub fn toggle_upvote(&mut self, votes: &dyn VoteService) -> Result<SupportStatus, ApiError> {
        self.toggle(votes, SupportStatus::Liked)
    }

    pub fn toggle_downvote(&mut self, votes: &dyn VoteService) -> Result<SupportStatus, ApiError> {
        self.toggle(votes, SupportStatus::Disliked)
    }

    fn toggle(
        &mut self,
        votes: &dyn VoteService,
        wanted: SupportStatus,
    ) -> Result<SupportStatus, ApiError> {
        let next = if self.status == wanted {
            SupportStatus::Neutral
        } else {
            wanted
        };

        // Comment votes cannot be withdrawn.
        if next == SupportStatus::Neutral && self.target.kind == TargetKind::Comment {
            return Ok(self.status);
        }

        let result = match next {
            SupportStatus::Liked => votes.upvote(&self.target),
            SupportStatus::Disliked => votes.downvote(&self.target),
            SupportStatus::Neutral => votes.remove_vote(&self.target),
        };
        if let Err(err) = result {
            tracing::warn!(id = %self.target.id, error = %err, "vote failed");
            return Err(err);
        }

        self.status = next;
        self.count = self.baseline + next.weight();
        Ok(next)
    }

    fn derive_baseline(&self) -> i64 {
        match self.policy {
            BaselinePolicy::Mount => self.count,
            BaselinePolicy::Confirmed => self.count - self.status.weight(),
        }
    }
}
