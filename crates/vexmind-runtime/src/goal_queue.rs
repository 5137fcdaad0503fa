//! [`GoalQueue`] – thread-safe FIFO of client goals, with accept/deny
//! decisions delegated to the reasoning oracle.
//!
//! Submission never blocks on the oracle: goals enter as `pending`, and
//! [`GoalQueue::review_pending`] (or the orchestrator, lazily) decides them
//! later.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::{debug, info, warn};
use vexmind_types::{GoalRecord, GoalStatus};

use crate::oracle::{ChatMessage, DEFAULT_MODEL, Oracle, ThinkRequest};

/// Reason recorded when the oracle gives no answer about a goal.
pub const FALLBACK_REASON: &str = "I don't even know what to make of this";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GoalError {
    /// Carries the internal cause; the display text is what clients see.
    #[error("Invalid goal submission: Ensure all required fields are properly formatted.")]
    Invalid(String),
}

fn decision_prompt(request: &str) -> String {
    format!(
        "GOAL MODE: Someone has submitted a new goal for you.\n---\n\
         You are an AI baked into a robot that can move forward, backward, left and right, \
         and raise or lower its arm and open or close its claw. Decide whether to accept or \
         deny the following goal:\n\nGoal: {request}\n\n\
         Respond with 'accepted' or 'denied', and explain your decision in at most 8 words."
    )
}

/// Apply an oracle reply to `goal`.
///
/// Any reply containing "accept" (case-insensitive) accepts the goal; the
/// full reply becomes the reason.  No reply denies it with
/// [`FALLBACK_REASON`].
pub fn apply_decision(goal: &mut GoalRecord, reply: Option<&str>) {
    match reply.map(str::trim).filter(|r| !r.is_empty()) {
        None => {
            goal.status = GoalStatus::Denied;
            goal.reason = FALLBACK_REASON.to_string();
        }
        Some(text) => {
            goal.status = if text.to_lowercase().contains("accept") {
                GoalStatus::Accepted
            } else {
                GoalStatus::Denied
            };
            goal.reason = text.to_string();
        }
    }
}

pub struct GoalQueue {
    oracle: Arc<dyn Oracle>,
    model: String,
    goals: Mutex<VecDeque<GoalRecord>>,
}

impl GoalQueue {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self {
            oracle,
            model: DEFAULT_MODEL.to_string(),
            goals: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<GoalRecord>> {
        self.goals.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// A new `pending` goal with the default reason.
    pub fn create_goal(id: impl Into<String>, request: impl Into<String>) -> GoalRecord {
        GoalRecord::new(id, request)
    }

    /// `true` when the goal has a non-blank id and request.  The reason may
    /// be empty, and the status is a closed enum, so any value it holds is
    /// permitted.
    pub fn validate_goal(goal: &GoalRecord) -> bool {
        !goal.id.trim().is_empty() && !goal.request.trim().is_empty()
    }

    /// Ask the oracle to accept or deny `goal`, updating it in place.
    pub async fn decide_goal(&self, goal: &mut GoalRecord) -> (GoalStatus, String) {
        info!(goal_id = %goal.id, request = %goal.request, "deciding on goal");
        let request = ThinkRequest::new(
            "goal-decision",
            vec![ChatMessage::user(decision_prompt(&goal.request))],
        )
        .with_model(&self.model);

        let reply = match self.oracle.think(request).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                warn!(goal_id = %goal.id, error = %e, "goal decision unavailable");
                None
            }
        };
        apply_decision(goal, reply.as_deref());

        info!(
            goal_id = %goal.id,
            status = %goal.status,
            reason = %goal.reason,
            "goal decision"
        );
        (goal.status, goal.reason.clone())
    }

    /// Validate and enqueue `goal`.
    ///
    /// # Errors
    ///
    /// [`GoalError::Invalid`] when a required field is empty; the queue is
    /// left unchanged.
    pub fn submit_goal(&self, goal: GoalRecord) -> Result<String, GoalError> {
        if !Self::validate_goal(&goal) {
            warn!(goal_id = %goal.id, "invalid goal submission attempted");
            return Err(GoalError::Invalid("empty required field".into()));
        }
        let confirmation = format!("Goal with ID '{}' successfully submitted.", goal.id);
        info!(goal_id = %goal.id, request = %goal.request, "goal submitted");
        self.queue().push_back(goal);
        Ok(confirmation)
    }

    /// Parse a JSON goal record and submit it.
    ///
    /// # Errors
    ///
    /// [`GoalError::Invalid`] when a field is missing, mistyped, or empty,
    /// or the status is not one of `pending`, `accepted`, `denied`.
    pub fn submit_json(&self, raw: &str) -> Result<String, GoalError> {
        let goal: GoalRecord = serde_json::from_str(raw).map_err(|e| {
            warn!(error = %e, "invalid goal submission attempted");
            GoalError::Invalid(e.to_string())
        })?;
        self.submit_goal(goal)
    }

    /// Pop the oldest goal without blocking.
    pub fn get_next_goal(&self) -> Option<GoalRecord> {
        let goal = self.queue().pop_front();
        match &goal {
            Some(g) => info!(goal_id = %g.id, request = %g.request, "retrieved next goal"),
            None => debug!("no goals in the queue"),
        }
        goal
    }

    pub fn list_goals(&self) -> Vec<GoalRecord> {
        self.queue().iter().cloned().collect()
    }

    /// Drop every queued goal and return how many there were.
    pub fn clear_goals(&self) -> usize {
        let mut queue = self.queue();
        let n = queue.len();
        queue.clear();
        info!(cleared = n, "goal queue cleared");
        n
    }

    /// Decide every goal that is still `pending`, writing each decision back
    /// into the queue.  Returns the decided records.
    ///
    /// The lock is not held while the oracle is consulted; a goal that was
    /// dequeued in the meantime is decided but not written back.
    pub async fn review_pending(&self) -> Vec<GoalRecord> {
        let pending: Vec<GoalRecord> = self
            .queue()
            .iter()
            .filter(|g| g.status == GoalStatus::Pending)
            .cloned()
            .collect();

        let mut decided = Vec::with_capacity(pending.len());
        for mut goal in pending {
            self.decide_goal(&mut goal).await;
            if let Some(slot) = self
                .queue()
                .iter_mut()
                .find(|g| g.id == goal.id && g.status == GoalStatus::Pending)
            {
                *slot = goal.clone();
            }
            decided.push(goal);
        }
        decided
    }

    pub fn len(&self) -> usize {
        self.queue().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::OracleError;
    use crate::testing::MockOracle;
    use vexmind_types::DEFAULT_GOAL_REASON;

    fn queue_with(oracle: MockOracle) -> (GoalQueue, Arc<MockOracle>) {
        let oracle = Arc::new(oracle);
        (GoalQueue::new(Arc::clone(&oracle) as Arc<dyn Oracle>), oracle)
    }

    #[test]
    fn created_goal_is_pending_with_default_reason() {
        let goal = GoalQueue::create_goal("g1", "go to the kitchen");
        assert_eq!(goal.status, GoalStatus::Pending);
        assert_eq!(goal.reason, DEFAULT_GOAL_REASON);
        assert!(GoalQueue::validate_goal(&goal));
    }

    #[test]
    fn submit_and_list_scenario() {
        let (queue, _) = queue_with(MockOracle::scripted(vec![]));
        let msg = queue
            .submit_goal(GoalQueue::create_goal("g1", "go to the kitchen"))
            .unwrap();
        assert_eq!(msg, "Goal with ID 'g1' successfully submitted.");

        let goals = queue.list_goals();
        assert_eq!(goals.len(), 1);
        assert_eq!(goals[0].status, GoalStatus::Pending);
        // Listing does not consume.
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn goal_with_empty_field_is_rejected() {
        let (queue, _) = queue_with(MockOracle::scripted(vec![]));
        let err = queue
            .submit_goal(GoalQueue::create_goal("", "go"))
            .unwrap_err();
        assert!(queue.is_empty());
        assert_eq!(
            err.to_string(),
            "Invalid goal submission: Ensure all required fields are properly formatted."
        );
    }

    #[test]
    fn json_with_missing_field_is_rejected() {
        let (queue, _) = queue_with(MockOracle::scripted(vec![]));
        let missing_reason = r#"{"id":"g1","request":"go","status":"pending"}"#;
        assert!(queue.submit_json(missing_reason).is_err());
        let bad_status = r#"{"id":"g1","request":"go","status":"maybe","reason":"x"}"#;
        assert!(queue.submit_json(bad_status).is_err());
        assert!(queue.is_empty());

        let ok = r#"{"id":"g2","request":"go","status":"pending","reason":"none"}"#;
        assert_eq!(
            queue.submit_json(ok).unwrap(),
            "Goal with ID 'g2' successfully submitted."
        );
    }

    #[test]
    fn empty_reason_is_accepted() {
        let (queue, _) = queue_with(MockOracle::scripted(vec![]));
        let raw = r#"{"id":"g3","request":"wave","status":"pending","reason":""}"#;
        assert_eq!(
            queue.submit_json(raw).unwrap(),
            "Goal with ID 'g3' successfully submitted."
        );
        assert_eq!(queue.list_goals()[0].reason, "");
    }

    #[test]
    fn goals_dequeue_in_fifo_order() {
        let (queue, _) = queue_with(MockOracle::scripted(vec![]));
        for id in ["a", "b", "c"] {
            queue.submit_goal(GoalQueue::create_goal(id, "x")).unwrap();
        }
        let order: Vec<String> = std::iter::from_fn(|| queue.get_next_goal())
            .map(|g| g.id)
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert!(queue.get_next_goal().is_none());
    }

    #[test]
    fn decision_matches_accept_substring() {
        let mut goal = GoalQueue::create_goal("g", "x");
        apply_decision(&mut goal, Some("ACCEPTED - sounds safe"));
        assert_eq!(goal.status, GoalStatus::Accepted);
        assert_eq!(goal.reason, "ACCEPTED - sounds safe");

        apply_decision(&mut goal, Some("denied, I cannot fly"));
        assert_eq!(goal.status, GoalStatus::Denied);

        apply_decision(&mut goal, None);
        assert_eq!(goal.status, GoalStatus::Denied);
        assert_eq!(goal.reason, FALLBACK_REASON);
    }

    #[tokio::test]
    async fn decide_goal_uses_oracle_reply() {
        let (queue, oracle) = queue_with(MockOracle::scripted(vec!["Accepted: kitchen is reachable"]));
        let mut goal = GoalQueue::create_goal("g1", "go to the kitchen");
        let (status, reason) = queue.decide_goal(&mut goal).await;
        assert_eq!(status, GoalStatus::Accepted);
        assert!(!reason.is_empty());
        assert_eq!(goal.status, GoalStatus::Accepted);

        let request = &oracle.requests()[0];
        assert_eq!(request.intent, "goal-decision");
        assert!(request.prompt_text().contains("Goal: go to the kitchen"));
    }

    #[tokio::test]
    async fn decide_goal_without_reply_denies() {
        let (queue, _) = queue_with(MockOracle::new(|_| Err(OracleError::Empty)));
        let mut goal = GoalQueue::create_goal("g1", "juggle");
        let (status, reason) = queue.decide_goal(&mut goal).await;
        assert_eq!(status, GoalStatus::Denied);
        assert_eq!(reason, FALLBACK_REASON);
    }

    #[tokio::test]
    async fn review_writes_decisions_back_in_place() {
        let (queue, _) = queue_with(MockOracle::new(|req| {
            if req.prompt_text().contains("kitchen") {
                Ok("accept".to_string())
            } else {
                Ok("deny: unsafe".to_string())
            }
        }));
        queue.submit_goal(GoalQueue::create_goal("g1", "go to the kitchen")).unwrap();
        queue.submit_goal(GoalQueue::create_goal("g2", "jump off the table")).unwrap();

        let decided = queue.review_pending().await;
        assert_eq!(decided.len(), 2);

        let goals = queue.list_goals();
        assert_eq!(goals[0].status, GoalStatus::Accepted);
        assert_eq!(goals[1].status, GoalStatus::Denied);
        assert_eq!(goals[1].reason, "deny: unsafe");

        // Nothing left to review.
        assert!(queue.review_pending().await.is_empty());
    }

    #[test]
    fn clear_empties_queue() {
        let (queue, _) = queue_with(MockOracle::scripted(vec![]));
        queue.submit_goal(GoalQueue::create_goal("a", "x")).unwrap();
        queue.submit_goal(GoalQueue::create_goal("b", "y")).unwrap();
        assert_eq!(queue.clear_goals(), 2);
        assert!(queue.is_empty());
    }
}
