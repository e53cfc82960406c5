use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::extract::{detect_control_intent, ControlIntent};

use super::states::{ActiveIntent, FilterState};

pub const DEFAULT_SHORT_FOLLOWUP_CHARS: usize = 25;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteReason {
    NoSession,
    OtherFlow,
    NotLocked,
    ControlPhrase(ControlIntent),
    ClassifierAgrees,
    ShortFollowUp,
    ClassifierWins,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub force_active_flow: bool,
    pub reason: RouteReason,
}

impl RouteDecision {
    fn keep(reason: RouteReason) -> Self {
        Self { force_active_flow: false, reason }
    }

    fn force(reason: RouteReason) -> Self {
        Self { force_active_flow: true, reason }
    }
}

/// Final routing for a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutedCategory {
    pub category: Category,
    pub classified: Category,
    pub decision: RouteDecision,
}

impl RoutedCategory {
    pub fn overridden(&self) -> bool {
        self.category != self.classified
    }
}

/// Keeps ambiguous follow-ups inside the flow that owns the conversation.
///
/// Errs towards forcing the active flow; a user leaves a flow by sending a
/// longer request the classifier places elsewhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IntentLockRouter {
    short_followup_chars: usize,
}

impl Default for IntentLockRouter {
    fn default() -> Self {
        Self::new(DEFAULT_SHORT_FOLLOWUP_CHARS)
    }
}

impl IntentLockRouter {
    pub fn new(short_followup_chars: usize) -> Self {
        Self { short_followup_chars }
    }

    pub fn short_followup_chars(&self) -> usize {
        self.short_followup_chars
    }

    pub fn should_force_active_flow(
        &self,
        existing: Option<&FilterState>,
        flow: ActiveIntent,
        user_text: &str,
        classified: Category,
    ) -> RouteDecision {
        let Some(state) = existing else {
            return RouteDecision::keep(RouteReason::NoSession);
        };
        if flow == ActiveIntent::None || state.active_intent != flow {
            return RouteDecision::keep(RouteReason::OtherFlow);
        }
        if !state.intent_locked {
            return RouteDecision::keep(RouteReason::NotLocked);
        }

        let control = detect_control_intent(user_text);
        if control.is_control() {
            return RouteDecision::force(RouteReason::ControlPhrase(control));
        }
        if flow.category() == Some(classified) {
            return RouteDecision::force(RouteReason::ClassifierAgrees);
        }
        if user_text.trim().chars().count() <= self.short_followup_chars {
            return RouteDecision::force(RouteReason::ShortFollowUp);
        }
        RouteDecision::keep(RouteReason::ClassifierWins)
    }

    /// Applies the lock of whichever flow owns `existing`, if any.
    pub fn route(
        &self,
        existing: Option<&FilterState>,
        user_text: &str,
        classified: Category,
    ) -> RoutedCategory {
        let flow = existing.map_or(ActiveIntent::None, |state| state.active_intent);
        let decision = self.should_force_active_flow(existing, flow, user_text, classified);
        let category = match (decision.force_active_flow, flow.category()) {
            (true, Some(owner)) => owner,
            _ => classified,
        };
        RoutedCategory { category, classified, decision }
    }
}
