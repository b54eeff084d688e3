use crate::llm::StopReason;

pub const DEFAULT_MAX_ROUNDS: u32 = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopDecision {
    Continue,
    Done,
    Aborted { reason: String },
}

/// Bounds the generate/execute cycle of one query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoopGuard {
    max_rounds: u32,
    rounds: u32,
}

impl Default for LoopGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ROUNDS)
    }
}

impl LoopGuard {
    pub fn new(max_rounds: u32) -> Self {
        Self { max_rounds: max_rounds.max(1), rounds: 0 }
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    /// Admits the next model round, or aborts once the cap is spent.
    pub fn begin_round(&mut self) -> LoopDecision {
        if self.rounds >= self.max_rounds {
            return LoopDecision::Aborted {
                reason: format!(
                    "model still requested tools after {} rounds",
                    self.max_rounds
                ),
            };
        }
        self.rounds += 1;
        LoopDecision::Continue
    }

    /// Classifies a finished model turn.
    pub fn assess(&self, stop_reason: &StopReason, tool_calls: usize) -> LoopDecision {
        if tool_calls == 0 || stop_reason.is_terminal() {
            LoopDecision::Done
        } else {
            LoopDecision::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LoopDecision, LoopGuard};
    use crate::llm::StopReason;

    #[test]
    fn admits_rounds_up_to_the_cap() {
        let mut guard = LoopGuard::new(2);
        assert_eq!(guard.begin_round(), LoopDecision::Continue);
        assert_eq!(guard.begin_round(), LoopDecision::Continue);

        let decision = guard.begin_round();
        assert!(matches!(decision, LoopDecision::Aborted { ref reason } if reason.contains("2 rounds")));
        assert_eq!(guard.rounds(), 2);
    }

    #[test]
    fn zero_cap_still_allows_one_round() {
        let mut guard = LoopGuard::new(0);
        assert_eq!(guard.max_rounds(), 1);
        assert_eq!(guard.begin_round(), LoopDecision::Continue);
    }

    #[test]
    fn terminal_stop_reason_ends_the_loop_even_with_tool_calls() {
        let guard = LoopGuard::default();
        assert_eq!(guard.assess(&StopReason::EndTurn, 2), LoopDecision::Done);
        assert_eq!(guard.assess(&StopReason::MaxTokens, 1), LoopDecision::Done);
    }

    #[test]
    fn tool_use_without_parsed_calls_ends_the_loop() {
        let guard = LoopGuard::default();
        assert_eq!(guard.assess(&StopReason::ToolUse, 0), LoopDecision::Done);
        assert_eq!(guard.assess(&StopReason::ToolUse, 3), LoopDecision::Continue);
    }
}
