/// 액터 인스턴스 상태 기계
///
/// ```text
/// Idle → Running → Executing → Evaluating → Waiting → Running ...
///          ↓                        ↓           ↓
///      Terminated               Terminated  Terminated
/// ```
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifecycle {
    Idle,
    Running,
    Executing,
    Evaluating,
    Waiting,
    Terminated,
}

impl Lifecycle {
    pub fn can_transition_to(&self, next: Lifecycle) -> bool {
        use Lifecycle::*;
        matches!(
            (self, next),
            (Idle, Running)
                | (Idle, Terminated)
                | (Running, Executing)
                | (Running, Terminated)
                | (Executing, Evaluating)
                | (Evaluating, Waiting)
                | (Evaluating, Terminated)
                | (Waiting, Running)
                | (Waiting, Terminated)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Lifecycle::Terminated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executing_always_goes_through_evaluating() {
        assert!(Lifecycle::Executing.can_transition_to(Lifecycle::Evaluating));
        assert!(!Lifecycle::Executing.can_transition_to(Lifecycle::Terminated));
        assert!(!Lifecycle::Executing.can_transition_to(Lifecycle::Waiting));
    }

    #[test]
    fn terminated_is_final() {
        for next in [
            Lifecycle::Idle,
            Lifecycle::Running,
            Lifecycle::Executing,
            Lifecycle::Evaluating,
            Lifecycle::Waiting,
        ] {
            assert!(!Lifecycle::Terminated.can_transition_to(next));
        }
        assert!(Lifecycle::Terminated.is_terminal());
    }
}
