use super::{Condition, GameEvent, RoundRecord};

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Condition::GreaterThan => write!(f, "more than"),
            Condition::LessThan => write!(f, "less than"),
        }
    }
}

impl std::fmt::Display for RoundRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Threshold: {} | Condition: {} | Roll: {} | {}",
            self.threshold,
            self.condition,
            self.roll,
            if self.won { "Win" } else { "Loss" }
        )
    }
}

impl std::fmt::Display for GameEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameEvent::ThresholdChanged { input } => {
                write!(f, "Threshold input set to {:?}", input)
            }
            GameEvent::ConditionChanged { condition } => {
                write!(f, "Condition set to {}", condition)
            }
            GameEvent::RoundStarted {
                threshold,
                condition,
            } => {
                write!(f, "Rolling for {} {}", condition, threshold)
            }
            GameEvent::RoundResolved { record } => {
                write!(f, "Round {} resolved: {}", record.id, record)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_line() {
        let record = RoundRecord::new(1, 50, Condition::LessThan, 50, 1);
        assert_eq!(
            record.to_string(),
            "Threshold: 50 | Condition: less than | Roll: 50 | Loss"
        );
    }
}
