use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// Kinds of time-limited global events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    GeneratorSpeed,
    GeneratorUpgrade,
    MixedUp,
    DropMultiplier,
}

// Currently running global event as exposed by the event source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GlobalEvent {
    pub kind: EventKind,
    #[serde(default)]
    pub modifier: f64,
    /// Generator type ids exempted from this event.
    #[serde(default)]
    pub blacklist: HashSet<String>,
}

// The modifier one generator receives for one tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EventModifier {
    None,
    /// Interval reduction in percent of the interval.
    Speed { percent: f64 },
    /// Number of upgrade-chain steps to substitute.
    TierUpgrade { steps: u32 },
    MixedUp,
    /// Extra items added to every fired drop.
    DropMultiplier { extra: u32 },
}

impl EventModifier {
    pub fn resolve(event: Option<&GlobalEvent>, generator_id: &str) -> Self {
        let Some(event) = event else {
            return EventModifier::None;
        };
        if event.blacklist.contains(generator_id) {
            return EventModifier::None;
        }

        match event.kind {
            EventKind::GeneratorSpeed => EventModifier::Speed {
                percent: event.modifier.clamp(0.0, 100.0),
            },
            EventKind::GeneratorUpgrade => EventModifier::TierUpgrade {
                steps: event.modifier.max(0.0) as u32,
            },
            EventKind::MixedUp => EventModifier::MixedUp,
            EventKind::DropMultiplier => EventModifier::DropMultiplier {
                extra: event.modifier.max(1.0) as u32,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EventKind, modifier: f64, blacklist: &[&str]) -> GlobalEvent {
        GlobalEvent {
            kind,
            modifier,
            blacklist: blacklist.iter().map(|id| id.to_string()).collect(),
        }
    }

    #[test]
    fn when_no_event_is_active_then_modifier_is_none() {
        assert_eq!(EventModifier::resolve(None, "coal"), EventModifier::None);
    }

    #[test]
    fn when_generator_is_blacklisted_then_modifier_is_none() {
        let active = event(EventKind::DropMultiplier, 3.0, &["coal"]);

        assert_eq!(
            EventModifier::resolve(Some(&active), "coal"),
            EventModifier::None
        );
        assert_eq!(
            EventModifier::resolve(Some(&active), "iron"),
            EventModifier::DropMultiplier { extra: 3 }
        );
    }

    #[test]
    fn when_drop_multiplier_is_below_one_then_extra_is_one() {
        let active = event(EventKind::DropMultiplier, 0.0, &[]);

        assert_eq!(
            EventModifier::resolve(Some(&active), "coal"),
            EventModifier::DropMultiplier { extra: 1 }
        );
    }

    #[test]
    fn when_event_kind_is_decoded_then_snake_case_is_accepted() {
        let decoded: GlobalEvent =
            serde_json::from_str(r#"{"kind":"generator_upgrade","modifier":2}"#)
                .expect("expected event to decode");

        assert_eq!(
            EventModifier::resolve(Some(&decoded), "coal"),
            EventModifier::TierUpgrade { steps: 2 }
        );
    }
}
