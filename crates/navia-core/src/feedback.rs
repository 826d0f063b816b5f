//! Spoken obstacle guidance.
//!
//! One cycle's [`ZoneTally`] maps to at most one [`Guidance`] through an
//! ordered rule table: the first rule whose condition holds wins and the rest
//! are not consulted.

use crate::zones::ZoneTally;
use serde::Serialize;
use std::fmt;

/// A single obstacle utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Guidance {
    Ahead { labels: String },
    Left { labels: String },
    Right { labels: String },
    BothSides { left: String, right: String },
}

impl fmt::Display for Guidance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guidance::Ahead { labels } => write!(f, "Obstacle ahead: {labels}. Please stop."),
            Guidance::Left { labels } => write!(f, "Obstacle on the left: {labels}. Move right."),
            Guidance::Right { labels } => write!(f, "Obstacle on the right: {labels}. Move left."),
            Guidance::BothSides { left, right } => write!(
                f,
                "Obstacles on both sides. Left: {left}. Right: {right}. Proceed with caution."
            ),
        }
    }
}

/// One entry of the priority table.
struct Rule {
    name: &'static str,
    applies: fn(&ZoneTally) -> bool,
    utter: fn(&ZoneTally) -> Guidance,
}

/// Priority order. Center always overrides the sides.
const RULES: [Rule; 4] = [
    Rule {
        name: "ahead",
        applies: |t| t.center.count > 0,
        utter: |t| Guidance::Ahead {
            labels: t.center.spoken_labels(),
        },
    },
    Rule {
        name: "left",
        applies: |t| t.left.count > 0 && t.right.count == 0,
        utter: |t| Guidance::Left {
            labels: t.left.spoken_labels(),
        },
    },
    Rule {
        name: "right",
        applies: |t| t.right.count > 0 && t.left.count == 0,
        utter: |t| Guidance::Right {
            labels: t.right.spoken_labels(),
        },
    },
    Rule {
        name: "both_sides",
        applies: |t| t.left.count > 0 && t.right.count > 0,
        utter: |t| Guidance::BothSides {
            left: t.left.spoken_labels(),
            right: t.right.spoken_labels(),
        },
    },
];

/// Choose the guidance for one cycle, or `None` when every zone is clear.
pub fn decide(tally: &ZoneTally) -> Option<Guidance> {
    let rule = RULES.iter().find(|rule| (rule.applies)(tally))?;
    tracing::debug!(rule = rule.name, "feedback rule fired");
    Some((rule.utter)(tally))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zones::ZoneSummary;

    fn summary(count: usize, labels: &[&str]) -> ZoneSummary {
        ZoneSummary {
            count,
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    fn tally(left: ZoneSummary, center: ZoneSummary, right: ZoneSummary) -> ZoneTally {
        ZoneTally { left, center, right }
    }

    #[test]
    fn test_center_overrides_sides() {
        let t = tally(
            summary(3, &["chair", "bench"]),
            summary(2, &["person"]),
            ZoneSummary::default(),
        );
        let guidance = decide(&t).unwrap();
        assert_eq!(
            guidance,
            Guidance::Ahead {
                labels: "person".into()
            }
        );
        assert_eq!(guidance.to_string(), "Obstacle ahead: person. Please stop.");
    }

    #[test]
    fn test_left_only() {
        let t = tally(summary(1, &["chair"]), ZoneSummary::default(), ZoneSummary::default());
        assert_eq!(
            decide(&t).unwrap().to_string(),
            "Obstacle on the left: chair. Move right."
        );
    }

    #[test]
    fn test_right_only() {
        let t = tally(ZoneSummary::default(), ZoneSummary::default(), summary(2, &["door", "bin"]));
        assert_eq!(
            decide(&t).unwrap().to_string(),
            "Obstacle on the right: door, bin. Move left."
        );
    }

    #[test]
    fn test_both_sides_without_center() {
        let t = tally(summary(1, &["chair"]), ZoneSummary::default(), summary(1, &["door"]));
        let guidance = decide(&t).unwrap();
        assert!(matches!(guidance, Guidance::BothSides { .. }));
        assert_eq!(
            guidance.to_string(),
            "Obstacles on both sides. Left: chair. Right: door. Proceed with caution."
        );
    }

    #[test]
    fn test_all_clear_is_silent() {
        assert_eq!(decide(&ZoneTally::default()), None);
    }

    #[test]
    fn test_center_with_both_sides_is_still_ahead() {
        let t = tally(summary(1, &["chair"]), summary(1, &["table"]), summary(1, &["door"]));
        assert!(matches!(decide(&t), Some(Guidance::Ahead { .. })));
    }
}
