use crate::types::{ChaosEvent, Compound};

/// Confidence used when already on wet-weather tyres in the rain; the
/// simulation only models the cost of being on the wrong tyre.
pub const WET_ON_WET_CONFIDENCE: u8 = 85;
pub const SAFETY_CAR_BOOST: u8 = 15;
pub const SAFETY_CAR_CAP: u8 = 95;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advice {
    pub win_probability: u8,
    pub recommendation: String,
}

impl Advice {
    fn new(win_probability: u8, recommendation: impl Into<String>) -> Self {
        Self {
            win_probability: win_probability.min(100),
            recommendation: recommendation.into(),
        }
    }
}

/// Pit wall call for an event. Every event maps to exactly one row.
pub fn advise(event: &ChaosEvent, compound: Compound, computed_wp: u8) -> Advice {
    let wp = computed_wp.min(100);
    match event {
        ChaosEvent::Rain if compound.is_dry() => Advice::new(
            wp,
            format!("Box for Intermediates immediately! Losing 15s/lap on {}s.", compound),
        ),
        ChaosEvent::Rain => Advice::new(
            WET_ON_WET_CONFIDENCE,
            format!("Stay out, {} is right for these conditions.", compound),
        ),
        ChaosEvent::TyreFailure => {
            Advice::new(wp, "Box box box! Sudden puncture, change tyres now!")
        }
        ChaosEvent::MajorCrash => Advice::new(
            wp.saturating_add(SAFETY_CAR_BOOST).min(SAFETY_CAR_CAP),
            "Safety car deployed! Box for fresh tires.",
        ),
        ChaosEvent::MinorCrash => {
            Advice::new(wp, "VSC deployed. Maintain positive delta. Cheap pit window.")
        }
        ChaosEvent::Heatwave => Advice::new(
            wp,
            "Track temps soaring. Tyre deg doubled. Box early for Hards.",
        ),
        ChaosEvent::TyreDeg => Advice::new(wp, "Tyres dropped off. Revert to Plan B, stop now."),
        ChaosEvent::Penalty5s => Advice::new(
            wp,
            "5-second penalty. Push hard, build gap to cars behind.",
        ),
        ChaosEvent::Traffic => Advice::new(wp, "DRS train. Consider undercut for clean air."),
        ChaosEvent::None | ChaosEvent::StrategyUpdate | ChaosEvent::Other(_) => {
            if compound.is_dry() {
                Advice::new(wp, format!("Pace nominal on {}s. Maintain strategy.", compound))
            } else {
                Advice::new(wp, "Box for slicks! Track is dry.")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENTS: [&str; 11] = [
        "none",
        "rain",
        "minor_crash",
        "major_crash",
        "tyre_failure",
        "tyre_deg",
        "heatwave",
        "traffic",
        "penalty_5s",
        "strategy_update",
        "meteor",
    ];

    #[test]
    fn rain_splits_on_compound() {
        for c in [Compound::Soft, Compound::Medium, Compound::Hard] {
            let a = advise(&ChaosEvent::Rain, c, 3);
            assert_eq!(a.win_probability, 3);
            assert_eq!(
                a.recommendation,
                format!("Box for Intermediates immediately! Losing 15s/lap on {}s.", c)
            );
        }
        for c in [Compound::Intermediate, Compound::Wet] {
            for wp in [0, 40, 100] {
                let a = advise(&ChaosEvent::Rain, c, wp);
                assert_eq!(a.win_probability, 85);
                assert!(a.recommendation.starts_with("Stay out"));
            }
        }
    }

    #[test]
    fn safety_car_boost_and_cap() {
        assert_eq!(advise(&ChaosEvent::MajorCrash, Compound::Medium, 0).win_probability, 15);
        assert_eq!(advise(&ChaosEvent::MajorCrash, Compound::Medium, 79).win_probability, 94);
        assert_eq!(advise(&ChaosEvent::MajorCrash, Compound::Medium, 80).win_probability, 95);
        assert_eq!(advise(&ChaosEvent::MajorCrash, Compound::Medium, 100).win_probability, 95);
    }

    #[test]
    fn minor_crash_passes_probability_through() {
        let a = advise(&ChaosEvent::MinorCrash, Compound::Medium, 37);
        assert_eq!(a.win_probability, 37);
        assert_eq!(a.recommendation, "VSC deployed. Maintain positive delta. Cheap pit window.");
    }

    #[test]
    fn nominal_rows_depend_on_compound() {
        let a = advise(&ChaosEvent::None, Compound::Hard, 50);
        assert_eq!(a.recommendation, "Pace nominal on HARDs. Maintain strategy.");
        let a = advise(&ChaosEvent::Other("meteor".into()), Compound::Wet, 50);
        assert_eq!(a.recommendation, "Box for slicks! Track is dry.");
        let a = advise(&ChaosEvent::StrategyUpdate, Compound::Intermediate, 12);
        assert_eq!(a.recommendation, "Box for slicks! Track is dry.");
        assert_eq!(a.win_probability, 12);
    }

    #[test]
    fn table_is_total_and_bounded() {
        for tag in EVENTS {
            let event = ChaosEvent::parse(tag);
            for c in Compound::ALL {
                for wp in [0u8, 1, 50, 99, 100, 255] {
                    let a = advise(&event, c, wp);
                    assert!(a.win_probability <= 100, "{tag} {c} {wp}");
                    assert!(!a.recommendation.is_empty());
                }
            }
        }
    }
}
