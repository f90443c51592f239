//! Reduce a walking session to one connectivity verdict per driver pin.
//!
//! Each step of a session records what moved on the EXTEST device (the drivers) and what moved on
//! the SAMPLE device (the observers).  An observer is credited to a driver when it moved in the
//! same direction during the same step.  A real wire is credited exactly twice, once in each
//! walk, and both times to the same observer.
use core::fmt;
use std::collections::HashMap;

use serde::Serialize;

use crate::diff::Attribution;

/// What one walking step changed
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub driver: Vec<Attribution>,
    pub observed: Vec<Attribution>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    steps: Vec<StepRecord>,
}

impl SessionSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: StepRecord) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    /// Remove and return every recorded step, leaving the summary empty
    pub fn take(&mut self) -> Vec<StepRecord> {
        core::mem::take(&mut self.steps)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "pin", rename_all = "snake_case")]
pub enum Verdict {
    Connected(String),
    Partial,
    Interference,
    NotConnected,
}

impl Verdict {
    pub fn from_matches(matches: &[String]) -> Self {
        match matches {
            [a, b] if a == b => Verdict::Connected(a.clone()),
            [_] => Verdict::Partial,
            m if m.len() > 2 => Verdict::Interference,
            _ => Verdict::NotConnected,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Connected(pin) => f.write_str(pin),
            Verdict::Partial => f.write_str("Partial"),
            Verdict::Interference => f.write_str("Interference"),
            Verdict::NotConnected => f.write_str("Not connected"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PinVerdict {
    pub driver_pin: String,
    /// Observers credited to this driver, in the order they were seen
    pub matches: Vec<String>,
    pub verdict: Verdict,
}

/// Verdicts in the order driver pins first appeared in the session
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConnectivityReport {
    pins: Vec<PinVerdict>,
}

impl ConnectivityReport {
    pub fn get(&self, driver_pin: &str) -> Option<&Verdict> {
        self.pins
            .iter()
            .find(|p| p.driver_pin == driver_pin)
            .map(|p| &p.verdict)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PinVerdict> {
        self.pins.iter()
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}

impl fmt::Display for ConnectivityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pin in &self.pins {
            writeln!(f, "{} => {}", pin.driver_pin, pin.verdict)?;
        }
        Ok(())
    }
}

pub fn classify_steps(steps: &[StepRecord]) -> ConnectivityReport {
    let mut order: Vec<(String, Vec<String>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for step in steps {
        for driver in &step.driver {
            let slot = *index.entry(driver.pin_name.clone()).or_insert_with(|| {
                order.push((driver.pin_name.clone(), Vec::new()));
                order.len() - 1
            });
            let matched = step
                .observed
                .iter()
                .filter(|o| o.transition == driver.transition)
                .map(|o| o.pin_name.clone());
            order[slot].1.extend(matched);
        }
    }

    ConnectivityReport {
        pins: order
            .into_iter()
            .map(|(driver_pin, matches)| PinVerdict {
                verdict: Verdict::from_matches(&matches),
                driver_pin,
                matches,
            })
            .collect(),
    }
}

/// Classify the session and clear it
pub fn classify(summary: &mut SessionSummary) -> ConnectivityReport {
    classify_steps(&summary.take())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::Transition;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn at(pin: &str, transition: Transition) -> Attribution {
        Attribution {
            pin_name: pin.to_string(),
            transition,
        }
    }

    #[test]
    fn verdict_table() {
        assert_eq!(
            Verdict::from_matches(&names(&["S1", "S1"])),
            Verdict::Connected("S1".into())
        );
        assert_eq!(
            Verdict::from_matches(&names(&["S1", "S2"])),
            Verdict::NotConnected
        );
        assert_eq!(Verdict::from_matches(&names(&["S1"])), Verdict::Partial);
        assert_eq!(
            Verdict::from_matches(&names(&["S1", "S2", "S3"])),
            Verdict::Interference
        );
        assert_eq!(Verdict::from_matches(&[]), Verdict::NotConnected);
    }

    #[test]
    fn two_pass_match_is_connected() {
        let steps = vec![
            // walking zeros
            StepRecord {
                driver: vec![at("P1", Transition::Falling)],
                observed: vec![at("S1", Transition::Falling)],
            },
            // walking ones
            StepRecord {
                driver: vec![at("P1", Transition::Rising)],
                observed: vec![at("S1", Transition::Rising)],
            },
        ];
        let report = classify_steps(&steps);
        assert_eq!(report.get("P1"), Some(&Verdict::Connected("S1".into())));
    }

    #[test]
    fn opposite_direction_does_not_match() {
        let steps = vec![StepRecord {
            driver: vec![at("P1", Transition::Falling)],
            observed: vec![at("S1", Transition::Rising), at("S2", Transition::Falling)],
        }];
        let report = classify_steps(&steps);
        let p1 = report.iter().next().unwrap();
        assert_eq!(p1.matches, names(&["S2"]));
        assert_eq!(p1.verdict, Verdict::Partial);
    }

    #[test]
    fn unmatched_driver_is_still_reported() {
        let steps = vec![
            StepRecord {
                driver: vec![at("P2", Transition::Falling)],
                observed: vec![],
            },
            StepRecord {
                driver: vec![at("P1", Transition::Falling)],
                observed: vec![at("S1", Transition::Falling)],
            },
        ];
        let report = classify_steps(&steps);
        let order: Vec<&str> = report.iter().map(|p| p.driver_pin.as_str()).collect();
        assert_eq!(order, vec!["P2", "P1"]);
        assert_eq!(report.get("P2"), Some(&Verdict::NotConnected));
    }

    #[test]
    fn classify_clears_summary() {
        let mut summary = SessionSummary::new();
        summary.push(StepRecord {
            driver: vec![at("P1", Transition::Falling)],
            observed: vec![
                at("S1", Transition::Falling),
                at("S2", Transition::Falling),
                at("S3", Transition::Falling),
            ],
        });
        let report = classify(&mut summary);
        assert!(summary.is_empty());
        assert_eq!(report.get("P1"), Some(&Verdict::Interference));
        assert_eq!(report.to_string(), "P1 => Interference\n");
    }
}
