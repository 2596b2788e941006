//! Route scoring
//!
//! Lower scores are better. The baseline score is
//! `latency_ms * cost_weight / signal_quality`, so a link cannot buy back
//! arbitrarily poor signal with low cost. Cognizant messages that have
//! learned transport preferences are scored in learned mode: each recorded
//! success on the link's transport discounts the score by a fixed step (down
//! to a floor), and a failure against the same neighbor within the recency
//! window doubles it.

use std::time::Duration;
use tracing::debug;
use wandermesh_protocol::{LearningRecord, Message};

use crate::route_table::{Link, RouteTable};
use crate::DEFAULT_FAILURE_WINDOW_SECS;

/// Scoring parameters
#[derive(Debug, Clone)]
pub struct ScorerConfig {
    /// Discount per recorded success on a transport kind
    pub learning_step: f64,
    /// Largest total discount (0.5 = score never drops below half the baseline)
    pub max_discount: f64,
    /// Multiplier for links whose neighbor failed recently
    pub failure_penalty: f64,
    /// How long a failure keeps penalizing a neighbor
    pub failure_window: Duration,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            learning_step: 0.1,
            max_discount: 0.5,
            failure_penalty: 2.0,
            failure_window: Duration::from_secs(DEFAULT_FAILURE_WINDOW_SECS),
        }
    }
}

/// Which scoring formula applied to a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringMode {
    /// Topology-only
    Baseline,
    /// Baseline adjusted by the message's learning record
    Learned,
}

impl ScoringMode {
    /// Mode for a message: learned only when cognizant with learned preferences
    pub fn for_message(message: &Message) -> Self {
        if message.uses_learning() {
            ScoringMode::Learned
        } else {
            ScoringMode::Baseline
        }
    }
}

/// A selected link and its final score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredLink {
    pub link: Link,
    pub score: f64,
    pub mode: ScoringMode,
}

/// Route scorer
#[derive(Debug, Clone, Default)]
pub struct RouteScorer {
    config: ScorerConfig,
}

impl RouteScorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// Topology-only score
    pub fn baseline_score(link: &Link) -> f64 {
        (link.latency_ms * link.cost_weight) / link.signal_quality
    }

    /// Multiplier applied for `successes` recorded on a transport kind
    pub fn learning_factor(&self, successes: u32) -> f64 {
        let floor = 1.0 - self.config.max_discount;
        (1.0 - self.config.learning_step * successes as f64).max(floor)
    }

    /// Learned score: bounded discount for past successes, then recent-failure penalty
    pub fn learned_score(&self, link: &Link, learning: &LearningRecord, now_ms: u64) -> f64 {
        let preference = learning.preference(link.transport);
        let mut score = Self::baseline_score(link) * self.learning_factor(preference);

        let window_ms = self.config.failure_window.as_millis() as u64;
        if learning.failed_recently(&link.neighbor, now_ms, window_ms) {
            score *= self.config.failure_penalty;
        }

        score
    }

    /// Score a link for a message using the message's scoring mode
    pub fn score(&self, link: &Link, message: &Message, now_ms: u64) -> f64 {
        match ScoringMode::for_message(message) {
            ScoringMode::Baseline => Self::baseline_score(link),
            ScoringMode::Learned => self.learned_score(link, &message.learning, now_ms),
        }
    }

    /// Pick the available link with the lowest score
    ///
    /// Ties keep the first link in table order. `None` means no candidate,
    /// which is an environmental condition rather than an error.
    pub fn select(&self, table: &RouteTable, message: &Message, now_ms: u64) -> Option<ScoredLink> {
        let mode = ScoringMode::for_message(message);
        let mut best: Option<(&Link, f64)> = None;

        for link in table.available_links() {
            let score = self.score(link, message, now_ms);
            match best {
                Some((_, best_score)) if score >= best_score => {}
                _ => best = Some((link, score)),
            }
        }

        best.map(|(link, score)| {
            debug!(
                "Message {} scored {} via {} at {:.2} ({:?})",
                message.id, link.neighbor, link.transport, score, mode
            );
            ScoredLink {
                link: link.clone(),
                score,
                mode,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wandermesh_protocol::{NodeId, RouteObservation, TransportKind};

    const NOW: u64 = 1_000_000;

    fn link(neighbor: &str, kind: TransportKind, signal: f64, latency: f64, cost: f64) -> Link {
        Link::new(NodeId::from(neighbor), kind, signal, latency, cost).unwrap()
    }

    fn message() -> Message {
        Message::new(NodeId::from("A"), NodeId::from("Z"), "payload")
    }

    fn failure(neighbor: &str, kind: TransportKind, at: u64) -> RouteObservation {
        RouteObservation {
            transport: kind,
            next_hop: NodeId::from(neighbor),
            signal_quality: 0.5,
            latency_ms: 100.0,
            observed_at_ms: at,
        }
    }

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_baseline_score() {
        let l = link("b", TransportKind::Wifi, 0.5, 100.0, 1.0);
        assert!(approx_eq(RouteScorer::baseline_score(&l), 200.0));
    }

    #[test]
    fn test_picks_lowest_score() {
        let mut table = RouteTable::new();
        table.insert(link("strong", TransportKind::Wifi, 0.9, 50.0, 1.0));
        table.insert(link("weak", TransportKind::Wifi, 0.2, 50.0, 1.0));

        let scorer = RouteScorer::default();
        let chosen = scorer.select(&table, &message(), NOW).unwrap();

        assert_eq!(chosen.link.neighbor, NodeId::from("strong"));
        assert!((chosen.score - 55.555).abs() < 0.01);
        assert_eq!(chosen.mode, ScoringMode::Baseline);

        let weak = table.get_link(&NodeId::from("weak"), TransportKind::Wifi).unwrap();
        assert!(approx_eq(RouteScorer::baseline_score(weak), 250.0));
    }

    #[test]
    fn test_never_selects_unavailable() {
        let mut table = RouteTable::new();
        table.insert(link("best", TransportKind::Wifi, 1.0, 1.0, 1.0));
        table.insert(link("worse", TransportKind::Wifi, 0.1, 900.0, 2.0));
        table.mark_unavailable(&NodeId::from("best"), TransportKind::Wifi);

        let scorer = RouteScorer::default();
        let chosen = scorer.select(&table, &message(), NOW).unwrap();
        assert_eq!(chosen.link.neighbor, NodeId::from("worse"));

        table.mark_unavailable(&NodeId::from("worse"), TransportKind::Wifi);
        assert!(scorer.select(&table, &message(), NOW).is_none());
    }

    #[test]
    fn test_empty_table_has_no_candidate() {
        let scorer = RouteScorer::default();
        assert!(scorer.select(&RouteTable::new(), &message(), NOW).is_none());
    }

    #[test]
    fn test_ties_keep_first_seen() {
        let mut table = RouteTable::new();
        table.insert(link("first", TransportKind::Wifi, 0.5, 10.0, 1.0));
        table.insert(link("second", TransportKind::LoRa, 0.5, 10.0, 1.0));

        let scorer = RouteScorer::default();
        for _ in 0..10 {
            let chosen = scorer.select(&table, &message(), NOW).unwrap();
            assert_eq!(chosen.link.neighbor, NodeId::from("first"));
        }
    }

    #[test]
    fn test_learning_factor_is_bounded() {
        let scorer = RouteScorer::default();
        assert!(approx_eq(scorer.learning_factor(0), 1.0));
        assert!(approx_eq(scorer.learning_factor(3), 0.7));
        assert!(approx_eq(scorer.learning_factor(5), 0.5));
        assert!(approx_eq(scorer.learning_factor(50), 0.5));
        assert!(approx_eq(scorer.learning_factor(u32::MAX), 0.5));
    }

    #[test]
    fn test_learned_score_never_below_half_baseline() {
        let scorer = RouteScorer::default();
        let l = link("b", TransportKind::Wifi, 0.7, 120.0, 1.5);
        let baseline = RouteScorer::baseline_score(&l);

        for count in [0u32, 1, 2, 4, 5, 6, 10, 1000] {
            let mut learning = LearningRecord::new();
            learning.preferences.insert(TransportKind::Wifi, count);
            let learned = scorer.learned_score(&l, &learning, NOW);
            assert!(learned >= 0.5 * baseline - 1e-9, "count {}", count);
        }
    }

    #[test]
    fn test_discount_then_recent_failure_penalty() {
        let scorer = RouteScorer::default();
        let mut table = RouteTable::new();
        table.insert(link("b", TransportKind::Wifi, 0.5, 100.0, 1.0));

        let mut msg = message();
        msg.learning.preferences.insert(TransportKind::Wifi, 3);
        msg.learning
            .record_failure(failure("b", TransportKind::Wifi, NOW - 10_000));

        let chosen = scorer.select(&table, &msg, NOW).unwrap();
        assert_eq!(chosen.mode, ScoringMode::Learned);
        assert!(approx_eq(chosen.score, 200.0 * 0.7 * 2.0));
    }

    #[test]
    fn test_old_failure_is_not_penalized() {
        let scorer = RouteScorer::default();
        let l = link("b", TransportKind::Wifi, 0.5, 100.0, 1.0);

        let mut learning = LearningRecord::new();
        learning.preferences.insert(TransportKind::Wifi, 1);
        learning.record_failure(failure("b", TransportKind::Wifi, NOW - 61_000));

        assert!(approx_eq(scorer.learned_score(&l, &learning, NOW), 200.0 * 0.9));
    }

    #[test]
    fn test_learning_steers_toward_successful_transport() {
        let scorer = RouteScorer::default();
        let mut table = RouteTable::new();
        table.insert(link("wifi-peer", TransportKind::Wifi, 0.5, 100.0, 1.0)); // 200
        table.insert(link("lora-peer", TransportKind::LoRa, 0.5, 70.0, 2.0)); // 280

        let mut msg = message();
        assert_eq!(
            scorer.select(&table, &msg, NOW).unwrap().link.neighbor,
            NodeId::from("wifi-peer")
        );

        // LoRa at 50% discount (140) beats unpreferred WiFi (200)
        msg.learning.preferences.insert(TransportKind::LoRa, 5);
        assert_eq!(
            scorer.select(&table, &msg, NOW).unwrap().link.neighbor,
            NodeId::from("lora-peer")
        );

        // Non-cognizant messages ignore what they learned
        let msg = msg.with_cognizant(false);
        let chosen = scorer.select(&table, &msg, NOW).unwrap();
        assert_eq!(chosen.link.neighbor, NodeId::from("wifi-peer"));
        assert_eq!(chosen.mode, ScoringMode::Baseline);
    }

    #[test]
    fn test_baseline_mode_ignores_failures() {
        // No preferences yet: failure log alone does not switch to learned mode
        let scorer = RouteScorer::default();
        let mut table = RouteTable::new();
        table.insert(link("b", TransportKind::Wifi, 0.5, 100.0, 1.0));

        let mut msg = message();
        msg.learning
            .record_failure(failure("b", TransportKind::Wifi, NOW - 1_000));

        let chosen = scorer.select(&table, &msg, NOW).unwrap();
        assert_eq!(chosen.mode, ScoringMode::Baseline);
        assert!(approx_eq(chosen.score, 200.0));
    }
}
