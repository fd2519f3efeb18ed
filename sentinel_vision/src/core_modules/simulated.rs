// THEORY:
// The simulated classifier stands in for a trained model. Each window costs
// two rolls in `[0, 1)`: the first decides whether the window is a candidate
// hit (30% of the time), the second places the confidence inside the hit band
// `[0.82, 0.98)` or the miss band `[0.10, 0.40)`.
//
// Rolls come from an injected `RollSource`, never from a global generator, so
// a seed (or a literal script of rolls) reproduces a run exactly.

use crate::core_modules::classifier::{ClassificationResult, Classifier};
use crate::core_modules::frame::Window;
use crate::incident::Confidence;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

pub const HIT_PROBABILITY: f64 = 0.3;
pub const HIT_CONFIDENCE: (f64, f64) = (0.82, 0.98);
pub const MISS_CONFIDENCE: (f64, f64) = (0.10, 0.40);

/// A source of uniform values in `[0, 1)`.
pub trait RollSource: Send {
    fn roll(&mut self) -> f64;
}

/// Adapts any `rand` generator.
pub struct RngRolls<R>(pub R);

impl<R: Rng + Send> RollSource for RngRolls<R> {
    fn roll(&mut self) -> f64 {
        self.0.random::<f64>()
    }
}

/// Replays a fixed list of rolls, then repeats `fallback` forever.
pub struct ScriptedRolls {
    rolls: VecDeque<f64>,
    fallback: f64,
}

impl ScriptedRolls {
    pub fn new(rolls: impl IntoIterator<Item = f64>) -> Self {
        Self { rolls: rolls.into_iter().collect(), fallback: 0.0 }
    }

    pub fn with_fallback(mut self, fallback: f64) -> Self {
        self.fallback = fallback;
        self
    }

    /// Rolls that make the `n`th classification (1-based) of a run hit or
    /// miss. `hits` lists the 1-based call indices that should hit, each with
    /// the confidence position inside the hit band.
    pub fn for_calls(calls: usize, hits: &[(usize, f64)]) -> Self {
        let mut rolls = Vec::with_capacity(calls * 2);
        for call in 1..=calls {
            match hits.iter().find(|(index, _)| *index == call) {
                Some((_, position)) => rolls.extend([0.95, *position]),
                None => rolls.extend([0.05, 0.5]),
            }
        }
        Self::new(rolls)
    }
}

impl RollSource for ScriptedRolls {
    fn roll(&mut self) -> f64 {
        self.rolls.pop_front().unwrap_or(self.fallback)
    }
}

pub struct SimulatedClassifier {
    rolls: Box<dyn RollSource>,
}

impl SimulatedClassifier {
    pub fn new(rolls: Box<dyn RollSource>) -> Self {
        Self { rolls }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(Box::new(RngRolls(StdRng::seed_from_u64(seed))))
    }

    pub fn from_entropy() -> Self {
        Self::new(Box::new(RngRolls(StdRng::from_os_rng())))
    }

    fn uniform(&mut self, (low, high): (f64, f64)) -> f64 {
        low + (high - low) * self.rolls.roll()
    }
}

impl Classifier for SimulatedClassifier {
    fn classify(&mut self, _window: &Window<'_>, threshold: Confidence) -> ClassificationResult {
        let hit = self.rolls.roll() > 1.0 - HIT_PROBABILITY;
        let band = if hit { HIT_CONFIDENCE } else { MISS_CONFIDENCE };
        let confidence = self.uniform(band) as Confidence;
        ClassificationResult::new(hit && confidence > threshold, confidence)
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
