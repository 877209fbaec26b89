//! [`DetectionGenerator`] – fake object detections.
//!
//! Each call to [`DetectionGenerator::generate`]:
//!
//! 1. picks one of the six [`ObjectType`] labels uniformly at random,
//! 2. samples `x`, `y`, `z` independently and uniformly from
//!    `[0, position_range)` (3 m by default),
//! 3. sets the orientation to the identity quaternion,
//! 4. stamps the result in the `"map"` frame with the current wall-clock
//!    time, never going backwards relative to the previous detection.
//!
//! The generator is seeded once. [`DetectionGenerator::from_wall_clock`]
//! seeds from the sub-second nanoseconds of the clock, so runs differ;
//! [`DetectionGenerator::with_seed`] gives a reproducible sequence of labels
//! and positions.

use chrono::{DateTime, Utc};
use perceptor_types::{Detection, ObjectType, PerceptError, Pose, Quaternion, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Upper (exclusive) bound of every sampled position component, in metres.
pub const DEFAULT_POSITION_RANGE: f64 = 3.0;

/// Seeded source of random [`Detection`]s.
pub struct DetectionGenerator {
    rng: StdRng,
    seed: u64,
    position_range: f64,
    last_stamp: Option<DateTime<Utc>>,
}

impl DetectionGenerator {
    /// Deterministic generator for a given `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
            position_range: DEFAULT_POSITION_RANGE,
            last_stamp: None,
        }
    }

    /// Generator seeded from the current wall clock.
    pub fn from_wall_clock() -> Self {
        let seed = u64::from(Utc::now().timestamp_subsec_nanos());
        debug!(seed, "seeding detection generator from wall clock");
        Self::with_seed(seed)
    }

    /// Change the exclusive upper bound of sampled positions.
    ///
    /// # Errors
    ///
    /// [`PerceptError::Config`] unless `range` is finite and positive.
    pub fn with_position_range(mut self, range: f64) -> Result<Self, PerceptError> {
        if !range.is_finite() || range <= 0.0 {
            return Err(PerceptError::Config(format!(
                "position range must be finite and > 0, got {range}"
            )));
        }
        self.position_range = range;
        Ok(self)
    }

    /// The seed this generator was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn position_range(&self) -> f64 {
        self.position_range
    }

    /// Produce the next detection.
    pub fn generate(&mut self) -> Detection {
        let object_type = ObjectType::ALL[self.rng.gen_range(0..ObjectType::ALL.len())];
        let position = Vector3::new(
            self.sample_coordinate(),
            self.sample_coordinate(),
            self.sample_coordinate(),
        );
        let pose = Pose::new(position, Quaternion::identity());
        Detection::new(object_type, pose, self.next_stamp())
    }

    fn sample_coordinate(&mut self) -> f64 {
        self.rng.gen_range(0.0..self.position_range)
    }

    fn next_stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }
}

impl Iterator for DetectionGenerator {
    type Item = Detection;

    fn next(&mut self) -> Option<Detection> {
        Some(self.generate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn labels_are_roughly_uniform() {
        const SAMPLES: usize = 60_000;
        let mut counts: HashMap<ObjectType, usize> = HashMap::new();
        for d in DetectionGenerator::with_seed(7).take(SAMPLES) {
            *counts.entry(d.object_type).or_default() += 1;
        }

        assert_eq!(counts.len(), ObjectType::ALL.len(), "every label must appear");
        let expected = SAMPLES / ObjectType::ALL.len();
        for (label, count) in counts {
            let deviation = (count as f64 - expected as f64).abs() / expected as f64;
            assert!(deviation < 0.05, "{label} appeared {count} times, expected ~{expected}");
        }
    }

    #[test]
    fn positions_lie_in_half_open_range() {
        for d in DetectionGenerator::with_seed(11).take(10_000) {
            let p = d.pose.pose.position;
            for c in [p.x, p.y, p.z] {
                assert!((0.0..DEFAULT_POSITION_RANGE).contains(&c), "component {c} out of range");
            }
        }
    }

    #[test]
    fn orientation_is_always_identity() {
        for d in DetectionGenerator::with_seed(3).take(100) {
            assert_eq!(d.pose.pose.orientation, Quaternion::identity());
            assert_eq!(d.pose.header.frame_id, perceptor_types::MAP_FRAME);
        }
    }

    #[test]
    fn same_seed_gives_same_sequence() {
        let a: Vec<(ObjectType, Vector3)> = DetectionGenerator::with_seed(42)
            .take(50)
            .map(|d| (d.object_type, d.pose.pose.position))
            .collect();
        let b: Vec<(ObjectType, Vector3)> = DetectionGenerator::with_seed(42)
            .take(50)
            .map(|d| (d.object_type, d.pose.pose.position))
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn stamps_never_go_backwards() {
        let stamps: Vec<DateTime<Utc>> = DetectionGenerator::with_seed(1)
            .take(1_000)
            .map(|d| d.stamp())
            .collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn ids_are_unique() {
        let mut generator = DetectionGenerator::with_seed(5);
        let a = generator.generate();
        let b = generator.generate();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn custom_position_range_is_respected() {
        let generator = DetectionGenerator::with_seed(9)
            .with_position_range(0.5)
            .unwrap();
        assert_eq!(generator.position_range(), 0.5);
        for d in generator.take(1_000) {
            let p = d.pose.pose.position;
            assert!(p.x < 0.5 && p.y < 0.5 && p.z < 0.5);
        }
    }

    #[test]
    fn invalid_position_range_is_rejected() {
        assert!(DetectionGenerator::with_seed(0).with_position_range(0.0).is_err());
        assert!(DetectionGenerator::with_seed(0).with_position_range(-1.0).is_err());
        assert!(DetectionGenerator::with_seed(0).with_position_range(f64::NAN).is_err());
    }

    #[test]
    fn wall_clock_generator_works() {
        let mut generator = DetectionGenerator::from_wall_clock();
        let d = generator.generate();
        assert!(ObjectType::ALL.contains(&d.object_type));
    }
}
