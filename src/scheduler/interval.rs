//! Jittered wait between sessions.

use std::time::Duration;

use rand::Rng;

use crate::config::IntervalBounds;

/// Chooses the wait before the next session.
pub trait Jitter: Send + Sync {
    fn draw(&self, bounds: IntervalBounds) -> Duration;
}

/// Uniform whole seconds in `[min*60, max*60]`, both ends inclusive.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformJitter;

impl Jitter for UniformJitter {
    fn draw(&self, bounds: IntervalBounds) -> Duration {
        draw_interval(bounds, &mut rand::thread_rng())
    }
}

pub fn draw_interval<R: Rng + ?Sized>(bounds: IntervalBounds, rng: &mut R) -> Duration {
    Duration::from_secs(rng.gen_range(bounds.min_secs()..=bounds.max_secs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_draws_stay_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for (min, max) in [(10, 10), (10, 11), (60, 120), (15, 600)] {
            let bounds = IntervalBounds::new(min, max).unwrap();
            for _ in 0..2_000 {
                let secs = draw_interval(bounds, &mut rng).as_secs();
                assert!(
                    (min * 60..=max * 60).contains(&secs),
                    "{secs}s outside [{min}, {max}] minutes"
                );
            }
        }
    }

    #[test]
    fn test_both_ends_are_reachable() {
        let bounds = IntervalBounds::new(10, 11).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let draws: Vec<u64> = (0..5_000)
            .map(|_| draw_interval(bounds, &mut rng).as_secs())
            .collect();
        assert!(draws.contains(&600));
        assert!(draws.contains(&660));

        let fixed = IntervalBounds::new(10, 10).unwrap();
        assert_eq!(UniformJitter.draw(fixed), Duration::from_secs(600));
    }
}
