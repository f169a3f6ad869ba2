//! Seeded random-walk price series used when no real quotes are available.

use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const FLOOR_PRICE: f64 = 10.0;
const STEP_SCALE: f64 = 5.0;
const STEP_BIAS: f64 = 0.48;

/// Generates `points` daily closes ending the day before `end`.
///
/// The start price is drawn from `[100, 200)`; each following close moves by
/// `(u - 0.48) * 5` for a uniform `u` and never drops below 10. The same
/// `seed` always produces the same series.
pub fn random_walk(points: usize, seed: u64, end: NaiveDate) -> (Vec<NaiveDate>, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut dates = Vec::with_capacity(points);
    let mut closes: Vec<f64> = Vec::with_capacity(points);

    for i in 0..points {
        dates.push(end - Duration::days((points - i) as i64));
        let close = match closes.last() {
            None => 100.0 + rng.gen_range(0.0..1.0) * 100.0,
            Some(prev) => {
                let change = (rng.gen_range(0.0..1.0) - STEP_BIAS) * STEP_SCALE;
                (prev + change).max(FLOOR_PRICE)
            }
        };
        closes.push(close);
    }

    (dates, closes)
}

/// A fresh seed for callers that do not supply one.
pub fn random_seed() -> u64 {
    rand::thread_rng().r#gen()
}
