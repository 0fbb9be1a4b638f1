use rand::{rngs::StdRng, Rng, SeedableRng};

pub const MIN_ROLL: u8 = 1;
pub const MAX_ROLL: u8 = 100;

#[derive(Debug, Clone)]
pub struct Dice {
    min: u8,
    max: u8,
    rng: StdRng,
}

impl Default for Dice {
    fn default() -> Self {
        Self::new(MIN_ROLL, MAX_ROLL, StdRng::from_os_rng())
    }
}

impl Dice {
    pub fn new(min: u8, max: u8, rng: StdRng) -> Self {
        assert!(min < max, "Minimum value must be less than maximum value");
        Self { min, max, rng }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(MIN_ROLL, MAX_ROLL, StdRng::seed_from_u64(seed))
    }

    pub fn roll(&mut self) -> u8 {
        let unit: f64 = self.rng.random();
        self.roll_from_unit(unit)
    }

    /// Maps a draw from `[0, 1)` onto `min..=max` as `floor(unit * range) + min`.
    ///
    /// A draw of `1.0` or more is capped at `max` rather than wrapped, and
    /// anything below zero (or NaN) lands on `min`.
    pub fn roll_from_unit(&self, unit: f64) -> u8 {
        let range = (self.max - self.min) as f64 + 1.0;
        if unit.is_nan() || unit < 0.0 {
            return self.min;
        }
        let offset = (unit * range).floor();
        if offset >= range {
            return self.max;
        }
        self.min + offset as u8
    }
}
