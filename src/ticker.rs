use std::time::Duration;

use crate::constants::DEFAULT_SPEED;
use crate::error::SimError;

/// Paces the scheduler's ticks.
///
/// Pausing only stops new ticks from being handed out; nothing about the
/// simulation state changes.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticker {
    base_interval: Duration,
    speed: f64,
    period: Duration,
    paused: bool,
}

impl Ticker {
    /// Starts paused at normal speed
    pub fn new(base_interval: Duration) -> Self {
        Ticker { base_interval, speed: DEFAULT_SPEED, period: base_interval, paused: true }
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    #[inline]
    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Rejects multipliers whose period would not fit in a `Duration`
    pub fn set_speed(&mut self, multiplier: f64) -> Result<(), SimError> {
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(SimError::InvalidSpeed(multiplier));
        }
        let period = Duration::try_from_secs_f64(self.base_interval.as_secs_f64() / multiplier)
            .map_err(|_| SimError::InvalidSpeed(multiplier))?;
        self.speed = multiplier;
        self.period = period;
        Ok(())
    }

    /// Time between ticks at the current speed
    #[inline]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Delay before the next tick, or `None` while paused
    pub fn next_delay(&self) -> Option<Duration> {
        (!self.paused).then(|| self.period())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_paused() {
        let ticker = Ticker::new(Duration::from_millis(1000));
        assert!(ticker.is_paused());
        assert_eq!(ticker.next_delay(), None);
    }

    #[test]
    fn test_period_scales_with_speed() {
        let mut ticker = Ticker::new(Duration::from_millis(1000));
        ticker.resume();
        assert_eq!(ticker.next_delay(), Some(Duration::from_millis(1000)));

        ticker.set_speed(4.0).unwrap();
        assert_eq!(ticker.period(), Duration::from_millis(250));

        ticker.set_speed(0.5).unwrap();
        assert_eq!(ticker.period(), Duration::from_millis(2000));
    }

    #[test]
    fn test_rejects_bad_speed() {
        let mut ticker = Ticker::new(Duration::from_millis(1000));
        assert_eq!(ticker.set_speed(0.0), Err(SimError::InvalidSpeed(0.0)));
        assert!(ticker.set_speed(-2.0).is_err());
        assert!(ticker.set_speed(f64::INFINITY).is_err());
        assert_eq!(ticker.speed(), 1.0);
    }

    #[test]
    fn test_rejects_speed_with_unrepresentable_period() {
        let mut ticker = Ticker::new(Duration::from_millis(1000));
        ticker.set_speed(2.0).unwrap();
        assert_eq!(ticker.set_speed(1e-300), Err(SimError::InvalidSpeed(1e-300)));
        assert_eq!(ticker.speed(), 2.0);

        ticker.resume();
        assert_eq!(ticker.next_delay(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_pause_resume() {
        let mut ticker = Ticker::new(Duration::from_millis(10));
        ticker.resume();
        ticker.pause();
        assert_eq!(ticker.next_delay(), None);
        ticker.resume();
        assert!(ticker.next_delay().is_some());
    }
}
