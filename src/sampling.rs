use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

use crate::types::SpeedSample;

/// Fixed-cadence buffer of point speed samples for the current session
///
/// Cleared when a session begins, never on halt, so the last window stays
/// readable after tracking stops. Bounded as a ring buffer: once `capacity`
/// samples are held the oldest is dropped.
pub struct SamplingWindow {
    interval: Duration,
    capacity: usize,
    samples: VecDeque<SpeedSample>,
    next_due: Option<Instant>,
}

impl SamplingWindow {
    pub fn new(interval: Duration, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        SamplingWindow {
            interval,
            capacity,
            samples: VecDeque::with_capacity(capacity.min(1024)),
            next_due: None,
        }
    }

    /// Clear the buffer and schedule the first sample one interval from now
    pub fn begin(&mut self, now: Instant) {
        self.samples.clear();
        self.next_due = Some(now + self.interval);
    }

    /// Stop sampling; the buffer is kept
    pub fn halt(&mut self) {
        self.next_due = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_due.is_some()
    }

    /// Take a sample of `speed_kph` if one is due
    ///
    /// Missed slots are skipped rather than back-filled with the same value.
    pub fn poll(&mut self, now: Instant, speed_kph: f64, timestamp: f64) -> bool {
        let due = match self.next_due {
            Some(due) if now >= due => due,
            _ => return false,
        };

        self.push(SpeedSample::new(speed_kph, timestamp));

        let mut next = due + self.interval;
        while next <= now {
            next += self.interval;
        }
        self.next_due = Some(next);
        true
    }

    fn push(&mut self, sample: SpeedSample) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// The newest `n` samples, oldest first
    pub fn recent(&self, n: usize) -> Vec<SpeedSample> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip).cloned().collect()
    }

    pub fn samples(&self) -> Vec<SpeedSample> {
        self.samples.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn test_samples_on_cadence() {
        let t0 = Instant::now();
        let mut window = SamplingWindow::new(secs(3.0), 100);
        window.begin(t0);

        assert!(!window.poll(t0, 30.0, 0.0));
        assert!(!window.poll(t0 + secs(2.9), 30.0, 2.9));
        assert!(window.poll(t0 + secs(3.0), 31.0, 3.0));
        assert!(!window.poll(t0 + secs(4.0), 32.0, 4.0));
        assert!(window.poll(t0 + secs(6.1), 33.0, 6.1));

        let speeds: Vec<f64> = window.samples().iter().map(|s| s.speed_kph).collect();
        assert_eq!(speeds, vec![31.0, 33.0]);
    }

    #[test]
    fn test_point_sample_not_average() {
        let t0 = Instant::now();
        let mut window = SamplingWindow::new(secs(3.0), 100);
        window.begin(t0);
        window.poll(t0 + secs(3.0), 80.0, 3.0);
        assert_eq!(window.samples()[0].speed_kph, 80.0);
    }

    #[test]
    fn test_missed_slots_are_skipped() {
        let t0 = Instant::now();
        let mut window = SamplingWindow::new(secs(3.0), 100);
        window.begin(t0);

        assert!(window.poll(t0 + secs(10.0), 20.0, 10.0));
        assert_eq!(window.len(), 1);
        assert!(!window.poll(t0 + secs(11.0), 20.0, 11.0));
        assert!(window.poll(t0 + secs(12.0), 20.0, 12.0));
    }

    #[test]
    fn test_halt_keeps_buffer_begin_clears() {
        let t0 = Instant::now();
        let mut window = SamplingWindow::new(secs(3.0), 100);
        window.begin(t0);
        window.poll(t0 + secs(3.0), 40.0, 3.0);
        window.poll(t0 + secs(6.0), 42.0, 6.0);

        window.halt();
        assert!(!window.poll(t0 + secs(9.0), 44.0, 9.0));
        assert_eq!(window.len(), 2);

        window.begin(t0 + secs(20.0));
        assert!(window.is_empty());
        assert!(window.is_running());
    }

    #[test]
    fn test_not_running_before_begin() {
        let t0 = Instant::now();
        let mut window = SamplingWindow::new(secs(3.0), 100);
        assert!(!window.poll(t0 + secs(100.0), 40.0, 0.0));
        assert!(window.is_empty());
    }

    #[test]
    fn test_ring_buffer_bound() {
        let t0 = Instant::now();
        let mut window = SamplingWindow::new(secs(1.0), 3);
        window.begin(t0);
        for i in 1..=5 {
            window.poll(t0 + secs(i as f64), i as f64, i as f64);
        }
        let speeds: Vec<f64> = window.samples().iter().map(|s| s.speed_kph).collect();
        assert_eq!(speeds, vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_recent() {
        let t0 = Instant::now();
        let mut window = SamplingWindow::new(secs(1.0), 100);
        window.begin(t0);
        for i in 1..=25 {
            window.poll(t0 + secs(i as f64), i as f64, i as f64);
        }
        let recent = window.recent(20);
        assert_eq!(recent.len(), 20);
        assert_eq!(recent[0].speed_kph, 6.0);
        assert_eq!(recent[19].speed_kph, 25.0);
        assert_eq!(window.recent(100).len(), 25);
    }
}
