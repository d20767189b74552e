//! Theck-Meloree Index: burst-weighted damage intake over sliding windows
//!
//! ```text
//! TMI = 10 * ln( 1/N * Σ e^(10 * window_damage / reference_health) )
//! ```
//!
//! Windows are `bin` seconds wide and step by one second. Damage is logged as a
//! fraction of the reference health pool, so a window taking 100% of health in
//! total contributes `e^10`.

use std::time::Duration;

const TMI_FACTOR: f64 = 10.0;

/// One damage-taken event, weighted as a fraction of reference health.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TmiEvent {
    pub timestamp: Duration,
    pub weighted_damage: f64,
}

/// Window totals for every window position. `events` must be sorted by time.
pub fn tmi_buckets(events: &[TmiEvent], bin_secs: u32, duration: Duration) -> Vec<f64> {
    if events.is_empty() || bin_secs == 0 {
        return Vec::new();
    }

    let bin = bin_secs as usize;
    let last = events.len();
    let end = duration.as_secs_f64() - bin as f64;
    let secs = |i: usize| events[i].timestamp.as_secs_f64();

    let mut first = 0; // first event at or after the window start
    let mut ev = 0; // first event at or after the window end
    let mut buckets = Vec::new();

    let mut t_step = 0usize;
    while (t_step as f64) < end {
        while first < last && secs(first) < t_step as f64 {
            first += 1;
        }
        while ev < last && secs(ev) < (t_step + bin) as f64 {
            ev += 1;
        }

        if ev > first {
            buckets.push(events[first..ev].iter().map(|e| e.weighted_damage).sum());
        } else if first < last {
            // A quiet window mid-fight still counts; only the tail is dropped.
            buckets.push(0.0);
        }
        t_step += 1;
    }

    buckets
}

/// Computes the index, or 0 when there is nothing to bucket.
pub fn calculate_tmi(events: &[TmiEvent], bin_secs: u32, duration: Duration) -> f64 {
    let buckets = tmi_buckets(events, bin_secs, duration);
    if buckets.is_empty() {
        return 0.0;
    }

    // log-sum-exp, shifted by the largest window so large spikes don't overflow
    let peak = buckets.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let sum: f64 = buckets
        .iter()
        .map(|b| (TMI_FACTOR * (b - peak)).exp())
        .sum();
    let n = buckets.len() as f64;
    let tmi = TMI_FACTOR * (TMI_FACTOR * peak + (sum / n).ln());

    tracing::trace!(
        buckets = buckets.len(),
        raw_mean = buckets.iter().sum::<f64>() / n,
        tmi,
        "computed TMI"
    );

    tmi
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(secs: u64, weighted_damage: f64) -> TmiEvent {
        TmiEvent {
            timestamp: Duration::from_secs(secs),
            weighted_damage,
        }
    }

    fn minute() -> Duration {
        Duration::from_secs(60)
    }

    #[test]
    fn no_events_is_zero() {
        assert_eq!(calculate_tmi(&[], 6, minute()), 0.0);
    }

    #[test]
    fn zero_bin_disables() {
        assert_eq!(calculate_tmi(&[event(1, 0.5)], 0, minute()), 0.0);
    }

    #[test]
    fn encounter_shorter_than_bin_is_zero() {
        assert_eq!(calculate_tmi(&[event(1, 0.5)], 6, Duration::from_secs(5)), 0.0);
    }

    #[test]
    fn uniform_intake_matches_closed_form() {
        // Every full window sees six 10% hits: 10 * ln(e^(10 * 0.6)) = 60.
        let events: Vec<_> = (0..60).map(|s| event(s, 0.1)).collect();
        let tmi = calculate_tmi(&events, 6, minute());
        assert!((tmi - 60.0).abs() < 1e-9, "tmi = {tmi}");
    }

    #[test]
    fn burst_scores_higher_than_smooth_intake() {
        let smooth: Vec<_> = (0..60).map(|s| event(s, 0.1)).collect();
        let burst = vec![event(30, 6.0)];
        let smooth_tmi = calculate_tmi(&smooth, 6, minute());
        let burst_tmi = calculate_tmi(&burst, 6, minute());
        assert!(smooth_tmi < burst_tmi, "{smooth_tmi} >= {burst_tmi}");
    }

    #[test]
    fn quiet_windows_kept_until_last_event() {
        let events = [event(0, 0.5), event(20, 0.25)];
        let buckets = tmi_buckets(&events, 6, Duration::from_secs(30));
        // t=0 sees the first hit, t=1..=14 are quiet, t=15..=20 see the second,
        // t=21..=23 come after the last event and are dropped.
        assert_eq!(buckets.len(), 21);
        assert_eq!(buckets[0], 0.5);
        assert_eq!(buckets.iter().filter(|&&b| b == 0.0).count(), 14);
        assert!(buckets[15..].iter().all(|&b| b == 0.25));
    }

    #[test]
    fn large_spikes_stay_finite() {
        let tmi = calculate_tmi(&[event(10, 100.0)], 6, minute());
        assert!(tmi.is_finite());
        assert!(tmi > 9000.0);
    }
}
