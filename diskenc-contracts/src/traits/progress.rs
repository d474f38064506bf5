// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;
use std::sync::{Arc, Mutex};

type Sink = dyn Fn(f64) + Send + Sync;

/// Per-device progress callback handed to backend calls
///
/// Fractions are clamped to `0.0..=1.0` and only forwarded when they do not
/// go backwards, so subscribers see a non-decreasing sequence per device even
/// if the backend re-reports an older value.
#[derive(Clone)]
pub struct ProgressReporter {
    sink: Arc<Sink>,
    last: Arc<Mutex<Option<f64>>>,
}

impl ProgressReporter {
    pub fn new(sink: impl Fn(f64) + Send + Sync + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
            last: Arc::new(Mutex::new(None)),
        }
    }

    pub fn report(&self, fraction: f64) {
        if fraction.is_nan() {
            return;
        }
        let fraction = fraction.clamp(0.0, 1.0);

        {
            let Ok(mut last) = self.last.lock() else {
                return;
            };
            if last.is_some_and(|previous| fraction < previous) {
                return;
            }
            *last = Some(fraction);
        }

        (self.sink)(fraction);
    }

    /// Last fraction forwarded, if any
    pub fn last(&self) -> Option<f64> {
        self.last.lock().ok().and_then(|last| *last)
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("last", &self.last())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_regressions_and_clamps() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let reporter = ProgressReporter::new(move |fraction| sink.lock().unwrap().push(fraction));

        reporter.report(0.25);
        reporter.report(0.10);
        reporter.report(f64::NAN);
        reporter.report(0.25);
        reporter.report(1.7);

        assert_eq!(*seen.lock().unwrap(), vec![0.25, 0.25, 1.0]);
        assert_eq!(reporter.last(), Some(1.0));
    }

    #[test]
    fn clones_share_the_high_water_mark() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let reporter = ProgressReporter::new(move |fraction| sink.lock().unwrap().push(fraction));
        let clone = reporter.clone();

        reporter.report(0.5);
        clone.report(0.4);

        assert_eq!(*seen.lock().unwrap(), vec![0.5]);
    }
}
