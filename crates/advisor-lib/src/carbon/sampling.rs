//! Sample allocation across time windows and plotted point selection

use crate::error::{AdvisorError, Result};
use crate::models::{EmissionsRecord, TimeWindow};
use rand::Rng;

/// Split `sampling` points across windows in proportion to their duration,
/// at least one per window. The result always sums to `sampling`.
pub fn allocate_samples(windows: &[TimeWindow], sampling: usize) -> Result<Vec<usize>> {
    if sampling < windows.len() {
        return Err(AdvisorError::Configuration(
            "Sampling must be greater than or equal to the number of allowed timeframes.".into(),
        ));
    }
    if windows.is_empty() {
        return Ok(Vec::new());
    }

    let durations: Vec<f64> = windows
        .iter()
        .map(|w| w.duration().num_milliseconds() as f64)
        .collect();
    let total: f64 = durations.iter().sum();
    let remaining = (sampling - windows.len()) as f64;

    let mut allocations = vec![1usize; windows.len()];
    if total > 0.0 {
        for (allocation, duration) in allocations.iter_mut().zip(&durations) {
            *allocation += (duration / total * remaining).round() as usize;
        }
    }

    let mut allocated: usize = allocations.iter().sum();
    while allocated != sampling {
        if allocated > sampling {
            for allocation in allocations.iter_mut() {
                if allocated == sampling {
                    break;
                }
                if *allocation > 1 {
                    *allocation -= 1;
                    allocated -= 1;
                }
            }
        } else {
            for allocation in allocations.iter_mut() {
                if allocated == sampling {
                    break;
                }
                *allocation += 1;
                allocated += 1;
            }
        }
    }

    Ok(allocations)
}

/// Records of one window split by rank, drawn from without replacement
#[derive(Debug, Clone, Default)]
pub struct WindowPool {
    best: Vec<EmissionsRecord>,
    others: Vec<EmissionsRecord>,
}

impl WindowPool {
    pub fn new(best: Vec<EmissionsRecord>, others: Vec<EmissionsRecord>) -> Self {
        Self { best, others }
    }

    pub fn is_empty(&self) -> bool {
        self.best.is_empty() && self.others.is_empty()
    }

    fn take_best<R: Rng>(&mut self, rng: &mut R) -> Option<EmissionsRecord> {
        take_random(&mut self.best, rng)
    }

    /// Non-best records first, remaining ties once those run out
    fn take_any<R: Rng>(&mut self, rng: &mut R) -> Option<EmissionsRecord> {
        take_random(&mut self.others, rng).or_else(|| take_random(&mut self.best, rng))
    }
}

fn take_random<R: Rng>(records: &mut Vec<EmissionsRecord>, rng: &mut R) -> Option<EmissionsRecord> {
    if records.is_empty() {
        return None;
    }
    let index = rng.gen_range(0..records.len());
    Some(records.swap_remove(index))
}

/// Pick plotted points: one best record per window, then random records up
/// to each window's allocation. Allocation a window cannot fill moves to the
/// windows that still have records.
pub fn select_plotted_points<R: Rng>(
    mut pools: Vec<WindowPool>,
    allocations: &[usize],
    rng: &mut R,
) -> Vec<EmissionsRecord> {
    let mut points = Vec::with_capacity(allocations.iter().sum());
    let mut leftover = 0usize;

    for (pool, &allocation) in pools.iter_mut().zip(allocations) {
        let mut wanted = allocation;
        if wanted > 0 {
            if let Some(best) = pool.take_best(rng) {
                points.push(best);
                wanted -= 1;
            }
        }
        while wanted > 0 {
            match pool.take_any(rng) {
                Some(record) => {
                    points.push(record);
                    wanted -= 1;
                }
                None => break,
            }
        }
        leftover += wanted;
    }

    while leftover > 0 && pools.iter().any(|p| !p.is_empty()) {
        for pool in pools.iter_mut() {
            if leftover == 0 {
                break;
            }
            if let Some(record) = pool.take_any(rng) {
                points.push(record);
                leftover -= 1;
            }
        }
    }

    points
}
