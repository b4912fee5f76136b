//! Combinatorial search for the fittest instance combination
//!
//! Explores every multiset of family members whose RAM stays within the
//! original instance, and keeps the candidate with the least excess vCPU,
//! then the least RAM, then the lowest cost, then the fewest instances.

use crate::catalog::{Catalog, CloudInstance};
use crate::error::{AdvisorError, Result};
use crate::util::fix_float;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// Capacity an instance combination has to provide
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Demand {
    pub vcpus: f64,
    pub ram_gb: f64,
    /// Target CPU utilization fraction the combination is sized for
    pub target_cpu_util: f64,
}

impl Demand {
    /// Compute the demand placed on `original` from utilization fractions
    pub fn new(original: &CloudInstance, cpu_util: f64, target_cpu_util: f64, mem_util: f64) -> Result<Self> {
        check_fraction("cpu utilization", cpu_util)?;
        check_fraction("target cpu utilization", target_cpu_util)?;
        check_fraction("memory utilization", mem_util)?;
        if target_cpu_util == 0.0 {
            return Err(AdvisorError::InvalidUtilization(
                "target cpu utilization must be greater than 0".into(),
            ));
        }

        Ok(Self {
            vcpus: cpu_util * f64::from(original.vcpus) / target_cpu_util,
            ram_gb: mem_util * original.ram_gb,
            target_cpu_util,
        })
    }
}

fn check_fraction(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(AdvisorError::InvalidUtilization(format!(
            "{} {} is outside [0, 1]",
            name, value
        )));
    }
    Ok(())
}

/// One instance of a recommended combination
#[derive(Debug, Clone, PartialEq)]
pub struct CombinationMember {
    pub instance: Arc<CloudInstance>,
    /// Expected CPU utilization fraction after right-sizing
    pub cpu_util: f64,
    /// Expected memory utilization fraction after right-sizing
    pub mem_util: f64,
    /// Hourly price in the requested region
    pub price: Option<f64>,
    /// Saving of the whole combination against the original, in percent
    pub price_difference: Option<f64>,
}

/// How a recommendation was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The search found a combination meeting demand
    Optimized,
    /// No combination met demand; the original instance is kept
    Fallback,
    /// The family offers no alternative to search
    Unchanged,
    /// No family member is priced in the requested region
    Unpriced,
}

/// Result of right-sizing a single instance
#[derive(Debug, Clone)]
pub struct Recommendation {
    pub original: Arc<CloudInstance>,
    pub demand: Demand,
    pub members: Vec<CombinationMember>,
    pub outcome: Outcome,
}

impl Recommendation {
    /// True when the recommendation is the original instance on its own
    pub fn keeps_original(&self) -> bool {
        matches!(self.members.as_slice(), [only] if only.instance.model == self.original.model)
    }

    pub fn price_difference(&self) -> Option<f64> {
        self.members.first().and_then(|m| m.price_difference)
    }

    pub fn total_vcpus(&self) -> u32 {
        self.members.iter().map(|m| m.instance.vcpus).sum()
    }

    pub fn total_ram_gb(&self) -> f64 {
        self.members.iter().map(|m| m.instance.ram_gb).sum()
    }

    pub fn into_members(self) -> Vec<CombinationMember> {
        self.members
    }
}

/// Ranking key of a candidate combination, smaller is better
#[derive(Debug, Clone, Copy, PartialEq)]
struct Score {
    excess_vcpus: f64,
    ram_gb: f64,
    cost: f64,
    count: usize,
}

impl Score {
    fn rank_against(&self, other: &Self) -> Ordering {
        self.excess_vcpus
            .total_cmp(&other.excess_vcpus)
            .then(self.ram_gb.total_cmp(&other.ram_gb))
            .then(self.cost.total_cmp(&other.cost))
            .then(self.count.cmp(&other.count))
    }

    /// Ranking without the instance count tiebreak
    fn capacity_rank_against(&self, other: &Self) -> Ordering {
        self.excess_vcpus
            .total_cmp(&other.excess_vcpus)
            .then(self.ram_gb.total_cmp(&other.ram_gb))
            .then(self.cost.total_cmp(&other.cost))
    }
}

/// Partial combination explored by the search, passed by value
#[derive(Debug, Clone, Default)]
struct SearchState {
    /// Next family member that may be added
    index: usize,
    vcpus: u32,
    ram_gb: f64,
    cost: f64,
    chosen: Vec<usize>,
}

impl SearchState {
    fn include(&self, candidate: &Candidate) -> Self {
        let mut chosen = self.chosen.clone();
        chosen.push(self.index);
        Self {
            index: self.index,
            vcpus: self.vcpus + candidate.instance.vcpus,
            ram_gb: self.ram_gb + candidate.instance.ram_gb,
            cost: self.cost + candidate.cost,
            chosen,
        }
    }

    fn skip(self) -> Self {
        Self {
            index: self.index + 1,
            ..self
        }
    }

    fn excess_vcpus(&self, demand: &Demand) -> f64 {
        fix_float(f64::from(self.vcpus) - demand.vcpus)
    }

    fn meets(&self, demand: &Demand) -> bool {
        fix_float(f64::from(self.vcpus)) >= fix_float(demand.vcpus)
            && fix_float(self.ram_gb) >= fix_float(demand.ram_gb)
    }

    fn score(&self, demand: &Demand) -> Score {
        Score {
            excess_vcpus: self.excess_vcpus(demand),
            ram_gb: fix_float(self.ram_gb),
            cost: fix_float(self.cost),
            count: self.chosen.len(),
        }
    }

    /// Every completion of two states with the same key is reachable from both
    fn key(&self) -> (usize, u32, u64) {
        (self.index, self.vcpus, fix_float(self.ram_gb).to_bits())
    }
}

/// Family member eligible for the search, with its cost in the region
#[derive(Debug)]
struct Candidate {
    instance: Arc<CloudInstance>,
    cost: f64,
}

/// Depth-first include/exclude search over one family
struct Search<'a> {
    candidates: &'a [Candidate],
    demand: Demand,
    ram_ceiling: f64,
    best: Option<(Score, Vec<usize>)>,
    /// Cheapest (cost, count) seen per state key
    visited: HashMap<(usize, u32, u64), (f64, usize)>,
}

impl<'a> Search<'a> {
    fn new(candidates: &'a [Candidate], demand: Demand, ram_ceiling: f64) -> Self {
        Self {
            candidates,
            demand,
            ram_ceiling,
            best: None,
            visited: HashMap::new(),
        }
    }

    /// True when an earlier state with the same key was no more expensive
    /// and no larger. Its subtree was searched first, so it wins every tie.
    fn dominated(&mut self, state: &SearchState) -> bool {
        let cost = fix_float(state.cost);
        let count = state.chosen.len();
        match self.visited.get_mut(&state.key()) {
            Some((seen_cost, seen_count)) => {
                if cost >= *seen_cost && count >= *seen_count {
                    return true;
                }
                if cost < *seen_cost || (cost == *seen_cost && count < *seen_count) {
                    *seen_cost = cost;
                    *seen_count = count;
                }
                false
            }
            None => {
                self.visited.insert(state.key(), (cost, count));
                false
            }
        }
    }

    fn explore(&mut self, state: SearchState) {
        if self.dominated(&state) {
            return;
        }

        let score = state.score(&self.demand);
        if !state.chosen.is_empty() && state.meets(&self.demand) {
            let better = match &self.best {
                None => true,
                Some((best, _)) => score.rank_against(best) == Ordering::Less,
            };
            if better {
                self.best = Some((score, state.chosen.clone()));
            }
        }

        // Excess, RAM and cost only grow along a branch
        if let Some((best, _)) = &self.best {
            if score.capacity_rank_against(best) == Ordering::Greater {
                return;
            }
        }

        let candidates = self.candidates;
        let Some(candidate) = candidates.get(state.index) else {
            return;
        };

        if fix_float(state.ram_gb + candidate.instance.ram_gb) <= self.ram_ceiling {
            self.explore(state.include(candidate));
        }
        self.explore(state.skip());
    }
}

/// Right-sizes instances against a vendor catalog
pub struct RightSizingOptimizer<'a> {
    catalog: &'a Catalog,
}

impl<'a> RightSizingOptimizer<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Find the fittest combination of `model`'s family for the observed
    /// utilization. Utilizations are fractions in [0, 1].
    pub fn optimize(
        &self,
        model: &str,
        cpu_util: f64,
        target_cpu_util: f64,
        mem_util: f64,
        region: Option<&str>,
    ) -> Result<Recommendation> {
        let original = self
            .catalog
            .instance(model)
            .cloned()
            .ok_or_else(|| AdvisorError::InvalidInstance(model.to_string()))?;
        let demand = Demand::new(&original, cpu_util, target_cpu_util, mem_util)?;
        let original_price = region.and_then(|r| original.price_in(r));

        let family = self
            .catalog
            .family_of(model)
            .ok_or_else(|| AdvisorError::UnknownFamily(model.to_string()))?;
        if family.len() <= 1 {
            return Ok(Self::keep_original(
                original,
                demand,
                (cpu_util, mem_util),
                original_price,
                Outcome::Unchanged,
            ));
        }

        let mut candidates: Vec<Candidate> = family
            .members
            .iter()
            .filter_map(|member| {
                let cost = match region {
                    Some(region) => member.price_in(region)?,
                    None => 0.0,
                };
                Some(Candidate {
                    instance: Arc::clone(member),
                    cost,
                })
            })
            .collect();
        if candidates.is_empty() {
            return Ok(Self::keep_original(
                original,
                demand,
                (cpu_util, mem_util),
                original_price,
                Outcome::Unpriced,
            ));
        }
        candidates.sort_by(|a, b| b.instance.ram_gb.total_cmp(&a.instance.ram_gb));

        let mut search = Search::new(&candidates, demand, fix_float(original.ram_gb));
        search.explore(SearchState::default());

        let Some((_, chosen)) = search.best else {
            return Ok(Self::keep_original(
                original,
                demand,
                (cpu_util, mem_util),
                original_price,
                Outcome::Fallback,
            ));
        };

        let combined_vcpus: u32 = chosen.iter().map(|&i| candidates[i].instance.vcpus).sum();
        let combined_ram: f64 = chosen.iter().map(|&i| candidates[i].instance.ram_gb).sum();
        let total_cost: f64 = chosen.iter().map(|&i| candidates[i].cost).sum();

        let price_difference = original_price.and_then(|price| price_difference(price, total_cost));
        let cpu = (demand.vcpus / f64::from(combined_vcpus)) * target_cpu_util;
        let mem = demand.ram_gb / combined_ram;

        let members = chosen
            .iter()
            .map(|&i| {
                let candidate = &candidates[i];
                CombinationMember {
                    instance: Arc::clone(&candidate.instance),
                    cpu_util: cpu,
                    mem_util: mem,
                    price: region.map(|_| candidate.cost),
                    price_difference,
                }
            })
            .collect();

        Ok(Recommendation {
            original,
            demand,
            members,
            outcome: Outcome::Optimized,
        })
    }

    fn keep_original(
        original: Arc<CloudInstance>,
        demand: Demand,
        (cpu_util, mem_util): (f64, f64),
        price: Option<f64>,
        outcome: Outcome,
    ) -> Recommendation {
        let member = CombinationMember {
            instance: Arc::clone(&original),
            cpu_util,
            mem_util,
            price,
            price_difference: price.and_then(|p| price_difference(p, p)),
        };
        Recommendation {
            original,
            demand,
            members: vec![member],
            outcome,
        }
    }
}

/// Percentage saved by paying `new_price` instead of `original_price`
fn price_difference(original_price: f64, new_price: f64) -> Option<f64> {
    if original_price > 0.0 {
        Some((original_price - new_price) / original_price * 100.0)
    } else {
        None
    }
}

/// Convenience wrapper returning only the combination members
pub fn optimal_combination(
    catalog: &Catalog,
    model: &str,
    cpu_util: f64,
    target_cpu_util: f64,
    mem_util: f64,
    region: Option<&str>,
) -> Result<Vec<CombinationMember>> {
    RightSizingOptimizer::new(catalog)
        .optimize(model, cpu_util, target_cpu_util, mem_util, region)
        .map(Recommendation::into_members)
}
