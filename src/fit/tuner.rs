//! Search strategies that propose configurations from a [`SearchSpace`].
//!
//! Strategies are plain values: each search (an estimator's outer search, or a
//! single component-model tuning run) constructs its own instance with its own
//! seed and history. Nothing is shared between searches.
//!
//! Scores are maximized. Non-finite scores are recorded as failures and never
//! enter the TPE "good" set.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::{Config, SearchAlgorithm};
use crate::fit::space::SearchSpace;

pub trait SearchStrategy: Send {
    /// Propose up to `n` configurations.
    fn suggest(&mut self, space: &SearchSpace, n: usize) -> Vec<Config>;

    /// Record the score obtained by `config`.
    fn observe(&mut self, space: &SearchSpace, config: &Config, score: f64);

    fn name(&self) -> &'static str;
}

/// Build a fresh strategy instance for one search.
pub fn strategy_for(
    algorithm: SearchAlgorithm,
    seed: u64,
    budget: usize,
) -> Box<dyn SearchStrategy> {
    match algorithm {
        SearchAlgorithm::Random => Box::new(RandomSearch::new(seed)),
        SearchAlgorithm::Tpe => {
            let startup = (budget / 2).clamp(2, 10);
            Box::new(Tpe::new(seed).with_startup_trials(startup))
        }
    }
}

/// Independent uniform sampling.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    rng: StdRng,
}

impl RandomSearch {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl SearchStrategy for RandomSearch {
    fn suggest(&mut self, space: &SearchSpace, n: usize) -> Vec<Config> {
        (0..n).map(|_| space.sample(&mut self.rng)).collect()
    }

    fn observe(&mut self, _space: &SearchSpace, _config: &Config, _score: f64) {}

    fn name(&self) -> &'static str {
        "random"
    }
}

#[derive(Debug, Clone)]
pub struct TpeConfig {
    /// Quantile of observations treated as "good".
    pub gamma: f64,
    /// Random candidates scored by the density ratio per suggestion.
    pub n_candidates: usize,
    /// Random suggestions before the density model is used.
    pub n_startup_trials: usize,
}

impl Default for TpeConfig {
    fn default() -> Self {
        Self {
            gamma: 0.25,
            n_candidates: 24,
            n_startup_trials: 10,
        }
    }
}

#[derive(Debug, Clone)]
struct Observation {
    point: Vec<f64>,
    score: f64,
}

/// Tree-structured Parzen estimator over the unit cube of the space.
///
/// Observations are split at the `gamma` quantile into good (`l`) and bad (`g`)
/// sets; each dimension gets a Gaussian KDE with Scott's bandwidth, and the
/// candidate maximizing `l(x) / g(x)` is proposed.
#[derive(Debug, Clone)]
pub struct Tpe {
    config: TpeConfig,
    rng: StdRng,
    history: Vec<Observation>,
}

impl Tpe {
    pub fn new(seed: u64) -> Self {
        Self {
            config: TpeConfig::default(),
            rng: StdRng::seed_from_u64(seed),
            history: Vec::new(),
        }
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.config.gamma = gamma.clamp(0.01, 0.5);
        self
    }

    pub fn with_startup_trials(mut self, n: usize) -> Self {
        self.config.n_startup_trials = n;
        self
    }

    pub fn n_observations(&self) -> usize {
        self.history.len()
    }

    fn finite_history(&self) -> Vec<&Observation> {
        self.history.iter().filter(|o| o.score.is_finite()).collect()
    }

    fn split(history: &[Observation], gamma: f64) -> (Vec<&Observation>, Vec<&Observation>) {
        let mut sorted: Vec<&Observation> =
            history.iter().filter(|o| o.score.is_finite()).collect();
        sorted.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        let n_good = ((sorted.len() as f64 * gamma).ceil() as usize).clamp(1, sorted.len() - 1);
        let bad = sorted.split_off(n_good);
        // Failed trials count as bad so the model steers away from them.
        let failed = history.iter().filter(|o| !o.score.is_finite());
        (sorted, bad.into_iter().chain(failed).collect())
    }

    fn density(samples: &[&Observation], dim: usize, x: f64) -> f64 {
        if samples.is_empty() {
            return 1.0;
        }
        let values: Vec<f64> = samples.iter().map(|o| o.point[dim]).collect();
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt().max(0.01);
        let h = if values.len() < 2 { 1.0 } else { std * n.powf(-0.2) };
        let sum: f64 = values
            .iter()
            .map(|v| {
                let z = (x - v) / h;
                (-0.5 * z * z).exp()
            })
            .sum();
        sum / ((2.0 * std::f64::consts::PI).sqrt() * h * n)
    }

    fn ratio(point: &[f64], good: &[&Observation], bad: &[&Observation]) -> f64 {
        let mut l = 1.0;
        let mut g = 1.0;
        for (dim, &x) in point.iter().enumerate() {
            l *= Self::density(good, dim, x);
            g *= Self::density(bad, dim, x);
        }
        l / (g + 1e-10)
    }

    fn random_point(rng: &mut StdRng, dims: usize) -> Vec<f64> {
        (0..dims).map(|_| rng.gen_range(0.0..1.0)).collect()
    }
}

impl SearchStrategy for Tpe {
    fn suggest(&mut self, space: &SearchSpace, n: usize) -> Vec<Config> {
        let dims = space.len();
        let startup = self.config.n_startup_trials.max(2);
        let use_model = dims > 0 && self.finite_history().len() >= startup;

        let Self { config, rng, history } = self;
        let history: &[Observation] = history;
        (0..n)
            .map(|_| {
                if !use_model {
                    return space.denormalize(&Self::random_point(rng, dims));
                }
                let (good, bad) = Self::split(history, config.gamma);
                let mut best = Self::random_point(rng, dims);
                let mut best_ratio = Self::ratio(&best, &good, &bad);
                for _ in 1..config.n_candidates.max(1) {
                    let candidate = Self::random_point(rng, dims);
                    let r = Self::ratio(&candidate, &good, &bad);
                    if r > best_ratio {
                        best_ratio = r;
                        best = candidate;
                    }
                }
                space.denormalize(&best)
            })
            .collect()
    }

    fn observe(&mut self, space: &SearchSpace, config: &Config, score: f64) {
        if let Some(point) = space.normalize(config) {
            self.history.push(Observation { point, score });
        }
    }

    fn name(&self) -> &'static str {
        "tpe"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::space::Domain;
    use proptest::prelude::*;

    fn space() -> SearchSpace {
        SearchSpace::new()
            .with("x", Domain::uniform(0.0, 1.0))
            .with("k", Domain::rand_int(1, 10))
    }

    #[test]
    fn tpe_concentrates_near_the_optimum() {
        let space = space();
        let mut tpe = Tpe::new(3).with_startup_trials(8);
        let score = |c: &Config| -(c["x"].as_f64().unwrap() - 0.8).powi(2);
        for _ in 0..40 {
            for cfg in tpe.suggest(&space, 1) {
                let s = score(&cfg);
                tpe.observe(&space, &cfg, s);
            }
        }
        let late: Vec<f64> = tpe
            .suggest(&space, 10)
            .iter()
            .map(|c| c["x"].as_f64().unwrap())
            .collect();
        let mean = late.iter().sum::<f64>() / late.len() as f64;
        assert!((mean - 0.8).abs() < 0.3, "mean suggestion {mean}");
    }

    #[test]
    fn failed_scores_do_not_break_the_model() {
        let space = space();
        let mut tpe = Tpe::new(1).with_startup_trials(2);
        for (i, cfg) in tpe.suggest(&space, 6).into_iter().enumerate() {
            let s = if i % 2 == 0 { f64::NAN } else { i as f64 };
            tpe.observe(&space, &cfg, s);
        }
        assert_eq!(tpe.n_observations(), 6);
        assert_eq!(tpe.suggest(&space, 3).len(), 3);
    }

    #[test]
    fn model_phase_is_reproducible_and_in_domain() {
        let space = space();
        let run = |seed: u64| {
            let mut tpe = Tpe::new(seed).with_startup_trials(3);
            let mut out = Vec::new();
            for round in 0..6 {
                let batch = tpe.suggest(&space, 2);
                for (i, cfg) in batch.iter().enumerate() {
                    tpe.observe(&space, cfg, (round * 2 + i) as f64);
                }
                out.extend(batch);
            }
            out
        };
        let a = run(11);
        assert_eq!(a, run(11));
        for cfg in &a {
            let x = cfg["x"].as_f64().unwrap();
            assert!((0.0..=1.0).contains(&x));
            assert!(space.normalize(cfg).is_some());
        }
    }

    #[test]
    fn strategy_names() {
        assert_eq!(strategy_for(SearchAlgorithm::Random, 0, 10).name(), "random");
        assert_eq!(strategy_for(SearchAlgorithm::Tpe, 0, 10).name(), "tpe");
    }

    proptest! {
        #[test]
        fn prop_same_seed_same_suggestions(seed in any::<u64>(), n in 1_usize..8) {
            let space = space();
            let a = RandomSearch::new(seed).suggest(&space, n);
            let b = RandomSearch::new(seed).suggest(&space, n);
            prop_assert_eq!(&a, &b);
            let c = Tpe::new(seed).suggest(&space, n);
            let d = Tpe::new(seed).suggest(&space, n);
            prop_assert_eq!(c, d);
        }

        #[test]
        fn prop_gamma_clamped(gamma in -1.0_f64..2.0) {
            let tpe = Tpe::new(0).with_gamma(gamma);
            prop_assert!(tpe.config.gamma >= 0.01 && tpe.config.gamma <= 0.5);
        }
    }
}
