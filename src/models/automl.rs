//! Component-model tuning ("component AutoML").
//!
//! Each call to [`ComponentAutoMl::fit_regressor`] / [`ComponentAutoMl::fit_classifier`]
//! is an independent search with its own strategy instances, RNG and thread
//! pool. Candidates from several model families are evaluated round-robin on
//! a holdout split:
//!
//! - the first round evaluates each family's midpoint configuration
//! - later rounds draw from one TPE context per family
//! - the search stops at `max_iter` evaluations or when `time_budget` expires
//! - candidates slower than `pred_time_limit` seconds per predicted row are
//!   skipped unless every candidate is that slow (then the fastest wins)
//!
//! The winning spec is refit on all rows.

use std::time::Instant;

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::{debug, trace};

use crate::domain::{ComponentSettings, ComponentTask, Config, Params};
use crate::error::AppError;
use crate::fit::space::{Domain, SearchSpace};
use crate::fit::tuner::{SearchStrategy, Tpe};
use crate::models::{ClassifierModel, ClassifierSpec, ForestParams, RegressorModel, RegressorSpec, TreeParams};

/// Rows below which no holdout search is attempted.
const MIN_TUNING_ROWS: usize = 20;

/// A tuned and refit component.
#[derive(Debug, Clone)]
pub struct Tuned<M, S> {
    pub model: M,
    pub spec: S,
    /// Holdout loss of the winning candidate (NaN when no search ran).
    pub loss: f64,
    pub evaluations: usize,
}

struct Family<S> {
    space: SearchSpace,
    build: fn(&Config) -> Result<S, AppError>,
}

#[derive(Debug, Clone)]
struct Evaluated<S> {
    index: usize,
    family: usize,
    config: Config,
    spec: S,
    loss: f64,
    secs_per_row: f64,
}

#[derive(Debug, Clone)]
pub struct ComponentAutoMl {
    settings: ComponentSettings,
    seed: u64,
}

impl ComponentAutoMl {
    pub fn new(settings: ComponentSettings, seed: u64) -> Self {
        Self { settings, seed }
    }

    pub fn settings(&self) -> &ComponentSettings {
        &self.settings
    }

    /// Tune an outcome regressor. With a classification task the labels must
    /// be 0/1 and predictions are clipped to `[0, 1]`.
    pub fn fit_regressor(
        &self,
        x: &DMatrix<f64>,
        y: &[f64],
        weights: Option<&[f64]>,
    ) -> Result<Tuned<RegressorModel, RegressorSpec>, AppError> {
        let clip = self.settings.task == ComponentTask::Classification;
        if clip && y.iter().any(|v| *v != 0.0 && *v != 1.0) {
            return Err(AppError::config(
                "Component task is classification but the outcome is not binary 0/1.",
            ));
        }
        let wrap = |m: RegressorModel| if clip { RegressorModel::Clipped(Box::new(m)) } else { m };

        if x.nrows() < MIN_TUNING_ROWS {
            let spec = RegressorSpec::Ridge { alpha: 1.0 };
            let model = wrap(spec.fit(x, y, weights, self.seed)?);
            return Ok(Tuned {
                model,
                spec,
                loss: f64::NAN,
                evaluations: 0,
            });
        }

        let (train, valid) = holdout(x.nrows(), self.seed);
        let x_tr = select_rows(x, &train);
        let x_va = select_rows(x, &valid);
        let y_tr: Vec<f64> = train.iter().map(|&r| y[r]).collect();
        let y_va: Vec<f64> = valid.iter().map(|&r| y[r]).collect();
        let w_tr: Option<Vec<f64>> = weights.map(|w| train.iter().map(|&r| w[r]).collect());
        let w_va: Option<Vec<f64>> = weights.map(|w| valid.iter().map(|&r| w[r]).collect());

        let seed = self.seed;
        let evaluate = |spec: &RegressorSpec| -> Option<(f64, f64)> {
            let model = wrap(spec.fit(&x_tr, &y_tr, w_tr.as_deref(), seed).ok()?);
            let started = Instant::now();
            let pred = model.predict(&x_va);
            let secs_per_row = started.elapsed().as_secs_f64() / x_va.nrows().max(1) as f64;
            let loss = weighted_mse(&y_va, &pred, w_va.as_deref());
            loss.is_finite().then_some((loss, secs_per_row))
        };

        let (spec, loss, evaluations) = self.search(&regressor_families(), evaluate)?;
        let model = wrap(spec.fit(x, y, weights, self.seed)?);
        Ok(Tuned {
            model,
            spec,
            loss,
            evaluations,
        })
    }

    /// Tune a propensity classifier by holdout log-loss.
    pub fn fit_classifier(
        &self,
        x: &DMatrix<f64>,
        labels: &[f64],
    ) -> Result<Tuned<ClassifierModel, ClassifierSpec>, AppError> {
        if labels.iter().any(|v| *v != 0.0 && *v != 1.0) {
            return Err(AppError::data("Classifier labels must be 0/1."));
        }
        if x.nrows() < MIN_TUNING_ROWS {
            let spec = ClassifierSpec::Logistic { c: 1.0 };
            let model = spec.fit(x, labels, self.seed)?;
            return Ok(Tuned {
                model,
                spec,
                loss: f64::NAN,
                evaluations: 0,
            });
        }

        let (train, valid) = holdout(x.nrows(), self.seed);
        let x_tr = select_rows(x, &train);
        let x_va = select_rows(x, &valid);
        let l_tr: Vec<f64> = train.iter().map(|&r| labels[r]).collect();
        let l_va: Vec<f64> = valid.iter().map(|&r| labels[r]).collect();

        let seed = self.seed;
        let evaluate = |spec: &ClassifierSpec| -> Option<(f64, f64)> {
            let model = spec.fit(&x_tr, &l_tr, seed).ok()?;
            let started = Instant::now();
            let prob = model.predict_proba(&x_va);
            let secs_per_row = started.elapsed().as_secs_f64() / x_va.nrows().max(1) as f64;
            let loss = log_loss(&l_va, &prob);
            loss.is_finite().then_some((loss, secs_per_row))
        };

        let (spec, loss, evaluations) = self.search(&classifier_families(), evaluate)?;
        let model = spec.fit(x, labels, self.seed)?;
        Ok(Tuned {
            model,
            spec,
            loss,
            evaluations,
        })
    }

    fn search<S, F>(&self, families: &[Family<S>], evaluate: F) -> Result<(S, f64, usize), AppError>
    where
        S: Clone + Send + Sync,
        F: Fn(&S) -> Option<(f64, f64)> + Sync,
    {
        let started = Instant::now();
        let max_iter = self.settings.max_iter.max(1);
        let threads = resolve_jobs(self.settings.n_jobs);
        let pool = if threads > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| AppError::estimation(format!("Failed to build component thread pool: {e}")))?,
            )
        } else {
            None
        };

        let mut contexts: Vec<Tpe> = (0..families.len())
            .map(|i| Tpe::new(self.seed.wrapping_add(1 + i as u64)).with_startup_trials(4))
            .collect();
        let mut results: Vec<Evaluated<S>> = Vec::new();
        let mut proposed = 0usize;
        let mut next_family = 0usize;

        while proposed < max_iter && started.elapsed().as_secs_f64() < self.settings.time_budget {
            let batch_len = threads.min(max_iter - proposed);
            let mut batch: Vec<(usize, usize, Config, S)> = Vec::with_capacity(batch_len);
            for _ in 0..batch_len {
                let family = next_family % families.len();
                next_family += 1;
                let config = if proposed < families.len() {
                    families[family].space.center()
                } else {
                    contexts[family]
                        .suggest(&families[family].space, 1)
                        .pop()
                        .unwrap_or_else(|| families[family].space.center())
                };
                let spec = (families[family].build)(&config)?;
                batch.push((proposed, family, config, spec));
                proposed += 1;
            }

            let run = |batch: &[(usize, usize, Config, S)]| -> Vec<Option<(f64, f64)>> {
                batch.par_iter().map(|(_, _, _, spec)| evaluate(spec)).collect()
            };
            let outcomes = match &pool {
                Some(pool) => pool.install(|| run(&batch)),
                None => batch.iter().map(|(_, _, _, spec)| evaluate(spec)).collect(),
            };

            for ((index, family, config, spec), outcome) in batch.into_iter().zip(outcomes) {
                let score = outcome.map(|(loss, _)| -loss).unwrap_or(f64::NAN);
                contexts[family].observe(&families[family].space, &config, score);
                if self.settings.verbose > 0 {
                    debug!(candidate = index, family, loss = -score, "component candidate evaluated");
                } else {
                    trace!(candidate = index, family, loss = -score, "component candidate evaluated");
                }
                if let Some((loss, secs_per_row)) = outcome {
                    results.push(Evaluated {
                        index,
                        family,
                        config,
                        spec,
                        loss,
                        secs_per_row,
                    });
                }
            }
        }

        let best = pick_best(&results, self.settings.pred_time_limit)
            .ok_or_else(|| AppError::estimation("Component search: no candidate model could be fitted."))?;
        trace!(family = best.family, config = ?best.config, "component search finished");
        Ok((best.spec.clone(), best.loss, proposed))
    }
}

/// Lowest loss among candidates within the latency limit; if none qualifies,
/// the fastest candidate. Ties go to the earlier candidate.
fn pick_best<S>(results: &[Evaluated<S>], pred_time_limit: f64) -> Option<&Evaluated<S>> {
    let fast: Vec<&Evaluated<S>> = results.iter().filter(|r| r.secs_per_row <= pred_time_limit).collect();
    if fast.is_empty() {
        let mut best = results.first()?;
        for r in &results[1..] {
            if r.secs_per_row < best.secs_per_row {
                best = r;
            }
        }
        return Some(best);
    }
    let mut best = fast[0];
    for r in &fast[1..] {
        if r.loss < best.loss || (r.loss == best.loss && r.index < best.index) {
            best = r;
        }
    }
    Some(best)
}

fn resolve_jobs(n_jobs: i32) -> usize {
    if n_jobs < 1 {
        std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    } else {
        n_jobs as usize
    }
}

fn holdout(n: usize, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rows: Vec<usize> = (0..n).collect();
    rows.shuffle(&mut StdRng::seed_from_u64(seed));
    let n_valid = (n / 5).max(1);
    let valid = rows.split_off(n - n_valid);
    (rows, valid)
}

fn select_rows(x: &DMatrix<f64>, rows: &[usize]) -> DMatrix<f64> {
    DMatrix::from_fn(rows.len(), x.ncols(), |r, c| x[(rows[r], c)])
}

fn weighted_mse(y: &[f64], pred: &[f64], weights: Option<&[f64]>) -> f64 {
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, (a, b)) in y.iter().zip(pred).enumerate() {
        let w = weights.map(|w| w[i]).unwrap_or(1.0);
        num += w * (a - b) * (a - b);
        den += w;
    }
    if den > 0.0 { num / den } else { f64::NAN }
}

fn log_loss(labels: &[f64], prob: &[f64]) -> f64 {
    let eps = 1e-6;
    let total: f64 = labels
        .iter()
        .zip(prob)
        .map(|(l, p)| {
            let p = p.clamp(eps, 1.0 - eps);
            -(l * p.ln() + (1.0 - l) * (1.0 - p).ln())
        })
        .sum();
    total / labels.len().max(1) as f64
}

fn tree_space() -> SearchSpace {
    SearchSpace::new()
        .with("max_depth", Domain::rand_int(1, 8))
        .with("min_samples_leaf", Domain::rand_int(1, 30))
}

fn forest_space() -> SearchSpace {
    SearchSpace::new()
        .with("n_estimators", Domain::rand_int(10, 60))
        .with("max_depth", Domain::rand_int(2, 10))
        .with("min_samples_leaf", Domain::rand_int(1, 20))
        .with("max_samples", Domain::uniform(0.5, 1.0))
}

fn tree_params(config: &Config) -> Result<TreeParams, AppError> {
    let params = Params::new(config.clone());
    let leaf = params.usize_or("min_samples_leaf", 5)?.max(1);
    Ok(TreeParams {
        max_depth: params.usize_or("max_depth", 6)?,
        min_samples_leaf: leaf,
        min_samples_split: 2 * leaf,
        max_features: None,
    })
}

fn forest_params(config: &Config) -> Result<ForestParams, AppError> {
    RegressorSpec::forest_from_params(&Params::new(config.clone()), &ForestParams::default())
}

fn regressor_families() -> Vec<Family<RegressorSpec>> {
    vec![
        Family {
            space: SearchSpace::new().with("alpha", Domain::log_uniform(1e-4, 1e2)),
            build: |c| Ok(RegressorSpec::Ridge { alpha: Params::new(c.clone()).f64_or("alpha", 1.0)? }),
        },
        Family {
            space: SearchSpace::new().with("alpha", Domain::log_uniform(1e-5, 1.0)),
            build: |c| {
                Ok(RegressorSpec::Lasso {
                    alpha: Params::new(c.clone()).f64_or("alpha", 1e-2)?,
                    max_iter: 500,
                })
            },
        },
        Family {
            space: tree_space(),
            build: |c| Ok(RegressorSpec::Tree(tree_params(c)?)),
        },
        Family {
            space: forest_space(),
            build: |c| Ok(RegressorSpec::Forest(forest_params(c)?)),
        },
    ]
}

fn classifier_families() -> Vec<Family<ClassifierSpec>> {
    vec![
        Family {
            space: SearchSpace::new().with("c", Domain::log_uniform(1e-3, 1e3)),
            build: |c| Ok(ClassifierSpec::Logistic { c: Params::new(c.clone()).f64_or("c", 1.0)? }),
        },
        Family {
            space: tree_space(),
            build: |c| Ok(ClassifierSpec::Tree(tree_params(c)?)),
        },
        Family {
            space: forest_space(),
            build: |c| Ok(ClassifierSpec::Forest(forest_params(c)?)),
        },
    ]
}

/// Where outcome models come from.
#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeSource {
    AutoMl(ComponentSettings),
    Fixed(RegressorSpec),
}

/// Where propensity models come from.
#[derive(Debug, Clone, PartialEq)]
pub enum PropensitySource {
    /// Observed treatment share, ignoring features.
    Prior,
    AutoMl(ComponentSettings),
    Fixed(ClassifierSpec),
}

/// Hands out fitted nuisance models to the causal estimators.
///
/// `salt` distinguishes the fits requested by one estimator (folds, arms) so
/// each gets its own deterministic seed.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentFactory {
    outcome: OutcomeSource,
    propensity: PropensitySource,
    seed: u64,
}

impl ComponentFactory {
    pub fn new(outcome: OutcomeSource, propensity: PropensitySource, seed: u64) -> Self {
        Self {
            outcome,
            propensity,
            seed,
        }
    }

    /// Tuned outcome models; prior or tuned propensity models.
    pub fn from_settings(settings: &ComponentSettings, use_dummy_classifier: bool, seed: u64) -> Self {
        let propensity = if use_dummy_classifier {
            PropensitySource::Prior
        } else {
            let mut classifier = settings.clone();
            classifier.task = ComponentTask::Classification;
            PropensitySource::AutoMl(classifier)
        };
        Self::new(OutcomeSource::AutoMl(settings.clone()), propensity, seed)
    }

    pub fn fixed(regressor: RegressorSpec, classifier: ClassifierSpec, seed: u64) -> Self {
        Self::new(OutcomeSource::Fixed(regressor), PropensitySource::Fixed(classifier), seed)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn salted(&self, salt: u64) -> u64 {
        self.seed.wrapping_add(salt.wrapping_mul(0x2545_F491_4F6C_DD1D))
    }

    pub fn outcome_model(
        &self,
        x: &DMatrix<f64>,
        y: &[f64],
        weights: Option<&[f64]>,
        salt: u64,
    ) -> Result<RegressorModel, AppError> {
        let seed = self.salted(salt);
        match &self.outcome {
            OutcomeSource::Fixed(spec) => spec.fit(x, y, weights, seed),
            OutcomeSource::AutoMl(settings) => {
                Ok(ComponentAutoMl::new(settings.clone(), seed).fit_regressor(x, y, weights)?.model)
            }
        }
    }

    /// Regressor for pseudo-outcomes or residuals: always a plain regression,
    /// whatever the outcome task is.
    pub fn effect_model(
        &self,
        x: &DMatrix<f64>,
        y: &[f64],
        weights: Option<&[f64]>,
        salt: u64,
    ) -> Result<RegressorModel, AppError> {
        let seed = self.salted(salt);
        match &self.outcome {
            OutcomeSource::Fixed(spec) => spec.fit(x, y, weights, seed),
            OutcomeSource::AutoMl(settings) => {
                let mut settings = settings.clone();
                settings.task = ComponentTask::Regression;
                Ok(ComponentAutoMl::new(settings, seed).fit_regressor(x, y, weights)?.model)
            }
        }
    }

    pub fn propensity_model(&self, x: &DMatrix<f64>, labels: &[f64], salt: u64) -> Result<ClassifierModel, AppError> {
        let seed = self.salted(salt);
        match &self.propensity {
            PropensitySource::Prior => ClassifierSpec::Prior.fit(x, labels, seed),
            PropensitySource::Fixed(spec) => spec.fit(x, labels, seed),
            PropensitySource::AutoMl(settings) => {
                Ok(ComponentAutoMl::new(settings.clone(), seed).fit_classifier(x, labels)?.model)
            }
        }
    }
}
