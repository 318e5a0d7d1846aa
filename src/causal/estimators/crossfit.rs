//! Cross-fitted nuisance estimates shared by the DML, DR and orthogonal-forest
//! estimators (and by the R-scorer).
//!
//! Every row's nuisance prediction comes from models that never saw that row.

use nalgebra::DMatrix;

use crate::causal::estimators::EstimationData;
use crate::error::AppError;
use crate::math::stratified_kfold_indices;
use crate::models::ComponentFactory;

pub(crate) fn rows_of(x: &DMatrix<f64>, rows: &[usize]) -> DMatrix<f64> {
    DMatrix::from_fn(rows.len(), x.ncols(), |r, c| x[(rows[r], c)])
}

pub(crate) fn values_of(v: &[f64], rows: &[usize]) -> Vec<f64> {
    rows.iter().map(|&r| v[r]).collect()
}

/// Residuals `y - E[y | X, W]` and `t - P(t = 1 | X, W)`.
#[derive(Debug, Clone)]
pub struct Residuals {
    pub y_res: Vec<f64>,
    pub t_res: Vec<f64>,
}

/// Cross-fit residuals over `cv` stratified folds, averaged over `mc_iters`
/// repetitions with different fold assignments.
pub fn crossfit_residuals(
    data: &EstimationData,
    factory: &ComponentFactory,
    cv: usize,
    mc_iters: usize,
    salt: u64,
) -> Result<Residuals, AppError> {
    let n = data.n_rows();
    if n < 2 {
        return Err(AppError::data(format!("Cross-fitting needs at least 2 rows, got {n}.")));
    }
    let reps = mc_iters.max(1);
    let mut y_hat = vec![0.0; n];
    let mut t_hat = vec![0.0; n];

    for rep in 0..reps {
        let fold_seed = factory.seed().wrapping_add(salt).wrapping_add(rep as u64);
        for (k, (train, held)) in stratified_kfold_indices(&data.t, cv, fold_seed).into_iter().enumerate() {
            if train.is_empty() || held.is_empty() {
                continue;
            }
            let fold_salt = salt.wrapping_mul(101).wrapping_add((rep * 31 + k) as u64);
            let w_tr = rows_of(&data.nuisance, &train);
            let w_ho = rows_of(&data.nuisance, &held);

            let model_y = factory.outcome_model(&w_tr, &values_of(&data.y, &train), None, 2 * fold_salt)?;
            let model_t = factory.propensity_model(&w_tr, &values_of(&data.t, &train), 2 * fold_salt + 1)?;
            for (&r, p) in held.iter().zip(model_y.predict(&w_ho)) {
                y_hat[r] += p / reps as f64;
            }
            for (&r, p) in held.iter().zip(model_t.predict_proba(&w_ho)) {
                t_hat[r] += p / reps as f64;
            }
        }
    }

    Ok(Residuals {
        y_res: data.y.iter().zip(&y_hat).map(|(y, h)| y - h).collect(),
        t_res: data.t.iter().zip(&t_hat).map(|(t, h)| t - h).collect(),
    })
}

/// Doubly robust pseudo-outcomes
/// `ψ = μ1 - μ0 + t (y - μ1) / e - (1 - t) (y - μ0) / (1 - e)`,
/// with `e` clipped to `[min_propensity, 1 - min_propensity]`.
pub fn crossfit_dr_pseudo_outcomes(
    data: &EstimationData,
    factory: &ComponentFactory,
    cv: usize,
    min_propensity: f64,
    salt: u64,
) -> Result<Vec<f64>, AppError> {
    let n = data.n_rows();
    let (treated, control) = data.arms();
    if treated.len() < 2 || control.len() < 2 {
        return Err(AppError::data(
            "Doubly robust estimation needs at least 2 treated and 2 control rows.",
        ));
    }
    let clip = min_propensity.clamp(1e-12, 0.49);
    let mut psi = vec![0.0; n];

    let fold_seed = factory.seed().wrapping_add(salt);
    for (k, (train, held)) in stratified_kfold_indices(&data.t, cv, fold_seed).into_iter().enumerate() {
        if held.is_empty() {
            continue;
        }
        let fold_salt = salt.wrapping_mul(103).wrapping_add(k as u64);
        let train_t: Vec<usize> = train.iter().copied().filter(|&r| data.t[r] == 1.0).collect();
        let train_c: Vec<usize> = train.iter().copied().filter(|&r| data.t[r] != 1.0).collect();
        if train_t.is_empty() || train_c.is_empty() {
            return Err(AppError::data("A cross-fitting fold has no treated or no control rows."));
        }

        let w_ho = rows_of(&data.nuisance, &held);
        let mu1 = factory
            .outcome_model(&rows_of(&data.nuisance, &train_t), &values_of(&data.y, &train_t), None, 3 * fold_salt)?
            .predict(&w_ho);
        let mu0 = factory
            .outcome_model(&rows_of(&data.nuisance, &train_c), &values_of(&data.y, &train_c), None, 3 * fold_salt + 1)?
            .predict(&w_ho);
        let e = factory
            .propensity_model(&rows_of(&data.nuisance, &train), &values_of(&data.t, &train), 3 * fold_salt + 2)?
            .predict_proba(&w_ho);

        for (i, &r) in held.iter().enumerate() {
            let e = e[i].clamp(clip, 1.0 - clip);
            let (t, y) = (data.t[r], data.y[r]);
            psi[r] = mu1[i] - mu0[i] + t * (y - mu1[i]) / e - (1.0 - t) * (y - mu0[i]) / (1.0 - e);
        }
    }

    if psi.iter().any(|v| !v.is_finite()) {
        return Err(AppError::estimation("Doubly robust pseudo-outcomes are not finite."));
    }
    Ok(psi)
}
