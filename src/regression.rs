use crate::column_names;
use crate::error::{PrepError, Result};
use itertools::Itertools;
use log::{debug, info, warn};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::{fs, path};

pub const DEFAULT_TEST_FRACTION: f64 = 0.2;
pub const DEFAULT_SEED: u64 = 42;

/// Numeric features and response pulled out of a merged or subset table.
#[derive(Clone, Debug, PartialEq)]
pub struct DesignMatrix {
    pub features: Vec<String>,
    pub response: String,
    pub x: Array2<f64>,
    pub y: Array1<f64>,
}

impl DesignMatrix {
    /// Every column except `response` becomes a feature; without a name the last column is the
    /// response. Rows with a missing or non-finite value anywhere are dropped.
    pub fn from_frame(df: &DataFrame, response: Option<&str>) -> Result<Self> {
        let names = column_names(df);
        let response = match response {
            Some(response) => response.to_string(),
            None => names.last().cloned().ok_or_else(|| PrepError::InvalidInput("table has no columns".to_string()))?,
        };
        if !names.contains(&response) {
            return Err(PrepError::MissingColumn {
                column: response,
                context: "regression input".to_string(),
            });
        }
        let features = names.into_iter().filter(|name| *name != response).collect_vec();
        if features.is_empty() {
            return Err(PrepError::InvalidInput("table has no feature columns".to_string()));
        }

        let mut values = Vec::with_capacity(features.len() + 1);
        for name in features.iter().chain(std::iter::once(&response)) {
            let casted = df.column(name)?.cast(&DataType::Float64)?;
            let column: Vec<Option<f64>> = casted.f64()?.into_iter().map(|v| v.filter(|v| v.is_finite())).collect();
            values.push(column);
        }

        let complete = (0..df.height()).filter(|row| values.iter().all(|column| column[*row].is_some())).collect_vec();
        if complete.len() < df.height() {
            warn!("dropped {} rows with missing values", df.height() - complete.len());
        }

        let p = features.len();
        let x = Array2::from_shape_fn((complete.len(), p), |(i, j)| values[j][complete[i]].unwrap_or_default());
        let y = Array1::from_iter(complete.iter().map(|row| values[p][*row].unwrap_or_default()));
        debug!("design matrix: {} samples x {} features", x.nrows(), x.ncols());

        Ok(DesignMatrix { features, response, x, y })
    }

    pub fn select_features(&self, indices: &[usize]) -> DesignMatrix {
        DesignMatrix {
            features: indices.iter().map(|i| self.features[*i].clone()).collect(),
            response: self.response.clone(),
            x: self.x.select(Axis(1), indices),
            y: self.y.clone(),
        }
    }

    /// Features followed by the response, renamed to `target_name`.
    pub fn to_frame(&self, target_name: &str) -> Result<DataFrame> {
        let mut columns = self
            .features
            .iter()
            .enumerate()
            .map(|(j, name)| Column::new(name.as_str().into(), self.x.column(j).to_vec()))
            .collect_vec();
        columns.push(Column::new(target_name.into(), self.y.to_vec()));
        Ok(DataFrame::new(columns)?)
    }
}

/// Seeded shuffle of `0..n` into (train, test); the test side gets `ceil(n * test_fraction)`
/// rows, at least one and never all of them.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    if n < 2 {
        return Err(PrepError::InvalidInput(format!("need at least 2 samples to split, got {}", n)));
    }
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PrepError::InvalidInput(format!("test fraction must be in (0, 1), got {}", test_fraction)));
    }
    let n_test = ((n as f64 * test_fraction).ceil() as usize).clamp(1, n - 1);

    let mut indices = (0..n).collect_vec();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    let train = indices.split_off(n_test);
    Ok((train, indices))
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Array1<f64>> {
    let n = b.len();
    for k in 0..n {
        let pivot = (k..n).max_by(|i, j| a[[*i, k]].abs().total_cmp(&a[[*j, k]].abs())).unwrap_or(k);
        if a[[pivot, k]].abs() < f64::MIN_POSITIVE {
            return Err(PrepError::InvalidInput("singular system in least squares fit".to_string()));
        }
        if pivot != k {
            for c in 0..n {
                a.swap([k, c], [pivot, c]);
            }
            b.swap(k, pivot);
        }
        for i in (k + 1)..n {
            let factor = a[[i, k]] / a[[k, k]];
            if factor == 0.0 {
                continue;
            }
            for c in k..n {
                a[[i, c]] -= factor * a[[k, c]];
            }
            b[i] -= factor * b[k];
        }
    }

    let mut solution = Array1::zeros(n);
    for k in (0..n).rev() {
        let tail: f64 = ((k + 1)..n).map(|c| a[[k, c]] * solution[c]).sum();
        solution[k] = (b[k] - tail) / a[[k, k]];
    }
    Ok(solution)
}

fn add_jitter(mut gram: Array2<f64>) -> Array2<f64> {
    let dim = gram.nrows().max(1) as f64;
    let jitter = 1e-10 * (gram.diag().sum() / dim) + 1e-12;
    gram.diag_mut().mapv_inplace(|d| d + jitter);
    gram
}

/// Ordinary least squares with an intercept.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearModel {
    /// Fits on centered data. With more features than samples the minimum-norm solution
    /// is taken through the dual system.
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>) -> Result<Self> {
        if x.nrows() == 0 || x.nrows() != y.len() {
            return Err(PrepError::InvalidInput(format!("cannot fit {} samples against {} responses", x.nrows(), y.len())));
        }
        let x_mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
        let y_mean = y.mean().unwrap_or_default();
        let xc = x - &x_mean;
        let yc = y - y_mean;

        let beta = if x.ncols() <= x.nrows() {
            solve(add_jitter(xc.t().dot(&xc)), xc.t().dot(&yc))?
        } else {
            let alpha = solve(add_jitter(xc.dot(&xc.t())), yc)?;
            xc.t().dot(&alpha)
        };

        let intercept = y_mean - x_mean.dot(&beta);
        Ok(LinearModel {
            coefficients: beta.to_vec(),
            intercept,
        })
    }

    pub fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        let beta = Array1::from_vec(self.coefficients.clone());
        x.dot(&beta) + self.intercept
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub r2: f64,
    pub adjusted_r2: f64,
    pub explained_variance: f64,
    pub rmse: f64,
    pub mae: f64,
    pub mse: f64,
}

fn score_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        if numerator == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - numerator / denominator
    }
}

impl RegressionMetrics {
    /// `n_features` is only used for the adjusted R², which is NaN when there are no
    /// residual degrees of freedom.
    pub fn evaluate(y_true: &Array1<f64>, y_pred: &Array1<f64>, n_features: usize) -> Self {
        let n = y_true.len();
        let residuals = y_true - y_pred;
        let mse = residuals.mapv(|r| r * r).mean().unwrap_or(f64::NAN);
        let mae = residuals.mapv(f64::abs).mean().unwrap_or(f64::NAN);

        let y_mean = y_true.mean().unwrap_or_default();
        let ss_tot: f64 = y_true.iter().map(|v| (v - y_mean).powi(2)).sum();
        let ss_res: f64 = residuals.iter().map(|r| r * r).sum();
        let r2 = score_ratio(ss_res, ss_tot);

        let residual_mean = residuals.mean().unwrap_or_default();
        let residual_var: f64 = residuals.iter().map(|r| (r - residual_mean).powi(2)).sum();
        let explained_variance = score_ratio(residual_var, ss_tot);

        let dof = n as f64 - n_features as f64 - 1.0;
        let adjusted_r2 = if dof > 0.0 { 1.0 - (1.0 - r2) * (n as f64 - 1.0) / dof } else { f64::NAN };

        RegressionMetrics {
            r2,
            adjusted_r2,
            explained_variance,
            rmse: mse.sqrt(),
            mae,
            mse,
        }
    }
}

/// Fits on a seeded train split and scores on the held-out rows.
pub fn evaluate_linear_model(design: &DesignMatrix, test_fraction: f64, seed: u64) -> Result<(LinearModel, RegressionMetrics)> {
    let (train, test) = train_test_split(design.x.nrows(), test_fraction, seed)?;
    let model = LinearModel::fit(&design.x.select(Axis(0), &train), &design.y.select(Axis(0), &train))?;
    let predictions = model.predict(&design.x.select(Axis(0), &test));
    let metrics = RegressionMetrics::evaluate(&design.y.select(Axis(0), &test), &predictions, design.x.ncols());
    Ok((model, metrics))
}

pub const SVR_C: f64 = 1.0;
pub const SVR_EPSILON: f64 = 0.1;
const SVR_MAX_SWEEPS: usize = 1000;
const SVR_TOLERANCE: f64 = 1e-6;

/// Linear epsilon-insensitive support vector regression, solved in the dual by coordinate
/// descent. The bias is learned as the weight of an appended constant feature, so it is
/// regularized along with the coefficients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearSvr {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearSvr {
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, c: f64, epsilon: f64) -> Result<Self> {
        if x.nrows() == 0 || x.nrows() != y.len() {
            return Err(PrepError::InvalidInput(format!("cannot fit {} samples against {} responses", x.nrows(), y.len())));
        }
        if !(c > 0.0 && epsilon >= 0.0) {
            return Err(PrepError::InvalidInput(format!("SVR needs C > 0 and epsilon >= 0, got {} and {}", c, epsilon)));
        }
        let (n, p) = x.dim();
        let augmented = Array2::from_shape_fn((n, p + 1), |(i, j)| if j < p { x[[i, j]] } else { 1.0 });
        let diagonal = augmented.rows().into_iter().map(|row| row.dot(&row)).collect_vec();

        let mut w = Array1::<f64>::zeros(p + 1);
        let mut beta = vec![0.0; n];
        let mut sweeps = 0;
        while sweeps < SVR_MAX_SWEEPS {
            sweeps += 1;
            let mut largest_step = 0.0_f64;
            for i in 0..n {
                let q = diagonal[i];
                let row = augmented.row(i);
                let gradient = w.dot(&row) - y[i];
                let (upper, lower) = (gradient + epsilon, gradient - epsilon);
                let step = if upper < q * beta[i] {
                    -upper / q
                } else if lower > q * beta[i] {
                    -lower / q
                } else {
                    -beta[i]
                };

                let updated = (beta[i] + step).clamp(-c, c);
                let step = updated - beta[i];
                beta[i] = updated;
                if step != 0.0 {
                    w.scaled_add(step, &row);
                }
                largest_step = largest_step.max(step.abs());
            }
            if largest_step < SVR_TOLERANCE {
                break;
            }
        }
        debug!("linear SVR stopped after {} sweeps", sweeps);

        Ok(LinearSvr {
            coefficients: w.slice(ndarray::s![..p]).to_vec(),
            intercept: w[p],
        })
    }
}

/// Estimator whose weights rank features during elimination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RankingEstimator {
    #[default]
    LeastSquares,
    LinearSvr,
}

impl RankingEstimator {
    pub fn coefficients(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<Vec<f64>> {
        match self {
            RankingEstimator::LeastSquares => Ok(LinearModel::fit(x, y)?.coefficients),
            RankingEstimator::LinearSvr => Ok(LinearSvr::fit(x, y, SVR_C, SVR_EPSILON)?.coefficients),
        }
    }
}

/// Recursive feature elimination: refit `estimator` on the surviving features and drop the
/// `step` with the smallest absolute weight until `n_select` remain. Returns column indices in
/// input order.
pub fn recursive_feature_elimination(x: &Array2<f64>, y: &Array1<f64>, n_select: usize, step: usize, estimator: RankingEstimator) -> Result<Vec<usize>> {
    if step == 0 {
        return Err(PrepError::InvalidInput("RFE step must be at least 1".to_string()));
    }
    let n_select = n_select.max(1);
    let mut surviving = (0..x.ncols()).collect_vec();

    while surviving.len() > n_select {
        let weights = estimator.coefficients(&x.select(Axis(1), &surviving), y)?;
        let n_remove = step.min(surviving.len() - n_select);
        let weakest = (0..surviving.len()).sorted_by(|a, b| weights[*a].abs().total_cmp(&weights[*b].abs())).take(n_remove).collect_vec();
        surviving = surviving.into_iter().enumerate().filter(|(position, _)| !weakest.contains(position)).map(|(_, column)| column).collect();
        debug!("RFE: {} features remain", surviving.len());
    }
    Ok(surviving)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IterationResult {
    pub name: String,
    pub features: Vec<String>,
    pub metrics: RegressionMetrics,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimizationSettings {
    pub step: usize,
    pub remove_count: usize,
    pub min_features: usize,
    pub test_fraction: f64,
    pub seed: u64,
    pub ranking: RankingEstimator,
}

impl Default for OptimizationSettings {
    fn default() -> Self {
        OptimizationSettings {
            step: 1,
            remove_count: 1,
            min_features: 1,
            test_fraction: DEFAULT_TEST_FRACTION,
            seed: DEFAULT_SEED,
            ranking: RankingEstimator::LinearSvr,
        }
    }
}

/// Scores the full feature set, then repeatedly eliminates `remove_count` features with RFE
/// (ranked by `settings.ranking`, a linear SVR by default) and rescores until at most `min_features` remain. Returns every iteration and the index of the one
/// with the highest R² (earliest on ties).
pub fn optimize_features(design: &DesignMatrix, settings: &OptimizationSettings) -> Result<(Vec<IterationResult>, usize)> {
    if settings.remove_count == 0 {
        return Err(PrepError::InvalidInput("remove count must be at least 1".to_string()));
    }

    let (_, initial_metrics) = evaluate_linear_model(design, settings.test_fraction, settings.seed)?;
    info!("initial_model: {} features, R² {:.4}", design.features.len(), initial_metrics.r2);
    let mut iterations = vec![IterationResult {
        name: "initial_model".to_string(),
        features: design.features.clone(),
        metrics: initial_metrics,
    }];

    let mut current = (0..design.features.len()).collect_vec();
    let mut iteration = 1;
    while current.len() > settings.min_features {
        let target = current.len().saturating_sub(settings.remove_count).max(1);
        let x = design.x.select(Axis(1), &current);
        let selected = recursive_feature_elimination(&x, &design.y, target, settings.step, settings.ranking)?;
        current = selected.into_iter().map(|position| current[position]).collect();

        let reduced = design.select_features(&current);
        let (_, metrics) = evaluate_linear_model(&reduced, settings.test_fraction, settings.seed)?;
        let name = format!("model_iteration_{}", iteration);
        info!("{}: {} features, R² {:.4}", name, current.len(), metrics.r2);
        iterations.push(IterationResult {
            name,
            features: reduced.features,
            metrics,
        });

        if current.len() == 1 {
            break;
        }
        iteration += 1;
    }

    let best = iterations.iter().enumerate().fold(0, |best, (i, it)| if it.metrics.r2 > iterations[best].metrics.r2 { i } else { best });
    Ok((iterations, best))
}

/// Fitted model together with what it was fitted on, as written to disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedModel {
    pub features: Vec<String>,
    pub response: String,
    pub model: LinearModel,
    pub metrics: Option<RegressionMetrics>,
}

impl SavedModel {
    pub fn write_json(&self, output: &path::Path) -> Result<()> {
        if let Some(parent_dir) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent_dir)?;
        }
        fs::write(output, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn read_json(input: &path::Path) -> Result<Self> {
        Ok(serde_json::from_str(&fs::read_to_string(input)?)?)
    }
}
