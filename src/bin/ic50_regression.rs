use clap::{Parser, Subcommand};
use humantime::format_duration;
use itertools::Itertools;
use log::{debug, info};
use rusty_pharmaco_io::regression::{
    evaluate_linear_model, optimize_features, recursive_feature_elimination, DesignMatrix, LinearModel, OptimizationSettings, RankingEstimator,
    SavedModel,
    DEFAULT_SEED, DEFAULT_TEST_FRACTION,
};
use rusty_pharmaco_io::{read_table, write_csv};
use std::time::Instant;
use std::{error, fs, path};

#[derive(Parser, PartialEq, Debug)]
#[command(author, version, about = "Linear models of drug response over expression features", long_about = None)]
struct Options {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, PartialEq, Debug)]
enum Commands {
    /// Fit on a train split and report held-out metrics
    Evaluate {
        #[arg(short, long, required = true)]
        input: path::PathBuf,

        /// response column; the last column when omitted
        #[arg(short, long)]
        response: Option<String>,

        #[arg(short, long, default_value_t = DEFAULT_TEST_FRACTION)]
        test_fraction: f64,

        #[arg(short, long, default_value_t = DEFAULT_SEED)]
        seed: u64,

        /// write the fitted model as JSON
        #[arg(short = 'm', long)]
        save_model: Option<path::PathBuf>,
    },
    /// Keep the best `n_features` by recursive feature elimination
    SelectFeatures {
        #[arg(short, long, required = true)]
        input: path::PathBuf,

        #[arg(short, long)]
        response: Option<String>,

        #[arg(short, long, default_value_t = 32)]
        n_features: usize,

        #[arg(short, long, default_value_t = 1)]
        step: usize,

        #[arg(short, long, required = true)]
        output: path::PathBuf,
    },
    /// Eliminate features iteratively, ranked by a linear SVR, and keep the iteration with the best held-out R²
    Optimize {
        #[arg(short, long, required = true)]
        input: path::PathBuf,

        #[arg(short, long)]
        response: Option<String>,

        #[arg(short, long, default_value_t = 1)]
        step: usize,

        #[arg(short = 'k', long, default_value_t = 1)]
        remove_count: usize,

        #[arg(short = 'f', long, default_value_t = 1)]
        min_features: usize,

        #[arg(short, long, required = true)]
        output_dir: path::PathBuf,

        #[arg(short = 'm', long, default_value_t = false)]
        save_model: bool,
    },
}

fn main() -> Result<(), Box<dyn error::Error>> {
    let start = Instant::now();
    env_logger::init();

    let options = Options::parse();
    debug!("{:?}", options);

    match &options.command {
        Some(Commands::Evaluate {
            input,
            response,
            test_fraction,
            seed,
            save_model,
        }) => {
            evaluate(input, response.as_deref(), *test_fraction, *seed, save_model.as_deref())?;
        }
        Some(Commands::SelectFeatures {
            input,
            response,
            n_features,
            step,
            output,
        }) => {
            select_features(input, response.as_deref(), *n_features, *step, output)?;
        }
        Some(Commands::Optimize {
            input,
            response,
            step,
            remove_count,
            min_features,
            output_dir,
            save_model,
        }) => {
            let settings = OptimizationSettings {
                step: *step,
                remove_count: *remove_count,
                min_features: *min_features,
                ..Default::default()
            };
            optimize(input, response.as_deref(), &settings, output_dir, *save_model)?;
        }
        None => {}
    }

    info!("Duration: {}", format_duration(start.elapsed()).to_string());
    Ok(())
}

fn load_design(input: &path::Path, response: Option<&str>) -> Result<DesignMatrix, Box<dyn error::Error>> {
    if !input.exists() {
        return Err(format!("The file at {:?} was not found", input).into());
    }
    let df = read_table(input, false)?;
    Ok(DesignMatrix::from_frame(&df, response)?)
}

fn evaluate(input: &path::Path, response: Option<&str>, test_fraction: f64, seed: u64, save_model: Option<&path::Path>) -> Result<(), Box<dyn error::Error>> {
    let design = load_design(input, response)?;
    let (model, metrics) = evaluate_linear_model(&design, test_fraction, seed)?;

    println!("R² Score: {}", metrics.r2);
    println!("Adjusted R² Score: {}", metrics.adjusted_r2);
    println!("Explained Variance Score: {}", metrics.explained_variance);
    println!("Root Mean Squared Error (RMSE): {}", metrics.rmse);
    println!("Mean Absolute Error (MAE): {}", metrics.mae);
    println!("Mean Squared Error: {}", metrics.mse);

    if let Some(model_path) = save_model {
        let saved = SavedModel {
            features: design.features.clone(),
            response: design.response.clone(),
            model,
            metrics: Some(metrics),
        };
        saved.write_json(model_path)?;
        info!("model saved to {:?}", model_path);
    }
    Ok(())
}

fn select_features(input: &path::Path, response: Option<&str>, n_features: usize, step: usize, output: &path::Path) -> Result<(), Box<dyn error::Error>> {
    let design = load_design(input, response)?;
    let selected = recursive_feature_elimination(&design.x, &design.y, n_features, step, RankingEstimator::LeastSquares)?;
    let reduced = design.select_features(&selected);
    println!("Selected features: {}", reduced.features.iter().join(", "));

    let mut df = reduced.to_frame("target")?;
    write_csv(&mut df, output)?;
    info!("selected features written to {:?}", output);
    Ok(())
}

fn optimize(
    input: &path::Path,
    response: Option<&str>,
    settings: &OptimizationSettings,
    output_dir: &path::Path,
    save_model: bool,
) -> Result<(), Box<dyn error::Error>> {
    let design = load_design(input, response)?;
    info!("Initial features count: {}", design.features.len());

    let (iterations, best) = optimize_features(&design, settings)?;
    let best_iteration = &iterations[best];
    println!("Best model: {} ({} features)", best_iteration.name, best_iteration.features.len());
    println!("Metrics: {:?}", best_iteration.metrics);

    fs::create_dir_all(output_dir)?;
    let best_indices = best_iteration
        .features
        .iter()
        .filter_map(|name| design.features.iter().position(|f| f == name))
        .collect_vec();
    let best_design = design.select_features(&best_indices);

    let mut best_df = best_design.to_frame("target")?;
    let best_features_file = output_dir.join(format!("best_features_{}.csv", best_iteration.name));
    write_csv(&mut best_df, &best_features_file)?;
    info!("best features saved to {:?}", best_features_file);

    fs::write(output_dir.join("iterations.json"), serde_json::to_string_pretty(&iterations)?)?;

    if save_model {
        let final_model = LinearModel::fit(&best_design.x, &best_design.y)?;
        let saved = SavedModel {
            features: best_design.features.clone(),
            response: best_design.response.clone(),
            model: final_model,
            metrics: Some(best_iteration.metrics.clone()),
        };
        let best_model_file = output_dir.join(format!("best_model_{}.json", best_iteration.name));
        saved.write_json(&best_model_file)?;
        info!("best model saved to {:?}", best_model_file);
    }
    Ok(())
}
