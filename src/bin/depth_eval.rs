use depth_eval::config::{self, AlignmentMode, DistanceRange, EvalOptions, LabelClass, ShadowPolicy};
use depth_eval::{run_batch, BatchSummary};
use std::env;
use std::path::{Path, PathBuf};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().skip(1).collect();
    let cli = parse_args(&args)?;

    let profile = config::resolve_profile(Path::new("."), &cli.config_info)?;
    let summary = run_batch(&profile, &cli.options, &cli.gt_folder, &cli.preds_folder)?;
    print_summary(&summary);

    if summary.total.is_none() {
        return Err("No valid results".to_string());
    }
    Ok(())
}

struct CliArgs {
    gt_folder: PathBuf,
    preds_folder: PathBuf,
    config_info: String,
    options: EvalOptions,
}

fn usage() -> String {
    "Usage: depth_eval <gt_folder> <preds_folder> [options]\n\
     Options:\n\
     \x20 --config_info <name>       dataset profile, resolved as configs/<name>.json\n\
     \x20 --absolute_depth           prediction is metric; apply median scaling\n\
     \x20 --relative_depth           recover scale/shift by least squares\n\
     \x20 --disparity                fit in disparity space (with --relative_depth)\n\
     \x20 --resize                   resample predictions to the reference resolution\n\
     \x20 --max_gt_distance <f>      PFM samples beyond this distance become no-data\n\
     \x20 --shadow_mask <dir>        directory of shadow mask PNGs\n\
     \x20 --shadow_policy <p>        exclude-zero (default) or exclude-nonzero\n\
     \x20 --labeling <class>         obstacle | crater | mountain | ground\n\
     \x20 --labeling_path <dir>      directory of label PNGs\n\
     \x20 --distance_range <r>       e.g. '30-60' or '60' (meaning 0-60)\n\
     \x20 --num_workers <n>          worker threads for the batch loop\n\
     \x20 --scene <name>             scene bucket for aggregation (repeatable)\n\
     \x20 --max_fit_resolution <n>   decimate the scale/shift fit inputs"
        .to_string()
}

fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut positional: Vec<PathBuf> = Vec::new();
    let mut config_info = "config_info".to_string();
    let mut absolute_depth = false;
    let mut relative_depth = false;
    let mut disparity = false;
    let mut options = EvalOptions::default();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("{flag} requires a value\n{}", usage()))
        };
        match arg.as_str() {
            "--config_info" => config_info = value("--config_info")?,
            "--absolute_depth" => absolute_depth = true,
            "--relative_depth" => relative_depth = true,
            "--disparity" => disparity = true,
            "--resize" => options.resize = true,
            "--max_gt_distance" => {
                options.max_gt_distance = value("--max_gt_distance")?
                    .parse()
                    .map_err(|e| format!("bad --max_gt_distance: {e}"))?;
            }
            "--shadow_mask" => options.shadow_mask_dir = Some(PathBuf::from(value("--shadow_mask")?)),
            "--shadow_policy" => options.shadow_policy = ShadowPolicy::parse(&value("--shadow_policy")?)?,
            "--labeling" => options.labeling = LabelClass::parse(&value("--labeling")?),
            "--labeling_path" => options.labeling_dir = Some(PathBuf::from(value("--labeling_path")?)),
            "--distance_range" => options.distance_range = DistanceRange::parse(&value("--distance_range")?),
            "--num_workers" => {
                options.num_workers = value("--num_workers")?
                    .parse()
                    .map_err(|e| format!("bad --num_workers: {e}"))?;
            }
            "--scene" => options.scenes.push(value("--scene")?),
            "--max_fit_resolution" => {
                options.max_fit_resolution = Some(
                    value("--max_fit_resolution")?
                        .parse()
                        .map_err(|e| format!("bad --max_fit_resolution: {e}"))?,
                );
            }
            "--help" | "-h" => return Err(usage()),
            other if other.starts_with("--") => {
                return Err(format!("Unknown option '{other}'\n{}", usage()));
            }
            other => positional.push(PathBuf::from(other)),
        }
    }

    let [gt_folder, preds_folder]: [PathBuf; 2] = positional
        .try_into()
        .map_err(|_| format!("expected <gt_folder> and <preds_folder>\n{}", usage()))?;

    if absolute_depth && relative_depth {
        return Err("--absolute_depth and --relative_depth are mutually exclusive".to_string());
    }
    options.alignment = if relative_depth && disparity {
        AlignmentMode::ScaleShiftDisparity
    } else if relative_depth {
        AlignmentMode::ScaleShiftDepth
    } else if absolute_depth {
        AlignmentMode::MedianScale
    } else {
        AlignmentMode::None
    };
    options.prediction_absolute = absolute_depth;
    if options.num_workers == 0 {
        options.num_workers = 1;
    }

    Ok(CliArgs {
        gt_folder,
        preds_folder,
        config_info,
        options,
    })
}

fn print_summary(summary: &BatchSummary) {
    match &summary.total {
        Some(total) => {
            println!(
                "Results ({}/{} valid pairs):",
                summary.valid_pairs, summary.total_pairs
            );
            for (name, value) in total.as_pairs() {
                println!("{name}: {value:.4}");
            }
        }
        None => println!(
            "No valid results ({} pairs submitted)",
            summary.total_pairs
        ),
    }

    for (scene, agg) in &summary.per_scene {
        println!("\nScene '{scene}' ({} pairs):", agg.pairs);
        for (name, value) in agg.metrics.as_pairs() {
            println!("{name}: {value:.4}");
        }
    }
}
