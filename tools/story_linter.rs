/// Story Linter: normalizes stored story payloads and reports every repair.
///
/// Usage: story_linter <file.json|dir> [--config <engine.ron>] [--strict]
///
/// Repairs are printed as warnings; payloads that cannot become a playable
/// story are errors. With `--strict`, warnings also fail the run.

use safestory_engine::core::config::EngineConfig;
use safestory_engine::core::normalizer::Normalizer;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: story_linter <file.json|dir> [--config <engine.ron>] [--strict]");
        process::exit(0);
    }

    let target = &args[1];
    let mut config_path = None;
    let mut strict = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            "--strict" => strict = true,
            other => {
                eprintln!("Unknown argument: {}", other);
                process::exit(1);
            }
        }
        i += 1;
    }

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match config_path {
        Some(ref path) => match EngineConfig::load_from_ron(Path::new(path)) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("ERROR: Failed to load config: {}", e);
                process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };

    let root = Path::new(target);
    let mut files = Vec::new();
    if root.is_file() {
        files.push(root.to_path_buf());
    } else if root.is_dir() {
        collect_json_recursive(root, &mut files);
        files.sort();
    } else {
        eprintln!("ERROR: Path '{}' does not exist", target);
        process::exit(1);
    }

    println!("Linting {} story files", files.len());

    let normalizer = Normalizer::new(config.normalizer.clone()).unwrap_or_else(|e| {
        eprintln!("ERROR: {}", e);
        process::exit(1);
    });
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for path in &files {
        let name = path.display();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                errors.push(format!("{}: {}", name, e));
                continue;
            }
        };
        match normalizer.normalize_json(&content) {
            Ok(out) => {
                if let Err(violation) = out
                    .story
                    .validate_bounds(config.normalizer.bounds())
                {
                    errors.push(format!("{}: normalized story is invalid: {}", name, violation));
                }
                for repair in &out.repairs {
                    warnings.push(format!("{}: {}", name, repair));
                }
                println!(
                    "  {}: {} slides, {} repairs",
                    name,
                    out.story.len(),
                    out.repairs.len()
                );
            }
            Err(e) => errors.push(format!("{}: {}", name, e)),
        }
    }

    println!("\n=== Story Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} errors, {} warnings",
        errors.len(),
        warnings.len()
    );

    if errors.is_empty() && !(strict && !warnings.is_empty()) {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

fn collect_json_recursive(dir: &Path, files: &mut Vec<PathBuf>) {
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                collect_json_recursive(&path, files);
            } else if path.extension().and_then(|s| s.to_str()) == Some("json") {
                files.push(path);
            }
        }
    }
}
