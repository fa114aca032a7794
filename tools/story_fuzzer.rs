/// Story Fuzzer: pushes seeded noisy payloads through the normalizer and reader.
///
/// Usage: story_fuzzer [--seed <n>] [--runs <n>] [--noise <p>] [--choice-rate <p>] [--verbose]
///
/// Every payload that normalizes must validate, re-normalize without repairs,
/// and be completable along both the safe and the unsafe branch.
use rustc_hash::FxHashMap;
use safestory_engine::core::config::TraversalConfig;
use safestory_engine::core::normalizer::{NormalizationError, Normalizer};
use safestory_engine::core::sampler::{PayloadSampler, SamplerConfig};
use safestory_engine::core::traversal::{Action, Outcome, Traversal};
use safestory_engine::schema::story::Story;
use std::env;
use std::process;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const USAGE: &str =
    "Usage: story_fuzzer [--seed <n>] [--runs <n>] [--noise <p>] [--choice-rate <p>] [--verbose]";

fn main() {
    let args: Vec<String> = env::args().collect();

    let mut seed = 42u64;
    let mut runs = 1000u64;
    let mut config = SamplerConfig::default();
    let mut verbose = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = parse_or_exit(&args[i], "--seed");
            }
            "--runs" if i + 1 < args.len() => {
                i += 1;
                runs = parse_or_exit(&args[i], "--runs");
            }
            "--noise" if i + 1 < args.len() => {
                i += 1;
                config.noise = parse_probability(&args[i], "--noise");
            }
            "--choice-rate" if i + 1 < args.len() => {
                i += 1;
                config.choice_rate = parse_probability(&args[i], "--choice-rate");
            }
            "--verbose" | "-v" => verbose = true,
            "--help" | "-h" => {
                println!("{}", USAGE);
                process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                eprintln!("{}", USAGE);
                process::exit(1);
            }
        }
        i += 1;
    }

    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    println!(
        "Fuzzing {} payloads from seed {} (noise {:.2}, choice rate {:.2})...",
        runs, seed, config.noise, config.choice_rate
    );

    let normalizer = Normalizer::default();
    let traversal = TraversalConfig::default();
    let mut playable = 0u64;
    let mut too_short = 0u64;
    let mut repair_counts: FxHashMap<&'static str, u64> = FxHashMap::default();
    let mut failures = Vec::new();

    for run in 0..runs {
        let run_seed = seed.wrapping_add(run);
        let payload = PayloadSampler::with_config(run_seed, config.clone()).sample();

        let out = match normalizer.normalize_value(&payload) {
            Ok(out) => out,
            Err(NormalizationError::GenerationTooShort { .. }) => {
                too_short += 1;
                continue;
            }
            Err(e) => {
                failures.push(format!("seed {}: {}", run_seed, e));
                continue;
            }
        };

        for repair in &out.repairs {
            *repair_counts.entry(repair.kind()).or_insert(0) += 1;
        }
        if let Err(problem) = check_story(&normalizer, &out.story, &traversal) {
            failures.push(format!("seed {}: {}", run_seed, problem));
            continue;
        }
        playable += 1;
    }

    println!("\n=== Fuzz Report ===\n");
    println!("Playable stories:   {}", playable);
    println!("Too short:          {}", too_short);
    println!("Failures:           {}", failures.len());

    let mut tally: Vec<(&str, u64)> = repair_counts.into_iter().collect();
    tally.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    if !tally.is_empty() {
        println!("\nRepairs applied:");
        for (kind, count) in &tally {
            println!("  {}: {}", kind, count);
        }
    }

    for failure in &failures {
        println!("ERROR: {}", failure);
    }

    if !failures.is_empty() {
        process::exit(1);
    }
}

fn check_story(
    normalizer: &Normalizer,
    story: &Story,
    traversal: &TraversalConfig,
) -> Result<(), String> {
    story
        .validate()
        .map_err(|v| format!("invariant violated: {}", v))?;

    let value = serde_json::to_value(story).map_err(|e| e.to_string())?;
    let again = normalizer
        .normalize_value(&value)
        .map_err(|e| format!("re-normalization failed: {}", e))?;
    if !again.repairs.is_empty() || again.story != *story {
        return Err(format!(
            "not idempotent ({} repairs on second pass)",
            again.repairs.len()
        ));
    }

    let engine = Traversal::new(story, traversal);
    let safe = play(&engine, true)?;
    let corrected = play(&engine, false)?;
    if safe != Outcome::Positive || corrected != Outcome::Educational {
        return Err(format!("unexpected outcomes {:?} / {:?}", safe, corrected));
    }
    Ok(())
}

/// Drive one session to the end, taking the safe or the unsafe branch.
fn play(engine: &Traversal<'_>, take_safe: bool) -> Result<Outcome, String> {
    let mut session = engine.start();
    let mut steps = 0;
    while let Some(slide) = engine.view(&session).slide {
        let view = engine.view(&session);
        let action = if view.corrective {
            Action::Resume
        } else if view.is_decision {
            let index = slide
                .choices()
                .iter()
                .position(|c| c.is_correct == take_safe)
                .ok_or("decision slide lacks a branch")?;
            Action::Choose(index)
        } else {
            Action::Continue
        };
        if action != Action::Resume {
            steps += 1;
        }
        if steps > engine.story().len() {
            return Err("traversal did not terminate".to_string());
        }
        session = engine.apply(&session, action).map_err(|e| e.to_string())?;
    }
    session
        .outcome()
        .ok_or_else(|| "session stopped without completing".to_string())
}

fn parse_or_exit<T: std::str::FromStr>(value: &str, flag: &str) -> T {
    value.parse().unwrap_or_else(|_| {
        eprintln!("Error: {} expects a number, got '{}'", flag, value);
        process::exit(1);
    })
}

fn parse_probability(value: &str, flag: &str) -> f64 {
    let p: f64 = parse_or_exit(value, flag);
    if !(0.0..=1.0).contains(&p) {
        eprintln!("Error: {} must be between 0 and 1", flag);
        process::exit(1);
    }
    p
}
