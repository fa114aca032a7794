/// Preview: interactive reader shell for playing a story the way a learner would.
///
/// Usage: preview --story <file.json> [--config <engine.ron>]
///
/// Commands:
///   show          reprint the current step
///   outline       print how the slides are wired
///   continue      advance from a linear slide
///   choose <n>    pick choice n (1-based) on the decision slide
///   resume        leave the corrective message
///   restart       start a fresh session
///   session       print the session as JSON
///   help          list commands
///   quit          exit

use safestory_engine::core::config::EngineConfig;
use safestory_engine::core::normalizer::Normalizer;
use safestory_engine::core::traversal::{Action, Outcome, Session, Traversal};
use safestory_engine::schema::story::Story;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let mut story_path = None;
    let mut config_path = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--story" if i + 1 < args.len() => {
                i += 1;
                story_path = Some(args[i].clone());
            }
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                process::exit(1);
            }
        }
        i += 1;
    }

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(fmt::layer().with_writer(io::stderr))
        .init();

    let story_path = story_path.unwrap_or_else(|| {
        eprintln!("Error: --story is required");
        print_usage();
        process::exit(1);
    });

    let config = match config_path {
        Some(ref path) => EngineConfig::load_from_ron(Path::new(path)).unwrap_or_else(|e| {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        }),
        None => EngineConfig::default(),
    };

    let story = load_story(&story_path, &config);
    let engine = Traversal::new(&story, &config.traversal);

    println!("Loaded '{}' with {} slides", story.meta.title, story.len());
    println!("Type 'help' for commands.\n");

    let mut session = engine.start();
    show(&engine, &session);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("reader> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = parts[0].to_lowercase();

        let action = match cmd.as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" | "?" => {
                print_help();
                continue;
            }
            "show" | "s" => {
                show(&engine, &session);
                continue;
            }
            "outline" => {
                for line in story.outline() {
                    println!("  {}", line);
                }
                continue;
            }
            "session" => {
                match serde_json::to_string_pretty(&session) {
                    Ok(json) => println!("{}", json),
                    Err(e) => println!("ERROR: {}", e),
                }
                continue;
            }
            "restart" => {
                session = engine.start();
                show(&engine, &session);
                continue;
            }
            "continue" | "c" | "next" => Action::Continue,
            "resume" | "r" => Action::Resume,
            "choose" => match parts.get(1).and_then(|n| n.parse::<usize>().ok()) {
                Some(n) if n > 0 => Action::Choose(n - 1),
                _ => {
                    println!("Usage: choose <n>  (n starts at 1)");
                    continue;
                }
            },
            _ => {
                println!("Unknown command: '{}'. Type 'help' for available commands.", cmd);
                continue;
            }
        };

        match engine.apply(&session, action) {
            Ok(next) => {
                session = next;
                show(&engine, &session);
            }
            Err(e) => println!("Cannot do that: {}", e),
        }
    }
}

fn load_story(path: &str, config: &EngineConfig) -> Story {
    let content = std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("ERROR reading {}: {}", path, e);
        process::exit(1);
    });
    let normalizer = Normalizer::new(config.normalizer.clone()).unwrap_or_else(|e| {
        eprintln!("ERROR: {}", e);
        process::exit(1);
    });
    match normalizer.normalize_json(&content) {
        Ok(out) => {
            for repair in &out.repairs {
                println!("Repaired: {}", repair);
            }
            out.story
        }
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        }
    }
}

fn show(engine: &Traversal<'_>, session: &Session) {
    let view = engine.view(session);

    if let Some(done) = view.completion {
        println!("\n=== The End ===");
        match done.outcome {
            Outcome::Positive => println!("Well done! You made the safe choice."),
            Outcome::Educational => {
                println!("You learned what to do when something feels unsafe.")
            }
        }
        if let Some(lesson) = done.moral_lesson {
            println!("Lesson: {}", lesson);
        }
        println!("Slides seen: {}\n", session.path.len());
        return;
    }

    let Some(slide) = view.slide else {
        return;
    };

    if view.corrective {
        println!("\n!!! That choice could put you in danger.");
        println!("!!! The safe thing is to say no and find a trusted adult.");
        println!("(type 'resume' to see what happens next)\n");
        return;
    }

    println!("\n--- Slide {} of {} ---", slide.id, engine.story().len());
    match view.illustration {
        Some(url) => println!("[image] {}", url),
        None => println!("[text-only] {}", slide.illustration_prompt),
    }
    println!("{}", slide.text);
    if view.is_decision {
        for (n, choice) in slide.choices().iter().enumerate() {
            println!("  {}) {}", n + 1, choice.label);
        }
    }
    println!();
}

fn print_usage() {
    println!("Preview: interactive reader shell for branching stories.");
    println!();
    println!("Usage: preview --story <file.json> [--config <engine.ron>]");
    println!();
    println!("  --story <file>   Raw or canonical story JSON (normalized on load)");
    println!("  --config <file>  Engine configuration in RON (default: built-in)");
    println!();
    println!("Set RUST_LOG=debug to see normalizer repairs as they happen.");
}

fn print_help() {
    println!("Commands:");
    println!("  show          Reprint the current step");
    println!("  outline       Print how the slides are wired");
    println!("  continue      Advance from a linear slide");
    println!("  choose <n>    Pick choice n on the decision slide");
    println!("  resume        Leave the corrective message");
    println!("  restart       Start a fresh session");
    println!("  session       Print the session as JSON");
    println!("  help          Show this help");
    println!("  quit          Exit");
}
