use log::{debug, info};
use std::env;
use std::fs::File;
use std::io::{self, prelude::*};
use stony::persistence::InMemoryPersistence;
use stony::{Config, Interpreter, RunState};

fn usage(program: &str) {
    println!("stony - Z-Machine interpreter for story files, versions 1 to 8");
    println!();
    println!(
        "Usage: {} <story_file> [--config FILE] [--seed N] [--limit N] [--trace]",
        program
    );
    println!();
    println!("  --config FILE  read settings from a TOML file");
    println!("  --seed N       use a predictable random number sequence");
    println!("  --limit N      stop after N instructions");
    println!("  --trace        log every instruction at debug level");
    println!();
    println!("Settings can also be given as STONY_MAX_INSTRUCTIONS, STONY_RANDOM_SEED,");
    println!("STONY_STACK_LIMIT and STONY_TRACE environment variables.");
}

fn parse_flag_value<T: std::str::FromStr>(flag: &str, value: Option<&String>) -> Result<T, String> {
    let value = value.ok_or_else(|| format!("{} needs a value", flag))?;
    value
        .parse()
        .map_err(|_| format!("Invalid value for {}: {}", flag, value))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        usage(&args[0]);
        return Ok(());
    }
    let story_path = &args[1];

    let mut config_path = None;
    let mut seed = None;
    let mut limit = None;
    let mut trace = false;
    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                config_path = Some(parse_flag_value::<String>("--config", args.get(i + 1))?);
                i += 1;
            }
            "--seed" => {
                seed = Some(parse_flag_value::<u64>("--seed", args.get(i + 1))?);
                i += 1;
            }
            "--limit" => {
                limit = Some(parse_flag_value::<u64>("--limit", args.get(i + 1))?);
                i += 1;
            }
            "--trace" => trace = true,
            other => {
                eprintln!("Error: unknown option {}", other);
                usage(&args[0]);
                std::process::exit(2);
            }
        }
        i += 1;
    }

    let mut config = match config_path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    }
    .with_env_overrides()?;
    if seed.is_some() {
        config.random_seed = seed;
    }
    if limit.is_some() {
        config.max_instructions = limit;
    }
    config.trace |= trace;

    debug!("Loading story file: {}", story_path);
    let mut file = match File::open(story_path) {
        Ok(file) => file,
        Err(e) => {
            match e.kind() {
                io::ErrorKind::NotFound => {
                    eprintln!("Error: Story file not found: {}", story_path);
                }
                io::ErrorKind::PermissionDenied => {
                    eprintln!("Error: Permission denied reading story file: {}", story_path);
                }
                _ => {
                    eprintln!("Error: Cannot open story file '{}': {}", story_path, e);
                }
            }
            std::process::exit(1);
        }
    };
    let mut image = Vec::new();
    if let Err(e) = file.read_to_end(&mut image) {
        eprintln!("Error: Cannot read story file '{}': {}", story_path, e);
        std::process::exit(1);
    }

    let stdin = io::BufReader::new(io::stdin());
    let mut interpreter = Interpreter::new(image, stdin, io::stdout())?
        .with_config(config)
        .with_persistence(InMemoryPersistence::new());
    info!("{}", interpreter.vm.header());

    if let Err(e) = interpreter.run() {
        eprintln!("\nError during execution: {}", e);
        std::process::exit(1);
    }
    match interpreter.state() {
        RunState::Running => info!(
            "Stopped at the instruction limit after {} instructions",
            interpreter.instruction_count()
        ),
        state => debug!("Story finished: {:?}", state),
    }
    Ok(())
}
