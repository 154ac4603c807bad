use std::fmt;

use placement_core::irt::IrtParams;
use placement_core::model::{AnswerKey, DifficultyBand, Item, ItemId, SkillCategory};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use storage::repository::Storage;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Spread of the sampled difficulty around the band's nominal value.
const DIFFICULTY_SPREAD: f64 = 0.3;
const MIN_DISCRIMINATION: f64 = 0.8;
const MAX_DISCRIMINATION: f64 = 1.5;
/// Guessing for three-option question-response items.
const THREE_OPTION_GUESSING: f64 = 0.33;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    count: u32,
    first_id: u64,
    seed: Option<u64>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidCount { raw: String },
    InvalidFirstId { raw: String },
    InvalidSeed { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidCount { raw } => write!(f, "invalid --count value: {raw}"),
            ArgsError::InvalidFirstId { raw } => write!(f, "invalid --first-id value: {raw}"),
            ArgsError::InvalidSeed { raw } => write!(f, "invalid --seed value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("PLACEMENT_DB_URL").unwrap_or_else(|_| "sqlite:placement.sqlite3".into());
        let mut count = std::env::var("PLACEMENT_SEED_COUNT")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(100);
        let mut first_id = 1;
        let mut seed = std::env::var("PLACEMENT_SEED")
            .ok()
            .and_then(|value| value.parse::<u64>().ok());

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--count" => {
                    let value = require_value(&mut args, "--count")?;
                    count = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidCount { raw: value.clone() })?;
                }
                "--first-id" => {
                    let value = require_value(&mut args, "--first-id")?;
                    first_id = value
                        .parse::<u64>()
                        .map_err(|_| ArgsError::InvalidFirstId { raw: value.clone() })?;
                }
                "--seed" => {
                    let value = require_value(&mut args, "--seed")?;
                    seed = Some(
                        value
                            .parse::<u64>()
                            .map_err(|_| ArgsError::InvalidSeed { raw: value.clone() })?,
                    );
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            count,
            first_id,
            seed,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:placement.sqlite3)");
    eprintln!("  --count <n>               Approximate number of items (default: 100)");
    eprintln!("  --first-id <id>           Id of the first generated item (default: 1)");
    eprintln!("  --seed <u64>              RNG seed for reproducible parameters");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  PLACEMENT_DB_URL, PLACEMENT_SEED_COUNT, PLACEMENT_SEED, RUST_LOG");
}

/// Items generated per skill × band cell; never fewer than one.
fn items_per_cell(count: u32) -> u32 {
    let per_skill = count / 9;
    (per_skill / 6).max(1)
}

fn options_for(skill: SkillCategory) -> Vec<AnswerKey> {
    match skill {
        SkillCategory::L2 => vec![AnswerKey::A, AnswerKey::B, AnswerKey::C],
        _ => AnswerKey::ALL.to_vec(),
    }
}

fn sample_item(
    rng: &mut StdRng,
    id: ItemId,
    skill: SkillCategory,
    band: DifficultyBand,
) -> Result<Item, Box<dyn std::error::Error>> {
    let b = (band.nominal_irt_difficulty()
        + rng.random_range(-DIFFICULTY_SPREAD..DIFFICULTY_SPREAD))
    .clamp(-3.0, 3.0);
    let a = rng.random_range(MIN_DISCRIMINATION..MAX_DISCRIMINATION);
    let c = if skill == SkillCategory::L2 {
        THREE_OPTION_GUESSING
    } else {
        IrtParams::DEFAULT_GUESSING
    };

    let options = options_for(skill);
    let correct_key = options[rng.random_range(0..options.len())];
    Ok(Item::new(
        id,
        skill,
        band,
        IrtParams::new(a, b, c)?,
        options,
        correct_key,
    )?)
}

/// One cell of items per skill and difficulty band, ids assigned in order.
fn generate_items(
    rng: &mut StdRng,
    count: u32,
    first_id: u64,
) -> Result<Vec<Item>, Box<dyn std::error::Error>> {
    let per_cell = items_per_cell(count);
    let mut next_id = first_id;
    let mut items = Vec::new();
    for skill in SkillCategory::ALL {
        for band in DifficultyBand::all() {
            for _ in 0..per_cell {
                items.push(sample_item(rng, ItemId::new(next_id), skill, band)?);
                next_id += 1;
            }
        }
    }
    Ok(items)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let items = generate_items(&mut rng, args.count, args.first_id)?;
    for item in &items {
        storage.items.upsert_item(item).await?;
        debug!(item_id = %item.id(), skill = %item.skill(), b = item.params().b(), "seeded item");
    }

    info!(
        items = items.len(),
        db_url = %args.db_url,
        "seeded placement item bank"
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
