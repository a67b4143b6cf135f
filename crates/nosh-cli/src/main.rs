//! Nosh CLI - log meals and water from the terminal
//!
//! A thin front end over the nosh-core sync engine: records are captured
//! locally first and uploaded opportunistically.

mod secret_store;

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};

use nosh_core::api::{ApiClient, ApiError, ReqwestTransport};
use nosh_core::cache::ResponseCache;
use nosh_core::credentials::{CredentialVault, VaultError};
use nosh_core::db::{Database, SqliteMealStore, SqliteWaterStore};
use nosh_core::sync::{SyncService, GRACE_WINDOW};
use nosh_core::{CoreConfig, Meal, MealId};

use secret_store::KeyringSecretStore;

type Service =
    SyncService<KeyringSecretStore, ReqwestTransport, SqliteMealStore, SqliteWaterStore>;

#[derive(Parser)]
#[command(name = "nosh")]
#[command(about = "Track meals and water from the command line")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional path to local database file
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show profile and credential status
    Status,
    /// List meals for a day, refreshing from the server when reachable
    Meals {
        /// Day to list (YYYY-MM-DD, default today)
        #[arg(long)]
        date: Option<String>,
    },
    /// Log a meal
    #[command(alias = "log")]
    Add {
        /// What was eaten
        name: String,
        /// Energy in kilocalories
        calories: u32,
        /// Day the meal belongs to (YYYY-MM-DD, default today)
        #[arg(long)]
        date: Option<String>,
    },
    /// Log water intake
    Water {
        /// Amount in milliliters
        milliliters: u32,
        /// Day the intake belongs to (YYYY-MM-DD, default today)
        #[arg(long)]
        date: Option<String>,
    },
    /// Delete a meal (press u + Enter within the grace window to undo)
    Delete {
        /// Meal ID
        id: String,
    },
    /// Attach a photo to a meal
    Photo {
        /// Meal ID
        id: String,
        /// Image file to upload
        path: PathBuf,
        /// MIME type of the image
        #[arg(long, default_value = "image/jpeg")]
        content_type: String,
    },
    /// Weekly summary starting at a date
    Week {
        /// Week start (YYYY-MM-DD, default today)
        #[arg(long)]
        start: Option<String>,
    },
    /// Drop stored credentials
    Logout,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] nosh_core::Error),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("NOSH_API_URL is not set; point it at your Nosh API base URL")]
    MissingApiUrl,
    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("Invalid meal ID: {0}")]
    InvalidMealId(String),
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nosh=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    let app = App::build(&db_path)?;
    match cli.command {
        Commands::Status => run_status(&app).await?,
        Commands::Meals { date } => run_meals(&app, resolve_date(date.as_deref())?).await?,
        Commands::Add {
            name,
            calories,
            date,
        } => run_add(&app, &name, calories, resolve_date(date.as_deref())?).await?,
        Commands::Water { milliliters, date } => {
            run_water(&app, milliliters, resolve_date(date.as_deref())?).await?;
        }
        Commands::Delete { id } => run_delete(&app, &parse_meal_id(&id)?).await?,
        Commands::Photo {
            id,
            path,
            content_type,
        } => run_photo(&app, &parse_meal_id(&id)?, &path, &content_type).await?,
        Commands::Week { start } => run_week(&app, resolve_date(start.as_deref())?).await?,
        Commands::Logout => run_logout(&app).await?,
    }

    Ok(())
}

struct App {
    service: Service,
    vault: Arc<CredentialVault<KeyringSecretStore>>,
}

impl App {
    fn build(db_path: &Path) -> Result<Self, CliError> {
        let api_url = env::var("NOSH_API_URL").map_err(|_| CliError::MissingApiUrl)?;
        let config = CoreConfig::new(api_url)?;

        let transport = ReqwestTransport::new(config.request_timeout)
            .map_err(|error| ApiError::InvalidRequest(error.to_string()))?;
        let vault = Arc::new(CredentialVault::new(KeyringSecretStore));
        let api = Arc::new(ApiClient::new(
            &config,
            transport,
            vault.clone(),
            Arc::new(ResponseCache::new()),
        ));

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        tracing::debug!("Using database at {}", db_path.display());
        let db = Database::open(db_path)?;
        let service = SyncService::new(api, db.meal_store(), db.water_store());

        Ok(Self { service, vault })
    }
}

async fn run_status(app: &App) -> Result<(), CliError> {
    match app.vault.tokens().await? {
        Some(_) => println!("Credentials: stored"),
        None => println!("Credentials: none (first call will provision this device)"),
    }

    match app.service.profile().await {
        Ok(profile) => {
            println!("Signed in as {}", profile.display_name);
            println!(
                "Daily targets: {} kcal, {} ml water",
                profile.daily_calorie_target, profile.daily_water_target_ml
            );
        }
        Err(error) => println!("Profile unavailable: {error}"),
    }
    Ok(())
}

async fn run_meals(app: &App, date: NaiveDate) -> Result<(), CliError> {
    let meals = app.service.refresh_meals(date).await?;
    if meals.is_empty() {
        println!("No meals logged on {date}");
        return Ok(());
    }

    for line in format_meal_lines(&meals) {
        println!("{line}");
    }
    let total: u32 = meals.iter().map(|meal| meal.calories).sum();
    println!("Total: {total} kcal");
    Ok(())
}

async fn run_add(app: &App, name: &str, calories: u32, date: NaiveDate) -> Result<(), CliError> {
    let meal = app.service.log_meal(name, calories, date).await?;
    if meal.is_synced {
        println!("{}", meal.id);
    } else {
        println!("{} (saved locally, will upload on next sync)", meal.id);
    }
    Ok(())
}

async fn run_water(app: &App, milliliters: u32, date: NaiveDate) -> Result<(), CliError> {
    let log = app.service.log_water(milliliters, date).await?;
    if log.is_synced {
        println!("{}", log.id);
    } else {
        println!("{} (saved locally, will upload on next sync)", log.id);
    }
    Ok(())
}

async fn run_delete(app: &App, id: &MealId) -> Result<(), CliError> {
    app.service.delete_meal(id).await?;
    println!(
        "Deleted. Press u + Enter within {} seconds to undo.",
        GRACE_WINDOW.as_secs()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    tokio::select! {
        // Leave a little room after the window so the confirmation call has
        // gone out before the process exits.
        () = tokio::time::sleep(GRACE_WINDOW + std::time::Duration::from_secs(1)) => {
            println!("{id}");
        }
        line = lines.next_line() => {
            if matches!(line, Ok(Some(ref input)) if input.trim() == "u") {
                match app.service.undo_delete().await? {
                    Some(meal) => println!("Restored {}", meal.id),
                    None => println!("Too late to undo; the deletion was confirmed."),
                }
            } else {
                tokio::time::sleep(GRACE_WINDOW + std::time::Duration::from_secs(1)).await;
                println!("{id}");
            }
        }
    }
    Ok(())
}

async fn run_photo(
    app: &App,
    id: &MealId,
    path: &Path,
    content_type: &str,
) -> Result<(), CliError> {
    let bytes = std::fs::read(path)?;
    let file_name = path
        .file_name()
        .map_or_else(|| "photo".to_string(), |name| name.to_string_lossy().to_string());

    app.service
        .attach_meal_photo(*id, file_name, content_type, bytes)
        .await?;
    println!("Photo attached to {id}");
    Ok(())
}

async fn run_week(app: &App, start: NaiveDate) -> Result<(), CliError> {
    let summary = app.service.weekly_summary(start).await?;
    println!(
        "Week of {}: {} kcal, {} ml water",
        summary.start, summary.total_calories, summary.total_water_ml
    );
    Ok(())
}

async fn run_logout(app: &App) -> Result<(), CliError> {
    app.vault.clear_tokens().await?;
    println!("Credentials cleared");
    Ok(())
}

fn format_meal_lines(meals: &[Meal]) -> Vec<String> {
    meals
        .iter()
        .map(|meal| {
            let id = meal.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let marker = if meal.is_synced { " " } else { "*" };
            format!("{short_id:<13} {marker} {:<32} {:>5} kcal", meal.name, meal.calories)
        })
        .collect()
}

fn resolve_date(raw: Option<&str>) -> Result<NaiveDate, CliError> {
    match raw {
        Some(raw) => {
            let trimmed = raw.trim();
            trimmed
                .parse()
                .map_err(|_| CliError::InvalidDate(trimmed.to_string()))
        }
        None => Ok(chrono::Local::now().date_naive()),
    }
}

fn parse_meal_id(raw: &str) -> Result<MealId, CliError> {
    raw.trim()
        .parse()
        .map_err(|_| CliError::InvalidMealId(raw.trim().to_string()))
}

fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("NOSH_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nosh")
        .join("nosh.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_date_parses_and_defaults() {
        assert_eq!(
            resolve_date(Some(" 2026-02-09 ")).unwrap(),
            "2026-02-09".parse::<NaiveDate>().unwrap()
        );
        assert!(matches!(
            resolve_date(Some("last tuesday")),
            Err(CliError::InvalidDate(_))
        ));
        assert_eq!(resolve_date(None).unwrap(), chrono::Local::now().date_naive());
    }

    #[test]
    fn parse_meal_id_rejects_garbage() {
        assert!(matches!(
            parse_meal_id("not-a-uuid"),
            Err(CliError::InvalidMealId(_))
        ));
        let id = MealId::new();
        assert_eq!(parse_meal_id(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn resolve_db_path_prefers_cli_argument() {
        let explicit = PathBuf::from("/tmp/custom.db");
        assert_eq!(resolve_db_path(Some(explicit.clone())), explicit);
    }

    #[test]
    fn format_meal_lines_marks_unsynced_records() {
        let synced = {
            let mut meal = Meal::new("Toast", 180, "2026-02-09".parse().unwrap());
            meal.is_synced = true;
            meal
        };
        let unsynced = Meal::new("Offline snack", 150, "2026-02-09".parse().unwrap());

        let lines = format_meal_lines(&[synced, unsynced]);
        assert!(!lines[0].contains('*'));
        assert!(lines[1].contains('*'));
    }
}
