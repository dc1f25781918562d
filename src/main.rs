use anyhow::Result;
use chrono::Local;
use dotenv::dotenv;
use log::info;
use std::sync::Arc;

use budgetcycle::calculator::StatisticsService;
use budgetcycle::config::Settings;
use budgetcycle::database::DatabaseOperations;
use budgetcycle::ledger::CycleLedger;
use budgetcycle::utils::{FileUtils, Formatter, Logger};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init();

    Logger::log_operation_start("BudgetCycle", "Initializing application");

    let settings = match Settings::new() {
        Ok(s) => {
            Logger::log_operation_success("Configuration", "Settings loaded successfully");
            s
        }
        Err(e) => {
            Logger::log_operation_failure("Configuration", &e.to_string());
            return Err(e);
        }
    };

    if let Err(e) = settings.validate() {
        Logger::log_operation_failure("Configuration validation", &e.to_string());
        return Err(e);
    }

    FileUtils::ensure_database_dir(&settings.database_url)?;
    let db = match DatabaseOperations::new(&settings.database_url).await {
        Ok(db) => {
            Logger::log_operation_success("Database", "Database initialized successfully");
            Arc::new(db)
        }
        Err(e) => {
            Logger::log_operation_failure("Database", &e.to_string());
            return Err(e.into());
        }
    };

    let ledger = CycleLedger::with_options(Arc::clone(&db), settings.ledger_options());
    let stats = StatisticsService::new(Arc::clone(&db));

    info!("📊 Configuration:");
    info!("  - Database: {}", settings.database_url);
    info!("  - Default currency: {}", settings.default_currency);
    info!("  - Post-closure edits: {:?}", ledger.options().post_closure);
    info!("  - Max Retry Attempts: {}", settings.max_retry_attempts);

    let Some(user_id) = settings.user_id.as_deref() else {
        info!("💡 Set BUDGET_USER_ID to report a user's active cycle");
        return Ok(());
    };

    let today = Local::now().date_naive();
    match stats.dashboard(user_id, today).await? {
        Some(dashboard) => {
            let summary = &dashboard.summary;
            let currency = summary.currency;
            info!(
                "📅 Cycle {} for {}",
                Formatter::format_period(dashboard.cycle.year, dashboard.cycle.month),
                user_id
            );
            info!("  - Income: {}", Formatter::format_amount(summary.income, currency));
            info!(
                "  - Charges: {} ({} active)",
                Formatter::format_amount(summary.total_charges, currency),
                dashboard.active_charges.len()
            );
            info!("  - Depenses: {}", Formatter::format_amount(summary.total_depenses, currency));
            info!("  - Reste: {}", Formatter::format_amount(summary.reste, currency));
            info!(
                "  - Used: {} | Savings rate: {}",
                Formatter::format_percentage(summary.pourcentage_utilise),
                Formatter::format_percentage(summary.taux_epargne)
            );
            info!(
                "  - {} days left, {} per day",
                summary.jours_restants,
                Formatter::format_amount(summary.budget_jour_restant, currency)
            );
            for group in &dashboard.breakdown {
                info!(
                    "  - {}: {} ({})",
                    group.name.as_deref().unwrap_or("?"),
                    Formatter::format_amount(group.total, currency),
                    Formatter::format_percentage(group.pourcentage)
                );
            }

            if let Some(comparison) = stats.compare_with_previous(dashboard.cycle.id).await? {
                info!(
                    "  - Versus last month: depenses {} | reste {}",
                    Formatter::format_variation(comparison.variation_depenses),
                    Formatter::format_variation(comparison.variation_reste)
                );
            }
        }
        None => info!("No active cycle for {}", user_id),
    }

    let series = stats.evolution(user_id, settings.evolution_window).await?;
    for point in series {
        info!(
            "📈 {} reste {:.2}",
            Formatter::format_period(point.year, point.month),
            point.reste
        );
    }

    Ok(())
}
