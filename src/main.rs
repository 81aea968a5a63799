//! minledger demo harness
//!
//! Connects to PostgreSQL, seeds two accounts, lists every account and moves
//! an amount from the first to the second through the Transfer Engine.
//!
//! ```text
//! minledger [--env dev] [--amount 500]
//! ```

use anyhow::Context;
use rust_decimal::Decimal;
use sqlx::PgPool;

use minledger::account::{AccountRepository, NewAccount};
use minledger::config::AppConfig;
use minledger::db::Database;
use minledger::money::{format_amount, parse_amount};
use minledger::transfer::{AccountId, PgGateway, TransferEngine};

fn get_arg(names: &[&str]) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    args.windows(2)
        .find(|pair| names.contains(&pair[0].as_str()))
        .map(|pair| pair[1].clone())
}

fn get_env() -> String {
    get_arg(&["--env", "-e"]).unwrap_or_else(|| "dev".to_string())
}

/// Insert `account`, or reuse the existing row when its email is taken
async fn ensure_account(pool: &PgPool, account: &NewAccount) -> anyhow::Result<AccountId> {
    match AccountRepository::create(pool, account).await {
        Ok(id) => Ok(id),
        Err(e) => {
            tracing::warn!(email = %account.email, error = %e, "Insert account failed");
            let existing = AccountRepository::get_by_email(pool, &account.email)
                .await?
                .with_context(|| format!("account {} could not be created", account.email))?;
            Ok(existing.id)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env)?;
    let _log_guard = minledger::logging::init_logging(&config);

    tracing::info!("Starting minledger in {} mode", env);

    let amount = parse_amount(&get_arg(&["--amount"]).unwrap_or_else(|| "500".to_string()))
        .context("invalid --amount")?;

    let db = Database::connect(&config.database)
        .await
        .context("Error connecting to database")?;
    db.health_check()
        .await
        .context("Could not ping the database")?;
    println!("Connected to the database successfully!");

    let sender = ensure_account(
        db.pool(),
        &NewAccount::new("Zhamilya", "z_kozhagulova@kbtu.kz", Decimal::from(5000)),
    )
    .await?;
    let receiver = ensure_account(
        db.pool(),
        &NewAccount::new("Assel", "a_derbisova@nu.edu.kz", Decimal::from(3500)),
    )
    .await?;

    println!("All users:");
    for account in AccountRepository::list_all(db.pool()).await? {
        println!(
            "  #{:<4} {:<12} {:<28} {:>12}",
            account.id,
            account.name,
            account.email,
            format_amount(account.balance)
        );
    }

    let gateway = PgGateway::new(db.pool().clone(), &config.transfer);
    let engine = TransferEngine::new(gateway, &config.transfer);

    match engine.transfer(sender, receiver, amount).await {
        Ok(receipt) => println!(
            "Transfer {} succeeded! #{} = {}, #{} = {}",
            receipt.transfer_id,
            receipt.from,
            format_amount(receipt.from_balance),
            receipt.to,
            format_amount(receipt.to_balance)
        ),
        Err(e) => println!(
            "Transfer failed [{}]: {}{}",
            e.code(),
            e,
            if e.is_retryable() { " (retryable)" } else { "" }
        ),
    }

    db.close().await;
    Ok(())
}
