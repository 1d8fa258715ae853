// Admin CLI for the household store
//
// household-budget init
// household-budget create-household "Flat 4B" --owner u1 --limit 1000
// household-budget add-member <household-id> u2 --role viewer
// household-budget list --user u1
// household-budget status <household-id>

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use household_budget::{
    is_valid_budget_limit, BudgetStatus, Household, HouseholdRole, HouseholdStore, Member,
    SqliteHouseholdStore,
};

#[derive(Parser)]
#[command(name = "household-budget")]
#[command(about = "Manage households in the budget database", long_about = None)]
#[command(version)]
struct Cli {
    /// SQLite database path
    #[arg(long, env = "HOUSEHOLD_DB_PATH", default_value = "households.db")]
    db_path: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database schema
    Init,

    /// Create a household with a single owner
    CreateHousehold {
        name: String,
        #[arg(long)]
        owner: String,
        #[arg(long, default_value_t = 0.0)]
        limit: f64,
    },

    /// Add a user to a household
    AddMember {
        household_id: String,
        user_id: String,
        /// owner, member or viewer
        #[arg(long, default_value = "member")]
        role: String,
    },

    /// List households a user belongs to
    List {
        #[arg(long)]
        user: String,
    },

    /// Show this month's budget status
    Status { household_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let store = SqliteHouseholdStore::open(&cli.db_path)?;

    match cli.command {
        Command::Init => {
            println!("✓ Database ready at {:?}", cli.db_path);
        }
        Command::CreateHousehold { name, owner, limit } => {
            if !is_valid_budget_limit(limit) {
                bail!("budget limit must be a non-negative number, got {}", limit);
            }
            let household = Household::create(name, owner, limit)?;
            store.insert_household(&household).await?;
            println!("✓ Created household {}", household.id);
            println!("  Invite code: {}", household.invite_code);
        }
        Command::AddMember {
            household_id,
            user_id,
            role,
        } => {
            let role = HouseholdRole::parse(&role);
            if role == HouseholdRole::Unrecognized {
                bail!("role must be one of owner, member, viewer");
            }

            let mut household = store
                .find_by_id(&household_id)
                .await?
                .with_context(|| format!("Household not found: {}", household_id))?;
            let member: Member = household.add_member(&user_id, role)?.clone();
            store.insert_member(&household.id, &member).await?;
            println!("✓ Added {} to {} as {}", member.user_id, household.name, member.role);
        }
        Command::List { user } => {
            let households = store.list_for_user(&user).await?;
            if households.is_empty() {
                println!("No households for {}", user);
            }
            for household in households {
                let role = household
                    .find_member(&user)
                    .map(|m| m.role.to_string())
                    .unwrap_or_default();
                println!(
                    "{}  {:<24} {:<8} {} members  invite {}",
                    household.id,
                    household.name,
                    role,
                    household.members.len(),
                    household.invite_code
                );
            }
        }
        Command::Status { household_id } => {
            let household = store
                .find_by_id(&household_id)
                .await?
                .with_context(|| format!("Household not found: {}", household_id))?;
            let spent = store.spent_in_month(&household.id, chrono::Utc::now()).await?;
            let status = BudgetStatus::compute(spent, household.budget_limit);

            println!("{}", household.name);
            println!("  Spent this month: {:.2}", status.total_spent_this_month);
            println!("  Budget limit:     {:.2}", status.budget_limit);
            println!("  Remaining:        {:.2}", status.remaining);
            println!("  Used:             {:.1}%", status.percentage_used);
            if status.over_budget {
                println!("  ⚠️  Over budget");
            }
        }
    }

    Ok(())
}
