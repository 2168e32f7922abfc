//! Cairn maintenance binary

use cairn::{maintenance, Config, SearchQuery, Services};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cairn", version, about = "Mail store maintenance")]
struct Cli {
    /// Configuration file (defaults to $CAIRN_CONFIG, then built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Delete every stored mail, keeping mailboxes
    DeleteAllMails,
    /// Load maildir folders into the INBOX
    LoadMails {
        #[arg(value_name = "ROOT", required = true)]
        roots: Vec<PathBuf>,
    },
    /// Rebuild the search index from stored mail
    Reindex,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let services = Services::from_config(&config).await?;

    match cli.command {
        Command::DeleteAllMails => {
            let deleted = maintenance::delete_all_mails(services.documents.as_ref()).await?;
            for ident in services.search_engine.search(&SearchQuery::All).await? {
                services.search_engine.remove_from_index(&ident).await?;
            }
            println!("Deleted {} documents", deleted);
        }
        Command::LoadMails { roots } => {
            let added = maintenance::load_mails(services.mail_store.as_ref(), &roots).await?;
            println!("Loaded {} mails", added);
        }
        Command::Reindex => {
            let count =
                maintenance::reindex(services.mail_store.as_ref(), services.search_engine.as_ref())
                    .await?;
            println!("Reindexed {} mails", count);
        }
    }

    Ok(())
}
