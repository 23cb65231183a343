use clap::Subcommand;
use clockpanda_core::storage::{keyring_store, Database};
use clockpanda_core::user::UserRepository;

use super::CliResult;

#[derive(Subcommand)]
pub enum AuthAction {
    /// Store the Google OAuth client credentials in the OS keyring
    SetCredentials {
        #[arg(long)]
        client_id: String,
        #[arg(long)]
        client_secret: String,
    },
    /// Remove the stored client credentials
    ClearCredentials,
    /// Show whether credentials and per-user refresh tokens are present
    Status,
}

pub fn run(action: AuthAction) -> CliResult {
    match action {
        AuthAction::SetCredentials {
            client_id,
            client_secret,
        } => {
            keyring_store::set(keyring_store::GOOGLE_CLIENT_ID, &client_id)?;
            keyring_store::set(keyring_store::GOOGLE_CLIENT_SECRET, &client_secret)?;
            println!("Google credentials stored");
        }
        AuthAction::ClearCredentials => {
            keyring_store::delete(keyring_store::GOOGLE_CLIENT_ID)?;
            keyring_store::delete(keyring_store::GOOGLE_CLIENT_SECRET)?;
            println!("Google credentials removed");
        }
        AuthAction::Status => {
            let has_client = keyring_store::get(keyring_store::GOOGLE_CLIENT_ID)?.is_some()
                && keyring_store::get(keyring_store::GOOGLE_CLIENT_SECRET)?.is_some();
            println!(
                "google client: {}",
                if has_client { "configured" } else { "not configured" }
            );
            let db = Database::open()?;
            for user in db.list()? {
                println!(
                    "{}: {}",
                    user.email,
                    if user.calendar_refresh_token.is_some() {
                        "authenticated"
                    } else {
                        "not authenticated"
                    }
                );
            }
        }
    }
    Ok(())
}
