use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use movie_session::auth::{AuthError, CredentialError, Credentials, Registration, SessionFacade};
use movie_session::config::{ConfigError, IdentityConfig, SubscriptionPolicy};
use movie_session::provider::{ConsoleFederatedFlow, IdentityProvider, ProviderError, RestIdentityProvider};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("identity provider setup failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("{0}")]
    Invalid(#[from] CredentialError),
    #[error("{0}")]
    Auth(#[from] AuthError),
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Upper bound on waiting for the published state to follow an operation.
const SETTLE_LIMIT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "movie-session", about = "Sign in to the movie app from the terminal")]
struct Cli {
    /// Sign out again before exiting. The session lives only as long as this process.
    #[arg(long, global = true)]
    sign_out: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account.
    SignUp {
        email: String,
        #[arg(long, env = "MOVIE_SESSION_PASSWORD", hide_env_values = true)]
        password: String,
        /// Defaults to `--password`.
        #[arg(long)]
        confirm_password: Option<String>,
        #[arg(long)]
        display_name: String,
        #[arg(long)]
        accept_terms: bool,
    },
    /// Sign in with email and password.
    SignIn {
        email: String,
        #[arg(long, env = "MOVIE_SESSION_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign in through the federated provider (prints a URL, reads the ID token from stdin).
    Federated,
    /// Send a password-reset email.
    ResetPassword { email: String },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config = IdentityConfig::from_env()?;
    let provider = RestIdentityProvider::new(&config)?.with_federated_flow(Arc::new(ConsoleFederatedFlow::stdin()));
    let provider: Arc<dyn IdentityProvider> = Arc::new(provider);
    let facade = SessionFacade::start(provider, SubscriptionPolicy::from_env());
    facade.settled().await;

    let options = RunOptions { sign_out: cli.sign_out, settle_limit: SETTLE_LIMIT };
    let result = run(&facade, cli.command, options).await;
    facade.shutdown().await;
    result
}

#[derive(Debug, Clone, Copy)]
struct RunOptions {
    sign_out: bool,
    settle_limit: Duration,
}

async fn run(facade: &SessionFacade, command: Command, options: RunOptions) -> Result<(), CliError> {
    match command {
        Command::SignUp { email, password, confirm_password, display_name, accept_terms } => {
            let form = Registration {
                confirm_password: confirm_password.unwrap_or_else(|| password.clone()),
                email,
                password,
                display_name,
                terms_accepted: accept_terms,
            };
            form.validate()?;
            let session = facade.sign_up(&form.email, &form.password, &form.display_name).await?;
            wait_for_uid(facade, session.uid(), options.settle_limit).await;
        }
        Command::SignIn { email, password } => {
            let credentials = Credentials::new(email, password);
            credentials.validate()?;
            let session = facade.sign_in(&credentials.email, &credentials.password).await?;
            wait_for_uid(facade, session.uid(), options.settle_limit).await;
        }
        Command::Federated => {
            let session = facade.sign_in_with_federated_provider().await?;
            wait_for_uid(facade, session.uid(), options.settle_limit).await;
        }
        Command::ResetPassword { email } => {
            movie_session::auth::validate_reset_email(&email)?;
            facade.request_password_reset(&email).await?;
            eprintln!("password reset email sent to {email}");
        }
    }
    print_state(facade)?;

    if options.sign_out {
        facade.sign_out().await?;
        if facade.wait_until_within(options.settle_limit, |state| !state.is_signed_in()).await.is_none() {
            tracing::warn!("session still signed in after sign-out");
        }
        print_state(facade)?;
    }
    Ok(())
}

async fn wait_for_uid(facade: &SessionFacade, uid: &str, limit: Duration) {
    let reached = facade
        .wait_until_within(limit, |state| state.session().is_some_and(|session| session.uid() == uid))
        .await;
    if reached.is_none() {
        tracing::warn!(%uid, "session was not published; printing the current state");
    }
}

fn print_state(facade: &SessionFacade) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(&facade.state())?);
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
