use anyhow::Result;
use clap::Parser;
use kinetic::auth::ProfileUpdate;
use kinetic::commands::{self, RegisterArgs, config::Config};
use reqwest::Method;
use std::path::PathBuf;

/// kinetic - Kinetic AI API client
///
/// Talks to the Kinetic AI API with bearer authentication, transparent
/// token refresh and retries with exponential backoff.
///
/// The API base URL can also be set with the KINETIC_API_URL environment variable.
///
/// Examples:
///   kinetic login --email demo@example.com --password password
///   kinetic get /exercises
///   kinetic post /appointments --data '{"day": "friday"}'
#[derive(Parser, Debug)]
#[command(author, version = env!("KINETIC_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API base URL (defaults to http://localhost:5000/api)
    #[arg(long = "api-url", value_name = "URL", global = true)]
    pub api_url: Option<String>,

    /// Token file (defaults to <config dir>/kinetic/tokens.json)
    #[arg(
        long = "token-file",
        env = "KINETIC_TOKEN_FILE",
        value_name = "PATH",
        global = true
    )]
    pub token_file: Option<PathBuf>,

    /// Per-request timeout in milliseconds
    #[arg(long = "timeout-ms", value_name = "MS", global = true)]
    pub timeout_ms: Option<u64>,

    /// Retries after the first attempt
    #[arg(long, value_name = "N", global = true)]
    pub retries: Option<u32>,

    /// Do not resend requests rejected as invalid (HTTP 400/422)
    #[arg(long = "no-validation-retry", global = true)]
    pub no_validation_retry: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Send a GET request
    Get(ReadArgs),

    /// Send a DELETE request
    Delete(ReadArgs),

    /// Send a POST request
    Post(WriteArgs),

    /// Send a PUT request
    Put(WriteArgs),

    /// Send a PATCH request
    Patch(WriteArgs),

    /// Sign in and store tokens
    Login(LoginArgs),

    /// Create an account and store tokens
    Register(SignupArgs),

    /// Show the signed-in user
    Profile,

    /// Change fields of the signed-in user
    UpdateProfile(ProfileArgs),

    /// Forget stored tokens
    Logout,

    /// Show whether tokens are stored
    Status,
}

#[derive(clap::Args, Debug)]
pub struct ReadArgs {
    /// Endpoint path, e.g. /exercises
    #[arg(value_name = "ENDPOINT")]
    pub endpoint: String,

    /// Send without an Authorization header
    #[arg(long = "no-auth")]
    pub no_auth: bool,
}

#[derive(clap::Args, Debug)]
pub struct WriteArgs {
    /// Endpoint path, e.g. /appointments
    #[arg(value_name = "ENDPOINT")]
    pub endpoint: String,

    /// JSON request body
    #[arg(long, short = 'd', value_name = "JSON")]
    pub data: Option<String>,

    /// Send without an Authorization header
    #[arg(long = "no-auth")]
    pub no_auth: bool,
}

#[derive(clap::Args, Debug)]
pub struct LoginArgs {
    #[arg(long)]
    pub email: String,

    #[arg(long, env = "KINETIC_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(clap::Args, Debug)]
pub struct SignupArgs {
    #[arg(long = "first-name")]
    pub first_name: String,

    #[arg(long = "last-name")]
    pub last_name: String,

    #[arg(long)]
    pub email: String,

    #[arg(long, env = "KINETIC_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// patient, physiotherapist or admin
    #[arg(long, default_value = "patient")]
    pub role: String,
}

#[derive(clap::Args, Debug)]
pub struct ProfileArgs {
    #[arg(long = "first-name")]
    pub first_name: Option<String>,

    #[arg(long = "last-name")]
    pub last_name: Option<String>,

    #[arg(long)]
    pub email: Option<String>,

    /// Profile picture URL
    #[arg(long = "profile-picture", value_name = "URL")]
    pub profile_picture: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let config = Config {
        api_url: cli.api_url,
        token_file: cli.token_file,
        timeout_ms: cli.timeout_ms,
        retries: cli.retries,
        no_validation_retry: cli.no_validation_retry,
    };

    match cli.command {
        Commands::Get(args) => {
            commands::send(&config, Method::GET, &args.endpoint, None, !args.no_auth).await?
        }
        Commands::Delete(args) => {
            commands::send(&config, Method::DELETE, &args.endpoint, None, !args.no_auth).await?
        }
        Commands::Post(args) => {
            commands::send(
                &config,
                Method::POST,
                &args.endpoint,
                args.data.as_deref(),
                !args.no_auth,
            )
            .await?
        }
        Commands::Put(args) => {
            commands::send(
                &config,
                Method::PUT,
                &args.endpoint,
                args.data.as_deref(),
                !args.no_auth,
            )
            .await?
        }
        Commands::Patch(args) => {
            commands::send(
                &config,
                Method::PATCH,
                &args.endpoint,
                args.data.as_deref(),
                !args.no_auth,
            )
            .await?
        }
        Commands::Login(args) => commands::login(&config, &args.email, &args.password).await?,
        Commands::Register(args) => {
            commands::register(
                &config,
                RegisterArgs {
                    first_name: &args.first_name,
                    last_name: &args.last_name,
                    email: &args.email,
                    password: &args.password,
                    role: &args.role,
                },
            )
            .await?
        }
        Commands::Profile => commands::profile(&config).await?,
        Commands::UpdateProfile(args) => {
            commands::update_profile(
                &config,
                ProfileUpdate {
                    first_name: args.first_name,
                    last_name: args.last_name,
                    email: args.email,
                    profile_picture: args.profile_picture,
                },
            )
            .await?
        }
        Commands::Logout => commands::logout(&config)?,
        Commands::Status => commands::status(&config)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_get_parsing() {
        let cli = Cli::try_parse_from(["kinetic", "get", "/exercises"]).unwrap();
        match cli.command {
            Commands::Get(args) => {
                assert_eq!(args.endpoint, "/exercises");
                assert!(!args.no_auth);
            }
            _ => panic!("Expected Get command"),
        }
        assert_eq!(cli.api_url, None);
    }

    #[test]
    fn test_cli_post_with_data() {
        let cli = Cli::try_parse_from([
            "kinetic",
            "post",
            "/appointments",
            "-d",
            r#"{"day": "friday"}"#,
            "--no-auth",
        ])
        .unwrap();
        match cli.command {
            Commands::Post(args) => {
                assert_eq!(args.data.as_deref(), Some(r#"{"day": "friday"}"#));
                assert!(args.no_auth);
            }
            _ => panic!("Expected Post command"),
        }
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::try_parse_from([
            "kinetic",
            "--api-url",
            "http://127.0.0.1:9000",
            "--retries",
            "3",
            "--timeout-ms",
            "500",
            "status",
        ])
        .unwrap();
        assert_eq!(cli.api_url.as_deref(), Some("http://127.0.0.1:9000"));
        assert_eq!(cli.retries, Some(3));
        assert_eq!(cli.timeout_ms, Some(500));
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn test_cli_register_default_role() {
        let cli = Cli::try_parse_from([
            "kinetic",
            "register",
            "--first-name",
            "Ada",
            "--last-name",
            "Lovelace",
            "--email",
            "ada@example.com",
            "--password",
            "secret",
        ])
        .unwrap();
        match cli.command {
            Commands::Register(args) => assert_eq!(args.role, "patient"),
            _ => panic!("Expected Register command"),
        }
    }

    #[test]
    fn test_cli_update_profile_parsing() {
        let cli = Cli::try_parse_from([
            "kinetic",
            "update-profile",
            "--last-name",
            "Byron",
            "--profile-picture",
            "https://img.test/ada.png",
        ])
        .unwrap();
        match cli.command {
            Commands::UpdateProfile(args) => {
                assert_eq!(args.first_name, None);
                assert_eq!(args.last_name.as_deref(), Some("Byron"));
                assert_eq!(args.profile_picture.as_deref(), Some("https://img.test/ada.png"));
            }
            _ => panic!("Expected UpdateProfile command"),
        }
    }

    #[test]
    fn test_cli_no_subcommand_fails() {
        assert!(Cli::try_parse_from(["kinetic", "/exercises"]).is_err());
    }
}
