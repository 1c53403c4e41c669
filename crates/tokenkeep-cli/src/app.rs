//! Command handling for the CLI.
//!
//! `App` is a thin consumer of the session manager: it hydrates, runs one
//! command through the manager or the authenticated client, and reports the
//! outcome as an exit code.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::Result;
use chrono::DateTime;
use tracing::{debug, warn};

use tokenkeep_core::{AuthSessionManager, AuthState, AuthenticatedHttpClient, Config};

/// Environment variables that skip the interactive prompts
const USERNAME_ENV: &str = "TOKENKEEP_USERNAME";
const PASSWORD_ENV: &str = "TOKENKEEP_PASSWORD";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { username: Option<String> },
    Logout,
    Status,
    Get { url: String },
    HasRole { role: String },
}

impl Command {
    pub fn parse(args: &[String]) -> Option<Self> {
        let (name, rest) = args.split_first()?;
        match (name.as_str(), rest) {
            ("login", []) => Some(Command::Login { username: None }),
            ("login", [username]) => Some(Command::Login {
                username: Some(username.clone()),
            }),
            ("logout", []) => Some(Command::Logout),
            ("status" | "whoami", []) => Some(Command::Status),
            ("get", [url]) => Some(Command::Get { url: url.clone() }),
            ("has-role", [role]) => Some(Command::HasRole { role: role.clone() }),
            _ => None,
        }
    }
}

pub struct App {
    config: Config,
    manager: Arc<AuthSessionManager>,
    client: AuthenticatedHttpClient,
}

impl App {
    pub fn new() -> Result<Self> {
        let config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };
        debug!(auth_base_url = %config.auth_base_url, storage = ?config.storage, "Config loaded");

        let manager = Arc::new(AuthSessionManager::from_config(&config)?);
        let client = AuthenticatedHttpClient::new(Arc::clone(&manager));

        Ok(Self {
            config,
            manager,
            client,
        })
    }

    /// Restore the saved session, then run `command`. Returns the exit code.
    pub async fn run(&mut self, command: Command) -> Result<i32> {
        let state = self.manager.hydrate();
        debug!(authenticated = state.session().is_some(), "Session hydrated");

        if let Some(period) = self.config.expiry_poll_interval() {
            self.manager.spawn_expiry_watch(period);
        }

        match command {
            Command::Login { username } => self.login(username).await,
            Command::Logout => Ok(self.logout()),
            Command::Status => Ok(self.status()),
            Command::Get { url } => self.get(&url).await,
            Command::HasRole { role } => Ok(if self.manager.has_role(&role) { 0 } else { 1 }),
        }
    }

    async fn login(&mut self, username: Option<String>) -> Result<i32> {
        let username = match username.or_else(|| std::env::var(USERNAME_ENV).ok()) {
            Some(u) => u,
            None => Self::prompt_username(self.config.last_username.as_deref())?,
        };
        if username.is_empty() {
            eprintln!("Username required");
            return Ok(1);
        }

        let password = match std::env::var(PASSWORD_ENV) {
            Ok(p) if !p.is_empty() => p,
            _ => Self::prompt_password()?,
        };

        println!("Authenticating...");

        match self.manager.login(&username, &password).await {
            Ok(user) => {
                self.config.last_username = Some(username);
                if let Err(e) = self.config.save() {
                    warn!(error = %e, "Failed to save config");
                }
                println!("Logged in as {} ({})", user.username, user.role);
                Ok(0)
            }
            Err(e) => {
                eprintln!("Login failed: {}", e);
                Ok(1)
            }
        }
    }

    fn logout(&self) -> i32 {
        self.manager.logout();
        println!("Logged out");
        0
    }

    fn status(&self) -> i32 {
        match self.manager.state() {
            AuthState::Authenticated(session) => {
                let user = session.user();
                let claims = session.claims();
                let now = chrono::Utc::now().timestamp();
                let expires = DateTime::from_timestamp(claims.exp, 0)
                    .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_else(|| claims.exp.to_string());

                println!("User:    {} (id {})", user.username, user.id);
                println!("Role:    {}", user.role);
                println!(
                    "Expires: {} ({})",
                    expires,
                    format_remaining(claims.seconds_until_expiry(now))
                );
                0
            }
            _ => {
                println!("Not logged in");
                1
            }
        }
    }

    async fn get(&self, url: &str) -> Result<i32> {
        let response = match self.client.execute(self.client.get(url)).await {
            Ok(response) => response,
            Err(e) if e.requires_login() => {
                eprintln!("{}. Run `tokenkeep login`.", e);
                return Ok(1);
            }
            Err(e) => return Err(e.into()),
        };

        let status = response.status();
        let body = response.text().await?;
        eprintln!("HTTP {}", status);

        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
            Err(_) => println!("{}", body),
        }

        Ok(if status.is_success() { 0 } else { 1 })
    }

    fn prompt_username(last_username: Option<&str>) -> Result<String> {
        match last_username {
            Some(last) => print!("Username [{}]: ", last),
            None => print!("Username: "),
        }
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim();

        Ok(match (input.is_empty(), last_username) {
            (true, Some(last)) => last.to_string(),
            _ => input.to_string(),
        })
    }

    fn prompt_password() -> Result<String> {
        let password = rpassword::prompt_password("Password: ")?;
        Ok(password)
    }
}

/// Human-readable time left, e.g. "23h 59m left"
fn format_remaining(secs: i64) -> String {
    if secs <= 0 {
        return "expired".to_string();
    }
    let minutes = secs / 60;
    if minutes < 1 {
        format!("{}s left", secs)
    } else if minutes < 60 {
        format!("{}m left", minutes)
    } else {
        format!("{}h {}m left", minutes / 60, minutes % 60)
    }
}
