use anyhow::{Context, Result};
use log::debug;
use reqwest::Method;
use serde_json::Value;

use crate::auth::{ProfileUpdate, RegisterData, Role, Session, TokenStore, User};
use crate::http::RequestOptions;

pub mod config;

use config::Config;

/// Sends one request and prints the response body as JSON.
#[tracing::instrument(skip(config, data))]
pub async fn send(
    config: &Config,
    method: Method,
    endpoint: &str,
    data: Option<&str>,
    with_auth: bool,
) -> Result<()> {
    let client = config.build_client()?;

    let mut options = RequestOptions::new()
        .with_method(method)
        .with_auth(with_auth)
        .with_retry_available(true);
    if let Some(data) = data {
        let body: Value = serde_json::from_str(data).context("--data is not valid JSON")?;
        options = options.with_body(body);
    }

    let response = client.request::<Value>(endpoint, options).await?;
    debug!("HTTP {}", response.status);
    print_json(&response.data)
}

#[tracing::instrument(skip(config, password))]
pub async fn login(config: &Config, email: &str, password: &str) -> Result<()> {
    let client = config.build_client()?;
    let user = Session::new(&client).login(email, password).await?;
    println!(
        "Signed in as {} {} <{}>",
        user.first_name, user.last_name, user.email
    );
    Ok(())
}

pub struct RegisterArgs<'a> {
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub role: &'a str,
}

#[tracing::instrument(skip(config, args))]
pub async fn register(config: &Config, args: RegisterArgs<'_>) -> Result<()> {
    let role: Role = args.role.parse()?;
    let data = RegisterData {
        first_name: args.first_name.to_string(),
        last_name: args.last_name.to_string(),
        email: args.email.to_string(),
        password: args.password.to_string(),
        role,
    };

    let client = config.build_client()?;
    let user = Session::new(&client).register(&data).await?;
    println!(
        "Registered {} {} <{}>",
        user.first_name, user.last_name, user.email
    );
    Ok(())
}

#[tracing::instrument(skip(config))]
pub async fn profile(config: &Config) -> Result<()> {
    let client = config.build_client()?;
    let user = Session::new(&client).profile().await?;
    print_user(&user)
}

#[tracing::instrument(skip(config))]
pub async fn update_profile(config: &Config, changes: ProfileUpdate) -> Result<()> {
    let client = config.build_client()?;
    let user = Session::new(&client).update_profile(&changes).await?;
    println!("Profile updated.");
    print_user(&user)
}

#[tracing::instrument(skip(config))]
pub fn logout(config: &Config) -> Result<()> {
    let client = config.build_client()?;
    Session::new(&client).logout()?;
    println!("Signed out.");
    Ok(())
}

/// Reports whether tokens are stored, without touching the network.
#[tracing::instrument(skip(config))]
pub fn status(config: &Config) -> Result<()> {
    let store = config.token_store()?;
    let tokens = store.get();

    if tokens.access_token.is_some() {
        println!("Signed in.");
    } else if tokens.refresh_token.is_some() {
        println!("Session expired; the next request will refresh it.");
    } else {
        println!("Not signed in.");
    }
    println!("Token file: {}", store.path().display());
    Ok(())
}

fn print_user(user: &User) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(user)?);
    Ok(())
}

fn print_json(value: &Value) -> Result<()> {
    match value {
        Value::String(text) => println!("{}", text),
        other => println!("{}", serde_json::to_string_pretty(other)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Tokens;
    use crate::error::{AppError, ErrorKind};
    use tempfile::tempdir;

    fn config(url: &str, dir: &tempfile::TempDir) -> Config {
        Config {
            api_url: Some(url.to_string()),
            token_file: Some(dir.path().join("tokens.json")),
            retries: Some(0),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_send_without_auth() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/exercises")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"name": "Bridge"}]"#)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        send(&config(&server.url(), &dir), Method::GET, "/exercises", None, false)
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_with_data() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/appointments")
            .match_header("authorization", "Bearer a")
            .match_body(mockito::Matcher::Json(serde_json::json!({"day": "friday"})))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": "apt-1"}"#)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let config = config(&server.url(), &dir);
        config.token_store().unwrap().set("a", "r").unwrap();

        send(
            &config,
            Method::POST,
            "/appointments",
            Some(r#"{"day": "friday"}"#),
            true,
        )
        .await
        .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_rejects_invalid_data() {
        let dir = tempdir().unwrap();
        let result = send(
            &config("http://127.0.0.1:1", &dir),
            Method::POST,
            "/appointments",
            Some("{oops"),
            false,
        )
        .await;

        assert!(result.unwrap_err().to_string().contains("not valid JSON"));
    }

    #[tokio::test]
    async fn test_send_requires_tokens() {
        let dir = tempdir().unwrap();
        let err = send(
            &config("http://127.0.0.1:1", &dir),
            Method::GET,
            "/progress",
            None,
            true,
        )
        .await
        .unwrap_err();

        let app_error = err.downcast_ref::<AppError>().unwrap();
        assert_eq!(app_error.kind, ErrorKind::Authentication);
    }

    #[tokio::test]
    async fn test_login_then_logout() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/auth/login")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"accessToken": "a", "refreshToken": "r", "user": {
                    "id": "user-1", "firstName": "Demo", "lastName": "User",
                    "email": "demo@example.com", "role": "patient"
                }}"#,
            )
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let config = config(&server.url(), &dir);

        login(&config, "demo@example.com", "password").await.unwrap();
        assert_eq!(config.token_store().unwrap().get(), Tokens::new("a", "r"));
        status(&config).unwrap();

        logout(&config).unwrap();
        assert!(config.token_store().unwrap().get().is_empty());
        assert!(!dir.path().join("tokens.json").exists());
    }

    #[tokio::test]
    async fn test_update_profile_puts_changes() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/users/profile")
            .match_header("authorization", "Bearer a")
            .match_body(mockito::Matcher::Json(serde_json::json!({"firstName": "Ada"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"id": "user-1", "firstName": "Ada", "lastName": "User",
                    "email": "demo@example.com", "role": "patient"}"#,
            )
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let config = config(&server.url(), &dir);
        config.token_store().unwrap().set("a", "r").unwrap();

        update_profile(
            &config,
            ProfileUpdate {
                first_name: Some("Ada".into()),
                ..ProfileUpdate::default()
            },
        )
        .await
        .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_register_rejects_unknown_role() {
        let dir = tempdir().unwrap();
        let result = register(
            &config("http://127.0.0.1:1", &dir),
            RegisterArgs {
                first_name: "Ada",
                last_name: "Lovelace",
                email: "ada@example.com",
                password: "secret",
                role: "surgeon",
            },
        )
        .await;

        assert!(result.unwrap_err().to_string().contains("Unknown role"));
    }
}
