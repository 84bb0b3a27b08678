//! Authenticates against the UAT environment and lists the first page of projects.
//!
//! Run with tracing enabled:
//! ```sh
//! SAMPLIFY_CLIENT_ID=api SAMPLIFY_USERNAME=me SAMPLIFY_PASSWORD=secret \
//!   RUST_LOG=info,hyper_util=off,hyper=off,reqwest=off,h2=off,rustls=off \
//!   cargo run --example quickstart --features tracing
//! ```

use samplify_client_sdk::auth::Credentials;
use samplify_client_sdk::client::Environment;
use samplify_client_sdk::query::{Filter, QueryField, QueryOptions, Sort, SortDirection};
use samplify_client_sdk::{Client, Config};
use tracing::{debug, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let credentials = Credentials::new(
        &std::env::var("SAMPLIFY_CLIENT_ID")?,
        &std::env::var("SAMPLIFY_USERNAME")?,
        std::env::var("SAMPLIFY_PASSWORD")?,
    );
    let config = Config::builder()
        .endpoints(Environment::Uat.endpoints()?)
        .build();
    let client = Client::new(credentials, config)?;

    match client.health_status().await {
        Ok(response) => info!(endpoint = "health_status", body = %response.body),
        Err(e) => debug!(endpoint = "health_status", error = %e),
    }

    let options = QueryOptions::builder()
        .filters(vec![Filter::new(QueryField::State, "LAUNCHED")])
        .sort(vec![Sort::new(QueryField::CreatedAt, SortDirection::Desc)])
        .limit(10)
        .build();

    match client.projects(&options).await {
        Ok(response) => info!(
            endpoint = "projects",
            request_id = ?response.request_id,
            bytes = response.body.len()
        ),
        Err(e) => debug!(endpoint = "projects", error = %e),
    }

    client.logout().await?;

    Ok(())
}
