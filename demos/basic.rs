use std::time::Duration;

use backoff_http::{Context, ExponentialBackoff, HttpClient, HttpError, RequestOption};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let base_url = std::env::var("BACKOFF_HTTP_BASE_URL")?;

    let client = HttpClient::new(base_url)
        .with_header("accept", "application/json")
        .with_backoff(
            ExponentialBackoff::default().with_max_elapsed_time(Some(Duration::from_secs(10))),
        )
        .with_observer(|err: &HttpError, delay: Duration, attempt: usize| {
            eprintln!("attempt {attempt} failed ({err}); retrying in {delay:?}");
        });
    let ctx = Context::background().with_timeout(Duration::from_secs(30));

    let created = client
        .post(&ctx, "/users", [RequestOption::json(&json!({ "name": "Kit" }))])
        .await?;
    println!("created: {}", String::from_utf8_lossy(&created));

    match client
        .get(&ctx, "/users", [RequestOption::query([("page", "1")])])
        .await
    {
        Ok(body) => println!("users: {}", String::from_utf8_lossy(&body)),
        Err(err @ HttpError::ClientStatus { .. }) => eprintln!("rejected: {err}"),
        Err(err @ HttpError::RetryExhausted { .. }) => eprintln!("service unavailable: {err}"),
        Err(err) => return Err(err.into()),
    }

    Ok(())
}
