use std::time::Duration;

use apicall_http::{
    ApiClient, BearerAuth, CallOptions, ClientConfig, LogLevel, LoggingOptions, RetryOptions,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let base_url = std::env::var("API_BASE_URL")?;
    let token = std::env::var("API_TOKEN").unwrap_or_default();

    let client = ApiClient::new(
        ClientConfig::new(base_url)
            .default_header("accept", "application/json")
            .request_interceptor(BearerAuth::new(token))
            .with_logging(LoggingOptions::enabled(LogLevel::Info).with_sink(|level, message| {
                println!("[{level}] {message}");
            }))
            .with_retry(RetryOptions::enabled(3).with_interval(Duration::from_millis(500)))
            .on_exception(|err| eprintln!("request failed: {err}")),
    );

    let status = client.call(
        CallOptions::get("/status")
            .ttl(Duration::from_secs(30))
            .refresh(Duration::from_secs(5)),
    );
    let mut updates = status.subscribe();

    status.fetch().await;
    for _ in 0..3 {
        updates.changed().await?;
        let snapshot = updates.borrow_and_update().clone();
        if let Some(response) = snapshot.response {
            println!("{} -> {}", response.status, response.text());
        }
    }

    status.polling().pause();
    Ok(())
}
