use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, ORIGIN, REFERER, USER_AGENT};

pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

static CLIENT: OnceCell<Client> = OnceCell::new();

/// Shared provider client. The timeout is fixed by the first caller.
pub fn http_client(timeout_secs: u64) -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| build_client(timeout_secs))
}

fn build_client(timeout_secs: u64) -> Result<Client> {
    // The feed rejects requests that do not look like they come from the
    // league's own site.
    let mut headers = HeaderMap::new();
    headers.insert(ORIGIN, HeaderValue::from_static("https://www.premierleague.com"));
    headers.insert(REFERER, HeaderValue::from_static("https://www.premierleague.com/"));
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
        ),
    );
    headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-GB,en;q=0.9"));

    Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .default_headers(headers)
        .build()
        .context("failed to build http client")
}
