//! Shared HTTP request helpers for CLI commands.

use anyhow::{Context, Result};
use serde::Deserialize;

pub fn api_url(base: &str) -> String {
    format!("{}/api", base.trim_end_matches('/'))
}

pub async fn get_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    reqwest::get(url)
        .await
        .with_context(|| format!("failed to connect to facestreamd at {url}, is it running?"))?
        .error_for_status()
        .with_context(|| format!("request to {url} was rejected"))?
        .json::<T>()
        .await
        .context("failed to parse response")
}

pub async fn delete_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    reqwest::Client::new()
        .delete(url)
        .send()
        .await
        .with_context(|| format!("failed to connect to facestreamd at {url}, is it running?"))?
        .error_for_status()
        .with_context(|| format!("request to {url} was rejected"))?
        .json::<T>()
        .await
        .context("failed to parse response")
}
