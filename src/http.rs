use std::time::Duration;

use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::errors::{GeoError, GeoResult};

pub(crate) fn build_client(user_agent: &str, timeout_ms: u64) -> GeoResult<Client> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_millis(timeout_ms))
        .build()
        .map_err(|err| GeoError::Config(format!("failed to build HTTP client: {err}")))
}

pub(crate) fn parse_base_url(raw: &str) -> GeoResult<Url> {
    let url = Url::parse(raw)
        .map_err(|err| GeoError::Config(format!("invalid base URL {raw:?}: {err}")))?;
    if url.cannot_be_a_base() {
        return Err(GeoError::Config(format!("base URL {raw:?} cannot carry a path")));
    }
    Ok(url)
}

pub(crate) fn endpoint(base: &Url, segment: &str) -> GeoResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| GeoError::Config(format!("invalid base URL: {base}")))?
        .pop_if_empty()
        .push(segment);
    Ok(url)
}

// Error text names `operation`, never the URL (it can carry the API key).
pub(crate) async fn get_json<T: DeserializeOwned>(
    http: &Client,
    url: Url,
    operation: &str,
) -> GeoResult<T> {
    debug!(operation, path = url.path(), "upstream request");
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|err| GeoError::transport(operation, err))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.ok();
        return Err(GeoError::upstream(operation, Some(status.as_u16()), body));
    }

    response
        .json::<T>()
        .await
        .map_err(|err| GeoError::transport(operation, err))
}
