use std::time::Duration;
use std::time::Instant;

use flume::SendError;
use flume::Sender;
use reqwest::Client;
use reqwest::Method;
use reqwest::Response;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde_json::Value;
use thiserror::Error;
use tokio::time::sleep;
use url::Url;

use crate::config::Config;
use crate::inspect;
use crate::inspect::Extracted;
use crate::profile::ProfileKind;
use crate::profile::RequestProfile;
use crate::scenario::BodyCheck;
use crate::scenario::Scenario;
use crate::scenario::StatusSet;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("channel error")]
    ChannelError(#[from] SendError<ScenarioRun>),

    #[error("failed to build http client")]
    ClientError(#[from] reqwest::Error),
}

/// Everything the classifier needs to turn one executed scenario into an
/// outcome.
#[derive(Debug)]
pub struct ScenarioRun {
    pub name: String,
    pub method: String,
    pub path: String,
    pub expected: StatusSet,
    pub body_check: BodyCheck,
    pub response: Option<CapturedResponse>,
    pub transport_error: Option<String>,
    pub skip_reason: Option<String>,
    pub duration: Duration,
}

impl ScenarioRun {
    fn skipped(scenario: &Scenario, reason: String, duration: Duration) -> Self {
        Self {
            name: scenario.name.clone(),
            method: scenario.method.to_string(),
            path: scenario.path.clone(),
            expected: scenario.expected.clone(),
            body_check: scenario.body_check.clone(),
            response: None,
            transport_error: None,
            skip_reason: Some(reason),
            duration,
        }
    }
}

enum Resolved {
    Path(String),
    Unmet(String),
}

/// Runs the planned scenarios strictly in order, one at a time.
///
/// Purchases mutate server-side inventory and the API gives the client no
/// isolation guarantee, so nothing here runs concurrently. The only
/// suspension points are the HTTP calls themselves.
pub async fn run_scenarios(
    plan: Vec<Scenario>,
    config: Config,
    tx: Sender<ScenarioRun>,
) -> Result<(), RunnerError> {
    let client = Client::builder().timeout(config.timeout).build()?;
    // Mutating calls get the long timeout, the server is slower there.
    let slow_client = Client::builder().timeout(config.long_timeout).build()?;

    let authorized = RequestProfile::build(&ProfileKind::Authorized, &config);

    for scenario in plan {
        let pre_fetch_started = Instant::now();

        let path = if scenario.pre_fetch.is_some() {
            match resolve_pre_fetch(&scenario, &client, &authorized, &config).await {
                Resolved::Path(path) => path,
                Resolved::Unmet(reason) => {
                    tx.send_async(ScenarioRun::skipped(
                        &scenario,
                        reason,
                        pre_fetch_started.elapsed(),
                    ))
                    .await?;
                    continue;
                }
            }
        } else {
            scenario.path.clone()
        };

        // The recorded duration covers the main request and its retries,
        // not the pre-fetch round-trip.
        let started = Instant::now();

        let url = match config.join(&path) {
            Ok(url) => url,
            Err(error) => {
                tx.send_async(failed_to_send(&scenario, &path, error.to_string(), started))
                    .await?;
                continue;
            }
        };

        let profile = RequestProfile::build(&scenario.profile, &config);
        let picked = if scenario.method == Method::GET {
            &client
        } else {
            &slow_client
        };

        let result = send_with_retries(picked, &scenario, url, &profile, &config).await;
        let duration = started.elapsed();

        let run = match result {
            Ok(response) => ScenarioRun {
                name: scenario.name.clone(),
                method: scenario.method.to_string(),
                path,
                expected: scenario.expected.clone(),
                body_check: scenario.body_check.clone(),
                response: Some(CapturedResponse::from_response(response).await),
                transport_error: None,
                skip_reason: None,
                duration,
            },
            Err(error) => failed_to_send(&scenario, &path, error.to_string(), started),
        };

        tx.send_async(run).await?;
    }

    Ok(())
}

fn failed_to_send(scenario: &Scenario, path: &str, error: String, started: Instant) -> ScenarioRun {
    ScenarioRun {
        name: scenario.name.clone(),
        method: scenario.method.to_string(),
        path: path.to_string(),
        expected: scenario.expected.clone(),
        body_check: scenario.body_check.clone(),
        response: None,
        transport_error: Some(error),
        skip_reason: None,
        duration: started.elapsed(),
    }
}

/// Issues the scenario's pre-fetch read and substitutes the extracted value
/// into the main request path. Every way this can come up short is a
/// precondition-unmet, which the classifier turns into a Skip.
async fn resolve_pre_fetch(
    scenario: &Scenario,
    client: &Client,
    profile: &RequestProfile,
    config: &Config,
) -> Resolved {
    let Some(pre_fetch) = &scenario.pre_fetch else {
        return Resolved::Path(scenario.path.clone());
    };

    let url = match config.join(&pre_fetch.path) {
        Ok(url) => url,
        Err(error) => return Resolved::Unmet(format!("pre-fetch URL invalid: {error}")),
    };

    let response = match client.get(url).headers(profile.headers()).send().await {
        Ok(response) => response,
        Err(error) => return Resolved::Unmet(format!("pre-fetch request failed: {error}")),
    };

    if !response.status().is_success() {
        return Resolved::Unmet(format!(
            "pre-fetch of {} answered {}",
            pre_fetch.path,
            response.status()
        ));
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(error) => return Resolved::Unmet(format!("pre-fetch body unreadable: {error}")),
    };

    let record = inspect::find_by_id(
        &body,
        &pre_fetch.list_path,
        &pre_fetch.id_field,
        &Value::from(pre_fetch.id_value),
    );
    let Extracted::Present(record) = record else {
        return Resolved::Unmet(format!(
            "no record with {} = {} in {}",
            pre_fetch.id_field, pre_fetch.id_value, pre_fetch.path
        ));
    };

    let Some(value) = inspect::extract_value(&record, &pre_fetch.take_field).as_i64() else {
        return Resolved::Unmet(format!(
            "field `{}` absent or not a number on record {}",
            pre_fetch.take_field, pre_fetch.id_value
        ));
    };

    let substituted = (value + pre_fetch.offset).to_string();
    Resolved::Path(scenario.path.replace(&pre_fetch.placeholder, &substituted))
}

/// Sends the main request. Only scenarios flagged as idempotent reads get
/// the configured retry budget, and only for transport-level failures; a
/// response with an unexpected status is an answer, not a retryable error.
async fn send_with_retries(
    client: &Client,
    scenario: &Scenario,
    url: Url,
    profile: &RequestProfile,
    config: &Config,
) -> Result<Response, reqwest::Error> {
    let max_attempts = if scenario.idempotent_read {
        config.retry_max_attempts
    } else {
        1
    };

    let mut attempt = 0;
    loop {
        attempt += 1;

        let mut request = client
            .request(scenario.method.clone(), url.clone())
            .headers(profile.headers());
        if let Some(body) = &scenario.body {
            request = request.json(body);
        }

        match request.send().await {
            Ok(response) => return Ok(response),
            Err(error) => {
                if attempt >= max_attempts {
                    return Err(error);
                }
            }
        }

        sleep(config.retry_delay).await;
    }
}

#[derive(Debug)]
pub struct CapturedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body_text: String,
    pub body_json: Option<serde_json::Value>,
}

impl CapturedResponse {
    pub async fn from_response(response: Response) -> Self {
        let status = response.status();
        let headers = response.headers().clone();

        // Consume the body exactly once
        let body_text = match response.text().await {
            Ok(text) => text,
            Err(error) => format!("Failed to read body: {}", error),
        };

        // Attempt to parse JSON, but don't panic
        let body_json = serde_json::from_str::<serde_json::Value>(&body_text).ok();

        Self {
            status,
            headers,
            body_text,
            body_json,
        }
    }
}
