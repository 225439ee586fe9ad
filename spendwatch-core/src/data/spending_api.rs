//! spending.gov.ua transactions API client.
//!
//! One GET per day with `startdate = enddate = day`. No pagination and no
//! retry: a failure is reported and the day waits for the next firing.

use chrono::NaiveDate;
use serde_json::Value;
use std::time::Duration;

use super::provider::{FetchError, FetchOutcome, TransactionSource};
use crate::config::ApiConfig;
use crate::domain::{RawTransaction, DATE_FORMAT};

/// Blocking HTTP source backed by the public spending API.
pub struct SpendingApi {
    client: reqwest::blocking::Client,
    base_url: String,
    timeout: Duration,
}

impl SpendingApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            timeout,
        })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, FetchError> {
        Self::new(config.base_url.clone(), config.timeout())
    }

    /// Query parameters for a single-day window.
    pub fn query_params(day: NaiveDate) -> [(&'static str, String); 2] {
        let date = day.format(DATE_FORMAT).to_string();
        [("startdate", date.clone()), ("enddate", date)]
    }

    fn classify(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout {
                secs: self.timeout.as_secs(),
            }
        } else if let Some(status) = e.status() {
            FetchError::HttpStatus {
                status: status.as_u16(),
            }
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

impl TransactionSource for SpendingApi {
    fn name(&self) -> &str {
        "spending_gov_ua"
    }

    fn fetch(&self, day: NaiveDate) -> Result<FetchOutcome, FetchError> {
        log::debug!("GET {} for {day}", self.base_url);

        let resp = self
            .client
            .get(&self.base_url)
            .query(&Self::query_params(day))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let body = resp.text().map_err(|e| self.classify(e))?;
        parse_body(&body)
    }
}

/// Interpret a response body.
///
/// Empty, `null` and `[]` mean the API has nothing for the day. Anything else
/// must be a JSON array of objects.
pub fn parse_body(body: &str) -> Result<FetchOutcome, FetchError> {
    if body.trim().is_empty() {
        return Ok(FetchOutcome::NoData);
    }

    let value: Value =
        serde_json::from_str(body).map_err(|e| FetchError::MalformedBody(e.to_string()))?;

    let items = match value {
        Value::Null => return Ok(FetchOutcome::NoData),
        Value::Array(items) => items,
        other => {
            return Err(FetchError::MalformedBody(format!(
                "expected a JSON array, got {}",
                json_kind(&other)
            )))
        }
    };

    if items.is_empty() {
        return Ok(FetchOutcome::NoData);
    }

    let records = items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => Ok(map),
            other => Err(FetchError::MalformedBody(format!(
                "element {i} is {}, expected an object",
                json_kind(&other)
            ))),
        })
        .collect::<Result<Vec<RawTransaction>, _>>()?;

    Ok(FetchOutcome::Records(records))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
