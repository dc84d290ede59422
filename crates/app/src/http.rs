//! Blocking HTTP clients for the network collaborators.

use std::time::Duration;

use mindbeat_core::{
    overpass_query, parse_overpass_json, ChatBackend, ChatConfig, ChatMessage, Classification,
    ClassifierConfig, EmotionClassifier, Location, Locator, MindbeatError, NetworkConfig,
    ProviderDirectory, ProviderListing, Region, Result,
};
use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};

use crate::camera::CameraFrame;

fn network_error(err: reqwest::Error) -> MindbeatError {
    MindbeatError::network(err.to_string())
}

fn client(timeout: Option<Duration>) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(network_error)
}

fn body_text(response: Response) -> Result<String> {
    response
        .error_for_status()
        .and_then(Response::text)
        .map_err(network_error)
}

/// IP-based geolocation (ipinfo.io compatible).
pub struct IpInfoLocator {
    client: Client,
    url: String,
}

impl IpInfoLocator {
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        Ok(Self {
            client: client(Some(config.geolocation_timeout()))?,
            url: config.geolocation_url.clone(),
        })
    }
}

impl Locator for IpInfoLocator {
    fn locate(&mut self) -> Result<Location> {
        let response = self.client.get(&self.url).send().map_err(network_error)?;
        Location::from_ipinfo_json(&body_text(response)?)
    }
}

/// OpenStreetMap Overpass interpreter.
pub struct OverpassDirectory {
    client: Client,
    url: String,
}

impl OverpassDirectory {
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        Ok(Self {
            client: client(Some(config.provider_timeout()))?,
            url: config.provider_url.clone(),
        })
    }
}

impl ProviderDirectory for OverpassDirectory {
    fn nearby(&mut self, center: &Location, radius_m: u32) -> Result<Vec<ProviderListing>> {
        let query = overpass_query(center, radius_m);
        tracing::debug!(radius_m, city = %center.city, "querying overpass");
        let response = self
            .client
            .post(&self.url)
            .form(&[("data", query)])
            .send()
            .map_err(network_error)?;
        parse_overpass_json(&body_text(response)?)
    }
}

/// Emotion recognition service that accepts a JPEG body and answers with a
/// DeepFace-style analysis.
pub struct HttpEmotionClassifier {
    client: Client,
    endpoint: String,
}

impl HttpEmotionClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        Ok(Self {
            client: client(config.timeout())?,
            endpoint: config.endpoint.clone(),
        })
    }
}

impl EmotionClassifier<CameraFrame> for HttpEmotionClassifier {
    fn classify(&mut self, frame: &CameraFrame, region: Region) -> Result<Classification> {
        let jpeg = frame.encode_region(region)?;
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "image/jpeg")
            .body(jpeg)
            .send()
            .map_err(|err| MindbeatError::classifier(err.to_string()))?;
        let body = body_text(response)?;
        Classification::from_json(&body)
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat completion endpoint (OpenRouter by default).
pub struct CompletionClient {
    client: Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
    api_key: Option<String>,
}

impl CompletionClient {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).ok();
        if api_key.is_none() {
            tracing::warn!(variable = %config.api_key_env, "no chat API key set");
        }
        Ok(Self {
            client: client(Some(config.timeout()))?,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            api_key,
        })
    }
}

impl ChatBackend for CompletionClient {
    fn complete(&mut self, messages: &[ChatMessage]) -> Result<String> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
        };
        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response: CompletionResponse = builder
            .send()
            .and_then(Response::error_for_status)
            .and_then(Response::json)
            .map_err(network_error)?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| MindbeatError::network("completion response has no reply"))
    }
}
