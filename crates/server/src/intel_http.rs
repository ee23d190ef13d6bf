//! `IntelClient` over the threat-intelligence REST API (JSON:API flavoured).

use async_trait::async_trait;
use intelbot_core::{
    config::IntelConfig,
    domain::{entity::Entity, lookup::LookupResponse, lookup::LookupResult, source::Source},
    errors::IntelError,
    intel::IntelClient,
};
use reqwest::{header, Client, Method, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::debug;

const CONTENT_TYPE: &str = "application/vnd.api+json";
const RUNNING_FILTER: [(&str, &str); 2] =
    [("filter[integration.status]", "running"), ("page[size]", "300")];

pub struct HttpIntelClient {
    client: Client,
    base_url: Url,
    api_key: SecretString,
}

impl HttpIntelClient {
    /// Proxies come from `HTTPS_PROXY` / `HTTP_PROXY`, which reqwest reads by default.
    pub fn new(config: &IntelConfig) -> Result<Self, IntelError> {
        let base_url = Url::parse(&config.base_url())
            .map_err(|error| IntelError::Transport(format!("invalid intel hostname: {error}")))?;
        let client = Client::builder()
            .timeout(config.timeout())
            .danger_accept_invalid_certs(config.ignore_tls_errors)
            .build()
            .map_err(|error| IntelError::Transport(error.to_string()))?;

        Ok(Self { client, base_url, api_key: config.api_key.clone() })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, IntelError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| IntelError::Transport(format!("`{}` cannot be a base url", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn call(
        &self,
        method: Method,
        url: Url,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<Value, IntelError> {
        let body = body.map(|body| body.to_string());
        let mut builder = self
            .client
            .request(method.clone(), url)
            .query(query)
            .bearer_auth(self.api_key.expose_secret())
            .header(header::CONTENT_TYPE, CONTENT_TYPE);
        if let Some(body) = &body {
            builder = builder.body(body.clone());
        }
        let request = builder.build().map_err(|error| IntelError::Transport(error.to_string()))?;
        let url = request.url().to_string();

        debug!(event_name = "intel.http.request", method = %method, url = %url, "calling intel api");
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|error| IntelError::Transport(error.to_string()))?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|error| IntelError::Transport(error.to_string()))?;

        if !status.is_success() {
            let request = RequestSummary {
                url,
                method: method.as_str(),
                authorization: redacted_bearer(self.api_key.expose_secret()),
                body,
            };
            return Err(api_error(status, &bytes, request));
        }

        serde_json::from_slice(&bytes).map_err(|error| IntelError::Decode(error.to_string()))
    }
}

#[async_trait]
impl IntelClient for HttpIntelClient {
    async fn parse_entities(&self, text: &str) -> Result<Vec<Entity>, IntelError> {
        let url = self.endpoint(&["api", "parsed-entities"])?;
        let body = json!({ "data": { "attributes": { "text": text } } });
        let response = self.call(Method::POST, url, &[], Some(body)).await?;

        field_or_default(&response, "/data/attributes/entities")
    }

    async fn lookup(
        &self,
        entities: &[Entity],
        source_id: &str,
    ) -> Result<LookupResponse, IntelError> {
        if entities.is_empty() {
            return Ok(LookupResponse::default());
        }

        let url = self.endpoint(&["api", "integrations", source_id, "lookup"])?;
        let body = json!({
            "data": { "type": "integration-lookups", "attributes": { "entities": entities } }
        });
        let response = self.call(Method::POST, url, &[], Some(body)).await?;

        Ok(LookupResponse {
            searched_entities: field_or_default(&response, "/data/attributes/entities")?,
            results: field_or_default::<Vec<LookupResult>>(&response, "/data/attributes/results")?,
        })
    }

    async fn running_sources(&self) -> Result<Vec<Source>, IntelError> {
        let url = self.endpoint(&["api", "integrations"])?;
        let response = self.call(Method::GET, url, &RUNNING_FILTER, None).await?;

        let Some(items) = response.get("data").and_then(Value::as_array) else {
            return Ok(Vec::new());
        };
        Ok(items.iter().filter_map(source_from_item).collect())
    }
}

fn field_or_default<T>(response: &Value, pointer: &str) -> Result<T, IntelError>
where
    T: DeserializeOwned + Default,
{
    match response.pointer(pointer) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => T::deserialize(value)
            .map_err(|error| IntelError::Decode(format!("{pointer}: {error}"))),
    }
}

fn source_from_item(item: &Value) -> Option<Source> {
    let id = match item.get("id")? {
        Value::String(id) => id.clone(),
        Value::Number(id) => id.to_string(),
        _ => return None,
    };
    let attribute = |name: &str| {
        item.pointer(&format!("/attributes/{name}")).and_then(Value::as_str).unwrap_or("").to_owned()
    };

    Some(Source::new(id, attribute("name"), attribute("acronym")))
}

struct RequestSummary<'a> {
    url: String,
    method: &'a str,
    authorization: String,
    body: Option<String>,
}

/// Message is the first error's nested detail, then its own detail, then the
/// status line. Meta is the first error object plus the sanitized request.
fn api_error(status: StatusCode, body: &[u8], request: RequestSummary<'_>) -> IntelError {
    let first = serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|body| body.get("errors")?.get(0).cloned());

    let status_line = format!("{} {}", status.as_u16(), status.canonical_reason().unwrap_or(""))
        .trim_end()
        .to_owned();
    let message = first
        .as_ref()
        .and_then(|first| {
            first
                .pointer("/meta/errors/0/detail")
                .and_then(Value::as_str)
                .or_else(|| first.get("detail").and_then(Value::as_str))
        })
        .map(str::to_owned)
        .unwrap_or(status_line);

    let mut meta = match first {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    meta.insert(
        "request".to_owned(),
        json!({
            "url": request.url,
            "method": request.method,
            "headers": {
                "Authorization": request.authorization,
                "Content-Type": CONTENT_TYPE,
            },
            "body": request.body,
        }),
    );

    IntelError::api(message, meta)
}

fn redacted_bearer(token: &str) -> String {
    let prefix: String = token.chars().take(4).collect();
    format!("Bearer {prefix}…redacted")
}
