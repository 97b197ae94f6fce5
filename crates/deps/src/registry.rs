use crate::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

pub const MAVEN_CENTRAL_URL: &str = "https://search.maven.org";

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coordinate {
    pub group: String,
    pub artifact: String,
    pub version: String,
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)
    }
}

/// Maps an imported class name to the artifact that ships it.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn lookup(&self, class_name: &str) -> Result<Option<Coordinate>>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    response: SearchDocs,
}

#[derive(Debug, Deserialize)]
struct SearchDocs {
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Deserialize)]
struct SearchDoc {
    g: String,
    a: String,
    #[serde(rename = "latestVersion")]
    latest_version: Option<String>,
    v: Option<String>,
}

/// Maven Central's Solr search (`fc:` = fully qualified class name).
#[derive(Debug, Clone)]
pub struct MavenCentralClient {
    client: Client,
    base_url: String,
}

impl MavenCentralClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(LOOKUP_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for MavenCentralClient {
    fn default() -> Self {
        Self::new(MAVEN_CENTRAL_URL)
    }
}

#[async_trait]
impl RegistryClient for MavenCentralClient {
    async fn lookup(&self, class_name: &str) -> Result<Option<Coordinate>> {
        let url = format!("{}/solrsearch/select", self.base_url);
        let body: SearchResponse = self
            .client
            .get(url)
            .query(&[
                ("q", format!("fc:{class_name}")),
                ("rows", "1".to_string()),
                ("wt", "json".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(parse_first(body))
    }
}

fn parse_first(body: SearchResponse) -> Option<Coordinate> {
    body.response.docs.into_iter().next().map(|doc| Coordinate {
        group: doc.g,
        artifact: doc.a,
        version: doc
            .latest_version
            .or(doc.v)
            .unwrap_or_else(|| "LATEST".to_string()),
    })
}
