use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::client::RateLimitedClient;
use crate::error::{Result, SyncError};
use crate::types::SubjectId;

pub const DEFAULT_SECONDARY_CAPE_TEMPLATE: &str =
    "http://s.optifine.net/capes/{name}.png";

/// Canonical identity of a subject with its decoded texture URLs.
#[derive(Clone, Debug, PartialEq)]
pub struct IdentityProfile {
    pub id: SubjectId,
    pub name: String,
    pub skin_url: Option<String>,
    pub cape_url: Option<String>,
    pub raw: Value,
}

#[async_trait]
pub trait IdentityApi: Send + Sync + fmt::Debug {
    async fn profile(&self, subject: &SubjectId) -> Result<IdentityProfile>;

    /// Best-effort lookup of the optional secondary cape. `None` covers both
    /// "no such cape" and any probe failure.
    async fn probe_secondary_cape(&self, name: &str) -> Option<String>;
}

#[derive(Debug, Deserialize)]
struct ProfileBody {
    id: String,
    name: String,
    #[serde(default)]
    properties: Vec<ProfileProperty>,
}

#[derive(Debug, Deserialize)]
struct ProfileProperty {
    name: String,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct TexturesBody {
    #[serde(default)]
    textures: TextureUrls,
}

#[derive(Debug, Default, Deserialize)]
struct TextureUrls {
    #[serde(rename = "SKIN")]
    skin: Option<TextureRef>,
    #[serde(rename = "CAPE")]
    cape: Option<TextureRef>,
}

#[derive(Debug, Deserialize)]
struct TextureRef {
    url: String,
}

/// Skin and cape URLs carried in a base64 `textures` profile property.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodedTextures {
    pub skin_url: Option<String>,
    pub cape_url: Option<String>,
}

pub fn decode_textures(encoded: &str) -> Result<DecodedTextures> {
    let bytes = Base64
        .decode(encoded.trim())
        .map_err(|err| SyncError::Decode(format!("textures property: {err}")))?;
    let body: TexturesBody = serde_json::from_slice(&bytes)
        .map_err(|err| SyncError::Decode(format!("textures payload: {err}")))?;

    Ok(DecodedTextures {
        skin_url: body.textures.skin.map(|t| t.url),
        cape_url: body.textures.cape.map(|t| t.url),
    })
}

/// HEAD probe against a per-name URL template containing `{name}`.
#[derive(Debug, Clone)]
pub struct TextureProbe {
    http: reqwest::Client,
    template: String,
}

impl TextureProbe {
    pub fn new(template: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            template: template.into(),
        })
    }

    pub async fn probe(&self, name: &str) -> Option<String> {
        if name.is_empty()
            || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return None;
        }

        let url = self.template.replace("{name}", name);
        match self.http.head(&url).send().await {
            Ok(response) if response.status().is_success() => Some(url),
            Ok(response) => {
                debug!(target: "upstream", %url, status = response.status().as_u16(), "no secondary texture");
                None
            }
            Err(err) => {
                debug!(target: "upstream", %url, error = %err, "secondary texture probe failed");
                None
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct MojangIdentityApi {
    client: Arc<RateLimitedClient>,
    probe: Option<TextureProbe>,
}

impl MojangIdentityApi {
    pub fn new(client: Arc<RateLimitedClient>, probe: Option<TextureProbe>) -> Self {
        Self { client, probe }
    }
}

#[async_trait]
impl IdentityApi for MojangIdentityApi {
    async fn profile(&self, subject: &SubjectId) -> Result<IdentityProfile> {
        let raw = self
            .client
            .fetch_json(&format!("/session/minecraft/profile/{subject}"), None)
            .await?;
        let body: ProfileBody = serde_json::from_value(raw.clone())
            .map_err(|err| SyncError::Decode(format!("profile body: {err}")))?;

        let textures = body
            .properties
            .iter()
            .find(|property| property.name == "textures")
            .map(|property| decode_textures(&property.value))
            .transpose()
            .unwrap_or_else(|err| {
                warn!(target: "upstream", subject = %subject, error = %err, "undecodable textures, treating as none");
                None
            })
            .unwrap_or_default();

        Ok(IdentityProfile {
            id: SubjectId::parse(&body.id)?,
            name: body.name,
            skin_url: textures.skin_url,
            cape_url: textures.cape_url,
            raw,
        })
    }

    async fn probe_secondary_cape(&self, name: &str) -> Option<String> {
        self.probe.as_ref()?.probe(name).await
    }
}
