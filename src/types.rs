//! Data structures decoded from the discovery endpoint.
//!
//! The payload is a JSON document with three groups: raw port bindings,
//! logical service bindings and a bag of free-form options.  Decoding is
//! lenient: missing fields take their zero value, `null` collections are
//! treated as empty and unknown fields are ignored, so the endpoint can grow
//! new fields without breaking older sidecars.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Host used for the backend when a binding carries no `inner_ip` option.
pub const DEFAULT_INNER_IP: &str = "127.0.0.1";

/// One configuration snapshot as served by the discovery endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Snapshot {
    #[serde(deserialize_with = "null_as_default")]
    pub base_ports: Vec<PortBinding>,
    #[serde(deserialize_with = "null_as_default")]
    pub base_services: Vec<ServiceBinding>,
    #[serde(deserialize_with = "null_as_default")]
    pub base_normal: NormalOptions,
}

/// A listen/inner port pair for one dependency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PortBinding {
    #[serde(rename = "port")]
    pub inner_port: u16,
    pub listen_port: u16,
    pub protocol: String,
    pub depend_service_id: String,
    pub depend_service_alias: String,
    #[serde(deserialize_with = "null_as_default")]
    pub options: HashMap<String, String>,
}

/// A logical dependency on another service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceBinding {
    pub depend_service_id: String,
    pub depend_service_alias: String,
    pub port: u16,
    pub protocol: String,
    #[serde(deserialize_with = "null_as_default")]
    pub options: HashMap<String, String>,
}

/// Options not tied to any port or service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct NormalOptions {
    #[serde(deserialize_with = "null_as_default")]
    pub options: HashMap<String, String>,
}

impl Snapshot {
    /// Decode a raw discovery payload. A JSON `null` is an empty snapshot.
    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice::<Option<Self>>(payload).map(Option::unwrap_or_default)
    }

    /// The binding used for rendering.
    ///
    /// Only the first port binding is ever consulted; the rest are carried
    /// along but ignored by the renderer.
    pub fn primary_port(&self) -> Option<&PortBinding> {
        self.base_ports.first()
    }
}

impl PortBinding {
    /// The backend host: the `inner_ip` option, or loopback.
    pub fn inner_ip(&self) -> &str {
        self.options
            .get("inner_ip")
            .map(String::as_str)
            .unwrap_or(DEFAULT_INNER_IP)
    }

    /// `protocol://host:inner_port`, the value substituted for `__backend__`.
    pub fn backend(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.inner_ip(), self.inner_port)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
