//! Application identity and the native-messaging host manifest.

use serde::{Deserialize, Serialize};

use crate::config::RuntimeConfig;
use crate::protocol::Response;

pub const APP_NAME: &str = "filewatcher";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_DESCRIPTION: &str = "Native client for FileWatcher browser webextension";
pub const PROTOCOL_VERSION: &str = "1.0";
pub const EXTENSION_ID: &str = "filewatcher@coolsoft.altervista.org";

/// Host manifest the browser reads to find and launch this binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostManifest {
    pub name: String,
    pub description: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub allowed_extensions: Vec<String>,
}

impl HostManifest {
    /// Firefox manifest pointing at `executable`.
    pub fn firefox(executable: &str) -> Self {
        Self {
            name: APP_NAME.to_string(),
            description: APP_DESCRIPTION.to_string(),
            path: executable.to_string(),
            kind: "stdio".to_string(),
            allowed_extensions: vec![EXTENSION_ID.to_string()],
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Response to a `version` request.
pub fn version_response(runtime: &RuntimeConfig) -> Response {
    Response::Version {
        version: APP_VERSION.to_string(),
        executable: runtime.executable_display(),
        protocol_version: PROTOCOL_VERSION.to_string(),
    }
}
