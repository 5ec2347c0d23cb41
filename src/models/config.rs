use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// User configuration from Removbl Config.yaml
///
/// Contains the service endpoint, upload policy, and timing knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(rename = "Removbl_Settings")]
    pub settings: ClientSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Base URL of the remote processing service.
    #[serde(rename = "Service URL", default = "default_service_url")]
    pub service_url: String,

    #[serde(rename = "Process Path", default = "default_process_path")]
    pub process_path: String,

    #[serde(rename = "Health Path", default = "default_health_path")]
    pub health_path: String,

    /// Whole-exchange timeout for one submission, in seconds.
    #[serde(rename = "Request Timeout", default = "default_request_timeout")]
    pub request_timeout: u32,

    /// Seconds between background liveness probes.
    #[serde(rename = "Probe Interval", default = "default_probe_interval")]
    pub probe_interval: u32,

    /// Upload size ceiling enforced by the validator.
    #[serde(rename = "Max Upload Bytes", default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    /// Milliseconds between estimated-progress ticks.
    #[serde(rename = "Progress Tick Millis", default = "default_progress_tick_millis")]
    pub progress_tick_millis: u64,

    /// Highest value the estimator may report on its own. Clamped below
    /// 100; only a completed exchange pins 100.
    #[serde(rename = "Progress Ceiling", default = "default_progress_ceiling")]
    pub progress_ceiling: u8,

    /// MIME type to file extension mapping for generated download names.
    #[serde(rename = "Download Extensions", default = "default_download_extensions")]
    pub download_extensions: IndexMap<String, String>,

    #[serde(rename = "Debug Mode", default)]
    pub debug_mode: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
            process_path: default_process_path(),
            health_path: default_health_path(),
            request_timeout: default_request_timeout(),
            probe_interval: default_probe_interval(),
            max_upload_bytes: default_max_upload_bytes(),
            progress_tick_millis: default_progress_tick_millis(),
            progress_ceiling: default_progress_ceiling(),
            download_extensions: default_download_extensions(),
            debug_mode: false,
        }
    }
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            settings: ClientSettings::default(),
        }
    }
}

fn default_service_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_process_path() -> String {
    "/process".to_string()
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_request_timeout() -> u32 {
    60
}

fn default_probe_interval() -> u32 {
    30
}

fn default_max_upload_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_progress_tick_millis() -> u64 {
    200
}

fn default_progress_ceiling() -> u8 {
    95
}

fn default_download_extensions() -> IndexMap<String, String> {
    let mut extensions = IndexMap::new();
    extensions.insert("image/png".to_string(), "png".to_string());
    extensions.insert("image/jpeg".to_string(), "jpg".to_string());
    extensions.insert("image/webp".to_string(), "webp".to_string());
    extensions.insert("image/gif".to_string(), "gif".to_string());
    extensions.insert("image/bmp".to_string(), "bmp".to_string());
    extensions
}

impl ClientSettings {
    /// Full URL of the processing endpoint.
    pub fn submit_url(&self) -> String {
        format!("{}{}", self.service_url.trim_end_matches('/'), self.process_path)
    }

    /// Full URL of the liveness endpoint.
    pub fn probe_url(&self) -> String {
        format!("{}{}", self.service_url.trim_end_matches('/'), self.health_path)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.request_timeout))
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.probe_interval))
    }

    pub fn progress_cadence(&self) -> Duration {
        Duration::from_millis(self.progress_tick_millis)
    }

    /// Estimator ceiling, clamped so it can never reach the pinned 100.
    pub fn progress_ceiling(&self) -> u8 {
        self.progress_ceiling.min(99)
    }

    /// File extension for a payload MIME type, `bin` when unknown.
    pub fn extension_for(&self, mime_type: &str) -> &str {
        self.download_extensions
            .get(mime_type)
            .map(String::as_str)
            .unwrap_or("bin")
    }
}
