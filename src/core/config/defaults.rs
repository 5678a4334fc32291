pub const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:9800";
pub const DEFAULT_LISTEN: &str = "127.0.0.1:9800";
pub const DEFAULT_GATEWAY_URL: &str = "https://ai.gateway.lovable.dev/v1";
pub const DEFAULT_MODEL: &str = "google/gemini-3-flash-preview";
/// Short name shown next to the "Processing with AI model" step.
pub const DEFAULT_MODEL_LABEL: &str = "gemini-3-flash";
