//! Realtime Relay Protocol Constants

// Inbound listener
pub const DEFAULT_LISTEN_PORT: u16 = 8080;
pub const RELAY_PATH: &str = "/realtime";

// Upstream endpoint
pub const DEFAULT_UPSTREAM_URL: &str =
    "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview-2024-10-01";

// Upstream handshake headers
pub const BETA_HEADER: &str = "OpenAI-Beta";
pub const BETA_REALTIME_V1: &str = "realtime=v1";

// Close reason sent to the client when the upstream side goes away
pub const UPSTREAM_CLOSED_REASON: &str = "OpenAI connection closed";

// Event types the relay looks at for diagnostics
pub const EVENT_ERROR: &str = "error";
pub const EVENT_AUDIO_APPEND: &str = "input_audio_buffer.append";

// Synthetic error event fields
pub const CONNECTION_ERROR_TYPE: &str = "connection_error";
pub const CONNECT_FAILED_MESSAGE: &str = "Failed to connect to OpenAI API";
pub const TRANSPORT_FAILED_MESSAGE: &str = "OpenAI connection failed";
