//! Wire event names used on the realtime channel.

/// Client to server.
pub mod client {
    pub const AUTHENTICATE: &str = "authenticate";
    pub const CHECK_OFFER: &str = "client:check_offer";
    pub const SEND_ANSWER: &str = "client:send_answer";
    pub const SEND_ICE_CANDIDATE: &str = "client:send_ice_candidate";
    pub const REQUEST_ALL_STATUS: &str = "client:request_all_status";
    pub const REQUEST_SENSOR_STATUS: &str = "client:request_sensor_status";
}

/// Server to client.
pub mod server {
    pub const REQUEST_AUTH: &str = "request_auth";
    pub const AUTH_SUCCESS: &str = "auth_success";

    pub const NEW_OFFER: &str = "server:new_offer";
    pub const NEW_ANSWER: &str = "server:new_answer";
    pub const NEW_ICE_CANDIDATE: &str = "server:new_ice_candidate";

    pub const SENSOR_LOG: &str = "server:sensor_log";
    pub const EMERGENCY_SITUATION: &str = "server:emergency_situation";
    pub const SENIOR_STATUS_CHANGE: &str = "server:notify_senior_status_change";
    pub const SENSOR_STATUS_CHANGE: &str = "server:notify_sensor_status_change";
    pub const SENSOR_EVENT: &str = "server:notify_sensor_event";
    pub const REQUEST_SAFETY_CHECK: &str = "server:request_safety_check";
    pub const SAFETY_CHECK_FAILED: &str = "server:safety_check_failed";
}

/// Raised locally by the channel manager, never sent on the wire.
pub mod local {
    pub const CONNECT: &str = "connect";
    pub const DISCONNECT: &str = "disconnect";
    pub const CONNECT_ERROR: &str = "connect_error";
}
