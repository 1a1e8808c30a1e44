//! Data Transfer Objects
//!
//! DTOs for UI bridge request/response serialization.

pub mod request;
pub mod response;

pub use request::{RecordAlertRequest, SeniorQueryParams};
pub use response::{
    AlertListResponse, ChannelResponse, CountResponse, DeleteSeniorResponse, SensorListResponse,
    SeniorListResponse, SeniorResponse,
};
