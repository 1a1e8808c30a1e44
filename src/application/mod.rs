//! Application Layer
//!
//! Contains the reconciliation, alerting and media negotiation services and
//! the data transfer objects (DTOs) of the UI bridge. This layer orchestrates
//! the flow of data between the presentation and domain layers.

pub mod services;
pub mod dto;
