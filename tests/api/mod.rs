//! UI bridge endpoint tests.

mod alerts_tests;
mod channel_tests;
mod health_tests;
mod seniors_tests;
mod sessions_tests;
