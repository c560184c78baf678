//! Endpoint handlers

pub mod ndvi;
pub mod status;
