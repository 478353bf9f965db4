//! Record factories for the built-in service types
//!
//! Each module exposes its type tag as `TYPE` and a `create_record`
//! function building an unpublished [`Record`](crate::Record).

pub mod data_source;
pub mod event_bus_service;
pub mod http_endpoint;
pub mod message_source;
