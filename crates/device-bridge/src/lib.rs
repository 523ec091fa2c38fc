//! Device back-end abstraction layer
//!
//! This crate defines the read/write contract the graph engine depends on
//! (`DeviceAdapter`) plus the concrete clients that speak to real back-ends:
//! a home-automation hub (Home Assistant REST API) and Tasmota-style smart
//! plugs. An in-memory adapter covers tests and hub-less deployments.

pub mod adapter;
pub mod error;
pub mod home_assistant;
pub mod memory;
pub mod tasmota;

pub use adapter::{DeviceAdapter, DeviceState};
pub use error::DeviceError;
pub use home_assistant::HomeAssistantClient;
pub use memory::MemoryAdapter;
pub use tasmota::TasmotaClient;
