//! Strata Discovery - Finding hardware and turning it into devices
//!
//! This crate provides two discovery paths feeding one factory:
//! - OS discovery of render nodes, bound into root-device environments
//! - Simulated discovery driven by the product family and hw config overrides
//! - `DeviceFactory`, which runs the selected path and builds root devices

pub mod factory;
pub mod os;

pub use factory::{DeviceFactory, DiscoveryMode, FactoryError, RootDeviceConstructor};
pub use os::{DiscoveryError, DrmDiscovery, OsDiscovery};
