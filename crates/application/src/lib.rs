//! Application services and ports.

#![forbid(unsafe_code)]

mod admission_ports;
mod admission_service;

pub use admission_ports::{BucketStore, BucketStoreStats, GuardConfig, PolicyResolver};
pub use admission_service::{ALGORITHM_NAME, AdmissionOutcome, AdmissionService, InboundRequest};
