//! Core data types for the exporter

pub mod entity;
pub mod observation;
pub mod window;
