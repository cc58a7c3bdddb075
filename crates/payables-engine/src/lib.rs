//! Decision engine and ingestion tracking behind the accounts-payable collections dashboard.
//!
//! [`decisions`] evaluates authored policies against customer/loan records and returns an
//! auditable trace, [`ingestion`] tracks bulk sync/upload jobs, and [`notifications`] announces
//! job milestones to any interested observer.

pub mod config;
pub mod decisions;
pub mod error;
pub mod ingestion;
pub mod notifications;
pub mod telemetry;
