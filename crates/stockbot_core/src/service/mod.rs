//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate store and robot-link calls into use-case level APIs.
//! - Keep the controller and CLI decoupled from storage details.

pub mod auth_service;
pub mod fulfillment;
