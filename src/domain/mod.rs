//! Core domain types for the request queue.
//!
//! This module contains pure domain types with no persistence dependencies:
//! - Request typestate machine
//! - Notifications
//! - Student account records and login sessions

pub mod notification;
pub mod request;
pub mod session;
pub mod student;
