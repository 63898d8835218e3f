//! # Nanolink SP
//!
//! Scalability-protocol engine for nanolink:
//! - **PAIR**, **PUB/SUB**, **REQ/REP**, **PUSH/PULL**, **SURVEYOR/RESPONDENT**, **BUS**
//!   state machines, each in cooked and raw form (`protocols`)
//! - SP wire format for stream carriers (`codec`)
//! - inproc, TCP and IPC carriers (`transport`)
//! - [`SpEngine`], the [`nanolink_core::protocol::Engine`] that ties them together
//!
//! Applications use the `nanolink` crate; this crate has no socket API of
//! its own.

#![deny(unsafe_code)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod codec;
mod engine;
pub mod protocols;
mod transport;

pub use engine::SpEngine;
pub use transport::InprocRegistry;
