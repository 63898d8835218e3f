//! Nanolink Core
//!
//! This crate contains the protocol-agnostic building blocks shared by the
//! protocol engine and the public socket layer:
//! - Error taxonomy and errno descriptions (`error`)
//! - Address parsing for `tcp://`, `ipc://` and `inproc://` (`endpoint`)
//! - Message type with protocol header and body (`message`)
//! - Numeric socket option model (`options`)
//! - Domains and scalability patterns (`socket_type`)
//! - Context-wide readiness and termination signal (`signal`)
//! - Byte-accounted message pipes (`pipe`)
//! - The `Protocol`, `PipeHost` and `Engine` seams (`protocol`)
//! - Prefix subscription matching (`subscription`)
//! - Reconnect backoff (`reconnect`)
//! - TCP socket tuning (`tcp`)

#![deny(unsafe_code)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
pub mod endpoint;
pub mod error;
pub mod message;
pub mod options;
pub mod pipe;
pub mod protocol;
pub mod reconnect;
pub mod signal;
pub mod socket_type;
pub mod subscription;
pub mod tcp;

pub mod prelude {
    pub use crate::endpoint::{Endpoint, EndpointError, TcpAddr};
    pub use crate::error::{Errno, NanolinkError, Result};
    pub use crate::message::Message;
    pub use crate::options::{OptionValue, SocketOptions};
    pub use crate::pipe::{Pipe, PipeCloser, PipeConfig, PipeError, PipeId};
    pub use crate::protocol::{
        Engine, EndpointHandle, EndpointKind, Events, PipeHost, ProtoResult, Protocol,
    };
    pub use crate::reconnect::ReconnectState;
    pub use crate::signal::{Signal, Wake};
    pub use crate::socket_type::{Domain, SocketType};
    pub use crate::subscription::SubscriptionTrie;
}
