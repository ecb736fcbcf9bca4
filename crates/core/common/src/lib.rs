//! Shared data model for channel code generation and event dispatch.
//!
//! Every type in this crate is an immutable value object: the configuration layer creates
//! them, the code generator and the dispatcher only read them.

pub mod channel;
pub mod event;
pub mod service_object;
pub mod settings;

pub use self::{
    channel::{ChannelSpec, DEFAULT_SCHEMA, DbOperation, UnsupportedOperation},
    event::ChannelEvent,
    service_object::{InitParam, ServiceObjectSpec},
    settings::{GlobalSettings, InvalidSettings},
};

pub type BoxError = Box<dyn std::error::Error + Sync + Send + 'static>;
pub type BoxResult<T> = Result<T, BoxError>;
