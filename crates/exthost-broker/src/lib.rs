//! # exthost-broker
//!
//! Message broker between developer-tools extensions and the host.
//!
//! - **Origins**: [`origins::OriginRegistry`] and the one-shot channel
//!   handshake; only registered origins get their commands dispatched
//! - **Permissions**: [`permission::PermissionGate`] decides which page URLs
//!   extensions may touch; [`permission::EnabledFlag`] is the sticky kill switch
//! - **Dispatch**: [`dispatcher::CommandRegistry`] maps command names to typed
//!   [`dispatcher::CommandHandler`]s and sends correlated callbacks
//! - **Objects**: [`objects::ClientObjectTable`] holds panels, buttons, sidebar
//!   panes and trace providers created on behalf of extensions
//! - **Notifications**: [`bus::SubscriptionBus`] fans host events out to
//!   subscribed channels; [`pump::EventPump`] attaches host event streams
//!   only while a topic has subscribers
//! - **Gateway**: [`evaluate`] and [`resources`] run script and read or write
//!   page resources under the permission gate
//! - **Host**: [`host`] declares the collaborator traits; [`memory::MemoryHost`]
//!   implements them in memory
//!
//! [`broker::Broker`] ties it together and is what the transport talks to.

#![deny(unsafe_code)]

pub mod broker;
pub mod bus;
pub mod channel;
pub mod context;
pub mod dispatcher;
pub mod evaluate;
pub mod handlers;
pub mod headers;
pub mod host;
pub mod links;
pub mod memory;
pub mod objects;
pub mod origins;
pub mod paths;
pub mod permission;
pub mod pump;
pub mod requests;
pub mod resources;
pub mod traces;

pub use broker::{AddExtensionError, Broker, BrokerStats, TextRange};
pub use channel::ExtensionChannel;
pub use dispatcher::Reply;
pub use host::HostServices;
pub use memory::MemoryHost;
pub use origins::Origin;
