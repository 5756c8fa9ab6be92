//! CLI command implementations.

pub mod add;
pub mod list;
pub mod modify;
pub mod remove;
pub mod resume;
pub mod start;
pub mod status;
pub mod stop;

use clap::{Args, ValueEnum};
use portpilot_core::{
    ForwardProtocol, HttpControlApi, JsonFileStorage, PortForwardDescriptor, PortForwardStore,
};

/// Store wired with the production adapters.
pub type Store = PortForwardStore<JsonFileStorage, HttpControlApi>;

/// Identity arguments shared by the tunnel commands.
#[derive(Args)]
pub struct TargetArgs {
    /// Resource kind ("pod", "service", ...)
    pub kind: String,

    /// Resource namespace
    pub namespace: String,

    /// Resource name
    pub name: String,

    /// Remote port on the resource
    pub port: u16,
}

impl TargetArgs {
    /// Builds a descriptor carrying this identity.
    pub fn descriptor(&self) -> PortForwardDescriptor {
        PortForwardDescriptor::new(
            self.kind.clone(),
            self.namespace.clone(),
            self.name.clone(),
            self.port,
            0,
        )
    }
}

/// Protocol argument for add/modify.
#[derive(Clone, Copy, ValueEnum)]
pub enum ProtocolArg {
    Http,
    Https,
}

impl From<ProtocolArg> for ForwardProtocol {
    fn from(protocol: ProtocolArg) -> Self {
        match protocol {
            ProtocolArg::Http => ForwardProtocol::Http,
            ProtocolArg::Https => ForwardProtocol::Https,
        }
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
