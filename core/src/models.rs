//! Data models for port-forward tunnels.

use serde::{Deserialize, Serialize};

// ============================================================================
// Protocol & Status
// ============================================================================

/// Application protocol served over a forwarded port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardProtocol {
    #[default]
    Http,
    Https,
}

impl ForwardProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

impl std::fmt::Display for ForwardProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a tunnel.
///
/// `Active` means the control backend confirmed the tunnel was listening at
/// the time the status was last set; `Disabled` means it was not. Records
/// persisted before this field existed deserialize as `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ForwardStatus {
    #[default]
    Active,
    Disabled,
}

impl ForwardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Disabled => "Disabled",
        }
    }
}

impl std::fmt::Display for ForwardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Identity
// ============================================================================

/// The identity of a tunnel.
///
/// Two descriptors denote the same tunnel iff their
/// `(kind, namespace, name, port)` agree. The local port, protocol, and
/// status are mutable attributes of that identity, not part of it: the
/// remote resource is the only durable identifier available before a
/// tunnel has been started.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForwardTarget {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub port: u16,
}

impl ForwardTarget {
    /// Returns true if `item` refers to the same tunnel as this target.
    pub fn matches(&self, item: &PortForwardItem) -> bool {
        self.kind == item.kind
            && self.namespace == item.namespace
            && self.name == item.name
            && self.port == item.port
    }
}

impl std::fmt::Display for ForwardTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}-{}:{}",
            self.namespace, self.kind, self.name, self.port
        )
    }
}

// ============================================================================
// Descriptor (wire/storage shape)
// ============================================================================

/// Wire/storage shape of one tunnel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortForwardDescriptor {
    /// Resource kind being forwarded to ("pod", "service", ...).
    pub kind: String,
    /// Resource namespace.
    pub namespace: String,
    /// Resource name.
    pub name: String,
    /// Remote port on the resource.
    pub port: u16,
    /// Local port; `0` requests any free port.
    pub forward_port: u16,
    /// Protocol served over the tunnel.
    #[serde(default)]
    pub protocol: ForwardProtocol,
    /// Desired lifecycle status. Absent in records written before the
    /// field existed, which deserialize as `Active`.
    #[serde(default)]
    pub status: ForwardStatus,
}

impl PortForwardDescriptor {
    /// Creates a descriptor with default protocol (http) and status (Active).
    pub fn new(kind: String, namespace: String, name: String, port: u16, forward_port: u16) -> Self {
        Self {
            kind,
            namespace,
            name,
            port,
            forward_port,
            protocol: ForwardProtocol::default(),
            status: ForwardStatus::default(),
        }
    }

    /// Returns this descriptor's tunnel identity.
    pub fn target(&self) -> ForwardTarget {
        ForwardTarget {
            kind: self.kind.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            port: self.port,
        }
    }
}

// ============================================================================
// Item (in-memory, store-owned)
// ============================================================================

/// A tunnel as tracked by the store: a normalized, defaulted copy of a
/// descriptor. Items are owned exclusively by the store; consumers read
/// cloned snapshots and never mutate them directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortForwardItem {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub port: u16,
    pub forward_port: u16,
    pub protocol: ForwardProtocol,
    pub status: ForwardStatus,
}

impl PortForwardItem {
    /// Derived identifier for UI addressing and routing; not persisted.
    pub fn id(&self) -> String {
        format!(
            "{}-{}-{}:{}",
            self.namespace, self.kind, self.name, self.port
        )
    }

    /// Returns this item's tunnel identity.
    pub fn target(&self) -> ForwardTarget {
        ForwardTarget {
            kind: self.kind.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            port: self.port,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ForwardStatus::Active
    }

    /// Fields a UI search box should match against.
    pub fn search_fields(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.namespace.clone(),
            self.kind.clone(),
            self.port.to_string(),
            self.forward_port.to_string(),
            self.status.to_string(),
        ]
    }

    /// Converts back to the wire/storage shape.
    pub fn to_descriptor(&self) -> PortForwardDescriptor {
        PortForwardDescriptor {
            kind: self.kind.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            port: self.port,
            forward_port: self.forward_port,
            protocol: self.protocol,
            status: self.status,
        }
    }
}

impl From<&PortForwardDescriptor> for PortForwardItem {
    fn from(descriptor: &PortForwardDescriptor) -> Self {
        Self {
            kind: descriptor.kind.clone(),
            namespace: descriptor.namespace.clone(),
            name: descriptor.name.clone(),
            port: descriptor.port,
            forward_port: descriptor.forward_port,
            protocol: descriptor.protocol,
            status: descriptor.status,
        }
    }
}

// ============================================================================
// Notifications
// ============================================================================

/// User-facing notification emitted by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardNotification {
    /// One or more saved tunnels could not be resumed at startup.
    ResumeFailed { failed: usize, total: usize },
}

impl ForwardNotification {
    /// Message suitable for a single toast/notification.
    pub fn message(&self) -> String {
        match self {
            Self::ResumeFailed { failed, total } => format!(
                "One or more port-forwards could not be started ({} of {})",
                failed, total
            ),
        }
    }
}
