use core::fmt;

/// How the process is deployed, as reported to the assigner.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HostKind {
    /// A physical or virtual machine.
    #[default]
    Actual,
    /// A container, whose host name and port are not stable across restarts.
    Container,
}

impl fmt::Display for HostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Actual => f.write_str("actual"),
            Self::Container => f.write_str("container"),
        }
    }
}

/// Immutable boot-time description of where this process runs.
///
/// Host and port detection happens outside this crate; whatever wiring the
/// application uses fills this in once and hands it to the assigner.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BootEnv {
    /// Host name or address.
    pub host: String,
    /// Service port (or a random token for containers).
    pub port: String,
    /// Deployment kind.
    pub kind: HostKind,
}

impl BootEnv {
    /// Creates a boot environment.
    pub fn new(host: impl Into<String>, port: impl Into<String>, kind: HostKind) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
            kind,
        }
    }
}

/// Hands out the instance (worker) id encoded into every generated id.
///
/// Implementations typically insert a row into a shared table and return its
/// primary key. Both methods are only called at boot. Returning `None` asks
/// the caller to retry.
pub trait InstanceIdAssigner {
    /// Assigns an id for the process described by `env`.
    fn assign_by_env(&self, env: &BootEnv) -> Option<u64>;

    /// Assigns an id for an explicitly given host, port and kind.
    fn assign_by_param(&self, host: &str, port: &str, kind: HostKind) -> Option<u64>;
}

impl<A: InstanceIdAssigner + ?Sized> InstanceIdAssigner for &A {
    fn assign_by_env(&self, env: &BootEnv) -> Option<u64> {
        (**self).assign_by_env(env)
    }

    fn assign_by_param(&self, host: &str, port: &str, kind: HostKind) -> Option<u64> {
        (**self).assign_by_param(host, port, kind)
    }
}

/// An assigner that always answers with the same id.
///
/// Useful for single-instance deployments, tests and tooling where the id is
/// configured by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedInstanceId(pub u64);

impl InstanceIdAssigner for FixedInstanceId {
    fn assign_by_env(&self, _env: &BootEnv) -> Option<u64> {
        Some(self.0)
    }

    fn assign_by_param(&self, _host: &str, _port: &str, _kind: HostKind) -> Option<u64> {
        Some(self.0)
    }
}
