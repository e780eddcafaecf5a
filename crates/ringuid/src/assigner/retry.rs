use core::time::Duration;
use std::thread;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{BootEnv, Error, HostKind, InstanceIdAssigner, Result};

/// Bounded retry schedule for instance id assignment.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of calls made to the assigner, including the first.
    pub max_attempts: u32,
    /// Pause between consecutive attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// A policy that calls the assigner `max_attempts` times without pausing.
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Duration::ZERO,
        }
    }

    fn run(&self, mut attempt: impl FnMut() -> Option<u64>) -> Result<u64> {
        for n in 1..=self.max_attempts {
            if let Some(id) = attempt() {
                #[cfg(feature = "tracing")]
                tracing::info!(instance_id = id, attempt = n, "instance id assigned");
                return Ok(id);
            }

            #[cfg(feature = "tracing")]
            tracing::warn!(
                attempt = n,
                max_attempts = self.max_attempts,
                "instance id assignment returned nothing"
            );

            if n < self.max_attempts && !self.backoff.is_zero() {
                thread::sleep(self.backoff);
            }
        }

        Err(Error::InstanceIdUnavailable {
            attempts: self.max_attempts,
        })
    }
}

/// Obtains the instance id for `env`, retrying per `policy`.
///
/// # Errors
///
/// Returns [`Error::InstanceIdUnavailable`] if every attempt returned `None`.
/// This is a boot failure: the process must not start.
///
/// # Example
///
/// ```
/// use ringuid::{BootEnv, FixedInstanceId, RetryPolicy, resolve_instance_id};
///
/// let id = resolve_instance_id(&FixedInstanceId(7), &BootEnv::default(), RetryPolicy::default())
///     .unwrap();
/// assert_eq!(id, 7);
/// ```
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip(assigner)))]
pub fn resolve_instance_id<A>(assigner: &A, env: &BootEnv, policy: RetryPolicy) -> Result<u64>
where
    A: InstanceIdAssigner + ?Sized,
{
    policy.run(|| assigner.assign_by_env(env))
}

/// Obtains the instance id for an explicit host, port and kind, retrying per
/// `policy`.
///
/// # Errors
///
/// Returns [`Error::InstanceIdUnavailable`] if every attempt returned `None`.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip(assigner)))]
pub fn resolve_instance_id_by_param<A>(
    assigner: &A,
    host: &str,
    port: &str,
    kind: HostKind,
    policy: RetryPolicy,
) -> Result<u64>
where
    A: InstanceIdAssigner + ?Sized,
{
    policy.run(|| assigner.assign_by_param(host, port, kind))
}
