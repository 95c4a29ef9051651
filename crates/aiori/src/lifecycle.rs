//! Client lifecycle management
//!
//! Owns the single mounted client of a backend instance. States are
//! `Uninitialized -> Ready -> Uninitialized`; the client is installed only
//! after every mount step succeeded, so a failed mount never leaves a
//! half-initialized client behind.

use std::path::Path;

use aiori_core::{Errno, Error, ErrorChannelHandle, Operation, Result, SessionId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::client::{Connector, MountClient};

/// Lifecycle state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LifecycleState {
    /// No client; only initialize/finalize are valid
    Uninitialized,

    /// Client mounted and usable
    Ready,
}

/// What to mount and as whom
#[derive(Debug, Clone, Copy)]
pub struct MountParams<'a> {
    pub user: &'a str,
    pub config_path: &'a Path,
    pub remote_prefix: &'a str,
}

/// A mounted client together with the settings it was mounted with
#[derive(Debug)]
pub struct Mounted<C, S> {
    pub client: C,
    pub settings: S,
    pub session: SessionId,
}

/// Lifecycle manager for one backend instance's client
pub struct Lifecycle<K: Connector, S> {
    backend: &'static str,
    connector: K,
    errors: ErrorChannelHandle,
    mounted: RwLock<Option<Mounted<K::Client, S>>>,
}

impl<K: Connector, S> Lifecycle<K, S> {
    pub fn new(backend: &'static str, connector: K, errors: ErrorChannelHandle) -> Self {
        Self {
            backend,
            connector,
            errors,
            mounted: RwLock::new(None),
        }
    }

    pub fn state(&self) -> LifecycleState {
        if self.mounted.read().is_some() {
            LifecycleState::Ready
        } else {
            LifecycleState::Uninitialized
        }
    }

    pub fn connector(&self) -> &K {
        &self.connector
    }

    pub fn errors(&self) -> &ErrorChannelHandle {
        &self.errors
    }

    /// Report a client failure with the operation's policy and build the error
    pub fn client_error(&self, operation: Operation, errno: Errno, context: &str) -> Error {
        self.errors.report(
            self.backend,
            operation,
            Some(errno),
            operation.failure_policy(),
            format!("{}: {}", context, errno),
        );
        Error::Backend {
            backend: self.backend.to_string(),
            operation,
            errno,
        }
    }

    /// Create, configure and mount a client, unless one is already mounted
    ///
    /// Returns `true` when a new client was installed.
    pub fn mount(&self, params: MountParams<'_>, settings: S) -> Result<bool> {
        let mut slot = self.mounted.write();
        if slot.is_some() {
            debug!(backend = self.backend, "Client already mounted, skipping initialize");
            return Ok(false);
        }

        let mut client = self
            .connector
            .create(params.user)
            .map_err(|e| self.client_error(Operation::Initialize, e, "unable to create client handle"))?;

        if let Err(e) = client.read_config(params.config_path) {
            client.shutdown();
            return Err(self.client_error(
                Operation::Initialize,
                e,
                &format!("unable to read client config {}", params.config_path.display()),
            ));
        }

        if let Err(e) = client.mount(params.remote_prefix) {
            client.shutdown();
            return Err(self.client_error(Operation::Initialize, e, "unable to mount"));
        }

        if let Err(e) = client.lookup_root() {
            if let Err(unmount_err) = client.unmount() {
                debug!(backend = self.backend, errno = %unmount_err, "Unmount during cleanup failed");
            }
            client.shutdown();
            return Err(self.client_error(Operation::Initialize, e, "unable to retrieve root inode"));
        }

        let session = Uuid::new_v4();
        info!(
            backend = self.backend,
            user = params.user,
            remote_prefix = params.remote_prefix,
            %session,
            "Client mounted"
        );

        *slot = Some(Mounted {
            client,
            settings,
            session,
        });
        Ok(true)
    }

    /// Unmount and release the client; a no-op when nothing is mounted
    ///
    /// The state returns to `Uninitialized` even when teardown fails.
    pub fn unmount(&self) -> Result<()> {
        let Some(mounted) = self.mounted.write().take() else {
            debug!(backend = self.backend, "Finalize without a mounted client");
            return Ok(());
        };

        let Mounted {
            mut client,
            session,
            ..
        } = mounted;

        if let Err(e) = client.unmount() {
            client.shutdown();
            return Err(self.client_error(Operation::Finalize, e, "unmount failed"));
        }

        client
            .release()
            .map_err(|e| self.client_error(Operation::Finalize, e, "release failed"))?;

        info!(backend = self.backend, %session, "Client released");
        Ok(())
    }

    /// Run `f` against the mounted client
    ///
    /// Fails with `NotInitialized` (reported to the error channel) when no
    /// client is mounted.
    pub fn with_mounted<T>(
        &self,
        operation: Operation,
        f: impl FnOnce(&Mounted<K::Client, S>) -> Result<T>,
    ) -> Result<T> {
        let guard = self.mounted.read();
        match guard.as_ref() {
            Some(mounted) => f(mounted),
            None => Err(self
                .errors
                .raise(self.backend, operation, Error::NotInitialized { operation })),
        }
    }
}
