//! Call context: per-invocation state threaded through a dispatch.
//!
//! A [`CallContext`] is created by the outermost caller (an HTTP handler, a
//! background job, a test) and passed by mutable reference through the
//! authorization chain, the action chain, and every hook notified while the
//! action runs. Changes made by one link are visible to every later link and
//! to the caller once the dispatch returns.
//!
//! A context belongs to exactly one logical operation. Run two operations
//! concurrently and each one needs its own context.

use std::any::Any;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use datahub_core::{AppError, AppResult};

use crate::hooks::definitions::HookPoint;
use crate::snapshot::RegistrySnapshot;

/// Input payload accepted by actions, auth rules, and hooks.
pub type Payload = serde_json::Map<String, Value>;

/// The acting principal for a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Login name of the user.
    pub name: String,
    /// Whether the user is a site administrator.
    pub sysadmin: bool,
}

impl Principal {
    /// Creates a regular user principal.
    pub fn user(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sysadmin: false,
        }
    }

    /// Creates a sysadmin principal.
    pub fn sysadmin(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sysadmin: true,
        }
    }
}

/// Handle to the persistence session owned by the host.
///
/// The dispatch core never talks to the database; it only carries this
/// handle so terminals and hooks running inside the same transaction can
/// reach it. Hosts downcast through [`PersistenceSession::as_any`].
pub trait PersistenceSession: Send + Sync + std::fmt::Debug {
    /// Identifier of the underlying session or transaction.
    fn session_id(&self) -> Uuid;

    /// Access to the concrete session type.
    fn as_any(&self) -> &dyn Any;
}

/// Mutable per-invocation record.
#[derive(Debug)]
pub struct CallContext {
    /// Identifier of this logical operation, used in log events.
    request_id: Uuid,
    /// The acting principal, `None` for anonymous callers.
    principal: Option<Principal>,
    /// Persistence session shared with the host.
    session: Option<Arc<dyn PersistenceSession>>,
    /// The caller vouches that the payload is already validated.
    pub validated: bool,
    /// Skip the authorization gate (internal calls only).
    pub ignore_auth: bool,
    /// Name of the schema the payload was validated against.
    pub schema: Option<String>,
    /// Locale hint, e.g. `"en_GB"`.
    pub locale: Option<String>,
    /// Timezone hint, e.g. `"Europe/Berlin"`.
    pub timezone: Option<String>,
    /// Keys this core does not recognize, passed through untouched.
    pub extras: Payload,
    /// External cancellation signal.
    cancellation: CancellationToken,
    /// Registry snapshot serving the current dispatch.
    snapshot: Option<Arc<RegistrySnapshot>>,
}

impl CallContext {
    /// Creates an anonymous context.
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            principal: None,
            session: None,
            validated: false,
            ignore_auth: false,
            schema: None,
            locale: None,
            timezone: None,
            extras: Payload::new(),
            cancellation: CancellationToken::new(),
            snapshot: None,
        }
    }

    /// Creates a context acting as `principal`.
    pub fn for_principal(principal: Principal) -> Self {
        Self::new().with_principal(principal)
    }

    /// Sets the acting principal.
    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Attaches a persistence session.
    pub fn with_session(mut self, session: Arc<dyn PersistenceSession>) -> Self {
        self.session = Some(session);
        self
    }

    /// Uses an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Marks the payload as already validated by the caller.
    pub fn trusted(mut self) -> Self {
        self.validated = true;
        self
    }

    /// Skips the authorization gate for this call.
    pub fn ignoring_auth(mut self) -> Self {
        self.ignore_auth = true;
        self
    }

    /// Sets the locale and timezone hints.
    pub fn with_locale(mut self, locale: &str, timezone: &str) -> Self {
        self.locale = Some(locale.to_string());
        self.timezone = Some(timezone.to_string());
        self
    }

    /// Inserts an unrecognized key.
    pub fn with_extra(mut self, key: &str, value: Value) -> Self {
        self.extras.insert(key.to_string(), value);
        self
    }

    /// Returns the request identifier.
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Returns the acting principal.
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// Returns the acting principal's name, if any.
    pub fn actor(&self) -> Option<&str> {
        self.principal.as_ref().map(|p| p.name.as_str())
    }

    /// Returns whether the caller is a sysadmin.
    pub fn is_sysadmin(&self) -> bool {
        self.principal.as_ref().is_some_and(|p| p.sysadmin)
    }

    /// Returns the persistence session handle.
    pub fn session(&self) -> Option<&Arc<dyn PersistenceSession>> {
        self.session.as_ref()
    }

    /// Gets an unrecognized key.
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extras.get(key)
    }

    /// Sets an unrecognized key.
    pub fn set_extra(&mut self, key: &str, value: Value) {
        self.extras.insert(key.to_string(), value);
    }

    /// Returns the cancellation token so links can `select!` on it.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns whether the caller cancelled this operation.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Fails with [`ErrorKind::Cancelled`](datahub_core::ErrorKind::Cancelled)
    /// once the token has fired.
    pub fn check_cancelled(&self) -> AppResult<()> {
        if self.cancellation.is_cancelled() {
            Err(AppError::cancelled(format!(
                "Operation {} was cancelled",
                self.request_id
            )))
        } else {
            Ok(())
        }
    }

    /// Returns the snapshot serving the current dispatch.
    pub fn snapshot(&self) -> AppResult<Arc<RegistrySnapshot>> {
        self.snapshot
            .clone()
            .ok_or_else(|| AppError::internal("Call context is not bound to a registry snapshot"))
    }

    /// Dispatches another action with this context (nested call).
    pub async fn dispatch(&mut self, name: &str, payload: Payload) -> AppResult<Value> {
        let snapshot = self.snapshot()?;
        snapshot.dispatch(name, self, payload).await
    }

    /// Notifies lifecycle observers through the bound snapshot.
    pub async fn notify(
        &mut self,
        point: &HookPoint,
        event: &str,
        payload: Payload,
    ) -> AppResult<Payload> {
        let snapshot = self.snapshot()?;
        snapshot.notify(self, point, event, payload).await
    }

    /// Binds a snapshot for the lifetime of the returned guard.
    pub(crate) fn bind(&mut self, snapshot: Arc<RegistrySnapshot>) -> Binding<'_> {
        let previous = self.snapshot.replace(snapshot);
        Binding {
            ctx: self,
            previous,
        }
    }
}

/// Snapshot binding held by a running dispatch.
///
/// Dropping the guard restores the previous binding, including when the
/// dispatch future itself is dropped before it completes.
#[derive(Debug)]
pub(crate) struct Binding<'a> {
    ctx: &'a mut CallContext,
    previous: Option<Arc<RegistrySnapshot>>,
}

impl Deref for Binding<'_> {
    type Target = CallContext;

    fn deref(&self) -> &CallContext {
        self.ctx
    }
}

impl DerefMut for Binding<'_> {
    fn deref_mut(&mut self) -> &mut CallContext {
        self.ctx
    }
}

impl Drop for Binding<'_> {
    fn drop(&mut self) {
        self.ctx.snapshot = self.previous.take();
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}
