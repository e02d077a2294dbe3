//! AccountLifecycle - creates, switches and removes the account on this device.
//!
//! Every call builds a fresh `OperationQueue`:
//!
//! ```text
//! delete-device -> reset-local-state -> resolve-account -> create-device -> persist
//!                                       resolve-account ------------------> persist
//! ```
//!
//! `delete-device` exists only when a device is currently logged in, and the
//! three tasks after `reset-local-state` only for `New` and `Existing`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::core::{Bindings, NoFailedDependencies, PartialInput, TaskHandle};
use crate::error::{Error, Result};
use crate::lifecycle::keys::{KeyGenerator, PrivateKey, X25519KeyGenerator};
use crate::lifecycle::services::{AccountsProxy, DevicesProxy, SettingsStore, TunnelManager};
use crate::lifecycle::types::{
    Account, Device, DeviceState, SetAccountAction, StoredAccount, StoredDevice, TunnelSettings,
    TunnelStatus,
};
use crate::orchestration::OperationQueue;
use crate::retry::{with_retry, RetryStrategy};
use crate::state::StateStore;
use crate::{olog, olog_debug, olog_error, olog_warn};

/// Stored account for `New`/`Existing`, `None` for `Unset`.
pub type LifecycleResult = Result<Option<StoredAccount>>;

/// Output of `create-device`.
#[derive(Debug, Clone)]
struct CreatedDevice {
    device: Device,
    private_key: PrivateKey,
    key_created: DateTime<Utc>,
}

#[derive(Default)]
struct PersistInput {
    account: Option<Account>,
    device: Option<CreatedDevice>,
}

impl PartialInput for PersistInput {
    type Output = (Account, CreatedDevice);

    fn reduce(self) -> Result<Self::Output> {
        let account = self.account.ok_or(Error::MissingInput { field: "account" })?;
        let device = self.device.ok_or(Error::MissingInput { field: "device" })?;
        Ok((account, device))
    }
}

pub struct AccountLifecycle {
    accounts: Arc<dyn AccountsProxy>,
    devices: Arc<dyn DevicesProxy>,
    settings: Arc<dyn SettingsStore>,
    tunnels: Arc<dyn TunnelManager>,
    keys: Arc<dyn KeyGenerator>,
    state: StateStore,
    retry: RetryStrategy,
    /// Held for the whole of `set_account`; lifecycle changes never overlap.
    operation: Mutex<()>,
}

impl AccountLifecycle {
    pub fn new(
        accounts: Arc<dyn AccountsProxy>,
        devices: Arc<dyn DevicesProxy>,
        settings: Arc<dyn SettingsStore>,
        tunnels: Arc<dyn TunnelManager>,
        state: StateStore,
    ) -> Self {
        Self {
            accounts,
            devices,
            settings,
            tunnels,
            keys: Arc::new(X25519KeyGenerator),
            state,
            retry: RetryStrategy::default(),
            operation: Mutex::new(()),
        }
    }

    pub fn with_config(mut self, config: &Config) -> Self {
        self.retry = config.retry.strategy();
        self
    }

    pub fn with_retry_strategy(mut self, retry: RetryStrategy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_key_generator(mut self, keys: Arc<dyn KeyGenerator>) -> Self {
        self.keys = keys;
        self
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Replace the account on this device.
    ///
    /// Cancelling `cancel` cancels every step that has not finished yet and
    /// makes the call return `Error::Cancelled`. Otherwise the result is the
    /// first error among the steps in schedule order, or the new account.
    pub async fn set_account(
        &self,
        action: SetAccountAction,
        cancel: &CancellationToken,
    ) -> LifecycleResult {
        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            guard = self.operation.lock() => guard,
        };

        olog!("AccountLifecycle: set account ({})", action);

        let mut queue = OperationQueue::with_parent(cancel);
        let persist = self.schedule(&mut queue, &action)?;
        queue.run().await?;

        if cancel.is_cancelled() || queue.is_cancelled() {
            olog!("AccountLifecycle: set account ({}) cancelled", action);
            return Err(Error::Cancelled);
        }

        if let Some(error) = queue.tasks().iter().find_map(|t| t.status.error().cloned()) {
            olog_error!("AccountLifecycle: set account ({}) failed: {}", action, error);
            return Err(error);
        }

        match persist {
            None => {
                olog!("AccountLifecycle: logged out");
                Ok(None)
            }
            Some(persist) => {
                let account = persist.take_output().ok_or(Error::Cancelled)?;
                olog!("AccountLifecycle: logged in");
                Ok(Some(account))
            }
        }
    }

    /// Build the task graph for `action`. Returns the persist handle, if any.
    fn schedule(
        &self,
        queue: &mut OperationQueue,
        action: &SetAccountAction,
    ) -> Result<Option<TaskHandle<StoredAccount>>> {
        let delete = self.schedule_delete_device(queue);
        let reset = self.schedule_reset(queue);
        if let Some(delete) = &delete {
            queue.add_dependency(delete, &reset)?;
        }

        let account_number = match action {
            SetAccountAction::Unset => return Ok(None),
            SetAccountAction::New => None,
            SetAccountAction::Existing(number) => Some(number.clone()),
        };

        let resolve = self.schedule_resolve_account(queue, account_number);
        queue.add_dependency(&reset, &resolve)?;
        queue.add_condition(&resolve, NoFailedDependencies::default());

        let create = self.schedule_create_device(queue, &resolve);
        queue.add_dependency(&resolve, &create)?;
        queue.add_condition(&create, NoFailedDependencies::default());

        let persist = self.schedule_persist(queue, &resolve, &create);
        queue.add_dependency(&resolve, &persist)?;
        queue.add_dependency(&create, &persist)?;
        queue.add_condition(&persist, NoFailedDependencies::default());

        Ok(Some(persist))
    }

    fn schedule_delete_device(&self, queue: &mut OperationQueue) -> Option<TaskHandle<()>> {
        let (account, device) = match self.state.device_state() {
            DeviceState::LoggedIn(account, device) => (account, device),
            _ => return None,
        };

        let devices = Arc::clone(&self.devices);
        let retry = self.retry;
        Some(queue.add_task("delete-device", move |ctx| async move {
            let result = with_retry(&retry, ctx.token(), "delete device", || {
                devices.delete_device(&account.number, &device.identifier)
            })
            .await;

            match result {
                Ok(true) => olog_debug!("AccountLifecycle: deleted device {}", device.name),
                Ok(false) => olog_debug!("AccountLifecycle: device {} already gone", device.name),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) => olog_warn!("AccountLifecycle: failed to delete device: {}", err),
            }
            Ok(())
        }))
    }

    fn schedule_reset(&self, queue: &mut OperationQueue) -> TaskHandle<()> {
        let settings = Arc::clone(&self.settings);
        let tunnels = Arc::clone(&self.tunnels);
        let state = self.state.clone();

        queue.add_task("reset-local-state", move |_ctx| async move {
            tunnels.set_status_notifications(false);

            state.update(|s| {
                s.tunnel_status = TunnelStatus::Disconnected;
                s.device_state = DeviceState::LoggedOut;
            });
            if let Err(err) = settings.set_device_state(&DeviceState::LoggedOut).await {
                olog_warn!("AccountLifecycle: failed to persist logged out state: {}", err);
            }

            match tunnels.remove_configuration().await {
                Ok(()) => state.set_configuration_loaded(false),
                Err(err) => olog_warn!("AccountLifecycle: failed to remove VPN configuration: {}", err),
            }

            tunnels.set_status_notifications(true);
            Ok(())
        })
    }

    fn schedule_resolve_account(
        &self,
        queue: &mut OperationQueue,
        account_number: Option<String>,
    ) -> TaskHandle<Account> {
        let accounts = Arc::clone(&self.accounts);
        let retry = self.retry;

        queue.add_task("resolve-account", move |ctx| async move {
            let result = match &account_number {
                None => {
                    with_retry(&retry, ctx.token(), "create account", || {
                        accounts.create_account()
                    })
                    .await
                }
                Some(number) => {
                    with_retry(&retry, ctx.token(), "get account data", || {
                        accounts.get_account_data(number)
                    })
                    .await
                }
            };

            if let Err(err) = &result {
                if !err.is_cancelled() {
                    olog_error!("AccountLifecycle: failed to resolve account: {}", err);
                }
            }
            result
        })
    }

    fn schedule_create_device(
        &self,
        queue: &mut OperationQueue,
        resolve: &TaskHandle<Account>,
    ) -> TaskHandle<CreatedDevice> {
        let settings = Arc::clone(&self.settings);
        let devices = Arc::clone(&self.devices);
        let keys = Arc::clone(&self.keys);
        let retry = self.retry;

        queue.add_bound_task(
            "create-device",
            Bindings::from_output(resolve),
            move |ctx, account: Account| async move {
                if let Err(err) = settings.set_last_used_account(Some(&account.number)).await {
                    olog_warn!("AccountLifecycle: failed to store last used account: {}", err);
                }

                let private_key = keys.generate();
                let key_created = Utc::now();
                let public_key = private_key.public_key();

                let result = with_retry(&retry, ctx.token(), "create device", || {
                    devices.create_device(&account.number, &public_key)
                })
                .await;

                match result {
                    Ok(device) => Ok(CreatedDevice {
                        device,
                        private_key,
                        key_created,
                    }),
                    Err(err) => {
                        if !err.is_cancelled() {
                            olog_error!("AccountLifecycle: failed to create device: {}", err);
                        }
                        Err(err)
                    }
                }
            },
        )
    }

    fn schedule_persist(
        &self,
        queue: &mut OperationQueue,
        resolve: &TaskHandle<Account>,
        create: &TaskHandle<CreatedDevice>,
    ) -> TaskHandle<StoredAccount> {
        let settings = Arc::clone(&self.settings);
        let state = self.state.clone();

        let bindings = Bindings::<PersistInput>::new()
            .inject(resolve, |input: &mut PersistInput, account| {
                input.account = Some(account)
            })
            .inject(create, |input: &mut PersistInput, device| {
                input.device = Some(device)
            });

        queue.add_bound_task(
            "persist",
            bindings,
            move |_ctx, (account, created): (Account, CreatedDevice)| async move {
                let stored_account = StoredAccount::from(account);
                let stored_device =
                    StoredDevice::new(created.device, created.private_key, created.key_created);
                let device_state = DeviceState::LoggedIn(stored_account.clone(), stored_device);

                settings.set_settings(&TunnelSettings::default()).await?;
                settings.set_device_state(&device_state).await?;
                state.set_device_state(device_state);

                Ok(stored_account)
            },
        )
    }
}

impl std::fmt::Debug for AccountLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountLifecycle")
            .field("state", &self.state)
            .field("retry", &self.retry)
            .finish()
    }
}
