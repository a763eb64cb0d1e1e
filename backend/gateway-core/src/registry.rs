//! Process-wide table of instances keyed by instance key.

use crate::error::config::ConfigError;
use crate::error::instance::InstanceError;
use crate::instance::{ConnectionStatus, Instance, InstanceDeps, InstanceSummary};
use crate::{DATA_DIR_SENTINEL, WEBHOOK_CONFIG_DIR};

use common::ErrorLocation;

use std::collections::HashMap;
use std::panic::Location;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

const INSTANCE: &str = "Instance";

#[derive(Clone)]
pub struct Registry {
    instances: Arc<RwLock<HashMap<String, Instance>>>,
    /// Serializes create, delete and reset so each replacement is atomic.
    mutations: Arc<Mutex<()>>,
    deps: InstanceDeps,
}

impl Registry {
    pub fn new(deps: InstanceDeps) -> Self {
        Self {
            instances: Arc::new(RwLock::new(HashMap::new())),
            mutations: Arc::new(Mutex::new(())),
            deps,
        }
    }

    pub fn deps(&self) -> &InstanceDeps {
        &self.deps
    }

    /// Registers a new instance and starts connecting it in the background.
    ///
    /// A missing key gets a random UUID. An existing instance under the same
    /// key is retired and replaced.
    pub async fn create(&self, key: Option<String>, disable_webhook: bool) -> Instance {
        let _mutation = self.mutations.lock().await;
        let key = key
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let instance = Instance::new(key.clone(), disable_webhook, self.deps.clone());

        let replaced = self
            .instances
            .write()
            .await
            .insert(key.clone(), instance.clone());
        if let Some(previous) = replaced {
            warn!("Replacing existing instance {}", key);
            previous.retire("replaced").await;
        }

        instance.set_status(ConnectionStatus::Connecting).await;
        instance.spawn_connect();
        info!("Created instance {} (webhook disabled: {})", key, disable_webhook);
        instance
    }

    pub async fn get(&self, key: &str) -> Result<Instance, InstanceError> {
        self.instances
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| InstanceError::not_found(INSTANCE))
    }

    /// Summaries of every instance, ordered by key.
    pub async fn list(&self) -> Vec<InstanceSummary> {
        let instances: Vec<Instance> = self.instances.read().await.values().cloned().collect();
        let mut summaries = Vec::with_capacity(instances.len());
        for instance in instances {
            summaries.push(instance.summary().await);
        }
        summaries.sort_by(|a, b| a.key.cmp(&b.key));
        summaries
    }

    pub async fn len(&self) -> usize {
        self.instances.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.instances.read().await.is_empty()
    }

    /// Logs the account out, ends its session and forgets the instance.
    pub async fn delete(&self, key: &str) -> Result<(), InstanceError> {
        let _mutation = self.mutations.lock().await;
        let instance = self.get(key).await?;
        instance.logout().await;
        instance.retire("deleted").await;
        instance.remove_credentials().await;
        self.instances.write().await.remove(key);
        info!("Deleted instance {}", key);
        Ok(())
    }

    /// Replaces the instance with a fresh one under the same key, keeping its
    /// webhook setting. The old credentials are discarded so the new
    /// instance starts with a QR login.
    pub async fn reset(&self, key: &str) -> Result<Instance, InstanceError> {
        let _mutation = self.mutations.lock().await;
        let previous = self.get(key).await?;
        previous.logout().await;
        previous.retire("reset").await;
        previous.remove_credentials().await;

        let instance = Instance::new(key, previous.disable_webhook(), self.deps.clone());
        let displaced = self
            .instances
            .write()
            .await
            .insert(key.to_string(), instance.clone());
        if let Some(displaced) = displaced
            && !displaced.same_instance(&previous)
        {
            warn!("Instance {} changed during reset, retiring it", key);
            displaced.retire("replaced").await;
        }
        instance.set_status(ConnectionStatus::Connecting).await;
        instance.spawn_connect();
        info!("Reset instance {}", key);
        Ok(instance)
    }

    /// Logs the account out. The instance stays registered.
    pub async fn logout(&self, key: &str) -> Result<(), InstanceError> {
        self.get(key).await?.logout().await;
        Ok(())
    }

    /// Recreates one instance for every credentials directory under the data
    /// dir. Returns how many were restored.
    pub async fn restore(&self) -> Result<usize, ConfigError> {
        let data_dir = self.deps.config.data_dir.clone();
        if let Err(source) = tokio::fs::create_dir_all(&data_dir).await {
            return Err(ConfigError::WriteError {
                location: ErrorLocation::from(Location::caller()),
                path: data_dir,
                source,
            });
        }

        let mut entries =
            tokio::fs::read_dir(&data_dir)
                .await
                .map_err(|source| ConfigError::ReadError {
                    location: ErrorLocation::from(Location::caller()),
                    path: data_dir.clone(),
                    source,
                })?;

        let mut keys = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Stopped reading {}: {}", data_dir.display(), e);
                    break;
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == DATA_DIR_SENTINEL || name == WEBHOOK_CONFIG_DIR {
                continue;
            }
            match entry.file_type().await {
                Ok(kind) if kind.is_dir() => keys.push(name),
                Ok(_) => debug!("Ignoring non-directory {} in data dir", name),
                Err(e) => warn!("Cannot stat {}: {}", name, e),
            }
        }
        keys.sort();

        for key in &keys {
            self.create(Some(key.clone()), false).await;
        }
        info!("Restored {} instance(s) from {}", keys.len(), data_dir.display());
        Ok(keys.len())
    }

    /// Ends every session without logging out, for process shutdown.
    pub async fn shutdown(&self) {
        let instances: Vec<Instance> = self.instances.read().await.values().cloned().collect();
        for instance in instances {
            instance.retire("shutdown").await;
        }
        info!("Registry shut down");
    }
}
