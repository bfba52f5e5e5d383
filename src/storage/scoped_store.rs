use std::fmt::Debug;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::hash::descriptor_digest;
use crate::KvStore;
use crate::Result;
use crate::StorageError;
use crate::ValidationError;

/// Namespaced view over a shared [`KvStore`].
///
/// Every key is prefixed with `<namespace>:<kind>:` and, for stores bound to a
/// descriptor, with the descriptor digest as well. Watchers and dispatchers
/// never see each other's records.
#[derive(Clone)]
pub struct ScopedStore {
    inner: Arc<dyn KvStore>,
    prefix: String,
}

impl Debug for ScopedStore {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ScopedStore").field("prefix", &self.prefix).finish()
    }
}

impl ScopedStore {
    pub fn new(
        inner: Arc<dyn KvStore>,
        namespace: &str,
        kind: &str,
    ) -> Self {
        Self {
            inner,
            prefix: format!("{namespace}:{kind}:"),
        }
    }

    /// Narrows the scope to one descriptor
    pub fn with_descriptor<D: Serialize + ?Sized>(
        &self,
        descriptor: &D,
    ) -> Result<Self> {
        let digest = descriptor_digest(descriptor)?;
        Ok(Self {
            inner: self.inner.clone(),
            prefix: format!("{}{}:", self.prefix, digest),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn full_key(
        &self,
        key: &str,
    ) -> Result<String> {
        if key.is_empty() {
            return Err(ValidationError::InvalidKey(key.to_string()).into());
        }
        Ok(format!("{}{}", self.prefix, key))
    }

    pub fn get(
        &self,
        key: &str,
    ) -> Result<Option<Value>> {
        self.inner.get(&self.full_key(key)?)
    }

    pub fn set(
        &self,
        key: &str,
        value: Value,
    ) -> Result<()> {
        self.inner.set(&self.full_key(key)?, value)
    }

    pub fn del(
        &self,
        key: &str,
    ) -> Result<()> {
        self.inner.del(&self.full_key(key)?)
    }

    /// Keys in this scope, without the scope prefix
    pub fn list(&self) -> Result<Vec<String>> {
        Ok(self
            .inner
            .list(&self.prefix)?
            .into_iter()
            .filter_map(|k| k.strip_prefix(&self.prefix).map(str::to_string))
            .collect())
    }

    pub fn update(
        &self,
        key: &str,
        default: Option<Value>,
        updater: &mut crate::Updater<'_>,
    ) -> Result<(Option<Value>, Value)> {
        self.inner.update(&self.full_key(key)?, default, updater)
    }

    pub fn get_typed<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>> {
        match self.get(key)? {
            Some(v) => Ok(Some(decode(key, v)?)),
            None => Ok(None),
        }
    }

    pub fn set_typed<T: Serialize>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<()> {
        self.set(key, serde_json::to_value(value)?)
    }

    /// Typed flavour of [`ScopedStore::update`].
    ///
    /// `updater` may run more than once when the backend retries; only the
    /// value produced by the attempt that was committed is returned.
    pub fn update_typed<T, F>(
        &self,
        key: &str,
        default: Option<T>,
        mut updater: F,
    ) -> Result<(Option<T>, T)>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(Option<T>) -> Result<T>,
    {
        let default = match default {
            Some(d) => Some(serde_json::to_value(&d)?),
            None => None,
        };

        let mut committed: Option<T> = None;
        let (old, _) = self.update(key, default, &mut |current| {
            let current = match current {
                Some(v) => Some(decode(key, v)?),
                None => None,
            };
            let next = updater(current)?;
            let encoded = serde_json::to_value(&next)?;
            committed = Some(next);
            Ok(encoded)
        })?;

        let new = committed.ok_or_else(|| StorageError::UpdateContention(key.to_string()))?;
        let old = match old {
            Some(v) => Some(decode(key, v)?),
            None => None,
        };
        Ok((old, new))
    }
}

fn decode<T: DeserializeOwned>(
    key: &str,
    value: Value,
) -> Result<T> {
    serde_json::from_value(value).map_err(|e| {
        StorageError::DataCorruption {
            key: key.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}
