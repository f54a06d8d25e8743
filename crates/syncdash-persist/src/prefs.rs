// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;
use syncdash_app::UserId;

use crate::storage::KeyValueStorage;

pub const SIDEBAR_KEY: &str = "syncdash-sidebar-collapsed";
pub const AUTH_KEY: &str = "syncdash-auth";

/// The signed-in user as the dashboard remembers it between sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthIdentity {
    pub user_id: Option<UserId>,
    pub is_authenticated: bool,
    pub access_token: Option<String>,
}

impl AuthIdentity {
    pub fn signed_in(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            is_authenticated: true,
            access_token: None,
        }
    }
}

/// Small UI preferences kept next to the app state.
#[derive(Clone)]
pub struct Preferences {
    storage: Rc<dyn KeyValueStorage>,
}

impl fmt::Debug for Preferences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Preferences").finish_non_exhaustive()
    }
}

impl Preferences {
    pub fn new(storage: Rc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    pub fn sidebar_collapsed(&self) -> bool {
        self.read_json(SIDEBAR_KEY).unwrap_or(false)
    }

    pub fn set_sidebar_collapsed(&self, collapsed: bool) -> Result<()> {
        self.storage
            .set(SIDEBAR_KEY, if collapsed { "true" } else { "false" })
            .context("save sidebar preference")
    }

    /// Returns the new value.
    pub fn toggle_sidebar(&self) -> Result<bool> {
        let collapsed = !self.sidebar_collapsed();
        self.set_sidebar_collapsed(collapsed)?;
        Ok(collapsed)
    }

    pub fn identity(&self) -> AuthIdentity {
        self.read_json(AUTH_KEY).unwrap_or_default()
    }

    /// An identity without a user id is never stored.
    pub fn save_identity(&self, identity: &AuthIdentity) -> Result<()> {
        if identity.user_id.is_none() {
            log::debug!("not storing identity without a user id");
            return Ok(());
        }
        let raw = serde_json::to_string(identity).context("serialize identity")?;
        self.storage.set(AUTH_KEY, &raw).context("save identity")
    }

    pub fn forget_identity(&self) -> Result<()> {
        self.storage.remove(AUTH_KEY).context("remove identity")
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.storage.get(key) {
            Ok(raw) => raw?,
            Err(err) => {
                log::warn!("cannot read {key}: {err:#}");
                return None;
            }
        };
        serde_json::from_str(&raw)
            .map_err(|err| log::warn!("ignoring stored {key}: {err}"))
            .ok()
    }
}
