//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Client event handler traits

use crate::ClientHandle;
use async_trait::async_trait;
use marionette_protocol::LoginRequest;

/// Managed client handler trait
///
/// Implement this trait to react to manager requests. `PING` is answered by
/// the client itself; every other method has a default implementation.
///
/// # Example
///
/// ```no_run
/// use marionette_client::{ClientHandle, ClientHandler};
/// use marionette_protocol::LoginRequest;
/// use async_trait::async_trait;
///
/// struct Game;
///
/// #[async_trait]
/// impl ClientHandler for Game {
///     async fn on_login(&self, _client: &ClientHandle, request: LoginRequest) -> Option<String> {
///         println!("logging in as {}", request.username);
///         Some("Aldric".to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait ClientHandler: Send + Sync + 'static {
    /// Called for `LOGIN`
    ///
    /// Return the selected character name on success, which is answered with
    /// `CHARACTER_NAME`, or `None` to answer `LOGIN_FAILED`.
    async fn on_login(&self, _client: &ClientHandle, _request: LoginRequest) -> Option<String> {
        None
    }

    /// Called for `SHUTDOWN`
    ///
    /// Return false to keep running; `SHUTDOWN_OK` is only sent when this
    /// returns true.
    async fn on_shutdown(&self, _client: &ClientHandle) -> bool {
        true
    }

    /// Called for `AUTO_STATE`
    async fn on_auto_state(&self, _client: &ClientHandle, _enabled: bool) {}

    /// Called for `AUTO_EVENT`
    async fn on_auto_event(&self, _client: &ClientHandle, _enabled: bool, _mode: &str) {}

    /// Called for `AUTO_EQUIP`
    async fn on_auto_equip(&self, _client: &ClientHandle, _enabled: bool, _mode: &str) {}

    /// Called once the connection to the manager has ended
    async fn on_disconnect(&self, _client: &ClientHandle) {}
}

type LoginFn = dyn Fn(&LoginRequest) -> Option<String> + Send + Sync + 'static;
type ToggleFn = dyn Fn(bool, Option<&str>) + Send + Sync + 'static;

/// Callback-based handler implementation
///
/// # Example
///
/// ```no_run
/// use marionette_client::CallbackHandler;
///
/// let handler = CallbackHandler {
///     on_login: Some(Box::new(|request| Some(format!("{}-main", request.username)))),
///     ..Default::default()
/// };
/// ```
#[derive(Default)]
pub struct CallbackHandler {
    /// Called for `LOGIN`
    pub on_login: Option<Box<LoginFn>>,

    /// Called for `SHUTDOWN`
    pub on_shutdown: Option<Box<dyn Fn() -> bool + Send + Sync + 'static>>,

    /// Called for every automation toggle, with the mode for `AUTO_EVENT`
    /// and `AUTO_EQUIP`
    pub on_toggle: Option<Box<ToggleFn>>,
}

#[async_trait]
impl ClientHandler for CallbackHandler {
    async fn on_login(&self, _client: &ClientHandle, request: LoginRequest) -> Option<String> {
        self.on_login.as_ref().and_then(|f| f(&request))
    }

    async fn on_shutdown(&self, _client: &ClientHandle) -> bool {
        self.on_shutdown.as_ref().is_none_or(|f| f())
    }

    async fn on_auto_state(&self, _client: &ClientHandle, enabled: bool) {
        if let Some(ref f) = self.on_toggle {
            f(enabled, None);
        }
    }

    async fn on_auto_event(&self, _client: &ClientHandle, enabled: bool, mode: &str) {
        if let Some(ref f) = self.on_toggle {
            f(enabled, Some(mode));
        }
    }

    async fn on_auto_equip(&self, _client: &ClientHandle, enabled: bool, mode: &str) {
        if let Some(ref f) = self.on_toggle {
            f(enabled, Some(mode));
        }
    }
}
