//! Session lifecycle: token storage, single-flight refresh, login/logout,
//! and the hook that sends the user back to the login view.

pub mod navigator;
pub mod refresh;
pub mod session;
pub mod token_store;

pub use navigator::{CallbackNavigator, LogNavigator, LoginRedirect, Navigator};
pub use refresh::RefreshCoordinator;
pub use session::SessionController;
pub use token_store::TokenStore;
