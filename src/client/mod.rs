//! Client side of the bootstrap protocol.
//!
//! # Example
//!
//! ```no_run
//! use debugger_bootstrap::client::BootstrapClient;
//! use debugger_bootstrap::protocol::ProjectDescription;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = BootstrapClient::new("10.0.0.7:40123");
//!
//! let mut updates = client.subscribe().await?;
//! client
//!     .push_description(&ProjectDescription::new("/srv/app/App", "ab12"))
//!     .await?;
//!
//! while let Some(update) = updates.next_update().await? {
//!     println!("{}: {}", update.tag, update.message);
//! }
//! # Ok(())
//! # }
//! ```

mod bootstrap_client;
mod error;

pub use bootstrap_client::{BootstrapClient, Subscription, DEFAULT_TIMEOUT};
pub use error::ClientError;
