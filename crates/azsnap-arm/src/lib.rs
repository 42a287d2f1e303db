//! # Azure snapshot client
//!
//! Thin client for the two cloud collaborators the snapshot gateway talks to:
//!
//! - the Microsoft identity platform, through the OAuth 2.0 device authorization
//!   grant ([`DeviceCodeCredential`])
//! - the Azure Resource Manager compute provider, for snapshot resources
//!   ([`SnapshotsClient`])
//!
//! Create and delete are long-running on the ARM side. They return an
//! [`LongRunningOperation`] whose `poll_until_done` resolves only once the
//! operation reaches a terminal state. Listing is paged and driven through
//! [`SnapshotPager`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use azsnap_arm::{ClientOptions, DeviceCodeCredential, DeviceCodeCredentialOptions, SnapshotPager, SnapshotsClient};
//!
//! # async fn run() -> azsnap_arm::Result<()> {
//! let credential = Arc::new(DeviceCodeCredential::new(DeviceCodeCredentialOptions::new(
//!     "tenant-id",
//!     "client-id",
//! ))?);
//! credential.authenticate().await?;
//!
//! let client = SnapshotsClient::new("subscription-id", credential, ClientOptions::default())?;
//! let mut pager = SnapshotPager::new(&client);
//! while pager.more() {
//!     for snapshot in pager.next_page().await?.value {
//!         println!("{:?}", snapshot.name);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod credential;
pub mod error;
pub mod models;
pub mod operation;
pub mod pager;
pub mod snapshots;

pub use credential::{
    AccessToken, DeviceCodeCredential, DeviceCodeCredentialOptions, DeviceCodeInfo,
    TokenCredential, UserPrompt, ARM_SCOPE, DEFAULT_AUTHORITY_HOST,
};
pub use error::{ArmError, Result};
pub use models::{CreationData, DiskCreateOption, Snapshot, SnapshotListPage, SnapshotProperties};
pub use operation::{LongRunningOperation, Operation};
pub use pager::SnapshotPager;
pub use snapshots::{
    ClientOptions, SnapshotsApi, SnapshotsClient, API_VERSION, DEFAULT_RESOURCE_MANAGER_ENDPOINT,
};
