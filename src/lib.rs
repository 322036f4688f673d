//! High level OpenNebula Cloud API facade that re-exports the workspace
//! crates and the types most callers need.
//!
//! ```rust,no_run
//! use oca_rs::{OneClient, UpdateMode};
//!
//! # async fn run() -> Result<(), oca_rs::client::RpcError> {
//! let one = OneClient::new("https://cloud.example.com/RPC2", "oneadmin:onepass");
//! let hosts = one.hostpool_info().await?;
//! for host in hosts.list("HOST")? {
//!     println!("host {} state {}", host.scalar("NAME")?, host.scalar("STATE")?);
//! }
//! let patch = oca_rs::xml::Node::template(&[("LABELS", "SSD")]);
//! let host = one.host_update(0, &patch, UpdateMode::Merge).await?;
//! println!("labels: {}", host.child("TEMPLATE")?.scalar("LABELS")?);
//! # Ok(())
//! # }
//! ```

pub use oca_acl as acl;
pub use oca_client as client;
pub use oca_fixture as fixture;
pub use oca_states as states;
pub use oca_xml as xml;

pub use oca_client::{OneClient, RpcError, RpcValue, UpdateMode};
pub use oca_fixture::{FixtureMode, FixtureSession};
