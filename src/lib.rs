//! Client for the TypeScript language server (`tsserver`).
//!
//! ```no_run
//! use std::path::Path;
//! use tsbridge::{ClientConfig, TsClient};
//!
//! # async fn example() -> Result<(), tsbridge::ClientError> {
//! let client = TsClient::start(ClientConfig::new("/path/to/project")).await?;
//! let file = Path::new("/path/to/project/src/index.ts");
//! client.open(file).await?;
//! let info = client.quickinfo(file, 3, 10).await?;
//! println!("{}", info["displayString"]);
//! client.shutdown(std::time::Duration::from_secs(2)).await;
//! # Ok(())
//! # }
//! ```

pub mod tsserver;
pub mod workspace;

pub use tsserver::{ClientConfig, ClientError, Event, FramingMode, Reply, Response, TsClient};
