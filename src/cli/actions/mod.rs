mod run;

use crate::{filter::NamespaceFilter, scan::ScanConfig};
use std::{net::IpAddr, time::Duration};

/// Action enum representing each possible command
#[derive(Debug)]
pub enum Action {
    Scan {
        config: ScanConfig,
        timeout: Duration,
        filter: NamespaceFilter,
        listen: Option<IpAddr>,
        port: u16,
    },
}

impl Action {
    /// Execute the action
    ///
    /// # Errors
    ///
    /// Returns an error if the action fails to execute
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
