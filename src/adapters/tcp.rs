//! TCP reachability probe
//!
//! A region is reachable when its endpoint accepts a TCP connection within
//! the connect timeout. Replication lag cannot be measured this way, so it
//! is reported as unknown. Such a standby is never eligible for promotion;
//! use a command probe where lag matters.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use crate::health::{HealthProbe, ProbeError, ProbeReport};
use crate::region::Endpoint;

#[derive(Debug, Clone)]
pub struct TcpProbe {
    connect_timeout: Duration,
}

impl TcpProbe {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

#[async_trait]
impl HealthProbe for TcpProbe {
    async fn probe(&self, endpoint: &Endpoint) -> Result<ProbeReport, ProbeError> {
        if endpoint.address.trim().is_empty() {
            return Err(ProbeError::InvalidResponse("endpoint address is empty".to_string()));
        }

        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&endpoint.address)).await
        {
            Ok(Ok(_)) => Ok(ProbeReport::reachable(None)),
            Ok(Err(e)) => {
                debug!(address = %endpoint.address, error = %e, "tcp connect failed");
                Ok(ProbeReport::unreachable())
            }
            Err(_) => Ok(ProbeReport::unreachable()),
        }
    }
}
